//! Per-language line counts through the external `cloc` tool.

use std::collections::BTreeMap;
use std::path::Path;
use std::process::Command;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::registry::LanguageStats;

static CLOC_ROW: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([^:]*?)\s+(\d+)\s+(\d+)\s+(\d+)\s+(\d+)").expect("valid cloc row regex")
});

/// Runs `cloc` on a module directory. Returns `None` when the tool is
/// missing or fails.
pub fn analyse_language(path: &Path) -> Option<BTreeMap<String, LanguageStats>> {
    let output = match Command::new("cloc").arg(path).output() {
        Ok(output) => output,
        Err(e) => {
            tracing::debug!("Language analysis needs cloc: {}", e);
            return None;
        }
    };

    if !output.status.success() || !output.stderr.is_empty() {
        tracing::debug!(
            "cloc failed for {}: {}",
            path.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        );
        return None;
    }

    Some(parse_cloc_output(&String::from_utf8_lossy(&output.stdout)))
}

/// Parses the default table printed by `cloc`; the `SUM:` row is skipped.
pub fn parse_cloc_output(output: &str) -> BTreeMap<String, LanguageStats> {
    let mut counts: Vec<(String, u64)> = Vec::new();
    for line in output.lines() {
        let Some(caps) = CLOC_ROW.captures(line) else {
            continue;
        };
        let language = caps[1].trim();
        if let Ok(code) = caps[5].parse::<u64>() {
            if !language.is_empty() {
                counts.push((language.to_string(), code));
            }
        }
    }

    let total: u64 = counts.iter().map(|(_, lines)| lines).sum();
    counts
        .into_iter()
        .map(|(language, lines)| {
            let fraction = if total == 0 {
                0.0
            } else {
                lines as f64 / total as f64
            };
            (language, LanguageStats { lines, fraction })
        })
        .collect()
}
