//! Evaluation of Python literal expressions into JSON values.
//!
//! Only literal syntax is accepted: strings (including implicit
//! concatenation), numbers, booleans, `None`, lists, tuples, sets and
//! dictionaries with literal keys. Tuples and sets become arrays.

use serde_json::{Map, Number, Value};
use tree_sitter::Node;

use super::parser::{ParsedFile, Parser};

/// Evaluates a whole source file that must consist of a single dictionary
/// expression (comments allowed).
pub fn eval_dict_source(parser: &Parser, source: &str) -> Result<Map<String, Value>, String> {
    let parsed = parser.parse_source(source).map_err(|e| e.to_string())?;
    if let Some(line) = parsed.first_error_line() {
        return Err(format!("syntax error at line {}", line));
    }

    let root = parsed.root_node();
    let mut cursor = root.walk();
    let statements: Vec<Node> = root
        .named_children(&mut cursor)
        .filter(|n| n.kind() != "comment")
        .collect();

    let [statement] = statements.as_slice() else {
        return Err(format!(
            "expected a single expression, found {} statements",
            statements.len()
        ));
    };
    if statement.kind() != "expression_statement" {
        return Err(format!("expected an expression, found {}", statement.kind()));
    }
    let expression = statement
        .named_child(0)
        .ok_or_else(|| "empty expression".to_string())?;

    match eval(&parsed, expression)? {
        Value::Object(map) => Ok(map),
        other => Err(format!("expected a dictionary, found {}", type_name(&other))),
    }
}

/// Evaluates a single literal node.
pub fn eval(parsed: &ParsedFile, node: Node) -> Result<Value, String> {
    match node.kind() {
        "string" => unquote(parsed.node_text(&node)).map(Value::String),
        "concatenated_string" => {
            let mut result = String::new();
            for part in literal_children(node) {
                result.push_str(&unquote(parsed.node_text(&part))?);
            }
            Ok(Value::String(result))
        }
        "integer" => parse_integer(parsed.node_text(&node)),
        "float" => parse_float(parsed.node_text(&node)),
        "true" => Ok(Value::Bool(true)),
        "false" => Ok(Value::Bool(false)),
        "none" => Ok(Value::Null),
        "unary_operator" => {
            let operator = node
                .child_by_field_name("operator")
                .map(|op| parsed.node_text(&op))
                .unwrap_or("");
            let argument = node
                .child_by_field_name("argument")
                .ok_or_else(|| "unary operator without operand".to_string())?;
            match (operator, eval(parsed, argument)?) {
                ("-", Value::Number(n)) => negate(&n),
                ("+", Value::Number(n)) => Ok(Value::Number(n)),
                (op, _) => Err(format!("unsupported unary operator {}", op)),
            }
        }
        "parenthesized_expression" => {
            let inner = literal_children(node)
                .into_iter()
                .next()
                .ok_or_else(|| "empty parentheses".to_string())?;
            eval(parsed, inner)
        }
        "list" | "tuple" | "set" => literal_children(node)
            .into_iter()
            .map(|child| eval(parsed, child))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        "dictionary" => {
            let mut map = Map::new();
            for child in literal_children(node) {
                if child.kind() != "pair" {
                    return Err(format!("unsupported dictionary entry {}", child.kind()));
                }
                let key_node = child
                    .child_by_field_name("key")
                    .ok_or_else(|| "dictionary entry without key".to_string())?;
                let value_node = child
                    .child_by_field_name("value")
                    .ok_or_else(|| "dictionary entry without value".to_string())?;

                let key = match eval(parsed, key_node)? {
                    Value::String(s) => s,
                    Value::Number(n) => n.to_string(),
                    Value::Bool(b) => if b { "True" } else { "False" }.to_string(),
                    other => return Err(format!("unsupported key type {}", type_name(&other))),
                };
                map.insert(key, eval(parsed, value_node)?);
            }
            Ok(Value::Object(map))
        }
        other => Err(format!(
            "not a literal: {} at line {}",
            other,
            node.start_position().row + 1
        )),
    }
}

fn literal_children(node: Node) -> Vec<Node> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor)
        .filter(|n| n.kind() != "comment")
        .collect()
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "None",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "sequence",
        Value::Object(_) => "dictionary",
    }
}

fn parse_integer(text: &str) -> Result<Value, String> {
    let cleaned = text.replace('_', "");
    let lower = cleaned.to_ascii_lowercase();
    let parsed = if let Some(hex) = lower.strip_prefix("0x") {
        i64::from_str_radix(hex, 16)
    } else if let Some(oct) = lower.strip_prefix("0o") {
        i64::from_str_radix(oct, 8)
    } else if let Some(bin) = lower.strip_prefix("0b") {
        i64::from_str_radix(bin, 2)
    } else {
        lower.parse::<i64>()
    };
    parsed
        .map(|n| Value::Number(n.into()))
        .map_err(|e| format!("invalid integer {}: {}", text, e))
}

fn parse_float(text: &str) -> Result<Value, String> {
    let cleaned = text.replace('_', "");
    let value: f64 = cleaned
        .parse()
        .map_err(|e| format!("invalid float {}: {}", text, e))?;
    Number::from_f64(value)
        .map(Value::Number)
        .ok_or_else(|| format!("non-finite float {}", text))
}

fn negate(number: &Number) -> Result<Value, String> {
    if let Some(i) = number.as_i64() {
        return Ok(Value::Number((-i).into()));
    }
    number
        .as_f64()
        .and_then(|f| Number::from_f64(-f))
        .map(Value::Number)
        .ok_or_else(|| format!("cannot negate {}", number))
}

/// Strips prefix and quotes from a Python string literal and resolves its
/// escape sequences.
pub fn unquote(text: &str) -> Result<String, String> {
    let prefix_len = text
        .find(['\'', '"'])
        .ok_or_else(|| format!("not a string literal: {}", text))?;
    let prefix = text[..prefix_len].to_ascii_lowercase();
    if prefix.contains('f') {
        return Err("formatted strings are not literals".to_string());
    }

    let body = &text[prefix_len..];
    let quote = if body.starts_with("\"\"\"") || body.starts_with("'''") {
        &body[..3]
    } else {
        &body[..1]
    };
    if body.len() < quote.len() * 2 || !body.ends_with(quote) {
        return Err(format!("unterminated string literal: {}", text));
    }

    let inner = &body[quote.len()..body.len() - quote.len()];
    if prefix.contains('r') {
        Ok(inner.to_string())
    } else {
        Ok(unescape(inner))
    }
}

fn unescape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('\\') => out.push('\\'),
            Some('\'') => out.push('\''),
            Some('"') => out.push('"'),
            Some('\n') => {}
            Some('x') => push_code_point(&mut out, &mut chars, 2, 'x'),
            Some('u') => push_code_point(&mut out, &mut chars, 4, 'u'),
            Some('U') => push_code_point(&mut out, &mut chars, 8, 'U'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }

    out
}

fn push_code_point(
    out: &mut String,
    chars: &mut std::iter::Peekable<std::str::Chars>,
    digits: usize,
    marker: char,
) {
    let mut hex = String::with_capacity(digits);
    for _ in 0..digits {
        match chars.peek() {
            Some(c) if c.is_ascii_hexdigit() => {
                hex.push(*c);
                chars.next();
            }
            _ => break,
        }
    }

    match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
        Some(c) if hex.len() == digits => out.push(c),
        _ => {
            out.push('\\');
            out.push(marker);
            out.push_str(&hex);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn eval_dict(source: &str) -> Result<Map<String, Value>, String> {
        eval_dict_source(&Parser::new(), source)
    }

    #[test]
    fn test_eval_manifest() {
        let source = r#"
# Copyright header
{
    'name': 'Sales',
    'version': '16.0.1.0.0',
    'depends': ['base', 'mail'],  # trailing comment
    'installable': True,
    'auto_install': False,
    'sequence': -5,
    'ratio': 1.5,
    'website': None,
    'external_dependencies': {'python': ('lxml',)},
}
"#;
        let map = eval_dict(source).unwrap();

        assert_eq!(map["name"], json!("Sales"));
        assert_eq!(map["depends"], json!(["base", "mail"]));
        assert_eq!(map["installable"], json!(true));
        assert_eq!(map["sequence"], json!(-5));
        assert_eq!(map["ratio"], json!(1.5));
        assert_eq!(map["website"], Value::Null);
        assert_eq!(map["external_dependencies"], json!({"python": ["lxml"]}));

        let keys: Vec<_> = map.keys().cloned().collect();
        assert_eq!(keys[0], "name");
        assert_eq!(keys[keys.len() - 1], "external_dependencies");
    }

    #[test]
    fn test_eval_concatenated_and_triple_quoted_strings() {
        let source = "{'summary': ('Part one '\n 'part two'), 'description': \"\"\"\nLine\n\"\"\"}";
        let map = eval_dict(source).unwrap();

        assert_eq!(map["summary"], json!("Part one part two"));
        assert_eq!(map["description"], json!("\nLine\n"));
    }

    #[test]
    fn test_eval_rejects_non_literals() {
        assert!(eval_dict("{'name': compute()}").is_err());
        assert!(eval_dict("x = {'name': 'a'}").is_err());
        assert!(eval_dict("['not', 'a', 'dict']").is_err());
        assert!(eval_dict("{'name': 'a',").is_err());
    }

    #[test]
    fn test_unquote_prefixes_and_escapes() {
        assert_eq!(unquote("'a\\nb'").unwrap(), "a\nb");
        assert_eq!(unquote("r'a\\nb'").unwrap(), "a\\nb");
        assert_eq!(unquote("u\"caf\\u00e9\"").unwrap(), "café");
        assert_eq!(unquote("'it\\'s'").unwrap(), "it's");
        assert!(unquote("f'{x}'").is_err());
    }

    #[test]
    fn test_parse_integer_forms() {
        assert_eq!(parse_integer("1_000").unwrap(), json!(1000));
        assert_eq!(parse_integer("0x10").unwrap(), json!(16));
        assert!(parse_integer("12abc").is_err());
    }
}
