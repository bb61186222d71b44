//! Reference and view extraction from XML data files.

use once_cell::sync::Lazy;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use regex::Regex;

use crate::registry::view::{owning_module, qualify};
use crate::registry::{Record, ReferenceEdge, View};

/// Tags whose `id` attribute names a data record.
const DATA_TAGS: &[&str] = &[
    "act_window",
    "assert",
    "delete",
    "function",
    "menuitem",
    "record",
    "report",
    "template",
    "url",
];

static REFERENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\w+\.\w+").expect("valid reference regex"));

static TEMPLATE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\w.]+$").expect("valid template regex"));

#[derive(Debug, Clone, Default)]
pub struct XmlElement {
    pub tag: String,
    pub attributes: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<XmlElement>,
    /// 1-based source lines of the opening and closing tag
    pub line: usize,
    pub end_line: usize,
}

impl XmlElement {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    fn is_field(&self, name: &str) -> bool {
        self.tag == "field" && self.attr("name") == Some(name)
    }

    fn field(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|child| child.is_field(name))
    }

    pub fn line_count(&self) -> usize {
        self.end_line.saturating_sub(self.line) + 1
    }

    /// Nested elements plus the attributes of the element and its
    /// descendants.
    pub fn complexity(&self) -> usize {
        let mut count = 0;
        self.walk(&mut |node| count += 1 + node.attributes.len());
        count - 1
    }

    /// `t-call` values below this element.
    fn calls(&self) -> Vec<&str> {
        let mut calls = Vec::new();
        for child in &self.children {
            child.walk(&mut |node| {
                if let Some(call) = node.attr("t-call") {
                    calls.push(call);
                }
            });
        }
        calls
    }

    /// Depth-first, self first.
    fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a XmlElement)) {
        visit(self);
        for child in &self.children {
            child.walk(visit);
        }
    }
}

fn element(e: &BytesStart, line: usize) -> XmlElement {
    let tag = String::from_utf8_lossy(e.name().as_ref()).to_string();
    let attributes = e
        .attributes()
        .filter_map(|a| {
            a.ok().map(|attr| {
                let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
                let value = match attr.unescape_value() {
                    Ok(value) => value.to_string(),
                    Err(_) => String::from_utf8_lossy(&attr.value).to_string(),
                };
                (key, value)
            })
        })
        .collect();

    XmlElement {
        tag,
        attributes,
        text: String::new(),
        children: Vec::new(),
        line,
        end_line: line,
    }
}

/// Tracks the current line while the reader moves forward.
struct LineCounter<'a> {
    bytes: &'a [u8],
    offset: usize,
    line: usize,
}

impl<'a> LineCounter<'a> {
    fn new(xml: &'a str) -> Self {
        Self {
            bytes: xml.as_bytes(),
            offset: 0,
            line: 1,
        }
    }

    fn at(&mut self, position: usize) -> usize {
        let position = position.min(self.bytes.len());
        if position > self.offset {
            self.line += self.bytes[self.offset..position]
                .iter()
                .filter(|b| **b == b'\n')
                .count();
            self.offset = position;
        }
        self.line
    }
}

/// Parses an XML document into its root element.
pub fn parse_document(xml: &str) -> Result<XmlElement, String> {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;
    let mut lines = LineCounter::new(xml);

    loop {
        let start = lines.at(reader.buffer_position() as usize);
        match reader.read_event() {
            Ok(Event::Start(ref e)) => stack.push(element(e, start)),
            Ok(Event::Empty(ref e)) => {
                let mut node = element(e, start);
                node.end_line = lines.at(reader.buffer_position() as usize);
                match stack.last_mut() {
                    Some(parent) => parent.children.push(node),
                    None => root = Some(node),
                }
            }
            Ok(Event::End(_)) => {
                let Some(mut node) = stack.pop() else {
                    return Err("unbalanced closing tag".to_string());
                };
                node.end_line = lines.at(reader.buffer_position() as usize);
                match stack.last_mut() {
                    Some(parent) => parent.children.push(node),
                    None => root = Some(node),
                }
            }
            Ok(Event::Text(ref e)) => {
                if let Some(node) = stack.last_mut() {
                    let text = e.unescape().unwrap_or_default();
                    node.text.push_str(text.trim());
                }
            }
            Ok(Event::CData(ref e)) => {
                if let Some(node) = stack.last_mut() {
                    node.text.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(format!(
                    "XML parse error at position {}: {}",
                    reader.buffer_position(),
                    e
                ))
            }
        }
    }

    if !stack.is_empty() {
        return Err(format!("unclosed element <{}>", stack[stack.len() - 1].tag));
    }
    root.ok_or_else(|| "no root element found".to_string())
}

/// Result of analysing one XML file.
#[derive(Debug, Default)]
pub struct MarkupAnalysis {
    /// Raw reference identifiers in document order
    pub references: Vec<String>,
    pub views: Vec<View>,
    /// Data records that are not views
    pub records: Vec<Record>,
}

impl MarkupAnalysis {
    /// References that point into another module.
    pub fn reference_edges(&self, own_module: &str) -> Vec<ReferenceEdge> {
        self.references
            .iter()
            .filter(|id| REFERENCE.is_match(id))
            .filter_map(|id| {
                let target = owning_module(id);
                (target != own_module).then(|| ReferenceEdge::new(target, id.as_str()))
            })
            .collect()
    }
}

/// Analyses one XML data file of `module`.
pub fn analyze(xml: &str, module: &str) -> Result<MarkupAnalysis, String> {
    let root = parse_document(xml)?;
    let mut analysis = MarkupAnalysis::default();

    root.walk(&mut |node| {
        match node.tag.as_str() {
            "field" => {
                if let Some(target) = node.attr("ref") {
                    analysis.references.push(target.to_string());
                }
            }
            "template" => {
                if let Some(parent) = node.attr("inherit_id") {
                    analysis.references.push(parent.to_string());
                }
                analysis
                    .references
                    .extend(node.calls().into_iter().map(str::to_string));
            }
            "record" if node.attr("model") == Some("ir.ui.view") => {
                if let Some(arch) = node.field("arch") {
                    analysis
                        .references
                        .extend(arch.calls().into_iter().map(str::to_string));
                }
            }
            _ => {}
        }
        if DATA_TAGS.contains(&node.tag.as_str()) {
            if let Some(id) = node.attr("id") {
                analysis.references.push(id.to_string());
            }
        }

        match node.tag.as_str() {
            "template" => analysis.views.extend(template_view(node, module)),
            "record" if node.attr("model") == Some("ir.ui.view") => {
                analysis.views.extend(record_view(node, module))
            }
            "record" => analysis.records.extend(data_record(node, module)),
            _ => {}
        }
    });

    Ok(analysis)
}

fn collect_calls(node: &XmlElement, module: &str, view: &mut View) {
    for call in node.calls() {
        if TEMPLATE_NAME.is_match(call) {
            view.calls.insert(qualify(call, module));
        }
    }
}

fn template_view(node: &XmlElement, module: &str) -> Option<View> {
    let inherit = node.attr("inherit_id").map(|parent| qualify(parent, module));
    let id = match (node.attr("id"), &inherit) {
        (Some(id), _) => qualify(id, module),
        (None, Some(parent)) => {
            let last = parent.rsplit('.').next().unwrap_or(parent);
            format!("{}.{}", module, last)
        }
        (None, None) => return None,
    };

    let mut view = View::new(id).with_metrics(node.complexity(), node.line_count());
    view.inherit = inherit;
    collect_calls(node, module, &mut view);
    Some(view)
}

fn record_view(node: &XmlElement, module: &str) -> Option<View> {
    let id = qualify(node.attr("id")?, module);
    let mut view = View::new(id).with_metrics(node.complexity(), node.line_count());

    if let Some(model) = node.field("model") {
        let model = model.text.trim();
        if !model.is_empty() {
            view.model = Some(model.to_string());
        }
    }
    if let Some(parent) = node.field("inherit_id").and_then(|f| f.attr("ref")) {
        view.inherit = Some(qualify(parent, module));
    }
    if let Some(arch) = node.field("arch") {
        collect_calls(arch, module, &mut view);
    }
    Some(view)
}

fn data_record(node: &XmlElement, module: &str) -> Option<Record> {
    let id = qualify(node.attr("id")?, module);
    let mut record = Record::new(id).with_metrics(node.complexity(), node.line_count());
    record.model = node.attr("model").map(str::to_string);
    Some(record)
}
