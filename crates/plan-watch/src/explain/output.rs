use super::ExplainOptions;
use crate::config::ExplainFormat;

const XML_NAMESPACE: &str = "http://www.postgresql.org/2009/explain";

/// Text buffer a [`PlanRenderer`](super::PlanRenderer) writes into.
///
/// Properties and groups are written in the configured format. The writer
/// tracks indentation and, for JSON and YAML, whether the current group has
/// emitted anything yet (to place separators).
#[derive(Debug, Clone)]
pub struct ExplainOutput {
    options: ExplainOptions,
    buf: String,
    indent: usize,
    grouping: Vec<bool>,
}

impl ExplainOutput {
    pub fn new(options: ExplainOptions) -> Self {
        Self {
            options,
            buf: String::new(),
            indent: 0,
            grouping: Vec::new(),
        }
    }

    pub fn options(&self) -> &ExplainOptions {
        &self.options
    }

    pub fn format(&self) -> ExplainFormat {
        self.options.format
    }

    pub fn indent(&self) -> usize {
        self.indent
    }

    pub fn set_indent(&mut self, indent: usize) {
        self.indent = indent;
    }

    pub fn as_str(&self) -> &str {
        &self.buf
    }

    pub fn into_string(self) -> String {
        self.buf
    }

    /// Append raw text. Only meaningful for the text format.
    pub fn push_str(&mut self, s: &str) {
        self.buf.push_str(s);
    }

    /// Append two spaces per indentation level.
    pub fn push_indent(&mut self) {
        for _ in 0..self.indent {
            self.buf.push_str("  ");
        }
    }

    /// Write the document header.
    pub fn begin_output(&mut self) {
        match self.options.format {
            ExplainFormat::Text => {}
            ExplainFormat::Xml => {
                self.buf.push_str(&format!("<explain xmlns=\"{XML_NAMESPACE}\">\n"));
                self.indent += 1;
            }
            ExplainFormat::Json => {
                // Top-level properties are written as siblings inside brackets.
                self.buf.push('[');
                self.grouping.push(false);
                self.indent += 1;
            }
            ExplainFormat::Yaml => self.grouping.push(false),
        }
    }

    /// Write the document trailer.
    pub fn end_output(&mut self) {
        match self.options.format {
            ExplainFormat::Text => {}
            ExplainFormat::Xml => {
                self.indent = self.indent.saturating_sub(1);
                self.buf.push_str("</explain>\n");
            }
            ExplainFormat::Json => {
                self.indent = self.indent.saturating_sub(1);
                self.buf.push_str("\n]");
                self.grouping.pop();
            }
            ExplainFormat::Yaml => {
                self.grouping.pop();
            }
        }
    }

    /// Open a group of properties.
    ///
    /// `objtype` names the XML element; `labelname` is the JSON/YAML key (or
    /// `None` inside an array); `labeled` selects an object over an array.
    pub fn open_group(&mut self, objtype: &str, labelname: Option<&str>, labeled: bool) {
        match self.options.format {
            ExplainFormat::Text => {}
            ExplainFormat::Xml => {
                self.push_indent();
                self.buf.push_str(&format!("<{}>\n", xml_tag(objtype)));
                self.indent += 1;
            }
            ExplainFormat::Json => {
                self.json_line_ending();
                self.push_indent();
                if let Some(label) = labelname {
                    self.buf.push_str(&escape_json(label));
                    self.buf.push_str(": ");
                }
                self.buf.push(if labeled { '{' } else { '[' });
                self.grouping.push(false);
                self.indent += 1;
            }
            ExplainFormat::Yaml => {
                self.yaml_line_starting();
                match labelname {
                    Some(label) => {
                        self.buf.push_str(label);
                        self.buf.push_str(": ");
                        self.grouping.push(true);
                    }
                    None => {
                        self.buf.push_str("- ");
                        self.grouping.push(false);
                    }
                }
                self.indent += 1;
            }
        }
    }

    /// Close a group opened with the same arguments.
    pub fn close_group(&mut self, objtype: &str, _labelname: Option<&str>, labeled: bool) {
        match self.options.format {
            ExplainFormat::Text => {}
            ExplainFormat::Xml => {
                self.indent = self.indent.saturating_sub(1);
                self.push_indent();
                self.buf.push_str(&format!("</{}>\n", xml_tag(objtype)));
            }
            ExplainFormat::Json => {
                self.indent = self.indent.saturating_sub(1);
                self.buf.push('\n');
                self.push_indent();
                self.buf.push(if labeled { '}' } else { ']' });
                self.grouping.pop();
            }
            ExplainFormat::Yaml => {
                self.indent = self.indent.saturating_sub(1);
                self.grouping.pop();
            }
        }
    }

    pub fn property_text(&mut self, label: &str, value: &str) {
        self.property(label, None, value, false);
    }

    pub fn property_float(&mut self, label: &str, unit: Option<&str>, value: f64, ndigits: usize) {
        self.property(label, unit, &format!("{value:.ndigits$}"), true);
    }

    pub fn property_integer(&mut self, label: &str, unit: Option<&str>, value: i64) {
        self.property(label, unit, &value.to_string(), true);
    }

    pub fn property_uinteger(&mut self, label: &str, unit: Option<&str>, value: u64) {
        self.property(label, unit, &value.to_string(), true);
    }

    pub fn property_bool(&mut self, label: &str, value: bool) {
        self.property(label, None, if value { "true" } else { "false" }, true);
    }

    /// A list of strings, e.g. output columns.
    pub fn property_list(&mut self, label: &str, items: &[String]) {
        match self.options.format {
            ExplainFormat::Text => {
                self.push_indent();
                self.buf.push_str(&format!("{label}: {}\n", items.join(", ")));
            }
            ExplainFormat::Xml => {
                let tag = xml_tag(label);
                self.push_indent();
                self.buf.push_str(&format!("<{tag}>\n"));
                for item in items {
                    self.push_indent();
                    self.buf.push_str(&format!("  <Item>{}</Item>\n", escape_xml(item)));
                }
                self.push_indent();
                self.buf.push_str(&format!("</{tag}>\n"));
            }
            ExplainFormat::Json => {
                self.json_line_ending();
                self.push_indent();
                let items: Vec<String> = items.iter().map(|item| escape_json(item)).collect();
                self.buf.push_str(&format!("{}: [{}]", escape_json(label), items.join(", ")));
            }
            ExplainFormat::Yaml => {
                self.yaml_line_starting();
                self.buf.push_str(&format!("{label}: "));
                for item in items {
                    self.buf.push('\n');
                    self.push_indent();
                    self.buf.push_str(&format!("  - {}", escape_json(item)));
                }
            }
        }
    }

    fn property(&mut self, label: &str, unit: Option<&str>, value: &str, numeric: bool) {
        match self.options.format {
            ExplainFormat::Text => {
                self.push_indent();
                match unit {
                    Some(unit) => self.buf.push_str(&format!("{label}: {value} {unit}\n")),
                    None => self.buf.push_str(&format!("{label}: {value}\n")),
                }
            }
            ExplainFormat::Xml => {
                let tag = xml_tag(label);
                self.push_indent();
                self.buf.push_str(&format!("<{tag}>{}</{tag}>\n", escape_xml(value)));
            }
            ExplainFormat::Json => {
                self.json_line_ending();
                self.push_indent();
                self.buf.push_str(&escape_json(label));
                self.buf.push_str(": ");
                if numeric {
                    self.buf.push_str(value);
                } else {
                    self.buf.push_str(&escape_json(value));
                }
            }
            ExplainFormat::Yaml => {
                self.yaml_line_starting();
                self.buf.push_str(label);
                self.buf.push_str(": ");
                if numeric {
                    self.buf.push_str(value);
                } else {
                    self.buf.push_str(&escape_json(value));
                }
            }
        }
    }

    /// Separate a JSON value from its previous sibling, if any.
    fn json_line_ending(&mut self) {
        if let Some(emitted) = self.grouping.last_mut() {
            if *emitted {
                self.buf.push(',');
            } else {
                *emitted = true;
            }
        }
        self.buf.push('\n');
    }

    /// Start a YAML line; the first entry of an array item shares the `- ` line.
    fn yaml_line_starting(&mut self) {
        match self.grouping.last_mut() {
            Some(emitted) if !*emitted => *emitted = true,
            _ => {
                if !self.buf.is_empty() {
                    self.buf.push('\n');
                }
                self.push_indent();
            }
        }
    }
}

fn xml_tag(label: &str) -> String {
    label.replace(' ', "-")
}

fn escape_xml(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Quote and escape a string as a JSON (and YAML) scalar.
fn escape_json(value: &str) -> String {
    serde_json::Value::from(value).to_string()
}
