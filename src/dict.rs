//! Configuration dictionaries: ordered keyword -> value blocks.
//!
//! The textual grammar is TOML. Every key, at any depth, remembers the lines
//! it was read from so that errors can point at the offending entry. A
//! block's range spans the entries it holds.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::de::{Deserialize, Deserializer, IgnoredAny, MapAccess, SeqAccess, Visitor};
use toml::Spanned;

use crate::error::{ErrorKind, ErrorRecord, LineRange, LiveResult};

/// A configuration value.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Node>),
    Dict(Dictionary),
}

impl Node {
    fn kind(&self) -> &'static str {
        match self {
            Node::Bool(_) => "a boolean",
            Node::Int(_) => "an integer",
            Node::Float(_) => "a number",
            Node::Str(_) => "a string",
            Node::List(_) => "a list",
            Node::Dict(_) => "a dictionary",
        }
    }
}

impl From<bool> for Node {
    fn from(v: bool) -> Self {
        Node::Bool(v)
    }
}

impl From<i64> for Node {
    fn from(v: i64) -> Self {
        Node::Int(v)
    }
}

impl From<f64> for Node {
    fn from(v: f64) -> Self {
        Node::Float(v)
    }
}

impl From<&str> for Node {
    fn from(v: &str) -> Self {
        Node::Str(v.to_string())
    }
}

impl From<String> for Node {
    fn from(v: String) -> Self {
        Node::Str(v)
    }
}

impl From<Dictionary> for Node {
    fn from(v: Dictionary) -> Self {
        Node::Dict(v)
    }
}

impl<T: Into<Node>> From<Vec<T>> for Node {
    fn from(v: Vec<T>) -> Self {
        Node::List(v.into_iter().map(Into::into).collect())
    }
}

/// Conversion from a [`Node`]; the error is a short reason.
pub trait FromNode: Sized {
    fn from_node(node: &Node) -> Result<Self, String>;
}

fn expected(what: &str, node: &Node) -> String {
    format!("expected {what}, found {}", node.kind())
}

impl FromNode for bool {
    fn from_node(node: &Node) -> Result<Self, String> {
        match node {
            Node::Bool(v) => Ok(*v),
            other => Err(expected("a boolean", other)),
        }
    }
}

impl FromNode for i64 {
    fn from_node(node: &Node) -> Result<Self, String> {
        match node {
            Node::Int(v) => Ok(*v),
            other => Err(expected("an integer", other)),
        }
    }
}

impl FromNode for u32 {
    fn from_node(node: &Node) -> Result<Self, String> {
        let v = i64::from_node(node)?;
        u32::try_from(v).map_err(|_| format!("{v} is out of range"))
    }
}

impl FromNode for usize {
    fn from_node(node: &Node) -> Result<Self, String> {
        let v = i64::from_node(node)?;
        usize::try_from(v).map_err(|_| format!("{v} is out of range"))
    }
}

impl FromNode for f64 {
    fn from_node(node: &Node) -> Result<Self, String> {
        match node {
            Node::Float(v) => Ok(*v),
            Node::Int(v) => Ok(*v as f64),
            other => Err(expected("a number", other)),
        }
    }
}

impl FromNode for String {
    fn from_node(node: &Node) -> Result<Self, String> {
        match node {
            Node::Str(v) => Ok(v.clone()),
            other => Err(expected("a string", other)),
        }
    }
}

impl FromNode for PathBuf {
    fn from_node(node: &Node) -> Result<Self, String> {
        String::from_node(node).map(PathBuf::from)
    }
}

impl FromNode for Dictionary {
    fn from_node(node: &Node) -> Result<Self, String> {
        match node {
            Node::Dict(v) => Ok(v.clone()),
            other => Err(expected("a dictionary", other)),
        }
    }
}

impl<T: FromNode> FromNode for Vec<T> {
    fn from_node(node: &Node) -> Result<Self, String> {
        match node {
            Node::List(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| T::from_node(item).map_err(|e| format!("element {i}: {e}")))
                .collect(),
            other => Err(expected("a list", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Item {
    node: Node,
    lines: LineRange,
}

/// Ordered keyword -> [`Node`] block with its scoped name, the file it was
/// read from and its line range.
#[derive(Debug, Clone, PartialEq)]
pub struct Dictionary {
    name: String,
    source: String,
    lines: LineRange,
    entries: IndexMap<String, Item>,
}

impl Dictionary {
    /// Empty dictionary named after its source.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            source: name.clone(),
            name,
            lines: LineRange::unknown(),
            entries: IndexMap::new(),
        }
    }

    /// Nested block `key` of this dictionary, read from the same source.
    fn child(&self, key: &str) -> Self {
        Self {
            name: format!("{}/{key}", self.name),
            source: self.source.clone(),
            lines: LineRange::unknown(),
            entries: IndexMap::new(),
        }
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, key: &str, node: impl Into<Node>) -> Self {
        self.insert(key, node);
        self
    }

    /// Add or replace an entry (no line information).
    pub fn insert(&mut self, key: &str, node: impl Into<Node>) {
        let node = match node.into() {
            Node::Dict(mut dict) => {
                dict.name = format!("{}/{key}", self.name);
                dict.source = self.source.clone();
                Node::Dict(dict)
            }
            other => other,
        };
        self.entries.insert(
            key.to_string(),
            Item {
                node,
                lines: LineRange::unknown(),
            },
        );
    }

    /// Parse TOML text. `name` is used in diagnostics.
    pub fn from_toml(name: impl Into<String>, text: &str) -> LiveResult<Self> {
        let name = name.into();
        // Document order comes from the order-preserving table; spans only
        // provide line numbers.
        let table: toml::Table = toml::from_str(text).map_err(|e| {
            let line = e.span().map(|span| line_of(text, span.start));
            ErrorRecord::fatal(
                ErrorKind::ConfigMalformed {
                    key: line.and_then(|line| key_near(text, line)),
                },
                format!("cannot parse {name}: {}", e.message()),
            )
            .in_function("Dictionary::from_toml")
            .with_origin(name.clone(), line.map(LineRange::at).unwrap_or_default())
        })?;
        let spans: SpanTree = toml::from_str(text).unwrap_or_default();

        let mut dict = Dictionary::new(name);
        dict.lines = LineRange::new(1, text.lines().count().max(1) as u32);
        dict.fill(table, &spans, text);
        Ok(dict)
    }

    /// Convert `table` into entries, taking line ranges from `spans`.
    fn fill(&mut self, table: toml::Table, spans: &SpanTree, text: &str) {
        let no_spans = SpanTree::default();
        for (key, value) in table {
            let spanned = spans.0.get(&key);
            let own = spanned.map(|s| span_lines(text, s.span()));

            let (node, lines) = match value {
                toml::Value::Table(inner) => {
                    let mut child = self.child(&key);
                    child.fill(inner, spanned.map_or(&no_spans, |s| s.get_ref()), text);
                    child.lines = child
                        .entry_lines()
                        .or(own)
                        .unwrap_or(self.lines);
                    let lines = child.lines;
                    (Node::Dict(child), lines)
                }
                other => {
                    let lines = own.unwrap_or(self.lines);
                    (self.convert(&key, other, lines), lines)
                }
            };
            self.entries.insert(key, Item { node, lines });
        }
    }

    /// Lines covered by the entries, if any carries a position.
    fn entry_lines(&self) -> Option<LineRange> {
        let start = self.entries.values().filter_map(|item| item.lines.start).min()?;
        let end = self
            .entries
            .values()
            .filter_map(|item| item.lines.end.or(item.lines.start))
            .max()?;
        Some(LineRange::new(start, end))
    }

    /// Non-table value of `key`. Tables inside arrays take the array's lines.
    fn convert(&self, key: &str, value: toml::Value, lines: LineRange) -> Node {
        match value {
            toml::Value::Boolean(v) => Node::Bool(v),
            toml::Value::Integer(v) => Node::Int(v),
            toml::Value::Float(v) => Node::Float(v),
            toml::Value::String(v) => Node::Str(v),
            toml::Value::Datetime(v) => Node::Str(v.to_string()),
            toml::Value::Array(items) => Node::List(
                items
                    .into_iter()
                    .enumerate()
                    .map(|(i, item)| self.convert(&format!("{key}[{i}]"), item, lines))
                    .collect(),
            ),
            toml::Value::Table(table) => {
                let mut child = self.child(key);
                child.lines = lines;
                for (inner_key, value) in table {
                    let node = child.convert(&inner_key, value, lines);
                    child.entries.insert(inner_key, Item { node, lines });
                }
                Node::Dict(child)
            }
        }
    }

    /// Read and parse a TOML file.
    pub fn read(path: &Path) -> LiveResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| ErrorRecord::io(path, &e))?;
        Self::from_toml(path.display().to_string(), &text)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// File (or other source) the dictionary was read from.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn lines(&self) -> LineRange {
        self.lines
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Keys in source order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn get(&self, key: &str) -> Option<&Node> {
        self.entries.get(key).map(|item| &item.node)
    }

    /// Lines of `key`, or of this dictionary when the key is absent.
    pub fn line_range(&self, key: &str) -> LineRange {
        self.entries
            .get(key)
            .map(|item| item.lines)
            .unwrap_or(self.lines)
    }

    /// Value of `key`; missing or ill-typed entries are fatal.
    #[track_caller]
    pub fn get_required<T: FromNode>(&self, key: &str) -> LiveResult<T> {
        match self.get_optional(key)? {
            Some(value) => Ok(value),
            None => Err(ErrorRecord::fatal(
                ErrorKind::ConfigMissingRequiredKey {
                    key: key.to_string(),
                },
                format!("Entry '{key}' not found in dictionary {}", self.name),
            )
            .in_function("Dictionary::get_required")
            .with_origin(self.source.clone(), self.lines)),
        }
    }

    /// Value of `key`, or `default` when absent. Ill-typed entries are fatal.
    #[track_caller]
    pub fn get_or<T: FromNode>(&self, key: &str, default: T) -> LiveResult<T> {
        Ok(self.get_optional(key)?.unwrap_or(default))
    }

    #[track_caller]
    pub fn get_optional<T: FromNode>(&self, key: &str) -> LiveResult<Option<T>> {
        let Some(item) = self.entries.get(key) else {
            return Ok(None);
        };
        T::from_node(&item.node).map(Some).map_err(|reason| {
            ErrorRecord::fatal(
                ErrorKind::ConfigMalformed {
                    key: Some(key.to_string()),
                },
                format!("Entry '{key}' in dictionary {}: {reason}", self.name),
            )
            .in_function("Dictionary::get_optional")
            .with_origin(self.source.clone(), item.lines)
        })
    }

    /// Nested block `key`.
    #[track_caller]
    pub fn sub_dict(&self, key: &str) -> LiveResult<&Dictionary> {
        match self.entries.get(key) {
            Some(Item {
                node: Node::Dict(dict),
                ..
            }) => Ok(dict),
            Some(item) => Err(ErrorRecord::fatal(
                ErrorKind::ConfigMalformed {
                    key: Some(key.to_string()),
                },
                format!(
                    "Entry '{key}' in dictionary {} is {}, not a dictionary",
                    self.name,
                    item.node.kind()
                ),
            )
            .in_function("Dictionary::sub_dict")
            .with_origin(self.source.clone(), item.lines)),
            None => Err(ErrorRecord::fatal(
                ErrorKind::ConfigMissingRequiredKey {
                    key: key.to_string(),
                },
                format!("Sub-dictionary '{key}' not found in dictionary {}", self.name),
            )
            .in_function("Dictionary::sub_dict")
            .with_origin(self.source.clone(), self.lines)),
        }
    }
}

/// 1-based line number of byte offset `pos`.
fn line_of(text: &str, pos: usize) -> u32 {
    let pos = pos.min(text.len());
    text.as_bytes()[..pos].iter().filter(|&&b| b == b'\n').count() as u32 + 1
}

/// Lines of a byte span.
fn span_lines(text: &str, span: std::ops::Range<usize>) -> LineRange {
    LineRange::new(
        line_of(text, span.start),
        line_of(text, span.end.saturating_sub(1).max(span.start)),
    )
}

/// Key defined at or above `line`, used to name the entry a parse error
/// points into.
fn key_near(text: &str, line: u32) -> Option<String> {
    text.lines()
        .take(line as usize)
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .find_map(|l| {
            if l.starts_with('[') {
                Some(l.trim_matches(|c: char| c == '[' || c == ']').trim().to_string())
            } else {
                l.split_once('=').map(|(key, _)| key.trim().to_string())
            }
        })
        .filter(|key| !key.is_empty())
}

/// Spans of a TOML document, following its table structure. Only tables are
/// descended into; every other value is skipped.
#[derive(Debug, Default)]
struct SpanTree(BTreeMap<String, Spanned<SpanTree>>);

impl<'de> Deserialize<'de> for SpanTree {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(SpanVisitor)
    }
}

struct SpanVisitor;

impl<'de> Visitor<'de> for SpanVisitor {
    type Value = SpanTree;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a TOML value")
    }

    fn visit_bool<E: serde::de::Error>(self, _: bool) -> Result<SpanTree, E> {
        Ok(SpanTree::default())
    }

    fn visit_i64<E: serde::de::Error>(self, _: i64) -> Result<SpanTree, E> {
        Ok(SpanTree::default())
    }

    fn visit_u64<E: serde::de::Error>(self, _: u64) -> Result<SpanTree, E> {
        Ok(SpanTree::default())
    }

    fn visit_f64<E: serde::de::Error>(self, _: f64) -> Result<SpanTree, E> {
        Ok(SpanTree::default())
    }

    fn visit_str<E: serde::de::Error>(self, _: &str) -> Result<SpanTree, E> {
        Ok(SpanTree::default())
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<SpanTree, A::Error> {
        while seq.next_element::<IgnoredAny>()?.is_some() {}
        Ok(SpanTree::default())
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<SpanTree, A::Error> {
        let mut children = BTreeMap::new();
        while let Some((key, value)) = map.next_entry::<String, Spanned<SpanTree>>()? {
            children.insert(key, value);
        }
        Ok(SpanTree(children))
    }
}
