//! Untyped configuration tree.
//!
//! Every source produces a [`Node`]; the merge engine folds them, the
//! preprocessing pipeline rewrites their string leaves, and decoders turn the
//! final tree into typed values. Nodes carry a [`NodeInfo`] with the origin
//! position and the dotted path used in diagnostics.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::SourceLocation;

/// One step in a configuration path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// A path from the root of the tree, rendered as `a.b[0].c`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DotPath(Vec<PathSegment>);

impl DotPath {
    /// The empty path.
    pub fn root() -> Self {
        Self::default()
    }

    /// Extend this path with a map key.
    pub fn child(&self, key: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(PathSegment::Key(key.into()));
        Self(segments)
    }

    /// Extend this path with a list index.
    pub fn index(&self, index: usize) -> Self {
        let mut segments = self.0.clone();
        segments.push(PathSegment::Index(index));
        Self(segments)
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Path without its last segment; the root is its own parent.
    pub fn parent(&self) -> Self {
        let mut segments = self.0.clone();
        segments.pop();
        Self(segments)
    }

    /// The last key segment, if the path ends in a key.
    pub fn last_key(&self) -> Option<&str> {
        match self.0.last() {
            Some(PathSegment::Key(k)) => Some(k),
            _ => None,
        }
    }

    /// Whether `self` equals `other` or lies underneath it.
    pub fn starts_with(&self, other: &DotPath) -> bool {
        self.0.starts_with(&other.0)
    }

    /// Parse a dotted path such as `servers[0].host`.
    ///
    /// Empty segments are ignored, so `"a..b"` parses as `a.b`. A bracketed
    /// segment that is not a number is kept as a key.
    pub fn parse(path: &str) -> Self {
        let mut segments = Vec::new();
        for part in path.split('.') {
            let mut rest = part;
            if let Some(open) = rest.find('[') {
                let key = &rest[..open];
                if !key.is_empty() {
                    segments.push(PathSegment::Key(key.to_string()));
                }
                rest = &rest[open..];
                while let Some(stripped) = rest.strip_prefix('[') {
                    let Some(close) = stripped.find(']') else {
                        segments.push(PathSegment::Key(rest.to_string()));
                        rest = "";
                        break;
                    };
                    let inner = &stripped[..close];
                    match inner.parse::<usize>() {
                        Ok(i) => segments.push(PathSegment::Index(i)),
                        Err(_) => segments.push(PathSegment::Key(inner.to_string())),
                    }
                    rest = &stripped[close + 1..];
                }
                if !rest.is_empty() {
                    segments.push(PathSegment::Key(rest.to_string()));
                }
            } else if !rest.is_empty() {
                segments.push(PathSegment::Key(rest.to_string()));
            }
        }
        Self(segments)
    }
}

impl fmt::Display for DotPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "(root)");
        }
        for (i, segment) in self.0.iter().enumerate() {
            match segment {
                PathSegment::Key(k) if i == 0 => write!(f, "{}", k)?,
                PathSegment::Key(k) => write!(f, ".{}", k)?,
                PathSegment::Index(idx) => write!(f, "[{}]", idx)?,
            }
        }
        Ok(())
    }
}

impl From<&str> for DotPath {
    fn from(path: &str) -> Self {
        Self::parse(path)
    }
}

/// Diagnostic data attached to every defined node.
///
/// `meta` holds non-semantic annotations written during preprocessing
/// (`secret`, `resolver`, `unprocessed`); decoders never read it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeInfo {
    pub pos: Option<SourceLocation>,
    pub path: DotPath,
    pub meta: BTreeMap<String, String>,
}

impl NodeInfo {
    pub fn new(path: DotPath) -> Self {
        Self {
            pos: None,
            path,
            meta: BTreeMap::new(),
        }
    }

    pub fn at(path: DotPath, pos: SourceLocation) -> Self {
        Self {
            pos: Some(pos),
            path,
            meta: BTreeMap::new(),
        }
    }
}

/// A configuration tree node.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Node {
    /// Keyed children plus an optional own scalar value (`a=1` next to `a.b=2`).
    Map {
        entries: BTreeMap<String, Node>,
        value: Box<Node>,
        info: NodeInfo,
    },
    List {
        elements: Vec<Node>,
        info: NodeInfo,
    },
    String {
        value: String,
        info: NodeInfo,
    },
    Long {
        value: i64,
        info: NodeInfo,
    },
    Double {
        value: f64,
        info: NodeInfo,
    },
    Boolean {
        value: bool,
        info: NodeInfo,
    },
    Null {
        info: NodeInfo,
    },
    /// Absent from every source.
    #[default]
    Undefined,
}

static UNDEFINED: Node = Node::Undefined;

impl Node {
    pub fn map(entries: BTreeMap<String, Node>, info: NodeInfo) -> Self {
        Node::Map {
            entries,
            value: Box::new(Node::Undefined),
            info,
        }
    }

    pub fn list(elements: Vec<Node>, info: NodeInfo) -> Self {
        Node::List { elements, info }
    }

    pub fn string(value: impl Into<String>, info: NodeInfo) -> Self {
        Node::String {
            value: value.into(),
            info,
        }
    }

    pub fn long(value: i64, info: NodeInfo) -> Self {
        Node::Long { value, info }
    }

    pub fn double(value: f64, info: NodeInfo) -> Self {
        Node::Double { value, info }
    }

    pub fn boolean(value: bool, info: NodeInfo) -> Self {
        Node::Boolean { value, info }
    }

    pub fn null(info: NodeInfo) -> Self {
        Node::Null { info }
    }

    pub fn is_defined(&self) -> bool {
        !matches!(self, Node::Undefined)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Node::Null { .. })
    }

    pub fn is_map(&self) -> bool {
        matches!(self, Node::Map { .. })
    }

    pub fn info(&self) -> Option<&NodeInfo> {
        match self {
            Node::Map { info, .. }
            | Node::List { info, .. }
            | Node::String { info, .. }
            | Node::Long { info, .. }
            | Node::Double { info, .. }
            | Node::Boolean { info, .. }
            | Node::Null { info } => Some(info),
            Node::Undefined => None,
        }
    }

    pub fn info_mut(&mut self) -> Option<&mut NodeInfo> {
        match self {
            Node::Map { info, .. }
            | Node::List { info, .. }
            | Node::String { info, .. }
            | Node::Long { info, .. }
            | Node::Double { info, .. }
            | Node::Boolean { info, .. }
            | Node::Null { info } => Some(info),
            Node::Undefined => None,
        }
    }

    pub fn pos(&self) -> Option<&SourceLocation> {
        self.info().and_then(|i| i.pos.as_ref())
    }

    /// The node's path; `Undefined` reports the root.
    pub fn path(&self) -> DotPath {
        self.info().map(|i| i.path.clone()).unwrap_or_default()
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Node::Map { .. } => "map",
            Node::List { .. } => "list",
            Node::String { .. } => "string",
            Node::Long { .. } => "long",
            Node::Double { .. } => "double",
            Node::Boolean { .. } => "boolean",
            Node::Null { .. } => "null",
            Node::Undefined => "undefined",
        }
    }

    /// Child by key; `Undefined` when absent or when this is not a map.
    pub fn get(&self, key: &str) -> &Node {
        match self {
            Node::Map { entries, .. } => entries.get(key).unwrap_or(&UNDEFINED),
            _ => &UNDEFINED,
        }
    }

    /// Element by index; `Undefined` when out of range or not a list.
    pub fn at(&self, index: usize) -> &Node {
        match self {
            Node::List { elements, .. } => elements.get(index).unwrap_or(&UNDEFINED),
            _ => &UNDEFINED,
        }
    }

    /// Walk a path from this node.
    pub fn at_path(&self, path: &DotPath) -> &Node {
        path.segments()
            .iter()
            .fold(self, |node, segment| match segment {
                PathSegment::Key(k) => node.get(k),
                PathSegment::Index(i) => node.at(*i),
            })
    }

    /// Walk a dotted path string from this node.
    pub fn lookup(&self, path: &str) -> &Node {
        self.at_path(&DotPath::parse(path))
    }

    pub fn entries(&self) -> Option<&BTreeMap<String, Node>> {
        match self {
            Node::Map { entries, .. } => Some(entries),
            _ => None,
        }
    }

    /// A map's own value, or `Undefined`.
    pub fn own_value(&self) -> &Node {
        match self {
            Node::Map { value, .. } => value,
            _ => &UNDEFINED,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Node::String { value, .. } => Some(value),
            _ => None,
        }
    }

    /// Text form of a scalar, following a map's own value.
    pub fn scalar_text(&self) -> Option<String> {
        match self {
            Node::String { value, .. } => Some(value.clone()),
            Node::Long { value, .. } => Some(value.to_string()),
            Node::Double { value, .. } => Some(value.to_string()),
            Node::Boolean { value, .. } => Some(value.to_string()),
            Node::Map { value, .. } => value.scalar_text(),
            _ => None,
        }
    }

    pub fn meta(&self, key: &str) -> Option<&str> {
        self.info()
            .and_then(|i| i.meta.get(key))
            .map(String::as_str)
    }

    /// Attach a metadata entry; no-op on `Undefined`.
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        if let Some(info) = self.info_mut() {
            info.meta.insert(key.into(), value.into());
        }
        self
    }

    /// Structural JSON view, ignoring positions, paths and metadata.
    ///
    /// Undefined entries are dropped. A map with no entries collapses to its
    /// own value.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;
        match self {
            Node::Map { entries, value, .. } => {
                if entries.is_empty() && value.is_defined() {
                    return value.to_json();
                }
                Value::Object(
                    entries
                        .iter()
                        .filter(|(_, v)| v.is_defined())
                        .map(|(k, v)| (k.clone(), v.to_json()))
                        .collect(),
                )
            }
            Node::List { elements, .. } => {
                Value::Array(elements.iter().map(Node::to_json).collect())
            }
            Node::String { value, .. } => Value::String(value.clone()),
            Node::Long { value, .. } => Value::from(*value),
            Node::Double { value, .. } => serde_json::Number::from_f64(*value)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Node::Boolean { value, .. } => Value::Bool(*value),
            Node::Null { .. } | Node::Undefined => Value::Null,
        }
    }

    /// Build a tree from JSON, stamping every node with `source` and its path.
    pub fn from_json(value: &serde_json::Value, source: &str, path: DotPath) -> Self {
        use serde_json::Value;
        let info = NodeInfo::at(path.clone(), SourceLocation::new(source));
        match value {
            Value::Null => Node::null(info),
            Value::Bool(b) => Node::boolean(*b, info),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Node::long(i, info),
                None => Node::double(n.as_f64().unwrap_or(f64::NAN), info),
            },
            Value::String(s) => Node::string(s.clone(), info),
            Value::Array(items) => Node::list(
                items
                    .iter()
                    .enumerate()
                    .map(|(i, v)| Node::from_json(v, source, path.index(i)))
                    .collect(),
                info,
            ),
            Value::Object(map) => Node::map(
                map.iter()
                    .map(|(k, v)| (k.clone(), Node::from_json(v, source, path.child(k))))
                    .collect(),
                info,
            ),
        }
    }

    /// Insert `leaf` under the nested `keys`, creating intermediate maps.
    ///
    /// When an intermediate position already holds a scalar, it becomes the
    /// own value of the new map. Inserting onto a position that is already a
    /// map sets that map's own value. `base` is the path of `self`.
    pub fn insert_at(&mut self, keys: &[String], leaf: Node, base: &DotPath) {
        let Some((first, rest)) = keys.split_first() else {
            let mut leaf = leaf;
            if let Some(info) = leaf.info_mut() {
                info.path = base.clone();
            }
            match self {
                Node::Map { value, .. } => **value = leaf,
                other => *other = leaf,
            }
            return;
        };

        if !self.is_map() {
            let previous = std::mem::take(self);
            let info = previous
                .info()
                .cloned()
                .unwrap_or_else(|| NodeInfo::new(base.clone()));
            *self = Node::Map {
                entries: BTreeMap::new(),
                value: Box::new(previous),
                info,
            };
        }

        if let Node::Map { entries, .. } = self {
            let child_path = base.child(first.clone());
            let child = entries.entry(first.clone()).or_default();
            child.insert_at(rest, leaf, &child_path);
        }
    }

    /// Every scalar, null and list leaf, with maps flattened into their keys.
    ///
    /// A map's defined own value is reported at the map's path.
    pub fn leaves(&self) -> Vec<(DotPath, &Node)> {
        let mut out = Vec::new();
        self.collect_leaves(&DotPath::root(), &mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, path: &DotPath, out: &mut Vec<(DotPath, &'a Node)>) {
        match self {
            Node::Map { entries, value, .. } => {
                if value.is_defined() {
                    out.push((path.clone(), value.as_ref()));
                }
                for (k, v) in entries {
                    v.collect_leaves(&path.child(k.clone()), out);
                }
            }
            Node::Undefined => {}
            other => out.push((path.clone(), other)),
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Undefined => write!(f, "<undefined>"),
            Node::Null { .. } => write!(f, "null"),
            Node::String { value, .. } => write!(f, "{}", value),
            other => write!(f, "{}", other.to_json()),
        }
    }
}
