//! Native value trees and graphs
//!
//! [`NativeValue`] is what script values become on the native side: an owned
//! tree with no link back to the engine. Owned trees cannot contain cycles,
//! so [`NativeGraph`] exists for native data that shares or loops back on
//! itself. It is an arena of nodes addressed by [`NodeId`].

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde_json::{Map as JsonMap, Number as JsonNumber, Value as JsonValue};

use crate::error::ConvertError;

/// Owned native value.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeValue {
    Null,
    Boolean(bool),
    Number(f64),
    String(String),
    Sequence(Vec<NativeValue>),
    Mapping(NativeMap),
    /// Milliseconds since the Unix epoch.
    Date(f64),
}

/// String-keyed mapping that keeps insertion order and unique keys.
///
/// Equality ignores key order: script engines enumerate integer-like keys
/// before others, so order is not preserved across the boundary.
#[derive(Clone, Default)]
pub struct NativeMap {
    entries: Vec<(String, NativeValue)>,
    index: HashMap<String, usize>,
}

impl NativeMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            index: HashMap::with_capacity(capacity),
        }
    }

    /// Insert `value` under `key`, returning the value it replaced.
    /// A replaced key keeps its original position.
    pub fn insert(&mut self, key: impl Into<String>, value: NativeValue) -> Option<NativeValue> {
        let key = key.into();
        if let Some(&slot) = self.index.get(&key) {
            return Some(std::mem::replace(&mut self.entries[slot].1, value));
        }
        self.index.insert(key.clone(), self.entries.len());
        self.entries.push((key, value));
        None
    }

    pub fn get(&self, key: &str) -> Option<&NativeValue> {
        self.index.get(key).map(|&slot| &self.entries[slot].1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &NativeValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl fmt::Debug for NativeMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl PartialEq for NativeMap {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .entries
                .iter()
                .all(|(key, value)| other.get(key) == Some(value))
    }
}

impl<K: Into<String>> FromIterator<(K, NativeValue)> for NativeMap {
    fn from_iter<I: IntoIterator<Item = (K, NativeValue)>>(iter: I) -> Self {
        let mut map = NativeMap::new();
        for (key, value) in iter {
            map.insert(key, value);
        }
        map
    }
}

impl IntoIterator for NativeMap {
    type Item = (String, NativeValue);
    type IntoIter = std::vec::IntoIter<(String, NativeValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl NativeValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            NativeValue::Null => "null",
            NativeValue::Boolean(_) => "boolean",
            NativeValue::Number(_) => "number",
            NativeValue::String(_) => "string",
            NativeValue::Sequence(_) => "sequence",
            NativeValue::Mapping(_) => "mapping",
            NativeValue::Date(_) => "date",
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            NativeValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            NativeValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// JSON rendering. Dates become their millisecond timestamp and
    /// non-finite numbers become `null`, as `JSON.stringify` would.
    pub fn to_json(&self) -> JsonValue {
        match self {
            NativeValue::Null => JsonValue::Null,
            NativeValue::Boolean(b) => JsonValue::Bool(*b),
            NativeValue::Number(n) | NativeValue::Date(n) => number_to_json(*n),
            NativeValue::String(s) => JsonValue::String(s.clone()),
            NativeValue::Sequence(items) => {
                JsonValue::Array(items.iter().map(NativeValue::to_json).collect())
            }
            NativeValue::Mapping(map) => JsonValue::Object(
                map.iter()
                    .map(|(k, v)| (k.to_owned(), v.to_json()))
                    .collect::<JsonMap<_, _>>(),
            ),
        }
    }
}

fn number_to_json(n: f64) -> JsonValue {
    // Integral values print without a fraction, like script numbers do.
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        return JsonValue::Number(JsonNumber::from(n as i64));
    }
    JsonNumber::from_f64(n).map_or(JsonValue::Null, JsonValue::Number)
}

impl From<JsonValue> for NativeValue {
    fn from(json: JsonValue) -> Self {
        match json {
            JsonValue::Null => NativeValue::Null,
            JsonValue::Bool(b) => NativeValue::Boolean(b),
            JsonValue::Number(n) => NativeValue::Number(n.as_f64().unwrap_or(0.0)),
            JsonValue::String(s) => NativeValue::String(s),
            JsonValue::Array(items) => {
                NativeValue::Sequence(items.into_iter().map(NativeValue::from).collect())
            }
            JsonValue::Object(map) => NativeValue::Mapping(
                map.into_iter()
                    .map(|(k, v)| (k, NativeValue::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<bool> for NativeValue {
    fn from(b: bool) -> Self {
        NativeValue::Boolean(b)
    }
}

impl From<f64> for NativeValue {
    fn from(n: f64) -> Self {
        NativeValue::Number(n)
    }
}

impl From<&str> for NativeValue {
    fn from(s: &str) -> Self {
        NativeValue::String(s.to_owned())
    }
}

impl From<String> for NativeValue {
    fn from(s: String) -> Self {
        NativeValue::String(s)
    }
}

impl From<Vec<NativeValue>> for NativeValue {
    fn from(items: Vec<NativeValue>) -> Self {
        NativeValue::Sequence(items)
    }
}

impl From<NativeMap> for NativeValue {
    fn from(map: NativeMap) -> Self {
        NativeValue::Mapping(map)
    }
}

// ============================================================================
// Graph
// ============================================================================

/// Index of a node inside a [`NativeGraph`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// Graph node. Containers refer to their children by id.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphNode {
    Null,
    Boolean(bool),
    Number(f64),
    String(String),
    Sequence(Vec<NodeId>),
    Mapping(Vec<(String, NodeId)>),
    Date(f64),
}

/// Arena of native nodes that may share children or form cycles.
#[derive(Debug, Clone, Default)]
pub struct NativeGraph {
    nodes: Vec<GraphNode>,
}

impl NativeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn add(&mut self, node: GraphNode) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    pub fn node(&self, id: NodeId) -> Option<&GraphNode> {
        self.nodes.get(id.index())
    }

    /// Append `child` to the sequence at `seq`. Returns `false` if `seq` is
    /// not a sequence or either id is unknown.
    pub fn push_item(&mut self, seq: NodeId, child: NodeId) -> bool {
        if child.index() >= self.nodes.len() {
            return false;
        }
        match self.nodes.get_mut(seq.index()) {
            Some(GraphNode::Sequence(items)) => {
                items.push(child);
                true
            }
            _ => false,
        }
    }

    /// Set `key` on the mapping at `map`, replacing an existing entry.
    /// Returns `false` if `map` is not a mapping or either id is unknown.
    pub fn insert_entry(&mut self, map: NodeId, key: impl Into<String>, child: NodeId) -> bool {
        if child.index() >= self.nodes.len() {
            return false;
        }
        let key = key.into();
        match self.nodes.get_mut(map.index()) {
            Some(GraphNode::Mapping(entries)) => {
                match entries.iter_mut().find(|(k, _)| *k == key) {
                    Some((_, slot)) => *slot = child,
                    None => entries.push((key, child)),
                }
                true
            }
            _ => false,
        }
    }

    /// Copy a tree into the graph, returning its root.
    pub fn insert_tree(&mut self, value: &NativeValue) -> NodeId {
        let node = match value {
            NativeValue::Null => GraphNode::Null,
            NativeValue::Boolean(b) => GraphNode::Boolean(*b),
            NativeValue::Number(n) => GraphNode::Number(*n),
            NativeValue::String(s) => GraphNode::String(s.clone()),
            NativeValue::Date(ms) => GraphNode::Date(*ms),
            NativeValue::Sequence(items) => {
                let children = items.iter().map(|item| self.insert_tree(item)).collect();
                GraphNode::Sequence(children)
            }
            NativeValue::Mapping(map) => {
                let children = map
                    .iter()
                    .map(|(k, v)| (k.to_owned(), self.insert_tree(v)))
                    .collect();
                GraphNode::Mapping(children)
            }
        };
        self.add(node)
    }

    /// Expand the graph below `root` into an owned tree. Shared nodes are
    /// copied; a node reachable from itself fails with
    /// [`ConvertError::CyclicNativeGraph`].
    pub fn to_tree(&self, root: NodeId) -> Result<NativeValue, ConvertError> {
        let mut path = HashSet::new();
        self.expand(root, &mut path)
    }

    fn expand(&self, id: NodeId, path: &mut HashSet<NodeId>) -> Result<NativeValue, ConvertError> {
        let node = self
            .node(id)
            .ok_or_else(|| ConvertError::UnsupportedShape(format!("dangling node {}", id.index())))?;
        let value = match node {
            GraphNode::Null => NativeValue::Null,
            GraphNode::Boolean(b) => NativeValue::Boolean(*b),
            GraphNode::Number(n) => NativeValue::Number(*n),
            GraphNode::String(s) => NativeValue::String(s.clone()),
            GraphNode::Date(ms) => NativeValue::Date(*ms),
            GraphNode::Sequence(children) => {
                enter(path, id)?;
                let items = children
                    .iter()
                    .map(|child| self.expand(*child, path))
                    .collect::<Result<Vec<_>, _>>()?;
                path.remove(&id);
                NativeValue::Sequence(items)
            }
            GraphNode::Mapping(children) => {
                enter(path, id)?;
                let mut map = NativeMap::with_capacity(children.len());
                for (key, child) in children {
                    map.insert(key.clone(), self.expand(*child, path)?);
                }
                path.remove(&id);
                NativeValue::Mapping(map)
            }
        };
        Ok(value)
    }
}

/// Mark `id` as being on the current path, failing if it already is.
pub(crate) fn enter(path: &mut HashSet<NodeId>, id: NodeId) -> Result<(), ConvertError> {
    if path.insert(id) {
        Ok(())
    } else {
        Err(ConvertError::CyclicNativeGraph)
    }
}
