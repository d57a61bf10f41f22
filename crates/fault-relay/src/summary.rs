//! Safe summaries of arbitrary values for logging
//!
//! Props, state and request payloads are captured as dynamic [`Value`] trees
//! whose array and object nodes are shared handles, so a tree may contain
//! the same node twice or even point back at itself. [`summarize`] turns
//! such a tree into a small `serde_json::Value`:
//!
//! - arrays keep their length and a sample of the first elements
//! - objects keep their key count and the first few safe keys
//! - UI framework elements and DOM-like nodes are replaced by a tag
//! - a node that is already on the current path renders as `[Circular]`
//!
//! The function is total: every input produces a value that serializes.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::{json, Map, Number};

use crate::constants::{limits, markers};
use crate::fault::Fault;

/// Dynamic value captured from view state or request data
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    /// A callable, rendered by name only
    Function(Option<String>),
    Fault(Fault),
    Array(ArrayRef),
    Object(ObjectRef),
}

/// Shared, mutable array node
#[derive(Clone, Default)]
pub struct ArrayRef(Arc<RwLock<Vec<Value>>>);

/// Shared, mutable object node with insertion-ordered keys
#[derive(Clone, Default)]
pub struct ObjectRef(Arc<RwLock<Vec<(String, Value)>>>);

impl ArrayRef {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, value: impl Into<Value>) {
        self.0.write().push(value.into());
    }

    pub fn len(&self) -> usize {
        self.0.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.read().is_empty()
    }

    fn node_id(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }
}

impl ObjectRef {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a key, keeping the original position on replace
    pub fn insert(&self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        let mut entries = self.0.write();
        match entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.0
            .read()
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.read().iter().any(|(k, _)| k == key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.0.read().iter().map(|(k, _)| k.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.0.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.read().is_empty()
    }

    fn node_id(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }
}

impl Value {
    /// Build an object node from key/value pairs
    pub fn object<K, V, I>(entries: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        let node = ObjectRef::new();
        for (k, v) in entries {
            node.insert(k, v);
        }
        Value::Object(node)
    }

    /// Build an array node
    pub fn array<V, I>(items: I) -> Self
    where
        V: Into<Value>,
        I: IntoIterator<Item = V>,
    {
        let node = ArrayRef::new();
        for item in items {
            node.push(item);
        }
        Value::Array(node)
    }

    pub fn function(name: impl Into<String>) -> Self {
        Value::Function(Some(name.into()))
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(node) => Some(node),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => Value::array(items),
            serde_json::Value::Object(map) => Value::object(map),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n.into())
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n.into())
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Number(n.into())
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Value::Number(n.into())
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Fault> for Value {
    fn from(fault: Fault) -> Self {
        Value::Fault(fault)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

impl fmt::Debug for Value {
    // Debug goes through the summary so cyclic trees cannot recurse forever.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", summarize(self))
    }
}

/// How a value is rendered in a summary
///
/// Predicates are checked in declaration order; the first match wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryVariant {
    /// null, bool, number or string: passed through
    Primitive,
    /// `[Function: name]`
    Function,
    /// `{type, name, message, stack}` with the first stack line only
    Error,
    /// Array or object already on the current path
    Circular,
    /// `{type, length, sample}`
    Array,
    /// Object carrying UI framework internals (`$$typeof`, `_owner`, `props`)
    FrameworkElement,
    /// Object carrying a `nodeType` key
    DomNode,
    /// `{type, keyCount, ...safe keys}`
    Object,
}

const FRAMEWORK_KEYS: [&str; 4] = ["$$typeof", "$typeof", "_owner", "props"];

/// Classify a value given the ids of the nodes on the current path
pub fn classify(value: &Value, path: &[usize]) -> SummaryVariant {
    match value {
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => {
            SummaryVariant::Primitive
        }
        Value::Function(_) => SummaryVariant::Function,
        Value::Fault(_) => SummaryVariant::Error,
        Value::Array(node) if path.contains(&node.node_id()) => SummaryVariant::Circular,
        Value::Object(node) if path.contains(&node.node_id()) => SummaryVariant::Circular,
        Value::Array(_) => SummaryVariant::Array,
        Value::Object(node) => {
            if FRAMEWORK_KEYS.iter().any(|k| node.contains_key(k)) {
                SummaryVariant::FrameworkElement
            } else if node.contains_key("nodeType") {
                SummaryVariant::DomNode
            } else {
                SummaryVariant::Object
            }
        }
    }
}

/// Summarize a value into a bounded, serializable form
pub fn summarize(value: &Value) -> serde_json::Value {
    let mut path = Vec::new();
    summarize_at(value, &mut path)
}

fn summarize_at(value: &Value, path: &mut Vec<usize>) -> serde_json::Value {
    match (classify(value, path), value) {
        (SummaryVariant::Primitive, Value::Null) => serde_json::Value::Null,
        (SummaryVariant::Primitive, Value::Bool(b)) => json!(b),
        (SummaryVariant::Primitive, Value::Number(n)) => serde_json::Value::Number(n.clone()),
        (SummaryVariant::Primitive, Value::String(s)) => json!(s),
        (SummaryVariant::Function, Value::Function(name)) => json!(format!(
            "[Function: {}]",
            name.as_deref().filter(|n| !n.is_empty()).unwrap_or("anonymous")
        )),
        (SummaryVariant::Error, Value::Fault(fault)) => json!({
            "type": "Error",
            "name": fault.name(),
            "message": fault.message(),
            "stack": fault.first_stack_line(),
        }),
        (SummaryVariant::Circular, _) => json!(markers::CIRCULAR),
        (SummaryVariant::Array, Value::Array(node)) => {
            let (length, items): (usize, Vec<Value>) = {
                let guard = node.0.read();
                (guard.len(), guard.iter().take(limits::ARRAY_SAMPLE).cloned().collect())
            };
            path.push(node.node_id());
            let sample: Vec<serde_json::Value> =
                items.iter().map(|item| summarize_at(item, path)).collect();
            path.pop();
            json!({ "type": "Array", "length": length, "sample": sample })
        }
        (SummaryVariant::FrameworkElement, _) => json!(markers::FRAMEWORK_ELEMENT),
        (SummaryVariant::DomNode, Value::Object(node)) => {
            let node_name = node
                .get("nodeName")
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_else(|| markers::UNKNOWN.to_string());
            json!(format!("[DOM Node: {}]", node_name))
        }
        (SummaryVariant::Object, Value::Object(node)) => summarize_object(node, path),
        // classify() only returns variants that match the value's shape
        _ => serde_json::Value::Null,
    }
}

fn summarize_object(node: &ObjectRef, path: &mut Vec<usize>) -> serde_json::Value {
    let (key_count, safe): (usize, Vec<(String, Value)>) = {
        let guard = node.0.read();
        let safe = guard
            .iter()
            .filter(|(k, _)| is_safe_key(k))
            .take(limits::OBJECT_KEYS)
            .cloned()
            .collect();
        (guard.len(), safe)
    };

    let mut summary = Map::new();
    summary.insert("type".into(), json!("Object"));
    summary.insert("keyCount".into(), json!(key_count));

    path.push(node.node_id());
    for (key, value) in &safe {
        summary.insert(key.clone(), summarize_at(value, path));
    }
    path.pop();

    if key_count > limits::OBJECT_KEYS {
        summary.insert(
            "...".into(),
            json!(format!("[{} more keys]", key_count - limits::OBJECT_KEYS)),
        );
    }
    serde_json::Value::Object(summary)
}

fn is_safe_key(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    !key.starts_with('_') && !lower.contains("react") && !lower.contains("fiber")
}
