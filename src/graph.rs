//! Structured configuration / result graph
//!
//! A tree of named payloads and child subtrees over `serde_json::Value`.
//! Paths are given as slices of names from the root. Any serde-compatible
//! type can be stored or read back, and the whole graph (de)serializes to
//! JSON without the engine knowing about file formats.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{MixtError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParamGraph {
    root: Value,
}

impl Default for ParamGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl ParamGraph {
    pub fn new() -> Self {
        Self {
            root: Value::Object(Map::new()),
        }
    }

    pub fn from_value(root: Value) -> Self {
        Self { root }
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        Ok(Self {
            root: serde_json::from_str(s)?,
        })
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.root)?)
    }

    pub fn value(&self) -> &Value {
        &self.root
    }

    pub fn into_value(self) -> Value {
        self.root
    }

    fn node(&self, path: &[&str]) -> Option<&Value> {
        path.iter().try_fold(&self.root, |node, name| node.get(*name))
    }

    /// Walks `path`, creating intermediate objects as needed
    fn node_mut(&mut self, path: &[&str]) -> Result<&mut Map<String, Value>> {
        let mut node = &mut self.root;
        for (depth, name) in path.iter().enumerate() {
            let map = node
                .as_object_mut()
                .ok_or_else(|| MixtError::Data(format!("{} is not a subtree", path[..depth].join("/"))))?;
            node = map
                .entry(name.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
        }
        node.as_object_mut()
            .ok_or_else(|| MixtError::Data(format!("{} is not a subtree", path.join("/"))))
    }

    pub fn exists(&self, path: &[&str]) -> bool {
        self.node(path).is_some()
    }

    pub fn exists_payload(&self, path: &[&str], name: &str) -> bool {
        self.node(path).and_then(|n| n.get(name)).is_some()
    }

    /// Reads and deserializes the payload `name` under `path`
    pub fn get_payload<T: DeserializeOwned>(&self, path: &[&str], name: &str) -> Result<T> {
        let value = self
            .node(path)
            .and_then(|n| n.get(name))
            .ok_or_else(|| MixtError::MissingPayload {
                path: path.join("/"),
                name: name.to_string(),
            })?;
        Ok(serde_json::from_value(value.clone())?)
    }

    /// Same as [`get_payload`](Self::get_payload), with a default for absent payloads
    pub fn get_payload_or<T: DeserializeOwned>(&self, path: &[&str], name: &str, default: T) -> Result<T> {
        if self.exists_payload(path, name) {
            self.get_payload(path, name)
        } else {
            Ok(default)
        }
    }

    /// Serializes `value` as the payload `name` under `path`
    pub fn add_payload<T: Serialize>(&mut self, path: &[&str], name: &str, value: T) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.node_mut(path)?.insert(name.to_string(), value);
        Ok(())
    }

    pub fn add_child(&mut self, path: &[&str], name: &str, child: ParamGraph) -> Result<()> {
        self.node_mut(path)?.insert(name.to_string(), child.root);
        Ok(())
    }

    pub fn get_child(&self, path: &[&str]) -> Result<ParamGraph> {
        self.node(path)
            .cloned()
            .map(ParamGraph::from_value)
            .ok_or_else(|| MixtError::MissingPayload {
                path: path[..path.len().saturating_sub(1)].join("/"),
                name: path.last().map(|s| s.to_string()).unwrap_or_default(),
            })
    }

    /// Names of the entries directly under `path`
    pub fn names(&self, path: &[&str]) -> Vec<String> {
        self.node(path)
            .and_then(|n| n.as_object())
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default()
    }
}
