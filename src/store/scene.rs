use anyhow::anyhow;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::model::{NodeRef, Scene, SceneNode};

/// Serialized form of a host scene, as sent by a host-side exporter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_file: Option<String>,
    pub nodes: Vec<NodeSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub referenced: bool,
    #[serde(default)]
    pub intermediate: bool,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    /// Member node names, for set-like nodes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<String>,
    /// Name of the node this one was derived from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history: Option<String>,
}

impl NodeSnapshot {
    pub fn new(name: &str, node_type: &str) -> Self {
        Self {
            name: name.to_string(),
            node_type: node_type.to_string(),
            referenced: false,
            intermediate: false,
            attributes: BTreeMap::new(),
            members: Vec::new(),
            history: None,
        }
    }

    pub fn attr(mut self, key: &str, value: &str) -> Self {
        self.attributes.insert(key.to_string(), value.to_string());
        self
    }

    pub fn referenced(mut self) -> Self {
        self.referenced = true;
        self
    }

    pub fn intermediate(mut self) -> Self {
        self.intermediate = true;
        self
    }

    pub fn members(mut self, members: &[&str]) -> Self {
        self.members = members.iter().map(|m| m.to_string()).collect();
        self
    }

    pub fn history(mut self, source: &str) -> Self {
        self.history = Some(source.to_string());
        self
    }
}

/// A single attribute write performed on the scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeWrite {
    pub node: String,
    pub key: String,
    pub value: String,
}

type WriteLog = Arc<RwLock<Vec<AttributeWrite>>>;

#[derive(Debug)]
pub struct MemoryNode {
    name: String,
    node_type: String,
    referenced: bool,
    intermediate: bool,
    attributes: RwLock<BTreeMap<String, String>>,
    writes: WriteLog,
}

impl SceneNode for MemoryNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn node_type(&self) -> &str {
        &self.node_type
    }

    fn is_externally_referenced(&self) -> bool {
        self.referenced
    }

    fn is_intermediate(&self) -> bool {
        self.intermediate
    }

    fn get_attribute(&self, key: &str) -> Option<String> {
        self.attributes.read().get(key).cloned()
    }

    fn set_attribute(&self, key: &str, value: &str) -> anyhow::Result<()> {
        if self.referenced {
            return Err(anyhow!("'{}' is a referenced node and read-only", self.name));
        }
        self.attributes
            .write()
            .insert(key.to_string(), value.to_string());
        self.writes.write().push(AttributeWrite {
            node: self.name.clone(),
            key: key.to_string(),
            value: value.to_string(),
        });
        Ok(())
    }
}

/// In-memory scene built from a [`SceneSnapshot`]. Records every attribute
/// write and the last selection so headless drivers can report them.
#[derive(Debug, Default)]
pub struct MemoryScene {
    nodes: Vec<Arc<MemoryNode>>,
    by_name: HashMap<String, usize>,
    members: HashMap<String, Vec<String>>,
    history: HashMap<String, String>,
    current_file: Option<String>,
    writes: WriteLog,
    selection: RwLock<Vec<String>>,
}

impl MemoryScene {
    pub fn from_snapshot(snapshot: SceneSnapshot) -> Self {
        let writes: WriteLog = Arc::new(RwLock::new(Vec::new()));
        let mut scene = MemoryScene {
            current_file: snapshot.current_file,
            writes: writes.clone(),
            ..Default::default()
        };

        for node in snapshot.nodes {
            if !node.members.is_empty() {
                scene.members.insert(node.name.clone(), node.members);
            }
            if let Some(source) = node.history {
                scene.history.insert(node.name.clone(), source);
            }
            scene.by_name.insert(node.name.clone(), scene.nodes.len());
            scene.nodes.push(Arc::new(MemoryNode {
                name: node.name,
                node_type: node.node_type,
                referenced: node.referenced,
                intermediate: node.intermediate,
                attributes: RwLock::new(node.attributes),
                writes: writes.clone(),
            }));
        }

        scene
    }

    /// Current state of the scene, including any writes.
    pub fn snapshot(&self) -> SceneSnapshot {
        let nodes = self
            .nodes
            .iter()
            .map(|node| NodeSnapshot {
                name: node.name.clone(),
                node_type: node.node_type.clone(),
                referenced: node.referenced,
                intermediate: node.intermediate,
                attributes: node.attributes.read().clone(),
                members: self.members.get(&node.name).cloned().unwrap_or_default(),
                history: self.history.get(&node.name).cloned(),
            })
            .collect();

        SceneSnapshot {
            current_file: self.current_file.clone(),
            nodes,
        }
    }

    pub fn writes(&self) -> Vec<AttributeWrite> {
        self.writes.read().clone()
    }

    pub fn selection(&self) -> Vec<String> {
        self.selection.read().clone()
    }

    fn node_ref(&self, name: &str) -> Option<NodeRef> {
        self.by_name
            .get(name)
            .map(|&index| self.nodes[index].clone() as NodeRef)
    }
}

impl Scene for MemoryScene {
    fn nodes(&self) -> Vec<NodeRef> {
        self.nodes.iter().map(|n| n.clone() as NodeRef).collect()
    }

    fn get_node(&self, name: &str) -> Option<NodeRef> {
        self.node_ref(name)
    }

    fn members(&self, node: &NodeRef) -> Vec<NodeRef> {
        self.members
            .get(node.name())
            .map(|names| names.iter().filter_map(|n| self.node_ref(n)).collect())
            .unwrap_or_default()
    }

    fn history_sibling(&self, node: &NodeRef) -> Option<NodeRef> {
        self.history
            .get(node.name())
            .and_then(|source| self.node_ref(source))
    }

    fn select(&self, names: &[String]) {
        *self.selection.write() = names.to_vec();
    }

    fn current_file(&self) -> Option<String> {
        self.current_file.clone()
    }
}
