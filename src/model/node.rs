use itertools::Itertools;
use std::fmt;
use std::sync::Arc;

/// Minimal capability a host scene node must expose to take part in
/// identity tracking. Each host provides its own adapter.
pub trait SceneNode: Send + Sync + fmt::Debug {
    /// Unique, human-readable node name (full path where the host has one).
    fn name(&self) -> &str;

    /// Host node type, e.g. `mesh`, `transform`, `nurbsCurve`.
    fn node_type(&self) -> &str;

    /// Whether the node comes from an externally referenced (read-only) file.
    fn is_externally_referenced(&self) -> bool;

    /// Intermediate shapes are construction history and never published.
    fn is_intermediate(&self) -> bool {
        false
    }

    fn get_attribute(&self, key: &str) -> Option<String>;

    fn set_attribute(&self, key: &str, value: &str) -> anyhow::Result<()>;
}

pub type NodeRef = Arc<dyn SceneNode>;

/// Host scene surface used by collectors and actions.
pub trait Scene: Send + Sync {
    fn nodes(&self) -> Vec<NodeRef>;

    fn get_node(&self, name: &str) -> Option<NodeRef>;

    /// Members of a set-like node (instance markers).
    fn members(&self, node: &NodeRef) -> Vec<NodeRef>;

    /// The node this one was derived from in construction history, if any.
    /// Deformed shapes on referenced meshes get a fresh shape node whose id
    /// should match its source.
    fn history_sibling(&self, _node: &NodeRef) -> Option<NodeRef> {
        None
    }

    /// Select nodes for inspection. Headless scenes may ignore this.
    fn select(&self, _names: &[String]) {}

    fn current_file(&self) -> Option<String> {
        None
    }
}

/// Sorted, de-duplicated node names, for deterministic reports.
pub fn sorted_names<'a, I>(nodes: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a NodeRef>,
{
    nodes
        .into_iter()
        .map(|node| node.name().to_string())
        .sorted()
        .dedup()
        .collect()
}

/// Markdown bullet list of node names.
pub fn bullet_list(names: &[String]) -> String {
    names.iter().map(|name| format!("- {}", name)).join("\n")
}
