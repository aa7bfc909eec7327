use std::collections::HashSet;

use crate::config::IdentityConfig;
use crate::model::{Instance, NodeRef};

/// Decides which instance members must carry an identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequiredNodeSelector {
    types: Vec<String>,
}

impl RequiredNodeSelector {
    pub fn new<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            types: types.into_iter().map(Into::into).collect(),
        }
    }

    pub fn from_config(config: &IdentityConfig) -> Self {
        Self::new(config.id_required_types.iter().cloned())
    }

    pub fn is_required(&self, node: &NodeRef, include_referenced: bool) -> bool {
        if node.is_intermediate() {
            return false;
        }
        if !include_referenced && node.is_externally_referenced() {
            return false;
        }
        self.types.iter().any(|t| t == node.node_type())
    }

    /// Identity-bearing members of the instance, each node at most once, in
    /// member order. Referenced nodes are left out unless asked for.
    pub fn get_id_required_nodes(
        &self,
        instance: &Instance,
        include_referenced: bool,
    ) -> Vec<NodeRef> {
        self.required_among(instance, include_referenced)
    }

    /// Same filter over an arbitrary node list.
    pub fn required_among<'a, I>(&self, nodes: I, include_referenced: bool) -> Vec<NodeRef>
    where
        I: IntoIterator<Item = &'a NodeRef>,
    {
        let mut seen = HashSet::new();
        nodes
            .into_iter()
            .filter(|node| self.is_required(node, include_referenced))
            .filter(|node| seen.insert(node.name().to_string()))
            .cloned()
            .collect()
    }
}

impl Default for RequiredNodeSelector {
    fn default() -> Self {
        Self::from_config(&IdentityConfig::default())
    }
}
