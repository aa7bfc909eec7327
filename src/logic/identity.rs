use log::debug;

use crate::error::PublishError;
use crate::model::{SceneNode, DEFAULT_ID_ATTRIBUTE};

/// Reads and writes the identity attribute on scene nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityStore {
    attribute: String,
}

impl Default for IdentityStore {
    fn default() -> Self {
        Self::new(DEFAULT_ID_ATTRIBUTE)
    }
}

impl IdentityStore {
    pub fn new(attribute: &str) -> Self {
        Self {
            attribute: attribute.to_string(),
        }
    }

    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    /// The node's identity, or `None` when the attribute is absent or empty.
    pub fn get_id(&self, node: &dyn SceneNode) -> Option<String> {
        node.get_attribute(&self.attribute)
            .filter(|value| !value.is_empty())
    }

    /// Write an identity. Without `overwrite` an existing identity is kept
    /// and nothing is written. Returns whether a write happened.
    pub fn set_id(
        &self,
        node: &dyn SceneNode,
        id_value: &str,
        overwrite: bool,
    ) -> Result<bool, PublishError> {
        if !overwrite && self.get_id(node).is_some() {
            debug!("Keeping existing id on '{}'", node.name());
            return Ok(false);
        }

        node.set_attribute(&self.attribute, id_value)
            .map_err(|source| PublishError::Scene {
                node: node.name().to_string(),
                source,
            })?;
        Ok(true)
    }
}
