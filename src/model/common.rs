use uuid::Uuid;

pub type Id = String;

/// Default attribute name holding a node's stable identity.
pub const DEFAULT_ID_ATTRIBUTE: &str = "cbId";

/// Generate a new node identity scoped to an asset: `{asset_id}:{suffix}`.
///
/// The suffix is a v4 UUID, so two calls never share a suffix in practice,
/// even for the same asset.
pub fn generate_id(asset_id: &str) -> Id {
    format!("{}:{}", asset_id, Uuid::new_v4())
}

/// Split a node identity on its first colon. Suffixes may themselves contain
/// colons; the asset part never does.
pub fn split_id(cb_id: &str) -> (&str, Option<&str>) {
    match cb_id.split_once(':') {
        Some((asset_id, suffix)) => (asset_id, Some(suffix)),
        None => (cb_id, None),
    }
}

/// Asset part of a node identity.
pub fn asset_id_of(cb_id: &str) -> &str {
    split_id(cb_id).0
}
