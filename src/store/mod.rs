pub mod memory;
pub mod postgres;
pub mod scene;
pub mod traits;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;
pub use scene::{AttributeWrite, MemoryScene, NodeSnapshot, SceneSnapshot};
pub use traits::*;
