pub mod asset;
pub mod common;
pub mod context;
pub mod instance;
pub mod node;
pub mod outcome;

pub use asset::*;
pub use common::*;
pub use context::*;
pub use instance::*;
pub use node::*;
pub use outcome::*;
