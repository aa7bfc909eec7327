pub mod identity;
pub mod pipeline;
pub mod plugin;
pub mod plugins;
pub mod repair;
pub mod required;
pub mod rules;

pub use identity::*;
pub use pipeline::*;
pub use plugin::*;
pub use plugins::*;
pub use required::*;
pub use rules::*;
