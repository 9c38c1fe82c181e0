pub mod compose;
pub mod runner;
pub mod types;

pub use types::{AgentDescriptor, HelperKind};
