pub mod registry;
pub mod sanitize;

pub use registry::{Locality, ModelRegistry, ResolvedModel};
pub use sanitize::sanitize;
