mod registry;
mod selectors;

pub use registry::{ModelRegistry, ModelRole, ModelSpec};
pub use selectors::{ImageRoute, ModelSelector, SelectionError};
