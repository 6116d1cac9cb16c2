mod loader;
mod types;

pub use loader::ConfigLoader;
pub use types::{K6HubConfig, MEMORY_DATABASE};
