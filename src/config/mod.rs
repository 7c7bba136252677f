pub mod loader;

pub use loader::{merge_config_and_store, AppConfig};
