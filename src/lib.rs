//! proxy-pool-manager - scoring proxy pool manager with concurrent
//! health checks and a REST API.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use proxy_pool_manager::config::AppConfig;
//! use proxy_pool_manager::pool::{Pool, PoolHandle};
//!
//! let config = AppConfig::load("config.yaml").unwrap();
//! let pool = Pool::new(config.fresh_entries());
//! let _ = pool.allocate();
//! ```

pub mod api;
pub mod argument;
pub mod config;
pub mod health;
pub mod pool;
pub mod proxy;
pub mod store;
pub mod utils;

pub use pool::Pool;
pub use proxy::ProxyEntry;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
