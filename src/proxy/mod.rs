pub mod entry;

pub use entry::{ProxyEntry, ProxySnapshot, ProxyStats};
