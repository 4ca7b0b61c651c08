pub mod api;
pub mod cache;
pub mod cache_keys;
pub mod calc;
pub mod config;
pub mod debounce;
pub mod domain;
pub mod filter;
pub mod ipc;
pub mod query;
