pub mod cache;
pub mod client;
pub mod concurrency;
pub mod config;
pub mod error;
pub mod objects;
pub mod pipeline;
pub mod stream;
pub mod types;
pub mod watchers;
pub mod workers;
