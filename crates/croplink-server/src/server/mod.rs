pub mod config;
pub mod history;
pub mod http;
pub mod pool;
pub mod render;
pub mod service;
pub mod store;
pub mod telemetry;
