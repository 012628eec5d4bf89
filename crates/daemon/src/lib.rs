// atelier-daemon library entry point.

pub mod config;
pub mod events;
pub mod http;
pub mod ops;
pub mod runtime;
pub mod store;
pub mod workspace;
