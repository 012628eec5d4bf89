// atelier-common: shared types and utilities for the Atelier workspace engine.

pub mod error;
pub mod path;
pub mod slug;
pub mod types;
