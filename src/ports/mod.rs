//! Port traits: the engine's view of storage and configuration.

pub mod bar_port;
pub mod catalog_port;
pub mod config_port;
pub mod definition_port;
pub mod storage_port;
