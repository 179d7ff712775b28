//! Data models for extracted proformas and configuration.

pub mod config;
pub mod stock;

pub use config::{ProformaConfig, ServerConfig};
pub use stock::{ExtractResult, Metadata, StockItem};
