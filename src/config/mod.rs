pub mod config;

pub use config::{ClientConfig, Config, PaxosConfig};
