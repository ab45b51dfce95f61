//! Configuration parsing for niri-bar
//!
//! This crate handles parsing the KDL configuration file shared by the
//! `niri-bard` daemon and the `niri-bar` CLI.

mod error;
mod model;
mod parser;

pub use error::ConfigError;
pub use model::*;
pub use parser::{parse_config, parse_config_str};
