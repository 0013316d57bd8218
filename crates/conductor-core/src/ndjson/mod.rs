//! NDJSON delta parser for recorded or piped model streams.
//!
//! This module parses newline-delimited JSON chunks from a model provider
//! into provider-neutral [`Delta`] values, implementing a tolerant reader
//! pattern.

mod parser;
mod types;

pub use parser::{parse_line, parse_str, parse_value};
pub use types::*;
