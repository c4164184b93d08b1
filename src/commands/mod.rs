//! Interactive front end helpers
//!
//! Parsing of typed command lines and text rendering of session events for
//! the `remotedeck` binary.

pub mod parse;
pub mod render;

pub use parse::{parse_line, split_args, Command, ParseError, HELP};
pub use render::{render_envelope, render_event};
