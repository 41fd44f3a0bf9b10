//! Ahoy recursive descent parser

mod parser;

pub use parser::{parse, parse_lint, Parser};
