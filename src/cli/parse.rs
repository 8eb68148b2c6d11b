//! Parse a term and print its canonical form

use super::CliError;
use crate::parser;

/// Options for the parse command
#[derive(Debug, Clone, Default)]
pub struct ParseOptions {
    /// The term to parse
    pub term: String,
    /// Print the parsed structure instead of the canonical text
    pub tree: bool,
}

/// Execute a termql parse operation
pub fn execute_parse(options: &ParseOptions) -> Result<String, CliError> {
    let term = parser::parse(&options.term)?;
    if options.tree {
        Ok(format!("{:#?}", term))
    } else {
        Ok(term.to_string())
    }
}
