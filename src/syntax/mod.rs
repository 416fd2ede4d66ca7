//! Source-language front-end: spans, tokens, lexer and parser.

pub mod lexeme;
pub mod lexer;
pub mod parser;
pub mod span;
