//! Lua 5.3/5.4 parsing: lexer, positioned AST, and recursive-descent
//! parser with semantic validation.

pub mod ast;
pub mod lexer;
#[allow(clippy::module_inception)]
pub mod parser;

pub use ast::{Block, Chunk, Comment, CommentKind, Expr, Span, Stat};
pub use parser::{parse, parse_with_options, ParseOptions};
