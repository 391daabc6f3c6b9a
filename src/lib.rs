//! Sirius Language Compiler Front-End
//!
//! The pipeline is strictly sequential: the lexer turns source text into a
//! token list, the parser builds a syntax tree, the semantic analyzer
//! validates it (accumulating every error instead of stopping at the first),
//! and — only when analysis reported no errors — the TAC generator lowers
//! the tree to three-address code. The optimization advisor is a read-only
//! pass over the rendered TAC lines.
//!
//! Each stage owns no state across invocations; analyzing a second source
//! file means constructing a fresh analyzer and generator.

pub mod frontend;
pub mod middle;

pub use frontend::{SourceFile, SourceFileOrigin};
