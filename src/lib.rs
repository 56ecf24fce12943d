//! matchlite: parses BSON query documents into typed, executable
//! match-expression trees, enforcing the query grammar and rejecting
//! semantically illegal operator combinations.
//!
//! The parser is pure: it owns no state beyond three extension slots
//! (geo, text, where) installed at construction time, and every parse
//! returns either an owned [`MatchExpression`] tree or the first error
//! in document order.

mod errors;
pub mod matcher;

pub use errors::{ErrorCode, ParseError};
pub use matcher::{MatchExpression, MatchExpressionParser, parse};
