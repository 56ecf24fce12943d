// Submodules for separation of concerns
mod callbacks;
mod parse;
mod types;

// Public API re-exports
pub use callbacks::{GeoParser, TextParser, WhereParser};
pub use parse::{MatchExpressionParser, parse};
pub use types::{
    ComparisonOp, GeoExpression, InListEntries, MatchExpression, MatchType, TextExpression,
    WhereExpression,
};
