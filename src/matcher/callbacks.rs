//! Extension slots for the operators the core does not parse itself.
//!
//! Geo blocks, `$text` and `$where` are handed to host-installed
//! parsers; the defaults fail so that a bare parser rejects queries it
//! cannot represent instead of silently dropping them.

use bson::{Bson, Document};

use crate::errors::ParseError;

use super::types::MatchExpression;

/// Parses a whole geo operator sub-document. Receives the field path,
/// the operator name that triggered the dispatch (`$near`, `$within`,
/// ...) and the complete sub-document.
pub type GeoParser =
    Box<dyn Fn(&str, &str, &Document) -> Result<MatchExpression, ParseError> + Send + Sync>;

/// Parses the argument object of a top-level `$text`.
pub type TextParser = Box<dyn Fn(&Document) -> Result<MatchExpression, ParseError> + Send + Sync>;

/// Parses a raw top-level `$where` element (name and value).
pub type WhereParser =
    Box<dyn Fn(&str, &Bson) -> Result<MatchExpression, ParseError> + Send + Sync>;

pub(crate) fn default_geo_parser() -> GeoParser {
    Box::new(|_path, _operator, _predicate| {
        Err(ParseError::BadValue("geo not linked in".to_string()))
    })
}

pub(crate) fn default_text_parser() -> TextParser {
    Box::new(|_query| Err(ParseError::BadValue("$text not linked in".to_string())))
}

pub(crate) fn default_where_parser() -> WhereParser {
    Box::new(|_name, _value| {
        Err(ParseError::NoWhereParseContext(
            "no context for parsing $where".to_string(),
        ))
    })
}
