use bson::{Bson, Document};

use crate::errors::ParseError;

use super::callbacks::{
    GeoParser, TextParser, WhereParser, default_geo_parser, default_text_parser,
    default_where_parser,
};
use super::types::{
    ComparisonOp, InListEntries, MAX_TREE_DEPTH, MatchExpression, MatchType,
};

/// Parse a query document with the default (unlinked) extension parsers.
///
/// # Errors
/// Returns an error for any grammatical or semantic violation; the first
/// failure in document order aborts the parse.
pub fn parse(query: &Document) -> Result<MatchExpression, ParseError> {
    MatchExpressionParser::new().parse(query)
}

/// Translates a query document into an owned [`MatchExpression`] tree.
///
/// The parser holds no state beyond its three extension slots, which are
/// installed once and read-only afterwards; every parse is a pure,
/// CPU-bound pass over the input.
pub struct MatchExpressionParser {
    geo_parser: GeoParser,
    text_parser: TextParser,
    where_parser: WhereParser,
}

impl Default for MatchExpressionParser {
    fn default() -> Self {
        Self::new()
    }
}

impl MatchExpressionParser {
    #[must_use]
    pub fn new() -> Self {
        Self {
            geo_parser: default_geo_parser(),
            text_parser: default_text_parser(),
            where_parser: default_where_parser(),
        }
    }

    pub fn set_geo_parser(&mut self, parser: GeoParser) {
        self.geo_parser = parser;
    }

    pub fn set_text_parser(&mut self, parser: TextParser) {
        self.text_parser = parser;
    }

    pub fn set_where_parser(&mut self, parser: WhereParser) {
        self.where_parser = parser;
    }

    /// Parse a full query document.
    ///
    /// # Errors
    /// Returns an error for any grammatical or semantic violation; the
    /// first failure in document order aborts the parse.
    pub fn parse(&self, query: &Document) -> Result<MatchExpression, ParseError> {
        log::trace!("parsing query predicate, {} top-level fields", query.len());
        self.parse_document(query, 0)
    }

    fn parse_document(
        &self,
        obj: &Document,
        level: usize,
    ) -> Result<MatchExpression, ParseError> {
        if level > MAX_TREE_DEPTH {
            return Err(depth_error());
        }
        let top_level = level == 0;
        let level = level + 1;

        let mut root: Vec<MatchExpression> = Vec::new();
        for (name, value) in obj {
            if let Some(rest) = name.strip_prefix('$') {
                match rest {
                    "or" => {
                        root.push(MatchExpression::Or(self.parse_tree_list(name, value, level)?));
                    }
                    "and" => {
                        root.push(MatchExpression::And(self.parse_tree_list(name, value, level)?));
                    }
                    "nor" => {
                        root.push(MatchExpression::Nor(self.parse_tree_list(name, value, level)?));
                    }
                    "atomic" | "isolated" => {
                        if !top_level {
                            return Err(ParseError::BadValue(
                                "$atomic/$isolated has to be at the top level".to_string(),
                            ));
                        }
                        if is_truthy(value) {
                            root.push(MatchExpression::Atomic);
                        }
                    }
                    "where" => root.push((self.where_parser)(name, value)?),
                    "text" => {
                        let Bson::Document(query) = value else {
                            return Err(ParseError::BadValue("$text expects an object".to_string()));
                        };
                        root.push((self.text_parser)(query)?);
                    }
                    "comment" => {}
                    // DBRef fields are plain equalities at the top level.
                    "ref" | "id" | "db" => root.push(MatchExpression::Comparison {
                        op: ComparisonOp::Eq,
                        path: name.clone(),
                        value: value.clone(),
                    }),
                    _ => {
                        return Err(ParseError::BadValue(format!(
                            "unknown top level operator: {name}"
                        )));
                    }
                }
                continue;
            }

            if let Bson::Document(sub) = value
                && is_expression_document(value, false)
            {
                self.parse_sub(name, sub, &mut root, level)?;
                continue;
            }

            if let Bson::RegularExpression(re) = value {
                root.push(MatchExpression::Regex {
                    path: name.clone(),
                    pattern: re.pattern.clone(),
                    options: re.options.clone(),
                });
                continue;
            }

            root.push(MatchExpression::Comparison {
                op: ComparisonOp::Eq,
                path: name.clone(),
                value: value.clone(),
            });
        }

        // A tree with exactly one child is unwrapped.
        if root.len() == 1 {
            return Ok(root.swap_remove(0));
        }
        Ok(MatchExpression::And(root))
    }

    fn parse_tree_list(
        &self,
        op: &str,
        value: &Bson,
        level: usize,
    ) -> Result<Vec<MatchExpression>, ParseError> {
        let Bson::Array(items) = value else {
            return Err(ParseError::BadValue(format!("{op} needs an array")));
        };
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            let Bson::Document(entry) = item else {
                return Err(ParseError::BadValue(
                    "$or/$and/$nor entries need to be full objects".to_string(),
                ));
            };
            out.push(self.parse_document(entry, level)?);
        }
        Ok(out)
    }

    fn parse_sub(
        &self,
        path: &str,
        sub: &Document,
        root: &mut Vec<MatchExpression>,
        level: usize,
    ) -> Result<(), ParseError> {
        if level > MAX_TREE_DEPTH {
            return Err(depth_error());
        }
        let level = level + 1;

        // Geo blocks mix named siblings ($maxDistance has no meaning
        // without its $near), so the whole sub-document is committed to
        // the geo parser based on the first element alone.
        if let Some((name, value)) = sub.iter().next()
            && matches!(value, Bson::Document(_) | Bson::Array(_))
            && is_geo_operator(name)
        {
            log::debug!("routing {name} over field '{path}' to the geo parser");
            root.push((self.geo_parser)(path, name, sub)?);
            return Ok(());
        }

        for (name, value) in sub {
            // $options legally parses to nothing; its $regex sibling
            // produces the node.
            if let Some(node) = self.parse_sub_field(sub, path, name, value, level)? {
                root.push(node);
            }
        }
        Ok(())
    }

    fn parse_sub_field(
        &self,
        context: &Document,
        path: &str,
        name: &str,
        value: &Bson,
        level: usize,
    ) -> Result<Option<MatchExpression>, ParseError> {
        match name {
            "$eq" => parse_comparison(ComparisonOp::Eq, path, value).map(Some),
            "$lt" => parse_comparison(ComparisonOp::Lt, path, value).map(Some),
            "$lte" => parse_comparison(ComparisonOp::Lte, path, value).map(Some),
            "$gt" => parse_comparison(ComparisonOp::Gt, path, value).map(Some),
            "$gte" => parse_comparison(ComparisonOp::Gte, path, value).map(Some),
            "$ne" => {
                // $ne can be rewritten as a negated equality, but that
                // does not make $ne of a regex legal.
                if matches!(value, Bson::RegularExpression(_)) {
                    return Err(ParseError::BadValue(
                        "can't have a regex as arg to $ne".to_string(),
                    ));
                }
                let eq = parse_comparison(ComparisonOp::Eq, path, value)?;
                Ok(Some(MatchExpression::Not(Box::new(eq))))
            }
            "$in" => {
                let Bson::Array(items) = value else {
                    return Err(ParseError::BadValue("$in needs an array".to_string()));
                };
                Ok(Some(MatchExpression::In {
                    path: path.to_string(),
                    entries: parse_in_list(items)?,
                }))
            }
            "$nin" => {
                let Bson::Array(items) = value else {
                    return Err(ParseError::BadValue("$nin needs an array".to_string()));
                };
                let in_expr = MatchExpression::In {
                    path: path.to_string(),
                    entries: parse_in_list(items)?,
                };
                Ok(Some(MatchExpression::Not(Box::new(in_expr))))
            }
            "$size" => Ok(Some(MatchExpression::Size {
                path: path.to_string(),
                size: parse_size_value(value)?,
            })),
            "$exists" => {
                let exists = MatchExpression::Exists {
                    path: path.to_string(),
                };
                if is_truthy(value) {
                    Ok(Some(exists))
                } else {
                    Ok(Some(MatchExpression::Not(Box::new(exists))))
                }
            }
            "$type" => parse_type(path, value).map(Some),
            "$mod" => parse_mod(path, value).map(Some),
            "$options" => {
                // $options may come before or after its $regex, so the
                // sibling scan covers the whole sub-document.
                if context.keys().any(|k| k == "$regex") {
                    Ok(None)
                } else {
                    Err(ParseError::BadValue("$options needs a $regex".to_string()))
                }
            }
            "$regex" => parse_regex_document(path, context).map(Some),
            "$not" => self.parse_not(path, value, level).map(Some),
            "$elemMatch" => self.parse_elem_match(path, value, level).map(Some),
            "$all" => self.parse_all(path, value, level).map(Some),
            "$within" | "$geoIntersects" => {
                log::debug!("routing {name} over field '{path}' to the geo parser");
                (self.geo_parser)(path, name, context).map(Some)
            }
            // $where works on top-level documents only.
            "$where" => Err(ParseError::BadValue(
                "$where cannot be applied to a field".to_string(),
            )),
            _ if name.starts_with('$') => {
                Err(ParseError::BadValue(format!("unknown operator: {name}")))
            }
            // Implicit equality: a non-$ key inside an expression
            // sub-document constrains the outer field with its value.
            _ => parse_comparison(ComparisonOp::Eq, path, value).map(Some),
        }
    }

    fn parse_not(
        &self,
        path: &str,
        value: &Bson,
        level: usize,
    ) -> Result<MatchExpression, ParseError> {
        match value {
            Bson::RegularExpression(re) => {
                Ok(MatchExpression::Not(Box::new(MatchExpression::Regex {
                    path: path.to_string(),
                    pattern: re.pattern.clone(),
                    options: re.options.clone(),
                })))
            }
            Bson::Document(obj) => {
                if obj.is_empty() {
                    return Err(ParseError::BadValue("$not cannot be empty".to_string()));
                }
                let mut children = Vec::new();
                self.parse_sub(path, obj, &mut children, level)?;
                if children.len() == 1 {
                    return Ok(MatchExpression::Not(Box::new(children.swap_remove(0))));
                }
                Ok(MatchExpression::Not(Box::new(MatchExpression::And(
                    children,
                ))))
            }
            _ => Err(ParseError::BadValue(
                "$not needs a regex or a document".to_string(),
            )),
        }
    }

    fn parse_elem_match(
        &self,
        path: &str,
        value: &Bson,
        level: usize,
    ) -> Result<MatchExpression, ParseError> {
        let Bson::Document(obj) = value else {
            return Err(ParseError::BadValue("$elemMatch needs an Object".to_string()));
        };

        // Value form applies when every child constrains the array
        // element itself: the argument is an expression document whose
        // first operator is not a logical connective (their children
        // carry field names) and not $where (which works on documents).
        // DBRef sub-documents take the object form even here, since they
        // may carry non-DBRef fields alongside $ref/$id/$db.
        let is_value_form = is_expression_document(value, true)
            && obj
                .iter()
                .next()
                .is_some_and(|(k, _)| !matches!(k.as_str(), "$and" | "$nor" | "$or" | "$where"));

        if is_value_form {
            let mut children = Vec::new();
            self.parse_sub("", obj, &mut children, level)?;
            return Ok(MatchExpression::ElemMatchValue {
                path: path.to_string(),
                children,
            });
        }

        let sub = self.parse_document(obj, level)?;
        if sub.has_node(MatchType::Where) {
            return Err(ParseError::BadValue(
                "$elemMatch cannot contain $where expression".to_string(),
            ));
        }
        Ok(MatchExpression::ElemMatchObject {
            path: path.to_string(),
            child: Box::new(sub),
        })
    }

    fn parse_all(
        &self,
        path: &str,
        value: &Bson,
        level: usize,
    ) -> Result<MatchExpression, ParseError> {
        let Bson::Array(items) = value else {
            return Err(ParseError::BadValue("$all needs an array".to_string()));
        };

        // The first entry fixes the mode for the whole list.
        let elem_match_mode = items.first().is_some_and(|first| {
            matches!(first, Bson::Document(d)
                if d.iter().next().is_some_and(|(k, _)| k == "$elemMatch"))
        });

        let mut children = Vec::new();

        if elem_match_mode {
            for item in items {
                let inconsistent =
                    || ParseError::BadValue("$all/$elemMatch has to be consistent".to_string());
                let Bson::Document(entry) = item else {
                    return Err(inconsistent());
                };
                let Some((key, arg)) = entry.iter().next() else {
                    return Err(inconsistent());
                };
                if key != "$elemMatch" {
                    return Err(inconsistent());
                }
                children.push(self.parse_elem_match(path, arg, level)?);
            }
            return Ok(MatchExpression::And(children));
        }

        for item in items {
            match item {
                Bson::RegularExpression(re) => children.push(MatchExpression::Regex {
                    path: path.to_string(),
                    pattern: re.pattern.clone(),
                    options: re.options.clone(),
                }),
                Bson::Document(entry)
                    if entry.iter().next().is_some_and(|(k, _)| is_query_operator(k)) =>
                {
                    return Err(ParseError::BadValue(
                        "no $ expressions in $all".to_string(),
                    ));
                }
                _ => children.push(MatchExpression::Comparison {
                    op: ComparisonOp::Eq,
                    path: path.to_string(),
                    value: item.clone(),
                }),
            }
        }

        if children.is_empty() {
            return Ok(MatchExpression::AlwaysFalse);
        }
        Ok(MatchExpression::And(children))
    }
}

fn depth_error() -> ParseError {
    ParseError::BadValue(format!(
        "exceeded maximum query tree depth of {MAX_TREE_DEPTH}"
    ))
}

fn parse_comparison(
    op: ComparisonOp,
    path: &str,
    value: &Bson,
) -> Result<MatchExpression, ParseError> {
    // Only equality may take a regex argument ({a: {$gt: /b/}} is illegal).
    if op != ComparisonOp::Eq && matches!(value, Bson::RegularExpression(_)) {
        return Err(ParseError::BadValue(format!(
            "can't have a regex as arg to predicate over field '{path}'"
        )));
    }
    Ok(MatchExpression::Comparison {
        op,
        path: path.to_string(),
        value: value.clone(),
    })
}

fn parse_in_list(items: &[Bson]) -> Result<InListEntries, ParseError> {
    let mut entries = InListEntries::default();
    for item in items {
        // DBRef sub-documents stay equality entries; everything else
        // operator-shaped is rejected.
        if is_expression_document(item, false) {
            return Err(ParseError::BadValue("cannot nest $ under $in".to_string()));
        }
        if let Bson::RegularExpression(re) = item {
            entries
                .regexes
                .push((re.pattern.clone(), re.options.clone()));
        } else {
            entries.equalities.push(item.clone());
        }
    }
    Ok(entries)
}

#[allow(clippy::cast_possible_truncation)]
fn parse_size_value(value: &Bson) -> Result<i32, ParseError> {
    match value {
        // Matching old odd semantics.
        Bson::String(_) => Ok(0),
        Bson::Int32(n) => Ok(if *n < 0 { -1 } else { *n }),
        Bson::Int64(n) => Ok(if *n < 0 { -1 } else { *n as i32 }),
        Bson::Double(d) => {
            let truncated = *d as i32;
            // A non-integral size can never match an array length, so it
            // is recorded as the match-nothing sentinel, not an error.
            if f64::from(truncated) == *d {
                Ok(truncated)
            } else {
                Ok(-1)
            }
        }
        _ => Err(ParseError::BadValue("$size needs a number".to_string())),
    }
}

#[allow(clippy::cast_possible_truncation)]
fn parse_type(path: &str, value: &Bson) -> Result<MatchExpression, ParseError> {
    let type_code = match value {
        Bson::Int32(n) => *n,
        Bson::Int64(n) => {
            let truncated = *n as i32;
            if i64::from(truncated) == *n { truncated } else { -1 }
        }
        Bson::Double(d) => {
            let truncated = *d as i32;
            if f64::from(truncated) == *d { truncated } else { -1 }
        }
        Bson::String(alias) => type_alias_code(alias).ok_or_else(|| {
            ParseError::BadValue(format!("unknown string alias for $type: {alias}"))
        })?,
        _ => {
            return Err(ParseError::TypeMismatch(
                "argument to $type is not a number or a string".to_string(),
            ));
        }
    };
    Ok(MatchExpression::Type {
        path: path.to_string(),
        type_code,
    })
}

fn parse_mod(path: &str, value: &Bson) -> Result<MatchExpression, ParseError> {
    let Bson::Array(items) = value else {
        return Err(ParseError::BadValue(
            "malformed mod, needs to be an array".to_string(),
        ));
    };
    let mut it = items.iter();

    let Some(d) = it.next() else {
        return Err(ParseError::BadValue(
            "malformed mod, not enough elements".to_string(),
        ));
    };
    let Some(divisor) = number_i32(d) else {
        return Err(ParseError::BadValue(
            "malformed mod, divisor not a number".to_string(),
        ));
    };
    let Some(r) = it.next() else {
        return Err(ParseError::BadValue(
            "malformed mod, not enough elements".to_string(),
        ));
    };
    let Some(remainder) = number_i32(r) else {
        return Err(ParseError::BadValue(
            "malformed mod, remainder not a number".to_string(),
        ));
    };
    if it.next().is_some() {
        return Err(ParseError::BadValue(
            "malformed mod, too many elements".to_string(),
        ));
    }

    Ok(MatchExpression::Mod {
        path: path.to_string(),
        divisor,
        remainder,
    })
}

/// Collects `$regex`/`$options` from the whole sub-document, in either
/// order, into a single regex node.
fn parse_regex_document(path: &str, context: &Document) -> Result<MatchExpression, ParseError> {
    let mut pattern = String::new();
    let mut options = String::new();

    for (name, value) in context {
        match name.as_str() {
            "$regex" => match value {
                Bson::String(s) => pattern.clone_from(s),
                Bson::RegularExpression(re) => {
                    pattern.clone_from(&re.pattern);
                    options.clone_from(&re.options);
                }
                _ => {
                    return Err(ParseError::BadValue(
                        "$regex has to be a string".to_string(),
                    ));
                }
            },
            "$options" => match value {
                Bson::String(s) => options.clone_from(s),
                _ => {
                    return Err(ParseError::BadValue(
                        "$options has to be a string".to_string(),
                    ));
                }
            },
            _ => {}
        }
    }

    Ok(MatchExpression::Regex {
        path: path.to_string(),
        pattern,
        options,
    })
}

/// An expression sub-document is a non-empty object whose first key
/// starts with `$` and which is not a DBRef sub-document.
fn is_expression_document(value: &Bson, allow_incomplete_dbref: bool) -> bool {
    let Bson::Document(obj) = value else {
        return false;
    };
    let Some((first, _)) = obj.iter().next() else {
        return false;
    };
    if !first.starts_with('$') {
        return false;
    }
    !is_dbref_document(obj, allow_incomplete_dbref)
}

/// An embedded object is a query on a DBRef as long as it contains
/// `$ref` and `$id`; with `allow_incomplete` any of `$ref`, `$id` or
/// `$db` suffices. Field names are checked but not field types.
fn is_dbref_document(obj: &Document, allow_incomplete: bool) -> bool {
    let mut has_ref = false;
    let mut has_id = false;
    let mut has_db = false;

    for (name, _) in obj {
        match name.as_str() {
            "$ref" => has_ref = true,
            "$id" => has_id = true,
            "$db" => has_db = true,
            _ => {}
        }
        if has_ref && has_id {
            break;
        }
    }

    if allow_incomplete {
        has_ref || has_id || has_db
    } else {
        has_ref && has_id
    }
}

fn is_geo_operator(name: &str) -> bool {
    matches!(
        name,
        "$near" | "$nearSphere" | "$geoNear" | "$maxDistance" | "$minDistance"
    )
}

/// Operator names the grammar knows; used to reject `$`-expressions
/// where only literal values are legal (`$all` equality entries).
/// Unknown `$`-prefixed keys (DBRef keys in particular) stay literals.
fn is_query_operator(name: &str) -> bool {
    matches!(
        name,
        "$eq" | "$lt"
            | "$lte"
            | "$gt"
            | "$gte"
            | "$ne"
            | "$in"
            | "$nin"
            | "$all"
            | "$size"
            | "$exists"
            | "$type"
            | "$mod"
            | "$regex"
            | "$options"
            | "$elemMatch"
            | "$not"
            | "$near"
            | "$nearSphere"
            | "$geoNear"
            | "$within"
            | "$geoWithin"
            | "$geoIntersects"
            | "$maxDistance"
            | "$minDistance"
    )
}

fn is_truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(b) => *b,
        Bson::Int32(n) => *n != 0,
        Bson::Int64(n) => *n != 0,
        Bson::Double(d) => *d != 0.0,
        Bson::Null | Bson::Undefined => false,
        _ => true,
    }
}

/// Numeric coercion to a 32-bit integer by truncation, the way the
/// document format's native accessors do it.
#[allow(clippy::cast_possible_truncation)]
fn number_i32(value: &Bson) -> Option<i32> {
    match value {
        Bson::Int32(n) => Some(*n),
        Bson::Int64(n) => Some(*n as i32),
        Bson::Double(d) => Some(*d as i32),
        _ => None,
    }
}

/// Case-sensitive `$type` alias table.
fn type_alias_code(alias: &str) -> Option<i32> {
    let code = match alias {
        "double" => 1,
        "string" => 2,
        "object" => 3,
        "array" => 4,
        "binData" => 5,
        "undefined" => 6,
        "objectId" => 7,
        "bool" => 8,
        "date" => 9,
        "null" => 10,
        "regex" => 11,
        "dbPointer" => 12,
        "javascript" => 13,
        "symbol" => 14,
        "javascriptWithScope" => 15,
        "int" => 16,
        "timestamp" => 17,
        "long" => 18,
        "minKey" => -1,
        "maxKey" => 127,
        _ => return None,
    };
    Some(code)
}
