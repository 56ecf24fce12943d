use bson::{Bson, Document, doc};
use matchlite::matcher::{ComparisonOp, MatchExpression, parse};
use matchlite::{ErrorCode, ParseError};

fn eq(path: &str, value: impl Into<Bson>) -> MatchExpression {
    MatchExpression::Comparison {
        op: ComparisonOp::Eq,
        path: path.to_string(),
        value: value.into(),
    }
}

#[test]
fn single_equality_is_unwrapped() {
    assert_eq!(parse(&doc! {"a": 1}).unwrap(), eq("a", 1));
}

#[test]
fn two_fields_become_an_and() {
    assert_eq!(
        parse(&doc! {"a": 1, "b": 2}).unwrap(),
        MatchExpression::And(vec![eq("a", 1), eq("b", 2)])
    );
}

#[test]
fn empty_query_is_an_empty_and() {
    assert_eq!(parse(&doc! {}).unwrap(), MatchExpression::And(vec![]));
}

#[test]
fn or_list_parses_each_entry() {
    assert_eq!(
        parse(&doc! {"$or": [{"a": 1}, {"a": 2}]}).unwrap(),
        MatchExpression::Or(vec![eq("a", 1), eq("a", 2)])
    );
}

#[test]
fn and_and_nor_lists() {
    assert_eq!(
        parse(&doc! {"$and": [{"a": 1}, {"b": 2}]}).unwrap(),
        MatchExpression::And(vec![eq("a", 1), eq("b", 2)])
    );
    assert_eq!(
        parse(&doc! {"$nor": [{"a": 1}]}).unwrap(),
        MatchExpression::Nor(vec![eq("a", 1)])
    );
}

#[test]
fn empty_logical_list_is_permitted() {
    // Semantics of a zero-branch $or are the evaluator's business.
    assert_eq!(parse(&doc! {"$or": []}).unwrap(), MatchExpression::Or(vec![]));
}

#[test]
fn logical_operators_need_arrays() {
    assert_eq!(
        parse(&doc! {"$or": 5}).unwrap_err(),
        ParseError::BadValue("$or needs an array".to_string())
    );
    assert_eq!(
        parse(&doc! {"$and": {"a": 1}}).unwrap_err(),
        ParseError::BadValue("$and needs an array".to_string())
    );
    assert_eq!(
        parse(&doc! {"$nor": "x"}).unwrap_err(),
        ParseError::BadValue("$nor needs an array".to_string())
    );
}

#[test]
fn logical_list_entries_must_be_objects() {
    assert_eq!(
        parse(&doc! {"$or": [5]}).unwrap_err(),
        ParseError::BadValue("$or/$and/$nor entries need to be full objects".to_string())
    );
}

#[test]
fn logical_lists_preserve_order_without_flattening() {
    let tree = parse(&doc! {"$or": [{"$or": [{"a": 1}]}, {"b": 2}]}).unwrap();
    assert_eq!(
        tree,
        MatchExpression::Or(vec![MatchExpression::Or(vec![eq("a", 1)]), eq("b", 2)])
    );
}

#[test]
fn atomic_at_top_level() {
    assert_eq!(parse(&doc! {"$atomic": true}).unwrap(), MatchExpression::Atomic);
    assert_eq!(parse(&doc! {"$isolated": 1}).unwrap(), MatchExpression::Atomic);
}

#[test]
fn falsy_atomic_is_a_noop() {
    assert_eq!(parse(&doc! {"$atomic": false}).unwrap(), MatchExpression::And(vec![]));
    assert_eq!(parse(&doc! {"$isolated": 0}).unwrap(), MatchExpression::And(vec![]));
}

#[test]
fn atomic_below_top_level_is_rejected() {
    let err = parse(&doc! {"$or": [{"$atomic": true}]}).unwrap_err();
    assert_eq!(
        err,
        ParseError::BadValue("$atomic/$isolated has to be at the top level".to_string())
    );
}

#[test]
fn comment_is_ignored() {
    assert_eq!(parse(&doc! {"a": 1, "$comment": "why not"}).unwrap(), eq("a", 1));
    assert_eq!(parse(&doc! {"$comment": 17}).unwrap(), MatchExpression::And(vec![]));
}

#[test]
fn top_level_dbref_keys_are_equalities() {
    assert_eq!(
        parse(&doc! {"$ref": "coll", "$id": 1}).unwrap(),
        MatchExpression::And(vec![eq("$ref", "coll"), eq("$id", 1)])
    );
    assert_eq!(parse(&doc! {"$db": "other"}).unwrap(), eq("$db", "other"));
}

#[test]
fn unknown_top_level_operator_is_rejected() {
    assert_eq!(
        parse(&doc! {"$foo": 1}).unwrap_err(),
        ParseError::BadValue("unknown top level operator: $foo".to_string())
    );
}

#[test]
fn regex_literal_field_parses_to_regex() {
    let q = doc! {"a": Bson::RegularExpression(bson::Regex {
        pattern: "abc".to_string(),
        options: "i".to_string(),
    })};
    assert_eq!(
        parse(&q).unwrap(),
        MatchExpression::Regex {
            path: "a".to_string(),
            pattern: "abc".to_string(),
            options: "i".to_string(),
        }
    );
}

#[test]
fn dbref_subdocument_is_equality_not_expression() {
    let dbref = doc! {"$ref": "people", "$id": 1};
    assert_eq!(
        parse(&doc! {"person": dbref.clone()}).unwrap(),
        eq("person", dbref)
    );
}

#[test]
fn incomplete_dbref_is_an_expression_document_at_top_level() {
    // Strict mode needs both $ref and $id; a lone $db falls through to
    // operator dispatch and fails there.
    assert_eq!(
        parse(&doc! {"person": {"$db": "other"}}).unwrap_err(),
        ParseError::BadValue("unknown operator: $db".to_string())
    );
}

#[test]
fn plain_nested_object_is_an_equality() {
    let inner = doc! {"b": 1};
    assert_eq!(parse(&doc! {"a": inner.clone()}).unwrap(), eq("a", inner));
    assert_eq!(parse(&doc! {"a": {}}).unwrap(), eq("a", Document::new()));
}

#[test]
fn depth_overflow_is_rejected() {
    let mut q = doc! {"a": 1};
    for _ in 0..150 {
        q = doc! {"$and": [q]};
    }
    let err = parse(&q).unwrap_err();
    assert_eq!(err.code(), ErrorCode::BadValue);
    assert_eq!(
        err.message(),
        "exceeded maximum query tree depth of 100"
    );
}

#[test]
fn nesting_within_the_bound_parses() {
    let mut q = doc! {"a": 1};
    for _ in 0..50 {
        q = doc! {"$and": [q]};
    }
    assert!(parse(&q).is_ok());
}

#[test]
fn not_chain_past_the_bound_is_rejected() {
    let mut arg = Bson::Document(doc! {"$gt": 1});
    for _ in 0..150 {
        arg = Bson::Document(doc! {"$not": arg});
    }
    let err = parse(&doc! {"a": arg}).unwrap_err();
    assert_eq!(
        err.message(),
        "exceeded maximum query tree depth of 100"
    );
}

#[test]
fn errors_surface_in_document_order() {
    let err = parse(&doc! {"a": {"$bogus": 1}, "b": {"$also_bogus": 2}}).unwrap_err();
    assert_eq!(err, ParseError::BadValue("unknown operator: $bogus".to_string()));
}
