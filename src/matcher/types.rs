use bson::{Bson, Document};

// Bound on query nesting; checked on each descent into a sub-document
// or a logical operator's child.
pub(crate) const MAX_TREE_DEPTH: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    Eq,
    Lt,
    Lte,
    Gt,
    Gte,
}

/// Entries collected from a `$in`/`$nin` argument array.
///
/// The parser only records entries; deduplication and the equality
/// semantics of `equalities` are delegated to the evaluator. Regexes
/// apply to the array element itself, so they carry no field path.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InListEntries {
    pub equalities: Vec<Bson>,
    /// `(pattern, options)` pairs.
    pub regexes: Vec<(String, String)>,
}

/// Opaque `$where` payload, produced by a host-installed where-parser.
#[derive(Debug, Clone, PartialEq)]
pub struct WhereExpression {
    pub code: String,
    pub scope: Option<Document>,
}

/// Opaque `$text` payload: the raw `$text` argument object.
#[derive(Debug, Clone, PartialEq)]
pub struct TextExpression {
    pub query: Document,
}

/// Opaque geo payload: the whole operator sub-document, kept intact
/// because `$maxDistance`/`$minDistance` are meaningless without their
/// `$near` sibling.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoExpression {
    pub path: String,
    pub operator: String,
    pub predicate: Document,
}

/// Discriminant of a [`MatchExpression`] node, used for tree scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchType {
    Eq,
    Lt,
    Lte,
    Gt,
    Gte,
    Regex,
    Mod,
    Exists,
    Type,
    Size,
    In,
    ElemMatchValue,
    ElemMatchObject,
    And,
    Or,
    Nor,
    Not,
    Atomic,
    AlwaysFalse,
    Where,
    Text,
    Geo,
}

impl MatchType {
    #[must_use]
    pub const fn is_logical(self) -> bool {
        matches!(self, Self::And | Self::Or | Self::Nor | Self::Not)
    }

    #[must_use]
    pub const fn is_array(self) -> bool {
        matches!(self, Self::ElemMatchValue | Self::ElemMatchObject | Self::Size)
    }

    #[must_use]
    pub const fn is_leaf(self) -> bool {
        matches!(
            self,
            Self::Eq
                | Self::Lt
                | Self::Lte
                | Self::Gt
                | Self::Gte
                | Self::Regex
                | Self::Mod
                | Self::Exists
                | Self::Type
                | Self::In
        )
    }
}

/// A parsed query predicate.
///
/// Each parent exclusively owns its children; the tree is strict (no
/// sharing, no back-pointers) and is handed to the caller whole.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchExpression {
    Comparison {
        op: ComparisonOp,
        path: String,
        value: Bson,
    },
    Regex {
        path: String,
        pattern: String,
        options: String,
    },
    Mod {
        path: String,
        divisor: i32,
        remainder: i32,
    },
    Exists {
        path: String,
    },
    /// A negative `type_code` matches nothing.
    Type {
        path: String,
        type_code: i32,
    },
    /// `size == -1` matches nothing.
    Size {
        path: String,
        size: i32,
    },
    In {
        path: String,
        entries: InListEntries,
    },
    /// `$elemMatch` value form: children are predicates over the array
    /// element itself and carry the implicit empty path.
    ElemMatchValue {
        path: String,
        children: Vec<MatchExpression>,
    },
    /// `$elemMatch` object form: the child is applied to each array
    /// element as a document.
    ElemMatchObject {
        path: String,
        child: Box<MatchExpression>,
    },
    And(Vec<MatchExpression>),
    Or(Vec<MatchExpression>),
    Nor(Vec<MatchExpression>),
    Not(Box<MatchExpression>),
    /// `$atomic`/`$isolated` marker; carries no field.
    Atomic,
    /// Always-false predicate (`$all` with an empty array).
    AlwaysFalse,
    Where(WhereExpression),
    Text(TextExpression),
    Geo(GeoExpression),
}

impl MatchExpression {
    #[must_use]
    pub const fn match_type(&self) -> MatchType {
        match self {
            Self::Comparison { op, .. } => match op {
                ComparisonOp::Eq => MatchType::Eq,
                ComparisonOp::Lt => MatchType::Lt,
                ComparisonOp::Lte => MatchType::Lte,
                ComparisonOp::Gt => MatchType::Gt,
                ComparisonOp::Gte => MatchType::Gte,
            },
            Self::Regex { .. } => MatchType::Regex,
            Self::Mod { .. } => MatchType::Mod,
            Self::Exists { .. } => MatchType::Exists,
            Self::Type { .. } => MatchType::Type,
            Self::Size { .. } => MatchType::Size,
            Self::In { .. } => MatchType::In,
            Self::ElemMatchValue { .. } => MatchType::ElemMatchValue,
            Self::ElemMatchObject { .. } => MatchType::ElemMatchObject,
            Self::And(_) => MatchType::And,
            Self::Or(_) => MatchType::Or,
            Self::Nor(_) => MatchType::Nor,
            Self::Not(_) => MatchType::Not,
            Self::Atomic => MatchType::Atomic,
            Self::AlwaysFalse => MatchType::AlwaysFalse,
            Self::Where(_) => MatchType::Where,
            Self::Text(_) => MatchType::Text,
            Self::Geo(_) => MatchType::Geo,
        }
    }

    #[must_use]
    pub fn num_children(&self) -> usize {
        match self {
            Self::And(children) | Self::Or(children) | Self::Nor(children) => children.len(),
            Self::ElemMatchValue { children, .. } => children.len(),
            Self::Not(_) | Self::ElemMatchObject { .. } => 1,
            _ => 0,
        }
    }

    #[must_use]
    pub fn child(&self, i: usize) -> Option<&MatchExpression> {
        match self {
            Self::And(children) | Self::Or(children) | Self::Nor(children) => children.get(i),
            Self::ElemMatchValue { children, .. } => children.get(i),
            Self::Not(child) | Self::ElemMatchObject { child, .. } => {
                (i == 0).then_some(child.as_ref())
            }
            _ => None,
        }
    }

    /// Field path this node constrains, if it constrains one.
    #[must_use]
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::Comparison { path, .. }
            | Self::Regex { path, .. }
            | Self::Mod { path, .. }
            | Self::Exists { path }
            | Self::Type { path, .. }
            | Self::Size { path, .. }
            | Self::In { path, .. }
            | Self::ElemMatchValue { path, .. }
            | Self::ElemMatchObject { path, .. } => Some(path),
            Self::Geo(geo) => Some(&geo.path),
            _ => None,
        }
    }

    /// Depth-first scan for a node of the given kind anywhere in the
    /// subtree rooted here.
    #[must_use]
    pub fn has_node(&self, kind: MatchType) -> bool {
        if self.match_type() == kind {
            return true;
        }
        (0..self.num_children()).any(|i| self.child(i).is_some_and(|c| c.has_node(kind)))
    }
}
