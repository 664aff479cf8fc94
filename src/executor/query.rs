use std::collections::BTreeSet;

use crate::types::{
    RowId,
    error::{DatabaseError, Result},
    row::Row,
    value::Value,
};

/// A value slot in a mutation: a literal, a positional placeholder, or a
/// named placeholder resolved against the call's `Params`.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Value(Value),
    Param(usize),
    Named(String),
}

/// Parameter binding for `run`: a single explicit structure instead of
/// shape-sniffed arrays or objects. Validated before any page is touched.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Params {
    #[default]
    None,
    Positional(Vec<Value>),
    Named(Vec<(String, Value)>),
}

impl Params {
    fn positional(&self, index: usize) -> Result<&Value> {
        match self {
            Params::Positional(values) => {
                values
                    .get(index)
                    .ok_or_else(|| DatabaseError::ParamMismatch {
                        details: format!(
                            "positional parameter {} out of range ({} provided)",
                            index,
                            values.len()
                        ),
                    })
            }
            _ => Err(DatabaseError::ParamMismatch {
                details: format!("positional parameter {} requested but none provided", index),
            }),
        }
    }

    fn named(&self, name: &str) -> Result<&Value> {
        match self {
            Params::Named(pairs) => pairs
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value)
                .ok_or_else(|| DatabaseError::ParamMismatch {
                    details: format!("named parameter '{}' not provided", name),
                }),
            _ => Err(DatabaseError::ParamMismatch {
                details: format!("named parameter '{}' requested but none provided", name),
            }),
        }
    }
}

pub(crate) fn resolve_arg(arg: &Arg, params: &Params) -> Result<Value> {
    match arg {
        Arg::Value(value) => Ok(value.clone()),
        Arg::Param(index) => params.positional(*index).cloned(),
        Arg::Named(name) => params.named(name).cloned(),
    }
}

/// Inclusive row-ID range; `None` bounds are open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RowIdRange {
    pub start: Option<RowId>,
    pub end: Option<RowId>,
}

impl RowIdRange {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn single(row_id: RowId) -> Self {
        Self {
            start: Some(row_id),
            end: Some(row_id),
        }
    }

    pub fn contains(&self, row_id: RowId) -> bool {
        if let Some(start) = self.start {
            if row_id < start {
                return false;
            }
        }
        if let Some(end) = self.end {
            if row_id > end {
                return false;
            }
        }
        true
    }

    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Column predicate against a literal value, evaluated with the same
/// ordering rules as value comparison (nulls smallest, numerics promoted).
/// A missing column or incomparable pair never matches.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub column: usize,
    pub op: CompareOp,
    pub value: Value,
}

impl Predicate {
    pub fn new(column: usize, op: CompareOp, value: Value) -> Self {
        Self { column, op, value }
    }

    pub fn matches(&self, row: &Row) -> bool {
        let Some(value) = row.get_value(self.column) else {
            return false;
        };
        let Some(ordering) = value.partial_cmp(&self.value) else {
            return false;
        };
        match self.op {
            CompareOp::Eq => ordering.is_eq(),
            CompareOp::Ne => ordering.is_ne(),
            CompareOp::Lt => ordering.is_lt(),
            CompareOp::Le => ordering.is_le(),
            CompareOp::Gt => ordering.is_gt(),
            CompareOp::Ge => ordering.is_ge(),
        }
    }
}

/// Pre-resolved scan bounds: a row-ID range plus an optional column
/// predicate.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Selector {
    pub range: RowIdRange,
    pub predicate: Option<Predicate>,
}

impl Selector {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn row_id(row_id: RowId) -> Self {
        Self {
            range: RowIdRange::single(row_id),
            predicate: None,
        }
    }

    pub fn matching(predicate: Predicate) -> Self {
        Self {
            range: RowIdRange::all(),
            predicate: Some(predicate),
        }
    }

    pub fn matches(&self, row: &Row) -> bool {
        match row.row_id {
            Some(row_id) => {
                if !self.range.contains(row_id) {
                    return false;
                }
            }
            None => {
                if !self.range.is_unbounded() {
                    return false;
                }
            }
        }
        match &self.predicate {
            Some(predicate) => predicate.matches(row),
            None => true,
        }
    }
}

/// A pre-resolved read operation: point lookup or range scan. SQL text
/// never reaches this layer.
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    Lookup { table: String, row_id: RowId },
    Scan { table: String, selector: Selector },
}

impl Query {
    pub fn lookup(table: impl Into<String>, row_id: RowId) -> Self {
        Query::Lookup {
            table: table.into(),
            row_id,
        }
    }

    pub fn scan(table: impl Into<String>, selector: Selector) -> Self {
        Query::Scan {
            table: table.into(),
            selector,
        }
    }

    pub fn scan_all(table: impl Into<String>) -> Self {
        Self::scan(table, Selector::all())
    }

    pub fn table(&self) -> &str {
        match self {
            Query::Lookup { table, .. } => table,
            Query::Scan { table, .. } => table,
        }
    }
}

/// A pre-resolved mutation descriptor.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    CreateTable {
        table: String,
    },
    Insert {
        table: String,
        rows: Vec<Vec<Arg>>,
    },
    Update {
        table: String,
        selector: Selector,
        assignments: Vec<(usize, Arg)>,
    },
    Delete {
        table: String,
        selector: Selector,
    },
}

impl Mutation {
    pub fn create_table(table: impl Into<String>) -> Self {
        Mutation::CreateTable {
            table: table.into(),
        }
    }

    pub fn insert(table: impl Into<String>, values: Vec<Arg>) -> Self {
        Mutation::Insert {
            table: table.into(),
            rows: vec![values],
        }
    }

    pub fn insert_many(table: impl Into<String>, rows: Vec<Vec<Arg>>) -> Self {
        Mutation::Insert {
            table: table.into(),
            rows,
        }
    }

    pub fn update(
        table: impl Into<String>,
        selector: Selector,
        assignments: Vec<(usize, Arg)>,
    ) -> Self {
        Mutation::Update {
            table: table.into(),
            selector,
            assignments,
        }
    }

    pub fn delete(table: impl Into<String>, selector: Selector) -> Self {
        Mutation::Delete {
            table: table.into(),
            selector,
        }
    }

    fn args(&self) -> Vec<&Arg> {
        match self {
            Mutation::CreateTable { .. } => Vec::new(),
            Mutation::Insert { rows, .. } => rows.iter().flatten().collect(),
            Mutation::Update { assignments, .. } => {
                assignments.iter().map(|(_, arg)| arg).collect()
            }
            Mutation::Delete { .. } => Vec::new(),
        }
    }
}

/// Check placeholder/parameter arity before touching any page: every
/// referenced placeholder must resolve, and every provided parameter must
/// be referenced.
pub(crate) fn validate_params(mutation: &Mutation, params: &Params) -> Result<()> {
    let mut positions: BTreeSet<usize> = BTreeSet::new();
    let mut names: BTreeSet<&str> = BTreeSet::new();
    for arg in mutation.args() {
        match arg {
            Arg::Value(_) => {}
            Arg::Param(index) => {
                positions.insert(*index);
            }
            Arg::Named(name) => {
                names.insert(name.as_str());
            }
        }
    }

    match params {
        Params::None => {
            if !positions.is_empty() || !names.is_empty() {
                return Err(DatabaseError::ParamMismatch {
                    details: format!(
                        "statement references {} parameter(s) but none were provided",
                        positions.len() + names.len()
                    ),
                });
            }
        }
        Params::Positional(values) => {
            if !names.is_empty() {
                return Err(DatabaseError::ParamMismatch {
                    details: "named placeholders bound with positional parameters".to_string(),
                });
            }
            for index in &positions {
                if *index >= values.len() {
                    return Err(DatabaseError::ParamMismatch {
                        details: format!(
                            "positional parameter {} out of range ({} provided)",
                            index,
                            values.len()
                        ),
                    });
                }
            }
            for index in 0..values.len() {
                if !positions.contains(&index) {
                    return Err(DatabaseError::ParamMismatch {
                        details: format!("positional parameter {} is never referenced", index),
                    });
                }
            }
        }
        Params::Named(pairs) => {
            if !positions.is_empty() {
                return Err(DatabaseError::ParamMismatch {
                    details: "positional placeholders bound with named parameters".to_string(),
                });
            }
            for name in &names {
                if !pairs.iter().any(|(key, _)| key == name) {
                    return Err(DatabaseError::ParamMismatch {
                        details: format!("named parameter '{}' not provided", name),
                    });
                }
            }
            for (key, _) in pairs {
                if !names.contains(key.as_str()) {
                    return Err(DatabaseError::ParamMismatch {
                        details: format!("named parameter '{}' is never referenced", key),
                    });
                }
            }
        }
    }
    Ok(())
}

/// Outcome of `run`: the last row ID assigned by an insert, if any, and
/// the exact number of affected rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunResult {
    pub last_insert_id: Option<RowId>,
    pub changes: u64,
}
