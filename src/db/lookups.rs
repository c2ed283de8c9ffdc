/*!
 * Field lookups used to build `WHERE` clauses.
 *
 * Columns are always chosen by code, never by request input; only the
 * right-hand side values are bound as parameters.
 */
use chrono::{DateTime, Utc};
use sqlx::query::QueryAs;
use sqlx::sqlite::{Sqlite, SqliteArguments};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lookup {
    Exact,
    Lte,
    /// `col <> value`
    NotEqual,
    /// `-value < col < value`
    AbsLt,
}

impl Lookup {
    /**
     * Render the SQL fragment for `lhs`, returning it along with how many
     * times the right-hand value has to be bound.
     */
    pub fn as_sql(&self, lhs: &str) -> (String, usize) {
        match self {
            Lookup::Exact => (format!("{} = ?", lhs), 1),
            Lookup::Lte => (format!("{} <= ?", lhs), 1),
            Lookup::NotEqual => (format!("{} <> ?", lhs), 1),
            Lookup::AbsLt => (format!("{} < ? AND {} > -?", lhs, lhs), 2),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Int(i64),
    Text(String),
    Time(DateTime<Utc>),
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Time(v)
    }
}

#[derive(Clone, Debug)]
struct Condition {
    column: &'static str,
    lookup: Lookup,
    value: Value,
}

/// A conjunction of lookups
#[derive(Clone, Debug, Default)]
pub struct Filter {
    conditions: Vec<Condition>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn and(mut self, column: &'static str, lookup: Lookup, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition {
            column,
            lookup,
            value: value.into(),
        });
        self
    }

    /// `" WHERE ..."`, or an empty string when there is nothing to filter on
    pub fn where_clause(&self) -> String {
        if self.conditions.is_empty() {
            return String::new();
        }
        let fragments: Vec<String> = self
            .conditions
            .iter()
            .map(|c| format!("({})", c.lookup.as_sql(c.column).0))
            .collect();
        format!(" WHERE {}", fragments.join(" AND "))
    }

    /// Bind every right-hand value, in clause order
    pub fn bind<'q, O>(
        &self,
        mut query: QueryAs<'q, Sqlite, O, SqliteArguments<'q>>,
    ) -> QueryAs<'q, Sqlite, O, SqliteArguments<'q>> {
        for condition in self.conditions.iter() {
            let (_, times) = condition.lookup.as_sql(condition.column);
            for _ in 0..times {
                query = match &condition.value {
                    Value::Int(v) => query.bind(*v),
                    Value::Text(v) => query.bind(v.clone()),
                    Value::Time(v) => query.bind(*v),
                };
            }
        }
        query
    }
}
