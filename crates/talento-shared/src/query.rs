//! Backend-neutral record queries.
//!
//! A [`Query`] names a resource, an optional [`Predicate`], an ordering and a
//! limit. Remote backends translate it to their own filter language; the
//! local backend evaluates it in process with [`Predicate::matches`].

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A record as exchanged with the collaborator services: a JSON object.
pub type Record = Value;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Predicate {
    Eq(String, Value),
    Neq(String, Value),
    Gte(String, Value),
    Lte(String, Value),
    /// Case-insensitive substring match on a string field, or on any element
    /// of an array of strings.
    Contains(String, String),
    In(String, Vec<Value>),
    NotIn(String, Vec<Value>),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
}

impl Predicate {
    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Self::Eq(field.to_string(), value.into())
    }

    pub fn gte(field: &str, value: impl Into<Value>) -> Self {
        Self::Gte(field.to_string(), value.into())
    }

    pub fn contains(field: &str, needle: impl Into<String>) -> Self {
        Self::Contains(field.to_string(), needle.into())
    }

    pub fn not_in<V: Into<Value>>(field: &str, values: impl IntoIterator<Item = V>) -> Self {
        Self::NotIn(field.to_string(), values.into_iter().map(Into::into).collect())
    }

    /// Evaluate the predicate against a record. Missing fields behave like
    /// `null`.
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Self::Eq(field, value) => field_of(record, field) == value,
            Self::Neq(field, value) => field_of(record, field) != value,
            Self::Gte(field, value) => {
                let actual = field_of(record, field);
                !actual.is_null()
                    && compare_values(actual, value) != Ordering::Less
            }
            Self::Lte(field, value) => {
                let actual = field_of(record, field);
                !actual.is_null()
                    && compare_values(actual, value) != Ordering::Greater
            }
            Self::Contains(field, needle) => {
                let needle = needle.to_lowercase();
                match field_of(record, field) {
                    Value::String(s) => s.to_lowercase().contains(&needle),
                    Value::Array(items) => items.iter().any(|item| {
                        item.as_str()
                            .map(|s| s.to_lowercase().contains(&needle))
                            .unwrap_or(false)
                    }),
                    _ => false,
                }
            }
            Self::In(field, values) => values.contains(field_of(record, field)),
            Self::NotIn(field, values) => !values.contains(field_of(record, field)),
            Self::And(inner) => inner.iter().all(|p| p.matches(record)),
            Self::Or(inner) => inner.iter().any(|p| p.matches(record)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderBy {
    pub field: String,
    pub ascending: bool,
}

impl OrderBy {
    pub fn asc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            ascending: true,
        }
    }

    pub fn desc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            ascending: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Query {
    pub resource: String,
    pub predicate: Option<Predicate>,
    pub order: Vec<OrderBy>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new(resource: &str) -> Self {
        Self {
            resource: resource.to_string(),
            predicate: None,
            order: Vec::new(),
            limit: None,
        }
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicate = match self.predicate.take() {
            None => Some(predicate),
            Some(Predicate::And(mut inner)) => {
                inner.push(predicate);
                Some(Predicate::And(inner))
            }
            Some(existing) => Some(Predicate::And(vec![existing, predicate])),
        };
        self
    }

    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order.push(order);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, record: &Record) -> bool {
        self.predicate.as_ref().map_or(true, |p| p.matches(record))
    }

    /// Compare two records under this query's ordering.
    pub fn compare(&self, a: &Record, b: &Record) -> Ordering {
        for order in &self.order {
            let ord = compare_values(field_of(a, &order.field), field_of(b, &order.field));
            let ord = if order.ascending { ord } else { ord.reverse() };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }
}

static NULL: Value = Value::Null;

fn field_of<'a>(record: &'a Record, field: &str) -> &'a Value {
    record.get(field).unwrap_or(&NULL)
}

/// Total order over JSON scalars: null < bool < number < string; arrays and
/// objects compare equal to each other and sort last.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) | Value::Object(_) => 4,
        }
    }

    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or_default();
            let y = y.as_f64().unwrap_or_default();
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}
