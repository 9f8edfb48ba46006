//! Constant values and declared types carried by expression nodes.

use chrono::{NaiveDate, NaiveDateTime};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// Declared (static) type of an expression node
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TypeRef {
    /// Type not known or not relevant
    #[default]
    Any,
    Bool,
    Int16,
    Int32,
    Int64,
    Float,
    String,
    Date,
    /// Domain object (issue, user, captured closure)
    Record { name: String },
    Array { element: Box<TypeRef> },
    /// Optional value of the inner type
    Nullable { inner: Box<TypeRef> },
    /// The remote data-source placeholder for an entity
    Queryable { entity: String },
    /// A concrete in-memory result sequence
    Sequence { element: Box<TypeRef> },
}

impl TypeRef {
    pub fn nullable(inner: TypeRef) -> Self {
        TypeRef::Nullable {
            inner: Box::new(inner),
        }
    }

    pub fn array(element: TypeRef) -> Self {
        TypeRef::Array {
            element: Box::new(element),
        }
    }

    pub fn record(name: impl Into<String>) -> Self {
        TypeRef::Record { name: name.into() }
    }

    pub fn queryable(entity: impl Into<String>) -> Self {
        TypeRef::Queryable {
            entity: entity.into(),
        }
    }

    pub fn sequence(element: TypeRef) -> Self {
        TypeRef::Sequence {
            element: Box::new(element),
        }
    }

    /// Strip one level of `Nullable`
    pub fn underlying(&self) -> &TypeRef {
        match self {
            TypeRef::Nullable { inner } => inner,
            other => other,
        }
    }

    /// Date or nullable date
    pub fn is_date(&self) -> bool {
        matches!(self.underlying(), TypeRef::Date)
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self.underlying(),
            TypeRef::Int16 | TypeRef::Int32 | TypeRef::Int64
        )
    }

    pub fn is_queryable(&self) -> bool {
        matches!(self, TypeRef::Queryable { .. })
    }

    /// Element type of an array or sequence, `Any` otherwise
    pub fn element_type(&self) -> TypeRef {
        match self.underlying() {
            TypeRef::Array { element } | TypeRef::Sequence { element } => (**element).clone(),
            _ => TypeRef::Any,
        }
    }

    /// Name of the record type, if this is one
    pub fn record_name(&self) -> Option<&str> {
        match self.underlying() {
            TypeRef::Record { name } => Some(name),
            _ => None,
        }
    }
}

/// Placeholder for the remote search source of an entity type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SourceRef {
    pub entity: String,
}

/// A domain object: an issue returned by a search, a user, or the
/// captured-variable closure of a composed query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Record {
    pub type_name: String,
    /// Natural string form used when the record is rendered as a literal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
    #[serde(default)]
    pub fields: BTreeMap<String, Value>,
}

impl Record {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            display: None,
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field setter
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn with_display(mut self, display: impl Into<String>) -> Self {
        self.display = Some(display.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.display {
            Some(display) => write!(f, "{}", display),
            None => write!(f, "{}", self.type_name),
        }
    }
}

/// A constant value embedded in, or produced by evaluating, an expression
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Date(NaiveDateTime),
    Array(Vec<Value>),
    Record(Record),
    Source(SourceRef),
}

impl Value {
    /// Type inferred from the value itself
    pub fn type_of(&self) -> TypeRef {
        match self {
            Value::Null => TypeRef::Any,
            Value::Bool(_) => TypeRef::Bool,
            Value::Int(_) => TypeRef::Int64,
            Value::Float(_) => TypeRef::Float,
            Value::Str(_) => TypeRef::String,
            Value::Date(_) => TypeRef::Date,
            Value::Array(items) => {
                TypeRef::array(items.first().map(Value::type_of).unwrap_or_default())
            }
            Value::Record(record) => TypeRef::record(record.type_name.clone()),
            Value::Source(source) => TypeRef::queryable(source.entity.clone()),
        }
    }

    /// Short kind name for diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Date(_) => "date",
            Value::Array(_) => "array",
            Value::Record(_) => "record",
            Value::Source(_) => "source",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Ordering used by in-memory sorting: nulls first, numbers numerically,
    /// same-kind scalars naturally, everything else by string form.
    pub fn compare(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Null, _) => Ordering::Less,
            (_, Value::Null) => Ordering::Greater,
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Int(a), Value::Float(b)) => (*a as f64).total_cmp(b),
            (Value::Float(a), Value::Int(b)) => a.total_cmp(&(*b as f64)),
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Str(a), Value::Str(b)) => a.cmp(b),
            (Value::Date(a), Value::Date(b)) => a.cmp(b),
            (a, b) => a.to_string().cmp(&b.to_string()),
        }
    }

    /// Equality that treats integers and floats of the same magnitude as equal
    pub fn loosely_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                (*a as f64) == *b
            }
            (a, b) => a == b,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Str(s) => write!(f, "{}", s),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d %H:%M:%S")),
            Value::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                Ok(())
            }
            Value::Record(record) => write!(f, "{}", record),
            Value::Source(source) => write!(f, "<{} source>", source.entity),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value.into())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Int(value.into())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(value: NaiveDateTime) -> Self {
        Value::Date(value)
    }
}

impl From<NaiveDate> for Value {
    fn from(value: NaiveDate) -> Self {
        Value::Date(value.and_time(chrono::NaiveTime::MIN))
    }
}

impl From<Record> for Value {
    fn from(value: Record) -> Self {
        Value::Record(value)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(values: Vec<T>) -> Self {
        Value::Array(values.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}
