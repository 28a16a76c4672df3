use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque handle to a live object held by the server's registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectKey(pub i32);

impl std::fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Interface a request is addressed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassType {
    Connection,
    Statement,
    PreparedStatement,
    ResultSet,
}

impl std::fmt::Display for ClassType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ClassType::Connection => "Connection",
            ClassType::Statement => "Statement",
            ClassType::PreparedStatement => "PreparedStatement",
            ClassType::ResultSet => "ResultSet",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SqlType {
    Null,
    Boolean,
    Integer,
    BigInt,
    Double,
    Varchar,
    Blob,
    Timestamp,
    Other,
}

impl SqlType {
    /// Map a declared column type using SQL affinity rules
    pub fn from_declared(decl: Option<&str>) -> Self {
        let Some(decl) = decl else {
            return SqlType::Other;
        };
        let decl = decl.to_ascii_uppercase();
        if decl.contains("BOOL") {
            SqlType::Boolean
        } else if decl.contains("BIGINT") {
            SqlType::BigInt
        } else if decl.contains("INT") {
            SqlType::Integer
        } else if decl.contains("CHAR") || decl.contains("CLOB") || decl.contains("TEXT") {
            SqlType::Varchar
        } else if decl.contains("BLOB") || decl.contains("BINARY") {
            SqlType::Blob
        } else if decl.contains("TIMESTAMP") || decl.contains("DATETIME") || decl == "DATE" {
            SqlType::Timestamp
        } else if decl.contains("REAL")
            || decl.contains("FLOA")
            || decl.contains("DOUB")
            || decl.contains("NUMERIC")
            || decl.contains("DECIMAL")
        {
            SqlType::Double
        } else {
            SqlType::Other
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Nullability {
    NoNulls,
    Nullable,
    Unknown,
}

/// One column of a result set's metadata snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    pub sql_type: SqlType,
    pub precision: u32,
    pub scale: u32,
    pub nullable: Nullability,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, sql_type: SqlType) -> Self {
        Self {
            name: name.into(),
            sql_type,
            precision: 0,
            scale: 0,
            nullable: Nullability::Unknown,
        }
    }
}

/// A bounded slice of rows pulled from a server-side cursor
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResultBatch {
    pub rows: Vec<Vec<Value>>,
    pub exhausted: bool,
}

/// The closed set of values that may cross the wire
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i32),
    Long(i64),
    Double(f64),
    String(String),
    Bytes(#[serde(with = "serde_bytes")] Vec<u8>),
    Timestamp(DateTime<Utc>),
    Key(ObjectKey),
    Metadata(Vec<ColumnDescriptor>),
    Batch(ResultBatch),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "int",
            Value::Long(_) => "long",
            Value::Double(_) => "double",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Timestamp(_) => "timestamp",
            Value::Key(_) => "object key",
            Value::Metadata(_) => "metadata",
            Value::Batch(_) => "batch",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Int(i) => Some(*i != 0),
            Value::Long(l) => Some(*l != 0),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(i64::from(*i)),
            Value::Long(l) => Some(*l),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        self.as_i64().and_then(|v| i32::try_from(v).ok())
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Double(d) => Some(*d),
            Value::Int(i) => Some(f64::from(*i)),
            Value::Long(l) => Some(*l as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }

    pub fn as_key(&self) -> Option<ObjectKey> {
        match self {
            Value::Key(k) => Some(*k),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Long(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}
