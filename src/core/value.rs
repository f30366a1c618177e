use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::core::{DbError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    Null,
    Integer(i64),
    Float(f64),
    Text(String),
    Boolean(bool),
    /// Object identifier, used by catalog tables to point at relations.
    Oid(u32),
}

impl Value {
    pub fn compare(&self, other: &Value) -> Result<Ordering> {
        match (self, other) {
            // NULLS LAST
            (Value::Null, Value::Null) => Ok(Ordering::Equal),
            (Value::Null, _) => Ok(Ordering::Greater),
            (_, Value::Null) => Ok(Ordering::Less),

            (Value::Integer(a), Value::Integer(b)) => Ok(a.cmp(b)),
            (Value::Oid(a), Value::Oid(b)) => Ok(a.cmp(b)),
            (Value::Oid(a), Value::Integer(b)) => Ok(i64::from(*a).cmp(b)),
            (Value::Integer(a), Value::Oid(b)) => Ok(a.cmp(&i64::from(*b))),
            (Value::Text(a), Value::Text(b)) => Ok(a.cmp(b)),
            (Value::Boolean(a), Value::Boolean(b)) => Ok(a.cmp(b)),

            (a, b) if a.is_numeric() && b.is_numeric() => {
                let (x, y) = (a.as_f64().unwrap_or(f64::NAN), b.as_f64().unwrap_or(f64::NAN));
                Ok(match (x.is_nan(), y.is_nan()) {
                    (true, true) => Ordering::Equal,
                    (true, false) => Ordering::Greater,
                    (false, true) => Ordering::Less,
                    (false, false) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
                })
            }

            _ => Err(DbError::TypeMismatch(format!(
                "Cannot compare incompatible types: {} and {}",
                self.type_name(),
                other.type_name()
            ))),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "NULL",
            Self::Integer(_) => "INTEGER",
            Self::Float(_) => "FLOAT",
            Self::Text(_) => "TEXT",
            Self::Boolean(_) => "BOOLEAN",
            Self::Oid(_) => "OID",
        }
    }

    pub fn as_bool(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Boolean(b) => *b,
            Self::Integer(i) => *i != 0,
            Self::Float(f) => *f != 0.0 && !f.is_nan(),
            Self::Text(s) => !s.is_empty(),
            Self::Oid(o) => *o != 0,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            Self::Oid(o) => Some(i64::from(*o)),
            Self::Float(f) if f.is_finite() => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Integer(i) => Some(*i as f64),
            Self::Oid(o) => Some(f64::from(*o)),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_oid(&self) -> Option<u32> {
        match self {
            Self::Oid(o) => Some(*o),
            Self::Integer(i) => u32::try_from(*i).ok(),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Integer(_) | Self::Float(_) | Self::Oid(_))
    }

    /// Converts the value to `target`, following the implicit casts the executor allows.
    pub fn cast_to(&self, target: &DataType) -> Result<Value> {
        let cast = match (self, target) {
            (Self::Null, _) => Some(Self::Null),
            (v, t) if t.is_compatible(v) && !matches!((v, t), (Self::Integer(_), DataType::Float)) => {
                Some(v.clone())
            }
            (Self::Integer(i), DataType::Float) => Some(Self::Float(*i as f64)),
            (Self::Integer(i), DataType::Oid) => u32::try_from(*i).ok().map(Self::Oid),
            (Self::Oid(o), DataType::Integer) => Some(Self::Integer(i64::from(*o))),
            (Self::Float(f), DataType::Integer) if f.is_finite() => Some(Self::Integer(f.round() as i64)),
            (Self::Text(s), DataType::Integer) => s.trim().parse().ok().map(Self::Integer),
            (Self::Text(s), DataType::Float) => s.trim().parse().ok().map(Self::Float),
            (Self::Text(s), DataType::Oid) => s.trim().parse().ok().map(Self::Oid),
            (Self::Text(s), DataType::Boolean) => match s.trim().to_ascii_lowercase().as_str() {
                "t" | "true" | "on" | "yes" | "1" => Some(Self::Boolean(true)),
                "f" | "false" | "off" | "no" | "0" => Some(Self::Boolean(false)),
                _ => None,
            },
            (v, DataType::Text) => Some(Self::Text(v.to_string())),
            _ => None,
        };
        cast.ok_or_else(|| {
            DbError::TypeMismatch(format!(
                "cannot cast {} '{}' to {}",
                self.type_name(),
                self,
                target
            ))
        })
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Integer(a), Self::Integer(b)) => a == b,
            (Self::Oid(a), Self::Oid(b)) => a == b,
            (Self::Oid(o), Self::Integer(i)) | (Self::Integer(i), Self::Oid(o)) => i64::from(*o) == *i,
            (Self::Float(a), Self::Float(b)) => {
                if a.is_nan() && b.is_nan() {
                    return true;
                }
                (a - b).abs() < f64::EPSILON
            }
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (Self::Integer(i), Self::Float(f)) | (Self::Float(f), Self::Integer(i)) => {
                (*i as f64 - f).abs() < f64::EPSILON
            }
            _ => false,
        }
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Null, Self::Null) => Some(Ordering::Equal),
            (Self::Null, _) => Some(Ordering::Less),
            (_, Self::Null) => Some(Ordering::Greater),
            _ => self.compare(other).ok(),
        }
    }
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Self::Null => 0u8.hash(state),
            // Oid and Integer compare equal, so they must hash alike
            Self::Integer(i) => {
                1u8.hash(state);
                i.hash(state);
            }
            Self::Oid(o) => {
                1u8.hash(state);
                i64::from(*o).hash(state);
            }
            Self::Float(f) => {
                2u8.hash(state);
                f.to_bits().hash(state);
            }
            Self::Text(s) => {
                3u8.hash(state);
                s.hash(state);
            }
            Self::Boolean(b) => {
                4u8.hash(state);
                b.hash(state);
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Integer(i) => write!(f, "{}", i),
            Self::Oid(o) => write!(f, "{}", o),
            Self::Float(fl) => {
                if fl.is_nan() {
                    write!(f, "NaN")
                } else if fl.is_infinite() {
                    write!(f, "{}Infinity", if *fl > 0.0 { "" } else { "-" })
                } else {
                    write!(f, "{}", fl)
                }
            }
            Self::Text(s) => write!(f, "{}", s),
            Self::Boolean(b) => write!(f, "{}", b),
        }
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Integer,
    Float,
    Text,
    Boolean,
    Oid,
}

impl DataType {
    pub fn is_compatible(&self, value: &Value) -> bool {
        matches!(
            (self, value),
            (_, Value::Null)
                | (Self::Integer, Value::Integer(_))
                | (Self::Float, Value::Float(_) | Value::Integer(_))
                | (Self::Text, Value::Text(_))
                | (Self::Boolean, Value::Boolean(_))
                | (Self::Oid, Value::Oid(_))
        )
    }

    /// Maps a rendered SQL type name (`varchar(10)`, `int8`, `double precision`) to a column type.
    pub fn from_sql_name(name: &str) -> Option<DataType> {
        let lowered = name.trim().to_ascii_lowercase();
        let base = lowered.split('(').next().unwrap_or_default().trim();
        let data_type = match base {
            "int" | "integer" | "bigint" | "smallint" | "int2" | "int4" | "int8" | "int64"
            | "serial" | "bigserial" | "smallserial" => Self::Integer,
            "float" | "real" | "double" | "double precision" | "float4" | "float8" | "float64"
            | "numeric" | "decimal" | "dec" => Self::Float,
            "text" | "varchar" | "char" | "character" | "character varying" | "string" | "name" => {
                Self::Text
            }
            "boolean" | "bool" => Self::Boolean,
            "oid" | "regclass" => Self::Oid,
            _ => return None,
        };
        Some(data_type)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer => write!(f, "INTEGER"),
            Self::Float => write!(f, "FLOAT"),
            Self::Text => write!(f, "TEXT"),
            Self::Boolean => write!(f, "BOOLEAN"),
            Self::Oid => write!(f, "OID"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_equality() {
        assert_eq!(Value::Integer(42), Value::Integer(42));
        assert_eq!(Value::Oid(16384), Value::Integer(16384));
        assert_ne!(Value::Integer(1), Value::Integer(2));
    }

    #[test]
    fn test_value_ordering() {
        assert!(Value::Integer(1) < Value::Integer(2));
        assert!(Value::Text("a".into()) < Value::Text("b".into()));
        assert!(Value::Null < Value::Integer(0));
    }

    #[test]
    fn test_casts() {
        assert_eq!(
            Value::Text("42".into()).cast_to(&DataType::Integer).unwrap(),
            Value::Integer(42)
        );
        assert_eq!(
            Value::Text("on".into()).cast_to(&DataType::Boolean).unwrap(),
            Value::Boolean(true)
        );
        assert!(Value::Text("x".into()).cast_to(&DataType::Integer).is_err());
    }

    #[test]
    fn test_type_names() {
        assert_eq!(DataType::from_sql_name("VARCHAR(20)"), Some(DataType::Text));
        assert_eq!(DataType::from_sql_name("double precision"), Some(DataType::Float));
        assert_eq!(DataType::from_sql_name("oid"), Some(DataType::Oid));
        assert_eq!(DataType::from_sql_name("jsonb"), None);
    }
}
