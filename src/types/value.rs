use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::error::{DatabaseError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Null,
    Integer,
    Real,
    Text,
    Blob,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Value {
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Null => DataType::Null,
            Value::Integer(_) => DataType::Integer,
            Value::Real(_) => DataType::Real,
            Value::Text(_) => DataType::Text,
            Value::Blob(_) => DataType::Blob,
        }
    }

    /// On-disk type tag. Integer vs. real is always explicit, never
    /// inferred from the payload shape.
    pub fn type_tag(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Integer(_) => 1,
            Value::Real(_) => 2,
            Value::Text(_) => 3,
            Value::Blob(_) => 4,
        }
    }

    pub fn size(&self) -> usize {
        match self {
            Value::Null => 0,
            Value::Integer(_) => 8,
            Value::Real(_) => 8,
            Value::Text(s) => s.len(),
            Value::Blob(b) => b.len(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn coerce_to_number(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Real(r) => Some(*r),
            Value::Text(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Serialized size including the type tag and any length prefix.
    pub fn serialized_size(&self) -> usize {
        match self {
            Value::Null => 1,
            Value::Integer(_) | Value::Real(_) => 1 + 8,
            Value::Text(s) => 1 + 4 + s.len(),
            Value::Blob(b) => 1 + 4 + b.len(),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(self.serialized_size());
        buffer.push(self.type_tag());
        match self {
            Value::Null => {}
            Value::Integer(i) => buffer.extend_from_slice(&i.to_le_bytes()),
            Value::Real(r) => buffer.extend_from_slice(&r.to_le_bytes()),
            Value::Text(s) => {
                buffer.extend_from_slice(&(s.len() as u32).to_le_bytes());
                buffer.extend_from_slice(s.as_bytes());
            }
            Value::Blob(b) => {
                buffer.extend_from_slice(&(b.len() as u32).to_le_bytes());
                buffer.extend_from_slice(b);
            }
        }
        buffer
    }

    /// Deserialize one value from the front of `bytes`, returning the value
    /// and the number of bytes consumed.
    pub fn read_from(bytes: &[u8]) -> Result<(Self, usize)> {
        if bytes.is_empty() {
            return Err(DatabaseError::SerializationError {
                details: "empty value bytes".to_string(),
            });
        }

        let tag = bytes[0];
        match tag {
            0 => Ok((Value::Null, 1)),
            1 => {
                let payload = fixed_payload::<8>(bytes, "integer")?;
                Ok((Value::Integer(i64::from_le_bytes(payload)), 9))
            }
            2 => {
                let payload = fixed_payload::<8>(bytes, "real")?;
                Ok((Value::Real(f64::from_le_bytes(payload)), 9))
            }
            3 => {
                let (payload, consumed) = sized_payload(bytes, "text")?;
                let text = String::from_utf8(payload.to_vec()).map_err(|_| {
                    DatabaseError::SerializationError {
                        details: "invalid UTF-8 in text value".to_string(),
                    }
                })?;
                Ok((Value::Text(text), consumed))
            }
            4 => {
                let (payload, consumed) = sized_payload(bytes, "blob")?;
                Ok((Value::Blob(payload.to_vec()), consumed))
            }
            _ => Err(DatabaseError::SerializationError {
                details: format!("unknown type tag: {}", tag),
            }),
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let (value, consumed) = Self::read_from(bytes)?;
        if consumed != bytes.len() {
            return Err(DatabaseError::SerializationError {
                details: format!(
                    "trailing bytes after value: expected {}, got {}",
                    consumed,
                    bytes.len()
                ),
            });
        }
        Ok(value)
    }
}

fn fixed_payload<const N: usize>(bytes: &[u8], kind: &str) -> Result<[u8; N]> {
    if bytes.len() < 1 + N {
        return Err(DatabaseError::SerializationError {
            details: format!("insufficient bytes for {} value", kind),
        });
    }
    let mut payload = [0u8; N];
    payload.copy_from_slice(&bytes[1..1 + N]);
    Ok(payload)
}

fn sized_payload<'a>(bytes: &'a [u8], kind: &str) -> Result<(&'a [u8], usize)> {
    if bytes.len() < 5 {
        return Err(DatabaseError::SerializationError {
            details: format!("incomplete {} length", kind),
        });
    }
    let length = u32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]) as usize;
    if bytes.len() < 5 + length {
        return Err(DatabaseError::SerializationError {
            details: format!(
                "insufficient bytes for {} value: expected {}, got {}",
                kind,
                5 + length,
                bytes.len()
            ),
        });
    }
    Ok((&bytes[5..5 + length], 5 + length))
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, Value::Null) => Some(Ordering::Equal),
            (Value::Null, _) => Some(Ordering::Less),
            (_, Value::Null) => Some(Ordering::Greater),
            (Value::Integer(a), Value::Integer(b)) => a.partial_cmp(b),
            (Value::Integer(a), Value::Real(b)) => (*a as f64).partial_cmp(b),
            (Value::Real(a), Value::Integer(b)) => a.partial_cmp(&(*b as f64)),
            (Value::Real(a), Value::Real(b)) => a.partial_cmp(b),
            (Value::Text(a), Value::Text(b)) => a.partial_cmp(b),
            (Value::Blob(a), Value::Blob(b)) => a.partial_cmp(b),
            _ => None, // Mixed types
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Real(r) => write!(f, "{}", r),
            Value::Text(s) => write!(f, "{}", s),
            Value::Blob(b) => write!(f, "BLOB({} bytes)", b.len()),
        }
    }
}
