use serde::{Deserialize, Serialize};

use crate::types::{RowId, error::DatabaseError, error::Result, value::Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub row_id: Option<RowId>,
    pub values: Vec<Value>,
}

impl Row {
    pub fn new(values: Vec<Value>) -> Self {
        Self {
            row_id: None,
            values,
        }
    }

    pub fn with_row_id(row_id: RowId, values: Vec<Value>) -> Self {
        Self {
            row_id: Some(row_id),
            values,
        }
    }

    pub fn get_value(&self, column_index: usize) -> Option<&Value> {
        self.values.get(column_index)
    }

    pub fn set_value(&mut self, column_index: usize, value: Value) -> Result<()> {
        if column_index >= self.values.len() {
            return Err(DatabaseError::ColumnIndexOutOfBounds {
                index: column_index,
            });
        }
        self.values[column_index] = value;
        Ok(())
    }

    pub fn size(&self) -> usize {
        let mut size = 1; // has_row_id flag
        if self.row_id.is_some() {
            size += 8;
        }
        size += 4; // value_count
        for value in &self.values {
            size += value.serialized_size();
        }
        size
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(self.size());

        match self.row_id {
            Some(id) => {
                buffer.push(1);
                buffer.extend_from_slice(&id.to_le_bytes());
            }
            None => {
                buffer.push(0);
            }
        }

        buffer.extend_from_slice(&(self.values.len() as u32).to_le_bytes());

        for value in &self.values {
            buffer.extend_from_slice(&value.to_bytes());
        }

        buffer
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() {
            return Err(DatabaseError::SerializationError {
                details: "empty row bytes".to_string(),
            });
        }

        let mut cursor = 0;

        let row_id = if bytes[cursor] == 1 {
            cursor += 1;
            if cursor + 8 > bytes.len() {
                return Err(DatabaseError::SerializationError {
                    details: "incomplete row ID".to_string(),
                });
            }
            let id = RowId::from_le_bytes([
                bytes[cursor],
                bytes[cursor + 1],
                bytes[cursor + 2],
                bytes[cursor + 3],
                bytes[cursor + 4],
                bytes[cursor + 5],
                bytes[cursor + 6],
                bytes[cursor + 7],
            ]);
            cursor += 8;
            Some(id)
        } else {
            cursor += 1;
            None
        };

        if cursor + 4 > bytes.len() {
            return Err(DatabaseError::SerializationError {
                details: "incomplete value count".to_string(),
            });
        }
        let value_count = u32::from_le_bytes([
            bytes[cursor],
            bytes[cursor + 1],
            bytes[cursor + 2],
            bytes[cursor + 3],
        ]) as usize;
        cursor += 4;

        let mut values = Vec::with_capacity(value_count);
        for _ in 0..value_count {
            let (value, consumed) = Value::read_from(&bytes[cursor..])?;
            values.push(value);
            cursor += consumed;
        }

        Ok(Row { row_id, values })
    }
}
