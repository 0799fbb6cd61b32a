use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Declared type of a record field. Scalars plus arrays of scalars;
/// array fields arrive as delimited text and are split on access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    Long,
    Double,
    Boolean,
    String,
    LongArray,
    DoubleArray,
    BooleanArray,
    StringArray,
}

impl FieldType {
    pub fn is_array(self) -> bool {
        matches!(
            self,
            FieldType::LongArray
                | FieldType::DoubleArray
                | FieldType::BooleanArray
                | FieldType::StringArray
        )
    }

    /// Element type for arrays; identity for scalars.
    pub fn element(self) -> FieldType {
        match self {
            FieldType::LongArray => FieldType::Long,
            FieldType::DoubleArray => FieldType::Double,
            FieldType::BooleanArray => FieldType::Boolean,
            FieldType::StringArray => FieldType::String,
            scalar => scalar,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            FieldType::Long => "LONG",
            FieldType::Double => "DOUBLE",
            FieldType::Boolean => "BOOLEAN",
            FieldType::String => "STRING",
            FieldType::LongArray => "ARRAY<LONG>",
            FieldType::DoubleArray => "ARRAY<DOUBLE>",
            FieldType::BooleanArray => "ARRAY<BOOLEAN>",
            FieldType::StringArray => "ARRAY<STRING>",
        }
    }

    fn parse(name: &str) -> Result<FieldType, SchemaError> {
        match name.to_ascii_uppercase().as_str() {
            "LONG" => Ok(FieldType::Long),
            "DOUBLE" => Ok(FieldType::Double),
            "BOOLEAN" => Ok(FieldType::Boolean),
            "STRING" => Ok(FieldType::String),
            "ARRAY<LONG>" => Ok(FieldType::LongArray),
            "ARRAY<DOUBLE>" => Ok(FieldType::DoubleArray),
            "ARRAY<BOOLEAN>" => Ok(FieldType::BooleanArray),
            "ARRAY<STRING>" => Ok(FieldType::StringArray),
            _ => Err(SchemaError::UnsupportedType {
                type_name: name.to_string(),
            }),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Field-name → type mapping consumed by the compiler and by accessors.
/// The schema is a hint: lookups for undeclared fields return `None` and
/// callers fall back to `String`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Schema {
    fields: HashMap<String, FieldType>,
}

impl Schema {
    pub fn empty() -> Schema {
        Schema::default()
    }

    /// Parse a DDL-style declaration list: `"long LONG, strings ARRAY<STRING>"`.
    pub fn from_ddl(ddl: &str) -> Result<Schema, SchemaError> {
        let mut fields = HashMap::new();
        for entry in ddl.split(',') {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            let Some((name, type_name)) = entry.split_once(char::is_whitespace) else {
                return Err(SchemaError::MalformedField {
                    entry: entry.to_string(),
                });
            };
            fields.insert(name.to_string(), FieldType::parse(type_name.trim())?);
        }

        Ok(Schema { fields })
    }

    pub fn with_field(mut self, name: &str, field_type: FieldType) -> Schema {
        self.fields.insert(name.to_string(), field_type);
        self
    }

    pub fn field_type(&self, name: &str) -> Option<FieldType> {
        self.fields.get(name).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("unsupported field type `{type_name}`")]
    UnsupportedType { type_name: String },
    #[error("malformed schema field `{entry}`, expected `name TYPE`")]
    MalformedField { entry: String },
}
