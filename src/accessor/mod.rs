use std::collections::HashMap;

use tracing::warn;

use crate::schema::{FieldType, Schema};
use crate::value::{Value, DEFAULT_ARRAY_DELIMITER};

/// Keyed, typed access to one record's fields. Absence is signaled, not
/// thrown: every lookup on a missing key answers `None`. A present key
/// whose raw value cannot satisfy the requested type is a contract
/// violation of the accessor, not of the VM — implementations decide
/// how to degrade (the bundled one warns and yields `Null`).
///
/// Lookups take `&mut self` so implementations may cache lazily-decoded
/// fields across the repeated queries a program makes.
pub trait TraitAccessor {
    fn get(&mut self, key: &str) -> Option<Value>;
    fn get_long(&mut self, key: &str) -> Option<i64>;
    fn get_double(&mut self, key: &str) -> Option<f64>;
    fn get_boolean(&mut self, key: &str) -> Option<bool>;
}

/// Map-backed accessor over raw textual fields. Each field is decoded
/// into its schema-declared type on first access and memoized; array
/// fields are comma-split. Fields missing from the schema decode as
/// strings.
pub struct CachedMapAccessor {
    schema: Schema,
    raw: HashMap<String, String>,
    cache: HashMap<String, Value>,
}

impl CachedMapAccessor {
    pub fn new<I, K, V>(schema: &Schema, entries: I) -> CachedMapAccessor
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        CachedMapAccessor {
            schema: schema.clone(),
            raw: entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            cache: HashMap::new(),
        }
    }

    fn decode(&self, key: &str, raw: &str) -> Value {
        let field_type = self.schema.field_type(key).unwrap_or(FieldType::String);
        let decoded = match field_type {
            FieldType::Long => Value::parse_long(raw),
            FieldType::Double => Value::parse_double(raw),
            FieldType::Boolean => Value::parse_boolean(raw),
            FieldType::String => Ok(Value::string(raw)),
            array => Value::split(raw, DEFAULT_ARRAY_DELIMITER, array),
        };

        match decoded {
            Ok(value) => value,
            Err(error) => {
                warn!(key, raw, %error, "field value violates its declared type");
                Value::Null
            }
        }
    }

    fn lookup(&mut self, key: &str) -> Option<&Value> {
        if !self.cache.contains_key(key) {
            let decoded = self.raw.get(key).map(|raw| self.decode(key, raw))?;
            self.cache.insert(key.to_string(), decoded);
        }
        self.cache.get(key)
    }
}

impl TraitAccessor for CachedMapAccessor {
    fn get(&mut self, key: &str) -> Option<Value> {
        self.lookup(key).cloned()
    }

    fn get_long(&mut self, key: &str) -> Option<i64> {
        match self.lookup(key) {
            Some(value) if !value.is_null() => value.to_long().ok(),
            _ => None,
        }
    }

    fn get_double(&mut self, key: &str) -> Option<f64> {
        match self.lookup(key) {
            Some(value) if !value.is_null() => value.to_double().ok(),
            _ => None,
        }
    }

    fn get_boolean(&mut self, key: &str) -> Option<bool> {
        match self.lookup(key) {
            Some(value) if !value.is_null() => value.to_boolean().ok(),
            _ => None,
        }
    }
}
