use std::fmt;
use std::sync::Arc;

use regex::bytes::Regex;

use crate::schema::FieldType;

/// Delimiter used when an array field arrives as one delimited string.
pub const DEFAULT_ARRAY_DELIMITER: char = ',';

/// Runtime value. Immutable once constructed; the payload-bearing
/// variants share their payload via `Arc` so pushing a constant from a
/// program onto a VM stack is a pointer copy, not a deep clone.
///
/// `Null` is an ordinary variant — absence is checked with
/// [`Value::is_null`], never by pointer identity.
#[derive(Debug, Clone)]
pub enum Value {
    Long(i64),
    Double(f64),
    Boolean(bool),
    Str(StrValue),
    LongArray(Arc<[i64]>),
    DoubleArray(Arc<[f64]>),
    BooleanArray(Arc<[bool]>),
    StrArray(Arc<[Arc<str>]>),
    /// Schema type marker consumed by `GET_FIELD`; never a data value.
    FieldType(FieldType),
    Regex(Arc<Regex>),
    Null,
}

/// String payload with a lowercase marker. A value flagged `lowercase`
/// has already been case-folded, so case-insensitive comparisons skip
/// the fold.
#[derive(Debug, Clone)]
pub struct StrValue {
    text: Arc<str>,
    lowercase: bool,
}

impl StrValue {
    pub fn new(text: &str) -> StrValue {
        StrValue {
            text: Arc::from(text),
            lowercase: false,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.text.as_bytes()
    }

    pub fn is_lowercase(&self) -> bool {
        self.lowercase
    }

    /// Case-folded copy, flagged so it is never folded again.
    pub fn to_lowercase(&self) -> StrValue {
        if self.lowercase {
            return self.clone();
        }
        StrValue {
            text: Arc::from(self.text.to_lowercase().as_str()),
            lowercase: true,
        }
    }
}

impl Value {
    pub fn string(text: &str) -> Value {
        Value::Str(StrValue::new(text))
    }

    pub fn field_type(field_type: FieldType) -> Value {
        Value::FieldType(field_type)
    }

    pub fn parse_long(token: &str) -> Result<Value, ValueParseError> {
        token
            .parse::<i64>()
            .map(Value::Long)
            .map_err(|_| ValueParseError::Long {
                token: token.to_string(),
            })
    }

    pub fn parse_double(token: &str) -> Result<Value, ValueParseError> {
        token
            .parse::<f64>()
            .map(Value::Double)
            .map_err(|_| ValueParseError::Double {
                token: token.to_string(),
            })
    }

    pub fn parse_boolean(token: &str) -> Result<Value, ValueParseError> {
        if token.eq_ignore_ascii_case("true") {
            Ok(Value::Boolean(true))
        } else if token.eq_ignore_ascii_case("false") {
            Ok(Value::Boolean(false))
        } else {
            Err(ValueParseError::Boolean {
                token: token.to_string(),
            })
        }
    }

    pub fn parse_regex(pattern: &str) -> Result<Value, ValueParseError> {
        Regex::new(pattern)
            .map(|regex| Value::Regex(Arc::new(regex)))
            .map_err(|source| ValueParseError::Regex {
                pattern: pattern.to_string(),
                source,
            })
    }

    pub fn string_array<I, S>(elements: I) -> Value
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Value::StrArray(
            elements
                .into_iter()
                .map(|s| Arc::from(s.as_ref()))
                .collect(),
        )
    }

    pub fn long_array<I, S>(elements: I) -> Result<Value, ValueParseError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let parsed: Result<Vec<i64>, ValueParseError> = elements
            .into_iter()
            .map(|token| match Value::parse_long(token.as_ref())? {
                Value::Long(v) => Ok(v),
                _ => unreachable!(),
            })
            .collect();
        Ok(Value::LongArray(parsed?.into()))
    }

    pub fn double_array<I, S>(elements: I) -> Result<Value, ValueParseError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let parsed: Result<Vec<f64>, ValueParseError> = elements
            .into_iter()
            .map(|token| match Value::parse_double(token.as_ref())? {
                Value::Double(v) => Ok(v),
                _ => unreachable!(),
            })
            .collect();
        Ok(Value::DoubleArray(parsed?.into()))
    }

    pub fn boolean_array<I, S>(elements: I) -> Result<Value, ValueParseError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let parsed: Result<Vec<bool>, ValueParseError> = elements
            .into_iter()
            .map(|token| match Value::parse_boolean(token.as_ref())? {
                Value::Boolean(v) => Ok(v),
                _ => unreachable!(),
            })
            .collect();
        Ok(Value::BooleanArray(parsed?.into()))
    }

    /// Split a delimited string field into a typed array value.
    /// Per-element parse failures propagate unchanged.
    pub fn split(
        text: &str,
        delimiter: char,
        field_type: FieldType,
    ) -> Result<Value, ValueParseError> {
        let elements = text.split(delimiter);
        match field_type.element() {
            FieldType::Long => Value::long_array(elements),
            FieldType::Double => Value::double_array(elements),
            FieldType::Boolean => Value::boolean_array(elements),
            _ => Ok(Value::string_array(elements)),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Variant name for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Long(_) => "long",
            Value::Double(_) => "double",
            Value::Boolean(_) => "boolean",
            Value::Str(_) => "string",
            Value::LongArray(_) => "longs",
            Value::DoubleArray(_) => "doubles",
            Value::BooleanArray(_) => "booleans",
            Value::StrArray(_) => "strings",
            Value::FieldType(_) => "field-type",
            Value::Regex(_) => "regexp",
            Value::Null => "null",
        }
    }

    pub fn to_long(&self) -> Result<i64, ValueParseError> {
        match self {
            Value::Long(v) => Ok(*v),
            Value::Double(v) => Ok(*v as i64),
            Value::Boolean(v) => Ok(i64::from(*v)),
            Value::Str(s) => match Value::parse_long(s.as_str())? {
                Value::Long(v) => Ok(v),
                _ => unreachable!(),
            },
            other => Err(ValueParseError::UnsupportedConversion {
                from: other.kind(),
                to: "long",
            }),
        }
    }

    pub fn to_double(&self) -> Result<f64, ValueParseError> {
        match self {
            Value::Long(v) => Ok(*v as f64),
            Value::Double(v) => Ok(*v),
            Value::Boolean(v) => Ok(if *v { 1.0 } else { 0.0 }),
            Value::Str(s) => match Value::parse_double(s.as_str())? {
                Value::Double(v) => Ok(v),
                _ => unreachable!(),
            },
            other => Err(ValueParseError::UnsupportedConversion {
                from: other.kind(),
                to: "double",
            }),
        }
    }

    pub fn to_boolean(&self) -> Result<bool, ValueParseError> {
        match self {
            Value::Long(v) => Ok(*v != 0),
            Value::Double(v) => Ok(*v != 0.0),
            Value::Boolean(v) => Ok(*v),
            Value::Str(s) => match Value::parse_boolean(s.as_str())? {
                Value::Boolean(v) => Ok(v),
                _ => unreachable!(),
            },
            other => Err(ValueParseError::UnsupportedConversion {
                from: other.kind(),
                to: "boolean",
            }),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Long(v) => write!(f, "long({v})"),
            Value::Double(v) => write!(f, "double({v})"),
            Value::Boolean(v) => write!(f, "boolean({v})"),
            Value::Str(s) => write!(f, "string({})", s.as_str()),
            Value::LongArray(vs) => write!(f, "longs({vs:?})"),
            Value::DoubleArray(vs) => write!(f, "doubles({vs:?})"),
            Value::BooleanArray(vs) => write!(f, "booleans({vs:?})"),
            Value::StrArray(vs) => {
                write!(f, "strings([")?;
                for (i, v) in vs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, "])")
            }
            Value::FieldType(t) => write!(f, "field-type({t})"),
            Value::Regex(r) => write!(f, "regexp({})", r.as_str()),
            Value::Null => write!(f, "null"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ValueParseError {
    #[error("malformed long literal '{token}'")]
    Long { token: String },
    #[error("malformed double literal '{token}'")]
    Double { token: String },
    #[error("malformed boolean literal '{token}'")]
    Boolean { token: String },
    #[error("malformed regular expression '{pattern}': {source}")]
    Regex {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("cannot convert {from} to {to}")]
    UnsupportedConversion {
        from: &'static str,
        to: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_long_ok_and_err() {
        assert!(matches!(Value::parse_long("42"), Ok(Value::Long(42))));
        assert!(matches!(
            Value::parse_long("42.5"),
            Err(ValueParseError::Long { .. })
        ));
    }

    #[test]
    fn parse_boolean_is_strict() {
        assert!(matches!(
            Value::parse_boolean("TRUE"),
            Ok(Value::Boolean(true))
        ));
        assert!(matches!(
            Value::parse_boolean("false"),
            Ok(Value::Boolean(false))
        ));
        assert!(matches!(
            Value::parse_boolean("yes"),
            Err(ValueParseError::Boolean { .. })
        ));
    }

    #[test]
    fn conversions_between_scalar_kinds() {
        assert_eq!(Value::Boolean(true).to_long().unwrap(), 1);
        assert_eq!(Value::Long(0).to_boolean().unwrap(), false);
        assert_eq!(Value::Long(3).to_double().unwrap(), 3.0);
        assert_eq!(Value::Double(2.9).to_long().unwrap(), 2);
    }

    #[test]
    fn string_values_convert_by_parsing() {
        assert_eq!(Value::string("17").to_long().unwrap(), 17);
        assert_eq!(Value::string("true").to_boolean().unwrap(), true);
        assert!(Value::string("nope").to_long().is_err());
    }

    #[test]
    fn unsupported_conversions_fail() {
        let arr = Value::string_array(["a", "b"]);
        assert!(matches!(
            arr.to_long(),
            Err(ValueParseError::UnsupportedConversion { .. })
        ));
        assert!(matches!(
            Value::Null.to_boolean(),
            Err(ValueParseError::UnsupportedConversion { .. })
        ));
    }

    #[test]
    fn split_typed_arrays() {
        let longs = Value::split("1,2,3", DEFAULT_ARRAY_DELIMITER, FieldType::LongArray).unwrap();
        match longs {
            Value::LongArray(vs) => assert_eq!(&*vs, &[1, 2, 3]),
            other => panic!("expected longs, got {other}"),
        }

        let strings =
            Value::split("string1,string2", DEFAULT_ARRAY_DELIMITER, FieldType::StringArray)
                .unwrap();
        match strings {
            Value::StrArray(vs) => {
                assert_eq!(vs.len(), 2);
                assert_eq!(&*vs[0], "string1");
            }
            other => panic!("expected strings, got {other}"),
        }
    }

    #[test]
    fn split_propagates_element_errors() {
        assert!(Value::split("1,x,3", ',', FieldType::LongArray).is_err());
    }

    #[test]
    fn lowercase_flag_skips_refold() {
        let s = StrValue::new("MiXeD");
        let folded = s.to_lowercase();
        assert!(folded.is_lowercase());
        assert_eq!(folded.as_str(), "mixed");
        // Already folded: same payload, no second transform.
        let again = folded.to_lowercase();
        assert_eq!(again.as_str(), "mixed");
    }

    #[test]
    fn null_is_a_variant_not_an_identity() {
        assert!(Value::Null.is_null());
        assert!(!Value::Long(0).is_null());
    }
}
