//! Null-safe operator library. Every predicate takes `(right, left)` in
//! stack pop order: the right operand (the compiled literal) is pushed
//! last and popped first, the left operand is the field value. A `Null`
//! or mismatched-variant operand makes the predicate false; nothing in
//! this module can fail.

use std::borrow::Cow;
use std::cmp::Ordering;

use crate::value::{StrValue, Value};
use crate::vm::simd;

#[inline]
fn bytes_eq(left: &[u8], right: &[u8], vectorized: bool) -> bool {
    if vectorized {
        simd::eq(left, right)
    } else {
        simd::scalar_eq(left, right)
    }
}

#[inline]
fn bytes_cmp(left: &[u8], right: &[u8], vectorized: bool) -> Ordering {
    if vectorized {
        simd::cmp(left, right)
    } else {
        simd::scalar_cmp(left, right)
    }
}

fn folded_bytes(s: &StrValue) -> Cow<'_, [u8]> {
    if s.is_lowercase() {
        Cow::Borrowed(s.as_bytes())
    } else {
        Cow::Owned(s.as_str().to_lowercase().into_bytes())
    }
}

// ── Equality ────────────────────────────────────────────────────────

pub fn long_eq(right: &Value, left: &Value) -> bool {
    matches!((left, right), (Value::Long(l), Value::Long(r)) if l == r)
}

pub fn double_eq(right: &Value, left: &Value) -> bool {
    matches!((left, right), (Value::Double(l), Value::Double(r)) if l == r)
}

pub fn boolean_eq(right: &Value, left: &Value) -> bool {
    matches!((left, right), (Value::Boolean(l), Value::Boolean(r)) if l == r)
}

pub fn string_eq(right: &Value, left: &Value, vectorized: bool) -> bool {
    match (left, right) {
        (Value::Str(l), Value::Str(r)) => bytes_eq(l.as_bytes(), r.as_bytes(), vectorized),
        _ => false,
    }
}

pub fn string_ci_eq(right: &Value, left: &Value, vectorized: bool) -> bool {
    match (left, right) {
        (Value::Str(l), Value::Str(r)) => {
            bytes_eq(&folded_bytes(l), &folded_bytes(r), vectorized)
        }
        _ => false,
    }
}

// ── Ordering ────────────────────────────────────────────────────────

macro_rules! numeric_ordering {
    ($name:ident, $variant:ident, $op:tt) => {
        pub fn $name(right: &Value, left: &Value) -> bool {
            matches!((left, right), (Value::$variant(l), Value::$variant(r)) if l $op r)
        }
    };
}

numeric_ordering!(long_lt, Long, <);
numeric_ordering!(long_le, Long, <=);
numeric_ordering!(long_gt, Long, >);
numeric_ordering!(long_ge, Long, >=);
numeric_ordering!(double_lt, Double, <);
numeric_ordering!(double_le, Double, <=);
numeric_ordering!(double_gt, Double, >);
numeric_ordering!(double_ge, Double, >=);

fn string_ordering(right: &Value, left: &Value, vectorized: bool) -> Option<Ordering> {
    match (left, right) {
        (Value::Str(l), Value::Str(r)) => {
            Some(bytes_cmp(l.as_bytes(), r.as_bytes(), vectorized))
        }
        _ => None,
    }
}

pub fn string_lt(right: &Value, left: &Value, vectorized: bool) -> bool {
    string_ordering(right, left, vectorized) == Some(Ordering::Less)
}

pub fn string_le(right: &Value, left: &Value, vectorized: bool) -> bool {
    matches!(
        string_ordering(right, left, vectorized),
        Some(Ordering::Less | Ordering::Equal)
    )
}

pub fn string_gt(right: &Value, left: &Value, vectorized: bool) -> bool {
    string_ordering(right, left, vectorized) == Some(Ordering::Greater)
}

pub fn string_ge(right: &Value, left: &Value, vectorized: bool) -> bool {
    matches!(
        string_ordering(right, left, vectorized),
        Some(Ordering::Greater | Ordering::Equal)
    )
}

// ── Pattern ─────────────────────────────────────────────────────────

/// The compiled pattern may sit on either side: the compiler pushes it
/// as the literal, but nothing stops a field from resolving first.
pub fn string_regexp_match(right: &Value, left: &Value) -> bool {
    match (left, right) {
        (Value::Str(subject), Value::Regex(pattern))
        | (Value::Regex(pattern), Value::Str(subject)) => pattern.is_match(subject.as_bytes()),
        _ => false,
    }
}

// ── Containment ─────────────────────────────────────────────────────

pub fn string_contains(right: &Value, left: &Value) -> bool {
    match (left, right) {
        (Value::Str(l), Value::Str(r)) => l.as_str().contains(r.as_str()),
        _ => false,
    }
}

pub fn string_ci_contains(right: &Value, left: &Value) -> bool {
    match (left, right) {
        (Value::Str(l), Value::Str(r)) => {
            let l = if l.is_lowercase() {
                Cow::Borrowed(l.as_str())
            } else {
                Cow::Owned(l.as_str().to_lowercase())
            };
            let r = if r.is_lowercase() {
                Cow::Borrowed(r.as_str())
            } else {
                Cow::Owned(r.as_str().to_lowercase())
            };
            l.contains(r.as_ref())
        }
        _ => false,
    }
}

pub fn long_array_contains(right: &Value, left: &Value) -> bool {
    matches!((left, right), (Value::LongArray(arr), Value::Long(v)) if arr.contains(v))
}

pub fn double_array_contains(right: &Value, left: &Value) -> bool {
    matches!((left, right), (Value::DoubleArray(arr), Value::Double(v)) if arr.contains(v))
}

pub fn boolean_array_contains(right: &Value, left: &Value) -> bool {
    matches!((left, right), (Value::BooleanArray(arr), Value::Boolean(v)) if arr.contains(v))
}

pub fn string_array_contains(right: &Value, left: &Value, vectorized: bool) -> bool {
    match (left, right) {
        (Value::StrArray(arr), Value::Str(v)) => arr
            .iter()
            .any(|element| bytes_eq(element.as_bytes(), v.as_bytes(), vectorized)),
        _ => false,
    }
}

/// Substring search across every element of a string-array field.
pub fn string_array_element_contains(right: &Value, left: &Value) -> bool {
    match (left, right) {
        (Value::StrArray(arr), Value::Str(v)) => {
            arr.iter().any(|element| element.contains(v.as_str()))
        }
        _ => false,
    }
}

// ── Membership ──────────────────────────────────────────────────────

pub fn long_in(right: &Value, left: &Value) -> bool {
    matches!((left, right), (Value::Long(v), Value::LongArray(arr)) if arr.contains(v))
}

pub fn double_in(right: &Value, left: &Value) -> bool {
    matches!((left, right), (Value::Double(v), Value::DoubleArray(arr)) if arr.contains(v))
}

pub fn boolean_in(right: &Value, left: &Value) -> bool {
    matches!((left, right), (Value::Boolean(v), Value::BooleanArray(arr)) if arr.contains(v))
}

pub fn string_in(right: &Value, left: &Value, vectorized: bool) -> bool {
    match (left, right) {
        (Value::Str(v), Value::StrArray(arr)) => arr
            .iter()
            .any(|element| bytes_eq(element.as_bytes(), v.as_bytes(), vectorized)),
        _ => false,
    }
}

// ── Intersection ────────────────────────────────────────────────────

pub fn long_array_intersects(right: &Value, left: &Value) -> bool {
    match (left, right) {
        (Value::LongArray(l), Value::LongArray(r)) => l.iter().any(|v| r.contains(v)),
        _ => false,
    }
}

pub fn double_array_intersects(right: &Value, left: &Value) -> bool {
    match (left, right) {
        (Value::DoubleArray(l), Value::DoubleArray(r)) => l.iter().any(|v| r.contains(v)),
        _ => false,
    }
}

pub fn boolean_array_intersects(right: &Value, left: &Value) -> bool {
    match (left, right) {
        (Value::BooleanArray(l), Value::BooleanArray(r)) => l.iter().any(|v| r.contains(v)),
        _ => false,
    }
}

pub fn string_array_intersects(right: &Value, left: &Value, vectorized: bool) -> bool {
    match (left, right) {
        (Value::StrArray(l), Value::StrArray(r)) => l.iter().any(|lv| {
            r.iter()
                .any(|rv| bytes_eq(lv.as_bytes(), rv.as_bytes(), vectorized))
        }),
        _ => false,
    }
}

// ── Unary ───────────────────────────────────────────────────────────

pub fn is_not_null(value: &Value) -> bool {
    !value.is_null()
}
