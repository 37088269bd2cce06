//! The operator core: arithmetic with the numeric widening ladder,
//! tri-state equality, ordering, bitwise logicals with Null
//! propagation, concatenation and reference identity.

use std::cmp::Ordering;

use super::error::RuntimeError;
use super::value::{ccur, clng, coerce_f64, val, value_text, Value, CURRENCY_SCALE};

/// String comparison behaviour, handed through to `STRCOMP` and the
/// ordering operators
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum StringCompareMode {
    #[default]
    Binary,
    Text,
}

/// The widening ladder for non-currency arithmetic, narrowest first
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum NumericRank {
    Byte,
    Integer,
    Long,
    Single,
    Double,
}

fn rank_of(value: &Value) -> NumericRank {
    match value {
        Value::Byte(_) => NumericRank::Byte,
        Value::Empty | Value::Bool(_) | Value::Integer(_) => NumericRank::Integer,
        Value::Long(_) => NumericRank::Long,
        Value::Single(_) => NumericRank::Single,
        // strings coerce all the way up
        _ => NumericRank::Double,
    }
}

fn fits(rank: NumericRank, n: f64) -> bool {
    match rank {
        NumericRank::Byte => n.trunc() == n && (0.0..=255.0).contains(&n),
        NumericRank::Integer => {
            n.trunc() == n && n >= f64::from(i16::MIN) && n <= f64::from(i16::MAX)
        }
        NumericRank::Long => n.trunc() == n && n >= f64::from(i32::MIN) && n <= f64::from(i32::MAX),
        NumericRank::Single => n.is_finite() && n.abs() <= f64::from(f32::MAX),
        NumericRank::Double => n.is_finite(),
    }
}

fn make(rank: NumericRank, n: f64) -> Value {
    match rank {
        NumericRank::Byte => Value::Byte(n as u8),
        NumericRank::Integer => Value::Integer(n as i16),
        NumericRank::Long => Value::Long(n as i32),
        NumericRank::Single => Value::Single(n as f32),
        NumericRank::Double => Value::Double(n),
    }
}

/// Place a result in the narrowest type at or above `at_least` that can
/// hold it, widening further on overflow; past Double is an error
fn narrow(at_least: NumericRank, n: f64) -> Result<Value, RuntimeError> {
    let ranks = [
        NumericRank::Byte,
        NumericRank::Integer,
        NumericRank::Long,
        NumericRank::Single,
        NumericRank::Double,
    ];
    for rank in ranks.into_iter().filter(|r| *r >= at_least) {
        if fits(rank, n) {
            return Ok(make(rank, n));
        }
    }
    Err(RuntimeError::Overflow)
}

/// Checked fixed-point arithmetic when Currency is involved
fn currency_arithmetic(
    a: &Value,
    b: &Value,
    op: impl Fn(i128, i128) -> Option<i128>,
) -> Result<Value, RuntimeError> {
    let a = match ccur(a)? {
        Value::Currency(n) => n,
        _ => unreachable!(),
    };
    let b = match ccur(b)? {
        Value::Currency(n) => n,
        _ => unreachable!(),
    };
    let result = op(i128::from(a), i128::from(b)).ok_or(RuntimeError::Overflow)?;
    i64::try_from(result)
        .map(Value::Currency)
        .map_err(|_| RuntimeError::Overflow)
}

pub fn add(a: &Value, b: &Value) -> Result<Value, RuntimeError> {
    let a = val(a)?;
    let b = val(b)?;
    match (&a, &b) {
        (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
        (Value::Empty, Value::Empty) => Ok(Value::Integer(0)),
        (Value::Empty, other) | (other, Value::Empty) => Ok(other.clone()),
        (Value::String(x), Value::String(y)) => {
            let mut joined = x.clone();
            joined.push_str(y);
            Ok(Value::String(joined))
        }
        // date plus numeric adds days
        (Value::Date(d), other) | (other, Value::Date(d)) => {
            Ok(Value::Date(d + coerce_f64(other)?))
        }
        (Value::Currency(_), _) | (_, Value::Currency(_)) => {
            currency_arithmetic(&a, &b, |x, y| x.checked_add(y))
        }
        _ => {
            let rank = rank_of(&a).max(rank_of(&b));
            narrow(rank, coerce_f64(&a)? + coerce_f64(&b)?)
        }
    }
}

pub fn subt(a: &Value, b: &Value) -> Result<Value, RuntimeError> {
    let a = val(a)?;
    let b = val(b)?;
    match (&a, &b) {
        (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
        (Value::Date(x), Value::Date(y)) => Ok(Value::Double(x - y)),
        (Value::Date(d), other) => Ok(Value::Date(d - coerce_f64(other)?)),
        (Value::Currency(_), _) | (_, Value::Currency(_)) => {
            currency_arithmetic(&a, &b, |x, y| x.checked_sub(y))
        }
        _ => {
            let rank = rank_of(&a).max(rank_of(&b));
            narrow(rank, coerce_f64(&a)? - coerce_f64(&b)?)
        }
    }
}

/// Unary minus
pub fn negate(a: &Value) -> Result<Value, RuntimeError> {
    let a = val(a)?;
    match &a {
        Value::Null => Ok(Value::Null),
        Value::Currency(n) => n
            .checked_neg()
            .map(Value::Currency)
            .ok_or(RuntimeError::Overflow),
        Value::Date(d) => Ok(Value::Date(-d)),
        other => narrow(rank_of(other), -coerce_f64(other)?),
    }
}

pub fn mult(a: &Value, b: &Value) -> Result<Value, RuntimeError> {
    let a = val(a)?;
    let b = val(b)?;
    match (&a, &b) {
        (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
        (Value::Currency(_), _) | (_, Value::Currency(_)) => currency_arithmetic(&a, &b, |x, y| {
            x.checked_mul(y).map(|n| n / i128::from(CURRENCY_SCALE))
        }),
        _ => {
            let rank = rank_of(&a).max(rank_of(&b));
            narrow(rank, coerce_f64(&a)? * coerce_f64(&b)?)
        }
    }
}

/// `/` always divides in floating point
pub fn div(a: &Value, b: &Value) -> Result<Value, RuntimeError> {
    let a = val(a)?;
    let b = val(b)?;
    if matches!(a, Value::Null) || matches!(b, Value::Null) {
        return Ok(Value::Null);
    }
    let denominator = coerce_f64(&b)?;
    if denominator == 0.0 {
        return Err(RuntimeError::DivisionByZero);
    }
    Ok(Value::Double(coerce_f64(&a)? / denominator))
}

/// `\` divides on Longs, truncating toward zero
pub fn intdiv(a: &Value, b: &Value) -> Result<Value, RuntimeError> {
    let a = val(a)?;
    let b = val(b)?;
    if matches!(a, Value::Null) || matches!(b, Value::Null) {
        return Ok(Value::Null);
    }
    let x = match clng(&a)? {
        Value::Long(n) => n,
        _ => unreachable!(),
    };
    let y = match clng(&b)? {
        Value::Long(n) => n,
        _ => unreachable!(),
    };
    if y == 0 {
        return Err(RuntimeError::DivisionByZero);
    }
    Ok(Value::Long(x.wrapping_div(y)))
}

/// Integer remainder, sign of the dividend
pub fn modulo(a: &Value, b: &Value) -> Result<Value, RuntimeError> {
    let a = val(a)?;
    let b = val(b)?;
    if matches!(a, Value::Null) || matches!(b, Value::Null) {
        return Ok(Value::Null);
    }
    let x = match clng(&a)? {
        Value::Long(n) => n,
        _ => unreachable!(),
    };
    let y = match clng(&b)? {
        Value::Long(n) => n,
        _ => unreachable!(),
    };
    if y == 0 {
        return Err(RuntimeError::DivisionByZero);
    }
    Ok(Value::Long(x.wrapping_rem(y)))
}

pub fn pow(a: &Value, b: &Value) -> Result<Value, RuntimeError> {
    let a = val(a)?;
    let b = val(b)?;
    if matches!(a, Value::Null) || matches!(b, Value::Null) {
        return Ok(Value::Null);
    }
    let result = coerce_f64(&a)?.powf(coerce_f64(&b)?);
    if !result.is_finite() {
        return Err(RuntimeError::Overflow);
    }
    Ok(Value::Double(result))
}

/// `&`: only `Null & Null` stays Null; a lone Null contributes ""
pub fn concat(a: &Value, b: &Value) -> Result<Value, RuntimeError> {
    let a = val(a)?;
    let b = val(b)?;
    if matches!(a, Value::Null) && matches!(b, Value::Null) {
        return Ok(Value::Null);
    }
    let mut text = side_text(&a)?;
    text.push_str(&side_text(&b)?);
    Ok(Value::String(text))
}

fn side_text(value: &Value) -> Result<String, RuntimeError> {
    match value {
        Value::Null | Value::Empty => Ok(String::new()),
        other => value_text(other),
    }
}

/// The tri-state equality helper: `None` means Null
pub fn eq_tristate(a: &Value, b: &Value) -> Result<Option<bool>, RuntimeError> {
    let a = val(a)?;
    let b = val(b)?;
    let answer = match (&a, &b) {
        (Value::Null, _) | (_, Value::Null) => None,
        (Value::Empty, Value::Empty) => Some(true),
        // Empty equals each primitive's default
        (Value::Empty, other) | (other, Value::Empty) => Some(is_default_value(other)),
        (Value::Bool(x), Value::Bool(y)) => Some(x == y),
        (Value::Bool(x), other) | (other, Value::Bool(x)) if other.is_numeric() => {
            let n = other.numeric_f64().unwrap();
            Some(if *x { n == -1.0 } else { n == 0.0 })
        }
        (x, y) if x.is_numeric() && y.is_numeric() => {
            Some(x.numeric_f64().unwrap() == y.numeric_f64().unwrap())
        }
        (Value::String(x), Value::String(y)) => Some(x == y),
        (Value::Date(x), Value::Date(y)) => Some(x == y),
        // cross-type numeric/string, numeric/date and string/date have
        // no special case and are simply unequal
        (x, Value::String(_)) | (Value::String(_), x) if x.is_numeric() => Some(false),
        (x, Value::Date(_)) | (Value::Date(_), x) if x.is_numeric() => Some(false),
        (Value::String(_), Value::Date(_)) | (Value::Date(_), Value::String(_)) => Some(false),
        _ => return Err(RuntimeError::UnsupportedComparison),
    };
    Ok(answer)
}

pub fn eq(a: &Value, b: &Value) -> Result<Value, RuntimeError> {
    Ok(match eq_tristate(a, b)? {
        None => Value::Null,
        Some(answer) => Value::Bool(answer),
    })
}

pub fn noteq(a: &Value, b: &Value) -> Result<Value, RuntimeError> {
    Ok(match eq_tristate(a, b)? {
        None => Value::Null,
        Some(answer) => Value::Bool(!answer),
    })
}

/// Three-way ordering; `None` means Null
fn order(
    a: &Value,
    b: &Value,
    mode: StringCompareMode,
) -> Result<Option<Ordering>, RuntimeError> {
    let a = val(a)?;
    let b = val(b)?;
    if matches!(a, Value::Null) || matches!(b, Value::Null) {
        return Ok(None);
    }
    if eq_tristate(&a, &b)? == Some(true) {
        return Ok(Some(Ordering::Equal));
    }
    let answer = match (&a, &b) {
        (Value::String(x), Value::String(y)) => string_ordering(x, y, mode),
        // a non-empty string is greater than any non-string; an empty
        // string collapses to numeric zero
        (Value::String(x), other) => {
            if x.is_empty() {
                compare_doubles(0.0, comparison_f64(other)?)
            } else {
                Ordering::Greater
            }
        }
        (other, Value::String(y)) => {
            if y.is_empty() {
                compare_doubles(comparison_f64(other)?, 0.0)
            } else {
                Ordering::Less
            }
        }
        (x, y) => compare_doubles(comparison_f64(x)?, comparison_f64(y)?),
    };
    Ok(Some(answer))
}

fn comparison_f64(value: &Value) -> Result<f64, RuntimeError> {
    match value {
        Value::Empty => Ok(0.0),
        Value::Bool(b) => Ok(if *b { -1.0 } else { 0.0 }),
        Value::Date(d) => Ok(*d),
        other if other.is_numeric() => Ok(other.numeric_f64().unwrap()),
        _ => Err(RuntimeError::UnsupportedComparison),
    }
}

fn compare_doubles(x: f64, y: f64) -> Ordering {
    x.partial_cmp(&y).unwrap_or(Ordering::Equal)
}

pub fn string_ordering(x: &str, y: &str, mode: StringCompareMode) -> Ordering {
    match mode {
        StringCompareMode::Binary => x.cmp(y),
        StringCompareMode::Text => x.to_lowercase().cmp(&y.to_lowercase()),
    }
}

fn ordered(
    a: &Value,
    b: &Value,
    mode: StringCompareMode,
    accept: impl Fn(Ordering) -> bool,
) -> Result<Value, RuntimeError> {
    Ok(match order(a, b, mode)? {
        None => Value::Null,
        Some(ordering) => Value::Bool(accept(ordering)),
    })
}

pub fn lt(a: &Value, b: &Value, mode: StringCompareMode) -> Result<Value, RuntimeError> {
    ordered(a, b, mode, |o| o == Ordering::Less)
}

pub fn lte(a: &Value, b: &Value, mode: StringCompareMode) -> Result<Value, RuntimeError> {
    ordered(a, b, mode, |o| o != Ordering::Greater)
}

pub fn gt(a: &Value, b: &Value, mode: StringCompareMode) -> Result<Value, RuntimeError> {
    ordered(a, b, mode, |o| o == Ordering::Greater)
}

pub fn gte(a: &Value, b: &Value, mode: StringCompareMode) -> Result<Value, RuntimeError> {
    ordered(a, b, mode, |o| o != Ordering::Less)
}

fn is_default_value(value: &Value) -> bool {
    match value {
        Value::Bool(b) => !*b,
        Value::String(s) => s.is_empty(),
        other if other.is_numeric() => other.numeric_f64() == Some(0.0),
        _ => false,
    }
}

/// Reference identity; both sides must be object references
pub fn is(a: &Value, b: &Value) -> Result<Value, RuntimeError> {
    match (a, b) {
        (Value::Nothing, Value::Nothing) => Ok(Value::Bool(true)),
        (Value::Object(x), Value::Object(y)) => Ok(Value::Bool(x.ptr_eq(y))),
        (Value::Object(_), Value::Nothing) | (Value::Nothing, Value::Object(_)) => {
            Ok(Value::Bool(false))
        }
        _ => Err(RuntimeError::ObjectRequired),
    }
}

/// A logical operand: its bits and whether it forces the Long width
fn logical_operand(value: &Value) -> Result<Option<(i32, bool)>, RuntimeError> {
    let value = val(value)?;
    match &value {
        Value::Null => Ok(None),
        Value::Empty => Ok(Some((0, false))),
        Value::Bool(b) => Ok(Some((if *b { -1 } else { 0 }, false))),
        Value::Byte(n) => Ok(Some((i32::from(*n), false))),
        Value::Integer(n) => Ok(Some((i32::from(*n), false))),
        other => match clng(other)? {
            Value::Long(n) => Ok(Some((n, true))),
            _ => unreachable!(),
        },
    }
}

fn make_logical(bits: i32, long: bool, both_bool: bool) -> Value {
    if both_bool {
        Value::Bool(bits != 0)
    } else if long {
        Value::Long(bits)
    } else {
        Value::Integer(bits as i16)
    }
}

fn both_bool(a: &Value, b: &Value) -> bool {
    matches!(val(a), Ok(Value::Bool(_))) && matches!(val(b), Ok(Value::Bool(_)))
}

pub fn and(a: &Value, b: &Value) -> Result<Value, RuntimeError> {
    let bools = both_bool(a, b);
    let x = logical_operand(a)?;
    let y = logical_operand(b)?;
    match (x, y) {
        (Some((x, lx)), Some((y, ly))) => Ok(make_logical(x & y, lx || ly, bools)),
        // Null And false is false; Null And true stays Null
        (Some((0, long)), None) | (None, Some((0, long))) => {
            Ok(make_logical(0, long, matches!(val(a), Ok(Value::Bool(_))) || matches!(val(b), Ok(Value::Bool(_)))))
        }
        _ => Ok(Value::Null),
    }
}

pub fn or(a: &Value, b: &Value) -> Result<Value, RuntimeError> {
    let bools = both_bool(a, b);
    let x = logical_operand(a)?;
    let y = logical_operand(b)?;
    match (x, y) {
        (Some((x, lx)), Some((y, ly))) => Ok(make_logical(x | y, lx || ly, bools)),
        // Null Or true is true; anything less certain stays Null
        (Some((-1, long)), None) | (None, Some((-1, long))) => {
            Ok(make_logical(-1, long, matches!(val(a), Ok(Value::Bool(_))) || matches!(val(b), Ok(Value::Bool(_)))))
        }
        _ => Ok(Value::Null),
    }
}

pub fn xor(a: &Value, b: &Value) -> Result<Value, RuntimeError> {
    let bools = both_bool(a, b);
    match (logical_operand(a)?, logical_operand(b)?) {
        (Some((x, lx)), Some((y, ly))) => Ok(make_logical(x ^ y, lx || ly, bools)),
        _ => Ok(Value::Null),
    }
}

pub fn eqv(a: &Value, b: &Value) -> Result<Value, RuntimeError> {
    let bools = both_bool(a, b);
    match (logical_operand(a)?, logical_operand(b)?) {
        (Some((x, lx)), Some((y, ly))) => Ok(make_logical(!(x ^ y), lx || ly, bools)),
        _ => Ok(Value::Null),
    }
}

pub fn imp(a: &Value, b: &Value) -> Result<Value, RuntimeError> {
    let bools = both_bool(a, b);
    match (logical_operand(a)?, logical_operand(b)?) {
        (Some((x, lx)), Some((y, ly))) => Ok(make_logical(!x | y, lx || ly, bools)),
        _ => Ok(Value::Null),
    }
}

pub fn not(a: &Value) -> Result<Value, RuntimeError> {
    let is_bool = matches!(val(a), Ok(Value::Bool(_)));
    match logical_operand(a)? {
        Some((x, long)) => Ok(make_logical(!x, long, is_bool)),
        None => Ok(Value::Null),
    }
}
