//! The string-builtin subset of the runtime library surface. Each
//! follows the VBScript rules: `Null` flows through string functions,
//! one-based indexing, `Empty` behaves as its coerced default.

use super::error::RuntimeError;
use super::ops::{string_ordering, StringCompareMode};
use super::value::{clng, cstr, val, Value};

fn text_operand(value: &Value) -> Result<Option<String>, RuntimeError> {
    match val(value)? {
        Value::Null => Ok(None),
        other => match cstr(&other)? {
            Value::String(s) => Ok(Some(s)),
            _ => unreachable!(),
        },
    }
}

fn index_operand(value: &Value) -> Result<i32, RuntimeError> {
    match clng(value)? {
        Value::Long(n) => Ok(n),
        _ => unreachable!(),
    }
}

pub fn len(value: &Value) -> Result<Value, RuntimeError> {
    Ok(match text_operand(value)? {
        None => Value::Null,
        Some(s) => Value::Long(s.chars().count() as i32),
    })
}

/// `MID(s, start[, length])`; start is one-based
pub fn mid(value: &Value, start: &Value, length: Option<&Value>) -> Result<Value, RuntimeError> {
    let text = match text_operand(value)? {
        None => return Ok(Value::Null),
        Some(s) => s,
    };
    let start = index_operand(start)?;
    if start < 1 {
        return Err(RuntimeError::Raised {
            number: 5,
            description: "invalid procedure call or argument".into(),
        });
    }
    let skipped = text.chars().skip(start as usize - 1);
    let taken: String = match length {
        Some(length) => {
            let length = index_operand(length)?;
            if length < 0 {
                return Err(RuntimeError::Raised {
                    number: 5,
                    description: "invalid procedure call or argument".into(),
                });
            }
            skipped.take(length as usize).collect()
        }
        None => skipped.collect(),
    };
    Ok(Value::String(taken))
}

pub fn left(value: &Value, length: &Value) -> Result<Value, RuntimeError> {
    let text = match text_operand(value)? {
        None => return Ok(Value::Null),
        Some(s) => s,
    };
    let length = index_operand(length)?;
    if length < 0 {
        return Err(RuntimeError::Raised {
            number: 5,
            description: "invalid procedure call or argument".into(),
        });
    }
    Ok(Value::String(text.chars().take(length as usize).collect()))
}

pub fn right(value: &Value, length: &Value) -> Result<Value, RuntimeError> {
    let text = match text_operand(value)? {
        None => return Ok(Value::Null),
        Some(s) => s,
    };
    let length = index_operand(length)?;
    if length < 0 {
        return Err(RuntimeError::Raised {
            number: 5,
            description: "invalid procedure call or argument".into(),
        });
    }
    let total = text.chars().count();
    let skip = total.saturating_sub(length as usize);
    Ok(Value::String(text.chars().skip(skip).collect()))
}

pub fn trim(value: &Value) -> Result<Value, RuntimeError> {
    Ok(match text_operand(value)? {
        None => Value::Null,
        Some(s) => Value::String(s.trim_matches(' ').to_string()),
    })
}

pub fn ltrim(value: &Value) -> Result<Value, RuntimeError> {
    Ok(match text_operand(value)? {
        None => Value::Null,
        Some(s) => Value::String(s.trim_start_matches(' ').to_string()),
    })
}

pub fn rtrim(value: &Value) -> Result<Value, RuntimeError> {
    Ok(match text_operand(value)? {
        None => Value::Null,
        Some(s) => Value::String(s.trim_end_matches(' ').to_string()),
    })
}

pub fn ucase(value: &Value) -> Result<Value, RuntimeError> {
    Ok(match text_operand(value)? {
        None => Value::Null,
        Some(s) => Value::String(s.to_uppercase()),
    })
}

pub fn lcase(value: &Value) -> Result<Value, RuntimeError> {
    Ok(match text_operand(value)? {
        None => Value::Null,
        Some(s) => Value::String(s.to_lowercase()),
    })
}

/// Three-way string comparison: -1 / 0 / 1, or Null when either side is
pub fn strcomp(
    a: &Value,
    b: &Value,
    mode: StringCompareMode,
) -> Result<Value, RuntimeError> {
    let a = match text_operand(a)? {
        None => return Ok(Value::Null),
        Some(s) => s,
    };
    let b = match text_operand(b)? {
        None => return Ok(Value::Null),
        Some(s) => s,
    };
    Ok(Value::Integer(match string_ordering(&a, &b, mode) {
        std::cmp::Ordering::Less => -1,
        std::cmp::Ordering::Equal => 0,
        std::cmp::Ordering::Greater => 1,
    }))
}

pub fn typename(value: &Value) -> Value {
    Value::String(value.type_name())
}

pub fn isnull(value: &Value) -> Value {
    Value::Bool(matches!(value, Value::Null))
}

pub fn isempty(value: &Value) -> Value {
    Value::Bool(matches!(value, Value::Empty))
}

pub fn isobject(value: &Value) -> Value {
    Value::Bool(matches!(value, Value::Object(_) | Value::Nothing))
}

pub fn isnumeric(value: &Value) -> Result<Value, RuntimeError> {
    let value = val(value)?;
    Ok(Value::Bool(match &value {
        Value::String(s) => s.trim().parse::<f64>().is_ok(),
        Value::Bool(_) | Value::Empty => true,
        other => other.is_numeric(),
    }))
}

#[cfg(test)]
mod test {
    use super::*;

    fn s(text: &str) -> Value {
        Value::String(text.into())
    }

    #[test]
    fn null_flows_through_string_functions() {
        assert_eq!(len(&Value::Null).unwrap(), Value::Null);
        assert_eq!(ucase(&Value::Null).unwrap(), Value::Null);
        assert_eq!(
            mid(&Value::Null, &Value::Integer(1), None).unwrap(),
            Value::Null
        );
        assert_eq!(
            strcomp(&Value::Null, &s("x"), StringCompareMode::Binary).unwrap(),
            Value::Null
        );
    }

    #[test]
    fn one_based_slicing() {
        assert_eq!(
            mid(&s("curbside"), &Value::Integer(5), None).unwrap(),
            s("side")
        );
        assert_eq!(
            mid(&s("curbside"), &Value::Integer(1), Some(&Value::Integer(4))).unwrap(),
            s("curb")
        );
        assert_eq!(left(&s("curbside"), &Value::Integer(4)).unwrap(), s("curb"));
        assert_eq!(right(&s("curbside"), &Value::Integer(4)).unwrap(), s("side"));
        assert_eq!(right(&s("ab"), &Value::Integer(9)).unwrap(), s("ab"));
    }

    #[test]
    fn len_counts_characters_and_coerces() {
        assert_eq!(len(&s("four")).unwrap(), Value::Long(4));
        assert_eq!(len(&Value::Integer(123)).unwrap(), Value::Long(3));
        assert_eq!(len(&Value::Empty).unwrap(), Value::Long(0));
    }

    #[test]
    fn trims_strip_spaces_only() {
        assert_eq!(trim(&s("  a  ")).unwrap(), s("a"));
        assert_eq!(ltrim(&s("  a  ")).unwrap(), s("a  "));
        assert_eq!(rtrim(&s("  a  ")).unwrap(), s("  a"));
        assert_eq!(trim(&s("\ta\t")).unwrap(), s("\ta\t"));
    }

    #[test]
    fn strcomp_modes() {
        assert_eq!(
            strcomp(&s("abc"), &s("ABC"), StringCompareMode::Binary).unwrap(),
            Value::Integer(1)
        );
        assert_eq!(
            strcomp(&s("abc"), &s("ABC"), StringCompareMode::Text).unwrap(),
            Value::Integer(0)
        );
        assert_eq!(
            strcomp(&s("a"), &s("b"), StringCompareMode::Binary).unwrap(),
            Value::Integer(-1)
        );
    }
}
