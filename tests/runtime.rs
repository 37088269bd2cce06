//! Operator-contract scenarios exercised through the facade, the way
//! emitted code drives it.

use curbside::runtime::value::{cbool, cstr};
use curbside::runtime::{
    builtins, HostObject, ObjectRef, RuntimeError, StringCompareMode, Support, SupportSettings,
    Value,
};

fn s(text: &str) -> Value {
    Value::String(text.into())
}

#[test]
fn eq_contract() {
    let support = Support::default();
    assert_eq!(
        support.eq(&Value::Empty, &Value::Integer(0)).unwrap(),
        Value::Bool(true)
    );
    assert_eq!(support.eq(&Value::Empty, &s("")).unwrap(), Value::Bool(true));
    assert_eq!(
        support.eq(&Value::Empty, &Value::Bool(false)).unwrap(),
        Value::Bool(true)
    );
    assert_eq!(support.eq(&Value::Null, &Value::Integer(0)).unwrap(), Value::Null);
    assert_eq!(
        support.eq(&Value::Bool(true), &Value::Integer(-1)).unwrap(),
        Value::Bool(true)
    );
    assert_eq!(
        support.eq(&Value::Bool(true), &Value::Integer(1)).unwrap(),
        Value::Bool(false)
    );
}

#[test]
fn add_widening_contract() {
    let support = Support::default();
    assert_eq!(
        support
            .add(&Value::Integer(30_000), &Value::Integer(30_000))
            .unwrap(),
        Value::Long(60_000)
    );
    assert_eq!(
        support.add(
            &Value::Currency(i64::MAX),
            &Value::Currency(10_000)
        ),
        Err(RuntimeError::Overflow)
    );
}

#[test]
fn default_member_normalisation() {
    struct Recordish;
    impl HostObject for Recordish {
        fn class_name(&self) -> Option<String> {
            Some("Recordish".into())
        }
        fn default_value(&self) -> Option<Value> {
            Some(Value::Integer(3))
        }
    }
    let support = Support::default();
    let object = Value::Object(ObjectRef::new(Recordish));
    // operators see through the default member
    assert_eq!(
        support.add(&object, &Value::Integer(4)).unwrap(),
        Value::Integer(7)
    );
    assert_eq!(
        builtins::typename(&object),
        Value::String("Recordish".into())
    );
}

#[test]
fn string_compare_mode_reaches_strcomp_and_ordering() {
    let support = Support::new(SupportSettings {
        string_compare_mode: StringCompareMode::Text,
        ..SupportSettings::default()
    });
    assert_eq!(
        support.strcomp(&s("abc"), &s("ABC")).unwrap(),
        Value::Integer(0)
    );
    assert_eq!(support.lt(&s("a"), &s("B")).unwrap(), Value::Bool(true));

    let binary = Support::default();
    assert_eq!(
        binary.strcomp(&s("abc"), &s("ABC")).unwrap(),
        Value::Integer(1)
    );
    // binary-ordinal EQ is unaffected by the mode switch
    assert_eq!(binary.eq(&s("abc"), &s("ABC")).unwrap(), Value::Bool(false));
}

#[test]
fn trap_protocol_round_trip() {
    let mut support = Support::default();
    let token = support.get_error_trapping_token();
    assert_eq!(support.live_error_tokens(), 1);

    // inactive: handleError releases and rethrows
    let error = support
        .handle_error(token, |s| {
            s.div(&Value::Integer(1), &Value::Integer(0)).map(|_| ())
        })
        .unwrap_err();
    assert_eq!(error, RuntimeError::DivisionByZero);
    assert_eq!(support.live_error_tokens(), 0);

    // active: the error is recorded and swallowed, and a trapped
    // condition evaluates as true
    let token = support.get_error_trapping_token();
    support.start_error_trapping_and_clear_any_error(token);
    support
        .handle_error(token, |s| {
            s.div(&Value::Integer(1), &Value::Integer(0)).map(|_| ())
        })
        .unwrap();
    assert_eq!(
        support.trapped_error(),
        Some(&RuntimeError::DivisionByZero)
    );
    let answer = support
        .if_guarded(token, |s| s.eq(&Value::Null, &Value::Integer(1)))
        .unwrap();
    // Null conditions raise, and the trapped raise counts as true
    assert!(answer);

    // stopping clears the slot; release returns the token to the pool
    support.stop_error_trapping_and_clear_any_error(token);
    assert_eq!(support.trapped_error(), None);
    support.release_error_trapping_token(token);
    assert_eq!(support.live_error_tokens(), 0);
}

#[test]
fn one_error_slot_regardless_of_nesting() {
    let mut support = Support::default();
    let outer = support.get_error_trapping_token();
    let inner = support.get_error_trapping_token();
    support.start_error_trapping_and_clear_any_error(outer);
    support.start_error_trapping_and_clear_any_error(inner);
    support
        .handle_error(outer, |_| Err(RuntimeError::Overflow))
        .unwrap();
    support
        .handle_error(inner, |_| Err(RuntimeError::TypeMismatch))
        .unwrap();
    // the newest trapped error overwrote the slot
    assert_eq!(support.trapped_error(), Some(&RuntimeError::TypeMismatch));
    support.release_error_trapping_token(inner);
    support.release_error_trapping_token(outer);
}

#[test]
fn raise_error_carries_number_and_description() {
    let support = Support::default();
    let error = support.raise_error(1001, "customer not found");
    assert_eq!(error.number(), 1001);
    assert!(error.to_string().contains("customer not found"));
    assert_eq!(RuntimeError::TypeMismatch.number(), 13);
    assert_eq!(RuntimeError::DivisionByZero.number(), 11);
}

#[test]
fn coercion_round_trips_used_by_emitted_code() {
    assert_eq!(cstr(&Value::Bool(true)).unwrap(), s("True"));
    assert_eq!(cbool(&s(" TRUE ")).unwrap(), Value::Bool(true));
    assert_eq!(cbool(&Value::Integer(2)).unwrap(), Value::Bool(true));
    assert_eq!(
        builtins::len(&Value::Integer(1234)).unwrap(),
        Value::Long(4)
    );
}

#[test]
fn set_and_call_reach_host_objects() {
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Bag {
        stored: Rc<RefCell<Option<Value>>>,
    }
    impl HostObject for Bag {
        fn get(&self, member: &str, _args: &[Value]) -> Result<Value, RuntimeError> {
            if member.eq_ignore_ascii_case("item") {
                Ok(self.stored.borrow().clone().unwrap_or(Value::Empty))
            } else {
                Err(RuntimeError::TypeMismatch)
            }
        }
        fn set(
            &mut self,
            member: &str,
            _args: &[Value],
            value: Value,
        ) -> Result<(), RuntimeError> {
            if member.eq_ignore_ascii_case("item") {
                *self.stored.borrow_mut() = Some(value);
                Ok(())
            } else {
                Err(RuntimeError::TypeMismatch)
            }
        }
    }

    let mut support = Support::default();
    let bag = Value::Object(ObjectRef::new(Bag::default()));
    support
        .set(Value::Integer(7), &bag, Some("item"), &[])
        .unwrap();
    assert_eq!(support.call(&bag, &["item"], &[]).unwrap(), Value::Integer(7));
    assert_eq!(
        support.set(Value::Integer(1), &Value::Nothing, Some("item"), &[]),
        Err(RuntimeError::ObjectRequired)
    );
}
