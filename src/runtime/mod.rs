//! The runtime support facade the emitted code calls into.
//!
//! One `Support` instance serves one request. It is deliberately not
//! thread-safe: the trapped-error slot, the trap-token table and the
//! disposables registry are single-threaded per-request state.
//! Construct before interpretation, drop after; dropping runs the
//! registered cleanups in reverse registration order and swallows their
//! failures.

pub mod builtins;
pub mod error;
pub mod ops;
pub mod trap;
pub mod value;

pub use self::error::RuntimeError;
pub use self::ops::StringCompareMode;
pub use self::trap::TrapState;
pub use self::value::{ArrayRef, HostObject, ObjectRef, Value};

use self::trap::TokenTable;
use self::value::{clng, val};

#[derive(Clone, Debug)]
pub struct SupportSettings {
    /// The facade-wide switch tests use: when false, `handleError`
    /// rethrows even under an active trap
    pub enable_error_trapping: bool,
    pub string_compare_mode: StringCompareMode,
}

impl Default for SupportSettings {
    fn default() -> SupportSettings {
        SupportSettings {
            enable_error_trapping: true,
            string_compare_mode: StringCompareMode::Binary,
        }
    }
}

pub struct Support {
    settings: SupportSettings,
    tokens: TokenTable,
    /// the one current trapped error, however many traps are nested
    trapped_error: Option<RuntimeError>,
    disposables: Vec<ObjectRef>,
}

impl Default for Support {
    fn default() -> Support {
        Support::new(SupportSettings::default())
    }
}

impl Support {
    pub fn new(settings: SupportSettings) -> Support {
        Support {
            settings,
            tokens: TokenTable::default(),
            trapped_error: None,
            disposables: Vec::new(),
        }
    }

    // ----- operators -------------------------------------------------

    pub fn add(&self, a: &Value, b: &Value) -> Result<Value, RuntimeError> {
        ops::add(a, b)
    }

    pub fn subt(&self, a: &Value, b: &Value) -> Result<Value, RuntimeError> {
        ops::subt(a, b)
    }

    pub fn negate(&self, a: &Value) -> Result<Value, RuntimeError> {
        ops::negate(a)
    }

    pub fn mult(&self, a: &Value, b: &Value) -> Result<Value, RuntimeError> {
        ops::mult(a, b)
    }

    pub fn div(&self, a: &Value, b: &Value) -> Result<Value, RuntimeError> {
        ops::div(a, b)
    }

    pub fn intdiv(&self, a: &Value, b: &Value) -> Result<Value, RuntimeError> {
        ops::intdiv(a, b)
    }

    pub fn modulo(&self, a: &Value, b: &Value) -> Result<Value, RuntimeError> {
        ops::modulo(a, b)
    }

    pub fn pow(&self, a: &Value, b: &Value) -> Result<Value, RuntimeError> {
        ops::pow(a, b)
    }

    pub fn concat(&self, a: &Value, b: &Value) -> Result<Value, RuntimeError> {
        ops::concat(a, b)
    }

    pub fn eq(&self, a: &Value, b: &Value) -> Result<Value, RuntimeError> {
        ops::eq(a, b)
    }

    pub fn noteq(&self, a: &Value, b: &Value) -> Result<Value, RuntimeError> {
        ops::noteq(a, b)
    }

    pub fn lt(&self, a: &Value, b: &Value) -> Result<Value, RuntimeError> {
        ops::lt(a, b, self.settings.string_compare_mode)
    }

    pub fn lte(&self, a: &Value, b: &Value) -> Result<Value, RuntimeError> {
        ops::lte(a, b, self.settings.string_compare_mode)
    }

    pub fn gt(&self, a: &Value, b: &Value) -> Result<Value, RuntimeError> {
        ops::gt(a, b, self.settings.string_compare_mode)
    }

    pub fn gte(&self, a: &Value, b: &Value) -> Result<Value, RuntimeError> {
        ops::gte(a, b, self.settings.string_compare_mode)
    }

    pub fn is(&self, a: &Value, b: &Value) -> Result<Value, RuntimeError> {
        ops::is(a, b)
    }

    pub fn and(&self, a: &Value, b: &Value) -> Result<Value, RuntimeError> {
        ops::and(a, b)
    }

    pub fn or(&self, a: &Value, b: &Value) -> Result<Value, RuntimeError> {
        ops::or(a, b)
    }

    pub fn xor(&self, a: &Value, b: &Value) -> Result<Value, RuntimeError> {
        ops::xor(a, b)
    }

    pub fn eqv(&self, a: &Value, b: &Value) -> Result<Value, RuntimeError> {
        ops::eqv(a, b)
    }

    pub fn imp(&self, a: &Value, b: &Value) -> Result<Value, RuntimeError> {
        ops::imp(a, b)
    }

    pub fn not(&self, a: &Value) -> Result<Value, RuntimeError> {
        ops::not(a)
    }

    // ----- value plumbing --------------------------------------------

    pub fn val(&self, value: &Value) -> Result<Value, RuntimeError> {
        val(value)
    }

    /// Require an object reference
    pub fn obj(&self, value: &Value) -> Result<Value, RuntimeError> {
        match value {
            Value::Object(_) | Value::Nothing => Ok(value.clone()),
            _ => Err(RuntimeError::ObjectRequired),
        }
    }

    /// Coerce to a number (loop bounds and the like)
    pub fn num(&self, value: &Value) -> Result<Value, RuntimeError> {
        let value = val(value)?;
        match &value {
            Value::Null => Err(RuntimeError::InvalidUseOfNull),
            Value::Empty => Ok(Value::Integer(0)),
            Value::Bool(b) => Ok(Value::Integer(if *b { -1 } else { 0 })),
            Value::Date(d) => Ok(Value::Double(*d)),
            Value::String(_) => value::cdbl(&value),
            other if other.is_numeric() => Ok(other.clone()),
            _ => Err(RuntimeError::TypeMismatch),
        }
    }

    pub fn str(&self, value: &Value) -> Result<Value, RuntimeError> {
        value::cstr(value)
    }

    /// Boolean of a condition value; the trapping variant of `IF` is
    /// `if_guarded`
    pub fn if_value(&self, value: &Value) -> Result<bool, RuntimeError> {
        match value::cbool(value)? {
            Value::Bool(b) => Ok(b),
            _ => unreachable!(),
        }
    }

    /// `IF(evaluator, token)`: run the evaluator under the trap; a
    /// trapped error counts as true
    pub fn if_guarded(
        &mut self,
        token: usize,
        evaluator: impl FnOnce(&mut Support) -> Result<Value, RuntimeError>,
    ) -> Result<bool, RuntimeError> {
        let outcome = evaluator(self).and_then(|value| self.if_value(&value));
        match outcome {
            Ok(answer) => Ok(answer),
            Err(error) => {
                if self.settings.enable_error_trapping
                    && self.tokens.state(token) == TrapState::ResumeNext
                {
                    self.set_error(error);
                    Ok(true)
                } else {
                    self.tokens.release(token);
                    Err(error)
                }
            }
        }
    }

    // ----- calls, sets, arrays, objects ------------------------------

    /// Polymorphic call: walk the member chain off the target, then
    /// apply the arguments (member invocation or array indexing)
    pub fn call(
        &mut self,
        target: &Value,
        members: &[&str],
        args: &[Value],
    ) -> Result<Value, RuntimeError> {
        let mut current = target.clone();
        if let Some((last, walk)) = members.split_last() {
            for member in walk {
                current = self.member_get(&current, member, &[])?;
            }
            return self.member_get(&current, last, args);
        }
        if args.is_empty() {
            return val(&current);
        }
        self.apply_arguments(&current, args)
    }

    fn member_get(
        &self,
        target: &Value,
        member: &str,
        args: &[Value],
    ) -> Result<Value, RuntimeError> {
        match target {
            Value::Object(object) => object.0.borrow().get(member, args),
            Value::Nothing => Err(RuntimeError::ObjectRequired),
            _ => Err(RuntimeError::ObjectRequired),
        }
    }

    /// Arguments applied directly to a value: array indexing, or a
    /// default-member invocation on an object
    fn apply_arguments(&self, target: &Value, args: &[Value]) -> Result<Value, RuntimeError> {
        match target {
            Value::Array(array) => self.index_array(array, args),
            Value::Object(object) => object.0.borrow().get("", args),
            Value::Nothing => Err(RuntimeError::ObjectRequired),
            _ => Err(RuntimeError::TypeMismatch),
        }
    }

    fn index_array(&self, array: &ArrayRef, args: &[Value]) -> Result<Value, RuntimeError> {
        let mut current = Value::Array(array.clone());
        for arg in args {
            let index = match clng(arg)? {
                Value::Long(n) => n,
                _ => unreachable!(),
            };
            let next = match &current {
                Value::Array(inner) => {
                    let data = inner.0.borrow();
                    if index < 0 || index as usize >= data.len() {
                        return Err(RuntimeError::Raised {
                            number: 9,
                            description: "subscript out of range".into(),
                        });
                    }
                    data[index as usize].clone()
                }
                _ => return Err(RuntimeError::TypeMismatch),
            };
            current = next;
        }
        Ok(current)
    }

    /// Member or element assignment
    pub fn set(
        &mut self,
        value: Value,
        target: &Value,
        member: Option<&str>,
        args: &[Value],
    ) -> Result<(), RuntimeError> {
        match member {
            Some(member) => match target {
                Value::Object(object) => object.0.borrow_mut().set(member, args, value),
                Value::Nothing => Err(RuntimeError::ObjectRequired),
                _ => Err(RuntimeError::ObjectRequired),
            },
            None => match target {
                Value::Array(array) => {
                    if args.is_empty() {
                        return Err(RuntimeError::TypeMismatch);
                    }
                    let (last, walk) = args.split_last().unwrap();
                    let container = if walk.is_empty() {
                        Value::Array(array.clone())
                    } else {
                        self.index_array(array, walk)?
                    };
                    let index = match clng(last)? {
                        Value::Long(n) => n,
                        _ => unreachable!(),
                    };
                    match &container {
                        Value::Array(inner) => {
                            let mut data = inner.0.borrow_mut();
                            if index < 0 || index as usize >= data.len() {
                                return Err(RuntimeError::Raised {
                                    number: 9,
                                    description: "subscript out of range".into(),
                                });
                            }
                            data[index as usize] = value;
                            Ok(())
                        }
                        _ => Err(RuntimeError::TypeMismatch),
                    }
                }
                _ => Err(RuntimeError::TypeMismatch),
            },
        }
    }

    /// Register a freshly constructed object; objects that support
    /// deterministic cleanup are disposed, in reverse registration
    /// order, when the request ends
    pub fn new_object(&mut self, object: ObjectRef) -> Value {
        if object.0.borrow().supports_disposal() {
            self.disposables.push(object.clone());
        }
        Value::Object(object)
    }

    /// `Dim a(5)` makes six slots: dimensions are upper bounds
    pub fn new_array(&self, dimensions: &[Value]) -> Result<Value, RuntimeError> {
        if dimensions.is_empty() {
            return Ok(Value::Array(ArrayRef::new(Vec::new())));
        }
        let (first, rest) = dimensions.split_first().unwrap();
        let bound = match clng(first)? {
            Value::Long(n) => n,
            _ => unreachable!(),
        };
        if bound < 0 {
            return Err(RuntimeError::Raised {
                number: 9,
                description: "subscript out of range".into(),
            });
        }
        let mut elements = Vec::with_capacity(bound as usize + 1);
        for _ in 0..=bound {
            elements.push(if rest.is_empty() {
                Value::Empty
            } else {
                self.new_array(rest)?
            });
        }
        Ok(Value::Array(ArrayRef::new(elements)))
    }

    /// `ReDim [Preserve]`: replaces the outermost extent
    pub fn resize_array(
        &self,
        current: &Value,
        preserve: bool,
        dimensions: &[Value],
    ) -> Result<Value, RuntimeError> {
        let fresh = self.new_array(dimensions)?;
        if !preserve {
            return Ok(fresh);
        }
        if let (Value::Array(old), Value::Array(new)) = (current, &fresh) {
            let old = old.0.borrow();
            let mut new_data = new.0.borrow_mut();
            let keep = old.len().min(new_data.len());
            new_data[..keep].clone_from_slice(&old[..keep]);
        }
        Ok(fresh)
    }

    /// Items for `For Each`
    pub fn enumerable(&self, value: &Value) -> Result<Vec<Value>, RuntimeError> {
        match value {
            Value::Array(array) => Ok(array.0.borrow().clone()),
            Value::Object(object) => object
                .0
                .borrow()
                .enumerate()
                .ok_or(RuntimeError::TypeMismatch),
            _ => Err(RuntimeError::TypeMismatch),
        }
    }

    // ----- the error-trap protocol -----------------------------------

    /// Allocate a token in the trap-inactive state
    pub fn get_error_trapping_token(&mut self) -> usize {
        self.tokens.acquire()
    }

    pub fn release_error_trapping_token(&mut self, token: usize) {
        self.tokens.release(token);
    }

    pub fn start_error_trapping_and_clear_any_error(&mut self, token: usize) {
        self.tokens.set_state(token, TrapState::ResumeNext);
        self.clear_any_error();
    }

    pub fn stop_error_trapping_and_clear_any_error(&mut self, token: usize) {
        self.tokens.set_state(token, TrapState::Goto0);
        self.clear_any_error();
    }

    pub fn set_error(&mut self, error: RuntimeError) {
        self.trapped_error = Some(error);
    }

    pub fn clear_any_error(&mut self) {
        self.trapped_error = None;
    }

    /// The single current trapped error (the `Err` object's source)
    pub fn trapped_error(&self) -> Option<&RuntimeError> {
        self.trapped_error.as_ref()
    }

    /// Raise a script error by number
    pub fn raise_error(&self, number: i32, description: &str) -> RuntimeError {
        RuntimeError::Raised {
            number,
            description: description.into(),
        }
    }

    /// Run `action`; under an active trap the error is recorded and
    /// swallowed, otherwise the token is released and the error
    /// propagates
    pub fn handle_error(
        &mut self,
        token: usize,
        action: impl FnOnce(&mut Support) -> Result<(), RuntimeError>,
    ) -> Result<(), RuntimeError> {
        match action(self) {
            Ok(()) => Ok(()),
            Err(error) => {
                if self.settings.enable_error_trapping
                    && self.tokens.state(token) == TrapState::ResumeNext
                {
                    self.set_error(error);
                    Ok(())
                } else {
                    self.tokens.release(token);
                    Err(error)
                }
            }
        }
    }

    /// Live trap tokens, exposed for the pool-invariant tests
    pub fn live_error_tokens(&self) -> usize {
        self.tokens.live()
    }

    // ----- library builtins ------------------------------------------

    pub fn strcomp(&self, a: &Value, b: &Value) -> Result<Value, RuntimeError> {
        builtins::strcomp(a, b, self.settings.string_compare_mode)
    }
}

impl Drop for Support {
    fn drop(&mut self) {
        // reverse registration order; one bad object cannot stop the
        // rest
        while let Some(object) = self.disposables.pop() {
            let _ = object.0.borrow_mut().dispose();
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn trapped_error_is_swallowed_and_recorded() {
        let mut support = Support::default();
        let token = support.get_error_trapping_token();
        support.start_error_trapping_and_clear_any_error(token);
        let result = support.handle_error(token, |_| Err(RuntimeError::DivisionByZero));
        assert_eq!(result, Ok(()));
        assert_eq!(support.trapped_error(), Some(&RuntimeError::DivisionByZero));
        support.release_error_trapping_token(token);
        assert_eq!(support.live_error_tokens(), 0);
    }

    #[test]
    fn untrapped_error_releases_and_rethrows() {
        let mut support = Support::default();
        let token = support.get_error_trapping_token();
        let result = support.handle_error(token, |_| Err(RuntimeError::TypeMismatch));
        assert_eq!(result, Err(RuntimeError::TypeMismatch));
        assert_eq!(support.live_error_tokens(), 0);
    }

    #[test]
    fn disabled_trapping_rethrows_even_when_active() {
        let mut support = Support::new(SupportSettings {
            enable_error_trapping: false,
            ..SupportSettings::default()
        });
        let token = support.get_error_trapping_token();
        support.start_error_trapping_and_clear_any_error(token);
        let result = support.handle_error(token, |_| Err(RuntimeError::Overflow));
        assert_eq!(result, Err(RuntimeError::Overflow));
    }

    #[test]
    fn guarded_if_treats_a_trapped_error_as_true() {
        let mut support = Support::default();
        let token = support.get_error_trapping_token();
        support.start_error_trapping_and_clear_any_error(token);
        let answer = support
            .if_guarded(token, |_| Err(RuntimeError::TypeMismatch))
            .unwrap();
        assert!(answer);
        let answer = support
            .if_guarded(token, |_| Ok(Value::Bool(false)))
            .unwrap();
        assert!(!answer);
        support.release_error_trapping_token(token);
    }

    #[test]
    fn error_slot_clears_on_start_stop_and_clear() {
        let mut support = Support::default();
        let token = support.get_error_trapping_token();
        support.set_error(RuntimeError::Overflow);
        support.start_error_trapping_and_clear_any_error(token);
        assert_eq!(support.trapped_error(), None);
        support.set_error(RuntimeError::Overflow);
        support.stop_error_trapping_and_clear_any_error(token);
        assert_eq!(support.trapped_error(), None);
        support.set_error(RuntimeError::Overflow);
        support.clear_any_error();
        assert_eq!(support.trapped_error(), None);
        support.release_error_trapping_token(token);
    }

    #[test]
    fn arrays_are_upper_bound_sized_and_resize_preserves() {
        let support = Support::default();
        let array = support.new_array(&[Value::Integer(2)]).unwrap();
        // three slots, 0 through 2
        assert_eq!(
            support.enumerable(&array).unwrap(),
            vec![Value::Empty, Value::Empty, Value::Empty]
        );
        let mut support = Support::default();
        support
            .set(Value::Integer(9), &array, None, &[Value::Integer(1)])
            .unwrap();
        let grown = support
            .resize_array(&array, true, &[Value::Integer(4)])
            .unwrap();
        assert_eq!(
            support
                .call(&grown, &[], &[Value::Integer(1)])
                .unwrap(),
            Value::Integer(9)
        );
        let shrunk = support
            .resize_array(&grown, false, &[Value::Integer(0)])
            .unwrap();
        assert_eq!(
            support.call(&shrunk, &[], &[Value::Integer(0)]).unwrap(),
            Value::Empty
        );
    }

    #[test]
    fn out_of_range_subscript() {
        let mut support = Support::default();
        let array = support.new_array(&[Value::Integer(1)]).unwrap();
        let error = support
            .call(&array, &[], &[Value::Integer(5)])
            .unwrap_err();
        assert_eq!(error.number(), 9);
    }

    #[test]
    fn member_chain_calls() {
        struct Inner;
        impl HostObject for Inner {
            fn get(&self, member: &str, _args: &[Value]) -> Result<Value, RuntimeError> {
                if member == "leaf" {
                    Ok(Value::Integer(5))
                } else {
                    Err(RuntimeError::TypeMismatch)
                }
            }
        }
        struct Outer(ObjectRef);
        impl HostObject for Outer {
            fn get(&self, member: &str, _args: &[Value]) -> Result<Value, RuntimeError> {
                if member == "child" {
                    Ok(Value::Object(self.0.clone()))
                } else {
                    Err(RuntimeError::TypeMismatch)
                }
            }
        }
        let mut support = Support::default();
        let outer = Value::Object(ObjectRef::new(Outer(ObjectRef::new(Inner))));
        assert_eq!(
            support.call(&outer, &["child", "leaf"], &[]).unwrap(),
            Value::Integer(5)
        );
        assert_eq!(
            support.call(&Value::Nothing, &["x"], &[]),
            Err(RuntimeError::ObjectRequired)
        );
    }

    #[test]
    fn disposal_runs_in_reverse_order_and_swallows_failures() {
        struct Tracked {
            id: usize,
            log: Rc<RefCell<Vec<usize>>>,
            fail: bool,
        }
        impl HostObject for Tracked {
            fn supports_disposal(&self) -> bool {
                true
            }
            fn dispose(&mut self) -> Result<(), RuntimeError> {
                self.log.borrow_mut().push(self.id);
                if self.fail {
                    Err(RuntimeError::TypeMismatch)
                } else {
                    Ok(())
                }
            }
        }
        let log = Rc::new(RefCell::new(Vec::new()));
        {
            let mut support = Support::default();
            for id in 0..3 {
                support.new_object(ObjectRef::new(Tracked {
                    id,
                    log: log.clone(),
                    fail: id == 2,
                }));
            }
        }
        assert_eq!(*log.borrow(), vec![2, 1, 0]);
    }

    #[test]
    fn num_and_if_value() {
        let support = Support::default();
        assert_eq!(support.num(&Value::Empty).unwrap(), Value::Integer(0));
        assert_eq!(
            support.num(&Value::String("2.5".into())).unwrap(),
            Value::Double(2.5)
        );
        assert_eq!(
            support.num(&Value::Null),
            Err(RuntimeError::InvalidUseOfNull)
        );
        assert!(support.if_value(&Value::Integer(1)).unwrap());
        assert!(!support.if_value(&Value::Empty).unwrap());
        assert_eq!(
            support.if_value(&Value::Null),
            Err(RuntimeError::InvalidUseOfNull)
        );
    }
}
