// Operation dispatch: the value-like surface placeholders intercept
//
// Every operation splits the same way: an unresolved placeholder records and
// returns a fresh placeholder, a resolved one forwards, and any other value
// gets the concrete semantics.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::deferred::CapabilityView;
use crate::error::{RuntimeError, RuntimeResult};
use crate::values::{BoundMethod, CallArgs, Class, Function, Instance, Op, Value};

impl Value {
    /// Reads a member: an instance field or bound method, a class method, a
    /// map entry, or a recorded child placeholder while the receiver is
    /// unresolved.
    pub fn member(&self, name: &str) -> RuntimeResult<Value> {
        match self {
            Value::Deferred(deferred) => deferred.member(name),
            Value::Instance(instance) => {
                if let Some(value) = instance.fields.borrow().get(name) {
                    return Ok(value.clone());
                }
                match instance.class.lookup(name) {
                    Some(function) => Ok(Value::Function(Function::Bound(Rc::new(BoundMethod {
                        receiver: self.clone(),
                        function,
                    })))),
                    None => Err(RuntimeError::MemberNotFound {
                        member: name.to_string(),
                        type_name: instance.class.name.clone(),
                    }),
                }
            }
            Value::Class(class) => {
                class
                    .lookup(name)
                    .map(Value::Function)
                    .ok_or_else(|| RuntimeError::MemberNotFound {
                        member: name.to_string(),
                        type_name: class.name.clone(),
                    })
            }
            Value::Map(entries) => {
                entries
                    .get(name)
                    .cloned()
                    .ok_or_else(|| RuntimeError::MemberNotFound {
                        member: name.to_string(),
                        type_name: "map".to_string(),
                    })
            }
            other => Err(RuntimeError::TypeError {
                expected: "instance, class, map, or placeholder".to_string(),
                actual: other.type_name().to_string(),
                operation: format!("member read '{}'", name),
            }),
        }
    }

    /// Writes an instance field, forwarding through a resolved placeholder.
    pub fn set_member(&self, name: &str, value: Value) -> RuntimeResult<()> {
        match self {
            Value::Instance(instance) => {
                instance.fields.borrow_mut().insert(name.to_string(), value);
                Ok(())
            }
            Value::Deferred(deferred) => match CapabilityView::of(deferred).subject() {
                Some(subject) => subject.set_member(name, value),
                None => Err(RuntimeError::UnsupportedOperation {
                    operation: "member write".to_string(),
                    type_name: "unresolved placeholder".to_string(),
                }),
            },
            other => Err(RuntimeError::UnsupportedOperation {
                operation: "member write".to_string(),
                type_name: other.type_name().to_string(),
            }),
        }
    }

    /// Calls a function, instantiates a class, or records the invocation on
    /// an unresolved placeholder.
    pub fn invoke(&self, args: CallArgs) -> RuntimeResult<Value> {
        match self {
            Value::Deferred(deferred) => deferred.invoke(args),
            Value::Function(function) => call_function(function, args),
            Value::Class(class) => instantiate(class, args),
            other => Err(RuntimeError::NotCallable(other.type_name().to_string())),
        }
    }

    /// Applies a binary operator. If either operand is an unresolved
    /// placeholder, the operation is recorded on it and a placeholder for
    /// the result comes back.
    pub fn apply(&self, op: Op, rhs: &Value) -> RuntimeResult<Value> {
        if let Value::Deferred(deferred) = self {
            return deferred.apply(op, rhs, false);
        }
        if let Value::Deferred(deferred) = rhs {
            if !deferred.is_resolved() {
                return deferred.apply(op, self, true);
            }
        }
        apply_concrete(self, op, &rhs.concrete())
    }

    /// Subtype-membership test against a class value.
    pub fn is_instance_of(&self, class_value: &Value) -> RuntimeResult<bool> {
        let class = match class_value.concrete() {
            Value::Class(class) => class,
            other => {
                return Err(RuntimeError::TypeError {
                    expected: "class".to_string(),
                    actual: other.type_name().to_string(),
                    operation: "instance check".to_string(),
                })
            }
        };
        match self.concrete() {
            Value::Instance(instance) => Ok(Class::is_subclass(&instance.class, &class)),
            _ => Ok(false),
        }
    }

    /// Unwraps chains of resolved placeholders down to the real value.
    /// Unresolved placeholders come back unchanged.
    pub fn concrete(&self) -> Value {
        match self {
            Value::Deferred(deferred) => match CapabilityView::of(deferred).subject() {
                Some(subject) => subject.concrete(),
                None => self.clone(),
            },
            _ => self.clone(),
        }
    }
}

fn call_function(function: &Function, args: CallArgs) -> RuntimeResult<Value> {
    match function {
        Function::Native(native) => {
            native.arity.check(&native.name, args.positional.len())?;
            (native.func)(args)
        }
        Function::Bound(bound) => {
            call_function(&bound.function, args.with_receiver(bound.receiver.clone()))
        }
    }
}

/// Builds an instance and runs the class's `init` method with the instance
/// bound as receiver, looked up through the base classes.
fn instantiate(class: &Rc<Class>, args: CallArgs) -> RuntimeResult<Value> {
    let instance = Value::Instance(Rc::new(Instance {
        class: Rc::clone(class),
        fields: RefCell::new(IndexMap::new()),
    }));
    match class.lookup("init") {
        Some(init) => {
            call_function(&init, args.with_receiver(instance.clone()))?;
        }
        None => {
            if !args.is_empty() {
                return Err(RuntimeError::ArityMismatch {
                    function: format!("{}()", class.name),
                    expected: "0 (no init method)".to_string(),
                    actual: args.positional.len(),
                });
            }
        }
    }
    Ok(instance)
}

/// The explicit "derive a type" operation. With concrete bases the class is
/// built immediately; with an unresolved placeholder among the bases the
/// derivation is captured on that base's world and a placeholder for the
/// future class comes back.
pub fn derive_class(
    name: &str,
    bases: Vec<Value>,
    body: Vec<(String, Function)>,
) -> RuntimeResult<Value> {
    let deferred_base = bases.iter().find_map(|base| match base {
        Value::Deferred(deferred) if !deferred.is_resolved() => Some(deferred.clone()),
        _ => None,
    });
    match deferred_base {
        Some(origin) => origin.derive(name, bases, body),
        None => build_class(name, bases, body),
    }
}

/// Builds the concrete class, concretizing any resolved placeholder bases.
pub(crate) fn build_class(
    name: &str,
    bases: Vec<Value>,
    body: Vec<(String, Function)>,
) -> RuntimeResult<Value> {
    let mut resolved_bases = Vec::with_capacity(bases.len());
    for base in bases {
        match base.concrete() {
            Value::Class(class) => resolved_bases.push(class),
            other => {
                return Err(RuntimeError::TypeError {
                    expected: "class".to_string(),
                    actual: other.type_name().to_string(),
                    operation: format!("derive class '{}'", name),
                })
            }
        }
    }
    Ok(Value::Class(Rc::new(Class {
        name: name.to_string(),
        bases: resolved_bases,
        methods: body.into_iter().collect(),
    })))
}

pub(crate) fn apply_concrete(lhs: &Value, op: Op, rhs: &Value) -> RuntimeResult<Value> {
    match op {
        Op::Eq => return Ok(Value::Boolean(lhs == rhs)),
        Op::Ne => return Ok(Value::Boolean(lhs != rhs)),
        _ => {}
    }
    match (lhs, rhs) {
        (Value::Integer(a), Value::Integer(b)) => apply_integer(*a, op, *b),
        (Value::Float(a), Value::Float(b)) => apply_float(*a, op, *b),
        (Value::Integer(a), Value::Float(b)) => apply_float(*a as f64, op, *b),
        (Value::Float(a), Value::Integer(b)) => apply_float(*a, op, *b as f64),
        (Value::String(a), Value::String(b)) => apply_string(a, op, b),
        _ => Err(RuntimeError::TypeError {
            expected: "number or string operands".to_string(),
            actual: format!("{} {} {}", lhs.type_name(), op.symbol(), rhs.type_name()),
            operation: op.symbol().to_string(),
        }),
    }
}

fn apply_integer(a: i64, op: Op, b: i64) -> RuntimeResult<Value> {
    let value = match op {
        Op::Add => Value::Integer(a + b),
        Op::Sub => Value::Integer(a - b),
        Op::Mul => Value::Integer(a * b),
        Op::Div => {
            if b == 0 {
                return Err(RuntimeError::DivisionByZero);
            }
            Value::Integer(a / b)
        }
        Op::Mod => {
            if b == 0 {
                return Err(RuntimeError::DivisionByZero);
            }
            Value::Integer(a % b)
        }
        Op::Pow => {
            if b < 0 {
                let exp = i32::try_from(b).map_err(|_| integer_overflow(a, op, b))?;
                Value::Float((a as f64).powi(exp))
            } else {
                let exp = u32::try_from(b).map_err(|_| integer_overflow(a, op, b))?;
                Value::Integer(a.checked_pow(exp).ok_or_else(|| integer_overflow(a, op, b))?)
            }
        }
        Op::BitAnd => Value::Integer(a & b),
        Op::BitOr => Value::Integer(a | b),
        Op::BitXor => Value::Integer(a ^ b),
        Op::Shl => {
            let shift = u32::try_from(b).map_err(|_| integer_overflow(a, op, b))?;
            Value::Integer(a.checked_shl(shift).ok_or_else(|| integer_overflow(a, op, b))?)
        }
        Op::Shr => {
            let shift = u32::try_from(b).map_err(|_| integer_overflow(a, op, b))?;
            Value::Integer(a.checked_shr(shift).ok_or_else(|| integer_overflow(a, op, b))?)
        }
        Op::Eq => Value::Boolean(a == b),
        Op::Ne => Value::Boolean(a != b),
        Op::Lt => Value::Boolean(a < b),
        Op::Le => Value::Boolean(a <= b),
        Op::Gt => Value::Boolean(a > b),
        Op::Ge => Value::Boolean(a >= b),
    };
    Ok(value)
}

fn integer_overflow(a: i64, op: Op, b: i64) -> RuntimeError {
    RuntimeError::ArithmeticOverflow {
        operation: format!("{} {} {}", a, op.symbol(), b),
    }
}

fn apply_float(a: f64, op: Op, b: f64) -> RuntimeResult<Value> {
    let value = match op {
        Op::Add => Value::Float(a + b),
        Op::Sub => Value::Float(a - b),
        Op::Mul => Value::Float(a * b),
        Op::Div => {
            if b == 0.0 {
                return Err(RuntimeError::DivisionByZero);
            }
            Value::Float(a / b)
        }
        Op::Mod => Value::Float(a % b),
        Op::Pow => Value::Float(a.powf(b)),
        Op::BitAnd | Op::BitOr | Op::BitXor | Op::Shl | Op::Shr => {
            return Err(RuntimeError::TypeError {
                expected: "integer operands".to_string(),
                actual: "float".to_string(),
                operation: op.symbol().to_string(),
            })
        }
        Op::Eq => Value::Boolean(a == b),
        Op::Ne => Value::Boolean(a != b),
        Op::Lt => Value::Boolean(a < b),
        Op::Le => Value::Boolean(a <= b),
        Op::Gt => Value::Boolean(a > b),
        Op::Ge => Value::Boolean(a >= b),
    };
    Ok(value)
}

fn apply_string(a: &str, op: Op, b: &str) -> RuntimeResult<Value> {
    let value = match op {
        Op::Add => Value::String(format!("{}{}", a, b)),
        Op::Eq => Value::Boolean(a == b),
        Op::Ne => Value::Boolean(a != b),
        Op::Lt => Value::Boolean(a < b),
        Op::Le => Value::Boolean(a <= b),
        Op::Gt => Value::Boolean(a > b),
        Op::Ge => Value::Boolean(a >= b),
        _ => {
            return Err(RuntimeError::TypeError {
                expected: "number operands".to_string(),
                actual: "string".to_string(),
                operation: op.symbol().to_string(),
            })
        }
    };
    Ok(value)
}
