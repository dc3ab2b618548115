// Runtime value system for the latent engine
// Values are what placeholders stand in for and what replay produces

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use itertools::Itertools;

use crate::deferred::Deferred;
use crate::error::{RuntimeError, RuntimeResult};

#[derive(Debug, Clone)]
pub enum Value {
    Nil,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(IndexMap<String, Value>),
    Function(Function),
    Class(Rc<Class>),
    Instance(Rc<Instance>),
    Deferred(Deferred),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Boolean(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Function(_) => "function",
            Value::Class(_) => "class",
            Value::Instance(_) => "instance",
            Value::Deferred(deferred) => match deferred.subject() {
                Some(subject) => subject.type_name(),
                None => "deferred",
            },
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(fl) => write!(f, "{}", fl),
            Value::String(s) => write!(f, "\"{}\"", s),
            Value::List(items) => {
                write!(f, "[{}]", items.iter().map(|item| item.to_string()).join(" "))
            }
            Value::Map(entries) => {
                let rendered = entries
                    .iter()
                    .map(|(k, v)| format!("{} {}", k, v))
                    .join(", ");
                write!(f, "{{{}}}", rendered)
            }
            Value::Function(function) => write!(f, "{}", function),
            Value::Class(class) => write!(f, "#<class {}>", class.name),
            Value::Instance(instance) => write!(f, "#<{} instance>", instance.class.name),
            Value::Deferred(deferred) => write!(f, "{}", deferred),
        }
    }
}

/// Equality forwards through resolved placeholders, so a handle that has been
/// resolved compares as its subject. Unresolved placeholders compare by
/// handle identity, as do instances and classes.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        let lhs = self.concrete();
        let rhs = other.concrete();
        match (&lhs, &rhs) {
            (Value::Nil, Value::Nil) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => a == b,
            (Value::Class(a), Value::Class(b)) => Rc::ptr_eq(a, b),
            (Value::Instance(a), Value::Instance(b)) => Rc::ptr_eq(a, b),
            (Value::Deferred(a), Value::Deferred(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

/// Positional and named call arguments, captured verbatim when the receiver
/// is an unresolved placeholder.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallArgs {
    pub positional: Vec<Value>,
    pub named: Vec<(String, Value)>,
}

impl CallArgs {
    pub fn empty() -> CallArgs {
        CallArgs::default()
    }

    pub fn positional(values: Vec<Value>) -> CallArgs {
        CallArgs {
            positional: values,
            named: Vec::new(),
        }
    }

    pub fn with_named(mut self, name: &str, value: Value) -> CallArgs {
        self.named.push((name.to_string(), value));
        self
    }

    /// Looks up a named argument.
    pub fn named_arg(&self, name: &str) -> Option<&Value> {
        self.named
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// Prepends a receiver, for bound method calls.
    pub(crate) fn with_receiver(&self, receiver: Value) -> CallArgs {
        let mut positional = Vec::with_capacity(self.positional.len() + 1);
        positional.push(receiver);
        positional.extend(self.positional.iter().cloned());
        CallArgs {
            positional,
            named: self.named.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.named.is_empty()
    }
}

#[derive(Clone)]
pub enum Function {
    Native(NativeFunction),
    Bound(Rc<BoundMethod>),
}

impl Function {
    pub fn native(
        name: &str,
        arity: Arity,
        func: impl Fn(CallArgs) -> RuntimeResult<Value> + 'static,
    ) -> Function {
        Function::Native(NativeFunction {
            name: name.to_string(),
            arity,
            func: Rc::new(func),
        })
    }

    pub fn name(&self) -> &str {
        match self {
            Function::Native(native) => &native.name,
            Function::Bound(bound) => bound.function.name(),
        }
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Function::Native(native) => native.fmt(f),
            Function::Bound(bound) => f
                .debug_struct("BoundMethod")
                .field("name", &bound.function.name())
                .finish(),
        }
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Function::Native(native) => write!(f, "#<fn {}>", native.name),
            Function::Bound(bound) => write!(f, "#<bound {}>", bound.function.name()),
        }
    }
}

impl PartialEq for Function {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            // Compare native functions by name and arity, not by function pointer
            (Function::Native(a), Function::Native(b)) => a.name == b.name && a.arity == b.arity,
            (Function::Bound(a), Function::Bound(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

#[derive(Clone)]
pub struct NativeFunction {
    pub name: String,
    pub arity: Arity,
    pub func: Rc<dyn Fn(CallArgs) -> RuntimeResult<Value>>,
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFunction")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish()
    }
}

/// A function bound to the receiver it was read off.
#[derive(Debug, Clone)]
pub struct BoundMethod {
    pub receiver: Value,
    pub function: Function,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arity {
    Fixed(usize),
    /// Minimum number of arguments
    Variadic(usize),
}

impl Arity {
    pub(crate) fn check(&self, function: &str, actual: usize) -> RuntimeResult<()> {
        let ok = match self {
            Arity::Fixed(n) => actual == *n,
            Arity::Variadic(min) => actual >= *min,
        };
        if ok {
            Ok(())
        } else {
            Err(RuntimeError::ArityMismatch {
                function: function.to_string(),
                expected: self.to_string(),
                actual,
            })
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Fixed(n) => write!(f, "{}", n),
            Arity::Variadic(min) => write!(f, "at least {}", min),
        }
    }
}

/// A class: named method table plus resolved base classes. Method lookup
/// walks the bases depth-first in declaration order.
#[derive(Debug)]
pub struct Class {
    pub name: String,
    pub bases: Vec<Rc<Class>>,
    pub methods: IndexMap<String, Function>,
}

impl Class {
    pub fn lookup(&self, name: &str) -> Option<Function> {
        if let Some(function) = self.methods.get(name) {
            return Some(function.clone());
        }
        self.bases.iter().find_map(|base| base.lookup(name))
    }

    pub fn is_subclass(this: &Rc<Class>, other: &Rc<Class>) -> bool {
        Rc::ptr_eq(this, other)
            || this
                .bases
                .iter()
                .any(|base| Class::is_subclass(base, other))
    }
}

/// An instance of a class, with mutable fields.
#[derive(Debug)]
pub struct Instance {
    pub class: Rc<Class>,
    pub fields: RefCell<IndexMap<String, Value>>,
}

/// Binary operators the engine can capture and replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Op {
    pub fn symbol(&self) -> &'static str {
        match self {
            Op::Add => "+",
            Op::Sub => "-",
            Op::Mul => "*",
            Op::Div => "/",
            Op::Mod => "%",
            Op::Pow => "**",
            Op::BitAnd => "&",
            Op::BitOr => "|",
            Op::BitXor => "^",
            Op::Shl => "<<",
            Op::Shr => ">>",
            Op::Eq => "==",
            Op::Ne => "!=",
            Op::Lt => "<",
            Op::Le => "<=",
            Op::Gt => ">",
            Op::Ge => ">=",
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn display_renders_opaque_markers() {
        let function = Value::Function(Function::native("noop", Arity::Fixed(0), |_| {
            Ok(Value::Nil)
        }));
        assert_eq!(function.to_string(), "#<fn noop>");

        let class = Value::Class(Rc::new(Class {
            name: "Widget".to_string(),
            bases: Vec::new(),
            methods: IndexMap::new(),
        }));
        assert_eq!(class.to_string(), "#<class Widget>");
    }

    #[test]
    fn display_renders_collections() {
        let list = Value::List(vec![Value::Integer(1), Value::Integer(2)]);
        assert_eq!(list.to_string(), "[1 2]");

        let mut entries = IndexMap::new();
        entries.insert("a".to_string(), Value::Integer(1));
        entries.insert("b".to_string(), Value::String("x".to_string()));
        assert_eq!(Value::Map(entries).to_string(), "{a 1, b \"x\"}");
    }

    #[test]
    fn arity_check_reports_mismatch() {
        assert!(Arity::Fixed(2).check("f", 2).is_ok());
        assert!(Arity::Variadic(1).check("f", 3).is_ok());

        let err = Arity::Fixed(2).check("f", 1).unwrap_err();
        assert_eq!(
            err,
            RuntimeError::ArityMismatch {
                function: "f".to_string(),
                expected: "2".to_string(),
                actual: 1,
            }
        );
    }

    #[test]
    fn instances_compare_by_identity() {
        let class = Rc::new(Class {
            name: "Widget".to_string(),
            bases: Vec::new(),
            methods: IndexMap::new(),
        });
        let a = Value::Instance(Rc::new(Instance {
            class: Rc::clone(&class),
            fields: RefCell::new(IndexMap::new()),
        }));
        let b = Value::Instance(Rc::new(Instance {
            class,
            fields: RefCell::new(IndexMap::new()),
        }));
        assert_eq!(a, a.clone());
        assert!(a != b);
    }
}
