//! Runtime values. Lists, maps, namespaces and objects are shared by
//! reference-counted handle so mutation through one holder is visible to
//! every other holder; closures instead make a deep snapshot of their
//! defining environment at creation time.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use crate::ast::{ExprRef, Param};
use crate::env::Environment;
use crate::types::Type;

#[derive(Debug, Clone)]
pub enum Value {
    Int(i64),
    Double(f64),
    Bool(bool),
    String(String),
    Closure(Rc<ClosureValue>),
    /// A closure still missing one or more required parameters, produced by
    /// an under-arity positional call. Calling it again with the remaining
    /// arguments yields the same result as one full call would have.
    Partial(Rc<PartialValue>),
    ClassLit(Rc<ClassLitValue>),
    UnionLit(Rc<Vec<Type>>),
    Namespace(Rc<RefCell<Vec<(String, Value)>>>),
    Object(Rc<RefCell<ObjectValue>>),
    List(Rc<RefCell<Vec<Value>>>),
    Map(Rc<RefCell<Vec<(Value, Value)>>>),
    Syntax(ExprRef),
    /// Carrier for a variadic argument pack; never a user-facing literal.
    Pack(Rc<Vec<Value>>),
    /// First-class reified type, returned by `type_of`.
    TypeVal(Type),
    Unit,
}

#[derive(Debug)]
pub struct ClosureValue {
    pub params: Vec<Param>,
    pub body: ExprRef,
    pub ret: Type,
    /// Each parameter's annotation resolved to a concrete `Type` at the
    /// point the closure literal was evaluated (precomputed once so a call
    /// never has to re-resolve a `TypeExpr` against the defining scope).
    pub param_types: Vec<Type>,
    /// Deep snapshot of the lexical environment at the point the closure
    /// literal was evaluated. Not a live reference: later mutation of the
    /// outer scope is invisible to this closure.
    pub captured: Environment,
    pub bound_self: Option<Box<Value>>,
}

#[derive(Debug)]
pub struct PartialValue {
    pub closure: Rc<ClosureValue>,
    /// Parameters already bound by a previous partial call, in closure
    /// parameter order, paired with their resolved value and type.
    pub bound: Vec<(String, Value, Type)>,
}

#[derive(Debug, Clone)]
pub struct ClassLitValue {
    pub members: Vec<(String, Type, Option<Value>)>,
}

#[derive(Debug)]
pub struct ObjectValue {
    pub class: Rc<ClassLitValue>,
    pub fields: Vec<(String, Value)>,
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "Int",
            Value::Double(_) => "Double",
            Value::Bool(_) => "Bool",
            Value::String(_) => "String",
            Value::Closure(_) => "Function",
            Value::Partial(_) => "Function",
            Value::ClassLit(_) => "Type",
            Value::UnionLit(_) => "Type",
            Value::Namespace(_) => "Namespace",
            Value::Object(_) => "Object",
            Value::List(_) => "List",
            Value::Map(_) => "Map",
            Value::Syntax(_) => "Syntax",
            Value::Pack(_) => "Pack",
            Value::TypeVal(_) => "Type",
            Value::Unit => "Unit",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Double(d) => *d != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::Unit => false,
            _ => true,
        }
    }

    pub fn as_pack(&self) -> Option<&[Value]> {
        match self {
            Value::Pack(v) => Some(v),
            _ => None,
        }
    }

    /// Canonical textual form, used both for display and as the memoization
    /// key (the evaluator hashes an *expression's* canonical form, not a
    /// value's, but values are stringified identically when printed or
    /// compared for `eq`).
    pub fn stringify(&self) -> String {
        match self {
            Value::Int(i) => i.to_string(),
            Value::Double(d) => format!("{}", d),
            Value::Bool(b) => b.to_string(),
            Value::String(s) => s.clone(),
            Value::Closure(_) => "<closure>".to_string(),
            Value::Partial(_) => "<closure>".to_string(),
            Value::ClassLit(c) => {
                let mut s = "class { ".to_string();
                for (name, ty, _) in &c.members {
                    s += &format!("{}: {}; ", name, ty.text());
                }
                s += "}";
                s
            }
            Value::UnionLit(ts) => {
                let parts: Vec<String> = ts.iter().map(Type::text).collect();
                format!("union {{ {} }}", parts.join("; "))
            }
            Value::Namespace(ns) => {
                let parts: Vec<String> = ns
                    .borrow()
                    .iter()
                    .map(|(n, v)| format!("{}: {}", n, v.stringify()))
                    .collect();
                format!("namespace {{ {} }}", parts.join(", "))
            }
            Value::Object(o) => {
                let o = o.borrow();
                let parts: Vec<String> = o
                    .fields
                    .iter()
                    .map(|(n, v)| format!("{}: {}", n, v.stringify()))
                    .collect();
                format!("{{ {} }}", parts.join(", "))
            }
            Value::List(l) => {
                let parts: Vec<String> = l.borrow().iter().map(Value::stringify).collect();
                format!("[{}]", parts.join(", "))
            }
            Value::Map(m) => {
                let parts: Vec<String> = m
                    .borrow()
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k.stringify(), v.stringify()))
                    .collect();
                format!("{{{}}}", parts.join(", "))
            }
            Value::Syntax(e) => e.canonical_text(),
            Value::Pack(p) => {
                let parts: Vec<String> = p.iter().map(Value::stringify).collect();
                parts.join(", ")
            }
            Value::TypeVal(t) => t.text(),
            Value::Unit => "()".to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.stringify())
    }
}

/// Structural value equality, used by the `eq` built-in. Syntax values cannot
/// be compared for equality (they may contain un-evaluated, side-effecting
/// expressions); a `Syntax` operand is therefore an error at the call site,
/// not something this function decides on its own.
pub fn values_equal(a: &Value, b: &Value) -> Result<bool, String> {
    if matches!(a, Value::Syntax(_)) || matches!(b, Value::Syntax(_)) {
        return Err("Can't check equality of a Syntax!".to_string());
    }
    Ok(match (a, b) {
        (Value::Int(x), Value::Int(y)) => x == y,
        (Value::Double(x), Value::Double(y)) => x == y,
        (Value::Int(x), Value::Double(y)) | (Value::Double(y), Value::Int(x)) => *x as f64 == *y,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::String(x), Value::String(y)) => x == y,
        _ => a.stringify() == b.stringify(),
    })
}

/// Keys are compared by canonical textual form (per the Value data model).
pub fn map_key_eq(a: &Value, b: &Value) -> bool {
    a.stringify() == b.stringify()
}

pub fn map_get<'a>(entries: &'a [(Value, Value)], key: &Value) -> Option<&'a Value> {
    entries
        .iter()
        .find(|(k, _)| map_key_eq(k, key))
        .map(|(_, v)| v)
}

/// Used only for sorting map entries deterministically in tests/printing.
pub fn compare_keys(a: &Value, b: &Value) -> Ordering {
    a.stringify().cmp(&b.stringify())
}

/// The structural `Type` a value would be accepted at, computed from the
/// value itself rather than any declared annotation. Used at every subtype
/// check site (assignment, parameter binding, pattern matching) since this
/// language never infers types ahead of evaluation.
pub fn value_type(v: &Value) -> Type {
    use crate::types::BuiltinType;
    match v {
        Value::Int(_) => Type::Builtin(BuiltinType::Int),
        Value::Double(_) => Type::Builtin(BuiltinType::Double),
        Value::Bool(_) => Type::Builtin(BuiltinType::Bool),
        Value::String(_) => Type::Builtin(BuiltinType::String),
        Value::Closure(c) => Type::Function(c.param_types.clone(), Box::new(c.ret.clone())),
        Value::Partial(p) => {
            let remaining: Vec<Type> = p
                .closure
                .params
                .iter()
                .zip(p.closure.param_types.iter())
                .filter(|(param, _)| !p.bound.iter().any(|(n, _, _)| n == &param.name))
                .map(|(_, ty)| ty.clone())
                .collect();
            Type::Function(remaining, Box::new(p.closure.ret.clone()))
        }
        Value::ClassLit(_) | Value::UnionLit(_) | Value::TypeVal(_) => {
            Type::Builtin(BuiltinType::TypeOfType)
        }
        Value::Namespace(_) => Type::Builtin(BuiltinType::Any),
        Value::Object(o) => {
            let o = o.borrow();
            Type::Literal(crate::types::LiteralType {
                members: Rc::new(
                    o.class
                        .members
                        .iter()
                        .map(|(n, t, _)| (n.clone(), t.clone()))
                        .collect(),
                ),
            })
        }
        Value::List(_) => Type::List(Box::new(Type::Builtin(BuiltinType::Any))),
        Value::Map(_) => Type::Map(
            Box::new(Type::Builtin(BuiltinType::Any)),
            Box::new(Type::Builtin(BuiltinType::Any)),
        ),
        Value::Syntax(_) => Type::Builtin(BuiltinType::Syntax),
        Value::Pack(_) => Type::Variadic(Box::new(Type::Builtin(BuiltinType::Any))),
        Value::Unit => Type::Builtin(BuiltinType::Any),
    }
}
