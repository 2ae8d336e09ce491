//! The fixed table of `__builtin_*` names. A name with this prefix never
//! goes through ordinary name lookup: evaluating it as a bare `Expr::Name`
//! yields the name itself as a `Value::String`, which is how user code binds
//! a shorter alias (`print = __builtin_print;`) before ever calling it.
//!
//! A handful of built-ins (`and`, `or`, `conditional`, `eval`, `reset`) need
//! access to their *unevaluated* argument expressions — short-circuiting,
//! single-branch evaluation, and cache-key computation all depend on not
//! eagerly evaluating every argument the way a normal call does. Those are
//! special-cased in [`call`]; everything else evaluates its arguments eagerly
//! and dispatches on the resulting values.

use std::rc::Rc;

use crate::ast::ExprRef;
use crate::error::{PieError, TypeErrorKind};
use crate::interpreter::Interpreter;
use crate::token::Span;
use crate::value::{value_type, values_equal, Value};

pub const BUILTIN_NAMES: &[&str] = &[
    "__builtin_true",
    "__builtin_false",
    "__builtin_add",
    "__builtin_sub",
    "__builtin_mul",
    "__builtin_div",
    "__builtin_mod",
    "__builtin_pow",
    "__builtin_neg",
    "__builtin_gt",
    "__builtin_geq",
    "__builtin_eq",
    "__builtin_leq",
    "__builtin_lt",
    "__builtin_and",
    "__builtin_or",
    "__builtin_not",
    "__builtin_conditional",
    "__builtin_print",
    "__builtin_input_str",
    "__builtin_input_int",
    "__builtin_concat",
    "__builtin_len",
    "__builtin_get",
    "__builtin_push",
    "__builtin_pop",
    "__builtin_str_slice",
    "__builtin_to_int",
    "__builtin_to_double",
    "__builtin_to_string",
    "__builtin_type_of",
    "__builtin_eval",
    "__builtin_reset",
    "__builtin_panic",
];

pub fn is_builtin(name: &str) -> bool {
    BUILTIN_NAMES.contains(&name)
}

fn here() -> Span {
    Span::new(0, 0, 0)
}

fn arity(message: impl Into<String>) -> PieError {
    PieError::Arity { message: message.into(), span: here() }
}

fn bad_type(name: &str, args: &[Value]) -> PieError {
    let args_text: Vec<String> = args.iter().map(|a| a.type_name().to_string()).collect();
    PieError::Type {
        kind: TypeErrorKind::NoOverload { name: name.to_string(), args: args_text.join(", ") },
        span: here(),
    }
}

/// Dispatches a call whose callee evaluated to a `__builtin_*` name. `args`
/// and `spreads` are the raw, unevaluated call-site expressions; named
/// arguments are rejected (no built-in declares a name for one).
pub fn call(
    interp: &mut Interpreter,
    name: &str,
    positional: &[ExprRef],
    named: &[(String, ExprRef)],
    spreads: &[ExprRef],
) -> Result<Value, PieError> {
    if !named.is_empty() {
        return Err(arity(format!("`{}` takes no named arguments", name)));
    }

    match name {
        "__builtin_and" => {
            let [a, b] = require2(positional, spreads, name)?;
            let lhs = interp.eval(&a)?;
            if !lhs.is_truthy() {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(interp.eval(&b)?.is_truthy()))
        }
        "__builtin_or" => {
            let [a, b] = require2(positional, spreads, name)?;
            let lhs = interp.eval(&a)?;
            if lhs.is_truthy() {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(interp.eval(&b)?.is_truthy()))
        }
        "__builtin_conditional" => {
            let exprs = flatten(positional, spreads);
            if exprs.len() != 3 {
                return Err(arity("conditional takes exactly 3 arguments"));
            }
            let cond = interp.eval(&exprs[0])?;
            if cond.is_truthy() {
                interp.eval(&exprs[1])
            } else {
                interp.eval(&exprs[2])
            }
        }
        "__builtin_eval" => {
            let [a] = require1(positional, spreads, name)?;
            match interp.eval(&a)? {
                Value::Syntax(e) => interp.eval(&e),
                other => Ok(other),
            }
        }
        "__builtin_reset" => {
            let exprs = flatten(positional, spreads);
            if exprs.len() != 1 {
                return Err(arity("reset takes exactly 1 argument"));
            }
            let key = exprs[0].canonical_text();
            interp.env.remove(&key);
            Ok(Value::Unit)
        }
        _ => {
            let exprs = flatten(positional, spreads);
            let mut values = Vec::with_capacity(exprs.len());
            for e in &exprs {
                values.push(interp.eval(e)?);
            }
            call_builtin_values(interp, name, values)
        }
    }
}

fn flatten(positional: &[ExprRef], spreads: &[ExprRef]) -> Vec<ExprRef> {
    let mut v: Vec<ExprRef> = positional.to_vec();
    v.extend(spreads.iter().cloned());
    v
}

fn require1(positional: &[ExprRef], spreads: &[ExprRef], name: &str) -> Result<[ExprRef; 1], PieError> {
    let exprs = flatten(positional, spreads);
    match exprs.as_slice() {
        [a] => Ok([a.clone()]),
        _ => Err(arity(format!("`{}` takes exactly 1 argument", name))),
    }
}

fn require2(positional: &[ExprRef], spreads: &[ExprRef], name: &str) -> Result<[ExprRef; 2], PieError> {
    let exprs = flatten(positional, spreads);
    match exprs.as_slice() {
        [a, b] => Ok([a.clone(), b.clone()]),
        _ => Err(arity(format!("`{}` takes exactly 2 arguments", name))),
    }
}

fn as_num(v: &Value) -> Option<f64> {
    match v {
        Value::Int(i) => Some(*i as f64),
        Value::Double(d) => Some(*d),
        _ => None,
    }
}

/// `true` if both operands are `Int` (no `Double` involved), so arithmetic
/// can stay in integer space instead of round-tripping through `f64`.
fn both_int(a: &Value, b: &Value) -> Option<(i64, i64)> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Some((*x, *y)),
        _ => None,
    }
}

fn call_builtin_values(interp: &mut Interpreter, name: &str, args: Vec<Value>) -> Result<Value, PieError> {
    match name {
        "__builtin_true" => Ok(Value::Bool(true)),
        "__builtin_false" => Ok(Value::Bool(false)),

        "__builtin_add" => match args.as_slice() {
            [Value::String(a), Value::String(b)] => Ok(Value::String(format!("{}{}", a, b))),
            [a, b] => match both_int(a, b) {
                Some((x, y)) => Ok(Value::Int(x + y)),
                None => match (as_num(a), as_num(b)) {
                    (Some(x), Some(y)) => Ok(Value::Double(x + y)),
                    _ => Err(bad_type(name, &args)),
                },
            },
            _ => Err(arity("add takes exactly 2 arguments")),
        },
        "__builtin_sub" => match args.as_slice() {
            [a, b] => match both_int(a, b) {
                Some((x, y)) => Ok(Value::Int(x - y)),
                None => match (as_num(a), as_num(b)) {
                    (Some(x), Some(y)) => Ok(Value::Double(x - y)),
                    _ => Err(bad_type(name, &args)),
                },
            },
            _ => Err(arity("sub takes exactly 2 arguments")),
        },
        "__builtin_mul" => match args.as_slice() {
            [a, b] => match both_int(a, b) {
                Some((x, y)) => Ok(Value::Int(x * y)),
                None => match (as_num(a), as_num(b)) {
                    (Some(x), Some(y)) => Ok(Value::Double(x * y)),
                    _ => Err(bad_type(name, &args)),
                },
            },
            _ => Err(arity("mul takes exactly 2 arguments")),
        },
        "__builtin_div" => match args.as_slice() {
            [a, b] => match (as_num(a), as_num(b)) {
                (Some(_), Some(y)) if y == 0.0 => {
                    Err(PieError::Panic { message: "division by zero".to_string(), span: here() })
                }
                (Some(x), Some(y)) => Ok(Value::Double(x / y)),
                _ => Err(bad_type(name, &args)),
            },
            _ => Err(arity("div takes exactly 2 arguments")),
        },
        "__builtin_mod" => match args.as_slice() {
            [Value::Int(a), Value::Int(b)] => {
                if *b == 0 {
                    Err(PieError::Panic { message: "division by zero".to_string(), span: here() })
                } else {
                    Ok(Value::Int(a.rem_euclid(*b)))
                }
            }
            _ => Err(bad_type(name, &args)),
        },
        "__builtin_pow" => match args.as_slice() {
            [a, b] => match (as_num(a), as_num(b)) {
                (Some(x), Some(y)) => {
                    if matches!(a, Value::Int(_)) && matches!(b, Value::Int(_)) && y >= 0.0 {
                        Ok(Value::Int((x.powf(y)) as i64))
                    } else {
                        Ok(Value::Double(x.powf(y)))
                    }
                }
                _ => Err(bad_type(name, &args)),
            },
            _ => Err(arity("pow takes exactly 2 arguments")),
        },
        "__builtin_neg" => match args.as_slice() {
            [Value::Int(a)] => Ok(Value::Int(-a)),
            [Value::Double(a)] => Ok(Value::Double(-a)),
            _ => Err(bad_type(name, &args)),
        },

        "__builtin_gt" | "__builtin_geq" | "__builtin_leq" | "__builtin_lt" => match args.as_slice() {
            [a, b] => {
                let ord = match (as_num(a), as_num(b)) {
                    (Some(x), Some(y)) => x.partial_cmp(&y),
                    _ => match (a, b) {
                        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
                        _ => None,
                    },
                };
                let ord = ord.ok_or_else(|| bad_type(name, &args))?;
                let result = match name {
                    "__builtin_gt" => ord == std::cmp::Ordering::Greater,
                    "__builtin_geq" => ord != std::cmp::Ordering::Less,
                    "__builtin_leq" => ord != std::cmp::Ordering::Greater,
                    "__builtin_lt" => ord == std::cmp::Ordering::Less,
                    _ => unreachable!(),
                };
                Ok(Value::Bool(result))
            }
            _ => Err(arity(format!("{} takes exactly 2 arguments", name))),
        },
        "__builtin_eq" => match args.as_slice() {
            [Value::Syntax(a), Value::Syntax(b)] => Ok(Value::Bool(a.canonical_text() == b.canonical_text())),
            [Value::Syntax(a), b] | [b, Value::Syntax(a)] => Ok(Value::Bool(a.canonical_text() == b.stringify())),
            [a, b] => values_equal(a, b).map(Value::Bool).map_err(|message| PieError::Type {
                kind: TypeErrorKind::NoOverload { name: name.to_string(), args: message },
                span: here(),
            }),
            _ => Err(arity("eq takes exactly 2 arguments")),
        },

        "__builtin_not" => match args.as_slice() {
            [a] => Ok(Value::Bool(!a.is_truthy())),
            _ => Err(arity("not takes exactly 1 argument")),
        },

        "__builtin_print" => {
            let parts: Vec<String> = args.iter().map(Value::stringify).collect();
            println!("{}", parts.join(" "));
            Ok(Value::Unit)
        }
        "__builtin_input_str" => {
            let mut line = String::new();
            std::io::stdin()
                .read_line(&mut line)
                .map_err(|e| PieError::Panic { message: e.to_string(), span: here() })?;
            Ok(Value::String(line.trim_end_matches(['\n', '\r']).to_string()))
        }
        "__builtin_input_int" => {
            let mut line = String::new();
            std::io::stdin()
                .read_line(&mut line)
                .map_err(|e| PieError::Panic { message: e.to_string(), span: here() })?;
            line.trim()
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| PieError::Panic { message: "input is not an integer".to_string(), span: here() })
        }

        "__builtin_concat" => match args.as_slice() {
            [Value::String(a), Value::String(b)] => Ok(Value::String(format!("{}{}", a, b))),
            [Value::List(a), Value::List(b)] => {
                let mut v = a.borrow().clone();
                v.extend(b.borrow().iter().cloned());
                Ok(Value::List(Rc::new(std::cell::RefCell::new(v))))
            }
            _ => Err(bad_type(name, &args)),
        },
        "__builtin_len" => match args.as_slice() {
            [Value::String(s)] => Ok(Value::Int(s.chars().count() as i64)),
            [Value::List(l)] => Ok(Value::Int(l.borrow().len() as i64)),
            [Value::Map(m)] => Ok(Value::Int(m.borrow().len() as i64)),
            [Value::Pack(p)] => Ok(Value::Int(p.len() as i64)),
            _ => Err(bad_type(name, &args)),
        },
        "__builtin_get" => match args.as_slice() {
            [Value::List(l), Value::Int(i)] => l
                .borrow()
                .get(*i as usize)
                .cloned()
                .ok_or_else(|| PieError::Panic { message: format!("index {} out of bounds", i), span: here() }),
            [Value::Map(m), key] => crate::value::map_get(&m.borrow(), key)
                .cloned()
                .ok_or_else(|| PieError::Panic { message: "key not found".to_string(), span: here() }),
            _ => Err(bad_type(name, &args)),
        },
        "__builtin_push" => match args.as_slice() {
            [Value::List(l), v] => {
                l.borrow_mut().push(v.clone());
                Ok(Value::List(l.clone()))
            }
            _ => Err(bad_type(name, &args)),
        },
        "__builtin_pop" => match args.as_slice() {
            [Value::List(l)] => l
                .borrow_mut()
                .pop()
                .ok_or_else(|| PieError::Panic { message: "pop from empty list".to_string(), span: here() }),
            _ => Err(bad_type(name, &args)),
        },
        "__builtin_str_slice" => match args.as_slice() {
            [Value::String(s), Value::Int(start), Value::Int(end)] => {
                let chars: Vec<char> = s.chars().collect();
                let start = (*start).max(0) as usize;
                let end = (*end).max(0) as usize;
                if start > chars.len() || end > chars.len() || start > end {
                    return Err(PieError::Panic { message: "slice out of bounds".to_string(), span: here() });
                }
                Ok(Value::String(chars[start..end].iter().collect()))
            }
            _ => Err(bad_type(name, &args)),
        },
        "__builtin_to_int" => match args.as_slice() {
            [Value::Int(i)] => Ok(Value::Int(*i)),
            [Value::Double(d)] => Ok(Value::Int(*d as i64)),
            [Value::String(s)] => s
                .trim()
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| PieError::Panic { message: format!("'{}' is not an Int", s), span: here() }),
            _ => Err(bad_type(name, &args)),
        },
        "__builtin_to_double" => match args.as_slice() {
            [Value::Int(i)] => Ok(Value::Double(*i as f64)),
            [Value::Double(d)] => Ok(Value::Double(*d)),
            [Value::String(s)] => s
                .trim()
                .parse::<f64>()
                .map(Value::Double)
                .map_err(|_| PieError::Panic { message: format!("'{}' is not a Double", s), span: here() }),
            _ => Err(bad_type(name, &args)),
        },
        "__builtin_to_string" => match args.as_slice() {
            [v] => Ok(Value::String(v.stringify())),
            _ => Err(arity("to_string takes exactly 1 argument")),
        },

        "__builtin_type_of" => match args.as_slice() {
            [v] => Ok(Value::TypeVal(value_type(v))),
            _ => Err(arity("type_of takes exactly 1 argument")),
        },

        "__builtin_panic" => match args.as_slice() {
            [v] => Err(PieError::Panic { message: v.stringify(), span: here() }),
            _ => Err(arity("panic takes exactly 1 argument")),
        },

        _ => {
            let _ = interp;
            Err(arity(format!("unknown built-in `{}`", name)))
        }
    }
}
