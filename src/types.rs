//! The structural type system: a tagged-sum `Type` ADT with a `>=`/`>`
//! subtype relation used uniformly for assignment, parameter binding, return
//! checks, and pattern-type matching.

use std::fmt;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    Builtin(BuiltinType),
    Literal(LiteralType),
    Union(Vec<Type>),
    Function(Vec<Type>, Box<Type>),
    Variadic(Box<Type>),
    List(Box<Type>),
    Map(Box<Type>, Box<Type>),
    /// Type determined by an unevaluated expression; compared by text until
    /// the expression is evaluated at a binding site.
    Expression(String),
    /// Sentinel for "no annotation was written"; accepted by, and accepts,
    /// any write.
    TryReassign,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinType {
    Any,
    Syntax,
    Int,
    Double,
    Bool,
    String,
    TypeOfType,
}

impl fmt::Display for BuiltinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BuiltinType::Any => "Any",
            BuiltinType::Syntax => "Syntax",
            BuiltinType::Int => "Int",
            BuiltinType::Double => "Double",
            BuiltinType::Bool => "Bool",
            BuiltinType::String => "String",
            BuiltinType::TypeOfType => "Type",
        };
        write!(f, "{}", s)
    }
}

impl BuiltinType {
    pub fn from_name(name: &str) -> Option<BuiltinType> {
        Some(match name {
            "Any" => BuiltinType::Any,
            "Syntax" => BuiltinType::Syntax,
            "Int" => BuiltinType::Int,
            "Double" => BuiltinType::Double,
            "Bool" => BuiltinType::Bool,
            "String" => BuiltinType::String,
            "Type" => BuiltinType::TypeOfType,
            _ => return None,
        })
    }
}

/// A structural class-literal type: an ordered `(name, type)` member list.
#[derive(Debug, Clone, PartialEq)]
pub struct LiteralType {
    pub members: Rc<Vec<(String, Type)>>,
}

impl Type {
    pub fn text(&self) -> String {
        match self {
            Type::Builtin(b) => b.to_string(),
            Type::Literal(l) => {
                if l.members.is_empty() {
                    "class { }".to_string()
                } else {
                    let mut s = "class {\n".to_string();
                    for (name, ty) in l.members.iter() {
                        s += &format!("    {}: {};\n", name, ty.text());
                    }
                    s += "}";
                    s
                }
            }
            Type::Union(ts) => {
                let mut s = "union { ".to_string();
                for t in ts {
                    s += &format!("{}; ", t.text());
                }
                s += "}";
                s
            }
            Type::Function(params, ret) => {
                let parts: Vec<String> = params.iter().map(Type::text).collect();
                format!("({}): {}", parts.join(", "), ret.text())
            }
            Type::Variadic(t) => format!("...{}", t.text()),
            Type::List(t) => format!("{{{}}}", t.text()),
            Type::Map(k, v) => format!("{{{}: {}}}", k.text(), v.text()),
            Type::Expression(text) => text.clone(),
            Type::TryReassign => "TryReassign".to_string(),
        }
    }

    pub fn involves_name(&self, name: &str) -> bool {
        match self {
            Type::Builtin(b) => b.to_string() == name,
            Type::Literal(l) => l.members.iter().any(|(_, t)| t.involves_name(name)),
            Type::Union(ts) => ts.iter().any(|t| t.involves_name(name)),
            Type::Function(params, ret) => {
                params.iter().any(|t| t.involves_name(name)) || ret.involves_name(name)
            }
            Type::Variadic(t) | Type::List(t) => t.involves_name(name),
            Type::Map(k, v) => k.involves_name(name) || v.involves_name(name),
            Type::Expression(text) => text == name,
            Type::TryReassign => false,
        }
    }

    /// Strict supertype: `self > other`.
    pub fn supertype_of(&self, other: &Type) -> bool {
        if matches!(other, Type::TryReassign) {
            return true;
        }
        match self {
            Type::Builtin(BuiltinType::Syntax) => true,
            Type::Builtin(BuiltinType::Any) => !matches!(other, Type::Builtin(BuiltinType::Any)),
            Type::Builtin(_) => false,
            Type::Literal(l) => match other {
                Type::Literal(o) => l
                    .members
                    .iter()
                    .all(|(name, ty)| o_has_supertype_field(o, name, ty)),
                _ => false,
            },
            Type::Union(ts) => ts.iter().any(|t| t.supertype_of(other)),
            Type::Function(params, ret) => match other {
                Type::Function(oparams, oret) => {
                    params.len() == oparams.len()
                        && params
                            .iter()
                            .zip(oparams.iter())
                            .all(|(p, op)| op.supertype_of(p))
                        && ret.supertype_of(oret)
                }
                _ => false,
            },
            Type::Variadic(t) => match other {
                Type::Variadic(o) => t.supertype_of(o),
                _ => t.as_ref() == other || t.supertype_of(other),
            },
            Type::List(t) => match other {
                Type::List(o) => t.supertype_of(o),
                _ => false,
            },
            Type::Map(k, v) => match other {
                Type::Map(ok, ov) => k == ok && v.supertype_of(ov),
                _ => false,
            },
            Type::Expression(text) => matches!(other, Type::Expression(o) if o == text),
            Type::TryReassign => false,
        }
    }

    /// Non-strict supertype: `self >= other`.
    pub fn accepts(&self, other: &Type) -> bool {
        if matches!(other, Type::TryReassign) {
            return true;
        }
        match self {
            Type::Builtin(BuiltinType::Syntax) | Type::Builtin(BuiltinType::Any) => true,
            Type::Builtin(b) => matches!(other, Type::Builtin(o) if o == b),
            Type::Literal(l) => {
                if self.text() == other.text() {
                    return true;
                }
                match other {
                    Type::Literal(o) => l
                        .members
                        .iter()
                        .all(|(name, ty)| o_has_accepting_field(o, name, ty)),
                    _ => false,
                }
            }
            Type::Union(ts) => ts.iter().any(|t| t.accepts(other)),
            Type::Function(params, ret) => match other {
                Type::Function(oparams, oret) => {
                    params.len() == oparams.len()
                        && params
                            .iter()
                            .zip(oparams.iter())
                            .all(|(p, op)| op.accepts(p))
                        && ret.accepts(oret)
                }
                _ => false,
            },
            Type::Variadic(t) => match other {
                Type::Variadic(o) => t.accepts(o),
                _ => t.accepts(other),
            },
            Type::List(t) => match other {
                Type::List(o) => t.accepts(o),
                _ => false,
            },
            Type::Map(k, v) => match other {
                Type::Map(ok, ov) => k == ok && v.accepts(ov),
                _ => false,
            },
            Type::Expression(text) => matches!(other, Type::Expression(o) if o == text),
            Type::TryReassign => true,
        }
    }
}

fn o_has_supertype_field(o: &LiteralType, name: &str, ty: &Type) -> bool {
    o.members
        .iter()
        .find(|(n, _)| n == name)
        .map(|(_, ot)| ty.supertype_of(ot))
        .unwrap_or(false)
}

fn o_has_accepting_field(o: &LiteralType, name: &str, ty: &Type) -> bool {
    o.members
        .iter()
        .find(|(n, _)| n == name)
        .map(|(_, ot)| ty.accepts(ot))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int() -> Type {
        Type::Builtin(BuiltinType::Int)
    }
    fn any() -> Type {
        Type::Builtin(BuiltinType::Any)
    }

    #[test]
    fn any_accepts_everything() {
        assert!(any().accepts(&int()));
        assert!(any().accepts(&Type::TryReassign));
    }

    #[test]
    fn builtin_reflexive() {
        assert!(int().accepts(&int()));
        assert!(!int().accepts(&any()));
    }

    #[test]
    fn function_contravariant_params_covariant_return() {
        // `(Any): Any` accepts `(Int): Int`: its param (Any) is a supertype
        // of Int (contravariance), and its return (Any) is a supertype of
        // Int (covariance).
        let identity_any = Type::Function(vec![any()], Box::new(any()));
        let identity_int = Type::Function(vec![int()], Box::new(int()));
        assert!(identity_any.accepts(&identity_int));
        // The reverse does not hold: `(Int): Int` cannot accept a function
        // whose parameter only promises Any.
        assert!(!identity_int.accepts(&identity_any));
    }

    #[test]
    fn variadic_supertype_of_its_element() {
        let v = Type::Variadic(Box::new(int()));
        assert!(v.supertype_of(&int()));
        assert!(any().supertype_of(&v));
    }

    #[test]
    fn map_key_is_invariant() {
        let m1 = Type::Map(Box::new(int()), Box::new(any()));
        let m2 = Type::Map(Box::new(any()), Box::new(int()));
        // Keys differ (Int vs Any) so even though values are covariant-
        // compatible, the maps must not be considered related.
        assert!(!m1.accepts(&m2));
    }

    #[test]
    fn structural_width_and_depth() {
        let base = Type::Literal(LiteralType {
            members: Rc::new(vec![("x".to_string(), int())]),
        });
        let wider = Type::Literal(LiteralType {
            members: Rc::new(vec![("x".to_string(), int()), ("y".to_string(), int())]),
        });
        // base >= wider: wider has every field base requires.
        assert!(base.accepts(&wider));
        assert!(!wider.accepts(&base));
    }
}
