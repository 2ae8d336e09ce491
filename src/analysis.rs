//! Lexical-scope analyzer. Walks a parsed AST before any evaluation happens,
//! reporting the first name reference — including an operator name used in
//! `UnaryOp`/`BinOp`/`PostOp`/`CircumOp`/`OpCall` position — that isn't bound
//! in some enclosing scope. Doesn't compute or check types; that only
//! happens at evaluation time, since this language never infers types ahead
//! of running the program. `pie check` runs this pass alone so a source file
//! can be validated without executing any of it.

use std::collections::HashSet;

use crate::ast::{Expr, ExprRef, FixDecl, MatchCase, Param, Pattern, TypeExpr};
use crate::builtins::BUILTIN_NAMES;
use crate::error::PieError;
use crate::token::Span;

fn here() -> Span {
    Span::new(0, 0, 0)
}

/// The primitive type names every scope starts seeded with, alongside the
/// built-in function names.
pub const PRIMITIVE_TYPE_NAMES: &[&str] = &["Any", "Int", "Double", "String", "Bool", "Syntax", "Type"];

#[derive(Debug, Default)]
pub struct ScopeStack {
    scopes: Vec<HashSet<String>>,
}

impl ScopeStack {
    /// Seeds the outermost scope with an arbitrary initial name set — the
    /// caller decides what counts as already bound (built-ins, primitive
    /// types, anything else known ahead of time).
    pub fn new(initial: impl IntoIterator<Item = String>) -> Self {
        Self { scopes: vec![initial.into_iter().collect()] }
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(HashSet::new());
    }

    pub fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    pub fn bind(&mut self, name: impl Into<String>) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.into());
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.scopes.iter().rev().any(|s| s.contains(name))
    }
}

fn default_initial_names() -> impl Iterator<Item = String> {
    BUILTIN_NAMES
        .iter()
        .chain(PRIMITIVE_TYPE_NAMES.iter())
        .map(|s| s.to_string())
}

/// Checks a whole program, top-level items sharing one running scope (so an
/// earlier item's binding is visible to a later one, the same as lines in a
/// block).
pub fn check_program(items: &[ExprRef]) -> Result<(), PieError> {
    let mut scope = ScopeStack::new(default_initial_names());
    for item in items {
        check_expr(item, &mut scope)?;
    }
    Ok(())
}

fn name_error(name: &str) -> PieError {
    PieError::Name { name: name.to_string(), span: here() }
}

fn check_name_ref(name: &str, scope: &ScopeStack) -> Result<(), PieError> {
    if scope.contains(name) {
        Ok(())
    } else {
        Err(name_error(name))
    }
}

fn check_expr(expr: &ExprRef, scope: &mut ScopeStack) -> Result<(), PieError> {
    match expr.as_ref() {
        Expr::Literal(_) | Expr::Continue => Ok(()),

        Expr::Name(n) => check_name_ref(n, scope),

        Expr::List(items) => check_all(items, scope),
        Expr::Map(entries) => {
            for (k, v) in entries {
                check_expr(k, scope)?;
                check_expr(v, scope)?;
            }
            Ok(())
        }

        Expr::Expansion(e) => check_expr(e, scope),
        Expr::Fold { pack, other, .. } => {
            check_expr(pack, scope)?;
            if let Some(o) = other {
                check_expr(o, scope)?;
            }
            Ok(())
        }

        Expr::Assignment { lhs, ty, rhs } => {
            check_type_expr(ty, scope)?;
            check_expr(rhs, scope)?;
            // A bare name on the left introduces a binding rather than
            // referencing one; anything more structured (field access,
            // scope-resolution) is checked as an ordinary reference.
            match lhs.as_ref() {
                Expr::Name(n) => {
                    scope.bind(n.clone());
                    Ok(())
                }
                _ => check_expr(lhs, scope),
            }
        }

        Expr::ClassLit { members } => {
            scope.push_scope();
            let result = check_params(members, scope);
            scope.pop_scope();
            result
        }
        Expr::UnionLit { variants } => {
            for v in variants {
                check_type_expr(v, scope)?;
            }
            Ok(())
        }

        Expr::Match { scrutinee, cases } => {
            check_expr(scrutinee, scope)?;
            for case in cases {
                check_case(case, scope)?;
            }
            Ok(())
        }

        Expr::TypeExpr(t) => check_type_expr(t, scope),

        Expr::Loop { count_or_iterable, binder, body, else_branch } => {
            if let Some(c) = count_or_iterable {
                check_expr(c, scope)?;
            }
            scope.push_scope();
            if let Some(b) = binder {
                scope.bind(b.clone());
            }
            let result = check_expr(body, scope);
            scope.pop_scope();
            result?;
            if let Some(e) = else_branch {
                check_expr(e, scope)?;
            }
            Ok(())
        }
        Expr::Break(payload) => match payload {
            Some(p) => check_expr(p, scope),
            None => Ok(()),
        },

        Expr::Access { object, .. } => check_expr(object, scope),
        Expr::NamespaceLit { members } => {
            scope.push_scope();
            let mut result = Ok(());
            for (name, value) in members {
                if result.is_ok() {
                    result = check_expr(value, scope);
                }
                scope.bind(name.clone());
            }
            scope.pop_scope();
            result
        }
        Expr::Use(e) => check_expr(e, scope),
        Expr::ScopeResolve { lhs, .. } => match lhs {
            Some(l) => check_expr(l, scope),
            // `::name` resolves against the program's top-level scope at
            // evaluation time regardless of nesting; the name itself is
            // checked there, not here.
            None => Ok(()),
        },

        Expr::Grouping(e) => check_expr(e, scope),

        Expr::UnaryOp { op, operand } => {
            check_name_ref(op, scope)?;
            check_expr(operand, scope)
        }
        Expr::BinOp { op, lhs, rhs } => {
            check_name_ref(op, scope)?;
            check_expr(lhs, scope)?;
            check_expr(rhs, scope)
        }
        Expr::PostOp { op, operand } => {
            check_name_ref(op, scope)?;
            check_expr(operand, scope)
        }
        Expr::CircumOp { open, close, inner } => {
            check_name_ref(open, scope)?;
            check_name_ref(close, scope)?;
            check_expr(inner, scope)
        }
        Expr::OpCall { tokens, operands } => {
            for tok in tokens {
                check_name_ref(tok, scope)?;
            }
            check_all(operands, scope)
        }

        Expr::Call { callee, positional, named, spreads } => {
            check_expr(callee, scope)?;
            check_all(positional, scope)?;
            for (_, e) in named {
                check_expr(e, scope)?;
            }
            check_all(spreads, scope)
        }

        Expr::Closure { params, body, ret } => {
            scope.push_scope();
            let result = check_params(params, scope).and_then(|_| {
                check_type_expr(ret, scope)?;
                check_expr(body, scope)
            });
            scope.pop_scope();
            result
        }

        Expr::Block(lines) => {
            scope.push_scope();
            let mut result = Ok(());
            for line in lines {
                if result.is_ok() {
                    result = check_expr(line, scope);
                }
            }
            scope.pop_scope();
            result
        }

        Expr::FixDecl(decl) => check_fix_decl(decl, scope),
    }
}

fn check_all(items: &[ExprRef], scope: &mut ScopeStack) -> Result<(), PieError> {
    for item in items {
        check_expr(item, scope)?;
    }
    Ok(())
}

fn check_params(params: &[Param], scope: &mut ScopeStack) -> Result<(), PieError> {
    for p in params {
        check_type_expr(&p.ty, scope)?;
        if let Some(d) = &p.default {
            check_expr(d, scope)?;
        }
        scope.bind(p.name.clone());
    }
    Ok(())
}

fn check_pattern(pattern: &Pattern, scope: &mut ScopeStack) -> Result<(), PieError> {
    match pattern {
        Pattern::Single { name, ty, default } => {
            if let Some(t) = ty {
                check_type_expr(t, scope)?;
            }
            if let Some(d) = default {
                check_expr(d, scope)?;
            }
            scope.bind(name.clone());
            Ok(())
        }
        Pattern::Structure { type_name, subpatterns } => {
            check_name_ref(type_name, scope)?;
            for sp in subpatterns {
                check_pattern(sp, scope)?;
            }
            Ok(())
        }
    }
}

fn check_case(case: &MatchCase, scope: &mut ScopeStack) -> Result<(), PieError> {
    scope.push_scope();
    let result = (|| {
        for p in &case.patterns {
            check_pattern(p, scope)?;
        }
        if let Some(g) = &case.guard {
            check_expr(g, scope)?;
        }
        check_expr(&case.body, scope)
    })();
    scope.pop_scope();
    result
}

fn check_type_expr(ty: &TypeExpr, scope: &mut ScopeStack) -> Result<(), PieError> {
    match ty {
        TypeExpr::Builtin(_) | TypeExpr::TryReassign => Ok(()),
        TypeExpr::Variadic(t) => check_type_expr(t, scope),
        TypeExpr::Function(params, ret) => {
            for p in params {
                check_type_expr(p, scope)?;
            }
            check_type_expr(ret, scope)
        }
        TypeExpr::Expression(e) => check_expr(e, scope),
    }
}

/// A fix-declaration's own tokens become bound operator names for every
/// reference after it; every hole token of a mixfix rule counts, not just
/// the first.
fn check_fix_decl(decl: &FixDecl, scope: &mut ScopeStack) -> Result<(), PieError> {
    for tok in &decl.tokens {
        scope.bind(tok.clone());
    }
    check_expr(&decl.body, scope)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer;
    use crate::parser;

    fn parse(src: &str) -> Vec<ExprRef> {
        let tokens = lexer::lex(src).expect("lex");
        let (items, _registry) = parser::parse(tokens).expect("parse");
        items
    }

    #[test]
    fn builtin_and_primitive_type_names_are_always_bound() {
        let items = parse("x: Int = __builtin_add(1, 2);");
        assert!(check_program(&items).is_ok());
    }

    #[test]
    fn unbound_name_is_reported() {
        let items = parse("x = totally_unbound_name;");
        let err = check_program(&items).unwrap_err();
        assert!(matches!(err, PieError::Name { name, .. } if name == "totally_unbound_name"));
    }

    #[test]
    fn binding_is_visible_to_later_top_level_items() {
        let items = parse("x = 1; y = x;");
        assert!(check_program(&items).is_ok());
    }

    #[test]
    fn closure_param_is_scoped_to_its_body() {
        let items = parse("f = (a: Int) => a;");
        assert!(check_program(&items).is_ok());
    }

    #[test]
    fn operator_token_must_be_declared_before_use() {
        let items = parse("infix(PROD) ** = (a: Int, b: Int) => __builtin_pow(a, b);\nx = 2 ** 3;");
        assert!(check_program(&items).is_ok());
    }
}
