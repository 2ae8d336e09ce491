//! The operator registry: a mutable mapping from operator name to its
//! descriptor, owned and updated by the parser as it encounters
//! `prefix`/`infix`/`suffix`/`exfix`/`mixfix` declarations.

use std::collections::HashMap;
use std::rc::Rc;

use crate::ast::{ExprRef, FixKind};
use crate::precedence::{self, Anchor, AnchorRef};

/// An operator's overload bodies are stored here as un-evaluated closure
/// literals (`ExprRef`, each pointing at an `Expr::Closure`): the parser
/// installs a descriptor the moment it parses a `prefix`/`infix`/… statement,
/// long before any environment exists to evaluate a closure in. The
/// interpreter evaluates each overload body into a `Value::Closure` the
/// first time it evaluates the owning `FixDecl` statement, and keeps its own
/// runtime table (see `interpreter::Interpreter::operators`) for dispatch.
#[derive(Debug, Clone)]
pub struct FixDescriptor {
    pub kind: FixKind,
    /// Every token position of the rule, in source order: for mixfix, this
    /// is `first` followed by `rest`; for exfix, `[open, close]`.
    pub tokens: Vec<String>,
    /// `true` at a token position, `false` at an expression-hole position.
    /// For prefix/infix/suffix this is implicit and unused (arity is fixed).
    pub op_pos: Vec<bool>,
    pub high: AnchorRef,
    pub low: AnchorRef,
    pub shift: i64,
    pub overloads: Vec<ExprRef>,
}

impl FixDescriptor {
    pub fn precedence(&self, registry: &OperatorRegistry) -> i64 {
        let resolve = |name: &str| -> (AnchorRef, AnchorRef) {
            match registry.get(name) {
                Some(d) => (d.high.clone(), d.low.clone()),
                None => (AnchorRef::Builtin(Anchor::Low), AnchorRef::Builtin(Anchor::Low)),
            }
        };
        precedence::calculate(&self.high, &self.low, &resolve)
    }
}

/// Operator registry. Mixfix descriptors' secondary tokens map to `Rc`-shared
/// handles to the *same* descriptor, so the parser recognizes a mid-operator
/// token as belonging to the rule already in flight.
#[derive(Debug, Default)]
pub struct OperatorRegistry {
    entries: HashMap<String, Rc<RefCellDescriptor>>,
}

#[derive(Debug)]
pub struct RefCellDescriptor(std::cell::RefCell<FixDescriptor>);

impl OperatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<std::cell::Ref<'_, FixDescriptor>> {
        self.entries.get(name).map(|d| d.0.borrow())
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn kind_of(&self, name: &str) -> Option<FixKind> {
        self.get(name).map(|d| d.kind)
    }

    /// Declares a new operator, or appends an overload body to an existing
    /// one if kind/anchors/hole-layout match exactly. Returns an error
    /// message on a mismatched re-declaration.
    pub fn declare(
        &mut self,
        name: &str,
        tokens: Vec<String>,
        op_pos: Vec<bool>,
        kind: FixKind,
        high: AnchorRef,
        low: AnchorRef,
        shift: i64,
        body: ExprRef,
    ) -> Result<(), String> {
        if let Some(existing) = self.entries.get(name) {
            let mut d = existing.0.borrow_mut();
            if d.kind != kind || d.high != high || d.low != low || d.op_pos != op_pos {
                return Err(format!(
                    "re-declaration of `{}` has inconsistent kind/anchors/hole layout",
                    name
                ));
            }
            d.overloads.push(body);
            return Ok(());
        }

        let descriptor = Rc::new(RefCellDescriptor(std::cell::RefCell::new(FixDescriptor {
            kind,
            tokens: tokens.clone(),
            op_pos,
            high,
            low,
            shift,
            overloads: vec![body],
        })));

        for token in &tokens {
            self.entries.insert(token.clone(), descriptor.clone());
        }
        self.entries.insert(name.to_string(), descriptor);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_closure() -> ExprRef {
        crate::ast::Expr::name("a")
    }

    #[test]
    fn declare_then_overload() {
        let mut reg = OperatorRegistry::new();
        reg.declare(
            "+",
            vec!["+".to_string()],
            vec![true],
            FixKind::Infix,
            AnchorRef::Builtin(Anchor::Sum),
            AnchorRef::Builtin(Anchor::Infix),
            0,
            dummy_closure(),
        )
        .unwrap();
        reg.declare(
            "+",
            vec!["+".to_string()],
            vec![true],
            FixKind::Infix,
            AnchorRef::Builtin(Anchor::Sum),
            AnchorRef::Builtin(Anchor::Infix),
            0,
            dummy_closure(),
        )
        .unwrap();
        assert_eq!(reg.get("+").unwrap().overloads.len(), 2);
    }

    #[test]
    fn mismatched_redeclaration_errors() {
        let mut reg = OperatorRegistry::new();
        reg.declare(
            "+",
            vec!["+".to_string()],
            vec![true],
            FixKind::Infix,
            AnchorRef::Builtin(Anchor::Sum),
            AnchorRef::Builtin(Anchor::Infix),
            0,
            dummy_closure(),
        )
        .unwrap();
        let err = reg.declare(
            "+",
            vec!["+".to_string()],
            vec![true],
            FixKind::Prefix,
            AnchorRef::Builtin(Anchor::Sum),
            AnchorRef::Builtin(Anchor::Infix),
            0,
            dummy_closure(),
        );
        assert!(err.is_err());
    }

    #[test]
    fn mixfix_tokens_share_descriptor() {
        let mut reg = OperatorRegistry::new();
        reg.declare(
            "if",
            vec!["if".to_string(), "else".to_string()],
            vec![true, false, true, false],
            FixKind::Mixfix,
            AnchorRef::Builtin(Anchor::High),
            AnchorRef::Builtin(Anchor::Low),
            0,
            dummy_closure(),
        )
        .unwrap();
        assert!(reg.is_registered("if"));
        assert!(reg.is_registered("else"));
    }
}
