//! The tree-walking evaluator. Binds onto an [`Environment`] the same way for
//! ordinary variables, cached expression results and operator overloads
//! alike; `Interpreter::operators` is the only runtime table that lives
//! outside that environment, since an overload set is appended to as its
//! owning `FixDecl` statements are reached, never looked up by name through
//! ordinary scoping.

use std::cell::RefCell;
use std::rc::Rc;

use crate::ast::{Expr, ExprRef, Literal, MatchCase, Param, Pattern, TypeExpr};
use crate::builtins;
use crate::env::Environment;
use crate::error::{PieError, TypeErrorKind};
use crate::registry::OperatorRegistry;
use crate::token::Span;
use crate::types::{BuiltinType, LiteralType, Type};
use crate::value::{
    value_type, values_equal, ClassLitValue, ClosureValue, ObjectValue, PartialValue, Value,
};

fn here() -> Span {
    Span::new(0, 0, 0)
}

fn type_error(kind: TypeErrorKind) -> PieError {
    PieError::Type { kind, span: here() }
}

/// Holds the argument to a parameter slot before it is decided whether the
/// parameter wants the raw syntax or an evaluated value.
enum ArgSlot {
    Expr(ExprRef),
    Value(Value),
}

pub struct Interpreter {
    pub env: Environment,
    pub registry: OperatorRegistry,
    /// Runtime overload table: operator name -> evaluated overload bodies,
    /// in declaration order. Populated as `FixDecl` statements are reached.
    pub operators: std::collections::HashMap<String, Vec<Rc<ClosureValue>>>,
    /// Set by `Expr::Break` while evaluating a loop body; consumed by the
    /// loop driver. `Some(None)` is a bare `break`, `Some(Some(v))` carries a
    /// payload.
    pending_break: Option<Option<Value>>,
    /// Set by `Expr::Continue`; consumed by the loop driver and by `Block`,
    /// which stops evaluating further lines once either flag is set.
    pending_continue: bool,
}

impl Interpreter {
    pub fn new(registry: OperatorRegistry) -> Self {
        let mut env = Environment::new();
        for name in builtins::BUILTIN_NAMES {
            env.bind(*name, Value::String(name.to_string()), Type::Builtin(BuiltinType::Any));
        }
        Self {
            env,
            registry,
            operators: std::collections::HashMap::new(),
            pending_break: None,
            pending_continue: false,
        }
    }

    pub fn run_program(&mut self, items: &[ExprRef]) -> Result<Option<Value>, PieError> {
        let mut last = None;
        for item in items {
            last = Some(self.eval(item)?);
        }
        Ok(last)
    }

    /// True for expression shapes whose evaluated result is worth
    /// memoizing under its canonical text. Declarations, control flow and
    /// literal-syntax forms are excluded: memoizing them would either be a
    /// no-op (they already bind names themselves) or actively wrong (a loop
    /// re-evaluated a second time must run again).
    fn is_memoizable(expr: &Expr) -> bool {
        matches!(
            expr,
            Expr::Literal(_)
                | Expr::UnaryOp { .. }
                | Expr::BinOp { .. }
                | Expr::PostOp { .. }
                | Expr::CircumOp { .. }
                | Expr::OpCall { .. }
                | Expr::Call { .. }
                | Expr::Access { .. }
                | Expr::Grouping(_)
                | Expr::Expansion(_)
                | Expr::Fold { .. }
        )
    }

    pub fn eval(&mut self, expr: &ExprRef) -> Result<Value, PieError> {
        if let Expr::Name(n) = expr.as_ref() {
            return self.eval_name(n);
        }

        if Self::is_memoizable(expr) {
            let key = expr.canonical_text();
            if let Some((v, _)) = self.env.lookup(&key) {
                return Ok(v.clone());
            }
            let value = self.eval_uncached(expr)?;
            let ty = value_type(&value);
            self.env.bind(key, value.clone(), ty);
            return Ok(value);
        }

        self.eval_uncached(expr)
    }

    fn eval_name(&mut self, name: &str) -> Result<Value, PieError> {
        if builtins::is_builtin(name) {
            return Ok(Value::String(name.to_string()));
        }
        match self.env.lookup(name) {
            Some((v, _)) => Ok(v.clone()),
            None => Err(PieError::Name { name: name.to_string(), span: here() }),
        }
    }

    fn eval_uncached(&mut self, expr: &ExprRef) -> Result<Value, PieError> {
        match expr.as_ref() {
            Expr::Literal(lit) => Ok(match lit {
                Literal::Int(i) => Value::Int(*i),
                Literal::Float(f) => Value::Double(*f),
                Literal::Bool(b) => Value::Bool(*b),
                Literal::String(s) => Value::String(s.clone()),
            }),
            Expr::Name(_) => unreachable!("handled in eval"),

            Expr::List(items) => {
                let mut values = Vec::with_capacity(items.len());
                for i in items {
                    values.push(self.eval(i)?);
                }
                Ok(Value::List(Rc::new(RefCell::new(values))))
            }
            Expr::Map(entries) => {
                let mut values = Vec::with_capacity(entries.len());
                for (k, v) in entries {
                    values.push((self.eval(k)?, self.eval(v)?));
                }
                Ok(Value::Map(Rc::new(RefCell::new(values))))
            }

            Expr::Expansion(e) => {
                let v = self.eval(e)?;
                match v {
                    Value::Pack(_) => Ok(v),
                    Value::List(l) => Ok(Value::Pack(Rc::new(l.borrow().clone()))),
                    other => Ok(Value::Pack(Rc::new(vec![other]))),
                }
            }
            Expr::Fold { shape, op, pack, other } => self.eval_fold(shape, op, pack, other.as_ref()),

            Expr::Assignment { lhs, ty, rhs } => self.eval_assignment(lhs, ty, rhs),

            Expr::ClassLit { members } => self.eval_class_lit(members),
            Expr::UnionLit { variants } => {
                let mut ts = Vec::with_capacity(variants.len());
                for v in variants {
                    ts.push(self.resolve_type(v)?);
                }
                Ok(Value::UnionLit(Rc::new(ts)))
            }

            Expr::Match { scrutinee, cases } => self.eval_match(scrutinee, cases),

            Expr::TypeExpr(t) => {
                let ty = self.resolve_type(t)?;
                Ok(Value::TypeVal(ty))
            }

            Expr::Loop { count_or_iterable, binder, body, else_branch } => {
                self.eval_loop(count_or_iterable.as_ref(), binder.as_deref(), body, else_branch.as_ref())
            }
            Expr::Break(payload) => {
                let value = match payload {
                    Some(p) => Some(self.eval(p)?),
                    None => None,
                };
                self.pending_break = Some(value);
                Ok(Value::Unit)
            }
            Expr::Continue => {
                self.pending_continue = true;
                Ok(Value::Unit)
            }

            Expr::Access { object, field } => {
                let obj = self.eval(object)?;
                match obj {
                    Value::Object(o) => {
                        let o = o.borrow();
                        o.fields
                            .iter()
                            .find(|(n, _)| n == field)
                            .map(|(_, v)| v.clone())
                            .ok_or_else(|| PieError::Name { name: field.clone(), span: here() })
                    }
                    Value::Namespace(ns) => ns
                        .borrow()
                        .iter()
                        .find(|(n, _)| n == field)
                        .map(|(_, v)| v.clone())
                        .ok_or_else(|| PieError::Name { name: field.clone(), span: here() }),
                    _ => Err(type_error(TypeErrorKind::Parameter {
                        expected: "Object or Namespace".to_string(),
                        actual: obj.type_name().to_string(),
                    })),
                }
            }
            Expr::NamespaceLit { members } => {
                self.env.push_frame();
                let mut ordered = Vec::with_capacity(members.len());
                for (name, e) in members {
                    let v = self.eval(e)?;
                    self.env.bind(name.clone(), v.clone(), value_type(&v));
                    ordered.push((name.clone(), v));
                }
                self.env.pop_frame();
                Ok(Value::Namespace(Rc::new(RefCell::new(ordered))))
            }
            Expr::Use(e) => {
                let v = self.eval(e)?;
                if let Value::Namespace(ns) = v {
                    for (name, value) in ns.borrow().iter() {
                        self.env.bind(name.clone(), value.clone(), value_type(value));
                    }
                    Ok(Value::Unit)
                } else {
                    Err(type_error(TypeErrorKind::Parameter {
                        expected: "Namespace".to_string(),
                        actual: v.type_name().to_string(),
                    }))
                }
            }
            Expr::ScopeResolve { lhs, name } => match lhs {
                Some(l) => {
                    let v = self.eval(l)?;
                    match v {
                        Value::Namespace(ns) => ns
                            .borrow()
                            .iter()
                            .find(|(n, _)| n == name)
                            .map(|(_, v)| v.clone())
                            .ok_or_else(|| PieError::Name { name: name.clone(), span: here() }),
                        Value::Object(o) => o
                            .borrow()
                            .fields
                            .iter()
                            .find(|(n, _)| n == name)
                            .map(|(_, v)| v.clone())
                            .ok_or_else(|| PieError::Name { name: name.clone(), span: here() }),
                        Value::ClassLit(c) => c
                            .members
                            .iter()
                            .find(|(n, _, _)| n == name)
                            .and_then(|(_, _, d)| d.clone())
                            .ok_or_else(|| PieError::Name { name: name.clone(), span: here() }),
                        _ => Err(type_error(TypeErrorKind::Parameter {
                            expected: "Namespace, Object or Type".to_string(),
                            actual: v.type_name().to_string(),
                        })),
                    }
                }
                None => self
                    .env
                    .lookup_global(name)
                    .map(|(v, _)| v.clone())
                    .ok_or_else(|| PieError::Name { name: name.clone(), span: here() }),
            },

            Expr::Grouping(e) => self.eval(e),

            Expr::UnaryOp { op, operand } => {
                let arg = self.eval(operand)?;
                self.dispatch_operator(op, vec![arg])
            }
            Expr::BinOp { op, lhs, rhs } => {
                let a = self.eval(lhs)?;
                let b = self.eval(rhs)?;
                self.dispatch_operator(op, vec![a, b])
            }
            Expr::PostOp { op, operand } => {
                let arg = self.eval(operand)?;
                self.dispatch_operator(op, vec![arg])
            }
            Expr::CircumOp { open, inner, .. } => {
                let arg = self.eval(inner)?;
                self.dispatch_operator(open, vec![arg])
            }
            Expr::OpCall { tokens, operands } => {
                let mut args = Vec::with_capacity(operands.len());
                for o in operands {
                    args.push(self.eval(o)?);
                }
                self.dispatch_operator(&tokens[0], args)
            }

            Expr::Call { callee, positional, named, spreads } => {
                self.eval_call(callee, positional, named, spreads)
            }

            Expr::Closure { params, body, ret } => self.eval_closure(params, body, ret),

            Expr::Block(lines) => self.eval_block(lines),

            Expr::FixDecl(decl) => {
                let value = self.eval(&decl.body)?;
                match value {
                    Value::Closure(c) => {
                        self.operators.entry(decl.tokens[0].clone()).or_default().push(c);
                        Ok(Value::Unit)
                    }
                    other => Err(type_error(TypeErrorKind::Parameter {
                        expected: "Function".to_string(),
                        actual: other.type_name().to_string(),
                    })),
                }
            }
        }
    }

    // ---- assignment -----------------------------------------------------

    fn eval_assignment(&mut self, lhs: &ExprRef, ty: &TypeExpr, rhs: &ExprRef) -> Result<Value, PieError> {
        match lhs.as_ref() {
            Expr::Name(n) => {
                let value = self.eval(rhs)?;
                let declared = match ty {
                    TypeExpr::TryReassign => match self.env.lookup(n) {
                        Some((_, existing)) if *existing != Type::TryReassign => existing.clone(),
                        _ => Type::TryReassign,
                    },
                    other => self.resolve_type(other)?,
                };
                if !declared.accepts(&value_type(&value)) {
                    return Err(type_error(TypeErrorKind::Assignment {
                        declared: declared.text(),
                        actual: value_type(&value).text(),
                    }));
                }
                self.env.assign(n, value.clone(), declared);
                Ok(value)
            }
            Expr::Access { object, field } => {
                let obj = self.eval(object)?;
                let value = self.eval(rhs)?;
                match obj {
                    Value::Object(o) => {
                        let mut o = o.borrow_mut();
                        let field_ty = o
                            .class
                            .members
                            .iter()
                            .find(|(n, _, _)| n == field)
                            .map(|(_, t, _)| t.clone())
                            .ok_or_else(|| PieError::Name { name: field.clone(), span: here() })?;
                        if !field_ty.accepts(&value_type(&value)) {
                            return Err(type_error(TypeErrorKind::Assignment {
                                declared: field_ty.text(),
                                actual: value_type(&value).text(),
                            }));
                        }
                        match o.fields.iter_mut().find(|(n, _)| n == field) {
                            Some(slot) => slot.1 = value.clone(),
                            None => o.fields.push((field.clone(), value.clone())),
                        }
                        Ok(value)
                    }
                    _ => Err(type_error(TypeErrorKind::Parameter {
                        expected: "Object".to_string(),
                        actual: obj.type_name().to_string(),
                    })),
                }
            }
            other => {
                let key = other.canonical_text();
                let value = self.eval(rhs)?;
                self.env.bind(key, value.clone(), Type::TryReassign);
                Ok(value)
            }
        }
    }

    // ---- class / object --------------------------------------------------

    fn eval_class_lit(&mut self, members: &[Param]) -> Result<Value, PieError> {
        self.env.push_frame();
        let mut ordered = Vec::with_capacity(members.len());
        for p in members {
            let ty = self.resolve_type(&p.ty)?;
            let default = match &p.default {
                Some(d) => {
                    let v = self.eval(d)?;
                    if !ty.accepts(&value_type(&v)) {
                        self.env.pop_frame();
                        return Err(type_error(TypeErrorKind::Assignment {
                            declared: ty.text(),
                            actual: value_type(&v).text(),
                        }));
                    }
                    self.env.bind(p.name.clone(), v.clone(), ty.clone());
                    Some(v)
                }
                None => None,
            };
            ordered.push((p.name.clone(), ty, default));
        }
        self.env.pop_frame();
        Ok(Value::ClassLit(Rc::new(ClassLitValue { members: ordered })))
    }

    fn construct_object(
        &mut self,
        class: Rc<ClassLitValue>,
        positional: Vec<Value>,
        named: Vec<(String, Value)>,
    ) -> Result<Value, PieError> {
        let mut fields: Vec<(String, Value)> = Vec::with_capacity(class.members.len());
        let mut pos_iter = positional.into_iter();
        for (name, ty, default) in class.members.iter() {
            let provided = named
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v.clone())
                .or_else(|| pos_iter.next());
            let value = match provided.or_else(|| default.clone()) {
                Some(v) => v,
                None => Value::Unit,
            };
            if !ty.accepts(&value_type(&value)) {
                return Err(type_error(TypeErrorKind::Parameter {
                    expected: ty.text(),
                    actual: value_type(&value).text(),
                }));
            }
            fields.push((name.clone(), value));
        }
        Ok(Value::Object(Rc::new(RefCell::new(ObjectValue { class, fields }))))
    }

    // ---- match -------------------------------------------------------------

    fn eval_match(&mut self, scrutinee: &ExprRef, cases: &[MatchCase]) -> Result<Value, PieError> {
        let value = self.eval(scrutinee)?;
        for case in cases {
            for pat in &case.patterns {
                self.env.push_frame();
                let bound = self.try_match_pattern(pat, &value)?;
                let Some(bindings) = bound else {
                    self.env.pop_frame();
                    continue;
                };
                for (name, v, ty) in &bindings {
                    self.env.bind(name.clone(), v.clone(), ty.clone());
                }
                if let Some(guard) = &case.guard {
                    let ok = self.eval(guard)?.is_truthy();
                    if !ok {
                        self.env.pop_frame();
                        continue;
                    }
                }
                let result = self.eval(&case.body);
                self.env.pop_frame();
                return result;
            }
        }
        Err(PieError::Pattern { span: here() })
    }

    fn try_match_pattern(
        &mut self,
        pattern: &Pattern,
        value: &Value,
    ) -> Result<Option<Vec<(String, Value, Type)>>, PieError> {
        match pattern {
            Pattern::Single { name, ty, default } => {
                let declared = match ty {
                    Some(t) => self.resolve_type(t)?,
                    None => Type::Builtin(BuiltinType::Any),
                };
                if !declared.accepts(&value_type(value)) {
                    return Ok(None);
                }
                if let Some(d) = default {
                    let dv = self.eval(d)?;
                    match values_equal(value, &dv) {
                        Ok(true) => {}
                        _ => return Ok(None),
                    }
                }
                Ok(Some(vec![(name.clone(), value.clone(), declared)]))
            }
            Pattern::Structure { type_name, subpatterns } => {
                let class_val = self.eval_name(type_name)?;
                let class = match class_val {
                    Value::ClassLit(c) => c,
                    _ => {
                        return Err(type_error(TypeErrorKind::Parameter {
                            expected: "Type".to_string(),
                            actual: class_val.type_name().to_string(),
                        }))
                    }
                };
                let object = match value {
                    Value::Object(o) => o,
                    _ => return Ok(None),
                };
                let object_type = value_type(value);
                let class_type = Type::Literal(LiteralType {
                    members: Rc::new(class.members.iter().map(|(n, t, _)| (n.clone(), t.clone())).collect()),
                });
                if !class_type.accepts(&object_type) {
                    return Ok(None);
                }
                let fields = &object.borrow().fields;
                if fields.len() != subpatterns.len() {
                    return Ok(None);
                }
                let mut bindings = Vec::new();
                for (sub, (_, field_value)) in subpatterns.iter().zip(fields.iter()) {
                    match self.try_match_pattern(sub, field_value)? {
                        Some(mut b) => bindings.append(&mut b),
                        None => return Ok(None),
                    }
                }
                Ok(Some(bindings))
            }
        }
    }

    // ---- loop ----------------------------------------------------------

    fn eval_loop(
        &mut self,
        count_or_iterable: Option<&ExprRef>,
        binder: Option<&str>,
        body: &ExprRef,
        else_branch: Option<&ExprRef>,
    ) -> Result<Value, PieError> {
        let driver = match count_or_iterable {
            Some(e) => Some(self.eval(e)?),
            None => None,
        };

        macro_rules! run_iteration {
            ($bind:expr) => {{
                self.env.push_frame();
                if let (Some(name), Some(v)) = (binder, $bind) {
                    self.env.bind(name.to_string(), v, Type::Builtin(BuiltinType::Any));
                }
                let result = self.eval(body);
                self.env.pop_frame();
                let result = result?;
                if self.pending_continue {
                    self.pending_continue = false;
                }
                if let Some(payload) = self.pending_break.take() {
                    return Ok(payload.unwrap_or(Value::Unit));
                }
                let _ = result;
            }};
        }

        match driver {
            None => loop {
                run_iteration!(None::<Value>);
            },
            Some(Value::Int(n)) => {
                for i in 0..n {
                    run_iteration!(Some(Value::Int(i)));
                }
            }
            Some(Value::List(items)) => {
                let snapshot = items.borrow().clone();
                for item in snapshot {
                    run_iteration!(Some(item));
                }
            }
            Some(Value::Map(entries)) => {
                let snapshot = entries.borrow().clone();
                for (k, v) in snapshot {
                    let pair = Value::List(Rc::new(RefCell::new(vec![k, v])));
                    run_iteration!(Some(pair));
                }
            }
            Some(other) => {
                return Err(type_error(TypeErrorKind::Parameter {
                    expected: "Int, List or Map".to_string(),
                    actual: other.type_name().to_string(),
                }))
            }
        }

        match else_branch {
            Some(e) => self.eval(e),
            None => Ok(Value::Unit),
        }
    }

    fn eval_block(&mut self, lines: &[ExprRef]) -> Result<Value, PieError> {
        let mut last = Value::Unit;
        for line in lines {
            last = self.eval(line)?;
            if self.pending_break.is_some() || self.pending_continue {
                break;
            }
        }
        Ok(last)
    }

    // ---- fold ------------------------------------------------------------

    fn eval_fold(
        &mut self,
        shape: &crate::ast::FoldShape,
        op: &str,
        pack: &ExprRef,
        other: Option<&ExprRef>,
    ) -> Result<Value, PieError> {
        use crate::ast::FoldShape::*;
        let pack_value = self.eval(pack)?;
        let items: Vec<Value> = match pack_value {
            Value::Pack(p) => (*p).clone(),
            Value::List(l) => l.borrow().clone(),
            other => vec![other],
        };
        if items.is_empty() {
            return match other {
                Some(o) => self.eval(o),
                None => Err(type_error(TypeErrorKind::Parameter {
                    expected: "non-empty pack".to_string(),
                    actual: "empty pack".to_string(),
                })),
            };
        }

        match shape {
            UnaryRight => {
                let mut iter = items.into_iter().rev();
                let mut acc = iter.next().unwrap();
                for v in iter {
                    acc = self.dispatch_operator(op, vec![v, acc])?;
                }
                Ok(acc)
            }
            UnaryLeft => {
                let mut iter = items.into_iter();
                let mut acc = iter.next().unwrap();
                for v in iter {
                    acc = self.dispatch_operator(op, vec![acc, v])?;
                }
                Ok(acc)
            }
            SeededLeft => {
                let seed = self.eval(other.expect("seeded fold has a seed"))?;
                let mut acc = seed;
                for v in items {
                    acc = self.dispatch_operator(op, vec![acc, v])?;
                }
                Ok(acc)
            }
            SeededRight => {
                let seed = self.eval(other.expect("seeded fold has a seed"))?;
                let mut acc = seed;
                for v in items.into_iter().rev() {
                    acc = self.dispatch_operator(op, vec![v, acc])?;
                }
                Ok(acc)
            }
            Separated => {
                let sep = self.eval(other.expect("separated fold has a separator"))?;
                let mut iter = items.into_iter();
                let mut acc = iter.next().unwrap();
                for v in iter {
                    acc = self.dispatch_operator(op, vec![acc, sep.clone()])?;
                    acc = self.dispatch_operator(op, vec![acc, v])?;
                }
                Ok(acc)
            }
        }
    }

    // ---- operator dispatch -------------------------------------------------

    fn dispatch_operator(&mut self, name: &str, args: Vec<Value>) -> Result<Value, PieError> {
        let overloads = self
            .operators
            .get(name)
            .cloned()
            .ok_or_else(|| PieError::Name { name: name.to_string(), span: here() })?;

        for closure in &overloads {
            if closure.param_types.len() != args.len() {
                continue;
            }
            if closure
                .param_types
                .iter()
                .zip(args.iter())
                .all(|(pt, v)| pt.accepts(&value_type(v)))
            {
                return self.call_closure_with_values(closure.clone(), args);
            }
        }

        let args_text: Vec<String> = args.iter().map(|a| value_type(a).text()).collect();
        Err(PieError::Type {
            kind: TypeErrorKind::NoOverload { name: name.to_string(), args: args_text.join(", ") },
            span: here(),
        })
    }

    // ---- calls ------------------------------------------------------------

    fn eval_call(
        &mut self,
        callee: &ExprRef,
        positional: &[ExprRef],
        named: &[(String, ExprRef)],
        spreads: &[ExprRef],
    ) -> Result<Value, PieError> {
        let callee_val = self.eval(callee)?;

        if let Value::String(name) = &callee_val {
            if builtins::is_builtin(name) {
                return builtins::call(self, name, positional, named, spreads);
            }
        }

        match callee_val {
            Value::Closure(c) => self.call_closure_raw(c, Vec::new(), positional, named, spreads),
            Value::Partial(p) => self.call_partial(p, positional, named, spreads),
            Value::ClassLit(cls) => {
                let mut pos_vals = Vec::with_capacity(positional.len());
                for p in positional {
                    pos_vals.push(self.eval(p)?);
                }
                for s in spreads {
                    match self.eval(s)? {
                        Value::Pack(items) => pos_vals.extend(items.iter().cloned()),
                        other => pos_vals.push(other),
                    }
                }
                let mut named_vals = Vec::with_capacity(named.len());
                for (n, e) in named {
                    named_vals.push((n.clone(), self.eval(e)?));
                }
                self.construct_object(cls, pos_vals, named_vals)
            }
            other => {
                if positional.is_empty() && named.is_empty() && spreads.is_empty() {
                    Ok(other)
                } else {
                    Err(PieError::Arity {
                        message: format!("{} is not callable", other.type_name()),
                        span: here(),
                    })
                }
            }
        }
    }

    fn call_partial(
        &mut self,
        p: Rc<PartialValue>,
        positional: &[ExprRef],
        named: &[(String, ExprRef)],
        spreads: &[ExprRef],
    ) -> Result<Value, PieError> {
        self.call_closure_raw(p.closure.clone(), p.bound.clone(), positional, named, spreads)
    }

    /// Resolves and invokes a closure, respecting Syntax-typed parameters
    /// (which receive the raw, un-evaluated argument expression) and
    /// under-arity currying (which returns a `Value::Partial` instead of
    /// running the body).
    fn call_closure_raw(
        &mut self,
        closure: Rc<ClosureValue>,
        already_bound: Vec<(String, Value, Type)>,
        positional: &[ExprRef],
        named: &[(String, ExprRef)],
        spreads: &[ExprRef],
    ) -> Result<Value, PieError> {
        let mut slots: Vec<ArgSlot> = positional.iter().cloned().map(ArgSlot::Expr).collect();
        for s in spreads {
            match self.eval(s)? {
                Value::Pack(items) => slots.extend(items.iter().cloned().map(ArgSlot::Value)),
                other => slots.push(ArgSlot::Value(other)),
            }
        }

        let mut named_vals: Vec<(String, Value)> = Vec::with_capacity(named.len());
        for (n, e) in named {
            named_vals.push((n.clone(), self.eval(e)?));
        }

        let bound_names: Vec<&str> = already_bound.iter().map(|(n, _, _)| n.as_str()).collect();
        let remaining_params: Vec<(usize, &Param)> = closure
            .params
            .iter()
            .enumerate()
            .filter(|(_, p)| !bound_names.contains(&p.name.as_str()))
            .collect();

        let variadic_slot = remaining_params
            .iter()
            .position(|(i, _)| matches!(closure.param_types[*i], Type::Variadic(_)));

        let mut resolved: Vec<Option<(String, Value, Type)>> = vec![None; remaining_params.len()];

        for (name, value) in &named_vals {
            if let Some(idx) = remaining_params.iter().position(|(_, p)| &p.name == name) {
                let (orig_idx, _) = remaining_params[idx];
                resolved[idx] =
                    Some((name.clone(), value.clone(), closure.param_types[orig_idx].clone()));
            } else {
                return Err(PieError::Name { name: name.clone(), span: here() });
            }
        }

        let mut slot_iter = slots.into_iter();

        if let Some(v_idx) = variadic_slot {
            let before = v_idx;
            let after = remaining_params.len() - v_idx - 1;

            // Fill the fixed slots preceding the variadic first (some may
            // already be resolved by a named argument).
            let mut filled_before = 0;
            for i in 0..before {
                if resolved[i].is_some() {
                    filled_before += 1;
                    continue;
                }
                match slot_iter.next() {
                    Some(slot) => {
                        let (orig_idx, p) = remaining_params[i];
                        let ty = closure.param_types[orig_idx].clone();
                        let v = self.resolve_slot(slot, &ty)?;
                        resolved[i] = Some((p.name.clone(), v, ty));
                        filled_before += 1;
                    }
                    None => break,
                }
            }

            // Only commit the pack (and anything after it) once every fixed
            // slot before the variadic is satisfied; otherwise this is an
            // under-arity call and the variadic stays pending for a future
            // partial application, same as any other unfilled parameter.
            if filled_before == before {
                let rest: Vec<ArgSlot> = slot_iter.by_ref().collect();
                let take_for_pack = rest.len().saturating_sub(after);
                let mut rest_iter = rest.into_iter();
                let mut pack_items = Vec::with_capacity(take_for_pack);
                for _ in 0..take_for_pack {
                    if let Some(slot) = rest_iter.next() {
                        pack_items.push(self.resolve_slot(slot, &Type::Builtin(BuiltinType::Any))?);
                    }
                }
                let (orig_v_idx, v_param) = remaining_params[v_idx];
                resolved[v_idx] = Some((
                    v_param.name.clone(),
                    Value::Pack(Rc::new(pack_items)),
                    closure.param_types[orig_v_idx].clone(),
                ));

                let tail_start = v_idx + 1;
                for (offset, slot) in rest_iter.enumerate() {
                    let i = tail_start + offset;
                    if i >= resolved.len() {
                        return Err(PieError::Arity {
                            message: "too many positional arguments".to_string(),
                            span: here(),
                        });
                    }
                    let (orig_idx, p) = remaining_params[i];
                    let ty = closure.param_types[orig_idx].clone();
                    let v = self.resolve_slot(slot, &ty)?;
                    resolved[i] = Some((p.name.clone(), v, ty));
                }
            }
        } else {
            let mut i = 0;
            for slot in slot_iter.by_ref() {
                while i < resolved.len() && resolved[i].is_some() {
                    i += 1;
                }
                if i >= resolved.len() {
                    return Err(PieError::Arity {
                        message: "too many positional arguments".to_string(),
                        span: here(),
                    });
                }
                let (orig_idx, p) = remaining_params[i];
                let ty = closure.param_types[orig_idx].clone();
                let v = self.resolve_slot(slot, &ty)?;
                resolved[i] = Some((p.name.clone(), v, ty));
                i += 1;
            }
        }

        // Fill defaults for anything still missing.
        for (i, (orig_idx, p)) in remaining_params.iter().enumerate() {
            if resolved[i].is_some() {
                continue;
            }
            if let Some(default) = &p.default {
                let v = self.eval(default)?;
                resolved[i] = Some((p.name.clone(), v, closure.param_types[*orig_idx].clone()));
            }
        }

        let missing_required: bool = resolved.iter().enumerate().any(|(i, slot)| {
            slot.is_none() && !matches!(closure.param_types[remaining_params[i].0], Type::Variadic(_))
        });

        if missing_required {
            let mut bound = already_bound;
            for (i, slot) in resolved.into_iter().enumerate() {
                if let Some(triple) = slot {
                    bound.push(triple);
                }
            }
            return Ok(Value::Partial(Rc::new(PartialValue { closure, bound })));
        }

        // Every slot resolved (or is an empty variadic pack) — run the body
        // in a fresh frame seeded with both the arguments just resolved and
        // any bound in a previous partial call.
        self.env.push_frame();
        for (name, value, ty) in &already_bound {
            self.env.bind(name.clone(), value.clone(), ty.clone());
        }
        for (i, (orig_idx, p)) in remaining_params.iter().enumerate() {
            match resolved[i].take() {
                Some((name, value, ty)) => self.env.bind(name, value, ty),
                None => self.env.bind(
                    p.name.clone(),
                    Value::Pack(Rc::new(Vec::new())),
                    closure.param_types[*orig_idx].clone(),
                ),
            }
        }
        let result = self.eval(&closure.body);
        self.env.pop_frame();
        let value = result?;
        if !closure.ret.accepts(&value_type(&value)) {
            return Err(type_error(TypeErrorKind::Return {
                expected: closure.ret.text(),
                actual: value_type(&value).text(),
            }));
        }
        Ok(value)
    }

    fn resolve_slot(&mut self, slot: ArgSlot, declared: &Type) -> Result<Value, PieError> {
        match slot {
            ArgSlot::Value(v) => Ok(v),
            ArgSlot::Expr(e) => {
                if matches!(declared, Type::Builtin(BuiltinType::Syntax)) {
                    Ok(Value::Syntax(e))
                } else {
                    self.eval(&e)
                }
            }
        }
    }

    // ---- closures --------------------------------------------------------

    fn eval_closure(&mut self, params: &[Param], body: &ExprRef, ret: &TypeExpr) -> Result<Value, PieError> {
        let mut param_types = Vec::with_capacity(params.len());
        for p in params {
            param_types.push(self.resolve_type(&p.ty)?);
        }
        let ret_ty = self.resolve_type(ret)?;
        Ok(Value::Closure(Rc::new(ClosureValue {
            params: params.to_vec(),
            body: body.clone(),
            ret: ret_ty,
            param_types,
            captured: self.env.clone(),
            bound_self: None,
        })))
    }

    fn call_closure_with_values(&mut self, closure: Rc<ClosureValue>, args: Vec<Value>) -> Result<Value, PieError> {
        self.env.push_frame();
        for (p, (v, ty)) in closure.params.iter().zip(args.into_iter().zip(closure.param_types.iter())) {
            self.env.bind(p.name.clone(), v, ty.clone());
        }
        let result = self.eval(&closure.body);
        self.env.pop_frame();
        let value = result?;
        if !closure.ret.accepts(&value_type(&value)) {
            return Err(type_error(TypeErrorKind::Return {
                expected: closure.ret.text(),
                actual: value_type(&value).text(),
            }));
        }
        Ok(value)
    }

    // ---- types -------------------------------------------------------------

    pub fn resolve_type(&mut self, ty: &TypeExpr) -> Result<Type, PieError> {
        match ty {
            TypeExpr::Builtin(name) => Ok(Type::Builtin(
                BuiltinType::from_name(name).unwrap_or(BuiltinType::Any),
            )),
            TypeExpr::Variadic(inner) => Ok(Type::Variadic(Box::new(self.resolve_type(inner)?))),
            TypeExpr::Function(params, ret) => {
                let mut ps = Vec::with_capacity(params.len());
                for p in params {
                    ps.push(self.resolve_type(p)?);
                }
                Ok(Type::Function(ps, Box::new(self.resolve_type(ret)?)))
            }
            TypeExpr::Expression(e) => {
                let v = self.eval(e)?;
                Ok(match v {
                    Value::ClassLit(c) => Type::Literal(LiteralType {
                        members: Rc::new(c.members.iter().map(|(n, t, _)| (n.clone(), t.clone())).collect()),
                    }),
                    Value::UnionLit(ts) => Type::Union((*ts).clone()),
                    Value::TypeVal(t) => t,
                    _ => Type::Expression(e.canonical_text()),
                })
            }
            TypeExpr::TryReassign => Ok(Type::TryReassign),
        }
    }
}
