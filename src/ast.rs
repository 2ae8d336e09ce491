//! The abstract syntax tree. Nodes are reference-counted and shared freely —
//! the evaluator may hold an `Expr` inside a `Value::Syntax` indefinitely.

use std::rc::Rc;

use crate::precedence::AnchorRef;
use crate::token::Span;

pub type ExprRef = Rc<Expr>;

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Bool(bool),
    String(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: TypeExpr,
    pub default: Option<ExprRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeExpr {
    Builtin(String),
    Variadic(Box<TypeExpr>),
    Function(Vec<TypeExpr>, Box<TypeExpr>),
    /// Any other annotation, parsed at ASSIGNMENT precedence and evaluated at
    /// binding time against the current environment.
    Expression(ExprRef),
    /// No annotation was written at all.
    TryReassign,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Pattern {
    Single {
        name: String,
        ty: Option<TypeExpr>,
        default: Option<ExprRef>,
    },
    Structure {
        type_name: String,
        subpatterns: Vec<Pattern>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchCase {
    pub patterns: Vec<Pattern>,
    pub guard: Option<ExprRef>,
    pub body: ExprRef,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixKind {
    Prefix,
    Infix,
    Suffix,
    Exfix,
    Mixfix,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FixDecl {
    pub kind: FixKind,
    /// The operator's token(s): one for prefix/infix/suffix, two for exfix
    /// (open, close), `1 + rest.len()` for mixfix.
    pub tokens: Vec<String>,
    pub high: AnchorRef,
    pub low: AnchorRef,
    pub shift: i64,
    pub body: ExprRef,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FoldShape {
    UnaryRight,
    UnaryLeft,
    SeededLeft,
    SeededRight,
    Separated,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    Name(String),

    List(Vec<ExprRef>),
    Map(Vec<(ExprRef, ExprRef)>),

    Expansion(ExprRef),
    Fold {
        shape: FoldShape,
        op: String,
        pack: ExprRef,
        /// The separator/seed operand, absent for `UnaryRight`/`UnaryLeft`.
        other: Option<ExprRef>,
    },

    Assignment {
        lhs: ExprRef,
        ty: TypeExpr,
        rhs: ExprRef,
    },

    ClassLit {
        members: Vec<Param>,
    },
    UnionLit {
        variants: Vec<TypeExpr>,
    },

    Match {
        scrutinee: ExprRef,
        cases: Vec<MatchCase>,
    },

    TypeExpr(TypeExpr),

    /// `count_or_iterable`, when present, is evaluated once; the interpreter
    /// picks infinite/counted/iterated behavior from its runtime type
    /// (absent => infinite, Int => counted, List/Map => iterated).
    Loop {
        count_or_iterable: Option<ExprRef>,
        binder: Option<String>,
        body: ExprRef,
        else_branch: Option<ExprRef>,
    },
    Break(Option<ExprRef>),
    Continue,

    Access {
        object: ExprRef,
        field: String,
    },
    NamespaceLit {
        members: Vec<(String, ExprRef)>,
    },
    Use(ExprRef),
    ScopeResolve {
        lhs: Option<ExprRef>,
        name: String,
    },

    Grouping(ExprRef),

    UnaryOp {
        op: String,
        operand: ExprRef,
    },
    BinOp {
        op: String,
        lhs: ExprRef,
        rhs: ExprRef,
    },
    PostOp {
        op: String,
        operand: ExprRef,
    },
    CircumOp {
        open: String,
        close: String,
        inner: ExprRef,
    },
    OpCall {
        tokens: Vec<String>,
        operands: Vec<ExprRef>,
    },

    Call {
        callee: ExprRef,
        positional: Vec<ExprRef>,
        named: Vec<(String, ExprRef)>,
        spreads: Vec<ExprRef>,
    },

    Closure {
        params: Vec<Param>,
        body: ExprRef,
        ret: TypeExpr,
    },

    Block(Vec<ExprRef>),

    FixDecl(FixDecl),
}

impl Expr {
    pub fn name(name: impl Into<String>) -> ExprRef {
        Rc::new(Expr::Name(name.into()))
    }

    /// The deterministic textual pretty-print used as the memoization key
    /// for the interpreter's lookup cache and for `reset`. Two syntactically
    /// identical expressions (same text) always produce the same key,
    /// regardless of which `Rc<Expr>` instance holds them.
    pub fn canonical_text(&self) -> String {
        match self {
            Expr::Literal(Literal::Int(i)) => i.to_string(),
            Expr::Literal(Literal::Float(f)) => format!("{}", f),
            Expr::Literal(Literal::Bool(b)) => b.to_string(),
            Expr::Literal(Literal::String(s)) => format!("\"{}\"", s),
            Expr::Name(n) => n.clone(),
            Expr::List(items) => {
                let parts: Vec<String> = items.iter().map(|e| e.canonical_text()).collect();
                format!("[{}]", parts.join(", "))
            }
            Expr::Map(entries) => {
                let parts: Vec<String> = entries
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k.canonical_text(), v.canonical_text()))
                    .collect();
                format!("{{{}}}", parts.join(", "))
            }
            Expr::Expansion(e) => format!("{}...", e.canonical_text()),
            Expr::Fold { shape, op, pack, other } => match (shape, other) {
                (FoldShape::UnaryRight, _) => format!("(... {} {})", op, pack.canonical_text()),
                (FoldShape::UnaryLeft, _) => format!("({} {} ...)", pack.canonical_text(), op),
                (FoldShape::SeededLeft, Some(o)) => {
                    format!("({} {} {} {} ...)", o.canonical_text(), op, pack.canonical_text(), op)
                }
                (FoldShape::SeededRight, Some(o)) => {
                    format!("(... {} {} {} {})", op, pack.canonical_text(), op, o.canonical_text())
                }
                (FoldShape::Separated, Some(o)) => {
                    format!("({} {} ... {} {})", pack.canonical_text(), op, op, o.canonical_text())
                }
                _ => format!("(<fold {}>)", op),
            },
            Expr::Assignment { lhs, ty, rhs } => {
                format!("{}: {} = {}", lhs.canonical_text(), ty.text(), rhs.canonical_text())
            }
            Expr::ClassLit { members } => {
                let parts: Vec<String> = members.iter().map(param_text).collect();
                format!("class {{ {} }}", parts.join("; "))
            }
            Expr::UnionLit { variants } => {
                let parts: Vec<String> = variants.iter().map(TypeExpr::text).collect();
                format!("union {{ {} }}", parts.join("; "))
            }
            Expr::Match { scrutinee, cases } => {
                let parts: Vec<String> = cases.iter().map(case_text).collect();
                format!("match {} {{ {} }}", scrutinee.canonical_text(), parts.join(" "))
            }
            Expr::TypeExpr(t) => t.text(),
            Expr::Loop { count_or_iterable, binder, body, else_branch } => {
                let mut s = "loop".to_string();
                if let Some(c) = count_or_iterable {
                    s += &format!("({}", c.canonical_text());
                    if let Some(b) = binder {
                        s += &format!(", {}", b);
                    }
                    s += ")";
                }
                s += &format!(" {} ", body.canonical_text());
                if let Some(e) = else_branch {
                    s += &format!("else {}", e.canonical_text());
                }
                s
            }
            Expr::Break(payload) => match payload {
                Some(p) => format!("break {}", p.canonical_text()),
                None => "break".to_string(),
            },
            Expr::Continue => "continue".to_string(),
            Expr::Access { object, field } => format!("{}.{}", object.canonical_text(), field),
            Expr::NamespaceLit { members } => {
                let parts: Vec<String> = members
                    .iter()
                    .map(|(n, e)| format!("{} = {}", n, e.canonical_text()))
                    .collect();
                format!("namespace {{ {} }}", parts.join("; "))
            }
            Expr::Use(e) => format!("use {}", e.canonical_text()),
            Expr::ScopeResolve { lhs, name } => match lhs {
                Some(l) => format!("{}::{}", l.canonical_text(), name),
                None => format!("::{}", name),
            },
            Expr::Grouping(e) => format!("({})", e.canonical_text()),
            Expr::UnaryOp { op, operand } => format!("{}{}", op, operand.canonical_text()),
            Expr::BinOp { op, lhs, rhs } => {
                format!("{} {} {}", lhs.canonical_text(), op, rhs.canonical_text())
            }
            Expr::PostOp { op, operand } => format!("{}{}", operand.canonical_text(), op),
            Expr::CircumOp { open, close, inner } => {
                format!("{}{}{}", open, inner.canonical_text(), close)
            }
            Expr::OpCall { tokens, operands } => {
                let mut s = String::new();
                let mut ops = operands.iter();
                for (i, tok) in tokens.iter().enumerate() {
                    if i > 0 {
                        if let Some(o) = ops.next() {
                            s += &format!(" {} ", o.canonical_text());
                        }
                    }
                    s += tok;
                }
                for o in ops {
                    s += &format!(" {}", o.canonical_text());
                }
                s
            }
            Expr::Call { callee, positional, named, spreads } => {
                let mut parts: Vec<String> = positional.iter().map(|e| e.canonical_text()).collect();
                parts.extend(named.iter().map(|(n, e)| format!("{} = {}", n, e.canonical_text())));
                parts.extend(spreads.iter().map(|e| format!("{}...", e.canonical_text())));
                format!("{}({})", callee.canonical_text(), parts.join(", "))
            }
            Expr::Closure { params, body, ret } => {
                let parts: Vec<String> = params.iter().map(param_text).collect();
                format!("({}) => {}: {}", parts.join(", "), body.canonical_text(), ret.text())
            }
            Expr::Block(lines) => {
                let parts: Vec<String> = lines.iter().map(|e| format!("{};", e.canonical_text())).collect();
                format!("{{ {} }}", parts.join(" "))
            }
            Expr::FixDecl(decl) => format!("{:?}({})", decl.kind, decl.tokens.join(" ")),
        }
    }
}

fn param_text(p: &Param) -> String {
    let mut s = format!("{}: {}", p.name, p.ty.text());
    if let Some(d) = &p.default {
        s += &format!(" = {}", d.canonical_text());
    }
    s
}

fn pattern_text(p: &Pattern) -> String {
    match p {
        Pattern::Single { name, ty, default } => {
            let mut s = name.clone();
            if let Some(t) = ty {
                s += &format!(": {}", t.text());
            }
            if let Some(d) = default {
                s += &format!(" = {}", d.canonical_text());
            }
            s
        }
        Pattern::Structure { type_name, subpatterns } => {
            let parts: Vec<String> = subpatterns.iter().map(pattern_text).collect();
            format!("{}({})", type_name, parts.join(", "))
        }
    }
}

fn case_text(c: &MatchCase) -> String {
    let pats: Vec<String> = c.patterns.iter().map(pattern_text).collect();
    let mut s = pats.join(" | ");
    if let Some(g) = &c.guard {
        s += &format!(" & {}", g.canonical_text());
    }
    s += &format!(" => {};", c.body.canonical_text());
    s
}

impl TypeExpr {
    pub fn text(&self) -> String {
        match self {
            TypeExpr::Builtin(name) => name.clone(),
            TypeExpr::Variadic(t) => format!("...{}", t.text()),
            TypeExpr::Function(params, ret) => {
                let parts: Vec<String> = params.iter().map(TypeExpr::text).collect();
                format!("({}): {}", parts.join(", "), ret.text())
            }
            TypeExpr::Expression(e) => e.canonical_text(),
            TypeExpr::TryReassign => String::new(),
        }
    }
}

/// A parsed top-level item paired with the span it came from, so diagnostics
/// that only have an `ExprRef` in hand can still recover a location when the
/// expression itself carries no span (expressions are spanless; spans live on
/// tokens and are attached to statements as they are parsed).
#[derive(Debug, Clone)]
pub struct Spanned<T> {
    pub node: T,
    pub span: Span,
}
