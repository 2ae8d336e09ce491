//! A Pratt parser keyed by token, whose infix table is the operator registry
//! rather than a fixed grammar. As a side effect it installs new operator
//! descriptors when it encounters `prefix`/`infix`/`suffix`/`exfix`/`mixfix`
//! declarations.

use std::rc::Rc;

use crate::ast::{
    Expr, ExprRef, FixDecl, FixKind, FoldShape, MatchCase, Param, Pattern, TypeExpr,
};
use crate::error::{ParseErrorKind, PieError};
use crate::precedence::{Anchor, AnchorRef};
use crate::registry::OperatorRegistry;
use crate::token::{Span, Token, TokenKind};

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    pub registry: OperatorRegistry,
}

type PResult<T> = Result<T, PieError>;

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            registry: OperatorRegistry::new(),
        }
    }

    // --- token stream plumbing -------------------------------------------

    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn peek_kind(&self) -> TokenKind {
        self.peek().kind
    }

    fn peek_kind_at(&self, offset: usize) -> TokenKind {
        self.tokens
            .get(self.pos + offset)
            .map(|t| t.kind)
            .unwrap_or(TokenKind::End)
    }

    fn peek_text_at(&self, offset: usize) -> &str {
        self.tokens
            .get(self.pos + offset)
            .map(|t| t.text.as_str())
            .unwrap_or("")
    }

    fn advance(&mut self) -> Token {
        let t = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        t
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek_kind() == kind
    }

    fn expect(&mut self, kind: TokenKind) -> PResult<Token> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(PieError::Parse {
                kind: ParseErrorKind::UnexpectedToken {
                    expected: format!("{:?}", kind),
                    found: self.peek_kind(),
                },
                span: self.peek().span,
            })
        }
    }

    fn expect_name(&mut self) -> PResult<String> {
        Ok(self.expect(TokenKind::Name)?.text)
    }

    // --- program & statements ---------------------------------------------

    pub fn parse_program(&mut self) -> PResult<Vec<ExprRef>> {
        let mut items = Vec::new();
        while !self.check(TokenKind::End) {
            let item = self.parse_expr(Anchor::Low.value())?;
            self.expect(TokenKind::Semi)?;
            items.push(item);
        }
        Ok(items)
    }

    // --- precedence of the upcoming infix continuation --------------------

    fn descriptor_precedence(&self, name: &str) -> i64 {
        match self.registry.get(name) {
            Some(d) => d.precedence(&self.registry),
            None => Anchor::Low.value(),
        }
    }

    /// Precedence of whatever continuation token is next, or `None` if
    /// nothing can continue an expression here.
    fn next_continuation_precedence(&self) -> Option<i64> {
        match self.peek_kind() {
            TokenKind::Dot => Some(Anchor::Postfix.value() + 1),
            TokenKind::LParen => Some(Anchor::Call.value()),
            TokenKind::Assign => Some(Anchor::Assignment.value()),
            TokenKind::Name => {
                let name = &self.peek().text;
                match self.registry.kind_of(name) {
                    Some(FixKind::Infix) | Some(FixKind::Suffix) => {
                        Some(self.descriptor_precedence(name))
                    }
                    Some(FixKind::Mixfix) => {
                        // Only a *leading* token of a mixfix rule with a
                        // preceding expression hole continues here; a token
                        // that belongs to a rule already in flight is left
                        // for the outer call to consume.
                        self.registry.get(name).and_then(|d| {
                            if d.tokens.first().map(String::as_str) == Some(name)
                                && d.op_pos.first() == Some(&false)
                            {
                                Some(d.precedence(&self.registry))
                            } else {
                                None
                            }
                        })
                    }
                    _ => None,
                }
            }
            _ => None,
        }
    }

    // --- core Pratt loop ----------------------------------------------------

    pub fn parse_expr(&mut self, min_prec: i64) -> PResult<ExprRef> {
        let left = self.parse_prefix()?;
        self.continue_infix(left, min_prec)
    }

    fn continue_infix(&mut self, mut left: ExprRef, min_prec: i64) -> PResult<ExprRef> {
        loop {
            let Some(prec) = self.next_continuation_precedence() else {
                break;
            };
            if prec <= min_prec {
                break;
            }

            left = match self.peek_kind() {
                TokenKind::Dot => {
                    self.advance();
                    let field = self.expect_name()?;
                    Rc::new(Expr::Access { object: left, field })
                }
                TokenKind::Assign => {
                    self.advance();
                    let rhs = self.parse_expr(Anchor::Assignment.value() - 1)?;
                    Rc::new(Expr::Assignment {
                        lhs: left,
                        ty: TypeExpr::TryReassign,
                        rhs,
                    })
                }
                TokenKind::LParen => self.parse_call(left)?,
                TokenKind::Name => {
                    let name = self.peek().text.clone();
                    match self.registry.kind_of(&name) {
                        Some(FixKind::Suffix) => {
                            self.advance();
                            Rc::new(Expr::PostOp { op: name, operand: left })
                        }
                        Some(FixKind::Infix) => {
                            self.advance();
                            let prec = self.descriptor_precedence(&name);
                            let rhs = self.parse_expr(prec)?;
                            Rc::new(Expr::BinOp { op: name, lhs: left, rhs })
                        }
                        Some(FixKind::Mixfix) => self.parse_mixfix_continuation(left, &name)?,
                        _ => break,
                    }
                }
                _ => break,
            };
        }
        Ok(left)
    }

    fn parse_mixfix_continuation(&mut self, first_operand: ExprRef, name: &str) -> PResult<ExprRef> {
        let descriptor = self
            .registry
            .get(name)
            .expect("mixfix name must be registered")
            .clone();
        let mut tokens = Vec::new();
        let mut operands = vec![first_operand];

        let mut token_iter = descriptor.tokens.iter();
        let mut op_iter = descriptor.op_pos.iter().skip(1); // first hole already consumed as left operand

        // The first literal token in the rule is the current token.
        let first_tok = token_iter.next().cloned().unwrap_or_default();
        self.advance();
        tokens.push(first_tok);

        for is_token in op_iter.by_ref() {
            if *is_token {
                let tok_text = token_iter.next().cloned().unwrap_or_default();
                if self.peek().text != tok_text {
                    return Err(PieError::Parse {
                        kind: ParseErrorKind::MixfixOutOfSequence { name: name.to_string() },
                        span: self.peek().span,
                    });
                }
                self.advance();
                tokens.push(tok_text);
            } else {
                let operand = self.parse_expr(Anchor::Low.value())?;
                operands.push(operand);
            }
        }

        Ok(Rc::new(Expr::OpCall { tokens, operands }))
    }

    // --- prefix dispatch ----------------------------------------------------

    fn parse_prefix(&mut self) -> PResult<ExprRef> {
        match self.peek_kind() {
            TokenKind::Int => {
                let t = self.advance();
                Ok(Rc::new(Expr::Literal(crate::ast::Literal::Int(
                    t.text.parse().unwrap_or(0),
                ))))
            }
            TokenKind::Float => {
                let t = self.advance();
                Ok(Rc::new(Expr::Literal(crate::ast::Literal::Float(
                    t.text.parse().unwrap_or(0.0),
                ))))
            }
            TokenKind::Bool => {
                let t = self.advance();
                Ok(Rc::new(Expr::Literal(crate::ast::Literal::Bool(t.text == "true"))))
            }
            TokenKind::String => {
                let t = self.advance();
                Ok(Rc::new(Expr::Literal(crate::ast::Literal::String(t.text))))
            }
            TokenKind::Name => self.parse_name_prefix(),
            TokenKind::Class => self.parse_class(),
            TokenKind::Union => self.parse_union(),
            TokenKind::Match => self.parse_match(),
            TokenKind::Loop => self.parse_loop(),
            TokenKind::Break => {
                self.advance();
                let payload = if self.check(TokenKind::Semi) {
                    None
                } else {
                    Some(self.parse_expr(Anchor::Low.value())?)
                };
                Ok(Rc::new(Expr::Break(payload)))
            }
            TokenKind::Continue => {
                self.advance();
                Ok(Rc::new(Expr::Continue))
            }
            TokenKind::Namespace => self.parse_namespace(),
            TokenKind::Use => {
                self.advance();
                let e = self.parse_expr(Anchor::Low.value())?;
                Ok(Rc::new(Expr::Use(e)))
            }
            TokenKind::ScopeResolve => {
                self.advance();
                let name = self.expect_name()?;
                Ok(Rc::new(Expr::ScopeResolve { lhs: None, name }))
            }
            TokenKind::LBrace => self.parse_block(),
            TokenKind::LParen => self.parse_paren(),
            TokenKind::Mixfix | TokenKind::Prefix | TokenKind::Infix | TokenKind::Suffix
            | TokenKind::Exfix => self.parse_fix_decl(),
            TokenKind::Ellipsis => {
                // A bare leading ellipsis is only meaningful inside a
                // grouping paren; `parse_paren` intercepts it before this
                // branch is ever reached from there.
                Err(PieError::Parse {
                    kind: ParseErrorKind::UnexpectedToken {
                        expected: "expression".to_string(),
                        found: TokenKind::Ellipsis,
                    },
                    span: self.peek().span,
                })
            }
            other => Err(PieError::Parse {
                kind: ParseErrorKind::UnexpectedToken {
                    expected: "expression".to_string(),
                    found: other,
                },
                span: self.peek().span,
            }),
        }
    }

    fn parse_name_prefix(&mut self) -> PResult<ExprRef> {
        let name = self.peek().text.clone();

        match self.registry.kind_of(&name) {
            Some(FixKind::Prefix) => {
                self.advance();
                let prec = self.descriptor_precedence(&name);
                let operand = self.parse_expr(prec)?;
                return Ok(Rc::new(Expr::UnaryOp { op: name, operand }));
            }
            Some(FixKind::Exfix) => {
                self.advance();
                let descriptor = self.registry.get(&name).unwrap().clone();
                let close = descriptor.tokens.get(1).cloned().unwrap_or_default();
                let inner = self.parse_expr(Anchor::Low.value())?;
                if self.peek().text != close {
                    return Err(PieError::Parse {
                        kind: ParseErrorKind::ExfixUnclosed { opener: name.clone() },
                        span: self.peek().span,
                    });
                }
                self.advance();
                return Ok(Rc::new(Expr::CircumOp { open: name, close, inner }));
            }
            Some(FixKind::Mixfix) => {
                let descriptor = self.registry.get(&name).unwrap().clone();
                if descriptor.tokens.first().map(String::as_str) == Some(name.as_str())
                    && descriptor.op_pos.first() == Some(&true)
                {
                    self.advance();
                    let mut tokens = vec![name.clone()];
                    let mut operands = Vec::new();
                    let mut token_iter = descriptor.tokens.iter().skip(1);
                    for is_token in descriptor.op_pos.iter().skip(1) {
                        if *is_token {
                            let tok_text = token_iter.next().cloned().unwrap_or_default();
                            if self.peek().text != tok_text {
                                return Err(PieError::Parse {
                                    kind: ParseErrorKind::MixfixOutOfSequence { name: name.clone() },
                                    span: self.peek().span,
                                });
                            }
                            self.advance();
                            tokens.push(tok_text);
                        } else {
                            operands.push(self.parse_expr(Anchor::Low.value())?);
                        }
                    }
                    return Ok(Rc::new(Expr::OpCall { tokens, operands }));
                }
            }
            _ => {}
        }

        self.advance();
        if self.check(TokenKind::Colon) {
            self.advance();
            let ty = self.parse_type()?;
            Ok(Rc::new(Expr::Assignment {
                lhs: Rc::new(Expr::Name(name)),
                ty,
                rhs: Rc::new(Expr::Literal(crate::ast::Literal::Bool(true))),
            }))
        } else {
            Ok(Rc::new(Expr::Name(name)))
        }
    }

    // --- calls ---------------------------------------------------------------

    fn parse_call(&mut self, callee: ExprRef) -> PResult<ExprRef> {
        self.expect(TokenKind::LParen)?;
        let mut positional = Vec::new();
        let mut named = Vec::new();
        let mut spreads = Vec::new();

        while !self.check(TokenKind::RParen) {
            if self.check(TokenKind::Name)
                && self.peek_kind_at(1) == TokenKind::Assign
                && self.peek_kind_at(2) != TokenKind::Assign
            {
                let arg_name = self.expect_name()?;
                self.expect(TokenKind::Assign)?;
                let value = self.parse_expr(Anchor::Assignment.value())?;
                if named.iter().any(|(n, _): &(String, ExprRef)| n == &arg_name) {
                    return Err(PieError::Parse {
                        kind: ParseErrorKind::DuplicateNamedArgument { name: arg_name },
                        span: self.peek().span,
                    });
                }
                named.push((arg_name, value));
            } else {
                let value = self.parse_expr(Anchor::Assignment.value())?;
                if self.check(TokenKind::Ellipsis) {
                    self.advance();
                    spreads.push(value);
                } else {
                    positional.push(value);
                }
            }

            if self.check(TokenKind::Comma) {
                self.advance();
            } else {
                break;
            }
        }

        self.expect(TokenKind::RParen)?;
        Ok(Rc::new(Expr::Call {
            callee,
            positional,
            named,
            spreads,
        }))
    }

    // --- parenthesized expressions: grouping, closures, folds -----------------

    fn parse_paren(&mut self) -> PResult<ExprRef> {
        // Two-token lookahead distinguishes a closure parameter list from a
        // grouping: `(`, NAME, then `,`/`:`/`)` followed by `=>` implies a
        // closure; an empty `()=>` is also a (nullary) closure.
        if self.looks_like_closure() {
            return self.parse_closure();
        }

        self.expect(TokenKind::LParen)?;
        let expr = self.parse_grouped_expr()?;
        self.expect(TokenKind::RParen)?;
        Ok(Rc::new(Expr::Grouping(expr)))
    }

    fn looks_like_closure(&self) -> bool {
        if self.peek_kind_at(1) == TokenKind::RParen && self.peek_kind_at(2) == TokenKind::FatArrow
        {
            return true;
        }
        if self.peek_kind_at(1) == TokenKind::Name {
            matches!(
                self.peek_kind_at(2),
                TokenKind::Comma | TokenKind::Colon | TokenKind::RParen
            ) && self.contains_fat_arrow_before_semi()
        } else {
            false
        }
    }

    /// A crude but effective disambiguator: if `=>` appears before the next
    /// unmatched top-level `;`, this paren group is a closure's parameter
    /// list, not a grouping.
    fn contains_fat_arrow_before_semi(&self) -> bool {
        let mut depth = 0i32;
        let mut i = self.pos;
        while i < self.tokens.len() {
            match self.tokens[i].kind {
                TokenKind::LParen => depth += 1,
                TokenKind::RParen => {
                    depth -= 1;
                    if depth == 0 {
                        return self.tokens.get(i + 1).map(|t| t.kind) == Some(TokenKind::FatArrow);
                    }
                }
                TokenKind::End => return false,
                _ => {}
            }
            i += 1;
        }
        false
    }

    fn parse_closure(&mut self) -> PResult<ExprRef> {
        self.expect(TokenKind::LParen)?;
        let mut params = Vec::new();
        while !self.check(TokenKind::RParen) {
            let name = self.expect_name()?;
            let ty = if self.check(TokenKind::Colon) {
                self.advance();
                self.parse_type()?
            } else {
                TypeExpr::TryReassign
            };
            let default = if self.check(TokenKind::Assign) {
                self.advance();
                Some(self.parse_expr(Anchor::Assignment.value())?)
            } else {
                None
            };
            params.push(Param { name, ty, default });
            if self.check(TokenKind::Comma) {
                self.advance();
            } else {
                break;
            }
        }
        self.expect(TokenKind::RParen)?;
        self.expect(TokenKind::FatArrow)?;
        let ret = if self.check(TokenKind::Colon) {
            self.advance();
            self.parse_type()?
        } else {
            TypeExpr::TryReassign
        };
        let body = self.parse_expr(Anchor::Assignment.value())?;
        Ok(Rc::new(Expr::Closure { params, body, ret }))
    }

    // --- fold parsing ----------------------------------------------------------

    fn save(&self) -> usize {
        self.pos
    }
    fn restore(&mut self, pos: usize) {
        self.pos = pos;
    }

    fn is_infix_operator_name(&self) -> bool {
        self.check(TokenKind::Name)
            && matches!(
                self.registry.kind_of(&self.peek().text),
                Some(FixKind::Infix) | None
            )
    }

    fn parse_grouped_expr(&mut self) -> PResult<ExprRef> {
        if self.check(TokenKind::Ellipsis) {
            return self.parse_leading_ellipsis_fold();
        }

        let start = self.save();
        let left = self.parse_expr(Anchor::Prefix.value())?;

        if self.is_infix_operator_name() {
            let op1 = self.peek().text.clone();
            if self.peek_kind_at(1) == TokenKind::Ellipsis {
                self.advance(); // op1
                self.advance(); // ellipsis
                if self.check(TokenKind::RParen) {
                    return Ok(Rc::new(Expr::Fold {
                        shape: FoldShape::UnaryLeft,
                        op: op1,
                        pack: left,
                        other: None,
                    }));
                }
                if self.is_infix_operator_name() {
                    let op2 = self.advance().text;
                    let rhs = self.parse_expr(self.descriptor_precedence(&op2))?;
                    if op1 == op2 {
                        return Ok(Rc::new(Expr::Fold {
                            shape: FoldShape::Separated,
                            op: op1,
                            pack: left,
                            other: Some(rhs),
                        }));
                    }
                }
                // Didn't actually form a recognizable fold; fall through to
                // ordinary parsing from the start.
                self.restore(start);
            } else {
                // Try the seeded-left shape: `init op pack op ...`.
                let attempt = self.try_seeded_left(left.clone(), &op1);
                match attempt {
                    Ok(Some(fold)) => return Ok(fold),
                    Ok(None) => self.restore(start),
                    Err(e) => return Err(e),
                }
            }
        }

        self.restore(start);
        self.parse_expr(Anchor::Low.value())
    }

    fn try_seeded_left(&mut self, init: ExprRef, op1: &str) -> PResult<Option<ExprRef>> {
        let start = self.save();
        self.advance(); // op1
        let pack = self.parse_expr(Anchor::Prefix.value())?;
        if !self.is_infix_operator_name() {
            self.restore(start);
            return Ok(None);
        }
        let op2 = self.peek().text.clone();
        if op2 != op1 || self.peek_kind_at(1) != TokenKind::Ellipsis {
            self.restore(start);
            return Ok(None);
        }
        self.advance(); // op2
        self.advance(); // ellipsis
        if !self.check(TokenKind::RParen) {
            self.restore(start);
            return Ok(None);
        }
        Ok(Some(Rc::new(Expr::Fold {
            shape: FoldShape::SeededLeft,
            op: op1.to_string(),
            pack,
            other: Some(init),
        })))
    }

    fn parse_leading_ellipsis_fold(&mut self) -> PResult<ExprRef> {
        self.advance(); // ellipsis
        let op1 = self.expect_operator_name()?;
        let prec = self.descriptor_precedence(&op1);
        let e2 = self.parse_expr(prec)?;
        if self.is_infix_operator_name() {
            let op2 = self.peek().text.clone();
            if op2 == op1 {
                self.advance();
                let prec2 = self.descriptor_precedence(&op2);
                let e3 = self.parse_expr(prec2)?;
                return Ok(Rc::new(Expr::Fold {
                    shape: FoldShape::SeededRight,
                    op: op1,
                    pack: e2,
                    other: Some(e3),
                }));
            }
        }
        Ok(Rc::new(Expr::Fold {
            shape: FoldShape::UnaryRight,
            op: op1,
            pack: e2,
            other: None,
        }))
    }

    fn expect_operator_name(&mut self) -> PResult<String> {
        if self.check(TokenKind::Name) {
            Ok(self.advance().text)
        } else {
            Err(PieError::Parse {
                kind: ParseErrorKind::UnknownInfixOperator {
                    name: self.peek().text.clone(),
                },
                span: self.peek().span,
            })
        }
    }

    // --- blocks --------------------------------------------------------------

    fn parse_block(&mut self) -> PResult<ExprRef> {
        self.expect(TokenKind::LBrace)?;
        let mut lines = Vec::new();
        while !self.check(TokenKind::RBrace) {
            let line = self.parse_expr(Anchor::Low.value())?;
            self.expect(TokenKind::Semi)?;
            lines.push(line);
        }
        self.expect(TokenKind::RBrace)?;
        Ok(Rc::new(Expr::Block(lines)))
    }

    // --- class / union / match / loop / namespace -----------------------------

    fn parse_class(&mut self) -> PResult<ExprRef> {
        self.expect(TokenKind::Class)?;
        self.expect(TokenKind::LBrace)?;
        let mut members = Vec::new();
        while !self.check(TokenKind::RBrace) {
            let name = self.expect_name()?;
            let ty = if self.check(TokenKind::Colon) {
                self.advance();
                self.parse_type()?
            } else {
                TypeExpr::TryReassign
            };
            self.expect(TokenKind::Assign)?;
            let default = self.parse_expr(Anchor::Assignment.value())?;
            self.expect(TokenKind::Semi)?;
            members.push(Param {
                name,
                ty,
                default: Some(default),
            });
        }
        self.expect(TokenKind::RBrace)?;
        Ok(Rc::new(Expr::ClassLit { members }))
    }

    fn parse_union(&mut self) -> PResult<ExprRef> {
        self.expect(TokenKind::Union)?;
        self.expect(TokenKind::LBrace)?;
        let mut variants = Vec::new();
        while !self.check(TokenKind::RBrace) {
            variants.push(self.parse_type()?);
            self.expect(TokenKind::Semi)?;
        }
        self.expect(TokenKind::RBrace)?;
        Ok(Rc::new(Expr::UnionLit { variants }))
    }

    fn parse_match(&mut self) -> PResult<ExprRef> {
        self.expect(TokenKind::Match)?;
        let scrutinee = self.parse_expr(Anchor::Assignment.value())?;
        self.expect(TokenKind::LBrace)?;
        let mut cases = Vec::new();
        while !self.check(TokenKind::RBrace) {
            cases.push(self.parse_match_case()?);
        }
        self.expect(TokenKind::RBrace)?;
        Ok(Rc::new(Expr::Match { scrutinee, cases }))
    }

    fn parse_match_case(&mut self) -> PResult<MatchCase> {
        let mut patterns = vec![self.parse_pattern()?];
        while self.check(TokenKind::Name) && self.peek().text == "|" {
            self.advance();
            patterns.push(self.parse_pattern()?);
        }
        let guard = if self.check(TokenKind::Name) && self.peek().text == "&" {
            self.advance();
            Some(self.parse_expr(Anchor::Assignment.value())?)
        } else {
            None
        };
        self.expect(TokenKind::FatArrow)?;
        let body = self.parse_expr(Anchor::Assignment.value())?;
        self.expect(TokenKind::Semi)?;
        Ok(MatchCase { patterns, guard, body })
    }

    fn parse_pattern(&mut self) -> PResult<Pattern> {
        let name = self.expect_name()?;
        if self.check(TokenKind::LParen) {
            self.advance();
            let mut subpatterns = Vec::new();
            while !self.check(TokenKind::RParen) {
                subpatterns.push(self.parse_pattern()?);
                if self.check(TokenKind::Comma) {
                    self.advance();
                } else {
                    break;
                }
            }
            self.expect(TokenKind::RParen)?;
            return Ok(Pattern::Structure {
                type_name: name,
                subpatterns,
            });
        }

        let ty = if self.check(TokenKind::Colon) {
            self.advance();
            Some(self.parse_type()?)
        } else {
            None
        };
        let default = if self.check(TokenKind::Assign) {
            self.advance();
            Some(self.parse_expr(Anchor::Assignment.value())?)
        } else {
            None
        };
        Ok(Pattern::Single { name, ty, default })
    }

    fn parse_loop(&mut self) -> PResult<ExprRef> {
        self.expect(TokenKind::Loop)?;
        let (count_or_iterable, binder) = if self.check(TokenKind::LBrace) {
            (None, None)
        } else {
            self.expect(TokenKind::LParen)?;
            let kind_expr = self.parse_expr(Anchor::Low.value())?;
            let binder = if self.check(TokenKind::Comma) {
                self.advance();
                Some(self.expect_name()?)
            } else {
                None
            };
            self.expect(TokenKind::RParen)?;
            (Some(kind_expr), binder)
        };
        let body = self.parse_block()?;
        let else_branch = if self.check(TokenKind::Name) && self.peek().text == "else" {
            self.advance();
            Some(self.parse_block()?)
        } else {
            None
        };
        Ok(Rc::new(Expr::Loop {
            count_or_iterable,
            binder,
            body,
            else_branch,
        }))
    }

    fn parse_namespace(&mut self) -> PResult<ExprRef> {
        self.expect(TokenKind::Namespace)?;
        self.expect(TokenKind::LBrace)?;
        let mut members = Vec::new();
        while !self.check(TokenKind::RBrace) {
            let name = self.expect_name()?;
            self.expect(TokenKind::Assign)?;
            let value = self.parse_expr(Anchor::Assignment.value())?;
            self.expect(TokenKind::Semi)?;
            members.push((name, value));
        }
        self.expect(TokenKind::RBrace)?;
        Ok(Rc::new(Expr::NamespaceLit { members }))
    }

    // --- types -----------------------------------------------------------------

    fn parse_type(&mut self) -> PResult<TypeExpr> {
        if self.check(TokenKind::Ellipsis) {
            self.advance();
            let inner = self.parse_type()?;
            if matches!(inner, TypeExpr::Variadic(_)) {
                return Err(PieError::Parse {
                    kind: ParseErrorKind::MalformedFixDeclaration {
                        detail: "variadic of a variadic is not allowed".to_string(),
                    },
                    span: self.peek().span,
                });
            }
            return Ok(TypeExpr::Variadic(Box::new(inner)));
        }

        if self.check(TokenKind::LParen) {
            let start = self.save();
            self.advance();
            let mut params = Vec::new();
            let mut is_function_type = self.check(TokenKind::RParen);
            while !self.check(TokenKind::RParen) {
                params.push(self.parse_type()?);
                if self.check(TokenKind::Comma) {
                    self.advance();
                } else {
                    break;
                }
            }
            if self.check(TokenKind::RParen) && self.peek_kind_at(1) == TokenKind::Colon {
                is_function_type = true;
            }
            if is_function_type {
                self.expect(TokenKind::RParen)?;
                self.expect(TokenKind::Colon)?;
                let ret = self.parse_type()?;
                return Ok(TypeExpr::Function(params, Box::new(ret)));
            }
            self.restore(start);
        }

        if self.check(TokenKind::Name) {
            let name = self.peek().text.clone();
            if crate::types::BuiltinType::from_name(&name).is_some() {
                self.advance();
                return Ok(TypeExpr::Builtin(name));
            }
        }

        let expr = self.parse_expr(Anchor::Assignment.value())?;
        Ok(TypeExpr::Expression(expr))
    }

    // --- fix declarations --------------------------------------------------------

    fn parse_fix_decl(&mut self) -> PResult<ExprRef> {
        let kind = match self.advance().kind {
            TokenKind::Mixfix => FixKind::Mixfix,
            TokenKind::Prefix => FixKind::Prefix,
            TokenKind::Infix => FixKind::Infix,
            TokenKind::Suffix => FixKind::Suffix,
            TokenKind::Exfix => FixKind::Exfix,
            _ => unreachable!(),
        };

        self.expect(TokenKind::LParen)?;
        let high_name = self.parse_anchor_name()?;
        let (high, low, shift) = if self.check(TokenKind::RParen) {
            let a = AnchorRef::parse(&high_name);
            (a.clone(), a, 0)
        } else {
            let shift: i64 = if self.check(TokenKind::Name)
                && matches!(self.peek().text.as_str(), "+" | "-")
            {
                let text = self.advance().text;
                if text == "-" { -1 } else { 1 }
            } else {
                0
            };
            let anchor = AnchorRef::parse(&high_name);
            let (high, low) = shifted_anchors(&anchor, shift);
            (high, low, shift)
        };
        self.expect(TokenKind::RParen)?;

        let mut tokens = Vec::new();
        let mut op_pos = Vec::new();

        match kind {
            FixKind::Prefix | FixKind::Suffix => {
                tokens.push(self.expect_operator_token()?);
                op_pos.push(true);
            }
            FixKind::Infix => {
                tokens.push(self.expect_operator_token()?);
                op_pos.push(true);
            }
            FixKind::Exfix => {
                tokens.push(self.expect_operator_token()?);
                op_pos.push(true);
                self.expect(TokenKind::Colon)?;
                tokens.push(self.expect_operator_token()?);
                op_pos.push(true);
            }
            FixKind::Mixfix => {
                tokens.push(self.expect_operator_token()?);
                op_pos.push(true);
                while self.check(TokenKind::Colon) {
                    self.advance();
                    op_pos.push(false);
                    if self.check(TokenKind::Name)
                        && self.registry.kind_of(&self.peek().text).is_none()
                        && self.peek_kind_at(1) == TokenKind::Colon
                    {
                        // a following literal token, not another hole
                    }
                    if !self.check(TokenKind::Colon) && self.check(TokenKind::Name) {
                        // heuristically treat a bare name here as another
                        // literal mixfix token only if it is immediately
                        // followed by `:` again (hole-token-hole... pattern);
                        // otherwise it belongs to the closure that follows.
                        if self.peek_kind_at(1) == TokenKind::Colon {
                            let tok = self.expect_operator_token()?;
                            tokens.push(tok);
                            op_pos.push(true);
                        }
                    }
                }
            }
        }

        self.expect(TokenKind::Assign)?;
        let body = self.parse_expr(Anchor::Assignment.value())?;

        let name = tokens[0].clone();
        self.registry
            .declare(&name, tokens.clone(), op_pos.clone(), kind, high, low, shift, body.clone())
            .map_err(|message| PieError::Overload {
                message,
                span: self.peek().span,
            })?;

        Ok(Rc::new(Expr::FixDecl(FixDecl {
            kind,
            tokens,
            high: AnchorRef::parse(&high_name),
            low: AnchorRef::parse(&high_name),
            shift,
            body,
        })))
    }

    fn parse_anchor_name(&mut self) -> PResult<String> {
        if self.check(TokenKind::Name) {
            Ok(self.advance().text)
        } else {
            Err(PieError::Parse {
                kind: ParseErrorKind::MalformedFixDeclaration {
                    detail: "expected a precedence anchor name".to_string(),
                },
                span: self.peek().span,
            })
        }
    }

    fn expect_operator_token(&mut self) -> PResult<String> {
        if self.check(TokenKind::Name) {
            Ok(self.advance().text)
        } else {
            Err(PieError::Parse {
                kind: ParseErrorKind::MalformedFixDeclaration {
                    detail: "expected an operator token".to_string(),
                },
                span: self.peek().span,
            })
        }
    }
}

/// `+n` walks `n` rungs up the built-in ladder from `anchor` to get `high`,
/// keeping `low` at `anchor`; `-n` is the mirror image.
fn shifted_anchors(anchor: &AnchorRef, shift: i64) -> (AnchorRef, AnchorRef) {
    if shift == 0 {
        return (anchor.clone(), anchor.clone());
    }
    if let AnchorRef::Builtin(a) = anchor {
        if shift > 0 {
            (a.higher().map(AnchorRef::Builtin).unwrap_or(anchor.clone()), anchor.clone())
        } else {
            (anchor.clone(), a.lower().map(AnchorRef::Builtin).unwrap_or(anchor.clone()))
        }
    } else {
        (anchor.clone(), anchor.clone())
    }
}

pub fn parse(tokens: Vec<Token>) -> PResult<(Vec<ExprRef>, OperatorRegistry)> {
    let mut parser = Parser::new(tokens);
    let program = parser.parse_program()?;
    Ok((program, parser.registry))
}

#[allow(dead_code)]
fn dummy_span() -> Span {
    Span::new(0, 0, 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;

    fn parse_source(src: &str) -> Vec<ExprRef> {
        let tokens = lex(src).unwrap();
        parse(tokens).unwrap().0
    }

    #[test]
    fn parses_simple_assignment() {
        let items = parse_source("x = 1;");
        assert_eq!(items.len(), 1);
        assert!(matches!(&*items[0], Expr::Assignment { .. }));
    }

    #[test]
    fn parses_closure_literal() {
        let items = parse_source("f = (x, y) => x;");
        match &*items[0] {
            Expr::Assignment { rhs, .. } => {
                assert!(matches!(&**rhs, Expr::Closure { .. }));
            }
            _ => panic!("expected assignment"),
        }
    }

    #[test]
    fn parses_grouping_vs_closure() {
        let items = parse_source("x = (1 + 2);");
        match &*items[0] {
            Expr::Assignment { rhs, .. } => assert!(matches!(&**rhs, Expr::Grouping(_))),
            _ => panic!(),
        }
    }

    #[test]
    fn parses_infix_declaration_and_use() {
        let items = parse_source(
            "infix(SUM) + = (a,b) => a; print(1 + 2);",
        );
        assert!(matches!(&*items[0], Expr::FixDecl(_)));
        match &*items[1] {
            Expr::Call { positional, .. } => {
                assert!(matches!(&*positional[0], Expr::BinOp { .. }));
            }
            _ => panic!("expected call"),
        }
    }

    #[test]
    fn parses_unary_left_fold() {
        let items = parse_source(
            "infix(SUM) - = (a,b) => a; f = (args: ...Any) => (args - ...);",
        );
        match &*items[1] {
            Expr::Assignment { rhs, .. } => match &**rhs {
                Expr::Closure { body, .. } => match &**body {
                    Expr::Grouping(inner) => {
                        assert!(matches!(&**inner, Expr::Fold { shape: FoldShape::UnaryLeft, .. }))
                    }
                    _ => panic!("expected grouping"),
                },
                _ => panic!("expected closure"),
            },
            _ => panic!(),
        }
    }

    #[test]
    fn parses_separated_fold() {
        let items = parse_source(
            "infix(SUM) - = (a,b) => a; f = (args: ...Any) => (args - ... - 10);",
        );
        match &*items[1] {
            Expr::Assignment { rhs, .. } => match &**rhs {
                Expr::Closure { body, .. } => match &**body {
                    Expr::Grouping(inner) => {
                        assert!(matches!(&**inner, Expr::Fold { shape: FoldShape::Separated, .. }))
                    }
                    _ => panic!("expected grouping"),
                },
                _ => panic!("expected closure"),
            },
            _ => panic!(),
        }
    }

    #[test]
    fn parses_match_expression() {
        let items = parse_source(
            "test = (x) => match x { Leaf(k) => 1; Node(k,l,r) => 2; };",
        );
        match &*items[0] {
            Expr::Assignment { rhs, .. } => match &**rhs {
                Expr::Closure { body, .. } => assert!(matches!(&**body, Expr::Match { .. })),
                _ => panic!(),
            },
            _ => panic!(),
        }
    }
}
