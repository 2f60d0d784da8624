use std::rc::Rc;

use crate::ast::*;
use crate::error::CompileError;
use crate::lexer::{Lexer, SpannedToken, Token};

/// Parse a module. Errors carry a code frame rendered against `source`.
pub fn parse(source: &str, specifier: &str) -> Result<Program, CompileError> {
    let result = Lexer::new(source).and_then(|lexer| {
        let mut parser = Parser {
            lexer,
            inside_macro: false,
            top_level: true,
        };
        parser.parse_program()
    });
    if result.is_ok() {
        tracing::debug!(specifier, "parsed module");
    }
    result.map_err(|e| e.with_frame(source, specifier))
}

struct Parser<'a> {
    lexer: Lexer<'a>,
    inside_macro: bool,
    top_level: bool,
}

impl Parser<'_> {
    // ── Helpers ────────────────────────────────────────────────────

    fn peek(&self) -> &Token {
        &self.lexer.peek().token
    }

    /// Start of the node beginning at the peeked token.
    fn start(&self) -> Span {
        self.lexer.peek().span
    }

    /// Span from `start` to the end of the last consumed token.
    fn finish(&self, start: Span) -> Span {
        start.merge(self.lexer.last_span())
    }

    fn expect(&mut self, token: &Token) -> Result<SpannedToken, CompileError> {
        self.lexer.expect(token)
    }

    fn eat(&mut self, token: &Token) -> Result<bool, CompileError> {
        self.lexer.eat(token)
    }

    fn expect_ident(&mut self) -> Result<Ident, CompileError> {
        let tok = self.expect(&Token::Ident(String::new()))?;
        match tok.token {
            Token::Ident(name) => Ok(Ident { name, span: tok.span }),
            _ => Err(CompileError::syntax("Unexpected token", tok.span)),
        }
    }

    fn expect_macro_ident(&mut self) -> Result<Ident, CompileError> {
        let tok = self.expect(&Token::MacroIdent(String::new()))?;
        match tok.token {
            Token::MacroIdent(name) => Ok(Ident { name, span: tok.span }),
            _ => Err(CompileError::syntax("Unexpected token", tok.span)),
        }
    }

    fn expect_string(&mut self) -> Result<StringLit, CompileError> {
        let tok = self.expect(&Token::Str(String::new()))?;
        match tok.token {
            Token::Str(value) => Ok(StringLit { value, span: tok.span }),
            _ => Err(CompileError::syntax("Unexpected token", tok.span)),
        }
    }

    // ── Statements ─────────────────────────────────────────────────

    fn parse_program(&mut self) -> Result<Program, CompileError> {
        let start = self.start();
        let statements = self.parse_statement_list(&Token::Eof)?;
        Ok(Program {
            statements,
            span: self.finish(start),
        })
    }

    fn parse_statement_list(&mut self, end: &Token) -> Result<Vec<Stmt>, CompileError> {
        let mut statements = Vec::new();
        while !self.eat(end)? {
            statements.push(self.parse_statement(end)?);
        }
        Ok(statements)
    }

    fn parse_statement(&mut self, end: &Token) -> Result<Stmt, CompileError> {
        match self.peek() {
            Token::Import => Ok(Stmt::Import(self.parse_import()?)),
            Token::Let => Ok(Stmt::Local(self.parse_local()?)),
            Token::Alias => Ok(Stmt::Alias(self.parse_alias()?)),
            Token::Export | Token::Macro => {
                if self.inside_macro {
                    return Err(CompileError::syntax(
                        "Cannot declare macro inside macro",
                        self.start(),
                    ));
                }
                Ok(Stmt::Macro(Rc::new(self.parse_macro()?)))
            }
            Token::If => {
                let start = self.start();
                let node = self.parse_if()?;
                Ok(Stmt::If(node, self.finish(start)))
            }
            Token::LBrace => Ok(Stmt::Block(self.parse_block()?)),
            _ => {
                let expr = self.parse_expression()?;
                if self.peek().is_assignment() {
                    if let Some(target) = assign_target(&expr) {
                        return Ok(Stmt::Assignment(self.parse_assignment(target, expr)?));
                    }
                }
                if self.eat(&Token::Semicolon)? {
                    return Ok(Stmt::Expr { expr, terminated: true });
                }
                if !self.lexer.test(end) {
                    let at = expr.span.end;
                    return Err(CompileError::syntax(
                        "Expected semicolon after expression",
                        Span {
                            start_index: expr.span.end_index,
                            end_index: expr.span.end_index,
                            start: at,
                            end: Position { line: at.line, column: at.column + 1 },
                        },
                    ));
                }
                Ok(Stmt::Expr { expr, terminated: false })
            }
        }
    }

    fn parse_import(&mut self) -> Result<ImportDecl, CompileError> {
        let start = self.start();
        self.expect(&Token::Import)?;
        self.expect(&Token::LBrace)?;
        let mut names = Vec::new();
        while !self.eat(&Token::RBrace)? {
            names.push(self.expect_ident()?);
            if self.eat(&Token::RBrace)? {
                break;
            }
            self.expect(&Token::Comma)?;
        }
        self.expect(&Token::From)?;
        let specifier = self.expect_string()?;
        self.expect(&Token::Semicolon)?;
        Ok(ImportDecl {
            names,
            specifier,
            span: self.finish(start),
        })
    }

    fn parse_local(&mut self) -> Result<LocalDecl, CompileError> {
        let start = self.start();
        self.expect(&Token::Let)?;
        let name = self.expect_ident()?;
        self.expect(&Token::Assign)?;
        let value = self.parse_expression()?;
        self.expect(&Token::Semicolon)?;
        Ok(LocalDecl {
            name,
            value,
            span: self.finish(start),
        })
    }

    fn parse_alias(&mut self) -> Result<AliasDecl, CompileError> {
        let start = self.start();
        self.expect(&Token::Alias)?;
        let name = self.expect_ident()?;
        self.expect(&Token::Assign)?;
        self.lexer.rescan_simvar()?;
        let tok = self.expect(&Token::SimVar(SimVarRef {
            name: String::new(),
            unit: None,
        }))?;
        let Token::SimVar(target) = tok.token else {
            return Err(CompileError::syntax("Unexpected token", tok.span));
        };
        if target.unit.is_none() {
            return Err(CompileError::syntax("Aliased simvars must have a unit", tok.span));
        }
        self.expect(&Token::Semicolon)?;
        Ok(AliasDecl {
            name,
            target,
            target_span: tok.span,
            span: self.finish(start),
        })
    }

    fn parse_macro(&mut self) -> Result<MacroDecl, CompileError> {
        let start = self.start();
        let exported = self.top_level && self.eat(&Token::Export)?;
        self.expect(&Token::Macro)?;
        let name = self.expect_ident()?;
        self.expect(&Token::LParen)?;
        let mut params = Vec::new();
        while !self.eat(&Token::RParen)? {
            params.push(self.expect_macro_ident()?);
            if self.eat(&Token::RParen)? {
                break;
            }
            self.expect(&Token::Comma)?;
        }
        self.inside_macro = true;
        let body = self.parse_block();
        self.inside_macro = false;
        Ok(MacroDecl {
            name,
            exported,
            params,
            body: body?,
            span: self.finish(start),
        })
    }

    /// `target = value;` or `target OP= value;`, the latter rewritten to
    /// `target = target OP value`.
    fn parse_assignment(&mut self, target: AssignTarget, left: Expr) -> Result<Assignment, CompileError> {
        let start = left.span;
        let tok = self.lexer.next()?;
        let value = match tok.token {
            Token::Assign => self.parse_expression()?,
            Token::AssignOp(op) => {
                let right = self.parse_expression()?;
                Expr {
                    kind: ExprKind::Binary {
                        op,
                        left: Box::new(left),
                        right: Box::new(right),
                    },
                    span: self.finish(start),
                }
            }
            _ => return Err(CompileError::syntax("Unexpected token", tok.span)),
        };
        self.expect(&Token::Semicolon)?;
        Ok(Assignment {
            target,
            value,
            span: self.finish(start),
        })
    }

    // ── Expressions ────────────────────────────────────────────────

    fn parse_expression(&mut self) -> Result<Expr, CompileError> {
        let initial = self.parse_unary()?;
        self.parse_binary(BinOp::Or.precedence(), initial)
    }

    /// Precedence climbing: consume every operator of the current tier, then
    /// step down one tier, until below `precedence`.
    fn parse_binary(&mut self, precedence: u8, initial: Expr) -> Result<Expr, CompileError> {
        let mut p = self.peek().precedence();
        let mut x = initial;
        while p >= precedence {
            while self.peek().precedence() == p {
                let tok = self.lexer.next()?;
                let Some(op) = tok.token.binary_op() else {
                    return Err(CompileError::syntax("Unexpected token", tok.span));
                };
                let operand = self.parse_unary()?;
                let right = self.parse_binary(p + 1, operand)?;
                let span = self.finish(x.span);
                x = Expr {
                    kind: ExprKind::Binary {
                        op,
                        left: Box::new(x),
                        right: Box::new(right),
                    },
                    span,
                };
            }
            p -= 1;
        }
        Ok(x)
    }

    fn parse_unary(&mut self) -> Result<Expr, CompileError> {
        let start = self.start();
        let op = match self.peek() {
            Token::Bang => UnaryOp::Not,
            Token::Tilde => UnaryOp::BitNot,
            Token::Minus => UnaryOp::Neg,
            _ => return self.parse_method(),
        };
        self.lexer.next()?;
        let operand = self.parse_unary()?;
        Ok(Expr {
            kind: ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            span: self.finish(start),
        })
    }

    fn parse_method(&mut self) -> Result<Expr, CompileError> {
        let mut left = self.parse_macro_expansion()?;
        while self.eat(&Token::Period)? {
            let callee = self.expect_ident()?;
            let args = self.parse_arguments()?;
            let span = self.finish(left.span);
            left = Expr {
                kind: ExprKind::Method {
                    target: Box::new(left),
                    callee,
                    args,
                },
                span,
            };
        }
        Ok(left)
    }

    fn parse_macro_expansion(&mut self) -> Result<Expr, CompileError> {
        let left = self.parse_primary()?;
        if let ExprKind::Identifier(name) = &left.kind {
            if self.lexer.test(&Token::LParen) {
                let name = Ident {
                    name: name.clone(),
                    span: left.span,
                };
                let args = self.parse_arguments()?;
                return Ok(Expr {
                    kind: ExprKind::MacroExpansion { name, args },
                    span: self.finish(left.span),
                });
            }
        }
        Ok(left)
    }

    fn parse_arguments(&mut self) -> Result<Arguments, CompileError> {
        let open = self.expect(&Token::LParen)?;
        let mut items = Vec::new();
        while !self.lexer.test(&Token::RParen) {
            items.push(Rc::new(self.parse_expression()?));
            if self.lexer.test(&Token::RParen) {
                break;
            }
            self.expect(&Token::Comma)?;
        }
        let close = self.expect(&Token::RParen)?;
        Ok(Arguments {
            items,
            span: open.span.merge(close.span),
        })
    }

    fn parse_primary(&mut self) -> Result<Expr, CompileError> {
        match self.peek() {
            Token::Ident(_) => {
                let ident = self.expect_ident()?;
                Ok(Expr {
                    kind: ExprKind::Identifier(ident.name),
                    span: ident.span,
                })
            }
            Token::MacroIdent(_) if !self.inside_macro => Err(self.lexer.unexpected()),
            Token::LParen => {
                self.lexer.next()?;
                let inner = self.parse_expression()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Token::If => {
                let start = self.start();
                let node = self.parse_if()?;
                Ok(Expr {
                    kind: ExprKind::If(node),
                    span: self.finish(start),
                })
            }
            Token::LBrace => {
                let block = self.parse_block()?;
                Ok(Expr {
                    span: block.span,
                    kind: ExprKind::Block(block),
                })
            }
            Token::MacroIdent(_)
            | Token::True
            | Token::False
            | Token::Number(_)
            | Token::Str(_)
            | Token::SimVar(_)
            | Token::Insert(_) => {
                let tok = self.lexer.next()?;
                let kind = match tok.token {
                    Token::MacroIdent(name) => ExprKind::MacroIdentifier(name),
                    Token::True => ExprKind::Boolean(true),
                    Token::False => ExprKind::Boolean(false),
                    Token::Number(n) => ExprKind::Number(n),
                    Token::Str(s) => ExprKind::Str(s),
                    Token::SimVar(var) => ExprKind::SimVar(var),
                    Token::Insert(var) => ExprKind::Insert(var),
                    _ => return Err(CompileError::syntax("Unexpected token", tok.span)),
                };
                Ok(Expr { kind, span: tok.span })
            }
            _ => Err(self.lexer.unexpected()),
        }
    }

    fn parse_if(&mut self) -> Result<IfExpr, CompileError> {
        self.expect(&Token::If)?;
        let test = self.parse_expression()?;
        let consequent = self.parse_block()?;
        let alternative = if self.eat(&Token::Else)? {
            if self.lexer.test(&Token::If) {
                // `else if` becomes a block whose value is the nested if.
                let start = self.start();
                let nested = self.parse_if()?;
                let span = self.finish(start);
                Some(Block {
                    statements: vec![Stmt::Expr {
                        expr: Expr {
                            kind: ExprKind::If(nested),
                            span,
                        },
                        terminated: false,
                    }],
                    span,
                })
            } else {
                Some(self.parse_block()?)
            }
        } else {
            None
        };
        Ok(IfExpr {
            test: Box::new(test),
            consequent,
            alternative,
        })
    }

    fn parse_block(&mut self) -> Result<Block, CompileError> {
        let start = self.start();
        self.expect(&Token::LBrace)?;
        let top_level = std::mem::replace(&mut self.top_level, false);
        let statements = self.parse_statement_list(&Token::RBrace);
        self.top_level = top_level;
        Ok(Block {
            statements: statements?,
            span: self.finish(start),
        })
    }
}

fn assign_target(expr: &Expr) -> Option<AssignTarget> {
    match &expr.kind {
        ExprKind::SimVar(var) => Some(AssignTarget::SimVar(var.clone(), expr.span)),
        ExprKind::Identifier(name) => Some(AssignTarget::Identifier(Ident {
            name: name.clone(),
            span: expr.span,
        })),
        _ => None,
    }
}
