use crate::lexer::Lexer;
use crate::token::{Tok, TokKind};
use anyhow::{bail, Result};
use promesa_ast::ast::{
    BinOp, Block, Expr, FutureOpt, Ident, Lit, Program, Stmt, Target, UnOp,
};
use promesa_ast::span::Span;

/// Parse a whole program.
pub fn parse_str(file: &str, src: &str) -> Result<Program> {
    let mut p = Parser::new(file, src);
    p.parse_program()
}

/// Parse source text as a single expression.
///
/// A program consisting of only a tail expression yields that expression;
/// anything with statements is wrapped in a block, so `a = 1; a` parses to
/// `{ a = 1; a }`.
pub fn parse_expr_str(src: &str) -> Result<Expr> {
    let program = parse_str("<expr>", src)?;
    let Block { stmts, tail, span } = program.body;
    match (stmts.is_empty(), tail) {
        (true, Some(tail)) => Ok(*tail),
        (_, tail) => Ok(Expr::Block(Block { stmts, tail, span })),
    }
}

struct Parser<'a> {
    file: &'a str,
    lex: Lexer<'a>,
    cur: Tok,
    nxt: Tok,
}

/// Where a statement list ends.
#[derive(Clone, Copy)]
enum Terminator {
    Brace,
    Eof,
}

impl<'a> Parser<'a> {
    fn new(file: &'a str, src: &'a str) -> Self {
        let mut lex = Lexer::new(src);
        let cur = lex.next_tok();
        let nxt = lex.next_tok();
        Self {
            file,
            lex,
            cur,
            nxt,
        }
    }

    fn bump(&mut self) {
        self.cur = std::mem::replace(&mut self.nxt, self.lex.next_tok());
    }

    fn at(&self, k: &TokKind) -> bool {
        std::mem::discriminant(&self.cur.kind) == std::mem::discriminant(k)
    }

    fn fail<T>(&self, msg: impl std::fmt::Display) -> Result<T> {
        if let TokKind::Error(lex_msg) = &self.cur.kind {
            bail!("{}:{}: {}", self.file, self.cur.span.start, lex_msg);
        }
        bail!("{}:{}: {}", self.file, self.cur.span.start, msg)
    }

    fn expect(&mut self, k: TokKind) -> Result<Tok> {
        if self.at(&k) {
            let t = self.cur.clone();
            self.bump();
            Ok(t)
        } else {
            self.fail(format!("expected {}, found {}", k, self.cur.kind))
        }
    }

    fn parse_ident(&mut self) -> Result<Ident> {
        match &self.cur.kind {
            TokKind::Ident(s) => {
                let id = Ident {
                    text: s.clone(),
                    span: self.cur.span,
                };
                self.bump();
                Ok(id)
            }
            _ => self.fail(format!("expected identifier, found {}", self.cur.kind)),
        }
    }

    // ======= program / blocks / statements =======

    fn parse_program(&mut self) -> Result<Program> {
        let start = self.cur.span.start;
        let (stmts, tail) = self.parse_stmts(Terminator::Eof)?;
        let span = Span {
            start,
            end: self.cur.span.end,
        };
        Ok(Program {
            body: Block { stmts, tail, span },
            span,
        })
    }

    /// Parse a block: `{ stmt* tail? }`
    fn parse_block(&mut self) -> Result<Block> {
        let start = self.cur.span.start;
        self.expect(TokKind::LBrace)?;
        let (stmts, tail) = self.parse_stmts(Terminator::Brace)?;
        let end_tok = self.expect(TokKind::RBrace)?;
        Ok(Block {
            stmts,
            tail,
            span: Span {
                start,
                end: end_tok.span.end,
            },
        })
    }

    fn at_terminator(&self, term: Terminator) -> bool {
        match term {
            Terminator::Brace => matches!(self.cur.kind, TokKind::RBrace),
            Terminator::Eof => matches!(self.cur.kind, TokKind::Eof),
        }
    }

    fn parse_stmts(&mut self, term: Terminator) -> Result<(Vec<Stmt>, Option<Box<Expr>>)> {
        let mut stmts = Vec::new();
        let mut tail = None;

        while !self.at_terminator(term) {
            if matches!(self.cur.kind, TokKind::Eof) {
                return self.fail("unexpected end of input, expected `}`");
            }
            match self.cur.kind {
                TokKind::KwUse => stmts.push(self.parse_use()?),
                TokKind::KwDefer => stmts.push(self.parse_defer(term)?),
                TokKind::Semicolon => self.bump(),
                _ => {
                    let expr = self.parse_expr_bp(0)?;
                    let start = expr.span().start;

                    if matches!(self.cur.kind, TokKind::Eq) {
                        let target = into_target(expr).or_else(|e| self.fail(e))?;
                        self.bump(); // consume '='
                        let value = self.parse_expr_bp(0)?;
                        let end = self.end_stmt(term)?;
                        stmts.push(Stmt::Assign {
                            target,
                            value,
                            span: Span { start, end },
                        });
                    } else if matches!(self.cur.kind, TokKind::Semicolon) {
                        let end = self.cur.span.end;
                        self.bump();
                        stmts.push(Stmt::Expr {
                            expr,
                            span: Span { start, end },
                        });
                    } else if self.at_terminator(term) {
                        tail = Some(Box::new(expr));
                    } else if is_block_like(&expr) {
                        // `if`/`while`/blocks need no trailing ';'
                        let span = expr.span();
                        stmts.push(Stmt::Expr { expr, span });
                    } else {
                        return self.fail(format!(
                            "expected `;` or `=` after expression, found {}",
                            self.cur.kind
                        ));
                    }
                }
            }
        }

        Ok((stmts, tail))
    }

    /// Consume the `;` closing a statement. It may be omitted before the
    /// end of the enclosing block.
    fn end_stmt(&mut self, term: Terminator) -> Result<u32> {
        if self.at_terminator(term) {
            return Ok(self.cur.span.start);
        }
        Ok(self.expect(TokKind::Semicolon)?.span.end)
    }

    /// `use pkg;`
    fn parse_use(&mut self) -> Result<Stmt> {
        let start = self.cur.span.start;
        self.expect(TokKind::KwUse)?;
        let package = self.parse_ident()?;
        let end = self.expect(TokKind::Semicolon)?.span.end;
        Ok(Stmt::Use {
            package,
            span: Span { start, end },
        })
    }

    /// `defer [(opts)] target = expr;`
    fn parse_defer(&mut self, term: Terminator) -> Result<Stmt> {
        let start = self.cur.span.start;
        self.expect(TokKind::KwDefer)?;
        let options = self.parse_future_opts()?;
        let lhs = self.parse_expr_bp(0)?;
        let target = into_target(lhs).or_else(|e| self.fail(e))?;
        self.expect(TokKind::Eq)?;
        let value = self.parse_expr_bp(0)?;
        let end = self.end_stmt(term)?;
        Ok(Stmt::Defer {
            options,
            target,
            value,
            span: Span { start, end },
        })
    }

    /// Optional `(name: lit, ...)` after `future` / `defer`.
    fn parse_future_opts(&mut self) -> Result<Vec<FutureOpt>> {
        let mut opts = Vec::new();
        if !matches!(self.cur.kind, TokKind::LParen) {
            return Ok(opts);
        }
        self.bump();
        while !matches!(self.cur.kind, TokKind::RParen) {
            let name = self.parse_ident()?;
            self.expect(TokKind::Colon)?;
            let value_span = self.cur.span;
            let value = match self.cur.kind.clone() {
                TokKind::Int(v) => Lit::Int(v),
                TokKind::Float(v) => Lit::Float(v),
                TokKind::Str(s) => Lit::Str(s),
                TokKind::KwTrue => Lit::Bool(true),
                TokKind::KwFalse => Lit::Bool(false),
                TokKind::KwNil => Lit::Nil,
                other => return self.fail(format!("expected literal option value, found {other:?}")),
            };
            self.bump();
            opts.push(FutureOpt {
                span: name.span.to(value_span),
                name,
                value,
            });
            if matches!(self.cur.kind, TokKind::Comma) {
                self.bump();
            } else {
                break;
            }
        }
        self.expect(TokKind::RParen)?;
        Ok(opts)
    }

    /// Parse an if expression: `if cond { } [else { }]` or `if cond { } else if cond2 { } else { }`
    fn parse_if(&mut self) -> Result<Expr> {
        let start = self.cur.span.start;
        self.expect(TokKind::KwIf)?;

        let cond = Box::new(self.parse_expr_bp(0)?);
        let then_ = self.parse_block()?;
        let mut end = then_.span.end;

        let else_ = if matches!(self.cur.kind, TokKind::KwElse) {
            self.bump(); // consume 'else'
            let e = if matches!(self.cur.kind, TokKind::KwIf) {
                self.parse_if()?
            } else {
                Expr::Block(self.parse_block()?)
            };
            end = e.span().end;
            Some(Box::new(e))
        } else {
            None
        };

        Ok(Expr::If {
            cond,
            then_,
            else_,
            span: Span { start, end },
        })
    }

    /// Parse a while loop: `while cond { body }`
    fn parse_while(&mut self) -> Result<Expr> {
        let start = self.cur.span.start;
        self.expect(TokKind::KwWhile)?;
        let cond = Box::new(self.parse_expr_bp(0)?);
        let body = self.parse_block()?;
        let span = Span {
            start,
            end: body.span.end,
        };
        Ok(Expr::While { cond, body, span })
    }

    /// `fn(a, b) { body }`
    fn parse_lambda(&mut self) -> Result<Expr> {
        let start = self.cur.span.start;
        self.expect(TokKind::KwFn)?;
        self.expect(TokKind::LParen)?;
        let mut params = Vec::new();
        while !matches!(self.cur.kind, TokKind::RParen) {
            params.push(self.parse_ident()?);
            if matches!(self.cur.kind, TokKind::Comma) {
                self.bump();
            } else {
                break;
            }
        }
        self.expect(TokKind::RParen)?;
        let body = self.parse_block()?;
        let span = Span {
            start,
            end: body.span.end,
        };
        Ok(Expr::Lambda { params, body, span })
    }

    /// `future [(opts)] { body }`
    fn parse_future(&mut self) -> Result<Expr> {
        let start = self.cur.span.start;
        self.expect(TokKind::KwFuture)?;
        let options = self.parse_future_opts()?;
        let body = self.parse_block()?;
        let span = Span {
            start,
            end: body.span.end,
        };
        Ok(Expr::Future {
            options,
            body,
            span,
        })
    }

    // ======= expressions (Pratt parser) =======
    //
    // Precedence (low -> high):
    //   1:  ||
    //   3:  &&
    //   5:  == !=
    //   7:  < <= > >=
    //   10: + -
    //   20: * /
    // prefix (unary) binds tighter than all infix; we give it rbp = 100
    // postfix call `(..)` and index `[..]` bind tightest

    fn parse_expr_bp(&mut self, min_bp: u8) -> Result<Expr> {
        let mut lhs = self.parse_prefix()?;

        loop {
            let (op, lbp, rbp) = match self.cur.kind {
                // logical
                TokKind::OrOr => (BinOp::Or, 1, 2),
                TokKind::AndAnd => (BinOp::And, 3, 4),
                // equality
                TokKind::EqEq => (BinOp::Eq, 5, 6),
                TokKind::BangEq => (BinOp::Ne, 5, 6),
                // relational
                TokKind::Lt => (BinOp::Lt, 7, 8),
                TokKind::Le => (BinOp::Le, 7, 8),
                TokKind::Gt => (BinOp::Gt, 7, 8),
                TokKind::Ge => (BinOp::Ge, 7, 8),
                // arithmetic
                TokKind::Plus => (BinOp::Add, 10, 11),
                TokKind::Minus => (BinOp::Sub, 10, 11),
                TokKind::Star => (BinOp::Mul, 20, 21),
                TokKind::Slash => (BinOp::Div, 20, 21),
                TokKind::LParen => {
                    let start = lhs.span().start;
                    let (args, end) = self.parse_call_args()?;
                    lhs = Expr::Call {
                        callee: Box::new(lhs),
                        args,
                        span: Span { start, end },
                    };
                    continue;
                }
                TokKind::LBracket => {
                    let start = lhs.span().start;
                    self.bump(); // '['
                    let key = self.parse_expr_bp(0)?;
                    let end = self.expect(TokKind::RBracket)?.span.end;
                    lhs = Expr::Index {
                        target: Box::new(lhs),
                        key: Box::new(key),
                        span: Span { start, end },
                    };
                    continue;
                }
                _ => break,
            };

            if lbp < min_bp {
                break;
            }
            self.bump(); // consume operator
            let rhs = self.parse_expr_bp(rbp)?;
            let span = lhs.span().to(rhs.span());
            lhs = Expr::Binary {
                lhs: Box::new(lhs),
                op,
                rhs: Box::new(rhs),
                span,
            };
        }

        Ok(lhs)
    }

    fn parse_prefix(&mut self) -> Result<Expr> {
        // Snapshot current token to avoid borrow issues when bumping
        let tok_kind = self.cur.kind.clone();
        let tok_span = self.cur.span;

        match tok_kind {
            TokKind::Bang | TokKind::Minus => {
                let op = if tok_kind == TokKind::Bang {
                    UnOp::Not
                } else {
                    UnOp::Neg
                };
                self.bump();
                let inner = self.parse_expr_bp(100)?;
                let span = tok_span.to(inner.span());
                Ok(Expr::Unary {
                    op,
                    expr: Box::new(inner),
                    span,
                })
            }

            // primaries
            TokKind::Int(v) => {
                self.bump();
                Ok(Expr::Lit(Lit::Int(v), tok_span))
            }
            TokKind::Float(v) => {
                self.bump();
                Ok(Expr::Lit(Lit::Float(v), tok_span))
            }
            TokKind::Str(s) => {
                self.bump();
                Ok(Expr::Lit(Lit::Str(s), tok_span))
            }
            TokKind::KwTrue => {
                self.bump();
                Ok(Expr::Lit(Lit::Bool(true), tok_span))
            }
            TokKind::KwFalse => {
                self.bump();
                Ok(Expr::Lit(Lit::Bool(false), tok_span))
            }
            TokKind::KwNil => {
                self.bump();
                Ok(Expr::Lit(Lit::Nil, tok_span))
            }

            TokKind::Ident(_) => {
                let id = self.parse_ident()?;
                if matches!(self.cur.kind, TokKind::ColonColon) {
                    self.bump();
                    let name = self.parse_ident()?;
                    let span = id.span.to(name.span);
                    return Ok(Expr::Path {
                        package: id,
                        name,
                        span,
                    });
                }
                Ok(Expr::Var(id))
            }

            TokKind::LParen => {
                self.bump(); // '('
                let inner = self.parse_expr_bp(0)?;
                let end_tok = self.expect(TokKind::RParen)?;
                Ok(Expr::Paren {
                    inner: Box::new(inner),
                    span: tok_span.to(end_tok.span),
                })
            }

            TokKind::LBrace => Ok(Expr::Block(self.parse_block()?)),
            TokKind::KwIf => self.parse_if(),
            TokKind::KwWhile => self.parse_while(),
            TokKind::KwFn => self.parse_lambda(),
            TokKind::KwFuture => self.parse_future(),

            _ => self.fail(format!("unexpected {} in expression", tok_kind)),
        }
    }

    fn parse_call_args(&mut self) -> Result<(Vec<Expr>, u32)> {
        self.expect(TokKind::LParen)?;
        let mut args = Vec::new();
        if !matches!(self.cur.kind, TokKind::RParen) {
            loop {
                args.push(self.parse_expr_bp(0)?);
                if matches!(self.cur.kind, TokKind::Comma) {
                    self.bump();
                    continue;
                }
                break;
            }
        }
        let end = self.expect(TokKind::RParen)?.span.end;
        Ok((args, end))
    }
}

fn into_target(expr: Expr) -> std::result::Result<Target, &'static str> {
    match expr {
        Expr::Var(id) => Ok(Target::Name(id)),
        Expr::Index { target, key, span } => Ok(Target::Index {
            container: target,
            key,
            span,
        }),
        _ => Err("assignment target must be a name or an indexed container"),
    }
}

fn is_block_like(e: &Expr) -> bool {
    matches!(e, Expr::If { .. } | Expr::While { .. } | Expr::Block(_))
}
