//! Recursive-descent parser for Lua 5.3/5.4.
//!
//! Produces the positioned AST in [`crate::parser::ast`]. Beyond syntax,
//! the parser validates semantic well-formedness: `...` outside a vararg
//! function, `break` outside a loop, unresolved `goto` targets, and
//! duplicate labels in a scope are all rejected with positions.
//!
//! Inputs above [`MAX_SOURCE_BYTES`] are refused outright. A wall-clock
//! budget is enforced cooperatively: the grammar rules bump a step counter
//! and the deadline is checked once per counter window, so no separate
//! thread or preemption is involved.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::core::errors::{Error, Result, MAX_SOURCE_BYTES};
use crate::parser::ast::{
    BinOp, Block, Chunk, Expr, FuncBody, IfArm, LocalName, Span, Stat, TableItem, UnOp,
    UNARY_PRIORITY,
};
use crate::parser::lexer::{Lexer, Tok, Token};

/// Steps between deadline checks.
const STEP_WINDOW: u32 = 2048;

/// Parser limits.
#[derive(Clone, Debug)]
pub struct ParseOptions {
    /// Wall-clock budget for one parse.
    pub timeout: Duration,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
        }
    }
}

/// Parse a chunk with default options.
pub fn parse(source: &str, filename: &Path) -> Result<Chunk> {
    parse_with_options(source, filename, &ParseOptions::default())
}

/// Parse a chunk, enforcing the size cap and the wall-clock budget.
pub fn parse_with_options(source: &str, filename: &Path, options: &ParseOptions) -> Result<Chunk> {
    if source.len() > MAX_SOURCE_BYTES {
        return Err(Error::SourceTooLarge {
            file: filename.to_path_buf(),
            size: source.len(),
            limit: MAX_SOURCE_BYTES,
        });
    }
    let (tokens, comments) = Lexer::new(source, filename).tokenize()?;
    let mut parser = Parser {
        tokens,
        idx: 0,
        filename: filename.to_path_buf(),
        started: Instant::now(),
        timeout: options.timeout,
        steps: 0,
        funcs: Vec::new(),
    };
    let block = parser.parse_chunk()?;
    Ok(Chunk { block, comments })
}

struct PendingGoto {
    name: String,
    line: u32,
    col: u32,
    /// Innermost open scope at the `goto` site; lowered as scopes close.
    depth: usize,
}

/// Per-function parsing state for semantic checks.
struct FuncState {
    is_vararg: bool,
    loop_depth: u32,
    label_scopes: Vec<Vec<String>>,
    pending_gotos: Vec<PendingGoto>,
}

struct Parser {
    tokens: Vec<Token>,
    idx: usize,
    filename: PathBuf,
    started: Instant,
    timeout: Duration,
    steps: u32,
    funcs: Vec<FuncState>,
}

impl Parser {
    fn parse_chunk(&mut self) -> Result<Block> {
        // The main chunk is a vararg function.
        self.funcs.push(FuncState {
            is_vararg: true,
            loop_depth: 0,
            label_scopes: Vec::new(),
            pending_gotos: Vec::new(),
        });
        let block = self.parse_block()?;
        self.expect_eof()?;
        self.funcs.pop();
        Ok(block)
    }

    // ---- token plumbing ----

    fn cur(&self) -> &Token {
        &self.tokens[self.idx]
    }

    fn cur_tok(&self) -> &Tok {
        &self.tokens[self.idx].tok
    }

    fn peek_tok(&self) -> &Tok {
        let next = (self.idx + 1).min(self.tokens.len() - 1);
        &self.tokens[next].tok
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.idx].clone();
        if self.idx + 1 < self.tokens.len() {
            self.idx += 1;
        }
        token
    }

    fn prev_end(&self) -> u32 {
        if self.idx == 0 {
            return 0;
        }
        self.tokens[self.idx - 1].span.end_pos
    }

    fn accept(&mut self, tok: &Tok) -> bool {
        if self.cur_tok() == tok {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: Tok) -> Result<Token> {
        if self.cur_tok() == &tok {
            Ok(self.advance())
        } else {
            Err(self.error_here(format!(
                "{} expected near {}",
                tok.describe(),
                self.cur_tok().describe()
            )))
        }
    }

    fn expect_name(&mut self) -> Result<(String, Span)> {
        match self.cur_tok() {
            Tok::Name(_) => {
                let token = self.advance();
                let Tok::Name(name) = token.tok else {
                    unreachable!("matched above");
                };
                Ok((name, token.span))
            }
            other => Err(self.error_here(format!("<name> expected near {}", other.describe()))),
        }
    }

    fn expect_eof(&mut self) -> Result<()> {
        if self.cur_tok() == &Tok::Eof {
            Ok(())
        } else {
            Err(self.error_here(format!(
                "'<eof>' expected near {}",
                self.cur_tok().describe()
            )))
        }
    }

    fn error_here(&self, message: impl Into<String>) -> Error {
        let token = self.cur();
        Error::parse(&self.filename, token.span.line, token.col, message)
    }

    fn error_at(&self, line: u32, col: u32, message: impl Into<String>) -> Error {
        Error::parse(&self.filename, line, col, message)
    }

    /// Cooperative yield point: called once per grammar rule.
    fn step(&mut self) -> Result<()> {
        self.steps = self.steps.wrapping_add(1);
        if self.steps % STEP_WINDOW == 0 && self.started.elapsed() > self.timeout {
            return Err(Error::ParseTimeout {
                file: self.filename.clone(),
                elapsed_ms: self.started.elapsed().as_millis() as u64,
            });
        }
        Ok(())
    }

    fn func(&mut self) -> &mut FuncState {
        self.funcs.last_mut().expect("function state underflow")
    }

    // ---- blocks and statements ----

    fn block_follows(&self) -> bool {
        matches!(
            self.cur_tok(),
            Tok::End | Tok::Else | Tok::Elseif | Tok::Until | Tok::Eof
        )
    }

    fn parse_block(&mut self) -> Result<Block> {
        self.step()?;
        let start = self.cur().span;
        self.func().label_scopes.push(Vec::new());

        let mut stats = Vec::new();
        loop {
            if self.block_follows() {
                break;
            }
            if self.accept(&Tok::Semi) {
                continue;
            }
            if self.cur_tok() == &Tok::Return {
                stats.push(self.parse_return()?);
                break;
            }
            stats.push(self.parse_stat()?);
        }

        self.close_label_scope()?;
        let span = Span::new(start.pos, self.prev_end().max(start.pos), start.line);
        Ok(Block { span, stats })
    }

    /// Resolve pending gotos against the closing scope, then pop it.
    fn close_label_scope(&mut self) -> Result<()> {
        let state = self.func();
        let depth = state.label_scopes.len() - 1;
        let labels = state.label_scopes.pop().expect("label scope underflow");

        let mut unresolved = Vec::new();
        for mut goto in std::mem::take(&mut state.pending_gotos) {
            if goto.depth >= depth {
                if labels.contains(&goto.name) {
                    continue;
                }
                if depth == 0 {
                    return Err(self.error_at(
                        goto.line,
                        goto.col,
                        format!("no visible label '{}' for goto", goto.name),
                    ));
                }
                goto.depth = depth - 1;
            }
            unresolved.push(goto);
        }
        self.func().pending_gotos = unresolved;
        Ok(())
    }

    fn parse_stat(&mut self) -> Result<Stat> {
        self.step()?;
        let start = self.cur().span;
        match self.cur_tok() {
            Tok::If => self.parse_if(start),
            Tok::While => self.parse_while(start),
            Tok::Do => {
                self.advance();
                let body = self.parse_block()?;
                let end = self.expect(Tok::End)?;
                Ok(Stat::Do {
                    span: Span::new(start.pos, end.span.end_pos, start.line),
                    body,
                })
            }
            Tok::For => self.parse_for(start),
            Tok::Repeat => self.parse_repeat(start),
            Tok::Function => self.parse_function_stat(start),
            Tok::Local => self.parse_local(start),
            Tok::DColon => self.parse_label(start),
            Tok::Break => {
                self.advance();
                if self.funcs.last().map(|f| f.loop_depth).unwrap_or(0) == 0 {
                    return Err(self.error_at(
                        start.line,
                        self.tokens[self.idx - 1].col,
                        "break outside a loop",
                    ));
                }
                Ok(Stat::Break { span: start })
            }
            Tok::Goto => {
                self.advance();
                let col = self.cur().col;
                let (name, name_span) = self.expect_name()?;
                let depth = self.func().label_scopes.len() - 1;
                self.func().pending_gotos.push(PendingGoto {
                    name: name.clone(),
                    line: start.line,
                    col,
                    depth,
                });
                Ok(Stat::Goto {
                    span: Span::new(start.pos, name_span.end_pos, start.line),
                    label: name,
                })
            }
            _ => self.parse_expr_stat(start),
        }
    }

    fn parse_return(&mut self) -> Result<Stat> {
        let start = self.cur().span;
        self.advance();
        let mut exprs = Vec::new();
        if !self.block_follows() && self.cur_tok() != &Tok::Semi {
            exprs = self.parse_expr_list()?;
        }
        self.accept(&Tok::Semi);
        Ok(Stat::Return {
            span: Span::new(start.pos, self.prev_end(), start.line),
            exprs,
        })
    }

    fn parse_if(&mut self, start: Span) -> Result<Stat> {
        self.advance();
        let mut arms = Vec::new();

        let cond = self.parse_expr()?;
        self.expect(Tok::Then)?;
        let body = self.parse_block()?;
        arms.push(IfArm {
            span: Span::new(start.pos, self.prev_end(), start.line),
            cond,
            body,
        });

        let mut orelse = None;
        loop {
            match self.cur_tok() {
                Tok::Elseif => {
                    let arm_start = self.cur().span;
                    self.advance();
                    let cond = self.parse_expr()?;
                    self.expect(Tok::Then)?;
                    let body = self.parse_block()?;
                    arms.push(IfArm {
                        span: Span::new(arm_start.pos, self.prev_end(), arm_start.line),
                        cond,
                        body,
                    });
                }
                Tok::Else => {
                    self.advance();
                    orelse = Some(self.parse_block()?);
                    break;
                }
                _ => break,
            }
        }
        let end = self.expect(Tok::End)?;
        Ok(Stat::If {
            span: Span::new(start.pos, end.span.end_pos, start.line),
            arms,
            orelse,
        })
    }

    fn parse_while(&mut self, start: Span) -> Result<Stat> {
        self.advance();
        let cond = self.parse_expr()?;
        self.expect(Tok::Do)?;
        self.func().loop_depth += 1;
        let body = self.parse_block()?;
        self.func().loop_depth -= 1;
        let end = self.expect(Tok::End)?;
        Ok(Stat::While {
            span: Span::new(start.pos, end.span.end_pos, start.line),
            cond,
            body,
        })
    }

    fn parse_repeat(&mut self, start: Span) -> Result<Stat> {
        self.advance();
        self.func().loop_depth += 1;
        let body = self.parse_block()?;
        self.func().loop_depth -= 1;
        self.expect(Tok::Until)?;
        let cond = self.parse_expr()?;
        Ok(Stat::Repeat {
            span: Span::new(start.pos, self.prev_end(), start.line),
            body,
            cond,
        })
    }

    fn parse_for(&mut self, start: Span) -> Result<Stat> {
        self.advance();
        let (first, _) = self.expect_name()?;

        if self.accept(&Tok::Assign) {
            let from = self.parse_expr()?;
            self.expect(Tok::Comma)?;
            let to = self.parse_expr()?;
            let step = if self.accept(&Tok::Comma) {
                Some(self.parse_expr()?)
            } else {
                None
            };
            self.expect(Tok::Do)?;
            self.func().loop_depth += 1;
            let body = self.parse_block()?;
            self.func().loop_depth -= 1;
            let end = self.expect(Tok::End)?;
            return Ok(Stat::ForNum {
                span: Span::new(start.pos, end.span.end_pos, start.line),
                var: first,
                start: from,
                stop: to,
                step,
                body,
            });
        }

        let mut names = vec![first];
        while self.accept(&Tok::Comma) {
            names.push(self.expect_name()?.0);
        }
        self.expect(Tok::In)?;
        let exprs = self.parse_expr_list()?;
        self.expect(Tok::Do)?;
        self.func().loop_depth += 1;
        let body = self.parse_block()?;
        self.func().loop_depth -= 1;
        let end = self.expect(Tok::End)?;
        Ok(Stat::ForIn {
            span: Span::new(start.pos, end.span.end_pos, start.line),
            names,
            exprs,
            body,
        })
    }

    /// `function Name {'.' Name} [':' Name] funcbody`, desugared to a `Set`.
    fn parse_function_stat(&mut self, start: Span) -> Result<Stat> {
        self.advance();
        let (first, first_span) = self.expect_name()?;
        let mut target = Expr::Id {
            span: first_span,
            name: first,
        };

        let mut implicit_self = false;
        loop {
            if self.accept(&Tok::Dot) {
                let (field, field_span) = self.expect_name()?;
                let span = target.span().merge(field_span);
                target = Expr::Index {
                    span,
                    obj: Box::new(target),
                    key: Box::new(Expr::Str {
                        span: field_span,
                        value: field,
                    }),
                };
            } else if self.accept(&Tok::Colon) {
                let (method, method_span) = self.expect_name()?;
                let span = target.span().merge(method_span);
                target = Expr::Index {
                    span,
                    obj: Box::new(target),
                    key: Box::new(Expr::Str {
                        span: method_span,
                        value: method,
                    }),
                };
                implicit_self = true;
                break;
            } else {
                break;
            }
        }

        let func = self.parse_func_body(start, implicit_self)?;
        let span = Span::new(start.pos, self.prev_end(), start.line);
        Ok(Stat::Set {
            span,
            targets: vec![target],
            values: vec![Expr::Function { span, func }],
        })
    }

    fn parse_local(&mut self, start: Span) -> Result<Stat> {
        self.advance();

        if self.accept(&Tok::Function) {
            let (name, _) = self.expect_name()?;
            let func = self.parse_func_body(start, false)?;
            return Ok(Stat::LocalRec {
                span: Span::new(start.pos, self.prev_end(), start.line),
                name,
                func,
            });
        }

        let mut names = Vec::new();
        loop {
            let (name, name_span) = self.expect_name()?;
            let attrib = if self.accept(&Tok::Lt) {
                let (attrib, _) = self.expect_name()?;
                if attrib != "const" && attrib != "close" {
                    return Err(self.error_here(format!("unknown attribute '{attrib}'")));
                }
                self.expect(Tok::Gt)?;
                Some(attrib)
            } else {
                None
            };
            names.push(LocalName {
                span: name_span,
                name,
                attrib,
            });
            if !self.accept(&Tok::Comma) {
                break;
            }
        }

        let values = if self.accept(&Tok::Assign) {
            self.parse_expr_list()?
        } else {
            Vec::new()
        };

        Ok(Stat::Local {
            span: Span::new(start.pos, self.prev_end(), start.line),
            names,
            values,
        })
    }

    fn parse_label(&mut self, start: Span) -> Result<Stat> {
        self.advance();
        let col = self.cur().col;
        let (name, _) = self.expect_name()?;
        let end = self.expect(Tok::DColon)?;

        let scope = self
            .func()
            .label_scopes
            .last_mut()
            .expect("label scope underflow");
        if scope.contains(&name) {
            return Err(self.error_at(
                start.line,
                col,
                format!("label '{name}' already defined"),
            ));
        }
        scope.push(name.clone());

        Ok(Stat::Label {
            span: Span::new(start.pos, end.span.end_pos, start.line),
            name,
        })
    }

    fn parse_expr_stat(&mut self, start: Span) -> Result<Stat> {
        let first = self.parse_suffixed_expr()?;

        if self.cur_tok() == &Tok::Assign || self.cur_tok() == &Tok::Comma {
            let mut targets = vec![first];
            while self.accept(&Tok::Comma) {
                targets.push(self.parse_suffixed_expr()?);
            }
            for target in &targets {
                if !target.is_assign_target() {
                    return Err(self.error_at(
                        target.span().line,
                        1,
                        "cannot assign to this expression",
                    ));
                }
            }
            self.expect(Tok::Assign)?;
            let values = self.parse_expr_list()?;
            return Ok(Stat::Set {
                span: Span::new(start.pos, self.prev_end(), start.line),
                targets,
                values,
            });
        }

        match first {
            call @ (Expr::Call { .. } | Expr::Invoke { .. }) => Ok(Stat::Call {
                span: Span::new(start.pos, self.prev_end(), start.line),
                call,
            }),
            other => Err(self.error_at(
                other.span().line,
                1,
                "syntax error: expression is not a statement",
            )),
        }
    }

    // ---- functions ----

    fn parse_func_body(&mut self, start: Span, implicit_self: bool) -> Result<FuncBody> {
        self.expect(Tok::LParen)?;

        let mut params = Vec::new();
        let mut is_vararg = false;
        if self.cur_tok() != &Tok::RParen {
            loop {
                match self.cur_tok() {
                    Tok::Ellipsis => {
                        self.advance();
                        is_vararg = true;
                        break;
                    }
                    _ => {
                        params.push(self.expect_name()?.0);
                    }
                }
                if !self.accept(&Tok::Comma) {
                    break;
                }
            }
        }
        self.expect(Tok::RParen)?;

        self.funcs.push(FuncState {
            is_vararg,
            loop_depth: 0,
            label_scopes: Vec::new(),
            pending_gotos: Vec::new(),
        });
        let body = self.parse_block()?;
        let end = self.expect(Tok::End)?;
        self.funcs.pop();

        Ok(FuncBody {
            span: Span::new(start.pos, end.span.end_pos, start.line),
            params,
            is_vararg,
            implicit_self,
            body,
            end_line: end.span.line,
        })
    }

    // ---- expressions ----

    fn parse_expr_list(&mut self) -> Result<Vec<Expr>> {
        let mut exprs = vec![self.parse_expr()?];
        while self.accept(&Tok::Comma) {
            exprs.push(self.parse_expr()?);
        }
        Ok(exprs)
    }

    fn parse_expr(&mut self) -> Result<Expr> {
        self.parse_binexpr(0)
    }

    fn parse_binexpr(&mut self, limit: u8) -> Result<Expr> {
        self.step()?;

        let mut left = if let Some(op) = self.unop_here() {
            let start = self.cur().span;
            self.advance();
            let operand = self.parse_binexpr(UNARY_PRIORITY)?;
            let span = start.merge(operand.span());
            Expr::UnOp {
                span,
                op,
                operand: Box::new(operand),
            }
        } else {
            self.parse_simple_expr()?
        };

        while let Some(op) = self.binop_here() {
            let (left_pri, right_pri) = op.priority();
            if left_pri <= limit {
                break;
            }
            self.advance();
            let right = self.parse_binexpr(right_pri)?;
            let span = left.span().merge(right.span());
            left = Expr::BinOp {
                span,
                op,
                lhs: Box::new(left),
                rhs: Box::new(right),
            };
        }

        Ok(left)
    }

    fn unop_here(&self) -> Option<UnOp> {
        match self.cur_tok() {
            Tok::Not => Some(UnOp::Not),
            Tok::Minus => Some(UnOp::Neg),
            Tok::Hash => Some(UnOp::Len),
            Tok::Tilde => Some(UnOp::BNot),
            _ => None,
        }
    }

    fn binop_here(&self) -> Option<BinOp> {
        let op = match self.cur_tok() {
            Tok::Plus => BinOp::Add,
            Tok::Minus => BinOp::Sub,
            Tok::Star => BinOp::Mul,
            Tok::Slash => BinOp::Div,
            Tok::DSlash => BinOp::IDiv,
            Tok::Percent => BinOp::Mod,
            Tok::Caret => BinOp::Pow,
            Tok::Concat => BinOp::Concat,
            Tok::EqEq => BinOp::Eq,
            Tok::Ne => BinOp::Ne,
            Tok::Lt => BinOp::Lt,
            Tok::Le => BinOp::Le,
            Tok::Gt => BinOp::Gt,
            Tok::Ge => BinOp::Ge,
            Tok::And => BinOp::And,
            Tok::Or => BinOp::Or,
            Tok::Amp => BinOp::BAnd,
            Tok::Pipe => BinOp::BOr,
            Tok::Tilde => BinOp::BXor,
            Tok::Shl => BinOp::Shl,
            Tok::Shr => BinOp::Shr,
            _ => return None,
        };
        Some(op)
    }

    fn parse_simple_expr(&mut self) -> Result<Expr> {
        let span = self.cur().span;
        match self.cur_tok() {
            Tok::Nil => {
                self.advance();
                Ok(Expr::Nil { span })
            }
            Tok::True => {
                self.advance();
                Ok(Expr::True { span })
            }
            Tok::False => {
                self.advance();
                Ok(Expr::False { span })
            }
            Tok::Number(_) => {
                let token = self.advance();
                let Tok::Number(repr) = token.tok else {
                    unreachable!("matched above");
                };
                Ok(Expr::Number { span, repr })
            }
            Tok::Str(_) => {
                let token = self.advance();
                let Tok::Str(value) = token.tok else {
                    unreachable!("matched above");
                };
                Ok(Expr::Str { span, value })
            }
            Tok::Ellipsis => {
                if !self.funcs.last().map(|f| f.is_vararg).unwrap_or(false) {
                    return Err(self.error_here("cannot use '...' outside a vararg function"));
                }
                self.advance();
                Ok(Expr::Dots { span })
            }
            Tok::Function => {
                self.advance();
                let func = self.parse_func_body(span, false)?;
                Ok(Expr::Function {
                    span: func.span,
                    func,
                })
            }
            Tok::LBrace => self.parse_table(),
            _ => self.parse_suffixed_expr(),
        }
    }

    fn parse_primary_expr(&mut self) -> Result<Expr> {
        let span = self.cur().span;
        match self.cur_tok() {
            Tok::Name(_) => {
                let (name, name_span) = self.expect_name()?;
                Ok(Expr::Id {
                    span: name_span,
                    name,
                })
            }
            Tok::LParen => {
                self.advance();
                let inner = self.parse_expr()?;
                let end = self.expect(Tok::RParen)?;
                Ok(Expr::Paren {
                    span: Span::new(span.pos, end.span.end_pos, span.line),
                    inner: Box::new(inner),
                })
            }
            other => Err(self.error_here(format!("unexpected symbol near {}", other.describe()))),
        }
    }

    fn parse_suffixed_expr(&mut self) -> Result<Expr> {
        self.step()?;
        let mut expr = self.parse_primary_expr()?;

        loop {
            match self.cur_tok() {
                Tok::Dot => {
                    self.advance();
                    let (field, field_span) = self.expect_name()?;
                    let span = expr.span().merge(field_span);
                    expr = Expr::Index {
                        span,
                        obj: Box::new(expr),
                        key: Box::new(Expr::Str {
                            span: field_span,
                            value: field,
                        }),
                    };
                }
                Tok::LBracket => {
                    self.advance();
                    let key = self.parse_expr()?;
                    let end = self.expect(Tok::RBracket)?;
                    let span = Span::new(expr.span().pos, end.span.end_pos, expr.span().line);
                    expr = Expr::Index {
                        span,
                        obj: Box::new(expr),
                        key: Box::new(key),
                    };
                }
                Tok::Colon => {
                    self.advance();
                    let (method, _) = self.expect_name()?;
                    let args = self.parse_call_args()?;
                    let span = Span::new(expr.span().pos, self.prev_end(), expr.span().line);
                    expr = Expr::Invoke {
                        span,
                        obj: Box::new(expr),
                        method,
                        args,
                    };
                }
                Tok::LParen | Tok::LBrace | Tok::Str(_) => {
                    let args = self.parse_call_args()?;
                    let span = Span::new(expr.span().pos, self.prev_end(), expr.span().line);
                    expr = Expr::Call {
                        span,
                        func: Box::new(expr),
                        args,
                    };
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_call_args(&mut self) -> Result<Vec<Expr>> {
        match self.cur_tok() {
            Tok::LParen => {
                self.advance();
                let args = if self.cur_tok() == &Tok::RParen {
                    Vec::new()
                } else {
                    self.parse_expr_list()?
                };
                self.expect(Tok::RParen)?;
                Ok(args)
            }
            Tok::LBrace => Ok(vec![self.parse_table()?]),
            Tok::Str(_) => {
                let span = self.cur().span;
                let token = self.advance();
                let Tok::Str(value) = token.tok else {
                    unreachable!("matched above");
                };
                Ok(vec![Expr::Str { span, value }])
            }
            other => Err(self.error_here(format!(
                "function arguments expected near {}",
                other.describe()
            ))),
        }
    }

    fn parse_table(&mut self) -> Result<Expr> {
        self.step()?;
        let start = self.expect(Tok::LBrace)?;
        let mut items = Vec::new();

        while self.cur_tok() != &Tok::RBrace {
            match self.cur_tok() {
                Tok::LBracket => {
                    self.advance();
                    let key = self.parse_expr()?;
                    self.expect(Tok::RBracket)?;
                    self.expect(Tok::Assign)?;
                    let value = self.parse_expr()?;
                    items.push(TableItem::Keyed { key, value });
                }
                Tok::Name(_) if self.peek_tok() == &Tok::Assign => {
                    let (key, _) = self.expect_name()?;
                    self.expect(Tok::Assign)?;
                    let value = self.parse_expr()?;
                    items.push(TableItem::Named { key, value });
                }
                _ => {
                    items.push(TableItem::Positional(self.parse_expr()?));
                }
            }
            if !self.accept(&Tok::Comma) && !self.accept(&Tok::Semi) {
                break;
            }
        }

        let end = self.expect(Tok::RBrace)?;
        Ok(Expr::Table {
            span: Span::new(start.span.pos, end.span.end_pos, start.span.line),
            items,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(source: &str) -> Chunk {
        parse(source, Path::new("test.lua")).expect("parse failure")
    }

    fn parse_err(source: &str) -> Error {
        parse(source, Path::new("test.lua")).expect_err("expected parse failure")
    }

    #[test]
    fn parses_empty_chunk() {
        let chunk = parse_ok("");
        assert!(chunk.block.stats.is_empty());
        assert!(chunk.comments.is_empty());
    }

    #[test]
    fn parses_local_function_with_positions() {
        let chunk = parse_ok("local function add(a, b)\n  return a + b\nend\n");
        assert_eq!(chunk.block.stats.len(), 1);
        let Stat::LocalRec { name, func, .. } = &chunk.block.stats[0] else {
            panic!("expected LocalRec, got {:?}", chunk.block.stats[0]);
        };
        assert_eq!(name, "add");
        assert_eq!(func.params, vec!["a", "b"]);
        assert_eq!(func.span.line, 1);
        assert_eq!(func.end_line, 3);
        let Stat::Return { span, exprs } = &func.body.stats[0] else {
            panic!("expected Return");
        };
        assert_eq!(span.line, 2);
        assert_eq!(exprs.len(), 1);
    }

    #[test]
    fn parses_method_declaration_as_set() {
        let chunk = parse_ok("function M.util.run(x) end");
        let Stat::Set {
            targets, values, ..
        } = &chunk.block.stats[0]
        else {
            panic!("expected Set");
        };
        assert!(matches!(targets[0], Expr::Index { .. }));
        let Expr::Function { func, .. } = &values[0] else {
            panic!("expected Function value");
        };
        assert!(!func.implicit_self);

        let chunk = parse_ok("function M:run(x) end");
        let Stat::Set { values, .. } = &chunk.block.stats[0] else {
            panic!("expected Set");
        };
        let Expr::Function { func, .. } = &values[0] else {
            panic!("expected Function value");
        };
        assert!(func.implicit_self);
    }

    #[test]
    fn operator_precedence_matches_lua() {
        let chunk = parse_ok("x = 1 + 2 * 3");
        let Stat::Set { values, .. } = &chunk.block.stats[0] else {
            panic!("expected Set");
        };
        let Expr::BinOp { op, rhs, .. } = &values[0] else {
            panic!("expected BinOp");
        };
        assert_eq!(*op, BinOp::Add);
        assert!(matches!(**rhs, Expr::BinOp { op: BinOp::Mul, .. }));
    }

    #[test]
    fn concat_is_right_associative() {
        let chunk = parse_ok("x = 'a' .. 'b' .. 'c'");
        let Stat::Set { values, .. } = &chunk.block.stats[0] else {
            panic!("expected Set");
        };
        let Expr::BinOp { op, rhs, .. } = &values[0] else {
            panic!("expected BinOp");
        };
        assert_eq!(*op, BinOp::Concat);
        assert!(matches!(
            **rhs,
            Expr::BinOp {
                op: BinOp::Concat,
                ..
            }
        ));
    }

    #[test]
    fn parses_goto_with_forward_label() {
        parse_ok("do goto done end\n::done::\nprint('x')");
    }

    #[test]
    fn rejects_unresolved_goto() {
        let err = parse_err("goto nowhere");
        assert!(
            err.to_string().contains("no visible label 'nowhere'"),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn rejects_duplicate_label_in_scope() {
        let err = parse_err("::a::\n::a::");
        assert!(err.to_string().contains("label 'a' already defined"));
    }

    #[test]
    fn allows_same_label_in_sibling_scopes() {
        parse_ok("do ::a:: goto a end\ndo ::a:: goto a end");
    }

    #[test]
    fn rejects_break_outside_loop() {
        let err = parse_err("break");
        assert!(err.to_string().contains("break outside a loop"));
    }

    #[test]
    fn break_inside_nested_function_needs_own_loop() {
        let err = parse_err("while true do local f = function() break end end");
        assert!(err.to_string().contains("break outside a loop"));
    }

    #[test]
    fn rejects_varargs_outside_vararg_function() {
        let err = parse_err("local f = function(a) return ... end");
        assert!(err.to_string().contains("outside a vararg function"));
        // The chunk itself is vararg, and vararg functions accept `...`.
        parse_ok("return ...");
        parse_ok("local f = function(...) return ... end");
    }

    #[test]
    fn parse_error_carries_position() {
        let err = parse_err("local x =");
        let Error::Parse { line, column, .. } = &err else {
            panic!("expected Parse error, got {err:?}");
        };
        assert_eq!(*line, 1);
        assert_eq!(*column, 10);
    }

    #[test]
    fn rejects_oversized_source() {
        let big = format!("-- {}", "x".repeat(MAX_SOURCE_BYTES));
        let err = parse(&big, Path::new("big.lua")).unwrap_err();
        assert!(matches!(err, Error::SourceTooLarge { .. }));
    }

    #[test]
    fn zero_timeout_reports_parse_timeout() {
        let source = "x = 1\n".repeat(4000);
        let err = parse_with_options(
            &source,
            Path::new("slow.lua"),
            &ParseOptions {
                timeout: Duration::ZERO,
            },
        )
        .unwrap_err();
        assert!(matches!(err, Error::ParseTimeout { .. }), "got {err:?}");
    }

    #[test]
    fn parses_numeric_and_generic_for() {
        let chunk = parse_ok("for i = 1, 10, 2 do end\nfor k, v in pairs(t) do end");
        assert!(matches!(chunk.block.stats[0], Stat::ForNum { .. }));
        assert!(matches!(chunk.block.stats[1], Stat::ForIn { .. }));
    }

    #[test]
    fn parses_table_constructors() {
        let chunk = parse_ok("t = { 1, a = 2, [3] = 'x', f(), }");
        let Stat::Set { values, .. } = &chunk.block.stats[0] else {
            panic!("expected Set");
        };
        let Expr::Table { items, .. } = &values[0] else {
            panic!("expected Table");
        };
        assert_eq!(items.len(), 4);
    }

    #[test]
    fn parses_method_invoke_and_string_call() {
        let chunk = parse_ok("obj:method(1)\nrequire 'mod'\nf{1, 2}");
        assert!(matches!(
            &chunk.block.stats[0],
            Stat::Call {
                call: Expr::Invoke { .. },
                ..
            }
        ));
        assert!(matches!(
            &chunk.block.stats[1],
            Stat::Call {
                call: Expr::Call { .. },
                ..
            }
        ));
        assert!(matches!(
            &chunk.block.stats[2],
            Stat::Call {
                call: Expr::Call { .. },
                ..
            }
        ));
    }

    #[test]
    fn parses_local_attribs() {
        let chunk = parse_ok("local guard <close> = make()\nlocal k <const> = 1");
        let Stat::Local { names, .. } = &chunk.block.stats[0] else {
            panic!("expected Local");
        };
        assert_eq!(names[0].attrib.as_deref(), Some("close"));
    }

    #[test]
    fn rejects_expression_statement() {
        let err = parse_err("x + 1");
        assert!(err.to_string().contains("not a statement"));
    }

    #[test]
    fn comment_table_reaches_chunk() {
        let chunk = parse_ok("-- header\nlocal a = 1 --[[ trailing ]]\n");
        assert_eq!(chunk.comments.len(), 2);
    }
}
