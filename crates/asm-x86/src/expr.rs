//! Constant-or-symbolic expression values and the expression grammar shared
//! by AT&T operands and data directives.
//!
//! Operands only ever need a constant or `symbol + addend`, so a [`Value`]
//! is exactly that. Arithmetic folds constants eagerly; anything that would
//! need a general relocation expression is rejected.

use alloc::string::{String, ToString};
use core::fmt;

use crate::error::{AsmError, Span};
use crate::lexer::{Token, TokenKind};

/// A constant, or a symbol plus a constant addend resolved at layout or
/// link time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Value {
    /// A known value.
    Constant(i64),
    /// `name + addend`.
    Symbol {
        /// Symbol name.
        name: String,
        /// Constant offset from the symbol.
        addend: i64,
    },
}

impl Value {
    /// A bare symbol.
    #[must_use]
    pub fn symbol(name: &str) -> Self {
        Value::Symbol {
            name: String::from(name),
            addend: 0,
        }
    }

    /// The constant, if this value is one.
    #[must_use]
    pub fn constant(&self) -> Option<i64> {
        match self {
            Value::Constant(v) => Some(*v),
            Value::Symbol { .. } => None,
        }
    }

    /// Whether the value needs symbol resolution.
    #[must_use]
    pub fn is_symbolic(&self) -> bool {
        matches!(self, Value::Symbol { .. })
    }

    /// `self + rhs`. At most one side may be symbolic.
    pub fn add(self, rhs: Value, span: Span) -> Result<Value, AsmError> {
        match (self, rhs) {
            (Value::Constant(a), Value::Constant(b)) => Ok(Value::Constant(a.wrapping_add(b))),
            (Value::Symbol { name, addend }, Value::Constant(c))
            | (Value::Constant(c), Value::Symbol { name, addend }) => Ok(Value::Symbol {
                name,
                addend: addend.wrapping_add(c),
            }),
            (Value::Symbol { name: a, .. }, Value::Symbol { name: b, .. }) => Err(AsmError::InvalidOperand {
                detail: alloc::format!("cannot add symbols `{}' and `{}'", a, b),
                span,
            }),
        }
    }

    /// `self - rhs`. The difference of two offsets from the same symbol is
    /// a constant.
    pub fn sub(self, rhs: Value, span: Span) -> Result<Value, AsmError> {
        match (self, rhs) {
            (Value::Constant(a), Value::Constant(b)) => Ok(Value::Constant(a.wrapping_sub(b))),
            (Value::Symbol { name, addend }, Value::Constant(c)) => Ok(Value::Symbol {
                name,
                addend: addend.wrapping_sub(c),
            }),
            (Value::Symbol { name: a, addend: x }, Value::Symbol { name: b, addend: y }) if a == b => {
                Ok(Value::Constant(x.wrapping_sub(y)))
            }
            (lhs, rhs) => Err(AsmError::InvalidOperand {
                detail: alloc::format!("cannot subtract `{}' from `{}'", rhs, lhs),
                span,
            }),
        }
    }

    /// Apply a constant-only binary operator.
    pub fn binary(self, op: BinOp, rhs: Value, span: Span) -> Result<Value, AsmError> {
        match op {
            BinOp::Add => return self.add(rhs, span),
            BinOp::Sub => return self.sub(rhs, span),
            _ => {}
        }
        let (a, b) = match (self.constant(), rhs.constant()) {
            (Some(a), Some(b)) => (a, b),
            _ => {
                return Err(AsmError::InvalidOperand {
                    detail: alloc::format!("operator `{}' needs constant operands", op),
                    span,
                })
            }
        };
        let v = match op {
            BinOp::Mul => a.wrapping_mul(b),
            BinOp::Div | BinOp::Mod => {
                if b == 0 {
                    return Err(AsmError::Syntax {
                        msg: String::from("division by zero in expression"),
                        span,
                    });
                }
                if op == BinOp::Div {
                    a.wrapping_div(b)
                } else {
                    a.wrapping_rem(b)
                }
            }
            BinOp::Shl => a.wrapping_shl(b as u32),
            BinOp::Shr => a.wrapping_shr(b as u32),
            BinOp::And => a & b,
            BinOp::Or => a | b,
            BinOp::Xor => a ^ b,
            BinOp::Add => a.wrapping_add(b),
            BinOp::Sub => a.wrapping_sub(b),
        };
        Ok(Value::Constant(v))
    }

    /// Apply a unary operator; symbols only accept `+`.
    pub fn unary(self, op: UnOp, span: Span) -> Result<Value, AsmError> {
        match (op, self) {
            (UnOp::Neg, Value::Constant(v)) => Ok(Value::Constant(v.wrapping_neg())),
            (UnOp::Not, Value::Constant(v)) => Ok(Value::Constant(!v)),
            (_, sym) => Err(AsmError::InvalidOperand {
                detail: alloc::format!("cannot negate or complement `{}'", sym),
                span,
            }),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Constant(v) => write!(f, "{}", v),
            Value::Symbol { name, addend: 0 } => f.write_str(name),
            Value::Symbol { name, addend } if *addend < 0 => write!(f, "{}{}", name, addend),
            Value::Symbol { name, addend } => write!(f, "{}+{}", name, addend),
        }
    }
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `mod` (Intel only)
    Mod,
    /// `<<` / `shl`
    Shl,
    /// `>>` / `shr`
    Shr,
    /// `&` / `and`
    And,
    /// `|` / `or`
    Or,
    /// `^` / `xor`
    Xor,
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "mod",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
            BinOp::And => "&",
            BinOp::Or => "|",
            BinOp::Xor => "^",
        })
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    /// `-`
    Neg,
    /// `~` / `not`
    Not,
}

/// Name resolution available while parsing an expression.
pub trait SymbolLookup {
    /// Value of an assembly-time constant (`name = value`).
    fn constant(&self, name: &str) -> Option<i64>;

    /// Internal name of the nearest numeric label `n` in the given
    /// direction. `None` for a backward reference with no definition.
    fn numeric_label(&self, n: u32, forward: bool) -> Option<String>;
}

/// Lookup with no constants and no numeric labels.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSymbols;

impl SymbolLookup for NoSymbols {
    fn constant(&self, _name: &str) -> Option<i64> {
        None
    }

    fn numeric_label(&self, n: u32, forward: bool) -> Option<String> {
        forward.then(|| alloc::format!(".L{}f", n))
    }
}

/// Convert a lexer literal to an operand value. Literals are accepted in
/// `[i64::MIN, u64::MAX]`; values above `i64::MAX` keep their bit pattern.
pub(crate) fn literal_value(n: i128, span: Span) -> Result<i64, AsmError> {
    if n < i128::from(i64::MIN) || n > i128::from(u64::MAX) {
        return Err(AsmError::Syntax {
            msg: alloc::format!("number {} does not fit in 64 bits", n),
            span,
        });
    }
    Ok(n as u64 as i64)
}

/// A forward-only reader over one statement's tokens.
#[derive(Debug, Clone)]
pub struct Cursor<'t, 's> {
    tokens: &'t [Token<'s>],
    pos: usize,
    end_span: Span,
}

impl<'t, 's> Cursor<'t, 's> {
    /// Read `tokens`; `end_span` is reported for errors at the end.
    #[must_use]
    pub fn new(tokens: &'t [Token<'s>], end_span: Span) -> Self {
        Self {
            tokens,
            pos: 0,
            end_span,
        }
    }

    /// Current token kind; `Eof` past the end.
    #[inline]
    pub fn peek(&self) -> TokenKind {
        self.peek_at(0)
    }

    /// Kind of the token `n` positions ahead.
    #[inline]
    pub fn peek_at(&self, n: usize) -> TokenKind {
        self.tokens.get(self.pos + n).map_or(TokenKind::Eof, |t| t.kind)
    }

    /// Current token, if any.
    #[inline]
    pub fn token(&self) -> Option<&'t Token<'s>> {
        self.tokens.get(self.pos)
    }

    /// Token `n` positions ahead, if any.
    #[inline]
    pub fn token_at(&self, n: usize) -> Option<&'t Token<'s>> {
        self.tokens.get(self.pos + n)
    }

    /// Consume and return the current token.
    #[inline]
    pub fn advance(&mut self) -> Option<&'t Token<'s>> {
        let tok = self.tokens.get(self.pos);
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    /// No tokens left, or only a terminator.
    #[inline]
    pub fn at_end(&self) -> bool {
        matches!(self.peek(), TokenKind::Eof | TokenKind::Newline)
    }

    /// Consume the current token if it has kind `kind`.
    pub fn eat(&mut self, kind: TokenKind) -> bool {
        if self.peek() == kind {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Span of the current token, or the end span.
    #[must_use]
    pub fn span(&self) -> Span {
        self.token().map_or(self.end_span, |t| t.span)
    }

    /// Current position, for backtracking.
    #[must_use]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Rewind to a position returned by [`Cursor::position`].
    pub fn reset(&mut self, pos: usize) {
        self.pos = pos;
    }

    /// Consume a token of `kind` or fail with `what` in the message.
    pub fn expect(&mut self, kind: TokenKind, what: &str) -> Result<&'t Token<'s>, AsmError> {
        match self.token() {
            Some(t) if t.kind == kind => {
                self.pos += 1;
                Ok(t)
            }
            Some(t) => Err(AsmError::Syntax {
                msg: alloc::format!("expected {}, found '{}'", what, t.text()),
                span: t.span,
            }),
            None => Err(AsmError::Syntax {
                msg: alloc::format!("expected {}", what),
                span: self.end_span,
            }),
        }
    }
}

/// Parse a GAS-style expression: `| ^ & << >> + - * /`, unary `- ~`,
/// numbers, characters, symbols, numeric label references and
/// parenthesized sub-expressions.
pub fn parse_expr(cur: &mut Cursor<'_, '_>, symbols: &dyn SymbolLookup) -> Result<Value, AsmError> {
    expr_or(cur, symbols)
}

fn expr_or(cur: &mut Cursor<'_, '_>, symbols: &dyn SymbolLookup) -> Result<Value, AsmError> {
    let mut val = expr_xor(cur, symbols)?;
    while cur.peek() == TokenKind::Pipe {
        let span = cur.span();
        cur.advance();
        val = val.binary(BinOp::Or, expr_xor(cur, symbols)?, span)?;
    }
    Ok(val)
}

fn expr_xor(cur: &mut Cursor<'_, '_>, symbols: &dyn SymbolLookup) -> Result<Value, AsmError> {
    let mut val = expr_and(cur, symbols)?;
    while cur.peek() == TokenKind::Caret {
        let span = cur.span();
        cur.advance();
        val = val.binary(BinOp::Xor, expr_and(cur, symbols)?, span)?;
    }
    Ok(val)
}

fn expr_and(cur: &mut Cursor<'_, '_>, symbols: &dyn SymbolLookup) -> Result<Value, AsmError> {
    let mut val = expr_shift(cur, symbols)?;
    while cur.peek() == TokenKind::Ampersand {
        let span = cur.span();
        cur.advance();
        val = val.binary(BinOp::And, expr_shift(cur, symbols)?, span)?;
    }
    Ok(val)
}

fn expr_shift(cur: &mut Cursor<'_, '_>, symbols: &dyn SymbolLookup) -> Result<Value, AsmError> {
    let mut val = expr_add(cur, symbols)?;
    loop {
        let op = match cur.peek() {
            TokenKind::LShift => BinOp::Shl,
            TokenKind::RShift => BinOp::Shr,
            _ => break,
        };
        let span = cur.span();
        cur.advance();
        val = val.binary(op, expr_add(cur, symbols)?, span)?;
    }
    Ok(val)
}

fn expr_add(cur: &mut Cursor<'_, '_>, symbols: &dyn SymbolLookup) -> Result<Value, AsmError> {
    let mut val = expr_mul(cur, symbols)?;
    loop {
        let span = cur.span();
        match cur.peek() {
            TokenKind::Plus => {
                cur.advance();
                val = val.add(expr_mul(cur, symbols)?, span)?;
            }
            TokenKind::Minus => {
                cur.advance();
                val = val.sub(expr_mul(cur, symbols)?, span)?;
            }
            _ => break,
        }
    }
    Ok(val)
}

fn expr_mul(cur: &mut Cursor<'_, '_>, symbols: &dyn SymbolLookup) -> Result<Value, AsmError> {
    let mut val = expr_unary(cur, symbols)?;
    loop {
        let op = match cur.peek() {
            TokenKind::Star => BinOp::Mul,
            TokenKind::Slash => BinOp::Div,
            _ => break,
        };
        let span = cur.span();
        cur.advance();
        val = val.binary(op, expr_unary(cur, symbols)?, span)?;
    }
    Ok(val)
}

fn expr_unary(cur: &mut Cursor<'_, '_>, symbols: &dyn SymbolLookup) -> Result<Value, AsmError> {
    let span = cur.span();
    match cur.peek() {
        TokenKind::Minus => {
            cur.advance();
            expr_unary(cur, symbols)?.unary(UnOp::Neg, span)
        }
        TokenKind::Tilde => {
            cur.advance();
            expr_unary(cur, symbols)?.unary(UnOp::Not, span)
        }
        TokenKind::Plus => {
            cur.advance();
            expr_unary(cur, symbols)
        }
        _ => expr_atom(cur, symbols),
    }
}

fn expr_atom(cur: &mut Cursor<'_, '_>, symbols: &dyn SymbolLookup) -> Result<Value, AsmError> {
    let span = cur.span();
    let tok = match cur.token() {
        Some(t) => t,
        None => {
            return Err(AsmError::Syntax {
                msg: String::from("expected expression"),
                span,
            })
        }
    };
    match tok.kind {
        TokenKind::Number(n) => {
            cur.advance();
            Ok(Value::Constant(literal_value(n, span)?))
        }
        TokenKind::CharLit(c) => {
            cur.advance();
            Ok(Value::Constant(i64::from(c)))
        }
        TokenKind::Ident => {
            cur.advance();
            Ok(match symbols.constant(tok.text()) {
                Some(v) => Value::Constant(v),
                None => Value::symbol(tok.text()),
            })
        }
        TokenKind::NumericLabelBwd(n) | TokenKind::NumericLabelFwd(n) => {
            cur.advance();
            let forward = matches!(tok.kind, TokenKind::NumericLabelFwd(_));
            symbols
                .numeric_label(n, forward)
                .map(|name| Value::Symbol { name, addend: 0 })
                .ok_or_else(|| AsmError::UndefinedLabel {
                    label: tok.text().to_string(),
                    span,
                })
        }
        TokenKind::OpenParen => {
            cur.advance();
            let val = parse_expr(cur, symbols)?;
            cur.expect(TokenKind::CloseParen, "')' in expression")?;
            Ok(val)
        }
        _ => Err(AsmError::Syntax {
            msg: alloc::format!("expected expression, found '{}'", tok.text()),
            span,
        }),
    }
}
