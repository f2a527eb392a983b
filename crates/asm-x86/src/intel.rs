//! Intel operand syntax.
//!
//! An operand is parsed into a small expression tree whose leaves are
//! values and registers, then simplified: every register and constant
//! term is assigned to a role (base, index, scale, displacement). Keyword
//! prefixes (`dword ptr`, `offset`, `short`) and segment overrides are
//! handled around the tree.

use alloc::boxed::Box;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use crate::error::{AsmError, Span};
use crate::expr::{literal_value, BinOp, Cursor, UnOp, Value};
use crate::lexer::{Token, TokenKind};
use crate::operand::{AddrParts, MemRef, Operand, ParseContext, ParsedOperand, RoundingMode};
use crate::optype::TypeFlags;
use crate::register::{RegKind, Register};

#[derive(Debug, Clone)]
enum Node {
    Value(Value, Span),
    Reg(Register, Span),
    Bracket(Box<Node>, Span),
    Unary(UnOp, Box<Node>, Span),
    Binary(BinOp, Box<Node>, Box<Node>, Span),
}

impl Node {
    fn span(&self) -> Span {
        match self {
            Node::Value(_, s) | Node::Reg(_, s) | Node::Bracket(_, s) | Node::Unary(_, _, s) => *s,
            Node::Binary(_, _, _, s) => *s,
        }
    }

    fn has_register(&self) -> bool {
        match self {
            Node::Value(..) => false,
            Node::Reg(..) => true,
            Node::Bracket(inner, _) | Node::Unary(_, inner, _) => inner.has_register(),
            Node::Binary(_, l, r, _) => l.has_register() || r.has_register(),
        }
    }

    fn has_bracket(&self) -> bool {
        match self {
            Node::Value(..) | Node::Reg(..) => false,
            Node::Bracket(..) => true,
            Node::Unary(_, inner, _) => inner.has_bracket(),
            Node::Binary(_, l, r, _) => l.has_bracket() || r.has_bracket(),
        }
    }

    /// Fold a register-free tree.
    fn eval(&self) -> Result<Value, AsmError> {
        match self {
            Node::Value(v, _) => Ok(v.clone()),
            Node::Reg(r, span) => Err(operand_error(alloc::format!("invalid use of register `{}'", r), *span)),
            Node::Bracket(inner, _) => inner.eval(),
            Node::Unary(op, inner, span) => inner.eval()?.unary(*op, *span),
            Node::Binary(op, l, r, span) => l.eval()?.binary(*op, r.eval()?, *span),
        }
    }
}

fn operand_error(detail: String, span: Span) -> AsmError {
    AsmError::InvalidOperand { detail, span }
}

fn join(a: Span, b: Span) -> Span {
    let end = (b.offset + b.len).max(a.offset + a.len);
    Span::new(a.line, a.col, a.offset, end - a.offset)
}

/// Memory operand size named by a `ptr` keyword.
#[must_use]
pub fn size_keyword(word: &str) -> Option<TypeFlags> {
    let mut buf = [0u8; 8];
    if word.len() > buf.len() {
        return None;
    }
    for (d, s) in buf.iter_mut().zip(word.bytes()) {
        *d = s.to_ascii_lowercase();
    }
    Some(match &buf[..word.len()] {
        b"byte" => TypeFlags::BYTE,
        b"word" => TypeFlags::WORD,
        b"dword" => TypeFlags::DWORD,
        b"fword" => TypeFlags::FWORD,
        b"qword" | b"mmword" => TypeFlags::QWORD,
        b"tbyte" => TypeFlags::TBYTE,
        b"oword" | b"xmmword" => TypeFlags::XMMWORD,
        b"ymmword" => TypeFlags::YMMWORD,
        b"zmmword" => TypeFlags::ZMMWORD,
        _ => return None,
    })
}

fn is_word(tok: Option<&Token<'_>>, word: &str) -> bool {
    tok.is_some_and(|t| t.kind == TokenKind::Ident && t.text().eq_ignore_ascii_case(word))
}

struct Parser<'x, 't, 's, 'a> {
    cur: Cursor<'t, 's>,
    ctx: &'x mut ParseContext<'a>,
    offset: bool,
}

/// Parse one comma-separated Intel operand.
///
/// A far pointer `seg:off` pushes two immediates, offset first, so that
/// the reversed operand list reads `seg, off`.
///
/// # Errors
///
/// `AsmError::Syntax` for malformed text, `AsmError::InvalidOperand` for
/// a well-formed operand that breaks an addressing rule.
pub fn parse_operand(
    tokens: &[Token<'_>],
    span: Span,
    ctx: &mut ParseContext<'_>,
    out: &mut Vec<ParsedOperand>,
) -> Result<(), AsmError> {
    if let [tok] = tokens {
        if tok.kind == TokenKind::Decorator {
            if let Some(rc) = RoundingMode::from_decorator(tok.text()) {
                return ctx.set_rounding(rc, span);
            }
        }
    }

    let mut p = Parser {
        cur: Cursor::new(tokens, span),
        ctx,
        offset: false,
    };

    let mut size = None;
    loop {
        if is_word(p.cur.token(), "short") {
            p.cur.advance();
            p.ctx.short_branch = true;
            continue;
        }
        let ptr_size = p.cur.token().and_then(|t| size_keyword(t.text()));
        if let Some(s) = ptr_size.filter(|_| is_word(p.cur.token_at(1), "ptr")) {
            if size.is_some() {
                return Err(operand_error(String::from("operand size specified twice"), p.cur.span()));
            }
            p.cur.advance();
            p.cur.advance();
            size = Some(s);
            continue;
        }
        break;
    }

    let mut parts = AddrParts::new();
    let mut segment = false;
    if p.cur.peek() == TokenKind::Ident && p.cur.peek_at(1) == TokenKind::Colon {
        let seg_span = p.cur.span();
        let name = p.cur.token().map_or("", |t| t.text());
        if let Some(reg) = p.ctx.register(name, seg_span)?.filter(|r| r.kind() == RegKind::Segment) {
            p.cur.advance();
            p.cur.advance();
            parts.set_segment(reg, seg_span)?;
            segment = true;
        }
    }

    let tree = p.expr()?;

    if p.cur.peek() == TokenKind::Colon && !segment {
        let colon = p.cur.span();
        p.cur.advance();
        let off = p.expr()?;
        let seg = tree.eval()?;
        if seg.constant().is_none() {
            return Err(operand_error(String::from("far pointer segment must be a constant"), colon));
        }
        let off = off.eval()?;
        p.finish()?;
        out.push(ParsedOperand {
            operand: Operand::Immediate(off),
            absolute: false,
            span,
        });
        out.push(ParsedOperand {
            operand: Operand::Immediate(seg),
            absolute: false,
            span,
        });
        return Ok(());
    }

    let is_jump = p.ctx.is_jump;
    let (operand, absolute) = match &tree {
        Node::Reg(reg, _) if !segment => {
            if p.offset {
                return Err(operand_error(alloc::format!("`offset' applied to register `{}'", reg), span));
            }
            (Operand::Register(*reg), is_jump)
        }
        _ if !tree.has_register() && !tree.has_bracket() && !segment && size.is_none() => {
            let value = tree.eval()?;
            if p.offset {
                (Operand::Immediate(value), false)
            } else if value.is_symbolic() || is_jump {
                let bits = p.ctx.address_bits();
                (Operand::Memory(MemRef::absolute(value, bits)), false)
            } else {
                (Operand::Immediate(value), false)
            }
        }
        _ => {
            if p.offset {
                return Err(operand_error(String::from("`offset' needs a constant or symbol"), span));
            }
            let mut mem = simplify(&tree, parts, p.ctx, span)?;
            mem.size = size;
            (Operand::Memory(mem), is_jump)
        }
    };

    let is_memory = matches!(operand, Operand::Memory(_));
    p.decorators(is_memory)?;
    p.finish()?;
    if is_memory {
        p.ctx.mem_count += 1;
    }
    out.push(ParsedOperand {
        operand,
        absolute,
        span,
    });
    Ok(())
}

impl Parser<'_, '_, '_, '_> {
    fn finish(&self) -> Result<(), AsmError> {
        if self.cur.at_end() {
            return Ok(());
        }
        let text = self.cur.token().map_or("", |t| t.text());
        Err(AsmError::Syntax {
            msg: alloc::format!("junk `{}' after operand", text),
            span: self.cur.span(),
        })
    }

    fn decorators(&mut self, is_memory: bool) -> Result<(), AsmError> {
        while let Some(tok) = self.cur.token().filter(|t| t.kind == TokenKind::Decorator) {
            self.cur.advance();
            self.ctx.decorate(tok.text(), is_memory, tok.span)?;
        }
        Ok(())
    }

    fn word_op(&self, words: &[(&str, BinOp)]) -> Option<BinOp> {
        let tok = self.cur.token()?;
        if tok.kind != TokenKind::Ident {
            return None;
        }
        words.iter().find(|(w, _)| tok.text().eq_ignore_ascii_case(w)).map(|(_, op)| *op)
    }

    fn binary(&mut self, op: BinOp, lhs: Node, next: fn(&mut Self) -> Result<Node, AsmError>) -> Result<Node, AsmError> {
        self.cur.advance();
        let rhs = next(self)?;
        let span = join(lhs.span(), rhs.span());
        Ok(Node::Binary(op, Box::new(lhs), Box::new(rhs), span))
    }

    fn expr(&mut self) -> Result<Node, AsmError> {
        let mut node = self.expr_and()?;
        loop {
            let op = match self.cur.peek() {
                TokenKind::Pipe => BinOp::Or,
                TokenKind::Caret => BinOp::Xor,
                _ => match self.word_op(&[("or", BinOp::Or), ("xor", BinOp::Xor)]) {
                    Some(op) => op,
                    None => break,
                },
            };
            node = self.binary(op, node, Self::expr_and)?;
        }
        Ok(node)
    }

    fn expr_and(&mut self) -> Result<Node, AsmError> {
        let mut node = self.expr_shift()?;
        while self.cur.peek() == TokenKind::Ampersand || self.word_op(&[("and", BinOp::And)]).is_some() {
            node = self.binary(BinOp::And, node, Self::expr_shift)?;
        }
        Ok(node)
    }

    fn expr_shift(&mut self) -> Result<Node, AsmError> {
        let mut node = self.expr_add()?;
        loop {
            let op = match self.cur.peek() {
                TokenKind::LShift => BinOp::Shl,
                TokenKind::RShift => BinOp::Shr,
                _ => match self.word_op(&[("shl", BinOp::Shl), ("shr", BinOp::Shr)]) {
                    Some(op) => op,
                    None => break,
                },
            };
            node = self.binary(op, node, Self::expr_add)?;
        }
        Ok(node)
    }

    fn expr_add(&mut self) -> Result<Node, AsmError> {
        let mut node = self.expr_mul()?;
        loop {
            let op = match self.cur.peek() {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => break,
            };
            node = self.binary(op, node, Self::expr_mul)?;
        }
        Ok(node)
    }

    fn expr_mul(&mut self) -> Result<Node, AsmError> {
        let mut node = self.expr_unary()?;
        loop {
            let op = match self.cur.peek() {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                TokenKind::Percent => BinOp::Mod,
                _ => match self.word_op(&[("mod", BinOp::Mod)]) {
                    Some(op) => op,
                    None => break,
                },
            };
            node = self.binary(op, node, Self::expr_unary)?;
        }
        Ok(node)
    }

    fn expr_unary(&mut self) -> Result<Node, AsmError> {
        let span = self.cur.span();
        let op = match self.cur.peek() {
            TokenKind::Minus => Some(UnOp::Neg),
            TokenKind::Tilde => Some(UnOp::Not),
            TokenKind::Plus => {
                self.cur.advance();
                return self.expr_unary();
            }
            TokenKind::Ident if is_word(self.cur.token(), "not") => Some(UnOp::Not),
            TokenKind::Ident
                if is_word(self.cur.token(), "offset")
                    && !matches!(self.cur.peek_at(1), TokenKind::Eof | TokenKind::Newline) =>
            {
                self.cur.advance();
                self.offset = true;
                return self.expr_unary();
            }
            _ => None,
        };
        match op {
            Some(op) => {
                self.cur.advance();
                let inner = self.expr_unary()?;
                let span = join(span, inner.span());
                Ok(Node::Unary(op, Box::new(inner), span))
            }
            None => self.expr_postfix(),
        }
    }

    /// `sym[ebx]` is `sym + [ebx]`.
    fn expr_postfix(&mut self) -> Result<Node, AsmError> {
        let mut node = self.atom()?;
        while self.cur.peek() == TokenKind::OpenBracket {
            let rhs = self.atom()?;
            let span = join(node.span(), rhs.span());
            node = Node::Binary(BinOp::Add, Box::new(node), Box::new(rhs), span);
        }
        Ok(node)
    }

    fn atom(&mut self) -> Result<Node, AsmError> {
        let span = self.cur.span();
        let Some(tok) = self.cur.token().filter(|t| !matches!(t.kind, TokenKind::Eof | TokenKind::Newline)) else {
            return Err(AsmError::Syntax {
                msg: String::from("expected operand"),
                span,
            });
        };
        match tok.kind {
            TokenKind::Number(n) => {
                self.cur.advance();
                Ok(Node::Value(Value::Constant(literal_value(n, span)?), span))
            }
            TokenKind::CharLit(c) => {
                self.cur.advance();
                Ok(Node::Value(Value::Constant(i64::from(c)), span))
            }
            TokenKind::Ident => {
                self.cur.advance();
                if tok.text().eq_ignore_ascii_case("st") && self.cur.peek() == TokenKind::OpenParen {
                    if let (TokenKind::Number(n), TokenKind::CloseParen) = (self.cur.peek_at(1), self.cur.peek_at(2)) {
                        self.cur.advance();
                        self.cur.advance();
                        self.cur.advance();
                        return u8::try_from(n)
                            .ok()
                            .and_then(|n| Register::new(RegKind::Fpu, n))
                            .map(|r| Node::Reg(r, span))
                            .ok_or_else(|| operand_error(alloc::format!("bad register name `st({})'", n), span));
                    }
                }
                if let Some(reg) = self.ctx.register(tok.text(), span)? {
                    return Ok(Node::Reg(reg, span));
                }
                Ok(Node::Value(
                    match self.ctx.symbols.constant(tok.text()) {
                        Some(v) => Value::Constant(v),
                        None => Value::symbol(tok.text()),
                    },
                    span,
                ))
            }
            TokenKind::NumericLabelBwd(n) | TokenKind::NumericLabelFwd(n) => {
                self.cur.advance();
                let forward = matches!(tok.kind, TokenKind::NumericLabelFwd(_));
                self.ctx
                    .symbols
                    .numeric_label(n, forward)
                    .map(|name| Node::Value(Value::Symbol { name, addend: 0 }, span))
                    .ok_or_else(|| AsmError::UndefinedLabel {
                        label: tok.text().to_string(),
                        span,
                    })
            }
            TokenKind::OpenParen => {
                self.cur.advance();
                let inner = self.expr()?;
                self.cur.expect(TokenKind::CloseParen, "')' in expression")?;
                Ok(inner)
            }
            TokenKind::OpenBracket => {
                self.cur.advance();
                self.ctx.bracket_depth += 1;
                let inner = self.expr()?;
                let close = self.cur.expect(TokenKind::CloseBracket, "']' closing the address")?;
                self.ctx.bracket_depth -= 1;
                Ok(Node::Bracket(Box::new(inner), join(span, close.span)))
            }
            _ => Err(AsmError::Syntax {
                msg: alloc::format!("expected operand, found '{}'", tok.text()),
                span,
            }),
        }
    }
}

/// A register term: the register and its multiplier, if any.
struct RegTerm {
    reg: Register,
    scale: Option<i64>,
    span: Span,
}

fn collect(node: &Node, negative: bool, regs: &mut Vec<RegTerm>, parts: &mut AddrParts) -> Result<(), AsmError> {
    if !node.has_register() {
        let v = node.eval()?;
        let v = if negative { Value::Constant(0).sub(v, node.span())? } else { v };
        return parts.add_disp(v, node.span());
    }
    match node {
        Node::Reg(reg, span) => {
            if negative {
                return Err(operand_error(alloc::format!("register `{}' cannot be subtracted", reg), *span));
            }
            regs.push(RegTerm {
                reg: *reg,
                scale: None,
                span: *span,
            });
            Ok(())
        }
        Node::Bracket(inner, _) => collect(inner, negative, regs, parts),
        Node::Unary(UnOp::Neg, inner, _) => collect(inner, !negative, regs, parts),
        Node::Binary(BinOp::Add, l, r, _) => {
            collect(l, negative, regs, parts)?;
            collect(r, negative, regs, parts)
        }
        Node::Binary(BinOp::Sub, l, r, _) => {
            collect(l, negative, regs, parts)?;
            collect(r, !negative, regs, parts)
        }
        Node::Binary(BinOp::Mul, l, r, span) => {
            let (reg_side, factor) = if l.has_register() { (l, r) } else { (r, l) };
            let reg = match strip_brackets(reg_side) {
                Node::Reg(reg, _) if !factor.has_register() => *reg,
                _ => {
                    return Err(operand_error(
                        String::from("register used in a product with a non-constant"),
                        *span,
                    ))
                }
            };
            let Some(scale) = factor.eval()?.constant() else {
                return Err(operand_error(
                    String::from("register used in a product with a non-constant"),
                    *span,
                ));
            };
            if negative {
                return Err(operand_error(alloc::format!("register `{}' cannot be subtracted", reg), *span));
            }
            regs.push(RegTerm {
                reg,
                scale: Some(scale),
                span: *span,
            });
            Ok(())
        }
        other => Err(operand_error(String::from("invalid use of register in address"), other.span())),
    }
}

fn strip_brackets(node: &Node) -> &Node {
    match node {
        Node::Bracket(inner, _) => strip_brackets(inner),
        other => other,
    }
}

fn is_stack_pointer(reg: Register) -> bool {
    matches!(reg.kind(), RegKind::Gpr32 | RegKind::Gpr64) && reg.num() == 4
}

/// Assign register terms to base and index and build the reference.
fn simplify(tree: &Node, mut parts: AddrParts, ctx: &mut ParseContext<'_>, span: Span) -> Result<MemRef, AsmError> {
    let mut regs = Vec::new();
    collect(tree, false, &mut regs, &mut parts)?;

    if regs.len() > 2 {
        return Err(operand_error(
            String::from("too many registers in memory reference"),
            regs[2].span,
        ));
    }

    let mut base: Option<&RegTerm> = None;
    let mut index: Option<&RegTerm> = None;
    // Scaled and vector terms claim the index first.
    for term in regs.iter().filter(|t| t.scale.is_some() || t.reg.is_vector()) {
        if index.is_some() {
            return Err(operand_error(
                alloc::format!("scaled register `{}' cannot be the base", term.reg),
                term.span,
            ));
        }
        index = Some(term);
    }
    for term in regs.iter().filter(|t| t.scale.is_none() && !t.reg.is_vector()) {
        if base.is_none() {
            base = Some(term);
        } else {
            index = Some(term);
        }
    }
    if let (Some(b), Some(i)) = (base, index) {
        if i.scale.is_none() && is_stack_pointer(i.reg) && !is_stack_pointer(b.reg) {
            core::mem::swap(&mut base, &mut index);
        }
    }

    if let Some(b) = base {
        parts.set_base(b.reg, b.span)?;
    }
    if let Some(i) = index {
        parts.set_index(i.reg, i.span)?;
        if let Some(s) = i.scale {
            parts.set_scale(s, i.span)?;
        }
    }
    parts.finish(ctx, span)
}
