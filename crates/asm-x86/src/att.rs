//! AT&T operand syntax: `%reg`, `$imm`, `seg:disp(base,index,scale)`, `*`
//! for indirect jumps, and `{...}` vector decorators.

use alloc::string::String;
use alloc::vec::Vec;

use crate::error::{AsmError, Span};
use crate::expr::{parse_expr, Cursor, Value};
use crate::lexer::{Token, TokenKind};
use crate::operand::{AddrParts, Operand, ParseContext, ParsedOperand, RoundingMode};
use crate::register::{RegKind, Register};

/// Parse one comma-separated AT&T operand.
///
/// A standalone rounding decorator (`{rn-sae}`) updates the context and
/// produces no operand.
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
    let mut cur = Cursor::new(tokens, span);

    if cur.peek() == TokenKind::Decorator && tokens.len() == 1 {
        if let Some(rc) = cur.token().and_then(|t| RoundingMode::from_decorator(t.text())) {
            return ctx.set_rounding(rc, span);
        }
    }

    let absolute = cur.eat(TokenKind::Star);

    let operand = match cur.peek() {
        TokenKind::Dollar => {
            cur.advance();
            let value = parse_expr(&mut cur, ctx.symbols)?;
            Operand::Immediate(value)
        }
        TokenKind::Percent if !is_segment_prefix(&cur) => {
            let reg = parse_register(&mut cur, ctx)?;
            if ctx.is_jump && !absolute && reg.is_gpr() {
                ctx.warn(String::from("indirect jump without `*'"), span);
                parse_decorators(&mut cur, ctx, false)?;
                finish(&cur)?;
                out.push(ParsedOperand {
                    operand: Operand::Register(reg),
                    absolute: true,
                    span,
                });
                return Ok(());
            }
            Operand::Register(reg)
        }
        _ => parse_memory(&mut cur, ctx, span)?,
    };

    let is_memory = matches!(operand, Operand::Memory(_));
    parse_decorators(&mut cur, ctx, is_memory)?;
    finish(&cur)?;
    if is_memory {
        ctx.mem_count += 1;
    }
    out.push(ParsedOperand {
        operand,
        absolute,
        span,
    });
    Ok(())
}

fn finish(cur: &Cursor<'_, '_>) -> Result<(), AsmError> {
    if cur.at_end() {
        return Ok(());
    }
    let text = cur.token().map_or("", |t| t.text());
    Err(AsmError::Syntax {
        msg: alloc::format!("junk `{}' after operand", text),
        span: cur.span(),
    })
}

fn parse_decorators(cur: &mut Cursor<'_, '_>, ctx: &mut ParseContext<'_>, is_memory: bool) -> Result<(), AsmError> {
    while let Some(tok) = cur.token().filter(|t| t.kind == TokenKind::Decorator) {
        cur.advance();
        ctx.decorate(tok.text(), is_memory, tok.span)?;
    }
    Ok(())
}

/// `%es:` and friends at the cursor.
fn is_segment_prefix(cur: &Cursor<'_, '_>) -> bool {
    cur.peek_at(2) == TokenKind::Colon
        && cur
            .token_at(1)
            .and_then(|t| Register::from_name(t.text()))
            .is_some_and(|r| r.kind() == RegKind::Segment)
}

/// `%name`, including `%st(N)`.
fn parse_register(cur: &mut Cursor<'_, '_>, ctx: &ParseContext<'_>) -> Result<Register, AsmError> {
    let percent = cur.expect(TokenKind::Percent, "'%'")?;
    let tok = cur.expect(TokenKind::Ident, "register name")?;
    let span = Span::new(
        percent.span.line,
        percent.span.col,
        percent.span.offset,
        tok.span.offset + tok.span.len - percent.span.offset,
    );
    if tok.text().eq_ignore_ascii_case("st") && cur.peek() == TokenKind::OpenParen {
        if let (TokenKind::Number(n), TokenKind::CloseParen) = (cur.peek_at(1), cur.peek_at(2)) {
            cur.advance();
            cur.advance();
            cur.advance();
            return u8::try_from(n)
                .ok()
                .and_then(|n| Register::new(RegKind::Fpu, n))
                .ok_or_else(|| AsmError::InvalidOperand {
                    detail: alloc::format!("bad register name `%st({})'", n),
                    span,
                });
        }
    }
    ctx.register(tok.text(), span)?.ok_or_else(|| AsmError::InvalidOperand {
        detail: alloc::format!("bad register name `%{}'", tok.text()),
        span,
    })
}

/// `[%seg:]disp(base,index,scale)` or a bare displacement.
fn parse_memory(cur: &mut Cursor<'_, '_>, ctx: &mut ParseContext<'_>, span: Span) -> Result<Operand, AsmError> {
    let mut parts = AddrParts::new();

    if cur.peek() == TokenKind::Percent {
        let seg_span = cur.span();
        let seg = parse_register(cur, ctx)?;
        cur.expect(TokenKind::Colon, "':' after segment register")?;
        parts.set_segment(seg, seg_span)?;
    }

    let starts_address = cur.peek() == TokenKind::OpenParen
        && matches!(cur.peek_at(1), TokenKind::Percent | TokenKind::Comma);
    if !starts_address && !cur.at_end() {
        let disp_span = cur.span();
        let disp = parse_expr(cur, ctx.symbols)?;
        parts.add_disp(disp, disp_span)?;
    }

    if cur.peek() != TokenKind::OpenParen {
        if parts.disp.is_none() {
            return Err(AsmError::Syntax {
                msg: String::from("expected operand"),
                span,
            });
        }
        return Ok(Operand::Memory(parts.finish(ctx, span)?));
    }
    cur.advance();

    if cur.peek() == TokenKind::Percent {
        let reg_span = cur.span();
        let base = parse_register(cur, ctx)?;
        // `(%dx)` names the I/O port register
        if base.kind() == RegKind::Gpr16
            && base.num() == 2
            && cur.peek() == TokenKind::CloseParen
            && parts.disp.is_none()
            && !parts.has_registers()
        {
            cur.advance();
            return Ok(Operand::Register(base));
        }
        parts.set_base(base, reg_span)?;
    }

    if cur.eat(TokenKind::Comma) {
        if cur.peek() == TokenKind::Percent {
            let reg_span = cur.span();
            let index = parse_register(cur, ctx)?;
            parts.set_index(index, reg_span)?;
        }
        if cur.eat(TokenKind::Comma) {
            let scale_span = cur.span();
            match parse_expr(cur, ctx.symbols)? {
                Value::Constant(s) => parts.set_scale(s, scale_span)?,
                other => {
                    return Err(AsmError::InvalidOperand {
                        detail: alloc::format!("scale factor `{}' is not a constant", other),
                        span: scale_span,
                    })
                }
            }
        }
    }
    cur.expect(TokenKind::CloseParen, "')' closing the address")?;

    Ok(Operand::Memory(parts.finish(ctx, span)?))
}
