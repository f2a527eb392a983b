//! Lexer for x86 assembly source text.
//!
//! The lexer tokenizes both AT&T and Intel source into a stream of
//! [`Token`](crate::lexer::Token)s, each carrying its
//! [`Span`](crate::error::Span) so that error messages can point back to the
//! exact location in the original input. Syntax-specific meaning (`%` as a
//! register prefix, `[` as a memory opener) is left to the operand parsers.

use alloc::borrow::Cow;
use alloc::string::String;
use alloc::vec::Vec;
use core::str;

use crate::error::{AsmError, Span};

/// A token produced by the lexer.
///
/// Token text is borrowed from the source string (`Cow::Borrowed`) in the
/// common case, avoiding per-token heap allocation. String literals with
/// escape sequences are the only tokens that own their text on the heap.
#[derive(Debug, Clone, PartialEq)]
pub struct Token<'src> {
    /// Token classification.
    pub kind: TokenKind,
    /// Source text of the token; for decorators, the text between the braces.
    pub text: Cow<'src, str>,
    /// Source location.
    pub span: Span,
}

impl<'src> Token<'src> {
    /// Returns the token text as a `&str`.
    #[inline]
    pub fn text(&self) -> &str {
        &self.text
    }
}

/// The type of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// An identifier: mnemonic, register name, symbol or keyword.
    Ident,
    /// A numeric literal.
    Number(i128),
    /// A string literal (content without quotes).
    StringLit,
    /// A character literal (e.g., 'A').
    CharLit(u8),
    /// A directive (starts with `.`).
    Directive,
    /// Label definition (`name:`).
    LabelDef,
    /// Numeric label definition (`1:`).
    NumericLabelDef(u32),
    /// Numeric label forward reference (`1f`).
    NumericLabelFwd(u32),
    /// Numeric label backward reference (`1b`).
    NumericLabelBwd(u32),
    /// `{...}` operand or pseudo-prefix decorator: `{k1}`, `{z}`,
    /// `{1to16}`, `{rn-sae}`, `{vex3}`, `{disp8}`.
    Decorator,
    /// Comma separator.
    Comma,
    /// Open bracket `[`.
    OpenBracket,
    /// Close bracket `]`.
    CloseBracket,
    /// Open parenthesis `(`.
    OpenParen,
    /// Close parenthesis `)`.
    CloseParen,
    /// Plus `+`.
    Plus,
    /// Minus `-`.
    Minus,
    /// Asterisk `*`: scale, multiplication, or AT&T absolute jump.
    Star,
    /// Forward slash `/`.
    Slash,
    /// Colon `:` (segment override, far pointer).
    Colon,
    /// Equals `=` (constant assignment: `name = value`).
    Equals,
    /// Percent sign `%` (AT&T register prefix).
    Percent,
    /// Dollar sign `$` (AT&T immediate prefix).
    Dollar,
    /// Ampersand `&`.
    Ampersand,
    /// Pipe `|`.
    Pipe,
    /// Caret `^`.
    Caret,
    /// Tilde `~`.
    Tilde,
    /// Left shift `<<`.
    LShift,
    /// Right shift `>>`.
    RShift,
    /// A newline or `;` (statement separator).
    Newline,
    /// End of input.
    Eof,
}

const SEGMENT_NAMES: [&str; 6] = ["cs", "ds", "es", "fs", "gs", "ss"];

fn punctuation(ch: u8, next: Option<u8>) -> Option<(TokenKind, usize)> {
    let kind = match (ch, next) {
        (b'<', Some(b'<')) => return Some((TokenKind::LShift, 2)),
        (b'>', Some(b'>')) => return Some((TokenKind::RShift, 2)),
        (b',', _) => TokenKind::Comma,
        (b'[', _) => TokenKind::OpenBracket,
        (b']', _) => TokenKind::CloseBracket,
        (b'(', _) => TokenKind::OpenParen,
        (b')', _) => TokenKind::CloseParen,
        (b'+', _) => TokenKind::Plus,
        (b'*', _) => TokenKind::Star,
        (b'/', _) => TokenKind::Slash,
        (b':', _) => TokenKind::Colon,
        (b'=', _) => TokenKind::Equals,
        (b'%', _) => TokenKind::Percent,
        (b'$', _) => TokenKind::Dollar,
        (b'&', _) => TokenKind::Ampersand,
        (b'|', _) => TokenKind::Pipe,
        (b'^', _) => TokenKind::Caret,
        (b'~', _) => TokenKind::Tilde,
        _ => return None,
    };
    Some((kind, 1))
}

/// Tokenize assembly source text into a vector of tokens.
///
/// The lexer recognizes:
/// - Identifiers (mnemonics, registers, symbols, `ptr`-style keywords)
/// - Numeric literals (decimal, hex `0x`/`h`-suffix, binary `0b`, octal `0o`)
/// - String and character literals
/// - Directives (`.code64`, `.intel_syntax`, `.byte`)
/// - Label definitions (`name:`) and numeric labels (`1:`, `1b`, `1f`)
/// - `{...}` decorators
/// - Punctuation, including `%` and `$`
/// - Comments: `#` and `//` to end of line, `/* ... */`
/// - Newlines and semicolons as statement separators
///
/// # Errors
///
/// Returns `Err(AsmError::Syntax)` if the input contains an unrecognised
/// character or a malformed token (e.g. an unterminated string literal).
pub fn tokenize<'s>(source: &'s str) -> Result<Vec<Token<'s>>, AsmError> {
    // Heuristic: ~4 chars per token on average.
    let mut tokens = Vec::with_capacity(source.len() / 3 + 1);
    let bytes = source.as_bytes();
    let len = bytes.len();
    let mut pos = 0;
    let mut line: u32 = 1;
    let mut col: u32 = 1;
    let mut line_start = 0usize;

    while pos < len {
        let ch = bytes[pos];

        if ch == b' ' || ch == b'\t' || ch == b'\r' {
            pos += 1;
            col += 1;
            continue;
        }

        if ch == b'\n' || ch == b';' {
            tokens.push(Token {
                kind: TokenKind::Newline,
                text: Cow::Borrowed(if ch == b'\n' { "\n" } else { ";" }),
                span: Span::new(line, col, pos, 1),
            });
            pos += 1;
            if ch == b'\n' {
                line += 1;
                col = 1;
                line_start = pos;
            } else {
                col += 1;
            }
            continue;
        }

        // `#` comment, and `//` line comment
        if ch == b'#' || (ch == b'/' && bytes.get(pos + 1) == Some(&b'/')) {
            while pos < len && bytes[pos] != b'\n' {
                pos += 1;
            }
            col = (pos - line_start) as u32 + 1;
            continue;
        }

        if ch == b'/' && bytes.get(pos + 1) == Some(&b'*') {
            let (start_line, start_col, start_pos) = (line, col, pos);
            pos += 2;
            col += 2;
            while pos + 1 < len && !(bytes[pos] == b'*' && bytes[pos + 1] == b'/') {
                if bytes[pos] == b'\n' {
                    line += 1;
                    col = 1;
                    line_start = pos + 1;
                } else {
                    col += 1;
                }
                pos += 1;
            }
            if pos + 1 >= len {
                return Err(AsmError::Syntax {
                    msg: String::from("unterminated block comment"),
                    span: Span::new(start_line, start_col, start_pos, 2),
                });
            }
            pos += 2;
            col += 2;
            continue;
        }

        // Minus, folded into a negative literal in unary position
        if ch == b'-' {
            let is_unary = matches!(
                tokens.last().map(|t: &Token<'_>| t.kind),
                None | Some(
                    TokenKind::Comma
                        | TokenKind::OpenBracket
                        | TokenKind::OpenParen
                        | TokenKind::Plus
                        | TokenKind::Minus
                        | TokenKind::Star
                        | TokenKind::Newline
                        | TokenKind::Equals
                        | TokenKind::Dollar
                )
            );
            if is_unary && pos + 1 < len && bytes[pos + 1].is_ascii_digit() {
                let start = pos;
                let start_col = col;
                pos += 1;
                let value = parse_number_at(bytes, &mut pos, line, start_col)?;
                tokens.push(Token {
                    kind: TokenKind::Number(-value),
                    text: Cow::Borrowed(&source[start..pos]),
                    span: Span::new(line, start_col, start, pos - start),
                });
                col = (pos - line_start) as u32 + 1;
                continue;
            }
            tokens.push(Token {
                kind: TokenKind::Minus,
                text: Cow::Borrowed("-"),
                span: Span::new(line, col, pos, 1),
            });
            pos += 1;
            col += 1;
            continue;
        }

        if let Some((kind, n)) = punctuation(ch, bytes.get(pos + 1).copied()) {
            tokens.push(Token {
                kind,
                text: Cow::Borrowed(&source[pos..pos + n]),
                span: Span::new(line, col, pos, n),
            });
            pos += n;
            col += n as u32;
            continue;
        }

        // Decorator: `{` ... `}` on one line
        if ch == b'{' {
            let start = pos;
            let start_col = col;
            pos += 1;
            while pos < len && bytes[pos] != b'}' && bytes[pos] != b'\n' {
                pos += 1;
            }
            if pos >= len || bytes[pos] != b'}' {
                return Err(AsmError::Syntax {
                    msg: String::from("unterminated `{' decorator"),
                    span: Span::new(line, start_col, start, pos - start),
                });
            }
            let inner = source[start + 1..pos].trim();
            pos += 1;
            tokens.push(Token {
                kind: TokenKind::Decorator,
                text: Cow::Borrowed(inner),
                span: Span::new(line, start_col, start, pos - start),
            });
            col = (pos - line_start) as u32 + 1;
            continue;
        }

        if ch == b'"' {
            let start = pos;
            let start_col = col;
            pos += 1;
            let mut content = Vec::new();
            while pos < len && bytes[pos] != b'"' {
                if bytes[pos] == b'\n' {
                    break;
                }
                if bytes[pos] == b'\\' && pos + 1 < len {
                    pos += 1;
                    let escaped = match bytes[pos] {
                        b'n' => b'\n',
                        b't' => b'\t',
                        b'r' => b'\r',
                        b'\\' => b'\\',
                        b'"' => b'"',
                        b'0' => 0,
                        b'x' => {
                            let hi = bytes.get(pos + 1).copied().and_then(hex_digit);
                            let lo = bytes.get(pos + 2).copied().and_then(hex_digit);
                            match (hi, lo) {
                                (Some(h), Some(l)) => {
                                    pos += 2;
                                    h * 16 + l
                                }
                                _ => {
                                    return Err(AsmError::Syntax {
                                        msg: String::from("invalid \\xHH escape sequence"),
                                        span: Span::new(
                                            line,
                                            (pos - line_start) as u32,
                                            pos - 1,
                                            2,
                                        ),
                                    });
                                }
                            }
                        }
                        other => {
                            return Err(AsmError::Syntax {
                                msg: alloc::format!("unknown escape sequence '\\{}'", other as char),
                                span: Span::new(line, (pos - line_start) as u32, pos - 1, 2),
                            });
                        }
                    };
                    content.push(escaped);
                } else {
                    content.push(bytes[pos]);
                }
                pos += 1;
            }
            if pos >= len || bytes[pos] != b'"' {
                return Err(AsmError::Syntax {
                    msg: String::from("unterminated string literal"),
                    span: Span::new(line, start_col, start, pos - start),
                });
            }
            pos += 1;
            let text = match String::from_utf8(content) {
                Ok(s) => Cow::Owned(s),
                Err(_) => {
                    return Err(AsmError::Syntax {
                        msg: String::from("string literal is not valid UTF-8"),
                        span: Span::new(line, start_col, start, pos - start),
                    })
                }
            };
            tokens.push(Token {
                kind: TokenKind::StringLit,
                text,
                span: Span::new(line, start_col, start, pos - start),
            });
            col = (pos - line_start) as u32 + 1;
            continue;
        }

        if ch == b'\'' {
            let start = pos;
            let start_col = col;
            let (value, consumed) = match (bytes.get(pos + 1), bytes.get(pos + 2)) {
                (Some(b'\\'), Some(&e)) => {
                    let v = match e {
                        b'n' => b'\n',
                        b't' => b'\t',
                        b'\\' => b'\\',
                        b'\'' => b'\'',
                        b'0' => 0,
                        _ => {
                            return Err(AsmError::Syntax {
                                msg: String::from("unknown escape in character literal"),
                                span: Span::new(line, start_col, start, 3),
                            })
                        }
                    };
                    (v, 3)
                }
                (Some(&c), _) if c != b'\n' => (c, 2),
                _ => {
                    return Err(AsmError::Syntax {
                        msg: String::from("unterminated character literal"),
                        span: Span::new(line, start_col, start, 1),
                    })
                }
            };
            pos += consumed;
            if bytes.get(pos) != Some(&b'\'') {
                return Err(AsmError::Syntax {
                    msg: String::from("unterminated character literal"),
                    span: Span::new(line, start_col, start, pos - start),
                });
            }
            pos += 1;
            tokens.push(Token {
                kind: TokenKind::CharLit(value),
                text: Cow::Borrowed(&source[start..pos]),
                span: Span::new(line, start_col, start, pos - start),
            });
            col = (pos - line_start) as u32 + 1;
            continue;
        }

        if ch == b'.' && bytes.get(pos + 1).is_some_and(|b| b.is_ascii_alphabetic() || *b == b'_') {
            let start = pos;
            let start_col = col;
            pos += 1;
            while pos < len && (bytes[pos].is_ascii_alphanumeric() || bytes[pos] == b'_') {
                pos += 1;
            }
            // `.L1:` style local labels are ordinary label definitions
            let kind = if bytes.get(pos) == Some(&b':') {
                TokenKind::LabelDef
            } else {
                TokenKind::Directive
            };
            let text = Cow::Borrowed(&source[start..pos]);
            if kind == TokenKind::LabelDef {
                pos += 1;
            }
            tokens.push(Token {
                kind,
                text,
                span: Span::new(line, start_col, start, pos - start),
            });
            col = (pos - line_start) as u32 + 1;
            continue;
        }

        if ch.is_ascii_digit() {
            let start = pos;
            let start_col = col;
            let mut end = pos;
            while end < len && bytes[end].is_ascii_digit() {
                end += 1;
            }

            // Numeric label definition `1:` (single digit, like GAS local labels)
            if end == start + 1
                && bytes.get(end) == Some(&b':')
                && tokens
                    .last()
                    .map_or(true, |t: &Token<'_>| t.kind == TokenKind::Newline)
            {
                let n = u32::from(ch - b'0');
                pos = end + 1;
                tokens.push(Token {
                    kind: TokenKind::NumericLabelDef(n),
                    text: Cow::Borrowed(&source[start..pos]),
                    span: Span::new(line, start_col, start, pos - start),
                });
                col = (pos - line_start) as u32 + 1;
                continue;
            }

            // Numeric label reference `1b` / `1f`; `0b1` stays binary
            if end == start + 1 && matches!(bytes.get(end), Some(b'b' | b'f')) {
                let suffix = bytes[end];
                let after = bytes.get(end + 1).copied();
                let binary = ch == b'0' && suffix == b'b' && matches!(after, Some(b'0' | b'1'));
                let ident_follows = after.is_some_and(|b| b.is_ascii_alphanumeric() || b == b'_');
                if !binary && !ident_follows {
                    let n = u32::from(ch - b'0');
                    pos = end + 1;
                    tokens.push(Token {
                        kind: if suffix == b'b' {
                            TokenKind::NumericLabelBwd(n)
                        } else {
                            TokenKind::NumericLabelFwd(n)
                        },
                        text: Cow::Borrowed(&source[start..pos]),
                        span: Span::new(line, start_col, start, pos - start),
                    });
                    col = (pos - line_start) as u32 + 1;
                    continue;
                }
            }

            let value = parse_number_at(bytes, &mut pos, line, start_col)?;
            tokens.push(Token {
                kind: TokenKind::Number(value),
                text: Cow::Borrowed(&source[start..pos]),
                span: Span::new(line, start_col, start, pos - start),
            });
            col = (pos - line_start) as u32 + 1;
            continue;
        }

        if ch.is_ascii_alphabetic() || ch == b'_' || ch == b'@' {
            let start = pos;
            let start_col = col;
            while pos < len
                && (bytes[pos].is_ascii_alphanumeric()
                    || bytes[pos] == b'_'
                    || bytes[pos] == b'.'
                    || bytes[pos] == b'@'
                    || bytes[pos] == b'$')
            {
                pos += 1;
            }
            let text = &source[start..pos];

            // `name:` defines a label, except a segment register override.
            // `name::` never does.
            let is_label = bytes.get(pos) == Some(&b':')
                && bytes.get(pos + 1) != Some(&b':')
                && !SEGMENT_NAMES.iter().any(|s| text.eq_ignore_ascii_case(s))
                && !matches!(tokens.last().map(|t: &Token<'_>| t.kind), Some(TokenKind::Percent));
            if is_label {
                pos += 1;
                tokens.push(Token {
                    kind: TokenKind::LabelDef,
                    text: Cow::Borrowed(text),
                    span: Span::new(line, start_col, start, pos - start),
                });
            } else {
                tokens.push(Token {
                    kind: TokenKind::Ident,
                    text: Cow::Borrowed(text),
                    span: Span::new(line, start_col, start, pos - start),
                });
            }
            col = (pos - line_start) as u32 + 1;
            continue;
        }

        return Err(AsmError::Syntax {
            msg: alloc::format!("unexpected character '{}'", ch as char),
            span: Span::new(line, col, pos, 1),
        });
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        text: Cow::Borrowed(""),
        span: Span::new(line, col, pos, 0),
    });

    Ok(tokens)
}

/// Parse a number starting at `pos` in `bytes`. Advances `pos` past the number.
#[inline]
fn parse_number_at(
    bytes: &[u8],
    pos: &mut usize,
    span_line: u32,
    span_col: u32,
) -> Result<i128, AsmError> {
    let start = *pos;
    let len = bytes.len();
    let err = |msg: String, end: usize| AsmError::Syntax {
        msg,
        span: Span::new(span_line, span_col, start, end - start),
    };

    let radix_digits = |pos: &mut usize, radix: u32| -> usize {
        let from = *pos;
        while *pos < len && (bytes[*pos] as char).is_digit(radix) {
            *pos += 1;
        }
        from
    };

    if bytes[*pos] == b'0' && *pos + 1 < len {
        let radix = match bytes[*pos + 1] {
            b'x' | b'X' => Some(16),
            b'b' | b'B' if matches!(bytes.get(*pos + 2), Some(b'0' | b'1')) => Some(2),
            b'o' | b'O' => Some(8),
            _ => None,
        };
        if let Some(radix) = radix {
            *pos += 2;
            let from = radix_digits(pos, radix);
            let digits = str::from_utf8(&bytes[from..*pos]).unwrap_or("");
            if digits.is_empty() {
                return Err(err(String::from("expected digits after radix prefix"), *pos));
            }
            return i128::from_str_radix(digits, radix)
                .map_err(|_| err(alloc::format!("number '{}' out of range", digits), *pos));
        }
    }

    // Decimal, or hex with an `h` suffix (`0FFh`)
    let mut end = *pos;
    while end < len && bytes[end].is_ascii_hexdigit() {
        end += 1;
    }
    if end < len && (bytes[end] == b'h' || bytes[end] == b'H') {
        let digits = str::from_utf8(&bytes[*pos..end]).unwrap_or("");
        *pos = end + 1;
        return i128::from_str_radix(digits, 16)
            .map_err(|_| err(alloc::format!("invalid hex number '{}h'", digits), *pos));
    }
    radix_digits(pos, 10);
    let digits = str::from_utf8(&bytes[start..*pos]).unwrap_or("");
    digits
        .parse::<i128>()
        .map_err(|_| err(alloc::format!("invalid number '{}'", digits), *pos))
}

#[inline]
fn hex_digit(b: u8) -> Option<u8> {
    (b as char).to_digit(16).map(|d| d as u8)
}
