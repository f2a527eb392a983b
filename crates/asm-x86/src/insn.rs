//! Statement parsing: prefixes, mnemonic and suffix resolution, operand
//! splitting, and the per-operand types handed to the matcher.
//!
//! The result is an [`Insn`] with operands in canonical (AT&T, source
//! first) order regardless of the syntax they were written in.

use alloc::string::String;
use alloc::vec::Vec;

use log::trace;

use crate::att;
use crate::config::{CodeMode, CpuFeatures, OptLevel, Syntax};
use crate::error::{AsmError, Span, Warning};
use crate::expr::{SymbolLookup, Value};
use crate::intel;
use crate::lexer::{Token, TokenKind};
use crate::operand::{base_type, MemRef, Operand, ParseContext, ParsedOperand, VectorAttrs};
use crate::optype::{OperandType, TypeFlags};
use crate::register::{RegKind, Register};
use crate::template::{lookup, Group, ModeReq, MAX_OPERANDS};

/// Legacy prefixes written as words before the mnemonic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Prefixes {
    /// `lock`.
    pub lock: bool,
    /// `rep`/`repe`/`repz` (`f3`) or `repne`/`repnz` (`f2`).
    pub rep: Option<u8>,
    /// `data16` / `data32`: operand-size override requested explicitly.
    pub data: bool,
    /// `addr16` / `addr32`.
    pub addr: Option<u16>,
    /// `rex64`.
    pub rex64: bool,
    /// Segment word (`fs lodsb`, Intel syntax).
    pub segment: Option<Register>,
}

impl Prefixes {
    /// Whether no prefix word was given.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Prefixes::default()
    }

    /// The raw bytes of these prefixes, for a statement with no mnemonic.
    #[must_use]
    pub fn bytes(&self, mode: CodeMode) -> Vec<u8> {
        let mut out = Vec::new();
        if let Some(seg) = self.segment {
            out.push(segment_prefix(seg));
        }
        if self.addr.is_some() {
            out.push(0x67);
        }
        if self.data {
            out.push(0x66);
        }
        if self.lock {
            out.push(0xF0);
        }
        if let Some(rep) = self.rep {
            out.push(rep);
        }
        if self.rex64 && mode.is_64() {
            out.push(0x48);
        }
        out
    }
}

/// Segment-override prefix byte of a segment register.
#[must_use]
pub const fn segment_prefix(seg: Register) -> u8 {
    match seg.num() {
        0 => 0x26,
        1 => 0x2E,
        2 => 0x36,
        3 => 0x3E,
        4 => 0x64,
        _ => 0x65,
    }
}

/// `{vex}`, `{vex3}` or `{evex}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodingPin {
    /// `{vex}` / `{vex2}`: any VEX form.
    Vex,
    /// `{vex3}`: the three-byte VEX form.
    Vex3,
    /// `{evex}`.
    Evex,
}

/// `{disp8}` or `{disp32}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispPin {
    /// Force an 8-bit displacement.
    Disp8,
    /// Force a full-width displacement.
    Disp32,
}

/// `{load}` or `{store}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirPin {
    /// Register destination form.
    Load,
    /// ModRM.rm destination form.
    Store,
}

/// Pseudo-prefix pins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Pins {
    /// Encoding family.
    pub encoding: Option<EncodingPin>,
    /// Displacement width.
    pub disp: Option<DispPin>,
    /// Opcode direction.
    pub dir: Option<DirPin>,
}

/// A second reading of an AT&T mnemonic with a size suffix split off
/// (`movq` is both an SSE move and `mov` + `q`).
#[derive(Debug, Clone, Copy)]
pub struct Alternate {
    /// Group of the stripped mnemonic.
    pub group: &'static Group,
    /// The suffix.
    pub suffix: u8,
}

/// One parsed instruction statement.
#[derive(Debug, Clone)]
pub struct Insn {
    /// Mnemonic as written, lower-cased.
    pub mnemonic: String,
    /// Template group to match against.
    pub group: &'static Group,
    /// AT&T size suffix (`b`, `w`, `l`, `q`, `s`, `t`).
    pub suffix: Option<u8>,
    /// Fallback reading tried when `group` has no match.
    pub alternate: Option<Alternate>,
    /// Operands, source first.
    pub operands: Vec<ParsedOperand>,
    /// Legacy prefix words.
    pub prefixes: Prefixes,
    /// Pseudo-prefixes.
    pub pins: Pins,
    /// Mask, zeroing, broadcast and rounding; broadcast indexes `operands`.
    pub vector: VectorAttrs,
    /// Intel `short`.
    pub short_branch: bool,
    /// Syntax the statement was written in.
    pub syntax: Syntax,
    /// Code mode in effect.
    pub mode: CodeMode,
    /// Whole statement.
    pub span: Span,
}

/// A parsed statement: an instruction, or prefix words standing alone.
#[derive(Debug, Clone)]
pub enum Statement {
    /// An instruction.
    Insn(Insn),
    /// `lock`, `rep`, ... on a line of their own.
    Prefixes {
        /// The prefix bytes.
        bytes: Vec<u8>,
        /// Source location.
        span: Span,
    },
}

/// Everything statement parsing reads besides the tokens.
#[derive(Clone, Copy)]
pub struct ParseOptions<'a> {
    /// Code mode.
    pub mode: CodeMode,
    /// Syntax.
    pub syntax: Syntax,
    /// CPU features.
    pub cpu: CpuFeatures,
    /// Encoding optimizations.
    pub opt_level: OptLevel,
    /// Constants and numeric labels.
    pub symbols: &'a dyn SymbolLookup,
}

impl core::fmt::Debug for ParseOptions<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ParseOptions")
            .field("mode", &self.mode)
            .field("syntax", &self.syntax)
            .field("opt_level", &self.opt_level)
            .finish_non_exhaustive()
    }
}

/// AT&T spellings whose size letters describe source and destination.
const ATT_ALIASES: &[(&str, &str, TypeFlags, u8)] = &[
    ("movzbw", "movzx", TypeFlags::BYTE, b'w'),
    ("movzbl", "movzx", TypeFlags::BYTE, b'l'),
    ("movzbq", "movzx", TypeFlags::BYTE, b'q'),
    ("movzwl", "movzx", TypeFlags::WORD, b'l'),
    ("movzwq", "movzx", TypeFlags::WORD, b'q'),
    ("movsbw", "movsx", TypeFlags::BYTE, b'w'),
    ("movsbl", "movsx", TypeFlags::BYTE, b'l'),
    ("movsbq", "movsx", TypeFlags::BYTE, b'q'),
    ("movswl", "movsx", TypeFlags::WORD, b'l'),
    ("movswq", "movsx", TypeFlags::WORD, b'q'),
    ("movslq", "movsxd", TypeFlags::DWORD, b'q'),
];

/// Apply a legacy prefix word. `None` if `word` is not one, else whether
/// the prefix was new.
fn apply_prefix_word(p: &mut Prefixes, word: &str) -> Option<bool> {
    Some(match word {
        "lock" => !core::mem::replace(&mut p.lock, true),
        "rep" | "repe" | "repz" => p.rep.replace(0xF3).is_none(),
        "repne" | "repnz" => p.rep.replace(0xF2).is_none(),
        "data16" | "data32" => !core::mem::replace(&mut p.data, true),
        "addr16" => p.addr.replace(16).is_none(),
        "addr32" => p.addr.replace(32).is_none(),
        "rex64" => !core::mem::replace(&mut p.rex64, true),
        _ => return None,
    })
}

fn join(a: Span, b: Span) -> Span {
    Span::new(a.line, a.col, a.offset, (b.offset + b.len).saturating_sub(a.offset))
}

fn syntax_error(msg: &str, span: Span) -> AsmError {
    AsmError::Syntax {
        msg: String::from(msg),
        span,
    }
}

fn is_jump_group(name: &str) -> bool {
    name.starts_with('j') || name.starts_with("loop") || matches!(name, "call" | "lcall" | "ljmp")
}

/// Split at top-level commas.
fn split_operands<'t, 's>(tokens: &'t [Token<'s>]) -> Vec<&'t [Token<'s>]> {
    let mut out = Vec::new();
    if tokens.is_empty() {
        return out;
    }
    let mut depth = 0i32;
    let mut start = 0;
    for (i, tok) in tokens.iter().enumerate() {
        match tok.kind {
            TokenKind::OpenParen | TokenKind::OpenBracket => depth += 1,
            TokenKind::CloseParen | TokenKind::CloseBracket => depth -= 1,
            TokenKind::Comma if depth == 0 => {
                out.push(&tokens[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    out.push(&tokens[start..]);
    out
}

/// Parse one instruction statement.
///
/// `tokens` covers the statement without its labels and without the
/// terminating newline.
///
/// # Errors
///
/// `UnknownMnemonic` for a mnemonic with no template group, `Syntax` and
/// `InvalidOperand` from the operand parsers.
///
/// # Examples
///
/// ```rust
/// use asm_x86::config::{CodeMode, CpuFeatures, OptLevel, Syntax};
/// use asm_x86::expr::NoSymbols;
/// use asm_x86::insn::{parse_statement, ParseOptions, Statement};
/// use asm_x86::lexer::tokenize;
///
/// let tokens = tokenize("movl $1, %eax").unwrap();
/// let opts = ParseOptions {
///     mode: CodeMode::Code64,
///     syntax: Syntax::Att,
///     cpu: CpuFeatures::all(),
///     opt_level: OptLevel::Size,
///     symbols: &NoSymbols,
/// };
/// let mut warnings = Vec::new();
/// let Statement::Insn(insn) = parse_statement(&tokens[..tokens.len() - 1], &opts, &mut warnings).unwrap() else {
///     panic!("expected an instruction");
/// };
/// assert_eq!(insn.group.name, "mov");
/// assert_eq!(insn.suffix, Some(b'l'));
/// ```
pub fn parse_statement(
    tokens: &[Token<'_>],
    opts: &ParseOptions<'_>,
    warnings: &mut Vec<Warning>,
) -> Result<Statement, AsmError> {
    let (first, last) = match (tokens.first(), tokens.last()) {
        (Some(f), Some(l)) => (f.span, l.span),
        _ => return Err(syntax_error("empty statement", Span::dummy())),
    };
    let span = join(first, last);

    let mut prefixes = Prefixes::default();
    let mut pins = Pins::default();
    let mut pos = 0;
    while let Some(tok) = tokens.get(pos) {
        match tok.kind {
            TokenKind::Decorator => {
                let text = tok.text().trim().to_ascii_lowercase();
                let fresh = match text.as_str() {
                    "vex" | "vex2" => pins.encoding.replace(EncodingPin::Vex).is_none(),
                    "vex3" => pins.encoding.replace(EncodingPin::Vex3).is_none(),
                    "evex" => pins.encoding.replace(EncodingPin::Evex).is_none(),
                    "disp8" => pins.disp.replace(DispPin::Disp8).is_none(),
                    "disp32" => pins.disp.replace(DispPin::Disp32).is_none(),
                    "load" => pins.dir.replace(DirPin::Load).is_none(),
                    "store" => pins.dir.replace(DirPin::Store).is_none(),
                    _ => return Err(syntax_error("unknown pseudo-prefix", tok.span)),
                };
                if !fresh {
                    return Err(syntax_error("pseudo-prefix of this kind given twice", tok.span));
                }
            }
            TokenKind::Ident => {
                let word = tok.text().to_ascii_lowercase();
                if let Some(fresh) = apply_prefix_word(&mut prefixes, &word) {
                    if !fresh {
                        return Err(syntax_error("same type of prefix used twice", tok.span));
                    }
                } else if let Some(seg) = intel_segment_word(&word, tokens.get(pos + 1), opts.syntax) {
                    if prefixes.segment.replace(seg).is_some() {
                        return Err(syntax_error("same type of prefix used twice", tok.span));
                    }
                } else {
                    break;
                }
            }
            _ => return Err(syntax_error("expected an instruction mnemonic", tok.span)),
        }
        pos += 1;
    }

    let Some(mnemonic_tok) = tokens.get(pos) else {
        if pins != Pins::default() {
            return Err(syntax_error("pseudo-prefix without an instruction", span));
        }
        return Ok(Statement::Prefixes {
            bytes: prefixes.bytes(opts.mode),
            span,
        });
    };
    let mnemonic = mnemonic_tok.text().to_ascii_lowercase();
    let mnemonic_span = mnemonic_tok.span;
    let operand_tokens = split_operands(&tokens[pos + 1..]);
    if operand_tokens.iter().any(|t| t.is_empty()) {
        return Err(syntax_error("missing operand", span));
    }

    let resolved = resolve_mnemonic(&mnemonic, opts.syntax, operand_tokens.is_empty())
        .ok_or_else(|| AsmError::UnknownMnemonic {
            mnemonic: mnemonic.clone(),
            span: mnemonic_span,
        })?;

    let mut ctx = ParseContext::new(opts.mode, opts.cpu, opts.syntax, opts.symbols);
    ctx.is_jump = is_jump_group(resolved.group.name);
    ctx.addr_prefix = prefixes.addr;
    let mut operands = Vec::with_capacity(operand_tokens.len());
    for toks in &operand_tokens {
        let op_span = match (toks.first(), toks.last()) {
            (Some(f), Some(l)) => join(f.span, l.span),
            _ => span,
        };
        ctx.operand_index = operands.len();
        match opts.syntax {
            Syntax::Att => att::parse_operand(toks, op_span, &mut ctx, &mut operands)?,
            Syntax::Intel => intel::parse_operand(toks, op_span, &mut ctx, &mut operands)?,
        }
    }
    if operands.len() > MAX_OPERANDS {
        return Err(syntax_error("too many operands", span));
    }
    warnings.append(&mut ctx.warnings);

    let mut vector = ctx.vector;
    if opts.syntax == Syntax::Intel {
        operands.reverse();
        if let Some(b) = vector.broadcast.as_mut() {
            b.operand = operands.len() - 1 - b.operand;
        }
    }

    let mut insn = Insn {
        mnemonic,
        group: resolved.group,
        suffix: resolved.suffix,
        alternate: resolved.alternate,
        operands,
        prefixes,
        pins,
        vector,
        short_branch: ctx.short_branch,
        syntax: opts.syntax,
        mode: opts.mode,
        span,
    };

    if let Some(size) = resolved.memory_size {
        for op in &mut insn.operands {
            if let Operand::Memory(m) = &mut op.operand {
                m.size.get_or_insert(size);
            }
        }
    }
    if opts.syntax == Syntax::Intel {
        insn.route_far_indirect();
    }
    if insn.pins.disp.is_none() {
        insn.drop_zero_displacements();
    }
    if opts.opt_level == OptLevel::Size {
        insn.narrow_mov_imm();
    }
    trace!(
        "{}: `{}' -> group `{}' suffix {:?}, {} operand(s)",
        span,
        insn.mnemonic,
        insn.group.name,
        insn.suffix.map(char::from),
        insn.operands.len()
    );
    Ok(Statement::Insn(insn))
}

/// An Intel segment register name used as a prefix word (`fs lodsb`).
fn intel_segment_word(word: &str, next: Option<&Token<'_>>, syntax: Syntax) -> Option<Register> {
    if syntax != Syntax::Intel || !next.is_some_and(|t| t.kind == TokenKind::Ident) {
        return None;
    }
    Register::from_name(word).filter(|r| r.kind() == RegKind::Segment)
}

struct Resolved {
    group: &'static Group,
    suffix: Option<u8>,
    alternate: Option<Alternate>,
    memory_size: Option<TypeFlags>,
}

fn resolve_mnemonic(mnemonic: &str, syntax: Syntax, no_operands: bool) -> Option<Resolved> {
    let direct = |group| Resolved {
        group,
        suffix: None,
        alternate: None,
        memory_size: None,
    };
    match syntax {
        Syntax::Att => {
            if let Some(&(_, target, size, suffix)) = ATT_ALIASES.iter().find(|(a, ..)| *a == mnemonic) {
                return lookup(target).map(|group| Resolved {
                    group,
                    suffix: Some(suffix),
                    alternate: None,
                    memory_size: Some(size),
                });
            }
            if let Some(group) = lookup(mnemonic) {
                let alternate = split_suffix(mnemonic, b"bwlq")
                    .map(|(group, suffix)| Alternate { group, suffix });
                return Some(Resolved {
                    alternate,
                    ..direct(group)
                });
            }
            split_suffix(mnemonic, b"bwlqst").map(|(group, suffix)| Resolved {
                suffix: Some(suffix),
                ..direct(group)
            })
        }
        Syntax::Intel => {
            let found = lookup(mnemonic);
            if let Some(group) = found {
                if !no_operands || group.templates.iter().any(|t| t.operand_count() == 0) {
                    return Some(direct(group));
                }
            }
            if no_operands {
                if let Some((group, suffix)) = split_suffix(mnemonic, b"bwdq") {
                    let suffix = if suffix == b'd' { b'l' } else { suffix };
                    return Some(Resolved {
                        suffix: Some(suffix),
                        ..direct(group)
                    });
                }
            }
            found.map(direct)
        }
    }
}

fn split_suffix(mnemonic: &str, allowed: &[u8]) -> Option<(&'static Group, u8)> {
    let (&last, _) = mnemonic.as_bytes().split_last()?;
    if mnemonic.len() < 2 || !allowed.contains(&last) {
        return None;
    }
    lookup(&mnemonic[..mnemonic.len() - 1]).map(|g| (g, last))
}

impl Insn {
    /// Whether the group is a jump or call.
    #[must_use]
    pub fn is_jump(&self) -> bool {
        is_jump_group(self.group.name)
    }

    /// Number of memory operands.
    #[must_use]
    pub fn memory_count(&self) -> usize {
        self.operands.iter().filter(|o| o.operand.memory().is_some()).count()
    }

    /// The memory operand, if any.
    #[must_use]
    pub fn memory(&self) -> Option<&MemRef> {
        self.operands.iter().find_map(|o| o.operand.memory())
    }

    /// Intel `jmp/call fword ptr [m]` is the far indirect form.
    fn route_far_indirect(&mut self) {
        let far = match self.group.name {
            "jmp" => "ljmp",
            "call" => "lcall",
            _ => return,
        };
        let fword = self
            .operands
            .iter()
            .any(|o| o.operand.memory().is_some_and(|m| m.size == Some(TypeFlags::FWORD)));
        if fword {
            if let Some(g) = lookup(far) {
                self.group = g;
            }
        }
    }

    fn drop_zero_displacements(&mut self) {
        for op in &mut self.operands {
            if let Operand::Memory(m) = &mut op.operand {
                if m.has_base_index() && !m.is_ip_relative() && m.disp == Some(Value::Constant(0)) {
                    m.disp = None;
                }
            }
        }
    }

    /// `mov $imm, %r64` with an immediate that zero-extends from 32 bits is
    /// `mov $imm, %r32`.
    fn narrow_mov_imm(&mut self) {
        let (group, suffix_is_q) = match (self.group.name, self.alternate) {
            ("mov", _) => (self.group, self.suffix == Some(b'q')),
            (_, Some(alt)) if alt.group.name == "mov" && alt.suffix == b'q' => (alt.group, true),
            _ => return,
        };
        let [imm, dst] = self.operands.as_mut_slice() else {
            return;
        };
        let Some(Value::Constant(v)) = imm.operand.immediate() else {
            return;
        };
        let Some(reg) = dst.operand.register().filter(|r| r.kind() == RegKind::Gpr64) else {
            return;
        };
        if !(0..=i64::from(u32::MAX)).contains(v) {
            return;
        }
        if let Some(narrow) = Register::new(RegKind::Gpr32, reg.num()) {
            dst.operand = Operand::Register(narrow);
            self.group = group;
            self.alternate = None;
            if suffix_is_q {
                self.suffix = Some(b'l');
            }
        }
    }

    /// The size suffix the immediates are interpreted under: the suffix,
    /// else the last general register operand, else the default operand
    /// size.
    #[must_use]
    pub fn guess_suffix(&self, suffix: Option<u8>) -> u8 {
        if let Some(s) = suffix {
            return s;
        }
        let reg_guess = self.operands.iter().rev().find_map(|o| match o.operand.register()?.kind() {
            RegKind::Gpr8 | RegKind::Gpr8High => Some(b'b'),
            RegKind::Gpr16 => Some(b'w'),
            RegKind::Gpr32 => Some(b'l'),
            RegKind::Gpr64 => Some(b'q'),
            _ => None,
        });
        if let Some(g) = reg_guess {
            return g;
        }
        if (self.mode == CodeMode::Code16) ^ self.prefixes.data {
            b'w'
        } else {
            b'l'
        }
    }

    /// Operand types for matching under the given suffix.
    #[must_use]
    pub fn operand_types(&self, suffix: Option<u8>) -> [OperandType; MAX_OPERANDS] {
        let guess = self.guess_suffix(suffix);
        let mut out = [OperandType::NONE; MAX_OPERANDS];
        for (i, (slot, op)) in out.iter_mut().zip(&self.operands).enumerate() {
            let mut ty = base_type(&op.operand, op.absolute);
            match &op.operand {
                Operand::Register(_) => {}
                Operand::Memory(m) => ty.set(self.disp_types(m, op.absolute)),
                Operand::Immediate(v) => ty.set(self.imm_types(i, v, guess)),
            }
            *slot = ty;
        }
        out
    }

    /// The immediate as encoded under `suffix`: word and long guesses
    /// fold unsigned values into their signed range.
    #[must_use]
    pub fn immediate(&self, index: usize, suffix: Option<u8>) -> Option<Value> {
        let v = self.operands.get(index)?.operand.immediate()?;
        Some(match v {
            Value::Constant(c) => Value::Constant(normalize_imm(*c, self.guess_suffix(suffix))),
            sym => sym.clone(),
        })
    }

    fn imm_types(&self, index: usize, v: &Value, guess: u8) -> TypeFlags {
        match v {
            Value::Constant(c) => {
                let n = normalize_imm(*c, guess);
                let mut t = smallest_imm_type(n)
                    | match guess {
                        b'l' => TypeFlags::IMM32 | TypeFlags::IMM64,
                        b'w' => TypeFlags::IMM16 | TypeFlags::IMM32 | TypeFlags::IMM32S | TypeFlags::IMM64,
                        b'b' => {
                            TypeFlags::IMM8
                                | TypeFlags::IMM8S
                                | TypeFlags::IMM16
                                | TypeFlags::IMM32
                                | TypeFlags::IMM32S
                                | TypeFlags::IMM64
                        }
                        _ => TypeFlags::empty(),
                    };
                if guess == b'q' {
                    t.remove(TypeFlags::IMM32);
                }
                t
            }
            Value::Symbol { .. } => {
                let all = TypeFlags::IMM8 | TypeFlags::IMM16 | TypeFlags::IMM32 | TypeFlags::IMM32S | TypeFlags::IMM64;
                let mask = match guess {
                    b'q' => TypeFlags::IMM64 | TypeFlags::IMM32S,
                    b'l' => TypeFlags::IMM32,
                    b'w' => TypeFlags::IMM16,
                    b'b' => TypeFlags::IMM8,
                    _ => return all,
                };
                if self.group_immediates(index).intersects(mask) {
                    all & mask
                } else {
                    all
                }
            }
        }
    }

    /// Immediate kinds the group accepts at `index` in the current mode.
    fn group_immediates(&self, index: usize) -> TypeFlags {
        let mode_ok = |m: ModeReq| match m {
            ModeReq::Any => true,
            ModeReq::Only64 => self.mode.is_64(),
            ModeReq::No64 => !self.mode.is_64(),
        };
        self.group
            .templates
            .iter()
            .filter(|t| mode_ok(t.mode) && t.operand_count() == self.operands.len())
            .filter_map(|t| t.operands.get(index))
            .fold(TypeFlags::empty(), |acc, slot| acc | (slot.bits() & TypeFlags::IMM))
    }

    fn disp_types(&self, m: &MemRef, absolute: bool) -> TypeFlags {
        let disp_only = !m.has_base_index();
        if self.is_jump() && !absolute && disp_only && m.segment.is_none() {
            return TypeFlags::DISP8 | TypeFlags::DISP16 | TypeFlags::DISP32;
        }
        let Some(disp) = &m.disp else {
            return TypeFlags::empty();
        };
        let wide = match m.addr_bits {
            16 => TypeFlags::DISP16,
            _ => TypeFlags::DISP32,
        };
        let moffs64 = disp_only && m.addr_bits == 64 && self.group.name == "movabs";
        let mut t = match disp {
            Value::Constant(d) => {
                let mut t = wide;
                if !disp_only && fits_signed(*d, 8) {
                    t |= TypeFlags::DISP8;
                }
                if disp_only && m.addr_bits == 64 && !fits_signed(*d, 32) {
                    t = TypeFlags::DISP64;
                }
                t
            }
            Value::Symbol { .. } => wide,
        };
        if moffs64 {
            t |= TypeFlags::DISP64;
        }
        t
    }
}

/// Fold an unsigned word or long into its signed range.
#[must_use]
pub fn normalize_imm(v: i64, guess: u8) -> i64 {
    match guess {
        b'w' if (0..=0xFFFF).contains(&v) => i64::from(v as u16 as i16),
        b'l' if (0..=0xFFFF_FFFF).contains(&v) => i64::from(v as u32 as i32),
        _ => v,
    }
}

/// Whether `v` fits a signed field of `bits`.
#[must_use]
pub fn fits_signed(v: i64, bits: u32) -> bool {
    let min = -(1i128 << (bits - 1));
    let max = (1i128 << (bits - 1)) - 1;
    (min..=max).contains(&i128::from(v))
}

/// Whether `v` fits a field of `bits` read either signed or unsigned.
#[must_use]
pub fn fits_either(v: i64, bits: u32) -> bool {
    let min = -(1i128 << (bits - 1));
    let max = (1i128 << bits) - 1;
    (min..=max).contains(&i128::from(v))
}

/// Every immediate kind that can hold `v`.
#[must_use]
pub fn smallest_imm_type(v: i64) -> TypeFlags {
    let mut t = TypeFlags::IMM64;
    if v == 1 {
        t |= TypeFlags::IMM1;
    }
    if fits_signed(v, 8) {
        t |= TypeFlags::IMM8S;
    }
    if fits_either(v, 8) {
        t |= TypeFlags::IMM8;
    }
    if fits_either(v, 16) {
        t |= TypeFlags::IMM16;
    }
    if fits_signed(v, 32) {
        t |= TypeFlags::IMM32S;
    }
    if fits_either(v, 32) {
        t |= TypeFlags::IMM32;
    }
    t
}
