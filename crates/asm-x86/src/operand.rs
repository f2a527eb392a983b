//! Parsed operand model and the addressing checks shared by the AT&T and
//! Intel operand parsers.
//!
//! Both parsers feed base, index, scale, segment and displacement into an
//! [`AddrParts`] as they discover them; [`AddrParts::finish`] then applies
//! the one set of addressing rules and yields a [`MemRef`]. Per-statement
//! state (vector decorators, memory-operand count, warnings) lives in the
//! [`ParseContext`].

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use log::warn;

use crate::config::{CodeMode, CpuFeatures, Syntax};
use crate::error::{AsmError, Span, Warning};
use crate::expr::{SymbolLookup, Value};
use crate::optype::{OperandType, TypeFlags};
use crate::register::{RegKind, Register};

/// A parsed memory reference.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MemRef {
    /// Base register (`rip` for RIP-relative).
    pub base: Option<Register>,
    /// Index register; a vector register for VSIB.
    pub index: Option<Register>,
    /// log2 of the scale factor.
    pub scale: u8,
    /// Explicit segment override.
    pub segment: Option<Register>,
    /// Displacement.
    pub disp: Option<Value>,
    /// Vector index (gather/scatter addressing).
    pub vsib: bool,
    /// Address size in bits: 16, 32 or 64.
    pub addr_bits: u16,
    /// Explicit operand size (`dword ptr`, or implied by an AT&T alias).
    pub size: Option<TypeFlags>,
}

impl MemRef {
    /// A displacement-only reference.
    #[must_use]
    pub fn absolute(disp: Value, addr_bits: u16) -> Self {
        MemRef {
            base: None,
            index: None,
            scale: 0,
            segment: None,
            disp: Some(disp),
            vsib: false,
            addr_bits,
            size: None,
        }
    }

    /// Has a base or index register.
    #[must_use]
    pub fn has_base_index(&self) -> bool {
        self.base.is_some() || self.index.is_some()
    }

    /// RIP/EIP-relative.
    #[must_use]
    pub fn is_ip_relative(&self) -> bool {
        self.base.is_some_and(|b| b.kind() == RegKind::Ip)
    }

    /// The segment the CPU uses when no override is given.
    #[must_use]
    pub fn default_segment(&self) -> Register {
        if self.base.is_some_and(|b| b.is_stack_based()) {
            SEG_SS
        } else {
            SEG_DS
        }
    }

    /// Whether the explicit segment differs from the default one.
    #[must_use]
    pub fn needs_segment_prefix(&self) -> bool {
        self.segment.is_some_and(|s| s != self.default_segment())
    }
}

const SEG_SS: Register = segment(2);
const SEG_DS: Register = segment(3);

const fn segment(num: u8) -> Register {
    match Register::new(RegKind::Segment, num) {
        Some(r) => r,
        None => panic!("segment register number out of range"),
    }
}

impl fmt::Display for MemRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(seg) = self.segment {
            write!(f, "{}:", seg)?;
        }
        f.write_str("[")?;
        let mut first = true;
        if let Some(b) = self.base {
            write!(f, "{}", b)?;
            first = false;
        }
        if let Some(i) = self.index {
            if !first {
                f.write_str("+")?;
            }
            write!(f, "{}*{}", i, 1u8 << self.scale)?;
            first = false;
        }
        if let Some(d) = &self.disp {
            if !first {
                f.write_str("+")?;
            }
            write!(f, "{}", d)?;
        }
        f.write_str("]")
    }
}

/// An operand as written.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Operand {
    /// A register.
    Register(Register),
    /// An immediate.
    Immediate(Value),
    /// A memory reference (or a direct branch target).
    Memory(MemRef),
}

impl Operand {
    /// The register, if this is one.
    #[must_use]
    pub fn register(&self) -> Option<Register> {
        match self {
            Operand::Register(r) => Some(*r),
            _ => None,
        }
    }

    /// The memory reference, if this is one.
    #[must_use]
    pub fn memory(&self) -> Option<&MemRef> {
        match self {
            Operand::Memory(m) => Some(m),
            _ => None,
        }
    }

    /// The immediate, if this is one.
    #[must_use]
    pub fn immediate(&self) -> Option<&Value> {
        match self {
            Operand::Immediate(v) => Some(v),
            _ => None,
        }
    }
}

/// One parsed operand with its source location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedOperand {
    /// The operand.
    pub operand: Operand,
    /// Indirect (`*` in AT&T, register/bracket jump target in Intel).
    pub absolute: bool,
    /// Source location.
    pub span: Span,
}

/// Static rounding control or suppress-all-exceptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RoundingMode {
    /// `{rn-sae}`
    Nearest,
    /// `{rd-sae}`
    Down,
    /// `{ru-sae}`
    Up,
    /// `{rz-sae}`
    TowardZero,
    /// `{sae}`
    Sae,
}

impl RoundingMode {
    /// Parse a decorator body.
    #[must_use]
    pub fn from_decorator(text: &str) -> Option<Self> {
        Some(match text {
            "rn-sae" => RoundingMode::Nearest,
            "rd-sae" => RoundingMode::Down,
            "ru-sae" => RoundingMode::Up,
            "rz-sae" => RoundingMode::TowardZero,
            "sae" => RoundingMode::Sae,
            _ => return None,
        })
    }

    /// EVEX `L'L` value under `{er}`, `None` for plain `{sae}`.
    #[must_use]
    pub const fn rc(self) -> Option<u8> {
        match self {
            RoundingMode::Nearest => Some(0),
            RoundingMode::Down => Some(1),
            RoundingMode::Up => Some(2),
            RoundingMode::TowardZero => Some(3),
            RoundingMode::Sae => None,
        }
    }
}

/// `{1toN}` on a memory operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Broadcast {
    /// Operand position as written.
    pub operand: usize,
    /// Element count `N`.
    pub count: u8,
}

/// Vector decorators collected over one statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VectorAttrs {
    /// `{kN}` write mask.
    pub mask: Option<Register>,
    /// `{z}`.
    pub zeroing: bool,
    /// `{1toN}`.
    pub broadcast: Option<Broadcast>,
    /// `{er}` / `{sae}`.
    pub rounding: Option<RoundingMode>,
}

/// Per-statement parser state shared by both syntaxes.
pub struct ParseContext<'a> {
    /// Active code mode.
    pub mode: CodeMode,
    /// Active CPU features.
    pub cpu: CpuFeatures,
    /// Operand syntax.
    pub syntax: Syntax,
    /// The mnemonic is a jump or call.
    pub is_jump: bool,
    /// Constants and numeric labels.
    pub symbols: &'a dyn SymbolLookup,
    /// Address size forced by an `addr16`/`addr32` prefix.
    pub addr_prefix: Option<u16>,
    /// Index of the operand being parsed.
    pub operand_index: usize,
    /// Decorators seen so far.
    pub vector: VectorAttrs,
    /// Memory operands seen so far.
    pub mem_count: usize,
    /// Bracket nesting depth (Intel).
    pub bracket_depth: u32,
    /// `short` keyword seen on a branch target (Intel).
    pub short_branch: bool,
    /// Non-fatal diagnostics.
    pub warnings: Vec<Warning>,
}

impl<'a> ParseContext<'a> {
    /// A context for one statement.
    #[must_use]
    pub fn new(mode: CodeMode, cpu: CpuFeatures, syntax: Syntax, symbols: &'a dyn SymbolLookup) -> Self {
        Self {
            mode,
            cpu,
            syntax,
            is_jump: false,
            symbols,
            addr_prefix: None,
            operand_index: 0,
            vector: VectorAttrs::default(),
            mem_count: 0,
            bracket_depth: 0,
            short_branch: false,
            warnings: Vec::new(),
        }
    }

    /// Record a warning and forward it to the logger.
    pub fn warn(&mut self, message: String, span: Span) {
        warn!("{}: {}", span, message);
        self.warnings.push(Warning { message, span });
    }

    /// Resolve a register name valid in the current mode.
    ///
    /// Returns `Ok(None)` for names that are not registers. CPU features are
    /// checked later, against the selected template.
    pub fn register(&self, name: &str, span: Span) -> Result<Option<Register>, AsmError> {
        let Some(reg) = Register::from_name(name) else {
            return Ok(None);
        };
        if reg.requires_64bit() && !self.mode.is_64() {
            return Err(AsmError::InvalidOperand {
                detail: alloc::format!("register `{}' is only available in 64-bit mode", reg),
                span,
            });
        }
        Ok(Some(reg))
    }

    /// Default address size of the mode, adjusted by an address prefix.
    #[must_use]
    pub fn address_bits(&self) -> u16 {
        self.addr_prefix.unwrap_or(u16::from(self.mode.address_bits()))
    }

    /// Apply a `{...}` operand decorator.
    ///
    /// `is_memory` tells whether the decorated operand is a memory
    /// reference, which `{1toN}` requires.
    pub fn decorate(&mut self, text: &str, is_memory: bool, span: Span) -> Result<(), AsmError> {
        let body = text.trim();
        if body == "z" {
            if self.vector.zeroing {
                return Err(decorator_error("duplicate `{z}'", span));
            }
            self.vector.zeroing = true;
            return Ok(());
        }
        if let Some(count) = body.strip_prefix("1to") {
            let count: u8 = count
                .parse()
                .ok()
                .filter(|c: &u8| matches!(c, 2 | 4 | 8 | 16 | 32))
                .ok_or_else(|| decorator_error("invalid broadcast count", span))?;
            if !is_memory {
                return Err(decorator_error("broadcast needs a memory operand", span));
            }
            if self.vector.broadcast.is_some() {
                return Err(decorator_error("duplicate broadcast", span));
            }
            self.vector.broadcast = Some(Broadcast {
                operand: self.operand_index,
                count,
            });
            return Ok(());
        }
        if let Some(rc) = RoundingMode::from_decorator(body) {
            return self.set_rounding(rc, span);
        }
        let name = body.strip_prefix('%').unwrap_or(body);
        if let Some(reg) = Register::from_name(name).filter(|r| r.kind() == RegKind::Mask) {
            if self.vector.mask.is_some() {
                return Err(decorator_error("duplicate write mask", span));
            }
            self.vector.mask = Some(reg);
            return Ok(());
        }
        Err(decorator_error(&alloc::format!("unknown decorator `{{{}}}'", body), span))
    }

    /// Record a standalone `{er}` / `{sae}` operand.
    pub fn set_rounding(&mut self, rc: RoundingMode, span: Span) -> Result<(), AsmError> {
        if self.vector.rounding.is_some() {
            return Err(decorator_error("duplicate rounding control", span));
        }
        self.vector.rounding = Some(rc);
        Ok(())
    }
}

impl fmt::Debug for ParseContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParseContext")
            .field("mode", &self.mode)
            .field("syntax", &self.syntax)
            .field("is_jump", &self.is_jump)
            .field("operand_index", &self.operand_index)
            .field("vector", &self.vector)
            .field("mem_count", &self.mem_count)
            .finish_non_exhaustive()
    }
}

fn decorator_error(msg: &str, span: Span) -> AsmError {
    AsmError::InvalidOperand {
        detail: String::from(msg),
        span,
    }
}

fn operand_error(detail: String, span: Span) -> AsmError {
    AsmError::InvalidOperand { detail, span }
}

/// Address components gathered while parsing one memory operand.
#[derive(Debug, Clone, Default)]
pub struct AddrParts {
    base: Option<Register>,
    index: Option<Register>,
    scale: Option<i64>,
    segment: Option<Register>,
    /// Displacement accumulated so far.
    pub disp: Option<Value>,
}

impl AddrParts {
    /// Empty parts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether any register has been placed.
    #[must_use]
    pub fn has_registers(&self) -> bool {
        self.base.is_some() || self.index.is_some()
    }

    /// The base slot is taken.
    #[must_use]
    pub fn has_base(&self) -> bool {
        self.base.is_some()
    }

    /// The index slot is taken.
    #[must_use]
    pub fn has_index(&self) -> bool {
        self.index.is_some()
    }

    /// Place the base register.
    pub fn set_base(&mut self, reg: Register, span: Span) -> Result<(), AsmError> {
        if self.base.is_some() {
            return Err(operand_error(String::from("base register specified twice"), span));
        }
        if reg.is_vector() {
            return Err(operand_error(alloc::format!("`{}' cannot be a base register", reg), span));
        }
        if !matches!(reg.kind(), RegKind::Gpr16 | RegKind::Gpr32 | RegKind::Gpr64 | RegKind::Ip) {
            return Err(operand_error(alloc::format!("`{}' is not a valid base register", reg), span));
        }
        self.base = Some(reg);
        Ok(())
    }

    /// Place the index register.
    pub fn set_index(&mut self, reg: Register, span: Span) -> Result<(), AsmError> {
        if self.index.is_some() {
            return Err(operand_error(String::from("index register specified twice"), span));
        }
        match reg.kind() {
            RegKind::Ip => {
                return Err(operand_error(alloc::format!("`{}' cannot be an index register", reg), span))
            }
            RegKind::Gpr32 | RegKind::Gpr64 if reg.num() == 4 => {
                return Err(operand_error(alloc::format!("`{}' cannot be an index register", reg), span))
            }
            RegKind::Gpr16 | RegKind::Gpr32 | RegKind::Gpr64 | RegKind::IndexZero => {}
            RegKind::Xmm | RegKind::Ymm | RegKind::Zmm => {}
            _ => {
                return Err(operand_error(alloc::format!("`{}' is not a valid index register", reg), span))
            }
        }
        self.index = Some(reg);
        Ok(())
    }

    /// Record a scale factor as written.
    pub fn set_scale(&mut self, scale: i64, span: Span) -> Result<(), AsmError> {
        if self.scale.is_some() {
            return Err(operand_error(String::from("scale factor specified twice"), span));
        }
        if !matches!(scale, 1 | 2 | 4 | 8) {
            return Err(operand_error(
                alloc::format!("scale factor of {} is not 1, 2, 4 or 8", scale),
                span,
            ));
        }
        self.scale = Some(scale);
        Ok(())
    }

    /// Place the segment override.
    pub fn set_segment(&mut self, reg: Register, span: Span) -> Result<(), AsmError> {
        if self.segment.is_some() {
            return Err(operand_error(String::from("segment override specified twice"), span));
        }
        if reg.kind() != RegKind::Segment {
            return Err(operand_error(alloc::format!("`{}' is not a segment register", reg), span));
        }
        self.segment = Some(reg);
        Ok(())
    }

    /// Add to the displacement.
    pub fn add_disp(&mut self, v: Value, span: Span) -> Result<(), AsmError> {
        self.disp = Some(match self.disp.take() {
            Some(d) => d.add(v, span)?,
            None => v,
        });
        Ok(())
    }

    /// Validate the combination and build the reference.
    pub fn finish(mut self, ctx: &mut ParseContext<'_>, span: Span) -> Result<MemRef, AsmError> {
        let mut scale = match self.scale {
            Some(s) => s.trailing_zeros() as u8,
            None => 0,
        };
        if self.index.is_none() && self.scale.is_some_and(|s| s != 1) {
            ctx.warn(String::from("scale factor without index register ignored"), span);
            scale = 0;
        }

        let vsib = self.index.is_some_and(|i| i.is_vector());
        let reg_bits = |r: Register| r.size_bits();
        let addr_bits = match (self.base, self.index) {
            (Some(b), Some(i)) if !vsib => {
                if reg_bits(b) != reg_bits(i) {
                    return Err(operand_error(
                        alloc::format!("`{}' and `{}' have different address sizes", b, i),
                        span,
                    ));
                }
                reg_bits(b)
            }
            (Some(b), _) => reg_bits(b),
            (None, Some(i)) if !vsib => reg_bits(i),
            _ if vsib => {
                if ctx.mode.is_64() {
                    ctx.addr_prefix.unwrap_or(64)
                } else {
                    32
                }
            }
            _ => ctx.address_bits(),
        };
        if let Some(forced) = ctx.addr_prefix {
            if self.has_registers() && forced != addr_bits {
                return Err(operand_error(
                    alloc::format!("`addr{}' prefix conflicts with {}-bit address registers", forced, addr_bits),
                    span,
                ));
            }
        }
        if addr_bits == 64 && !ctx.mode.is_64() {
            return Err(operand_error(String::from("64-bit addressing requires 64-bit mode"), span));
        }

        if self.base.is_some_and(|b| b.kind() == RegKind::Ip) {
            if self.index.is_some() {
                return Err(operand_error(String::from("RIP-relative addressing takes no index"), span));
            }
            if !ctx.mode.is_64() {
                return Err(operand_error(String::from("RIP-relative addressing requires 64-bit mode"), span));
            }
        }

        if addr_bits == 16 {
            if ctx.mode.is_64() {
                return Err(operand_error(String::from("16-bit addressing is not available in 64-bit mode"), span));
            }
            if vsib {
                return Err(operand_error(String::from("VSIB addressing requires 32 or 64-bit registers"), span));
            }
            if self.index.is_some() && scale != 0 {
                return Err(operand_error(String::from("scale factor not allowed with 16-bit addressing"), span));
            }
            self.normalize_16(span)?;
            scale = 0;
        }

        Ok(MemRef {
            base: self.base,
            index: self.index,
            scale,
            segment: self.segment,
            disp: self.disp,
            vsib,
            addr_bits,
            size: None,
        })
    }

    /// Apply the 16-bit addressing rules: base `bx`/`bp`, index `si`/`di`.
    fn normalize_16(&mut self, span: Span) -> Result<(), AsmError> {
        const BX: u8 = 3;
        const BP: u8 = 5;
        const SI: u8 = 6;
        const DI: u8 = 7;
        let num = |r: Option<Register>| r.map(|r| r.num());
        let is_base = |n: Option<u8>| matches!(n, Some(BX | BP));
        let is_index = |n: Option<u8>| matches!(n, Some(SI | DI));

        if is_index(num(self.base)) && is_base(num(self.index)) {
            core::mem::swap(&mut self.base, &mut self.index);
        } else if self.base.is_none() && (is_base(num(self.index)) || is_index(num(self.index))) {
            self.base = self.index.take();
        }
        let base_ok = self.base.is_none() || is_base(num(self.base)) || is_index(num(self.base));
        let index_ok = self.index.is_none() || (is_index(num(self.index)) && is_base(num(self.base)));
        if !base_ok || !index_ok {
            return Err(operand_error(
                String::from("16-bit addressing takes only bx/bp as base and si/di as index"),
                span,
            ));
        }
        Ok(())
    }
}

/// The operand type of a register, memory or immediate before size
/// narrowing: memory gets its memory-form bits, immediates get nothing yet.
#[must_use]
pub fn base_type(op: &Operand, absolute: bool) -> OperandType {
    let mut ty = match op {
        Operand::Register(r) => r.op_type(),
        Operand::Memory(m) => {
            let mut flags = match m.size {
                Some(s) => s,
                None => TypeFlags::UNSPECIFIED,
            };
            if m.has_base_index() {
                flags |= TypeFlags::BASE_INDEX;
            }
            OperandType::flags(flags)
        }
        Operand::Immediate(_) => OperandType::NONE,
    };
    if absolute {
        ty.set(TypeFlags::JUMP_ABSOLUTE);
    }
    ty
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::NoSymbols;

    fn reg(name: &str) -> Register {
        Register::from_name(name).unwrap()
    }

    fn ctx(mode: CodeMode) -> ParseContext<'static> {
        ParseContext::new(mode, CpuFeatures::all(), Syntax::Att, &NoSymbols)
    }

    fn span() -> Span {
        Span::new(1, 1, 0, 1)
    }

    #[test]
    fn base_index_scale() {
        let mut c = ctx(CodeMode::Code32);
        let mut p = AddrParts::new();
        p.set_base(reg("ebp"), span()).unwrap();
        p.set_index(reg("esi"), span()).unwrap();
        p.set_scale(2, span()).unwrap();
        let m = p.finish(&mut c, span()).unwrap();
        assert_eq!(m.base, Some(reg("ebp")));
        assert_eq!(m.index, Some(reg("esi")));
        assert_eq!(m.scale, 1);
        assert_eq!(m.addr_bits, 32);
        assert!(!m.vsib);
    }

    #[test]
    fn role_filled_twice() {
        let mut p = AddrParts::new();
        p.set_base(reg("eax"), span()).unwrap();
        assert!(p.set_base(reg("ebx"), span()).is_err());
        p.set_index(reg("eax"), span()).unwrap();
        assert!(p.set_index(reg("ecx"), span()).is_err());
    }

    #[test]
    fn same_register_in_both_roles_is_legal() {
        let mut c = ctx(CodeMode::Code32);
        let mut p = AddrParts::new();
        p.set_base(reg("eax"), span()).unwrap();
        p.set_index(reg("eax"), span()).unwrap();
        assert!(p.finish(&mut c, span()).is_ok());
    }

    #[test]
    fn unusable_registers_rejected() {
        let mut p = AddrParts::new();
        assert!(p.set_index(reg("esp"), span()).is_err());
        assert!(p.set_index(reg("rsp"), span()).is_err());
        assert!(p.set_index(Register::RIP, span()).is_err());
        assert!(p.set_base(reg("xmm1"), span()).is_err());
        assert!(p.set_base(reg("al"), span()).is_err());
        assert!(p.set_scale(3, span()).is_err());
    }

    #[test]
    fn scale_without_index_warns() {
        let mut c = ctx(CodeMode::Code32);
        let mut p = AddrParts::new();
        p.set_base(reg("eax"), span()).unwrap();
        p.set_scale(4, span()).unwrap();
        let m = p.finish(&mut c, span()).unwrap();
        assert_eq!(m.scale, 0);
        assert_eq!(c.warnings.len(), 1);
    }

    #[test]
    fn width_mismatch_rejected() {
        let mut c = ctx(CodeMode::Code64);
        let mut p = AddrParts::new();
        p.set_base(reg("rax"), span()).unwrap();
        p.set_index(reg("ecx"), span()).unwrap();
        assert!(p.finish(&mut c, span()).is_err());
    }

    #[test]
    fn sixteen_bit_forms() {
        let mut c = ctx(CodeMode::Code16);
        let mut p = AddrParts::new();
        p.set_base(reg("si"), span()).unwrap();
        p.set_index(reg("bx"), span()).unwrap();
        let m = p.finish(&mut c, span()).unwrap();
        assert_eq!(m.base, Some(reg("bx")));
        assert_eq!(m.index, Some(reg("si")));
        assert_eq!(m.addr_bits, 16);

        let mut p = AddrParts::new();
        p.set_base(reg("ax"), span()).unwrap();
        assert!(p.finish(&mut c, span()).is_err());

        let mut p = AddrParts::new();
        p.set_base(reg("bx"), span()).unwrap();
        p.set_index(reg("si"), span()).unwrap();
        p.set_scale(2, span()).unwrap();
        assert!(p.finish(&mut c, span()).is_err());

        // A lone scaled index must not be folded into the base slot.
        for index in ["bx", "si"] {
            let mut p = AddrParts::new();
            p.set_index(reg(index), span()).unwrap();
            p.set_scale(2, span()).unwrap();
            assert!(p.finish(&mut c, span()).is_err());
        }

        let mut p = AddrParts::new();
        p.set_index(reg("di"), span()).unwrap();
        p.set_scale(1, span()).unwrap();
        let m = p.finish(&mut c, span()).unwrap();
        assert_eq!(m.base, Some(reg("di")));
        assert_eq!(m.index, None);

        let mut c64 = ctx(CodeMode::Code64);
        let mut p = AddrParts::new();
        p.set_base(reg("bx"), span()).unwrap();
        assert!(p.finish(&mut c64, span()).is_err());
    }

    #[test]
    fn vsib_index() {
        let mut c = ctx(CodeMode::Code64);
        let mut p = AddrParts::new();
        p.set_base(reg("rax"), span()).unwrap();
        p.set_index(reg("ymm2"), span()).unwrap();
        p.set_scale(4, span()).unwrap();
        let m = p.finish(&mut c, span()).unwrap();
        assert!(m.vsib);
        assert_eq!(m.addr_bits, 64);
    }

    #[test]
    fn rip_relative_rules() {
        let mut c = ctx(CodeMode::Code64);
        let mut p = AddrParts::new();
        p.set_base(Register::RIP, span()).unwrap();
        p.add_disp(Value::symbol("x"), span()).unwrap();
        let m = p.finish(&mut c, span()).unwrap();
        assert!(m.is_ip_relative());

        let mut c32 = ctx(CodeMode::Code32);
        let mut p = AddrParts::new();
        p.set_base(Register::EIP, span()).unwrap();
        assert!(p.finish(&mut c32, span()).is_err());
    }

    #[test]
    fn addr_prefix_sets_default_width() {
        let mut c = ctx(CodeMode::Code32);
        c.addr_prefix = Some(16);
        let mut p = AddrParts::new();
        p.add_disp(Value::Constant(0x10), span()).unwrap();
        assert_eq!(p.finish(&mut c, span()).unwrap().addr_bits, 16);

        let mut p = AddrParts::new();
        p.set_base(reg("eax"), span()).unwrap();
        assert!(p.finish(&mut c, span()).is_err());
    }

    #[test]
    fn default_segment() {
        let mut c = ctx(CodeMode::Code32);
        let mut p = AddrParts::new();
        p.set_base(reg("ebp"), span()).unwrap();
        p.set_segment(reg("ss"), span()).unwrap();
        let m = p.finish(&mut c, span()).unwrap();
        assert_eq!(m.default_segment(), reg("ss"));
        assert!(!m.needs_segment_prefix());

        let mut p = AddrParts::new();
        p.set_base(reg("eax"), span()).unwrap();
        p.set_segment(reg("fs"), span()).unwrap();
        let m = p.finish(&mut c, span()).unwrap();
        assert_eq!(m.default_segment(), reg("ds"));
        assert!(m.needs_segment_prefix());
    }

    #[test]
    fn decorators() {
        let mut c = ctx(CodeMode::Code64);
        c.decorate("%k1", false, span()).unwrap();
        c.decorate("z", false, span()).unwrap();
        assert_eq!(c.vector.mask, Some(reg("k1")));
        assert!(c.vector.zeroing);
        assert!(c.decorate("k2", false, span()).is_err());
        c.operand_index = 1;
        assert!(c.decorate("1to16", false, span()).is_err());
        c.decorate("1to16", true, span()).unwrap();
        assert_eq!(c.vector.broadcast, Some(Broadcast { operand: 1, count: 16 }));
        c.decorate("rz-sae", false, span()).unwrap();
        assert_eq!(c.vector.rounding, Some(RoundingMode::TowardZero));
        assert!(c.decorate("bogus", false, span()).is_err());
    }

    #[test]
    fn register_mode_check() {
        let c = ctx(CodeMode::Code32);
        assert!(c.register("rax", span()).is_err());
        assert!(c.register("r8d", span()).is_err());
        assert_eq!(c.register("eax", span()).unwrap(), Some(reg("eax")));
        assert_eq!(c.register("foo", span()).unwrap(), None);
    }
}
