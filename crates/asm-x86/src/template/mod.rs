//! Instruction templates.
//!
//! Every mnemonic maps to an ordered group of [`InstructionTemplate`]s. A
//! template describes one encoding form: the admissible type of each operand
//! (in AT&T order, source first), opcode bytes and space, and the modifiers
//! that steer matching and encoding. The table is immutable; the matcher
//! binds a template by reference together with the transforms it applied
//! (see [`crate::matcher::Bound`]).

mod table;

use bitflags::bitflags;

use crate::config::{CpuFeatures, Isa64};
use crate::optype::{OperandType, RegClass, TypeFlags};

pub use table::GROUPS;
use table::{condition_code, CMOVCC, JCC, SETCC};

/// Maximum operands of any template.
pub const MAX_OPERANDS: usize = 5;

/// Opcode map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpcodeSpace {
    /// One-byte legacy map.
    Base,
    /// `0f` escape.
    Map0F,
    /// `0f 38` escape.
    Map0F38,
    /// `0f 3a` escape.
    Map0F3A,
}

impl OpcodeSpace {
    /// Escape bytes emitted in legacy encoding.
    #[must_use]
    pub const fn escape(self) -> &'static [u8] {
        match self {
            OpcodeSpace::Base => &[],
            OpcodeSpace::Map0F => &[0x0F],
            OpcodeSpace::Map0F38 => &[0x0F, 0x38],
            OpcodeSpace::Map0F3A => &[0x0F, 0x3A],
        }
    }

    /// VEX `mmmmm` / EVEX `mm` field.
    #[must_use]
    pub const fn map_select(self) -> u8 {
        match self {
            OpcodeSpace::Base => 0,
            OpcodeSpace::Map0F => 1,
            OpcodeSpace::Map0F38 => 2,
            OpcodeSpace::Map0F3A => 3,
        }
    }
}

/// Mandatory (SIMD) prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MandatoryPrefix {
    /// None.
    None,
    /// `66`.
    P66,
    /// `f3`.
    PF3,
    /// `f2`.
    PF2,
}

impl MandatoryPrefix {
    /// VEX/EVEX `pp` field.
    #[must_use]
    pub const fn pp(self) -> u8 {
        match self {
            MandatoryPrefix::None => 0,
            MandatoryPrefix::P66 => 1,
            MandatoryPrefix::PF3 => 2,
            MandatoryPrefix::PF2 => 3,
        }
    }

    /// Legacy prefix byte.
    #[must_use]
    pub const fn byte(self) -> Option<u8> {
        match self {
            MandatoryPrefix::None => None,
            MandatoryPrefix::P66 => Some(0x66),
            MandatoryPrefix::PF3 => Some(0xF3),
            MandatoryPrefix::PF2 => Some(0xF2),
        }
    }
}

/// Fixed operand size of a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SizeClass {
    /// Taken from the suffix or operands.
    Any,
    /// Always 16-bit (`cbw`, `stosw`).
    Size16,
    /// Always 32-bit.
    Size32,
    /// Always 64-bit (REX.W unless `NO_REX64`).
    Size64,
}

/// Vector length selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VecLen {
    /// From the widest vector operand.
    Dynamic,
    /// 128 bits.
    L128,
    /// 256 bits.
    L256,
    /// 512 bits.
    L512,
    /// Length ignored (scalar); encoded as 0.
    Ignored,
}

/// Encoding family of a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VectorEncoding {
    /// Legacy prefixes and escapes.
    Legacy,
    /// VEX prefix.
    Vex(VecLen),
    /// EVEX prefix.
    Evex(VecLen),
}

impl VectorEncoding {
    /// VEX-encoded template.
    #[must_use]
    pub const fn is_vex(self) -> bool {
        matches!(self, VectorEncoding::Vex(_))
    }

    /// EVEX-encoded template.
    #[must_use]
    pub const fn is_evex(self) -> bool {
        matches!(self, VectorEncoding::Evex(_))
    }

    /// Length-ignoring (scalar) template.
    #[must_use]
    pub const fn is_lig(self) -> bool {
        matches!(
            self,
            VectorEncoding::Vex(VecLen::Ignored) | VectorEncoding::Evex(VecLen::Ignored)
        )
    }
}

/// VEX.W / EVEX.W policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VexW {
    /// W ignored; encoded as 0 unless a 64-bit GPR operand asks for 1.
    Ignore,
    /// W = 0.
    W0,
    /// W = 1.
    W1,
}

/// Write-mask support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Masking {
    /// No `{k}` allowed.
    None,
    /// `{k}` merging only.
    Merging,
    /// `{k}` merging or `{z}` zeroing.
    Dynamic,
    /// `{k}` required (gather/scatter).
    Required,
}

/// Static rounding / SAE support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rounding {
    /// Neither.
    None,
    /// `{sae}` only.
    Sae,
    /// `{rn,rd,ru,rz}-sae` and `{sae}`.
    Static,
}

/// Scaling applied to an EVEX 8-bit displacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Disp8Shift {
    /// No compression (legacy and VEX).
    None,
    /// Fixed scale, log2 bytes.
    Scale(u8),
    /// Full vector length, or the element under broadcast.
    Vector,
}

/// VSIB index register width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Vsib {
    /// Ordinary SIB.
    None,
    /// XMM index.
    Xmm,
    /// YMM index.
    Ymm,
    /// ZMM index.
    Zmm,
}

/// Code-mode restriction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModeReq {
    /// Any mode.
    Any,
    /// 64-bit mode only.
    Only64,
    /// Not in 64-bit mode.
    No64,
}

/// Branch behavior of a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JumpKind {
    /// Not a direct branch.
    None,
    /// `jmp`/`jcc`: short form that relaxation may widen.
    Relaxable,
    /// `loop`/`jecxz`: 8-bit displacement only.
    Byte,
    /// `call`: word/dword displacement, never relaxed.
    Dword,
    /// `ljmp $seg, $off`.
    InterSegment,
}

bitflags! {
    /// Matching and encoding modifiers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Modifiers: u32 {
        /// Operands may be reversed with an opcode direction flip.
        const D = 1 << 0;
        /// Opcode bit 0 (bit 3 for short forms) selects non-byte size.
        const W = 1 << 1;
        /// Register number in the low opcode bits.
        const SHORT_FORM = 1 << 2;
        /// ModRM byte present.
        const MODRM = 1 << 3;
        /// First and last operands may be swapped without an opcode change.
        const COMMUTATIVE = 1 << 4;
        /// The base opcode is the load (register-destination) direction.
        const LOAD = 1 << 5;
        /// Register and sized memory operands must agree in size.
        const CHECK_OPERAND_SIZE = 1 << 6;
        const NO_BSUF = 1 << 7;
        const NO_WSUF = 1 << 8;
        const NO_LSUF = 1 << 9;
        const NO_QSUF = 1 << 10;
        /// Operand size defaults to the stack width when unsized.
        const DEFAULT_SIZE = 1 << 12;
        /// 64-bit operand size is implicit; never emit REX.W.
        const NO_REX64 = 1 << 13;
        /// `lock` allowed with a memory destination.
        const LOCKABLE = 1 << 14;
        /// AT&T syntax only.
        const ATT_ONLY = 1 << 15;
        /// Intel syntax only.
        const INTEL_ONLY = 1 << 16;
        /// x87 memory form whose suffix sizes the memory operand.
        const FLOAT_MEM = 1 << 17;
        /// The general-register operand goes in ModRM.rm even though the
        /// slot admits no memory (`mov %cr0, %eax`).
        const REG_MEM = 1 << 18;
        /// String instruction: `rep` prefixes allowed.
        const REP = 1 << 19;
        /// No operand size needs to be determined.
        const IGNORE_SIZE = 1 << 20;
        /// Implicit 16-bit address size (`jcxz`).
        const ADDR16 = 1 << 21;
        /// Implicit 32-bit address size (`jecxz`).
        const ADDR32 = 1 << 22;

        const NO_SUF = Self::NO_BSUF.bits()
            | Self::NO_WSUF.bits()
            | Self::NO_LSUF.bits()
            | Self::NO_QSUF.bits();
        const NO_BQSUF = Self::NO_BSUF.bits() | Self::NO_QSUF.bits();
    }
}

/// One encoding form of a mnemonic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstructionTemplate {
    /// Operand slots in AT&T order.
    pub operands: &'static [OperandType],
    /// Opcode bytes after any escape, big-endian in the low bytes.
    pub opcode: u32,
    /// Number of opcode bytes.
    pub opcode_len: u8,
    /// Opcode map.
    pub space: OpcodeSpace,
    /// Fixed ModRM.reg value (`/digit`).
    pub extension: Option<u8>,
    /// Mandatory prefix.
    pub prefix: MandatoryPrefix,
    /// Modifier flags.
    pub modifiers: Modifiers,
    /// Fixed operand size.
    pub size: SizeClass,
    /// Legacy, VEX or EVEX.
    pub encoding: VectorEncoding,
    /// W policy for VEX/EVEX.
    pub vex_w: VexW,
    /// Operand index (AT&T order) encoded in `vvvv`.
    pub vvvv: Option<u8>,
    /// Write-mask support.
    pub masking: Masking,
    /// Broadcast element size in bytes.
    pub broadcast: Option<u8>,
    /// Static rounding / SAE.
    pub rounding: Rounding,
    /// EVEX disp8 scaling.
    pub disp8: Disp8Shift,
    /// VSIB index width.
    pub vsib: Vsib,
    /// Required CPU features.
    pub cpu: CpuFeatures,
    /// Mode restriction.
    pub mode: ModeReq,
    /// 64-bit ISA restriction, checked in 64-bit mode.
    pub isa64: Option<Isa64>,
    /// Branch behavior.
    pub jump: JumpKind,
}

impl InstructionTemplate {
    /// A legacy template with the given opcode bytes and no operands.
    #[must_use]
    pub const fn op(opcode: u32) -> Self {
        let opcode_len = if opcode > 0xFFFF {
            3
        } else if opcode > 0xFF {
            2
        } else {
            1
        };
        Self {
            operands: &[],
            opcode,
            opcode_len,
            space: OpcodeSpace::Base,
            extension: None,
            prefix: MandatoryPrefix::None,
            modifiers: Modifiers::empty(),
            size: SizeClass::Any,
            encoding: VectorEncoding::Legacy,
            vex_w: VexW::Ignore,
            vvvv: None,
            masking: Masking::None,
            broadcast: None,
            rounding: Rounding::None,
            disp8: Disp8Shift::None,
            vsib: Vsib::None,
            cpu: CpuFeatures::empty(),
            mode: ModeReq::Any,
            isa64: None,
            jump: JumpKind::None,
        }
    }

    pub(crate) const fn ops(mut self, operands: &'static [OperandType]) -> Self {
        self.operands = operands;
        self
    }

    pub(crate) const fn space(mut self, space: OpcodeSpace) -> Self {
        self.space = space;
        self
    }

    pub(crate) const fn map0f(self) -> Self {
        self.space(OpcodeSpace::Map0F)
    }

    pub(crate) const fn map0f38(self) -> Self {
        self.space(OpcodeSpace::Map0F38)
    }

    pub(crate) const fn map0f3a(self) -> Self {
        self.space(OpcodeSpace::Map0F3A)
    }

    /// `/digit`: implies a ModRM byte.
    pub(crate) const fn digit(mut self, d: u8) -> Self {
        self.extension = Some(d);
        self.modifiers = self.modifiers.union(Modifiers::MODRM);
        self
    }

    pub(crate) const fn modrm(self) -> Self {
        self.m(Modifiers::MODRM)
    }

    pub(crate) const fn m(mut self, m: Modifiers) -> Self {
        self.modifiers = self.modifiers.union(m);
        self
    }

    pub(crate) const fn p66(mut self) -> Self {
        self.prefix = MandatoryPrefix::P66;
        self
    }

    pub(crate) const fn pf3(mut self) -> Self {
        self.prefix = MandatoryPrefix::PF3;
        self
    }

    pub(crate) const fn pf2(mut self) -> Self {
        self.prefix = MandatoryPrefix::PF2;
        self
    }

    pub(crate) const fn size(mut self, size: SizeClass) -> Self {
        self.size = size;
        self
    }

    pub(crate) const fn vex(mut self, len: VecLen) -> Self {
        self.encoding = VectorEncoding::Vex(len);
        self.modifiers = self.modifiers.union(Modifiers::NO_SUF);
        self
    }

    pub(crate) const fn evex(mut self, len: VecLen) -> Self {
        self.encoding = VectorEncoding::Evex(len);
        self.modifiers = self.modifiers.union(Modifiers::NO_SUF);
        if matches!(self.disp8, Disp8Shift::None) {
            self.disp8 = Disp8Shift::Vector;
        }
        self
    }

    pub(crate) const fn w0(mut self) -> Self {
        self.vex_w = VexW::W0;
        self
    }

    pub(crate) const fn w1(mut self) -> Self {
        self.vex_w = VexW::W1;
        self
    }

    pub(crate) const fn vvvv(mut self, operand: u8) -> Self {
        self.vvvv = Some(operand);
        self
    }

    pub(crate) const fn mask(mut self, masking: Masking) -> Self {
        self.masking = masking;
        self
    }

    pub(crate) const fn bcst(mut self, element_bytes: u8) -> Self {
        self.broadcast = Some(element_bytes);
        self
    }

    pub(crate) const fn rounding(mut self, r: Rounding) -> Self {
        self.rounding = r;
        self
    }

    pub(crate) const fn disp8(mut self, shift: Disp8Shift) -> Self {
        self.disp8 = shift;
        self
    }

    pub(crate) const fn vsib(mut self, v: Vsib) -> Self {
        self.vsib = v;
        self
    }

    pub(crate) const fn cpu(mut self, cpu: CpuFeatures) -> Self {
        self.cpu = self.cpu.union(cpu);
        self
    }

    pub(crate) const fn only64(mut self) -> Self {
        self.mode = ModeReq::Only64;
        self
    }

    pub(crate) const fn no64(mut self) -> Self {
        self.mode = ModeReq::No64;
        self
    }

    pub(crate) const fn isa(mut self, isa: Isa64) -> Self {
        self.isa64 = Some(isa);
        self
    }

    pub(crate) const fn jump(mut self, kind: JumpKind) -> Self {
        self.jump = kind;
        self
    }

    /// Number of operands.
    #[must_use]
    pub const fn operand_count(&self) -> usize {
        self.operands.len()
    }

    /// Whether a modifier is set.
    #[must_use]
    pub const fn has(&self, m: Modifiers) -> bool {
        self.modifiers.contains(m)
    }

    /// Whether the suffix character is banned.
    #[must_use]
    pub const fn bans_suffix(&self, suffix: u8) -> bool {
        let ban = match suffix {
            b'b' => Modifiers::NO_BSUF,
            b'w' => Modifiers::NO_WSUF,
            b'l' => Modifiers::NO_LSUF,
            b'q' => Modifiers::NO_QSUF,
            b's' | b't' => return !self.modifiers.contains(Modifiers::FLOAT_MEM),
            _ => return true,
        };
        self.modifiers.contains(ban)
    }

    /// Whether the operand size must be known to encode this template: a
    /// `W` opcode, or a general-register/memory slot admitting more than one
    /// integer size.
    #[must_use]
    pub fn needs_operand_size(&self) -> bool {
        if self.has(Modifiers::IGNORE_SIZE) || self.size != SizeClass::Any {
            return false;
        }
        self.has(Modifiers::W)
            || self.operands.iter().any(|t| {
                let ints = t
                    .sizes()
                    .intersection(TypeFlags::WORD | TypeFlags::DWORD | TypeFlags::QWORD);
                (t.class() == RegClass::Gpr || t.is_memory()) && ints.bits().count_ones() > 1
            })
    }
}

/// A mnemonic and its ordered templates.
#[derive(Debug, Clone, Copy)]
pub struct Group {
    /// Lower-case mnemonic.
    pub name: &'static str,
    /// Templates in match order.
    pub templates: &'static [InstructionTemplate],
}

/// Find the template group of a lower-case mnemonic.
///
/// # Examples
///
/// ```rust
/// use asm_x86::template::lookup;
///
/// let g = lookup("mov").unwrap();
/// assert!(g.templates.len() > 3);
/// assert!(lookup("movx").is_none());
/// ```
#[must_use]
pub fn lookup(mnemonic: &str) -> Option<&'static Group> {
    if let Ok(i) = GROUPS.binary_search_by(|g| g.name.cmp(mnemonic)) {
        return Some(&GROUPS[i]);
    }
    let (family, cc) = if let Some(cc) = mnemonic.strip_prefix("cmov") {
        (&CMOVCC, cc)
    } else if let Some(cc) = mnemonic.strip_prefix("set") {
        (&SETCC, cc)
    } else if let Some(cc) = mnemonic.strip_prefix('j') {
        (&JCC, cc)
    } else {
        return None;
    };
    condition_code(cc).map(|code| &family[code as usize])
}

/// Condition code of a `jcc` template (`0x70 + cc`).
#[must_use]
pub fn jcc_condition(t: &InstructionTemplate) -> Option<u8> {
    (t.jump == JumpKind::Relaxable && (0x70..0x80).contains(&t.opcode)).then(|| (t.opcode - 0x70) as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_are_sorted_and_unique() {
        for pair in GROUPS.windows(2) {
            assert!(
                pair[0].name < pair[1].name,
                "group table out of order at {} / {}",
                pair[0].name,
                pair[1].name
            );
        }
    }

    #[test]
    fn every_group_has_templates() {
        for g in GROUPS.iter().chain(JCC.iter()).chain(SETCC.iter()).chain(CMOVCC.iter()) {
            assert!(!g.templates.is_empty(), "{}", g.name);
            assert_eq!(g.name, g.name.to_ascii_lowercase());
        }
    }

    #[test]
    fn operand_counts_within_limit() {
        for g in GROUPS {
            for t in g.templates {
                assert!(t.operand_count() <= MAX_OPERANDS, "{}", g.name);
                if let Some(v) = t.vvvv {
                    assert!((v as usize) < t.operand_count(), "{}: vvvv index", g.name);
                }
            }
        }
    }

    #[test]
    fn vector_templates_have_no_legacy_suffix() {
        for g in GROUPS {
            for t in g.templates {
                if !matches!(t.encoding, VectorEncoding::Legacy) {
                    assert!(t.has(Modifiers::NO_SUF), "{}", g.name);
                }
            }
        }
    }

    #[test]
    fn evex_templates_require_avx512() {
        for g in GROUPS {
            for t in g.templates {
                if t.encoding.is_evex() {
                    assert!(t.cpu.intersects(
                        CpuFeatures::AVX512F | CpuFeatures::AVX512BW | CpuFeatures::AVX512DQ
                    ), "{}", g.name);
                }
            }
        }
    }

    #[test]
    fn opcode_length_from_value() {
        assert_eq!(InstructionTemplate::op(0x90).opcode_len, 1);
        assert_eq!(InstructionTemplate::op(0xD9EE).opcode_len, 2);
        assert_eq!(InstructionTemplate::op(0xAEE8).opcode_len, 2);
    }

    #[test]
    fn suffix_bans() {
        let t = InstructionTemplate::op(0x50).m(Modifiers::NO_BQSUF);
        assert!(t.bans_suffix(b'b'));
        assert!(t.bans_suffix(b'q'));
        assert!(!t.bans_suffix(b'l'));
        assert!(t.bans_suffix(b's'));
        assert!(t.bans_suffix(b'x'));
        let f = InstructionTemplate::op(0xD9).digit(0).m(Modifiers::FLOAT_MEM);
        assert!(!f.bans_suffix(b's'));
    }

    #[test]
    fn lookup_finds_groups() {
        assert!(lookup("add").is_some());
        assert!(lookup("vaddps").is_some());
        assert!(lookup("ADD").is_none());
        assert_eq!(lookup("jnz").unwrap().name, "jne");
        assert_eq!(lookup("setc").unwrap().name, "setb");
        assert_eq!(lookup("cmovnle").unwrap().name, "cmovg");
        assert!(lookup("jxx").is_none());
        assert!(lookup("set").is_none());
    }
}
