//! Register table: name lookup, encoding numbers, operand types and
//! availability per code mode and CPU feature set.

use core::fmt;

use crate::config::{CodeMode, CpuFeatures};
use crate::optype::{Instance, OperandType, RegClass, TypeFlags};

/// Register family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RegKind {
    /// `al`..`dil`, `r8b`..`r15b` (4..7 are `spl`..`dil`).
    Gpr8,
    /// `ah`, `ch`, `dh`, `bh` (numbers 4..7).
    Gpr8High,
    /// 16-bit general purpose.
    Gpr16,
    /// 32-bit general purpose.
    Gpr32,
    /// 64-bit general purpose.
    Gpr64,
    /// `es cs ss ds fs gs`.
    Segment,
    /// `cr0`..`cr15`.
    Control,
    /// `dr0`..`dr15`.
    Debug,
    /// `st(0)`..`st(7)`.
    Fpu,
    /// `mm0`..`mm7`.
    Mmx,
    /// `xmm0`..`xmm31`.
    Xmm,
    /// `ymm0`..`ymm31`.
    Ymm,
    /// `zmm0`..`zmm31`.
    Zmm,
    /// `k0`..`k7`.
    Mask,
    /// `bnd0`..`bnd3`.
    Bound,
    /// `tmm0`..`tmm7`.
    Tmm,
    /// `rip` / `eip` pseudo base register (size via [`Register::size_bits`]).
    Ip,
    /// `riz` / `eiz` pseudo index register meaning "no index".
    IndexZero,
}

/// A register: a family and an encoding number.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Register {
    kind: RegKind,
    num: u8,
    /// Width for `Ip`/`IndexZero` (32 or 64); unused otherwise.
    width: u8,
}

const GPR8: [&str; 8] = ["al", "cl", "dl", "bl", "spl", "bpl", "sil", "dil"];
const GPR8_HIGH: [&str; 4] = ["ah", "ch", "dh", "bh"];
const GPR16: [&str; 8] = ["ax", "cx", "dx", "bx", "sp", "bp", "si", "di"];
const GPR32: [&str; 8] = ["eax", "ecx", "edx", "ebx", "esp", "ebp", "esi", "edi"];
const GPR64: [&str; 8] = ["rax", "rcx", "rdx", "rbx", "rsp", "rbp", "rsi", "rdi"];
const SEGMENT: [&str; 6] = ["es", "cs", "ss", "ds", "fs", "gs"];

/// Numbered families, longest prefix first so `mm` does not shadow `xmm`.
const NUMBERED: [(&str, RegKind, u8); 9] = [
    ("xmm", RegKind::Xmm, 32),
    ("ymm", RegKind::Ymm, 32),
    ("zmm", RegKind::Zmm, 32),
    ("tmm", RegKind::Tmm, 8),
    ("bnd", RegKind::Bound, 4),
    ("mm", RegKind::Mmx, 8),
    ("cr", RegKind::Control, 16),
    ("dr", RegKind::Debug, 16),
    ("k", RegKind::Mask, 8),
];

impl Register {
    /// `rip`.
    pub const RIP: Register = Register::pseudo(RegKind::Ip, 64);
    /// `eip`.
    pub const EIP: Register = Register::pseudo(RegKind::Ip, 32);

    /// Build a register from family and number. Returns `None` when the
    /// number is out of range for the family.
    #[must_use]
    pub const fn new(kind: RegKind, num: u8) -> Option<Register> {
        let limit = match kind {
            RegKind::Gpr8 | RegKind::Gpr16 | RegKind::Gpr32 | RegKind::Gpr64 => 16,
            RegKind::Gpr8High => 8,
            RegKind::Segment => 6,
            RegKind::Control | RegKind::Debug => 16,
            RegKind::Fpu | RegKind::Mmx | RegKind::Mask | RegKind::Tmm => 8,
            RegKind::Xmm | RegKind::Ymm | RegKind::Zmm => 32,
            RegKind::Bound => 4,
            RegKind::Ip | RegKind::IndexZero => 1,
        };
        if num >= limit || (matches!(kind, RegKind::Gpr8High) && num < 4) {
            return None;
        }
        let width = match kind {
            RegKind::Ip | RegKind::IndexZero => 64,
            _ => 0,
        };
        Some(Register { kind, num, width })
    }

    const fn pseudo(kind: RegKind, width: u8) -> Register {
        Register {
            kind,
            num: match kind {
                RegKind::IndexZero => 4,
                _ => 5,
            },
            width,
        }
    }

    /// Look a register up by name, case-insensitively, without a `%`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use asm_x86::register::{Register, RegKind};
    ///
    /// let r = Register::from_name("R13D").unwrap();
    /// assert_eq!(r.kind(), RegKind::Gpr32);
    /// assert_eq!(r.num(), 13);
    /// assert_eq!(Register::from_name("st(3)").unwrap().num(), 3);
    /// assert!(Register::from_name("xmm32").is_none());
    /// ```
    #[must_use]
    pub fn from_name(name: &str) -> Option<Register> {
        let mut buf = [0u8; 16];
        let lower = to_lower_buf(name, &mut buf)?;

        for (table, kind, base) in [
            (&GPR8[..], RegKind::Gpr8, 0u8),
            (&GPR8_HIGH[..], RegKind::Gpr8High, 4),
            (&GPR16[..], RegKind::Gpr16, 0),
            (&GPR32[..], RegKind::Gpr32, 0),
            (&GPR64[..], RegKind::Gpr64, 0),
            (&SEGMENT[..], RegKind::Segment, 0),
        ] {
            if let Some(i) = table.iter().position(|n| *n == lower) {
                return Register::new(kind, base + i as u8);
            }
        }

        match lower {
            "rip" => return Some(Register::RIP),
            "eip" => return Some(Register::EIP),
            "riz" => return Some(Register::pseudo(RegKind::IndexZero, 64)),
            "eiz" => return Some(Register::pseudo(RegKind::IndexZero, 32)),
            "st" => return Register::new(RegKind::Fpu, 0),
            _ => {}
        }

        if let Some(rest) = lower.strip_prefix("st(") {
            let digits = rest.strip_suffix(')')?;
            return Register::new(RegKind::Fpu, parse_small(digits.trim())?);
        }

        // r8..r15 with optional b/l/w/d width suffix.
        if let Some(rest) = lower.strip_prefix('r') {
            let (digits, kind) = match rest.as_bytes().last() {
                Some(b'b' | b'l') => (&rest[..rest.len() - 1], RegKind::Gpr8),
                Some(b'w') => (&rest[..rest.len() - 1], RegKind::Gpr16),
                Some(b'd') => (&rest[..rest.len() - 1], RegKind::Gpr32),
                _ => (rest, RegKind::Gpr64),
            };
            if let Some(n) = parse_small(digits) {
                if (8..16).contains(&n) {
                    return Register::new(kind, n);
                }
                return None;
            }
        }

        for (prefix, kind, _) in NUMBERED {
            if let Some(digits) = lower.strip_prefix(prefix) {
                return Register::new(kind, parse_small(digits)?);
            }
        }
        None
    }

    /// Register family.
    #[must_use]
    pub const fn kind(&self) -> RegKind {
        self.kind
    }

    /// Full encoding number (0..31).
    #[must_use]
    pub const fn num(&self) -> u8 {
        self.num
    }

    /// Low three bits used in ModRM, SIB and short-form opcodes.
    #[must_use]
    pub const fn code(&self) -> u8 {
        self.num & 7
    }

    /// Needs REX.R/X/B (or the inverted VEX/EVEX bit).
    #[must_use]
    pub const fn is_extended(&self) -> bool {
        self.num & 8 != 0
    }

    /// Needs EVEX.R'/V'/X (registers 16..31).
    #[must_use]
    pub const fn is_evex_extended(&self) -> bool {
        self.num & 16 != 0
    }

    /// `spl`/`bpl`/`sil`/`dil` and `r8b`+: only addressable with a REX prefix.
    #[must_use]
    pub const fn requires_rex(&self) -> bool {
        matches!(self.kind, RegKind::Gpr8) && self.num >= 4
    }

    /// `ah`/`ch`/`dh`/`bh`: not addressable with a REX prefix.
    #[must_use]
    pub const fn is_high_byte(&self) -> bool {
        matches!(self.kind, RegKind::Gpr8High)
    }

    /// General purpose register of any width.
    #[must_use]
    pub const fn is_gpr(&self) -> bool {
        matches!(
            self.kind,
            RegKind::Gpr8 | RegKind::Gpr8High | RegKind::Gpr16 | RegKind::Gpr32 | RegKind::Gpr64
        )
    }

    /// XMM, YMM or ZMM.
    #[must_use]
    pub const fn is_vector(&self) -> bool {
        matches!(self.kind, RegKind::Xmm | RegKind::Ymm | RegKind::Zmm)
    }

    /// Width of a vector register in bytes, 0 otherwise.
    #[must_use]
    pub const fn vector_bytes(&self) -> u16 {
        match self.kind {
            RegKind::Xmm => 16,
            RegKind::Ymm => 32,
            RegKind::Zmm => 64,
            _ => 0,
        }
    }

    /// Register width in bits (0 for registers without a natural width).
    #[must_use]
    pub const fn size_bits(&self) -> u16 {
        match self.kind {
            RegKind::Gpr8 | RegKind::Gpr8High => 8,
            RegKind::Gpr16 | RegKind::Segment => 16,
            RegKind::Gpr32 => 32,
            RegKind::Gpr64 | RegKind::Mmx => 64,
            RegKind::Ip | RegKind::IndexZero => self.width as u16,
            RegKind::Fpu => 80,
            RegKind::Xmm | RegKind::Bound => 128,
            RegKind::Ymm => 256,
            RegKind::Zmm => 512,
            RegKind::Tmm => 8192,
            RegKind::Control | RegKind::Debug | RegKind::Mask => 0,
        }
    }

    /// Whether this register can serve as a base or index of the given
    /// address width.
    #[must_use]
    pub const fn is_address_reg(&self, bits: u16) -> bool {
        match self.kind {
            RegKind::Gpr16 => bits == 16,
            RegKind::Gpr32 => bits == 32,
            RegKind::Gpr64 => bits == 64,
            RegKind::Ip | RegKind::IndexZero => self.width as u16 == bits,
            _ => false,
        }
    }

    /// Stack-pointer or frame-pointer family (`sp`/`esp`/`rsp`, `bp`/`ebp`/`rbp`).
    #[must_use]
    pub const fn is_stack_based(&self) -> bool {
        matches!(self.kind, RegKind::Gpr16 | RegKind::Gpr32 | RegKind::Gpr64)
            && (self.num == 4 || self.num == 5)
    }

    /// The operand type of this register used as an operand.
    #[must_use]
    pub const fn op_type(&self) -> OperandType {
        let instance = match (self.kind, self.num) {
            (RegKind::Gpr8 | RegKind::Gpr16 | RegKind::Gpr32 | RegKind::Gpr64, 0) => Instance::Accum,
            (RegKind::Gpr8, 1) => Instance::RegC,
            (RegKind::Gpr16, 2) => Instance::RegD,
            (RegKind::Gpr16, 3) => Instance::RegB,
            (RegKind::Fpu, 0) => Instance::Accum,
            (RegKind::Xmm, 0) => Instance::Accum,
            _ => Instance::None,
        };
        let (class, size) = match self.kind {
            RegKind::Gpr8 | RegKind::Gpr8High => (RegClass::Gpr, TypeFlags::BYTE),
            RegKind::Gpr16 => (RegClass::Gpr, TypeFlags::WORD),
            RegKind::Gpr32 => (RegClass::Gpr, TypeFlags::DWORD),
            RegKind::Gpr64 => (RegClass::Gpr, TypeFlags::QWORD),
            RegKind::Segment => (RegClass::Segment, TypeFlags::empty()),
            RegKind::Control => (RegClass::Control, TypeFlags::empty()),
            RegKind::Debug => (RegClass::Debug, TypeFlags::empty()),
            RegKind::Fpu => (RegClass::Fpu, TypeFlags::empty()),
            RegKind::Mmx => (RegClass::Mmx, TypeFlags::QWORD),
            RegKind::Xmm => (RegClass::Simd, TypeFlags::XMMWORD),
            RegKind::Ymm => (RegClass::Simd, TypeFlags::YMMWORD),
            RegKind::Zmm => (RegClass::Simd, TypeFlags::ZMMWORD),
            RegKind::Mask => (RegClass::Mask, TypeFlags::empty()),
            RegKind::Bound => (RegClass::Bound, TypeFlags::empty()),
            RegKind::Tmm => (RegClass::Tmm, TypeFlags::TMMWORD),
            RegKind::Ip | RegKind::IndexZero => (RegClass::None, TypeFlags::empty()),
        };
        OperandType::new(class, instance, size)
    }

    /// Features that must be enabled for the register to exist.
    #[must_use]
    pub fn required_features(&self) -> CpuFeatures {
        let base = match self.kind {
            RegKind::Gpr32 | RegKind::Control | RegKind::Debug | RegKind::Ip | RegKind::IndexZero => {
                CpuFeatures::I386
            }
            RegKind::Gpr64 => CpuFeatures::LM,
            RegKind::Fpu => CpuFeatures::X87,
            RegKind::Mmx => CpuFeatures::MMX,
            RegKind::Xmm => CpuFeatures::SSE,
            RegKind::Ymm => CpuFeatures::AVX,
            RegKind::Zmm | RegKind::Mask => CpuFeatures::AVX512F,
            RegKind::Bound => CpuFeatures::MPX,
            RegKind::Tmm => CpuFeatures::AMX_TILE,
            RegKind::Segment if self.num >= 4 => CpuFeatures::I386,
            _ => CpuFeatures::empty(),
        };
        if self.is_vector() && self.is_evex_extended() {
            base | CpuFeatures::AVX512F
        } else {
            base
        }
    }

    /// Whether the register only exists in 64-bit mode.
    #[must_use]
    pub const fn requires_64bit(&self) -> bool {
        match self.kind {
            RegKind::Gpr64 | RegKind::Tmm => true,
            RegKind::Ip | RegKind::IndexZero => self.width == 64,
            RegKind::Gpr8 => self.num >= 4,
            RegKind::Gpr16 | RegKind::Gpr32 | RegKind::Control | RegKind::Debug => self.num >= 8,
            RegKind::Xmm | RegKind::Ymm | RegKind::Zmm => self.num >= 8,
            _ => false,
        }
    }

    /// Whether the register may be named in this mode with these features.
    #[must_use]
    pub fn is_available(&self, mode: CodeMode, cpu: CpuFeatures) -> bool {
        if self.requires_64bit() && !mode.is_64() {
            return false;
        }
        // eip/eiz are fine in 32-bit mode only as address registers; the
        // feature check covers the rest.
        cpu.contains(self.required_features())
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let n = self.num as usize;
        match self.kind {
            RegKind::Gpr8 if n < 8 => f.write_str(GPR8[n]),
            RegKind::Gpr8 => write!(f, "r{}b", n),
            RegKind::Gpr8High => f.write_str(GPR8_HIGH[n - 4]),
            RegKind::Gpr16 if n < 8 => f.write_str(GPR16[n]),
            RegKind::Gpr16 => write!(f, "r{}w", n),
            RegKind::Gpr32 if n < 8 => f.write_str(GPR32[n]),
            RegKind::Gpr32 => write!(f, "r{}d", n),
            RegKind::Gpr64 if n < 8 => f.write_str(GPR64[n]),
            RegKind::Gpr64 => write!(f, "r{}", n),
            RegKind::Segment => f.write_str(SEGMENT[n]),
            RegKind::Control => write!(f, "cr{}", n),
            RegKind::Debug => write!(f, "dr{}", n),
            RegKind::Fpu => write!(f, "st({})", n),
            RegKind::Mmx => write!(f, "mm{}", n),
            RegKind::Xmm => write!(f, "xmm{}", n),
            RegKind::Ymm => write!(f, "ymm{}", n),
            RegKind::Zmm => write!(f, "zmm{}", n),
            RegKind::Mask => write!(f, "k{}", n),
            RegKind::Bound => write!(f, "bnd{}", n),
            RegKind::Tmm => write!(f, "tmm{}", n),
            RegKind::Ip => f.write_str(if self.width == 64 { "rip" } else { "eip" }),
            RegKind::IndexZero => f.write_str(if self.width == 64 { "riz" } else { "eiz" }),
        }
    }
}

impl fmt::Debug for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self)
    }
}

/// Lowercases into a stack buffer. Names longer than the buffer are not
/// registers.
pub(crate) fn to_lower_buf<'b>(s: &str, buf: &'b mut [u8; 16]) -> Option<&'b str> {
    let bytes = s.as_bytes();
    if bytes.is_empty() || bytes.len() > buf.len() {
        return None;
    }
    for (dst, src) in buf.iter_mut().zip(bytes) {
        *dst = src.to_ascii_lowercase();
    }
    core::str::from_utf8(&buf[..bytes.len()]).ok()
}

fn parse_small(digits: &str) -> Option<u8> {
    if digits.is_empty() || digits.len() > 2 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    // "05" is not a register number.
    if digits.len() == 2 && digits.starts_with('0') {
        return None;
    }
    digits.parse().ok()
}
