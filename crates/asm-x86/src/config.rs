//! Assembler configuration: code mode, syntax, CPU features, checking policy,
//! branch alignment and resource limits.

use bitflags::bitflags;

/// Active code-size mode (`.code16` / `.code32` / `.code64`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CodeMode {
    /// 16-bit real mode: default operand size 16, address size 16.
    Code16,
    /// 32-bit protected mode: default operand size 32, address size 32.
    Code32,
    /// 64-bit long mode: default operand size 32, address size 64.
    #[default]
    Code64,
}

impl CodeMode {
    /// Default address size in bits.
    #[must_use]
    pub const fn address_bits(self) -> u8 {
        match self {
            CodeMode::Code16 => 16,
            CodeMode::Code32 => 32,
            CodeMode::Code64 => 64,
        }
    }

    /// Whether this is 64-bit mode.
    #[must_use]
    pub const fn is_64(self) -> bool {
        matches!(self, CodeMode::Code64)
    }
}

/// Assembly syntax dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Syntax {
    /// Intel / GAS `.intel_syntax noprefix` style: `mov rax, 1`
    #[default]
    Intel,
    /// AT&T / GAS style: `movq $1, %rax`
    Att,
}

/// 64-bit ISA flavor. The two vendors disagree on a handful of forms
/// (far indirect branches with 64-bit operands, `sysenter` in long mode).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Isa64 {
    /// AMD64.
    #[default]
    Amd64,
    /// Intel 64.
    Intel64,
}

/// How strictly questionable-but-encodable operand combinations are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CheckLevel {
    /// Accept silently.
    None,
    /// Accept and emit a warning.
    #[default]
    Warning,
    /// Reject the statement.
    Error,
}

/// Optimization level for encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OptLevel {
    /// Encode exactly what was written.
    None,
    /// Prefer shortest encodings (default).
    #[default]
    Size,
}

bitflags! {
    /// CPU feature set consulted by the template matcher and the register
    /// parser.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct CpuFeatures: u64 {
        const I186 = 1 << 0;
        const I286 = 1 << 1;
        const I386 = 1 << 2;
        const I486 = 1 << 3;
        const I586 = 1 << 4;
        const I686 = 1 << 5;
        const CMOV = 1 << 6;
        /// Multi-byte `0f 1f /0` NOP.
        const NOPL = 1 << 7;
        const X87 = 1 << 8;
        const MMX = 1 << 9;
        const SSE = 1 << 10;
        const SSE2 = 1 << 11;
        const SSE3 = 1 << 12;
        const SSSE3 = 1 << 13;
        const SSE4_1 = 1 << 14;
        const SSE4_2 = 1 << 15;
        const POPCNT = 1 << 16;
        const LZCNT = 1 << 17;
        const BMI1 = 1 << 18;
        const BMI2 = 1 << 19;
        const MOVBE = 1 << 20;
        const AVX = 1 << 21;
        const AVX2 = 1 << 22;
        const FMA = 1 << 23;
        const F16C = 1 << 24;
        const AVX512F = 1 << 25;
        const AVX512CD = 1 << 26;
        const AVX512BW = 1 << 27;
        const AVX512DQ = 1 << 28;
        const AVX512VL = 1 << 29;
        const MPX = 1 << 30;
        const AMX_TILE = 1 << 31;
        /// Long mode (x86-64).
        const LM = 1 << 32;
        const SYSCALL = 1 << 33;

        const I8086 = 0;
        const I386_BASE = Self::I186.bits() | Self::I286.bits() | Self::I386.bits();
        const I686_BASE = Self::I386_BASE.bits()
            | Self::I486.bits()
            | Self::I586.bits()
            | Self::I686.bits()
            | Self::CMOV.bits()
            | Self::NOPL.bits()
            | Self::X87.bits();
        const X86_64_BASELINE = Self::I686_BASE.bits()
            | Self::MMX.bits()
            | Self::SSE.bits()
            | Self::SSE2.bits()
            | Self::LM.bits()
            | Self::SYSCALL.bits();
        const X86_64_V2 = Self::X86_64_BASELINE.bits()
            | Self::SSE3.bits()
            | Self::SSSE3.bits()
            | Self::SSE4_1.bits()
            | Self::SSE4_2.bits()
            | Self::POPCNT.bits();
        const X86_64_V3 = Self::X86_64_V2.bits()
            | Self::AVX.bits()
            | Self::AVX2.bits()
            | Self::FMA.bits()
            | Self::F16C.bits()
            | Self::BMI1.bits()
            | Self::BMI2.bits()
            | Self::LZCNT.bits()
            | Self::MOVBE.bits();
        const X86_64_V4 = Self::X86_64_V3.bits()
            | Self::AVX512F.bits()
            | Self::AVX512CD.bits()
            | Self::AVX512BW.bits()
            | Self::AVX512DQ.bits()
            | Self::AVX512VL.bits();
    }
}

impl Default for CpuFeatures {
    /// Everything enabled, like an assembler invoked without `-march`.
    fn default() -> Self {
        CpuFeatures::all()
    }
}

const FEATURE_NAMES: &[(&str, CpuFeatures)] = &[
    ("i8086", CpuFeatures::I8086),
    ("i186", CpuFeatures::I186),
    ("i286", CpuFeatures::I286),
    ("i386", CpuFeatures::I386_BASE),
    ("i686", CpuFeatures::I686_BASE),
    ("cmov", CpuFeatures::CMOV),
    ("nopl", CpuFeatures::NOPL),
    ("8087", CpuFeatures::X87),
    ("mmx", CpuFeatures::MMX),
    ("sse", CpuFeatures::SSE),
    ("sse2", CpuFeatures::SSE2),
    ("sse3", CpuFeatures::SSE3),
    ("ssse3", CpuFeatures::SSSE3),
    ("sse4.1", CpuFeatures::SSE4_1),
    ("sse4.2", CpuFeatures::SSE4_2),
    ("popcnt", CpuFeatures::POPCNT),
    ("lzcnt", CpuFeatures::LZCNT),
    ("bmi", CpuFeatures::BMI1),
    ("bmi2", CpuFeatures::BMI2),
    ("movbe", CpuFeatures::MOVBE),
    ("avx", CpuFeatures::AVX),
    ("avx2", CpuFeatures::AVX2),
    ("fma", CpuFeatures::FMA),
    ("f16c", CpuFeatures::F16C),
    ("avx512f", CpuFeatures::AVX512F),
    ("avx512cd", CpuFeatures::AVX512CD),
    ("avx512bw", CpuFeatures::AVX512BW),
    ("avx512dq", CpuFeatures::AVX512DQ),
    ("avx512vl", CpuFeatures::AVX512VL),
    ("mpx", CpuFeatures::MPX),
    ("amx-tile", CpuFeatures::AMX_TILE),
    ("lm", CpuFeatures::LM),
    ("x86-64", CpuFeatures::X86_64_BASELINE),
    ("x86-64-v2", CpuFeatures::X86_64_V2),
    ("x86-64-v3", CpuFeatures::X86_64_V3),
    ("x86-64-v4", CpuFeatures::X86_64_V4),
];

impl CpuFeatures {
    /// Build a feature set from `+`/`,`-separated names such as
    /// `"x86-64-v3+avx512f"`. Returns `None` on an unknown name.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use asm_x86::CpuFeatures;
    ///
    /// let f = CpuFeatures::from_names("i686,sse2").unwrap();
    /// assert!(f.contains(CpuFeatures::CMOV | CpuFeatures::SSE2));
    /// assert!(!f.contains(CpuFeatures::AVX));
    /// assert!(CpuFeatures::from_names("z80").is_none());
    /// ```
    #[must_use]
    pub fn from_names(names: &str) -> Option<CpuFeatures> {
        let mut out = CpuFeatures::empty();
        for name in names.split([',', '+']).map(str::trim).filter(|n| !n.is_empty()) {
            let (_, f) = FEATURE_NAMES
                .iter()
                .find(|(n, _)| n.eq_ignore_ascii_case(name))?;
            out |= *f;
        }
        Some(out)
    }

    /// The feature set implied by a code mode when nothing was configured.
    #[must_use]
    pub fn baseline_for(mode: CodeMode) -> CpuFeatures {
        match mode {
            CodeMode::Code16 => CpuFeatures::I8086,
            CodeMode::Code32 => CpuFeatures::I686_BASE,
            CodeMode::Code64 => CpuFeatures::X86_64_BASELINE,
        }
    }
}

bitflags! {
    /// Branch kinds that receive boundary padding.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct BranchKinds: u8 {
        /// Conditional jumps.
        const JCC = 1 << 0;
        /// Macro-fusible compare + jcc pairs.
        const FUSED = 1 << 1;
        /// Unconditional direct jumps.
        const JMP = 1 << 2;
        /// Direct calls.
        const CALL = 1 << 3;
        /// Returns.
        const RET = 1 << 4;
        /// Indirect jumps and calls.
        const INDIRECT = 1 << 5;
    }
}

/// Padding policy that keeps branches from crossing or ending at an aligned
/// boundary.
///
/// # Examples
///
/// ```rust
/// use asm_x86::{BranchAlignment, BranchKinds};
///
/// let policy = BranchAlignment::within_32b_boundaries();
/// assert_eq!(policy.boundary(), 32);
/// assert!(policy.kinds.contains(BranchKinds::JCC | BranchKinds::FUSED | BranchKinds::JMP));
/// assert!(!BranchAlignment::default().is_enabled());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BranchAlignment {
    /// log2 of the boundary; 0 disables padding.
    pub boundary_log2: u8,
    /// Which branches are padded.
    pub kinds: BranchKinds,
    /// Maximum segment-override prefixes added to one preceding instruction.
    pub max_prefix_size: u8,
}

impl BranchAlignment {
    /// 32-byte boundary for jcc, fused jcc and jmp, up to 5 prefixes.
    #[must_use]
    pub const fn within_32b_boundaries() -> Self {
        Self {
            boundary_log2: 5,
            kinds: BranchKinds::JCC.union(BranchKinds::FUSED).union(BranchKinds::JMP),
            max_prefix_size: 5,
        }
    }

    /// Boundary in bytes.
    #[must_use]
    pub const fn boundary(&self) -> u64 {
        1u64 << self.boundary_log2
    }

    /// Whether any padding is requested.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.boundary_log2 != 0 && !self.kinds.is_empty()
    }
}

/// Configurable resource limits for defense against denial-of-service.
///
/// When processing untrusted assembly input, these limits prevent pathological
/// inputs from consuming unbounded memory or CPU time. All limits default to
/// generous values that are sufficient for any reasonable assembly program.
///
/// # Examples
///
/// ```rust
/// use asm_x86::{Assembler, CodeMode, ResourceLimits};
///
/// let mut asm = Assembler::new(CodeMode::Code64);
/// asm.limits(ResourceLimits {
///     max_statements: 1_000,
///     max_labels: 100,
///     max_output_bytes: 4096,
///     max_errors: 16,
///     max_source_bytes: 64 * 1024,
/// });
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ResourceLimits {
    /// Maximum number of parsed statements (instructions + directives + labels).
    /// Default: 1,000,000.
    pub max_statements: usize,
    /// Maximum number of labels that can be defined. Default: 100,000.
    pub max_labels: usize,
    /// Maximum output size in bytes. Default: 16 MiB.
    pub max_output_bytes: usize,
    /// Maximum accumulated errors before bailing. Default: 64.
    pub max_errors: usize,
    /// Maximum input source bytes per `emit()` call. Default: 64 MiB.
    pub max_source_bytes: usize,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_statements: 1_000_000,
            max_labels: 100_000,
            max_output_bytes: 16 * 1024 * 1024,
            max_errors: 64,
            max_source_bytes: 64 * 1024 * 1024,
        }
    }
}

/// Everything the assembler consults besides the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AssemblerConfig {
    /// Initial code mode; `.code16/32/64` change it.
    pub mode: CodeMode,
    /// Initial syntax; `.intel_syntax`/`.att_syntax` change it.
    pub syntax: Syntax,
    /// Enabled instruction-set extensions.
    pub cpu: CpuFeatures,
    /// 64-bit ISA flavor.
    pub isa64: Isa64,
    /// Treatment of questionable register combinations (VSIB overlap).
    pub operand_check: CheckLevel,
    /// Encoding optimizations.
    pub opt_level: OptLevel,
    /// Branch boundary padding.
    pub branch_alignment: BranchAlignment,
    /// DoS limits.
    pub limits: ResourceLimits,
}

impl AssemblerConfig {
    /// Default configuration for a code mode.
    #[must_use]
    pub fn for_mode(mode: CodeMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_are_nested() {
        assert!(CpuFeatures::X86_64_V4.contains(CpuFeatures::X86_64_V3));
        assert!(CpuFeatures::X86_64_V3.contains(CpuFeatures::X86_64_V2));
        assert!(CpuFeatures::X86_64_V2.contains(CpuFeatures::X86_64_BASELINE));
        assert!(!CpuFeatures::X86_64_V3.contains(CpuFeatures::AVX512F));
    }

    #[test]
    fn from_names_accepts_presets_and_features() {
        let f = CpuFeatures::from_names("x86-64-v3 + avx512f").unwrap();
        assert!(f.contains(CpuFeatures::AVX2 | CpuFeatures::AVX512F));
        assert!(!f.contains(CpuFeatures::AVX512VL));
        assert_eq!(CpuFeatures::from_names(""), Some(CpuFeatures::empty()));
        assert_eq!(CpuFeatures::from_names("SSE4.1"), Some(CpuFeatures::SSE4_1));
    }

    #[test]
    fn default_cpu_is_everything() {
        assert_eq!(CpuFeatures::default(), CpuFeatures::all());
    }

    #[test]
    fn branch_alignment_default_is_disabled() {
        let policy = BranchAlignment::default();
        assert!(!policy.is_enabled());
        assert!(BranchAlignment::within_32b_boundaries().is_enabled());
    }

    #[test]
    fn baseline_follows_mode() {
        assert_eq!(CpuFeatures::baseline_for(CodeMode::Code16), CpuFeatures::empty());
        assert!(CpuFeatures::baseline_for(CodeMode::Code64).contains(CpuFeatures::LM));
    }

    #[test]
    fn config_for_mode_keeps_defaults() {
        let cfg = AssemblerConfig::for_mode(CodeMode::Code32);
        assert_eq!(cfg.mode, CodeMode::Code32);
        assert_eq!(cfg.syntax, Syntax::Intel);
        assert_eq!(cfg.operand_check, CheckLevel::Warning);
        assert_eq!(cfg.limits, ResourceLimits::default());
    }
}
