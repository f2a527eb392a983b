//! Error types, warnings and source span tracking for diagnostics.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

/// Source location for diagnostics.
///
/// Tracks the line, column, byte offset, and length of a token or construct
/// in the original assembly source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Span {
    /// 1-based line number.
    pub line: u32,
    /// 1-based column number (byte offset within line).
    pub col: u32,
    /// 0-based byte offset from start of source.
    pub offset: usize,
    /// Byte length of the spanned region.
    pub len: usize,
}

impl Span {
    /// Create a new span.
    #[must_use]
    pub fn new(line: u32, col: u32, offset: usize, len: usize) -> Self {
        Self {
            line,
            col,
            offset,
            len,
        }
    }

    /// A dummy span for generated/internal constructs.
    #[must_use]
    pub fn dummy() -> Self {
        Self::default()
    }

    /// Shift a span produced for an operand substring so that it points
    /// into the full statement.
    #[must_use]
    pub fn offset_by(self, delta: usize) -> Self {
        Self {
            line: self.line,
            col: self.col + delta as u32,
            offset: self.offset + delta,
            len: self.len,
        }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

/// Why a mnemonic's template group produced no match.
///
/// Each candidate template is run through a fixed sequence of checks; a
/// rejection at a later check is a more specific diagnosis than one at an
/// earlier check. [`MatchError::rank`] is that ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MatchError {
    /// No template takes this many operands.
    NumberOfOperandsMismatch,
    /// The template exists only in the other syntax.
    UnsupportedSyntax,
    /// The AT&T suffix is not allowed for this template.
    InvalidInstructionSuffix,
    /// An operand's size is not among the template's admissible sizes.
    OperandSizeMismatch,
    /// An operand's shape (register class, memory, immediate) is wrong.
    OperandTypeMismatch,
    /// Register or memory operands that must agree in size do not.
    RegisterTypeMismatch,
    /// VSIB addressing with a wrong or missing vector index register.
    InvalidVsibAddress,
    /// Gather/scatter destination, index and mask are not distinct.
    InvalidVectorRegisterSet,
    /// `{1toN}` not supported or of the wrong width.
    UnsupportedBroadcast,
    /// `{k}`/`{z}` not supported here.
    UnsupportedMasking,
    /// `{er}`/`{sae}` not supported here.
    UnsupportedRoundingOrSae,
    /// `{vex}`/`{vex3}` requested but the template is not VEX-encodable.
    NoVexEncoding,
    /// `{evex}` requested but the template is not EVEX-encodable.
    NoEvexEncoding,
    /// Not valid in (or only valid in) 64-bit mode.
    Unsupported64Bit,
    /// The active CPU feature set or 64-bit ISA flavor lacks the template.
    UnsupportedOnArch,
}

impl MatchError {
    /// Precedence of this error when several candidates fail differently.
    ///
    /// Higher wins. Ties keep the first error seen.
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            MatchError::NumberOfOperandsMismatch => 0,
            MatchError::UnsupportedSyntax => 1,
            MatchError::InvalidInstructionSuffix => 2,
            MatchError::OperandSizeMismatch => 3,
            MatchError::OperandTypeMismatch => 4,
            MatchError::RegisterTypeMismatch => 5,
            MatchError::InvalidVsibAddress => 6,
            MatchError::InvalidVectorRegisterSet => 7,
            MatchError::UnsupportedBroadcast => 8,
            MatchError::UnsupportedMasking => 9,
            MatchError::UnsupportedRoundingOrSae => 10,
            MatchError::NoVexEncoding | MatchError::NoEvexEncoding => 11,
            MatchError::Unsupported64Bit => 12,
            MatchError::UnsupportedOnArch => 13,
        }
    }

    /// Whether `self` should replace `current` as the reported diagnosis.
    #[must_use]
    pub fn outranks(self, current: Option<MatchError>) -> bool {
        match current {
            None => true,
            Some(cur) => self.rank() > cur.rank(),
        }
    }
}

impl fmt::Display for MatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            MatchError::NumberOfOperandsMismatch => "number of operands mismatch",
            MatchError::UnsupportedSyntax => "unsupported syntax",
            MatchError::InvalidInstructionSuffix => "invalid instruction suffix",
            MatchError::OperandSizeMismatch => "operand size mismatch",
            MatchError::OperandTypeMismatch => "operand type mismatch",
            MatchError::RegisterTypeMismatch => "register type mismatch",
            MatchError::InvalidVsibAddress => "invalid VSIB address",
            MatchError::InvalidVectorRegisterSet => "invalid vector register set",
            MatchError::UnsupportedBroadcast => "unsupported broadcast",
            MatchError::UnsupportedMasking => "unsupported masking",
            MatchError::UnsupportedRoundingOrSae => "unsupported static rounding/sae",
            MatchError::NoVexEncoding => "no VEX encoding",
            MatchError::NoEvexEncoding => "no EVEX encoding",
            MatchError::Unsupported64Bit => "not supported in this code mode",
            MatchError::UnsupportedOnArch => "unsupported on the active architecture",
        };
        f.write_str(msg)
    }
}

/// Encoding-constraint violations found after a template was selected.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EncodeError {
    /// No suffix, no sized register and no sized memory operand.
    AmbiguousOperandSize,
    /// A register whose width contradicts the suffix.
    RegisterSizeConflict {
        /// The offending register.
        register: String,
        /// The suffix in effect.
        suffix: char,
    },
    /// `ah`/`bh`/`ch`/`dh` in an instruction that needs a REX prefix.
    HighByteWithRex,
    /// `lock` on a non-lockable template or without a memory destination.
    InvalidLockPrefix,
    /// A prefix that the instruction or the mode does not allow.
    InvalidPrefix {
        /// The prefix as written.
        prefix: String,
    },
    /// `{disp8}` requested for a displacement that does not fit.
    ForcedDisp8Overflow,
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodeError::AmbiguousOperandSize => f.write_str(
                "no instruction mnemonic suffix given and no register operands; can't size instruction",
            ),
            EncodeError::RegisterSizeConflict { register, suffix } => {
                write!(f, "incorrect register `{}' used with `{}' suffix", register, suffix)
            }
            EncodeError::HighByteWithRex => {
                f.write_str("can't encode high byte register in an instruction requiring REX prefix")
            }
            EncodeError::InvalidLockPrefix => f.write_str("expecting lockable instruction after `lock'"),
            EncodeError::InvalidPrefix { prefix } => write!(f, "invalid prefix `{}'", prefix),
            EncodeError::ForcedDisp8Overflow => f.write_str("displacement does not fit in {disp8}"),
        }
    }
}

/// Assembly error with source location and descriptive message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AsmError {
    /// Unknown mnemonic.
    #[error("{span}: unknown mnemonic '{mnemonic}'")]
    UnknownMnemonic {
        /// The mnemonic that was not recognized.
        mnemonic: String,
        /// Source location of the unknown mnemonic.
        span: Span,
    },

    /// Malformed operand or addressing form.
    #[error("{span}: invalid operand: {detail}")]
    InvalidOperand {
        /// Description of why the operand is invalid.
        detail: String,
        /// Source location of the operand.
        span: Span,
    },

    /// No template of the mnemonic's group accepts the operands.
    #[error("{span}: {kind} for `{mnemonic}'")]
    Match {
        /// The most specific reason found across all candidates.
        kind: MatchError,
        /// Mnemonic as written (without suffix).
        mnemonic: String,
        /// Source location of the statement.
        span: Span,
    },

    /// A selected template could not be encoded with these operands.
    #[error("{span}: {kind}")]
    Encode {
        /// What went wrong.
        kind: EncodeError,
        /// Source location of the statement.
        span: Span,
    },

    /// Immediate value exceeds the allowed range.
    #[error("{span}: immediate value {value} out of range [{min}..{max}]")]
    ImmediateOverflow {
        /// The immediate value that overflowed.
        value: i128,
        /// Minimum allowed value.
        min: i128,
        /// Maximum allowed value.
        max: i128,
        /// Source location of the immediate.
        span: Span,
    },

    /// Displacement value exceeds the addressing form's range.
    #[error("{span}: displacement {value} out of range for {bits}-bit field")]
    DisplacementOverflow {
        /// The displacement value.
        value: i64,
        /// Width of the displacement field in bits.
        bits: u8,
        /// Source location of the operand.
        span: Span,
    },

    /// Referenced label was never defined.
    #[error("{span}: undefined label '{label}'")]
    UndefinedLabel {
        /// The undefined label name.
        label: String,
        /// Source location of the reference.
        span: Span,
    },

    /// Label was defined more than once.
    #[error("{span}: duplicate label '{label}' (first defined at {first_span})")]
    DuplicateLabel {
        /// The duplicated label name.
        label: String,
        /// Source location of the duplicate definition.
        span: Span,
        /// Source location of the first definition.
        first_span: Span,
    },

    /// Branch target is out of range even after relaxation.
    #[error("{span}: branch target '{label}' out of range (displacement={disp}, max=±{max})")]
    BranchOutOfRange {
        /// The target label name.
        label: String,
        /// The actual displacement to the target.
        disp: i64,
        /// Maximum allowed displacement.
        max: i64,
        /// Source location of the branch instruction.
        span: Span,
    },

    /// Syntax error during lexing or parsing.
    #[error("{span}: {msg}")]
    Syntax {
        /// The syntax error message.
        msg: String,
        /// Source location of the syntax error.
        span: Span,
    },

    /// Branch relaxation did not converge within the allowed number of passes.
    #[error("assembly exceeded maximum of {max} relaxation passes (possible oscillation)")]
    RelaxationLimit {
        /// Maximum number of relaxation passes allowed.
        max: usize,
    },

    /// A configurable resource limit was exceeded (defense against DoS).
    #[error("resource limit exceeded: {resource} (limit: {limit})")]
    ResourceLimitExceeded {
        /// Human-readable name of the resource (e.g. "statements", "labels").
        resource: String,
        /// The configured limit that was exceeded.
        limit: usize,
    },

    /// Template table defect: a matched template cannot be encoded at all.
    #[error("{span}: internal error: {msg}")]
    Internal {
        /// What invariant broke.
        msg: String,
        /// Statement that exposed it.
        span: Span,
    },

    /// Multiple errors collected during assembly.
    #[error("{}", join_errors(.errors))]
    Multiple {
        /// The collected assembly errors.
        errors: Vec<AsmError>,
    },
}

impl AsmError {
    /// Whether the error must abort assembly instead of being collected.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AsmError::Internal { .. }
                | AsmError::ResourceLimitExceeded { .. }
                | AsmError::RelaxationLimit { .. }
        )
    }

    /// The matcher diagnosis, if this is a matching failure.
    #[must_use]
    pub fn match_kind(&self) -> Option<MatchError> {
        match self {
            AsmError::Match { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

fn join_errors(errors: &[AsmError]) -> String {
    use core::fmt::Write;
    let mut out = String::new();
    for (i, e) in errors.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let _ = write!(out, "{}", e);
    }
    out
}

/// A non-fatal diagnostic. Also forwarded to the `log` facade.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Warning {
    /// Human-readable message.
    pub message: String,
    /// Source location.
    pub span: Span,
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: warning: {}", self.span, self.message)
    }
}
