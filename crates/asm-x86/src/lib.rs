//! # asm-x86: a template-driven x86/x86-64 assembler core
//!
//! `asm-x86` turns x86 assembly text, in Intel or AT&T syntax, into
//! machine-code bytes. Every instruction is matched against a table of
//! templates whose operand slots are described by a bit-set algebra, then
//! encoded with the legacy, REX, VEX or EVEX prefix it needs. Branches
//! start short and grow until every displacement fits.
//!
//! ## Quick Start
//!
//! ```rust
//! use asm_x86::{assemble, CodeMode};
//!
//! let code = assemble("mov eax, 1", CodeMode::Code64).unwrap();
//! assert_eq!(code, vec![0xB8, 0x01, 0x00, 0x00, 0x00]);
//! ```
//!
//! ## Features
//!
//! - **Both syntaxes**: Intel and AT&T, switchable per statement block.
//! - **16, 32 and 64-bit code**: `.code16`/`.code32`/`.code64`.
//! - **AVX and AVX-512**: VEX and EVEX with masking, broadcast, rounding
//!   and compressed displacements.
//! - **`no_std` + `alloc`**: embeddable in firmware, kernels, JITs.
//! - **Labels & branch relaxation**: short/near selection, numeric local
//!   labels, optional padding of branches away from 32-byte boundaries.

#![cfg_attr(not(feature = "std"), no_std)]
#![forbid(unsafe_code)]
// ── Pedantic lint policy ─────────────────────────────────────────────────
// An encoder performs many narrowing / sign-changing casts between integer
// widths and uses dense hex literals without separators (0x0F38, 0xD8).
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_lossless,
    clippy::cast_possible_wrap,
    clippy::unreadable_literal,
    clippy::match_same_arms,
    clippy::redundant_closure_for_method_calls,
    clippy::bool_to_int_with_if,
    clippy::wildcard_imports,
    clippy::enum_glob_use,
    clippy::semicolon_if_nothing_returned,
    clippy::must_use_candidate,
    clippy::module_name_repetitions,
    clippy::uninlined_format_args,
    clippy::doc_markdown,
    clippy::similar_names,
    clippy::fn_params_excessive_bools,
    clippy::too_many_lines,
    clippy::single_match_else,
    clippy::manual_let_else,
    clippy::unnecessary_wraps,
    clippy::unused_self,
    clippy::map_unwrap_or,
    clippy::many_single_char_names,
    clippy::redundant_else,
    clippy::return_self_not_must_use,
    clippy::missing_errors_doc,
    clippy::needless_continue,
    clippy::struct_excessive_bools
)]

extern crate alloc;

/// The `Assembler` builder and `AssemblyResult`.
pub mod assembler;
/// AT&T operand syntax.
pub mod att;
/// Modes, syntaxes, CPU feature sets, branch-alignment policy and limits.
pub mod config;
/// Instruction encoder: legacy/REX/VEX/EVEX prefixes, ModR/M, SIB, immediates.
pub mod encoder;
/// Error types and source-span diagnostics.
pub mod error;
/// Constant expressions and symbol references.
pub mod expr;
/// Statement parsing: prefixes, mnemonic, suffix and operands.
pub mod insn;
/// Intel operand syntax.
pub mod intel;
/// Zero-copy lexer (tokenizer) with span tracking.
pub mod lexer;
/// Template selection.
pub mod matcher;
/// Syntax-neutral operand representation.
pub mod operand;
/// Operand-type bit-set algebra.
pub mod optype;
/// Register names and properties.
pub mod register;
/// Fragment layout: branch relaxation, padding and fixups.
pub mod relax;
/// The instruction template table.
pub mod template;

// Re-exports
pub use assembler::{Assembler, AssemblyResult};
pub use config::{
    AssemblerConfig, BranchAlignment, BranchKinds, CheckLevel, CodeMode, CpuFeatures, Isa64, OptLevel,
    ResourceLimits, Syntax,
};
pub use error::{AsmError, EncodeError, MatchError, Span, Warning};
pub use relax::Relocation;

use alloc::vec::Vec;

/// Assemble Intel-syntax source into machine code bytes.
///
/// Semicolons or newlines separate statements.
/// Labels are defined with a trailing colon: `loop:`
///
/// # Errors
///
/// Returns [`AsmError`] if the input contains syntax errors, unknown
/// mnemonics, operands no template accepts, undefined byte-branch
/// targets, or any other encoding issue.
///
/// # Examples
///
/// ```rust
/// use asm_x86::{assemble, CodeMode};
///
/// let code = assemble("push rbp; mov rbp, rsp", CodeMode::Code64).unwrap();
/// assert_eq!(code, vec![0x55, 0x48, 0x89, 0xE5]);
/// ```
pub fn assemble(source: &str, mode: CodeMode) -> Result<Vec<u8>, AsmError> {
    let mut asm = Assembler::new(mode);
    asm.emit(source)?;
    let result = asm.finish()?;
    Ok(result.into_bytes())
}

/// Assemble with an explicit configuration, keeping labels, relocations
/// and warnings.
///
/// # Errors
///
/// Returns [`AsmError`] on assembly failure (see [`assemble`] for details).
///
/// # Examples
///
/// ```rust
/// use asm_x86::{assemble_with, AssemblerConfig, CodeMode, Syntax};
///
/// let config = AssemblerConfig {
///     syntax: Syntax::Att,
///     ..AssemblerConfig::for_mode(CodeMode::Code32)
/// };
/// let result = assemble_with("start: movl $1, %eax", config).unwrap();
/// assert_eq!(result.bytes(), &[0xB8, 0x01, 0x00, 0x00, 0x00]);
/// assert_eq!(result.label_address("start"), Some(0));
/// ```
pub fn assemble_with(source: &str, config: AssemblerConfig) -> Result<AssemblyResult, AsmError> {
    let mut asm = Assembler::with_config(config);
    asm.emit(source)?;
    asm.finish()
}
