//! Public assembler API: builder pattern and one-shot assembly.
//!
//! The driver splits source text into statements, handles labels,
//! constants and the handful of directives, and feeds every instruction
//! through the matcher and the encoder into the layout arena.

use alloc::collections::BTreeMap;
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

use log::debug;

use crate::config::{AssemblerConfig, BranchAlignment, BranchKinds, CodeMode, CpuFeatures, OptLevel, ResourceLimits, Syntax};
use crate::encoder::{self, EncodeOptions, Encoded, Fixup};
use crate::error::{AsmError, Span, Warning};
use crate::expr::{parse_expr, Cursor, SymbolLookup, Value};
use crate::insn::{fits_either, parse_statement, ParseOptions, Statement};
use crate::lexer::{self, Token, TokenKind};
use crate::matcher::{self, MatchOptions};
use crate::relax::{local_label_name, Layout, Relocation};

/// The result of a successful assembly operation.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[must_use]
pub struct AssemblyResult {
    /// The assembled machine code.
    bytes: Vec<u8>,
    /// Label addresses (name → absolute address).
    labels: Vec<(String, u64)>,
    /// Every symbolic field in the output.
    relocations: Vec<Relocation>,
    /// Non-fatal diagnostics.
    warnings: Vec<Warning>,
    /// Base address used during assembly.
    base_address: u64,
}

impl AssemblyResult {
    /// Get the assembled bytes.
    ///
    /// # Examples
    ///
    /// ```
    /// use asm_x86::{Assembler, CodeMode};
    ///
    /// let mut asm = Assembler::new(CodeMode::Code64);
    /// asm.emit("nop")?;
    /// let result = asm.finish()?;
    /// assert_eq!(result.bytes(), &[0x90]);
    /// # Ok::<(), asm_x86::AsmError>(())
    /// ```
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consume and return the bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Get the byte count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether no bytes were produced.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Label addresses (name, absolute address), sorted by name. Numeric
    /// labels are not listed.
    ///
    /// # Examples
    ///
    /// ```
    /// use asm_x86::{Assembler, CodeMode};
    ///
    /// let mut asm = Assembler::new(CodeMode::Code64);
    /// asm.emit("start: nop\nend: ret")?;
    /// let result = asm.finish()?;
    /// assert_eq!(result.label_address("start"), Some(0));
    /// assert_eq!(result.label_address("end"), Some(1));
    /// assert_eq!(result.label_address("missing"), None);
    /// # Ok::<(), asm_x86::AsmError>(())
    /// ```
    #[must_use]
    pub fn labels(&self) -> &[(String, u64)] {
        &self.labels
    }

    /// Look up a label address by name.
    #[must_use]
    pub fn label_address(&self, name: &str) -> Option<u64> {
        self.labels.iter().find(|(n, _)| n == name).map(|&(_, addr)| addr)
    }

    /// Symbolic fields: patched ones (`resolved`) and those left for a
    /// linker.
    ///
    /// # Examples
    ///
    /// ```
    /// use asm_x86::{Assembler, CodeMode};
    ///
    /// let mut asm = Assembler::new(CodeMode::Code64);
    /// asm.emit("call puts")?;
    /// let result = asm.finish()?;
    /// assert_eq!(result.bytes(), &[0xE8, 0, 0, 0, 0]);
    /// let reloc = &result.relocations()[0];
    /// assert_eq!((reloc.offset, reloc.symbol.as_str(), reloc.addend), (1, "puts", -4));
    /// assert!(!reloc.resolved);
    /// # Ok::<(), asm_x86::AsmError>(())
    /// ```
    #[must_use]
    pub fn relocations(&self) -> &[Relocation] {
        &self.relocations
    }

    /// Warnings raised while assembling. They are also sent to the `log`
    /// facade as they happen.
    #[must_use]
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// The base address used during assembly.
    #[must_use]
    pub fn base_address(&self) -> u64 {
        self.base_address
    }
}

/// Constants and numeric labels visible to the expression parser.
struct Symbols<'a> {
    constants: &'a BTreeMap<String, i64>,
    numeric: &'a BTreeMap<u32, u32>,
}

impl SymbolLookup for Symbols<'_> {
    fn constant(&self, name: &str) -> Option<i64> {
        self.constants.get(name).copied()
    }

    fn numeric_label(&self, n: u32, forward: bool) -> Option<String> {
        let seen = self.numeric.get(&n).copied().unwrap_or(0);
        if forward {
            Some(local_label_name(n, seen + 1))
        } else {
            (seen > 0).then(|| local_label_name(n, seen))
        }
    }
}

/// Stateful assembler: feed it source with [`emit`](Assembler::emit), then
/// call [`finish`](Assembler::finish).
///
/// Errors in a statement are collected and the statement produces no
/// bytes; `finish` reports them all. Resource-limit and internal errors
/// abort `emit` at once.
///
/// # Examples
///
/// ```rust
/// use asm_x86::{Assembler, CodeMode};
///
/// let mut asm = Assembler::new(CodeMode::Code64);
/// asm.emit("push rbp").unwrap();
/// asm.emit("mov rbp, rsp").unwrap();
/// asm.emit("pop rbp").unwrap();
/// asm.emit("ret").unwrap();
/// let result = asm.finish().unwrap();
/// assert_eq!(result.bytes(), &[0x55, 0x48, 0x89, 0xE5, 0x5D, 0xC3]);
/// ```
#[derive(Debug)]
pub struct Assembler {
    config: AssemblerConfig,
    layout: Layout,
    constants: BTreeMap<String, i64>,
    /// Definitions seen so far per numeric label.
    numeric: BTreeMap<u32, u32>,
    /// Accumulated errors for multi-error mode.
    errors: Vec<AsmError>,
    warnings: Vec<Warning>,
    /// Running count of parsed statements so far.
    statement_count: usize,
    /// Fused-compare padding waiting to see whether a jcc follows.
    pending_fused: Option<usize>,
}

impl Assembler {
    /// An assembler for `mode` with the default configuration.
    pub fn new(mode: CodeMode) -> Self {
        Self::with_config(AssemblerConfig::for_mode(mode))
    }

    /// An assembler with an explicit configuration.
    pub fn with_config(config: AssemblerConfig) -> Self {
        Self {
            config,
            layout: Layout::new(config.mode, config.cpu),
            constants: BTreeMap::new(),
            numeric: BTreeMap::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
            statement_count: 0,
            pending_fused: None,
        }
    }

    /// Replace the whole configuration. Affects statements emitted later.
    pub fn config(&mut self, config: AssemblerConfig) -> &mut Self {
        self.config = config;
        self.layout.set_mode(config.mode);
        self.layout.set_cpu(config.cpu);
        self
    }

    /// The configuration in effect, including directive changes.
    #[must_use]
    pub fn current_config(&self) -> &AssemblerConfig {
        &self.config
    }

    /// Set the syntax dialect.
    pub fn syntax(&mut self, syntax: Syntax) -> &mut Self {
        self.config.syntax = syntax;
        self
    }

    /// Set the code mode, as `.code16`/`.code32`/`.code64` would.
    pub fn code_mode(&mut self, mode: CodeMode) -> &mut Self {
        self.config.mode = mode;
        self.layout.set_mode(mode);
        self
    }

    /// Restrict the instruction set.
    ///
    /// # Examples
    ///
    /// ```
    /// use asm_x86::{Assembler, AsmError, CodeMode, CpuFeatures};
    ///
    /// let mut asm = Assembler::new(CodeMode::Code64);
    /// asm.cpu(CpuFeatures::X86_64_V3);
    /// asm.emit("vaddps zmm0, zmm1, zmm2")?;
    /// assert!(matches!(asm.finish(), Err(AsmError::Match { .. })));
    /// # Ok::<(), AsmError>(())
    /// ```
    pub fn cpu(&mut self, cpu: CpuFeatures) -> &mut Self {
        self.config.cpu = cpu;
        self.layout.set_cpu(cpu);
        self
    }

    /// Set the optimization level.
    pub fn optimize(&mut self, level: OptLevel) -> &mut Self {
        self.config.opt_level = level;
        self
    }

    /// Pad branches away from aligned boundaries.
    pub fn branch_alignment(&mut self, policy: BranchAlignment) -> &mut Self {
        self.config.branch_alignment = policy;
        self
    }

    /// Set resource limits for defense against pathological inputs.
    pub fn limits(&mut self, limits: ResourceLimits) -> &mut Self {
        self.config.limits = limits;
        self
    }

    /// Set the base virtual address for the assembly.
    pub fn base_address(&mut self, addr: u64) -> &mut Self {
        self.layout.set_base_address(addr);
        self
    }

    /// Define an external label at a known absolute address.
    ///
    /// # Examples
    ///
    /// ```
    /// use asm_x86::{Assembler, CodeMode};
    ///
    /// let mut asm = Assembler::new(CodeMode::Code64);
    /// asm.define_external("puts", 0x4000);
    /// asm.emit("call puts")?;
    /// let result = asm.finish()?;
    /// assert_eq!(result.bytes(), &[0xE8, 0xFB, 0x3F, 0x00, 0x00]);
    /// # Ok::<(), asm_x86::AsmError>(())
    /// ```
    pub fn define_external(&mut self, name: &str, addr: u64) -> &mut Self {
        self.layout.define_external(name, addr);
        self
    }

    /// Define a named constant, as `name = value` would.
    pub fn define_constant(&mut self, name: &str, value: i64) -> &mut Self {
        self.constants.insert(String::from(name), value);
        self
    }

    /// Assemble source text. Can be called multiple times.
    ///
    /// # Errors
    ///
    /// Lexer errors and fatal errors (resource limits, internal defects)
    /// are returned at once. Statement errors are collected for
    /// [`finish`](Assembler::finish).
    pub fn emit(&mut self, source: &str) -> Result<&mut Self, AsmError> {
        let limits = self.config.limits;
        if source.len() > limits.max_source_bytes {
            return Err(limit_error("source bytes", limits.max_source_bytes));
        }
        let tokens = lexer::tokenize(source)?;
        let mut start = 0;
        for (i, tok) in tokens.iter().enumerate() {
            if matches!(tok.kind, TokenKind::Newline | TokenKind::Eof) {
                if i > start {
                    self.line(&tokens[start..i])?;
                }
                start = i + 1;
            }
        }
        Ok(self)
    }

    /// Finalize assembly: relax branches, resolve labels, return the result.
    ///
    /// # Errors
    ///
    /// The collected statement errors (one, or `Multiple`), then any
    /// layout error: undefined or out-of-range byte branches, relaxation
    /// not converging, or the output size limit.
    pub fn finish(mut self) -> Result<AssemblyResult, AsmError> {
        self.settle_fused(false);
        match self.errors.len() {
            0 => {}
            1 => return Err(self.errors.remove(0)),
            _ => return Err(AsmError::Multiple { errors: self.errors }),
        }
        let base_address = self.layout.base_address();
        let out = self.layout.finish_within(self.config.limits.max_output_bytes)?;
        Ok(AssemblyResult {
            bytes: out.bytes,
            labels: out.labels,
            relocations: out.relocations,
            warnings: self.warnings,
            base_address,
        })
    }

    // ── statements ─────────────────────────────────────────

    /// One source line: leading label definitions, then at most one
    /// statement.
    fn line(&mut self, mut tokens: &[Token<'_>]) -> Result<(), AsmError> {
        while let Some(tok) = tokens.first() {
            let name = match tok.kind {
                TokenKind::LabelDef => String::from(tok.text()),
                TokenKind::NumericLabelDef(n) => {
                    let seen = self.numeric.entry(n).or_insert(0);
                    *seen += 1;
                    local_label_name(n, *seen)
                }
                _ => break,
            };
            self.count_statement()?;
            self.label(&name, tok.span)?;
            tokens = &tokens[1..];
        }
        let Some(first) = tokens.first() else {
            return Ok(());
        };
        self.count_statement()?;
        let result = match first.kind {
            TokenKind::Directive => self.directive(tokens),
            TokenKind::Ident if tokens.get(1).is_some_and(|t| t.kind == TokenKind::Equals) => {
                self.settle_fused(false);
                let value = self.constant_expr(&tokens[2..], first.span)?;
                self.constants.insert(String::from(first.text()), value);
                Ok(())
            }
            _ => self.instruction(tokens),
        };
        match result {
            Ok(()) => Ok(()),
            Err(e) => self.record(e),
        }
    }

    fn count_statement(&mut self) -> Result<(), AsmError> {
        self.statement_count += 1;
        let max = self.config.limits.max_statements;
        if self.statement_count > max {
            return Err(limit_error("statements", max));
        }
        Ok(())
    }

    /// Collect a statement error, or pass a fatal one through.
    fn record(&mut self, err: AsmError) -> Result<(), AsmError> {
        if err.is_fatal() {
            return Err(err);
        }
        self.errors.push(err);
        let max = self.config.limits.max_errors;
        if self.errors.len() >= max {
            return Err(limit_error("errors", max));
        }
        Ok(())
    }

    fn label(&mut self, name: &str, span: Span) -> Result<(), AsmError> {
        let max = self.config.limits.max_labels;
        if self.layout.label_count() >= max {
            return Err(limit_error("labels", max));
        }
        self.settle_fused(false);
        match self.layout.add_label(name, span) {
            Ok(()) => Ok(()),
            Err(e) => self.record(e),
        }
    }

    fn instruction(&mut self, tokens: &[Token<'_>]) -> Result<(), AsmError> {
        let symbols = Symbols {
            constants: &self.constants,
            numeric: &self.numeric,
        };
        let opts = ParseOptions {
            mode: self.config.mode,
            syntax: self.config.syntax,
            cpu: self.config.cpu,
            opt_level: self.config.opt_level,
            symbols: &symbols,
        };
        let statement = parse_statement(tokens, &opts, &mut self.warnings);
        match statement {
            Ok(Statement::Insn(insn)) => {
                let bound = matcher::match_template(&insn, &MatchOptions::from(&self.config), &mut self.warnings)?;
                let encoded = encoder::encode(&insn, &bound, &EncodeOptions::from(&self.config), &mut self.warnings)?;
                self.place(encoded)
            }
            Ok(Statement::Prefixes { bytes, span }) => {
                self.settle_fused(false);
                self.layout.add_bytes(bytes, Vec::new(), span);
                self.check_output()
            }
            Err(e) => {
                self.settle_fused(false);
                Err(e)
            }
        }
    }

    /// Add an encoded instruction together with the padding fragments the
    /// branch-alignment policy asks for.
    fn place(&mut self, encoded: Encoded) -> Result<(), AsmError> {
        let policy = self.config.branch_alignment;
        let jcc = encoded.flow == Some(BranchKinds::JCC);
        let fused_with_previous = self.pending_fused.is_some() && jcc;
        self.settle_fused(jcc);

        if !policy.is_enabled() {
            self.layout.add_instruction(encoded);
            return self.check_output();
        }
        let fused = encoded.flow == Some(BranchKinds::FUSED);
        match encoded.flow {
            Some(_) if fused && policy.kinds.contains(BranchKinds::FUSED) => {
                self.pending_fused = Some(self.layout.add_fused_padding(policy.boundary_log2));
                self.layout.add_instruction(encoded);
            }
            Some(kind) if !fused => {
                if policy.kinds.contains(kind) && !fused_with_previous {
                    self.layout.add_branch_padding(policy.boundary_log2);
                }
                self.layout.add_instruction(encoded);
                self.layout.barrier();
            }
            _ => {
                if let Some(byte) = encoded.padding_prefix {
                    if policy.max_prefix_size > 0 {
                        self.layout
                            .add_branch_prefix(byte, policy.max_prefix_size, encoded.bytes.len());
                    }
                }
                self.layout.add_instruction(encoded);
            }
        }
        self.check_output()
    }

    /// Resolve a pending fused-compare pad: it stays live only when a jcc
    /// comes next.
    fn settle_fused(&mut self, jcc_follows: bool) {
        if let Some(pad) = self.pending_fused.take() {
            if !jcc_follows {
                self.layout.set_inert(pad);
            }
        }
    }

    fn check_output(&self) -> Result<(), AsmError> {
        let max = self.config.limits.max_output_bytes;
        if self.layout.min_size() > max as u64 {
            return Err(limit_error("output bytes", max));
        }
        Ok(())
    }

    // ── directives ─────────────────────────────────────────

    fn directive(&mut self, tokens: &[Token<'_>]) -> Result<(), AsmError> {
        self.settle_fused(false);
        self.layout.barrier();
        let head = &tokens[0];
        let span = head.span;
        let name = head.text().to_ascii_lowercase();
        let args = split_args(&tokens[1..]);
        match name.as_str() {
            ".code16" | ".code32" | ".code64" => {
                expect_no_args(&args, span)?;
                let mode = match name.as_str() {
                    ".code16" => CodeMode::Code16,
                    ".code32" => CodeMode::Code32,
                    _ => CodeMode::Code64,
                };
                debug!("{}: code mode {:?}", span, mode);
                self.code_mode(mode);
            }
            ".intel_syntax" | ".att_syntax" => {
                let word = match args.as_slice() {
                    [] => None,
                    [Some([t])] if t.kind == TokenKind::Ident => Some(t.text().to_ascii_lowercase()),
                    _ => return Err(syntax_error("expected `prefix' or `noprefix'", span)),
                };
                if !matches!(word.as_deref(), None | Some("prefix" | "noprefix")) {
                    return Err(syntax_error("expected `prefix' or `noprefix'", span));
                }
                self.config.syntax = if name == ".intel_syntax" {
                    Syntax::Intel
                } else {
                    Syntax::Att
                };
            }
            ".p2align" | ".balign" | ".align" => self.align(&name, &args, span)?,
            ".byte" => self.data_bytes(&args, span)?,
            ".equ" | ".set" => {
                let [Some([sym]), Some(expr)] = args.as_slice() else {
                    return Err(syntax_error("expected `name, value'", span));
                };
                if sym.kind != TokenKind::Ident {
                    return Err(syntax_error("expected a symbol name", sym.span));
                }
                let value = self.constant_expr(expr, sym.span)?;
                self.constants.insert(String::from(sym.text()), value);
            }
            _ => return Err(syntax_error(&format!("unknown directive `{}'", head.text()), span)),
        }
        Ok(())
    }

    fn align(&mut self, name: &str, args: &[Option<&[Token<'_>]>], span: Span) -> Result<(), AsmError> {
        if args.is_empty() || args.len() > 3 {
            return Err(syntax_error("expected alignment[, fill[, max]]", span));
        }
        let arg = |i: usize| -> Result<Option<i64>, AsmError> {
            match args.get(i).copied().flatten() {
                Some(toks) => self.constant_expr(toks, span).map(Some),
                None => Ok(None),
            }
        };
        let Some(raw) = arg(0)? else {
            return Err(syntax_error("missing alignment", span));
        };
        let alignment = if name == ".p2align" {
            if !(0..=MAX_ALIGN_LOG2).contains(&raw) {
                return Err(syntax_error("alignment too large", span));
            }
            1u64 << raw
        } else {
            let a = u64::try_from(raw).unwrap_or(0);
            if !a.is_power_of_two() {
                return Err(syntax_error("alignment is not a power of 2", span));
            }
            if a > 1u64 << MAX_ALIGN_LOG2 {
                return Err(syntax_error("alignment too large", span));
            }
            a
        };
        let fill = match arg(1)? {
            Some(v) if fits_either(v, 8) => Some(v as u8),
            Some(v) => return Err(byte_overflow(v, span)),
            None => None,
        };
        let max_skip = arg(2)?.map(|v| u64::try_from(v).unwrap_or(0));
        self.layout.add_alignment(alignment, fill, max_skip);
        Ok(())
    }

    fn data_bytes(&mut self, args: &[Option<&[Token<'_>]>], span: Span) -> Result<(), AsmError> {
        let mut bytes = Vec::with_capacity(args.len());
        let mut fixups = Vec::new();
        for arg in args {
            let Some(toks) = arg else {
                return Err(syntax_error("missing value", span));
            };
            let arg_span = toks.first().map_or(span, |t| t.span);
            match self.expr(toks, arg_span)? {
                Value::Constant(v) if fits_either(v, 8) => bytes.push(v as u8),
                Value::Constant(v) => return Err(byte_overflow(v, arg_span)),
                target @ Value::Symbol { .. } => {
                    fixups.push(Fixup {
                        offset: bytes.len(),
                        size: 1,
                        signed: false,
                        pc_relative: false,
                        to_end: 1,
                        target,
                        branch: false,
                        span: arg_span,
                    });
                    bytes.push(0);
                }
            }
        }
        self.layout.add_bytes(bytes, fixups, span);
        self.check_output()
    }

    fn expr(&self, tokens: &[Token<'_>], span: Span) -> Result<Value, AsmError> {
        let symbols = Symbols {
            constants: &self.constants,
            numeric: &self.numeric,
        };
        let mut cur = Cursor::new(tokens, span);
        let value = parse_expr(&mut cur, &symbols)?;
        if !cur.at_end() {
            return Err(syntax_error("junk at end of expression", cur.span()));
        }
        Ok(value)
    }

    fn constant_expr(&self, tokens: &[Token<'_>], span: Span) -> Result<i64, AsmError> {
        self.expr(tokens, span)?
            .constant()
            .ok_or_else(|| syntax_error("expression must be constant", span))
    }
}

/// Split directive arguments at commas; an empty argument is `None`.
fn split_args<'t, 's>(tokens: &'t [Token<'s>]) -> Vec<Option<&'t [Token<'s>]>> {
    if tokens.is_empty() {
        return Vec::new();
    }
    tokens
        .split(|t| t.kind == TokenKind::Comma)
        .map(|part| (!part.is_empty()).then_some(part))
        .collect()
}

fn expect_no_args(args: &[Option<&[Token<'_>]>], span: Span) -> Result<(), AsmError> {
    if args.is_empty() {
        Ok(())
    } else {
        Err(syntax_error("directive takes no arguments", span))
    }
}

fn syntax_error(msg: &str, span: Span) -> AsmError {
    AsmError::Syntax {
        msg: String::from(msg),
        span,
    }
}

fn byte_overflow(value: i64, span: Span) -> AsmError {
    AsmError::ImmediateOverflow {
        value: i128::from(value),
        min: -128,
        max: 255,
        span,
    }
}

/// Largest alignment directive accepted, as a power of two.
const MAX_ALIGN_LOG2: i64 = 31;

fn limit_error(resource: &str, limit: usize) -> AsmError {
    AsmError::ResourceLimitExceeded {
        resource: String::from(resource),
        limit,
    }
}
