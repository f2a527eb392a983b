//! Machine-code encoder.
//!
//! [`encode`] turns a parsed statement and the template the matcher bound
//! to it into instruction bytes. Fields that depend on layout or on symbol
//! values are left zeroed and described by [`Fixup`]s. Relaxable `jmp`/`jcc`
//! come back as a [`BranchSite`] whose width the layout engine chooses.

mod modrm;
mod vex;

use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use log::{debug, warn};

use crate::config::{AssemblerConfig, BranchKinds, CodeMode, OptLevel};
use crate::error::{AsmError, EncodeError, MatchError, Span, Warning};
use crate::expr::Value;
use crate::insn::{fits_either, fits_signed, segment_prefix, EncodingPin, Insn};
use crate::matcher::{memory_size, vector_bytes, Bound};
use crate::operand::{MemRef, Operand};
use crate::optype::{Instance, OperandType, RegClass, TypeFlags};
use crate::register::{RegKind, Register};
use crate::template::{
    jcc_condition, Disp8Shift, InstructionTemplate, JumpKind, Modifiers, OpcodeSpace, Rounding, SizeClass, VecLen,
    VectorEncoding, VexW,
};

use modrm::{Address, Disp, DispRules};
use vex::{EvexFields, VexFields};

/// Longest instruction the CPU accepts.
pub const MAX_INSN_LEN: usize = 15;

// ─── InstrBytes: stack-allocated instruction buffer ────────────────────

/// Stack-allocated instruction byte buffer.
///
/// Encoded x86 instructions are at most 15 bytes; the spare capacity
/// absorbs over-long prefix runs, which are diagnosed rather than
/// truncated.
#[derive(Clone)]
pub struct InstrBytes {
    data: [u8; 32],
    len: u8,
}

impl InstrBytes {
    /// Create an empty buffer.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self { data: [0; 32], len: 0 }
    }

    /// Create a buffer pre-filled from a byte slice (max 32 bytes).
    #[inline]
    #[must_use]
    pub fn from_slice(src: &[u8]) -> Self {
        let mut buf = Self::new();
        buf.extend_from_slice(src);
        buf
    }

    /// Append a single byte.
    ///
    /// # Panics
    ///
    /// Panics if the buffer is already full.
    #[inline]
    pub fn push(&mut self, byte: u8) {
        assert!((self.len as usize) < 32, "InstrBytes overflow: cannot push beyond 32 bytes");
        self.data[self.len as usize] = byte;
        self.len += 1;
    }

    /// Append a slice of bytes.
    ///
    /// # Panics
    ///
    /// Panics if appending would exceed the 32-byte capacity.
    #[inline]
    pub fn extend_from_slice(&mut self, bytes: &[u8]) {
        let start = self.len as usize;
        let end = start + bytes.len();
        assert!(
            end <= 32,
            "InstrBytes overflow: {} + {} exceeds 32-byte capacity",
            start,
            bytes.len()
        );
        self.data[start..end].copy_from_slice(bytes);
        self.len = end as u8;
    }

    /// Number of bytes in the buffer.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// Whether the buffer is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Convert to a heap-allocated `Vec<u8>`.
    #[inline]
    #[must_use]
    pub fn to_vec(&self) -> Vec<u8> {
        self.as_ref().to_vec()
    }

    /// Little-endian low `size` bytes of `value`.
    fn push_le(&mut self, value: i64, size: u8) {
        self.extend_from_slice(&value.to_le_bytes()[..usize::from(size)]);
    }
}

impl Default for InstrBytes {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl core::ops::Deref for InstrBytes {
    type Target = [u8];
    #[inline]
    fn deref(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }
}

impl core::ops::DerefMut for InstrBytes {
    #[inline]
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.data[..self.len as usize]
    }
}

impl AsRef<[u8]> for InstrBytes {
    #[inline]
    fn as_ref(&self) -> &[u8] {
        self
    }
}

impl core::fmt::Debug for InstrBytes {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl PartialEq for InstrBytes {
    fn eq(&self, other: &Self) -> bool {
        **self == **other
    }
}

impl Eq for InstrBytes {}

impl PartialEq<[u8]> for InstrBytes {
    fn eq(&self, other: &[u8]) -> bool {
        **self == *other
    }
}

impl PartialEq<Vec<u8>> for InstrBytes {
    fn eq(&self, other: &Vec<u8>) -> bool {
        **self == **other
    }
}

// ─── Encoder output ─────────────────────────────────────────

/// A field inside an encoded instruction whose value layout or linking
/// supplies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fixup {
    /// Byte offset of the field within the instruction.
    pub offset: usize,
    /// Field width in bytes.
    pub size: u8,
    /// The CPU sign-extends the field.
    pub signed: bool,
    /// Relative to the end of the instruction.
    pub pc_relative: bool,
    /// Bytes from the start of the field to the end of the instruction.
    pub to_end: u8,
    /// Value to store.
    pub target: Value,
    /// An 8-bit branch displacement (`loop`, `jecxz`): must resolve locally
    /// and fit.
    pub branch: bool,
    /// Operand the field came from.
    pub span: Span,
}

/// A `jmp` or `jcc` whose displacement width the layout engine chooses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchSite {
    /// Condition code, `None` for `jmp`.
    pub condition: Option<u8>,
    /// Target label plus addend, or an absolute address.
    pub target: Value,
    /// Intel `short`: only the 8-bit form is acceptable.
    pub short_only: bool,
    /// Statement span.
    pub span: Span,
}

/// One encoded instruction.
#[derive(Debug, Clone)]
pub struct Encoded {
    /// Instruction bytes; for a [`BranchSite`], its prefixes only.
    pub bytes: InstrBytes,
    /// Fields to patch, offsets into `bytes`.
    pub fixups: Vec<Fixup>,
    /// Set for relaxable branches.
    pub branch: Option<BranchSite>,
    /// Number of legacy prefix bytes at the start of `bytes`.
    pub prefix_len: u8,
    /// Branch class for boundary padding. [`BranchKinds::FUSED`] marks a
    /// compare that macro-fuses with a following `jcc`.
    pub flow: Option<BranchKinds>,
    /// Segment prefix that may be repeated in front of this instruction as
    /// padding without changing its meaning.
    pub padding_prefix: Option<u8>,
}

/// Encoder inputs that come from the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EncodeOptions {
    /// Encoding optimizations.
    pub opt_level: OptLevel,
}

impl From<&AssemblerConfig> for EncodeOptions {
    fn from(c: &AssemblerConfig) -> Self {
        Self { opt_level: c.opt_level }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpSize {
    Byte,
    Word,
    Dword,
    Qword,
}

impl OpSize {
    fn from_suffix(s: u8) -> Option<Self> {
        match s {
            b'b' => Some(OpSize::Byte),
            b'w' => Some(OpSize::Word),
            b'l' => Some(OpSize::Dword),
            b'q' => Some(OpSize::Qword),
            _ => None,
        }
    }

    fn from_flags(f: TypeFlags) -> Option<Self> {
        if f == TypeFlags::BYTE {
            Some(OpSize::Byte)
        } else if f == TypeFlags::WORD {
            Some(OpSize::Word)
        } else if f == TypeFlags::DWORD {
            Some(OpSize::Dword)
        } else if f == TypeFlags::QWORD {
            Some(OpSize::Qword)
        } else {
            None
        }
    }

    fn of(reg: Register) -> Option<Self> {
        match reg.kind() {
            RegKind::Gpr8 | RegKind::Gpr8High => Some(OpSize::Byte),
            RegKind::Gpr16 => Some(OpSize::Word),
            RegKind::Gpr32 => Some(OpSize::Dword),
            RegKind::Gpr64 => Some(OpSize::Qword),
            _ => None,
        }
    }

    fn suffix(self) -> char {
        match self {
            OpSize::Byte => 'b',
            OpSize::Word => 'w',
            OpSize::Dword => 'l',
            OpSize::Qword => 'q',
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Rm<'a> {
    Reg(Register),
    Mem(&'a MemRef, Span),
}

/// Where each operand lands in the encoding.
#[derive(Debug, Default)]
struct Roles<'a> {
    reg: Option<Register>,
    rm: Option<Rm<'a>>,
    vvvv: Option<Register>,
    /// Register in the low opcode bits.
    short: Option<Register>,
    /// Memory without ModRM (`mov moffs`).
    moffs: Option<(&'a MemRef, Span)>,
    /// Direct branch target.
    target: Option<(&'a Value, Span)>,
    /// Operand indexes of immediates.
    imms: Vec<usize>,
}

impl Roles<'_> {
    fn memory(&self) -> Option<&MemRef> {
        match (self.rm, self.moffs) {
            (Some(Rm::Mem(m, _)), _) | (_, Some((m, _))) => Some(m),
            _ => None,
        }
    }

    fn registers(&self) -> impl Iterator<Item = Register> + '_ {
        let rm = match self.rm {
            Some(Rm::Reg(r)) => Some(r),
            _ => None,
        };
        self.reg.into_iter().chain(rm).chain(self.short)
    }
}

/// Encode one instruction.
///
/// # Errors
///
/// Operand size, prefix, immediate and displacement violations, each
/// reported against the statement or operand span.
///
/// # Examples
///
/// ```rust
/// use asm_x86::config::{CodeMode, CpuFeatures, OptLevel, Syntax};
/// use asm_x86::encoder::{encode, EncodeOptions};
/// use asm_x86::expr::NoSymbols;
/// use asm_x86::insn::{parse_statement, ParseOptions, Statement};
/// use asm_x86::lexer::tokenize;
/// use asm_x86::matcher::{match_template, MatchOptions};
/// use asm_x86::AssemblerConfig;
///
/// let config = AssemblerConfig::for_mode(CodeMode::Code64);
/// let tokens = tokenize("add rax, rbx").unwrap();
/// let opts = ParseOptions {
///     mode: CodeMode::Code64,
///     syntax: Syntax::Intel,
///     cpu: CpuFeatures::all(),
///     opt_level: OptLevel::Size,
///     symbols: &NoSymbols,
/// };
/// let mut warnings = Vec::new();
/// let Statement::Insn(insn) = parse_statement(&tokens[..tokens.len() - 1], &opts, &mut warnings).unwrap() else {
///     panic!("expected an instruction");
/// };
/// let bound = match_template(&insn, &MatchOptions::from(&config), &mut warnings).unwrap();
/// let out = encode(&insn, &bound, &EncodeOptions::from(&config), &mut warnings).unwrap();
/// assert_eq!(&out.bytes[..], &[0x48, 0x01, 0xD8]);
/// ```
pub fn encode(
    insn: &Insn,
    bound: &Bound,
    opts: &EncodeOptions,
    warnings: &mut Vec<Warning>,
) -> Result<Encoded, AsmError> {
    let t = bound.template;
    let mut roles = assign_roles(insn, bound)?;
    if t.jump == JumpKind::Relaxable {
        return encode_branch(insn, bound, &roles);
    }
    let mode = insn.mode;
    let legacy = t.encoding == VectorEncoding::Legacy;
    let size = operand_size(insn, bound)?;
    let sized = legacy && size_applies(t);
    let qword = size == Some(OpSize::Qword) && !t.has(Modifiers::NO_REX64) && (sized || t.size == SizeClass::Size64);

    if size == Some(OpSize::Qword) && !mode.is_64() && sized {
        return Err(AsmError::Match {
            kind: MatchError::Unsupported64Bit,
            mnemonic: insn.mnemonic.clone(),
            span: insn.span,
        });
    }

    let mut buf = InstrBytes::new();
    let mut fixups = Vec::new();

    // Legacy prefixes: segment, address size, operand size, mandatory,
    // lock/rep.
    let segment = segment_override(insn, &roles, warnings)?;
    if let Some(seg) = segment {
        buf.push(segment_prefix(seg));
    }
    if address_prefix(insn, t, roles.memory())? {
        buf.push(0x67);
    }
    let mut opsize = sized
        && !prefix_sized_elsewhere(t)
        && match size {
            Some(OpSize::Word) => mode != CodeMode::Code16,
            Some(OpSize::Dword) => mode == CodeMode::Code16,
            _ => false,
        };
    if insn.prefixes.data {
        if !legacy {
            return Err(prefix_error("data16", insn.span));
        }
        opsize = true;
    }
    if opsize {
        buf.push(0x66);
    }
    if legacy {
        if let Some(p) = t.prefix.byte() {
            buf.push(p);
        }
    }
    if insn.prefixes.lock {
        check_lock(insn, t, &roles)?;
        buf.push(0xF0);
    }
    if let Some(rep) = insn.prefixes.rep {
        if !legacy {
            return Err(prefix_error(if rep == 0xF2 { "repne" } else { "rep" }, insn.span));
        }
        buf.push(rep);
    }
    let prefix_len = buf.len() as u8;

    // VEX register-swap peephole: a commutative all-register form with an
    // extended r/m source takes the three-byte prefix, the swapped one may not.
    let w = match t.vex_w {
        VexW::W0 => false,
        VexW::W1 => true,
        VexW::Ignore => qword || (!legacy && size == Some(OpSize::Qword) && !t.has(Modifiers::NO_REX64)),
    };
    if t.encoding.is_vex()
        && opts.opt_level == OptLevel::Size
        && t.has(Modifiers::COMMUTATIVE)
        && t.space == OpcodeSpace::Map0F
        && !w
        && insn.pins.encoding != Some(EncodingPin::Vex3)
    {
        if let (Some(Rm::Reg(src)), Some(v)) = (roles.rm, roles.vvvv) {
            if src.is_extended() && !v.is_extended() {
                debug!("{}: swapped commutative sources for a two-byte VEX prefix", insn.span);
                roles.rm = Some(Rm::Reg(v));
                roles.vvvv = Some(src);
            }
        }
    }

    let address = match roles.rm {
        Some(Rm::Reg(r)) => Some(Address::register(r)),
        Some(Rm::Mem(m, span)) => {
            let rules = DispRules {
                pin: insn.pins.disp,
                scale: disp8_scale(insn, t),
                mode,
            };
            Some(modrm::address(m, &rules, span)?)
        }
        None => None,
    };
    let reg_field = roles.reg.map(|r| r.num()).or(t.extension).unwrap_or(0);
    let ext_r = roles.reg.is_some_and(|r| r.is_extended());
    let ext_x = address.as_ref().is_some_and(|a| a.x);
    let ext_b = address.as_ref().is_some_and(|a| a.b) || roles.short.is_some_and(|r| r.is_extended());

    match t.encoding {
        VectorEncoding::Legacy => {
            let rex_w = qword || insn.prefixes.rex64;
            let forced = roles.registers().any(|r| r.requires_rex());
            if rex_w || ext_r || ext_x || ext_b || forced {
                if roles.registers().any(|r| r.is_high_byte()) {
                    return Err(encode_error(EncodeError::HighByteWithRex, insn.span));
                }
                if !mode.is_64() {
                    return Err(prefix_error("rex64", insn.span));
                }
                buf.push(rex(rex_w, ext_r, ext_x, ext_b));
            }
            buf.extend_from_slice(t.space.escape());
        }
        VectorEncoding::Vex(len) => {
            if insn.prefixes.rex64 {
                return Err(prefix_error("rex64", insn.span));
            }
            let l = match len {
                VecLen::L256 => 1,
                VecLen::Dynamic => u8::from(vector_bytes(t, insn) == 32),
                _ => 0,
            };
            let fields = VexFields {
                r: ext_r,
                x: ext_x,
                b: ext_b,
                map: t.space.map_select(),
                w,
                vvvv: roles.vvvv.map_or(0, |r| r.num() & 0x0F),
                l,
                pp: t.prefix.pp(),
            };
            vex::emit_vex(&mut buf, &fields, insn.pins.encoding == Some(EncodingPin::Vex3));
        }
        VectorEncoding::Evex(len) => {
            if insn.prefixes.rex64 {
                return Err(prefix_error("rex64", insn.span));
            }
            let length = match len {
                VecLen::L128 | VecLen::Ignored => 0,
                VecLen::L256 => 1,
                VecLen::L512 => 2,
                VecLen::Dynamic => match vector_bytes(t, insn) {
                    64 => 2,
                    32 => 1,
                    _ => 0,
                },
            };
            let (l, b) = match insn.vector.rounding {
                Some(rc) => match (rc.rc(), t.rounding) {
                    (Some(rc), Rounding::Static) => (rc, true),
                    _ => (length, true),
                },
                None => (length, insn.vector.broadcast.is_some()),
            };
            let a = address.as_ref();
            let fields = VexFields {
                r: ext_r,
                x: ext_x || a.is_some_and(|a| a.rm_hi),
                b: ext_b,
                map: t.space.map_select(),
                w,
                vvvv: roles.vvvv.map_or(0, |r| r.num() & 0x0F),
                l,
                pp: t.prefix.pp(),
            };
            let evex = EvexFields {
                r_hi: roles.reg.is_some_and(|r| r.is_evex_extended()),
                v_hi: roles.vvvv.is_some_and(|r| r.is_evex_extended()) || a.is_some_and(|a| a.v_hi),
                z: insn.vector.zeroing,
                b,
                aaa: insn.vector.mask.map_or(0, |k| k.num()),
            };
            vex::emit_evex(&mut buf, &fields, &evex);
        }
    }

    // Opcode, with the size bit and a short-form register folded into the
    // last byte.
    let mut opcode = bound.opcode();
    if t.has(Modifiers::W) && size.is_some_and(|s| s != OpSize::Byte) {
        opcode |= if t.has(Modifiers::SHORT_FORM) { 0x08 } else { 0x01 };
    }
    if let Some(r) = roles.short {
        opcode |= u32::from(r.code());
    }
    for i in (0..u32::from(t.opcode_len)).rev() {
        buf.push((opcode >> (8 * i)) as u8);
    }

    if let Some(a) = address {
        buf.push(modrm::modrm(a.mode, reg_field, a.rm));
        if let Some(s) = a.sib {
            buf.push(s);
        }
        let span = match roles.rm {
            Some(Rm::Mem(_, span)) => span,
            _ => insn.span,
        };
        match a.disp {
            Disp::None => {}
            Disp::Constant { value, size } => buf.push_le(value, size),
            Disp::Symbol {
                value,
                size,
                signed,
                pc_relative,
            } => {
                fixups.push(fixup(buf.len(), size, signed, pc_relative, value, span));
                buf.push_le(0, size);
            }
        }
    }

    if let Some((m, span)) = roles.moffs {
        let size = (m.addr_bits / 8) as u8;
        match &m.disp {
            Some(Value::Constant(d)) => {
                if size < 8 && !fits_either(*d, u32::from(size) * 8) {
                    return Err(AsmError::DisplacementOverflow {
                        value: *d,
                        bits: size * 8,
                        span,
                    });
                }
                buf.push_le(*d, size);
            }
            Some(sym) => {
                fixups.push(fixup(buf.len(), size, false, false, sym.clone(), span));
                buf.push_le(0, size);
            }
            None => buf.push_le(0, size),
        }
    }

    if let Some((target, span)) = roles.target {
        let (size, byte) = match t.jump {
            JumpKind::Byte => (1, true),
            _ if (mode == CodeMode::Code16) ^ insn.prefixes.data => (2, false),
            _ => (4, false),
        };
        let mut f = fixup(buf.len(), size, true, true, target.clone(), span);
        f.branch = byte;
        fixups.push(f);
        buf.push_le(0, size);
    }

    if t.jump == JumpKind::InterSegment {
        let [seg, off] = roles.imms[..] else {
            return Err(internal("far jump without selector and offset", insn.span));
        };
        let off_size = if (mode == CodeMode::Code16) ^ insn.prefixes.data { 2 } else { 4 };
        emit_imm(&mut buf, &mut fixups, insn, bound, off, ImmField::unsigned(off_size))?;
        emit_imm(&mut buf, &mut fixups, insn, bound, seg, ImmField::unsigned(2))?;
    } else {
        for &i in &roles.imms {
            let field = imm_field(bound.slot(i), size, mode);
            emit_imm(&mut buf, &mut fixups, insn, bound, i, field)?;
        }
    }

    let len = buf.len();
    for f in &mut fixups {
        f.to_end = (len - f.offset) as u8;
    }
    if len > MAX_INSN_LEN {
        let message = format!("instruction length of {} bytes exceeds the limit of {}", len, MAX_INSN_LEN);
        warn!("{}: {}", insn.span, message);
        warnings.push(Warning {
            message,
            span: insn.span,
        });
    }

    let flow = classify(insn, bound);
    let padding_prefix = (segment.is_none()
        && !insn.operands.is_empty()
        && flow.map_or(true, |f| f == BranchKinds::FUSED))
    .then(|| match (mode, roles.memory()) {
        (CodeMode::Code64, _) => 0x2E,
        (_, Some(m)) => segment_prefix(m.default_segment()),
        (_, None) => 0x3E,
    });

    Ok(Encoded {
        bytes: buf,
        fixups,
        branch: None,
        prefix_len,
        flow,
        padding_prefix,
    })
}

fn encode_branch(insn: &Insn, bound: &Bound, roles: &Roles<'_>) -> Result<Encoded, AsmError> {
    let Some((target, _)) = roles.target else {
        return Err(internal("branch without a target", insn.span));
    };
    if insn.prefixes.lock {
        return Err(encode_error(EncodeError::InvalidLockPrefix, insn.span));
    }
    if insn.prefixes.data || insn.prefixes.addr.is_some() || insn.prefixes.rex64 {
        return Err(prefix_error("operand or address size", insn.span));
    }
    let mut bytes = InstrBytes::new();
    // Segment prefixes double as branch hints; `rep`/`repne` as `bnd`.
    if let Some(seg) = insn.prefixes.segment {
        bytes.push(segment_prefix(seg));
    }
    if let Some(rep) = insn.prefixes.rep {
        bytes.push(rep);
    }
    let condition = jcc_condition(bound.template);
    Ok(Encoded {
        prefix_len: bytes.len() as u8,
        bytes,
        fixups: Vec::new(),
        branch: Some(BranchSite {
            condition,
            target: target.clone(),
            short_only: insn.short_branch,
            span: insn.span,
        }),
        flow: Some(if condition.is_some() {
            BranchKinds::JCC
        } else {
            BranchKinds::JMP
        }),
        padding_prefix: None,
    })
}

fn assign_roles<'a>(insn: &'a Insn, bound: &Bound) -> Result<Roles<'a>, AsmError> {
    let t = bound.template;
    let mut roles = Roles::default();
    let mut modrm_regs: Vec<(usize, Register)> = Vec::new();
    for (i, op) in insn.operands.iter().enumerate() {
        let si = bound.slot_index(i);
        let slot = t.operands[si];
        match &op.operand {
            Operand::Immediate(_) => roles.imms.push(i),
            Operand::Memory(m) if matches!(t.jump, JumpKind::Relaxable | JumpKind::Byte | JumpKind::Dword) => {
                let Some(v) = m.disp.as_ref() else {
                    return Err(internal("branch target without an address", op.span));
                };
                roles.target = Some((v, op.span));
            }
            Operand::Memory(m) if t.has(Modifiers::MODRM) => roles.rm = Some(Rm::Mem(m, op.span)),
            Operand::Memory(m) => roles.moffs = Some((m, op.span)),
            Operand::Register(r) => {
                if slot.instance() != Instance::None {
                    continue;
                }
                if t.vvvv == Some(si as u8) {
                    roles.vvvv = Some(*r);
                } else if t.has(Modifiers::SHORT_FORM) {
                    roles.short = Some(*r);
                } else {
                    modrm_regs.push((si, *r));
                }
            }
        }
    }
    modrm_regs.sort_by_key(|&(si, _)| si);
    match (modrm_regs.as_slice(), roles.rm.is_some()) {
        ([], _) => {}
        ([(_, r)], true) => roles.reg = Some(*r),
        ([(_, r)], false) => roles.rm = Some(Rm::Reg(*r)),
        ([(sa, a), (sb, b)], false) => {
            let a_is_rm = if t.operands[*sa].is_memory() {
                true
            } else if t.operands[*sb].is_memory() {
                false
            } else if t.has(Modifiers::REG_MEM) {
                a.is_gpr()
            } else {
                true
            };
            let (rm, reg) = if a_is_rm { (*a, *b) } else { (*b, *a) };
            roles.rm = Some(Rm::Reg(rm));
            roles.reg = Some(reg);
        }
        _ => return Err(internal("too many register operands for ModRM", insn.span)),
    }
    if t.extension.is_some() && roles.reg.is_some() {
        return Err(internal("register operand collides with an opcode extension", insn.span));
    }
    if t.has(Modifiers::MODRM) && roles.rm.is_none() {
        return Err(internal("ModRM template without an r/m operand", insn.span));
    }
    Ok(roles)
}

/// Whether operand size is expressed through W, `66` and REX.W at all.
fn size_applies(t: &InstructionTemplate) -> bool {
    t.size != SizeClass::Any
        || t.has(Modifiers::W)
        || t.has(Modifiers::DEFAULT_SIZE)
        || t.operands.iter().any(|s| {
            let ints = s.sizes().intersection(TypeFlags::WORD | TypeFlags::DWORD | TypeFlags::QWORD);
            (s.class() == RegClass::Gpr || s.is_memory()) && ints.bits().count_ones() > 1
        })
}

/// Templates whose general-register operand size is fixed by the opcode
/// itself: `66` would select a different instruction or mean nothing.
fn prefix_sized_elsewhere(t: &InstructionTemplate) -> bool {
    t.has(Modifiers::FLOAT_MEM)
        || t.operands.iter().any(|s| {
            matches!(
                s.class(),
                RegClass::Simd | RegClass::Mmx | RegClass::Mask | RegClass::Fpu | RegClass::Control | RegClass::Debug
            )
        })
}

/// Operand size from, in order: the template, the suffix, the last
/// general register, a sized memory operand, the stack width.
fn operand_size(insn: &Insn, bound: &Bound) -> Result<Option<OpSize>, AsmError> {
    let t = bound.template;
    match t.size {
        SizeClass::Size16 => return Ok(Some(OpSize::Word)),
        SizeClass::Size32 => return Ok(Some(OpSize::Dword)),
        SizeClass::Size64 => return Ok(Some(OpSize::Qword)),
        SizeClass::Any => {}
    }
    let suffix = bound
        .suffix
        .filter(|_| !t.has(Modifiers::FLOAT_MEM))
        .and_then(OpSize::from_suffix);
    if let Some(s) = suffix {
        for (i, op) in insn.operands.iter().enumerate() {
            let Some(r) = op.operand.register() else { continue };
            let slot = bound.slot(i);
            if !sizes_with_operand(slot) || slot.sizes().intersection(TypeFlags::GPR_SIZES).bits().count_ones() < 2 {
                continue;
            }
            if OpSize::of(r) != Some(s) {
                return Err(encode_error(
                    EncodeError::RegisterSizeConflict {
                        register: r.to_string(),
                        suffix: s.suffix(),
                    },
                    insn.span,
                ));
            }
        }
        return Ok(Some(s));
    }
    let reg = insn.operands.iter().enumerate().rev().find_map(|(i, op)| {
        let r = op.operand.register()?;
        if !sizes_with_operand(bound.slot(i)) {
            return None;
        }
        OpSize::of(r)
    });
    if reg.is_some() {
        return Ok(reg);
    }
    let mem = insn
        .operands
        .iter()
        .filter_map(|o| o.operand.memory())
        .filter_map(|m| memory_size(m, bound.suffix, t))
        .find_map(OpSize::from_flags);
    if mem.is_some() {
        return Ok(mem);
    }
    if t.has(Modifiers::DEFAULT_SIZE) {
        return Ok(Some(match insn.mode {
            CodeMode::Code64 => OpSize::Qword,
            CodeMode::Code32 => OpSize::Dword,
            CodeMode::Code16 => OpSize::Word,
        }));
    }
    if t.needs_operand_size() {
        return Err(encode_error(EncodeError::AmbiguousOperandSize, insn.span));
    }
    Ok(None)
}

/// Shift-count and port registers do not size the instruction.
fn sizes_with_operand(slot: OperandType) -> bool {
    slot.class() == RegClass::Gpr && !matches!(slot.instance(), Instance::RegC | Instance::RegD)
}

fn segment_override(
    insn: &Insn,
    roles: &Roles<'_>,
    warnings: &mut Vec<Warning>,
) -> Result<Option<Register>, AsmError> {
    let explicit = roles.memory().and_then(|m| m.segment.map(|s| (s, m)));
    match (explicit, insn.prefixes.segment) {
        (Some(_), Some(word)) => Err(prefix_error(&word.to_string(), insn.span)),
        (None, word) => Ok(word),
        (Some((seg, m)), None) => {
            if m.needs_segment_prefix() {
                return Ok(Some(seg));
            }
            let message = format!("redundant `{}' segment override dropped", seg);
            warn!("{}: {}", insn.span, message);
            warnings.push(Warning {
                message,
                span: insn.span,
            });
            Ok(None)
        }
    }
}

fn address_prefix(insn: &Insn, t: &InstructionTemplate, mem: Option<&MemRef>) -> Result<bool, AsmError> {
    let bits = if t.has(Modifiers::ADDR16) {
        Some(16)
    } else if t.has(Modifiers::ADDR32) {
        Some(32)
    } else {
        mem.map(|m| m.addr_bits).or(insn.prefixes.addr)
    };
    if bits == Some(16) && insn.mode.is_64() {
        return Err(prefix_error("addr16", insn.span));
    }
    Ok(bits.is_some_and(|b| b != u16::from(insn.mode.address_bits())))
}

fn check_lock(insn: &Insn, t: &InstructionTemplate, roles: &Roles<'_>) -> Result<(), AsmError> {
    let memory_dest = matches!(roles.rm, Some(Rm::Mem(..)))
        && (insn.operands.last().is_some_and(|o| o.operand.memory().is_some()) || t.has(Modifiers::COMMUTATIVE));
    if t.has(Modifiers::LOCKABLE) && memory_dest {
        Ok(())
    } else {
        Err(encode_error(EncodeError::InvalidLockPrefix, insn.span))
    }
}

/// EVEX disp8*N factor.
fn disp8_scale(insn: &Insn, t: &InstructionTemplate) -> u32 {
    if !t.encoding.is_evex() {
        return 1;
    }
    if insn.vector.broadcast.is_some() {
        if let Some(elem) = t.broadcast {
            return u32::from(elem);
        }
    }
    match t.disp8 {
        Disp8Shift::None => 1,
        Disp8Shift::Scale(s) => 1 << s,
        Disp8Shift::Vector => u32::from(vector_bytes(t, insn)),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ImmField {
    size: u8,
    signed: bool,
}

impl ImmField {
    const fn unsigned(size: u8) -> Self {
        Self { size, signed: false }
    }
}

fn imm_field(slot: OperandType, size: Option<OpSize>, mode: CodeMode) -> ImmField {
    let imm = slot.bits().intersection(TypeFlags::IMM);
    let single = |f: TypeFlags| imm == f;
    if single(TypeFlags::IMM1) {
        return ImmField::unsigned(0);
    }
    if single(TypeFlags::IMM8) {
        return ImmField::unsigned(1);
    }
    if single(TypeFlags::IMM8S) {
        return ImmField { size: 1, signed: true };
    }
    if single(TypeFlags::IMM16) {
        return ImmField::unsigned(2);
    }
    if single(TypeFlags::IMM32) {
        return ImmField::unsigned(4);
    }
    if single(TypeFlags::IMM32S) {
        return ImmField { size: 4, signed: true };
    }
    if single(TypeFlags::IMM64) {
        return ImmField::unsigned(8);
    }
    match size {
        Some(OpSize::Byte) => ImmField::unsigned(1),
        Some(OpSize::Word) => ImmField::unsigned(2),
        Some(OpSize::Dword) => ImmField::unsigned(4),
        Some(OpSize::Qword) if imm.contains(TypeFlags::IMM32S) => ImmField { size: 4, signed: true },
        Some(OpSize::Qword) => ImmField::unsigned(8),
        None if mode == CodeMode::Code16 => ImmField::unsigned(2),
        None => ImmField::unsigned(4),
    }
}

fn emit_imm(
    buf: &mut InstrBytes,
    fixups: &mut Vec<Fixup>,
    insn: &Insn,
    bound: &Bound,
    index: usize,
    field: ImmField,
) -> Result<(), AsmError> {
    if field.size == 0 {
        return Ok(());
    }
    let span = insn.operands.get(index).map_or(insn.span, |o| o.span);
    let Some(value) = insn.immediate(index, bound.suffix) else {
        return Err(internal("immediate slot without an immediate", span));
    };
    match value {
        Value::Constant(v) => {
            check_imm(v, field, span)?;
            buf.push_le(v, field.size);
        }
        sym => {
            fixups.push(fixup(buf.len(), field.size, field.signed, false, sym, span));
            buf.push_le(0, field.size);
        }
    }
    Ok(())
}

fn check_imm(v: i64, field: ImmField, span: Span) -> Result<(), AsmError> {
    if field.size >= 8 {
        return Ok(());
    }
    let bits = u32::from(field.size) * 8;
    let ok = if field.signed {
        fits_signed(v, bits)
    } else {
        fits_either(v, bits)
    };
    if ok {
        return Ok(());
    }
    let min = -(1i128 << (bits - 1));
    let max = if field.signed {
        (1i128 << (bits - 1)) - 1
    } else {
        (1i128 << bits) - 1
    };
    Err(AsmError::ImmediateOverflow {
        value: i128::from(v),
        min,
        max,
        span,
    })
}

/// Branch class of an instruction for boundary padding.
fn classify(insn: &Insn, bound: &Bound) -> Option<BranchKinds> {
    let t = bound.template;
    match t.jump {
        JumpKind::Relaxable if jcc_condition(t).is_some() => return Some(BranchKinds::JCC),
        JumpKind::Relaxable => return Some(BranchKinds::JMP),
        JumpKind::Byte => return Some(BranchKinds::JCC),
        JumpKind::Dword => return Some(BranchKinds::CALL),
        JumpKind::InterSegment => return None,
        JumpKind::None => {}
    }
    if t.operands.iter().any(|s| s.has(TypeFlags::JUMP_ABSOLUTE)) {
        return Some(BranchKinds::INDIRECT);
    }
    if bound.group.name == "ret" {
        return Some(BranchKinds::RET);
    }
    fusible(insn, bound).then_some(BranchKinds::FUSED)
}

/// Compares and ALU operations the CPU can macro-fuse with a following
/// `jcc`.
fn fusible(insn: &Insn, bound: &Bound) -> bool {
    let t = bound.template;
    if t.encoding != VectorEncoding::Legacy || t.space != OpcodeSpace::Base {
        return false;
    }
    if insn.memory().is_some_and(MemRef::is_ip_relative) {
        return false;
    }
    let mem = insn.memory_count() > 0;
    let imm = insn.operands.iter().any(|o| o.operand.immediate().is_some());
    match bound.group.name {
        "cmp" | "test" => !(mem && imm),
        "add" | "sub" | "and" | "inc" | "dec" => !mem,
        _ => false,
    }
}

/// REX prefix byte.
#[inline]
const fn rex(w: bool, r: bool, x: bool, b: bool) -> u8 {
    0x40 | ((w as u8) << 3) | ((r as u8) << 2) | ((x as u8) << 1) | (b as u8)
}

fn fixup(offset: usize, size: u8, signed: bool, pc_relative: bool, target: Value, span: Span) -> Fixup {
    Fixup {
        offset,
        size,
        signed,
        pc_relative,
        to_end: 0,
        target,
        branch: false,
        span,
    }
}

fn encode_error(kind: EncodeError, span: Span) -> AsmError {
    AsmError::Encode { kind, span }
}

fn prefix_error(prefix: &str, span: Span) -> AsmError {
    encode_error(
        EncodeError::InvalidPrefix {
            prefix: String::from(prefix),
        },
        span,
    )
}

fn internal(msg: &str, span: Span) -> AsmError {
    AsmError::Internal {
        msg: String::from(msg),
        span,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CheckLevel, CpuFeatures, Isa64, Syntax};
    use crate::expr::NoSymbols;
    use crate::insn::{parse_statement, ParseOptions, Statement};
    use crate::lexer::tokenize;
    use crate::matcher::{match_template, MatchOptions};
    use alloc::vec;

    fn encode_with(src: &str, syntax: Syntax, mode: CodeMode, opt_level: OptLevel) -> Result<Encoded, AsmError> {
        let tokens = tokenize(src).unwrap();
        let opts = ParseOptions {
            mode,
            syntax,
            cpu: CpuFeatures::all(),
            opt_level,
            symbols: &NoSymbols,
        };
        let mut warnings = Vec::new();
        let insn = match parse_statement(&tokens[..tokens.len() - 1], &opts, &mut warnings)? {
            Statement::Insn(i) => i,
            Statement::Prefixes { .. } => panic!("expected instruction"),
        };
        let matcher = MatchOptions {
            cpu: CpuFeatures::all(),
            isa64: Isa64::Amd64,
            operand_check: CheckLevel::Warning,
        };
        let bound = match_template(&insn, &matcher, &mut warnings)?;
        encode(&insn, &bound, &EncodeOptions { opt_level }, &mut warnings)
    }

    fn intel(src: &str) -> Vec<u8> {
        encode_with(src, Syntax::Intel, CodeMode::Code64, OptLevel::Size)
            .unwrap()
            .bytes
            .to_vec()
    }

    fn att(src: &str) -> Vec<u8> {
        encode_with(src, Syntax::Att, CodeMode::Code64, OptLevel::Size)
            .unwrap()
            .bytes
            .to_vec()
    }

    fn in_mode(src: &str, mode: CodeMode) -> Vec<u8> {
        encode_with(src, Syntax::Intel, mode, OptLevel::Size)
            .unwrap()
            .bytes
            .to_vec()
    }

    fn encode_kind(src: &str) -> EncodeError {
        match encode_with(src, Syntax::Intel, CodeMode::Code64, OptLevel::Size) {
            Err(AsmError::Encode { kind, .. }) => kind,
            other => panic!("expected an encode error for {src}, got {other:?}"),
        }
    }

    #[test]
    fn instr_bytes_basics() {
        let mut buf = InstrBytes::from_slice(&[0x48]);
        buf.push(0x89);
        buf.push_le(0x1234, 2);
        assert_eq!(buf.len(), 4);
        assert_eq!(buf, vec![0x48, 0x89, 0x34, 0x12]);
        assert!(InstrBytes::new().is_empty());
    }

    #[test]
    fn integer_alu() {
        assert_eq!(intel("add rax, rbx"), [0x48, 0x01, 0xD8]);
        assert_eq!(intel("add eax, 1"), [0x83, 0xC0, 0x01]);
        assert_eq!(intel("add eax, 1000"), [0x05, 0xE8, 0x03, 0x00, 0x00]);
        assert_eq!(intel("add ax, 1"), [0x66, 0x83, 0xC0, 0x01]);
        assert_eq!(att("addl $1, %eax"), [0x83, 0xC0, 0x01]);
        assert_eq!(intel("lock add dword ptr [rax], 1"), [0xF0, 0x83, 0x00, 0x01]);
    }

    #[test]
    fn mov_forms() {
        assert_eq!(att("movl $1, %eax"), [0xB8, 0x01, 0x00, 0x00, 0x00]);
        assert_eq!(intel("mov byte ptr [rax], 1"), [0xC6, 0x00, 0x01]);
        assert_eq!(
            intel("mov rax, 0x1122334455667788"),
            [0x48, 0xB8, 0x88, 0x77, 0x66, 0x55, 0x44, 0x33, 0x22, 0x11]
        );
        assert_eq!(intel("mov rax, [rbx+rcx*8+16]"), [0x48, 0x8B, 0x44, 0xCB, 0x10]);
        assert_eq!(intel("mov r12, [r13]"), [0x4D, 0x8B, 0x65, 0x00]);
        assert_eq!(intel("mov eax, [rsp]"), [0x8B, 0x04, 0x24]);
        assert_eq!(intel("mov al, ah"), [0x88, 0xE0]);
        assert_eq!(intel("mov sil, al"), [0x40, 0x88, 0xC6]);
        assert_eq!(intel("lea rax, [rip+0x10]"), [0x48, 0x8D, 0x05, 0x10, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn absolute_memory_per_mode() {
        assert_eq!(in_mode("mov eax, [0x1000]", CodeMode::Code32), [0xA1, 0x00, 0x10, 0x00, 0x00]);
        assert_eq!(
            in_mode("mov eax, [0x1000]", CodeMode::Code64),
            [0x8B, 0x04, 0x25, 0x00, 0x10, 0x00, 0x00]
        );
    }

    #[test]
    fn short_forms_and_stack() {
        assert_eq!(intel("push rbp"), [0x55]);
        assert_eq!(intel("push r12"), [0x41, 0x54]);
        assert_eq!(intel("pop rbx"), [0x5B]);
        assert_eq!(intel("ret"), [0xC3]);
        assert_eq!(intel("nop"), [0x90]);
        assert_eq!(intel("xchg eax, ecx"), [0x91]);
        assert_eq!(in_mode("inc eax", CodeMode::Code32), [0x40]);
        assert_eq!(intel("inc eax"), [0xFF, 0xC0]);
    }

    #[test]
    fn shifts_and_extensions() {
        assert_eq!(intel("shl eax, 1"), [0xD1, 0xE0]);
        assert_eq!(intel("shl eax, cl"), [0xD3, 0xE0]);
        assert_eq!(intel("shl eax, 4"), [0xC1, 0xE0, 0x04]);
        assert_eq!(intel("movzx eax, byte ptr [rdi]"), [0x0F, 0xB6, 0x07]);
        assert_eq!(intel("movsxd rax, ecx"), [0x48, 0x63, 0xC1]);
        assert_eq!(intel("imul eax, ecx, 10"), [0x6B, 0xC1, 0x0A]);
    }

    #[test]
    fn sixteen_bit_mode() {
        assert_eq!(in_mode("mov ax, [bx+si]", CodeMode::Code16), [0x8B, 0x00]);
        assert_eq!(
            in_mode("mov eax, 1", CodeMode::Code16),
            [0x66, 0xB8, 0x01, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn sse() {
        assert_eq!(intel("movaps xmm0, xmm1"), [0x0F, 0x28, 0xC1]);
        assert_eq!(intel("movaps [rax], xmm0"), [0x0F, 0x29, 0x00]);
        assert_eq!(intel("pxor xmm0, xmm1"), [0x66, 0x0F, 0xEF, 0xC1]);
        assert_eq!(intel("cvtsi2sd xmm1, rax"), [0xF2, 0x48, 0x0F, 0x2A, 0xC8]);
    }

    #[test]
    fn vex() {
        assert_eq!(intel("vaddps ymm0, ymm1, ymm2"), [0xC5, 0xF4, 0x58, 0xC2]);
        assert_eq!(intel("{vex3} vaddps xmm0, xmm1, xmm2"), [0xC4, 0xE1, 0x70, 0x58, 0xC2]);
        assert_eq!(intel("kandw k1, k2, k3"), [0xC5, 0xEC, 0x41, 0xCB]);
    }

    #[test]
    fn vex_commutative_swap() {
        assert_eq!(intel("vpxor xmm0, xmm1, xmm8"), [0xC5, 0xB9, 0xEF, 0xC1]);
        let plain = encode_with("vpxor xmm0, xmm1, xmm8", Syntax::Intel, CodeMode::Code64, OptLevel::None).unwrap();
        assert_eq!(plain.bytes, vec![0xC4, 0xC1, 0x71, 0xEF, 0xC0]);
    }

    #[test]
    fn evex() {
        assert_eq!(intel("vaddps zmm0, zmm1, zmm2"), [0x62, 0xF1, 0x74, 0x48, 0x58, 0xC2]);
        assert_eq!(intel("vaddps zmm0{k1}{z}, zmm1, zmm2"), [0x62, 0xF1, 0x74, 0xC9, 0x58, 0xC2]);
        assert_eq!(
            intel("vaddps zmm0, zmm1, dword ptr [rax]{1to16}"),
            [0x62, 0xF1, 0x74, 0x58, 0x58, 0x00]
        );
        assert_eq!(intel("vaddps zmm0, zmm1, zmm2, {rz-sae}"), [0x62, 0xF1, 0x74, 0x78, 0x58, 0xC2]);
        assert_eq!(intel("vaddps zmm0, zmm1, [rax+256]"), [0x62, 0xF1, 0x74, 0x48, 0x58, 0x40, 0x04]);
        assert_eq!(intel("vaddps zmm16, zmm1, zmm2"), [0x62, 0xE1, 0x74, 0x48, 0x58, 0xC2]);
        assert_eq!(
            intel("vgatherdps zmm0{k1}, [rax+zmm1*4]"),
            [0x62, 0xF2, 0x7D, 0x49, 0x92, 0x04, 0x88]
        );
    }

    #[test]
    fn branches_and_fixups() {
        let call = encode_with("call foo", Syntax::Intel, CodeMode::Code64, OptLevel::Size).unwrap();
        assert_eq!(call.bytes, vec![0xE8, 0, 0, 0, 0]);
        assert_eq!(call.fixups.len(), 1);
        let f = &call.fixups[0];
        assert_eq!((f.offset, f.size, f.pc_relative, f.to_end), (1, 4, true, 4));
        assert_eq!(call.flow, Some(BranchKinds::CALL));

        let jne = encode_with("jne foo", Syntax::Intel, CodeMode::Code64, OptLevel::Size).unwrap();
        let site = jne.branch.unwrap();
        assert_eq!(site.condition, Some(5));
        assert_eq!(site.target, Value::symbol("foo"));
        assert!(jne.bytes.is_empty());

        let lp = encode_with("loop foo", Syntax::Intel, CodeMode::Code64, OptLevel::Size).unwrap();
        assert_eq!(lp.bytes, vec![0xE2, 0x00]);
        assert!(lp.fixups[0].branch);

        assert_eq!(intel("jmp rax"), [0xFF, 0xE0]);
    }

    #[test]
    fn far_jump_in_32_bit_mode() {
        let out = encode_with("ljmp $0x10, $0x1000", Syntax::Att, CodeMode::Code32, OptLevel::Size).unwrap();
        assert_eq!(out.bytes, vec![0xEA, 0x00, 0x10, 0x00, 0x00, 0x10, 0x00]);
    }

    #[test]
    fn symbolic_displacement_is_a_fixup() {
        let out = encode_with("mov eax, [rip+table]", Syntax::Intel, CodeMode::Code64, OptLevel::Size).unwrap();
        assert_eq!(out.bytes, vec![0x8B, 0x05, 0, 0, 0, 0]);
        let f = &out.fixups[0];
        assert!(f.pc_relative);
        assert_eq!((f.offset, f.to_end), (2, 4));

        let out = encode_with("cmp dword ptr [rip+x], 5", Syntax::Intel, CodeMode::Code64, OptLevel::Size).unwrap();
        assert_eq!(out.fixups[0].to_end, 5);
    }

    #[test]
    fn pinned_displacements() {
        assert_eq!(intel("{disp32} mov eax, [rax]"), [0x8B, 0x80, 0, 0, 0, 0]);
        assert_eq!(encode_kind("{disp8} mov eax, [rax+1000]"), EncodeError::ForcedDisp8Overflow);
    }

    #[test]
    fn segment_overrides() {
        assert_eq!(intel("mov eax, fs:[rax]"), [0x64, 0x8B, 0x00]);
        let mut warnings = Vec::new();
        let tokens = tokenize("movl %ds:(%rax), %eax").unwrap();
        let opts = ParseOptions {
            mode: CodeMode::Code64,
            syntax: Syntax::Att,
            cpu: CpuFeatures::all(),
            opt_level: OptLevel::Size,
            symbols: &NoSymbols,
        };
        let Statement::Insn(insn) = parse_statement(&tokens[..tokens.len() - 1], &opts, &mut warnings).unwrap() else {
            panic!("expected instruction");
        };
        let bound = match_template(
            &insn,
            &MatchOptions {
                cpu: CpuFeatures::all(),
                isa64: Isa64::Amd64,
                operand_check: CheckLevel::Warning,
            },
            &mut warnings,
        )
        .unwrap();
        let out = encode(&insn, &bound, &EncodeOptions::default(), &mut warnings).unwrap();
        assert_eq!(out.bytes, vec![0x8B, 0x00]);
        assert!(warnings.iter().any(|w| w.message.contains("redundant")));
    }

    #[test]
    fn string_ops_with_rep() {
        assert_eq!(intel("rep stosb"), [0xF3, 0xAA]);
        assert_eq!(att("movsq"), [0x48, 0xA5]);
    }

    #[test]
    fn encode_errors() {
        assert_eq!(encode_kind("mov sil, ah"), EncodeError::HighByteWithRex);
        assert_eq!(encode_kind("lock add eax, 1"), EncodeError::InvalidLockPrefix);
        assert_eq!(encode_kind("add [rax], 1"), EncodeError::AmbiguousOperandSize);
        match encode_with("addw $1, %eax", Syntax::Att, CodeMode::Code64, OptLevel::Size) {
            Err(AsmError::Encode {
                kind: EncodeError::RegisterSizeConflict { suffix, .. },
                ..
            }) => assert_eq!(suffix, 'w'),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn immediate_and_displacement_ranges() {
        assert!(matches!(
            encode_with("add al, 300", Syntax::Intel, CodeMode::Code64, OptLevel::Size),
            Err(AsmError::ImmediateOverflow { max: 255, .. })
        ));
        assert!(matches!(
            encode_with("mov eax, [rax+0x100000000]", Syntax::Intel, CodeMode::Code64, OptLevel::Size),
            Err(AsmError::DisplacementOverflow { .. })
        ));
    }

    #[test]
    fn padding_metadata() {
        let cmp = encode_with("cmp eax, ebx", Syntax::Intel, CodeMode::Code64, OptLevel::Size).unwrap();
        assert_eq!(cmp.flow, Some(BranchKinds::FUSED));
        assert_eq!(cmp.padding_prefix, Some(0x2E));
        let mov = encode_with("mov eax, [ebp]", Syntax::Intel, CodeMode::Code32, OptLevel::Size).unwrap();
        assert_eq!(mov.padding_prefix, Some(0x36));
        let ret = encode_with("ret", Syntax::Intel, CodeMode::Code64, OptLevel::Size).unwrap();
        assert_eq!(ret.flow, Some(BranchKinds::RET));
        assert_eq!(ret.padding_prefix, None);
        let cmp_mem = encode_with("cmp dword ptr [rax], 1", Syntax::Intel, CodeMode::Code64, OptLevel::Size).unwrap();
        assert_eq!(cmp_mem.flow, None);
    }
}
