//! Template selection.
//!
//! Each template of the statement's group runs through a fixed sequence of
//! checks; the first template to pass all of them is bound. When none
//! passes, the rejection from the latest check reached is reported (see
//! [`MatchError::rank`]).

use alloc::string::String;
use alloc::vec::Vec;

use log::{debug, trace, warn};

use crate::config::{AssemblerConfig, CheckLevel, CpuFeatures, Isa64, Syntax};
use crate::error::{AsmError, MatchError, Warning};
use crate::insn::{DirPin, EncodingPin, Insn};
use crate::operand::{MemRef, Operand};
use crate::optype::{Instance, OperandType, RegClass, TypeFlags};
use crate::register::{RegKind, Register};
use crate::template::{
    Group, InstructionTemplate, Masking, ModeReq, Modifiers, OpcodeSpace, Rounding, VecLen, VectorEncoding, Vsib,
    MAX_OPERANDS,
};

/// How a reversible template's operands were swapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reversal {
    /// Integer direction bit: opcode `^ 0x02`.
    Direction,
    /// SSE float move: opcode `^ 0x01`.
    SimdFloat,
    /// SSE/MMX integer move: opcode `^ 0x10`.
    SimdInt,
}

impl Reversal {
    const fn mask(self) -> u32 {
        match self {
            Reversal::Direction => 0x02,
            Reversal::SimdFloat => 0x01,
            Reversal::SimdInt => 0x10,
        }
    }
}

/// Outcome of the operand-shape check for one template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Operands fit in written order.
    Matched,
    /// Operands fit with the first and last swapped and the opcode changed.
    Reversed(Reversal),
    /// Operands fit with the first and last swapped, opcode unchanged.
    Commuted,
    /// No fit.
    Rejected(MatchError),
}

/// A selected template plus the transforms applied to reach it.
#[derive(Debug, Clone, Copy)]
pub struct Bound {
    /// The template.
    pub template: &'static InstructionTemplate,
    /// Its group.
    pub group: &'static Group,
    /// Suffix in effect (the alternate reading may supply one).
    pub suffix: Option<u8>,
    /// Opcode reversal, if any.
    pub reversal: Option<Reversal>,
    /// First and last operands swapped without an opcode change.
    pub commuted: bool,
    /// Operand types the template was matched with.
    pub types: [OperandType; MAX_OPERANDS],
}

impl Bound {
    /// Opcode bytes after reversal.
    #[must_use]
    pub fn opcode(&self) -> u32 {
        match self.reversal {
            Some(r) => self.template.opcode ^ r.mask(),
            None => self.template.opcode,
        }
    }

    /// Whether first and last operands sit in swapped slots.
    #[must_use]
    pub fn swapped(&self) -> bool {
        self.reversal.is_some() || self.commuted
    }

    /// The template slot operand `i` was matched against.
    #[must_use]
    pub fn slot(&self, i: usize) -> OperandType {
        self.template.operands[self.slot_index(i)]
    }

    /// Index of the template slot operand `i` was matched against.
    #[must_use]
    pub fn slot_index(&self, i: usize) -> usize {
        slot_index(i, self.template.operand_count(), self.swapped())
    }
}

fn slot_index(i: usize, n: usize, swapped: bool) -> usize {
    if swapped && n > 1 {
        if i == 0 {
            return n - 1;
        }
        if i == n - 1 {
            return 0;
        }
    }
    i
}

/// Matcher inputs that come from the configuration rather than the
/// statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchOptions {
    /// Available CPU features.
    pub cpu: CpuFeatures,
    /// 64-bit ISA flavor.
    pub isa64: Isa64,
    /// Gather/scatter register-overlap policy.
    pub operand_check: CheckLevel,
}

impl From<&AssemblerConfig> for MatchOptions {
    fn from(c: &AssemblerConfig) -> Self {
        Self {
            cpu: c.cpu,
            isa64: c.isa64,
            operand_check: c.operand_check,
        }
    }
}

/// Select the template for `insn`.
///
/// Tries the statement's group, then the alternate suffix reading if there
/// is one. Warnings are only reported for the template that is selected.
///
/// # Errors
///
/// `AsmError::Match` with the highest-ranked rejection seen.
pub fn match_template(insn: &Insn, opts: &MatchOptions, warnings: &mut Vec<Warning>) -> Result<Bound, AsmError> {
    let mut best: Option<MatchError> = None;
    let readings = core::iter::once((insn.group, insn.suffix))
        .chain(insn.alternate.map(|a| (a.group, Some(a.suffix))));
    for (group, suffix) in readings {
        let types = insn.operand_types(suffix);
        for template in group.templates {
            let mut scratch = Vec::new();
            match try_template(insn, template, suffix, &types, opts, &mut scratch) {
                Ok((reversal, commuted)) => {
                    debug!(
                        "{}: `{}' bound to opcode {:#x} ({:?}, reversal {:?})",
                        insn.span, group.name, template.opcode, template.encoding, reversal
                    );
                    for w in &scratch {
                        warn!("{}: {}", w.span, w.message);
                    }
                    warnings.append(&mut scratch);
                    return Ok(Bound {
                        template,
                        group,
                        suffix,
                        reversal,
                        commuted,
                        types,
                    });
                }
                Err(e) => {
                    trace!("{}: `{}' opcode {:#x} rejected: {}", insn.span, group.name, template.opcode, e);
                    if e.outranks(best) {
                        best = Some(e);
                    }
                }
            }
        }
    }
    Err(AsmError::Match {
        kind: best.unwrap_or(MatchError::NumberOfOperandsMismatch),
        mnemonic: String::from(insn.mnemonic.as_str()),
        span: insn.span,
    })
}

type Fit = (Option<Reversal>, bool);

fn try_template(
    insn: &Insn,
    t: &InstructionTemplate,
    suffix: Option<u8>,
    types: &[OperandType; MAX_OPERANDS],
    opts: &MatchOptions,
    warnings: &mut Vec<Warning>,
) -> Result<Fit, MatchError> {
    check_form(insn, t, suffix)?;
    let fit = match shape(insn, t, suffix, types) {
        Stage::Matched => (None, false),
        Stage::Reversed(r) => (Some(r), false),
        Stage::Commuted => (None, true),
        Stage::Rejected(e) => return Err(e),
    };
    let swapped = fit.0.is_some() || fit.1;
    check_operand_sizes(insn, t, swapped)?;
    check_vector(insn, t, opts, warnings)?;
    check_pin(insn, t)?;
    check_mode(insn, t, suffix, opts)?;
    check_cpu(insn, t, opts)?;
    Ok(fit)
}

/// Operand count, syntax and suffix.
fn check_form(insn: &Insn, t: &InstructionTemplate, suffix: Option<u8>) -> Result<(), MatchError> {
    if t.operand_count() != insn.operands.len() {
        return Err(MatchError::NumberOfOperandsMismatch);
    }
    let wrong_syntax = match insn.syntax {
        Syntax::Att => t.has(Modifiers::INTEL_ONLY),
        Syntax::Intel => t.has(Modifiers::ATT_ONLY),
    };
    if wrong_syntax {
        return Err(MatchError::UnsupportedSyntax);
    }
    if suffix.is_some_and(|s| t.bans_suffix(s)) {
        return Err(MatchError::InvalidInstructionSuffix);
    }
    Ok(())
}

/// Size of a memory operand as the template sees it: explicit, else the
/// one the suffix implies.
#[must_use]
pub fn memory_size(m: &MemRef, suffix: Option<u8>, t: &InstructionTemplate) -> Option<TypeFlags> {
    if m.size.is_some() {
        return m.size;
    }
    if t.has(Modifiers::IGNORE_SIZE) {
        return None;
    }
    let float = t.has(Modifiers::FLOAT_MEM);
    Some(match (suffix?, float) {
        (b's', true) => TypeFlags::DWORD,
        (b'l', true) => TypeFlags::QWORD,
        (b't', true) => TypeFlags::TBYTE,
        (b'b', false) => TypeFlags::BYTE,
        (b'w', _) => TypeFlags::WORD,
        (b'l', false) => TypeFlags::DWORD,
        (b'q', _) => TypeFlags::QWORD,
        _ => return None,
    })
}

/// Whether `given` can occupy `slot`.
#[must_use]
pub fn overlaps(given: OperandType, slot: OperandType) -> bool {
    let o = given.and(slot);
    let nonempty = o.class() != RegClass::None || !o.bits().difference(TypeFlags::SIZES).is_empty();
    nonempty
        && given.has(TypeFlags::BASE_INDEX) == o.has(TypeFlags::BASE_INDEX)
        && given.has(TypeFlags::JUMP_ABSOLUTE) == slot.has(TypeFlags::JUMP_ABSOLUTE)
        && (slot.instance() == Instance::None || given.instance() == slot.instance())
}

/// Size and overlap of every operand against the slots in one orientation.
fn fits(
    insn: &Insn,
    t: &InstructionTemplate,
    suffix: Option<u8>,
    types: &[OperandType; MAX_OPERANDS],
    swapped: bool,
) -> Result<(), MatchError> {
    let n = t.operand_count();
    for (i, op) in insn.operands.iter().enumerate() {
        let slot = t.operands[slot_index(i, n, swapped)];
        let given = types[i];
        let size_ok = match &op.operand {
            Operand::Register(_) => given.sizes().difference(slot.sizes()).is_empty(),
            Operand::Memory(m) if slot.is_memory() => {
                let broadcast = insn.vector.broadcast.is_some_and(|b| b.operand == i);
                broadcast || memory_size(m, suffix, t).map_or(true, |s| slot.has(s))
            }
            _ => true,
        };
        if !size_ok {
            return Err(MatchError::OperandSizeMismatch);
        }
    }
    for i in 0..insn.operands.len() {
        if !overlaps(types[i], t.operands[slot_index(i, n, swapped)]) {
            return Err(MatchError::OperandTypeMismatch);
        }
    }
    Ok(())
}

fn reversal_kind(t: &InstructionTemplate) -> Reversal {
    let vector = t
        .operands
        .iter()
        .any(|s| matches!(s.class(), RegClass::Simd | RegClass::Mmx));
    if vector && t.space != OpcodeSpace::Base {
        if t.opcode & 0xEE == 0x6E {
            Reversal::SimdInt
        } else {
            Reversal::SimdFloat
        }
    } else {
        Reversal::Direction
    }
}

/// Operand shapes, trying the reversed or commuted order when allowed.
fn shape(insn: &Insn, t: &InstructionTemplate, suffix: Option<u8>, types: &[OperandType; MAX_OPERANDS]) -> Stage {
    let reversible = t.has(Modifiers::D) && t.operand_count() >= 2;
    let commutable = t.has(Modifiers::COMMUTATIVE)
        && t.operand_count() == 2
        && !t.operands.iter().any(|s| matches!(s.class(), RegClass::Simd | RegClass::Mmx));

    let all_registers = insn.operands.iter().all(|o| o.operand.register().is_some());
    let prefer_reversed = reversible
        && all_registers
        && match insn.pins.dir {
            Some(DirPin::Load) => !t.has(Modifiers::LOAD),
            Some(DirPin::Store) => t.has(Modifiers::LOAD),
            None => false,
        };
    if prefer_reversed && fits(insn, t, suffix, types, true).is_ok() {
        return Stage::Reversed(reversal_kind(t));
    }

    let direct = match fits(insn, t, suffix, types, false) {
        Ok(()) => return Stage::Matched,
        Err(e) => e,
    };
    if !reversible && !commutable {
        return Stage::Rejected(direct);
    }
    match fits(insn, t, suffix, types, true) {
        Ok(()) if reversible => Stage::Reversed(reversal_kind(t)),
        Ok(()) => Stage::Commuted,
        Err(e) if e.outranks(Some(direct)) => Stage::Rejected(e),
        Err(_) => Stage::Rejected(direct),
    }
}

/// The size an operand pins for operand-size agreement.
fn pinned_size(insn: &Insn, i: usize) -> Option<TypeFlags> {
    match &insn.operands[i].operand {
        Operand::Register(r) if matches!(r.op_type().class(), RegClass::Gpr | RegClass::Simd) => {
            Some(r.op_type().sizes())
        }
        Operand::Memory(m) if !insn.vector.broadcast.is_some_and(|b| b.operand == i) => m.size,
        _ => None,
    }
}

fn check_operand_sizes(insn: &Insn, t: &InstructionTemplate, swapped: bool) -> Result<(), MatchError> {
    if !t.has(Modifiers::CHECK_OPERAND_SIZE) {
        return Ok(());
    }
    let n = t.operand_count();
    for i in 1..n {
        let (a, b) = (
            t.operands[slot_index(i - 1, n, swapped)],
            t.operands[slot_index(i, n, swapped)],
        );
        if a.size_count() <= 1 || b.size_count() <= 1 {
            continue;
        }
        if let (Some(x), Some(y)) = (pinned_size(insn, i - 1), pinned_size(insn, i)) {
            if x != y {
                return Err(MatchError::RegisterTypeMismatch);
            }
        }
    }
    Ok(())
}

/// Vector length in bytes the template will encode.
#[must_use]
pub fn vector_bytes(t: &InstructionTemplate, insn: &Insn) -> u16 {
    let len = match t.encoding {
        VectorEncoding::Legacy => return 16,
        VectorEncoding::Vex(l) | VectorEncoding::Evex(l) => l,
    };
    match len {
        VecLen::L128 | VecLen::Ignored => 16,
        VecLen::L256 => 32,
        VecLen::L512 => 64,
        VecLen::Dynamic => {
            let widest = insn
                .operands
                .iter()
                .filter_map(|o| o.operand.register())
                .map(|r| r.vector_bytes())
                .max()
                .unwrap_or(0);
            if widest != 0 {
                return widest;
            }
            match insn.memory().and_then(|m| m.size) {
                Some(s) if s == TypeFlags::ZMMWORD => 64,
                Some(s) if s == TypeFlags::YMMWORD => 32,
                _ => 16,
            }
        }
    }
}

fn check_vector(
    insn: &Insn,
    t: &InstructionTemplate,
    opts: &MatchOptions,
    warnings: &mut Vec<Warning>,
) -> Result<(), MatchError> {
    let mem = insn.memory();

    // VSIB
    let index_kind = mem.filter(|m| m.vsib).and_then(|m| m.index).map(|r| r.kind());
    let wanted = match t.vsib {
        Vsib::None => None,
        Vsib::Xmm => Some(RegKind::Xmm),
        Vsib::Ymm => Some(RegKind::Ymm),
        Vsib::Zmm => Some(RegKind::Zmm),
    };
    if index_kind != wanted {
        return Err(MatchError::InvalidVsibAddress);
    }
    if wanted.is_some() {
        check_gather_registers(insn, t, opts, warnings)?;
    }

    // Broadcast
    if let Some(b) = insn.vector.broadcast {
        let Some(element) = t.broadcast else {
            return Err(MatchError::UnsupportedBroadcast);
        };
        if u16::from(b.count) * u16::from(element) != vector_bytes(t, insn) {
            return Err(MatchError::UnsupportedBroadcast);
        }
    }

    // Masking
    let v = &insn.vector;
    if let Some(k) = v.mask {
        if t.masking == Masking::None || k.num() == 0 {
            return Err(MatchError::UnsupportedMasking);
        }
    } else if t.masking == Masking::Required {
        return Err(MatchError::UnsupportedMasking);
    }
    if v.zeroing {
        let dest_unzeroable = insn.operands.last().is_some_and(|o| match &o.operand {
            Operand::Register(r) => r.kind() == RegKind::Mask,
            Operand::Memory(_) => true,
            Operand::Immediate(_) => false,
        });
        if v.mask.is_none() || t.masking != Masking::Dynamic || dest_unzeroable {
            return Err(MatchError::UnsupportedMasking);
        }
    }

    // Rounding / SAE
    if let Some(rc) = v.rounding {
        match t.rounding {
            Rounding::None => return Err(MatchError::UnsupportedRoundingOrSae),
            Rounding::Sae if rc.rc().is_some() => {
                if !t.encoding.is_lig() {
                    return Err(MatchError::UnsupportedRoundingOrSae);
                }
                warnings.push(Warning {
                    message: String::from("rounding control ignored: only {sae} is supported here"),
                    span: insn.span,
                });
            }
            _ => {}
        }
        if mem.is_some() {
            return Err(MatchError::UnsupportedRoundingOrSae);
        }
        let has_zmm = insn
            .operands
            .iter()
            .any(|o| o.operand.register().is_some_and(|r| r.kind() == RegKind::Zmm));
        if !t.encoding.is_lig() && !has_zmm {
            return Err(MatchError::UnsupportedRoundingOrSae);
        }
    }
    Ok(())
}

/// Gather destination, index and mask must be distinct registers.
fn check_gather_registers(
    insn: &Insn,
    t: &InstructionTemplate,
    opts: &MatchOptions,
    warnings: &mut Vec<Warning>,
) -> Result<(), MatchError> {
    let Some(dest) = insn.operands.last().and_then(|o| o.operand.register()) else {
        return Ok(());
    };
    let Some(index) = insn.memory().and_then(|m| m.index) else {
        return Ok(());
    };
    let vex_mask = if t.encoding.is_vex() {
        insn.operands.first().and_then(|o| o.operand.register())
    } else {
        None
    };
    let clash = dest.num() == index.num()
        || vex_mask.is_some_and(|m: Register| m.num() == dest.num() || m.num() == index.num());
    if !clash {
        return Ok(());
    }
    match opts.operand_check {
        CheckLevel::None => Ok(()),
        CheckLevel::Warning => {
            warnings.push(Warning {
                message: String::from("mask, index, and destination registers should be distinct"),
                span: insn.span,
            });
            Ok(())
        }
        CheckLevel::Error => Err(MatchError::InvalidVectorRegisterSet),
    }
}

fn check_pin(insn: &Insn, t: &InstructionTemplate) -> Result<(), MatchError> {
    match insn.pins.encoding {
        Some(EncodingPin::Vex | EncodingPin::Vex3) if !t.encoding.is_vex() => return Err(MatchError::NoVexEncoding),
        Some(EncodingPin::Evex) if !t.encoding.is_evex() => return Err(MatchError::NoEvexEncoding),
        _ => {}
    }
    if t.encoding.is_vex() {
        let index = insn.memory().and_then(|m| m.index);
        let high = insn
            .operands
            .iter()
            .filter_map(|o| o.operand.register())
            .chain(index)
            .any(|r| r.is_vector() && r.is_evex_extended());
        if high {
            return Err(MatchError::NoVexEncoding);
        }
    }
    Ok(())
}

fn check_mode(insn: &Insn, t: &InstructionTemplate, suffix: Option<u8>, opts: &MatchOptions) -> Result<(), MatchError> {
    let is_64 = insn.mode.is_64();
    let mode_ok = match t.mode {
        ModeReq::Any => true,
        ModeReq::Only64 => is_64,
        ModeReq::No64 => !is_64,
    };
    if !mode_ok || (suffix == Some(b'q') && !is_64) {
        return Err(MatchError::Unsupported64Bit);
    }
    if is_64 && t.isa64.is_some_and(|isa| isa != opts.isa64) {
        return Err(MatchError::UnsupportedOnArch);
    }
    Ok(())
}

fn check_cpu(insn: &Insn, t: &InstructionTemplate, opts: &MatchOptions) -> Result<(), MatchError> {
    let mut needed = t.cpu;
    if t.encoding.is_evex() && !t.encoding.is_lig() && vector_bytes(t, insn) < 64 {
        needed |= CpuFeatures::AVX512VL;
    }
    for op in &insn.operands {
        match &op.operand {
            Operand::Register(r) => needed |= r.required_features(),
            Operand::Memory(m) => {
                for r in m.base.iter().chain(m.index.iter()) {
                    needed |= r.required_features();
                }
            }
            Operand::Immediate(_) => {}
        }
    }
    if let Some(k) = insn.vector.mask {
        needed |= k.required_features();
    }
    if opts.cpu.contains(needed) {
        Ok(())
    } else {
        Err(MatchError::UnsupportedOnArch)
    }
}
