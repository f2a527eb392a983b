//! The static template data.
//!
//! Groups are sorted by mnemonic for binary search. Condition-code families
//! (`jcc`, `setcc`, `cmovcc`) live in their own 16-entry tables and are
//! reached through [`condition_code`].

use super::{
    Disp8Shift as D8, Group, InstructionTemplate as T, JumpKind, Masking, Modifiers as M, Rounding,
    SizeClass, VecLen, Vsib,
};
use crate::config::{CpuFeatures as C, Isa64};
use crate::optype::{Instance, OperandType as O, RegClass, TypeFlags as F};

// ── Operand slots ───────────────────────────────────────────────────────

const MEM_FORMS: F = F::BASE_INDEX
    .union(F::DISP8)
    .union(F::DISP16)
    .union(F::DISP32)
    .union(F::DISP64)
    .union(F::UNSPECIFIED);

const fn gpr(sizes: F) -> O {
    O::reg(RegClass::Gpr, sizes)
}

const fn simd(sizes: F) -> O {
    O::reg(RegClass::Simd, sizes)
}

const W_D_Q: F = F::WORD.union(F::DWORD).union(F::QWORD);

const R8: O = gpr(F::BYTE);
const R32: O = gpr(F::DWORD);
const R64: O = gpr(F::QWORD);
const R16_32: O = gpr(F::WORD.union(F::DWORD));
const R16_64: O = gpr(F::WORD.union(F::QWORD));
const R32_64: O = gpr(F::DWORD.union(F::QWORD));
const R16_32_64: O = gpr(W_D_Q);
const R8_16_32: O = gpr(F::BYTE.union(F::WORD).union(F::DWORD));
const RALL: O = gpr(F::GPR_SIZES);
const RM8: O = R8.with(MEM_FORMS);
const RM16: O = gpr(F::WORD).with(MEM_FORMS);
const RM_ALL: O = RALL.with(MEM_FORMS);
const RM16_32: O = R16_32.with(MEM_FORMS);
const RM16_64: O = R16_64.with(MEM_FORMS);
const RM16_32_64: O = R16_32_64.with(MEM_FORMS);
const RM32: O = R32.with(MEM_FORMS);
const RM32_64: O = R32_64.with(MEM_FORMS);
const SEG_RM: O = R16_32_64.with(MEM_FORMS);

const ACC_ALL: O = RALL.with_instance(Instance::Accum);
const ACC_BWD: O = R8_16_32.with_instance(Instance::Accum);
const ACC16_64: O = R16_32_64.with_instance(Instance::Accum);
const SHIFT_COUNT: O = R8.with_instance(Instance::RegC);
const IO_PORT: O = gpr(F::WORD).with_instance(Instance::RegD);

const SEG: O = O::reg(RegClass::Segment, F::empty());
const CTRL: O = O::reg(RegClass::Control, F::empty());
const DBG: O = O::reg(RegClass::Debug, F::empty());
const FPU: O = O::reg(RegClass::Fpu, F::empty());
const ST0: O = FPU.with_instance(Instance::Accum);
const MMX: O = O::reg(RegClass::Mmx, F::QWORD);
const MMX_M: O = MMX.with(MEM_FORMS);
const KREG: O = O::reg(RegClass::Mask, F::empty());
const K_M16: O = KREG.with(MEM_FORMS.union(F::WORD));

const XMM: O = simd(F::XMMWORD);
const YMM: O = simd(F::YMMWORD);
const ZMM: O = simd(F::ZMMWORD);
const XY: O = simd(F::XMMWORD.union(F::YMMWORD));
const XMM0: O = XMM.with_instance(Instance::Accum);
const XMM_M: O = XMM.with(MEM_FORMS);
const XMM_M32: O = XMM.with(MEM_FORMS.union(F::DWORD));
const XMM_M64: O = XMM.with(MEM_FORMS.union(F::QWORD));
const YMM_M: O = YMM.with(MEM_FORMS);
const ZMM_M: O = ZMM.with(MEM_FORMS);
const XY_M: O = XY.with(MEM_FORMS);

const MEM_ANY: O = O::flags(MEM_FORMS.union(F::SIZES));
const M16_64: O = O::flags(MEM_FORMS.union(W_D_Q));
const M16: O = O::flags(MEM_FORMS.union(F::WORD));
const M32: O = O::flags(MEM_FORMS.union(F::DWORD));
const M64: O = O::flags(MEM_FORMS.union(F::QWORD));
const M80: O = O::flags(MEM_FORMS.union(F::TBYTE));
const VSIB_MEM: O = O::flags(MEM_FORMS.union(F::DWORD));

const MOFFS32: O = O::flags(
    F::DISP16
        .union(F::DISP32)
        .union(F::UNSPECIFIED)
        .union(F::BYTE)
        .union(F::WORD)
        .union(F::DWORD),
);
const MOFFS64: O = O::flags(F::DISP64.union(F::UNSPECIFIED).union(F::GPR_SIZES));

const BRANCH: O = O::flags(F::DISP8.union(F::DISP16).union(F::DISP32));
const NEAR_CALL: O = O::flags(F::DISP16.union(F::DISP32));
const IND16_32: O = R16_32
    .with(MEM_FORMS)
    .with(F::JUMP_ABSOLUTE);
const IND64: O = R16_64.with(MEM_FORMS).with(F::JUMP_ABSOLUTE);
const FAR_MEM: O = O::flags(MEM_FORMS.union(F::FWORD).union(F::JUMP_ABSOLUTE));

const IMM1: O = O::flags(F::IMM1);
const IMM8: O = O::flags(F::IMM8);
const IMM8S: O = O::flags(F::IMM8S);
const IMM16: O = O::flags(F::IMM16);
const IMM64: O = O::flags(F::IMM64);
const IMM16_32: O = O::flags(F::IMM16.union(F::IMM32));
const IMM16_32S: O = O::flags(F::IMM16.union(F::IMM32S));
const IMM_BWL: O = O::flags(F::IMM8.union(F::IMM16).union(F::IMM32));
const IMM_W: O = O::flags(F::IMM8.union(F::IMM16).union(F::IMM32).union(F::IMM32S));

// ── Modifier shorthands ─────────────────────────────────────────────────

const NONE: M = M::empty();
const NO_SUF: M = M::NO_SUF;
const SSE_GPR_SUF: M = M::NO_BSUF.union(M::NO_WSUF);
const ALU_REG: M = M::D.union(M::W).union(M::CHECK_OPERAND_SIZE);
const STACK64: M = M::DEFAULT_SIZE
    .union(M::NO_REX64)
    .union(M::NO_BSUF)
    .union(M::NO_LSUF);
const STACK32: M = M::DEFAULT_SIZE.union(M::NO_BQSUF);
const FLOAT: M = M::FLOAT_MEM
    .union(M::NO_BSUF)
    .union(M::NO_WSUF)
    .union(M::NO_QSUF);

const VL: C = C::AVX512F.union(C::AVX512VL);

// ── Families ────────────────────────────────────────────────────────────

/// `add`-style binary arithmetic.
const fn alu(base: u32, digit: u8, lock: M) -> [T; 4] {
    [
        T::op(base).modrm().m(ALU_REG.union(lock)).ops(&[RALL, RM_ALL]),
        T::op(0x83).digit(digit).m(M::NO_BSUF.union(lock)).ops(&[IMM8S, RM16_32_64]),
        T::op(base + 4).m(M::W).ops(&[IMM_W, ACC_ALL]),
        T::op(0x80).digit(digit).m(M::W.union(lock)).ops(&[IMM_W, RM_ALL]),
    ]
}

const fn shift(digit: u8) -> [T; 4] {
    [
        T::op(0xD0).digit(digit).m(M::W).ops(&[IMM1, RM_ALL]),
        T::op(0xC0).digit(digit).m(M::W).cpu(C::I186).ops(&[IMM8, RM_ALL]),
        T::op(0xD2).digit(digit).m(M::W).ops(&[SHIFT_COUNT, RM_ALL]),
        T::op(0xD0).digit(digit).m(M::W).ops(&[RM_ALL]),
    ]
}

const fn unary(digit: u8, lock: M) -> [T; 1] {
    [T::op(0xF6).digit(digit).m(M::W.union(lock)).ops(&[RM_ALL])]
}

const fn simple(opcode: u32) -> [T; 1] {
    [T::op(opcode).m(NO_SUF)]
}

const fn simple_0f(opcode: u32, cpu: C) -> [T; 1] {
    [T::op(opcode).map0f().m(NO_SUF).cpu(cpu)]
}

const fn sized(opcode: u32, size: SizeClass) -> [T; 1] {
    [T::op(opcode).m(NO_SUF).size(size)]
}

const fn sized64(opcode: u32) -> [T; 1] {
    [T::op(opcode).m(NO_SUF).size(SizeClass::Size64).only64()]
}

const fn byte_jump(opcode: u32, addr: M) -> [T; 1] {
    [T::op(opcode).m(NO_SUF.union(addr)).jump(JumpKind::Byte).ops(&[BRANCH])]
}

const fn string(opcode: u32) -> [T; 1] {
    [T::op(opcode).m(M::W.union(M::REP))]
}

const fn bit_count(opcode: u32, cpu: C) -> [T; 1] {
    [T::op(opcode)
        .map0f()
        .pf3()
        .modrm()
        .m(M::CHECK_OPERAND_SIZE.union(M::NO_BSUF))
        .cpu(cpu)
        .ops(&[RM16_32_64, R16_32_64])]
}

/// Legacy SSE `op xmm/m, xmm`.
const fn sse(opcode: u32, cpu: C, rm: O) -> [T; 1] {
    [T::op(opcode).map0f().modrm().m(NO_SUF).cpu(cpu).ops_rm(rm)]
}

const fn sse66(opcode: u32, cpu: C, rm: O) -> [T; 1] {
    [T::op(opcode).map0f().p66().modrm().m(NO_SUF).cpu(cpu).ops_rm(rm)]
}

const fn ssef3(opcode: u32, rm: O) -> [T; 1] {
    [T::op(opcode).map0f().pf3().modrm().m(NO_SUF).cpu(C::SSE).ops_rm(rm)]
}

const fn ssef2(opcode: u32, rm: O) -> [T; 1] {
    [T::op(opcode).map0f().pf2().modrm().m(NO_SUF).cpu(C::SSE2).ops_rm(rm)]
}

/// SSE2 integer op with its MMX sibling.
const fn sse_int(opcode: u32, commutative: M) -> [T; 2] {
    [
        T::op(opcode).map0f().p66().modrm().m(NO_SUF.union(commutative)).cpu(C::SSE2).ops(&[XMM_M, XMM]),
        T::op(opcode).map0f().modrm().m(NO_SUF.union(commutative)).cpu(C::MMX).ops(&[MMX_M, MMX]),
    ]
}

/// Packed single arithmetic: VEX, EVEX.512 and EVEX.128/256.
const fn v_ps(opcode: u32, commutative: M, rounding: Rounding, evex_cpu: C) -> [T; 3] {
    let base = T::op(opcode).map0f().modrm().m(commutative.union(M::CHECK_OPERAND_SIZE)).vvvv(1);
    [
        base.vex(VecLen::Dynamic).cpu(C::AVX).ops(&[XY_M, XY, XY]),
        base.evex(VecLen::L512)
            .w0()
            .mask(Masking::Dynamic)
            .bcst(4)
            .rounding(rounding)
            .cpu(evex_cpu)
            .ops(&[ZMM_M, ZMM, ZMM]),
        base.evex(VecLen::Dynamic)
            .w0()
            .mask(Masking::Dynamic)
            .bcst(4)
            .cpu(evex_cpu.union(C::AVX512VL))
            .ops(&[XY_M, XY, XY]),
    ]
}

const fn v_pd(opcode: u32, commutative: M, rounding: Rounding) -> [T; 3] {
    let base = T::op(opcode)
        .map0f()
        .p66()
        .modrm()
        .m(commutative.union(M::CHECK_OPERAND_SIZE))
        .vvvv(1);
    [
        base.vex(VecLen::Dynamic).cpu(C::AVX).ops(&[XY_M, XY, XY]),
        base.evex(VecLen::L512)
            .w1()
            .mask(Masking::Dynamic)
            .bcst(8)
            .rounding(rounding)
            .cpu(C::AVX512F)
            .ops(&[ZMM_M, ZMM, ZMM]),
        base.evex(VecLen::Dynamic)
            .w1()
            .mask(Masking::Dynamic)
            .bcst(8)
            .cpu(VL)
            .ops(&[XY_M, XY, XY]),
    ]
}

/// Scalar arithmetic: VEX.LIG and EVEX.LIG with static rounding.
const fn v_scalar(opcode: u32, double: bool) -> [T; 2] {
    let base = T::op(opcode).map0f().modrm().vvvv(1);
    let base = if double { base.pf2() } else { base.pf3() };
    let rm = if double { XMM_M64 } else { XMM_M32 };
    let evex = base
        .evex(VecLen::Ignored)
        .mask(Masking::Dynamic)
        .rounding(Rounding::Static)
        .cpu(C::AVX512F);
    let evex = if double {
        evex.w1().disp8(D8::Scale(3))
    } else {
        evex.w0().disp8(D8::Scale(2))
    };
    [
        base.vex(VecLen::Ignored).cpu(C::AVX).ops_scalar(rm),
        evex.ops_scalar(rm),
    ]
}

/// VEX integer op split into AVX (128) and AVX2 (256) forms, plus EVEX.
const fn v_int(opcode: u32, space: super::OpcodeSpace, evex_w: u8, bcst: Option<u8>, evex_cpu: C, commutative: M) -> [T; 4] {
    let base = T::op(opcode).space(space).p66().modrm().vvvv(1).m(commutative);
    let evex = base.evex(VecLen::L512).mask(Masking::Dynamic).cpu(evex_cpu);
    let evex = if evex_w == 1 { evex.w1() } else { evex.w0() };
    let evex = match bcst {
        Some(b) => evex.bcst(b),
        None => evex,
    };
    [
        base.vex(VecLen::L128).cpu(C::AVX).ops(&[XMM_M, XMM, XMM]),
        base.vex(VecLen::L256).cpu(C::AVX2).ops(&[YMM_M, YMM, YMM]),
        evex.ops(&[ZMM_M, ZMM, ZMM]),
        evex.evex(VecLen::Dynamic).cpu(C::AVX512VL).m(M::CHECK_OPERAND_SIZE).ops(&[XY_M, XY, XY]),
    ]
}

/// EVEX-only integer op (`vpxord`).
const fn e_int(opcode: u32, w1: bool, bcst: u8) -> [T; 2] {
    let base = T::op(opcode)
        .map0f()
        .p66()
        .modrm()
        .vvvv(1)
        .m(M::COMMUTATIVE)
        .evex(VecLen::L512)
        .mask(Masking::Dynamic)
        .bcst(bcst)
        .cpu(C::AVX512F);
    let base = if w1 { base.w1() } else { base.w0() };
    [
        base.ops(&[ZMM_M, ZMM, ZMM]),
        base.evex(VecLen::Dynamic).cpu(C::AVX512VL).m(M::CHECK_OPERAND_SIZE).ops(&[XY_M, XY, XY]),
    ]
}

/// EVEX full-vector move with load direction (`vmovdqa32`).
const fn e_mov(opcode: u32, prefix_f3: bool, w1: bool) -> [T; 2] {
    let base = T::op(opcode).map0f().modrm().m(M::D.union(M::LOAD)).mask(Masking::Dynamic);
    let base = if prefix_f3 { base.pf3() } else { base.p66() };
    let base = base.evex(VecLen::L512).cpu(C::AVX512F);
    let base = if w1 { base.w1() } else { base.w0() };
    [
        base.ops(&[ZMM_M, ZMM]),
        base.evex(VecLen::Dynamic).cpu(C::AVX512VL).m(M::CHECK_OPERAND_SIZE).ops(&[XY_M, XY]),
    ]
}

impl T {
    const fn ops_rm(self, rm: O) -> T {
        match rm.bits().bits() {
            b if b == XMM_M32.bits().bits() => self.ops(&[XMM_M32, XMM]),
            b if b == XMM_M64.bits().bits() => self.ops(&[XMM_M64, XMM]),
            _ => self.ops(&[XMM_M, XMM]),
        }
    }

    const fn ops_scalar(self, rm: O) -> T {
        if rm.bits().bits() == XMM_M64.bits().bits() {
            self.ops(&[XMM_M64, XMM, XMM])
        } else {
            self.ops(&[XMM_M32, XMM, XMM])
        }
    }
}

// ── Condition-code families ─────────────────────────────────────────────

const fn jcc_table() -> [[T; 1]; 16] {
    let mut out = [[T::op(0x70)]; 16];
    let mut cc = 0;
    while cc < 16 {
        out[cc] = [T::op(0x70 + cc as u32).m(NO_SUF).jump(JumpKind::Relaxable).ops(&[BRANCH])];
        cc += 1;
    }
    out
}

const fn setcc_table() -> [[T; 1]; 16] {
    let mut out = [[T::op(0x90)]; 16];
    let mut cc = 0;
    while cc < 16 {
        out[cc] = [T::op(0x90 + cc as u32)
            .map0f()
            .digit(0)
            .m(M::NO_WSUF.union(M::NO_LSUF).union(M::NO_QSUF))
            .cpu(C::I386)
            .ops(&[RM8])];
        cc += 1;
    }
    out
}

const fn cmovcc_table() -> [[T; 1]; 16] {
    let mut out = [[T::op(0x40)]; 16];
    let mut cc = 0;
    while cc < 16 {
        out[cc] = [T::op(0x40 + cc as u32)
            .map0f()
            .modrm()
            .m(M::CHECK_OPERAND_SIZE.union(M::NO_BSUF))
            .cpu(C::CMOV)
            .ops(&[RM16_32_64, R16_32_64])];
        cc += 1;
    }
    out
}

static JCC_T: [[T; 1]; 16] = jcc_table();
static SETCC_T: [[T; 1]; 16] = setcc_table();
static CMOVCC_T: [[T; 1]; 16] = cmovcc_table();

macro_rules! cc_family {
    ($name:ident, $templates:ident, [$($m:literal = $cc:literal),* $(,)?]) => {
        pub(crate) static $name: [Group; 16] = [
            $(Group { name: $m, templates: &$templates[$cc] }),*
        ];
    };
}

cc_family!(JCC, JCC_T, [
    "jo" = 0, "jno" = 1, "jb" = 2, "jae" = 3, "je" = 4, "jne" = 5, "jbe" = 6, "ja" = 7,
    "js" = 8, "jns" = 9, "jp" = 10, "jnp" = 11, "jl" = 12, "jge" = 13, "jle" = 14, "jg" = 15,
]);
cc_family!(SETCC, SETCC_T, [
    "seto" = 0, "setno" = 1, "setb" = 2, "setae" = 3, "sete" = 4, "setne" = 5, "setbe" = 6,
    "seta" = 7, "sets" = 8, "setns" = 9, "setp" = 10, "setnp" = 11, "setl" = 12, "setge" = 13,
    "setle" = 14, "setg" = 15,
]);
cc_family!(CMOVCC, CMOVCC_T, [
    "cmovo" = 0, "cmovno" = 1, "cmovb" = 2, "cmovae" = 3, "cmove" = 4, "cmovne" = 5,
    "cmovbe" = 6, "cmova" = 7, "cmovs" = 8, "cmovns" = 9, "cmovp" = 10, "cmovnp" = 11,
    "cmovl" = 12, "cmovge" = 13, "cmovle" = 14, "cmovg" = 15,
]);

const CONDITIONS: &[(&str, u8)] = &[
    ("o", 0),
    ("no", 1),
    ("b", 2),
    ("c", 2),
    ("nae", 2),
    ("ae", 3),
    ("nb", 3),
    ("nc", 3),
    ("e", 4),
    ("z", 4),
    ("ne", 5),
    ("nz", 5),
    ("be", 6),
    ("na", 6),
    ("a", 7),
    ("nbe", 7),
    ("s", 8),
    ("ns", 9),
    ("p", 10),
    ("pe", 10),
    ("np", 11),
    ("po", 11),
    ("l", 12),
    ("nge", 12),
    ("ge", 13),
    ("nl", 13),
    ("le", 14),
    ("ng", 14),
    ("g", 15),
    ("nle", 15),
];

/// Condition-code number of a suffix such as `nz` or `ae`.
pub(crate) fn condition_code(name: &str) -> Option<u8> {
    CONDITIONS.iter().find(|(n, _)| *n == name).map(|&(_, cc)| cc)
}

// ── Groups ──────────────────────────────────────────────────────────────

macro_rules! groups {
    ($($name:literal => $templates:expr),* $(,)?) => {
        /// All non-condition-code groups, sorted by mnemonic.
        pub static GROUPS: &[Group] = &[$(Group { name: $name, templates: &$templates }),*];
    };
}

groups! {
    "adc" => alu(0x10, 2, M::LOCKABLE),
    "add" => alu(0x00, 0, M::LOCKABLE),
    "addpd" => sse66(0x58, C::SSE2, XMM_M),
    "addps" => sse(0x58, C::SSE, XMM_M),
    "addsd" => ssef2(0x58, XMM_M64),
    "addss" => ssef3(0x58, XMM_M32),
    "and" => alu(0x20, 4, M::LOCKABLE),
    "andpd" => sse66(0x54, C::SSE2, XMM_M),
    "andps" => sse(0x54, C::SSE, XMM_M),
    "blendvps" => [T::op(0x14).map0f38().p66().modrm().m(NO_SUF).cpu(C::SSE4_1).ops(&[XMM0, XMM_M, XMM])],
    "bswap" => [T::op(0xC8).map0f().m(M::SHORT_FORM.union(M::NO_BSUF).union(M::NO_WSUF)).cpu(C::I486).ops(&[R32_64])],
    "call" => [
        T::op(0xE8).m(NO_SUF.union(M::DEFAULT_SIZE).union(M::NO_REX64)).jump(JumpKind::Dword).ops(&[NEAR_CALL]),
        T::op(0x9A).m(NO_SUF).no64().jump(JumpKind::InterSegment).ops(&[IMM16, IMM16_32]),
        T::op(0xFF).digit(2).m(STACK32).no64().ops(&[IND16_32]),
        T::op(0xFF).digit(2).m(STACK64).only64().ops(&[IND64]),
    ],
    "cbtw" => sized(0x98, SizeClass::Size16),
    "cbw" => sized(0x98, SizeClass::Size16),
    "cdq" => sized(0x99, SizeClass::Size32),
    "cdqe" => sized64(0x98),
    "clc" => simple(0xF8),
    "cld" => simple(0xFC),
    "cli" => simple(0xFA),
    "cltd" => sized(0x99, SizeClass::Size32),
    "cltq" => sized64(0x98),
    "cmc" => simple(0xF5),
    "cmp" => alu(0x38, 7, NONE),
    "comiss" => sse(0x2F, C::SSE, XMM_M32),
    "cpuid" => simple_0f(0xA2, C::I586),
    "cqo" => sized64(0x99),
    "cqto" => sized64(0x99),
    "cvtsi2sd" => [T::op(0x2A).map0f().pf2().modrm().m(SSE_GPR_SUF).cpu(C::SSE2).ops(&[RM32_64, XMM])],
    "cvtsi2ss" => [T::op(0x2A).map0f().pf3().modrm().m(SSE_GPR_SUF).cpu(C::SSE).ops(&[RM32_64, XMM])],
    "cvttsd2si" => [T::op(0x2C).map0f().pf2().modrm().m(SSE_GPR_SUF).cpu(C::SSE2).ops(&[XMM_M64, R32_64])],
    "cwd" => sized(0x99, SizeClass::Size16),
    "cwde" => sized(0x98, SizeClass::Size32),
    "cwtd" => sized(0x99, SizeClass::Size16),
    "cwtl" => sized(0x98, SizeClass::Size32),
    "dec" => [
        T::op(0x48).m(M::SHORT_FORM.union(M::NO_BQSUF)).no64().ops(&[R16_32]),
        T::op(0xFE).digit(1).m(M::W.union(M::LOCKABLE)).ops(&[RM_ALL]),
    ],
    "div" => unary(6, NONE),
    "divps" => sse(0x5E, C::SSE, XMM_M),
    "emms" => simple_0f(0x77, C::MMX),
    "faddp" => [
        T::op(0xDEC0).m(NO_SUF.union(M::SHORT_FORM)).cpu(C::X87).ops(&[ST0, FPU]),
        T::op(0xDEC1).m(NO_SUF).cpu(C::X87),
    ],
    "fld" => [
        T::op(0xD9).digit(0).m(FLOAT).cpu(C::X87).ops(&[M32]),
        T::op(0xDD).digit(0).m(FLOAT).cpu(C::X87).ops(&[M64]),
        T::op(0xDB).digit(5).m(FLOAT).cpu(C::X87).ops(&[M80]),
        T::op(0xD9C0).m(NO_SUF.union(M::SHORT_FORM)).cpu(C::X87).ops(&[FPU]),
    ],
    "fldz" => [T::op(0xD9EE).m(NO_SUF).cpu(C::X87)],
    "fninit" => [T::op(0xDBE3).m(NO_SUF).cpu(C::X87)],
    "fstp" => [
        T::op(0xD9).digit(3).m(FLOAT).cpu(C::X87).ops(&[M32]),
        T::op(0xDD).digit(3).m(FLOAT).cpu(C::X87).ops(&[M64]),
        T::op(0xDB).digit(7).m(FLOAT).cpu(C::X87).ops(&[M80]),
        T::op(0xDDD8).m(NO_SUF.union(M::SHORT_FORM)).cpu(C::X87).ops(&[FPU]),
    ],
    "fxch" => [
        T::op(0xD9C8).m(NO_SUF.union(M::SHORT_FORM)).cpu(C::X87).ops(&[FPU]),
        T::op(0xD9C9).m(NO_SUF).cpu(C::X87),
    ],
    "hlt" => simple(0xF4),
    "idiv" => unary(7, NONE),
    "imul" => [
        T::op(0xF6).digit(5).m(M::W).ops(&[RM_ALL]),
        T::op(0xAF).map0f().modrm().m(M::CHECK_OPERAND_SIZE.union(M::NO_BSUF)).cpu(C::I386).ops(&[RM16_32_64, R16_32_64]),
        T::op(0x6B).modrm().m(M::CHECK_OPERAND_SIZE.union(M::NO_BSUF)).cpu(C::I186).ops(&[IMM8S, RM16_32_64, R16_32_64]),
        T::op(0x69).modrm().m(M::CHECK_OPERAND_SIZE.union(M::NO_BSUF)).cpu(C::I186).ops(&[IMM16_32S, RM16_32_64, R16_32_64]),
    ],
    "in" => [
        T::op(0xE4).m(M::W.union(M::NO_QSUF)).ops(&[IMM8, ACC_BWD]),
        T::op(0xEC).m(M::W.union(M::NO_QSUF)).ops(&[IO_PORT, ACC_BWD]),
    ],
    "inc" => [
        T::op(0x40).m(M::SHORT_FORM.union(M::NO_BQSUF)).no64().ops(&[R16_32]),
        T::op(0xFE).digit(0).m(M::W.union(M::LOCKABLE)).ops(&[RM_ALL]),
    ],
    "int" => [T::op(0xCD).m(NO_SUF).ops(&[IMM8])],
    "int3" => simple(0xCC),
    "into" => [T::op(0xCE).m(NO_SUF).no64()],
    "jcxz" => byte_jump(0xE3, M::ADDR16),
    "jecxz" => byte_jump(0xE3, M::ADDR32),
    "jmp" => [
        T::op(0xEB).m(NO_SUF).jump(JumpKind::Relaxable).ops(&[BRANCH]),
        T::op(0xEA).m(NO_SUF).no64().jump(JumpKind::InterSegment).ops(&[IMM16, IMM16_32]),
        T::op(0xFF).digit(4).m(STACK32).no64().ops(&[IND16_32]),
        T::op(0xFF).digit(4).m(STACK64).only64().ops(&[IND64]),
    ],
    "jrcxz" => [T::op(0xE3).m(NO_SUF).only64().jump(JumpKind::Byte).ops(&[BRANCH])],
    "kandw" => [T::op(0x41).map0f().modrm().vex(VecLen::L256).w0().vvvv(1).cpu(C::AVX512F).ops(&[KREG, KREG, KREG])],
    "kmovw" => [
        T::op(0x90).map0f().modrm().vex(VecLen::L128).w0().cpu(C::AVX512F).ops(&[K_M16, KREG]),
        T::op(0x91).map0f().modrm().vex(VecLen::L128).w0().cpu(C::AVX512F).ops(&[KREG, M16]),
        T::op(0x92).map0f().modrm().vex(VecLen::L128).w0().cpu(C::AVX512F).ops(&[R32, KREG]),
        T::op(0x93).map0f().modrm().vex(VecLen::L128).w0().cpu(C::AVX512F).ops(&[KREG, R32]),
    ],
    "lcall" => [
        T::op(0x9A).m(NO_SUF).no64().jump(JumpKind::InterSegment).ops(&[IMM16, IMM16_32]),
        T::op(0xFF).digit(3).m(M::IGNORE_SIZE.union(M::NO_BSUF)).ops(&[FAR_MEM]),
    ],
    "lea" => [T::op(0x8D).modrm().m(M::NO_BSUF).ops(&[MEM_ANY, R16_32_64])],
    "leave" => [
        T::op(0xC9).m(STACK32).no64(),
        T::op(0xC9).m(STACK64).only64(),
    ],
    "lfence" => simple_0f(0xAEE8, C::SSE2),
    "ljmp" => [
        T::op(0xEA).m(NO_SUF).no64().jump(JumpKind::InterSegment).ops(&[IMM16, IMM16_32]),
        T::op(0xFF).digit(5).m(M::IGNORE_SIZE.union(M::NO_BSUF)).ops(&[FAR_MEM]),
    ],
    "lods" => string(0xAC),
    "loop" => byte_jump(0xE2, NONE),
    "loope" => byte_jump(0xE1, NONE),
    "loopne" => byte_jump(0xE0, NONE),
    "loopnz" => byte_jump(0xE0, NONE),
    "loopz" => byte_jump(0xE1, NONE),
    "lzcnt" => bit_count(0xBD, C::LZCNT),
    "mfence" => simple_0f(0xAEF0, C::SSE2),
    "mov" => [
        T::op(0xA0).m(ALU_REG.union(M::NO_QSUF)).no64().ops(&[MOFFS32, ACC_BWD]),
        T::op(0xA0).m(ALU_REG).only64().ops(&[MOFFS64, ACC_ALL]),
        T::op(0x88).modrm().m(ALU_REG).ops(&[RALL, RM_ALL]),
        T::op(0xB0).m(M::W.union(M::SHORT_FORM).union(M::NO_QSUF)).ops(&[IMM_BWL, R8_16_32]),
        T::op(0xC6).digit(0).m(M::W).ops(&[IMM_W, RM_ALL]),
        T::op(0xB8)
            .m(M::SHORT_FORM.union(M::NO_BSUF).union(M::NO_WSUF).union(M::NO_LSUF))
            .size(SizeClass::Size64)
            .only64()
            .ops(&[IMM64, R64]),
        T::op(0x8C).modrm().m(M::D.union(M::IGNORE_SIZE).union(M::NO_BSUF)).ops(&[SEG, SEG_RM]),
        T::op(0x20).map0f().modrm().m(M::D.union(M::REG_MEM).union(NO_SUF)).cpu(C::I386).no64().ops(&[CTRL, R32]),
        T::op(0x20).map0f().modrm().m(M::D.union(M::REG_MEM).union(NO_SUF).union(M::NO_REX64)).only64().ops(&[CTRL, R64]),
        T::op(0x21).map0f().modrm().m(M::D.union(M::REG_MEM).union(NO_SUF)).cpu(C::I386).no64().ops(&[DBG, R32]),
        T::op(0x21).map0f().modrm().m(M::D.union(M::REG_MEM).union(NO_SUF).union(M::NO_REX64)).only64().ops(&[DBG, R64]),
    ],
    "movabs" => [
        T::op(0xA0).m(ALU_REG).only64().ops(&[MOFFS64, ACC_ALL]),
        T::op(0xB8)
            .m(M::SHORT_FORM.union(M::NO_BSUF).union(M::NO_WSUF).union(M::NO_LSUF))
            .size(SizeClass::Size64)
            .only64()
            .ops(&[IMM64, R64]),
    ],
    "movapd" => [T::op(0x28).map0f().p66().modrm().m(NO_SUF.union(M::D).union(M::LOAD)).cpu(C::SSE2).ops(&[XMM_M, XMM])],
    "movaps" => [T::op(0x28).map0f().modrm().m(NO_SUF.union(M::D).union(M::LOAD)).cpu(C::SSE).ops(&[XMM_M, XMM])],
    "movbe" => [
        T::op(0xF0).map0f38().modrm().m(M::CHECK_OPERAND_SIZE.union(M::NO_BSUF)).cpu(C::MOVBE).ops(&[M16_64, R16_32_64]),
        T::op(0xF1).map0f38().modrm().m(M::CHECK_OPERAND_SIZE.union(M::NO_BSUF)).cpu(C::MOVBE).ops(&[R16_32_64, M16_64]),
    ],
    "movd" => [
        T::op(0x6E).map0f().p66().modrm().m(NO_SUF.union(M::D)).cpu(C::SSE2).ops(&[RM32, XMM]),
        T::op(0x6E).map0f().modrm().m(NO_SUF.union(M::D)).cpu(C::MMX).ops(&[RM32, MMX]),
    ],
    "movdqa" => [T::op(0x6F).map0f().p66().modrm().m(NO_SUF.union(M::D).union(M::LOAD)).cpu(C::SSE2).ops(&[XMM_M, XMM])],
    "movdqu" => [T::op(0x6F).map0f().pf3().modrm().m(NO_SUF.union(M::D).union(M::LOAD)).cpu(C::SSE2).ops(&[XMM_M, XMM])],
    "movq" => [
        T::op(0x7E).map0f().pf3().modrm().m(NO_SUF.union(M::LOAD)).cpu(C::SSE2).ops(&[XMM_M64, XMM]),
        T::op(0xD6).map0f().p66().modrm().m(NO_SUF).cpu(C::SSE2).ops(&[XMM, XMM_M64]),
        T::op(0x6E).map0f().p66().modrm().m(NO_SUF.union(M::D)).size(SizeClass::Size64).only64().cpu(C::SSE2).ops(&[R64, XMM]),
        T::op(0x6F).map0f().modrm().m(NO_SUF.union(M::D).union(M::LOAD)).cpu(C::MMX).ops(&[MMX_M, MMX]),
        T::op(0x6E).map0f().modrm().m(NO_SUF.union(M::D)).size(SizeClass::Size64).only64().cpu(C::MMX).ops(&[R64, MMX]),
    ],
    "movs" => string(0xA4),
    "movsd" => [
        T::op(0x10).map0f().pf2().modrm().m(NO_SUF.union(M::D).union(M::LOAD)).cpu(C::SSE2).ops(&[XMM_M64, XMM]),
        T::op(0xA5).m(NO_SUF.union(M::REP)).size(SizeClass::Size32),
    ],
    "movss" => [T::op(0x10).map0f().pf3().modrm().m(NO_SUF.union(M::D).union(M::LOAD)).cpu(C::SSE).ops(&[XMM_M32, XMM])],
    "movsx" => [
        T::op(0xBE).map0f().modrm().m(M::NO_BSUF).cpu(C::I386).ops(&[RM8, R16_32_64]),
        T::op(0xBF).map0f().modrm().m(M::NO_BSUF.union(M::NO_WSUF)).cpu(C::I386).ops(&[RM16, R32_64]),
    ],
    "movsxd" => [T::op(0x63).modrm().m(M::NO_BSUF.union(M::NO_WSUF)).size(SizeClass::Size64).only64().ops(&[RM32, R64])],
    "movups" => [T::op(0x10).map0f().modrm().m(NO_SUF.union(M::D).union(M::LOAD)).cpu(C::SSE).ops(&[XMM_M, XMM])],
    "movzx" => [
        T::op(0xB6).map0f().modrm().m(M::NO_BSUF).cpu(C::I386).ops(&[RM8, R16_32_64]),
        T::op(0xB7).map0f().modrm().m(M::NO_BSUF.union(M::NO_WSUF)).cpu(C::I386).ops(&[RM16, R32_64]),
    ],
    "mul" => unary(4, NONE),
    "mulps" => sse(0x59, C::SSE, XMM_M),
    "neg" => unary(3, M::LOCKABLE),
    "nop" => [
        T::op(0x90).m(NO_SUF),
        T::op(0x1F).map0f().digit(0).m(M::NO_BSUF).cpu(C::NOPL).ops(&[RM16_32_64]),
    ],
    "not" => unary(2, M::LOCKABLE),
    "or" => alu(0x08, 1, M::LOCKABLE),
    "orps" => sse(0x56, C::SSE, XMM_M),
    "out" => [
        T::op(0xE6).m(M::W.union(M::NO_QSUF)).ops(&[ACC_BWD, IMM8]),
        T::op(0xEE).m(M::W.union(M::NO_QSUF)).ops(&[ACC_BWD, IO_PORT]),
    ],
    "paddd" => sse_int(0xFE, M::COMMUTATIVE),
    "paddq" => sse_int(0xD4, M::COMMUTATIVE),
    "pause" => [T::op(0x90).pf3().m(NO_SUF)],
    "pmovmskb" => [T::op(0xD7).map0f().p66().modrm().m(SSE_GPR_SUF.union(M::NO_REX64)).cpu(C::SSE2).ops(&[XMM, R32_64])],
    "pop" => [
        T::op(0x58).m(M::SHORT_FORM.union(STACK32)).no64().ops(&[R16_32]),
        T::op(0x58).m(M::SHORT_FORM.union(STACK64)).only64().ops(&[R16_64]),
        T::op(0x8F).digit(0).m(STACK32).no64().ops(&[RM16_32]),
        T::op(0x8F).digit(0).m(STACK64).only64().ops(&[RM16_64]),
    ],
    "popcnt" => bit_count(0xB8, C::POPCNT),
    "popf" => [
        T::op(0x9D).m(STACK32).no64(),
        T::op(0x9D).m(STACK64).only64(),
    ],
    "por" => sse_int(0xEB, M::COMMUTATIVE),
    "pshufb" => [
        T::op(0x00).map0f38().p66().modrm().m(NO_SUF).cpu(C::SSSE3).ops(&[XMM_M, XMM]),
        T::op(0x00).map0f38().modrm().m(NO_SUF).cpu(C::SSSE3).ops(&[MMX_M, MMX]),
    ],
    "pshufd" => [T::op(0x70).map0f().p66().modrm().m(NO_SUF).cpu(C::SSE2).ops(&[IMM8, XMM_M, XMM])],
    "psubd" => sse_int(0xFA, NONE),
    "push" => [
        T::op(0x50).m(M::SHORT_FORM.union(STACK32)).no64().ops(&[R16_32]),
        T::op(0x50).m(M::SHORT_FORM.union(STACK64)).only64().ops(&[R16_64]),
        T::op(0x6A).m(M::DEFAULT_SIZE.union(M::NO_REX64).union(M::NO_BSUF)).cpu(C::I186).ops(&[IMM8S]),
        T::op(0x68).m(STACK32).no64().cpu(C::I186).ops(&[IMM16_32]),
        T::op(0x68).m(STACK64).only64().ops(&[IMM16_32S]),
        T::op(0xFF).digit(6).m(STACK32).no64().ops(&[RM16_32]),
        T::op(0xFF).digit(6).m(STACK64).only64().ops(&[RM16_64]),
    ],
    "pushf" => [
        T::op(0x9C).m(STACK32).no64(),
        T::op(0x9C).m(STACK64).only64(),
    ],
    "pxor" => sse_int(0xEF, M::COMMUTATIVE),
    "rcl" => shift(2),
    "rcr" => shift(3),
    "rdtsc" => simple_0f(0x31, C::I586),
    "ret" => [
        T::op(0xC3).m(STACK32).no64(),
        T::op(0xC2).m(STACK32).no64().ops(&[IMM16]),
        T::op(0xC3).m(STACK64).only64(),
        T::op(0xC2).m(STACK64).only64().ops(&[IMM16]),
    ],
    "rol" => shift(0),
    "ror" => shift(1),
    "roundps" => [T::op(0x08).map0f3a().p66().modrm().m(NO_SUF).cpu(C::SSE4_1).ops(&[IMM8, XMM_M, XMM])],
    "sal" => shift(4),
    "sar" => shift(7),
    "sbb" => alu(0x18, 3, M::LOCKABLE),
    "sfence" => simple_0f(0xAEF8, C::SSE),
    "shl" => shift(4),
    "shr" => shift(5),
    "shufps" => [T::op(0xC6).map0f().modrm().m(NO_SUF).cpu(C::SSE).ops(&[IMM8, XMM_M, XMM])],
    "sqrtps" => sse(0x51, C::SSE, XMM_M),
    "stc" => simple(0xF9),
    "std" => simple(0xFD),
    "sti" => simple(0xFB),
    "stos" => string(0xAA),
    "sub" => alu(0x28, 5, M::LOCKABLE),
    "subps" => sse(0x5C, C::SSE, XMM_M),
    "syscall" => simple_0f(0x05, C::SYSCALL),
    "sysenter" => [T::op(0x34).map0f().m(NO_SUF).cpu(C::I686).isa(Isa64::Intel64)],
    "test" => [
        T::op(0x84).modrm().m(M::W.union(M::COMMUTATIVE).union(M::CHECK_OPERAND_SIZE)).ops(&[RALL, RM_ALL]),
        T::op(0xA8).m(M::W).ops(&[IMM_W, ACC_ALL]),
        T::op(0xF6).digit(0).m(M::W).ops(&[IMM_W, RM_ALL]),
    ],
    "tzcnt" => bit_count(0xBC, C::BMI1),
    "ucomisd" => sse66(0x2E, C::SSE2, XMM_M64),
    "ud2" => simple_0f(0x0B, C::I686),
    "vaddpd" => v_pd(0x58, M::COMMUTATIVE, Rounding::Static),
    "vaddps" => v_ps(0x58, M::COMMUTATIVE, Rounding::Static, C::AVX512F),
    "vaddsd" => v_scalar(0x58, true),
    "vaddss" => v_scalar(0x58, false),
    "vandps" => v_ps(0x54, M::COMMUTATIVE, Rounding::None, C::AVX512DQ),
    "vbroadcastss" => [
        T::op(0x18).map0f38().p66().modrm().vex(VecLen::Dynamic).w0().cpu(C::AVX).ops(&[M32, XY]),
        T::op(0x18).map0f38().p66().modrm().vex(VecLen::Dynamic).w0().cpu(C::AVX2).ops(&[XMM, XY]),
        T::op(0x18).map0f38().p66().modrm().evex(VecLen::L512).w0().mask(Masking::Dynamic).disp8(D8::Scale(2)).cpu(C::AVX512F).ops(&[XMM_M32, ZMM]),
    ],
    "vdivps" => v_ps(0x5E, NONE, Rounding::Static, C::AVX512F),
    "vfmadd231ps" => [
        T::op(0xB8).map0f38().p66().modrm().vex(VecLen::Dynamic).w0().vvvv(1).m(M::CHECK_OPERAND_SIZE).cpu(C::FMA).ops(&[XY_M, XY, XY]),
        T::op(0xB8).map0f38().p66().modrm().evex(VecLen::L512).w0().vvvv(1).mask(Masking::Dynamic).bcst(4).rounding(Rounding::Static).cpu(C::AVX512F).ops(&[ZMM_M, ZMM, ZMM]),
        T::op(0xB8).map0f38().p66().modrm().evex(VecLen::Dynamic).w0().vvvv(1).mask(Masking::Dynamic).bcst(4).m(M::CHECK_OPERAND_SIZE).cpu(VL).ops(&[XY_M, XY, XY]),
    ],
    "vgatherdps" => [
        T::op(0x92).map0f38().p66().modrm().vex(VecLen::L128).w0().vvvv(0).vsib(Vsib::Xmm).cpu(C::AVX2).ops(&[XMM, VSIB_MEM, XMM]),
        T::op(0x92).map0f38().p66().modrm().vex(VecLen::L256).w0().vvvv(0).vsib(Vsib::Ymm).cpu(C::AVX2).ops(&[YMM, VSIB_MEM, YMM]),
        T::op(0x92).map0f38().p66().modrm().evex(VecLen::L512).w0().vsib(Vsib::Zmm).mask(Masking::Required).disp8(D8::Scale(2)).cpu(C::AVX512F).ops(&[VSIB_MEM, ZMM]),
        T::op(0x92).map0f38().p66().modrm().evex(VecLen::L128).w0().vsib(Vsib::Xmm).mask(Masking::Required).disp8(D8::Scale(2)).cpu(VL).ops(&[VSIB_MEM, XMM]),
        T::op(0x92).map0f38().p66().modrm().evex(VecLen::L256).w0().vsib(Vsib::Ymm).mask(Masking::Required).disp8(D8::Scale(2)).cpu(VL).ops(&[VSIB_MEM, YMM]),
    ],
    "vinsertf128" => [T::op(0x18).map0f3a().p66().modrm().vex(VecLen::L256).w0().vvvv(2).cpu(C::AVX).ops(&[IMM8, XMM_M, YMM, YMM])],
    "vmaxps" => v_ps(0x5F, NONE, Rounding::Sae, C::AVX512F),
    "vminps" => v_ps(0x5D, NONE, Rounding::Sae, C::AVX512F),
    "vmovaps" => [
        T::op(0x28).map0f().modrm().m(M::D.union(M::LOAD).union(M::CHECK_OPERAND_SIZE)).vex(VecLen::Dynamic).cpu(C::AVX).ops(&[XY_M, XY]),
        T::op(0x28).map0f().modrm().m(M::D.union(M::LOAD)).evex(VecLen::L512).w0().mask(Masking::Dynamic).cpu(C::AVX512F).ops(&[ZMM_M, ZMM]),
        T::op(0x28).map0f().modrm().m(M::D.union(M::LOAD).union(M::CHECK_OPERAND_SIZE)).evex(VecLen::Dynamic).w0().mask(Masking::Dynamic).cpu(VL).ops(&[XY_M, XY]),
    ],
    "vmovdqa" => [T::op(0x6F).map0f().p66().modrm().m(M::D.union(M::LOAD).union(M::CHECK_OPERAND_SIZE)).vex(VecLen::Dynamic).cpu(C::AVX).ops(&[XY_M, XY])],
    "vmovdqa32" => e_mov(0x6F, false, false),
    "vmovdqa64" => e_mov(0x6F, false, true),
    "vmovdqu32" => e_mov(0x6F, true, false),
    "vmulps" => v_ps(0x59, M::COMMUTATIVE, Rounding::Static, C::AVX512F),
    "vpaddb" => v_int(0xFC, super::OpcodeSpace::Map0F, 0, None, C::AVX512BW, M::COMMUTATIVE),
    "vpaddd" => v_int(0xFE, super::OpcodeSpace::Map0F, 0, Some(4), C::AVX512F, M::COMMUTATIVE),
    "vpbroadcastd" => [
        T::op(0x58).map0f38().p66().modrm().vex(VecLen::Dynamic).w0().cpu(C::AVX2).ops(&[XMM_M32, XY]),
        T::op(0x58).map0f38().p66().modrm().evex(VecLen::L512).w0().mask(Masking::Dynamic).disp8(D8::Scale(2)).cpu(C::AVX512F).ops(&[XMM_M32, ZMM]),
        T::op(0x7C).map0f38().p66().modrm().evex(VecLen::L512).w0().mask(Masking::Dynamic).cpu(C::AVX512F).ops(&[R32, ZMM]),
    ],
    "vpcmpeqd" => [
        T::op(0x76).map0f().p66().modrm().vex(VecLen::L128).vvvv(1).m(M::COMMUTATIVE).cpu(C::AVX).ops(&[XMM_M, XMM, XMM]),
        T::op(0x76).map0f().p66().modrm().vex(VecLen::L256).vvvv(1).m(M::COMMUTATIVE).cpu(C::AVX2).ops(&[YMM_M, YMM, YMM]),
        T::op(0x76).map0f().p66().modrm().evex(VecLen::L512).w0().vvvv(1).mask(Masking::Merging).bcst(4).cpu(C::AVX512F).ops(&[ZMM_M, ZMM, KREG]),
        T::op(0x76).map0f().p66().modrm().evex(VecLen::Dynamic).w0().vvvv(1).mask(Masking::Merging).bcst(4).m(M::CHECK_OPERAND_SIZE).cpu(VL).ops(&[XY_M, XY, KREG]),
    ],
    "vpermq" => [
        T::op(0x00).map0f3a().p66().modrm().vex(VecLen::L256).w1().cpu(C::AVX2).ops(&[IMM8, YMM_M, YMM]),
        T::op(0x00).map0f3a().p66().modrm().evex(VecLen::L512).w1().mask(Masking::Dynamic).bcst(8).cpu(C::AVX512F).ops(&[IMM8, ZMM_M, ZMM]),
    ],
    "vpshufb" => v_int(0x00, super::OpcodeSpace::Map0F38, 0, None, C::AVX512BW, NONE),
    "vpternlogd" => [
        T::op(0x25).map0f3a().p66().modrm().evex(VecLen::L512).w0().vvvv(2).mask(Masking::Dynamic).bcst(4).cpu(C::AVX512F).ops(&[IMM8, ZMM_M, ZMM, ZMM]),
        T::op(0x25).map0f3a().p66().modrm().evex(VecLen::Dynamic).w0().vvvv(2).mask(Masking::Dynamic).bcst(4).m(M::CHECK_OPERAND_SIZE).cpu(VL).ops(&[IMM8, XY_M, XY, XY]),
    ],
    "vpxor" => [
        T::op(0xEF).map0f().p66().modrm().vex(VecLen::L128).vvvv(1).m(M::COMMUTATIVE).cpu(C::AVX).ops(&[XMM_M, XMM, XMM]),
        T::op(0xEF).map0f().p66().modrm().vex(VecLen::L256).vvvv(1).m(M::COMMUTATIVE).cpu(C::AVX2).ops(&[YMM_M, YMM, YMM]),
    ],
    "vpxord" => e_int(0xEF, false, 4),
    "vpxorq" => e_int(0xEF, true, 8),
    "vscatterdps" => [
        T::op(0xA2).map0f38().p66().modrm().evex(VecLen::L512).w0().vsib(Vsib::Zmm).mask(Masking::Required).disp8(D8::Scale(2)).cpu(C::AVX512F).ops(&[ZMM, VSIB_MEM]),
    ],
    "vsubps" => v_ps(0x5C, NONE, Rounding::Static, C::AVX512F),
    "vxorps" => v_ps(0x57, M::COMMUTATIVE, Rounding::None, C::AVX512DQ),
    "vzeroupper" => [T::op(0x77).map0f().vex(VecLen::L128).cpu(C::AVX)],
    "xchg" => [
        T::op(0x90).m(M::SHORT_FORM.union(M::COMMUTATIVE).union(M::CHECK_OPERAND_SIZE).union(M::NO_BSUF)).ops(&[R16_32_64, ACC16_64]),
        T::op(0x86).modrm().m(M::W.union(M::COMMUTATIVE).union(M::CHECK_OPERAND_SIZE).union(M::LOCKABLE)).ops(&[RALL, RM_ALL]),
    ],
    "xor" => alu(0x30, 6, M::LOCKABLE),
    "xorpd" => sse66(0x57, C::SSE2, XMM_M),
    "xorps" => sse(0x57, C::SSE, XMM_M),
}
