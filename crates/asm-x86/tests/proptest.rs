//! Property-based tests using proptest.
//!
//! These tests verify assembler invariants across large, randomly generated
//! input spaces, complementing the targeted integration tests and the
//! libfuzzer-based fuzz targets.

use asm_x86::encoder::{encode, EncodeOptions, Encoded};
use asm_x86::expr::NoSymbols;
use asm_x86::insn::{parse_statement, ParseOptions, Statement};
use asm_x86::lexer::tokenize;
use asm_x86::matcher::{match_template, overlaps, MatchOptions};
use asm_x86::optype::{Instance, OperandType, RegClass, TypeFlags};
use asm_x86::relax::Layout;
use asm_x86::{assemble, assemble_with, AssemblerConfig, Assembler, BranchAlignment, CodeMode, Span, Syntax};
use iced_x86::{Decoder, DecoderOptions, Mnemonic};
use proptest::prelude::*;

// ── Strategies ──────────────────────────────────────────────────────────

/// Generates arbitrary ASCII strings (the assembler only accepts text input).
fn arb_asm_input() -> impl Strategy<Value = String> {
    prop::collection::vec(prop::char::range('\0', '\x7f'), 0..256).prop_map(|v| v.into_iter().collect())
}

/// Text built from assembler-ish tokens, which gets much deeper into the
/// parsers than random bytes do.
fn arb_token_soup() -> impl Strategy<Value = String> {
    let token = prop::sample::select(vec![
        "mov", "add", "jmp", "vaddps", "lea", "push", "rax", "eax", "al", "r8", "zmm0", "xmm31", "k1", "%rax",
        "%eax", "$1", "$-1", "0x7fffffffffffffff", "-9223372036854775808", "[", "]", "(", ")", ",", "+", "-",
        "*", "8", "{", "}", "z", "1to16", "rn-sae", "ptr", "qword", "byte", "short", "lock", "rep", "fs:",
        "label", "label:", "1:", "1b", "1f", ".byte", ".p2align", ".code16", ".att_syntax", ".intel_syntax",
        "=", "\n", ";", "#",
    ]);
    prop::collection::vec(token, 0..40).prop_map(|v| v.join(" "))
}

/// Instructions that assemble on any 64-bit configuration.
fn valid_x86_64_insn() -> impl Strategy<Value = &'static str> {
    prop::sample::select(vec![
        "nop",
        "ret",
        "int3",
        "hlt",
        "clc",
        "stc",
        "cld",
        "pause",
        "xor eax, eax",
        "xor rax, rax",
        "mov eax, 42",
        "mov rax, 0x1234",
        "mov rax, 0x123456789",
        "mov r15b, sil",
        "add eax, 1",
        "sub rax, 8",
        "inc ecx",
        "dec rdx",
        "push rax",
        "pop r12",
        "and eax, 0xFF",
        "or eax, 0x80",
        "shl eax, 1",
        "shr rax, 4",
        "test eax, eax",
        "cmp eax, 0",
        "neg eax",
        "not rax",
        "mov ah, 0",
        "movzx eax, cl",
        "movsxd rax, eax",
        "bswap r9",
        "cdq",
        "cqo",
        "lea rax, [rbx+rcx*8+16]",
        "mov qword ptr [rsp+8], rax",
        "mov eax, [r13]",
        "lock add dword ptr [rax], 1",
        "imul eax, ecx, 1000",
        "cmove rax, rbx",
        "sete al",
        "rep stosb",
        "movaps xmm0, xmm15",
        "pxor xmm3, [rax]",
        "vaddps ymm0, ymm1, ymm2",
        "vpxor xmm0, xmm1, xmm8",
        "vaddps zmm0{k1}{z}, zmm1, zmm2",
        "vaddps zmm0, zmm1, dword ptr [rax]{1to16}",
        "vaddps zmm31, zmm30, [rax+256]",
        "vpternlogd zmm0, zmm1, zmm2, 0x96",
        "kmovw k1, k2",
    ])
}

fn arb_reg_class() -> impl Strategy<Value = RegClass> {
    prop::sample::select(vec![
        RegClass::None,
        RegClass::Gpr,
        RegClass::Segment,
        RegClass::Control,
        RegClass::Debug,
        RegClass::Fpu,
        RegClass::Mmx,
        RegClass::Simd,
        RegClass::Mask,
        RegClass::Bound,
        RegClass::Tmm,
    ])
}

fn arb_instance() -> impl Strategy<Value = Instance> {
    prop::sample::select(vec![
        Instance::None,
        Instance::Accum,
        Instance::RegC,
        Instance::RegD,
        Instance::RegB,
    ])
}

fn arb_flags() -> impl Strategy<Value = TypeFlags> {
    any::<u64>().prop_map(TypeFlags::from_bits_truncate)
}

fn arb_operand_type() -> impl Strategy<Value = OperandType> {
    (arb_reg_class(), arb_instance(), arb_flags()).prop_map(|(c, i, f)| OperandType::new(c, i, f))
}

/// One block of a branchy program: a label, some filler, then a branch to
/// one of the program's labels.
#[derive(Debug, Clone)]
struct Block {
    filler: usize,
    conditional: bool,
    target: usize,
}

fn arb_program() -> impl Strategy<Value = Vec<Block>> {
    (1usize..8).prop_flat_map(|n| {
        prop::collection::vec(
            (0usize..90, any::<bool>(), 0..n).prop_map(|(filler, conditional, target)| Block {
                filler,
                conditional,
                target,
            }),
            n,
        )
    })
}

fn program_source(blocks: &[Block]) -> String {
    let mut src = String::new();
    for (i, b) in blocks.iter().enumerate() {
        src.push_str(&format!("L{i}:\n"));
        src.push_str(&"nop\n".repeat(b.filler));
        let op = if b.conditional { "jne" } else { "jmp" };
        src.push_str(&format!("{op} L{}\n", b.target));
    }
    src
}

/// Decoded branches as `(address, length, target)`.
fn decoded_branches(bytes: &[u8]) -> Vec<(u64, usize, u64)> {
    let mut decoder = Decoder::with_ip(64, bytes, 0, DecoderOptions::NONE);
    let mut out = Vec::new();
    while decoder.can_decode() {
        let instr = decoder.decode();
        assert_ne!(instr.mnemonic(), Mnemonic::INVALID, "undecodable output {bytes:02X?}");
        if matches!(instr.mnemonic(), Mnemonic::Jmp | Mnemonic::Jne) {
            out.push((instr.ip(), instr.len(), instr.near_branch_target()));
        }
    }
    out
}

/// Run one Intel statement through the lower-level pipeline.
fn encoded(src: &str) -> Encoded {
    let config = AssemblerConfig::for_mode(CodeMode::Code64);
    let tokens = tokenize(src).unwrap();
    let opts = ParseOptions {
        mode: config.mode,
        syntax: config.syntax,
        cpu: config.cpu,
        opt_level: config.opt_level,
        symbols: &NoSymbols,
    };
    let mut warnings = Vec::new();
    let Statement::Insn(insn) = parse_statement(&tokens[..tokens.len() - 1], &opts, &mut warnings).unwrap() else {
        panic!("`{src}` is not an instruction");
    };
    let bound = match_template(&insn, &MatchOptions::from(&config), &mut warnings).unwrap();
    encode(&insn, &bound, &EncodeOptions::from(&config), &mut warnings).unwrap()
}

fn program_layout(blocks: &[Block]) -> Layout {
    let config = AssemblerConfig::for_mode(CodeMode::Code64);
    let mut layout = Layout::new(config.mode, config.cpu);
    for (i, b) in blocks.iter().enumerate() {
        layout.add_label(&format!("L{i}"), Span::default()).unwrap();
        for _ in 0..b.filler {
            layout.add_instruction(encoded("nop"));
        }
        let op = if b.conditional { "jne" } else { "jmp" };
        layout.add_instruction(encoded(&format!("{op} L{}", b.target)));
    }
    layout
}

// ── Property: No panics on arbitrary input ──────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(2000))]

    /// The assembler must NEVER panic on arbitrary input, only Ok/Err.
    #[test]
    fn no_panic_on_arbitrary_input(input in arb_asm_input()) {
        for mode in [CodeMode::Code16, CodeMode::Code32, CodeMode::Code64] {
            let _ = assemble(&input, mode);
        }
    }

    /// Same for AT&T input and arbitrary base addresses.
    #[test]
    fn no_panic_on_arbitrary_att_at_base(input in arb_asm_input(), base in any::<u64>()) {
        let mut asm = Assembler::new(CodeMode::Code64);
        asm.syntax(Syntax::Att).base_address(base);
        if asm.emit(&input).is_ok() {
            let _ = asm.finish();
        }
    }

    #[test]
    fn no_panic_on_token_soup(input in arb_token_soup(), att in any::<bool>()) {
        let config = AssemblerConfig {
            syntax: if att { Syntax::Att } else { Syntax::Intel },
            ..AssemblerConfig::for_mode(CodeMode::Code64)
        };
        let _ = assemble_with(&input, config);
    }

    /// The builder API must not panic when fed line by line.
    #[test]
    fn no_panic_builder_api(input in arb_token_soup()) {
        let mut asm = Assembler::new(CodeMode::Code64);
        for line in input.lines() {
            if asm.emit(line).is_err() {
                return Ok(());
            }
        }
        let _ = asm.finish();
    }
}

// ── Property: Valid instructions always assemble ─────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn valid_instructions_assemble(insn in valid_x86_64_insn()) {
        let bytes = assemble(insn, CodeMode::Code64);
        prop_assert!(bytes.is_ok(), "failed: {insn}: {:?}", bytes.err());
        let bytes = bytes.unwrap();
        prop_assert!(!bytes.is_empty() && bytes.len() <= 15, "{insn} → {bytes:02X?}");
    }

    /// Straight-line code assembles to the concatenation of its lines.
    #[test]
    fn straight_line_code_concatenates(insns in prop::collection::vec(valid_x86_64_insn(), 1..20)) {
        let joined = assemble(&insns.join("\n"), CodeMode::Code64).unwrap();
        let pieces: Vec<u8> = insns
            .iter()
            .flat_map(|i| assemble(i, CodeMode::Code64).unwrap())
            .collect();
        prop_assert_eq!(joined, pieces);
    }

    /// Every emitted instruction decodes to exactly its own length.
    #[test]
    fn output_decodes_cleanly(insn in valid_x86_64_insn()) {
        let bytes = assemble(insn, CodeMode::Code64).unwrap();
        let mut decoder = Decoder::with_ip(64, &bytes, 0, DecoderOptions::NONE);
        let instr = decoder.decode();
        prop_assert_ne!(instr.mnemonic(), Mnemonic::INVALID);
        prop_assert_eq!(instr.len(), bytes.len(), "{} → {:02X?}", insn, bytes);
    }
}

// ── Property: Operand type algebra ───────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    #[test]
    fn and_or_are_commutative(a in arb_operand_type(), b in arb_operand_type()) {
        prop_assert_eq!(a.and(b), b.and(a));
        prop_assert_eq!(a.or(b), b.or(a));
        prop_assert_eq!(a.xor(b), b.xor(a));
    }

    #[test]
    fn and_is_idempotent(a in arb_operand_type()) {
        prop_assert!(a.and(a).equal(&a));
        prop_assert!(a.or(a).equal(&a));
    }

    #[test]
    fn and_not_clears_exactly_the_mask(a in arb_operand_type(), mask in arb_flags()) {
        let cleared = a.and_not(OperandType::flags(mask));
        prop_assert!(!cleared.bits().intersects(mask));
        prop_assert_eq!(cleared.bits() | (a.bits() & mask), a.bits());
        prop_assert_eq!(cleared.class(), a.class());
        prop_assert_eq!(cleared.instance(), a.instance());
    }

    /// Masks carry no class, so the laws are stated for class-less values.
    #[test]
    fn and_not_laws(flags in arb_flags()) {
        let a = OperandType::flags(flags);
        prop_assert!(a.and_not(a).all_zero());
        prop_assert_eq!(a.and_not(a.and_not(a)), a);
    }

    #[test]
    fn xor_with_self_is_zero(a in arb_operand_type()) {
        prop_assert!(a.xor(a).all_zero());
    }

    #[test]
    fn and_never_adds_bits(a in arb_operand_type(), b in arb_operand_type()) {
        let both = a.and(b);
        prop_assert!(a.bits().contains(both.bits()));
        prop_assert!(b.bits().contains(both.bits()));
    }

    /// A register type always fits a slot of its own shape.
    #[test]
    fn registers_overlap_themselves(
        class in arb_reg_class().prop_filter("register", |c| *c != RegClass::None),
        instance in arb_instance(),
        sizes in arb_flags(),
    ) {
        let t = OperandType::new(class, instance, sizes & TypeFlags::SIZES);
        prop_assert!(overlaps(t, t));
    }

    /// A memory operand never fits a register-only slot.
    #[test]
    fn memory_does_not_fit_register_slots(class in arb_reg_class(), sizes in arb_flags()) {
        let mem = OperandType::flags(TypeFlags::BASE_INDEX | TypeFlags::DISP8 | (sizes & TypeFlags::SIZES));
        let slot = OperandType::reg(class, TypeFlags::GPR_SIZES);
        prop_assert!(!overlaps(mem, slot));
    }
}

// ── Property: Branch relaxation ──────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    /// Every branch lands on its label, whatever sizes relaxation picked.
    #[test]
    fn branches_reach_their_labels(blocks in arb_program()) {
        let result = assemble_with(&program_source(&blocks), AssemblerConfig::for_mode(CodeMode::Code64)).unwrap();
        let branches = decoded_branches(result.bytes());
        prop_assert_eq!(branches.len(), blocks.len());
        for ((_, len, target), block) in branches.iter().zip(&blocks) {
            let expected = result.label_address(&format!("L{}", block.target)).unwrap();
            prop_assert_eq!(*target, expected);
            prop_assert!(matches!(*len, 2 | 5 | 6));
        }
    }

    /// States only grow, and a converged chain does not change on a re-run.
    #[test]
    fn relaxation_is_monotonic_and_idempotent(blocks in arb_program()) {
        let mut layout = program_layout(&blocks);
        let before = layout.branch_states();
        layout.relax().unwrap();
        let after = layout.branch_states();
        prop_assert_eq!(before.len(), after.len());
        for (b, a) in before.iter().zip(&after) {
            prop_assert_eq!(a.kind, b.kind);
            prop_assert!(a.width >= b.width);
        }
        prop_assert_eq!(layout.relax().unwrap(), 1);
        prop_assert_eq!(layout.branch_states(), after);
    }

    #[test]
    fn relaxation_is_deterministic(blocks in arb_program()) {
        let src = program_source(&blocks);
        prop_assert_eq!(assemble(&src, CodeMode::Code64).unwrap(), assemble(&src, CodeMode::Code64).unwrap());
    }

    /// With the 32-byte policy no branch crosses or ends on a boundary, and
    /// targets stay correct.
    #[test]
    fn padded_branches_stay_inside_windows(blocks in arb_program()) {
        let config = AssemblerConfig {
            branch_alignment: BranchAlignment::within_32b_boundaries(),
            ..AssemblerConfig::for_mode(CodeMode::Code64)
        };
        let result = assemble_with(&program_source(&blocks), config).unwrap();
        let branches = decoded_branches(result.bytes());
        prop_assert_eq!(branches.len(), blocks.len());
        for ((ip, len, target), block) in branches.iter().zip(&blocks) {
            prop_assert!((ip & 31) + (*len as u64) < 32, "branch at {ip:#x} of {len} bytes crosses");
            let expected = result.label_address(&format!("L{}", block.target)).unwrap();
            prop_assert_eq!(*target, expected);
        }
    }
}
