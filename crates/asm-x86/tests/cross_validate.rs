//! Cross-validation tests: encode with asm_x86, decode with iced-x86.
//!
//! Every encoding is decoded by an independent decoder, which must consume
//! exactly the emitted bytes and report the expected mnemonic and operand
//! shape.

use asm_x86::{assemble_with, AssemblerConfig, CodeMode, Syntax};
use iced_x86::{Decoder, DecoderOptions, Formatter, Instruction, IntelFormatter, Mnemonic, OpKind, Register};

// ─── Helpers ──────────────────────────────────────────────────────────────────

fn bitness(mode: CodeMode) -> u32 {
    match mode {
        CodeMode::Code16 => 16,
        CodeMode::Code32 => 32,
        CodeMode::Code64 => 64,
    }
}

/// Assemble one instruction and decode it back.
fn decode_in(source: &str, syntax: Syntax, mode: CodeMode) -> (Instruction, String) {
    let config = AssemblerConfig {
        syntax,
        ..AssemblerConfig::for_mode(mode)
    };
    let bytes = assemble_with(source, config)
        .unwrap_or_else(|e| panic!("asm_x86 failed to assemble `{source}`: {e}"))
        .into_bytes();
    assert!(!bytes.is_empty(), "empty output for `{source}`");

    let mut decoder = Decoder::with_ip(bitness(mode), &bytes, 0, DecoderOptions::NONE);
    let instr = decoder.decode();
    assert_ne!(
        instr.mnemonic(),
        Mnemonic::INVALID,
        "iced-x86 decoded INVALID for `{source}` → {:02X?}",
        bytes
    );
    assert_eq!(
        instr.len(),
        bytes.len(),
        "iced-x86 decoded {} bytes but asm_x86 emitted {} bytes for `{source}` → {:02X?}",
        instr.len(),
        bytes.len(),
        bytes
    );

    let mut formatter = IntelFormatter::new();
    let mut output = String::new();
    formatter.format(&instr, &mut output);
    (instr, output)
}

fn decode(source: &str) -> (Instruction, String) {
    decode_in(source, Syntax::Intel, CodeMode::Code64)
}

fn verify_mnemonic(source: &str, expected: Mnemonic) {
    let (instr, formatted) = decode(source);
    assert_eq!(
        instr.mnemonic(),
        expected,
        "mnemonic mismatch for `{source}`: iced decoded `{formatted}`"
    );
}

/// Mnemonic plus the registers of every register operand, in Intel order.
fn verify_registers(source: &str, expected: Mnemonic, regs: &[Register]) {
    let (instr, formatted) = decode(source);
    assert_eq!(instr.mnemonic(), expected, "`{source}` decoded as `{formatted}`");
    let decoded: Vec<Register> = (0..instr.op_count())
        .filter(|&i| instr.op_kind(i) == OpKind::Register)
        .map(|i| instr.op_register(i))
        .collect();
    assert_eq!(decoded, regs, "`{source}` decoded as `{formatted}`");
}

/// Decoded Intel text contains `substring` (case-insensitive).
fn verify_contains(source: &str, expected: Mnemonic, substring: &str) {
    let (instr, formatted) = decode(source);
    assert_eq!(instr.mnemonic(), expected, "`{source}` decoded as `{formatted}`");
    assert!(
        formatted.to_lowercase().contains(&substring.to_lowercase()),
        "`{source}` decoded as `{formatted}`, expected to contain `{substring}`"
    );
}

// ─── General purpose ─────────────────────────────────────────────────────────

#[test]
fn xval_register_moves() {
    verify_registers("mov rax, rbx", Mnemonic::Mov, &[Register::RAX, Register::RBX]);
    verify_registers("mov r8d, r15d", Mnemonic::Mov, &[Register::R8D, Register::R15D]);
    verify_registers("mov sil, dil", Mnemonic::Mov, &[Register::SIL, Register::DIL]);
    verify_registers("mov ah, bl", Mnemonic::Mov, &[Register::AH, Register::BL]);
    verify_mnemonic("xchg rax, r9", Mnemonic::Xchg);
}

#[test]
fn xval_alu() {
    for (src, m) in [
        ("add eax, 1", Mnemonic::Add),
        ("or rcx, 0x1000", Mnemonic::Or),
        ("adc byte ptr [rax], 3", Mnemonic::Adc),
        ("sbb r10w, r11w", Mnemonic::Sbb),
        ("and al, 0x7f", Mnemonic::And),
        ("sub qword ptr [rsp+8], -1", Mnemonic::Sub),
        ("xor r12, r12", Mnemonic::Xor),
        ("cmp dword ptr [rip+0x100], 5", Mnemonic::Cmp),
        ("test byte ptr [rdi], 1", Mnemonic::Test),
    ] {
        verify_mnemonic(src, m);
    }
}

#[test]
fn xval_addressing_forms() {
    verify_contains("mov eax, [rbx+rcx*4+0x10]", Mnemonic::Mov, "[rbx+rcx*4+10h]");
    verify_contains("mov eax, [r12]", Mnemonic::Mov, "[r12]");
    verify_contains("mov eax, [r13]", Mnemonic::Mov, "[r13]");
    verify_contains("mov eax, [rsp+8]", Mnemonic::Mov, "[rsp+8]");
    verify_contains("mov eax, [rbp-8]", Mnemonic::Mov, "[rbp-8]");
    verify_contains("mov eax, [ecx+edx]", Mnemonic::Mov, "[ecx+edx]");
    verify_contains("mov eax, fs:[rax]", Mnemonic::Mov, "fs:[rax]");
}

#[test]
fn xval_unary_and_shifts() {
    for (src, m) in [
        ("inc r9", Mnemonic::Inc),
        ("dec byte ptr [rax]", Mnemonic::Dec),
        ("neg r8d", Mnemonic::Neg),
        ("not word ptr [rbx]", Mnemonic::Not),
        ("mul r15", Mnemonic::Mul),
        ("div ecx", Mnemonic::Div),
        ("shl r11, 3", Mnemonic::Shl),
        ("sar dword ptr [rax], cl", Mnemonic::Sar),
        ("rol ax, 1", Mnemonic::Rol),
        ("rcr bl, 2", Mnemonic::Rcr),
    ] {
        verify_mnemonic(src, m);
    }
}

#[test]
fn xval_stack_and_misc() {
    for (src, m) in [
        ("push r15", Mnemonic::Push),
        ("push -5", Mnemonic::Push),
        ("pop qword ptr [rax]", Mnemonic::Pop),
        ("pushf", Mnemonic::Pushfq),
        ("popf", Mnemonic::Popfq),
        ("leave", Mnemonic::Leave),
        ("cpuid", Mnemonic::Cpuid),
        ("rdtsc", Mnemonic::Rdtsc),
        ("syscall", Mnemonic::Syscall),
        ("cqo", Mnemonic::Cqo),
        ("cdqe", Mnemonic::Cdqe),
        ("movsxd rax, dword ptr [rbx]", Mnemonic::Movsxd),
        ("movzx ecx, word ptr [rsi]", Mnemonic::Movzx),
        ("movsx r8, al", Mnemonic::Movsx),
        ("cmovg rax, rbx", Mnemonic::Cmovg),
        ("setae cl", Mnemonic::Setae),
        ("popcnt rax, qword ptr [rdi]", Mnemonic::Popcnt),
        ("tzcnt eax, ebx", Mnemonic::Tzcnt),
        ("movbe qword ptr [rax], rcx", Mnemonic::Movbe),
        ("imul r9, r10, 100", Mnemonic::Imul),
    ] {
        verify_mnemonic(src, m);
    }
}

#[test]
fn xval_string_ops() {
    verify_contains("rep stosq", Mnemonic::Stosq, "rep");
    verify_contains("rep movsb", Mnemonic::Movsb, "rep");
    verify_mnemonic("lodsd", Mnemonic::Lodsd);
}

#[test]
fn xval_branches() {
    verify_mnemonic("jmp rax", Mnemonic::Jmp);
    verify_mnemonic("call qword ptr [rip+0x10]", Mnemonic::Call);
    verify_mnemonic("jmp qword ptr [rax+rbx*8]", Mnemonic::Jmp);
    verify_mnemonic("ret 16", Mnemonic::Ret);
}

// ─── SSE / AVX / AVX-512 ─────────────────────────────────────────────────────

#[test]
fn xval_sse() {
    for (src, m) in [
        ("addps xmm1, xmm2", Mnemonic::Addps),
        ("addsd xmm8, qword ptr [rax]", Mnemonic::Addsd),
        ("movaps xmmword ptr [rsp], xmm15", Mnemonic::Movaps),
        ("movdqa xmm3, [rdi+16]", Mnemonic::Movdqa),
        ("pxor xmm9, xmm10", Mnemonic::Pxor),
        ("paddd xmm0, xmm1", Mnemonic::Paddd),
        ("pshufd xmm0, xmm1, 0x4e", Mnemonic::Pshufd),
        ("shufps xmm0, xmm1, 0x44", Mnemonic::Shufps),
        ("cvtsi2ss xmm0, eax", Mnemonic::Cvtsi2ss),
        ("cvtsi2sd xmm1, rax", Mnemonic::Cvtsi2sd),
        ("pmovmskb eax, xmm2", Mnemonic::Pmovmskb),
        ("blendvps xmm1, xmm2, xmm0", Mnemonic::Blendvps),
        ("sqrtps xmm0, [rax]", Mnemonic::Sqrtps),
    ] {
        verify_mnemonic(src, m);
    }
}

#[test]
fn xval_avx() {
    verify_registers(
        "vaddps ymm0, ymm1, ymm2",
        Mnemonic::Vaddps,
        &[Register::YMM0, Register::YMM1, Register::YMM2],
    );
    verify_registers(
        "vpxor xmm0, xmm1, xmm8",
        Mnemonic::Vpxor,
        &[Register::XMM0, Register::XMM8, Register::XMM1],
    );
    for (src, m) in [
        ("vmulps ymm8, ymm9, [rax]", Mnemonic::Vmulps),
        ("vfmadd231ps xmm0, xmm1, xmm2", Mnemonic::Vfmadd231ps),
        ("vpaddd ymm0, ymm1, ymm2", Mnemonic::Vpaddd),
        ("vpbroadcastd ymm0, xmm1", Mnemonic::Vpbroadcastd),
        ("vbroadcastss xmm0, dword ptr [rax]", Mnemonic::Vbroadcastss),
        ("vpermq ymm0, ymm1, 0x1b", Mnemonic::Vpermq),
        ("vmovdqa ymm0, [rsi]", Mnemonic::Vmovdqa),
        ("vzeroupper", Mnemonic::Vzeroupper),
        ("vaddsd xmm0, xmm1, xmm2", Mnemonic::Vaddsd),
    ] {
        verify_mnemonic(src, m);
    }
}

#[test]
fn xval_avx512() {
    verify_registers(
        "vaddps zmm0, zmm1, zmm2",
        Mnemonic::Vaddps,
        &[Register::ZMM0, Register::ZMM1, Register::ZMM2],
    );
    verify_registers(
        "vaddps zmm31, zmm16, zmm24",
        Mnemonic::Vaddps,
        &[Register::ZMM31, Register::ZMM16, Register::ZMM24],
    );
    verify_contains("vaddps zmm0{k1}{z}, zmm1, zmm2", Mnemonic::Vaddps, "{k1}{z}");
    verify_contains("vaddps zmm0, zmm1, dword ptr [rax]{1to16}", Mnemonic::Vaddps, "1to16");
    verify_contains("vaddps zmm0, zmm1, zmm2, {rd-sae}", Mnemonic::Vaddps, "rd-sae");
    verify_contains("vaddps zmm0, zmm1, [rax+0x40]", Mnemonic::Vaddps, "[rax+40h]");
    verify_contains("vpxord zmm0, zmm1, [rax+0x1000]", Mnemonic::Vpxord, "[rax+1000h]");
    for (src, m) in [
        ("vpternlogd zmm0, zmm1, zmm2, 0x96", Mnemonic::Vpternlogd),
        ("vmovdqa64 zmm0, [rax]", Mnemonic::Vmovdqa64),
        ("vmovdqu32 zmm1{k2}, [rsi]", Mnemonic::Vmovdqu32),
        ("vpcmpeqd k1, zmm0, zmm1", Mnemonic::Vpcmpeqd),
        ("vgatherdps zmm0{k1}, [rax+zmm1*4]", Mnemonic::Vgatherdps),
        ("vscatterdps [rax+zmm1*4]{k1}, zmm0", Mnemonic::Vscatterdps),
        ("vaddps xmm16, xmm1, xmm2", Mnemonic::Vaddps),
        ("vpaddb zmm0, zmm1, zmm2", Mnemonic::Vpaddb),
        ("kmovw k1, eax", Mnemonic::Kmovw),
    ] {
        verify_mnemonic(src, m);
    }
}

// ─── Other modes and AT&T input ──────────────────────────────────────────────

#[test]
fn xval_32_bit_mode() {
    for (src, m) in [
        ("inc eax", Mnemonic::Inc),
        ("push ebp", Mnemonic::Push),
        ("mov eax, [ebp+esi*2]", Mnemonic::Mov),
        ("call dword ptr [eax]", Mnemonic::Call),
    ] {
        let (instr, formatted) = decode_in(src, Syntax::Intel, CodeMode::Code32);
        assert_eq!(instr.mnemonic(), m, "`{src}` decoded as `{formatted}`");
    }
}

#[test]
fn xval_16_bit_mode() {
    for (src, m) in [
        ("mov ax, [bx+si]", Mnemonic::Mov),
        ("mov eax, 1", Mnemonic::Mov),
        ("mov word ptr [bp+di+4], 7", Mnemonic::Mov),
    ] {
        let (instr, formatted) = decode_in(src, Syntax::Intel, CodeMode::Code16);
        assert_eq!(instr.mnemonic(), m, "`{src}` decoded as `{formatted}`");
    }
}

#[test]
fn xval_att_input() {
    for (src, m) in [
        ("movq %rbx, %rax", Mnemonic::Mov),
        ("addl $1, 8(%rsp)", Mnemonic::Add),
        ("leaq 16(%rbx,%rcx,8), %rdx", Mnemonic::Lea),
        ("vaddps %zmm2, %zmm1, %zmm0{%k1}{z}", Mnemonic::Vaddps),
        ("movzbl (%rdi), %eax", Mnemonic::Movzx),
        ("jmp *%rax", Mnemonic::Jmp),
    ] {
        let (instr, formatted) = decode_in(src, Syntax::Att, CodeMode::Code64);
        assert_eq!(instr.mnemonic(), m, "`{src}` decoded as `{formatted}`");
    }
}
