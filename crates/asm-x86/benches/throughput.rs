//! Performance benchmarks for `asm_x86`.
//!
//! Measures:
//! - Single instruction latency (legacy, VEX and EVEX paths)
//! - Multi-instruction throughput (bytes of source text per second)
//! - Label-heavy workloads
//! - Branch relaxation and boundary padding
//!
//! Run with: `cargo bench`

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use asm_x86::{assemble, assemble_with, Assembler, AssemblerConfig, BranchAlignment, CodeMode, Syntax};

// ─── Single-Instruction Latency ──────────────────────────────────────────────

fn bench_single_instruction(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_instruction");

    for (name, src) in [
        ("nop", "nop"),
        ("mov_reg_imm", "mov rax, 0x1234"),
        ("add_reg_reg", "add rax, rbx"),
        ("mov_mem_sib", "mov [rax+rcx*8+0x10], rdx"),
        ("vaddps_vex", "vaddps ymm0, ymm1, ymm2"),
        ("vaddps_evex", "vaddps zmm0, zmm1, zmm2"),
        ("vaddps_evex_masked_bcst", "vaddps zmm0{k1}{z}, zmm1, dword ptr [rax]{1to16}"),
    ] {
        group.bench_function(name, |b| {
            b.iter(|| assemble(black_box(src), CodeMode::Code64).unwrap())
        });
    }

    let att = AssemblerConfig {
        syntax: Syntax::Att,
        ..AssemblerConfig::for_mode(CodeMode::Code64)
    };
    group.bench_function("att_mov_mem_sib", |b| {
        b.iter(|| assemble_with(black_box("movq %rdx, 0x10(%rax,%rcx,8)"), att).unwrap())
    });

    group.finish();
}

// ─── Multi-Instruction Throughput ─────────────────────────────────────────────

/// Generate a block of N x86-64 instructions (no labels).
fn gen_x86_64_block(n: usize) -> String {
    let mut s = String::with_capacity(n * 24);
    for i in 0..n {
        match i % 8 {
            0 => s.push_str("mov rax, rbx\n"),
            1 => s.push_str("add rcx, [rdx+8]\n"),
            2 => s.push_str("sub rsi, 1000\n"),
            3 => s.push_str("xor r8d, r9d\n"),
            4 => s.push_str("lea r10, [r11+r12*4]\n"),
            5 => s.push_str("vpaddd ymm0, ymm1, ymm2\n"),
            6 => s.push_str("vpxord zmm3, zmm4, zmm5\n"),
            _ => s.push_str("imul eax, ecx, 7\n"),
        }
    }
    s
}

fn bench_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("throughput");

    for n in [100, 1000, 5000] {
        let src = gen_x86_64_block(n);
        group.throughput(Throughput::Bytes(src.len() as u64));
        group.bench_function(format!("x86_64_{n}_insn"), |b| {
            b.iter(|| assemble(black_box(&src), CodeMode::Code64).unwrap())
        });
    }

    group.finish();
}

// ─── Label-Heavy Workloads ────────────────────────────────────────────────────

/// Generate code with many labels and references.
fn gen_label_heavy(n_labels: usize) -> String {
    let mut s = String::with_capacity(n_labels * 40);
    for i in 0..n_labels {
        s.push_str(&format!("label_{i}:\n"));
        s.push_str("nop\n");
    }
    for i in 0..n_labels.min(50) {
        let target = (i + n_labels / 2) % n_labels;
        s.push_str(&format!("jmp label_{target}\n"));
    }
    s
}

fn bench_labels(c: &mut Criterion) {
    let mut group = c.benchmark_group("labels");

    for n in [50, 200, 500] {
        let src = gen_label_heavy(n);
        group.bench_function(format!("{n}_labels"), |b| {
            b.iter(|| assemble(black_box(&src), CodeMode::Code64).unwrap())
        });
    }

    group.finish();
}

// ─── Branch Relaxation ────────────────────────────────────────────────────────

/// Conditional branches past a NOP sled of `n_nops` bytes.
fn gen_relaxation_workload(n_nops: usize) -> String {
    let mut s = String::with_capacity(n_nops * 4 + 64);
    s.push_str("start:\n");
    s.push_str("je far_target\n");
    s.push_str("jne far_target\n");
    s.push_str("jl far_target\n");
    s.push_str(&"nop\n".repeat(n_nops));
    s.push_str("far_target:\n");
    s.push_str("ret\n");
    s
}

/// A chain of branches where each one's growth pushes the next out of range.
fn gen_cascade(n: usize) -> String {
    let mut s = String::new();
    for i in 0..n {
        s.push_str(&format!("jmp l{i}\n"));
        s.push_str(&"nop\n".repeat(124));
    }
    for i in 0..n {
        s.push_str(&format!("l{i}:\n"));
    }
    s
}

fn bench_relaxation(c: &mut Criterion) {
    let mut group = c.benchmark_group("relaxation");

    for (name, n) in [("short_branch_10_nop", 10), ("edge_branch_120_nop", 120), ("long_branch_200_nop", 200)] {
        let src = gen_relaxation_workload(n);
        group.bench_function(name, |b| {
            b.iter(|| assemble(black_box(&src), CodeMode::Code64).unwrap())
        });
    }

    let cascade = gen_cascade(32);
    group.bench_function("cascade_32", |b| {
        b.iter(|| assemble(black_box(&cascade), CodeMode::Code64).unwrap())
    });

    let padded = AssemblerConfig {
        branch_alignment: BranchAlignment::within_32b_boundaries(),
        ..AssemblerConfig::for_mode(CodeMode::Code64)
    };
    let src = gen_label_heavy(200);
    group.bench_function("padded_200_labels", |b| {
        b.iter(|| assemble_with(black_box(&src), padded).unwrap())
    });

    group.finish();
}

// ─── API Comparison ──────────────────────────────────────────────────────────

fn bench_builder_vs_oneshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("api_comparison");

    let source = "mov rax, 1\nadd rax, rbx\nsub rcx, rdx\nret";

    group.bench_function("oneshot_4_insn", |b| {
        b.iter(|| assemble(black_box(source), CodeMode::Code64).unwrap())
    });

    group.bench_function("builder_4_insn_at_base", |b| {
        b.iter(|| {
            let mut asm = Assembler::new(CodeMode::Code64);
            asm.base_address(0x400000);
            asm.emit(black_box("mov rax, 1")).unwrap();
            asm.emit(black_box("add rax, rbx")).unwrap();
            asm.emit(black_box("sub rcx, rdx")).unwrap();
            asm.emit(black_box("ret")).unwrap();
            let result = asm.finish().unwrap();
            black_box(result.bytes().len());
        })
    });

    group.finish();
}

// ─── Realistic Workloads ──────────────────────────────────────────────────────

fn bench_realistic(c: &mut Criterion) {
    let mut group = c.benchmark_group("realistic");

    let syscall_stub = "\
mov rax, 59
mov rdi, rsi
xor rsi, rsi
xor rdx, rdx
syscall
";
    group.bench_function("syscall_stub", |b| {
        b.iter(|| assemble(black_box(syscall_stub), CodeMode::Code64).unwrap())
    });

    let fn_prolog = "\
push rbp
mov rbp, rsp
sub rsp, 32
mov [rbp-8], rdi
mov [rbp-16], rsi
mov rax, [rbp-8]
add rax, [rbp-16]
leave
ret
";
    group.bench_function("function_prolog_epilog", |b| {
        b.iter(|| assemble(black_box(fn_prolog), CodeMode::Code64).unwrap())
    });

    let avx512_body = "\
vmovaps zmm0, zmm1
vaddps zmm2, zmm3, zmm4
vmulps zmm5, zmm6, zmm7
vsubps zmm8, zmm9, zmm10
vmovaps zmm11, zmm12
vfmadd231ps zmm0, zmm1, zmm2
";
    group.bench_function("avx512_vector_body", |b| {
        b.iter(|| assemble(black_box(avx512_body), CodeMode::Code64).unwrap())
    });

    let real_mode = "\
start:
mov ax, 0x07c0
mov ds, ax
mov si, [bx+si+4]
loop start
";
    group.bench_function("real_mode_loop", |b| {
        b.iter(|| assemble(black_box(real_mode), CodeMode::Code16).unwrap())
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_single_instruction,
    bench_throughput,
    bench_labels,
    bench_relaxation,
    bench_builder_vs_oneshot,
    bench_realistic,
);
criterion_main!(benches);
