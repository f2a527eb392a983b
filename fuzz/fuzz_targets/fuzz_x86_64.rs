#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Fuzz the one-shot assembler in every mode: must never panic, only return Ok/Err.
    for mode in [asm_x86::CodeMode::Code16, asm_x86::CodeMode::Code32, asm_x86::CodeMode::Code64] {
        let _ = asm_x86::assemble(data, mode);
    }

    // Fuzz the builder API with a base address, branch padding and multiple
    // emit calls (split on newlines).
    let mut asm = asm_x86::Assembler::new(asm_x86::CodeMode::Code64);
    asm.base_address(0x400000)
        .branch_alignment(asm_x86::BranchAlignment::within_32b_boundaries());
    for line in data.lines() {
        if asm.emit(line).is_err() {
            return;
        }
    }
    let _ = asm.finish();
});
