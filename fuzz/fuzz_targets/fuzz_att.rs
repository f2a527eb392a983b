#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    let config = asm_x86::AssemblerConfig {
        syntax: asm_x86::Syntax::Att,
        ..asm_x86::AssemblerConfig::for_mode(asm_x86::CodeMode::Code64)
    };
    let _ = asm_x86::assemble_with(data, config);

    let config = asm_x86::AssemblerConfig {
        syntax: asm_x86::Syntax::Att,
        ..asm_x86::AssemblerConfig::for_mode(asm_x86::CodeMode::Code32)
    };
    let _ = asm_x86::assemble_with(data, config);
});
