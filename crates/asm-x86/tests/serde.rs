//! Serde round-trip tests for the public configuration, result and
//! diagnostic types.

#![cfg(feature = "serde")]

use asm_x86::{
    assemble_with, AsmError, AssemblerConfig, AssemblyResult, BranchAlignment, CodeMode, CpuFeatures, EncodeError,
    MatchError, OptLevel, Span, Syntax,
};

/// Helper: serialize to JSON, deserialize back, assert equality.
fn round_trip<T>(val: &T)
where
    T: serde::Serialize + serde::de::DeserializeOwned + PartialEq + core::fmt::Debug,
{
    let json = serde_json::to_string(val).expect("serialize");
    let back: T = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(val, &back, "round-trip mismatch for JSON: {json}");
}

#[test]
fn serde_span() {
    round_trip(&Span::new(1, 5, 10, 3));
    round_trip(&Span::default());
}

#[test]
fn serde_config() {
    round_trip(&AssemblerConfig::default());
    round_trip(&AssemblerConfig {
        syntax: Syntax::Att,
        cpu: CpuFeatures::X86_64_V3,
        opt_level: OptLevel::Size,
        branch_alignment: BranchAlignment::within_32b_boundaries(),
        ..AssemblerConfig::for_mode(CodeMode::Code32)
    });
}

#[test]
fn serde_errors() {
    let span = Span::new(2, 3, 7, 4);
    round_trip(&AsmError::UnknownMnemonic {
        mnemonic: "bogus".into(),
        span,
    });
    round_trip(&AsmError::Match {
        kind: MatchError::UnsupportedMasking,
        mnemonic: "vaddps".into(),
        span,
    });
    round_trip(&AsmError::Encode {
        kind: EncodeError::HighByteWithRex,
        span,
    });
}

#[test]
fn serde_assembly_result() {
    let result = assemble_with("start: jmp start\nje elsewhere", AssemblerConfig::default()).unwrap();
    let json = serde_json::to_string(&result).expect("serialize");
    let back: AssemblyResult = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(back.bytes(), result.bytes());
    assert_eq!(back.labels(), result.labels());
    assert_eq!(back.relocations(), result.relocations());
    assert_eq!(back.base_address(), result.base_address());
}
