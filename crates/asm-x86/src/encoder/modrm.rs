//! ModRM, SIB and displacement selection for one r/m operand.

use alloc::string::String;

use crate::config::CodeMode;
use crate::error::{AsmError, EncodeError, Span};
use crate::expr::Value;
use crate::insn::{fits_either, fits_signed, DispPin};
use crate::operand::MemRef;
use crate::register::Register;

/// Build a ModRM byte.
#[inline]
pub(crate) const fn modrm(mode: u8, reg: u8, rm: u8) -> u8 {
    (mode << 6) | ((reg & 7) << 3) | (rm & 7)
}

/// Build a SIB byte from a log2 scale.
#[inline]
pub(crate) const fn sib(scale: u8, index: u8, base: u8) -> u8 {
    (scale << 6) | ((index & 7) << 3) | (base & 7)
}

/// The displacement field of an address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Disp {
    None,
    /// A known value stored in `size` bytes.
    Constant { value: i64, size: u8 },
    /// A value that layout or linking supplies.
    Symbol {
        value: Value,
        size: u8,
        signed: bool,
        pc_relative: bool,
    },
}

/// ModRM.mod and .rm, the SIB byte and the displacement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Address {
    pub mode: u8,
    pub rm: u8,
    pub sib: Option<u8>,
    pub disp: Disp,
    /// SIB.index bit 3.
    pub x: bool,
    /// Base or register bit 3.
    pub b: bool,
    /// Register bit 4 (EVEX.X for a register operand).
    pub rm_hi: bool,
    /// VSIB index bit 4 (EVEX.V').
    pub v_hi: bool,
}

impl Address {
    /// A register in ModRM.rm.
    pub(crate) fn register(reg: Register) -> Self {
        Address {
            mode: 3,
            rm: reg.code(),
            sib: None,
            disp: Disp::None,
            x: false,
            b: reg.is_extended(),
            rm_hi: reg.is_evex_extended(),
            v_hi: false,
        }
    }

    fn memory(mode: u8, rm: u8, sib: Option<u8>, disp: Disp) -> Self {
        Address {
            mode,
            rm,
            sib,
            disp,
            x: false,
            b: false,
            rm_hi: false,
            v_hi: false,
        }
    }
}

/// What constrains the displacement.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DispRules {
    pub pin: Option<DispPin>,
    /// EVEX disp8*N compression factor; 1 when there is none.
    pub scale: u32,
    pub mode: CodeMode,
}

/// Encode a memory reference.
pub(crate) fn address(mem: &MemRef, rules: &DispRules, span: Span) -> Result<Address, AsmError> {
    if mem.addr_bits == 16 {
        return address16(mem, rules, span);
    }
    if mem.is_ip_relative() {
        let disp = full_width(mem.disp.as_ref(), mem.addr_bits, true, span)?;
        return Ok(Address::memory(0, 5, None, disp));
    }
    let index = mem.index.map(|r| (r.code(), r.is_extended(), r.is_evex_extended()));
    let Some(base) = mem.base else {
        let disp = full_width(mem.disp.as_ref(), mem.addr_bits, false, span)?;
        if index.is_none() && !rules.mode.is_64() {
            return Ok(Address::memory(0, 5, None, disp));
        }
        // 64-bit mode reads rm=101 as RIP-relative, so absolute goes via SIB.
        let (code, x, v_hi) = index.unwrap_or((4, false, false));
        let mut a = Address::memory(0, 4, Some(sib(mem.scale, code, 5)), disp);
        a.x = x;
        a.v_hi = v_hi;
        return Ok(a);
    };

    let (mode, disp) = sized_disp(mem, base.code() == 5, rules, span)?;
    let mut a = if index.is_some() || base.code() == 4 {
        let (code, _, _) = index.unwrap_or((4, false, false));
        Address::memory(mode, 4, Some(sib(mem.scale, code, base.code())), disp)
    } else {
        Address::memory(mode, base.code(), None, disp)
    };
    a.b = base.is_extended();
    if let Some((_, x, v_hi)) = index {
        a.x = x;
        a.v_hi = v_hi;
    }
    Ok(a)
}

fn address16(mem: &MemRef, rules: &DispRules, span: Span) -> Result<Address, AsmError> {
    if mem.scale != 0 {
        return Err(invalid("16-bit addressing does not take a scale factor", span));
    }
    if !mem.has_base_index() {
        let disp = full_width(mem.disp.as_ref(), 16, false, span)?;
        return Ok(Address::memory(0, 6, None, disp));
    }
    let base = mem.base.map(|r| r.num());
    let index = mem.index.map(|r| r.num());
    let rm = match (base, index) {
        (Some(3), Some(6)) | (Some(6), Some(3)) => 0,
        (Some(3), Some(7)) | (Some(7), Some(3)) => 1,
        (Some(5), Some(6)) | (Some(6), Some(5)) => 2,
        (Some(5), Some(7)) | (Some(7), Some(5)) => 3,
        (Some(6), None) | (None, Some(6)) => 4,
        (Some(7), None) | (None, Some(7)) => 5,
        (Some(5), None) | (None, Some(5)) => 6,
        (Some(3), None) | (None, Some(3)) => 7,
        _ => return Err(invalid("not a valid 16-bit base/index combination", span)),
    };
    let (mode, disp) = sized_disp(mem, rm == 6, rules, span)?;
    Ok(Address::memory(mode, rm, None, disp))
}

/// ModRM.mod and displacement for an address with a base register.
/// `needs_disp`: the base is `bp`/`ebp`/`r13`, which has no mod=00 form.
fn sized_disp(mem: &MemRef, needs_disp: bool, rules: &DispRules, span: Span) -> Result<(u8, Disp), AsmError> {
    let full = if mem.addr_bits == 16 { 2 } else { 4 };
    match &mem.disp {
        None | Some(Value::Constant(0)) if rules.pin.is_none() => Ok(if needs_disp {
            (1, Disp::Constant { value: 0, size: 1 })
        } else {
            (0, Disp::None)
        }),
        None => Ok(match rules.pin {
            Some(DispPin::Disp32) => (2, Disp::Constant { value: 0, size: full }),
            _ => (1, Disp::Constant { value: 0, size: 1 }),
        }),
        Some(Value::Constant(d)) => {
            let d = *d;
            let scale = i64::from(rules.scale.max(1));
            let short = (d % scale == 0 && fits_signed(d / scale, 8)).then_some(d / scale);
            match (rules.pin, short) {
                (Some(DispPin::Disp32), _) | (None, None) => {
                    Ok((2, full_width(mem.disp.as_ref(), mem.addr_bits, false, span)?))
                }
                (_, Some(q)) => Ok((1, Disp::Constant { value: q, size: 1 })),
                (Some(DispPin::Disp8), None) => Err(AsmError::Encode {
                    kind: EncodeError::ForcedDisp8Overflow,
                    span,
                }),
            }
        }
        Some(sym) => {
            if rules.pin == Some(DispPin::Disp8) {
                return Ok((
                    1,
                    Disp::Symbol {
                        value: sym.clone(),
                        size: 1,
                        signed: true,
                        pc_relative: false,
                    },
                ));
            }
            Ok((2, full_width(Some(sym), mem.addr_bits, false, span)?))
        }
    }
}

/// A displacement in the full field of the address size.
fn full_width(disp: Option<&Value>, addr_bits: u16, pc_relative: bool, span: Span) -> Result<Disp, AsmError> {
    let size: u8 = if addr_bits == 16 { 2 } else { 4 };
    match disp {
        None => Ok(Disp::Constant { value: 0, size }),
        Some(Value::Constant(d)) => {
            let ok = match addr_bits {
                _ if pc_relative => fits_signed(*d, 32),
                16 => fits_either(*d, 16),
                64 => fits_signed(*d, 32),
                _ => fits_either(*d, 32),
            };
            if !ok {
                return Err(AsmError::DisplacementOverflow {
                    value: *d,
                    bits: size * 8,
                    span,
                });
            }
            Ok(Disp::Constant { value: *d, size })
        }
        Some(sym) => Ok(Disp::Symbol {
            value: sym.clone(),
            size,
            signed: addr_bits == 64 || pc_relative,
            pc_relative,
        }),
    }
}

fn invalid(detail: &str, span: Span) -> AsmError {
    AsmError::InvalidOperand {
        detail: String::from(detail),
        span,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reg(name: &str) -> Register {
        Register::from_name(name).unwrap()
    }

    fn mem(base: Option<&str>, index: Option<&str>, scale: u8, disp: Option<i64>, bits: u16) -> MemRef {
        MemRef {
            base: base.map(reg),
            index: index.map(reg),
            scale,
            segment: None,
            disp: disp.map(Value::Constant),
            vsib: false,
            addr_bits: bits,
            size: None,
        }
    }

    fn rules(mode: CodeMode) -> DispRules {
        DispRules {
            pin: None,
            scale: 1,
            mode,
        }
    }

    fn encode(m: &MemRef, r: &DispRules) -> Address {
        address(m, r, Span::dummy()).unwrap()
    }

    #[test]
    fn plain_base() {
        let a = encode(&mem(Some("rax"), None, 0, None, 64), &rules(CodeMode::Code64));
        assert_eq!((a.mode, a.rm, a.sib, a.disp), (0, 0, None, Disp::None));
    }

    #[test]
    fn rbp_and_r13_need_a_zero_disp8() {
        for base in ["rbp", "r13"] {
            let a = encode(&mem(Some(base), None, 0, None, 64), &rules(CodeMode::Code64));
            assert_eq!((a.mode, a.rm), (1, 5));
            assert_eq!(a.disp, Disp::Constant { value: 0, size: 1 });
        }
        assert!(encode(&mem(Some("r13"), None, 0, None, 64), &rules(CodeMode::Code64)).b);
    }

    #[test]
    fn rsp_and_r12_need_a_sib() {
        let a = encode(&mem(Some("rsp"), None, 0, None, 64), &rules(CodeMode::Code64));
        assert_eq!((a.rm, a.sib), (4, Some(0x24)));
        let a = encode(&mem(Some("r12"), None, 0, Some(8), 64), &rules(CodeMode::Code64));
        assert_eq!((a.mode, a.rm, a.sib, a.b), (1, 4, Some(0x24), true));
    }

    #[test]
    fn base_index_scale_disp32() {
        let a = encode(&mem(Some("rax"), Some("rcx"), 2, Some(0x100), 64), &rules(CodeMode::Code64));
        assert_eq!((a.mode, a.rm, a.sib), (2, 4, Some(0x88)));
        assert_eq!(a.disp, Disp::Constant { value: 0x100, size: 4 });
    }

    #[test]
    fn extended_index_sets_x() {
        let a = encode(&mem(Some("rax"), Some("r9"), 0, None, 64), &rules(CodeMode::Code64));
        assert!(a.x);
        assert!(!a.b);
        assert_eq!(a.sib, Some(0x08));
    }

    #[test]
    fn absolute_address_per_mode() {
        let m = mem(None, None, 0, Some(0x1000), 32);
        let a = encode(&m, &rules(CodeMode::Code32));
        assert_eq!((a.mode, a.rm, a.sib), (0, 5, None));
        let m = mem(None, None, 0, Some(0x1000), 64);
        let a = encode(&m, &rules(CodeMode::Code64));
        assert_eq!((a.mode, a.rm, a.sib), (0, 4, Some(0x25)));
    }

    #[test]
    fn index_without_base() {
        let a = encode(&mem(None, Some("rcx"), 3, None, 64), &rules(CodeMode::Code64));
        assert_eq!((a.mode, a.rm, a.sib), (0, 4, Some(0xCD)));
        assert_eq!(a.disp, Disp::Constant { value: 0, size: 4 });
    }

    #[test]
    fn rip_relative_symbol() {
        let mut m = mem(Some("rip"), None, 0, None, 64);
        m.disp = Some(Value::symbol("table"));
        let a = encode(&m, &rules(CodeMode::Code64));
        assert_eq!((a.mode, a.rm), (0, 5));
        assert!(matches!(a.disp, Disp::Symbol { size: 4, pc_relative: true, .. }));
    }

    #[test]
    fn sixteen_bit_forms() {
        let r = rules(CodeMode::Code16);
        let a = encode(&mem(Some("bx"), Some("si"), 0, None, 16), &r);
        assert_eq!((a.mode, a.rm), (0, 0));
        let a = encode(&mem(Some("bp"), None, 0, None, 16), &r);
        assert_eq!((a.mode, a.rm), (1, 6));
        let a = encode(&mem(Some("bx"), Some("si"), 0, Some(0x1234), 16), &r);
        assert_eq!((a.mode, a.rm), (2, 0));
        assert_eq!(a.disp, Disp::Constant { value: 0x1234, size: 2 });
        let a = encode(&mem(None, None, 0, Some(0x10), 16), &r);
        assert_eq!((a.mode, a.rm), (0, 6));
        assert!(address(&mem(Some("ax"), None, 0, None, 16), &r, Span::dummy()).is_err());
    }

    #[test]
    fn disp8_compression() {
        let r = DispRules {
            pin: None,
            scale: 64,
            mode: CodeMode::Code64,
        };
        let a = encode(&mem(Some("rax"), None, 0, Some(128), 64), &r);
        assert_eq!(a.disp, Disp::Constant { value: 2, size: 1 });
        let a = encode(&mem(Some("rax"), None, 0, Some(100), 64), &r);
        assert_eq!(a.disp, Disp::Constant { value: 100, size: 4 });
    }

    #[test]
    fn pinned_widths() {
        let mut r = rules(CodeMode::Code64);
        r.pin = Some(DispPin::Disp32);
        let a = encode(&mem(Some("rax"), None, 0, None, 64), &r);
        assert_eq!((a.mode, a.disp.clone()), (2, Disp::Constant { value: 0, size: 4 }));

        r.pin = Some(DispPin::Disp8);
        let a = encode(&mem(Some("rax"), None, 0, Some(0), 64), &r);
        assert_eq!(a.mode, 1);
        let err = address(&mem(Some("rax"), None, 0, Some(1000), 64), &r, Span::dummy()).unwrap_err();
        assert!(matches!(
            err,
            AsmError::Encode {
                kind: EncodeError::ForcedDisp8Overflow,
                ..
            }
        ));
    }

    #[test]
    fn displacement_range() {
        let err = address(
            &mem(Some("rax"), None, 0, Some(0x1_0000_0000), 64),
            &rules(CodeMode::Code64),
            Span::dummy(),
        )
        .unwrap_err();
        assert!(matches!(err, AsmError::DisplacementOverflow { bits: 32, .. }));
        // 32-bit addressing wraps: either reading is fine.
        let a = encode(&mem(Some("eax"), None, 0, Some(0xFFFF_FF00), 32), &rules(CodeMode::Code32));
        assert_eq!(a.mode, 2);
    }

    #[test]
    fn register_operand() {
        let a = Address::register(reg("r9"));
        assert_eq!((a.mode, a.rm, a.b, a.rm_hi), (3, 1, true, false));
        let a = Address::register(reg("zmm17"));
        assert_eq!((a.rm, a.b, a.rm_hi), (1, false, true));
        assert_eq!(modrm(3, 2, 1), 0xD1);
        assert_eq!(sib(3, 1, 5), 0xCD);
    }
}
