//! VEX and EVEX prefix construction.
//!
//! Register-extension bits are passed un-inverted; the emitters store
//! their complements as the hardware expects.

use super::InstrBytes;

/// Fields shared by the VEX and EVEX prefixes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct VexFields {
    /// ModRM.reg bit 3.
    pub r: bool,
    /// SIB.index bit 3, or ModRM.rm bit 4 for an EVEX register operand.
    pub x: bool,
    /// ModRM.rm or SIB.base bit 3.
    pub b: bool,
    /// Opcode map (`mmmmm` / `mm`).
    pub map: u8,
    pub w: bool,
    /// Extra source register, low four bits.
    pub vvvv: u8,
    /// Vector length: VEX.L, or EVEX L'L.
    pub l: u8,
    /// Implied mandatory prefix.
    pub pp: u8,
}

/// EVEX-only fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct EvexFields {
    /// ModRM.reg bit 4.
    pub r_hi: bool,
    /// vvvv bit 4, or the VSIB index bit 4.
    pub v_hi: bool,
    /// Zeroing-masking.
    pub z: bool,
    /// Broadcast, static rounding or SAE.
    pub b: bool,
    /// Opmask register.
    pub aaa: u8,
}

/// Whether the two-byte form can carry these fields.
pub(crate) fn fits_vex2(f: &VexFields) -> bool {
    f.map == 1 && !f.w && !f.x && !f.b
}

/// C5 [R vvvv L pp]
pub(crate) fn emit_vex2(buf: &mut InstrBytes, f: &VexFields) {
    let byte1 = (if f.r { 0 } else { 0x80 }) | ((!f.vvvv & 0x0F) << 3) | ((f.l & 1) << 2) | (f.pp & 0x03);
    buf.push(0xC5);
    buf.push(byte1);
}

/// C4 [R X B mmmmm] [W vvvv L pp]
pub(crate) fn emit_vex3(buf: &mut InstrBytes, f: &VexFields) {
    let byte1 = (if f.r { 0 } else { 0x80 })
        | (if f.x { 0 } else { 0x40 })
        | (if f.b { 0 } else { 0x20 })
        | (f.map & 0x1F);
    let byte2 = (if f.w { 0x80 } else { 0 }) | ((!f.vvvv & 0x0F) << 3) | ((f.l & 1) << 2) | (f.pp & 0x03);
    buf.push(0xC4);
    buf.push(byte1);
    buf.push(byte2);
}

/// The shortest VEX prefix for `f`, or always the three-byte one when
/// `force3` is set (`{vex3}`).
pub(crate) fn emit_vex(buf: &mut InstrBytes, f: &VexFields, force3: bool) {
    if !force3 && fits_vex2(f) {
        emit_vex2(buf, f);
    } else {
        emit_vex3(buf, f);
    }
}

/// 62 [R X B R' 0 0 mm] [W vvvv 1 pp] [z L'L b V' aaa]
pub(crate) fn emit_evex(buf: &mut InstrBytes, f: &VexFields, e: &EvexFields) {
    let p0 = (if f.r { 0 } else { 0x80 })
        | (if f.x { 0 } else { 0x40 })
        | (if f.b { 0 } else { 0x20 })
        | (if e.r_hi { 0 } else { 0x10 })
        | (f.map & 0x03);
    let p1 = (if f.w { 0x80 } else { 0 }) | ((!f.vvvv & 0x0F) << 3) | 0x04 | (f.pp & 0x03);
    let p2 = (if e.z { 0x80 } else { 0 })
        | ((f.l & 0x03) << 5)
        | (if e.b { 0x10 } else { 0 })
        | (if e.v_hi { 0 } else { 0x08 })
        | (e.aaa & 0x07);
    buf.extend_from_slice(&[0x62, p0, p1, p2]);
}
