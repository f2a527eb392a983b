//! Operand-type bit sets.
//!
//! An [`OperandType`] describes which shapes an operand may take: a register
//! class, an instance tag for implicit registers, and flag bits for sizes,
//! immediate widths, displacement widths and memory forms. Parsed operands
//! and template operand slots use the same type so matching is a set
//! intersection.

use bitflags::bitflags;
use core::fmt;

/// Register class. At most one per operand type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RegClass {
    /// Not a register.
    #[default]
    None,
    /// General purpose register.
    Gpr,
    /// Segment register.
    Segment,
    /// Control register.
    Control,
    /// Debug register.
    Debug,
    /// x87 stack register.
    Fpu,
    /// MMX register.
    Mmx,
    /// XMM/YMM/ZMM register; the width lives in the size flags.
    Simd,
    /// AVX-512 opmask register.
    Mask,
    /// MPX bound register.
    Bound,
    /// AMX tile register.
    Tmm,
}

/// Implicit-register tag. At most one per operand type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Instance {
    /// No specific register.
    #[default]
    None,
    /// `al`/`ax`/`eax`/`rax`, `st(0)`, `xmm0`.
    Accum,
    /// `cl`, the shift count.
    RegC,
    /// `dx`, the I/O port.
    RegD,
    /// `bx`, used by `xlat`.
    RegB,
}

bitflags! {
    /// Size, immediate, displacement and memory-form flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct TypeFlags: u64 {
        const BYTE = 1 << 0;
        const WORD = 1 << 1;
        const DWORD = 1 << 2;
        const FWORD = 1 << 3;
        const QWORD = 1 << 4;
        const TBYTE = 1 << 5;
        const XMMWORD = 1 << 6;
        const YMMWORD = 1 << 7;
        const ZMMWORD = 1 << 8;
        const TMMWORD = 1 << 9;
        /// Memory operand without an explicit size.
        const UNSPECIFIED = 1 << 10;

        const IMM1 = 1 << 16;
        const IMM8 = 1 << 17;
        /// 8-bit immediate sign-extended to the operand size.
        const IMM8S = 1 << 18;
        const IMM16 = 1 << 19;
        const IMM32 = 1 << 20;
        /// 32-bit immediate sign-extended to 64 bits.
        const IMM32S = 1 << 21;
        const IMM64 = 1 << 22;

        const DISP8 = 1 << 24;
        const DISP16 = 1 << 25;
        const DISP32 = 1 << 26;
        const DISP64 = 1 << 27;

        /// Memory with a base and/or index register.
        const BASE_INDEX = 1 << 32;
        /// `*` operand of an indirect jump or call.
        const JUMP_ABSOLUTE = 1 << 33;
        /// Implicit `es:` string destination.
        const ES_SEG = 1 << 34;

        const SIZES = Self::BYTE.bits()
            | Self::WORD.bits()
            | Self::DWORD.bits()
            | Self::FWORD.bits()
            | Self::QWORD.bits()
            | Self::TBYTE.bits()
            | Self::XMMWORD.bits()
            | Self::YMMWORD.bits()
            | Self::ZMMWORD.bits()
            | Self::TMMWORD.bits()
            | Self::UNSPECIFIED.bits();
        const IMM = Self::IMM1.bits()
            | Self::IMM8.bits()
            | Self::IMM8S.bits()
            | Self::IMM16.bits()
            | Self::IMM32.bits()
            | Self::IMM32S.bits()
            | Self::IMM64.bits();
        const DISP = Self::DISP8.bits() | Self::DISP16.bits() | Self::DISP32.bits() | Self::DISP64.bits();
        /// Anything that addresses memory.
        const ANY_MEM = Self::DISP.bits() | Self::BASE_INDEX.bits();
        const GPR_SIZES = Self::BYTE.bits() | Self::WORD.bits() | Self::DWORD.bits() | Self::QWORD.bits();
        const VEC_SIZES = Self::XMMWORD.bits() | Self::YMMWORD.bits() | Self::ZMMWORD.bits();
    }
}

/// The shape of one operand or one template operand slot.
///
/// Class and instance are enums, so "at most one of each" holds by
/// construction.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OperandType {
    class: RegClass,
    instance: Instance,
    flags: TypeFlags,
}

impl OperandType {
    /// The empty type.
    pub const NONE: OperandType = OperandType::flags(TypeFlags::empty());

    /// Build from all three parts.
    #[must_use]
    pub const fn new(class: RegClass, instance: Instance, flags: TypeFlags) -> Self {
        Self {
            class,
            instance,
            flags,
        }
    }

    /// A class-less type carrying only flags.
    #[must_use]
    pub const fn flags(flags: TypeFlags) -> Self {
        Self::new(RegClass::None, Instance::None, flags)
    }

    /// A register class with size flags.
    #[must_use]
    pub const fn reg(class: RegClass, sizes: TypeFlags) -> Self {
        Self::new(class, Instance::None, sizes)
    }

    /// Same type tagged with an implicit-register instance.
    #[must_use]
    pub const fn with_instance(self, instance: Instance) -> Self {
        Self::new(self.class, instance, self.flags)
    }

    /// Same type plus extra flags.
    #[must_use]
    pub const fn with(self, flags: TypeFlags) -> Self {
        Self::new(self.class, self.instance, self.flags.union(flags))
    }

    /// Register class.
    #[must_use]
    pub const fn class(&self) -> RegClass {
        self.class
    }

    /// Instance tag.
    #[must_use]
    pub const fn instance(&self) -> Instance {
        self.instance
    }

    /// Flag bits.
    #[must_use]
    pub const fn bits(&self) -> TypeFlags {
        self.flags
    }

    /// Whether every bit of `f` is set.
    #[must_use]
    pub const fn has(&self, f: TypeFlags) -> bool {
        self.flags.contains(f)
    }

    /// Whether any bit of `f` is set.
    #[must_use]
    pub const fn any(&self, f: TypeFlags) -> bool {
        self.flags.intersects(f)
    }

    /// Size flags only.
    #[must_use]
    pub const fn sizes(&self) -> TypeFlags {
        self.flags.intersection(TypeFlags::SIZES)
    }

    /// Register operand or register-admitting slot.
    #[must_use]
    pub const fn is_register(&self) -> bool {
        !matches!(self.class, RegClass::None)
    }

    /// Memory operand or memory-admitting slot.
    #[must_use]
    pub const fn is_memory(&self) -> bool {
        self.flags.intersects(TypeFlags::ANY_MEM)
    }

    /// Immediate operand or immediate-admitting slot.
    #[must_use]
    pub const fn is_immediate(&self) -> bool {
        self.flags.intersects(TypeFlags::IMM)
    }

    /// Intersection. A class or instance that differs collapses to none.
    #[must_use]
    pub const fn and(self, other: OperandType) -> OperandType {
        OperandType {
            class: if same_class(self.class, other.class) {
                self.class
            } else {
                RegClass::None
            },
            instance: if same_instance(self.instance, other.instance) {
                self.instance
            } else {
                Instance::None
            },
            flags: self.flags.intersection(other.flags),
        }
    }

    /// Union. A class or instance that differs collapses to none.
    #[must_use]
    pub const fn or(self, other: OperandType) -> OperandType {
        OperandType {
            class: if same_class(self.class, other.class) {
                self.class
            } else {
                RegClass::None
            },
            instance: if same_instance(self.instance, other.instance) {
                self.instance
            } else {
                Instance::None
            },
            flags: self.flags.union(other.flags),
        }
    }

    /// Symmetric difference. Class and instance never survive: differing
    /// ones collapse and equal ones cancel.
    #[must_use]
    pub const fn xor(self, other: OperandType) -> OperandType {
        OperandType::flags(self.flags.symmetric_difference(other.flags))
    }

    /// Clear the flags set in `mask`. `mask` must be class- and
    /// instance-free.
    #[must_use]
    pub fn and_not(self, mask: OperandType) -> OperandType {
        debug_assert!(
            mask.class == RegClass::None && mask.instance == Instance::None,
            "and_not mask carries a register class"
        );
        OperandType {
            class: self.class,
            instance: self.instance,
            flags: self.flags.difference(mask.flags),
        }
    }

    /// Whether both values describe the same shape.
    #[must_use]
    pub fn equal(&self, other: &OperandType) -> bool {
        self == other
    }

    /// No class, no instance, no flags.
    #[must_use]
    pub const fn all_zero(&self) -> bool {
        matches!(self.class, RegClass::None)
            && matches!(self.instance, Instance::None)
            && self.flags.is_empty()
    }

    /// Insert flag bits.
    pub fn set(&mut self, mask: TypeFlags) {
        self.flags.insert(mask);
    }

    /// Remove flag bits.
    pub fn clear(&mut self, mask: TypeFlags) {
        self.flags.remove(mask);
    }

    /// Number of distinct sizes set, ignoring `UNSPECIFIED`.
    #[must_use]
    pub const fn size_count(&self) -> u32 {
        self.flags
            .intersection(TypeFlags::SIZES)
            .difference(TypeFlags::UNSPECIFIED)
            .bits()
            .count_ones()
    }
}

const fn same_class(a: RegClass, b: RegClass) -> bool {
    a as u8 == b as u8
}

const fn same_instance(a: Instance, b: Instance) -> bool {
    a as u8 == b as u8
}

impl fmt::Debug for OperandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("OperandType(")?;
        let mut first = true;
        if self.class != RegClass::None {
            write!(f, "{:?}", self.class)?;
            first = false;
        }
        if self.instance != Instance::None {
            if !first {
                f.write_str("|")?;
            }
            write!(f, "{:?}", self.instance)?;
            first = false;
        }
        for (name, _) in self.flags.iter_names() {
            if !first {
                f.write_str("|")?;
            }
            f.write_str(name)?;
            first = false;
        }
        f.write_str(")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const R32: OperandType = OperandType::reg(RegClass::Gpr, TypeFlags::DWORD);
    const XMM: OperandType = OperandType::reg(RegClass::Simd, TypeFlags::XMMWORD);

    #[test]
    fn and_collapses_differing_class() {
        let t = R32.and(XMM);
        assert_eq!(t.class(), RegClass::None);
        assert!(t.all_zero());
    }

    #[test]
    fn and_keeps_shared_class_and_sizes() {
        let slot = OperandType::reg(RegClass::Gpr, TypeFlags::GPR_SIZES)
            .with(TypeFlags::UNSPECIFIED | TypeFlags::ANY_MEM);
        let t = R32.and(slot);
        assert_eq!(t.class(), RegClass::Gpr);
        assert_eq!(t.sizes(), TypeFlags::DWORD);
    }

    #[test]
    fn and_instance_mismatch_clears_instance() {
        let acc = R32.with_instance(Instance::Accum);
        let t = acc.and(R32);
        assert_eq!(t.instance(), Instance::None);
        assert_eq!(acc.and(acc).instance(), Instance::Accum);
    }

    #[test]
    fn or_unions_flags() {
        let a = OperandType::flags(TypeFlags::IMM8);
        let b = OperandType::flags(TypeFlags::IMM32);
        assert!(a.or(b).has(TypeFlags::IMM8 | TypeFlags::IMM32));
        assert_eq!(R32.or(XMM).class(), RegClass::None);
        assert_eq!(R32.or(R32).class(), RegClass::Gpr);
    }

    #[test]
    fn xor_cancels_identical_values() {
        assert!(R32.xor(R32).all_zero());
        let t = OperandType::flags(TypeFlags::IMM8 | TypeFlags::IMM16)
            .xor(OperandType::flags(TypeFlags::IMM16));
        assert_eq!(t.bits(), TypeFlags::IMM8);
    }

    #[test]
    fn and_not_strips_flags_only() {
        let t = R32.with(TypeFlags::DISP8).and_not(OperandType::flags(TypeFlags::DISP));
        assert_eq!(t.class(), RegClass::Gpr);
        assert!(!t.any(TypeFlags::DISP));
    }

    #[test]
    #[should_panic(expected = "and_not mask")]
    #[cfg(debug_assertions)]
    fn and_not_rejects_class_mask() {
        let _ = R32.and_not(XMM);
    }

    #[test]
    fn set_and_clear() {
        let mut t = OperandType::NONE;
        assert!(t.all_zero());
        t.set(TypeFlags::BASE_INDEX);
        assert!(t.is_memory());
        t.clear(TypeFlags::BASE_INDEX);
        assert!(t.all_zero());
    }

    #[test]
    fn size_count_ignores_unspecified() {
        let t = OperandType::flags(TypeFlags::WORD | TypeFlags::DWORD | TypeFlags::UNSPECIFIED);
        assert_eq!(t.size_count(), 2);
    }

    #[test]
    fn debug_lists_parts() {
        let s = alloc::format!("{:?}", R32.with_instance(Instance::Accum));
        assert_eq!(s, "OperandType(Gpr|Accum|DWORD)");
    }
}
