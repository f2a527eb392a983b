//! Fragment layout: branch relaxation, boundary padding and the final byte
//! image.
//!
//! Instructions arrive already encoded. Everything whose size depends on
//! addresses gets a fragment of its own: relaxable branches, alignment
//! requests, and the padding that keeps branches off aligned boundaries.
//! [`Layout::relax`] iterates to a fixed point in which branch states only
//! ever grow; [`Layout::finish`] then writes the bytes and resolves fixups
//! against labels and externals.

use alloc::collections::BTreeMap;
use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use log::debug;

use crate::config::{CodeMode, CpuFeatures};
use crate::encoder::{BranchSite, Encoded, Fixup, InstrBytes, MAX_INSN_LEN};
use crate::error::{AsmError, Span};
use crate::expr::Value;

/// Passes [`Layout::relax`] runs before giving up.
pub const MAX_RELAXATION_PASSES: usize = 100;

/// Separates the number from the instance counter in the internal name of a
/// numeric label. Never produced by the lexer.
const LOCAL_MARK: char = '\u{2}';

/// Internal name of the `k`-th definition of numeric label `n`.
#[must_use]
pub fn local_label_name(n: u32, k: u32) -> String {
    format!("{}{}{}", n, LOCAL_MARK, k)
}

fn is_local(name: &str) -> bool {
    name.contains(LOCAL_MARK)
}

/// How a label is shown in diagnostics. Only forward references to numeric
/// labels can stay unresolved, so an internal name reads as `Nf`.
fn display_label(name: &str) -> String {
    match name.split_once(LOCAL_MARK) {
        Some((n, _)) => format!("{}f", n),
        None => name.to_string(),
    }
}

// ─── FragmentBytes ─────────────────────────────────────────

/// Byte storage for fixed fragments: instructions inline, data on the heap.
#[derive(Debug, Clone)]
enum FragmentBytes {
    Inline(InstrBytes),
    Heap(Vec<u8>),
}

impl core::ops::Deref for FragmentBytes {
    type Target = [u8];
    #[inline]
    fn deref(&self) -> &[u8] {
        match self {
            FragmentBytes::Inline(ib) => ib,
            FragmentBytes::Heap(v) => v,
        }
    }
}

// ─── Relax states ──────────────────────────────────────────

/// Branch shape being relaxed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RelaxKind {
    /// `jmp`: `EB rel8`, `E9 rel16`, `E9 rel32`.
    UncondJump,
    /// `jcc`: `7x rel8`, `0F 8x rel16`, `0F 8x rel32`.
    CondJump,
    /// `jcc` without the 386 near forms: the long variants jump over an
    /// `E9` with the inverted condition.
    CondJump8086,
}

/// Displacement width of a relaxable branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Width {
    /// rel8, growing to `Near32`.
    Short,
    /// rel8 in 16-bit code, growing to `Near16`.
    Short16,
    /// rel16. Offsets wrap within the 64 KiB segment.
    Near16,
    /// rel32.
    Near32,
}

impl Width {
    const fn disp_bytes(self) -> u8 {
        match self {
            Width::Short | Width::Short16 => 1,
            Width::Near16 => 2,
            Width::Near32 => 4,
        }
    }
}

/// Current choice for one relaxable branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RelaxState {
    /// Branch shape.
    pub kind: RelaxKind,
    /// Displacement width.
    pub width: Width,
}

#[derive(Debug, Clone, Copy)]
struct RelaxEntry {
    forward: i64,
    backward: i64,
    size: u8,
    next: Option<Width>,
}

const fn relax_row(near16: u8, near32: u8) -> [RelaxEntry; 4] {
    [
        RelaxEntry {
            forward: 127,
            backward: -128,
            size: 2,
            next: Some(Width::Near32),
        },
        RelaxEntry {
            forward: 127,
            backward: -128,
            size: 2,
            next: Some(Width::Near16),
        },
        RelaxEntry {
            forward: 0xFFFF,
            backward: -0xFFFF,
            size: near16,
            next: None,
        },
        RelaxEntry {
            forward: i32::MAX as i64,
            backward: i32::MIN as i64,
            size: near32,
            next: None,
        },
    ]
}

/// Reach, size and successor per `[RelaxKind][Width]`. Sizes exclude any
/// legacy prefixes in front of the branch.
static RELAX_TABLE: [[RelaxEntry; 4]; 3] = [relax_row(3, 5), relax_row(4, 6), relax_row(5, 7)];

impl RelaxState {
    /// The smallest state of `kind` in `mode`.
    #[must_use]
    pub fn initial(kind: RelaxKind, mode: CodeMode) -> Self {
        let width = if mode == CodeMode::Code16 {
            Width::Short16
        } else {
            Width::Short
        };
        Self { kind, width }
    }

    fn entry(self) -> &'static RelaxEntry {
        &RELAX_TABLE[self.kind as usize][self.width as usize]
    }

    /// Encoded size without prefixes.
    #[must_use]
    pub fn size(self) -> u8 {
        self.entry().size
    }

    /// Whether a displacement measured from the end of the branch fits.
    #[must_use]
    pub fn reaches(self, disp: i64) -> bool {
        let e = self.entry();
        (e.backward..=e.forward).contains(&disp)
    }

    /// The state to grow into when out of reach.
    #[must_use]
    pub fn next(self) -> Option<RelaxState> {
        self.entry().next.map(|width| RelaxState { kind: self.kind, width })
    }

    /// The last state along `next`.
    #[must_use]
    pub fn widest(self) -> RelaxState {
        let mut s = self;
        while let Some(n) = s.next() {
            s = n;
        }
        s
    }

    fn emit(self, condition: u8, disp: i64, out: &mut Vec<u8>) {
        let cc = condition & 0x0F;
        match (self.kind, self.width) {
            (RelaxKind::UncondJump, Width::Short | Width::Short16) => out.push(0xEB),
            (RelaxKind::UncondJump, _) => out.push(0xE9),
            (_, Width::Short | Width::Short16) => out.push(0x70 | cc),
            (RelaxKind::CondJump, _) => out.extend_from_slice(&[0x0F, 0x80 | cc]),
            (RelaxKind::CondJump8086, w) => {
                out.extend_from_slice(&[0x70 | (cc ^ 1), w.disp_bytes() + 1, 0xE9]);
            }
        }
        let n = usize::from(self.width.disp_bytes());
        out.extend_from_slice(&disp.to_le_bytes()[..n]);
    }
}

// ─── NOP fill ──────────────────────────────────────────────

/// Which NOP sequences fill padding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NopFill {
    /// `0f 1f` long NOPs, up to 11 bytes.
    Long,
    /// `lea`-based NOPs for 32-bit CPUs without long NOPs, up to 7 bytes.
    Lea32,
    /// 16-bit code, up to 4 bytes.
    Code16,
}

static LONG_NOPS: [&[u8]; 12] = [
    &[],
    &[0x90],
    &[0x66, 0x90],
    &[0x0F, 0x1F, 0x00],
    &[0x0F, 0x1F, 0x40, 0x00],
    &[0x0F, 0x1F, 0x44, 0x00, 0x00],
    &[0x66, 0x0F, 0x1F, 0x44, 0x00, 0x00],
    &[0x0F, 0x1F, 0x80, 0x00, 0x00, 0x00, 0x00],
    &[0x0F, 0x1F, 0x84, 0x00, 0x00, 0x00, 0x00, 0x00],
    &[0x66, 0x0F, 0x1F, 0x84, 0x00, 0x00, 0x00, 0x00, 0x00],
    &[0x66, 0x2E, 0x0F, 0x1F, 0x84, 0x00, 0x00, 0x00, 0x00, 0x00],
    &[0x66, 0x66, 0x2E, 0x0F, 0x1F, 0x84, 0x00, 0x00, 0x00, 0x00, 0x00],
];

static LEA_NOPS: [&[u8]; 8] = [
    &[],
    &[0x90],
    &[0x66, 0x90],
    &[0x8D, 0x76, 0x00],                         // lea 0(%esi),%esi
    &[0x8D, 0x74, 0x26, 0x00],                   // lea 0(%esi,%eiz,1),%esi
    &[0x90, 0x8D, 0x74, 0x26, 0x00],
    &[0x8D, 0xB6, 0x00, 0x00, 0x00, 0x00],       // lea 0L(%esi),%esi
    &[0x8D, 0xB4, 0x26, 0x00, 0x00, 0x00, 0x00], // lea 0L(%esi,%eiz,1),%esi
];

static NOPS_16: [&[u8]; 5] = [
    &[],
    &[0x90],
    &[0x89, 0xF6],             // mov %si,%si
    &[0x8D, 0x74, 0x00],       // lea 0(%si),%si
    &[0x8D, 0xB4, 0x00, 0x00], // lea 0w(%si),%si
];

impl NopFill {
    /// The table for a code mode and CPU.
    #[must_use]
    pub fn for_mode(mode: CodeMode, cpu: CpuFeatures) -> Self {
        match mode {
            CodeMode::Code16 => NopFill::Code16,
            CodeMode::Code64 => NopFill::Long,
            CodeMode::Code32 if cpu.contains(CpuFeatures::NOPL) => NopFill::Long,
            CodeMode::Code32 => NopFill::Lea32,
        }
    }

    fn table(self) -> &'static [&'static [u8]] {
        match self {
            NopFill::Long => &LONG_NOPS,
            NopFill::Lea32 => &LEA_NOPS,
            NopFill::Code16 => &NOPS_16,
        }
    }

    /// Append exactly `n` bytes of NOPs, widest sequences first.
    pub fn emit(self, out: &mut Vec<u8>, mut n: usize) {
        let table = self.table();
        let widest = table.len() - 1;
        while n > 0 {
            let chunk = n.min(widest);
            out.extend_from_slice(table[chunk]);
            n -= chunk;
        }
    }
}

/// Bytes of padding that keep an instruction of `size` bytes starting at
/// `start` from crossing or ending on a `boundary`.
#[must_use]
pub fn padding_needed(start: u64, size: u64, boundary: u64) -> u64 {
    if boundary <= 1 {
        return 0;
    }
    let offset = start & (boundary - 1);
    if offset + size >= boundary {
        boundary - offset
    } else {
        0
    }
}

// ─── Fragments ─────────────────────────────────────────────

#[derive(Debug, Clone)]
struct BranchFrag {
    prefix: InstrBytes,
    site: BranchSite,
    state: RelaxState,
}

impl BranchFrag {
    fn size(&self) -> u64 {
        (self.prefix.len() + usize::from(self.state.size())) as u64
    }
}

#[derive(Debug, Clone)]
struct Pad {
    boundary: u64,
    /// `BranchPrefix` fragments that absorb this pad's padding first.
    slots: Vec<usize>,
    fill: u64,
    inert: bool,
    nops: NopFill,
}

#[derive(Debug, Clone)]
struct PrefixSlot {
    byte: u8,
    max: u64,
    fill: u64,
}

#[derive(Debug, Clone)]
struct AlignFrag {
    alignment: u64,
    fill: Option<u8>,
    max_skip: Option<u64>,
    nops: NopFill,
}

impl AlignFrag {
    fn padding_at(&self, current: u64) -> u64 {
        if self.alignment <= 1 {
            return 0;
        }
        let padding = (self.alignment - current % self.alignment) % self.alignment;
        if self.max_skip.is_some_and(|m| padding > m) {
            0
        } else {
            padding
        }
    }
}

#[derive(Debug, Clone)]
enum Fragment {
    Fixed {
        bytes: FragmentBytes,
        fixups: Vec<Fixup>,
    },
    Branch(BranchFrag),
    /// Covers the one instruction fragment after it.
    BranchPadding(Pad),
    /// Covers a fused compare and the jcc after it.
    FusedJccPadding(Pad),
    BranchPrefix(PrefixSlot),
    Align(AlignFrag),
}

impl Fragment {
    fn size_at(&self, offset: u64) -> u64 {
        match self {
            Fragment::Fixed { bytes, .. } => bytes.len() as u64,
            Fragment::Branch(b) => b.size(),
            Fragment::BranchPadding(p) | Fragment::FusedJccPadding(p) => p.fill,
            Fragment::BranchPrefix(s) => s.fill,
            Fragment::Align(a) => a.padding_at(offset),
        }
    }
}

#[derive(Debug, Clone)]
struct LabelDef {
    fragment_index: usize,
    span: Span,
}

// ─── Output ────────────────────────────────────────────────

/// A symbolic field in the output.
///
/// A pc-relative value is `symbol + addend - address of the field`; an
/// absolute one is `symbol + addend`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Relocation {
    /// Offset of the field in the output bytes.
    pub offset: usize,
    /// Field width in bytes.
    pub size: u8,
    /// The CPU sign-extends the field.
    pub signed: bool,
    /// Relative to the field's address.
    pub pc_relative: bool,
    /// Target symbol.
    pub symbol: String,
    /// Constant added to the symbol.
    pub addend: i64,
    /// The field was patched from a label or external definition.
    pub resolved: bool,
}

/// Final image of a [`Layout`].
#[derive(Debug, Clone, Default)]
pub struct LayoutOutput {
    /// Machine code.
    pub bytes: Vec<u8>,
    /// Named labels and their addresses, sorted by name.
    pub labels: Vec<(String, u64)>,
    /// Every symbolic field, resolved or not.
    pub relocations: Vec<Relocation>,
}

// ─── Layout ────────────────────────────────────────────────

/// Ordered fragment chain plus the symbols it defines.
///
/// # Examples
///
/// ```rust
/// use asm_x86::relax::Layout;
/// use asm_x86::{CodeMode, CpuFeatures, Span};
///
/// let mut layout = Layout::new(CodeMode::Code64, CpuFeatures::default());
/// layout.add_label("start", Span::dummy()).unwrap();
/// layout.add_bytes(vec![0x90], Vec::new(), Span::dummy());
/// let out = layout.finish().unwrap();
/// assert_eq!(out.bytes, vec![0x90]);
/// assert_eq!(out.labels, vec![("start".to_string(), 0)]);
/// ```
#[derive(Debug, Clone)]
pub struct Layout {
    fragments: Vec<Fragment>,
    labels: BTreeMap<String, LabelDef>,
    externals: BTreeMap<String, u64>,
    base_address: u64,
    mode: CodeMode,
    cpu: CpuFeatures,
    /// Prefix slots since the last label, branch or directive.
    run: Vec<usize>,
    min_size: u64,
}

impl Layout {
    /// An empty chain at base address 0.
    #[must_use]
    pub fn new(mode: CodeMode, cpu: CpuFeatures) -> Self {
        Self {
            fragments: Vec::new(),
            labels: BTreeMap::new(),
            externals: BTreeMap::new(),
            base_address: 0,
            mode,
            cpu,
            run: Vec::new(),
            min_size: 0,
        }
    }

    /// Code mode for branches and fill added from now on.
    pub fn set_mode(&mut self, mode: CodeMode) {
        self.mode = mode;
    }

    /// CPU whose NOPs and branch forms are used from now on.
    pub fn set_cpu(&mut self, cpu: CpuFeatures) {
        self.cpu = cpu;
    }

    /// Address of the first byte.
    pub fn set_base_address(&mut self, addr: u64) {
        self.base_address = addr;
    }

    /// Address of the first byte.
    #[must_use]
    pub fn base_address(&self) -> u64 {
        self.base_address
    }

    /// Number of fragments so far.
    #[must_use]
    pub fn fragment_count(&self) -> usize {
        self.fragments.len()
    }

    /// Lower bound of the final size: every variable fragment at its
    /// smallest.
    #[must_use]
    pub fn min_size(&self) -> u64 {
        self.min_size
    }

    /// Number of defined labels, numeric ones included.
    #[must_use]
    pub fn label_count(&self) -> usize {
        self.labels.len()
    }

    /// Whether `name` is defined as a label.
    #[must_use]
    pub fn has_label(&self, name: &str) -> bool {
        self.labels.contains_key(name)
    }

    /// A symbol at a fixed address outside the chain.
    pub fn define_external(&mut self, name: &str, addr: u64) {
        self.externals.insert(String::from(name), addr);
    }

    /// Define `name` at the current position. Ends the straight-line run.
    pub fn add_label(&mut self, name: &str, span: Span) -> Result<(), AsmError> {
        if let Some(existing) = self.labels.get(name) {
            return Err(AsmError::DuplicateLabel {
                label: String::from(name),
                span,
                first_span: existing.span,
            });
        }
        self.labels.insert(
            String::from(name),
            LabelDef {
                fragment_index: self.fragments.len(),
                span,
            },
        );
        self.barrier();
        Ok(())
    }

    /// Data bytes with optional symbolic fields.
    pub fn add_bytes(&mut self, bytes: Vec<u8>, fixups: Vec<Fixup>, _span: Span) {
        self.min_size += bytes.len() as u64;
        self.fragments.push(Fragment::Fixed {
            bytes: FragmentBytes::Heap(bytes),
            fixups,
        });
    }

    /// An encoded instruction: a relaxable branch fragment when it carries a
    /// [`BranchSite`], fixed bytes otherwise. Returns the fragment index.
    pub fn add_instruction(&mut self, encoded: Encoded) -> usize {
        let index = self.fragments.len();
        match encoded.branch {
            Some(site) => {
                let kind = match site.condition {
                    None => RelaxKind::UncondJump,
                    Some(_) if self.cpu.contains(CpuFeatures::I386) => RelaxKind::CondJump,
                    Some(_) => RelaxKind::CondJump8086,
                };
                let frag = BranchFrag {
                    prefix: encoded.bytes,
                    site,
                    state: RelaxState::initial(kind, self.mode),
                };
                self.min_size += frag.size();
                self.fragments.push(Fragment::Branch(frag));
                self.barrier();
            }
            None => {
                self.min_size += encoded.bytes.len() as u64;
                self.fragments.push(Fragment::Fixed {
                    bytes: FragmentBytes::Inline(encoded.bytes),
                    fixups: encoded.fixups,
                });
            }
        }
        index
    }

    /// A slot in front of the next instruction (of `insn_len` bytes) that
    /// may take up to `max_prefix_size` copies of `byte`.
    pub fn add_branch_prefix(&mut self, byte: u8, max_prefix_size: u8, insn_len: usize) {
        let room = MAX_INSN_LEN.saturating_sub(insn_len);
        let max = usize::from(max_prefix_size).min(room) as u64;
        if max == 0 {
            return;
        }
        self.run.push(self.fragments.len());
        self.fragments.push(Fragment::BranchPrefix(PrefixSlot { byte, max, fill: 0 }));
    }

    /// Padding in front of the next instruction fragment. Claims the prefix
    /// slots of the current run. Returns the fragment index.
    pub fn add_branch_padding(&mut self, boundary_log2: u8) -> usize {
        let pad = self.new_pad(boundary_log2);
        self.fragments.push(Fragment::BranchPadding(pad));
        self.fragments.len() - 1
    }

    /// Padding in front of a fused compare and the jcc after it. Returns the
    /// fragment index for [`Layout::set_inert`].
    pub fn add_fused_padding(&mut self, boundary_log2: u8) -> usize {
        let pad = self.new_pad(boundary_log2);
        self.fragments.push(Fragment::FusedJccPadding(pad));
        self.fragments.len() - 1
    }

    fn new_pad(&mut self, boundary_log2: u8) -> Pad {
        Pad {
            boundary: 1u64 << boundary_log2.min(63),
            slots: core::mem::take(&mut self.run),
            fill: 0,
            inert: false,
            nops: NopFill::for_mode(self.mode, self.cpu),
        }
    }

    /// Disable a fused padding fragment whose compare got no jcc.
    pub fn set_inert(&mut self, index: usize) {
        if let Some(Fragment::FusedJccPadding(p)) = self.fragments.get_mut(index) {
            p.inert = true;
        }
    }

    /// Align the next fragment to `alignment` bytes (a power of two). `fill`
    /// of `None` pads with NOPs. Ends the straight-line run.
    pub fn add_alignment(&mut self, alignment: u64, fill: Option<u8>, max_skip: Option<u64>) {
        self.fragments.push(Fragment::Align(AlignFrag {
            alignment,
            fill,
            max_skip,
            nops: NopFill::for_mode(self.mode, self.cpu),
        }));
        self.barrier();
    }

    /// End the straight-line run: later padding cannot use earlier slots.
    pub fn barrier(&mut self) {
        self.run.clear();
    }

    /// Current state of every relaxable branch, in order.
    #[must_use]
    pub fn branch_states(&self) -> Vec<RelaxState> {
        self.fragments
            .iter()
            .filter_map(|f| match f {
                Fragment::Branch(b) => Some(b.state),
                _ => None,
            })
            .collect()
    }

    // ── relaxation ─────────────────────────────────────────

    /// Grow branches and recompute padding until nothing changes. Returns
    /// the number of passes; an already converged chain takes one.
    pub fn relax(&mut self) -> Result<usize, AsmError> {
        let mut offsets = Vec::with_capacity(self.fragments.len() + 1);
        self.relax_into(&mut offsets)
    }

    fn relax_into(&mut self, offsets: &mut Vec<u64>) -> Result<usize, AsmError> {
        self.widen_unreachable_targets();
        for pass in 1..=MAX_RELAXATION_PASSES {
            self.compute_offsets_into(offsets);
            let grown = self.grow_branches(offsets);
            let padded = self.update_padding(offsets);
            debug!(
                "relaxation pass {}: {} branch(es) grown, {} padding fragment(s) changed",
                pass, grown, padded
            );
            if grown == 0 && padded == 0 {
                return Ok(pass);
            }
        }
        Err(AsmError::RelaxationLimit {
            max: MAX_RELAXATION_PASSES,
        })
    }

    /// Branches to externals or to symbols defined nowhere start at their
    /// widest state.
    fn widen_unreachable_targets(&mut self) {
        let labels = &self.labels;
        for frag in &mut self.fragments {
            if let Fragment::Branch(b) = frag {
                let local = match &b.site.target {
                    Value::Constant(_) => true,
                    Value::Symbol { name, .. } => labels.contains_key(name),
                };
                if !local && !b.site.short_only {
                    b.state = b.state.widest();
                }
            }
        }
    }

    fn grow_branches(&mut self, offsets: &[u64]) -> usize {
        let mut grown = 0;
        for i in 0..self.fragments.len() {
            let next = match &self.fragments[i] {
                Fragment::Branch(b) if !b.site.short_only => {
                    let Some(target) = self.resolve(&b.site.target, offsets) else {
                        continue;
                    };
                    let end = offsets[i].wrapping_add(b.size()) as i64;
                    let disp = target.wrapping_sub(end);
                    if b.state.reaches(disp) {
                        continue;
                    }
                    b.state.next()
                }
                _ => continue,
            };
            if let (Some(next), Fragment::Branch(b)) = (next, &mut self.fragments[i]) {
                b.state = next;
                grown += 1;
            }
        }
        grown
    }

    fn update_padding(&mut self, offsets: &[u64]) -> usize {
        let mut changed = 0;
        for i in 0..self.fragments.len() {
            let (covers, pad) = match &self.fragments[i] {
                Fragment::BranchPadding(p) => (1, p),
                Fragment::FusedJccPadding(p) => (2, p),
                _ => continue,
            };
            if pad.inert {
                continue;
            }
            let absorbed: u64 = pad.slots.iter().map(|&s| self.fragments[s].size_at(0)).sum();
            let start = offsets[i].wrapping_sub(absorbed);
            let end = (i + 1 + covers).min(self.fragments.len());
            let size: u64 = (i + 1..end).map(|j| self.fragments[j].size_at(offsets[j])).sum();
            let mut remaining = padding_needed(start, size, pad.boundary);

            let mut fills = Vec::with_capacity(pad.slots.len());
            for &s in &pad.slots {
                let cap = match &self.fragments[s] {
                    Fragment::BranchPrefix(slot) => slot.max,
                    _ => 0,
                };
                let take = remaining.min(cap);
                fills.push((s, take));
                remaining -= take;
            }
            for (s, take) in fills {
                if let Fragment::BranchPrefix(slot) = &mut self.fragments[s] {
                    if slot.fill != take {
                        slot.fill = take;
                        changed += 1;
                    }
                }
            }
            if let Fragment::BranchPadding(p) | Fragment::FusedJccPadding(p) = &mut self.fragments[i] {
                if p.fill != remaining {
                    p.fill = remaining;
                    changed += 1;
                }
            }
        }
        changed
    }

    /// `offsets[i]` is the address of fragment `i`; the extra last entry is
    /// the end address.
    fn compute_offsets_into(&self, offsets: &mut Vec<u64>) {
        offsets.clear();
        let mut current = self.base_address;
        for frag in &self.fragments {
            offsets.push(current);
            current = current.wrapping_add(frag.size_at(current));
        }
        offsets.push(current);
    }

    fn resolve(&self, value: &Value, offsets: &[u64]) -> Option<i64> {
        match value {
            Value::Constant(c) => Some(*c),
            Value::Symbol { name, addend } => {
                let addr = match self.labels.get(name.as_str()) {
                    Some(def) => offsets[def.fragment_index],
                    None => *self.externals.get(name.as_str())?,
                };
                Some((addr as i64).wrapping_add(*addend))
            }
        }
    }

    // ── final emit ─────────────────────────────────────────

    /// Relax, then produce the bytes, the label table and the relocation
    /// records. Every fixup error is reported, not just the first.
    pub fn finish(self) -> Result<LayoutOutput, AsmError> {
        self.finish_within(usize::MAX)
    }

    /// Like [`Layout::finish`], but fails with `ResourceLimitExceeded`
    /// before any output is allocated if the relaxed code would be longer
    /// than `max_bytes`.
    pub fn finish_within(mut self, max_bytes: usize) -> Result<LayoutOutput, AsmError> {
        let mut offsets = Vec::with_capacity(self.fragments.len() + 1);
        self.relax_into(&mut offsets)?;

        let end = offsets.last().copied().unwrap_or(self.base_address);
        let len = end.wrapping_sub(self.base_address);
        if usize::try_from(len).map_or(true, |len| len > max_bytes) {
            return Err(AsmError::ResourceLimitExceeded {
                resource: String::from("output bytes"),
                limit: max_bytes,
            });
        }
        let mut out = Vec::with_capacity(len as usize);
        let mut relocations = Vec::new();
        let mut errors = Vec::new();

        for (i, frag) in self.fragments.iter().enumerate() {
            let start = offsets[i];
            match frag {
                Fragment::Fixed { bytes, fixups } => {
                    let base = out.len();
                    out.extend_from_slice(bytes);
                    for f in fixups {
                        let field = &mut out[base + f.offset..base + f.offset + usize::from(f.size)];
                        if let Err(e) = self.apply_fixup(field, f, start, base, &offsets, &mut relocations) {
                            errors.push(e);
                        }
                    }
                }
                Fragment::Branch(b) => {
                    if let Err(e) = self.emit_branch(b, start, &offsets, &mut out, &mut relocations) {
                        errors.push(e);
                    }
                }
                Fragment::BranchPadding(p) | Fragment::FusedJccPadding(p) => p.nops.emit(&mut out, p.fill as usize),
                Fragment::BranchPrefix(s) => out.extend(core::iter::repeat(s.byte).take(s.fill as usize)),
                Fragment::Align(a) => {
                    let n = a.padding_at(start) as usize;
                    match a.fill {
                        Some(byte) => out.extend(core::iter::repeat(byte).take(n)),
                        None => a.nops.emit(&mut out, n),
                    }
                }
            }
        }

        match errors.len() {
            0 => {}
            1 => return Err(errors.remove(0)),
            _ => return Err(AsmError::Multiple { errors }),
        }

        let labels = self
            .labels
            .iter()
            .filter(|(name, _)| !is_local(name))
            .map(|(name, def)| (name.clone(), offsets[def.fragment_index]))
            .collect();
        Ok(LayoutOutput {
            bytes: out,
            labels,
            relocations,
        })
    }

    fn apply_fixup(
        &self,
        field: &mut [u8],
        f: &Fixup,
        insn_start: u64,
        out_base: usize,
        offsets: &[u64],
        relocations: &mut Vec<Relocation>,
    ) -> Result<(), AsmError> {
        let resolved = self.resolve(&f.target, offsets);
        if let Value::Symbol { name, addend } = &f.target {
            if resolved.is_none() && (f.branch || is_local(name)) {
                return Err(AsmError::UndefinedLabel {
                    label: display_label(name),
                    span: f.span,
                });
            }
            relocations.push(Relocation {
                offset: out_base + f.offset,
                size: f.size,
                signed: f.signed,
                pc_relative: f.pc_relative,
                symbol: name.clone(),
                addend: if f.pc_relative {
                    addend.wrapping_sub(i64::from(f.to_end))
                } else {
                    *addend
                },
                resolved: resolved.is_some(),
            });
        }
        let Some(target) = resolved else {
            return Ok(());
        };
        let value = if f.pc_relative {
            let end = insn_start.wrapping_add((f.offset + usize::from(f.to_end)) as u64);
            target.wrapping_sub(end as i64)
        } else {
            target
        };
        if !fits(value, f.size, f.signed) {
            let bits = u32::from(f.size) * 8;
            return Err(if f.pc_relative {
                AsmError::BranchOutOfRange {
                    label: target_name(&f.target),
                    disp: value,
                    max: (1i64 << (bits - 1)) - 1,
                    span: f.span,
                }
            } else {
                AsmError::ImmediateOverflow {
                    value: i128::from(value),
                    min: -(1i128 << (bits - 1)),
                    max: if f.signed {
                        (1i128 << (bits - 1)) - 1
                    } else {
                        (1i128 << bits) - 1
                    },
                    span: f.span,
                }
            });
        }
        field.copy_from_slice(&value.to_le_bytes()[..usize::from(f.size)]);
        Ok(())
    }

    /// Writes the branch bytes even on error so later offsets stay valid.
    fn emit_branch(
        &self,
        b: &BranchFrag,
        start: u64,
        offsets: &[u64],
        out: &mut Vec<u8>,
        relocations: &mut Vec<Relocation>,
    ) -> Result<(), AsmError> {
        out.extend_from_slice(&b.prefix);
        let state = b.state;
        let cond = b.site.condition.unwrap_or(0);
        let disp_bytes = state.width.disp_bytes();
        let field = out.len() + usize::from(state.size() - disp_bytes);
        let end = start.wrapping_add(b.size()) as i64;

        let Some(target) = self.resolve(&b.site.target, offsets) else {
            state.emit(cond, 0, out);
            let (name, addend) = match &b.site.target {
                Value::Symbol { name, addend } => (name, *addend),
                Value::Constant(_) => return Err(internal_branch(b.site.span)),
            };
            if b.site.short_only || is_local(name) {
                return Err(AsmError::UndefinedLabel {
                    label: display_label(name),
                    span: b.site.span,
                });
            }
            relocations.push(Relocation {
                offset: field,
                size: disp_bytes,
                signed: true,
                pc_relative: true,
                symbol: name.clone(),
                addend: addend.wrapping_sub(i64::from(disp_bytes)),
                resolved: false,
            });
            return Ok(());
        };

        let disp = target.wrapping_sub(end);
        if !state.reaches(disp) {
            state.emit(cond, 0, out);
            return Err(AsmError::BranchOutOfRange {
                label: target_name(&b.site.target),
                disp,
                max: state.entry().forward,
                span: b.site.span,
            });
        }
        if let Value::Symbol { name, addend } = &b.site.target {
            relocations.push(Relocation {
                offset: field,
                size: disp_bytes,
                signed: true,
                pc_relative: true,
                symbol: name.clone(),
                addend: addend.wrapping_sub(i64::from(disp_bytes)),
                resolved: true,
            });
        }
        state.emit(cond, disp, out);
        Ok(())
    }
}

fn fits(value: i64, size: u8, signed: bool) -> bool {
    if size == 0 || size >= 8 {
        return true;
    }
    let bits = u32::from(size) * 8;
    let min = -(1i64 << (bits - 1));
    let max = if signed {
        (1i64 << (bits - 1)) - 1
    } else {
        (1i64 << bits) - 1
    };
    (min..=max).contains(&value)
}

fn target_name(v: &Value) -> String {
    match v {
        Value::Symbol { name, .. } => display_label(name),
        Value::Constant(c) => format!("{:#x}", c),
    }
}

fn internal_branch(span: Span) -> AsmError {
    AsmError::Internal {
        msg: String::from("constant branch target failed to resolve"),
        span,
    }
}

// ─── Tests ─────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BranchKinds;
    use alloc::vec;

    fn span() -> Span {
        Span::new(1, 1, 0, 0)
    }

    fn layout() -> Layout {
        Layout::new(CodeMode::Code64, CpuFeatures::default())
    }

    fn insn(bytes: &[u8]) -> Encoded {
        Encoded {
            bytes: InstrBytes::from_slice(bytes),
            fixups: Vec::new(),
            branch: None,
            prefix_len: 0,
            flow: None,
            padding_prefix: Some(0x2E),
        }
    }

    fn call(target: &str) -> Encoded {
        let mut e = insn(&[0xE8, 0, 0, 0, 0]);
        e.fixups.push(Fixup {
            offset: 1,
            size: 4,
            signed: true,
            pc_relative: true,
            to_end: 4,
            target: Value::symbol(target),
            branch: false,
            span: span(),
        });
        e.flow = Some(BranchKinds::CALL);
        e
    }

    fn branch(condition: Option<u8>, target: Value, short_only: bool) -> Encoded {
        Encoded {
            bytes: InstrBytes::new(),
            fixups: Vec::new(),
            branch: Some(BranchSite {
                condition,
                target,
                short_only,
                span: span(),
            }),
            prefix_len: 0,
            flow: Some(if condition.is_some() {
                BranchKinds::JCC
            } else {
                BranchKinds::JMP
            }),
            padding_prefix: None,
        }
    }

    fn jmp(target: &str) -> Encoded {
        branch(None, Value::symbol(target), false)
    }

    fn jcc(cc: u8, target: &str) -> Encoded {
        branch(Some(cc), Value::symbol(target), false)
    }

    fn nops(layout: &mut Layout, n: usize) {
        layout.add_bytes(vec![0x90; n], Vec::new(), span());
    }

    // ── relax table ────────

    #[test]
    fn table_sizes() {
        let size = |kind, width| RelaxState { kind, width }.size();
        assert_eq!(size(RelaxKind::UncondJump, Width::Short), 2);
        assert_eq!(size(RelaxKind::UncondJump, Width::Near16), 3);
        assert_eq!(size(RelaxKind::UncondJump, Width::Near32), 5);
        assert_eq!(size(RelaxKind::CondJump, Width::Near16), 4);
        assert_eq!(size(RelaxKind::CondJump, Width::Near32), 6);
        assert_eq!(size(RelaxKind::CondJump8086, Width::Near16), 5);
        assert_eq!(size(RelaxKind::CondJump8086, Width::Near32), 7);
    }

    #[test]
    fn short_grows_by_mode() {
        let s = RelaxState::initial(RelaxKind::CondJump, CodeMode::Code32);
        assert_eq!(s.next().map(|n| n.width), Some(Width::Near32));
        let s16 = RelaxState::initial(RelaxKind::CondJump, CodeMode::Code16);
        assert_eq!(s16.width, Width::Short16);
        assert_eq!(s16.next().map(|n| n.width), Some(Width::Near16));
        assert_eq!(s16.widest().width, Width::Near16);
        assert!(s16.widest().next().is_none());
    }

    #[test]
    fn padding_formula() {
        assert_eq!(padding_needed(29, 2, 32), 0);
        assert_eq!(padding_needed(30, 2, 32), 2);
        assert_eq!(padding_needed(31, 2, 32), 1);
        assert_eq!(padding_needed(64 + 28, 6, 32), 4);
        assert_eq!(padding_needed(5, 100, 1), 0);
    }

    #[test]
    fn nop_tables_are_exact() {
        for fill in [NopFill::Long, NopFill::Lea32, NopFill::Code16] {
            for (i, seq) in fill.table().iter().enumerate() {
                assert_eq!(seq.len(), i, "{:?} entry {}", fill, i);
            }
            for n in 0..40 {
                let mut out = Vec::new();
                fill.emit(&mut out, n);
                assert_eq!(out.len(), n);
            }
        }
    }

    #[test]
    fn nop_fill_choice() {
        let no_nopl = CpuFeatures::default() - CpuFeatures::NOPL;
        assert_eq!(NopFill::for_mode(CodeMode::Code32, no_nopl), NopFill::Lea32);
        assert_eq!(NopFill::for_mode(CodeMode::Code64, no_nopl), NopFill::Long);
        assert_eq!(NopFill::for_mode(CodeMode::Code16, CpuFeatures::default()), NopFill::Code16);
    }

    // ── labels and fixups ────────

    #[test]
    fn resolve_forward_call() {
        let mut l = layout();
        l.add_instruction(call("target"));
        nops(&mut l, 3);
        l.add_label("target", span()).unwrap();
        nops(&mut l, 1);
        let out = l.finish().unwrap();
        assert_eq!(out.bytes, vec![0xE8, 3, 0, 0, 0, 0x90, 0x90, 0x90, 0x90]);
        assert_eq!(
            out.relocations,
            vec![Relocation {
                offset: 1,
                size: 4,
                signed: true,
                pc_relative: true,
                symbol: "target".into(),
                addend: -4,
                resolved: true,
            }]
        );
    }

    #[test]
    fn undefined_symbol_stays_relocation() {
        let mut l = layout();
        l.add_instruction(call("puts"));
        let out = l.finish().unwrap();
        assert_eq!(out.bytes, vec![0xE8, 0, 0, 0, 0]);
        assert_eq!(out.relocations.len(), 1);
        assert!(!out.relocations[0].resolved);
        assert_eq!(out.relocations[0].addend, -4);
    }

    #[test]
    fn external_resolves_against_base() {
        let mut l = layout();
        l.set_base_address(0x1000);
        l.define_external("ext", 0x2000);
        l.add_instruction(call("ext"));
        let out = l.finish().unwrap();
        let rel = i32::from_le_bytes([out.bytes[1], out.bytes[2], out.bytes[3], out.bytes[4]]);
        assert_eq!(rel, 0x2000 - 0x1005);
        assert!(out.relocations[0].resolved);
    }

    #[test]
    fn absolute_fixup_with_addend() {
        let mut l = layout();
        l.set_base_address(0x400000);
        let mut mov = insn(&[0xB8, 0, 0, 0, 0]);
        mov.fixups.push(Fixup {
            offset: 1,
            size: 4,
            signed: false,
            pc_relative: false,
            to_end: 4,
            target: Value::Symbol {
                name: "data".into(),
                addend: 8,
            },
            branch: false,
            span: span(),
        });
        l.add_instruction(mov);
        l.add_label("data", span()).unwrap();
        let out = l.finish().unwrap();
        assert_eq!(&out.bytes[1..], &0x400005u32.wrapping_add(8).to_le_bytes());
        assert_eq!(out.relocations[0].addend, 8);
    }

    #[test]
    fn byte_branch_must_resolve() {
        let mut l = layout();
        let mut lp = insn(&[0xE2, 0]);
        lp.fixups.push(Fixup {
            offset: 1,
            size: 1,
            signed: true,
            pc_relative: true,
            to_end: 1,
            target: Value::symbol("nowhere"),
            branch: true,
            span: span(),
        });
        l.add_instruction(lp);
        assert!(matches!(l.finish(), Err(AsmError::UndefinedLabel { label, .. }) if label == "nowhere"));
    }

    #[test]
    fn byte_branch_out_of_range() {
        let mut l = layout();
        l.add_label("top", span()).unwrap();
        nops(&mut l, 200);
        let mut lp = insn(&[0xE2, 0]);
        lp.fixups.push(Fixup {
            offset: 1,
            size: 1,
            signed: true,
            pc_relative: true,
            to_end: 1,
            target: Value::symbol("top"),
            branch: true,
            span: span(),
        });
        l.add_instruction(lp);
        assert!(matches!(l.finish(), Err(AsmError::BranchOutOfRange { disp: -202, .. })));
    }

    #[test]
    fn duplicate_label_error() {
        let mut l = layout();
        l.add_label("a", span()).unwrap();
        let err = l.add_label("a", Span::new(2, 1, 0, 0)).unwrap_err();
        assert!(matches!(err, AsmError::DuplicateLabel { first_span, .. } if first_span == span()));
    }

    #[test]
    fn local_labels_are_hidden() {
        let mut l = layout();
        l.add_label(&local_label_name(1, 1), span()).unwrap();
        l.add_label("named", span()).unwrap();
        nops(&mut l, 1);
        let out = l.finish().unwrap();
        assert_eq!(out.labels, vec![("named".to_string(), 0)]);
    }

    #[test]
    fn undefined_local_label_reads_as_forward_reference() {
        let mut l = layout();
        l.add_instruction(jmp(&local_label_name(3, 1)));
        assert!(matches!(l.finish(), Err(AsmError::UndefinedLabel { label, .. }) if label == "3f"));
    }

    #[test]
    fn output_size_is_checked_before_emitting() {
        let mut l = layout();
        nops(&mut l, 1);
        l.add_alignment(1 << 40, None, None);
        assert!(matches!(
            l.finish_within(1 << 20),
            Err(AsmError::ResourceLimitExceeded { limit, .. }) if limit == 1 << 20
        ));

        let mut l = layout();
        nops(&mut l, 4);
        assert!(l.clone().finish_within(3).is_err());
        assert_eq!(l.finish_within(4).unwrap().bytes.len(), 4);
    }

    #[test]
    fn errors_are_collected() {
        let mut l = layout();
        l.add_instruction(branch(None, Value::symbol("a"), true));
        l.add_instruction(branch(None, Value::symbol("b"), true));
        assert!(matches!(l.finish(), Err(AsmError::Multiple { errors }) if errors.len() == 2));
    }

    // ── relaxation ────────

    #[test]
    fn short_jmp_forward_and_backward() {
        let mut l = layout();
        l.add_label("top", span()).unwrap();
        l.add_instruction(jmp("end"));
        nops(&mut l, 1);
        l.add_instruction(jmp("top"));
        l.add_label("end", span()).unwrap();
        let out = l.finish().unwrap();
        assert_eq!(out.bytes, vec![0xEB, 0x03, 0x90, 0xEB, 0xFB]);
    }

    #[test]
    fn relaxation_boundary_127() {
        let mut l = layout();
        l.add_instruction(jmp("target"));
        nops(&mut l, 127);
        l.add_label("target", span()).unwrap();
        let out = l.finish().unwrap();
        assert_eq!(&out.bytes[..2], &[0xEB, 0x7F]);
    }

    #[test]
    fn relaxation_boundary_128() {
        let mut l = layout();
        l.add_instruction(jmp("target"));
        nops(&mut l, 128);
        l.add_label("target", span()).unwrap();
        let out = l.finish().unwrap();
        assert_eq!(&out.bytes[..5], &[0xE9, 0x80, 0, 0, 0]);
    }

    #[test]
    fn backward_reach_is_128() {
        let mut l = layout();
        l.add_label("top", span()).unwrap();
        nops(&mut l, 126);
        l.add_instruction(jmp("top"));
        let out = l.finish().unwrap();
        assert_eq!(&out.bytes[126..], &[0xEB, 0x80]);
    }

    #[test]
    fn jcc_grows_to_near32() {
        let mut l = layout();
        l.add_instruction(jcc(0x5, "far"));
        nops(&mut l, 300);
        l.add_label("far", span()).unwrap();
        let out = l.finish().unwrap();
        assert_eq!(&out.bytes[..6], &[0x0F, 0x85, 0x2C, 0x01, 0, 0]);
    }

    #[test]
    fn cascading_relaxation() {
        let mut l = layout();
        l.add_instruction(jmp("L1"));
        nops(&mut l, 125);
        l.add_instruction(jcc(0x5, "L2"));
        l.add_label("L1", span()).unwrap();
        nops(&mut l, 130);
        l.add_label("L2", span()).unwrap();
        nops(&mut l, 1);
        let out = l.finish().unwrap();
        assert_eq!(out.bytes[0], 0xE9);
        assert_eq!(&out.bytes[5 + 125..5 + 127], &[0x0F, 0x85]);
    }

    #[test]
    fn code16_grows_to_rel16() {
        let mut l = Layout::new(CodeMode::Code16, CpuFeatures::default());
        l.add_instruction(jmp("far"));
        l.add_instruction(jcc(0x4, "far"));
        nops(&mut l, 300);
        l.add_label("far", span()).unwrap();
        let out = l.finish().unwrap();
        assert_eq!(&out.bytes[..3], &[0xE9, 0x30, 0x01]);
        assert_eq!(&out.bytes[3..7], &[0x0F, 0x84, 0x2C, 0x01]);
    }

    #[test]
    fn cond_jump_8086_inverts_over_jmp() {
        let mut l = Layout::new(CodeMode::Code16, CpuFeatures::I8086);
        l.add_instruction(jcc(0x4, "far"));
        nops(&mut l, 300);
        l.add_label("far", span()).unwrap();
        let mut relaxed = l.clone();
        relaxed.relax().unwrap();
        assert_eq!(
            relaxed.branch_states(),
            vec![RelaxState {
                kind: RelaxKind::CondJump8086,
                width: Width::Near16
            }]
        );
        let out = l.finish().unwrap();
        assert_eq!(&out.bytes[..5], &[0x75, 0x03, 0xE9, 0x2C, 0x01]);
    }

    #[test]
    fn external_and_undefined_targets_start_wide() {
        let mut l = layout();
        l.define_external("ext", 0x10);
        l.add_instruction(jmp("ext"));
        l.add_instruction(jcc(0x2, "undefined"));
        let out = l.finish().unwrap();
        assert_eq!(out.bytes.len(), 5 + 6);
        assert_eq!(&out.bytes[..5], &[0xE9, 0x0B, 0, 0, 0]);
        assert_eq!(&out.bytes[5..], &[0x0F, 0x82, 0, 0, 0, 0]);
        assert_eq!(out.relocations.len(), 2);
        assert!(out.relocations[0].resolved);
        assert!(!out.relocations[1].resolved);
        assert_eq!(out.relocations[1].offset, 7);
    }

    #[test]
    fn constant_target_is_absolute() {
        let mut l = layout();
        l.set_base_address(0x100);
        l.add_instruction(branch(None, Value::Constant(0x110), false));
        let out = l.finish().unwrap();
        assert_eq!(out.bytes, vec![0xEB, 0x0E]);
        assert!(out.relocations.is_empty());
    }

    #[test]
    fn short_only_never_grows() {
        let mut l = layout();
        l.add_instruction(branch(None, Value::symbol("far"), true));
        nops(&mut l, 200);
        l.add_label("far", span()).unwrap();
        assert!(matches!(l.finish(), Err(AsmError::BranchOutOfRange { disp: 200, max: 127, .. })));

        let mut l = layout();
        l.add_instruction(branch(Some(0x4), Value::symbol("missing"), true));
        assert!(matches!(l.finish(), Err(AsmError::UndefinedLabel { .. })));
    }

    #[test]
    fn relaxation_is_idempotent_and_monotonic() {
        let mut l = layout();
        l.add_instruction(jmp("L1"));
        nops(&mut l, 125);
        l.add_instruction(jcc(0x5, "L2"));
        l.add_label("L1", span()).unwrap();
        nops(&mut l, 130);
        l.add_label("L2", span()).unwrap();
        let before = l.branch_states();
        l.relax().unwrap();
        let after = l.branch_states();
        for (b, a) in before.iter().zip(&after) {
            assert!(a.width >= b.width);
        }
        assert_eq!(l.relax().unwrap(), 1);
        assert_eq!(l.branch_states(), after);
    }

    // ── alignment ────────

    #[test]
    fn alignment_with_fill_byte() {
        let mut l = layout();
        nops(&mut l, 1);
        l.add_alignment(4, Some(0), None);
        nops(&mut l, 1);
        let out = l.finish().unwrap();
        assert_eq!(out.bytes, vec![0x90, 0, 0, 0, 0x90]);
    }

    #[test]
    fn alignment_uses_long_nops() {
        let mut l = layout();
        nops(&mut l, 1);
        l.add_alignment(16, None, None);
        l.add_label("aligned", span()).unwrap();
        let out = l.finish().unwrap();
        assert_eq!(out.bytes.len(), 16);
        assert_eq!(&out.bytes[1..12], LONG_NOPS[11]);
        assert_eq!(&out.bytes[12..], LONG_NOPS[4]);
        assert_eq!(out.labels, vec![("aligned".to_string(), 16)]);
    }

    #[test]
    fn alignment_in_16_bit_code() {
        let mut l = Layout::new(CodeMode::Code16, CpuFeatures::default());
        nops(&mut l, 1);
        l.add_alignment(8, None, None);
        let out = l.finish().unwrap();
        assert_eq!(&out.bytes[1..], &[0x8D, 0xB4, 0x00, 0x00, 0x8D, 0x74, 0x00]);
    }

    #[test]
    fn alignment_max_skip() {
        let mut l = layout();
        nops(&mut l, 1);
        l.add_alignment(16, Some(0xCC), Some(4));
        nops(&mut l, 1);
        assert_eq!(l.finish().unwrap().bytes, vec![0x90, 0x90]);
    }

    #[test]
    fn alignment_with_base_address() {
        let mut l = layout();
        l.set_base_address(0x1003);
        l.add_alignment(4, Some(0xCC), None);
        l.add_label("here", span()).unwrap();
        let out = l.finish().unwrap();
        assert_eq!(out.bytes, vec![0xCC]);
        assert_eq!(out.labels, vec![("here".to_string(), 0x1004)]);
    }

    // ── boundary padding ────────

    #[test]
    fn branch_padding_moves_jmp_off_boundary() {
        let mut l = layout();
        nops(&mut l, 30);
        l.add_branch_padding(5);
        l.add_instruction(jmp("next"));
        l.add_label("next", span()).unwrap();
        let out = l.finish().unwrap();
        assert_eq!(out.bytes.len(), 34);
        assert_eq!(&out.bytes[30..], &[0x66, 0x90, 0xEB, 0x00]);
    }

    #[test]
    fn branch_padding_not_needed() {
        let mut l = layout();
        nops(&mut l, 20);
        l.add_branch_padding(5);
        l.add_instruction(jmp("next"));
        l.add_label("next", span()).unwrap();
        assert_eq!(l.finish().unwrap().bytes.len(), 22);
    }

    #[test]
    fn prefix_slots_absorb_padding_first() {
        let mut l = layout();
        nops(&mut l, 28);
        l.add_branch_prefix(0x2E, 5, 2);
        l.add_instruction(insn(&[0x89, 0xD8]));
        l.add_branch_padding(5);
        l.add_instruction(jmp("next"));
        l.add_label("next", span()).unwrap();
        let out = l.finish().unwrap();
        assert_eq!(&out.bytes[28..], &[0x2E, 0x2E, 0x89, 0xD8, 0xEB, 0x00]);
    }

    #[test]
    fn prefix_slot_is_capped() {
        let mut l = layout();
        l.define_external("ext", 0);
        nops(&mut l, 26);
        l.add_branch_prefix(0x3E, 2, 2);
        l.add_instruction(insn(&[0x89, 0xD8]));
        l.add_branch_padding(5);
        l.add_instruction(jmp("ext"));
        let out = l.finish().unwrap();
        assert_eq!(&out.bytes[26..30], &[0x3E, 0x3E, 0x89, 0xD8]);
        assert_eq!(&out.bytes[30..32], &[0x66, 0x90]);
        assert_eq!(out.bytes[32], 0xE9);
    }

    #[test]
    fn label_ends_the_run() {
        let mut l = layout();
        nops(&mut l, 28);
        l.add_branch_prefix(0x2E, 5, 2);
        l.add_instruction(insn(&[0x89, 0xD8]));
        l.add_label("mid", span()).unwrap();
        l.add_branch_padding(5);
        l.add_instruction(jmp("next"));
        l.add_label("next", span()).unwrap();
        let out = l.finish().unwrap();
        assert_eq!(&out.bytes[28..], &[0x89, 0xD8, 0x66, 0x90, 0xEB, 0x00]);
    }

    #[test]
    fn prefix_slot_respects_instruction_limit() {
        let mut l = layout();
        l.add_branch_prefix(0x2E, 5, 15);
        assert_eq!(l.fragment_count(), 0);
    }

    #[test]
    fn fused_padding_covers_compare_and_jcc() {
        let mut l = layout();
        nops(&mut l, 27);
        l.add_fused_padding(5);
        l.add_instruction(insn(&[0x48, 0x39, 0xD8]));
        l.add_instruction(jcc(0x5, "next"));
        l.add_label("next", span()).unwrap();
        let out = l.finish().unwrap();
        assert_eq!(&out.bytes[27..32], LONG_NOPS[5]);
        assert_eq!(&out.bytes[32..], &[0x48, 0x39, 0xD8, 0x75, 0x00]);
    }

    #[test]
    fn inert_fused_padding_adds_nothing() {
        let mut l = layout();
        nops(&mut l, 27);
        let pad = l.add_fused_padding(5);
        l.add_instruction(insn(&[0x48, 0x39, 0xD8]));
        l.set_inert(pad);
        l.add_instruction(insn(&[0x90, 0x90]));
        let out = l.finish().unwrap();
        assert_eq!(out.bytes.len(), 32);
    }

    #[test]
    fn padding_grows_branch_past_reach() {
        // The padding shifts the branch; relaxation and padding reach a
        // common fixed point.
        let mut l = layout();
        l.add_label("top", span()).unwrap();
        nops(&mut l, 126);
        l.add_branch_padding(5);
        l.add_instruction(jmp("top"));
        let out = l.finish().unwrap();
        assert_eq!(out.bytes.len(), 128 + 5);
        assert_eq!(out.bytes[128], 0xE9);
    }
}
