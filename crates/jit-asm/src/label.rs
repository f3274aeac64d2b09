//! Label table and deferred patching.
//!
//! Jump and call targets are not generally known at emission time.  Each
//! reference records a pending [`PatchSite`] over its placeholder bytes;
//! binding a label pins it to the buffer's current offset; a single
//! finalize pass backfills every site once all offsets are known.

use alloc::collections::BTreeMap;
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

use crate::buffer::CodeBuffer;
use crate::error::EmitError;

/// Handle to a label within one assembler session.
///
/// Obtained from [`crate::Assembler::label`] (named, interned per session)
/// or [`crate::Assembler::fresh_label`] (anonymous).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LabelId(pub(crate) usize);

/// How a pending site is patched once its label resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PatchKind {
    /// Signed displacement relative to the end of the patch window:
    /// `resolved - (site + size) + addend`.
    Relative,
    /// The label's absolute address (`base_address + resolved`) written
    /// verbatim, no displacement arithmetic.
    Absolute,
}

/// A placeholder window awaiting a resolved label.
#[derive(Debug, Clone, Copy)]
struct PatchSite {
    /// Buffer offset of the placeholder window.
    offset: usize,
    /// Window width in bytes: 1, 4, or 8.
    size: u8,
    /// Constant added to relative displacements.
    addend: i64,
    kind: PatchKind,
}

/// An applied patch in the final output — where a label reference was
/// written.  Useful for tooling and debugging.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AppliedPatch {
    /// Offset in the output byte stream where the value was written.
    pub offset: usize,
    /// Size of the patched window in bytes.
    pub size: u8,
    /// Target label name (anonymous labels print as `.L<n>`).
    pub label: String,
    /// How the value was computed.
    pub kind: PatchKind,
}

#[derive(Debug, Default)]
struct LabelEntry {
    name: Option<String>,
    resolved: Option<usize>,
    sites: Vec<PatchSite>,
}

/// Per-session label table: interning, bind-once state, pending sites, and
/// the finalize patch pass.
#[derive(Debug, Default)]
pub(crate) struct LabelTable {
    entries: Vec<LabelEntry>,
    by_name: BTreeMap<String, LabelId>,
}

impl LabelTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Look up or create the label with the given name.
    pub(crate) fn intern(&mut self, name: &str) -> LabelId {
        if let Some(&id) = self.by_name.get(name) {
            return id;
        }
        let id = LabelId(self.entries.len());
        self.entries.push(LabelEntry {
            name: Some(String::from(name)),
            ..LabelEntry::default()
        });
        self.by_name.insert(String::from(name), id);
        id
    }

    /// Create a fresh anonymous label.
    pub(crate) fn fresh(&mut self) -> LabelId {
        let id = LabelId(self.entries.len());
        self.entries.push(LabelEntry::default());
        id
    }

    /// The label's name, or a synthetic `.L<n>` for anonymous labels.
    pub(crate) fn name_of(&self, id: LabelId) -> String {
        match &self.entries[id.0].name {
            Some(name) => name.clone(),
            None => format!(".L{}", id.0),
        }
    }

    /// Bind the label to `offset`.  A label binds at most once.
    pub(crate) fn bind(&mut self, id: LabelId, offset: usize) -> Result<(), EmitError> {
        if self.entries[id.0].resolved.is_some() {
            return Err(EmitError::LabelRedefined {
                label: self.name_of(id),
            });
        }
        self.entries[id.0].resolved = Some(offset);
        Ok(())
    }

    pub(crate) fn resolved(&self, id: LabelId) -> Option<usize> {
        self.entries[id.0].resolved
    }

    /// Record a pending site over the `size` bytes starting at `offset`.
    pub(crate) fn use_at(
        &mut self,
        id: LabelId,
        offset: usize,
        size: u8,
        addend: i64,
        kind: PatchKind,
    ) {
        debug_assert!(matches!(size, 1 | 4 | 8));
        self.entries[id.0].sites.push(PatchSite {
            offset,
            size,
            addend,
            kind,
        });
    }

    /// Resolved named labels as `(name, base_address + offset)` pairs.
    pub(crate) fn resolved_names(&self, base_address: u64) -> Vec<(String, u64)> {
        self.entries
            .iter()
            .filter_map(|entry| match (&entry.name, entry.resolved) {
                (Some(name), Some(offset)) => Some((name.clone(), base_address + offset as u64)),
                _ => None,
            })
            .collect()
    }

    /// Backfill every pending site.  Labels that were referenced but never
    /// bound abort the pass; a label with no references may stay unbound.
    pub(crate) fn finalize(
        &self,
        buf: &mut CodeBuffer,
        base_address: u64,
    ) -> Result<Vec<AppliedPatch>, EmitError> {
        let mut applied = Vec::new();
        for (index, entry) in self.entries.iter().enumerate() {
            if entry.sites.is_empty() {
                continue;
            }
            let id = LabelId(index);
            let Some(resolved) = entry.resolved else {
                return Err(EmitError::UnresolvedLabel {
                    label: self.name_of(id),
                });
            };
            for site in &entry.sites {
                match site.kind {
                    PatchKind::Absolute => {
                        let addr = base_address
                            .wrapping_add(resolved as u64)
                            .wrapping_add(site.addend as u64);
                        debug_assert_eq!(site.size, 8, "absolute sites are 8 bytes wide");
                        buf.patch(site.offset, &addr.to_le_bytes());
                    }
                    PatchKind::Relative => {
                        let disp =
                            resolved as i64 - (site.offset as i64 + i64::from(site.size))
                                + site.addend;
                        match site.size {
                            1 => {
                                let Ok(disp8) = i8::try_from(disp) else {
                                    return Err(EmitError::BranchOutOfRange {
                                        label: self.name_of(id),
                                        disp,
                                        max: i64::from(i8::MAX),
                                    });
                                };
                                buf.patch(site.offset, &disp8.to_le_bytes());
                            }
                            4 => {
                                let Ok(disp32) = i32::try_from(disp) else {
                                    return Err(EmitError::BranchOutOfRange {
                                        label: self.name_of(id),
                                        disp,
                                        max: i64::from(i32::MAX),
                                    });
                                };
                                buf.patch(site.offset, &disp32.to_le_bytes());
                            }
                            _ => unreachable!("relative sites are 1 or 4 bytes wide"),
                        }
                    }
                }
                applied.push(AppliedPatch {
                    offset: site.offset,
                    size: site.size,
                    label: self.name_of(id),
                    kind: site.kind,
                });
            }
        }
        Ok(applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buf_of_zeros(len: usize) -> CodeBuffer {
        let mut buf = CodeBuffer::new();
        for _ in 0..len {
            buf.push(0);
        }
        buf
    }

    #[test]
    fn interning_is_per_name() {
        let mut labels = LabelTable::new();
        let a = labels.intern("loop");
        let b = labels.intern("loop");
        let c = labels.intern("done");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn fresh_labels_are_distinct() {
        let mut labels = LabelTable::new();
        assert_ne!(labels.fresh(), labels.fresh());
    }

    #[test]
    fn backward_relative_patch() {
        let mut labels = LabelTable::new();
        let mut buf = buf_of_zeros(10);
        let target = labels.intern("top");
        labels.bind(target, 2).unwrap();
        // Placeholder byte at offset 9: disp = 2 - (9 + 1) = -8.
        labels.use_at(target, 9, 1, 0, PatchKind::Relative);
        labels.finalize(&mut buf, 0).unwrap();
        assert_eq!(buf.as_slice()[9] as i8, -8);
    }

    #[test]
    fn forward_relative_patch_four_bytes() {
        let mut labels = LabelTable::new();
        let mut buf = buf_of_zeros(20);
        let target = labels.fresh();
        labels.use_at(target, 4, 4, 0, PatchKind::Relative);
        labels.bind(target, 20).unwrap();
        let applied = labels.finalize(&mut buf, 0).unwrap();
        // disp = 20 - (4 + 4) = 12
        assert_eq!(&buf.as_slice()[4..8], &12i32.to_le_bytes());
        assert_eq!(applied.len(), 1);
        assert_eq!(applied[0].kind, PatchKind::Relative);
    }

    #[test]
    fn absolute_patch_adds_base_address() {
        let mut labels = LabelTable::new();
        let mut buf = buf_of_zeros(12);
        let target = labels.intern("fn");
        labels.use_at(target, 2, 8, 0, PatchKind::Absolute);
        labels.bind(target, 11).unwrap();
        labels.finalize(&mut buf, 0x1000).unwrap();
        assert_eq!(&buf.as_slice()[2..10], &0x100Bu64.to_le_bytes());
    }

    #[test]
    fn unresolved_referenced_label_fails() {
        let mut labels = LabelTable::new();
        let mut buf = buf_of_zeros(5);
        let target = labels.intern("missing");
        labels.use_at(target, 0, 4, 0, PatchKind::Relative);
        let err = labels.finalize(&mut buf, 0).unwrap_err();
        assert_eq!(
            err,
            EmitError::UnresolvedLabel {
                label: String::from("missing")
            }
        );
    }

    #[test]
    fn unreferenced_unbound_label_is_fine() {
        let mut labels = LabelTable::new();
        let mut buf = buf_of_zeros(1);
        let _ = labels.intern("never_used");
        assert!(labels.finalize(&mut buf, 0).unwrap().is_empty());
    }

    #[test]
    fn double_bind_fails() {
        let mut labels = LabelTable::new();
        let target = labels.intern("once");
        labels.bind(target, 0).unwrap();
        assert_eq!(
            labels.bind(target, 4).unwrap_err(),
            EmitError::LabelRedefined {
                label: String::from("once")
            }
        );
    }

    #[test]
    fn short_branch_out_of_range_fails() {
        let mut labels = LabelTable::new();
        let mut buf = buf_of_zeros(300);
        let target = labels.fresh();
        labels.use_at(target, 0, 1, 0, PatchKind::Relative);
        labels.bind(target, 300).unwrap();
        let err = labels.finalize(&mut buf, 0).unwrap_err();
        assert!(matches!(err, EmitError::BranchOutOfRange { disp: 299, .. }));
    }
}
