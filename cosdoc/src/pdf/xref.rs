use fnv::FnvHashMap;

use super::{Dictionary, Reference};

/// References to objects inside a PDF section.
///
/// References in this table mark object indices either as used or unused.
/// Unused object indices may be reused for new objects. Used objects are
/// divided into two groups compressed and uncompressed objects. Uncompressed
/// objects can be imidiately accessed at the given byte offset while compressed
/// objects are contained inside a stream object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Xref(Vec<XrefEntry>);

impl Xref {
    pub fn entries(&self) -> impl Iterator<Item = &XrefEntry> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn free_objects(&self) -> impl Iterator<Item = &FreeObject> {
        self.0
            .iter()
            .filter_map(|entry| if let XrefEntry::Free(u) = entry { Some(u) } else { None })
    }
}

impl From<Vec<XrefEntry>> for Xref {
    fn from(v: Vec<XrefEntry>) -> Self {
        Xref(v)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreeObject {
    /// Number of this object
    pub number: u32,
    /// Generation to use when the number is reused
    pub generation: u16,
    /// Next free object number
    pub next_free: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsedObject {
    /// Number of this object
    pub number: u32,
    /// The position of this object in the pdf file in bytes, starting from the
    /// beginning of the PDF.
    pub byte_offset: usize,
    pub generation: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsedCompressedObject {
    /// Number of this object
    pub number: u32,
    /// The number of the stream object that contains this object
    pub containing_object: u32,
    /// Position of this object inside the containing stream
    pub index: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unsupported {
    /// Number of this object
    pub number: u32,
    pub type_num: u64,
    pub w1: u64,
    pub w2: u64,
}

/// Denotes a free object reference in a xref stream.
pub const XREF_FREE: u64 = 0;
/// Denotes a used object reference in a xref stream.
pub const XREF_USED: u64 = 1;
/// Denotes a used and compressed object reference in a xref stream.
pub const XREF_COMPRESSED: u64 = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XrefEntry {
    Free(FreeObject),
    Used(UsedObject),
    /// Object is stored in compressed stream
    UsedCompressed(UsedCompressedObject),

    /// Unsupported xref entry. Point to null object.
    Unsupported(Unsupported),
}

impl XrefEntry {
    pub fn type_num(&self) -> u64 {
        match self {
            XrefEntry::Free(_) => XREF_FREE,
            XrefEntry::Used(_) => XREF_USED,
            XrefEntry::UsedCompressed(_) => XREF_COMPRESSED,
            XrefEntry::Unsupported(Unsupported { type_num, .. }) => *type_num,
        }
    }

    pub fn number(&self) -> u32 {
        match self {
            XrefEntry::Free(FreeObject { number, .. }) => *number,
            XrefEntry::Used(UsedObject { number, .. }) => *number,
            XrefEntry::UsedCompressed(UsedCompressedObject { number, .. }) => *number,
            XrefEntry::Unsupported(Unsupported { number, .. }) => *number,
        }
    }

    pub fn location(&self) -> Location {
        match self {
            XrefEntry::Free(f) => Location::Free {
                next: f.next_free,
                generation: f.generation,
            },
            XrefEntry::Used(u) => Location::Offset {
                offset: u.byte_offset,
                generation: u.generation,
            },
            XrefEntry::UsedCompressed(c) => Location::Compressed {
                container: c.containing_object,
                index: c.index,
            },
            XrefEntry::Unsupported(_) => Location::Free { next: 0, generation: 0 },
        }
    }
}

impl From<Unsupported> for XrefEntry {
    fn from(v: Unsupported) -> Self {
        Self::Unsupported(v)
    }
}

impl From<UsedCompressedObject> for XrefEntry {
    fn from(v: UsedCompressedObject) -> Self {
        Self::UsedCompressed(v)
    }
}

impl From<UsedObject> for XrefEntry {
    fn from(v: UsedObject) -> Self {
        Self::Used(v)
    }
}

impl From<FreeObject> for XrefEntry {
    fn from(v: FreeObject) -> Self {
        Self::Free(v)
    }
}

/// Where the bytes of an object live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    Free { next: u32, generation: u16 },
    Offset { offset: usize, generation: u16 },
    Compressed { container: u32, index: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XrefKind {
    /// Classical `xref` keyword table.
    Table,
    /// Cross-reference stream stored as the given object.
    Stream(Reference),
}

/// One cross-reference section together with its trailer.
#[derive(Debug, Clone, PartialEq)]
pub struct Revision {
    /// Byte offset of the `xref` keyword or the xref stream object.
    pub startxref: usize,
    pub kind: XrefKind,
    /// Trailer dictionary. For xref streams this is the stream dictionary.
    pub trailer: Dictionary,
    pub entries: Xref,
    /// Entries of the stream named by a hybrid file's `XRefStm` key.
    pub hybrid_entries: Option<Xref>,
}

impl Revision {
    pub fn object_numbers(&self) -> impl Iterator<Item = u32> + '_ {
        self.entries
            .entries()
            .chain(self.hybrid_entries.iter().flat_map(Xref::entries))
            .map(XrefEntry::number)
    }
}

/// The `Prev` chain of cross-reference sections folded into one view.
///
/// Revisions are kept newest first. For each object number the newest
/// revision that mentions it wins; older definitions are shadowed.
#[derive(Debug, Clone, Default)]
pub struct XrefChain {
    revisions: Vec<Revision>,
    resolved: FnvHashMap<u32, Location>,
    prefer_stream: bool,
}

impl XrefChain {
    pub fn new(prefer_stream: bool) -> Self {
        Self {
            revisions: Vec::new(),
            resolved: FnvHashMap::default(),
            prefer_stream,
        }
    }

    /// Revisions, newest first.
    pub fn revisions(&self) -> &[Revision] {
        &self.revisions
    }

    pub fn newest(&self) -> Option<&Revision> {
        self.revisions.first()
    }

    pub fn is_empty(&self) -> bool {
        self.revisions.is_empty()
    }

    pub fn resolve(&self, number: u32) -> Option<Location> {
        self.resolved.get(&number).copied()
    }

    /// Object numbers with any entry in the chain.
    pub fn numbers(&self) -> impl Iterator<Item = u32> + '_ {
        self.resolved.keys().copied()
    }

    /// Largest `Size` announced by any trailer, or the highest entry plus one.
    pub fn size(&self) -> u32 {
        let announced = self
            .revisions
            .iter()
            .filter_map(|r| r.trailer.get(super::trailer::K_SIZE))
            .filter_map(super::Object::integer)
            .filter_map(|s| u32::try_from(s).ok())
            .max()
            .unwrap_or(0);
        let highest = self.resolved.keys().max().map_or(0, |n| n.saturating_add(1));
        announced.max(highest)
    }

    /// Append `revision` as an older revision than all recorded so far. This
    /// is the order in which a `Prev` chain is walked.
    pub fn record_older(&mut self, revision: Revision) {
        log::debug!(
            "Record xref section at {} with {} entries",
            revision.startxref,
            revision.entries.len()
        );
        self.merge(&revision);
        self.revisions.push(revision);
    }

    fn merge(&mut self, revision: &Revision) {
        let (first, second) = match (&revision.hybrid_entries, self.prefer_stream) {
            (Some(stream), true) => (Some(stream), Some(&revision.entries)),
            (Some(stream), false) => (Some(&revision.entries), Some(stream)),
            (None, _) => (Some(&revision.entries), None),
        };

        // within one revision the preferred table is applied first and never
        // overwritten by the other one
        let mut local = FnvHashMap::<u32, Location>::default();
        for xref in [first, second].into_iter().flatten() {
            for entry in xref.entries() {
                local.entry(entry.number()).or_insert_with(|| entry.location());
            }
        }

        for (number, location) in local {
            self.resolved.entry(number).or_insert(location);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn used(number: u32, byte_offset: usize) -> XrefEntry {
        UsedObject {
            number,
            byte_offset,
            generation: 0,
        }
        .into()
    }

    fn revision(startxref: usize, entries: Vec<XrefEntry>) -> Revision {
        Revision {
            startxref,
            kind: XrefKind::Table,
            trailer: Dictionary::new(),
            entries: entries.into(),
            hybrid_entries: None,
        }
    }

    #[test]
    fn newest_revision_shadows_older() {
        let mut chain = XrefChain::new(true);
        chain.record_older(revision(500, vec![used(1, 400)]));
        chain.record_older(revision(100, vec![used(1, 10), used(2, 50)]));

        assert_eq!(chain.resolve(1), Some(Location::Offset { offset: 400, generation: 0 }));
        assert_eq!(chain.resolve(2), Some(Location::Offset { offset: 50, generation: 0 }));
        assert_eq!(chain.resolve(3), None);
        assert_eq!(chain.size(), 3);
    }

    #[test]
    fn hybrid_stream_wins_when_preferred() {
        let mut rev = revision(100, vec![used(3, 10)]);
        rev.hybrid_entries = Some(
            vec![UsedCompressedObject {
                number: 3,
                containing_object: 7,
                index: 0,
            }
            .into()]
            .into(),
        );

        let mut preferred = XrefChain::new(true);
        preferred.record_older(rev.clone());
        assert_eq!(preferred.resolve(3), Some(Location::Compressed { container: 7, index: 0 }));

        let mut table_first = XrefChain::new(false);
        table_first.record_older(rev);
        assert_eq!(table_first.resolve(3), Some(Location::Offset { offset: 10, generation: 0 }));
    }
}
