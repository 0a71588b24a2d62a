//! File layouts produced by [`Document::save`](crate::Document::save).

use std::borrow::Cow;

use bitflags::bitflags;
use fnv::{FnvHashMap, FnvHashSet};

use crate::{
    doc::Document,
    error::Result,
    pdf::{
        document::{
            dict_types::{OBJECT_STREAM, XREF},
            has_type,
        },
        object::Name,
        trailer::{K_INFO, K_ROOT, K_SIZE},
        xref::{FreeObject, UsedObject},
        Dictionary, Filter, Object, Reference, Stream, XrefEntry,
    },
    simple_encode::{default_hex_strings, SimpleEncoder},
    store::{SlotState, MAX_GENERATION},
    writer::Writer,
};

mod full;
mod hint;
mod incremental;
mod linearized;

bitflags! {
    /// How a document is written. The empty set is a full rewrite that keeps
    /// object numbers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SaveFlags: u32 {
        /// Append changed objects to the loaded bytes.
        const INCREMENTAL = 1 << 0;
        /// Drop objects that can't be reached from the trailer and number the
        /// rest from 1.
        const REMOVE_UNUSED = 1 << 1;
        /// Put the first page at the front of the file.
        const LINEARIZED = 1 << 2;
        /// Write strings as `<hex>`.
        const HEX_STRINGS = 1 << 3;
        /// Write a cross-reference stream instead of a table.
        const XREF_STREAM = 1 << 4;
        /// Flate-compress unfiltered streams in complete files.
        const COMPRESS_STREAMS = 1 << 5;
    }
}

pub(crate) enum Output {
    /// A complete file.
    Complete(Vec<u8>),
    /// An update to append to the loaded bytes.
    Appended(Vec<u8>),
}

pub(crate) fn render(doc: &Document, flags: SaveFlags) -> Result<Output> {
    let encoder = SimpleEncoder {
        hex_strings: flags.contains(SaveFlags::HEX_STRINGS) || default_hex_strings(),
    };

    if flags.contains(SaveFlags::INCREMENTAL) {
        if doc.store.source().is_some() {
            if flags.contains(SaveFlags::LINEARIZED) {
                log::warn!("An incremental update can't be linearized");
            }
            return incremental::write(doc, flags, &encoder).map(Output::Appended);
        }
        log::info!("Nothing loaded to append to, writing a complete file");
    }

    if flags.contains(SaveFlags::LINEARIZED) {
        if let Some(bytes) = linearized::write(doc, flags, &encoder)? {
            return Ok(Output::Complete(bytes));
        }
    }
    full::write(doc, flags, &encoder).map(Output::Complete)
}

/// `%PDF-x.y` and a comment with high bytes that marks the file as binary.
fn write_header(version: (u8, u8), writer: &mut dyn Writer) {
    writer.write(format!("%PDF-{}.{}\n", version.0, version.1).as_bytes());
    writer.write(b"%\xe2\xe3\xcf\xd3\n");
}

/// Cross-reference streams and object streams describe the layout of the
/// loaded file and are not carried into a new one.
fn is_structural(obj: &Object) -> bool {
    obj.stream()
        .map_or(false, |s| has_type(s.dictionary(), XREF) || has_type(s.dictionary(), OBJECT_STREAM))
}

/// Flate-compress `obj` if it is an unfiltered stream.
fn compress(obj: Cow<'_, Object>) -> Cow<'_, Object> {
    let compressed = match obj.stream() {
        Some(s) if !s.is_filtered() => Stream::encoded(s.dictionary().clone(), s.raw_data(), Filter::Flate),
        _ => return obj,
    };
    match compressed {
        Ok(stream) => Cow::Owned(Object::Stream(stream)),
        Err(err) => {
            log::warn!("Keeping stream uncompressed: {}", err);
            obj
        }
    }
}

/// Used entry for an object written at `offset`.
fn used(reference: Reference, offset: usize) -> XrefEntry {
    UsedObject {
        number: reference.number,
        byte_offset: offset,
        generation: reference.generation,
    }
    .into()
}

/// Entries of a free list given in list order, object 0 first.
fn free_entries(chain: &[(u32, u16)]) -> Vec<XrefEntry> {
    let mut entries = Vec::with_capacity(chain.len() + 1);
    let mut previous = (0, MAX_GENERATION);
    for &(number, generation) in chain {
        entries.push(
            FreeObject {
                number: previous.0,
                generation: previous.1,
                next_free: number,
            }
            .into(),
        );
        previous = (number, generation);
    }
    entries.push(
        FreeObject {
            number: previous.0,
            generation: previous.1,
            next_free: 0,
        }
        .into(),
    );
    entries
}

/// In-use objects in depth-first order starting at the trailer's `Root`,
/// then `Info`, then anything else the trailer references.
fn reachable(doc: &Document) -> Vec<Reference> {
    let mut roots: Vec<Reference> = Vec::new();
    roots.extend(doc.trailer.get(K_ROOT).and_then(Object::reference));
    roots.extend(doc.trailer.get(K_INFO).and_then(Object::reference));
    for (key, value) in doc.trailer.iter() {
        if &key[..] != K_ROOT && &key[..] != K_INFO {
            value.for_each_reference(&mut |r| roots.push(r));
        }
    }

    let mut order = Vec::new();
    let mut visited = FnvHashSet::default();
    let mut stack: Vec<Reference> = roots.into_iter().rev().collect();
    while let Some(reference) = stack.pop() {
        if visited.contains(&reference.number) {
            continue;
        }
        let obj = match doc.get(reference) {
            Ok(obj) if !is_structural(obj) => obj,
            _ => continue,
        };
        visited.insert(reference.number);
        order.push(reference);

        let mut children = Vec::new();
        obj.for_each_reference(&mut |r| children.push(r));
        stack.extend(children.into_iter().rev());
    }
    order
}

/// Maps old references to the numbers objects are written under.
struct Renumbering(FnvHashMap<u32, (u16, Reference)>);

impl Renumbering {
    /// Number `order` consecutively from `first`, generation 0.
    fn new(order: &[Reference], first: u32) -> Self {
        let mut renumbering = Self(FnvHashMap::default());
        renumbering.assign(order, first);
        renumbering
    }

    fn assign(&mut self, order: &[Reference], first: u32) {
        self.0.extend(
            order
                .iter()
                .zip(first..)
                .map(|(old, new)| (old.number, (old.generation, Reference::new(new, 0)))),
        );
    }

    fn get(&self, old: Reference) -> Option<Reference> {
        self.0
            .get(&old.number)
            .filter(|(generation, _)| *generation == old.generation)
            .map(|(_, new)| *new)
    }

    /// Rewrite the references in `obj`. References to objects that are not
    /// written become null.
    fn apply(&self, obj: &Object) -> Object {
        let mut obj = obj.clone();
        obj.map_references(&mut |r| self.get(r));
        obj
    }
}

/// Objects of a complete file and the references they are written under.
struct Plan<'a> {
    objects: Vec<(Reference, Cow<'a, Object>)>,
    /// Free numbers in list order with their generations.
    free: Vec<(u32, u16)>,
    trailer: Dictionary,
    size: u32,
}

impl<'a> Plan<'a> {
    /// Every in-use object under its current number.
    fn preserve(doc: &'a Document) -> Self {
        let mut objects = Vec::new();
        let mut dropped = Vec::new();
        for number in 1..doc.store.len() {
            let reference = match doc.store.reference(number) {
                Some(reference) => reference,
                None => continue,
            };
            match doc.get(reference) {
                Ok(obj) if is_structural(obj) => dropped.push((number, reference.generation)),
                Ok(obj) => objects.push((reference, Cow::Borrowed(obj))),
                Err(err) => log::warn!("Skipping object {}: {}", reference, err),
            }
        }

        let mut free: Vec<(u32, u16)> = doc
            .store
            .free_chain()
            .into_iter()
            .filter_map(|n| doc.store.info(n).map(|i| (n, i.generation)))
            .collect();
        free.extend(dropped);

        let mut trailer = doc.trailer.clone();
        trailer.insert(Name::from(K_SIZE), Object::from(doc.store.len()));
        Self {
            objects,
            free,
            trailer,
            size: doc.store.len(),
        }
    }

    /// Only objects reachable from the trailer, numbered from 1 in the order
    /// they are reached.
    fn compact(doc: &'a Document) -> Self {
        let order = reachable(doc);
        let renumbering = Renumbering::new(&order, 1);
        let in_use = doc
            .slots()
            .filter(|s| s.number > 0 && !matches!(s.state, SlotState::Free { .. }))
            .count();
        log::debug!("Keeping {} of {} objects", order.len(), in_use);

        let objects = order
            .iter()
            .filter_map(|&old| {
                let obj = doc.get(old).ok()?;
                Some((renumbering.get(old)?, Cow::Owned(renumbering.apply(obj))))
            })
            .collect();

        let size = order.len() as u32 + 1;
        let mut trailer = match renumbering.apply(&Object::from(doc.trailer.clone())) {
            Object::Dictionary(d) => d,
            _ => Dictionary::new(),
        };
        trailer.insert(Name::from(K_SIZE), Object::from(size));
        Self {
            objects,
            free: Vec::new(),
            trailer,
            size,
        }
    }

    fn new(doc: &'a Document, flags: SaveFlags) -> Self {
        if flags.contains(SaveFlags::REMOVE_UNUSED) {
            Self::compact(doc)
        } else {
            Self::preserve(doc)
        }
    }
}
