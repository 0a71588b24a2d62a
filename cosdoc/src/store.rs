//! The indirect object table.
//!
//! Every object number owns one [`Slot`]. Slots know where their value lives
//! in the source bytes and parse it on first access. Free slots form the free
//! list; object number 0 is its permanent head.

use std::sync::{Arc, Mutex, OnceLock};

use fnv::FnvHashMap;
use nom::Slice;

use crate::{
    error::{Error, Result, Warning},
    parse::{
        indirect::{indirect_object, LengthResolver},
        object_stream::object_stream,
        scan::ScannedObject,
        span,
    },
    pdf::{Location, Object, Reference, XrefChain},
    source::Source,
};

/// Generation of a number that must never be reused.
pub const MAX_GENERATION: u16 = u16::MAX;

/// Where a slot's value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Free {
        /// Next free object number, 0 terminates the list.
        next: u32,
    },
    /// In use. `offset` is the byte offset of the object in the source, `None`
    /// for objects that only exist in memory.
    InUse { offset: Option<usize> },
    /// In use and stored inside the object stream `container`.
    Compressed { container: u32, index: u32 },
}

#[derive(Debug)]
struct Slot {
    generation: u16,
    state: SlotState,
    value: OnceLock<Object>,
    dirty: bool,
}

impl Slot {
    fn free(generation: u16) -> Self {
        Self {
            generation,
            state: SlotState::Free { next: 0 },
            value: OnceLock::new(),
            dirty: false,
        }
    }

    fn stored(generation: u16, state: SlotState) -> Self {
        Self {
            generation,
            state,
            value: OnceLock::new(),
            dirty: false,
        }
    }

    fn is_free(&self) -> bool {
        matches!(self.state, SlotState::Free { .. })
    }
}

/// Read-only view of one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotInfo {
    pub number: u32,
    pub generation: u16,
    pub state: SlotState,
    /// Whether the value has been parsed or created in memory.
    pub loaded: bool,
    /// Whether the slot changed since the document was opened or last saved.
    pub dirty: bool,
}

/// Fewest source bytes one object takes, counting the offset pair of an
/// object inside an object stream.
const MIN_OBJECT_BYTES: usize = 4;

/// Number of slots the source bytes can back.
fn slot_limit(source: &[u8]) -> u32 {
    u32::try_from(source.len() / MIN_OBJECT_BYTES)
        .unwrap_or(u32::MAX)
        .saturating_add(1)
}

type ObjectStreamCache = Mutex<FnvHashMap<u32, Arc<Vec<(u32, Object)>>>>;

#[derive(Debug)]
pub(crate) struct Store {
    source: Option<Arc<Source>>,
    slots: Vec<Slot>,
    /// Reusable free numbers, the head of the list is the last element.
    free_list: Vec<u32>,
    object_streams: ObjectStreamCache,
    warnings: Mutex<Vec<Warning>>,
}

impl Store {
    /// A store with only the reserved slot 0.
    pub fn new() -> Self {
        Self {
            source: None,
            slots: vec![Slot::free(MAX_GENERATION)],
            free_list: Vec::new(),
            object_streams: Mutex::default(),
            warnings: Mutex::default(),
        }
    }

    /// Build the table from the resolved cross-reference chain.
    ///
    /// A `Size` larger than the source bytes can back is not trusted: the
    /// table then ends after the highest plausible entry.
    pub fn from_chain(source: Arc<Source>, chain: &XrefChain) -> Self {
        let limit = slot_limit(&source);
        let announced = chain.size().max(1);
        let mut dropped = 0;
        let size = if announced > limit {
            let mut highest = 0;
            for number in chain.numbers() {
                if number < limit {
                    highest = highest.max(number);
                } else {
                    dropped += 1;
                }
            }
            highest + 1
        } else {
            announced
        };
        let mut slots: Vec<Slot> = (0..size)
            .map(|number| match chain.resolve(number) {
                Some(Location::Offset { offset, generation }) => Slot::stored(
                    generation,
                    SlotState::InUse {
                        offset: Some(offset),
                    },
                ),
                Some(Location::Compressed { container, index }) => {
                    Slot::stored(0, SlotState::Compressed { container, index })
                }
                Some(Location::Free { generation, .. }) => Slot::free(generation),
                // numbers missing from every section are free
                None => Slot::free(0),
            })
            .collect();
        slots[0] = Slot::free(MAX_GENERATION);

        let source_len = source.len();
        let mut store = Self {
            source: Some(source),
            slots,
            ..Self::new()
        };
        if announced > limit {
            store.warn(Warning::CorruptXRef(format!(
                "Size {} does not fit {} bytes, table cut to {} slots ({} entries dropped)",
                announced, source_len, size, dropped
            )));
        }
        store.rebuild_free_list();
        store
    }

    /// Build the table from a scan of the source bytes.
    pub fn from_scan(source: Arc<Source>, objects: &[ScannedObject]) -> Self {
        let limit = slot_limit(&source);
        let (objects, implausible): (Vec<&ScannedObject>, Vec<&ScannedObject>) =
            objects.iter().partition(|o| o.reference.number < limit);
        let size = objects.iter().map(|o| o.reference.number + 1).max().unwrap_or(1);
        let mut slots: Vec<Slot> = (0..size).map(|_| Slot::free(0)).collect();
        for o in objects.iter().filter(|o| o.reference.number > 0) {
            slots[o.reference.number as usize] = Slot::stored(
                o.reference.generation,
                SlotState::InUse {
                    offset: Some(o.offset),
                },
            );
        }
        slots[0] = Slot::free(MAX_GENERATION);

        let mut store = Self {
            source: Some(source),
            slots,
            ..Self::new()
        };
        for o in implausible {
            store.warn(Warning::CorruptXRef(format!(
                "object number {} at byte {} is out of range",
                o.reference.number, o.offset
            )));
        }
        store.rebuild_free_list();
        store
    }

    /// Mark free numbers found inside the object stream `container` as
    /// compressed objects. Used when the cross-reference is rebuilt from a
    /// scan.
    pub fn restore_compressed(&mut self, container: u32, numbers: &[u32]) {
        let limit = self.source.as_deref().map_or(1, |s| slot_limit(s));
        for (index, &number) in numbers.iter().enumerate() {
            if number == 0 || number == container {
                continue;
            }
            if number >= limit {
                log::warn!("Object stream {} names out of range object {}", container, number);
                continue;
            }
            let slot = number as usize;
            if slot >= self.slots.len() {
                self.slots.resize_with(slot + 1, || Slot::free(0));
            }
            if self.slots[slot].is_free() {
                self.slots[slot] = Slot::stored(
                    0,
                    SlotState::Compressed {
                        container,
                        index: index as u32,
                    },
                );
            }
        }
        self.rebuild_free_list();
    }

    /// Collect free numbers in ascending order, the lowest number becomes the
    /// head of the list.
    fn rebuild_free_list(&mut self) {
        self.free_list = self
            .slots
            .iter()
            .enumerate()
            .skip(1)
            .rev()
            .filter(|(_, slot)| slot.is_free() && slot.generation < MAX_GENERATION)
            .map(|(number, _)| number as u32)
            .collect();
    }

    /// Free numbers in list order, starting with the head. Numbers that can't
    /// be reused are linked in at the end.
    pub fn free_chain(&self) -> Vec<u32> {
        let mut chain: Vec<u32> = self.free_list.iter().rev().copied().collect();
        chain.extend(
            self.slots
                .iter()
                .enumerate()
                .skip(1)
                .filter(|(_, slot)| slot.is_free() && slot.generation == MAX_GENERATION)
                .map(|(number, _)| number as u32),
        );
        chain
    }

    /// `number -> next` for every free slot, slot 0 included.
    fn free_links(&self) -> FnvHashMap<u32, u32> {
        let chain = self.free_chain();
        let mut links = FnvHashMap::default();
        let mut previous = 0;
        for number in chain {
            links.insert(previous, number);
            previous = number;
        }
        links.insert(previous, 0);
        links
    }

    pub fn source(&self) -> Option<&Arc<Source>> {
        self.source.as_ref()
    }

    /// Number of slots including slot 0 and free slots.
    pub fn len(&self) -> u32 {
        self.slots.len() as u32
    }

    fn info_with(&self, number: u32, links: &FnvHashMap<u32, u32>) -> Option<SlotInfo> {
        self.slots.get(number as usize).map(|slot| SlotInfo {
            number,
            generation: slot.generation,
            state: match slot.state {
                SlotState::Free { .. } => SlotState::Free {
                    next: links.get(&number).copied().unwrap_or(0),
                },
                state => state,
            },
            loaded: slot.value.get().is_some(),
            dirty: slot.dirty,
        })
    }

    pub fn info(&self, number: u32) -> Option<SlotInfo> {
        self.info_with(number, &self.free_links())
    }

    pub fn slots(&self) -> impl Iterator<Item = SlotInfo> + '_ {
        let links = self.free_links();
        (0..self.len()).filter_map(move |number| self.info_with(number, &links))
    }

    /// Current reference of an in-use number.
    pub fn reference(&self, number: u32) -> Option<Reference> {
        self.slots
            .get(number as usize)
            .filter(|slot| !slot.is_free())
            .map(|slot| Reference::new(number, slot.generation))
    }

    fn checked_slot(&self, reference: Reference) -> Result<&Slot> {
        let slot = self
            .slots
            .get(reference.number as usize)
            .ok_or(Error::ObjectNotFound(reference.number))?;
        if slot.generation != reference.generation {
            return Err(Error::StaleReference(reference));
        }
        if slot.is_free() || reference.number == 0 {
            return Err(Error::ObjectNotFound(reference.number));
        }
        Ok(slot)
    }

    /// The value of an in-use object, parsed on first access.
    pub fn get(&self, reference: Reference) -> Result<&Object> {
        self.checked_slot(reference)?;
        Ok(self.materialize(reference.number))
    }

    /// Like [`Store::get`], ignoring the generation.
    pub fn get_obj(&self, number: u32) -> Result<&Object> {
        let reference = self.reference(number).ok_or(Error::ObjectNotFound(number))?;
        self.get(reference)
    }

    /// Mutable access marks the object dirty.
    pub fn get_mut(&mut self, reference: Reference) -> Result<&mut Object> {
        self.get(reference)?;
        let slot = &mut self.slots[reference.number as usize];
        slot.dirty = true;
        slot.value.get_mut().ok_or(Error::ObjectNotFound(reference.number))
    }

    /// Replace the value of an in-use object.
    pub fn set(&mut self, reference: Reference, object: Object) -> Result<()> {
        self.checked_slot(reference)?;
        let slot = &mut self.slots[reference.number as usize];
        slot.value = OnceLock::from(object);
        slot.dirty = true;
        Ok(())
    }

    /// Store `object` under a reused free number or a new number.
    pub fn create(&mut self, object: Object) -> Reference {
        let number = match self.free_list.pop() {
            Some(number) => number,
            None => {
                self.slots.push(Slot::free(0));
                self.len() - 1
            }
        };
        let slot = &mut self.slots[number as usize];
        slot.state = SlotState::InUse { offset: None };
        slot.value = OnceLock::from(object);
        slot.dirty = true;
        let reference = Reference::new(number, slot.generation);

        log::trace!("Created object {}", reference);
        reference
    }

    /// Free an object. Its generation is incremented; a number that reaches
    /// the maximum generation is never handed out again.
    pub fn free(&mut self, reference: Reference) -> Result<Object> {
        self.checked_slot(reference)?;
        let value = self.materialize(reference.number).clone();

        let slot = &mut self.slots[reference.number as usize];
        slot.generation = slot.generation.saturating_add(1);
        slot.state = SlotState::Free { next: 0 };
        slot.value = OnceLock::new();
        slot.dirty = true;
        if slot.generation < MAX_GENERATION {
            self.free_list.push(reference.number);
        } else {
            log::debug!("Object number {} is exhausted", reference.number);
        }

        log::trace!("Freed object {}", reference);
        Ok(value)
    }

    /// Exchange the values of two in-use objects. Both keep their number and
    /// generation.
    pub fn swap(&mut self, a: u32, b: u32) -> Result<()> {
        let ref_a = self.reference(a).ok_or(Error::ObjectNotFound(a))?;
        let ref_b = self.reference(b).ok_or(Error::ObjectNotFound(b))?;
        if a == b {
            return Ok(());
        }

        self.materialize(a);
        self.materialize(b);
        let value_a = self.slots[a as usize].value.take().unwrap_or(Object::Null);
        let value_b = self.slots[b as usize].value.take().unwrap_or(Object::Null);
        self.set(ref_a, value_b)?;
        self.set(ref_b, value_a)?;
        Ok(())
    }

    /// Numbers of all objects changed since the last save, in ascending order.
    pub fn dirty_numbers(&self) -> Vec<u32> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.dirty)
            .map(|(number, _)| number as u32)
            .collect()
    }

    pub fn is_dirty(&self) -> bool {
        self.slots.iter().any(|slot| slot.dirty)
    }

    /// Byte offset of an uncompressed object in the source bytes.
    pub fn byte_offset(&self, number: u32) -> Option<usize> {
        match self.slots.get(number as usize)?.state {
            SlotState::InUse { offset } => offset,
            _ => None,
        }
    }

    /// Problems found while materializing objects.
    pub fn warnings(&self) -> Vec<Warning> {
        self.warnings.lock().map(|w| w.clone()).unwrap_or_default()
    }

    fn warn(&self, warning: Warning) {
        log::warn!("{}", warning);
        if let Ok(mut warnings) = self.warnings.lock() {
            warnings.push(warning);
        }
    }

    fn materialize(&self, number: u32) -> &Object {
        let slot = &self.slots[number as usize];
        slot.value.get_or_init(|| match slot.state {
            SlotState::InUse { offset: Some(offset) } => self.load_direct(number, offset),
            SlotState::Compressed { container, index } => self.load_compressed(number, container, index),
            SlotState::InUse { offset: None } | SlotState::Free { .. } => Object::Null,
        })
    }

    fn load_direct(&self, number: u32, offset: usize) -> Object {
        let buf = match &self.source {
            Some(source) if offset < source.len() => &source[..],
            _ => {
                self.warn(Warning::MalformedObject { number, offset });
                return Object::Null;
            }
        };

        match indirect_object(span(buf).slice(offset..), self) {
            Ok((_, indirect)) => {
                if indirect.reference.number != number {
                    self.warn(Warning::NumberMismatch {
                        expected: number,
                        found: indirect.reference.number,
                        offset,
                    });
                }
                if !indirect.terminated {
                    self.warn(Warning::MissingEndobj { number });
                }
                log::trace!("Loaded object {} from byte {}", number, offset);
                indirect.object
            }
            Err(err) => {
                log::debug!("Parsing object {} failed: {}", number, Error::from(err));
                self.warn(Warning::MalformedObject { number, offset });
                Object::Null
            }
        }
    }

    fn object_stream(&self, container: u32) -> Option<Arc<Vec<(u32, Object)>>> {
        if let Some(objects) = self.object_streams.lock().ok()?.get(&container) {
            return Some(Arc::clone(objects));
        }

        // containers are never compressed themselves
        if !matches!(self.slots.get(container as usize)?.state, SlotState::InUse { .. }) {
            return None;
        }
        let stream = self.materialize(container).stream()?;
        let objects = match object_stream(stream) {
            Ok(objects) => Arc::new(objects),
            Err(kind) => {
                log::warn!("Object stream {} is unreadable: {}", container, kind);
                return None;
            }
        };
        log::debug!("Loaded object stream {} with {} objects", container, objects.len());

        let mut cache = self.object_streams.lock().ok()?;
        Some(Arc::clone(cache.entry(container).or_insert(objects)))
    }

    fn load_compressed(&self, number: u32, container: u32, index: u32) -> Object {
        let objects = match self.object_stream(container) {
            Some(objects) => objects,
            None => {
                self.warn(Warning::MalformedObject {
                    number,
                    offset: self.byte_offset(container).unwrap_or(0),
                });
                return Object::Null;
            }
        };

        let found = objects
            .get(index as usize)
            .filter(|(n, _)| *n == number)
            .or_else(|| objects.iter().find(|(n, _)| *n == number));
        match found {
            Some((_, obj)) => obj.clone(),
            None => {
                self.warn(Warning::MalformedObject {
                    number,
                    offset: self.byte_offset(container).unwrap_or(0),
                });
                Object::Null
            }
        }
    }

    /// Forget all dirty marks, e.g. after the document was written.
    pub fn clear_dirty(&mut self) {
        self.slots.iter_mut().for_each(|slot| slot.dirty = false);
    }
}

impl LengthResolver for Store {
    /// Peek at an uncompressed integer object without materializing it.
    fn resolve_length(&self, reference: Reference) -> Option<usize> {
        let slot = self.slots.get(reference.number as usize)?;
        let length = match (slot.value.get(), slot.state) {
            (Some(value), _) => value.integer(),
            (None, SlotState::InUse { offset: Some(offset) }) => {
                let buf: &[u8] = self.source.as_ref()?;
                if offset >= buf.len() {
                    return None;
                }
                let (_, indirect) = indirect_object(span(buf).slice(offset..), &()).ok()?;
                indirect.object.integer()
            }
            _ => None,
        };
        length.and_then(|l| usize::try_from(l).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::Dictionary;

    fn store_with(count: u32) -> Store {
        let mut store = Store::new();
        for i in 0..count {
            store.create(Object::Integer(i.into()));
        }
        store
    }

    #[test]
    fn new_store_reserves_zero() {
        let store = Store::new();
        assert_eq!(store.len(), 1);
        let zero = store.info(0).unwrap();
        assert_eq!(zero.generation, MAX_GENERATION);
        assert!(matches!(zero.state, SlotState::Free { next: 0 }));
        assert!(matches!(store.get_obj(0), Err(Error::ObjectNotFound(0))));
    }

    #[test]
    fn create_appends() {
        let mut store = Store::new();
        let r = store.create(Object::Dictionary(Dictionary::new()));
        assert_eq!(r, Reference::new(1, 0));
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(r).unwrap(), &Object::Dictionary(Dictionary::new()));
    }

    #[test]
    fn free_then_create_bumps_generation() {
        let mut store = store_with(5);
        let old = store.reference(3).unwrap();
        assert_eq!(store.free(old).unwrap(), Object::Integer(2));

        assert!(matches!(store.get(old), Err(Error::StaleReference(_))));
        assert!(matches!(store.info(0).unwrap().state, SlotState::Free { next: 3 }));

        let new = store.create(Object::Null);
        assert_eq!(new, Reference::new(3, old.generation + 1));
        assert_eq!(store.len(), 6);
        assert!(matches!(store.get(old), Err(Error::StaleReference(_))));
    }

    #[test]
    fn free_list_is_lifo() {
        let mut store = store_with(5);
        store.free(Reference::new(2, 0)).unwrap();
        store.free(Reference::new(4, 0)).unwrap();
        assert_eq!(store.free_chain(), vec![4, 2]);
        assert_eq!(store.create(Object::Null).number, 4);
        assert_eq!(store.create(Object::Null).number, 2);
        assert_eq!(store.create(Object::Null).number, 6);
    }

    #[test]
    fn exhausted_generation_is_never_reused() {
        let mut store = store_with(1);
        store.slots[1].generation = MAX_GENERATION - 1;
        store.free(Reference::new(1, MAX_GENERATION - 1)).unwrap();
        assert_eq!(store.info(1).unwrap().generation, MAX_GENERATION);
        assert_eq!(store.create(Object::Null).number, 2);
        assert_eq!(store.free_chain(), vec![1]);
    }

    #[test]
    fn swap_keeps_identity() {
        let mut store = store_with(2);
        store.swap(1, 2).unwrap();
        assert_eq!(store.get_obj(1).unwrap(), &Object::Integer(1));
        assert_eq!(store.get_obj(2).unwrap(), &Object::Integer(0));
        assert_eq!(store.reference(1), Some(Reference::new(1, 0)));

        store.free(Reference::new(2, 0)).unwrap();
        assert!(matches!(store.swap(1, 2), Err(Error::ObjectNotFound(2))));
    }

    #[test]
    fn lazy_materialization_is_idempotent() {
        let source = b"%PDF-1.4\n1 0 obj\n<< /A [1 2 3] >>\nendobj\n".to_vec();
        let objects = crate::parse::scan::scan_objects(&source);
        let store = Store::from_scan(Arc::new(Source::Owned(source)), &objects);

        assert!(!store.info(1).unwrap().loaded);
        let first: *const Object = store.get_obj(1).unwrap();
        assert!(store.info(1).unwrap().loaded);
        let second: *const Object = store.get_obj(1).unwrap();
        assert_eq!(first, second);
        assert_eq!(store.get_obj(1).unwrap().get(b"A").and_then(|a| a.get_at(2)), Some(&Object::Integer(3)));
    }

    #[test]
    fn unparsable_object_reads_as_null() {
        let source = b"1 0 obj\n<< /A (unterminated >>\nendobj\n".to_vec();
        let objects = crate::parse::scan::scan_objects(&source);
        let store = Store::from_scan(Arc::new(Source::Owned(source)), &objects);
        assert_eq!(store.get_obj(1).unwrap(), &Object::Null);
        let warnings = store.warnings();
        assert!(matches!(warnings.as_slice(), [Warning::MalformedObject { number: 1, .. }]));
    }

    #[test]
    fn out_of_range_numbers_are_dropped() {
        let source = b"1 0 obj\nnull\nendobj\n4000000000 0 obj\n5\nendobj\n".to_vec();
        let objects = crate::parse::scan::scan_objects(&source);
        let store = Store::from_scan(Arc::new(Source::Owned(source)), &objects);
        assert_eq!(store.len(), 2);
        assert!(matches!(store.warnings().as_slice(), [Warning::CorruptXRef(_)]));
    }

    #[test]
    fn deeply_nested_object_reads_as_null() {
        let mut source = b"1 0 obj\n".to_vec();
        source.extend_from_slice(&b"[".repeat(200_000));
        source.extend_from_slice(&b"]".repeat(200_000));
        source.extend_from_slice(b"\nendobj\n");
        let objects = crate::parse::scan::scan_objects(&source);
        let store = Store::from_scan(Arc::new(Source::Owned(source)), &objects);
        assert_eq!(store.get_obj(1).unwrap(), &Object::Null);
        assert!(matches!(store.warnings().as_slice(), [Warning::MalformedObject { number: 1, .. }]));
    }

    #[test]
    fn indirect_length_is_peeked() {
        let source = b"1 0 obj\n<< /Length 2 0 R >>\nstream\nendstream\nendstream\nendobj\n2 0 obj 10 endobj\n".to_vec();
        let objects = crate::parse::scan::scan_objects(&source);
        let store = Store::from_scan(Arc::new(Source::Owned(source)), &objects);
        let stream = store.get_obj(1).unwrap().stream().unwrap();
        assert_eq!(stream.raw_data(), b"endstream\n");
        assert!(!store.info(2).unwrap().loaded);
    }
}
