//! The document: an object table, the trailer and the bytes it was loaded
//! from.

use std::{
    fs::{self, File, OpenOptions as FileOptions},
    io::Write,
    path::{Path, PathBuf},
    sync::Arc,
};

use nom::Slice;

use crate::{
    error::{Error, Result, Warning},
    parse::{
        self,
        indirect::indirect_object,
        object_stream::object_stream,
        scan::scan_objects,
        span,
        trailer::trailer_tail,
    },
    pdf::{
        document::{
            dict_types::{CATALOG, OBJECT_STREAM, XREF},
            has_type, Catalog,
        },
        object::Name,
        trailer::{K_INFO, K_PREVIOUS, K_ROOT, XREF_STREAM_KEYS},
        Array, Dictionary, Filter, Object, ObjectKind, PdfString, Reference, Revision, Stream, XrefChain,
    },
    save::{self, Output, SaveFlags},
    source::Source,
    store::{SlotInfo, SlotState, Store},
};

pub(crate) const DEFAULT_VERSION: (u8, u8) = (1, 7);

/// How a document is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenOptions {
    /// In hybrid files, let entries of the `XRefStm` stream shadow the
    /// classical table of the same section.
    pub prefer_xref_stream: bool,
    /// Rebuild the object table by scanning the file when no usable
    /// cross-reference data is found.
    pub reconstruct: bool,
    /// Map files into memory instead of reading them.
    pub memory_map: bool,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            prefer_xref_stream: true,
            reconstruct: true,
            memory_map: true,
        }
    }
}

/// A PDF document at the object level.
///
/// Objects are parsed when first accessed. Links between objects are
/// [`Reference`]s resolved through the document.
#[derive(Debug)]
pub struct Document {
    pub(crate) store: Store,
    pub(crate) trailer: Dictionary,
    pub(crate) chain: XrefChain,
    version: (u8, u8),
    options: OpenOptions,
    path: Option<PathBuf>,
    warnings: Vec<Warning>,
    trailer_dirty: bool,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

/// Trailer entries that describe the document, without the keys that only
/// link cross-reference sections.
fn document_trailer(dict: &Dictionary) -> Dictionary {
    dict.iter()
        .filter(|(k, _)| &k[..] != K_PREVIOUS && !XREF_STREAM_KEYS.contains(&&k[..]))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

impl Document {
    /// An empty document. Only object number 0 is allocated.
    pub fn new() -> Self {
        Self {
            store: Store::new(),
            trailer: Dictionary::new(),
            chain: XrefChain::new(true),
            version: DEFAULT_VERSION,
            options: OpenOptions::default(),
            path: None,
            warnings: Vec::new(),
            trailer_dirty: false,
        }
    }

    pub fn open(path: impl AsRef<Path>, options: OpenOptions) -> Result<Self> {
        let path = path.as_ref();
        log::debug!("Open {}", path.display());
        let source = Source::open(path, options.memory_map)?;
        let mut doc = Self::from_source(Arc::new(source), options)?;
        doc.path = Some(path.to_path_buf());
        Ok(doc)
    }

    /// Load a document from bytes in memory.
    pub fn load(buf: Vec<u8>) -> Result<Self> {
        Self::load_with(buf, OpenOptions::default())
    }

    pub fn load_with(buf: Vec<u8>, options: OpenOptions) -> Result<Self> {
        Self::from_source(Arc::new(Source::Owned(buf)), options)
    }

    fn from_source(source: Arc<Source>, options: OpenOptions) -> Result<Self> {
        let mut warnings = Vec::new();
        let version = parse::header(&source).unwrap_or_else(|| {
            log::warn!("No %PDF header found, assuming {}.{}", DEFAULT_VERSION.0, DEFAULT_VERSION.1);
            DEFAULT_VERSION
        });

        let (store, trailer, chain) = match parse::read_xref_chain(&source, options.prefer_xref_stream, &mut warnings) {
            Some(chain) => {
                let trailer = chain
                    .newest()
                    .map(|r| document_trailer(&r.trailer))
                    .unwrap_or_default();
                (Store::from_chain(Arc::clone(&source), &chain), trailer, chain)
            }
            None if options.reconstruct => {
                let (store, trailer) = reconstruct(&source, &mut warnings)?;
                (store, trailer, XrefChain::new(options.prefer_xref_stream))
            }
            None => {
                let reason = warnings
                    .last()
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "no cross-reference data".to_string());
                return Err(Error::CorruptXRef(reason));
            }
        };

        log::debug!(
            "Loaded PDF {}.{} with {} revisions and {} slots",
            version.0,
            version.1,
            chain.revisions().len(),
            store.len()
        );
        Ok(Self {
            store,
            trailer,
            chain,
            version,
            options,
            path: None,
            warnings,
            trailer_dirty: false,
        })
    }

    /// Header version written by full saves.
    pub fn version(&self) -> (u8, u8) {
        self.version
    }

    pub fn set_version(&mut self, major: u8, minor: u8) {
        self.version = (major, minor);
    }

    /// Problems found while loading and materializing objects.
    pub fn warnings(&self) -> Vec<Warning> {
        let mut warnings = self.warnings.clone();
        warnings.extend(self.store.warnings());
        warnings
    }

    /// Whether anything changed since the document was opened or saved.
    pub fn is_modified(&self) -> bool {
        self.trailer_dirty || self.store.is_dirty()
    }

    pub fn trailer(&self) -> &Dictionary {
        &self.trailer
    }

    /// The trailer dictionary. `Size` and the section links are maintained
    /// when saving.
    pub fn trailer_mut(&mut self) -> &mut Dictionary {
        self.trailer_dirty = true;
        &mut self.trailer
    }

    /// Cross-reference revisions of the loaded bytes, newest first.
    pub fn revisions(&self) -> &[Revision] {
        self.chain.revisions()
    }

    /// Number of object slots, including slot 0 and free slots.
    pub fn xref_size(&self) -> u32 {
        self.store.len()
    }

    /// Every slot with its number, generation and state.
    pub fn slots(&self) -> impl Iterator<Item = SlotInfo> + '_ {
        self.store.slots()
    }

    /// The value of the object `reference` points to.
    pub fn get(&self, reference: Reference) -> Result<&Object> {
        self.store.get(reference)
    }

    /// The value of the in-use object `number`, whatever its generation.
    pub fn get_obj(&self, number: u32) -> Result<&Object> {
        self.store.get_obj(number)
    }

    /// Mutable access. Marks the object as changed.
    pub fn get_mut(&mut self, reference: Reference) -> Result<&mut Object> {
        self.store.get_mut(reference)
    }

    /// Follow `obj` if it is a reference.
    pub fn resolve<'a>(&'a self, obj: &'a Object) -> Result<&'a Object> {
        match obj {
            Object::Reference(r) => self.get(*r),
            obj => Ok(obj),
        }
    }

    /// Replace the value of an object.
    pub fn set(&mut self, reference: Reference, object: impl Into<Object>) -> Result<()> {
        self.store.set(reference, object.into())
    }

    /// Store `object` as a new indirect object.
    pub fn create_indirect(&mut self, object: impl Into<Object>) -> Reference {
        self.store.create(object.into())
    }

    pub fn create_indirect_dict(&mut self) -> Reference {
        self.create_indirect(Dictionary::new())
    }

    pub fn create_indirect_array(&mut self) -> Reference {
        self.create_indirect(Array::new())
    }

    /// A new stream holding `data` as is. `dict` describes its encoding.
    pub fn create_indirect_stream(&mut self, dict: Dictionary, data: Vec<u8>) -> Reference {
        self.create_indirect(Stream::new(dict, data))
    }

    /// A new stream holding `data` encoded with `filter`.
    pub fn create_indirect_stream_filtered(&mut self, dict: Dictionary, data: &[u8], filter: Filter) -> Result<Reference> {
        let stream = Stream::encoded(dict, data, filter)?;
        Ok(self.create_indirect(stream))
    }

    /// Checks the kind before handing out mutable access, so a failed call
    /// leaves the object untouched.
    fn container(&mut self, container: Reference, expected: ObjectKind) -> Result<&mut Object> {
        let found = self.get(container)?.kind();
        let fits = match expected {
            ObjectKind::Dictionary => matches!(found, ObjectKind::Dictionary | ObjectKind::Stream),
            kind => kind == found,
        };
        if !fits {
            return Err(Error::TypeMismatch { expected, found });
        }
        self.get_mut(container)
    }

    /// Set `key` of a dictionary or stream dictionary.
    pub fn put(&mut self, container: Reference, key: impl Into<Name>, value: impl Into<Object>) -> Result<()> {
        self.container(container, ObjectKind::Dictionary)?
            .as_dictionary_mut()?
            .insert(key.into(), value.into());
        Ok(())
    }

    /// Append to an array.
    pub fn push_back(&mut self, container: Reference, value: impl Into<Object>) -> Result<()> {
        self.container(container, ObjectKind::Array)?
            .as_array_mut()?
            .push(value.into());
        Ok(())
    }

    /// Remove `key` from a dictionary or stream dictionary, keeping the order
    /// of the remaining keys.
    pub fn erase(&mut self, container: Reference, key: &[u8]) -> Result<Option<Object>> {
        let dict = self.container(container, ObjectKind::Dictionary)?.as_dictionary_mut()?;
        Ok(dict.shift_remove(key))
    }

    /// Remove element `index` from an array.
    pub fn erase_at(&mut self, container: Reference, index: usize) -> Result<Option<Object>> {
        let array = self.container(container, ObjectKind::Array)?.as_array_mut()?;
        Ok((index < array.len()).then(|| array.remove(index)))
    }

    /// Exchange the values of two objects. References to either number keep
    /// resolving.
    pub fn swap(&mut self, a: u32, b: u32) -> Result<()> {
        self.store.swap(a, b)
    }

    /// Free an object and return its last value. The number is reused by a
    /// later [`Document::create_indirect`] with the next generation.
    pub fn free(&mut self, reference: Reference) -> Result<Object> {
        self.store.free(reference)
    }

    /// Byte offset and length of an unmodified object in the bytes the
    /// document was loaded from or last saved to.
    pub fn byte_range(&self, reference: Reference) -> Option<(usize, usize)> {
        let info = self.store.info(reference.number)?;
        if info.generation != reference.generation || info.dirty {
            return None;
        }
        let offset = match info.state {
            SlotState::InUse { offset: Some(offset) } => offset,
            _ => return None,
        };
        let buf: &[u8] = self.store.source()?;
        if offset >= buf.len() {
            return None;
        }
        let (_, parsed) = indirect_object(span(buf).slice(offset..), &self.store).ok()?;
        Some((offset, parsed.end - offset))
    }

    pub fn root(&self) -> Option<Reference> {
        self.trailer.get(K_ROOT).and_then(Object::reference)
    }

    pub fn set_root(&mut self, root: Reference) {
        self.trailer_mut().insert(Name::from(K_ROOT), Object::from(root));
    }

    pub fn catalog(&self) -> Result<Catalog<'_>> {
        let root = self.root().ok_or(Error::ObjectNotFound(0))?;
        Catalog::new_with(self, root)
    }

    /// The document information dictionary, if the trailer names one.
    pub fn info(&self) -> Option<Reference> {
        self.trailer.get(K_INFO).and_then(Object::reference)
    }

    /// The document information dictionary, created and linked from the
    /// trailer if it is missing or unreadable.
    pub fn get_or_create_info(&mut self) -> Reference {
        match self.info() {
            Some(info) if self.get(info).map_or(false, |o| o.dictionary().is_some()) => info,
            _ => {
                let info = self.create_indirect_dict();
                self.trailer_mut().insert(Name::from(K_INFO), Object::from(info));
                info
            }
        }
    }

    /// Leaf pages in document order.
    pub fn page_refs(&self) -> Vec<Reference> {
        self.catalog().map(|c| c.page_refs()).unwrap_or_default()
    }

    pub fn page_count(&self) -> usize {
        self.page_refs().len()
    }

    pub fn put_name(&mut self, container: Reference, key: &str, name: &str) -> Result<()> {
        self.put(container, key, Name::from(name))
    }

    /// Integral values are stored as integers, everything else as reals.
    pub fn put_number(&mut self, container: Reference, key: &str, value: f64) -> Result<()> {
        let value = if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
            Object::Integer(value as i64)
        } else {
            Object::Real(value)
        };
        self.put(container, key, value)
    }

    pub fn put_string(&mut self, container: Reference, key: &str, value: &[u8]) -> Result<()> {
        self.put(container, key, PdfString::from(value))
    }

    /// Store text as a PDF text string.
    pub fn put_text(&mut self, container: Reference, key: &str, text: &str) -> Result<()> {
        self.put(container, key, PdfString::from_text(text))
    }

    pub fn put_bool(&mut self, container: Reference, key: &str, value: bool) -> Result<()> {
        self.put(container, key, value)
    }

    /// `[x1 y1 x2 y2]`
    pub fn put_rect(&mut self, container: Reference, key: &str, rect: [f64; 4]) -> Result<()> {
        self.put(container, key, rect.iter().map(|&v| Object::Real(v)).collect::<Array>())
    }

    /// Insert an empty direct dictionary under `key` and return it.
    pub fn put_dict(&mut self, container: Reference, key: &str) -> Result<&mut Dictionary> {
        let dict = self.container(container, ObjectKind::Dictionary)?.as_dictionary_mut()?;
        let entry = dict.entry(Name::from(key)).or_insert(Object::Null);
        *entry = Object::from(Dictionary::new());
        entry.as_dictionary_mut()
    }

    /// Insert an empty direct array under `key` and return it.
    pub fn put_array(&mut self, container: Reference, key: &str) -> Result<&mut Array> {
        let dict = self.container(container, ObjectKind::Dictionary)?.as_dictionary_mut()?;
        let entry = dict.entry(Name::from(key)).or_insert(Object::Null);
        *entry = Object::from(Array::new());
        entry.as_array_mut()
    }

    /// Serialize the document. Incremental output holds the loaded bytes
    /// followed by the update. The document is rebased onto the result.
    pub fn save_to_vec(&mut self, flags: SaveFlags) -> Result<Vec<u8>> {
        let bytes = match save::render(self, flags)? {
            Output::Complete(bytes) => bytes,
            Output::Appended(update) => {
                let mut bytes = self.store.source().map(|s| s.to_vec()).unwrap_or_default();
                bytes.extend_from_slice(&update);
                bytes
            }
        };
        self.rebase(Source::Owned(bytes.clone()))?;
        // the bytes no longer match any file on disk
        self.path = None;
        Ok(bytes)
    }

    /// Write the document to `path`.
    ///
    /// Complete files are written to a temporary file next to `path` and
    /// renamed over it. Incremental updates of the file the document was
    /// opened from are appended; the file is truncated back if that fails.
    pub fn save(&mut self, path: impl AsRef<Path>, flags: SaveFlags) -> Result<()> {
        let path = path.as_ref();
        let output = save::render(self, flags)?;
        let same_file = match (&self.path, fs::canonicalize(path)) {
            (Some(opened), Ok(target)) => fs::canonicalize(opened).map_or(false, |o| o == target),
            _ => false,
        };

        match output {
            Output::Appended(update) if same_file => {
                let base = self.store.source().map_or(0, |s| s.len());
                append(path, base, &update)?;
            }
            Output::Appended(update) => {
                let mut bytes = self.store.source().map(|s| s.to_vec()).unwrap_or_default();
                bytes.extend_from_slice(&update);
                replace(path, &bytes)?;
            }
            Output::Complete(bytes) => replace(path, &bytes)?,
        }

        log::debug!("Saved {}", path.display());
        let source = Source::open(path, self.options.memory_map)?;
        self.rebase(source)?;
        self.path = Some(path.to_path_buf());
        Ok(())
    }

    /// Continue on the bytes just written. Object numbers change when the
    /// save renumbered objects.
    fn rebase(&mut self, source: Source) -> Result<()> {
        let path = self.path.take();
        let version = self.version;
        *self = Self::from_source(Arc::new(source), self.options)?;
        self.path = path;
        self.version = version;
        Ok(())
    }
}

fn replace(path: &Path, bytes: &[u8]) -> Result<()> {
    let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    let temp = path.with_file_name(format!(".{}.tmp", name));
    let written = File::create(&temp)
        .and_then(|mut f| f.write_all(bytes).and_then(|_| f.sync_all()))
        .and_then(|_| fs::rename(&temp, path));
    if let Err(err) = written {
        let _ = fs::remove_file(&temp);
        return Err(err.into());
    }
    Ok(())
}

fn append(path: &Path, base: usize, update: &[u8]) -> Result<()> {
    let mut file = FileOptions::new().append(true).open(path)?;
    let len = file.metadata()?.len();
    if len != base as u64 {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("{} changed on disk ({} bytes, expected {})", path.display(), len, base),
        )));
    }
    if let Err(err) = file.write_all(update).and_then(|_| file.sync_all()) {
        log::warn!("Appending to {} failed, restoring {} bytes", path.display(), len);
        let _ = file.set_len(len);
        return Err(err.into());
    }
    Ok(())
}

/// Rebuild the object table from `N G obj` headers when the cross-reference
/// data is unusable.
fn reconstruct(source: &Arc<Source>, warnings: &mut Vec<Warning>) -> Result<(Store, Dictionary)> {
    let objects = scan_objects(source);
    if objects.is_empty() {
        return Err(Error::CorruptXRef("no objects found".to_string()));
    }
    let mut store = Store::from_scan(Arc::clone(source), &objects);

    let mut containers = Vec::new();
    let mut xref_dict: Option<(usize, Dictionary)> = None;
    for o in &objects {
        let dict = match store.get_obj(o.reference.number).ok().and_then(Object::stream) {
            Some(stream) if has_type(stream.dictionary(), OBJECT_STREAM) => {
                match object_stream(stream) {
                    Ok(contained) => containers.push((
                        o.reference.number,
                        contained.iter().map(|(n, _)| *n).collect::<Vec<_>>(),
                    )),
                    Err(kind) => log::warn!("Object stream {} is unreadable: {}", o.reference, kind),
                }
                continue;
            }
            Some(stream) if has_type(stream.dictionary(), XREF) => stream.dictionary(),
            _ => continue,
        };
        // the xref stream furthest into the file is the newest
        if xref_dict.as_ref().map_or(true, |(offset, _)| *offset < o.offset) {
            xref_dict = Some((o.offset, document_trailer(dict)));
        }
    }
    for (container, numbers) in containers {
        store.restore_compressed(container, &numbers);
    }

    let mut trailer = match trailer_tail(span(source)) {
        Ok((_, dict)) => document_trailer(&dict),
        Err(_) => xref_dict.map(|(_, d)| d).unwrap_or_default(),
    };

    let root_usable = trailer
        .get(K_ROOT)
        .and_then(Object::reference)
        .and_then(|r| store.get(r).ok())
        .map_or(false, |o| o.dictionary().is_some());
    if !root_usable {
        let catalog = (1..store.len()).find_map(|number| {
            let obj = store.get_obj(number).ok()?;
            has_type(obj.dictionary()?, CATALOG).then(|| store.reference(number)).flatten()
        });
        match catalog {
            Some(root) => {
                trailer.insert(Name::from(K_ROOT), Object::from(root));
            }
            None => log::warn!("No document catalog found"),
        }
    }

    log::warn!("Rebuilt the object table from {} objects", objects.len());
    warnings.push(Warning::Reconstructed { objects: objects.len() });
    Ok((store, trailer))
}
