use std::borrow::Cow;

use fnv::FnvHashSet;

use super::{
    compress, free_entries,
    hint::{hint_stream, PageHint},
    is_structural, reachable, used, write_header, Renumbering, SaveFlags,
};
use crate::{
    doc::Document,
    error::{Error, Result},
    parse::xref::XREF,
    pdf::{
        document::{pages::inherited_references, K_PARENT},
        object::Name,
        trailer::{K_PREVIOUS, K_SIZE, TRAILER},
        xref::Xref,
        Dictionary, Object, Reference, XrefEntry,
    },
    simple_encode::{indirect::Indirect, SimpleEncoder},
    writer::{Encoder, Writer},
};

/// Width of the fields that are only known after the layout is done.
const WIDTH: usize = 10;

/// Objects of the page `page` that no earlier page claimed, including those
/// of attributes it inherits. Parent links and other pages are not followed.
fn page_group(
    doc: &Document,
    page: Reference,
    pages: &FnvHashSet<u32>,
    claimed: &mut FnvHashSet<u32>,
) -> Vec<Reference> {
    let mut group = Vec::new();
    let mut stack = inherited_references(doc, page);
    stack.reverse();
    stack.push(page);
    while let Some(reference) = stack.pop() {
        if reference != page && pages.contains(&reference.number) {
            continue;
        }
        if !claimed.insert(reference.number) {
            continue;
        }
        let obj = match doc.get(reference) {
            Ok(obj) if !is_structural(obj) => obj,
            _ => continue,
        };
        group.push(reference);

        let mut children = Vec::new();
        match obj.dictionary() {
            Some(dict) => dict
                .iter()
                .filter(|(key, _)| &key[..] != K_PARENT)
                .for_each(|(_, value)| value.for_each_reference(&mut |r| children.push(r))),
            None => obj.for_each_reference(&mut |r| children.push(r)),
        }
        stack.extend(children.into_iter().rev());
    }
    group
}

/// Values filled in by the second pass.
#[derive(Debug, Default, Clone, Copy)]
struct Params {
    length: usize,
    hint: (usize, usize),
    first_page_end: usize,
    main_xref: usize,
    main_entries: usize,
}

/// Everything in front of the catalog: header, linearization dictionary,
/// first-page cross-reference section and trailer. Its length does not
/// depend on `params` or `offsets`.
struct Front<'a> {
    version: (u8, u8),
    linearized: u32,
    first_page: u32,
    pages: usize,
    size: u32,
    trailer: &'a [u8],
}

impl Front<'_> {
    /// Returns the bytes and the offset of the cross-reference section.
    /// `offsets` are those of the objects numbered from the linearization
    /// dictionary on; the dictionary itself is written here.
    fn write(&self, encoder: &SimpleEncoder, params: &Params, offsets: &[usize]) -> (Vec<u8>, usize) {
        let mut out = Vec::new();
        write_header(self.version, &mut out);

        let linearized_at = out.position();
        out.write(
            format!(
                "{} 0 obj\n<</Linearized 1 /L {:0w$} /H [{:0w$} {:0w$}] /O {} /E {:0w$} /N {} /T {:0w$}>>\nendobj\n",
                self.linearized,
                params.length,
                params.hint.0,
                params.hint.1,
                self.first_page,
                params.first_page_end,
                self.pages,
                params.main_entries,
                w = WIDTH,
            )
            .as_bytes(),
        );

        let xref_at = out.position();
        let entries: Vec<XrefEntry> = std::iter::once(linearized_at)
            .chain(offsets.iter().copied())
            .zip(self.linearized..)
            .map(|(offset, number)| used(Reference::new(number, 0), offset))
            .collect();
        encoder.write_to(&Xref::from(entries), &mut out);

        out.write(TRAILER);
        out.write(format!("\n<</Size {} /Prev {:0w$}", self.size, params.main_xref, w = WIDTH).as_bytes());
        out.write(self.trailer);
        out.write(b">>\nstartxref\n0\n%%EOF\n");
        (out, xref_at)
    }
}

fn encode_object(
    doc: &Document,
    renumbering: &Renumbering,
    flags: SaveFlags,
    encoder: &SimpleEncoder,
    old: Reference,
) -> Result<Vec<u8>> {
    let reference = renumbering.get(old).ok_or(Error::ObjectNotFound(old.number))?;
    let obj = Cow::Owned(renumbering.apply(doc.get(old)?));
    let obj = if flags.contains(SaveFlags::COMPRESS_STREAMS) {
        compress(obj)
    } else {
        obj
    };
    let mut bytes = Vec::new();
    encoder.write_to(
        &Indirect {
            reference,
            object: &obj,
        },
        &mut bytes,
    );
    Ok(bytes)
}

/// A complete file with the first page in front. Returns `None` if the
/// document has no pages.
///
/// Objects of the other pages and everything else are numbered from 1. The
/// first-page section follows: linearization dictionary, catalog, hint stream
/// and the first page's objects.
pub(super) fn write(doc: &Document, flags: SaveFlags, encoder: &SimpleEncoder) -> Result<Option<Vec<u8>>> {
    let pages = doc.page_refs();
    let root = match (pages.first(), doc.root()) {
        (Some(_), Some(root)) => root,
        _ => {
            log::info!("No pages to linearize, writing a plain file");
            return Ok(None);
        }
    };
    if flags.contains(SaveFlags::XREF_STREAM) {
        log::info!("Linearized files are written with cross-reference tables");
    }

    let page_numbers: FnvHashSet<u32> = pages.iter().map(|p| p.number).collect();
    let mut claimed = FnvHashSet::default();
    claimed.insert(root.number);
    let groups: Vec<Vec<Reference>> = pages
        .iter()
        .map(|&page| page_group(doc, page, &page_numbers, &mut claimed))
        .collect();
    let others: Vec<Reference> = reachable(doc)
        .into_iter()
        .filter(|r| !claimed.contains(&r.number))
        .collect();

    let first = &groups[0];
    let rest: Vec<Reference> = groups[1..].iter().flatten().chain(others.iter()).copied().collect();
    let k = rest.len() as u32;
    let linearized = k + 1;
    let catalog_number = k + 2;
    let hint_number = k + 3;
    let size = hint_number + first.len() as u32 + 1;

    let mut renumbering = Renumbering::new(&rest, 1);
    renumbering.assign(&[root], catalog_number);
    renumbering.assign(first, hint_number + 1);
    log::debug!(
        "Linearize {} pages: {} first-page objects, {} others",
        pages.len(),
        first.len(),
        k
    );

    let encode = |old: &Reference| encode_object(doc, &renumbering, flags, encoder, *old);
    let catalog = encode(&root)?;
    let first_objects = first.iter().map(encode).collect::<Result<Vec<_>>>()?;
    let page_objects = groups[1..]
        .iter()
        .map(|group| group.iter().map(encode).collect::<Result<Vec<_>>>())
        .collect::<Result<Vec<_>>>()?;
    let other_objects = others.iter().map(encode).collect::<Result<Vec<_>>>()?;

    let mut trailer_keys = Vec::new();
    if let Object::Dictionary(trailer) = renumbering.apply(&Object::from(doc.trailer.clone())) {
        for (key, value) in trailer.iter().filter(|(key, _)| &key[..] != K_SIZE && &key[..] != K_PREVIOUS) {
            trailer_keys.write(b" ");
            encoder.write_to(key, &mut trailer_keys);
            trailer_keys.write(b" ");
            encoder.write_to(value, &mut trailer_keys);
        }
    }
    let front = Front {
        version: doc.version(),
        linearized,
        first_page: hint_number + 1,
        pages: pages.len(),
        size,
        trailer: &trailer_keys,
    };

    // first pass: placeholders, to learn where the body starts
    let placeholders = vec![0; 2 + first.len()];
    let (probe, xref_at) = front.write(encoder, &Params::default(), &placeholders);
    let body = probe.len();

    // offsets as if the hint stream were absent
    let first_page_at = body + catalog.len();
    let mut page_hints = vec![PageHint {
        objects: first.len() as u32,
        length: first_objects.iter().map(Vec::len).sum(),
    }];
    page_hints.extend(page_objects.iter().map(|group| PageHint {
        objects: group.len() as u32,
        length: group.iter().map(Vec::len).sum(),
    }));

    let mut hint = Vec::new();
    encoder.write_to(
        &Indirect {
            reference: Reference::new(hint_number, 0),
            object: &Object::from(hint_stream(first_page_at, &page_hints)),
        },
        &mut hint,
    );

    let hint_at = body + catalog.len();
    let mut position = hint_at + hint.len();
    let mut first_offsets = vec![body, hint_at];
    for bytes in &first_objects {
        first_offsets.push(position);
        position += bytes.len();
    }
    let first_page_end = position;

    let mut main_entries = free_entries(&[]);
    for (old, bytes) in rest.iter().zip(page_objects.iter().flatten().chain(other_objects.iter())) {
        let reference = renumbering.get(*old).ok_or(Error::ObjectNotFound(old.number))?;
        main_entries.push(used(reference, position));
        position += bytes.len();
    }
    let main_xref = position;

    let mut main_trailer = Dictionary::new();
    main_trailer.insert(Name::from(K_SIZE), Object::from(size));
    let mut tail = Vec::new();
    encoder.write_to(&Xref::from(main_entries), &mut tail);
    encoder.write_trailer(&main_trailer, &mut tail);
    encoder.write_startxref(xref_at, &mut tail);

    let params = Params {
        length: main_xref + tail.len(),
        hint: (hint_at, hint.len()),
        first_page_end,
        main_xref,
        // the EOL in front of the first entry
        main_entries: main_xref + XREF.len() + format!("\n0 {}\n", k + 1).len() - 1,
    };

    // second pass
    let (mut out, _) = front.write(encoder, &params, &first_offsets);
    if out.len() != body {
        return Err(Error::CorruptXRef(format!(
            "linearized prefix changed from {} to {} bytes",
            body,
            out.len()
        )));
    }
    out.extend_from_slice(&catalog);
    out.extend_from_slice(&hint);
    first_objects.iter().for_each(|b| out.extend_from_slice(b));
    page_objects.iter().flatten().for_each(|b| out.extend_from_slice(b));
    other_objects.iter().for_each(|b| out.extend_from_slice(b));
    out.extend_from_slice(&tail);
    debug_assert_eq!(out.len(), params.length);

    Ok(Some(out))
}
