use fnv::FnvHashSet;

use super::{free_entries, is_structural, reachable, used, SaveFlags};
use crate::{
    doc::Document,
    error::Result,
    pdf::{
        object::Name,
        trailer::{K_PREVIOUS, K_SIZE},
        xref::Xref,
        Object, Reference, XrefKind,
    },
    simple_encode::{indirect::Indirect, section::xref_stream, SimpleEncoder},
    store::MAX_GENERATION,
    writer::{Encoder, OffsetWriter, Writer},
};

/// An update section for the loaded bytes: changed objects, their
/// cross-reference entries and a trailer linking back to the previous
/// section. Returns only the bytes to append.
pub(super) fn write(doc: &Document, flags: SaveFlags, encoder: &SimpleEncoder) -> Result<Vec<u8>> {
    let base: &[u8] = doc.store.source().map_or(&[][..], |s| &s[..]);
    if !doc.is_modified() && !doc.chain.is_empty() {
        log::info!("Nothing changed, no update written");
        return Ok(Vec::new());
    }

    let previous = doc.chain.newest();
    // without a section to link to, every object goes into the update
    let everything = previous.is_none();

    let unused: FnvHashSet<u32> = if flags.contains(SaveFlags::REMOVE_UNUSED) {
        let keep: FnvHashSet<u32> = reachable(doc).iter().map(|r| r.number).collect();
        (1..doc.store.len())
            .filter(|n| doc.store.reference(*n).is_some() && !keep.contains(n))
            .collect()
    } else {
        FnvHashSet::default()
    };

    let candidates: Vec<u32> = if everything {
        (1..doc.store.len()).collect()
    } else {
        doc.store.dirty_numbers()
    };

    let mut out = Vec::new();
    let mut writer = OffsetWriter::new(base.len(), &mut out);
    if !base.is_empty() && !base.ends_with(b"\n") && !base.ends_with(b"\r") {
        writer.write(b"\n");
    }

    let mut entries = Vec::new();
    let mut free_changed = everything || !unused.is_empty();
    for number in candidates {
        let reference = match doc.store.reference(number) {
            Some(reference) => reference,
            None => {
                free_changed = true;
                continue;
            }
        };
        if unused.contains(&number) {
            continue;
        }
        let obj = match doc.get(reference) {
            Ok(obj) if !is_structural(obj) => obj,
            Ok(_) => continue,
            Err(err) => {
                log::warn!("Skipping object {}: {}", reference, err);
                continue;
            }
        };
        entries.push(used(reference, writer.position()));
        encoder.write_to(&Indirect { reference, object: obj }, &mut writer);
    }
    log::debug!("Update holds {} objects", entries.len());

    if free_changed || entries.is_empty() {
        let mut chain: Vec<(u32, u16)> = doc
            .store
            .free_chain()
            .into_iter()
            .filter_map(|n| doc.store.info(n).map(|i| (n, i.generation)))
            .collect();
        let mut removed: Vec<u32> = unused.into_iter().collect();
        removed.sort_unstable();
        for number in removed {
            if let Some(info) = doc.store.info(number) {
                log::debug!("Freeing unreachable object {}", number);
                chain.push((number, info.generation.saturating_add(1).min(MAX_GENERATION)));
            }
        }
        entries.extend(free_entries(&chain));
    }

    let size = doc.store.len();
    let mut trailer = doc.trailer.clone();
    trailer.insert(Name::from(K_SIZE), Object::from(size));
    if let Some(previous) = previous {
        trailer.insert(Name::from(K_PREVIOUS), Object::from(previous.startxref));
    }

    let as_stream = match previous.map(|p| p.kind) {
        Some(XrefKind::Stream(_)) => true,
        _ => flags.contains(SaveFlags::XREF_STREAM),
    };
    let start_xref = writer.position();
    if as_stream {
        let reference = Reference::new(size, 0);
        trailer.insert(Name::from(K_SIZE), Object::from(size + 1));
        entries.push(used(reference, start_xref));
        let stream = xref_stream(&Xref::from(entries), trailer)?;
        encoder.write_to(
            &Indirect {
                reference,
                object: &Object::Stream(stream),
            },
            &mut writer,
        );
    } else {
        encoder.write_to(&Xref::from(entries), &mut writer);
        encoder.write_trailer(&trailer, &mut writer);
    }
    encoder.write_startxref(start_xref, &mut writer);

    Ok(out)
}

#[cfg(test)]
mod tests {
    use crate::{
        error::Warning,
        pdf::{trailer::K_PREVIOUS, Name, Object, PdfString, Reference, XrefKind},
        save::SaveFlags,
        store::SlotState,
        Document,
    };

    fn saved(flags: SaveFlags) -> (Document, Vec<u8>) {
        let mut doc = Document::new();
        let root = doc.create_indirect_dict();
        doc.put(root, "Type", Name::from("Catalog")).unwrap();
        let note = doc.create_indirect(PdfString::from("first"));
        doc.put(root, "Note", note).unwrap();
        doc.create_indirect(42);
        doc.set_root(root);
        let bytes = doc.save_to_vec(flags).unwrap();
        (doc, bytes)
    }

    #[test]
    fn update_keeps_prefix() {
        let (mut doc, original) = saved(SaveFlags::empty());
        doc.set(Reference::new(2, 0), PdfString::from("second")).unwrap();

        let bytes = doc.save_to_vec(SaveFlags::INCREMENTAL).unwrap();
        assert!(bytes.starts_with(&original));
        assert!(bytes.len() > original.len());

        let reopened = Document::load(bytes).unwrap();
        assert_eq!(reopened.revisions().len(), 2);
        assert_eq!(reopened.revisions()[0].entries.len(), 1);
        assert_eq!(
            reopened.get_obj(2).unwrap(),
            &Object::from(PdfString::from("second"))
        );
        assert_eq!(reopened.get_obj(3).unwrap(), &Object::Integer(42));
        assert_eq!(
            reopened.revisions()[0].trailer.get(K_PREVIOUS),
            Some(&Object::from(reopened.revisions()[1].startxref))
        );
    }

    #[test]
    fn unchanged_document_appends_nothing() {
        let (mut doc, original) = saved(SaveFlags::empty());
        let bytes = doc.save_to_vec(SaveFlags::INCREMENTAL).unwrap();
        assert_eq!(bytes, original);
        assert_eq!(doc.revisions().len(), 1);
    }

    #[test]
    fn freed_object_is_listed() {
        let (mut doc, _) = saved(SaveFlags::empty());
        doc.free(Reference::new(3, 0)).unwrap();
        let bytes = doc.save_to_vec(SaveFlags::INCREMENTAL).unwrap();

        let reopened = Document::load(bytes).unwrap();
        let slot = reopened.slots().nth(3).unwrap();
        assert_eq!(slot.generation, 1);
        assert!(matches!(slot.state, SlotState::Free { .. }));
        assert!(reopened.get(Reference::new(3, 0)).is_err());
    }

    #[test]
    fn unreachable_objects_are_freed() {
        let (mut doc, _) = saved(SaveFlags::empty());
        doc.put(Reference::new(1, 0), "Extra", true).unwrap();
        let bytes = doc
            .save_to_vec(SaveFlags::INCREMENTAL | SaveFlags::REMOVE_UNUSED)
            .unwrap();

        let reopened = Document::load(bytes).unwrap();
        assert!(matches!(
            reopened.slots().nth(3).unwrap().state,
            SlotState::Free { .. }
        ));
        assert_eq!(reopened.get_obj(2).unwrap(), &Object::from(PdfString::from("first")));
    }

    #[test]
    fn stream_sections_stay_streams() {
        let (mut doc, _) = saved(SaveFlags::XREF_STREAM);
        doc.set(Reference::new(3, 0), 43).unwrap();
        let bytes = doc.save_to_vec(SaveFlags::INCREMENTAL).unwrap();

        let reopened = Document::load(bytes).unwrap();
        assert_eq!(reopened.revisions().len(), 2);
        assert!(matches!(reopened.revisions()[0].kind, XrefKind::Stream(_)));
        assert_eq!(reopened.get_obj(3).unwrap(), &Object::Integer(43));
        assert!(reopened.warnings().is_empty());
    }

    #[test]
    fn broken_prev_keeps_newest_section() {
        let (mut doc, _) = saved(SaveFlags::empty());
        doc.set(Reference::new(2, 0), PdfString::from("second")).unwrap();
        let bytes = doc.save_to_vec(SaveFlags::INCREMENTAL).unwrap();

        let at = bytes
            .windows(6)
            .rposition(|w| w == b"/Prev ")
            .unwrap();
        let end = at + 6 + bytes[at + 6..].iter().take_while(|b| b.is_ascii_digit()).count();
        let mut broken = bytes[..at + 6].to_vec();
        broken.extend_from_slice(b"99999999");
        broken.extend_from_slice(&bytes[end..]);

        let reopened = Document::load(broken).unwrap();
        assert_eq!(reopened.revisions().len(), 1);
        assert!(reopened
            .warnings()
            .iter()
            .any(|w| matches!(w, Warning::CorruptXRef(_))));
        assert_eq!(
            reopened.get_obj(2).unwrap(),
            &Object::from(PdfString::from("second"))
        );
    }

    #[test]
    fn appends_to_reconstructed_files() {
        let mut doc = Document::load(
            b"%PDF-1.4\n1 0 obj\n<< /Type /Catalog >>\nendobj\ntrailer\n<< /Root 1 0 R >>\n".to_vec(),
        )
        .unwrap();
        assert!(doc.revisions().is_empty());
        doc.put(Reference::new(1, 0), "Lang", PdfString::from("en")).unwrap();

        let bytes = doc.save_to_vec(SaveFlags::INCREMENTAL).unwrap();
        let reopened = Document::load(bytes).unwrap();
        assert_eq!(reopened.revisions().len(), 1);
        assert_eq!(
            reopened.get_obj(1).unwrap().get(b"Lang"),
            Some(&Object::from(PdfString::from("en")))
        );
        assert_eq!(reopened.root(), Some(Reference::new(1, 0)));
    }
}
