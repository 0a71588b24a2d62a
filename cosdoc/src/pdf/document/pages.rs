use fnv::FnvHashSet;

use crate::{
    doc::Document,
    pdf::{
        document::{
            dict_types::{PAGE, PAGES},
            require_type, K_KIDS, K_PARENT,
        },
        Object, Reference,
    },
};

/// Leaf pages below the page tree node `root`, in document order.
///
/// Nodes that can't be read are skipped. A node is visited at most once, so
/// cyclic trees terminate.
pub(crate) fn page_refs(doc: &Document, root: Reference) -> Vec<Reference> {
    let mut pages = Vec::new();
    let mut visited = FnvHashSet::default();
    let mut stack = vec![root];

    while let Some(node) = stack.pop() {
        if !visited.insert(node.number) {
            log::warn!("Page tree reaches object {} more than once", node.number);
            continue;
        }
        let dict = match doc.get(node).ok().and_then(Object::dictionary) {
            Some(dict) => dict,
            None => {
                log::warn!("Page tree node {} is not a dictionary", node);
                continue;
            }
        };

        match dict.get(K_KIDS) {
            Some(kids) => {
                require_type(dict, PAGES);
                match doc.resolve(kids).ok().and_then(Object::array) {
                    Some(kids) => stack.extend(kids.iter().rev().filter_map(Object::reference)),
                    None => log::warn!("Kids of page tree node {} are not an array", node),
                }
            }
            None => {
                require_type(dict, PAGE);
                pages.push(node);
            }
        }
    }

    log::debug!("Found {} pages", pages.len());
    pages
}

/// Page attributes that page tree nodes pass down to their pages.
const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// References held by the attributes `page` inherits from the page tree
/// nodes above it. Attributes the page or a nearer node defines are skipped.
pub(crate) fn inherited_references(doc: &Document, page: Reference) -> Vec<Reference> {
    let mut found = Vec::new();
    let mut defined: Vec<&[u8]> = Vec::new();
    let mut visited = FnvHashSet::default();
    let mut node = Some(page);

    while let Some(current) = node {
        if !visited.insert(current.number) {
            log::warn!("Parent chain of page {} loops at {}", page, current);
            break;
        }
        let dict = match doc.get(current).ok().and_then(Object::dictionary) {
            Some(dict) => dict,
            None => break,
        };
        for key in INHERITABLE {
            if defined.contains(&key) {
                continue;
            }
            if let Some(value) = dict.get(key) {
                defined.push(key);
                if current != page {
                    value.for_each_reference(&mut |r| found.push(r));
                }
            }
        }
        node = dict.get(K_PARENT).and_then(Object::reference);
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::{document::K_TYPE, Dictionary, Name};

    fn node(doc: &mut Document, kind: &str, kids: &[Reference]) -> Reference {
        let mut dict = Dictionary::new();
        dict.insert(Name::from(K_TYPE), Object::from(Name::from(kind)));
        if !kids.is_empty() {
            dict.insert(
                Name::from(K_KIDS),
                Object::from(kids.iter().map(|&k| Object::from(k)).collect::<Vec<_>>()),
            );
        }
        doc.create_indirect(dict)
    }

    #[test]
    fn nested_tree_in_order() {
        let mut doc = Document::new();
        let p1 = node(&mut doc, "Page", &[]);
        let p2 = node(&mut doc, "Page", &[]);
        let p3 = node(&mut doc, "Page", &[]);
        let inner = node(&mut doc, "Pages", &[p2, p3]);
        let root = node(&mut doc, "Pages", &[p1, inner]);
        assert_eq!(page_refs(&doc, root), vec![p1, p2, p3]);
    }

    #[test]
    fn nearest_inherited_attributes() {
        let mut doc = Document::new();
        let font = doc.create_indirect_dict();
        let shadowed = doc.create_indirect_dict();
        let page = node(&mut doc, "Page", &[]);
        let inner = node(&mut doc, "Pages", &[page]);
        let root = node(&mut doc, "Pages", &[inner]);
        doc.put(page, "Parent", inner).unwrap();
        doc.put(inner, "Parent", root).unwrap();
        doc.put(inner, "Resources", font).unwrap();
        doc.put(root, "Resources", shadowed).unwrap();
        doc.put(root, "Rotate", 90).unwrap();
        assert_eq!(inherited_references(&doc, page), vec![font]);

        doc.put(page, "Resources", shadowed).unwrap();
        assert!(inherited_references(&doc, page).is_empty());
    }

    #[test]
    fn cycles_terminate() {
        let mut doc = Document::new();
        let page = node(&mut doc, "Page", &[]);
        let root = node(&mut doc, "Pages", &[page]);
        let dict = doc.get_mut(root).unwrap().as_dictionary_mut().unwrap();
        dict.get_mut(K_KIDS).unwrap().as_array_mut().unwrap().push(Object::from(root));
        assert_eq!(page_refs(&doc, root), vec![page]);
    }
}
