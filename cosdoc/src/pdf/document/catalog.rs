use crate::{
    doc::Document,
    error::Result,
    pdf::{
        document::{dict_types::CATALOG, require_type, K_PAGES, K_VERSION},
        object::Name,
        Dictionary, Object, Reference,
    },
};

/// Typed view of the document catalog (`/Type /Catalog`).
#[derive(Debug, Clone)]
pub struct Catalog<'a> {
    doc: &'a Document,
    reference: Reference,
    dict: &'a Dictionary,
}

impl<'a> Catalog<'a> {
    pub(crate) fn new_with(doc: &'a Document, reference: Reference) -> Result<Self> {
        let dict = doc.get(reference)?.as_dictionary()?;
        require_type(dict, CATALOG);
        Ok(Self { doc, reference, dict })
    }

    pub fn reference(&self) -> Reference {
        self.reference
    }

    pub fn dictionary(&self) -> &'a Dictionary {
        self.dict
    }

    /// Version override from the catalog, e.g. `1.7`.
    pub fn version(&self) -> Option<&'a Name> {
        self.dict.get(K_VERSION).and_then(Object::name)
    }

    /// Root of the page tree.
    pub fn pages(&self) -> Option<Reference> {
        self.dict.get(K_PAGES).and_then(Object::reference)
    }

    /// Leaf pages in document order.
    pub fn page_refs(&self) -> Vec<Reference> {
        self.pages()
            .map(|root| super::pages::page_refs(self.doc, root))
            .unwrap_or_default()
    }
}
