pub use catalog::Catalog;

use crate::pdf::{Dictionary, Object};

pub mod catalog;
pub mod pages;

/// Dictionary type names
pub(crate) mod dict_types {
    pub const OBJECT_STREAM: &[u8] = b"ObjStm";
    pub const XREF: &[u8] = b"XRef";
    pub const PAGES: &[u8] = b"Pages";
    pub const PAGE: &[u8] = b"Page";
    pub const CATALOG: &[u8] = b"Catalog";
}

pub(crate) const K_TYPE: &[u8] = b"Type";
pub(crate) const K_PARENT: &[u8] = b"Parent";
pub(crate) const K_KIDS: &[u8] = b"Kids";
pub(crate) const K_VERSION: &[u8] = b"Version";
pub(crate) const K_PAGES: &[u8] = b"Pages";
pub(crate) const K_LENGTH: &[u8] = b"Length";
pub(crate) const K_STREAM_OBJECT_COUNT: &[u8] = b"N";
pub(crate) const K_FIRST: &[u8] = b"First";
pub(crate) const K_W: &[u8] = b"W";
pub(crate) const K_INDEX: &[u8] = b"Index";

/// Whether `dict` declares `/Type /t`.
pub(crate) fn has_type(dict: &Dictionary, t: &[u8]) -> bool {
    dict.get(K_TYPE)
        .and_then(Object::name)
        .map_or(false, |k| &k[..] == t)
}

fn require_type(dict: &Dictionary, t: &[u8]) -> bool {
    match dict.get(K_TYPE).and_then(Object::name) {
        Some(k) if &k[..] == t => true,
        Some(k) => {
            log::warn!("Wrong dictionary type `{}`", k);
            false
        }
        None => {
            log::warn!("Missing dictionary type");
            false
        }
    }
}
