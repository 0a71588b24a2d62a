use super::{Dictionary, Object, PdfString, Reference};

pub const TRAILER: &[u8] = b"trailer";
pub const K_SIZE: &[u8] = b"Size";
pub const K_PREVIOUS: &[u8] = b"Prev";
pub const K_ENCRYPT: &[u8] = b"Encrypt";
pub const K_ROOT: &[u8] = b"Root";
pub const K_INFO: &[u8] = b"Info";
pub const K_ID: &[u8] = b"ID";
pub const K_X_REF_STM: &[u8] = b"XRefStm";

/// Keys that only describe an xref stream and must not leak into a plain
/// trailer dictionary.
pub(crate) const XREF_STREAM_KEYS: [&[u8]; 7] = [
    b"Type",
    b"W",
    b"Index",
    b"Length",
    b"Filter",
    b"DecodeParms",
    K_X_REF_STM,
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrailerError {
    InvalidSize,
    MissingSize,
    InvalidRoot,
    InvalidXRefStm,
    InvalidPrevious,
    InvalidInfo,
    InvalidId,
}

/// Typed view of the keys of a trailer dictionary that steer loading.
#[derive(Debug, Clone, PartialEq)]
pub struct Trailer {
    /// One more than the highest object number used in the PDF document
    pub size: u32,

    /// Byte offset to the previous PDF section
    pub previous: Option<usize>,

    /// Reference to the root object. Optional while a document is being built.
    pub root: Option<Reference>,

    /// Whether the document is encrypted.
    pub encrypted: bool,

    /// Information for this document.
    pub info: Option<Reference>,

    /// File identifier.
    pub id: Option<[PdfString; 2]>,

    /// Start of the XRef stream in hybrid files.
    ///
    /// This provides optional compatibility to readers that don't support XRef
    /// streams.
    pub x_ref_stm: Option<usize>,
}

fn offset(dict: &Dictionary, key: &[u8], err: TrailerError) -> Result<Option<usize>, TrailerError> {
    dict.get(key)
        .map(|o| o.integer().and_then(|i| usize::try_from(i).ok()).ok_or_else(|| err.clone()))
        .transpose()
}

impl TryFrom<&Dictionary> for Trailer {
    type Error = TrailerError;

    fn try_from(dict: &Dictionary) -> Result<Self, Self::Error> {
        Ok(Trailer {
            size: dict
                .get(K_SIZE)
                .ok_or(TrailerError::MissingSize)?
                .integer()
                .ok_or(TrailerError::InvalidSize)?
                .try_into()
                .map_err(|_| TrailerError::InvalidSize)?,

            previous: offset(dict, K_PREVIOUS, TrailerError::InvalidPrevious)?,

            root: dict
                .get(K_ROOT)
                .map(|o| o.reference().ok_or(TrailerError::InvalidRoot))
                .transpose()?,

            encrypted: dict.get(K_ENCRYPT).map_or(false, |o| !o.is_null()),

            info: dict
                .get(K_INFO)
                .filter(|o| !o.is_null())
                .map(|o| o.reference().ok_or(TrailerError::InvalidInfo))
                .transpose()?,

            id: dict
                .get(K_ID)
                .map(|o| o.array().ok_or(TrailerError::InvalidId))
                .transpose()?
                .map(|a| match (a.first().and_then(Object::string), a.get(1).and_then(Object::string)) {
                    (Some(id0), Some(id1)) if a.len() == 2 => Ok([id0.clone(), id1.clone()]),
                    _ => Err(TrailerError::InvalidId),
                })
                .transpose()?,

            x_ref_stm: offset(dict, K_X_REF_STM, TrailerError::InvalidXRefStm)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::Name;

    #[test]
    fn minimal_trailer() {
        let mut dict = Dictionary::new();
        dict.insert(Name::from(K_SIZE), Object::Integer(6));
        dict.insert(Name::from(K_ROOT), Object::Reference(Reference::new(1, 0)));
        dict.insert(Name::from(K_PREVIOUS), Object::Integer(116));

        let trailer = Trailer::try_from(&dict).unwrap();
        assert_eq!(trailer.size, 6);
        assert_eq!(trailer.root, Some(Reference::new(1, 0)));
        assert_eq!(trailer.previous, Some(116));
        assert_eq!(trailer.info, None);
        assert!(!trailer.encrypted);
    }

    #[test]
    fn invalid_entries() {
        let mut dict = Dictionary::new();
        assert_eq!(Trailer::try_from(&dict), Err(TrailerError::MissingSize));

        dict.insert(Name::from(K_SIZE), Object::Integer(-1));
        assert_eq!(Trailer::try_from(&dict), Err(TrailerError::InvalidSize));

        dict.insert(Name::from(K_SIZE), Object::Integer(3));
        dict.insert(Name::from(K_PREVIOUS), Object::Real(1.5));
        assert_eq!(Trailer::try_from(&dict), Err(TrailerError::InvalidPrevious));
    }
}
