use std::{fmt::Display, ops::Deref};

pub use self::{
    object::{
        filter::{Filter, FilterError},
        Array, Dictionary, Name, PdfString, Reference, Stream,
    },
    trailer::Trailer,
    xref::{Location, Revision, XrefChain, XrefEntry, XrefKind},
};
use crate::error::{Error, Result};

pub mod document;
pub mod object;
pub mod trailer;
pub mod xref;

/// A direct PDF value.
///
/// Links between indirect objects are always expressed as [`Reference`]s and
/// resolved through the owning document, so object graphs may contain cycles.
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    Null,
    Bool(bool),
    Integer(i64),
    Real(f64),
    String(PdfString),
    Name(Name),
    Array(Array),
    Dictionary(Dictionary),
    Stream(Stream),
    Reference(Reference),
}

/// The kind of an [`Object`], used for checked accessors and error reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Null,
    Bool,
    Number,
    String,
    Name,
    Array,
    Dictionary,
    Stream,
    Reference,
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Null => "null",
            ObjectKind::Bool => "boolean",
            ObjectKind::Number => "number",
            ObjectKind::String => "string",
            ObjectKind::Name => "name",
            ObjectKind::Array => "array",
            ObjectKind::Dictionary => "dictionary",
            ObjectKind::Stream => "stream",
            ObjectKind::Reference => "reference",
        }
    }
}

impl Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Object {
    pub fn kind(&self) -> ObjectKind {
        match self {
            Object::Null => ObjectKind::Null,
            Object::Bool(_) => ObjectKind::Bool,
            Object::Integer(_) | Object::Real(_) => ObjectKind::Number,
            Object::String(_) => ObjectKind::String,
            Object::Name(_) => ObjectKind::Name,
            Object::Array(_) => ObjectKind::Array,
            Object::Dictionary(_) => ObjectKind::Dictionary,
            Object::Stream(_) => ObjectKind::Stream,
            Object::Reference(_) => ObjectKind::Reference,
        }
    }

    fn mismatch(&self, expected: ObjectKind) -> Error {
        Error::TypeMismatch {
            expected,
            found: self.kind(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Object::Null)
    }

    pub fn bool(&self) -> Option<bool> {
        match self {
            Object::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn integer(&self) -> Option<i64> {
        match self {
            Object::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Integer or real value as a double.
    pub fn number(&self) -> Option<f64> {
        match self {
            Object::Integer(i) => Some(*i as f64),
            Object::Real(r) => Some(*r),
            _ => None,
        }
    }

    pub fn string(&self) -> Option<&PdfString> {
        match self {
            Object::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn name(&self) -> Option<&Name> {
        match self {
            Object::Name(n) => Some(n),
            _ => None,
        }
    }

    pub fn array(&self) -> Option<&Array> {
        match self {
            Object::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn array_mut(&mut self) -> Option<&mut Array> {
        match self {
            Object::Array(a) => Some(a),
            _ => None,
        }
    }

    /// The dictionary of a dictionary or stream object.
    pub fn dictionary(&self) -> Option<&Dictionary> {
        match self {
            Object::Dictionary(d) => Some(d),
            Object::Stream(s) => Some(s.dictionary()),
            _ => None,
        }
    }

    pub fn dictionary_mut(&mut self) -> Option<&mut Dictionary> {
        match self {
            Object::Dictionary(d) => Some(d),
            Object::Stream(s) => Some(s.dictionary_mut()),
            _ => None,
        }
    }

    pub fn stream(&self) -> Option<&Stream> {
        match self {
            Object::Stream(s) => Some(s),
            _ => None,
        }
    }

    pub fn stream_mut(&mut self) -> Option<&mut Stream> {
        match self {
            Object::Stream(s) => Some(s),
            _ => None,
        }
    }

    pub fn reference(&self) -> Option<Reference> {
        match self {
            Object::Reference(r) => Some(*r),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Result<f64> {
        self.number().ok_or_else(|| self.mismatch(ObjectKind::Number))
    }

    pub fn as_name(&self) -> Result<&Name> {
        self.name().ok_or_else(|| self.mismatch(ObjectKind::Name))
    }

    pub fn as_string(&self) -> Result<&PdfString> {
        self.string().ok_or_else(|| self.mismatch(ObjectKind::String))
    }

    pub fn as_array(&self) -> Result<&Array> {
        self.array().ok_or_else(|| self.mismatch(ObjectKind::Array))
    }

    pub fn as_array_mut(&mut self) -> Result<&mut Array> {
        let found = self.kind();
        self.array_mut().ok_or(Error::TypeMismatch {
            expected: ObjectKind::Array,
            found,
        })
    }

    pub fn as_dictionary(&self) -> Result<&Dictionary> {
        self.dictionary().ok_or_else(|| self.mismatch(ObjectKind::Dictionary))
    }

    pub fn as_dictionary_mut(&mut self) -> Result<&mut Dictionary> {
        let found = self.kind();
        self.dictionary_mut().ok_or(Error::TypeMismatch {
            expected: ObjectKind::Dictionary,
            found,
        })
    }

    pub fn as_stream(&self) -> Result<&Stream> {
        self.stream().ok_or_else(|| self.mismatch(ObjectKind::Stream))
    }

    pub fn as_stream_mut(&mut self) -> Result<&mut Stream> {
        let found = self.kind();
        self.stream_mut().ok_or(Error::TypeMismatch {
            expected: ObjectKind::Stream,
            found,
        })
    }

    pub fn as_reference(&self) -> Result<Reference> {
        self.reference().ok_or_else(|| self.mismatch(ObjectKind::Reference))
    }

    /// Look up `key` if this is a dictionary or stream.
    pub fn get(&self, key: &[u8]) -> Option<&Object> {
        self.dictionary().and_then(|d| d.get(key))
    }

    /// Element `index` if this is an array.
    pub fn get_at(&self, index: usize) -> Option<&Object> {
        self.array().and_then(|a| a.get(index))
    }

    /// Call `f` for every reference contained in this value, depth first.
    pub fn for_each_reference(&self, f: &mut impl FnMut(Reference)) {
        match self {
            Object::Reference(r) => f(*r),
            Object::Array(a) => a.iter().for_each(|o| o.for_each_reference(f)),
            Object::Dictionary(d) => d.values().for_each(|o| o.for_each_reference(f)),
            Object::Stream(s) => s.dictionary().values().for_each(|o| o.for_each_reference(f)),
            _ => {}
        }
    }

    /// Rewrite every contained reference with `f`. `None` replaces the
    /// reference with `null`.
    pub fn map_references(&mut self, f: &mut impl FnMut(Reference) -> Option<Reference>) {
        match self {
            Object::Reference(r) => {
                *self = f(*r).map(Object::Reference).unwrap_or(Object::Null);
            }
            Object::Array(a) => a.iter_mut().for_each(|o| o.map_references(f)),
            Object::Dictionary(d) => d.values_mut().for_each(|o| o.map_references(f)),
            Object::Stream(s) => s.dictionary_mut().values_mut().for_each(|o| o.map_references(f)),
            _ => {}
        }
    }
}

impl Display for Object {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let encoded = crate::simple_encode::encode_to_vec(self);
        write!(f, "{}", String::from_utf8_lossy(&encoded))
    }
}

impl From<bool> for Object {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Object {
    fn from(v: i32) -> Self {
        Self::Integer(v.into())
    }
}

impl From<i64> for Object {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<u32> for Object {
    fn from(v: u32) -> Self {
        Self::Integer(v.into())
    }
}

impl From<usize> for Object {
    fn from(v: usize) -> Self {
        // offsets and sizes beyond i64 are not representable in PDF anyway
        Self::Integer(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<f32> for Object {
    fn from(v: f32) -> Self {
        Self::Real(v.into())
    }
}

impl From<f64> for Object {
    fn from(v: f64) -> Self {
        Self::Real(v)
    }
}

impl From<PdfString> for Object {
    fn from(v: PdfString) -> Self {
        Self::String(v)
    }
}

impl From<Name> for Object {
    fn from(n: Name) -> Self {
        Self::Name(n)
    }
}

impl From<Vec<Object>> for Object {
    fn from(a: Vec<Object>) -> Self {
        Self::Array(a.into())
    }
}

impl From<Array> for Object {
    fn from(a: Array) -> Self {
        Self::Array(a)
    }
}

impl From<Dictionary> for Object {
    fn from(d: Dictionary) -> Self {
        Self::Dictionary(d)
    }
}

impl From<Stream> for Object {
    fn from(s: Stream) -> Self {
        Self::Stream(s)
    }
}

impl From<Reference> for Object {
    fn from(r: Reference) -> Self {
        Self::Reference(r)
    }
}

/// Raw bytes, e.g. the encoded payload of a stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Bytes(Vec<u8>);

impl Bytes {
    pub fn into_inner(self) -> Vec<u8> {
        self.0
    }
}

impl From<Vec<u8>> for Bytes {
    fn from(v: Vec<u8>) -> Self {
        Bytes(v)
    }
}

impl From<&[u8]> for Bytes {
    fn from(v: &[u8]) -> Self {
        Bytes(v.to_vec())
    }
}

impl Deref for Bytes {
    type Target = Vec<u8>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::fmt::Display for Bytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let limited_length = self.len().min(15);
        write!(f, "{}", &String::from_utf8_lossy(&self.0[..limited_length]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checked_accessors_report_kind() {
        let obj = Object::Integer(3);
        assert_eq!(obj.as_number().ok(), Some(3.0));
        assert!(matches!(
            obj.as_dictionary(),
            Err(Error::TypeMismatch {
                expected: ObjectKind::Dictionary,
                found: ObjectKind::Number
            })
        ));
    }

    #[test]
    fn stream_acts_as_dictionary() {
        let mut dict = Dictionary::new();
        dict.insert(Name::from("Subtype"), Object::Name(Name::from("Image")));
        let obj = Object::Stream(Stream::new(dict, b"abc".to_vec()));
        assert_eq!(obj.get(b"Subtype").and_then(Object::name), Some(&Name::from("Image")));
    }

    #[test]
    fn map_references_drops_dangling() {
        let mut obj = Object::from(vec![
            Object::Reference(Reference::new(1, 0)),
            Object::Reference(Reference::new(2, 0)),
        ]);
        obj.map_references(&mut |r| (r.number == 1).then(|| Reference::new(7, 0)));
        assert_eq!(
            obj,
            Object::from(vec![Object::Reference(Reference::new(7, 0)), Object::Null])
        );

        let mut seen = Vec::new();
        obj.for_each_reference(&mut |r| seen.push(r.number));
        assert_eq!(seen, vec![7]);
    }
}
