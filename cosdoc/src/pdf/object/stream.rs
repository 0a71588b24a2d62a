use std::borrow::Cow;

use self::filter::{Filter, FilterError};
use crate::pdf::{document::K_LENGTH, Bytes, Dictionary, Name, Object};

pub mod filter;

pub(crate) const K_FILTER: &[u8] = b"Filter";
pub(crate) const K_DECODE_PARMS: &[u8] = b"DecodeParms";

/// A stream dictionary together with its encoded payload.
///
/// The payload can only be replaced together with the filter entries that
/// describe it, and `Length` always follows the payload.
#[derive(Clone, Debug, PartialEq)]
pub struct Stream {
    dictionary: Dictionary,
    data: Bytes,
}

impl Stream {
    /// Create a stream from a dictionary and the payload encoded as the
    /// dictionary's `Filter` entry describes.
    pub fn new(mut dictionary: Dictionary, data: Vec<u8>) -> Self {
        dictionary.insert(Name::from(K_LENGTH), Object::from(data.len()));
        Self {
            dictionary,
            data: data.into(),
        }
    }

    /// Create a stream holding `data` encoded with `filter`.
    pub fn encoded(mut dictionary: Dictionary, data: &[u8], filter: Filter) -> Result<Self, FilterError> {
        let encoded = filter.encode(data)?;
        dictionary.shift_remove(K_DECODE_PARMS);
        dictionary.insert(Name::from(K_FILTER), Object::Name(filter.name()));
        Ok(Self::new(dictionary, encoded))
    }

    pub fn dictionary(&self) -> &Dictionary {
        &self.dictionary
    }

    pub fn dictionary_mut(&mut self) -> &mut Dictionary {
        &mut self.dictionary
    }

    /// The payload as stored in the file.
    pub fn raw_data(&self) -> &[u8] {
        &self.data
    }

    /// The payload with all filters applied.
    pub fn decoded_data(&self) -> Result<Cow<'_, [u8]>, FilterError> {
        filter::decode(&self.dictionary, &self.data)
    }

    /// Whether the stream carries a `Filter` entry.
    pub fn is_filtered(&self) -> bool {
        self.dictionary.get(K_FILTER).map_or(false, |f| !f.is_null())
    }

    /// Replace the payload with unencoded `data`, dropping any filters.
    pub fn set_data(&mut self, data: Vec<u8>) {
        self.dictionary.shift_remove(K_FILTER);
        self.dictionary.shift_remove(K_DECODE_PARMS);
        self.dictionary
            .insert(Name::from(K_LENGTH), Object::from(data.len()));
        self.data = data.into();
    }

    /// Replace the payload with `data` encoded through `filter`.
    pub fn set_encoded(&mut self, data: &[u8], filter: Filter) -> Result<(), FilterError> {
        let encoded = filter.encode(data)?;
        self.set_data(encoded);
        self.dictionary
            .insert(Name::from(K_FILTER), Object::Name(filter.name()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_follows_data() {
        let mut stream = Stream::new(Dictionary::new(), b"12345".to_vec());
        assert_eq!(stream.dictionary().get(K_LENGTH), Some(&Object::Integer(5)));
        stream.set_data(b"12".to_vec());
        assert_eq!(stream.dictionary().get(K_LENGTH), Some(&Object::Integer(2)));
    }

    #[test]
    fn encoded_stream_round_trips() {
        let data = b"BT /F1 12 Tf (hello) Tj ET".repeat(10);
        let stream = Stream::encoded(Dictionary::new(), &data, Filter::Flate).unwrap();
        assert!(stream.is_filtered());
        assert_ne!(stream.raw_data(), &data[..]);
        assert_eq!(&stream.decoded_data().unwrap()[..], &data[..]);
    }

    #[test]
    fn set_data_drops_filters() {
        let mut stream = Stream::encoded(Dictionary::new(), b"abc", Filter::AsciiHex).unwrap();
        stream.set_data(b"xyz".to_vec());
        assert!(!stream.is_filtered());
        assert_eq!(&stream.decoded_data().unwrap()[..], b"xyz");
    }
}
