pub trait Writer {
    fn write(&mut self, buf: &[u8]);

    /// Number of bytes written so far.
    fn position(&self) -> usize;
}

impl Writer for Vec<u8> {
    fn write(&mut self, buf: &[u8]) {
        self.extend_from_slice(buf);
    }

    fn position(&self) -> usize {
        self.len()
    }
}

/// Serializes values of type `T`.
pub trait Encoder<T: ?Sized> {
    fn write_to(&self, obj: &T, writer: &mut dyn Writer);
}

/// Writes to an inner writer while counting from a base offset, for output
/// that is appended to existing bytes.
pub(crate) struct OffsetWriter<'a> {
    base: usize,
    inner: &'a mut Vec<u8>,
}

impl<'a> OffsetWriter<'a> {
    pub fn new(base: usize, inner: &'a mut Vec<u8>) -> Self {
        Self { base, inner }
    }
}

impl Writer for OffsetWriter<'_> {
    fn write(&mut self, buf: &[u8]) {
        self.inner.extend_from_slice(buf);
    }

    fn position(&self) -> usize {
        self.base + self.inner.len()
    }
}
