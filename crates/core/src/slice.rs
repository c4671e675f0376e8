//! Byte-range views and owned buffers
//!
//! `Slice` is a borrowed view over a contiguous byte range. It has a
//! canonical null value (`Slice::NULL`) that is distinct from a
//! zero-length slice that points at real (empty) storage. Equality and
//! hashing are by content, with null only equal to null.
//!
//! `OwnedBuffer` is the owning variant. Its backing storage is reference
//! counted, so clones are cheap and the bytes are released exactly once,
//! when the last holder lets go. `release()` turns a buffer into the
//! null buffer and is a no-op on a buffer that is already null.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

/// Borrowed, possibly-null view over a byte range
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Slice<'a>(Option<&'a [u8]>);

impl<'a> Slice<'a> {
    /// The null slice
    pub const NULL: Slice<'static> = Slice(None);

    /// Create a slice viewing `bytes`
    #[inline]
    pub const fn new(bytes: &'a [u8]) -> Self {
        Slice(Some(bytes))
    }

    /// Create the null slice
    #[inline]
    pub const fn null() -> Self {
        Slice(None)
    }

    /// True for the null slice only
    #[inline]
    pub fn is_null(&self) -> bool {
        self.0.is_none()
    }

    /// True for the null slice and for zero-length slices
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of bytes viewed (0 for null)
    #[inline]
    pub fn len(&self) -> usize {
        self.0.map_or(0, <[u8]>::len)
    }

    /// The viewed bytes; null views as an empty slice
    #[inline]
    pub fn as_bytes(&self) -> &'a [u8] {
        self.0.unwrap_or(&[])
    }

    /// The viewed bytes, or `None` for null
    #[inline]
    pub fn as_option(&self) -> Option<&'a [u8]> {
        self.0
    }

    /// Copy into a caller-owned buffer
    ///
    /// Safe to call any number of times; null copies to the null buffer.
    pub fn to_owned_buffer(&self) -> OwnedBuffer {
        match self.0 {
            Some(bytes) => OwnedBuffer::copy_from(bytes),
            None => OwnedBuffer::null(),
        }
    }

    /// Lossy UTF-8 rendering, mostly for diagnostics
    pub fn to_string_lossy(&self) -> Cow<'a, str> {
        String::from_utf8_lossy(self.as_bytes())
    }
}

impl fmt::Debug for Slice<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            None => write!(f, "Slice(null)"),
            Some(bytes) => write!(f, "Slice({:?})", String::from_utf8_lossy(bytes)),
        }
    }
}

impl AsRef<[u8]> for Slice<'_> {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl<'a> From<&'a [u8]> for Slice<'a> {
    fn from(bytes: &'a [u8]) -> Self {
        Slice::new(bytes)
    }
}

impl<'a, const N: usize> From<&'a [u8; N]> for Slice<'a> {
    fn from(bytes: &'a [u8; N]) -> Self {
        Slice::new(bytes)
    }
}

impl<'a> From<&'a str> for Slice<'a> {
    fn from(s: &'a str) -> Self {
        Slice::new(s.as_bytes())
    }
}

impl<'a> From<&'a Vec<u8>> for Slice<'a> {
    fn from(bytes: &'a Vec<u8>) -> Self {
        Slice::new(bytes)
    }
}

impl<'a> From<Option<&'a [u8]>> for Slice<'a> {
    fn from(bytes: Option<&'a [u8]>) -> Self {
        Slice(bytes)
    }
}

impl<'a> From<&'a OwnedBuffer> for Slice<'a> {
    fn from(buf: &'a OwnedBuffer) -> Self {
        buf.as_slice()
    }
}

impl PartialEq<[u8]> for Slice<'_> {
    fn eq(&self, other: &[u8]) -> bool {
        self.0 == Some(other)
    }
}

impl PartialEq<&str> for Slice<'_> {
    fn eq(&self, other: &&str) -> bool {
        self.0 == Some(other.as_bytes())
    }
}

/// Owned, reference-counted, possibly-null byte buffer
#[derive(Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OwnedBuffer(Option<Arc<[u8]>>);

impl OwnedBuffer {
    /// Take ownership of `bytes`
    pub fn new(bytes: Vec<u8>) -> Self {
        OwnedBuffer(Some(Arc::from(bytes)))
    }

    /// Copy `bytes` into a new buffer
    pub fn copy_from(bytes: &[u8]) -> Self {
        OwnedBuffer(Some(Arc::from(bytes)))
    }

    /// The null buffer
    #[inline]
    pub const fn null() -> Self {
        OwnedBuffer(None)
    }

    /// True for the null buffer only
    #[inline]
    pub fn is_null(&self) -> bool {
        self.0.is_none()
    }

    /// True for the null buffer and for zero-length buffers
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of bytes held (0 for null)
    #[inline]
    pub fn len(&self) -> usize {
        self.0.as_ref().map_or(0, |b| b.len())
    }

    /// Borrow as a slice (null stays null)
    #[inline]
    pub fn as_slice(&self) -> Slice<'_> {
        Slice(self.0.as_deref())
    }

    /// Borrow the bytes; null reads as empty
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_deref().unwrap_or(&[])
    }

    /// Release this holder's reference to the backing storage
    ///
    /// Afterwards the buffer is null. Returns false if it was already null.
    pub fn release(&mut self) -> bool {
        self.0.take().is_some()
    }

    /// Copy out into a `Vec`
    pub fn to_vec(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }
}

impl fmt::Debug for OwnedBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            None => write!(f, "OwnedBuffer(null)"),
            Some(bytes) => write!(f, "OwnedBuffer({:?})", String::from_utf8_lossy(bytes)),
        }
    }
}

impl AsRef<[u8]> for OwnedBuffer {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl From<Vec<u8>> for OwnedBuffer {
    fn from(bytes: Vec<u8>) -> Self {
        OwnedBuffer::new(bytes)
    }
}

impl From<&[u8]> for OwnedBuffer {
    fn from(bytes: &[u8]) -> Self {
        OwnedBuffer::copy_from(bytes)
    }
}

impl From<&str> for OwnedBuffer {
    fn from(s: &str) -> Self {
        OwnedBuffer::copy_from(s.as_bytes())
    }
}

impl From<String> for OwnedBuffer {
    fn from(s: String) -> Self {
        OwnedBuffer::new(s.into_bytes())
    }
}

impl From<Slice<'_>> for OwnedBuffer {
    fn from(slice: Slice<'_>) -> Self {
        slice.to_owned_buffer()
    }
}

impl PartialEq<Slice<'_>> for OwnedBuffer {
    fn eq(&self, other: &Slice<'_>) -> bool {
        self.as_slice() == *other
    }
}

impl PartialEq<OwnedBuffer> for Slice<'_> {
    fn eq(&self, other: &OwnedBuffer) -> bool {
        *self == other.as_slice()
    }
}

impl PartialEq<[u8]> for OwnedBuffer {
    fn eq(&self, other: &[u8]) -> bool {
        self.as_slice() == *other
    }
}

impl PartialEq<str> for OwnedBuffer {
    fn eq(&self, other: &str) -> bool {
        self.0.as_deref() == Some(other.as_bytes())
    }
}

impl PartialEq<&str> for OwnedBuffer {
    fn eq(&self, other: &&str) -> bool {
        self.as_slice() == *other
    }
}
