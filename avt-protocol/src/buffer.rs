//! Reference-counted payload buffers
//!
//! Payloads travel from the application down to the I/O write call without
//! being copied. A [`Buffer`] is a shared, read-only view `(offset, len)` into a
//! reference-counted allocation; cloning it or taking a [`Buffer::view`] only
//! bumps the reference count. The allocation is released when the last view is
//! dropped.
//!
//! Growing an allocation is only possible through a sole owner: either the
//! exclusive [`BufferMut`] type, or [`Buffer::grow`] which checks at runtime
//! that no other view exists.

use crate::error::ErrorKind;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use thiserror::Error;

/// Buffer errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
    #[error("Allocation of {0} bytes failed")]
    OutOfMemory(usize),

    #[error("View out of range: offset {offset} + length {len} exceeds {available} bytes")]
    OutOfRange {
        offset: usize,
        len: usize,
        available: usize,
    },

    #[error("Buffer is shared by {refs} references")]
    Shared { refs: usize },
}

impl BufferError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BufferError::OutOfMemory(_) => ErrorKind::OutOfMemory,
            BufferError::OutOfRange { .. } => ErrorKind::InvalidArgument,
            BufferError::Shared { .. } => ErrorKind::InvalidState,
        }
    }
}

type FreeFn = Box<dyn FnOnce() + Send + Sync>;

/// Backing allocation
struct Storage {
    data: Vec<u8>,
    on_free: Option<FreeFn>,
}

impl Storage {
    fn new(data: Vec<u8>) -> Self {
        Storage {
            data,
            on_free: None,
        }
    }

    fn resize(&mut self, new_len: usize) -> Result<(), BufferError> {
        if new_len > self.data.len() {
            self.data
                .try_reserve_exact(new_len - self.data.len())
                .map_err(|_| BufferError::OutOfMemory(new_len))?;
        }
        self.data.resize(new_len, 0);
        Ok(())
    }
}

impl Drop for Storage {
    fn drop(&mut self) {
        if let Some(on_free) = self.on_free.take() {
            on_free();
        }
    }
}

fn zeroed(len: usize) -> Result<Vec<u8>, BufferError> {
    let mut data = Vec::new();
    data.try_reserve_exact(len)
        .map_err(|_| BufferError::OutOfMemory(len))?;
    data.resize(len, 0);
    Ok(data)
}

/// Exclusively owned, growable buffer
///
/// Produced by allocation; turned into a shareable [`Buffer`] with
/// [`BufferMut::freeze`].
pub struct BufferMut {
    storage: Storage,
}

impl BufferMut {
    /// Allocate a zero-filled buffer of `len` bytes
    pub fn alloc(len: usize) -> Result<Self, BufferError> {
        Ok(BufferMut {
            storage: Storage::new(zeroed(len)?),
        })
    }

    /// Empty buffer with room for `capacity` bytes
    pub fn with_capacity(capacity: usize) -> Result<Self, BufferError> {
        let mut data = Vec::new();
        data.try_reserve_exact(capacity)
            .map_err(|_| BufferError::OutOfMemory(capacity))?;
        Ok(BufferMut {
            storage: Storage::new(data),
        })
    }

    /// Take ownership of existing bytes
    pub fn from_vec(data: Vec<u8>) -> Self {
        BufferMut {
            storage: Storage::new(data),
        }
    }

    /// Current length in bytes
    #[inline]
    pub fn len(&self) -> usize {
        self.storage.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.storage.data.is_empty()
    }

    /// Resize to `new_len` bytes, zero-filling any new tail
    pub fn grow(&mut self, new_len: usize) -> Result<(), BufferError> {
        self.storage.resize(new_len)
    }

    /// Append bytes at the end
    pub fn extend_from_slice(&mut self, bytes: &[u8]) -> Result<(), BufferError> {
        let data = &mut self.storage.data;
        data.try_reserve(bytes.len())
            .map_err(|_| BufferError::OutOfMemory(data.len() + bytes.len()))?;
        data.extend_from_slice(bytes);
        Ok(())
    }

    /// Shorten to `len` bytes; no-op if already shorter
    pub fn truncate(&mut self, len: usize) {
        self.storage.data.truncate(len);
    }

    /// Convert into a shared, read-only buffer
    pub fn freeze(self) -> Buffer {
        let len = self.storage.data.len();
        Buffer {
            storage: Arc::new(self.storage),
            offset: 0,
            len,
        }
    }
}

impl Deref for BufferMut {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.storage.data
    }
}

impl DerefMut for BufferMut {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.storage.data
    }
}

impl fmt::Debug for BufferMut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferMut").field("len", &self.len()).finish()
    }
}

/// Shared view into a reference-counted allocation
///
/// `Clone` takes another reference to the same bytes; no data is copied.
#[derive(Clone)]
pub struct Buffer {
    storage: Arc<Storage>,
    offset: usize,
    len: usize,
}

impl Buffer {
    /// Wrap existing bytes
    pub fn from_vec(data: Vec<u8>) -> Self {
        BufferMut::from_vec(data).freeze()
    }

    /// Copy `bytes` into a new allocation
    pub fn copy_from_slice(bytes: &[u8]) -> Self {
        Buffer::from_vec(bytes.to_vec())
    }

    /// Wrap existing bytes and run `on_free` once the last reference is gone
    pub fn with_free_callback<F>(data: Vec<u8>, on_free: F) -> Self
    where
        F: FnOnce() + Send + Sync + 'static,
    {
        let len = data.len();
        Buffer {
            storage: Arc::new(Storage {
                data,
                on_free: Some(Box::new(on_free)),
            }),
            offset: 0,
            len,
        }
    }

    /// Zero-copy view of `len` bytes starting `offset` bytes into this view
    pub fn view(&self, offset: usize, len: usize) -> Result<Buffer, BufferError> {
        match offset.checked_add(len) {
            Some(end) if end <= self.len => Ok(Buffer {
                storage: Arc::clone(&self.storage),
                offset: self.offset + offset,
                len,
            }),
            _ => Err(BufferError::OutOfRange {
                offset,
                len,
                available: self.len,
            }),
        }
    }

    /// Length of this view in bytes
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Offset of this view into its backing allocation
    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Number of live references to the backing allocation
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.storage)
    }

    /// Whether this is the only reference to the backing allocation
    pub fn is_unique(&self) -> bool {
        self.ref_count() == 1
    }

    /// Whether both views share one backing allocation
    pub fn shares_storage(&self, other: &Buffer) -> bool {
        Arc::ptr_eq(&self.storage, &other.storage)
    }

    /// The bytes of this view
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.storage.data[self.offset..self.offset + self.len]
    }

    /// Mutable access to the bytes of this view; requires sole ownership
    pub fn as_mut_slice(&mut self) -> Result<&mut [u8], BufferError> {
        let refs = self.ref_count();
        let (offset, len) = (self.offset, self.len);
        match Arc::get_mut(&mut self.storage) {
            Some(storage) => Ok(&mut storage.data[offset..offset + len]),
            None => Err(BufferError::Shared { refs }),
        }
    }

    /// Resize this view to `new_len` bytes, reallocating the backing storage
    ///
    /// Only the sole owner may grow: any other live view would be left
    /// pointing into a reallocated region.
    pub fn grow(&mut self, new_len: usize) -> Result<(), BufferError> {
        let refs = self.ref_count();
        let offset = self.offset;
        let storage = Arc::get_mut(&mut self.storage).ok_or(BufferError::Shared { refs })?;
        let required = offset
            .checked_add(new_len)
            .ok_or(BufferError::OutOfMemory(usize::MAX))?;
        storage.resize(required)?;
        self.len = new_len;
        Ok(())
    }

    /// Recover exclusive ownership, if this is the only reference
    ///
    /// Bytes outside this view are discarded.
    pub fn try_into_mut(self) -> Result<BufferMut, Buffer> {
        let Buffer {
            storage,
            offset,
            len,
        } = self;
        match Arc::try_unwrap(storage) {
            Ok(mut storage) => {
                storage.data.truncate(offset + len);
                storage.data.drain(..offset);
                Ok(BufferMut { storage })
            }
            Err(storage) => Err(Buffer {
                storage,
                offset,
                len,
            }),
        }
    }

    /// Copy the bytes of this view into a new vector
    pub fn to_vec(&self) -> Vec<u8> {
        self.as_slice().to_vec()
    }
}

impl Deref for Buffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl AsRef<[u8]> for Buffer {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl PartialEq for Buffer {
    fn eq(&self, other: &Buffer) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl Eq for Buffer {}

impl From<Vec<u8>> for Buffer {
    fn from(data: Vec<u8>) -> Self {
        Buffer::from_vec(data)
    }
}

impl From<&[u8]> for Buffer {
    fn from(bytes: &[u8]) -> Self {
        Buffer::copy_from_slice(bytes)
    }
}

impl From<BufferMut> for Buffer {
    fn from(buf: BufferMut) -> Self {
        buf.freeze()
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("offset", &self.offset)
            .field("len", &self.len)
            .field("refs", &self.ref_count())
            .finish()
    }
}
