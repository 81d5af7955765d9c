use std::alloc::{self, Layout};
use std::fmt;
use std::ptr::NonNull;

use crate::constraints::ConstraintSet;
use crate::file::handle::{Handle, MapAccess, Mapping};
use crate::file::sys;
use crate::{Error, Result};

/// Where a [`Buffer`]'s bytes live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferSource {
    Heap,
    Aligned,
    MappedReadOnly,
    MappedWriteOnly,
    MappedReadWrite,
}

impl BufferSource {
    pub fn is_mapped(self) -> bool {
        matches!(
            self,
            BufferSource::MappedReadOnly | BufferSource::MappedWriteOnly | BufferSource::MappedReadWrite
        )
    }
}

/// Zeroed heap memory with a guaranteed alignment.
struct AlignedBytes {
    ptr: NonNull<u8>,
    layout: Layout,
}

impl AlignedBytes {
    fn zeroed(size: usize, align: usize) -> Result<Self> {
        let layout = Layout::from_size_align(size, align)
            .map_err(|_| Error::InvalidArgument("alignment must be a power of two"))?;
        if layout.size() == 0 {
            return Err(Error::InvalidArgument("buffer size must be non-zero"));
        }
        // SAFETY: layout has non-zero size.
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let ptr = NonNull::new(raw).unwrap_or_else(|| alloc::handle_alloc_error(layout));
        Ok(Self { ptr, layout })
    }

    fn as_slice(&self) -> &[u8] {
        // SAFETY: ptr owns layout.size() initialised bytes.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.layout.size()) }
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: as above, and &mut self guarantees exclusivity.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.layout.size()) }
    }
}

impl Drop for AlignedBytes {
    fn drop(&mut self) {
        // SAFETY: allocated in `zeroed` with this layout.
        unsafe { alloc::dealloc(self.ptr.as_ptr(), self.layout) }
    }
}

// SAFETY: AlignedBytes uniquely owns its allocation.
unsafe impl Send for AlignedBytes {}

enum Storage<'h> {
    Heap(Vec<u8>),
    Aligned(AlignedBytes),
    Mapped { mapping: &'h Mapping, offset: usize },
}

/// A contiguous byte region used for transfers.
///
/// Allocated buffers own their memory. Mapped buffers borrow the mapping of
/// the [`Handle`] they were allocated from and expose the bytes from their
/// offset to the end of the mapping.
pub struct Buffer<'h> {
    storage: Storage<'h>,
}

impl Buffer<'static> {
    /// Allocates a zeroed buffer shaped by `constraints`.
    ///
    /// The size is `min_size`, or the page size when there is no lower bound
    /// (rounded to `multiple_of` and capped at `max_size`). Memory is aligned
    /// iff `align_to` is set.
    pub fn allocate(constraints: &ConstraintSet) -> Result<Self> {
        let size = allocation_size(constraints)?;
        Ok(Self {
            storage: make_storage(size, constraints.align_to())?,
        })
    }
}

impl<'h> Buffer<'h> {
    /// A view of `mapping`, holding its lease until dropped.
    pub(crate) fn mapped(mapping: &'h Mapping) -> Result<Self> {
        mapping.lease()?;
        Ok(Self {
            storage: Storage::Mapped { mapping, offset: 0 },
        })
    }

    pub fn source(&self) -> BufferSource {
        match &self.storage {
            Storage::Heap(_) => BufferSource::Heap,
            Storage::Aligned(_) => BufferSource::Aligned,
            Storage::Mapped { mapping, .. } => match mapping.access() {
                MapAccess::ReadOnly => BufferSource::MappedReadOnly,
                MapAccess::WriteOnly => BufferSource::MappedWriteOnly,
                MapAccess::ReadWrite => BufferSource::MappedReadWrite,
            },
        }
    }

    pub fn is_mapped(&self) -> bool {
        matches!(self.storage, Storage::Mapped { .. })
    }

    pub fn readable(&self) -> bool {
        self.source() != BufferSource::MappedWriteOnly
    }

    pub fn writable(&self) -> bool {
        self.source() != BufferSource::MappedReadOnly
    }

    /// Usable bytes; for mapped buffers `mapped_len - offset`.
    pub fn size(&self) -> usize {
        match &self.storage {
            Storage::Heap(bytes) => bytes.len(),
            Storage::Aligned(bytes) => bytes.layout.size(),
            Storage::Mapped { mapping, offset } => mapping.len() - offset,
        }
    }

    /// Offset into the mapping; always 0 for allocated buffers.
    pub fn offset(&self) -> usize {
        match &self.storage {
            Storage::Mapped { offset, .. } => *offset,
            _ => 0,
        }
    }

    /// Moves a mapped buffer's window to start at `offset`.
    pub fn set_offset(&mut self, new_offset: usize) -> Result<()> {
        match &mut self.storage {
            Storage::Mapped { mapping, offset } => {
                if new_offset > mapping.len() {
                    return Err(Error::OutOfBounds("offset past end of mapping"));
                }
                *offset = new_offset;
                Ok(())
            }
            _ => Err(Error::Unsupported("only mapped buffers have an offset")),
        }
    }

    /// Reallocates an owned buffer for `constraints`, keeping the common
    /// prefix of the old contents.
    pub fn resize(&mut self, constraints: &ConstraintSet) -> Result<()> {
        if self.is_mapped() {
            return Err(Error::Unsupported("mapped buffers cannot be resized"));
        }
        let size = allocation_size(constraints)?;
        let mut storage = make_storage(size, constraints.align_to())?;
        let old = self.as_slice();
        let keep = old.len().min(size);
        match &mut storage {
            Storage::Heap(bytes) => bytes[..keep].copy_from_slice(&old[..keep]),
            Storage::Aligned(bytes) => bytes.as_mut_slice()[..keep].copy_from_slice(&old[..keep]),
            Storage::Mapped { .. } => {}
        }
        self.storage = storage;
        Ok(())
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.as_slice().as_ptr()
    }

    pub fn as_slice(&self) -> &[u8] {
        match &self.storage {
            Storage::Heap(bytes) => bytes,
            Storage::Aligned(bytes) => bytes.as_slice(),
            Storage::Mapped { mapping, offset } => &mapping.as_slice()[*offset..],
        }
    }

    /// # Errors
    ///
    /// Returns [`Error::ReadOnlyBuffer`] for buffers over a read-only mapping.
    pub fn as_mut_slice(&mut self) -> Result<&mut [u8]> {
        match &mut self.storage {
            Storage::Heap(bytes) => Ok(bytes.as_mut_slice()),
            Storage::Aligned(bytes) => Ok(bytes.as_mut_slice()),
            // SAFETY: this buffer holds the mapping's lease and `&mut self` is
            // the only window it hands out.
            Storage::Mapped { mapping, offset } => unsafe { mapping.tail_mut(*offset) },
        }
    }

    /// True if this buffer is a view of `handle`'s mapping.
    pub fn aliases(&self, handle: &Handle) -> bool {
        match (&self.storage, handle.mapping()) {
            (Storage::Mapped { mapping, .. }, Some(theirs)) => std::ptr::eq(mapping.base(), theirs.base()),
            _ => false,
        }
    }
}

impl Drop for Buffer<'_> {
    fn drop(&mut self) {
        if let Storage::Mapped { mapping, .. } = &self.storage {
            mapping.release();
        }
    }
}

impl fmt::Debug for Buffer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("source", &self.source())
            .field("size", &self.size())
            .field("offset", &self.offset())
            .finish()
    }
}

fn allocation_size(constraints: &ConstraintSet) -> Result<usize> {
    if let Some(size) = constraints.min_size() {
        return Ok(size);
    }
    let mut size = sys::page_size();
    if let Some(k) = constraints.multiple_of() {
        size = size
            .div_ceil(k)
            .checked_mul(k)
            .ok_or(Error::InvalidArgument("buffer size overflow"))?;
    }
    if let Some(max) = constraints.max_size() {
        size = size.min(max);
    }
    if size == 0 {
        return Err(Error::InvalidArgument("buffer size must be non-zero"));
    }
    Ok(size)
}

fn make_storage(size: usize, align: Option<usize>) -> Result<Storage<'static>> {
    Ok(match align {
        Some(align) => Storage::Aligned(AlignedBytes::zeroed(size, align)?),
        None => Storage::Heap(vec![0u8; size]),
    })
}
