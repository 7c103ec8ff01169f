// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Paged buffer with dirty tracking.

Large camera, object and draw-info buffers are rewritten every frame, but usually only a
few pages actually change.  [Buffer] records which pages were touched since the last
transfer so a backend can upload just those ranges instead of the whole buffer.

# Dirty tracking

Every page overlapping a write is marked dirty.  [Buffer::next_dirty_range] walks forward
from a cursor, returns the next contiguous run of dirty pages and clears them: the caller
is expected to transfer the range immediately.

```
use present_pipeline::resource::Buffer;

let mut buffer = Buffer::with_page_size(16);
buffer.resize(64);
//drain the initial allocation
while buffer.next_dirty_range(&mut 0).is_some() {}

buffer.set_sub_data(20, &[1, 2, 3, 4]);
let mut cursor = 0;
let range = buffer.next_dirty_range(&mut cursor).unwrap();
assert_eq!((range.offset, range.size), (16, 16));
assert!(buffer.next_dirty_range(&mut cursor).is_none());
```
*/

use crate::resource::sysmem::{Stamp, Sysmem};
use crate::resource::{BufferId, DEFAULT_PAGE_SIZE};
use bytemuck::Pod;

/// A byte range that needs to be transferred to the GPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DirtyRange {
    pub offset: usize,
    pub size: usize,
}

impl DirtyRange {
    pub fn end(&self) -> usize {
        self.offset + self.size
    }
}

#[derive(Debug)]
pub struct Buffer {
    id: BufferId,
    sysmem: Sysmem,
    page_size: usize,
    pages: Vec<bool>,
}

impl Default for Buffer {
    fn default() -> Self {
        Self::new()
    }
}

impl Buffer {
    pub fn new() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }

    /**
    Creates an empty buffer that tracks dirtiness in pages of `page_size` bytes.

    # Panics
    Panics if `page_size` is 0.
    */
    pub fn with_page_size(page_size: usize) -> Self {
        assert!(page_size > 0, "Buffer page size must be nonzero");
        Buffer {
            id: BufferId::next(),
            sysmem: Sysmem::new(),
            page_size,
            pages: Vec::new(),
        }
    }

    /// Creates a buffer holding `bytes`, all of them dirty.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut buffer = Self::new();
        buffer.set_data(bytes);
        buffer
    }

    /// Identity used by backend-side mirrors to look this buffer up.
    pub fn id(&self) -> BufferId {
        self.id
    }

    pub fn size(&self) -> usize {
        self.sysmem.size()
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn stamp(&self) -> Stamp {
        self.sysmem.stamp()
    }

    pub fn data(&self) -> &[u8] {
        self.sysmem.read_data()
    }

    pub fn sysmem(&self) -> &Sysmem {
        &self.sysmem
    }

    pub fn is_dirty(&self) -> bool {
        self.pages.iter().any(|dirty| *dirty)
    }

    pub fn dirty_page_count(&self) -> usize {
        self.pages.iter().filter(|dirty| **dirty).count()
    }

    fn required_page_count(&self, size: usize) -> usize {
        size.div_ceil(self.page_size)
    }

    fn mark_dirty(&mut self, offset: usize, size: usize) {
        if size == 0 {
            return;
        }
        let first = offset / self.page_size;
        let last = (offset + size - 1) / self.page_size;
        for page in &mut self.pages[first..=last] {
            *page = true;
        }
    }

    /**
    Resizes the buffer, keeping `[0, min(old, new))`.

    Newly exposed bytes are zeroed and their pages marked dirty.  Returns the new size.
    */
    pub fn resize(&mut self, size: usize) -> usize {
        let old = self.sysmem.size();
        if old == size {
            return size;
        }
        self.sysmem.resize(size);
        self.pages.resize(self.required_page_count(size), false);
        if size > old {
            self.mark_dirty(old, size - old);
        }
        size
    }

    /// Reallocates to `bytes.len()` and copies; the whole buffer becomes dirty.
    pub fn set_data(&mut self, bytes: &[u8]) -> usize {
        let size = self.sysmem.set_data(bytes);
        self.pages.clear();
        self.pages.resize(self.required_page_count(size), true);
        size
    }

    /**
    Copies `bytes` at `offset` and marks the touched pages dirty.

    Returns 0 without changing anything if the write does not fit the current allocation.
    */
    pub fn set_sub_data(&mut self, offset: usize, bytes: &[u8]) -> usize {
        let written = self.sysmem.set_sub_data(offset, bytes);
        if written > 0 {
            self.mark_dirty(offset, written);
        }
        written
    }

    /// Writes `value` as element `index` of an array of `T`.
    pub fn set_sub_data_at<T: Pod>(&mut self, index: usize, value: &T) -> usize {
        let Some(offset) = index.checked_mul(std::mem::size_of::<T>()) else {
            return 0;
        };
        self.set_sub_data(offset, bytemuck::bytes_of(value))
    }

    /// Writes `values` starting at element `index` of an array of `T`.
    pub fn set_sub_data_slice<T: Pod>(&mut self, index: usize, values: &[T]) -> usize {
        if values.is_empty() {
            return 0;
        }
        let Some(offset) = index.checked_mul(std::mem::size_of::<T>()) else {
            return 0;
        };
        self.set_sub_data(offset, bytemuck::cast_slice(values))
    }

    /// Extends the buffer by `bytes.len()` and copies to the tail.  Returns bytes written.
    pub fn append(&mut self, bytes: &[u8]) -> usize {
        let old = self.sysmem.size();
        let written = self.sysmem.append(bytes);
        if written > 0 {
            self.pages
                .resize(self.required_page_count(self.sysmem.size()), false);
            self.mark_dirty(old, written);
        }
        written
    }

    pub fn append_value<T: Pod>(&mut self, value: &T) -> usize {
        self.append(bytemuck::bytes_of(value))
    }

    pub fn append_slice<T: Pod>(&mut self, values: &[T]) -> usize {
        self.append(bytemuck::cast_slice(values))
    }

    /// Reads element `index` of an array of `T`, if it lies inside the buffer.
    pub fn read<T: Pod>(&self, index: usize) -> Option<T> {
        let size = std::mem::size_of::<T>();
        let offset = index.checked_mul(size)?;
        let bytes = self.data().get(offset..offset.checked_add(size)?)?;
        Some(bytemuck::pod_read_unaligned(bytes))
    }

    /**
    Returns the next run of dirty pages at or after page `cursor`, clearing them.

    `cursor` is a page index and is advanced past the returned run.  The offset is page
    aligned; the size is clamped to the end of the data.
    */
    pub fn next_dirty_range(&mut self, cursor: &mut usize) -> Option<DirtyRange> {
        let page_count = self.pages.len();
        while *cursor < page_count && !self.pages[*cursor] {
            *cursor += 1;
        }
        if *cursor >= page_count {
            return None;
        }
        let offset = *cursor * self.page_size;
        while *cursor < page_count && self.pages[*cursor] {
            self.pages[*cursor] = false;
            *cursor += 1;
        }
        let end = (*cursor * self.page_size).min(self.sysmem.size());
        Some(DirtyRange {
            offset,
            size: end - offset,
        })
    }

    /// Drains every dirty range in page order.
    pub fn dirty_ranges(&mut self) -> DirtyRanges<'_> {
        DirtyRanges {
            buffer: self,
            cursor: 0,
        }
    }
}

/// Iterator returned by [Buffer::dirty_ranges].
#[derive(Debug)]
pub struct DirtyRanges<'a> {
    buffer: &'a mut Buffer,
    cursor: usize,
}

impl Iterator for DirtyRanges<'_> {
    type Item = DirtyRange;

    fn next(&mut self) -> Option<Self::Item> {
        self.buffer.next_dirty_range(&mut self.cursor)
    }
}
