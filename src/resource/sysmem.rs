// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
CPU-side byte storage for a resource.

[Sysmem] is the cache in RAM that a GPU resource is uploaded from.  It knows nothing about
pages or dirtiness; it just owns bytes and bumps a stamp every time they change, so
copies elsewhere can tell whether they are in sync.
*/

/// Monotonic version of a [Sysmem]'s contents.
pub type Stamp = u64;

#[derive(Debug, Clone, Default)]
pub struct Sysmem {
    data: Vec<u8>,
    stamp: Stamp,
}

impl Sysmem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data(bytes: &[u8]) -> Self {
        Sysmem {
            data: bytes.to_vec(),
            stamp: 1,
        }
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn stamp(&self) -> Stamp {
        self.stamp
    }

    pub fn is_available(&self) -> bool {
        !self.data.is_empty()
    }

    pub fn read_data(&self) -> &[u8] {
        &self.data
    }

    /**
    Mutable access to the bytes.

    Counts as a mutation: the stamp moves even if the caller writes nothing.
    */
    pub fn edit_data(&mut self) -> &mut [u8] {
        self.stamp += 1;
        &mut self.data
    }

    /**
    Allocates `size` bytes, discarding the previous content.

    Returns the allocated size.  Nothing happens if the size already matches.
    */
    pub fn allocate(&mut self, size: usize) -> usize {
        if size == self.data.len() {
            return size;
        }
        self.data = vec![0; size];
        self.stamp += 1;
        size
    }

    /**
    Resizes, keeping the bytes in `[0, min(old, new))`.
    */
    pub fn resize(&mut self, size: usize) -> usize {
        if size == self.data.len() {
            return size;
        }
        self.data.resize(size, 0);
        self.stamp += 1;
        size
    }

    /// Allocates for `bytes.len()` then copies everything.
    pub fn set_data(&mut self, bytes: &[u8]) -> usize {
        if bytes.len() != self.data.len() {
            self.data = bytes.to_vec();
        } else {
            self.data.copy_from_slice(bytes);
        }
        self.stamp += 1;
        self.data.len()
    }

    /**
    Copies `bytes` at `offset` without allocating.

    Returns 0 and leaves the data untouched if the write does not fit.
    */
    pub fn set_sub_data(&mut self, offset: usize, bytes: &[u8]) -> usize {
        let Some(end) = offset.checked_add(bytes.len()) else {
            return 0;
        };
        if bytes.is_empty() || end > self.data.len() {
            return 0;
        }
        self.data[offset..end].copy_from_slice(bytes);
        self.stamp += 1;
        bytes.len()
    }

    /// Grows by `bytes.len()` and copies to the tail.  Returns the number of bytes copied.
    pub fn append(&mut self, bytes: &[u8]) -> usize {
        if bytes.is_empty() {
            return 0;
        }
        self.data.extend_from_slice(bytes);
        self.stamp += 1;
        bytes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::Sysmem;

    #[test]
    fn resize_keeps_prefix() {
        let mut s = Sysmem::with_data(&[1, 2, 3, 4]);
        assert_eq!(s.resize(2), 2);
        assert_eq!(s.read_data(), &[1, 2]);
        assert_eq!(s.resize(4), 4);
        assert_eq!(s.read_data(), &[1, 2, 0, 0]);
    }

    #[test]
    fn sub_data_out_of_range_is_rejected() {
        let mut s = Sysmem::with_data(&[0; 8]);
        let stamp = s.stamp();
        assert_eq!(s.set_sub_data(6, &[9, 9, 9]), 0);
        assert_eq!(s.set_sub_data(usize::MAX, &[1]), 0);
        assert_eq!(s.stamp(), stamp);
        assert_eq!(s.set_sub_data(5, &[9, 9, 9]), 3);
        assert_eq!(&s.read_data()[5..], &[9, 9, 9]);
        assert!(s.stamp() > stamp);
    }

    #[test]
    fn allocate_same_size_is_noop() {
        let mut s = Sysmem::with_data(&[7; 4]);
        let stamp = s.stamp();
        s.allocate(4);
        assert_eq!(s.stamp(), stamp);
        assert_eq!(s.read_data(), &[7; 4]);
    }
}
