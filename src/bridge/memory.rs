use crate::foundation::error::{CardError, CardResult};

/// Linear-memory page size.
pub const PAGE_SIZE: usize = 64 * 1024;

/// Default page limit (64 MiB).
pub const DEFAULT_MAX_PAGES: u32 = 1024;

/// Guest linear memory: a flat byte array that only grows, in whole pages.
///
/// Every successful [`LinearMemory::grow`] bumps [`LinearMemory::epoch`]; host views keyed by an
/// older epoch are stale and must be rebuilt before use (see [`MemoryViews`]).
#[derive(Debug)]
pub struct LinearMemory {
    bytes: Vec<u8>,
    max_pages: u32,
    epoch: u64,
}

impl LinearMemory {
    /// Allocate `initial_pages` zeroed pages with a hard limit of `max_pages`.
    pub fn new(initial_pages: u32, max_pages: u32) -> CardResult<Self> {
        if initial_pages == 0 || initial_pages > max_pages {
            return Err(CardError::validation(format!(
                "linear memory needs 1..={max_pages} initial pages, got {initial_pages}"
            )));
        }
        Ok(Self {
            bytes: vec![0; initial_pages as usize * PAGE_SIZE],
            max_pages,
            epoch: 0,
        })
    }

    /// Current size in pages.
    pub fn pages(&self) -> u32 {
        (self.bytes.len() / PAGE_SIZE) as u32
    }

    /// Page limit.
    pub fn max_pages(&self) -> u32 {
        self.max_pages
    }

    /// Current size in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Always `false`; memory has at least one page.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Growth counter.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Grow by `delta` pages. Returns the previous page count, or `None` past the limit.
    pub fn grow(&mut self, delta: u32) -> Option<u32> {
        let old = self.pages();
        let new = old.checked_add(delta)?;
        if new > self.max_pages {
            return None;
        }
        if delta > 0 {
            self.bytes.resize(new as usize * PAGE_SIZE, 0);
            self.epoch += 1;
            tracing::debug!(old_pages = old, new_pages = new, epoch = self.epoch, "linear memory grew");
        }
        Some(old)
    }

    /// Whole memory as a byte slice.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// `len` bytes at `ptr`, or `None` when out of bounds.
    pub fn slice(&self, ptr: u32, len: u32) -> Option<&[u8]> {
        let start = ptr as usize;
        let end = start.checked_add(len as usize)?;
        self.bytes.get(start..end)
    }

    /// Mutable `len` bytes at `ptr`, or `None` when out of bounds.
    pub fn slice_mut(&mut self, ptr: u32, len: u32) -> Option<&mut [u8]> {
        let start = ptr as usize;
        let end = start.checked_add(len as usize)?;
        self.bytes.get_mut(start..end)
    }

    /// Copy `data` to `ptr`.
    pub fn write(&mut self, ptr: u32, data: &[u8]) -> CardResult<()> {
        let len = u32::try_from(data.len())
            .map_err(|_| CardError::trap("write larger than the address space"))?;
        let dst = self
            .slice_mut(ptr, len)
            .ok_or_else(|| out_of_bounds(ptr, len))?;
        dst.copy_from_slice(data);
        Ok(())
    }

    /// Move `len` bytes from `src` to `dst` (ranges may overlap).
    pub fn copy_within(&mut self, src: u32, dst: u32, len: u32) -> CardResult<()> {
        let s = src as usize..src as usize + len as usize;
        if s.end > self.bytes.len() || dst as usize + len as usize > self.bytes.len() {
            return Err(out_of_bounds(src.max(dst), len));
        }
        self.bytes.copy_within(s, dst as usize);
        Ok(())
    }

    /// Little-endian `i32` at `ptr`.
    pub fn read_i32(&self, ptr: u32) -> CardResult<i32> {
        let b = self.slice(ptr, 4).ok_or_else(|| out_of_bounds(ptr, 4))?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Store a little-endian `i32` at `ptr`.
    pub fn write_i32(&mut self, ptr: u32, value: i32) -> CardResult<()> {
        self.write(ptr, &value.to_le_bytes())
    }
}

fn out_of_bounds(ptr: u32, len: u32) -> CardError {
    CardError::trap(format!("memory access out of bounds: {len} bytes at {ptr:#x}"))
}

/// Host-side views over guest memory, cached per memory epoch.
///
/// A view records the byte length it was built for; once the guest grows its memory the cached
/// bounds no longer describe the buffer, so every accessor re-validates the epoch first.
#[derive(Debug, Default)]
pub struct MemoryViews {
    epoch: Option<u64>,
    byte_len: usize,
    rebuilds: u64,
}

impl MemoryViews {
    /// Empty cache; the first access builds the views.
    pub fn new() -> Self {
        Self::default()
    }

    /// How many times the views were (re)built.
    pub fn rebuilds(&self) -> u64 {
        self.rebuilds
    }

    /// Byte view of `mem`.
    pub fn bytes<'m>(&mut self, mem: &'m LinearMemory) -> ByteView<'m> {
        self.refresh(mem);
        ByteView {
            bytes: &mem.as_bytes()[..self.byte_len],
        }
    }

    /// `i32` view of `mem`, indexed in 4-byte units.
    pub fn i32s<'m>(&mut self, mem: &'m LinearMemory) -> I32View<'m> {
        self.refresh(mem);
        I32View {
            bytes: &mem.as_bytes()[..self.byte_len],
        }
    }

    fn refresh(&mut self, mem: &LinearMemory) {
        if self.epoch == Some(mem.epoch()) {
            return;
        }
        self.epoch = Some(mem.epoch());
        self.byte_len = mem.len();
        self.rebuilds += 1;
        tracing::debug!(epoch = mem.epoch(), bytes = self.byte_len, "rebuilt memory views");
    }
}

/// Bounds-checked byte view.
#[derive(Clone, Copy, Debug)]
pub struct ByteView<'m> {
    bytes: &'m [u8],
}

impl<'m> ByteView<'m> {
    /// View length in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// `true` for a zero-length view.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// `len` bytes at `ptr`; out-of-range pointers are a marshalling error.
    pub fn slice(&self, ptr: u32, len: u32) -> CardResult<&'m [u8]> {
        let start = ptr as usize;
        start
            .checked_add(len as usize)
            .and_then(|end| self.bytes.get(start..end))
            .ok_or_else(|| {
                CardError::marshal(format!(
                    "slice {len} bytes at {ptr:#x} exceeds memory of {} bytes",
                    self.bytes.len()
                ))
            })
    }
}

/// Bounds-checked `i32` view.
#[derive(Clone, Copy, Debug)]
pub struct I32View<'m> {
    bytes: &'m [u8],
}

impl I32View<'_> {
    /// Element at `index` (byte offset `index * 4`).
    pub fn get(&self, index: u32) -> CardResult<i32> {
        let start = index as usize * 4;
        let b = self
            .bytes
            .get(start..start + 4)
            .ok_or_else(|| CardError::marshal(format!("i32 index {index} out of range")))?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/bridge/memory.rs"]
mod tests;
