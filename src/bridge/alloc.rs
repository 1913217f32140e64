use std::collections::BTreeMap;

use crate::bridge::memory::{LinearMemory, PAGE_SIZE};
use crate::foundation::error::{CardError, CardResult};

/// Shadow-stack size. The stack occupies `[STACK_FLOOR, STACK_TOP)` and grows down.
pub const STACK_TOP: u32 = PAGE_SIZE as u32;
/// Lowest valid stack address; address 0 stays null.
pub const STACK_FLOOR: u32 = 16;
/// Heap blocks start at this address.
pub const HEAP_BASE: u32 = STACK_TOP;

const ALIGN: u32 = 8;

/// Allocation counters.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AllocStats {
    /// Live allocations.
    pub live_blocks: usize,
    /// Bytes held by live allocations (after rounding).
    pub live_bytes: u64,
    /// Bytes sitting on the free list.
    pub free_bytes: u64,
    /// End of the bump region.
    pub bump: u32,
}

/// Guest allocator over a [`LinearMemory`]: shadow stack below [`HEAP_BASE`], first-fit free list
/// plus bump region above it.
///
/// All blocks are 8-byte aligned and rounded to 8 bytes. Running out of pages is a trap.
#[derive(Debug)]
pub struct GuestAllocator {
    stack_pointer: u32,
    bump: u32,
    /// Free blocks by start address, coalesced.
    free: BTreeMap<u32, u32>,
    /// Live blocks: start address -> rounded size.
    live: BTreeMap<u32, u32>,
}

impl Default for GuestAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl GuestAllocator {
    /// Fresh allocator with an empty stack and heap.
    pub fn new() -> Self {
        Self {
            stack_pointer: STACK_TOP,
            bump: HEAP_BASE,
            free: BTreeMap::new(),
            live: BTreeMap::new(),
        }
    }

    /// Current shadow-stack pointer.
    pub fn stack_pointer(&self) -> u32 {
        self.stack_pointer
    }

    /// Move the stack pointer by `delta` bytes and return the new value.
    pub fn add_to_stack_pointer(&mut self, delta: i32) -> CardResult<u32> {
        let next = i64::from(self.stack_pointer) + i64::from(delta);
        if next < i64::from(STACK_FLOOR) {
            return Err(CardError::trap("shadow stack overflow"));
        }
        if next > i64::from(STACK_TOP) {
            return Err(CardError::trap("shadow stack underflow"));
        }
        self.stack_pointer = next as u32;
        Ok(self.stack_pointer)
    }

    /// Allocate `size` bytes. Zero-sized requests return a dangling, never-dereferenced pointer.
    pub fn malloc(&mut self, mem: &mut LinearMemory, size: u32, align: u32) -> CardResult<u32> {
        check_align(align)?;
        if size == 0 {
            return Ok(align);
        }
        let size = round_up(size)?;

        let fit = self
            .free
            .iter()
            .find(|&(_, &len)| len >= size)
            .map(|(&start, &len)| (start, len));
        if let Some((start, len)) = fit {
            self.free.remove(&start);
            if len > size {
                self.free.insert(start + size, len - size);
            }
            self.live.insert(start, size);
            return Ok(start);
        }

        let start = self.bump;
        let end = start
            .checked_add(size)
            .ok_or_else(|| CardError::trap("out of memory: address space exhausted"))?;
        self.ensure_capacity(mem, end)?;
        self.bump = end;
        self.live.insert(start, size);
        Ok(start)
    }

    /// Resize a block, moving it when it cannot grow in place. Contents up to the smaller size
    /// are preserved.
    pub fn realloc(
        &mut self,
        mem: &mut LinearMemory,
        ptr: u32,
        old_size: u32,
        new_size: u32,
        align: u32,
    ) -> CardResult<u32> {
        check_align(align)?;
        if old_size == 0 {
            return self.malloc(mem, new_size, align);
        }
        let held = self.block_size(ptr, old_size)?;
        if new_size == 0 {
            self.free(ptr, old_size, align)?;
            return Ok(align);
        }
        let wanted = round_up(new_size)?;

        if wanted <= held {
            if held > wanted {
                self.live.insert(ptr, wanted);
                self.release(ptr + wanted, held - wanted);
            }
            return Ok(ptr);
        }

        // Top block: extend the bump region in place.
        if ptr + held == self.bump {
            let end = ptr
                .checked_add(wanted)
                .ok_or_else(|| CardError::trap("out of memory: address space exhausted"))?;
            self.ensure_capacity(mem, end)?;
            self.bump = end;
            self.live.insert(ptr, wanted);
            return Ok(ptr);
        }

        let moved = self.malloc(mem, new_size, align)?;
        mem.copy_within(ptr, moved, old_size.min(new_size))?;
        self.free(ptr, old_size, align)?;
        Ok(moved)
    }

    /// Release a block returned by [`GuestAllocator::malloc`]. Freeing anything else traps.
    pub fn free(&mut self, ptr: u32, size: u32, align: u32) -> CardResult<()> {
        check_align(align)?;
        if size == 0 {
            return Ok(());
        }
        let held = self.block_size(ptr, size)?;
        self.live.remove(&ptr);
        self.release(ptr, held);
        Ok(())
    }

    /// Counters for tests and diagnostics.
    pub fn stats(&self) -> AllocStats {
        AllocStats {
            live_blocks: self.live.len(),
            live_bytes: self.live.values().map(|&n| u64::from(n)).sum(),
            free_bytes: self.free.values().map(|&n| u64::from(n)).sum(),
            bump: self.bump,
        }
    }

    fn block_size(&self, ptr: u32, size: u32) -> CardResult<u32> {
        let held = self
            .live
            .get(&ptr)
            .copied()
            .ok_or_else(|| CardError::trap(format!("free of unallocated pointer {ptr:#x}")))?;
        if round_up(size)? > held {
            return Err(CardError::trap(format!(
                "size {size} exceeds block of {held} bytes at {ptr:#x}"
            )));
        }
        Ok(held)
    }

    /// Put `[start, start + len)` back, coalescing with neighbours and trimming the bump region.
    fn release(&mut self, mut start: u32, mut len: u32) {
        if let Some((&prev, &prev_len)) = self.free.range(..start).next_back()
            && prev + prev_len == start
        {
            self.free.remove(&prev);
            start = prev;
            len += prev_len;
        }
        if let Some(next_len) = self.free.remove(&(start + len)) {
            len += next_len;
        }
        if start + len == self.bump {
            self.bump = start;
        } else {
            self.free.insert(start, len);
        }
    }

    fn ensure_capacity(&mut self, mem: &mut LinearMemory, end: u32) -> CardResult<()> {
        let have = mem.len() as u64;
        let need = u64::from(end);
        if need <= have {
            return Ok(());
        }
        let pages = (need - have).div_ceil(PAGE_SIZE as u64) as u32;
        mem.grow(pages).map(|_| ()).ok_or_else(|| {
            CardError::trap(format!(
                "out of memory: need {pages} more pages, limit is {}",
                mem.max_pages()
            ))
        })
    }
}

fn check_align(align: u32) -> CardResult<()> {
    if align.is_power_of_two() && align <= ALIGN {
        Ok(())
    } else {
        Err(CardError::trap(format!("unsupported alignment {align}")))
    }
}

fn round_up(size: u32) -> CardResult<u32> {
    size.checked_next_multiple_of(ALIGN)
        .ok_or_else(|| CardError::trap("allocation size overflow"))
}

#[cfg(test)]
#[path = "../../tests/unit/bridge/alloc.rs"]
mod tests;
