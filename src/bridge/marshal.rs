use std::io;

use crate::bridge::guest::GuestExports;
use crate::bridge::memory::{LinearMemory, MemoryViews};
use crate::foundation::error::{CardError, CardResult};

/// Size of the result slot fallible exports write into.
pub const SCRATCH_BYTES: i32 = 16;

/// Copy `s` into a single guest allocation of exactly its UTF-8 length.
pub fn pass_str(guest: &mut dyn GuestExports, s: &str) -> CardResult<(u32, u32)> {
    pass_bytes(guest, s.as_bytes())
}

/// Copy `bytes` into a single guest allocation.
pub fn pass_bytes(guest: &mut dyn GuestExports, bytes: &[u8]) -> CardResult<(u32, u32)> {
    let len = u32::try_from(bytes.len())
        .map_err(|_| CardError::marshal(format!("{} bytes exceed guest memory", bytes.len())))?;
    let ptr = guest.malloc(len, 1)?;
    if let Err(e) = guest.memory_mut().write(ptr, bytes) {
        let _ = guest.free(ptr, len, 1);
        return Err(e);
    }
    Ok((ptr, len))
}

/// Serialize `value` as JSON straight into guest memory.
pub fn pass_json<T: serde::Serialize>(
    guest: &mut dyn GuestExports,
    value: &T,
    hint: usize,
) -> CardResult<(u32, u32)> {
    let mut writer = GuestWriter::new(guest, hint)?;
    let res = serde_json::to_writer(&mut writer, value);
    if let Some(e) = writer.failed.take() {
        return Err(e);
    }
    res?;
    writer.finish()
}

/// Streams bytes of unknown final length into one guest buffer.
///
/// The buffer starts at `hint` bytes. Writes that fit are copied as-is (plain ASCII text sized
/// by its character count always fits). A write that overflows reallocates to
/// `len + 3 × remaining`, where `remaining` is the larger of the write and the unused part of the
/// hint, so multi-byte text needs at most one more reallocation. [`GuestWriter::finish`] shrinks
/// the buffer to the bytes actually written.
pub struct GuestWriter<'g> {
    guest: &'g mut dyn GuestExports,
    ptr: u32,
    cap: u32,
    len: u32,
    hint: u32,
    reallocs: u32,
    done: bool,
    failed: Option<CardError>,
}

impl<'g> GuestWriter<'g> {
    /// Allocate the initial `hint`-byte buffer.
    pub fn new(guest: &'g mut dyn GuestExports, hint: usize) -> CardResult<Self> {
        let hint = u32::try_from(hint.max(1))
            .map_err(|_| CardError::marshal("writer hint exceeds guest memory"))?;
        let ptr = guest.malloc(hint, 1)?;
        Ok(Self {
            guest,
            ptr,
            cap: hint,
            len: 0,
            hint,
            reallocs: 0,
            done: false,
            failed: None,
        })
    }

    /// Bytes written so far.
    pub fn len(&self) -> u32 {
        self.len
    }

    /// `true` before the first write.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Growth reallocations so far (the final shrink is not counted).
    pub fn reallocations(&self) -> u32 {
        self.reallocs
    }

    /// Shrink to the written length and hand the buffer over as `(ptr, len)`.
    pub fn finish(mut self) -> CardResult<(u32, u32)> {
        if self.len < self.cap {
            self.ptr = self.guest.realloc(self.ptr, self.cap, self.len, 1)?;
            self.cap = self.len;
        }
        self.done = true;
        Ok((self.ptr, self.len))
    }

    fn append(&mut self, buf: &[u8]) -> CardResult<()> {
        let add = u32::try_from(buf.len())
            .map_err(|_| CardError::marshal("write exceeds guest memory"))?;
        let needed = self
            .len
            .checked_add(add)
            .ok_or_else(|| CardError::marshal("write exceeds guest memory"))?;
        if needed > self.cap {
            let remaining = add.max(self.hint.saturating_sub(self.len));
            let new_cap = self.len.saturating_add(remaining.saturating_mul(3)).max(needed);
            self.ptr = self.guest.realloc(self.ptr, self.cap, new_cap, 1)?;
            self.cap = new_cap;
            self.reallocs += 1;
        }
        self.guest.memory_mut().write(self.ptr + self.len, buf)?;
        self.len = needed;
        Ok(())
    }
}

impl io::Write for GuestWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.append(buf) {
            Ok(()) => Ok(buf.len()),
            Err(e) => {
                let msg = e.to_string();
                self.failed = Some(e);
                Err(io::Error::other(msg))
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for GuestWriter<'_> {
    fn drop(&mut self) {
        if !self.done {
            let _ = self.guest.free(self.ptr, self.cap, 1);
        }
    }
}

/// Decode `len` bytes at `ptr` as UTF-8. Invalid sequences are an error, never replaced.
pub fn read_str(
    views: &mut MemoryViews,
    mem: &LinearMemory,
    ptr: u32,
    len: u32,
) -> CardResult<String> {
    let bytes = views.bytes(mem).slice(ptr, len)?;
    std::str::from_utf8(bytes)
        .map(str::to_owned)
        .map_err(|e| CardError::marshal(format!("invalid UTF-8 from guest: {e}")))
}

/// Copy a guest buffer out and release it in the guest.
pub fn take_bytes(
    guest: &mut dyn GuestExports,
    views: &mut MemoryViews,
    ptr: u32,
    len: u32,
) -> CardResult<Vec<u8>> {
    let out = views.bytes(guest.memory()).slice(ptr, len)?.to_vec();
    guest.free(ptr, len, 1)?;
    Ok(out)
}

/// Read `N` consecutive `i32`s of a result slot.
pub fn read_slot<const N: usize>(
    views: &mut MemoryViews,
    mem: &LinearMemory,
    retptr: u32,
) -> CardResult<[i32; N]> {
    if retptr % 4 != 0 {
        return Err(CardError::marshal(format!("misaligned result slot {retptr:#x}")));
    }
    let view = views.i32s(mem);
    let mut out = [0i32; N];
    for (k, word) in out.iter_mut().enumerate() {
        *word = view.get(retptr / 4 + k as u32)?;
    }
    Ok(out)
}

/// Reserve a result slot on the guest shadow stack for the duration of `f`.
///
/// The stack pointer is restored on every path, including when `f` fails.
pub fn with_scratch<T>(
    guest: &mut dyn GuestExports,
    f: impl FnOnce(&mut dyn GuestExports, u32) -> CardResult<T>,
) -> CardResult<T> {
    let retptr = guest.add_to_stack_pointer(-SCRATCH_BYTES)?;
    let out = f(&mut *guest, retptr);
    let restored = guest.add_to_stack_pointer(SCRATCH_BYTES);
    match (out, restored) {
        (Err(e), _) => Err(e),
        (Ok(_), Err(e)) => Err(e),
        (Ok(v), Ok(_)) => Ok(v),
    }
}

#[cfg(test)]
#[path = "../../tests/unit/bridge/marshal.rs"]
mod tests;
