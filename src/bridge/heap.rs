use crate::bridge::memory::LinearMemory;
use crate::foundation::error::{CardError, CardResult};

/// Handle of the `undefined` constant.
pub const UNDEFINED: Handle = Handle(0);
/// Handle of the `null` constant.
pub const NULL: Handle = Handle(1);
/// Handle of the `true` constant.
pub const TRUE: Handle = Handle(2);
/// Handle of the `false` constant.
pub const FALSE: Handle = Handle(3);

/// Slots `0..RESERVED` hold the constants above and are never recycled.
pub const RESERVED: u32 = 4;

const INDEX_BITS: u32 = 16;
const INDEX_MASK: u32 = (1 << INDEX_BITS) - 1;

/// A value the host holds on behalf of the guest.
#[derive(Clone, Debug, PartialEq)]
pub enum HostValue {
    /// `undefined`.
    Undefined,
    /// `null`.
    Null,
    /// Boolean.
    Bool(bool),
    /// UTF-8 string (error messages, text arguments).
    String(String),
    /// Raw bytes (SVG documents passed by reference).
    Bytes(Vec<u8>),
}

/// Generational handle: `index | generation << 16`.
///
/// Handles cross the boundary as raw `u32`s; a handle whose generation no longer matches its slot
/// was dropped and is rejected instead of aliasing whatever now lives there.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Handle(u32);

impl Handle {
    /// Rebuild from the raw ABI value.
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw ABI value.
    pub fn raw(self) -> u32 {
        self.0
    }

    /// Slot index.
    pub fn index(self) -> u32 {
        self.0 & INDEX_MASK
    }

    /// Slot generation.
    pub fn generation(self) -> u32 {
        self.0 >> INDEX_BITS
    }

    fn new(index: u32, generation: u16) -> Self {
        Self(index | (u32::from(generation) << INDEX_BITS))
    }

    fn is_reserved(self) -> bool {
        self.0 < RESERVED
    }
}

#[derive(Debug)]
enum Slot {
    Occupied { generation: u16, value: HostValue },
    Vacant { generation: u16, next_free: Option<u32> },
}

/// Array-backed object table with an intrusive free list.
///
/// A vacant slot stores the index of the next vacant slot, so insert and remove are O(1) without a
/// side structure. Removing a value bumps the slot's generation.
#[derive(Debug)]
pub struct HeapTable {
    slots: Vec<Slot>,
    free_head: Option<u32>,
    live: usize,
}

impl Default for HeapTable {
    fn default() -> Self {
        Self::new()
    }
}

impl HeapTable {
    /// Table holding only the reserved constants.
    pub fn new() -> Self {
        let constants = [
            HostValue::Undefined,
            HostValue::Null,
            HostValue::Bool(true),
            HostValue::Bool(false),
        ];
        Self {
            slots: constants
                .into_iter()
                .map(|value| Slot::Occupied {
                    generation: 0,
                    value,
                })
                .collect(),
            free_head: None,
            live: 0,
        }
    }

    /// Number of live dynamic slots (constants excluded).
    pub fn live(&self) -> usize {
        self.live
    }

    /// Total slots ever created, constants included.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Store `value` and return its handle. Constants map to their reserved slots.
    pub fn insert(&mut self, value: HostValue) -> CardResult<Handle> {
        match value {
            HostValue::Undefined => return Ok(UNDEFINED),
            HostValue::Null => return Ok(NULL),
            HostValue::Bool(true) => return Ok(TRUE),
            HostValue::Bool(false) => return Ok(FALSE),
            HostValue::String(_) | HostValue::Bytes(_) => {}
        }

        let handle = match self.free_head {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                let Slot::Vacant {
                    generation,
                    next_free,
                } = *slot
                else {
                    return Err(CardError::trap(format!(
                        "heap free list points at occupied slot {index}"
                    )));
                };
                self.free_head = next_free;
                *slot = Slot::Occupied { generation, value };
                Handle::new(index, generation)
            }
            None => {
                let index = self.slots.len() as u32;
                if index > INDEX_MASK {
                    return Err(CardError::trap("heap table exhausted"));
                }
                self.slots.push(Slot::Occupied {
                    generation: 0,
                    value,
                });
                Handle::new(index, 0)
            }
        };
        self.live += 1;
        Ok(handle)
    }

    /// Borrow the value behind `handle`.
    pub fn get(&self, handle: Handle) -> CardResult<&HostValue> {
        match self.slots.get(handle.index() as usize) {
            Some(Slot::Occupied { generation, value })
                if u32::from(*generation) == handle.generation() =>
            {
                Ok(value)
            }
            _ => Err(stale(handle)),
        }
    }

    /// Remove and return the value behind `handle`. Constants are returned but stay in place.
    pub fn take(&mut self, handle: Handle) -> CardResult<HostValue> {
        if handle.is_reserved() {
            return self.get(handle).cloned();
        }
        self.get(handle)?;

        let index = handle.index();
        let vacant = Slot::Vacant {
            generation: (handle.generation() as u16).wrapping_add(1),
            next_free: self.free_head,
        };
        let old = std::mem::replace(&mut self.slots[index as usize], vacant);
        self.free_head = Some(index);
        self.live -= 1;
        match old {
            Slot::Occupied { value, .. } => Ok(value),
            Slot::Vacant { .. } => Err(stale(handle)),
        }
    }

    /// Drop the value behind `handle`.
    pub fn drop_ref(&mut self, handle: Handle) -> CardResult<()> {
        self.take(handle).map(drop)
    }

    /// Take a string value (errors arrive this way).
    pub fn take_string(&mut self, handle: Handle) -> CardResult<String> {
        match self.take(handle)? {
            HostValue::String(s) => Ok(s),
            other => Err(CardError::marshal(format!(
                "expected a string handle, found {other:?}"
            ))),
        }
    }
}

fn stale(handle: Handle) -> CardError {
    CardError::StaleHandle {
        index: handle.index(),
        generation: handle.generation(),
    }
}

/// Functions the host exposes to the guest.
///
/// Handles are raw `u32`s at this level; a real module would import these by name.
pub trait HostImports {
    /// Decode `len` bytes at `ptr` as UTF-8 and store the string. Returns its handle.
    fn string_new(&mut self, mem: &LinearMemory, ptr: u32, len: u32) -> CardResult<u32>;
    /// Byte length of a string or bytes object.
    fn object_byte_len(&self, handle: u32) -> CardResult<u32>;
    /// Copy a string or bytes object into guest memory at `ptr`.
    fn object_copy_into(&self, handle: u32, mem: &mut LinearMemory, ptr: u32) -> CardResult<()>;
    /// Release a handle the guest owns.
    fn object_drop_ref(&mut self, handle: u32) -> CardResult<()>;
}

impl HostImports for HeapTable {
    fn string_new(&mut self, mem: &LinearMemory, ptr: u32, len: u32) -> CardResult<u32> {
        let bytes = mem
            .slice(ptr, len)
            .ok_or_else(|| CardError::marshal(format!("string of {len} bytes at {ptr:#x}")))?;
        let s = std::str::from_utf8(bytes)
            .map_err(|e| CardError::marshal(format!("guest string is not UTF-8: {e}")))?;
        Ok(self.insert(HostValue::String(s.to_owned()))?.raw())
    }

    fn object_byte_len(&self, handle: u32) -> CardResult<u32> {
        let len = object_bytes(self.get(Handle::from_raw(handle))?)?.len();
        u32::try_from(len).map_err(|_| CardError::marshal("object larger than guest memory"))
    }

    fn object_copy_into(&self, handle: u32, mem: &mut LinearMemory, ptr: u32) -> CardResult<()> {
        mem.write(ptr, object_bytes(self.get(Handle::from_raw(handle))?)?)
    }

    fn object_drop_ref(&mut self, handle: u32) -> CardResult<()> {
        self.drop_ref(Handle::from_raw(handle))
    }
}

fn object_bytes(value: &HostValue) -> CardResult<&[u8]> {
    match value {
        HostValue::String(s) => Ok(s.as_bytes()),
        HostValue::Bytes(b) => Ok(b),
        other => Err(CardError::marshal(format!("{other:?} has no byte content"))),
    }
}

#[cfg(test)]
#[path = "../../tests/unit/bridge/heap.rs"]
mod tests;
