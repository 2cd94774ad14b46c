use crate::query::CursorHandle;

/// Slot index of a cursor in a [`CursorRegistry`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct CursorKey(usize);

/// Arena of live cursor handles owned by one table instance.
///
/// Slots are reused through a free list, so registration and removal are O(1).
#[derive(Debug, Default)]
pub struct CursorRegistry {
    slots: Vec<Option<CursorHandle>>,
    free: Vec<usize>,
    live: usize,
}

impl CursorRegistry {
    /// Registers a cursor and returns its key.
    pub fn insert(&mut self, handle: CursorHandle) -> CursorKey {
        self.live += 1;
        match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = Some(handle);
                CursorKey(idx)
            }
            None => {
                self.slots.push(Some(handle));
                CursorKey(self.slots.len() - 1)
            }
        }
    }

    /// Deregisters a cursor; unknown or already removed keys are ignored.
    pub fn remove(&mut self, key: CursorKey) -> Option<CursorHandle> {
        let handle = self.slots.get_mut(key.0)?.take()?;
        self.free.push(key.0);
        self.live -= 1;
        Some(handle)
    }

    /// Removes and returns every live handle.
    pub fn drain(&mut self) -> Vec<CursorHandle> {
        let handles: Vec<_> = self.slots.drain(..).flatten().collect();
        self.free.clear();
        self.live = 0;
        handles
    }

    /// Number of live cursors.
    pub fn len(&self) -> usize {
        self.live
    }

    /// Whether no cursor is registered.
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }
}
