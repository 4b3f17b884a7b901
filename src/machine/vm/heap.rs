use crate::machine::errors::VmError;
use crate::machine::isa::Word;
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Identifier of a heap array. Handle 0 is always the running program.
pub type Handle = u32;

/// Array storage and handle management.
///
/// Arrays live in a table indexed by handle; an abandoned slot is kept as
/// `None` and its handle goes into a min-ordered pool. Allocation reuses
/// the smallest pooled handle before minting a new one, which keeps the
/// handle space compact. Programs observe handle values, so this reuse
/// order is part of the machine's contract, not an allocator detail.
#[derive(Clone, Debug)]
pub(super) struct Heap {
    /// Array table indexed by handle; `None` marks an abandoned slot.
    arrays: Vec<Option<Vec<Word>>>,
    /// Abandoned handles eligible for reuse, smallest first.
    free: BinaryHeap<Reverse<Handle>>,
}

impl Heap {
    /// Creates a heap whose array 0 holds the given program words.
    pub(super) fn new(program: Vec<Word>) -> Self {
        Self {
            arrays: vec![Some(program)],
            free: BinaryHeap::new(),
        }
    }

    /// Creates a zero-filled array of `size` words and returns its handle:
    /// the smallest abandoned one if any exists, else a fresh one.
    pub(super) fn allocate(&mut self, size: Word) -> Handle {
        let cells = vec![0; size as usize];
        match self.free.pop() {
            Some(Reverse(handle)) => {
                self.arrays[handle as usize] = Some(cells);
                handle
            }
            None => {
                let handle = self.arrays.len() as Handle;
                self.arrays.push(Some(cells));
                handle
            }
        }
    }

    /// Abandons a live array, releasing its storage and returning the
    /// handle to the reuse pool. Handle 0 and dead handles are rejected.
    pub(super) fn free(&mut self, handle: Handle) -> Result<(), VmError> {
        if handle == 0 || !self.is_live(handle) {
            return Err(VmError::InvalidAbandon { handle });
        }
        self.arrays[handle as usize] = None;
        self.free.push(Reverse(handle));
        Ok(())
    }

    /// Reads the word at `offset` in the array at `handle`.
    pub(super) fn read(&self, handle: Handle, offset: Word) -> Result<Word, VmError> {
        self.array(handle)
            .and_then(|cells| cells.get(offset as usize))
            .copied()
            .ok_or(VmError::OutOfBoundsAccess { handle, offset })
    }

    /// Writes `value` at `offset` in the array at `handle`.
    pub(super) fn write(&mut self, handle: Handle, offset: Word, value: Word) -> Result<(), VmError> {
        let cell = self
            .arrays
            .get_mut(handle as usize)
            .and_then(|slot| slot.as_mut())
            .and_then(|cells| cells.get_mut(offset as usize))
            .ok_or(VmError::OutOfBoundsAccess { handle, offset })?;
        *cell = value;
        Ok(())
    }

    /// Replaces array 0 with a copy of the live array at `handle`.
    ///
    /// The caller skips the copy when `handle` is 0; the program would be
    /// replaced with itself.
    pub(super) fn replace_program(&mut self, handle: Handle) -> Result<(), VmError> {
        let source = self
            .array(handle)
            .ok_or(VmError::OutOfBoundsAccess { handle, offset: 0 })?
            .clone();
        self.arrays[0] = Some(source);
        Ok(())
    }

    /// Reads the platter at `finger` in the program array.
    pub(super) fn fetch(&self, finger: Word) -> Result<Word, VmError> {
        self.read(0, finger)
    }

    /// Number of words in the program array.
    #[cfg(test)]
    pub(super) fn program_len(&self) -> usize {
        self.array(0).map(Vec::len).unwrap_or(0)
    }

    fn array(&self, handle: Handle) -> Option<&Vec<Word>> {
        self.arrays.get(handle as usize)?.as_ref()
    }

    fn is_live(&self, handle: Handle) -> bool {
        self.array(handle).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heap() -> Heap {
        Heap::new(vec![0; 4])
    }

    #[test]
    fn allocate_zero_initializes() {
        let mut heap = heap();
        let handle = heap.allocate(3);
        assert_eq!(handle, 1);
        for offset in 0..3 {
            assert_eq!(heap.read(handle, offset).unwrap(), 0);
        }
        assert!(matches!(
            heap.read(handle, 3),
            Err(VmError::OutOfBoundsAccess { handle: 1, offset: 3 })
        ));
    }

    #[test]
    fn allocate_empty_array() {
        let mut heap = heap();
        let handle = heap.allocate(0);
        assert!(matches!(
            heap.read(handle, 0),
            Err(VmError::OutOfBoundsAccess { .. })
        ));
    }

    #[test]
    fn write_then_read() {
        let mut heap = heap();
        let handle = heap.allocate(2);
        heap.write(handle, 1, 42).unwrap();
        assert_eq!(heap.read(handle, 1).unwrap(), 42);
        assert!(matches!(
            heap.write(handle, 2, 0),
            Err(VmError::OutOfBoundsAccess { .. })
        ));
    }

    #[test]
    fn free_then_reallocate_reissues_the_handle() {
        let mut heap = heap();
        let handle = heap.allocate(1);
        heap.free(handle).unwrap();
        assert_eq!(heap.allocate(1), handle);
    }

    #[test]
    fn reuse_prefers_the_smallest_handle() {
        let mut heap = heap();
        let first = heap.allocate(1);
        let second = heap.allocate(1);
        let third = heap.allocate(1);
        assert_eq!((first, second, third), (1, 2, 3));

        heap.free(third).unwrap();
        heap.free(first).unwrap();
        assert_eq!(heap.allocate(1), first);
        assert_eq!(heap.allocate(1), third);
        assert_eq!(heap.allocate(1), 4);
    }

    #[test]
    fn reallocated_array_is_fresh() {
        let mut heap = heap();
        let handle = heap.allocate(2);
        heap.write(handle, 0, 99).unwrap();
        heap.free(handle).unwrap();
        let handle = heap.allocate(2);
        assert_eq!(heap.read(handle, 0).unwrap(), 0);
    }

    #[test]
    fn cannot_abandon_the_program_array() {
        let mut heap = heap();
        assert!(matches!(
            heap.free(0),
            Err(VmError::InvalidAbandon { handle: 0 })
        ));
    }

    #[test]
    fn cannot_abandon_twice() {
        let mut heap = heap();
        let handle = heap.allocate(1);
        heap.free(handle).unwrap();
        assert!(matches!(
            heap.free(handle),
            Err(VmError::InvalidAbandon { .. })
        ));
    }

    #[test]
    fn cannot_abandon_an_unissued_handle() {
        let mut heap = heap();
        assert!(matches!(
            heap.free(7),
            Err(VmError::InvalidAbandon { handle: 7 })
        ));
    }

    #[test]
    fn dead_handle_access_fails() {
        let mut heap = heap();
        let handle = heap.allocate(1);
        heap.free(handle).unwrap();
        assert!(matches!(
            heap.read(handle, 0),
            Err(VmError::OutOfBoundsAccess { .. })
        ));
        assert!(matches!(
            heap.write(handle, 0, 1),
            Err(VmError::OutOfBoundsAccess { .. })
        ));
    }

    #[test]
    fn replace_program_copies_the_source() {
        let mut heap = heap();
        let handle = heap.allocate(2);
        heap.write(handle, 0, 7).unwrap();
        heap.write(handle, 1, 8).unwrap();

        heap.replace_program(handle).unwrap();
        assert_eq!(heap.program_len(), 2);
        assert_eq!(heap.fetch(0).unwrap(), 7);
        assert_eq!(heap.fetch(1).unwrap(), 8);

        // The source is a copy: amending it later leaves array 0 alone.
        heap.write(handle, 0, 100).unwrap();
        assert_eq!(heap.fetch(0).unwrap(), 7);
    }

    #[test]
    fn replace_program_from_dead_handle_fails() {
        let mut heap = heap();
        let handle = heap.allocate(1);
        heap.free(handle).unwrap();
        assert!(matches!(
            heap.replace_program(handle),
            Err(VmError::OutOfBoundsAccess { .. })
        ));
    }

    #[test]
    fn clone_is_independent() {
        let mut heap = heap();
        let handle = heap.allocate(1);
        heap.write(handle, 0, 5).unwrap();

        let mut copy = heap.clone();
        copy.write(handle, 0, 6).unwrap();
        assert_eq!(heap.read(handle, 0).unwrap(), 5);
        assert_eq!(copy.read(handle, 0).unwrap(), 6);

        // The reuse pool is part of the snapshot: both sides hand out the
        // same next handle.
        heap.free(handle).unwrap();
        copy.free(handle).unwrap();
        assert_eq!(heap.allocate(1), copy.allocate(1));
    }
}
