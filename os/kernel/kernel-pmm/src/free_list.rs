use crate::frame_table::{FrameInfo, FrameTable, NIL};

/// An intrusive, doubly linked list of free block heads of one order.
///
/// The links live in the frame table entries of the block heads, so the list
/// itself is just a head index and a length. Blocks are pushed and popped at
/// the front (most recently freed first); removal from the middle goes
/// through the `prev`/`next` links. Every operation is O(1).
///
/// # Invariants
/// - Every linked index is the head of a free block of this list's order.
/// - For every linked entry, `prev` names its predecessor (or [`NIL`] at the
///   front) and `next` its successor (or [`NIL`] at the back).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FreeList {
    head: u32,
    len: usize,
}

impl FreeList {
    pub const EMPTY: Self = Self { head: NIL, len: 0 };

    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.head == NIL
    }

    /// Link `index` at the front.
    ///
    /// Only the link fields of the entry are written; state and order must
    /// already be set by the caller.
    pub fn push(&mut self, table: &mut FrameTable<'_>, index: u32) {
        let next = self.head;
        table.update(index, |e| e.with_prev(NIL).with_next(next));
        if next != NIL {
            table.update(next, |e| e.with_prev(index));
        }
        self.head = index;
        self.len += 1;
    }

    /// Unlink `index`, which must be on this list.
    pub fn remove(&mut self, table: &mut FrameTable<'_>, index: u32) {
        let entry = table.get(index);
        let (prev, next) = (entry.prev(), entry.next());

        if prev == NIL {
            self.head = next;
        } else {
            table.update(prev, |e| e.with_next(next));
        }
        if next != NIL {
            table.update(next, |e| e.with_prev(prev));
        }

        table.update(index, |e| e.with_prev(NIL).with_next(NIL));
        self.len -= 1;
    }

    /// Unlink and return the most recently pushed block.
    pub fn pop_front(&mut self, table: &mut FrameTable<'_>) -> Option<u32> {
        if self.head == NIL {
            return None;
        }
        let head = self.head;
        self.remove(table, head);
        Some(head)
    }

    /// Iterate the linked indices from the front.
    ///
    /// Stops after at most `table.len()` steps even if the links are corrupt.
    #[must_use]
    pub fn iter<'t>(&self, table: &'t FrameTable<'_>) -> Iter<'t> {
        Iter {
            table: table.entries(),
            next: self.head,
            budget: table.len(),
        }
    }
}

/// Iterator over the indices of a [`FreeList`].
pub struct Iter<'t> {
    table: &'t [FrameInfo],
    next: u32,
    budget: u32,
}

impl Iterator for Iter<'_> {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        if self.next == NIL || self.budget == 0 {
            return None;
        }
        let current = self.next;
        self.next = self.table.get(current as usize).map_or(NIL, |e| e.next());
        self.budget -= 1;
        Some(current)
    }
}
