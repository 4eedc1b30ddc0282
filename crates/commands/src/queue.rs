//! Pending work queue with delayed execution.
//!
//! Items become ready at their `ready_at` instant. Among ready items the one
//! with the earliest `ready_at` runs first; items that become ready at the
//! same instant run in enqueue order. The queue itself is a plain data
//! structure: locking is the caller's job.

use std::any::TypeId;

use tokio::time::Instant;

use quire_core::CommandId;

/// What the queue needs to know about an item.
pub(crate) trait QueueEntry {
    /// Identity used for duplicate detection (`None` for pseudo-commands).
    fn command_id(&self) -> Option<CommandId>;

    /// Concrete command type (`None` for pseudo-commands).
    fn command_kind(&self) -> Option<TypeId>;
}

#[derive(Debug)]
struct Slot<T> {
    seq: u64,
    ready_at: Instant,
    item: T,
}

#[derive(Debug)]
pub(crate) struct PendingQueue<T> {
    slots: Vec<Slot<T>>,
    next_seq: u64,
}

impl<T> Default for PendingQueue<T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            next_seq: 0,
        }
    }
}

impl<T: QueueEntry> PendingQueue<T> {
    /// Insert an item, rejecting it if an item with the same command id is pending.
    pub fn push(&mut self, item: T, ready_at: Instant) -> Result<(), CommandId> {
        if let Some(id) = item.command_id() {
            if self.contains_id(id) {
                return Err(id);
            }
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.slots.push(Slot {
            seq,
            ready_at,
            item,
        });
        Ok(())
    }

    /// Remove and return the next item whose time has come.
    pub fn pop_ready(&mut self, now: Instant) -> Option<T> {
        let idx = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.ready_at <= now)
            .min_by_key(|(_, slot)| (slot.ready_at, slot.seq))
            .map(|(idx, _)| idx)?;

        Some(self.slots.remove(idx).item)
    }

    /// Earliest instant at which some item becomes ready.
    pub fn next_ready_at(&self) -> Option<Instant> {
        self.slots.iter().map(|slot| slot.ready_at).min()
    }

    pub fn contains_id(&self, id: CommandId) -> bool {
        self.slots
            .iter()
            .any(|slot| slot.item.command_id() == Some(id))
    }

    pub fn contains_kind(&self, kind: TypeId) -> bool {
        self.slots
            .iter()
            .any(|slot| slot.item.command_kind() == Some(kind))
    }

    /// Remove every pending item of the given command type.
    pub fn remove_kind(&mut self, kind: TypeId) -> Vec<T> {
        let mut removed = Vec::new();
        let mut kept = Vec::with_capacity(self.slots.len());
        for slot in self.slots.drain(..) {
            if slot.item.command_kind() == Some(kind) {
                removed.push(slot.item);
            } else {
                kept.push(slot);
            }
        }
        self.slots = kept;
        removed
    }

    /// True if any pending item satisfies `predicate`.
    pub fn any(&self, mut predicate: impl FnMut(&T) -> bool) -> bool {
        self.slots.iter().any(|slot| predicate(&slot.item))
    }

    /// Remove everything, in enqueue order.
    pub fn drain(&mut self) -> Vec<T> {
        let mut slots: Vec<Slot<T>> = self.slots.drain(..).collect();
        slots.sort_by_key(|slot| slot.seq);
        slots.into_iter().map(|slot| slot.item).collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }
}
