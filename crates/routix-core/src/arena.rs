//! Slot arena owning every live record.
//!
//! Children lists refer to records by [`RecordId`] rather than by reference,
//! so the trie, the registry and generated snapshots can all point at the same
//! record without shared ownership.

use std::ops::{Index, IndexMut};

use crate::record::{Record, RecordId};

/// Arena of records addressed by [`RecordId`]. Freed slots are reused.
#[derive(Debug, Clone, Default)]
pub struct RecordArena {
    slots: Vec<Option<Record>>,
    free: Vec<usize>,
    len: usize,
}

impl RecordArena {
    /// Create an empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a record and return its id.
    pub fn insert(&mut self, record: Record) -> RecordId {
        self.len += 1;
        match self.free.pop() {
            Some(index) => {
                self.slots[index] = Some(record);
                RecordId::new(index)
            }
            None => {
                self.slots.push(Some(record));
                RecordId::new(self.slots.len() - 1)
            }
        }
    }

    /// Get a record by id.
    pub fn get(&self, id: RecordId) -> Option<&Record> {
        self.slots.get(id.index()).and_then(Option::as_ref)
    }

    /// Get a mutable record by id.
    pub fn get_mut(&mut self, id: RecordId) -> Option<&mut Record> {
        self.slots.get_mut(id.index()).and_then(Option::as_mut)
    }

    /// Remove a record, freeing its slot.
    pub fn remove(&mut self, id: RecordId) -> Option<Record> {
        let record = self.slots.get_mut(id.index())?.take()?;
        self.free.push(id.index());
        self.len -= 1;
        Some(record)
    }

    /// Check if an id refers to a live record.
    pub fn contains(&self, id: RecordId) -> bool {
        self.get(id).is_some()
    }

    /// Number of live records.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if the arena holds no records.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Iterate over live records.
    pub fn iter(&self) -> impl Iterator<Item = (RecordId, &Record)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|r| (RecordId::new(i), r)))
    }
}

impl Index<RecordId> for RecordArena {
    type Output = Record;

    fn index(&self, id: RecordId) -> &Record {
        match self.get(id) {
            Some(record) => record,
            None => panic!("no live record at {id:?}"),
        }
    }
}

impl IndexMut<RecordId> for RecordArena {
    fn index_mut(&mut self, id: RecordId) -> &mut Record {
        match self.get_mut(id) {
            Some(record) => record,
            None => panic!("no live record at {id:?}"),
        }
    }
}
