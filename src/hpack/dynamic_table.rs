//! The dynamic table: a FIFO of recently seen header fields, shared by
//! encoder and decoder, evicted oldest-first to stay under a byte-size
//! budget rather than an entry count
//! ([RFC 7541 §4.1](https://datatracker.ietf.org/doc/html/rfc7541#section-4.1)).
use std::collections::VecDeque;

struct Entry {
    name: Box<[u8]>,
    value: Box<[u8]>,
}

impl Entry {
    /// Per RFC 7541 §4.1: the entry's size is name + value octets plus
    /// 32 bytes of accounting overhead, so a table of all-empty-value
    /// entries still evicts under churn rather than growing unbounded.
    fn size(&self) -> usize {
        self.name.len() + self.value.len() + 32
    }
}

pub(super) struct DynamicTable {
    entries: VecDeque<Entry>,
    size: usize,
    max_size: usize,
}

impl DynamicTable {
    pub(super) fn new(max_size: usize) -> Self {
        DynamicTable {
            entries: VecDeque::new(),
            size: 0,
            max_size,
        }
    }

    pub(super) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Entries are indexed most-recently-inserted-first, 1-based,
    /// immediately after the static table's 61 entries (index
    /// arithmetic lives in the caller).
    pub(super) fn get(&self, index: usize) -> Option<(&[u8], &[u8])> {
        self.entries
            .get(index)
            .map(|e| (e.name.as_ref(), e.value.as_ref()))
    }

    pub(super) fn find(&self, name: &[u8], value: &[u8]) -> Option<(usize, bool)> {
        let mut name_only = None;
        for (i, entry) in self.entries.iter().enumerate() {
            if entry.name.as_ref() == name {
                if entry.value.as_ref() == value {
                    return Some((i, true));
                }
                if name_only.is_none() {
                    name_only = Some((i, false));
                }
            }
        }
        name_only
    }

    pub(super) fn insert(&mut self, name: &[u8], value: &[u8]) {
        let entry = Entry {
            name: name.into(),
            value: value.into(),
        };
        self.size += entry.size();
        self.entries.push_front(entry);
        self.evict();
    }

    /// A dynamic table size update from the peer: evicts down to the
    /// new maximum, which may be smaller or larger than before.
    pub(super) fn set_max_size(&mut self, max_size: usize) {
        self.max_size = max_size;
        self.evict();
    }

    fn evict(&mut self) {
        while self.size > self.max_size {
            match self.entries.pop_back() {
                Some(entry) => self.size -= entry.size(),
                None => break,
            }
        }
    }
}
