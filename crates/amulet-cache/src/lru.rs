//! LRU bookkeeping: hash map plus an index-linked recency list.
//!
//! Nodes live in a slab; `prev`/`next` are slab indices rather than
//! pointers, so the container owns every node and the doubly-linked list
//! carries no ownership cycle. Head is most recent, tail is least; eviction
//! always takes the tail.

use crate::key::CacheKey;
use crate::record::CachedRecord;
use std::collections::HashMap;
use std::time::Instant;

#[derive(Debug)]
struct Slot {
    key: CacheKey,
    record: CachedRecord,
    prev: Option<usize>,
    next: Option<usize>,
}

#[derive(Debug)]
pub(crate) struct LruList {
    map: HashMap<CacheKey, usize>,
    slots: Vec<Option<Slot>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    capacity: usize,
}

impl LruList {
    pub(crate) fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            map: HashMap::with_capacity(capacity),
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            head: None,
            tail: None,
            capacity,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.map.len()
    }

    /// Map probe without touching recency order.
    pub(crate) fn peek(&self, key: &CacheKey) -> Option<&CachedRecord> {
        let idx = *self.map.get(key)?;
        self.slots.get(idx)?.as_ref().map(|slot| &slot.record)
    }

    /// Write-phase read: re-checks existence and expiry, promotes the entry
    /// to the head, and returns a clone of the record. An entry found
    /// expired is removed instead.
    pub(crate) fn touch(&mut self, key: &CacheKey, now: Instant) -> Option<CachedRecord> {
        let idx = *self.map.get(key)?;

        let expired = self
            .slots
            .get(idx)?
            .as_ref()
            .map(|slot| slot.record.is_expired(now))?;
        if expired {
            self.remove(key);
            return None;
        }

        self.unlink(idx);
        self.push_front(idx);
        self.slots
            .get(idx)
            .and_then(|s| s.as_ref())
            .map(|slot| slot.record.clone())
    }

    /// Inserts or replaces an entry at the head. Returns the key evicted
    /// from the tail, if the insert pushed the list over capacity.
    pub(crate) fn insert(&mut self, key: CacheKey, record: CachedRecord) -> Option<CacheKey> {
        if let Some(&idx) = self.map.get(&key) {
            if let Some(slot) = self.slots.get_mut(idx).and_then(|s| s.as_mut()) {
                slot.record = record;
            }
            self.unlink(idx);
            self.push_front(idx);
            return None;
        }

        let slot = Slot {
            key: key.clone(),
            record,
            prev: None,
            next: None,
        };
        let idx = match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = Some(slot);
                idx
            }
            None => {
                self.slots.push(Some(slot));
                self.slots.len() - 1
            }
        };

        self.map.insert(key, idx);
        self.push_front(idx);

        if self.map.len() > self.capacity {
            return self.evict_tail();
        }
        None
    }

    /// Removes an entry, unlinking it from the list.
    pub(crate) fn remove(&mut self, key: &CacheKey) -> Option<CachedRecord> {
        let idx = self.map.remove(key)?;
        self.unlink(idx);
        let slot = self.slots.get_mut(idx).and_then(|s| s.take())?;
        self.free.push(idx);
        Some(slot.record)
    }

    /// Drops every expired entry. Returns how many were removed.
    pub(crate) fn remove_expired(&mut self, now: Instant) -> usize {
        let expired: Vec<CacheKey> = self
            .map
            .iter()
            .filter_map(|(key, &idx)| {
                let slot = self.slots.get(idx)?.as_ref()?;
                slot.record.is_expired(now).then(|| key.clone())
            })
            .collect();

        for key in &expired {
            self.remove(key);
        }
        expired.len()
    }

    fn evict_tail(&mut self) -> Option<CacheKey> {
        let idx = self.tail?;
        let key = self
            .slots
            .get(idx)
            .and_then(|s| s.as_ref())
            .map(|slot| slot.key.clone())?;
        self.remove(&key);
        Some(key)
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = match self.slots.get(idx).and_then(|s| s.as_ref()) {
            Some(slot) => (slot.prev, slot.next),
            None => return,
        };

        match prev {
            Some(p) => {
                if let Some(slot) = self.slots.get_mut(p).and_then(|s| s.as_mut()) {
                    slot.next = next;
                }
            }
            None => self.head = next,
        }
        match next {
            Some(n) => {
                if let Some(slot) = self.slots.get_mut(n).and_then(|s| s.as_mut()) {
                    slot.prev = prev;
                }
            }
            None => self.tail = prev,
        }

        if let Some(slot) = self.slots.get_mut(idx).and_then(|s| s.as_mut()) {
            slot.prev = None;
            slot.next = None;
        }
    }

    fn push_front(&mut self, idx: usize) {
        let old_head = self.head;

        if let Some(slot) = self.slots.get_mut(idx).and_then(|s| s.as_mut()) {
            slot.prev = None;
            slot.next = old_head;
        }

        match old_head {
            Some(h) => {
                if let Some(slot) = self.slots.get_mut(h).and_then(|s| s.as_mut()) {
                    slot.prev = Some(idx);
                }
            }
            None => self.tail = Some(idx),
        }
        self.head = Some(idx);
    }

    /// The key currently at the head of the recency list.
    #[cfg(test)]
    pub(crate) fn head_key(&self) -> Option<&CacheKey> {
        let idx = self.head?;
        self.slots.get(idx)?.as_ref().map(|slot| &slot.key)
    }

    /// Checks every structural invariant the list promises.
    #[cfg(test)]
    pub(crate) fn assert_invariants(&self) {
        assert!(self.map.len() <= self.capacity, "over capacity");

        // head/tail are nil together or not at all
        assert_eq!(self.head.is_none(), self.tail.is_none());

        // Walk head -> tail, checking link symmetry
        let mut seen = 0usize;
        let mut prev: Option<usize> = None;
        let mut cursor = self.head;
        while let Some(idx) = cursor {
            let slot = self.slots[idx].as_ref().expect("linked slot vacant");
            assert_eq!(slot.prev, prev, "prev link broken at {idx}");
            assert_eq!(self.map.get(&slot.key), Some(&idx), "map points elsewhere");
            seen += 1;
            prev = Some(idx);
            cursor = slot.next;
        }
        assert_eq!(prev, self.tail, "tail mismatch");
        assert_eq!(seen, self.map.len(), "list length != map size");
    }
}
