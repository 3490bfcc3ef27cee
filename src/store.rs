//! # News Store
//! In-process item store keyed by fingerprint.
//!
//! Items are appended once and never updated. Reads filter by category and
//! sort by `ts` at query time; insertion order carries no meaning.
//!
//! An optional per-category capacity keeps memory bounded: when a category is
//! full, its oldest item (by `ts`) makes room for a newer one, and an item
//! older than everything already held is turned away. Evicted fingerprints are
//! remembered (up to [`EVICTED_MEMORY`]) so a feed that keeps re-serving an
//! evicted story cannot bring it back.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::RwLock;

use crate::ingest::types::NewsItem;
use crate::sources::ALL_CATEGORY;

/// How many evicted fingerprints are kept; the oldest are forgotten first.
pub const EVICTED_MEMORY: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// Fingerprint already present or previously evicted; the store is unchanged.
    Duplicate,
    /// Category is full and the item is older than all of its items.
    Rejected,
}

#[derive(Debug, Default)]
struct Inner {
    items: Vec<NewsItem>,
    ids: HashSet<String>,
    per_category: HashMap<String, usize>,
    evicted: HashSet<String>,
    evicted_order: VecDeque<String>,
}

impl Inner {
    fn remember_evicted(&mut self, id: String) {
        if self.evicted.insert(id.clone()) {
            self.evicted_order.push_back(id);
        }
        while self.evicted_order.len() > EVICTED_MEMORY {
            if let Some(old) = self.evicted_order.pop_front() {
                self.evicted.remove(&old);
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct NewsStore {
    inner: RwLock<Inner>,
    capacity: Option<usize>,
}

impl NewsStore {
    /// Unbounded store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store holding at most `cap` items per category (`None` = unbounded).
    pub fn with_category_capacity(cap: Option<usize>) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            capacity: cap.filter(|c| *c > 0),
        }
    }

    pub fn insert(&self, item: NewsItem) -> InsertOutcome {
        let mut inner = self.inner.write().unwrap_or_else(|p| p.into_inner());
        if inner.ids.contains(&item.id) || inner.evicted.contains(&item.id) {
            return InsertOutcome::Duplicate;
        }

        let held = inner.per_category.get(&item.category).copied().unwrap_or(0);
        if let Some(cap) = self.capacity {
            if held >= cap {
                let oldest = inner
                    .items
                    .iter()
                    .enumerate()
                    .filter(|(_, it)| it.category == item.category)
                    .min_by_key(|(_, it)| it.ts)
                    .map(|(i, it)| (i, it.ts));
                match oldest {
                    Some((idx, ts)) if ts < item.ts => {
                        let evicted = inner.items.remove(idx);
                        inner.ids.remove(&evicted.id);
                        if let Some(n) = inner.per_category.get_mut(&evicted.category) {
                            *n = n.saturating_sub(1);
                        }
                        inner.remember_evicted(evicted.id);
                    }
                    _ => return InsertOutcome::Rejected,
                }
            }
        }

        inner.ids.insert(item.id.clone());
        *inner.per_category.entry(item.category.clone()).or_default() += 1;
        inner.items.push(item);
        InsertOutcome::Inserted
    }

    /// Insert a batch and return how many were new.
    pub fn insert_many(&self, items: impl IntoIterator<Item = NewsItem>) -> usize {
        items
            .into_iter()
            .filter(|it| self.insert(it.clone()) == InsertOutcome::Inserted)
            .count()
    }

    /// Items of `category` (or everything for `all`), newest first, at most `limit`.
    /// Equal timestamps keep insertion order.
    pub fn query(&self, category: &str, limit: usize) -> Vec<NewsItem> {
        let inner = self.inner.read().unwrap_or_else(|p| p.into_inner());
        let mut out: Vec<NewsItem> = if category == ALL_CATEGORY {
            inner.items.clone()
        } else {
            inner
                .items
                .iter()
                .filter(|it| it.category == category)
                .cloned()
                .collect()
        };
        out.sort_by(|a, b| b.ts.cmp(&a.ts));
        out.truncate(limit);
        out
    }

    pub fn contains(&self, id: &str) -> bool {
        let inner = self.inner.read().unwrap_or_else(|p| p.into_inner());
        inner.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        let inner = self.inner.read().unwrap_or_else(|p| p.into_inner());
        inner.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
