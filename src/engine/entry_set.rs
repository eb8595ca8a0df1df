use std::collections::hash_map::{self, HashMap};

use crate::model::{Entry, EntryLink};

/// A set of entries keyed by [`EntryLink`].
///
/// Inserting an entry whose link is already present keeps the existing one, so
/// the first occurrence of a link wins.
#[derive(Debug, Clone, Default)]
pub struct EntrySet {
    entries: HashMap<EntryLink, Entry>,
}

impl EntrySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry unless its link is already present. Returns whether it was added.
    pub fn insert(&mut self, entry: Entry) -> bool {
        match self.entries.entry(entry.link.clone()) {
            hash_map::Entry::Occupied(_) => false,
            hash_map::Entry::Vacant(slot) => {
                slot.insert(entry);
                true
            }
        }
    }

    pub fn contains(&self, link: &str) -> bool {
        self.entries.contains_key(link)
    }

    pub fn get(&self, link: &str) -> Option<&Entry> {
        self.entries.get(link)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entry> {
        self.entries.values()
    }

    /// Entries of `self` whose link does not appear in `other`.
    pub fn difference(self, other: &EntrySet) -> EntrySet {
        let entries = self
            .entries
            .into_iter()
            .filter(|(link, _)| !other.entries.contains_key(link))
            .collect();
        EntrySet { entries }
    }

    /// Flag every entry as newly retrieved.
    pub fn mark_fresh(&mut self) {
        for entry in self.entries.values_mut() {
            entry.fresh = true;
        }
    }

    /// Entries ordered newest first; undated entries last, ties broken by link.
    pub fn into_sorted_vec(self) -> Vec<Entry> {
        let mut entries: Vec<Entry> = self.entries.into_values().collect();
        entries.sort_by(|a, b| {
            b.publication_date
                .cmp(&a.publication_date)
                .then_with(|| a.link.cmp(&b.link))
        });
        entries
    }
}

impl Extend<Entry> for EntrySet {
    fn extend<I: IntoIterator<Item = Entry>>(&mut self, iter: I) {
        for entry in iter {
            self.insert(entry);
        }
    }
}

impl FromIterator<Entry> for EntrySet {
    fn from_iter<I: IntoIterator<Item = Entry>>(iter: I) -> Self {
        let mut set = EntrySet::new();
        set.extend(iter);
        set
    }
}

impl IntoIterator for EntrySet {
    type Item = Entry;
    type IntoIter = hash_map::IntoValues<EntryLink, Entry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_values()
    }
}
