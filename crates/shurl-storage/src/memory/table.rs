use crate::error::{MemoryError, SnapshotError};
use jiff::Timestamp;
use shurl_core::{Created, Link};
use std::collections::{BTreeMap, HashMap};

/// The state owned by the link worker. Only the worker ever touches it.
#[derive(Debug, Default)]
pub(crate) struct LinkTable {
    links: HashMap<u64, Link>,
    urls: HashMap<String, u64>,
    last_id: u64,
}

impl LinkTable {
    /// Rebuilds the table and its URL index from a snapshot. The id counter
    /// resumes after the highest id found.
    pub(crate) fn from_snapshot(snapshot: BTreeMap<u64, Link>) -> Result<Self, SnapshotError> {
        let mut table = Self {
            links: HashMap::with_capacity(snapshot.len()),
            urls: HashMap::with_capacity(snapshot.len()),
            last_id: 0,
        };

        for (key, link) in snapshot {
            if key != link.id {
                return Err(SnapshotError::KeyMismatch { key, id: link.id });
            }
            if let Some(&first) = table.urls.get(&link.target_url) {
                return Err(SnapshotError::DuplicateUrl {
                    url: link.target_url,
                    first,
                    second: key,
                });
            }
            table.last_id = table.last_id.max(key);
            table.urls.insert(link.target_url.clone(), key);
            table.links.insert(key, link);
        }

        Ok(table)
    }

    pub(crate) fn snapshot(&self) -> BTreeMap<u64, Link> {
        self.links
            .iter()
            .map(|(&id, link)| (id, link.clone()))
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.links.len()
    }

    pub(crate) fn create(
        &mut self,
        target_url: String,
        expired_at: Option<Timestamp>,
    ) -> Result<Created, MemoryError> {
        if let Some(&id) = self.urls.get(&target_url) {
            if let Some(link) = self.links.get_mut(&id) {
                link.expired_at = expired_at;
                return Ok(Created { id, created: false });
            }
        }

        let id = self.last_id.checked_add(1).ok_or(MemoryError::IdExhausted)?;
        self.last_id = id;
        self.urls.insert(target_url.clone(), id);
        self.links.insert(id, Link::new(id, target_url, expired_at));
        Ok(Created { id, created: true })
    }

    pub(crate) fn get(&self, id: u64) -> Option<Link> {
        self.links.get(&id).cloned()
    }

    pub(crate) fn hit(&mut self, id: u64) -> Option<Link> {
        let link = self.links.get_mut(&id)?;
        link.hits = link.hits.saturating_add(1);
        Some(link.clone())
    }

    /// Returns `false` if the row does not exist.
    pub(crate) fn set_deleted(&mut self, id: u64, now: Timestamp) -> bool {
        match self.links.get_mut(&id) {
            Some(link) => {
                link.deleted_at.get_or_insert(now);
                true
            }
            None => false,
        }
    }

    /// Returns `false` if the row does not exist.
    pub(crate) fn delete(&mut self, id: u64) -> bool {
        match self.links.remove(&id) {
            Some(link) => {
                self.urls.remove(&link.target_url);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_assigns_sequential_ids() {
        let mut table = LinkTable::default();
        let a = table.create("https://a.example".into(), None).unwrap();
        let b = table.create("https://b.example".into(), None).unwrap();
        assert_eq!(a, Created { id: 1, created: true });
        assert_eq!(b, Created { id: 2, created: true });
    }

    #[test]
    fn create_existing_updates_expiration_only() {
        let mut table = LinkTable::default();
        table.create("https://a.example".into(), None).unwrap();
        table.hit(1).unwrap();

        let later = Timestamp::now();
        let again = table.create("https://a.example".into(), Some(later)).unwrap();
        assert_eq!(again, Created { id: 1, created: false });

        let link = table.get(1).unwrap();
        assert_eq!(link.expired_at, Some(later));
        assert_eq!(link.hits, 1);
    }

    #[test]
    fn set_deleted_keeps_first_timestamp() {
        let mut table = LinkTable::default();
        table.create("https://a.example".into(), None).unwrap();

        let first = Timestamp::from_second(1_000).unwrap();
        let second = Timestamp::from_second(2_000).unwrap();
        assert!(table.set_deleted(1, first));
        assert!(table.set_deleted(1, second));
        assert_eq!(table.get(1).unwrap().deleted_at, Some(first));
        assert!(!table.set_deleted(2, first));
    }

    #[test]
    fn delete_frees_the_url() {
        let mut table = LinkTable::default();
        table.create("https://a.example".into(), None).unwrap();
        assert!(table.delete(1));
        assert!(!table.delete(1));

        let recreated = table.create("https://a.example".into(), None).unwrap();
        assert_eq!(recreated, Created { id: 2, created: true });
    }

    #[test]
    fn from_snapshot_resumes_after_highest_id() {
        let mut snapshot = BTreeMap::new();
        snapshot.insert(3, Link::new(3, "https://c.example", None));
        snapshot.insert(7, Link::new(7, "https://g.example", None));

        let mut table = LinkTable::from_snapshot(snapshot).unwrap();
        assert_eq!(table.len(), 2);

        let created = table.create("https://h.example".into(), None).unwrap();
        assert_eq!(created.id, 8);
        let existing = table.create("https://c.example".into(), None).unwrap();
        assert_eq!(existing, Created { id: 3, created: false });
    }

    #[test]
    fn from_snapshot_rejects_inconsistent_entries() {
        let mut snapshot = BTreeMap::new();
        snapshot.insert(1, Link::new(2, "https://a.example", None));
        assert!(matches!(
            LinkTable::from_snapshot(snapshot),
            Err(SnapshotError::KeyMismatch { key: 1, id: 2 })
        ));

        let mut snapshot = BTreeMap::new();
        snapshot.insert(1, Link::new(1, "https://a.example", None));
        snapshot.insert(2, Link::new(2, "https://a.example", None));
        assert!(matches!(
            LinkTable::from_snapshot(snapshot),
            Err(SnapshotError::DuplicateUrl { first: 1, second: 2, .. })
        ));
    }
}
