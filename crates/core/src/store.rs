use std::collections::{HashMap, HashSet};

use tracing::{debug, info};

use crate::domain::{Record, RecordId};
use crate::error::CrawlError;
use crate::ports::{RecordRepository, Result};

/// In-memory record table with durable save points.
///
/// Rows keep their insertion order. Writes only reach the repository on
/// [`persist`](RecordStore::persist), which rewrites the whole table.
pub struct RecordStore {
    repository: Box<dyn RecordRepository>,
    rows: Vec<(RecordId, Record)>,
    index: HashMap<RecordId, usize>,
}

impl RecordStore {
    /// Loads existing rows, or creates and persists an empty table.
    pub fn open(repository: Box<dyn RecordRepository>) -> Result<Self> {
        let existed = repository.exists();
        let rows = if existed {
            repository.load()?
        } else {
            Vec::new()
        };

        let mut store = Self {
            repository,
            rows: Vec::with_capacity(rows.len()),
            index: HashMap::with_capacity(rows.len()),
        };
        for (id, record) in rows {
            store.upsert(id, record);
        }

        if existed {
            info!(location = %store.repository.location(), rows = store.len(), "record store loaded");
        } else {
            store.persist()?;
            info!(location = %store.repository.location(), "record store created");
        }
        Ok(store)
    }

    pub fn upsert(&mut self, id: RecordId, record: Record) {
        match self.index.get(&id) {
            Some(&pos) => self.rows[pos].1 = record,
            None => {
                self.index.insert(id, self.rows.len());
                self.rows.push((id, record));
            }
        }
    }

    pub fn persist(&self) -> Result<()> {
        self.repository.save(&self.rows)?;
        debug!(rows = self.rows.len(), "record store persisted");
        Ok(())
    }

    pub fn get(&self, id: &RecordId) -> Result<&Record> {
        self.index
            .get(id)
            .map(|&pos| &self.rows[pos].1)
            .ok_or(CrawlError::NotFound(*id))
    }

    pub fn delete(&mut self, _id: &RecordId) -> Result<()> {
        Err(CrawlError::NotImplemented("delete"))
    }

    pub fn update(&mut self, _id: &RecordId, _record: Record) -> Result<()> {
        Err(CrawlError::NotImplemented("update"))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&RecordId, &Record)> + '_ {
        self.rows.iter().map(|(id, record)| (id, record))
    }

    pub fn rows(&self) -> &[(RecordId, Record)] {
        &self.rows
    }

    /// Whether a post record for `post_url` is already stored.
    pub fn has_post(&self, post_url: &str) -> bool {
        self.rows
            .iter()
            .any(|(_, record)| record.is_post && record.post_url == post_url)
    }

    /// Checks the table invariants and describes every violation found:
    /// unique identifiers, replies pointing at a comment of the same post,
    /// and at most one post record per post url.
    pub fn integrity_violations(&self) -> Vec<String> {
        let mut violations = Vec::new();

        let mut seen = HashSet::new();
        for (id, _) in &self.rows {
            if !seen.insert(id) {
                violations.push(format!("identifier {id} appears more than once"));
            }
        }

        let mut post_records: HashMap<&str, usize> = HashMap::new();
        for (id, record) in &self.rows {
            if record.is_post {
                *post_records.entry(record.post_url.as_str()).or_default() += 1;
            }

            if let Some(parent_id) = &record.replies_to {
                match self.get(parent_id) {
                    Ok(parent) if parent.is_comment() && parent.post_url == record.post_url => {}
                    Ok(_) => violations.push(format!(
                        "reply {id} points at {parent_id}, which is not a comment of {}",
                        record.post_url
                    )),
                    Err(_) => violations.push(format!(
                        "reply {id} points at missing record {parent_id}"
                    )),
                }
            }
        }

        for (post_url, count) in post_records {
            if count > 1 {
                violations.push(format!("{post_url} has {count} post records"));
            }
        }
        violations
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use chrono::Utc;

    use super::*;

    /// Repository that keeps its "durable" copy in shared memory.
    #[derive(Clone, Default)]
    pub(crate) struct MemoryRepository {
        pub(crate) saved: Rc<RefCell<Option<Vec<(RecordId, Record)>>>>,
        pub(crate) saves: Rc<RefCell<usize>>,
    }

    impl RecordRepository for MemoryRepository {
        fn exists(&self) -> bool {
            self.saved.borrow().is_some()
        }

        fn load(&self) -> Result<Vec<(RecordId, Record)>> {
            Ok(self.saved.borrow().clone().unwrap_or_default())
        }

        fn save(&self, rows: &[(RecordId, Record)]) -> Result<()> {
            *self.saved.borrow_mut() = Some(rows.to_vec());
            *self.saves.borrow_mut() += 1;
            Ok(())
        }

        fn location(&self) -> String {
            "memory".to_string()
        }
    }

    fn comment(post_url: &str, replies_to: Option<RecordId>) -> Record {
        Record {
            post_url: post_url.to_string(),
            is_post: false,
            commenter: "someone".to_string(),
            text: Some("text".to_string()),
            replies_to,
            replies_count: None,
            likes: None,
            date: None,
            crawl_time: Utc::now(),
        }
    }

    #[test]
    fn test_open_creates_and_persists_empty_table() {
        let repo = MemoryRepository::default();
        let store = RecordStore::open(Box::new(repo.clone())).unwrap();
        assert!(store.is_empty());
        assert_eq!(*repo.saves.borrow(), 1);
        assert_eq!(repo.saved.borrow().as_ref().map(Vec::len), Some(0));
    }

    #[test]
    fn test_open_loads_existing_rows_in_order() {
        let repo = MemoryRepository::default();
        let rows: Vec<_> = (0..3)
            .map(|_| (RecordId::generate(), comment("p", None)))
            .collect();
        *repo.saved.borrow_mut() = Some(rows.clone());

        let store = RecordStore::open(Box::new(repo.clone())).unwrap();
        assert_eq!(store.rows(), rows.as_slice());
        assert_eq!(*repo.saves.borrow(), 0);
    }

    #[test]
    fn test_upsert_overwrites_same_identifier() {
        let mut store = RecordStore::open(Box::new(MemoryRepository::default())).unwrap();
        let id = RecordId::generate();
        store.upsert(id, comment("p", None));
        let mut changed = comment("p", None);
        changed.likes = Some("12 likes".to_string());
        store.upsert(id, changed.clone());

        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&id).unwrap(), &changed);
    }

    #[test]
    fn test_get_unknown_identifier_is_not_found() {
        let store = RecordStore::open(Box::new(MemoryRepository::default())).unwrap();
        let id = RecordId::generate();
        assert!(matches!(store.get(&id), Err(CrawlError::NotFound(missing)) if missing == id));
    }

    #[test]
    fn test_delete_and_update_are_not_supported() {
        let mut store = RecordStore::open(Box::new(MemoryRepository::default())).unwrap();
        let id = RecordId::generate();
        store.upsert(id, comment("p", None));
        assert!(matches!(store.delete(&id), Err(CrawlError::NotImplemented(_))));
        assert!(matches!(
            store.update(&id, comment("p", None)),
            Err(CrawlError::NotImplemented(_))
        ));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_persist_then_reopen_yields_same_table() {
        let repo = MemoryRepository::default();
        let mut store = RecordStore::open(Box::new(repo.clone())).unwrap();
        let parent = RecordId::generate();
        store.upsert(parent, comment("p", None));
        store.upsert(RecordId::generate(), comment("p", Some(parent)));
        store.persist().unwrap();

        let reopened = RecordStore::open(Box::new(repo)).unwrap();
        assert_eq!(reopened.rows(), store.rows());
    }

    #[test]
    fn test_integrity_violations_detects_bad_reply_links() {
        let mut store = RecordStore::open(Box::new(MemoryRepository::default())).unwrap();
        let parent = RecordId::generate();
        store.upsert(parent, comment("post-a", None));
        store.upsert(RecordId::generate(), comment("post-a", Some(parent)));
        assert!(store.integrity_violations().is_empty());

        // reply attached to a comment of another post
        store.upsert(RecordId::generate(), comment("post-b", Some(parent)));
        // reply to a record that was never stored
        store.upsert(RecordId::generate(), comment("post-a", Some(RecordId::generate())));
        assert_eq!(store.integrity_violations().len(), 2);
    }

    #[test]
    fn test_has_post_ignores_comments_of_that_post() {
        let mut store = RecordStore::open(Box::new(MemoryRepository::default())).unwrap();
        store.upsert(RecordId::generate(), comment("post-a", None));
        assert!(!store.has_post("post-a"));

        let mut post = comment("post-a", None);
        post.is_post = true;
        store.upsert(RecordId::generate(), post);
        assert!(store.has_post("post-a"));
        assert!(!store.has_post("post-b"));
    }

    #[test]
    fn test_integrity_violations_detects_duplicate_post_records() {
        let mut store = RecordStore::open(Box::new(MemoryRepository::default())).unwrap();
        let mut post = comment("post-a", None);
        post.is_post = true;
        store.upsert(RecordId::generate(), post.clone());
        assert!(store.integrity_violations().is_empty());
        store.upsert(RecordId::generate(), post);
        assert_eq!(store.integrity_violations().len(), 1);
    }
}
