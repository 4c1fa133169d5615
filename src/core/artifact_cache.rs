//! Memoizing artifact cache.
//!
//! Maps a logical key (directory + file name) to an open handle and the
//! payload found in it. Only complete hits are cached: a miss that fails to
//! open or to find the payload is not remembered, so the next call retries.
//! Entries are never evicted; `release` closes all of them at once and is
//! meant to be called from the owning worker's `on_stop`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use tracing::{debug, warn};

use crate::adapters::artifact_store::{ArtifactError, ArtifactStore};

/// Cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactKey {
    pub dir: PathBuf,
    pub file: String,
}

impl ArtifactKey {
    fn path(&self) -> PathBuf {
        self.dir.join(&self.file)
    }
}

/// A cached handle and its payload. Clones share the same allocations.
#[derive(Debug)]
pub struct CachedArtifact<H, P> {
    pub handle: Rc<H>,
    pub payload: Rc<P>,
}

impl<H, P> Clone for CachedArtifact<H, P> {
    fn clone(&self) -> Self {
        Self {
            handle: Rc::clone(&self.handle),
            payload: Rc::clone(&self.payload),
        }
    }
}

/// Artifact cache over a store, rooted at one working directory
pub struct ArtifactCache<S: ArtifactStore> {
    store: S,
    dir: PathBuf,
    entries: HashMap<ArtifactKey, CachedArtifact<S::Handle, S::Payload>>,
}

impl<S: ArtifactStore> ArtifactCache<S> {
    /// Create an empty cache reading from `dir`
    pub fn new(store: S, dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            dir: dir.into(),
            entries: HashMap::new(),
        }
    }

    /// Working directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn key(&self, file: &str) -> ArtifactKey {
        ArtifactKey {
            dir: self.dir.clone(),
            file: file.to_string(),
        }
    }

    /// Handle and payload for `file`, opening it on first use.
    ///
    /// The payload name is only used on a miss: a cached file returns the
    /// payload it was first opened with.
    pub fn get(&mut self, file: &str, name: &str) -> Result<CachedArtifact<S::Handle, S::Payload>, ArtifactError> {
        let key = self.key(file);
        if let Some(entry) = self.entries.get(&key) {
            return Ok(entry.clone());
        }

        let path = key.path();
        let handle = self.store.open(&path)?;
        let payload = match self.store.lookup(&handle, name) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(path = %path.display(), tree = name, error = %e, "Failed to grab payload");
                if let Err(close_err) = self.store.close(&handle) {
                    debug!(path = %path.display(), error = %close_err, "Failed to close artifact after miss");
                }
                return Err(e);
            }
        };

        let entry = CachedArtifact {
            handle: Rc::new(handle),
            payload: Rc::new(payload),
        };
        self.entries.insert(key, entry.clone());
        debug!(path = %path.display(), tree = name, "Cached artifact");

        Ok(entry)
    }

    /// Whether `file` is cached
    pub fn contains(&self, file: &str) -> bool {
        self.entries.contains_key(&self.key(file))
    }

    /// Number of cached artifacts
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is cached
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Close every cached handle and empty the cache.
    ///
    /// All handles are closed even if some fail; the first failure is returned.
    pub fn release(&mut self) -> Result<(), ArtifactError> {
        let mut first_err = None;

        for (key, entry) in self.entries.drain() {
            if let Err(e) = self.store.close(&entry.handle) {
                warn!(path = %key.path().display(), error = %e, "Failed to close artifact");
                first_err.get_or_insert(e);
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// The underlying store
    pub fn store(&self) -> &S {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct Calls {
        opened: Vec<PathBuf>,
        closed: usize,
    }

    /// Store that knows one file with one tree and records calls
    struct FakeStore {
        calls: Rc<RefCell<Calls>>,
        fail_close: bool,
    }

    impl FakeStore {
        fn new() -> (Self, Rc<RefCell<Calls>>) {
            let calls = Rc::new(RefCell::new(Calls::default()));
            (
                Self {
                    calls: Rc::clone(&calls),
                    fail_close: false,
                },
                calls,
            )
        }
    }

    impl ArtifactStore for FakeStore {
        type Handle = String;
        type Payload = Vec<u32>;

        fn open(&mut self, path: &Path) -> Result<String, ArtifactError> {
            self.calls.borrow_mut().opened.push(path.to_path_buf());
            if path.ends_with("missing.json") {
                return Err(ArtifactError::Open {
                    path: path.to_path_buf(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
                });
            }
            Ok(path.display().to_string())
        }

        fn lookup(&mut self, handle: &String, name: &str) -> Result<Vec<u32>, ArtifactError> {
            if name == "h3000" {
                Ok(vec![1, 2, 3])
            } else {
                Err(ArtifactError::MissingTree {
                    path: PathBuf::from(handle),
                    name: name.to_string(),
                })
            }
        }

        fn close(&mut self, handle: &String) -> Result<(), ArtifactError> {
            self.calls.borrow_mut().closed += 1;
            if self.fail_close {
                return Err(ArtifactError::Close {
                    path: PathBuf::from(handle),
                    reason: "busy".to_string(),
                });
            }
            Ok(())
        }
    }

    #[test]
    fn test_hit_returns_same_handle() {
        let (store, calls) = FakeStore::new();
        let mut cache = ArtifactCache::new(store, "/calib");

        let first = cache.get("run1.json", "h3000").unwrap();
        let second = cache.get("run1.json", "h3000").unwrap();

        assert!(Rc::ptr_eq(&first.handle, &second.handle));
        assert!(Rc::ptr_eq(&first.payload, &second.payload));
        assert_eq!(calls.borrow().opened, vec![PathBuf::from("/calib/run1.json")]);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_payload_name_not_part_of_key() {
        let (store, calls) = FakeStore::new();
        let mut cache = ArtifactCache::new(store, "/calib");

        cache.get("run1.json", "h3000").unwrap();
        let again = cache.get("run1.json", "other").unwrap();

        assert_eq!(*again.payload, vec![1, 2, 3]);
        assert_eq!(calls.borrow().opened.len(), 1);
    }

    #[test]
    fn test_failed_open_is_not_cached() {
        let (store, calls) = FakeStore::new();
        let mut cache = ArtifactCache::new(store, "/calib");

        assert!(cache.get("missing.json", "h3000").is_err());
        assert!(cache.get("missing.json", "h3000").is_err());

        assert_eq!(calls.borrow().opened.len(), 2);
        assert!(!cache.contains("missing.json"));
    }

    #[test]
    fn test_failed_lookup_is_not_cached_and_closes() {
        let (store, calls) = FakeStore::new();
        let mut cache = ArtifactCache::new(store, "/calib");

        let err = cache.get("run1.json", "nope").unwrap_err();
        assert!(matches!(err, ArtifactError::MissingTree { .. }));
        assert!(cache.is_empty());
        assert_eq!(calls.borrow().closed, 1);

        // retry with a good name succeeds and opens again
        cache.get("run1.json", "h3000").unwrap();
        assert_eq!(calls.borrow().opened.len(), 2);
    }

    #[test]
    fn test_release_closes_everything() {
        let (store, calls) = FakeStore::new();
        let mut cache = ArtifactCache::new(store, "/calib");
        cache.get("a.json", "h3000").unwrap();
        cache.get("b.json", "h3000").unwrap();

        cache.release().unwrap();

        assert!(cache.is_empty());
        assert_eq!(calls.borrow().closed, 2);
    }

    #[test]
    fn test_release_reports_close_failure_after_closing_all() {
        let (mut store, calls) = FakeStore::new();
        store.fail_close = true;
        let mut cache = ArtifactCache::new(store, "/calib");
        cache.get("a.json", "h3000").unwrap();
        cache.get("b.json", "h3000").unwrap();

        assert!(matches!(cache.release(), Err(ArtifactError::Close { .. })));
        assert_eq!(calls.borrow().closed, 2);
        assert!(cache.is_empty());
    }
}
