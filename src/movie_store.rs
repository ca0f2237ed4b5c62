use rocksdb::{BlockBasedOptions, ColumnFamily, ColumnFamilyDescriptor, IteratorMode, Options, WriteBatch, DB};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::record::{EnrichedRecord, StoredMovie};

/// The only field movies are unique by.
pub const KEY_FIELD: &str = "url";

const META_CF: &str = "meta";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// Persistence keyed by canonical movie URL: at most one stored movie per key.
pub trait DedupStore: Send + Sync {
    /// Declares the unique key. Idempotent; must run before the first `upsert`.
    fn ensure_unique_key(&self, field: &str) -> Result<(), StoreError>;

    /// Inserts the record, or overwrites every non-key field of the existing one.
    fn upsert(&self, record: &EnrichedRecord) -> Result<UpsertOutcome, StoreError>;

    fn get(&self, url: &str) -> Result<Option<StoredMovie>, StoreError>;

    fn count(&self) -> Result<usize, StoreError>;

    /// Highest rated first, ties by title.
    fn top_by_rating(&self, n: usize) -> Result<Vec<StoredMovie>, StoreError>;

    /// Removes every stored movie and returns how many there were.
    fn wipe(&self) -> Result<usize, StoreError>;
}

fn check_key_field(field: &str) -> Result<(), StoreError> {
    if field == KEY_FIELD {
        Ok(())
    } else {
        Err(StoreError::ConstraintViolation(format!(
            "movies are keyed by `{KEY_FIELD}`, not `{field}`"
        )))
    }
}

fn stored_shape(record: &EnrichedRecord) -> Result<StoredMovie, StoreError> {
    record.to_stored().ok_or_else(|| {
        StoreError::ConstraintViolation(format!(
            "record `{}` has no canonical url",
            record.candidate.title
        ))
    })
}

fn rank(mut movies: Vec<StoredMovie>, n: usize) -> Vec<StoredMovie> {
    movies.sort_by(|a, b| b.rating.total_cmp(&a.rating).then_with(|| a.title.cmp(&b.title)));
    movies.truncate(n);
    movies
}

/// RocksDB-backed movie store.
/// Column families:
/// - "<namespace>.<collection>": canonical url -> JSON movie
/// - "meta": unique key declarations
pub struct RocksMovieStore {
    db: Arc<DB>,
    family: String,
    key_ready: Arc<AtomicBool>,
}

impl RocksMovieStore {
    /// Opens (or creates) the database with tuned RocksDB settings.
    pub fn open(config: &StoreConfig) -> Result<Self, StoreError> {
        config
            .validate()
            .map_err(|e| StoreError::ConnectionUnavailable(e.to_string()))?;
        if let Some(parent) = config.uri.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::ConnectionUnavailable(e.to_string()))?;
        }

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        opts.set_write_buffer_size(16 * 1024 * 1024);
        opts.set_max_write_buffer_number(3);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts.increase_parallelism(num_cpus::get() as i32);

        let mut block_opts = BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        block_opts.set_block_cache(&rocksdb::Cache::new_lru_cache(64 * 1024 * 1024));
        opts.set_block_based_table_factory(&block_opts);

        let family = config.family_name();
        let mut families = existing_families(&opts, &config.uri);
        for required in [META_CF, family.as_str()] {
            if !families.iter().any(|f| f == required) {
                families.push(required.to_string());
            }
        }

        let descriptors = families
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(name, opts.clone()))
            .collect::<Vec<_>>();
        let db = DB::open_cf_descriptors(&opts, &config.uri, descriptors)?;
        info!(path = %config.uri.display(), %family, "opened movie store");

        Ok(Self {
            db: Arc::new(db),
            family,
            key_ready: Arc::new(AtomicBool::new(false)),
        })
    }

    fn movies(&self) -> Result<&ColumnFamily, StoreError> {
        self.handle(&self.family)
    }

    fn handle(&self, name: &str) -> Result<&ColumnFamily, StoreError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::ConnectionUnavailable(format!("missing column family {name}")))
    }

    fn scan(&self) -> Result<Vec<StoredMovie>, StoreError> {
        let cf = self.movies()?;
        let mut movies = Vec::new();
        for entry in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_, value) = entry?;
            movies.push(serde_json::from_slice(&value)?);
        }
        Ok(movies)
    }
}

fn existing_families(opts: &Options, path: &Path) -> Vec<String> {
    // A fresh directory has no families to list yet.
    DB::list_cf(opts, path).unwrap_or_default()
}

impl DedupStore for RocksMovieStore {
    fn ensure_unique_key(&self, field: &str) -> Result<(), StoreError> {
        check_key_field(field)?;
        let meta = self.handle(META_CF)?;
        let meta_key = format!("unique_key:{}", self.family);

        match self.db.get_cf(meta, meta_key.as_bytes())? {
            Some(existing) if existing != field.as_bytes() => {
                return Err(StoreError::ConstraintViolation(format!(
                    "{} is already keyed by `{}`",
                    self.family,
                    String::from_utf8_lossy(&existing)
                )));
            }
            Some(_) => {}
            None => self.db.put_cf(meta, meta_key.as_bytes(), field.as_bytes())?,
        }

        self.key_ready.store(true, Ordering::Release);
        Ok(())
    }

    fn upsert(&self, record: &EnrichedRecord) -> Result<UpsertOutcome, StoreError> {
        if !self.key_ready.load(Ordering::Acquire) {
            return Err(StoreError::ConstraintViolation(
                "unique key not established before first write".into(),
            ));
        }
        let movie = stored_shape(record)?;
        let cf = self.movies()?;
        let key = movie.url.as_bytes();

        let outcome = if self.db.get_cf(cf, key)?.is_some() {
            UpsertOutcome::Updated
        } else {
            UpsertOutcome::Inserted
        };
        // Single put: a concurrent writer to the same key sees one whole record or the other.
        self.db.put_cf(cf, key, serde_json::to_vec(&movie)?)?;
        debug!(url = %movie.url, title = %movie.title, ?outcome, "upserted movie");

        Ok(outcome)
    }

    fn get(&self, url: &str) -> Result<Option<StoredMovie>, StoreError> {
        let key = crate::record::canonical_url(url);
        let cf = self.movies()?;
        match self.db.get_cf(cf, key.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn count(&self) -> Result<usize, StoreError> {
        let cf = self.movies()?;
        let mut count = 0;
        for entry in self.db.iterator_cf(cf, IteratorMode::Start) {
            entry?;
            count += 1;
        }
        Ok(count)
    }

    fn top_by_rating(&self, n: usize) -> Result<Vec<StoredMovie>, StoreError> {
        Ok(rank(self.scan()?, n))
    }

    fn wipe(&self) -> Result<usize, StoreError> {
        let cf = self.movies()?;
        let mut batch = WriteBatch::default();
        let mut removed = 0;
        for entry in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, _) = entry?;
            batch.delete_cf(cf, key);
            removed += 1;
        }
        self.db.write(batch)?;
        info!(family = %self.family, removed, "wiped movie store");
        Ok(removed)
    }
}

// Make RocksMovieStore cloneable by cloning the Arc
impl Clone for RocksMovieStore {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            family: self.family.clone(),
            key_ready: self.key_ready.clone(),
        }
    }
}

/// In-process store for dry runs and tests. Same contract as [`RocksMovieStore`].
#[derive(Default)]
pub struct MemoryMovieStore {
    movies: Mutex<HashMap<String, StoredMovie>>,
    key_field: Mutex<Option<String>>,
}

impl MemoryMovieStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_movies(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, StoredMovie>>, StoreError> {
        self.movies
            .lock()
            .map_err(|_| StoreError::ConnectionUnavailable("memory store poisoned".into()))
    }
}

impl DedupStore for MemoryMovieStore {
    fn ensure_unique_key(&self, field: &str) -> Result<(), StoreError> {
        check_key_field(field)?;
        let mut key_field = self
            .key_field
            .lock()
            .map_err(|_| StoreError::ConnectionUnavailable("memory store poisoned".into()))?;
        if key_field.is_none() {
            *key_field = Some(field.to_string());
        }
        Ok(())
    }

    fn upsert(&self, record: &EnrichedRecord) -> Result<UpsertOutcome, StoreError> {
        let ready = self
            .key_field
            .lock()
            .map(|k| k.is_some())
            .map_err(|_| StoreError::ConnectionUnavailable("memory store poisoned".into()))?;
        if !ready {
            return Err(StoreError::ConstraintViolation(
                "unique key not established before first write".into(),
            ));
        }
        let movie = stored_shape(record)?;
        let previous = self.lock_movies()?.insert(movie.url.clone(), movie);
        Ok(if previous.is_some() { UpsertOutcome::Updated } else { UpsertOutcome::Inserted })
    }

    fn get(&self, url: &str) -> Result<Option<StoredMovie>, StoreError> {
        let key = crate::record::canonical_url(url);
        Ok(self.lock_movies()?.get(&key).cloned())
    }

    fn count(&self) -> Result<usize, StoreError> {
        Ok(self.lock_movies()?.len())
    }

    fn top_by_rating(&self, n: usize) -> Result<Vec<StoredMovie>, StoreError> {
        Ok(rank(self.lock_movies()?.values().cloned().collect(), n))
    }

    fn wipe(&self) -> Result<usize, StoreError> {
        let mut movies = self.lock_movies()?;
        let removed = movies.len();
        movies.clear();
        Ok(removed)
    }
}

impl<S: DedupStore + ?Sized> DedupStore for Arc<S> {
    fn ensure_unique_key(&self, field: &str) -> Result<(), StoreError> {
        (**self).ensure_unique_key(field)
    }

    fn upsert(&self, record: &EnrichedRecord) -> Result<UpsertOutcome, StoreError> {
        (**self).upsert(record)
    }

    fn get(&self, url: &str) -> Result<Option<StoredMovie>, StoreError> {
        (**self).get(url)
    }

    fn count(&self) -> Result<usize, StoreError> {
        (**self).count()
    }

    fn top_by_rating(&self, n: usize) -> Result<Vec<StoredMovie>, StoreError> {
        (**self).top_by_rating(n)
    }

    fn wipe(&self) -> Result<usize, StoreError> {
        (**self).wipe()
    }
}
