//! The manga library: validate, fetch, extract and serve pages.
//!
//! `Library` ties the cache components together and is the only surface the
//! server talks to. Preparing an identity (fetch + extract) is single-flight:
//! a per-identity async lock serializes builders, and whoever gets the lock
//! second finds the finished pages and returns immediately.
//!
//! Extraction writes into a staging directory under `temp_dir` which is
//! renamed into the cache root only once complete, so a reader never sees a
//! partially extracted entry. Any failure rolls back every artifact of the
//! identity through the eviction engine.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use mangashelf_core::archive::{self, DeclaredArchive};
use mangashelf_core::cache::{CacheEvictor, CacheIndex, CacheLayout, PageServer, PageSlice};
use mangashelf_core::identity::{self, ContentIdentity, compute_identity};
use mangashelf_core::{AppConfig, ArchiveFormat, CacheEntry, CatalogDb, Error, SourceRecord};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::extract::Extractors;
use crate::fetch::{FetchClient, FetchConfig, FetchOutcome};

/// A prepared identity, ready for page requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ReadyEntry {
    pub identity: ContentIdentity,
    pub title: String,
    pub format: ArchiveFormat,
    pub total_pages: usize,
    /// False when this call had to download or extract.
    pub cached: bool,
}

/// Cache occupancy as recorded in the index.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStatus {
    pub total_bytes: u64,
    pub limit_bytes: u64,
    /// Most recently used first.
    pub entries: Vec<CacheEntry>,
}

pub struct Library {
    config: AppConfig,
    layout: CacheLayout,
    index: Arc<CacheIndex>,
    evictor: Arc<CacheEvictor>,
    pages: PageServer,
    catalog: CatalogDb,
    fetcher: FetchClient,
    extractors: Extractors,
    /// Per-identity build locks.
    build_locks: Mutex<HashMap<ContentIdentity, Arc<tokio::sync::Mutex<()>>>>,
}

impl Library {
    /// Open the library described by `config`, creating directories and the
    /// catalog as needed.
    pub async fn open(config: AppConfig) -> Result<Self, Error> {
        let catalog = CatalogDb::open(&config.db_path).await?;
        Self::with_catalog(config, catalog).await
    }

    /// Open with an already opened catalog.
    ///
    /// Performs startup reconciliation: stale staging content is removed and
    /// the index is rebuilt from the cache root joined with the catalog.
    pub async fn with_catalog(config: AppConfig, catalog: CatalogDb) -> Result<Self, Error> {
        let extractors = Extractors::from_config(&config);
        Self::with_parts(config, catalog, extractors).await
    }

    /// Open with custom extractors.
    pub async fn with_parts(config: AppConfig, catalog: CatalogDb, extractors: Extractors) -> Result<Self, Error> {
        let layout = CacheLayout::new(&config.cache_dir);
        let temp_dir = config.temp_dir.clone();
        let sources = catalog.list_sources().await?;

        let rebuild_layout = layout.clone();
        let index = blocking(move || {
            rebuild_layout
                .create()
                .map_err(|e| Error::storage(rebuild_layout.root().display(), e))?;
            reset_dir(&temp_dir)?;
            CacheIndex::rebuild(&rebuild_layout, &sources).map_err(|e| Error::storage(rebuild_layout.root().display(), e))
        })
        .await?;

        let index = Arc::new(index);
        let evictor = Arc::new(CacheEvictor::new(
            layout.clone(),
            &config.temp_dir,
            config.cache_limit_bytes,
            Arc::clone(&index),
        ));
        let pages = PageServer::new(Arc::clone(&evictor));
        let fetcher = FetchClient::new(FetchConfig::from(&config))?;

        tracing::info!(
            cache_dir = %config.cache_dir.display(),
            entries = index.len(),
            limit_bytes = config.cache_limit_bytes,
            "library opened"
        );

        Ok(Self {
            config,
            layout,
            index,
            evictor,
            pages,
            catalog,
            fetcher,
            extractors,
            build_locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Validate `url`, then fetch and extract it unless already cached.
    pub async fn ensure_ready(&self, url: &str) -> Result<ReadyEntry, Error> {
        let url = identity::validate(url, &self.config.allowlist_domains)?;
        let declared = archive::detect(&url)?;
        let identity = compute_identity(url.as_str());
        let title = identity::derive_title(&url, &identity);

        self.prepare(identity, url, declared, title).await
    }

    /// Make a previously added identity ready again, re-downloading it from
    /// its recorded source if it was evicted.
    pub async fn reopen(&self, identity: &ContentIdentity) -> Result<ReadyEntry, Error> {
        let Some(source) = self.catalog.get_source(identity).await? else {
            return Err(Error::NotFound(format!("unknown identity {identity}")));
        };
        self.ensure_ready(&source.url).await
    }

    /// One batch of page references; `page_size` defaults to the configured size.
    pub async fn fetch_page(
        &self, identity: &ContentIdentity, offset: usize, page_size: Option<usize>,
    ) -> Result<PageSlice, Error> {
        let page_size = page_size.unwrap_or(self.config.page_size);
        let pages = self.pages.clone();
        let identity = identity.clone();

        blocking(move || {
            let handle = pages.open_for_reading(&identity)?;
            Ok(pages.get_page(&handle, offset, page_size))
        })
        .await
    }

    /// PNG bytes of the page at `index`.
    pub async fn read_page(&self, identity: &ContentIdentity, index: usize) -> Result<Vec<u8>, Error> {
        let pages = self.pages.clone();
        let identity = identity.clone();

        blocking(move || {
            let handle = pages.open_for_reading(&identity)?;
            pages.read_page(&handle, index)
        })
        .await
    }

    /// Remove every cached artifact. The catalog is kept.
    pub async fn purge(&self) -> Result<(), Error> {
        let evictor = Arc::clone(&self.evictor);
        blocking(move || evictor.clear_all()).await
    }

    pub fn status(&self) -> CacheStatus {
        CacheStatus {
            total_bytes: self.index.total_bytes(),
            limit_bytes: self.evictor.limit_bytes(),
            entries: self.index.entries(),
        }
    }

    /// Every source ever prepared, cached or not.
    pub async fn sources(&self) -> Result<Vec<SourceRecord>, Error> {
        self.catalog.list_sources().await
    }

    async fn prepare(
        &self, identity: ContentIdentity, url: Url, declared: DeclaredArchive, title: String,
    ) -> Result<ReadyEntry, Error> {
        let _pin = self.evictor.pin(&identity);
        let lock = self.build_lock(&identity);
        let result = {
            let _guard = lock.lock().await;
            self.prepare_locked(&identity, &url, &declared, &title).await
        };
        self.release_build_lock(&identity, lock);

        let (total_pages, cached) = result?;
        Ok(ReadyEntry { identity, title, format: declared.format, total_pages, cached })
    }

    async fn prepare_locked(
        &self, identity: &ContentIdentity, url: &Url, declared: &DeclaredArchive, title: &str,
    ) -> Result<(usize, bool), Error> {
        let layout = self.layout.clone();
        let id = identity.clone();
        let existing = blocking(move || {
            layout
                .list_pages(&id)
                .map(|pages| pages.len())
                .map_err(|e| Error::storage(layout.extracted_dir(&id).display(), e))
        })
        .await?;

        if existing > 0 {
            tracing::debug!(identity = %identity, pages = existing, "cache hit");
            if !self.index.contains(identity) {
                self.record(identity, url, declared, title, existing).await?;
            }
            return Ok((existing, true));
        }

        match self.build(identity, url, declared).await {
            Ok(pages) => {
                self.record(identity, url, declared, title, pages).await?;
                Ok((pages, false))
            }
            Err(e) => {
                tracing::warn!(identity = %identity, url = %url, error = %e, "preparing archive failed, rolling back");
                let evictor = Arc::clone(&self.evictor);
                let id = identity.clone();
                if let Err(rollback) = blocking(move || evictor.discard(&id)).await {
                    tracing::error!(identity = %identity, error = %rollback, "rollback incomplete");
                }
                Err(e)
            }
        }
    }

    /// Fetch and extract into place; returns the page count.
    async fn build(&self, identity: &ContentIdentity, url: &Url, declared: &DeclaredArchive) -> Result<usize, Error> {
        let archive_path = self.layout.archive_path(identity, &declared.extension);
        if let FetchOutcome::Downloaded { bytes } = self.fetcher.fetch(url, &archive_path).await? {
            tracing::debug!(identity = %identity, bytes, "archive fetched");
        }

        let temp_dir = self.config.temp_dir.clone();
        let staging = blocking(move || {
            std::fs::create_dir_all(&temp_dir).map_err(|e| Error::storage(temp_dir.display(), e))?;
            tempfile::Builder::new()
                .prefix("extract-")
                .tempdir_in(&temp_dir)
                .map_err(|e| Error::storage(temp_dir.display(), e))
        })
        .await?;
        let staged = staging.path().join("pages");

        let pages = self
            .extractors
            .for_format(declared.format)
            .extract(&archive_path, &staged)
            .await?;
        if pages == 0 {
            return Err(Error::NoImagesFound(format!("{url} contains no readable images")));
        }

        let target = self.layout.extracted_dir(identity);
        blocking(move || {
            install(&staged, &target)?;
            drop(staging);
            Ok(())
        })
        .await?;

        tracing::info!(identity = %identity, pages, format = %declared.format, "archive extracted");
        Ok(pages)
    }

    /// Update catalog and index for a materialized identity and run a sweep
    /// with it active.
    async fn record(
        &self, identity: &ContentIdentity, url: &Url, declared: &DeclaredArchive, title: &str, pages: usize,
    ) -> Result<(), Error> {
        let record = SourceRecord {
            identity: identity.clone(),
            url: url.to_string(),
            title: title.to_string(),
            format: declared.format,
            added_at: chrono::Utc::now().to_rfc3339(),
        };
        if let Err(e) = self.catalog.upsert_source(&record).await {
            tracing::warn!(identity = %identity, error = %e, "failed to record source in catalog");
        }

        let layout = self.layout.clone();
        let evictor = Arc::clone(&self.evictor);
        let archive_path = self.layout.archive_path(identity, &declared.extension);
        let id = identity.clone();
        let size_bytes = blocking(move || {
            evictor.admit(&id);
            Ok(entry_size(&archive_path, &layout.extracted_dir(&id)))
        })
        .await?;

        self.index.upsert(CacheEntry {
            identity: identity.clone(),
            source_url: Some(record.url),
            title: Some(record.title),
            format: declared.format,
            archive_path: Some(self.layout.archive_path(identity, &declared.extension)),
            extracted_dir: self.layout.extracted_dir(identity),
            page_count: pages,
            size_bytes,
            last_access: SystemTime::now(),
        });
        Ok(())
    }

    fn build_lock(&self, identity: &ContentIdentity) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.build_locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(identity.clone()).or_default().clone()
    }

    fn release_build_lock(&self, identity: &ContentIdentity, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self.build_locks.lock().unwrap_or_else(|e| e.into_inner());
        // the map and `lock` itself are the only holders left
        if Arc::strong_count(&lock) == 2 {
            locks.remove(identity);
        }
    }
}

async fn blocking<T, F>(f: F) -> Result<T, Error>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, Error> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Storage(format!("blocking task failed: {e}")))?
}

/// Remove everything under `dir` and recreate it empty.
fn reset_dir(dir: &Path) -> Result<(), Error> {
    match std::fs::remove_dir_all(dir) {
        Ok(()) => tracing::debug!(dir = %dir.display(), "removed stale staging content"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(Error::storage(dir.display(), e)),
    }
    std::fs::create_dir_all(dir).map_err(|e| Error::storage(dir.display(), e))
}

/// Rename a staged page directory onto `target`, replacing a leftover one.
fn install(staged: &Path, target: &Path) -> Result<(), Error> {
    match std::fs::remove_dir_all(target) {
        Ok(()) => tracing::debug!(target = %target.display(), "replaced stale extracted directory"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(Error::storage(target.display(), e)),
    }
    std::fs::rename(staged, target).map_err(|e| Error::storage(target.display(), e))
}

/// Archive size plus the size of every page file; missing parts count as zero.
fn entry_size(archive: &Path, extracted: &Path) -> u64 {
    let archive_bytes = std::fs::metadata(archive).map(|m| m.len()).unwrap_or(0);
    let page_bytes: u64 = std::fs::read_dir(extracted)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .filter_map(|e| e.metadata().ok())
                .filter(|m| m.is_file())
                .map(|m| m.len())
                .sum()
        })
        .unwrap_or(0);
    archive_bytes + page_bytes
}
