//! Page server: paginated, read-only access to extracted pages.

use std::fs;
use std::sync::Arc;

use serde::Serialize;

use super::evict::CacheEvictor;
use super::layout::CacheLayout;
use crate::Error;
use crate::identity::ContentIdentity;

/// Handle over the ordered pages of one materialized entry.
#[derive(Debug, Clone)]
pub struct PageSequence {
    identity: ContentIdentity,
    pages: Vec<String>,
}

impl PageSequence {
    pub fn identity(&self) -> &ContentIdentity {
        &self.identity
    }

    pub fn total_pages(&self) -> usize {
        self.pages.len()
    }
}

/// One batch of page references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, schemars::JsonSchema)]
pub struct PageSlice {
    pub identity: ContentIdentity,
    /// Relative references `<identity>_extracted/<page file>`, in reading order.
    pub images: Vec<String>,
    /// The requested offset, clamped to `[0, total_pages]`.
    pub offset: usize,
    pub total_pages: usize,
}

#[derive(Debug, Clone)]
pub struct PageServer {
    layout: CacheLayout,
    evictor: Arc<CacheEvictor>,
}

impl PageServer {
    pub fn new(evictor: Arc<CacheEvictor>) -> Self {
        Self { layout: evictor.layout().clone(), evictor }
    }

    /// Open the extracted pages of `identity`.
    ///
    /// Fails with `NotFound` when the entry is absent or has no pages; the
    /// caller must fetch and extract it again first.
    pub fn open_for_reading(&self, identity: &ContentIdentity) -> Result<PageSequence, Error> {
        let pages = self
            .layout
            .list_pages(identity)
            .map_err(|e| Error::storage(self.layout.extracted_dir(identity).display(), e))?;

        if pages.is_empty() {
            return Err(Error::NotFound(format!("no extracted pages for {identity}")));
        }
        Ok(PageSequence { identity: identity.clone(), pages })
    }

    /// Return up to `page_size` references starting at `offset`.
    ///
    /// Admits the identity first, which refreshes its recency and sweeps the
    /// cache with it marked active. Reading past the end yields an empty
    /// slice.
    pub fn get_page(&self, handle: &PageSequence, offset: usize, page_size: usize) -> PageSlice {
        self.evictor.admit(&handle.identity);

        let total_pages = handle.total_pages();
        let offset = offset.min(total_pages);
        let end = offset.saturating_add(page_size).min(total_pages);
        let images = handle.pages[offset..end]
            .iter()
            .map(|page| CacheLayout::page_reference(&handle.identity, page))
            .collect();

        PageSlice { identity: handle.identity.clone(), images, offset, total_pages }
    }

    /// Bytes of the page at `index` (zero-based).
    pub fn read_page(&self, handle: &PageSequence, index: usize) -> Result<Vec<u8>, Error> {
        let Some(page) = handle.pages.get(index) else {
            return Err(Error::NotFound(format!(
                "page {index} of {} (total {})",
                handle.identity,
                handle.total_pages()
            )));
        };

        self.evictor.admit(&handle.identity);

        let path = self.layout.extracted_dir(&handle.identity).join(page);
        fs::read(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::NotFound(format!("page {index} of {} was evicted", handle.identity)),
            _ => Error::storage(path.display(), e),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::index::CacheIndex;
    use crate::cache::layout::page_file_name;
    use crate::identity::compute_identity;

    fn setup(pages: usize) -> (tempfile::TempDir, PageServer, ContentIdentity) {
        let tmp = tempfile::tempdir().unwrap();
        let layout = CacheLayout::new(tmp.path().join("cache"));
        layout.create().unwrap();

        let identity = compute_identity("https://example.com/series/vol1.cbz");
        let dir = layout.extracted_dir(&identity);
        fs::create_dir(&dir).unwrap();
        for i in 0..pages {
            fs::write(dir.join(page_file_name(i)), format!("page {i}")).unwrap();
        }

        let evictor = Arc::new(CacheEvictor::new(
            layout,
            tmp.path().join("staging"),
            u64::MAX,
            Arc::new(CacheIndex::new()),
        ));
        (tmp, PageServer::new(evictor), identity)
    }

    #[test]
    fn test_open_missing_is_not_found() {
        let (_tmp, server, _) = setup(0);
        let other = compute_identity("https://example.com/other.zip");
        assert!(matches!(server.open_for_reading(&other), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_open_empty_dir_is_not_found() {
        let (_tmp, server, identity) = setup(0);
        assert!(matches!(server.open_for_reading(&identity), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_first_batch() {
        let (_tmp, server, identity) = setup(12);
        let handle = server.open_for_reading(&identity).unwrap();

        let slice = server.get_page(&handle, 0, 5);
        assert_eq!(slice.offset, 0);
        assert_eq!(slice.total_pages, 12);
        assert_eq!(slice.images.len(), 5);
        assert_eq!(slice.images[0], format!("{identity}_extracted/000000.png"));
        assert_eq!(slice.images[4], format!("{identity}_extracted/000004.png"));
    }

    #[test]
    fn test_last_partial_batch() {
        let (_tmp, server, identity) = setup(12);
        let handle = server.open_for_reading(&identity).unwrap();

        let slice = server.get_page(&handle, 10, 5);
        assert_eq!(slice.images.len(), 2);
        assert_eq!(slice.total_pages, 12);
    }

    #[test]
    fn test_offset_at_end_is_empty() {
        let (_tmp, server, identity) = setup(12);
        let handle = server.open_for_reading(&identity).unwrap();

        let slice = server.get_page(&handle, 12, 5);
        assert!(slice.images.is_empty());
        assert_eq!(slice.offset, 12);
        assert_eq!(slice.total_pages, 12);
    }

    #[test]
    fn test_offset_beyond_end_is_clamped() {
        let (_tmp, server, identity) = setup(3);
        let handle = server.open_for_reading(&identity).unwrap();

        let slice = server.get_page(&handle, usize::MAX, usize::MAX);
        assert!(slice.images.is_empty());
        assert_eq!(slice.offset, 3);
    }

    #[test]
    fn test_read_page() {
        let (_tmp, server, identity) = setup(3);
        let handle = server.open_for_reading(&identity).unwrap();

        assert_eq!(server.read_page(&handle, 2).unwrap(), b"page 2");
        assert!(matches!(server.read_page(&handle, 3), Err(Error::NotFound(_))));
    }
}
