//! Source record CRUD operations.

use super::connection::CatalogDb;
use crate::Error;
use crate::archive::ArchiveFormat;
use crate::identity::ContentIdentity;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

/// Where an identity's archive came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct SourceRecord {
    pub identity: ContentIdentity,
    pub url: String,
    pub title: String,
    pub format: ArchiveFormat,
    pub added_at: String,
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<(String, String, String, String, String)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn into_record((hash, url, title, format, added_at): (String, String, String, String, String)) -> Result<SourceRecord, Error> {
    Ok(SourceRecord { identity: hash.parse()?, url, title, format: format.parse()?, added_at })
}

impl CatalogDb {
    /// Insert or update a source record.
    ///
    /// Re-adding a known identity refreshes url/title/format but keeps the
    /// original `added_at`.
    pub async fn upsert_source(&self, record: &SourceRecord) -> Result<(), Error> {
        let record = record.clone();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO sources (hash, url, title, format, added_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT(hash) DO UPDATE SET
                        url = excluded.url,
                        title = excluded.title,
                        format = excluded.format",
                    params![
                        record.identity.as_str(),
                        &record.url,
                        &record.title,
                        record.format.as_str(),
                        &record.added_at,
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Get a source record by identity.
    ///
    /// Returns None if the identity has never been added.
    pub async fn get_source(&self, identity: &ContentIdentity) -> Result<Option<SourceRecord>, Error> {
        let hash = identity.to_string();
        self.conn
            .call(move |conn| -> Result<Option<SourceRecord>, Error> {
                let result = conn.query_row(
                    "SELECT hash, url, title, format, added_at FROM sources WHERE hash = ?1",
                    params![hash],
                    row_to_record,
                );

                match result {
                    Ok(row) => Ok(Some(into_record(row)?)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// All source records ordered by title.
    pub async fn list_sources(&self) -> Result<Vec<SourceRecord>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<SourceRecord>, Error> {
                let mut stmt =
                    conn.prepare("SELECT hash, url, title, format, added_at FROM sources ORDER BY title, hash")?;
                let rows = stmt.query_map([], row_to_record)?;

                let mut records = Vec::new();
                for row in rows {
                    match into_record(row?) {
                        Ok(record) => records.push(record),
                        Err(e) => tracing::warn!(error = %e, "skipping malformed catalog row"),
                    }
                }
                Ok(records)
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::compute_identity;

    fn make_record(url: &str, format: ArchiveFormat) -> SourceRecord {
        SourceRecord {
            identity: compute_identity(url),
            url: url.to_string(),
            title: url.rsplit('/').next().unwrap_or_default().to_string(),
            format,
            added_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    #[tokio::test]
    async fn test_upsert_and_get() {
        let db = CatalogDb::open_in_memory().await.unwrap();
        let record = make_record("https://example.com/vol1.cbz", ArchiveFormat::Zip);

        db.upsert_source(&record).await.unwrap();

        let retrieved = db.get_source(&record.identity).await.unwrap().unwrap();
        assert_eq!(retrieved, record);
    }

    #[tokio::test]
    async fn test_get_missing() {
        let db = CatalogDb::open_in_memory().await.unwrap();
        let result = db.get_source(&compute_identity("https://example.com/none.zip")).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_upsert_keeps_added_at() {
        let db = CatalogDb::open_in_memory().await.unwrap();
        let mut record = make_record("https://example.com/vol1.cbr", ArchiveFormat::Rar);
        record.added_at = "2024-01-01T00:00:00+00:00".into();
        db.upsert_source(&record).await.unwrap();

        let mut renamed = record.clone();
        renamed.title = "Volume One".into();
        renamed.added_at = "2025-01-01T00:00:00+00:00".into();
        db.upsert_source(&renamed).await.unwrap();

        let retrieved = db.get_source(&record.identity).await.unwrap().unwrap();
        assert_eq!(retrieved.title, "Volume One");
        assert_eq!(retrieved.added_at, "2024-01-01T00:00:00+00:00");
    }

    #[tokio::test]
    async fn test_list_sorted_by_title() {
        let db = CatalogDb::open_in_memory().await.unwrap();
        let a = make_record("https://example.com/a.zip", ArchiveFormat::Zip);
        let b = make_record("https://example.com/b.rar", ArchiveFormat::Rar);
        db.upsert_source(&b).await.unwrap();
        db.upsert_source(&a).await.unwrap();

        let listed = db.list_sources().await.unwrap();
        assert_eq!(listed.iter().map(|r| r.title.as_str()).collect::<Vec<_>>(), vec!["a.zip", "b.rar"]);
    }
}
