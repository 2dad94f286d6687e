//! URL and tag row operations.
//!
//! Writes are expressed as [`IndexWrite`] steps and committed in a single
//! transaction, so a failed step leaves the previous state untouched.

use std::collections::BTreeSet;

use super::connection::TagIndex;
use crate::Error;
use crate::batch;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite::{self, params_from_iter};

/// Bound parameters per `IN (...)` list, well under SQLite's limit.
const DELETE_CHUNK: usize = 500;

/// A tracked URL as stored in the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlRecord {
    pub fingerprint: String,
    pub url: String,
    pub zone: String,
}

/// One step of an atomic index write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexWrite {
    /// Remove every tag edge for a fingerprint.
    ClearTags { fingerprint: String },
    /// Insert the URL row, or update its zone and value in place.
    PutUrl { fingerprint: String, url: String, zone: String },
    /// Attach one tag to a fingerprint.
    PutTag { fingerprint: String, tag: String },
}

impl TagIndex {
    /// Apply `writes` in order as one transaction.
    pub async fn commit(&self, writes: Vec<IndexWrite>) -> Result<(), Error> {
        if writes.is_empty() {
            return Ok(());
        }

        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                {
                    let mut clear = tx.prepare_cached("DELETE FROM tag WHERE url = ?1")?;
                    let mut put_url = tx.prepare_cached(
                        "INSERT INTO url (id, zone, value) VALUES (?1, ?2, ?3)
                         ON CONFLICT(id) DO UPDATE SET zone = excluded.zone, value = excluded.value",
                    )?;
                    let mut put_tag = tx.prepare_cached("INSERT INTO tag (url, value) VALUES (?1, ?2)")?;

                    for write in &writes {
                        match write {
                            IndexWrite::ClearTags { fingerprint } => {
                                clear.execute(params![fingerprint])?;
                            }
                            IndexWrite::PutUrl { fingerprint, url, zone } => {
                                put_url.execute(params![fingerprint, zone, url])?;
                            }
                            IndexWrite::PutTag { fingerprint, tag } => {
                                put_tag.execute(params![fingerprint, tag])?;
                            }
                        }
                    }
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Replace the tag set for a URL.
    ///
    /// Clears existing tags, writes the URL row, and inserts one edge per
    /// distinct tag, all in one transaction. The caller supplies the full
    /// desired tag set; nothing is merged with what was stored before.
    pub async fn upsert(&self, fingerprint: &str, url: &str, zone: &str, tags: &[String]) -> Result<(), Error> {
        let distinct: BTreeSet<&str> = tags.iter().map(String::as_str).collect();

        let mut writes = Vec::with_capacity(distinct.len() + 2);
        writes.push(IndexWrite::ClearTags { fingerprint: fingerprint.to_string() });
        writes.push(IndexWrite::PutUrl {
            fingerprint: fingerprint.to_string(),
            url: url.to_string(),
            zone: zone.to_string(),
        });
        writes.extend(
            distinct
                .into_iter()
                .map(|tag| IndexWrite::PutTag { fingerprint: fingerprint.to_string(), tag: tag.to_string() }),
        );

        self.commit(writes).await
    }

    /// Find the distinct URLs carrying at least one of `tags`.
    ///
    /// Scoped to `zone` when given, otherwise across all zones.
    /// Results are ordered by URL.
    pub async fn find_urls_by_tags(&self, tags: &[String], zone: Option<&str>) -> Result<Vec<UrlRecord>, Error> {
        if tags.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; tags.len()].join(", ");
        let mut sql = format!(
            "SELECT DISTINCT url.id, url.zone, url.value FROM url
             JOIN tag ON url.id = tag.url
             WHERE tag.value IN ({placeholders})"
        );
        let mut bound: Vec<String> = tags.to_vec();
        if let Some(zone) = zone {
            sql.push_str(" AND url.zone = ?");
            bound.push(zone.to_string());
        }
        sql.push_str(" ORDER BY url.value");

        self.conn
            .call(move |conn| -> Result<Vec<UrlRecord>, Error> {
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params_from_iter(bound.iter()), |row| {
                    Ok(UrlRecord { fingerprint: row.get(0)?, zone: row.get(1)?, url: row.get(2)? })
                })?;

                rows.collect::<Result<Vec<_>, rusqlite::Error>>().map_err(Error::from)
            })
            .await
            .map_err(Error::from)
    }

    /// Remove URL rows and their tags for the given fingerprints.
    ///
    /// Unknown fingerprints are ignored. Returns the number of URL rows removed.
    pub async fn delete_by_fingerprints(&self, fingerprints: &[String]) -> Result<u64, Error> {
        if fingerprints.is_empty() {
            return Ok(0);
        }

        let fingerprints = fingerprints.to_vec();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let tx = conn.transaction()?;
                let mut deleted = 0u64;

                for chunk in batch::chunks(&fingerprints, DELETE_CHUNK) {
                    let placeholders = vec!["?"; chunk.len()].join(", ");
                    tx.execute(
                        &format!("DELETE FROM tag WHERE url IN ({placeholders})"),
                        params_from_iter(chunk.iter()),
                    )?;
                    deleted += tx.execute(
                        &format!("DELETE FROM url WHERE id IN ({placeholders})"),
                        params_from_iter(chunk.iter()),
                    )? as u64;
                }

                tx.commit()?;
                Ok(deleted)
            })
            .await
            .map_err(Error::from)
    }

    /// Get a URL row by fingerprint.
    pub async fn get_url(&self, fingerprint: &str) -> Result<Option<UrlRecord>, Error> {
        let fingerprint = fingerprint.to_string();
        self.conn
            .call(move |conn| -> Result<Option<UrlRecord>, Error> {
                let result = conn.query_row(
                    "SELECT id, zone, value FROM url WHERE id = ?1",
                    params![fingerprint],
                    |row| Ok(UrlRecord { fingerprint: row.get(0)?, zone: row.get(1)?, url: row.get(2)? }),
                );

                match result {
                    Ok(record) => Ok(Some(record)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Distinct tags currently attached to a fingerprint, sorted.
    pub async fn tags_for(&self, fingerprint: &str) -> Result<Vec<String>, Error> {
        let fingerprint = fingerprint.to_string();
        self.conn
            .call(move |conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT DISTINCT value FROM tag WHERE url = ?1 ORDER BY value")?;
                let rows = stmt.query_map(params![fingerprint], |row| row.get(0))?;
                rows.collect::<Result<Vec<String>, rusqlite::Error>>().map_err(Error::from)
            })
            .await
            .map_err(Error::from)
    }

    /// Number of tracked URLs.
    pub async fn count_urls(&self) -> Result<u64, Error> {
        self.conn
            .call(|conn| -> Result<u64, Error> {
                let count: i64 = conn.query_row("SELECT COUNT(*) FROM url", [], |row| row.get(0))?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }
}
