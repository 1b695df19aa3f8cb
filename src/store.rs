//! Fingerprint-keyed dedup store.
//!
//! Holds exactly one [`Record`] per fingerprint for the lifetime of a run.
//! The store is rebuilt at startup from the previous CSV snapshot, mutated
//! only through [`DedupStore::upsert`] from the orchestrator's single control
//! flow, and written back with [`DedupStore::snapshot_all`]. Those two calls
//! are its only I/O.
//!
//! # Merge policy
//!
//! A duplicate replaces the stored record wholesale when its body is strictly
//! longer (the longer copy is taken as the more complete one); otherwise the
//! stored record stays. No field-level merging happens, so a longer duplicate
//! with a worse date or fewer keyword hits still wins.

use crate::error::HarvestError;
use crate::fingerprint::{fingerprint_article, fingerprint_record};
use crate::models::{ExtractedArticle, Record, UpsertOutcome};
use crate::outputs::{self, SnapshotPaths, csv_snapshot};
use std::cmp::Reverse;
use std::collections::HashMap;
use std::io::ErrorKind;
use tracing::{debug, info, instrument, warn};

/// Whether a snapshot is a mid-run checkpoint or the end-of-run write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotKind {
    Checkpoint,
    /// Rows sorted by published date, newest first.
    Final,
}

/// One [`Record`] per fingerprint, plus where its snapshots are written.
#[derive(Debug)]
pub struct DedupStore {
    records: HashMap<String, Record>,
    paths: SnapshotPaths,
}

impl DedupStore {
    pub fn empty(paths: SnapshotPaths) -> Self {
        Self {
            records: HashMap::new(),
            paths,
        }
    }

    /// Rebuild the store from the CSV snapshot at `paths.csv`.
    ///
    /// A missing snapshot starts an empty store; an unreadable one is logged
    /// and also starts empty. Neither is fatal.
    #[instrument(level = "info", skip_all, fields(csv = %paths.csv.display()))]
    pub fn load(paths: SnapshotPaths) -> Self {
        let mut store = Self::empty(paths);
        match csv_snapshot::read_records(&store.paths.csv) {
            Ok(rows) => {
                let total = rows.len();
                for row in rows {
                    store.records.insert(fingerprint_record(&row), row);
                }
                info!(rows = total, unique = store.len(), "Restored records from snapshot");
            }
            Err(HarvestError::Io(e)) if e.kind() == ErrorKind::NotFound => {
                info!("No previous snapshot; starting empty");
            }
            Err(e) => {
                warn!(error = %e, "Could not read snapshot; starting empty");
            }
        }
        store
    }

    /// Admit an article under the merge policy.
    pub fn upsert(&mut self, article: ExtractedArticle) -> UpsertOutcome {
        let key = fingerprint_article(&article);
        match self.records.get(&key) {
            None => {
                info!(title = %article.title, "New article");
                self.records.insert(key, Record::from(article));
                UpsertOutcome::Inserted
            }
            Some(existing) if article.body.chars().count() > existing.body_chars() => {
                info!(title = %article.title, "Replacing article with longer body");
                self.records.insert(key, Record::from(article));
                UpsertOutcome::Updated
            }
            Some(_) => {
                debug!(title = %article.title, "Duplicate article; keeping stored copy");
                UpsertOutcome::Skipped
            }
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn paths(&self) -> &SnapshotPaths {
        &self.paths
    }

    /// Current rows; sorted newest first (undated last) for the final write.
    pub fn rows(&self, kind: SnapshotKind) -> Vec<Record> {
        let mut rows: Vec<Record> = self.records.values().cloned().collect();
        if kind == SnapshotKind::Final {
            rows.sort_by(|a, b| {
                (a.published.is_empty(), Reverse(&a.published), &a.title)
                    .cmp(&(b.published.is_empty(), Reverse(&b.published), &b.title))
            });
        }
        rows
    }

    /// Write every record to both snapshot files, overwriting earlier ones.
    ///
    /// Safe to call repeatedly. File writing runs on the blocking pool.
    pub async fn snapshot_all(&self, kind: SnapshotKind) -> Result<usize, HarvestError> {
        let rows = self.rows(kind);
        let paths = self.paths.clone();
        let count = rows.len();
        tokio::task::spawn_blocking(move || outputs::write_snapshot(&paths, &rows)).await??;
        info!(rows = count, ?kind, "Saved snapshot");
        Ok(count)
    }
}

#[cfg(test)]
impl DedupStore {
    pub fn get(&self, fingerprint: &str) -> Option<&Record> {
        self.records.get(fingerprint)
    }

    pub fn fingerprints(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::fingerprint;
    use chrono::NaiveDate;
    use std::collections::BTreeSet;

    fn paths_in(dir: &std::path::Path) -> SnapshotPaths {
        SnapshotPaths {
            csv: dir.join("snapshot.csv"),
            xlsx: dir.join("snapshot.xlsx"),
        }
    }

    fn article(title: &str, day: u32, body_len: usize) -> ExtractedArticle {
        let body = "政".repeat(body_len);
        ExtractedArticle {
            title: title.to_string(),
            published_date: NaiveDate::from_ymd_opt(2024, 4, day),
            url: format!("http://example.com/{}/{}", day, body_len),
            char_count: body_len,
            body,
            matched_keywords: BTreeSet::from(["政策".to_string()]),
        }
    }

    #[test]
    fn test_upsert_same_article_twice() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = DedupStore::empty(paths_in(dir.path()));
        assert_eq!(store.upsert(article("央行下调利率", 15, 120)), UpsertOutcome::Inserted);
        assert_eq!(store.upsert(article("央行下调利率", 15, 120)), UpsertOutcome::Skipped);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_longer_body_replaces_stored_record() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = DedupStore::empty(paths_in(dir.path()));
        store.upsert(article("央行下调利率", 15, 120));
        assert_eq!(store.upsert(article("央行：下调 利率", 15, 200)), UpsertOutcome::Updated);

        let key = fingerprint("央行下调利率", "2024-04-15");
        let stored = store.get(&key).unwrap();
        assert_eq!(stored.body_chars(), 200);
        assert_eq!(stored.title, "央行：下调 利率");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_shorter_or_equal_body_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = DedupStore::empty(paths_in(dir.path()));
        store.upsert(article("财政政策", 15, 150));
        assert_eq!(store.upsert(article("财政政策", 15, 150)), UpsertOutcome::Skipped);
        assert_eq!(store.upsert(article("财政政策", 15, 149)), UpsertOutcome::Skipped);
        let key = fingerprint("财政政策", "2024-04-15");
        assert_eq!(store.get(&key).unwrap().body_chars(), 150);
    }

    #[test]
    fn test_same_title_different_day_are_distinct() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = DedupStore::empty(paths_in(dir.path()));
        store.upsert(article("财政政策", 15, 150));
        assert_eq!(store.upsert(article("财政政策", 16, 150)), UpsertOutcome::Inserted);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_load_missing_snapshot_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = DedupStore::load(paths_in(dir.path()));
        assert!(store.is_empty());
    }

    #[test]
    fn test_load_corrupt_snapshot_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let paths = paths_in(dir.path());
        let mut bytes = "标题,时间\n".as_bytes().to_vec();
        bytes.extend_from_slice(&[0xc3, 0x28, b',', b'\n']);
        std::fs::write(&paths.csv, bytes).unwrap();
        let store = DedupStore::load(paths);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let paths = paths_in(dir.path());
        let mut store = DedupStore::empty(paths.clone());
        let articles = vec![
            article("国务院常务会议", 10, 130),
            article("人大常委会审议", 11, 140),
            article("央行公开市场操作", 12, 150),
            ExtractedArticle {
                published_date: None,
                ..article("未注明日期的文章", 1, 160)
            },
        ];
        let expected: BTreeSet<String> = articles.iter().map(fingerprint_article).collect();
        for a in articles {
            store.upsert(a);
        }

        assert_eq!(store.snapshot_all(SnapshotKind::Checkpoint).await.unwrap(), 4);
        assert!(paths.xlsx.exists());

        let reloaded = DedupStore::load(paths);
        let keys: BTreeSet<String> = reloaded.fingerprints().map(str::to_string).collect();
        assert_eq!(keys, expected);
        for key in &keys {
            assert_eq!(reloaded.get(key), store.get(key));
        }
    }

    #[test]
    fn test_final_rows_sorted_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = DedupStore::empty(paths_in(dir.path()));
        store.upsert(article("一", 10, 120));
        store.upsert(ExtractedArticle {
            published_date: None,
            ..article("无日期", 1, 120)
        });
        store.upsert(article("三", 20, 120));
        store.upsert(article("二", 15, 120));

        let dates: Vec<String> = store
            .rows(SnapshotKind::Final)
            .into_iter()
            .map(|r| r.published)
            .collect();
        assert_eq!(dates, vec!["2024-04-20", "2024-04-15", "2024-04-10", ""]);
    }

    #[tokio::test]
    async fn test_snapshot_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let paths = SnapshotPaths {
            csv: dir.path().join("missing_dir").join("snapshot.csv"),
            xlsx: dir.path().join("missing_dir").join("snapshot.xlsx"),
        };
        let mut store = DedupStore::empty(paths);
        store.upsert(article("一", 10, 120));
        assert!(store.snapshot_all(SnapshotKind::Final).await.is_err());
        assert_eq!(store.len(), 1);
    }
}
