//! Path deduplication before database sync
//!
//! Overlapping roots (or a root listed twice) can yield several records for
//! one path. The record with the greatest `last_modified` wins; ties keep the
//! first one seen.

use std::collections::HashMap;

use crate::models::VideoRecord;

/// Deduplication result
#[derive(Debug, Default)]
pub struct Deduplicated {
    /// One record per path, in first-seen order
    pub records: Vec<VideoRecord>,
    /// Records that lost to another record with the same path
    pub discarded: Vec<VideoRecord>,
}

pub fn deduplicate(records: Vec<VideoRecord>) -> Deduplicated {
    let mut index: HashMap<String, usize> = HashMap::with_capacity(records.len());
    let mut result = Deduplicated {
        records: Vec::with_capacity(records.len()),
        discarded: Vec::new(),
    };

    for record in records {
        match index.get(&record.file_path) {
            Some(&slot) => {
                if record.last_modified > result.records[slot].last_modified {
                    let loser = std::mem::replace(&mut result.records[slot], record);
                    result.discarded.push(loser);
                } else {
                    result.discarded.push(record);
                }
            }
            None => {
                index.insert(record.file_path.clone(), result.records.len());
                result.records.push(record);
            }
        }
    }

    if !result.discarded.is_empty() {
        tracing::info!(
            kept = result.records.len(),
            discarded = result.discarded.len(),
            "Duplicate paths resolved"
        );
        for record in &result.discarded {
            tracing::debug!(file = %record.file_path, id = %record.id, "Discarded duplicate record");
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn record(id: &str, path: &str, age_secs: i64) -> VideoRecord {
        VideoRecord {
            id: id.to_string(),
            file_path: path.to_string(),
            file_name: "x.mp4".to_string(),
            title: "x".to_string(),
            file_size: 1,
            duration: None,
            episode: None,
            year: None,
            video_id: "vid".to_string(),
            thumbnail_path: None,
            last_modified: Utc::now() - Duration::seconds(age_secs),
            playlist_id: None,
            metadata_extracted_at: None,
        }
    }

    #[test]
    fn test_newest_record_wins() {
        let result = deduplicate(vec![
            record("old", "/v/a.mp4", 100),
            record("other", "/v/b.mp4", 0),
            record("new", "/v/a.mp4", 10),
        ]);

        assert_eq!(result.records.len(), 2);
        assert_eq!(result.records[0].id, "new");
        assert_eq!(result.records[1].id, "other");
        assert_eq!(result.discarded.len(), 1);
        assert_eq!(result.discarded[0].id, "old");
    }

    #[test]
    fn test_tie_keeps_first_seen() {
        let first = record("first", "/v/a.mp4", 0);
        let mut second = record("second", "/v/a.mp4", 0);
        second.last_modified = first.last_modified;

        let result = deduplicate(vec![first, second]);
        assert_eq!(result.records.len(), 1);
        assert_eq!(result.records[0].id, "first");
        assert_eq!(result.discarded[0].id, "second");
    }
}
