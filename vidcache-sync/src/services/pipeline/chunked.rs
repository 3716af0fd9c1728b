//! Chunked-parallel strategy
//!
//! The change set is split into N contiguous chunks of `ceil(len / N)` files.
//! Each chunk runs sequentially in its own task; results are concatenated in
//! chunk order.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::task::JoinSet;

use super::{FileProcessor, ScanPipeline};
use crate::error::{ScanError, ScanResult};
use crate::models::{CandidateFile, VideoRecord};

pub struct ChunkedPipeline {
    chunks: usize,
}

impl ChunkedPipeline {
    pub fn new(chunks: usize) -> Self {
        Self {
            chunks: chunks.max(1),
        }
    }
}

/// Contiguous chunks of `ceil(len / n)` items
fn split_chunks<T: Clone>(items: &[T], n: usize) -> Vec<Vec<T>> {
    if items.is_empty() {
        return Vec::new();
    }
    let size = items.len().div_ceil(n.max(1));
    items.chunks(size).map(|c| c.to_vec()).collect()
}

#[async_trait]
impl ScanPipeline for ChunkedPipeline {
    fn name(&self) -> &'static str {
        "chunked"
    }

    async fn run(
        &self,
        files: Vec<CandidateFile>,
        processor: Arc<FileProcessor>,
    ) -> ScanResult<Vec<VideoRecord>> {
        let chunks = split_chunks(&files, self.chunks);
        let chunk_count = chunks.len();
        tracing::info!(files = files.len(), chunks = chunk_count, "Chunked pipeline started");

        let mut tasks = JoinSet::new();
        for (index, chunk) in chunks.into_iter().enumerate() {
            let processor = Arc::clone(&processor);
            tasks.spawn(async move {
                let mut control = processor.control();
                let mut records = Vec::with_capacity(chunk.len());
                for file in chunk {
                    if let Some(record) = processor.process(&mut control, file).await? {
                        records.push(record);
                    }
                }
                Ok::<_, ScanError>((index, records))
            });
        }

        let mut ordered: Vec<Vec<VideoRecord>> = (0..chunk_count).map(|_| Vec::new()).collect();
        // Returning early drops the JoinSet, aborting the remaining chunks
        while let Some(joined) = tasks.join_next().await {
            let (index, records) =
                joined.map_err(|e| ScanError::Internal(format!("Pipeline task failed: {}", e)))??;
            ordered[index] = records;
        }

        Ok(ordered.into_iter().flatten().collect())
    }
}
