//! Streaming strategy: a bounded `buffered(n)` stream over the change set

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::sync::Arc;

use super::{FileProcessor, ScanPipeline};
use crate::error::ScanResult;
use crate::models::{CandidateFile, VideoRecord};

pub struct StreamingPipeline {
    concurrency: usize,
}

impl StreamingPipeline {
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
        }
    }
}

#[async_trait]
impl ScanPipeline for StreamingPipeline {
    fn name(&self) -> &'static str {
        "streaming"
    }

    async fn run(
        &self,
        files: Vec<CandidateFile>,
        processor: Arc<FileProcessor>,
    ) -> ScanResult<Vec<VideoRecord>> {
        tracing::info!(files = files.len(), concurrency = self.concurrency, "Streaming pipeline started");

        let mut records = Vec::with_capacity(files.len());
        let mut results = stream::iter(files)
            .map(|file| {
                let processor = Arc::clone(&processor);
                async move {
                    let mut control = processor.control();
                    processor.process(&mut control, file).await
                }
            })
            .buffered(self.concurrency);

        // An error drops the stream, which drops every in-flight future
        while let Some(result) = results.next().await {
            if let Some(record) = result? {
                records.push(record);
            }
        }

        Ok(records)
    }
}
