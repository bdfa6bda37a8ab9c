//! Bounded producer/worker pipeline for staging blocks and fetching ranges
//!
//! The producer slices chunks out of the local file and pushes them into a
//! bounded queue; workers stage each chunk and report back on a result
//! channel. Each worker owns a result sender, so the channel closes exactly
//! when the last worker has finished and the aggregator knows every
//! dispatched chunk has been accounted for.

use super::{partition, TransferOptions, UploadedBlock};
use crate::delta::{ByteRange, FetchedRanges};
use crate::error::{Error, Result};
use crate::mmap::clipped;
use crate::retry::{with_retry, RetryConfig};
use crate::signature::BlockSignature;
use crate::storage::StorageBackend;
use bytes::Bytes;
use dashmap::DashSet;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;

/// A chunk of local bytes waiting to be staged
struct ChunkJob {
    range: ByteRange,
    data: Bytes,
}

/// Stages blocks of one object and fetches ranges from it
pub struct TransferScheduler {
    store: StorageBackend,
    container: String,
    object: String,
    options: TransferOptions,
    /// Content addresses staged so far in this session
    staged: Arc<DashSet<String>>,
}

impl TransferScheduler {
    pub fn new(store: StorageBackend, container: &str, object: &str, options: TransferOptions) -> Self {
        Self {
            store,
            container: container.to_string(),
            object: object.to_string(),
            options,
            staged: Arc::new(DashSet::new()),
        }
    }

    /// Stage every byte of `ranges` from `data` as blocks of at most `chunk_size`.
    ///
    /// Chunks whose content was already staged in this session are not sent
    /// again; they come back marked `is_duplicate`. The returned blocks are
    /// in offset order.
    pub async fn upload_ranges(&self, data: &[u8], ranges: &[ByteRange]) -> Result<Vec<UploadedBlock>> {
        let mut chunks: Vec<ByteRange> = ranges
            .iter()
            .flat_map(|range| partition(*range, self.options.chunk_size))
            .collect();
        chunks.sort();

        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        tracing::debug!(
            object = %self.object,
            chunks = chunks.len(),
            workers = self.options.workers,
            "Staging blocks"
        );

        let mut blocks = if self.options.workers <= 1 {
            self.stage_sequential(data, &chunks).await?
        } else {
            self.stage_parallel(data, &chunks).await?
        };

        if blocks.len() != chunks.len() {
            return Err(Error::Transfer {
                message: format!("{} of {} chunks staged", blocks.len(), chunks.len()),
            });
        }

        blocks.sort_by_key(|b| b.offset);
        Ok(blocks)
    }

    async fn stage_sequential(&self, data: &[u8], chunks: &[ByteRange]) -> Result<Vec<UploadedBlock>> {
        let worker = self.worker();
        let mut blocks = Vec::with_capacity(chunks.len());
        for range in chunks {
            let job = ChunkJob {
                range: *range,
                data: chunk_bytes(data, *range)?,
            };
            blocks.push(worker.stage(job).await?);
        }
        Ok(blocks)
    }

    async fn stage_parallel(&self, data: &[u8], chunks: &[ByteRange]) -> Result<Vec<UploadedBlock>> {
        let (job_tx, job_rx) = mpsc::channel::<ChunkJob>(self.options.queue_depth.max(1));
        let job_rx = Arc::new(Mutex::new(job_rx));
        let (result_tx, mut result_rx) = mpsc::unbounded_channel::<Result<UploadedBlock>>();

        let mut workers = JoinSet::new();
        let worker_count = self.options.workers.min(chunks.len());
        let failed = Arc::new(AtomicBool::new(false));
        for id in 0..worker_count {
            let worker = self.worker();
            let jobs = Arc::clone(&job_rx);
            let results = result_tx.clone();
            let failed = Arc::clone(&failed);
            workers.spawn(async move { worker.run(id, jobs, results, failed).await });
        }
        // Workers now hold the only senders and receivers
        drop(result_tx);
        drop(job_rx);

        for range in chunks {
            if failed.load(Ordering::Relaxed) {
                break;
            }
            let job = ChunkJob {
                range: *range,
                data: chunk_bytes(data, *range)?,
            };
            if job_tx.send(job).await.is_err() {
                break;
            }
        }
        drop(job_tx);

        let mut blocks = Vec::with_capacity(chunks.len());
        let mut first_error = None;
        while let Some(result) = result_rx.recv().await {
            match result {
                Ok(block) => blocks.push(block),
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        while let Some(joined) = workers.join_next().await {
            joined.map_err(|e| Error::Transfer {
                message: format!("worker task failed: {}", e),
            })?;
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(blocks),
        }
    }

    /// Fetch byte ranges of the object with bounded concurrency
    pub async fn fetch_ranges(&self, ranges: &[ByteRange]) -> Result<FetchedRanges> {
        let store = &self.store;
        let container = self.container.as_str();
        let object = self.object.as_str();
        let retry = &self.options.retry;

        let fetched: Vec<(ByteRange, Bytes)> = stream::iter(ranges.iter().copied())
            .map(|range| async move {
                let data = with_retry(retry, || async move {
                    store.get_range(container, object, range.begin, Some(range.end)).await
                })
                .await?;
                tracing::trace!(begin = range.begin, end = range.end, "Fetched range");
                Ok::<_, Error>((range, data))
            })
            .buffer_unordered(self.options.workers.max(1))
            .try_collect()
            .await?;

        let mut ranges = FetchedRanges::new();
        for (range, data) in fetched {
            ranges.insert(range, data)?;
        }
        Ok(ranges)
    }

    fn worker(&self) -> Worker {
        Worker {
            store: self.store.clone(),
            container: self.container.clone(),
            object: self.object.clone(),
            retry: self.options.retry.clone(),
            staged: Arc::clone(&self.staged),
        }
    }
}

/// Everything a worker task needs, owned so it can be spawned
struct Worker {
    store: StorageBackend,
    container: String,
    object: String,
    retry: RetryConfig,
    staged: Arc<DashSet<String>>,
}

impl Worker {
    async fn run(
        self,
        id: usize,
        jobs: Arc<Mutex<mpsc::Receiver<ChunkJob>>>,
        results: mpsc::UnboundedSender<Result<UploadedBlock>>,
        failed: Arc<AtomicBool>,
    ) {
        let mut handled = 0usize;
        loop {
            let job = jobs.lock().await.recv().await;
            let Some(job) = job else { break };

            let result = self.stage(job).await;
            let is_err = result.is_err();
            if is_err {
                failed.store(true, Ordering::Relaxed);
            }
            handled += 1;
            if results.send(result).is_err() || is_err {
                break;
            }
        }
        tracing::trace!(worker = id, handled, "Worker finished");
    }

    async fn stage(&self, job: ChunkJob) -> Result<UploadedBlock> {
        let signature = BlockSignature::from_block(&job.data, job.range.begin, 0);
        let is_duplicate = !self.staged.insert(signature.content_address());
        let block = UploadedBlock::staged(signature, is_duplicate);

        if is_duplicate {
            tracing::trace!(offset = block.offset, id = %block.id, "Skipping duplicate block");
            return Ok(block);
        }

        let store = &self.store;
        let container = self.container.as_str();
        let object = self.object.as_str();
        let id = block.id.as_str();
        let data = &job.data;
        with_retry(&self.retry, || async move { store.put_block(container, object, id, data.clone()).await }).await?;

        tracing::trace!(offset = block.offset, size = block.size, "Staged block");
        Ok(block)
    }
}

fn chunk_bytes(data: &[u8], range: ByteRange) -> Result<Bytes> {
    let bytes = clipped(data, range.begin, range.end);
    if bytes.len() as u64 != range.len() {
        return Err(Error::ShortRead {
            offset: range.begin,
            expected: range.len(),
            actual: bytes.len() as u64,
        });
    }
    Ok(Bytes::copy_from_slice(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LocalBackend;
    use tempfile::TempDir;

    fn scheduler(tmp: &TempDir, workers: usize, queue_depth: usize) -> TransferScheduler {
        let store = StorageBackend::Local(LocalBackend::new(tmp.path().to_path_buf()));
        let options = TransferOptions {
            chunk_size: 100,
            workers,
            queue_depth,
            retry: RetryConfig {
                max_retries: 0,
                ..Default::default()
            },
        };
        TransferScheduler::new(store, "box", "obj", options)
    }

    fn pseudo_random(len: usize, seed: u32) -> Vec<u8> {
        let mut state = seed;
        (0..len)
            .map(|_| {
                state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                (state >> 16) as u8
            })
            .collect()
    }

    async fn commit(sched: &TransferScheduler, blocks: &[UploadedBlock]) -> Bytes {
        let ids: Vec<String> = blocks.iter().map(|b| b.id.clone()).collect();
        sched.store.commit_block_list("box", "obj", &ids).await.unwrap();
        sched.store.get("box", "obj").await.unwrap()
    }

    #[tokio::test]
    async fn test_parallel_staging_reassembles_in_order() {
        let tmp = TempDir::new().unwrap();
        let sched = scheduler(&tmp, 4, 2);
        let data = pseudo_random(1_050, 1);

        let blocks = sched
            .upload_ranges(&data, &[ByteRange::new(0, 1_049)])
            .await
            .unwrap();

        assert_eq!(blocks.len(), 11);
        assert!(blocks.windows(2).all(|w| w[0].offset < w[1].offset));
        assert_eq!(blocks.last().unwrap().size, 50);
        assert_eq!(commit(&sched, &blocks).await, Bytes::from(data));
    }

    #[tokio::test]
    async fn test_sequential_mode_matches_parallel() {
        let tmp = TempDir::new().unwrap();
        let sched = scheduler(&tmp, 1, 1);
        let data = pseudo_random(450, 2);

        let blocks = sched
            .upload_ranges(&data, &[ByteRange::new(200, 449), ByteRange::new(0, 199)])
            .await
            .unwrap();

        let offsets: Vec<u64> = blocks.iter().map(|b| b.offset).collect();
        assert_eq!(offsets, vec![0, 100, 200, 300, 400]);
        assert_eq!(commit(&sched, &blocks).await, Bytes::from(data));
    }

    #[tokio::test]
    async fn test_duplicate_content_staged_once() {
        let tmp = TempDir::new().unwrap();
        let sched = scheduler(&tmp, 3, 4);
        let data = vec![7u8; 500];

        let blocks = sched
            .upload_ranges(&data, &[ByteRange::new(0, 499)])
            .await
            .unwrap();

        assert_eq!(blocks.len(), 5);
        assert_eq!(blocks.iter().filter(|b| !b.is_duplicate).count(), 1);
        assert_eq!(commit(&sched, &blocks).await, Bytes::from(data));
    }

    #[tokio::test]
    async fn test_short_source_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let sched = scheduler(&tmp, 2, 2);
        let data = pseudo_random(150, 3);

        let err = sched
            .upload_ranges(&data, &[ByteRange::new(0, 299)])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ShortRead { .. }));
    }

    #[tokio::test]
    async fn test_fetch_ranges() {
        let tmp = TempDir::new().unwrap();
        let sched = scheduler(&tmp, 3, 2);
        let data = pseudo_random(1_000, 4);
        sched
            .store
            .upload_whole("box", "obj", Bytes::from(data.clone()))
            .await
            .unwrap();

        let wanted = [ByteRange::new(0, 99), ByteRange::new(500, 749), ByteRange::new(990, 999)];
        let fetched = sched.fetch_ranges(&wanted).await.unwrap();

        assert_eq!(fetched.len(), 3);
        assert_eq!(fetched.total_bytes(), 360);
        let (range, bytes) = fetched.get(500).unwrap();
        assert_eq!(range, ByteRange::new(500, 749));
        assert_eq!(&bytes[..], &data[500..750]);
    }

    #[tokio::test]
    async fn test_fetch_past_end_is_short_read() {
        let tmp = TempDir::new().unwrap();
        let sched = scheduler(&tmp, 2, 2);
        sched
            .store
            .upload_whole("box", "obj", Bytes::from_static(b"tiny"))
            .await
            .unwrap();

        let err = sched.fetch_ranges(&[ByteRange::new(0, 99)]).await.unwrap_err();
        assert!(matches!(err, Error::ShortRead { .. }));
    }
}
