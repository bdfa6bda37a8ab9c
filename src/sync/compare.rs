//! Offline comparison of two local files through the delta engine

use crate::config::Config;
use crate::delta::{search, SearchResults};
use crate::error::Result;
use crate::signature::build_from_scratch;
use std::collections::BTreeMap;
use std::path::Path;

/// Match counts for one block size of the baseline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeSummary {
    pub block_size: usize,
    /// Blocks of this size in the baseline signature
    pub baseline_blocks: usize,
    /// Blocks of this size found in the updated file
    pub matched: usize,
}

/// What an upload of `updated` over `baseline` would transfer
#[derive(Debug, Clone)]
pub struct CompareReport {
    /// Per block size, largest first
    pub sizes: Vec<SizeSummary>,
    pub results: SearchResults,
}

impl CompareReport {
    pub fn bytes_reused(&self) -> u64 {
        self.results.bytes_reused()
    }

    pub fn bytes_to_transfer(&self) -> u64 {
        self.results.bytes_to_transfer()
    }
}

/// Sign `baseline`, then search `updated` against that signature
pub fn compare_files(baseline: &Path, updated: &Path, config: &Config) -> Result<CompareReport> {
    let sig = build_from_scratch(baseline, config.block_size)?;
    let results = search(updated, &sig, &config.search_options())?;

    let mut matched: BTreeMap<usize, usize> = BTreeMap::new();
    for found in &results.matches {
        *matched.entry(found.baseline.size).or_default() += 1;
    }

    let sizes = sig
        .sizes_descending()
        .into_iter()
        .map(|block_size| SizeSummary {
            block_size,
            baseline_blocks: sig.bucket(block_size).len(),
            matched: matched.get(&block_size).copied().unwrap_or(0),
        })
        .collect();

    Ok(CompareReport { sizes, results })
}
