//! blobsync - rsync-style delta synchronization against block-blob storage
//!
//! This library computes block signatures of files, finds the blocks two
//! versions share, and moves only the remaining bytes between a local file
//! and a block-blob object store (local directory tree or Azure).

pub mod checksum;
pub mod cli;
pub mod config;
pub mod delta;
pub mod error;
pub mod format;
pub mod mmap;
pub mod retry;
pub mod signature;
pub mod storage;
pub mod sync;
pub mod transfer;

pub use config::Config;
pub use error::{Error, Result};
