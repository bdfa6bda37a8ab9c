//! Weak (rolling) and strong block checksums
//!
//! The weak checksum is an Adler-style two-term sum over a fixed window:
//! - s1 = sum of all bytes
//! - s2 = n*byte[0] + (n-1)*byte[1] + ... + 1*byte[n-1]
//!
//! Sliding the window right by one byte is O(1) given the leaving byte,
//! the entering byte and the window length. Weak hits are confirmed with a
//! 128-bit MD5 digest before a block is treated as identical.

pub mod rolling;
pub mod strong;

pub use rolling::RollingChecksum;
pub use strong::{content_address, strong_hash, StrongHash};
