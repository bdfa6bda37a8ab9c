//! Strong block digest and content addressing

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use md5::{Digest, Md5};

/// 128-bit strong digest of a block
pub type StrongHash = [u8; 16];

/// Digest a block. Equal digests are treated as byte-identical content.
pub fn strong_hash(block: &[u8]) -> StrongHash {
    let digest = Md5::digest(block);
    let mut strong = [0u8; 16];
    strong.copy_from_slice(&digest);
    strong
}

/// Content address used as the staged block id (base64 of the strong hash)
pub fn content_address(strong: &StrongHash) -> String {
    BASE64.encode(strong)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_md5_known_vector() {
        assert_eq!(
            hex::encode(strong_hash(b"")),
            "d41d8cd98f00b204e9800998ecf8427e"
        );
        assert_eq!(
            hex::encode(strong_hash(b"abc")),
            "900150983cd24fb0d6963f7d28e17f72"
        );
    }

    #[test]
    fn test_content_address_is_base64() {
        let id = content_address(&strong_hash(b""));
        assert_eq!(id, "1B2M2Y8AsgTpgAmY7PhCfg==");
    }

    #[test]
    fn test_distinct_blocks_distinct_addresses() {
        let a = content_address(&strong_hash(b"block one"));
        let b = content_address(&strong_hash(b"block two"));
        assert_ne!(a, b);
    }
}
