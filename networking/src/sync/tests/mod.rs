mod reservations_tests;

use containers::HashDigest;

/// Distinct hash per height for table tests.
pub(super) fn hash(height: u64) -> HashDigest {
    let mut bytes = [0u8; 32];
    bytes[..8].copy_from_slice(&height.to_le_bytes());
    HashDigest(bytes)
}
