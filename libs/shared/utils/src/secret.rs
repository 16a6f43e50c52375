use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const COMPARE_KEY: &[u8] = b"payment-sync-secret-compare";

/// Compares two secrets without leaking their common prefix length through
/// timing. Both sides are run through HMAC and the tags compared with
/// `Mac::verify_slice`.
pub fn constant_time_eq(presented: &str, expected: &str) -> bool {
    let mut mac = HmacSha256::new_from_slice(COMPARE_KEY)
        .expect("HMAC can take key of any size");
    mac.update(presented.as_bytes());
    let tag = mac.finalize().into_bytes();

    let mut expected_mac = HmacSha256::new_from_slice(COMPARE_KEY)
        .expect("HMAC can take key of any size");
    expected_mac.update(expected.as_bytes());
    expected_mac.verify_slice(&tag).is_ok()
}
