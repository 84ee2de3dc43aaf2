//! Header integrity tags
//!
//! Every header ends in a fixed-width tag computed over the protected bytes
//! that precede it. The protocol does not mandate an algorithm: anything that
//! implements [`IntegrityTag`] can be plugged in, including plain functions of
//! type `fn(&[u8]) -> [u8; TAG_SIZE]`.

use ring::digest;

/// Width of an integrity tag in bytes
pub const TAG_SIZE: usize = 8;

/// Computes the tag for one protected header block
pub trait IntegrityTag: Send + Sync {
    /// Tag over `protected`
    fn compute(&self, protected: &[u8]) -> [u8; TAG_SIZE];

    /// Check a received tag against `protected`
    fn verify(&self, protected: &[u8], tag: &[u8]) -> bool {
        self.compute(protected)[..] == *tag
    }
}

impl<F> IntegrityTag for F
where
    F: Fn(&[u8]) -> [u8; TAG_SIZE] + Send + Sync,
{
    fn compute(&self, protected: &[u8]) -> [u8; TAG_SIZE] {
        self(protected)
    }
}

/// Reference tag: always zero
///
/// Receivers using it accept any tag, so output written by peers with a real
/// tag function stays readable.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZeroTag;

impl IntegrityTag for ZeroTag {
    fn compute(&self, _protected: &[u8]) -> [u8; TAG_SIZE] {
        [0; TAG_SIZE]
    }

    fn verify(&self, _protected: &[u8], _tag: &[u8]) -> bool {
        true
    }
}

/// Truncated SHA-256 over the protected block
///
/// Detects corruption only; it has no error-correction capability.
#[derive(Debug, Clone, Copy, Default)]
pub struct DigestTag;

impl IntegrityTag for DigestTag {
    fn compute(&self, protected: &[u8]) -> [u8; TAG_SIZE] {
        let hash = digest::digest(&digest::SHA256, protected);
        let mut tag = [0u8; TAG_SIZE];
        tag.copy_from_slice(&hash.as_ref()[..TAG_SIZE]);
        tag
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_tag() {
        assert_eq!(ZeroTag.compute(b"anything"), [0; TAG_SIZE]);
        assert!(ZeroTag.verify(b"anything", &[1, 2, 3, 4, 5, 6, 7, 8]));
    }

    #[test]
    fn test_digest_tag_detects_change() {
        let tag = DigestTag.compute(b"header bytes");
        assert!(DigestTag.verify(b"header bytes", &tag));
        assert!(!DigestTag.verify(b"header bytez", &tag));
    }

    #[test]
    fn test_function_as_tag() {
        fn xor_tag(bytes: &[u8]) -> [u8; TAG_SIZE] {
            let mut tag = [0u8; TAG_SIZE];
            for (i, b) in bytes.iter().enumerate() {
                tag[i % TAG_SIZE] ^= b;
            }
            tag
        }

        let plugged: &dyn IntegrityTag = &xor_tag;
        assert_eq!(plugged.compute(&[1, 2]), [1, 2, 0, 0, 0, 0, 0, 0]);
        assert!(plugged.verify(&[1, 2], &[1, 2, 0, 0, 0, 0, 0, 0]));
    }
}
