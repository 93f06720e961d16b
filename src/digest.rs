//! Abstract streaming digest (§1: "byte-stream digest primitives ... abstract
//! `Digest` trait"), backed here by `md-5` and `sha1` the way the pack's
//! disk-image tooling pulls in both crates side by side.

/// A streaming digest: feed bytes in any number of calls, then finalize once.
pub trait Digest {
    fn update(&mut self, data: &[u8]);
    fn finalize(self: Box<Self>) -> Vec<u8>;
}

/// MD5 digest, produces the 16-byte `hash`/`digest` section payload.
#[derive(Default)]
pub struct Md5Digest(md5::Md5Context);

impl Md5Digest {
    pub fn new() -> Self {
        Self(md5::Md5Context::new())
    }
}

impl Digest for Md5Digest {
    fn update(&mut self, data: &[u8]) {
        self.0.consume(data);
    }

    fn finalize(self: Box<Self>) -> Vec<u8> {
        self.0.compute().to_vec()
    }
}

/// SHA-1 digest, produces the 20-byte half of the `digest` section payload.
#[derive(Default)]
pub struct Sha1Digest(sha1::Sha1Context);

impl Sha1Digest {
    pub fn new() -> Self {
        Self(sha1::Sha1Context::new())
    }
}

impl Digest for Sha1Digest {
    fn update(&mut self, data: &[u8]) {
        self.0.consume(data);
    }

    fn finalize(self: Box<Self>) -> Vec<u8> {
        self.0.compute().to_vec()
    }
}

/// Tiny adapter module so the rest of the crate can treat `md-5`/`sha1` the
/// same way regardless of each crate's own API shape.
mod md5 {
    use md5::{Digest as _, Md5};

    #[derive(Default)]
    pub struct Md5Context(Md5);

    impl Md5Context {
        pub fn new() -> Self {
            Self(Md5::new())
        }
        pub fn consume(&mut self, data: &[u8]) {
            self.0.update(data);
        }
        pub fn compute(self) -> [u8; 16] {
            self.0.finalize().into()
        }
    }
}

mod sha1 {
    use sha1::{Digest as _, Sha1};

    #[derive(Default)]
    pub struct Sha1Context(Sha1);

    impl Sha1Context {
        pub fn new() -> Self {
            Self(Sha1::new())
        }
        pub fn consume(&mut self, data: &[u8]) {
            self.0.update(data);
        }
        pub fn compute(self) -> [u8; 20] {
            self.0.finalize().into()
        }
    }
}

/// Runs both digests over the accumulated write stream so the write engine
/// can emit `hash`/`digest`/`xhash` sections at finalize time without
/// re-reading the image.
pub struct DualDigest {
    md5: md5::Md5Context,
    sha1: sha1::Sha1Context,
}

impl Default for DualDigest {
    fn default() -> Self {
        Self::new()
    }
}

impl DualDigest {
    pub fn new() -> Self {
        Self {
            md5: md5::Md5Context::new(),
            sha1: sha1::Sha1Context::new(),
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.md5.consume(data);
        self.sha1.consume(data);
    }

    pub fn finalize(self) -> (Vec<u8>, Vec<u8>) {
        (self.md5.compute().to_vec(), self.sha1.compute().to_vec())
    }
}

/// Formats a raw digest as a lowercase hex string for `info`/`print_info`.
pub fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn md5_matches_known_vector() {
        let mut d = DualDigest::new();
        d.update(&[0u8; 131072]);
        let (md5, _sha1) = d.finalize();
        assert_eq!(hex(&md5), "0dfbe8aa4c20b52e1b8bf3cb6cbdf193");
    }

    #[test]
    fn empty_digest_matches_known_vector() {
        let d = DualDigest::new();
        let (md5, sha1) = d.finalize();
        assert_eq!(hex(&md5), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(hex(&sha1), "da39a3ee5e6b4b0d3255bfef95601890afd80709");
    }
}
