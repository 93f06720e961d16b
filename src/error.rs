//! Error taxonomy shared by every component of the EWF engine.

use thiserror::Error;

/// What kind of checksummed thing failed verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumSubject {
    /// A 76-byte section header.
    SectionHeader,
    /// A `table`/`table2` offset array.
    Table,
    /// A chunk payload.
    Chunk,
}

impl std::fmt::Display for ChecksumSubject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ChecksumSubject::SectionHeader => "section header",
            ChecksumSubject::Table => "table",
            ChecksumSubject::Chunk => "chunk",
        };
        f.write_str(s)
    }
}

/// The crate-wide error type.
///
/// Mirrors the kinds enumerated in the design doc: each low-level I/O or
/// parsing failure is wrapped with enough context (`where`) for the caller
/// to locate the offending segment file / section / chunk.
#[derive(Error, Debug)]
pub enum Error {
    /// OS-level failure from open/read/write/seek.
    #[error("I/O error while {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Signature mismatch, unknown/malformed section header, unsupported flavor.
    #[error("invalid format: {0}")]
    InvalidFormat(String),

    /// A checksum did not match what was stored on disk.
    #[error("checksum mismatch on {subject} at {where_}: expected {expected:#x}, found {found:#x}")]
    ChecksumMismatch {
        subject: ChecksumSubject,
        where_: String,
        expected: u32,
        found: u32,
    },

    /// Decompression failure, impossible offsets, `done` outside the last segment.
    #[error("corrupt image: {0}")]
    Corrupt(String),

    /// A hard structural limit (segment count, chunk size, addressable media size) was exceeded.
    #[error("limit exceeded: {0}")]
    LimitExceeded(String),

    /// A chunk number has no entry in the offset table.
    #[error("invalid chunk number {0}")]
    InvalidChunk(usize),

    /// Caller passed something the API cannot act on (bad handle state, out-of-range offset, …).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A metadata key was requested but never set.
    #[error("key not found: {0}")]
    NotFound(String),
}

impl Error {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Error::Io {
            context: context.into(),
            source,
        }
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;
