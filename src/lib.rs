//! Expert Witness Compression Format (EWF) engine: parses, writes, resumes,
//! and patches `.Exx`/`.Sxx`/`.Lxx` segment-file images plus their `.Dxx`
//! delta overlays.

pub mod checksum;
pub mod codec;
pub mod delta;
pub mod digest;
pub mod error;
pub mod filename;
pub mod format;
pub mod handle;
pub mod media;
pub mod offset_table;
pub mod read;
pub mod section;
pub mod sections;
pub mod segment;
pub mod write;

pub use delta::DeltaHandle;
pub use error::{Error, Result};
pub use format::{CompressionLevel, ErrorTolerance, Format};
pub use handle::Handle;
pub use media::{MediaType, MediaValues};
pub use read::ReadHandle;
pub use sections::header::HeaderValues;
pub use write::{WriteHandle, WriteOptions};
