//! `sectors` section: opaque to the reader (§4.3). The actual chunk bytes it
//! holds are located only through the offset table; this module just knows
//! how to skip past the payload and how to back-patch its header once the
//! writer knows the final size.

use std::io::{Seek, SeekFrom};

use crate::error::{Error, Result};

/// Seeks `r` past a `sectors` payload of `payload_size` bytes without reading it.
pub fn skip<S: Seek>(s: &mut S, payload_size: u64) -> Result<()> {
    s.seek(SeekFrom::Current(payload_size as i64))
        .map_err(|e| Error::io("skipping sectors payload", e))?;
    Ok(())
}
