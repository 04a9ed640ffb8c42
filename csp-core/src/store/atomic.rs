use crate::error::{CspError, Result};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Replace `path` with `contents` in one step
///
/// The data goes to a hidden temp file in the same directory, is synced, and
/// is then renamed over the target, so readers see either the old or the new
/// file and never a partial write.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| CspError::storage(dir, e))?;
    tmp.write_all(contents)
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|e| CspError::storage(tmp.path(), e))?;
    tmp.persist(path)
        .map_err(|e| CspError::storage(path, e.error))?;

    Ok(())
}
