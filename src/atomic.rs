use crate::error::{Error, Result};
use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Atomic file write using the write-then-rename pattern.
///
/// The temporary file lives next to the target so the rename never crosses
/// a filesystem. If anything fails before the rename, the previous contents
/// of `path` are left intact and the temporary file is removed.
pub fn atomic_write(path: &Path, contents: &str) -> Result<()> {
    let temp_path = temp_path_for(path)?;

    if let Err(e) = write_and_sync(&temp_path, contents) {
        let _ = fs::remove_file(&temp_path);
        return Err(e);
    }

    fs::rename(&temp_path, path).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        Error::Io(e)
    })?;

    Ok(())
}

fn write_and_sync(temp_path: &Path, contents: &str) -> Result<()> {
    let mut file = fs::File::create(temp_path)?;
    file.write_all(contents.as_bytes())?;
    // Data must hit the disk before the rename makes it visible
    file.sync_all()?;
    Ok(())
}

/// `dir/name` -> `dir/.name.tmp`
fn temp_path_for(path: &Path) -> Result<PathBuf> {
    let file_name = path.file_name().ok_or_else(|| {
        Error::Validation(format!("'{}' does not name a file", path.display()))
    })?;
    let mut temp_name = OsString::from(".");
    temp_name.push(file_name);
    temp_name.push(".tmp");
    Ok(path.with_file_name(temp_name))
}
