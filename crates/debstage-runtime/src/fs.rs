use crate::RuntimeError;
use std::path::Path;

/// Copy `src` to `dst`, creating the destination's parent directories and
/// overwriting any existing file.
pub fn copy_file(src: &Path, dst: &Path) -> Result<(), RuntimeError> {
    let wrap = |source| RuntimeError::Copy {
        src: src.to_path_buf(),
        dst: dst.to_path_buf(),
        source,
    };
    if let Some(parent) = dst.parent() {
        std::fs::create_dir_all(parent).map_err(wrap)?;
    }
    std::fs::copy(src, dst).map_err(wrap)?;
    Ok(())
}
