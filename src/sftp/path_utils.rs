//! Path helpers for SFTP operations
//!
//! Remote paths always use `/` (per SFTP protocol). Local paths go through
//! `Path`/`PathBuf` so platform separators are handled by std.

use std::path::{Path, PathBuf};

use super::error::ClientError;

/// Last segment of a remote path: everything after the final `/`, or the
/// whole string when it has none.
///
/// ```
/// use resilient_sftp::sftp::path_utils::remote_file_name;
///
/// assert_eq!(remote_file_name("a/b/c"), "c");
/// assert_eq!(remote_file_name("/file-in-root"), "file-in-root");
/// assert_eq!(remote_file_name("plain"), "plain");
/// ```
pub fn remote_file_name(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

/// Remote destination of an upload: `remote_dir + "/" + <base name of file>`.
///
/// `remote_dir` is used verbatim, so `.` uploads into the server's current
/// directory and `/subdir` into an absolute one. The base name must be valid
/// UTF-8 so it reaches the server unchanged.
pub fn upload_destination(local_file: &Path, remote_dir: &str) -> Result<String, ClientError> {
    let name = local_file.file_name().ok_or_else(|| {
        ClientError::invalid(format!(
            "Local file {} has no file name",
            local_file.display()
        ))
    })?;
    let name = name.to_str().ok_or_else(|| {
        ClientError::invalid(format!(
            "Local file name {} is not valid UTF-8",
            name.to_string_lossy()
        ))
    })?;

    Ok(format!("{}/{}", remote_dir, name))
}

/// Local target of a download.
///
/// An existing directory receives a file named after the remote path's last
/// segment; anything else is used as the target file itself.
pub fn download_target(remote_path: &str, local_destination: &Path) -> PathBuf {
    if local_destination.is_dir() {
        local_destination.join(remote_file_name(remote_path))
    } else {
        local_destination.to_path_buf()
    }
}
