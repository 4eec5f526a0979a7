use std::fs;
use std::path::Path;
use tracing::warn;

/// Walk `root`, calling `callback(parent, file_name)` for every regular file.
///
/// The callback returns `false` to stop the walk. Directories that cannot be
/// read are logged and skipped; the rest of the tree is still visited.
/// Returns `false` if the walk was stopped early.
pub fn list_dir<F>(root: &Path, recurse: bool, callback: &mut F) -> bool
where
    F: FnMut(&Path, &str) -> bool,
{
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(path = %root.display(), error = %e, "Failed to open directory");
            return true;
        }
    };

    let mut subdirectories = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(path = %root.display(), error = %e, "Failed to read directory entry");
                continue;
            }
        };
        let file_type = match entry.file_type() {
            Ok(t) => t,
            Err(e) => {
                warn!(path = %entry.path().display(), error = %e, "Failed to stat entry");
                continue;
            }
        };

        if file_type.is_dir() {
            if recurse {
                subdirectories.push(entry.path());
            }
            continue;
        }

        let path = entry.path();
        // Symlinks to files are listed; dangling ones are not.
        if file_type.is_symlink() && !path.is_file() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            warn!(path = %path.display(), "Skipping file with a non UTF-8 name");
            continue;
        };
        if !callback(root, name) {
            return false;
        }
    }

    subdirectories.sort();
    for dir in subdirectories {
        if !list_dir(&dir, recurse, callback) {
            return false;
        }
    }
    true
}
