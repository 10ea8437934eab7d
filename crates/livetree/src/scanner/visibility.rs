//! Hidden/system entry classification for the scan filter.

use std::ffi::OsStr;
use std::fs::Metadata;

use crate::config::Visibility;

#[cfg(windows)]
const FILE_ATTRIBUTE_HIDDEN: u32 = 0x2;
#[cfg(windows)]
const FILE_ATTRIBUTE_SYSTEM: u32 = 0x4;

/// Returns true if an entry with this name and metadata passes the filter.
pub(crate) fn admits(visibility: Visibility, name: &OsStr, metadata: &Metadata) -> bool {
    match visibility {
        Visibility::All => true,
        Visibility::ShowHidden => !is_system(metadata),
        Visibility::Normal => !is_hidden(name, metadata) && !is_system(metadata),
    }
}

pub(crate) fn is_hidden(name: &OsStr, metadata: &Metadata) -> bool {
    let dotted = name.to_string_lossy().starts_with('.');
    dotted || has_hidden_attribute(metadata)
}

#[cfg(windows)]
fn has_hidden_attribute(metadata: &Metadata) -> bool {
    use std::os::windows::fs::MetadataExt;
    metadata.file_attributes() & FILE_ATTRIBUTE_HIDDEN != 0
}

#[cfg(not(windows))]
fn has_hidden_attribute(_metadata: &Metadata) -> bool {
    false
}

#[cfg(windows)]
pub(crate) fn is_system(metadata: &Metadata) -> bool {
    use std::os::windows::fs::MetadataExt;
    metadata.file_attributes() & FILE_ATTRIBUTE_SYSTEM != 0
}

/// Sockets, FIFOs and device nodes.
#[cfg(not(windows))]
pub(crate) fn is_system(metadata: &Metadata) -> bool {
    let file_type = metadata.file_type();
    !(file_type.is_file() || file_type.is_dir() || file_type.is_symlink())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn dotfiles_are_hidden_only_in_normal_mode() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".profile");
        fs::write(&path, b"x").unwrap();
        let metadata = fs::symlink_metadata(&path).unwrap();
        let name = OsStr::new(".profile");

        assert!(is_hidden(name, &metadata));
        assert!(!admits(Visibility::Normal, name, &metadata));
        assert!(admits(Visibility::ShowHidden, name, &metadata));
        assert!(admits(Visibility::All, name, &metadata));
    }

    #[test]
    fn regular_entries_pass_every_mode() {
        let temp = TempDir::new().unwrap();
        let metadata = fs::symlink_metadata(temp.path()).unwrap();
        let name = OsStr::new("photos");

        assert!(!is_system(&metadata));
        assert!(admits(Visibility::Normal, name, &metadata));
    }

    #[cfg(unix)]
    #[test]
    fn sockets_are_system_entries() {
        use std::os::unix::net::UnixListener;

        let temp = TempDir::new().unwrap();
        let path = temp.path().join("agent.sock");
        let _listener = UnixListener::bind(&path).unwrap();
        let metadata = fs::symlink_metadata(&path).unwrap();

        assert!(is_system(&metadata));
        assert!(!admits(Visibility::ShowHidden, OsStr::new("agent.sock"), &metadata));
        assert!(admits(Visibility::All, OsStr::new("agent.sock"), &metadata));
    }
}
