use std::path::PathBuf;

/// Lists the top-level volume roots of this machine.
///
/// Unix has a single root. On Windows every existing drive letter is returned.
pub fn volume_roots() -> Vec<PathBuf> {
    platform_roots()
}

#[cfg(windows)]
fn platform_roots() -> Vec<PathBuf> {
    (b'A'..=b'Z')
        .map(|letter| PathBuf::from(format!("{}:\\", letter as char)))
        .filter(|root| root.is_dir())
        .collect()
}

#[cfg(not(windows))]
fn platform_roots() -> Vec<PathBuf> {
    vec![PathBuf::from("/")]
}
