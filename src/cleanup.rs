use std::path::{Path, PathBuf};

/// Deletes the fragment files and the reassembly leftovers (`extra`). Failures are
/// logged and skipped; returns how many files were removed.
pub fn cleanup(fragments: &[PathBuf], extra: &[PathBuf]) -> usize {
    let mut removed = 0;

    for path in fragments.iter().chain(extra) {
        if remove(path) {
            removed += 1;
        }
    }

    tracing::info!("Temporary files cleaned up ({} removed)", removed);
    removed
}

fn remove(path: &Path) -> bool {
    if !path.exists() {
        return false;
    }

    match std::fs::remove_file(path) {
        Ok(_) => true,
        Err(err) => {
            tracing::warn!("Could not remove {}: {}", path.display(), err);
            false
        }
    }
}
