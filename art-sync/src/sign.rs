//! Detached signatures for package files.

use std::path::{Path, PathBuf};

use crate::error::{io_err, SyncError};
use crate::reconcile::SIGNATURE_SUFFIX;
use crate::tools::Signer;

/// Result of [`add_missing_signatures`]. Each file is signed independently.
#[derive(Debug, Default)]
pub struct SignOutcome {
    pub signed: Vec<String>,
    pub errors: Vec<SyncError>,
}

fn signature_path(path: &Path) -> PathBuf {
    let mut sig = path.as_os_str().to_owned();
    sig.push(SIGNATURE_SUFFIX);
    PathBuf::from(sig)
}

/// Sign every file in `output_files` that exists in `target_dir` but has no
/// `.sig` next to it yet.
pub fn add_missing_signatures(
    output_files: &[String],
    target_dir: &Path,
    signer: &dyn Signer,
    key_id: &str,
) -> SignOutcome {
    let mut outcome = SignOutcome::default();
    for file_name in output_files {
        let path = target_dir.join(file_name);
        let sig = signature_path(&path);

        let needs_signature = path
            .try_exists()
            .and_then(|exists| Ok(exists && !sig.try_exists()?));
        match needs_signature {
            Ok(false) => continue,
            Ok(true) => {}
            Err(e) => {
                outcome.errors.push(io_err(&path, e));
                continue;
            }
        }

        tracing::info!("signing {file_name}");
        match signer.sign(&path, key_id) {
            Ok(()) => outcome.signed.push(file_name.clone()),
            Err(source) => outcome.errors.push(SyncError::Sign { path, source }),
        }
    }
    outcome
}
