use std::fs;
use std::io::{Error, ErrorKind};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::{debug, trace};

#[derive(Debug)]
pub struct Candidate {
    pub path: PathBuf,
    pub modified: SystemTime,
}

/// Returns the file in `dir` whose name ends with `suffix` and that was
/// modified last, or `None` if no file matches.
///
/// Files with the same modification time are ordered by name and the
/// lexicographically smallest one wins, so the choice never depends on the
/// order the OS lists the directory in.
///
/// Any error listing `dir` or reading an entry's metadata is returned as is.
/// Callers treat it as fatal.
pub fn locate_latest(dir: &Path, suffix: &str) -> Result<Option<PathBuf>, Error> {
    if suffix.is_empty() {
        return Err(Error::new(
            ErrorKind::InvalidInput,
            "file suffix must not be empty",
        ));
    }

    let mut candidates = candidates(dir, suffix)?;
    debug!(
        "Found {} candidate(s) ending with {suffix} in {}",
        candidates.len(),
        dir.display()
    );
    candidates.sort_by(|a, b| {
        b.modified
            .cmp(&a.modified)
            .then_with(|| a.path.file_name().cmp(&b.path.file_name()))
    });
    Ok(candidates.into_iter().next().map(|c| c.path))
}

fn candidates(dir: &Path, suffix: &str) -> Result<Vec<Candidate>, Error> {
    let mut found = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            trace!("Skipping non UTF-8 name {:?}", entry.file_name());
            continue;
        };
        if !name.ends_with(suffix) {
            continue;
        }
        let metadata = entry.metadata()?;
        if !metadata.is_file() {
            continue;
        }
        found.push(Candidate {
            path: entry.path(),
            modified: metadata.modified()?,
        });
    }
    Ok(found)
}
