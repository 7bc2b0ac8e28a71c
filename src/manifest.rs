//! Completion tracking for pipeline steps.
//!
//! A small JSON manifest in the working directory records which steps have
//! finished. A step is only skipped on re-invocation when the manifest marks
//! it complete AND its output file still exists, so a recorded step whose
//! artifact was deleted (or a stray file from a crashed run) is redone
//! instead of trusted.

use fnv::FnvHashSet;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Error;

const MANIFEST_NAME: &str = "manifest.json";

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Manifest {
    completed: FnvHashSet<String>,
    #[serde(skip)]
    path: PathBuf,
}

impl Manifest {
    /// Load the manifest from `dir`, or start empty if none exists.
    /// A manifest that fails to parse is discarded as no prior progress.
    pub fn load(dir: &Path) -> Manifest {
        let path = dir.join(MANIFEST_NAME);
        let mut manifest = match fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str::<Manifest>(&text) {
                Ok(m) => m,
                Err(err) => {
                    warn!("Discarding unreadable manifest {}: {}", path.display(), err);
                    Manifest::default()
                }
            },
            Err(_) => Manifest::default(),
        };
        manifest.path = path;
        manifest
    }

    /// Whether `step` finished in a prior run and its output is still on disk.
    pub fn is_complete(&self, step: &str, output: &Path) -> bool {
        let done = self.completed.contains(step) && output.exists();
        if done {
            info!("{} already complete ({} exists), skipping", step, output.display());
        }
        done
    }

    /// Record `step` as finished and persist the manifest immediately.
    pub fn record(&mut self, step: &str) -> Result<(), Error> {
        self.completed.insert(step.to_string());
        self.persist()
    }

    // Write-to-temp-then-rename so a crash mid-write cannot corrupt the
    // manifest into claiming progress it does not have.
    fn persist(&self) -> Result<(), Error> {
        let text = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Manifest(format!("{}: {}", self.path.display(), e)))?;
        let tmp = self.path.with_extension("json.part");
        fs::write(&tmp, text).map_err(|e| Error::io(e, &tmp))?;
        fs::rename(&tmp, &self.path).map_err(|e| Error::io(e, &self.path))?;
        Ok(())
    }
}
