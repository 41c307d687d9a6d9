//! Persistent sweep bookkeeping.
//!
//! `fingerprints` remembers, per sorted bundle, the content and
//! configuration it was last concluded under; on-change sweeps only revisit
//! bundles whose fingerprint no longer matches. `checkpoint` tracks an
//! in-progress scheduled sweep so an interrupted one resumes where it
//! stopped instead of starting over.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::util::atomic::write_atomic;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Fingerprint {
    pub content_hash: String,
    pub config_fingerprint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Checkpoint {
    pub config_fingerprint: String,
    /// Bundle id → content hash at the time it was concluded.
    pub concluded: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SweepState {
    pub fingerprints: BTreeMap<String, Fingerprint>,
    pub checkpoint: Option<Checkpoint>,
}

impl SweepState {
    /// A missing state file is an empty state.
    pub fn load(path: &Path) -> Result<Self> {
        match fs::read(path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .with_context(|| format!("failed to parse sweep state: {}", path.display())),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => {
                Err(err).with_context(|| format!("failed to read sweep state: {}", path.display()))
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(self)?;
        write_atomic(path, &bytes)
    }

    /// Concluded earlier with the same content and configuration.
    pub fn is_current(&self, id: &str, content_hash: &str, config_fingerprint: &str) -> bool {
        self.fingerprints.get(id).is_some_and(|f| {
            f.content_hash == content_hash && f.config_fingerprint == config_fingerprint
        })
    }

    pub fn record(&mut self, id: &str, content_hash: &str, config_fingerprint: &str) {
        self.fingerprints.insert(
            id.to_string(),
            Fingerprint {
                content_hash: content_hash.to_string(),
                config_fingerprint: config_fingerprint.to_string(),
            },
        );
    }

    pub fn forget(&mut self, id: &str) {
        self.fingerprints.remove(id);
    }

    /// Start a scheduled sweep, keeping an interrupted checkpoint taken
    /// under the same configuration.
    pub fn begin_checkpoint(&mut self, config_fingerprint: &str) {
        let reusable = self
            .checkpoint
            .as_ref()
            .is_some_and(|c| c.config_fingerprint == config_fingerprint);
        if !reusable {
            self.checkpoint = Some(Checkpoint {
                config_fingerprint: config_fingerprint.to_string(),
                concluded: BTreeMap::new(),
            });
        }
    }

    pub fn conclude(&mut self, id: &str, content_hash: &str) {
        if let Some(checkpoint) = self.checkpoint.as_mut() {
            checkpoint
                .concluded
                .insert(id.to_string(), content_hash.to_string());
        }
    }

    /// Already concluded in the interrupted sweep with unchanged content.
    pub fn in_checkpoint(&self, id: &str, content_hash: &str, config_fingerprint: &str) -> bool {
        self.checkpoint.as_ref().is_some_and(|c| {
            c.config_fingerprint == config_fingerprint
                && c.concluded.get(id).is_some_and(|h| h == content_hash)
        })
    }

    pub fn finish_checkpoint(&mut self) {
        self.checkpoint = None;
    }
}
