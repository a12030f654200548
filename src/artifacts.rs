//! Stage-by-stage persistence of one batch's intermediate and final outputs.
//!
//! Layout: `<root>/<chain>/<yyyy>/<mm>/<chain>__<kind>__<yyyy>_<mm>.<ext>`.
//! Every write lands in a temporary file next to its target and is renamed
//! into place, so readers never observe a partial artifact.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::config::BatchConfig;
use crate::error::ScoringError;

/// Identity of one monthly batch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BatchKey {
    pub chain: String,
    pub year: i32,
    pub month: u32,
}

impl BatchKey {
    pub fn new(chain: &str, year: i32, month: u32) -> Result<Self, ScoringError> {
        if !(1..=12).contains(&month) {
            return Err(ScoringError::InvalidPeriod { year, month });
        }
        Ok(Self {
            chain: chain.to_string(),
            year,
            month,
        })
    }

    pub fn from_config(batch: &BatchConfig) -> Result<Self, ScoringError> {
        Self::new(&batch.chain, batch.year, batch.month)
    }

    /// `<chain>/<yyyy>/<mm>` relative to a data root.
    pub fn relative_dir(&self) -> PathBuf {
        PathBuf::from(&self.chain)
            .join(format!("{:04}", self.year))
            .join(format!("{:02}", self.month))
    }

    /// `<chain>__<kind>__<yyyy>_<mm>.<ext>`
    pub fn file_name(&self, kind: &str, extension: &str) -> String {
        format!(
            "{}__{}__{:04}_{:02}.{}",
            self.chain, kind, self.year, self.month, extension
        )
    }

    /// Default location of the cleaned transfer stream under `input_dir`.
    pub fn transfers_path(&self, input_dir: &Path) -> PathBuf {
        input_dir
            .join(self.relative_dir())
            .join(self.file_name("token_transfer", "csv"))
    }
}

impl fmt::Display for BatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:04}-{:02}", self.chain, self.year, self.month)
    }
}

/// Artifacts persisted per batch, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    EdgeList,
    Graph,
    Features,
    Thresholds,
    AnalysisResult,
    Agreement,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EdgeList => "edge_list",
            Self::Graph => "graph",
            Self::Features => "features",
            Self::Thresholds => "thresholds",
            Self::AnalysisResult => "analysis_result",
            Self::Agreement => "agreement",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::EdgeList | Self::Features | Self::AnalysisResult => "csv",
            Self::Graph | Self::Thresholds | Self::Agreement => "json",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path(&self, key: &BatchKey, kind: ArtifactKind) -> PathBuf {
        self.root
            .join(key.relative_dir())
            .join(key.file_name(kind.as_str(), kind.extension()))
    }

    pub fn exists(&self, key: &BatchKey, kind: ArtifactKind) -> bool {
        self.path(key, kind).is_file()
    }

    /// Write an artifact through `write`, then atomically move it into place.
    pub fn write_with<F>(&self, key: &BatchKey, kind: ArtifactKind, write: F) -> eyre::Result<PathBuf>
    where
        F: FnOnce(&mut BufWriter<&mut std::fs::File>) -> eyre::Result<()>,
    {
        let path = self.path(key, kind);
        let dir = path
            .parent()
            .ok_or_else(|| eyre::eyre!("Artifact path '{}' has no parent", path.display()))?;
        std::fs::create_dir_all(dir)
            .map_err(|e| eyre::eyre!("Failed to create artifact dir '{}': {}", dir.display(), e))?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            write(&mut writer)?;
            writer.flush()?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(&path)
            .map_err(|e| eyre::eyre!("Failed to persist artifact '{}': {}", path.display(), e))?;

        tracing::debug!(batch = %key, kind = kind.as_str(), path = %path.display(), "Artifact written");
        Ok(path)
    }

    pub fn write_json<T: Serialize>(&self, key: &BatchKey, kind: ArtifactKind, value: &T) -> eyre::Result<PathBuf> {
        self.write_with(key, kind, |w| {
            serde_json::to_writer_pretty(&mut *w, value)?;
            Ok(())
        })
    }

    pub fn read_json<T: DeserializeOwned>(&self, key: &BatchKey, kind: ArtifactKind) -> eyre::Result<T> {
        let path = self.path(key, kind);
        let file = std::fs::File::open(&path)
            .map_err(|e| eyre::eyre!("Failed to open artifact '{}': {}", path.display(), e))?;
        serde_json::from_reader(std::io::BufReader::new(file))
            .map_err(|e| eyre::eyre!("Failed to parse artifact '{}': {}", path.display(), e))
    }
}
