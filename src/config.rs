use crate::dto::{Dataset, FieldDefinition};
use crate::error::DedupError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "dedup.toml";

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct DedupConfig {
    pub dataset: Option<PathBuf>,
    /// Column holding the record identifier. Row indices are used when unset.
    pub id_column: Option<String>,
    /// Compared fields. Every column becomes a `String` field when empty.
    pub fields: Vec<FieldDefinition>,
    pub training_file: PathBuf,
    pub output_file: PathBuf,
    pub session_file: PathBuf,
    /// Match probability above which two records share a cluster.
    pub threshold: f64,
    pub num_perm: usize,
    pub num_bands: usize,
    pub shingle_size: usize,
    pub seed: Option<u64>,
    /// Upper bound on candidate pairs offered for labeling (0 keeps all).
    pub sample_size: usize,
    /// Decisions kept pending (and undoable) before they reach the matcher.
    pub buffer_len: usize,
    /// Denominator of the positive/negative progress bars.
    pub label_target: usize,
    /// Largest connected component of the match graph clustered as is.
    /// Bigger components lose their weakest edges until they fit.
    pub max_component_size: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            dataset: None,
            id_column: None,
            fields: Vec::new(),
            training_file: PathBuf::from("training.json"),
            output_file: PathBuf::from("clusters.json"),
            session_file: PathBuf::from(".dedup-session.json"),
            threshold: 0.5,
            num_perm: 128,
            num_bands: 32,
            shingle_size: 3,
            seed: None,
            sample_size: 5000,
            buffer_len: 1,
            label_target: 10,
            max_component_size: 500,
        }
    }
}

/// Parameters of the MinHash LSH blocking stage.
#[derive(Clone, Debug, PartialEq)]
pub struct BlockingConfig {
    pub num_perm: usize,
    pub num_bands: usize,
    pub shingle_size: usize,
    pub seed: Option<u64>,
    pub sample_size: usize,
}

impl Default for BlockingConfig {
    fn default() -> Self {
        DedupConfig::default().blocking()
    }
}

impl DedupConfig {
    pub fn from_toml(content: &str) -> Result<Self, DedupError> {
        let config: DedupConfig = toml::from_str(content).map_err(DedupError::config)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads `path` when given; otherwise `dedup.toml` in the working directory
    /// if present, else defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, DedupError> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !default_path.exists() {
                    tracing::debug!("no {} found, using defaults", DEFAULT_CONFIG_FILE);
                    return Ok(Self::default());
                }
                default_path
            }
        };
        let content = std::fs::read_to_string(&path).map_err(|err| DedupError::io(&path, err))?;
        tracing::debug!(path = %path.display(), "loaded config");
        Self::from_toml(&content)
    }

    pub fn validate(&self) -> Result<(), DedupError> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(DedupError::config(format!(
                "threshold must be within [0, 1], got {}",
                self.threshold
            )));
        }
        if self.num_bands == 0 || self.num_perm == 0 {
            return Err(DedupError::config("num_perm and num_bands must be positive"));
        }
        if self.num_perm % self.num_bands != 0 {
            return Err(DedupError::config(format!(
                "num_perm ({}) must be divisible by num_bands ({})",
                self.num_perm, self.num_bands
            )));
        }
        if self.shingle_size == 0 {
            return Err(DedupError::config("shingle_size must be positive"));
        }
        if self.max_component_size < 2 {
            return Err(DedupError::config(format!(
                "max_component_size must be at least 2, got {}",
                self.max_component_size
            )));
        }
        Ok(())
    }

    pub fn blocking(&self) -> BlockingConfig {
        BlockingConfig {
            num_perm: self.num_perm,
            num_bands: self.num_bands,
            shingle_size: self.shingle_size,
            seed: self.seed,
            sample_size: self.sample_size,
        }
    }

    pub fn dataset_path(&self) -> Result<&Path, DedupError> {
        self.dataset.as_deref().ok_or_else(|| {
            DedupError::config("no dataset given (use --dataset or `dataset` in the config file)")
        })
    }

    /// Fields to compare for `dataset`: the configured list, checked against the
    /// header, or every non-id column as a `String` field.
    pub fn resolve_fields(&self, dataset: &Dataset) -> Result<Vec<FieldDefinition>, DedupError> {
        if self.fields.is_empty() {
            return Ok(dataset
                .columns
                .iter()
                .filter(|column| Some(column.as_str()) != self.id_column.as_deref())
                .map(|column| FieldDefinition::string(column))
                .collect());
        }
        for definition in &self.fields {
            if !dataset.has_column(&definition.field) {
                return Err(DedupError::config(format!(
                    "field '{}' is not a column of the dataset",
                    definition.field
                )));
            }
        }
        Ok(self.fields.clone())
    }
}
