use crate::classifier::LogisticRegression;
use crate::dedup::{bounded_components, member_confidence, split_component};
use crate::distance::DataModel;
use crate::lsh::MinHashLSH;
use lsh_dedup_labeler::config::BlockingConfig;
use lsh_dedup_labeler::dto::{
    id_pair_key, pair_key, ClusterMembership, ClusterMemberships, Dataset, FieldDefinition,
    Record, RecordPair, TrainingData,
};
use lsh_dedup_labeler::error::DedupError;
use lsh_dedup_labeler::util::write_json_file;
use rand::prelude::*;
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info};

/// The matcher surface the review loop drives.
pub trait ActiveLearner {
    /// Pairs worth asking a reviewer about, consumed from the back. Empty once
    /// the candidate pool is exhausted.
    fn uncertain_pairs(&mut self) -> Vec<RecordPair>;

    /// Adds labelled examples and updates the classifier.
    fn mark_pairs(&mut self, examples: TrainingData) -> Result<(), DedupError>;

    fn training_pairs(&self) -> &TrainingData;
}

struct Candidate {
    pair: (usize, usize),
    features: Vec<f64>,
}

/// Stateful record matcher: blocks the dataset once, hands out the most
/// uncertain candidate pairs for labeling and clusters the dataset once trained.
pub struct ActiveMatcher {
    model: DataModel,
    records: Vec<Record>,
    /// Every pair produced by blocking
    blocked: Vec<Candidate>,
    /// Indices into `blocked` still available for labeling
    pool: Vec<usize>,
    training: TrainingData,
    classifier: LogisticRegression,
    max_component_size: usize,
}

pub const DEFAULT_MAX_COMPONENT_SIZE: usize = 500;

impl ActiveMatcher {
    pub fn new(fields: Vec<FieldDefinition>) -> Result<Self, DedupError> {
        if fields.is_empty() {
            return Err(DedupError::config("at least one field is required"));
        }
        Ok(Self {
            model: DataModel::new(fields),
            records: Vec::new(),
            blocked: Vec::new(),
            pool: Vec::new(),
            training: TrainingData::default(),
            classifier: LogisticRegression::default(),
            max_component_size: DEFAULT_MAX_COMPONENT_SIZE,
        })
    }

    /// Caps the size of match-graph components handed to clustering.
    pub fn with_max_component_size(mut self, max_component_size: usize) -> Self {
        self.max_component_size = max_component_size.max(2);
        self
    }

    pub fn fields(&self) -> &[FieldDefinition] {
        self.model.fields()
    }

    /// Candidate pairs not yet labelled or handed out.
    pub fn remaining_candidates(&self) -> usize {
        self.pool.len()
    }

    pub fn blocked_pairs(&self) -> usize {
        self.blocked.len()
    }

    ///
    /// Blocks `dataset` and builds the labeling pool, replacing any previous state.
    ///
    /// ## Arguments
    ///
    /// * `dataset` - The records to dedupe.
    /// * `blocking` - LSH parameters and the pool sample size.
    /// * `training` - Previously labelled examples to warm-start from (optional).
    ///
    pub fn prepare_training(
        &mut self,
        dataset: &Dataset,
        blocking: &BlockingConfig,
        training: Option<TrainingData>,
    ) -> Result<(), DedupError> {
        let start = Instant::now();
        self.records = dataset.records.clone();
        let documents: Vec<String> = self
            .records
            .par_iter()
            .map(|record| self.model.blocking_text(record))
            .collect();
        let lsh = MinHashLSH::new(&documents, blocking);
        info!(
            "Hashed {} records in {:.4} secs",
            self.records.len(),
            start.elapsed().as_secs_f64()
        );

        let start = Instant::now();
        let records = &self.records;
        let model = &self.model;
        self.blocked = lsh
            .candidate_pairs()
            .into_par_iter()
            .map(|(i, j)| Candidate {
                pair: (i, j),
                features: model.distances(&records[i], &records[j]),
            })
            .collect();
        info!(
            "Scored {} blocked pairs in {:.4} secs",
            self.blocked.len(),
            start.elapsed().as_secs_f64()
        );

        self.pool = (0..self.blocked.len()).collect();
        if blocking.sample_size > 0 && self.pool.len() > blocking.sample_size {
            let mut rng = match blocking.seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };
            self.pool.shuffle(&mut rng);
            self.pool.truncate(blocking.sample_size);
            self.pool.sort_unstable();
            debug!("sampled {} candidate pairs for labeling", self.pool.len());
        }

        self.training = TrainingData::default();
        self.classifier = LogisticRegression::default();
        match training {
            Some(examples) if !examples.is_empty() => {
                info!(
                    matches = examples.matches.len(),
                    distinct = examples.distinct.len(),
                    "warm-starting from existing examples"
                );
                self.mark_pairs(examples)
            }
            _ => Ok(()),
        }
    }

    /// Fits the classifier on every labelled example.
    pub fn train(&mut self) -> Result<(), DedupError> {
        if self.training.matches.is_empty() || self.training.distinct.is_empty() {
            return Err(DedupError::training(format!(
                "need at least one match and one distinct example (have {} and {})",
                self.training.matches.len(),
                self.training.distinct.len()
            )));
        }
        let start = Instant::now();
        self.refit()?;
        info!(
            "Trained on {} examples in {:.4} secs",
            self.training.len(),
            start.elapsed().as_secs_f64()
        );
        Ok(())
    }

    pub fn write_training(&self, path: &Path) -> Result<(), DedupError> {
        write_json_file(path, &self.training)
    }

    ///
    /// Assigns every record to exactly one cluster.
    ///
    /// Blocked pairs scoring above `threshold` form the match graph; components
    /// above the size cap are cut down at their weakest edges, then each is
    /// split by average linkage at the same threshold. Members are scored by
    /// their mean match probability to the rest of their cluster; singletons
    /// score 1. Cluster ids follow the order of each cluster's first record.
    ///
    pub fn partition(&self, threshold: f64) -> Result<ClusterMemberships, DedupError> {
        if !self.classifier.is_fitted() {
            return Err(DedupError::training("matcher must be trained before clustering"));
        }
        let start = Instant::now();
        let scores: HashMap<(usize, usize), f64> = self
            .blocked
            .par_iter()
            .map(|candidate| (candidate.pair, self.classifier.predict_proba(&candidate.features)))
            .collect();
        let edges: Vec<(usize, usize, f64)> = scores
            .iter()
            .filter(|(_, score)| **score > threshold)
            .map(|(&(a, b), &score)| (a, b, score))
            .collect();
        let score = |a: usize, b: usize| -> f64 {
            let key = (a.min(b), a.max(b));
            scores.get(&key).copied().unwrap_or_else(|| {
                let features = self.model.distances(&self.records[key.0], &self.records[key.1]);
                self.classifier.predict_proba(&features)
            })
        };

        let mut clusters: Vec<Vec<usize>> = bounded_components(&edges, self.max_component_size)
            .into_iter()
            .flat_map(|component| split_component(&component, threshold, &score))
            .collect();
        let assigned: HashSet<usize> = clusters.iter().flatten().copied().collect();
        clusters.extend(
            (0..self.records.len())
                .filter(|idx| !assigned.contains(idx))
                .map(|idx| vec![idx]),
        );
        clusters.sort_unstable_by_key(|cluster| cluster[0]);

        let memberships: ClusterMemberships = clusters
            .iter()
            .enumerate()
            .flat_map(|(cluster_id, cluster)| {
                let confidence = member_confidence(cluster, &score);
                cluster
                    .iter()
                    .zip(confidence)
                    .map(move |(&idx, confidence)| (cluster_id, idx, confidence))
                    .collect::<Vec<_>>()
            })
            .map(|(cluster_id, idx, confidence)| {
                let record = &self.records[idx];
                let membership = ClusterMembership {
                    cluster_id,
                    confidence,
                    fields: record.fields.clone(),
                };
                (record.id.clone(), membership)
            })
            .collect();
        info!(
            "Clustered {} records into {} clusters in {:.4} secs",
            self.records.len(),
            clusters.len(),
            start.elapsed().as_secs_f64()
        );
        Ok(memberships)
    }

    fn candidate_key(&self, candidate: usize) -> (String, String) {
        let (i, j) = self.blocked[candidate].pair;
        id_pair_key(&self.records[i].id, &self.records[j].id)
    }

    fn refit(&mut self) -> Result<(), DedupError> {
        if self.training.matches.is_empty() || self.training.distinct.is_empty() {
            return Ok(());
        }
        let (features, targets): (Vec<Vec<f64>>, Vec<f64>) = self
            .training
            .matches
            .iter()
            .map(|pair| (pair, 1.0))
            .chain(self.training.distinct.iter().map(|pair| (pair, 0.0)))
            .map(|((a, b), target)| (self.model.distances(a, b), target))
            .unzip();
        self.classifier.fit(&features, &targets)
    }
}

impl ActiveLearner for ActiveMatcher {
    fn uncertain_pairs(&mut self) -> Vec<RecordPair> {
        let uncertainty = |candidate: usize| -> f64 {
            let features = &self.blocked[candidate].features;
            if self.classifier.is_fitted() {
                (self.classifier.predict_proba(features) - 0.5).abs()
            } else if self.training.matches.is_empty() {
                // No positives yet: offer the most similar pair
                -self.model.similarity(features)
            } else {
                self.model.similarity(features)
            }
        };
        let position = self
            .pool
            .par_iter()
            .enumerate()
            .map(|(position, &candidate)| (position, uncertainty(candidate)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(position, _)| position);

        match position {
            Some(position) => {
                let candidate = self.pool.swap_remove(position);
                let (i, j) = self.blocked[candidate].pair;
                vec![(self.records[i].clone(), self.records[j].clone())]
            }
            None => Vec::new(),
        }
    }

    fn mark_pairs(&mut self, examples: TrainingData) -> Result<(), DedupError> {
        let labelled: HashSet<(String, String)> = examples
            .matches
            .iter()
            .chain(&examples.distinct)
            .map(pair_key)
            .collect();
        let remaining: Vec<usize> = self
            .pool
            .iter()
            .copied()
            .filter(|&candidate| !labelled.contains(&self.candidate_key(candidate)))
            .collect();
        self.pool = remaining;
        self.training.matches.extend(examples.matches);
        self.training.distinct.extend(examples.distinct);
        self.refit()
    }

    fn training_pairs(&self) -> &TrainingData {
        &self.training
    }
}
