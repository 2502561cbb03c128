use crate::review::{ReviewLoop, ReviewOutcome, Reviewer};
use crate::session::{Session, SessionStore};
use lsh_dedup_labeler::config::DedupConfig;
use lsh_dedup_labeler::dto::{Dataset, FieldDefinition, TrainingData};
use lsh_dedup_labeler::error::DedupError;
use lsh_dedup_labeler::util::{load_dataset, read_json_file, write_json_file};
use lsh_dedup_matcher::{ActiveLearner, ActiveMatcher};
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;

/// Config plus the dataset and field list it resolves to.
pub struct Workspace {
    pub config: DedupConfig,
    pub dataset_path: PathBuf,
    pub dataset: Dataset,
    pub fields: Vec<FieldDefinition>,
}

impl Workspace {
    pub fn open(config: DedupConfig) -> Result<Self, DedupError> {
        let start = Instant::now();
        let dataset_path = config.dataset_path()?.to_path_buf();
        let dataset = load_dataset(&dataset_path, config.id_column.as_deref())?;
        if dataset.is_empty() {
            return Err(DedupError::invalid_data(format!(
                "{} contains no records",
                dataset_path.display()
            )));
        }
        let fields = config.resolve_fields(&dataset)?;
        info!(
            "Loaded {} records from {} in {:.4} secs",
            dataset.len(),
            dataset_path.display(),
            start.elapsed().as_secs_f64()
        );
        Ok(Self {
            config,
            dataset_path,
            dataset,
            fields,
        })
    }

    pub fn session_store(&self) -> SessionStore {
        SessionStore::new(&self.config.session_file)
    }

    pub fn load_session(&self) -> Result<Session, DedupError> {
        self.session_store().load(&self.dataset_path)
    }

    /// Blocks the dataset and warm-starts from the training file (when it
    /// exists) and from the session's examples.
    pub fn prepare_matcher(&self, session: &Session) -> Result<ActiveMatcher, DedupError> {
        let mut matcher = ActiveMatcher::new(self.fields.clone())?
            .with_max_component_size(self.config.max_component_size);
        let training_file = &self.config.training_file;
        let examples = match read_json_file::<TrainingData>(training_file)? {
            Some(from_file) => {
                info!(
                    "Read {} examples from {}",
                    from_file.len(),
                    training_file.display()
                );
                from_file.merged(session.training.clone())
            }
            None => {
                info!("No training file at {}, starting cold", training_file.display());
                session.training.clone()
            }
        };
        matcher.prepare_training(&self.dataset, &self.config.blocking(), Some(examples))?;
        Ok(matcher)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct TrainingReport {
    pub matches: usize,
    pub distinct: usize,
    pub records: usize,
    pub clusters: usize,
}

/// Runs the review loop, saving the session after each batch of labels the
/// matcher receives.
pub fn label<R: Reviewer>(
    workspace: &Workspace,
    matcher: &mut ActiveMatcher,
    session: &mut Session,
    reviewer: &mut R,
) -> Result<ReviewOutcome, DedupError> {
    let store = workspace.session_store();
    let field_names = matcher.fields().iter().map(|f| f.field.clone()).collect();
    let mut review_loop = ReviewLoop::new(
        field_names,
        workspace.config.buffer_len,
        workspace.config.label_target,
    );
    info!(
        "{} candidate pairs available for labeling",
        matcher.remaining_candidates()
    );
    let outcome = review_loop.run(matcher, reviewer, |training| {
        session.training = training.clone();
        store.save(session)
    })?;
    info!(
        presented = outcome.presented,
        labelled = outcome.flushed,
        finished = outcome.finished,
        "labeling ended"
    );
    Ok(outcome)
}

/// Trains on every example, overwrites the training file and writes the
/// cluster membership file.
pub fn train(
    workspace: &Workspace,
    matcher: &mut ActiveMatcher,
    session: &mut Session,
) -> Result<TrainingReport, DedupError> {
    let config = &workspace.config;
    matcher.train()?;
    matcher.write_training(&config.training_file)?;
    info!("Wrote training examples to {}", config.training_file.display());

    let memberships = matcher.partition(config.threshold)?;
    write_json_file(&config.output_file, &memberships)?;
    let clusters = memberships
        .values()
        .map(|m| m.cluster_id)
        .max()
        .map_or(0, |max| max + 1);
    info!(
        "Wrote {} cluster memberships to {}",
        memberships.len(),
        config.output_file.display()
    );

    session.training = matcher.training_pairs().clone();
    workspace.session_store().save(session)?;

    let training = matcher.training_pairs();
    Ok(TrainingReport {
        matches: training.matches.len(),
        distinct: training.distinct.len(),
        records: memberships.len(),
        clusters,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::review::{Decision, Progress};
    use lsh_dedup_labeler::dto::{ClusterMemberships, RecordPair};
    use std::path::Path;

    const OPERATORS: &str = "\
id,name,address,country_code,entity
1,Northwind Traders,12 Harbour Road Leith,GB,northwind
2,Northwind Traders Ltd,12 Harbour Rd Leith,GB,northwind
3,Blue Lagoon Shipping,4 Quai des Chartrons Bordeaux,FR,bluelagoon
4,Blue Lagoon Shipping SA,4 Quai des Chartrons,FR,bluelagoon
5,Contoso Freight,900 Lake Shore Drive Chicago,US,contoso
6,Tailspin Cargo,3 Rue de Rivoli Paris,FR,tailspin
7,Wingtip Haulage,18 Dock Street Dundee,GB,wingtip
";

    /// Answers from the hidden `entity` column, then finishes after `budget` pairs.
    struct OracleReviewer {
        budget: usize,
    }

    impl Reviewer for OracleReviewer {
        fn review(
            &mut self,
            _fields: &[String],
            pair: &RecordPair,
            _progress: &Progress,
        ) -> Result<Decision, DedupError> {
            if self.budget == 0 {
                return Ok(Decision::Finished);
            }
            self.budget -= 1;
            if pair.0.value("entity") == pair.1.value("entity") {
                Ok(Decision::Match)
            } else {
                Ok(Decision::Distinct)
            }
        }
    }

    fn workspace(dir: &Path) -> Workspace {
        let dataset = dir.join("ops.csv");
        std::fs::write(&dataset, OPERATORS).unwrap();
        let config = DedupConfig {
            dataset: Some(dataset),
            id_column: Some("id".into()),
            fields: vec![
                FieldDefinition::string("name"),
                FieldDefinition::string("address"),
                FieldDefinition::exact("country_code"),
            ],
            training_file: dir.join("training.json"),
            output_file: dir.join("clusters.json"),
            session_file: dir.join("session.json"),
            num_perm: 128,
            num_bands: 128,
            seed: Some(3),
            ..Default::default()
        };
        Workspace::open(config).unwrap()
    }

    #[test]
    fn cold_start_label_then_train_writes_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = workspace(dir.path());
        assert!(!workspace.config.training_file.exists());

        let mut session = workspace.load_session().unwrap();
        let mut matcher = workspace.prepare_matcher(&session).unwrap();
        let mut reviewer = OracleReviewer { budget: usize::MAX };
        let outcome = label(&workspace, &mut matcher, &mut session, &mut reviewer).unwrap();
        assert!(!outcome.finished);
        assert!(workspace.config.session_file.exists());

        let report = train(&workspace, &mut matcher, &mut session).unwrap();
        assert_eq!(report.records, 7);
        assert!(workspace.config.training_file.exists());

        let memberships: ClusterMemberships =
            read_json_file(&workspace.config.output_file).unwrap().unwrap();
        let ids: Vec<&str> = memberships.keys().map(String::as_str).collect();
        assert_eq!(ids, vec!["1", "2", "3", "4", "5", "6", "7"]);
        assert!(memberships
            .values()
            .all(|m| (0.0..=1.0).contains(&m.confidence) && m.cluster_id < report.clusters));
        assert_eq!(memberships["6"].fields["name"], "Tailspin Cargo");
    }

    #[test]
    fn train_without_examples_fails_before_writing() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = workspace(dir.path());
        let mut session = workspace.load_session().unwrap();
        let mut matcher = workspace.prepare_matcher(&session).unwrap();

        let err = train(&workspace, &mut matcher, &mut session).unwrap_err();
        assert!(matches!(err, DedupError::Training(_)));
        assert!(!workspace.config.training_file.exists());
        assert!(!workspace.config.output_file.exists());
    }

    #[test]
    fn session_labels_survive_restart() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = workspace(dir.path());

        let mut session = workspace.load_session().unwrap();
        let mut matcher = workspace.prepare_matcher(&session).unwrap();
        let mut reviewer = OracleReviewer { budget: 3 };
        let outcome = label(&workspace, &mut matcher, &mut session, &mut reviewer).unwrap();
        let labelled = matcher.training_pairs().len();
        assert_eq!(outcome.flushed, labelled);

        let resumed = workspace.load_session().unwrap();
        assert_eq!(resumed.training.len(), labelled);
        let matcher = workspace.prepare_matcher(&resumed).unwrap();
        assert_eq!(matcher.training_pairs().len(), labelled);
    }

    #[test]
    fn second_dataset_leaves_first_session_intact() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = workspace(dir.path());
        let mut session = workspace.load_session().unwrap();
        let mut matcher = workspace.prepare_matcher(&session).unwrap();
        let mut reviewer = OracleReviewer { budget: 2 };
        label(&workspace, &mut matcher, &mut session, &mut reviewer).unwrap();
        let labelled = matcher.training_pairs().len();
        assert!(labelled > 0);

        let other_dataset = dir.path().join("other.csv");
        std::fs::write(&other_dataset, OPERATORS).unwrap();
        let other = Workspace::open(DedupConfig {
            dataset: Some(other_dataset),
            ..workspace.config.clone()
        })
        .unwrap();
        assert!(matches!(other.load_session(), Err(DedupError::Session(_))));

        assert_eq!(workspace.load_session().unwrap().training.len(), labelled);
    }

    #[test]
    fn empty_dataset_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = dir.path().join("empty.csv");
        std::fs::write(&dataset, "name,address\n").unwrap();
        let config = DedupConfig {
            dataset: Some(dataset),
            ..Default::default()
        };
        assert!(matches!(
            Workspace::open(config),
            Err(DedupError::InvalidData(_))
        ));
    }
}
