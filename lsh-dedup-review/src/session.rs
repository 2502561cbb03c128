use lsh_dedup_labeler::dto::TrainingData;
use lsh_dedup_labeler::error::DedupError;
use lsh_dedup_labeler::util::{read_json_file, write_json_file};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const SESSION_VERSION: u32 = 1;

/// Labeling state that outlives a single command.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Session {
    pub version: u32,
    pub dataset: PathBuf,
    /// Bumped on every save
    pub revision: u64,
    pub training: TrainingData,
}

impl Session {
    pub fn new(dataset: &Path) -> Self {
        Self {
            version: SESSION_VERSION,
            dataset: dataset.to_path_buf(),
            revision: 0,
            training: TrainingData::default(),
        }
    }
}

/// File-backed session: loaded when a command starts, saved after each change.
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    /// The stored session for `dataset`, or a fresh one when nothing is stored.
    /// A session recorded for another dataset is an error, leaving its labels
    /// on disk untouched.
    pub fn load(&self, dataset: &Path) -> Result<Session, DedupError> {
        let Some(session) = read_json_file::<Session>(&self.path)? else {
            debug!(path = %self.path.display(), "no session file, starting fresh");
            return Ok(Session::new(dataset));
        };
        if session.version != SESSION_VERSION {
            return Err(DedupError::session(format!(
                "{} has version {}, expected {}",
                self.path.display(),
                session.version,
                SESSION_VERSION
            )));
        }
        if session.dataset != dataset {
            return Err(DedupError::session(format!(
                "{} holds labels for {}, not {} (use another --session-file)",
                self.path.display(),
                session.dataset.display(),
                dataset.display()
            )));
        }
        debug!(
            revision = session.revision,
            examples = session.training.len(),
            "resumed session"
        );
        Ok(session)
    }

    pub fn save(&self, session: &mut Session) -> Result<(), DedupError> {
        session.revision += 1;
        write_json_file(&self.path, session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lsh_dedup_labeler::dto::{Fields, Label, Record};

    fn record(id: &str) -> Record {
        Record {
            id: id.to_string(),
            fields: Fields::new(),
        }
    }

    #[test]
    fn missing_file_gives_fresh_session() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(&dir.path().join("session.json"));
        let session = store.load(Path::new("ops.csv")).unwrap();
        assert_eq!(session, Session::new(Path::new("ops.csv")));
    }

    #[test]
    fn save_then_load_resumes() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(&dir.path().join("session.json"));
        let mut session = store.load(Path::new("ops.csv")).unwrap();
        session.training = TrainingData::from_label((record("1"), record("2")), Label::Match);
        store.save(&mut session).unwrap();
        store.save(&mut session).unwrap();

        let resumed = store.load(Path::new("ops.csv")).unwrap();
        assert_eq!(resumed.revision, 2);
        assert_eq!(resumed.training.matches.len(), 1);
    }

    #[test]
    fn other_dataset_keeps_stored_labels() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(&dir.path().join("session.json"));
        let mut session = store.load(Path::new("a.csv")).unwrap();
        session.training = TrainingData::from_label((record("1"), record("2")), Label::Distinct);
        store.save(&mut session).unwrap();

        let err = store.load(Path::new("b.csv")).unwrap_err();
        assert!(matches!(err, DedupError::Session(_)));
        assert!(err.to_string().contains("a.csv"));

        let resumed = store.load(Path::new("a.csv")).unwrap();
        assert_eq!(resumed.training.distinct.len(), 1);
        assert_eq!(resumed.revision, 1);
    }

    #[test]
    fn separate_session_files_per_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let first = SessionStore::new(&dir.path().join("a.json"));
        let second = SessionStore::new(&dir.path().join("b.json"));
        let mut a = first.load(Path::new("a.csv")).unwrap();
        a.training = TrainingData::from_label((record("1"), record("2")), Label::Match);
        first.save(&mut a).unwrap();
        let mut b = second.load(Path::new("b.csv")).unwrap();
        second.save(&mut b).unwrap();

        assert_eq!(first.load(Path::new("a.csv")).unwrap().training.len(), 1);
        assert!(second.load(Path::new("b.csv")).unwrap().training.is_empty());
    }

    #[test]
    fn version_mismatch_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let mut session = Session::new(Path::new("ops.csv"));
        session.version = SESSION_VERSION + 1;
        write_json_file(&path, &session).unwrap();

        let err = SessionStore::new(&path).load(Path::new("ops.csv")).unwrap_err();
        assert!(matches!(err, DedupError::Session(_)));
    }
}
