use lsh_dedup_labeler::dto::{Label, LabeledPair, RecordPair, TrainingData};
use lsh_dedup_labeler::error::DedupError;
use lsh_dedup_matcher::ActiveLearner;
use std::collections::VecDeque;
use std::str::FromStr;
use tracing::{debug, warn};

/// A reviewer's answer to "do these records refer to the same thing?".
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    Match,
    Distinct,
    Unsure,
    Finished,
    UsePrevious,
}

impl FromStr for Decision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "y" | "yes" | "match" => Ok(Decision::Match),
            "n" | "no" | "distinct" => Ok(Decision::Distinct),
            "u" | "unsure" => Ok(Decision::Unsure),
            "f" | "finished" => Ok(Decision::Finished),
            "p" | "previous" | "use previous" => Ok(Decision::UsePrevious),
            other => Err(format!("unrecognised answer '{other}'")),
        }
    }
}

/// Label counts shown alongside each pair.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Progress {
    pub n_match: usize,
    pub n_distinct: usize,
    pub target: usize,
    /// Whether a pending decision exists that "use previous" could revisit
    pub has_previous: bool,
}

pub trait Reviewer {
    fn review(
        &mut self,
        fields: &[String],
        pair: &RecordPair,
        progress: &Progress,
    ) -> Result<Decision, DedupError>;
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ReviewOutcome {
    /// Pairs shown to the reviewer, revisits included
    pub presented: usize,
    /// Labelled pairs handed to the matcher
    pub flushed: usize,
    /// The reviewer chose "finished" (as opposed to running out of pairs)
    pub finished: bool,
}

/// Drives one labeling session: pulls uncertain pairs from the matcher, asks the
/// reviewer about each and hands decisions back once they fall out of the
/// undo window.
pub struct ReviewLoop {
    fields: Vec<String>,
    buffer_len: usize,
    label_target: usize,
    unlabeled: Vec<RecordPair>,
    /// Pending decisions, newest first
    labeled: VecDeque<LabeledPair>,
}

impl ReviewLoop {
    pub fn new(fields: Vec<String>, buffer_len: usize, label_target: usize) -> Self {
        Self {
            fields,
            buffer_len,
            label_target,
            unlabeled: Vec::new(),
            labeled: VecDeque::new(),
        }
    }

    /// Runs until the reviewer finishes or the matcher has nothing left to ask.
    /// `on_flush` sees the matcher's examples after every batch handed over.
    /// Pending decisions reach the matcher however the loop ends, errors included.
    pub fn run<L, R, F>(
        &mut self,
        learner: &mut L,
        reviewer: &mut R,
        mut on_flush: F,
    ) -> Result<ReviewOutcome, DedupError>
    where
        L: ActiveLearner,
        R: Reviewer,
        F: FnMut(&TrainingData) -> Result<(), DedupError>,
    {
        let mut outcome = ReviewOutcome::default();
        let reviewed = self.review_pairs(learner, reviewer, &mut on_flush, &mut outcome);
        let flushed = self.flush_pending(learner, 0, &mut on_flush, &mut outcome);
        match (reviewed, flushed) {
            (Err(err), Err(flush_err)) => {
                warn!("pending labels were not saved: {flush_err}");
                Err(err)
            }
            (Err(err), Ok(())) => Err(err),
            (Ok(()), flushed) => flushed.map(|()| outcome),
        }
    }

    fn review_pairs<L, R, F>(
        &mut self,
        learner: &mut L,
        reviewer: &mut R,
        on_flush: &mut F,
        outcome: &mut ReviewOutcome,
    ) -> Result<(), DedupError>
    where
        L: ActiveLearner,
        R: Reviewer,
        F: FnMut(&TrainingData) -> Result<(), DedupError>,
    {
        let mut use_previous = false;

        loop {
            let record_pair = if use_previous {
                use_previous = false;
                match self.labeled.pop_front() {
                    Some((pair, _)) => pair,
                    None => {
                        debug!("no previous decision to revisit");
                        match self.next_unlabeled(learner) {
                            Some(pair) => pair,
                            None => break,
                        }
                    }
                }
            } else {
                match self.next_unlabeled(learner) {
                    Some(pair) => pair,
                    None => {
                        debug!("uncertain pairs exhausted");
                        break;
                    }
                }
            };

            let progress = self.progress(learner.training_pairs());
            outcome.presented += 1;
            match reviewer.review(&self.fields, &record_pair, &progress)? {
                Decision::Match => self.labeled.push_front((record_pair, Label::Match)),
                Decision::Distinct => self.labeled.push_front((record_pair, Label::Distinct)),
                Decision::Unsure => self.labeled.push_front((record_pair, Label::Unsure)),
                Decision::Finished => {
                    outcome.finished = true;
                    return Ok(());
                }
                Decision::UsePrevious => {
                    use_previous = true;
                    self.unlabeled.push(record_pair);
                }
            }

            self.flush_pending(learner, self.buffer_len, on_flush, outcome)?;
        }
        Ok(())
    }

    /// Hands the oldest pending decisions to the matcher until at most `keep`
    /// remain, then reports the matcher's examples to `on_flush`.
    fn flush_pending<L, F>(
        &mut self,
        learner: &mut L,
        keep: usize,
        on_flush: &mut F,
        outcome: &mut ReviewOutcome,
    ) -> Result<(), DedupError>
    where
        L: ActiveLearner,
        F: FnMut(&TrainingData) -> Result<(), DedupError>,
    {
        let before = outcome.flushed;
        let mut marked = Ok(());
        while self.labeled.len() > keep {
            let Some(labeled_pair) = self.labeled.pop_back() else {
                break;
            };
            marked = mark_pair(learner, labeled_pair);
            if marked.is_err() {
                break;
            }
            outcome.flushed += 1;
        }
        if outcome.flushed > before {
            on_flush(learner.training_pairs())?;
        }
        marked
    }

    fn next_unlabeled<L: ActiveLearner>(&mut self, learner: &mut L) -> Option<RecordPair> {
        if self.unlabeled.is_empty() {
            self.unlabeled = learner.uncertain_pairs();
        }
        self.unlabeled.pop()
    }

    fn progress(&self, training: &TrainingData) -> Progress {
        let pending = |wanted: Label| self.labeled.iter().filter(|(_, label)| *label == wanted).count();
        Progress {
            n_match: training.matches.len() + pending(Label::Match),
            n_distinct: training.distinct.len() + pending(Label::Distinct),
            target: self.label_target,
            has_previous: !self.labeled.is_empty(),
        }
    }
}

fn mark_pair<L: ActiveLearner>(learner: &mut L, labeled_pair: LabeledPair) -> Result<(), DedupError> {
    let (record_pair, label) = labeled_pair;
    learner.mark_pairs(TrainingData::from_label(record_pair, label))
}
