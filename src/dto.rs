use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// Field name to raw value, as read from the dataset.
pub type Fields = BTreeMap<String, String>;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Record {
    pub id: String,
    pub fields: Fields,
}

impl Record {
    /// Value of `field`, or the empty string when the record has no such column.
    pub fn value(&self, field: &str) -> &str {
        self.fields.get(field).map(String::as_str).unwrap_or("")
    }
}

/// Records loaded once per command, in file order.
#[derive(Clone, Debug, Default)]
pub struct Dataset {
    pub columns: Vec<String>,
    pub records: Vec<Record>,
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    /// Number of records with a blank value for `column`.
    pub fn blank_count(&self, column: &str) -> usize {
        self.records
            .iter()
            .filter(|record| record.value(column).trim().is_empty())
            .count()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub enum FieldKind {
    /// Fuzzy string comparison.
    String,
    /// Equal or not.
    Exact,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => write!(f, "String"),
            Self::Exact => write!(f, "Exact"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct FieldDefinition {
    pub field: String,
    #[serde(rename = "type")]
    pub kind: FieldKind,
    #[serde(default, alias = "has missing")]
    pub has_missing: bool,
}

impl FieldDefinition {
    pub fn string(field: &str) -> Self {
        Self {
            field: field.to_string(),
            kind: FieldKind::String,
            has_missing: true,
        }
    }

    pub fn exact(field: &str) -> Self {
        Self {
            field: field.to_string(),
            kind: FieldKind::Exact,
            has_missing: true,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Match,
    Distinct,
    Unsure,
}

pub type RecordPair = (Record, Record);

pub type LabeledPair = (RecordPair, Label);

/// Order-independent identity of the pair of records `a` and `b`.
pub fn id_pair_key(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

pub fn pair_key(pair: &RecordPair) -> (String, String) {
    id_pair_key(&pair.0.id, &pair.1.id)
}

/// Labelled examples, in the layout of the training file.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct TrainingData {
    #[serde(default)]
    pub distinct: Vec<RecordPair>,
    #[serde(rename = "match", default)]
    pub matches: Vec<RecordPair>,
}

impl TrainingData {
    pub fn len(&self) -> usize {
        self.matches.len() + self.distinct.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty() && self.distinct.is_empty()
    }

    /// Examples for a single reviewer decision. An unsure pair lands in both
    /// categories since the classifier has no third class.
    pub fn from_label(pair: RecordPair, label: Label) -> Self {
        let mut examples = Self::default();
        match label {
            Label::Match => examples.matches.push(pair),
            Label::Distinct => examples.distinct.push(pair),
            Label::Unsure => {
                examples.matches.push(pair.clone());
                examples.distinct.push(pair);
            }
        }
        examples
    }

    /// Union of both sets, dropping pairs already present in the same category.
    pub fn merged(mut self, other: TrainingData) -> Self {
        let mut seen_match: HashSet<(String, String)> = self.matches.iter().map(pair_key).collect();
        let mut seen_distinct: HashSet<(String, String)> =
            self.distinct.iter().map(pair_key).collect();
        for pair in other.matches {
            if seen_match.insert(pair_key(&pair)) {
                self.matches.push(pair);
            }
        }
        for pair in other.distinct {
            if seen_distinct.insert(pair_key(&pair)) {
                self.distinct.push(pair);
            }
        }
        self
    }
}

/// Cluster assignment of one record, written next to the record's own fields.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct ClusterMembership {
    #[serde(rename = "Cluster ID")]
    pub cluster_id: usize,
    #[serde(rename = "confidence_score")]
    pub confidence: f64,
    #[serde(flatten)]
    pub fields: Fields,
}

/// Layout of the cluster output file: record id to its membership.
pub type ClusterMemberships = BTreeMap<String, ClusterMembership>;

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, name: &str) -> Record {
        Record {
            id: id.to_string(),
            fields: Fields::from([("name".to_string(), name.to_string())]),
        }
    }

    #[test]
    fn unsure_lands_in_both_categories() {
        let pair = (record("1", "a"), record("2", "b"));
        let examples = TrainingData::from_label(pair, Label::Unsure);
        assert_eq!(examples.matches.len(), 1);
        assert_eq!(examples.distinct.len(), 1);
    }

    #[test]
    fn merged_ignores_pair_order() {
        let left = TrainingData::from_label((record("1", "a"), record("2", "b")), Label::Match);
        let right = TrainingData::from_label((record("2", "b"), record("1", "a")), Label::Match);
        let merged = left.merged(right);
        assert_eq!(merged.matches.len(), 1);
        assert!(merged.distinct.is_empty());
    }

    #[test]
    fn training_file_layout_uses_match_key() {
        let examples = TrainingData::from_label((record("1", "a"), record("2", "b")), Label::Match);
        let json = serde_json::to_value(&examples).unwrap();
        assert_eq!(json["match"].as_array().unwrap().len(), 1);
        assert_eq!(json["distinct"].as_array().unwrap().len(), 0);
        assert_eq!(json["match"][0][1]["fields"]["name"], "b");
    }

    #[test]
    fn pair_key_ignores_order() {
        let forward = (record("b", "x"), record("a", "y"));
        let backward = (record("a", "y"), record("b", "x"));
        assert_eq!(pair_key(&forward), pair_key(&backward));
        assert_eq!(pair_key(&forward), id_pair_key("a", "b"));
    }

    #[test]
    fn cluster_file_is_keyed_by_record_id_with_flat_fields() {
        let mut memberships = ClusterMemberships::new();
        memberships.insert(
            "7".to_string(),
            ClusterMembership {
                cluster_id: 2,
                confidence: 0.75,
                fields: Fields::from([
                    ("name".to_string(), "Acme Ltd".to_string()),
                    ("country_code".to_string(), "GB".to_string()),
                ]),
            },
        );
        let json = serde_json::to_value(&memberships).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "7": {
                    "Cluster ID": 2,
                    "confidence_score": 0.75,
                    "name": "Acme Ltd",
                    "country_code": "GB"
                }
            })
        );

        let loaded: ClusterMemberships = serde_json::from_value(json).unwrap();
        assert_eq!(loaded, memberships);
    }

    #[test]
    fn field_definition_accepts_spaced_key() {
        let def: FieldDefinition =
            serde_json::from_str(r#"{"field": "name", "type": "String", "has missing": true}"#)
                .unwrap();
        assert_eq!(def, FieldDefinition::string("name"));
    }
}
