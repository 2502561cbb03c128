use lazy_static::lazy_static;
use lsh_dedup_labeler::dto::{FieldDefinition, FieldKind, Record};
use regex::Regex;
use strsim::jaro_winkler;

lazy_static! {
    static ref NON_ALPHANUMERIC: Regex = Regex::new(r"[^\p{Alphabetic}\p{Nd}]+").unwrap();
}

/// Lowercases and collapses punctuation and whitespace runs into single spaces.
pub fn normalize(value: &str) -> String {
    NON_ALPHANUMERIC
        .replace_all(&value.to_lowercase(), " ")
        .trim()
        .to_string()
}

/// Turns a record pair into the feature vector the classifier consumes.
///
/// Each field contributes a distance in [0, 1]; fields declared with
/// `has_missing` add an indicator that is 1 when either side is blank, in
/// which case the distance itself is 0.
#[derive(Clone, Debug)]
pub struct DataModel {
    fields: Vec<FieldDefinition>,
}

impl DataModel {
    pub fn new(fields: Vec<FieldDefinition>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[FieldDefinition] {
        &self.fields
    }

    pub fn feature_len(&self) -> usize {
        self.fields.len() + self.fields.iter().filter(|f| f.has_missing).count()
    }

    pub fn distances(&self, a: &Record, b: &Record) -> Vec<f64> {
        let mut features = Vec::with_capacity(self.feature_len());
        let mut indicators = Vec::new();
        for definition in &self.fields {
            let left = normalize(a.value(&definition.field));
            let right = normalize(b.value(&definition.field));
            let missing = left.is_empty() || right.is_empty();
            let distance = if missing {
                if definition.has_missing {
                    0.0
                } else {
                    1.0
                }
            } else {
                field_distance(definition.kind, &left, &right)
            };
            features.push(distance);
            if definition.has_missing {
                indicators.push(if missing { 1.0 } else { 0.0 });
            }
        }
        features.extend(indicators);
        features
    }

    /// Mean field similarity, ignoring fields missing on either side.
    /// Used to rank pairs before the classifier has seen both classes.
    pub fn similarity(&self, features: &[f64]) -> f64 {
        let n = self.fields.len();
        let indicators = &features[n.min(features.len())..];
        let mut indicator_iter = indicators.iter();
        let mut total = 0.0;
        let mut counted = 0usize;
        for (definition, distance) in self.fields.iter().zip(features) {
            let missing = definition.has_missing
                && indicator_iter.next().map_or(false, |&flag| flag > 0.5);
            if !missing {
                total += 1.0 - distance;
                counted += 1;
            }
        }
        if counted == 0 {
            0.0
        } else {
            total / counted as f64
        }
    }

    /// Text hashed by the blocking stage.
    pub fn blocking_text(&self, record: &Record) -> String {
        self.fields
            .iter()
            .map(|definition| normalize(record.value(&definition.field)))
            .filter(|value| !value.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn field_distance(kind: FieldKind, left: &str, right: &str) -> f64 {
    match kind {
        FieldKind::String => (1.0 - jaro_winkler(left, right)).clamp(0.0, 1.0),
        FieldKind::Exact => {
            if left == right {
                0.0
            } else {
                1.0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lsh_dedup_labeler::dto::Fields;

    fn record(name: &str, country: &str) -> Record {
        Record {
            id: name.to_string(),
            fields: Fields::from([
                ("name".to_string(), name.to_string()),
                ("country_code".to_string(), country.to_string()),
            ]),
        }
    }

    fn model() -> DataModel {
        DataModel::new(vec![
            FieldDefinition::string("name"),
            FieldDefinition::exact("country_code"),
        ])
    }

    #[test]
    fn normalize_strips_punctuation() {
        assert_eq!(normalize("  ACME, Ltd.  "), "acme ltd");
        assert_eq!(normalize("--"), "");
    }

    #[test]
    fn identical_records_have_zero_distance() {
        let features = model().distances(&record("Acme Ltd", "GB"), &record("acme ltd", "gb"));
        assert_eq!(features, vec![0.0, 0.0, 0.0, 0.0]);
        assert_eq!(model().similarity(&features), 1.0);
    }

    #[test]
    fn exact_field_mismatch() {
        let features = model().distances(&record("Acme", "GB"), &record("Acme", "FR"));
        assert_eq!(features[1], 1.0);
    }

    #[test]
    fn missing_value_sets_indicator() {
        let features = model().distances(&record("Acme", ""), &record("Acme", "FR"));
        assert_eq!(features.len(), model().feature_len());
        assert_eq!(features[1], 0.0);
        assert_eq!(features[3], 1.0);
        assert_eq!(model().similarity(&features), 1.0);
    }

    #[test]
    fn string_distance_is_graded() {
        let close = model().distances(&record("Acme Limited", "GB"), &record("Acme Limted", "GB"));
        let far = model().distances(&record("Acme Limited", "GB"), &record("Zephyr", "GB"));
        assert!(close[0] < far[0]);
        assert!((0.0..=1.0).contains(&far[0]));
    }

    #[test]
    fn blocking_text_skips_blank_fields() {
        assert_eq!(model().blocking_text(&record("Acme", "")), "acme");
    }
}
