use std::collections::HashMap;

use super::cast::CastRecord;
use super::enrich::{EnrichmentError, GenderOutcome, LookupResult};

/// A cast row with its lookup outcome; `gender` is `None` when the row has no
/// cast member or no lookup result matched it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnrichedCastRecord {
    pub record_id: String,
    pub cast_member: Option<String>,
    pub gender: Option<GenderOutcome>,
}

/// Left-joins `records` against `results` on the trimmed cast member.
///
/// Output order and length match `records` exactly.
///
/// # Errors
/// [`EnrichmentError::JoinInvariantViolation`] if the output length ever
/// differs from the input length.
pub fn merge(
    records: &[CastRecord],
    results: &HashMap<String, LookupResult>,
) -> Result<Vec<EnrichedCastRecord>, EnrichmentError> {
    let merged: Vec<EnrichedCastRecord> = records
        .iter()
        .map(|record| {
            let gender = record
                .cast_member
                .as_deref()
                .map(str::trim)
                .and_then(|name| results.get(name))
                .map(|result| result.outcome);
            EnrichedCastRecord {
                record_id: record.record_id.clone(),
                cast_member: record.cast_member.clone(),
                gender,
            }
        })
        .collect();

    if merged.len() != records.len() {
        return Err(EnrichmentError::JoinInvariantViolation {
            expected: records.len(),
            actual: merged.len(),
        });
    }

    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::enrich::Gender;

    fn results(entries: &[(&str, GenderOutcome)]) -> HashMap<String, LookupResult> {
        entries
            .iter()
            .map(|(name, outcome)| ((*name).to_string(), LookupResult::new(*name, *outcome)))
            .collect()
    }

    #[test]
    fn merge_left_joins_and_preserves_row_count() {
        let records = vec![
            CastRecord::new("1", Some("Alice")),
            CastRecord::new("1", Some("Bob")),
            CastRecord::new("2", None),
            CastRecord::new("3", Some("Alice")),
        ];
        let results = results(&[
            ("Alice", GenderOutcome::Resolved(Gender::Male)),
            ("Bob", GenderOutcome::Failed),
        ]);

        let merged = merge(&records, &results).expect("merge");

        assert_eq!(merged.len(), records.len());
        assert_eq!(
            merged
                .iter()
                .map(|r| (r.record_id.as_str(), r.cast_member.as_deref(), r.gender))
                .collect::<Vec<_>>(),
            vec![
                ("1", Some("Alice"), Some(GenderOutcome::Resolved(Gender::Male))),
                ("1", Some("Bob"), Some(GenderOutcome::Failed)),
                ("2", None, None),
                ("3", Some("Alice"), Some(GenderOutcome::Resolved(Gender::Male))),
            ]
        );
    }

    #[test]
    fn merge_matches_on_trimmed_name() {
        let records = vec![CastRecord::new("9", Some("  Dana "))];
        let results = results(&[("Dana", GenderOutcome::Unknown)]);

        let merged = merge(&records, &results).expect("merge");

        assert_eq!(merged[0].gender, Some(GenderOutcome::Unknown));
        assert_eq!(merged[0].cast_member.as_deref(), Some("  Dana "));
    }

    #[test]
    fn unmatched_name_gets_absent_gender() {
        let records = vec![CastRecord::new("5", Some("Eve"))];

        let merged = merge(&records, &HashMap::new()).expect("merge");

        assert_eq!(merged[0].gender, None);
    }

    #[test]
    fn merge_is_deterministic() {
        let records = vec![
            CastRecord::new("1", Some("Alice")),
            CastRecord::new("2", Some("Bob")),
            CastRecord::new("2", None),
        ];
        let results = results(&[("Alice", GenderOutcome::Resolved(Gender::Female))]);

        let first = merge(&records, &results).expect("merge");
        let second = merge(&records, &results).expect("merge");

        assert_eq!(first, second);
    }
}
