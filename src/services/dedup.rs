use std::collections::HashSet;

use time::PrimitiveDateTime;

#[derive(Debug, Clone)]
pub(crate) struct DedupCandidate {
    pub(crate) id: String,
    pub(crate) text: String,
    pub(crate) created_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct DedupPlan {
    pub(crate) kept: Vec<String>,
    pub(crate) removed: Vec<String>,
}

/// Lower-cases and collapses whitespace runs so cosmetic differences match.
pub(crate) fn normalize_text(text: &str) -> String {
    text.split_whitespace().map(str::to_lowercase).collect::<Vec<_>>().join(" ")
}

/// Keeps the earliest question for each normalized text and marks the rest for removal.
pub(crate) fn plan(candidates: &[DedupCandidate]) -> DedupPlan {
    let mut ordered: Vec<&DedupCandidate> = candidates.iter().collect();
    ordered.sort_by_key(|candidate| candidate.created_at);

    let mut seen = HashSet::new();
    let mut plan = DedupPlan::default();
    for candidate in ordered {
        if seen.insert(normalize_text(&candidate.text)) {
            plan.kept.push(candidate.id.clone());
        } else {
            plan.removed.push(candidate.id.clone());
        }
    }
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;
    use time::Duration;

    fn candidates(texts: &[&str]) -> Vec<DedupCandidate> {
        let base = datetime!(2025-02-01 08:00);
        texts
            .iter()
            .enumerate()
            .map(|(index, text)| DedupCandidate {
                id: format!("q{}", index + 1),
                text: text.to_string(),
                created_at: base + Duration::minutes(index as i64),
            })
            .collect()
    }

    #[test]
    fn keeps_first_occurrence_of_each_text() {
        let plan = plan(&candidates(&["a", "b", "a", "a", "c"]));
        assert_eq!(plan.kept, vec!["q1", "q2", "q5"]);
        assert_eq!(plan.removed, vec!["q3", "q4"]);
    }

    #[test]
    fn normalization_ignores_case_and_spacing() {
        assert_eq!(normalize_text("  Which   NERVE\tsupplies\n deltoid? "), "which nerve supplies deltoid?");

        let plan = plan(&candidates(&["Which nerve?", "which   NERVE?", "Which nerve ?"]));
        assert_eq!(plan.removed, vec!["q2"]);
    }

    #[test]
    fn creation_order_decides_the_survivor() {
        let mut items = candidates(&["dup", "dup"]);
        items[0].created_at = items[1].created_at + Duration::hours(1);

        let plan = plan(&items);
        assert_eq!(plan.kept, vec!["q2"]);
        assert_eq!(plan.removed, vec!["q1"]);
    }

    #[test]
    fn empty_bank_has_nothing_to_do() {
        assert_eq!(plan(&[]), DedupPlan::default());
    }
}
