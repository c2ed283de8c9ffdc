use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/**
 * The ballot posted by the voting page, JSON-encoded inside the `data` form field
 */
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ballot {
    pub choice_id: i64,
    pub question_id: i64,
}

/**
 * Outer form wrapper for `Ballot`
 */
#[derive(Debug, Deserialize)]
pub struct BallotForm {
    pub data: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChoiceTally {
    pub title: String,
    pub votes: i64,
}

/**
 * Current counters of one question and all of its choices, keyed by choice id
 */
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VoteSnapshot {
    pub question_total_votes: i64,
    pub choices_data: BTreeMap<i64, ChoiceTally>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ballot_uses_camel_case() {
        let ballot: Ballot = serde_json::from_str(r#"{"choiceId": 4, "questionId": 2}"#).unwrap();
        assert_eq!(ballot.choice_id, 4);
        assert_eq!(ballot.question_id, 2);
    }

    #[test]
    fn snapshot_keys_are_choice_ids() {
        let mut choices_data = BTreeMap::new();
        choices_data.insert(
            7,
            ChoiceTally {
                title: "Yes".into(),
                votes: 3,
            },
        );
        let snapshot = VoteSnapshot {
            question_total_votes: 3,
            choices_data,
        };
        assert_eq!(
            serde_json::to_value(&snapshot).unwrap(),
            serde_json::json!({
                "question_total_votes": 3,
                "choices_data": { "7": { "title": "Yes", "votes": 3 } }
            })
        );
    }
}
