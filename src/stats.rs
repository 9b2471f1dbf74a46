//! In-memory statistics aggregation.
//!
//! The aggregator owns a process-wide map of per-device tallies, keyed in
//! first-observed order. Handler tasks run concurrently, so every live update
//! happens under one mutex whose critical section covers the whole
//! bank-lookup -> fetch-or-create -> existence-check -> insert sequence; two
//! answers from the same device can otherwise race on map creation and corrupt
//! the tally.
//!
//! The same per-answer step also powers [`rehydrate`], which replays the
//! durable store before concurrent ingestion begins.

use crate::answer::Answer;
use crate::questions::{Question, QuestionBank};
use indexmap::IndexMap;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub type DeviceId = String;

/// Aggregate over the answers one device has given.
///
/// Tracks only answers observed by this aggregator; it may lag the durable
/// store until rehydrated. Serializes as the derived totals.
#[derive(Debug, Clone)]
pub struct DeviceStatistics {
    bank: Arc<QuestionBank>,
    answers: HashMap<String, Answer>,
}

impl DeviceStatistics {
    fn new(bank: Arc<QuestionBank>) -> Self {
        Self {
            bank,
            answers: HashMap::new(),
        }
    }

    pub fn answers(&self) -> &HashMap<String, Answer> {
        &self.answers
    }

    pub fn total_answers(&self) -> usize {
        self.answers.len()
    }

    /// Count of answers matching the bank's correct choice. Entries whose
    /// question id is unknown to the bank are ignored.
    pub fn total_correct_answers(&self) -> usize {
        self.answers
            .values()
            .filter(|answer| {
                self.bank
                    .get(&answer.question_id)
                    .is_some_and(|question| question.correct_choice() == answer.choice)
            })
            .count()
    }
}

impl PartialEq for DeviceStatistics {
    fn eq(&self, other: &Self) -> bool {
        self.answers == other.answers
    }
}

impl Serialize for DeviceStatistics {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("total_answers", &self.total_answers())?;
        map.serialize_entry("total_correct_answers", &self.total_correct_answers())?;
        map.end()
    }
}

/// Process-wide device tallies in first-observed order.
#[derive(Debug, Clone, Default)]
pub struct Statistics {
    devices: IndexMap<DeviceId, DeviceStatistics>,
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn devices(&self) -> &IndexMap<DeviceId, DeviceStatistics> {
        &self.devices
    }

    pub fn get(&self, device_id: &str) -> Option<&DeviceStatistics> {
        self.devices.get(device_id)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

impl PartialEq for Statistics {
    /// Order-sensitive: two snapshots are equal only if they also agree on
    /// the first-observed ordering of devices.
    fn eq(&self, other: &Self) -> bool {
        self.devices.len() == other.devices.len()
            && self.devices.iter().eq(other.devices.iter())
    }
}

impl Serialize for Statistics {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.devices.serialize(serializer)
    }
}

/// Per-answer aggregation step shared by live ingestion and replay.
///
/// Returns the affected question together with the recorded answer, or `None`
/// when the answer was skipped (unknown question, or the device already has an
/// answer for it - the existing one is kept).
fn apply_answer(
    devices: &mut IndexMap<DeviceId, DeviceStatistics>,
    bank: &Arc<QuestionBank>,
    answer: Answer,
) -> Option<(Question, Answer)> {
    let question = match bank.get(&answer.question_id) {
        Some(question) => question.clone(),
        None => {
            log::warn!(
                "Skipping {}: question {:?} is outside the active question bank",
                answer,
                answer.question_id
            );
            return None;
        }
    };

    let stats = devices
        .entry(answer.device_id.clone())
        .or_insert_with(|| DeviceStatistics::new(bank.clone()));

    if stats.answers.contains_key(&answer.question_id) {
        // Should not happen once the store's uniqueness constraint has run,
        // but this path must not assume every caller went through it
        log::info!("Keeping existing answer of {}, ignoring {}", answer.device_id, answer);
        return None;
    }

    stats.answers.insert(answer.question_id.clone(), answer.clone());
    Some((question, answer))
}

/// Mutex-guarded live aggregator shared by all handler tasks.
pub struct Aggregator {
    bank: Arc<QuestionBank>,
    devices: Mutex<IndexMap<DeviceId, DeviceStatistics>>,
}

impl Aggregator {
    pub fn new(bank: Arc<QuestionBank>) -> Self {
        Self {
            bank,
            devices: Mutex::new(IndexMap::new()),
        }
    }

    /// Record an answer the store just committed.
    ///
    /// Must only be called after [`crate::store::AnswerStore::insert`] returned
    /// `Committed`; duplicates rejected by the store are never reflected here,
    /// which keeps the aggregate and the store consistent by construction.
    pub fn record_committed(&self, answer: Answer) -> Option<(Question, Answer)> {
        let mut devices = self.devices.lock().unwrap();
        apply_answer(&mut devices, &self.bank, answer)
    }

    pub fn bank(&self) -> &Arc<QuestionBank> {
        &self.bank
    }

    /// Clone of the current statistics for leaderboard/export use.
    pub fn snapshot(&self) -> Statistics {
        Statistics {
            devices: self.devices.lock().unwrap().clone(),
        }
    }
}

/// Build fresh statistics by replaying durable answers through the same
/// per-answer step the live path uses. Runs before concurrent ingestion, so no
/// lock is involved.
pub fn rehydrate(answers: Vec<Answer>, bank: Arc<QuestionBank>) -> Statistics {
    let mut devices = IndexMap::new();
    for answer in answers {
        apply_answer(&mut devices, &bank, answer);
    }
    Statistics { devices }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::answer::Choice;
    use crate::questions::QuestionBank;

    fn test_bank() -> Arc<QuestionBank> {
        let yaml = r#"
- id: q1
  content: First?
  answers:
    choices: {0: "A", 1: "B", 2: "C", 3: "D"}
    correct: [1, "B"]
- id: q2
  content: Second?
  answers:
    choices: {0: "A", 1: "B", 2: "C", 3: "D"}
    correct: [3, "D"]
"#;
        Arc::new(QuestionBank::from_yaml(yaml).unwrap())
    }

    fn answer(device: &str, question: &str, choice: u8) -> Answer {
        Answer::new(device, question, choice).unwrap()
    }

    #[test]
    fn test_totals_track_correctness() {
        let aggregator = Aggregator::new(test_bank());
        aggregator.record_committed(answer("00-00-00-00-00-01", "q1", 1));
        aggregator.record_committed(answer("00-00-00-00-00-01", "q2", 0));

        let snapshot = aggregator.snapshot();
        let stats = snapshot.get("00:00:00:00:00:01").unwrap();
        assert_eq!(stats.total_answers(), 2);
        assert_eq!(stats.total_correct_answers(), 1);
    }

    #[test]
    fn test_unknown_question_is_skipped() {
        let aggregator = Aggregator::new(test_bank());
        assert!(aggregator
            .record_committed(answer("00-00-00-00-00-01", "ghost", 1))
            .is_none());
        assert!(aggregator.snapshot().is_empty());
    }

    #[test]
    fn test_existing_answer_is_kept() {
        let aggregator = Aggregator::new(test_bank());
        assert!(aggregator
            .record_committed(answer("00-00-00-00-00-01", "q1", 1))
            .is_some());
        // Defense in depth: a second record for the same question is ignored
        assert!(aggregator
            .record_committed(answer("00-00-00-00-00-01", "q1", 2))
            .is_none());

        let snapshot = aggregator.snapshot();
        let stats = snapshot.get("00:00:00:00:00:01").unwrap();
        assert_eq!(stats.total_answers(), 1);
        assert_eq!(stats.answers()["q1"].choice, Choice::new(1).unwrap());
    }

    #[test]
    fn test_record_returns_question_and_answer() {
        let aggregator = Aggregator::new(test_bank());
        let (question, recorded) = aggregator
            .record_committed(answer("00-00-00-00-00-01", "q2", 3))
            .unwrap();
        assert_eq!(question.id, "q2");
        assert_eq!(recorded.question_id, "q2");
    }

    #[test]
    fn test_devices_kept_in_first_observed_order() {
        let aggregator = Aggregator::new(test_bank());
        aggregator.record_committed(answer("00-00-00-00-00-03", "q1", 0));
        aggregator.record_committed(answer("00-00-00-00-00-01", "q1", 0));
        aggregator.record_committed(answer("00-00-00-00-00-02", "q1", 0));

        let snapshot = aggregator.snapshot();
        let order: Vec<&str> = snapshot.devices().keys().map(String::as_str).collect();
        assert_eq!(
            order,
            vec!["00:00:00:00:00:03", "00:00:00:00:00:01", "00:00:00:00:00:02"]
        );
    }

    #[test]
    fn test_rehydrate_matches_live_aggregation() {
        let bank = test_bank();
        let answers = vec![
            answer("00-00-00-00-00-01", "q1", 1),
            answer("00-00-00-00-00-02", "q1", 0),
            answer("00-00-00-00-00-01", "q2", 3),
        ];

        let aggregator = Aggregator::new(bank.clone());
        for entry in answers.clone() {
            aggregator.record_committed(entry);
        }

        assert_eq!(rehydrate(answers, bank), aggregator.snapshot());
    }

    #[test]
    fn test_rehydrate_is_idempotent() {
        let bank = test_bank();
        let answers = vec![
            answer("00-00-00-00-00-02", "q2", 3),
            answer("00-00-00-00-00-01", "q1", 1),
            answer("00-00-00-00-00-01", "q2", 0),
        ];

        let first = rehydrate(answers.clone(), bank.clone());
        let second = rehydrate(answers, bank);
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn test_export_shape() {
        let aggregator = Aggregator::new(test_bank());
        aggregator.record_committed(answer("00-00-00-00-00-01", "q1", 1));

        let exported = serde_json::to_value(aggregator.snapshot()).unwrap();
        assert_eq!(
            exported["00:00:00:00:00:01"],
            serde_json::json!({"total_answers": 1, "total_correct_answers": 1})
        );
    }
}
