//! End-to-end ingestion tests: dispatcher -> store -> aggregator ->
//! leaderboard, over a real on-disk SQLite database.

use quizflow::answer::Answer;
use quizflow::consumer::{dispatch, InboundMessage, IngestContext};
use quizflow::leaderboard;
use quizflow::questions::QuestionBank;
use quizflow::stats::{rehydrate, Aggregator};
use quizflow::store::{AnswerStore, InsertOutcome, SqliteAnswerStore};
use std::sync::Arc;
use tempfile::tempdir;
use tokio::task::JoinSet;

const BANK_YAML: &str = r#"
- id: warmup
  content: What does the borrow checker check?
  answers:
    choices:
      0: "Lifetimes and aliasing"
      1: "Code style"
      2: "Compile times"
      3: "Dependency versions"
    correct: [0, "Lifetimes and aliasing"]
- id: final|boss
  content: Which separator may appear inside a question id?
  answers:
    choices:
      0: "None"
      1: "The field separator"
      2: "Only whitespace"
      3: "Only colons"
    correct: [1, "The field separator"]
"#;

fn bank() -> Arc<QuestionBank> {
    Arc::new(QuestionBank::from_yaml(BANK_YAML).unwrap())
}

fn context(store: Arc<dyn AnswerStore>) -> Arc<IngestContext> {
    let aggregator = Arc::new(Aggregator::new(bank()));
    Arc::new(IngestContext::new(
        store,
        aggregator,
        "answer".to_string(),
        '|',
        8,
    ))
}

fn message(payload: &str) -> InboundMessage {
    InboundMessage {
        topic: "answer".to_string(),
        payload: payload.as_bytes().to_vec(),
    }
}

async fn drain(tasks: &mut JoinSet<()>) {
    while let Some(result) = tasks.join_next().await {
        result.unwrap();
    }
}

#[tokio::test]
async fn test_full_ingestion_flow() {
    let dir = tempdir().unwrap();
    let store: Arc<dyn AnswerStore> =
        Arc::new(SqliteAnswerStore::open(dir.path().join("event.db")).unwrap());
    let ctx = context(store.clone());
    let mut tasks = JoinSet::new();

    dispatch(message("00-B0-D0-63-C2-26|warmup|0"), &ctx, &mut tasks).await;
    drain(&mut tasks).await;

    let payloads = [
        "FF-DE-AD-BE-EF-FF|warmup|2",        // wrong
        "FF-DE-AD-BE-EF-FF|final|boss|1",    // embedded separator, correct
        "00-B0-D0-63-C2-26|warmup|1",        // duplicate pair, rejected
        "garbage",                           // undecodable, dropped
        "00-B0-D0-63-C2-26|unlisted|3",      // unknown question, stored only
    ];
    for payload in payloads {
        dispatch(message(payload), &ctx, &mut tasks).await;
    }
    drain(&mut tasks).await;

    // Durable rows: all decodable first-writes, including the unknown question
    let stored = store.scan_all().await.unwrap();
    assert_eq!(stored.len(), 4);

    let snapshot = ctx.aggregator.snapshot();
    assert_eq!(snapshot.len(), 2);

    let first = snapshot.get("00:b0:d0:63:c2:26").unwrap();
    assert_eq!(first.total_answers(), 1);
    assert_eq!(first.total_correct_answers(), 1);
    assert_eq!(first.answers()["warmup"].choice.index(), 0);

    let second = snapshot.get("ff:de:ad:be:ef:ff").unwrap();
    assert_eq!(second.total_answers(), 2);
    assert_eq!(second.total_correct_answers(), 1);
    assert!(second.answers().contains_key("final|boss"));
}

#[tokio::test]
async fn test_rehydration_reflects_durable_history() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("event.db");
    let store: Arc<dyn AnswerStore> = Arc::new(SqliteAnswerStore::open(&db_path).unwrap());
    let ctx = context(store.clone());
    let mut tasks = JoinSet::new();

    for payload in [
        "00-B0-D0-63-C2-26|warmup|0",
        "FF-DE-AD-BE-EF-FF|warmup|0",
        "FF-DE-AD-BE-EF-FF|final|boss|1",
    ] {
        dispatch(message(payload), &ctx, &mut tasks).await;
        // Serialize handlers so the live first-observed order matches rowids
        drain(&mut tasks).await;
    }

    // A cold-start query over the same database sees the live aggregate
    let reopened = SqliteAnswerStore::open(&db_path).unwrap();
    let replayed = rehydrate(reopened.scan_all().await.unwrap(), bank());
    assert_eq!(replayed, ctx.aggregator.snapshot());

    // And replaying twice changes nothing
    let again = rehydrate(reopened.scan_all().await.unwrap(), bank());
    assert_eq!(replayed, again);
}

#[tokio::test]
async fn test_leaderboard_from_rehydrated_state() {
    let store = SqliteAnswerStore::open_in_memory().unwrap();

    // Three devices: two correct answers, zero, one - inserted out of rank order
    let submissions = [
        ("AA-00-00-00-00-01", "warmup", 0),
        ("AA-00-00-00-00-01", "final|boss", 1),
        ("AA-00-00-00-00-02", "warmup", 3),
        ("AA-00-00-00-00-03", "warmup", 0),
        ("AA-00-00-00-00-03", "final|boss", 2),
    ];
    for (device, question, choice) in submissions {
        let answer = Answer::new(device, question, choice).unwrap();
        assert_eq!(
            store.insert(&answer).await.unwrap(),
            InsertOutcome::Committed
        );
    }

    let statistics = rehydrate(store.scan_all().await.unwrap(), bank());
    let ranking = leaderboard::build(&statistics);

    let ranked: Vec<(&str, usize)> = ranking
        .iter()
        .map(|item| {
            (
                item.device_id.as_str(),
                item.stats.total_correct_answers(),
            )
        })
        .collect();
    assert_eq!(
        ranked,
        vec![
            ("aa:00:00:00:00:02", 0),
            ("aa:00:00:00:00:03", 1),
            ("aa:00:00:00:00:01", 2),
        ]
    );
}

#[tokio::test]
async fn test_concurrent_duplicate_submissions() {
    let store = Arc::new(SqliteAnswerStore::open_in_memory().unwrap());
    let answer = Answer::new("AA-BB-CC-DD-EE-FF", "warmup", 0).unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = store.clone();
        let answer = answer.clone();
        handles.push(tokio::spawn(
            async move { store.insert(&answer).await.unwrap() },
        ));
    }

    let mut committed = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await.unwrap() {
            InsertOutcome::Committed => committed += 1,
            InsertOutcome::DuplicateRejected => rejected += 1,
        }
    }
    assert_eq!(committed, 1);
    assert_eq!(rejected, 7);
}
