//! quizflow - live quiz answer ingestion over MQTT
//!
//! Devices publish their answers on a single topic; the consumer records
//! the first answer each device gives to each question and keeps a live
//! per-device correctness tally for the event leaderboard.
//!
//! # Architecture
//!
//! ```text
//! MQTT broker
//!     |
//! Connection Manager (reconnect + backoff, drains handlers on teardown)
//!     |
//! Dispatcher (topic filter -> decode -> bounded task fan-out)
//!     |
//! SQLite AnswerStore (first write wins via composite primary key)
//!     | committed answers only
//! Statistics Aggregator (mutex-guarded, per-device tallies)
//!     |
//! Leaderboard Builder / JSON export
//! ```

pub mod answer;
pub mod config;
pub mod consumer;
pub mod leaderboard;
pub mod questions;
pub mod stats;
pub mod store;
