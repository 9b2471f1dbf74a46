//! Per-message dispatch.
//!
//! Each inbound broker message is filtered by topic, decoded, and handed to an
//! independently scheduled persist+aggregate task so the receive loop never
//! waits on store or lock latency. Fan-out is bounded by a semaphore: once
//! `max_inflight` handlers are running, dispatch suspends until a permit frees
//! up, which pauses intake instead of dropping answers.

use crate::answer::Answer;
use crate::stats::Aggregator;
use crate::store::{AnswerStore, InsertOutcome};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// One message as received from the broker, detached from the transport.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Shared handles every handler task needs.
pub struct IngestContext {
    pub store: Arc<dyn AnswerStore>,
    pub aggregator: Arc<Aggregator>,
    pub answer_topic: String,
    pub separator: char,
    limits: Arc<Semaphore>,
}

impl IngestContext {
    pub fn new(
        store: Arc<dyn AnswerStore>,
        aggregator: Arc<Aggregator>,
        answer_topic: String,
        separator: char,
        max_inflight: usize,
    ) -> Self {
        Self {
            store,
            aggregator,
            answer_topic,
            separator,
            limits: Arc::new(Semaphore::new(max_inflight)),
        }
    }
}

/// Filter, decode and schedule one message.
///
/// Non-matching topics and undecodable payloads are dropped with a log line;
/// they are diagnostics, not errors, and are never retried. A decoded answer
/// is spawned into `tasks` and this function returns without awaiting it.
pub async fn dispatch(
    message: InboundMessage,
    ctx: &Arc<IngestContext>,
    tasks: &mut JoinSet<()>,
) {
    if message.topic != ctx.answer_topic {
        log::debug!(
            "Skipping payload from irrelevant topic {:?} (only watching {:?})",
            message.topic,
            ctx.answer_topic
        );
        return;
    }

    let payload = match std::str::from_utf8(&message.payload) {
        Ok(payload) => payload,
        Err(_) => {
            log::warn!("Ignoring non-UTF-8 payload on {:?}", message.topic);
            return;
        }
    };

    let answer = match Answer::from_message(payload, ctx.separator) {
        Ok(answer) => answer,
        Err(e) => {
            log::warn!("Ignoring incorrect payload {:?}: {}", payload, e);
            return;
        }
    };

    let permit = match ctx.limits.clone().acquire_owned().await {
        Ok(permit) => permit,
        // The semaphore is never closed while a session is live
        Err(_) => return,
    };

    log::debug!("Dispatched {}", answer);
    let ctx = ctx.clone();
    tasks.spawn(async move {
        handle_answer(answer, &ctx).await;
        drop(permit);
    });
}

/// Persist one answer, then fold it into the live aggregate.
///
/// The aggregate is only touched when the store reports `Committed`, so a
/// duplicate or failed write can never show up in the tallies.
pub async fn handle_answer(answer: Answer, ctx: &IngestContext) {
    match ctx.store.insert(&answer).await {
        Ok(InsertOutcome::Committed) => {
            log::debug!("Saved {}", answer);
            if let Some((question, recorded)) = ctx.aggregator.record_committed(answer) {
                log::debug!(
                    "Recorded answer of {} for question {:?}",
                    recorded.device_id,
                    question.id
                );
            }
        }
        Ok(InsertOutcome::DuplicateRejected) => {
            log::info!("Skipped {} (already answered)", answer);
        }
        Err(e) => {
            log::error!("Ignoring storage failure while persisting {}: {}", answer, e);
        }
    }
}
