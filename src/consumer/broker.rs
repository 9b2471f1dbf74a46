//! Broker connection management.
//!
//! Owns the MQTT session: subscribe on connect, hand every publish to the
//! dispatcher, and on any transport failure drain the session's in-flight
//! handler tasks before reconnecting with backoff. The loop only exits on the
//! process shutdown signal, which also drains before returning.

use crate::config::RuntimeConfig;
use crate::consumer::backoff::{ExponentialBackoff, MaxRetriesExceeded};
use crate::consumer::dispatcher::{dispatch, InboundMessage, IngestContext};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS, Transport};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;

#[derive(Debug)]
pub enum ConsumeError {
    MaxRetries,
}

impl From<MaxRetriesExceeded> for ConsumeError {
    fn from(_: MaxRetriesExceeded) -> Self {
        ConsumeError::MaxRetries
    }
}

impl fmt::Display for ConsumeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsumeError::MaxRetries => write!(f, "Maximum reconnect attempts exceeded"),
        }
    }
}

impl std::error::Error for ConsumeError {}

/// How one subscribe session ended.
enum SessionEnd {
    /// Transport failure; the caller should back off and reconnect.
    Transport,
    /// Shutdown signal; the caller should return.
    Shutdown,
}

/// Build the MQTT client for the configured broker.
pub fn build_mqtt(config: &RuntimeConfig, client_id: &str) -> (AsyncClient, EventLoop) {
    let mut options = MqttOptions::new(client_id, &config.mqtt.hostname, config.mqtt.port);
    options.set_credentials(&config.mqtt.username, &config.mqtt.password);
    options.set_keep_alive(Duration::from_secs(30));
    if config.mqtt.use_tls {
        options.set_transport(Transport::tls_with_default_config());
    }
    AsyncClient::new(options, 64)
}

/// Subscribe and consume until the transport fails or shutdown is requested.
///
/// The returned future resolves only after every handler task dispatched in
/// this session has run to completion - no handler is abandoned mid-flight,
/// and the next reconnect attempt cannot begin until the drain finishes.
async fn run_session(
    config: &RuntimeConfig,
    ctx: &Arc<IngestContext>,
    backoff: &mut ExponentialBackoff,
    shutdown: &mut watch::Receiver<bool>,
) -> SessionEnd {
    let client_id = format!("quizflow-{}", std::process::id());
    let (client, mut eventloop) = build_mqtt(config, &client_id);

    if let Err(e) = client.subscribe(&config.answer_topic, QoS::AtLeastOnce).await {
        log::error!(
            "Failed to queue subscription to {:?}: {}",
            config.answer_topic,
            e
        );
        return SessionEnd::Transport;
    }

    let mut tasks: JoinSet<()> = JoinSet::new();
    let end = loop {
        tokio::select! {
            event = eventloop.poll() => match event {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    log::info!("✅ Connected, subscribed to {:?}", config.answer_topic);
                    backoff.reset();
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    let message = InboundMessage {
                        topic: publish.topic.clone(),
                        payload: publish.payload.to_vec(),
                    };
                    dispatch(message, ctx, &mut tasks).await;
                }
                Ok(_) => {}
                Err(e) => {
                    log::error!("❌ Lost connection to the broker: {}", e);
                    break SessionEnd::Transport;
                }
            },
            _ = shutdown.changed() => {
                log::info!("Shutdown requested, closing session");
                let _ = client.disconnect().await;
                break SessionEnd::Shutdown;
            }
        }
    };

    drain(&mut tasks).await;
    end
}

async fn drain(tasks: &mut JoinSet<()>) {
    let inflight = tasks.len();
    if inflight > 0 {
        log::info!("Draining {} in-flight handler task(s)", inflight);
    }
    while let Some(result) = tasks.join_next().await {
        if let Err(e) = result {
            log::error!("Handler task failed: {}", e);
        }
    }
}

/// Consume indefinitely, re-establishing the session on every transport
/// failure. Returns `Ok(())` on shutdown; only a retry cap configured on
/// `backoff` can produce an error.
pub async fn run_with_reconnect(
    config: &RuntimeConfig,
    ctx: Arc<IngestContext>,
    mut shutdown: watch::Receiver<bool>,
    mut backoff: ExponentialBackoff,
) -> Result<(), ConsumeError> {
    loop {
        match run_session(config, &ctx, &mut backoff, &mut shutdown).await {
            SessionEnd::Shutdown => {
                log::info!("✅ Consumer stopped");
                return Ok(());
            }
            SessionEnd::Transport => {
                if *shutdown.borrow() {
                    return Ok(());
                }
                backoff.sleep().await?;
            }
        }
    }
}
