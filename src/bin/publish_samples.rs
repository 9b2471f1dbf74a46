//! Bulk-publish sample answer payloads to the broker.
//!
//! Used for event rehearsal and manual testing:
//!
//! ```text
//! publish_samples <samples-file> <topic>
//! ```
//!
//! The samples file holds one payload per line; blank lines and `#` comments
//! are skipped.

use quizflow::config::RuntimeConfig;
use quizflow::consumer::broker::build_mqtt;
use rumqttc::{Event, Packet, QoS};
use std::path::Path;

fn read_sample_payloads(path: &Path) -> Result<Vec<String>, std::io::Error> {
    let contents = std::fs::read_to_string(path)?;
    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

#[tokio::main]
async fn main() {
    let env_file =
        std::env::var("SUBSCRIBER_ENV_FILE").unwrap_or_else(|_| ".env".to_string());
    dotenv::from_filename(&env_file).ok();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let mut args = std::env::args().skip(1);
    let (samples_file, topic) = match (args.next(), args.next()) {
        (Some(samples_file), Some(topic)) => (samples_file, topic),
        _ => {
            eprintln!("Usage: publish_samples <samples-file> <topic>");
            std::process::exit(2);
        }
    };

    if let Err(e) = publish(Path::new(&samples_file), &topic).await {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

async fn publish(samples_file: &Path, topic: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = RuntimeConfig::from_env()?;
    let payloads = read_sample_payloads(samples_file)?;
    log::info!("Read {} sample payload(s) to publish", payloads.len());
    if payloads.is_empty() {
        return Ok(());
    }

    let client_id = format!("quizflow-publisher-{}", std::process::id());
    let (client, mut eventloop) = build_mqtt(&config, &client_id);

    let total = payloads.len();
    let publisher = client.clone();
    let publish_topic = topic.to_string();
    tokio::spawn(async move {
        for payload in payloads {
            if let Err(e) = publisher
                .publish(&publish_topic, QoS::AtLeastOnce, false, payload.clone())
                .await
            {
                log::error!("Failed to queue {:?}: {}", payload, e);
                return;
            }
            log::info!("Published {:?} to {:?}", payload, publish_topic);
        }
    });

    // Drive the event loop until the broker has acknowledged every payload
    let mut acked = 0;
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::PubAck(_))) => {
                acked += 1;
                if acked == total {
                    let _ = client.disconnect().await;
                }
            }
            Ok(_) => {}
            Err(e) => {
                if acked == total {
                    break;
                }
                return Err(Box::new(e));
            }
        }
    }

    log::info!("✅ All {} payload(s) acknowledged", total);
    Ok(())
}
