use quizflow::config::RuntimeConfig;
use quizflow::consumer::{run_with_reconnect, ExponentialBackoff, IngestContext};
use std::time::Duration;
use quizflow::leaderboard;
use quizflow::questions::QuestionBank;
use quizflow::stats::{rehydrate, Aggregator};
use quizflow::store::{AnswerStore, SqliteAnswerStore};
use std::sync::Arc;
use tokio::sync::watch;

#[tokio::main]
async fn main() {
    let env_file =
        std::env::var("SUBSCRIBER_ENV_FILE").unwrap_or_else(|_| ".env".to_string());
    dotenv::from_filename(&env_file).ok();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let command = std::env::args().nth(1).unwrap_or_else(|| "consume".to_string());
    let result = match command.as_str() {
        "consume" => consume().await,
        "prune" => prune().await,
        "leaderboard" => leaderboard_export().await,
        other => {
            eprintln!(
                "Unknown command {:?} (expected consume, prune or leaderboard)",
                other
            );
            std::process::exit(2);
        }
    };

    if let Err(e) = result {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

/// Run the ingestion loop until a shutdown signal arrives.
async fn consume() -> Result<(), Box<dyn std::error::Error>> {
    let config = RuntimeConfig::from_env()?;

    log::info!("🚀 Starting quizflow consumer");
    log::info!("   Broker: {}:{}", config.mqtt.hostname, config.mqtt.port);
    log::info!("   Topic: {:?}", config.answer_topic);
    log::info!("   Database: {}", config.db_path);
    log::info!("   Question bank: {}", config.questions_path);
    log::info!("   Max in-flight handlers: {}", config.max_inflight);

    let bank = Arc::new(QuestionBank::from_file(&config.questions_path)?);
    log::info!("📚 Loaded {} question(s)", bank.len());

    let store: Arc<dyn AnswerStore> = Arc::new(SqliteAnswerStore::open(&config.db_path)?);
    let aggregator = Arc::new(Aggregator::new(bank));
    let ctx = Arc::new(IngestContext::new(
        store,
        aggregator,
        config.answer_topic.clone(),
        config.separator,
        config.max_inflight,
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(true);
        }
    });

    let backoff = ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(60));
    run_with_reconnect(&config, ctx, shutdown_rx, backoff).await?;
    Ok(())
}

/// Delete every stored answer (reset between events).
async fn prune() -> Result<(), Box<dyn std::error::Error>> {
    let config = RuntimeConfig::from_env()?;
    let store = SqliteAnswerStore::open(&config.db_path)?;
    let removed = store.delete_all().await?;
    log::info!("🧹 Pruned {} stored answer(s)", removed);
    Ok(())
}

/// Rehydrate statistics from the durable store and print the export JSON.
async fn leaderboard_export() -> Result<(), Box<dyn std::error::Error>> {
    let config = RuntimeConfig::from_env()?;
    let bank = Arc::new(QuestionBank::from_file(&config.questions_path)?);
    let store = SqliteAnswerStore::open(&config.db_path)?;

    let statistics = rehydrate(store.scan_all().await?, bank);
    let ranking = leaderboard::build(&statistics);

    let export = serde_json::json!({
        "totals": statistics,
        "leaderboard": ranking,
    });
    println!("{}", serde_json::to_string_pretty(&export)?);
    Ok(())
}
