//! Transfer Risk Engine - Main Entry Point
//!
//! Consumes transfer requests from NATS, scores them with the model triple,
//! answers with a disposition and publishes freeze instructions for blocked
//! senders.

use anyhow::Result;
use futures::StreamExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};
use transfer_risk_engine::{
    accounts::AccountGate,
    config::{AppConfig, LoggingConfig},
    consumer::{parse_request, TransferConsumer},
    engine::RiskEngine,
    metrics::{EngineMetrics, MetricsReporter},
    pipeline::TransferProcessor,
    producer::{FreezeProducer, ReplyProducer},
    types::decision::TransferReply,
};

fn init_logging(logging: &LoggingConfig) -> Result<()> {
    let filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => tracing_subscriber::EnvFilter::new("warn")
            .add_directive(format!("transfer_risk_engine={}", logging.level).parse()?),
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.pretty().init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    init_logging(&config.logging)?;

    info!("Starting Transfer Risk Engine");
    info!(
        block_threshold = config.policy.block_threshold,
        workers = config.pipeline.workers,
        "Configuration loaded successfully"
    );

    let metrics = Arc::new(EngineMetrics::new());

    let engine = Arc::new(RiskEngine::from_config(&config)?);
    if let Some(reason) = engine.degraded_reason() {
        warn!(
            reason = %reason,
            "Running in degraded mode, every transfer will require step-up verification"
        );
    } else {
        info!(
            model = %engine.label(),
            features = engine.extractor().feature_count(),
            step_up_threshold = engine.thresholds().step_up(),
            "Risk engine initialized"
        );
    }

    let processor = TransferProcessor::new(engine, Arc::new(AccountGate::new()), metrics.clone());

    let client = async_nats::connect(&config.nats.url).await?;
    info!("Connected to NATS at {}", config.nats.url);

    let consumer = TransferConsumer::new(client.clone(), &config.nats.transfer_subject);
    let replies = ReplyProducer::new(client.clone(), &config.nats.decision_subject);
    let freezes = FreezeProducer::new(client.clone(), &config.nats.freeze_subject);

    let num_workers = config.pipeline.workers;
    info!(
        "Starting transfer processing loop with {} parallel workers",
        num_workers
    );
    info!("Listening on subject: {}", consumer.subject());
    info!("Publishing decisions to: {}", replies.subject());
    info!("Publishing freeze instructions to: {}", freezes.subject());

    let semaphore = Arc::new(Semaphore::new(num_workers));
    let processed_count = Arc::new(AtomicU64::new(0));

    let reporter = MetricsReporter::new(metrics.clone(), config.pipeline.metrics_interval_secs);
    tokio::spawn(reporter.start());

    let mut subscription = consumer.subscribe().await?;

    while let Some(message) = subscription.next().await {
        let permit = semaphore.clone().acquire_owned().await?;

        let processor = processor.clone();
        let replies = replies.clone();
        let freezes = freezes.clone();
        let processed_count = processed_count.clone();

        tokio::spawn(async move {
            let request = match parse_request(&message.payload) {
                Ok(request) => request,
                Err(e) => {
                    processor.metrics().record_malformed();
                    warn!(error = %e, "Failed to deserialize transfer request");
                    drop(permit);
                    return;
                }
            };

            let outcome = processor.process(&request).await;

            if let Some(freeze) = &outcome.freeze {
                if let Err(e) = freezes.publish(freeze).await {
                    error!(
                        transaction_id = %freeze.transaction_id,
                        account_id = %freeze.account_id,
                        error = %e,
                        "Failed to publish freeze instruction"
                    );
                }
            }

            if let Err(e) = replies.publish(&outcome.reply, message.reply.clone()).await {
                error!(
                    transaction_id = %outcome.reply.transaction_id(),
                    error = %e,
                    "Failed to publish transfer reply"
                );
            }

            if matches!(outcome.reply, TransferReply::Decided(_)) {
                let count = processed_count.fetch_add(1, Ordering::Relaxed) + 1;
                if count % 100 == 0 {
                    let metrics = processor.metrics();
                    info!(
                        processed = count,
                        throughput = format!("{:.1} tx/s", metrics.get_throughput()),
                        avg_latency_us = metrics.get_latency_stats().mean_us,
                        "Processing milestone"
                    );
                }
            }

            drop(permit);
        });
    }

    info!("Risk engine shutting down...");
    metrics.print_summary();

    Ok(())
}
