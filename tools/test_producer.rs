//! Test Transfer Producer
//!
//! Generates transfer requests and publishes them to NATS for load and
//! end-to-end testing of the risk engine.
//!
//! Usage: test_producer [nats_url] [subject] [count] [suspicious_rate] [delay_ms] [request]
//!
//! With the trailing `request` argument every transfer is sent as a NATS
//! request and the engine's reply is logged.

use rand::Rng;
use std::time::Duration;
use tracing::{info, warn};
use transfer_risk_engine::types::{RawNumber, TransferReply, TransferRequest};

/// Transaction type codes used by the training data
const TYPE_PAYMENT: f64 = 0.0;
const TYPE_TRANSFER: f64 = 1.0;
const TYPE_CASH_OUT: f64 = 2.0;

struct TransferGenerator {
    rng: rand::rngs::ThreadRng,
    counter: u64,
}

impl TransferGenerator {
    fn new() -> Self {
        Self {
            rng: rand::thread_rng(),
            counter: 0,
        }
    }

    fn next_id(&mut self) -> String {
        self.counter += 1;
        format!("tx_{:012}", self.counter)
    }

    fn generate_ordinary(&mut self) -> TransferRequest {
        let id = self.next_id();
        let kind = if self.rng.gen_bool(0.7) { TYPE_PAYMENT } else { TYPE_TRANSFER };
        TransferRequest::new(
            id,
            RawNumber::Text(self.rng.gen_range(1_000..90_000u32).to_string()),
            RawNumber::Text(self.rng.gen_range(1_000..90_000u32).to_string()),
            self.rng.gen_range(5.0..2_000.0),
            kind,
        )
    }

    /// Large cash-out style transfers between a small pool of accounts
    fn generate_suspicious(&mut self) -> TransferRequest {
        let id = self.next_id();
        let kind = if self.rng.gen_bool(0.5) { TYPE_TRANSFER } else { TYPE_CASH_OUT };
        let mut request = TransferRequest::new(
            id,
            RawNumber::Text(self.rng.gen_range(90_000..90_050u32).to_string()),
            RawNumber::Number(self.rng.gen_range(90_000..90_050u32) as f64),
            self.rng.gen_range(50_000.0..1_000_000.0),
            kind,
        );
        // leave a field out now and then; the engine must still decide
        if self.rng.gen_bool(0.1) {
            request.receiver_account = None;
        }
        request
    }

    fn generate(&mut self, suspicious_rate: f64) -> (TransferRequest, bool) {
        if self.rng.gen_bool(suspicious_rate) {
            (self.generate_suspicious(), true)
        } else {
            (self.generate_ordinary(), false)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("test_producer=info".parse()?),
        )
        .init();

    info!("Starting Test Transfer Producer");

    let args: Vec<String> = std::env::args().collect();
    let nats_url = args.get(1).map(|s| s.as_str()).unwrap_or("nats://localhost:4222");
    let subject = args.get(2).map(|s| s.as_str()).unwrap_or("transfers.requests");
    let count: u64 = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(100);
    let suspicious_rate: f64 = args
        .get(4)
        .and_then(|s| s.parse().ok())
        .unwrap_or(0.1f64)
        .clamp(0.0, 1.0);
    let delay_ms: u64 = args.get(5).and_then(|s| s.parse().ok()).unwrap_or(100);
    let request_mode = args.get(6).map(|s| s == "request").unwrap_or(false);

    info!(
        nats_url = %nats_url,
        subject = %subject,
        count = count,
        suspicious_rate = suspicious_rate,
        delay_ms = delay_ms,
        request_mode = request_mode,
        "Configuration loaded"
    );

    let client = match async_nats::connect(nats_url).await {
        Ok(c) => {
            info!("Connected to NATS");
            c
        }
        Err(e) => {
            warn!(error = %e, "Failed to connect to NATS. Running in dry-run mode.");
            return run_dry_mode(count, suspicious_rate, delay_ms).await;
        }
    };

    let mut generator = TransferGenerator::new();
    let mut ordinary_count = 0;
    let mut suspicious_count = 0;

    info!("Starting to publish {} transfers...", count);

    for i in 0..count {
        let (transfer, suspicious) = generator.generate(suspicious_rate);
        if suspicious {
            suspicious_count += 1;
        } else {
            ordinary_count += 1;
        }

        let payload = serde_json::to_vec(&transfer)?;

        if request_mode {
            let response = client.request(subject.to_string(), payload.into()).await?;
            match serde_json::from_slice::<TransferReply>(&response.payload) {
                Ok(TransferReply::Decided(decision)) => info!(
                    transaction_id = %decision.transaction_id,
                    disposition = %decision.disposition,
                    risk_score = decision.risk_score,
                    reasons = ?decision.explanation,
                    "Decision received"
                ),
                Ok(other) => info!(reply = ?other, "Transfer not decided"),
                Err(e) => warn!(error = %e, "Unreadable reply"),
            }
        } else {
            client.publish(subject.to_string(), payload.into()).await?;
        }

        if (i + 1) % 10 == 0 {
            info!(
                "Published {}/{} transfers ({} ordinary, {} suspicious)",
                i + 1,
                count,
                ordinary_count,
                suspicious_count
            );
        }

        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    client.flush().await?;

    info!(
        "Completed! Published {} transfers ({} ordinary, {} suspicious)",
        count, ordinary_count, suspicious_count
    );

    Ok(())
}

async fn run_dry_mode(count: u64, suspicious_rate: f64, delay_ms: u64) -> anyhow::Result<()> {
    info!("Running in dry-run mode (no NATS connection)");

    let mut generator = TransferGenerator::new();

    for i in 0..count {
        let (transfer, _) = generator.generate(suspicious_rate);
        let json = serde_json::to_string_pretty(&transfer)?;

        if (i + 1) % 10 == 0 || i == 0 {
            info!("Sample transfer {}:\n{}", i + 1, json);
        }

        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    Ok(())
}
