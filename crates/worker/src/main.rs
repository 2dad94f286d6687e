//! tagpurge worker entry point.
//!
//! Runs the capture, purge-by-tag and purge-by-URL consumers on in-process
//! queues and feeds them from newline-delimited JSON on stdin.
//! Logging goes to stderr.

use std::sync::Arc;

use anyhow::Result;
use tagpurge_client::{ProviderClient, ProviderConfig};
use tagpurge_core::{AppConfig, QueueName, TagIndex};
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

mod error;
mod ingress;
mod stages;
mod transport;

use stages::{CaptureStage, PurgeTagStage, PurgeUrlStage};
use transport::{DeadLetter, LocalQueue, QUEUE_CAPACITY, QueueSettings};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    config.require_api_token()?;
    tracing::info!(db_path = %config.db_path.display(), "starting tagpurge worker");

    let index = TagIndex::open(&config.db_path).await?;
    let provider = Arc::new(ProviderClient::new(ProviderConfig::from_app_config(&config)?)?);

    let settings = QueueSettings::from(&config);
    let backoff = config.backoff();

    let capture = LocalQueue::new(QueueName::Capture, QUEUE_CAPACITY);
    let purge_tag = LocalQueue::new(QueueName::PurgeTag, QUEUE_CAPACITY);
    let purge_url = LocalQueue::new(QueueName::PurgeUrl, QUEUE_CAPACITY);
    let router = ingress::Router::new(capture.sender(), purge_tag.sender(), purge_url.sender());

    let (dead_tx, mut dead_rx) = mpsc::unbounded_channel::<DeadLetter>();
    tokio::spawn(async move {
        let mut total = 0usize;
        while let Some(letter) = dead_rx.recv().await {
            total += 1;
            tracing::warn!(
                queue = %letter.queue,
                message_id = %letter.delivery.id,
                total,
                "dead letter recorded: {}",
                letter.reason
            );
        }
    });

    let url_producer = Arc::new(purge_url.sender());
    let consumers = [
        capture.consume(Arc::new(CaptureStage::new(index.clone(), backoff)), settings, dead_tx.clone()),
        purge_tag.consume(
            Arc::new(PurgeTagStage::new(index, url_producer, backoff, config.send_batch_size)),
            settings,
            dead_tx.clone(),
        ),
        purge_url.consume(
            Arc::new(PurgeUrlStage::new(provider, backoff, config.max_urls_per_purge)),
            settings,
            dead_tx,
        ),
    ];

    let stdin = BufReader::new(tokio::io::stdin());
    tokio::select! {
        result = router.run(stdin) => {
            // Queued and delayed messages live only in memory; keep the
            // consumers running after input stops.
            match result {
                Ok(stats) => tracing::info!(
                    accepted = stats.accepted,
                    skipped = stats.skipped,
                    "input closed, waiting for Ctrl-C"
                ),
                Err(e) => tracing::error!("ingress stopped, waiting for Ctrl-C: {e}"),
            }
            tokio::signal::ctrl_c().await?;
        }
        signal = tokio::signal::ctrl_c() => signal?,
    }

    tracing::info!("shutting down");
    for consumer in consumers {
        consumer.abort();
    }

    Ok(())
}
