use std::sync::Arc;

use async_trait::async_trait;
use hyperdrive_agents_metrics::MetricsCollector;
use hyperdrive_agents_store::ChainIngestor;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::error::{InteractiveError, Result};

/// How a pool keeps its database in step with the chain
#[async_trait]
pub trait DataSync: Send + Sync {
    fn name(&self) -> &'static str;

    /// Ingest up to `block` (latest when `None`)
    async fn sync(&self, block: Option<u64>) -> Result<()>;

    /// Wait until every requested sync has landed in the store
    async fn flush(&self) -> Result<()>;
}

/// Ingests inline; `sync` returns once the rows are stored
pub struct BlockingSync {
    ingestor: Arc<ChainIngestor>,
    metrics: MetricsCollector,
}

impl BlockingSync {
    pub fn new(ingestor: Arc<ChainIngestor>) -> Self {
        Self {
            ingestor,
            metrics: MetricsCollector::new(),
        }
    }

    pub fn with_metrics(mut self, metrics: MetricsCollector) -> Self {
        self.metrics = metrics;
        self
    }
}

#[async_trait]
impl DataSync for BlockingSync {
    fn name(&self) -> &'static str {
        "blocking"
    }

    async fn sync(&self, block: Option<u64>) -> Result<()> {
        let stats = self.ingestor.ingest_to(block).await?;
        self.metrics.record_events_ingested(stats.events);
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        self.ingestor.store().flush().await?;
        Ok(())
    }
}

enum SyncCommand {
    Ingest(Option<u64>),
    Flush(oneshot::Sender<Option<String>>),
}

/// Hands block targets to a tokio task. Ingestion errors are held until
/// the next `flush`.
pub struct BackgroundSync {
    tx: mpsc::UnboundedSender<SyncCommand>,
}

impl BackgroundSync {
    /// Spawns the ingestion task; must be called inside a tokio runtime
    pub fn spawn(ingestor: Arc<ChainIngestor>, metrics: MetricsCollector) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let mut last_error: Option<String> = None;
            while let Some(command) = rx.recv().await {
                match command {
                    SyncCommand::Ingest(target) => match ingestor.ingest_to(target).await {
                        Ok(stats) => metrics.record_events_ingested(stats.events),
                        Err(e) => {
                            warn!(error = %e, "background ingestion failed");
                            last_error = Some(e.to_string());
                        }
                    },
                    SyncCommand::Flush(reply) => {
                        let flushed = ingestor.store().flush().await.err().map(|e| e.to_string());
                        let _ = reply.send(last_error.take().or(flushed));
                    }
                }
            }
            debug!("background sync stopped");
        });

        Self { tx }
    }

    fn stopped() -> InteractiveError {
        InteractiveError::DataSync("background sync task stopped".to_string())
    }
}

#[async_trait]
impl DataSync for BackgroundSync {
    fn name(&self) -> &'static str {
        "background"
    }

    async fn sync(&self, block: Option<u64>) -> Result<()> {
        self.tx.send(SyncCommand::Ingest(block)).map_err(|_| Self::stopped())
    }

    async fn flush(&self) -> Result<()> {
        let (reply, done) = oneshot::channel();
        self.tx.send(SyncCommand::Flush(reply)).map_err(|_| Self::stopped())?;
        match done.await.map_err(|_| Self::stopped())? {
            Some(message) => Err(InteractiveError::DataSync(message)),
            None => Ok(()),
        }
    }
}
