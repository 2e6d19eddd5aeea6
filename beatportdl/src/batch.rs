//! Batch loop: turn a list of links into one barrier-synchronized run.

use std::collections::HashSet;
use std::sync::Arc;

use catalog::Link;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::delivery::ChatRequest;
use crate::governor::{ActiveKeySet, Batch};
use crate::pipeline::{BatchReport, Orchestrator, RunContext, Tally};

pub struct BatchRunner {
    orchestrator: Arc<Orchestrator>,
    /// Source URLs currently being processed, across batches.
    sources: ActiveKeySet,
}

impl BatchRunner {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            orchestrator,
            sources: ActiveKeySet::new(),
        }
    }

    /// Process `urls` and wait for every unit they spawn.
    ///
    /// A URL repeated in the batch, or still in flight from another batch,
    /// is dropped. With `chat_id` set, parse errors and the final report are
    /// sent to that chat.
    pub async fn run(&self, urls: Vec<String>, chat_id: Option<i64>) -> BatchReport {
        let batch = Batch::new();
        let tally = Arc::new(Tally::new());
        let mut seen = HashSet::new();

        for url in urls {
            let url = url.trim().to_string();
            if url.is_empty() || !seen.insert(url.clone()) {
                continue;
            }
            let Some(claim) = self.sources.claim(url.clone()) else {
                info!(url = %url, "Link is already being processed, dropping");
                continue;
            };

            let link = match Link::parse(&url) {
                Ok(link) => link,
                Err(e) => {
                    error!(url = %url, error = %e, "Failed to parse link");
                    tally.count_failure();
                    self.notify(chat_id, &format!("❌ Error parsing URL {url}: {e}"))
                        .await;
                    continue;
                }
            };

            let ctx = RunContext::new(batch.clone(), tally.clone(), chat_id, &url);
            let orchestrator = self.orchestrator.clone();
            batch.spawn(async move {
                let _claim = claim;
                orchestrator.handle_link(link, ctx).await;
            });
        }

        debug!(links = batch.in_flight(), "Waiting for batch");
        batch.wait().await;

        let report = tally.report();
        info!(%report, "Batch finished");
        if report.total() > 0 {
            self.notify(chat_id, &format!("Finished: {report}")).await;
        }
        report
    }

    /// Run one batch per chat request until the channel closes or `cancel` fires.
    ///
    /// A batch that has started is not interrupted.
    pub async fn serve(&self, mut requests: mpsc::Receiver<ChatRequest>, cancel: CancellationToken) {
        loop {
            let request = tokio::select! {
                _ = cancel.cancelled() => break,
                request = requests.recv() => match request {
                    Some(request) => request,
                    None => break,
                },
            };
            info!(chat_id = request.chat_id, url = %request.url, "Chat request");
            self.run(vec![request.url], Some(request.chat_id)).await;
        }
    }

    async fn notify(&self, chat_id: Option<i64>, text: &str) {
        let (Some(delivery), Some(chat_id)) = (self.orchestrator.delivery(), chat_id) else {
            return;
        };
        if let Err(e) = delivery.send_message(chat_id, text).await {
            warn!(chat_id, error = %e, "Failed to send chat message");
        }
    }
}
