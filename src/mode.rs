//! Live/simulated mode resolution and query routing.
//!
//! The [`ModeSelector`] probes the backends once, the first time a mode is
//! needed, and keeps the answer for the life of the selector. Concurrent
//! callers during that first probe wait for it and see the same [`Mode`].
//! Any probe failure or timeout resolves to [`Mode::Simulated`].

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::OnceCell;

use crate::error::Result;
use crate::generation::AvailabilityProbe;
use crate::orchestrator::QueryOrchestrator;
use crate::models::{Mode, QueryRequest, QueryResult};

pub struct ModeSelector {
    orchestrator: QueryOrchestrator,
    probe: Arc<dyn AvailabilityProbe>,
    probe_timeout: Duration,
    mode: OnceCell<Mode>,
}

impl ModeSelector {
    pub fn new(orchestrator: QueryOrchestrator, probe: Arc<dyn AvailabilityProbe>) -> Self {
        Self {
            orchestrator,
            probe,
            probe_timeout: Duration::from_secs(10),
            mode: OnceCell::new(),
        }
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn orchestrator(&self) -> &QueryOrchestrator {
        &self.orchestrator
    }

    /// The resolved mode, probing on first use.
    pub async fn resolve(&self) -> Mode {
        *self.mode.get_or_init(|| self.probe_once()).await
    }

    /// The mode if it has been resolved already.
    pub fn current(&self) -> Option<Mode> {
        self.mode.get().copied()
    }

    /// Forget the resolved mode and probe again.
    pub async fn reinitialize(&mut self) -> Mode {
        self.mode = OnceCell::new();
        self.resolve().await
    }

    /// Answer with the orchestrator when live, or with the simulated
    /// responder otherwise.
    pub async fn route(&self, request: &QueryRequest) -> Result<QueryResult> {
        request.validate()?;
        match self.resolve().await {
            Mode::Live => self.orchestrator.answer(request).await,
            Mode::Simulated => {
                let count = self.orchestrator.index().stats().await.count;
                Ok(simulated_result(count))
            }
        }
    }

    async fn probe_once(&self) -> Mode {
        let mode = match tokio::time::timeout(self.probe_timeout, self.probe.check_availability()).await {
            Ok(true) => Mode::Live,
            Ok(false) => Mode::Simulated,
            Err(_) => {
                tracing::warn!(
                    timeout_secs = self.probe_timeout.as_secs(),
                    "backend probe timed out"
                );
                Mode::Simulated
            }
        };
        match mode {
            Mode::Live => tracing::info!(%mode, "backends reachable"),
            Mode::Simulated => tracing::warn!(%mode, "backends unreachable, answering in simulated mode"),
        }
        mode
    }
}

/// Deterministic placeholder answer naming the index size.
pub fn simulated_result(chunk_count: usize) -> QueryResult {
    QueryResult {
        success: true,
        answer: format!(
            "Simulated mode: the language model is not reachable, so no answer was generated. \
             The index currently holds {} chunks. Configure a generation backend to get real answers.",
            chunk_count
        ),
        sources: Vec::new(),
        documents_used: 0,
        mode: Mode::Simulated,
        error: None,
        model: None,
        usage: None,
    }
}
