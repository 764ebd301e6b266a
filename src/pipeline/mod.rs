mod ar;
mod ec;
mod ld;
mod se;
mod ta;
mod td;
mod ts;

pub use ec::EventCreator;
pub use ts::normalize_duration;

use crate::bridge::CalendarBridgeClient;
use crate::clock;
use crate::config::Config;
use crate::error::PipelineError;
use crate::llm::LlmBridgeClient;
use crate::types::{CreateOutcome, TaskKind, UserQuery};
use ar::AbsoluteResolver;
use ld::LlmDecomposer;
use se::SlotExtractor;
use sqlx::SqlitePool;
use ta::TimeAllotmentAgent;
use td::TaskDifficultyAnalyzer;

/// Runs the full UQ -> SE -> AR -> TS -> TD -> [LD] -> TA -> EC pipeline for
/// one query. Aborts on the first stage failure with the stage name, the
/// input it saw, and the underlying error; no stage retries upstream.
pub struct Orchestrator {
    llm: LlmBridgeClient,
    bridge: CalendarBridgeClient,
    pool: SqlitePool,
    config: Config,
}

impl Orchestrator {
    pub fn new(llm: LlmBridgeClient, bridge: CalendarBridgeClient, pool: SqlitePool, config: Config) -> Self {
        Self { llm, bridge, pool, config }
    }

    pub async fn run(&self, query: UserQuery) -> Result<CreateOutcome, PipelineError> {
        let start = std::time::Instant::now();
        tracing::info!(query = %query.query, "pipeline started");

        if query.query.trim().is_empty() {
            return Err(PipelineError::new("UQ", &query, anyhow::anyhow!("query cannot be empty")));
        }

        let se = SlotExtractor::new(&self.llm);
        let slots = se.extract(&query.query, &query.timezone.to_string()).await;
        tracing::info!(?slots, "SE complete");

        let ctx = clock::context_for(chrono::Utc::now(), query.timezone);
        let ar = AbsoluteResolver::new(&self.llm);
        let resolution = ar.resolve(&slots, &ctx).await;
        tracing::info!(?resolution, "AR complete");

        let standardized = ts::standardize(&resolution, query.timezone, ctx.now)
            .map_err(|e| PipelineError::new("TS", &resolution, e))?;
        tracing::info!(?standardized, "TS complete");

        let td = TaskDifficultyAnalyzer::new(&self.llm, &self.bridge);
        let classification = td.analyze(&query.query, standardized.duration.as_deref()).await;
        tracing::info!(?classification, "TD complete");

        let scheduled = match classification.kind {
            TaskKind::Simple => {
                let ta = TimeAllotmentAgent::new(&self.bridge, &self.config);
                ta.place_simple(&classification, &standardized)
                    .await
                    .map_err(|e| PipelineError::new("TA", &classification, e))?
            }
            TaskKind::Complex => {
                let ld = LlmDecomposer::new(&self.llm);
                let decomposition = ld.decompose(&classification).await;
                tracing::info!(?decomposition, "LD complete");

                let ta = TimeAllotmentAgent::new(&self.bridge, &self.config);
                ta.place_complex(&decomposition, &standardized)
                    .await
                    .map_err(|e| PipelineError::new("TA", &decomposition, e))?
            }
        };

        let ec = EventCreator::new(&self.bridge, &self.pool);
        let outcome = ec.create(&scheduled).await.map_err(|e| PipelineError::new("EC", "scheduled artifact", e))?;

        tracing::info!(elapsed_ms = start.elapsed().as_millis() as u64, created = outcome.created.len(), failed = outcome.failed.len(), "pipeline complete");

        Ok(outcome)
    }

    pub fn event_creator(&self) -> EventCreator<'_> {
        EventCreator::new(&self.bridge, &self.pool)
    }
}
