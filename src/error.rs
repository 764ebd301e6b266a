use thiserror::Error;

#[derive(Debug, Error)]
pub enum SeError {
    #[error("query cannot be empty")]
    EmptyQuery,
}

#[derive(Debug, Error)]
pub enum ArError {
    #[error("clock context is missing timezone information")]
    MissingContext,
}

#[derive(Debug, Error)]
pub enum TsError {
    #[error("could not parse '{0}' as a canonical absolute datetime")]
    UnparseableDatetime(String),
    #[error("standardized interval is invalid: start {start} > end {end}")]
    InvalidInterval { start: String, end: String },
}

#[derive(Debug, Error)]
pub enum TdError {
    #[error("no writable work or home calendar is available")]
    NoCalendar,
}

#[derive(Debug, Error)]
pub enum LdError {
    #[error("decomposer input must be a complex task, got {0:?}")]
    NotComplex(crate::types::TaskKind),
    #[error("parent task title cannot be empty")]
    EmptyTitle,
}

#[derive(Debug, Error)]
pub enum TaError {
    #[error("no calendar assigned to this task")]
    NoCalendar,
    #[error("the placement window has no free time at all")]
    NoFreeSlots,
    #[error("required minutes ({required}) exceed total available minutes ({available})")]
    Infeasible { required: i64, available: i64 },
    #[error("could not find a fitting block for task index {0}")]
    CannotPlace(usize),
    #[error("scheduler produced an invalid slot: {0}")]
    InvariantViolated(String),
}

#[derive(Debug, Error)]
pub enum EcError {
    #[error("task failed pre-flight validation: {0}")]
    InputInvalid(String),
    #[error("calendar bridge returned a client error ({status}): {body}")]
    BridgePermanent { status: u16, body: String },
    #[error("calendar bridge call failed after retries: {0}")]
    BridgeFailure(String),
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}

/// Orchestration-level error: which stage aborted, what it was given, and why.
#[derive(Debug, Error)]
#[error("stage {stage} failed on input {input}: {source}")]
pub struct PipelineError {
    pub stage: &'static str,
    pub input: String,
    #[source]
    pub source: anyhow::Error,
}

impl PipelineError {
    pub fn new(stage: &'static str, input: impl std::fmt::Debug, source: impl Into<anyhow::Error>) -> Self {
        let source = source.into();
        tracing::error!(stage, %source, "pipeline aborted");
        Self {
            stage,
            input: format!("{input:?}"),
            source,
        }
    }
}
