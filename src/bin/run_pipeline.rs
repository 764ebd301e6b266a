//! Thin entrypoint: wires the ambient stack (config, tracing, DB pool) and
//! runs one query through the pipeline. The CLI shell proper — argument
//! parsing, multiple subcommands, interactive UI — is an external
//! collaborator and lives outside this crate.

use calbridge_core::{Config, Orchestrator, UserQuery};
use calbridge_core::bridge::CalendarBridgeClient;
use calbridge_core::llm::LlmBridgeClient;
use calbridge_core::store;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let query_text = std::env::args().nth(1).ok_or_else(|| anyhow::anyhow!("usage: run_pipeline \"<query>\""))?;

    let config = Config::from_env();
    let pool = store::connect(&config.db_path).await?;
    let llm = LlmBridgeClient::new(config.llm_bridge_base_url.clone(), config.llm_model.clone(), config.llm_timeout);
    let bridge = CalendarBridgeClient::new(config.calendar_bridge_base_url.clone(), config.bridge_write_timeout, config.bridge_fetch_timeout);

    let orchestrator = Orchestrator::new(llm, bridge, pool, config.clone());
    let query = UserQuery::new(query_text, config.timezone);

    match orchestrator.run(query).await {
        Ok(outcome) => {
            println!("created {} event(s), {} failed", outcome.created.len(), outcome.failed.len());
        }
        Err(e) => {
            eprintln!("pipeline aborted: {e}");
            std::process::exit(1);
        }
    }

    Ok(())
}
