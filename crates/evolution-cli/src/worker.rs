//! `memory-worker` subcommand: processes one job read from stdin.

use anyhow::{Context, bail};
use evolution_config::{EnvSettings, EvolutionConfig};
use evolution_core::{MemoryJob, MemoryWorker, bootstrap};
use log::info;
use tokio::io::AsyncReadExt;

pub fn decode_job(payload: &str) -> anyhow::Result<MemoryJob> {
    serde_json::from_str(payload.trim()).context("failed to decode memory job")
}

pub async fn run(config: &EvolutionConfig, env: &EnvSettings) -> anyhow::Result<()> {
    let mut payload = String::new();
    tokio::io::stdin()
        .read_to_string(&mut payload)
        .await
        .context("failed to read memory job from stdin")?;
    let job = decode_job(&payload)?;

    let Some(memory) = bootstrap::memory_service(config, env)? else {
        bail!("memory is disabled; nothing to process");
    };
    let worker = MemoryWorker::new(bootstrap::fact_extractor(config, env), memory);
    let saved = worker
        .process(&job)
        .await
        .context("memory job failed")?;
    info!("memory worker finished (saved={})", saved);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::decode_job;
    use pretty_assertions::assert_eq;

    #[test]
    fn decodes_job_with_trailing_newline() {
        let job = decode_job("{\"user_input\":\"hi\",\"agent_response\":\"hello\"}\n")
            .expect("job");
        assert_eq!(job.user_input, "hi");
        assert_eq!(job.agent_response, "hello");
        assert!(decode_job("not json").is_err());
    }
}
