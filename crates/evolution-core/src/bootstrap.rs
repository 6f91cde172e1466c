//! Builds runtime components from config and environment.

use crate::agent::{Agent, AgentTool, Capabilities};
use crate::error::CoreError;
use crate::planner::{HostedCapability, OpenAiPlanner, OpenAiPlannerConfig, Planner};
use crate::state::{SqliteStateStore, StateStore};
use crate::worker::{FactExtractor, LlmFactExtractor, VerbatimExtractor};
use evolution_config::{
    AgentConfig, DatabaseLocation, EnvSettings, EvolutionConfig, ExtractorKind,
    MemoryCaptureConfig, MemoryProviderKind, default_data_dir,
};
use evolution_memory::{
    EmbeddingProvider, MemoryCapturePolicy, MemoryService, MemoryServiceConfig, OpenAiEmbeddings,
    QdrantVectorStore, SqliteVectorStore, VectorStore,
};
use evolution_tools::{RecallMemoryTool, SaveMemoryTool, ShellTool, SqlTool, ToolRegistry};
use log::info;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_QDRANT_URL: &str = "http://localhost:6333";
const MEMORY_DB_FILE: &str = "memory.db";

/// Open the session state store named by `DATABASE_URL`.
pub fn state_store(env: &EnvSettings) -> Result<Arc<dyn StateStore>, CoreError> {
    let location = env
        .database_location()
        .map_err(|err| CoreError::Config(err.to_string()))?;
    let store = SqliteStateStore::open_location(&location)
        .map_err(|err| CoreError::State(err.to_string()))?;
    Ok(Arc::new(store))
}

pub fn capture_policy(config: &MemoryCaptureConfig) -> MemoryCapturePolicy {
    MemoryCapturePolicy {
        deny_patterns: config.deny_patterns.clone(),
        redact_patterns: config.redact_patterns.clone(),
        max_chars: config.max_chars,
        detect_secrets: config.detect_secrets,
        secret_entropy_threshold: config.secret_entropy_threshold,
        redaction_replacement: config.redaction_replacement.clone(),
    }
}

fn memory_db_path(path: Option<&String>) -> Result<PathBuf, CoreError> {
    match path {
        Some(path) => Ok(PathBuf::from(path)),
        None => default_data_dir()
            .map(|dir| dir.join(MEMORY_DB_FILE))
            .ok_or_else(|| CoreError::Config("cannot resolve home directory".to_string())),
    }
}

/// Build the memory service, or `None` when memory is disabled.
pub fn memory_service(
    config: &EvolutionConfig,
    env: &EnvSettings,
) -> Result<Option<Arc<MemoryService>>, CoreError> {
    let memory = &config.memory;
    if !memory.enabled {
        info!("memory disabled by config");
        return Ok(None);
    }
    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(OpenAiEmbeddings::new(
        env.openai_base_url.clone(),
        env.openai_api_key.clone(),
        memory.embedding_model.clone(),
        memory.embedding_dimension,
    ));
    let store: Arc<dyn VectorStore> = match memory.provider {
        MemoryProviderKind::Sqlite => {
            let path = memory_db_path(memory.path.as_ref())?;
            Arc::new(
                SqliteVectorStore::open(&path).map_err(|err| CoreError::Memory(err.to_string()))?,
            )
        }
        MemoryProviderKind::Qdrant => {
            let url = env
                .qdrant_url
                .clone()
                .or_else(|| memory.qdrant_url.clone())
                .unwrap_or_else(|| DEFAULT_QDRANT_URL.to_string());
            Arc::new(QdrantVectorStore::new(url, env.qdrant_api_key.clone()))
        }
    };
    info!(
        "initializing memory service (provider={:?}, collection={}, model={})",
        memory.provider, memory.collection, memory.embedding_model
    );
    let service = MemoryService::new(
        embedder,
        store,
        MemoryServiceConfig {
            collection: memory.collection.clone(),
            recall_default: memory.recall_limit,
            score_threshold: memory.score_threshold,
            capture: capture_policy(&memory.capture),
        },
    )
    .map_err(|err| CoreError::Memory(err.to_string()))?;
    Ok(Some(Arc::new(service)))
}

/// Built-in tools enabled by config.
pub fn builtin_tools(
    config: &EvolutionConfig,
    env: &EnvSettings,
    memory: Option<Arc<MemoryService>>,
) -> Result<ToolRegistry, CoreError> {
    let registry = ToolRegistry::new();
    let tools = &config.tools;
    if tools.shell {
        registry.register(Arc::new(ShellTool::new(Duration::from_secs(
            tools.shell_timeout_secs,
        ))));
    }
    if tools.sql {
        let location = env
            .database_location()
            .map_err(|err| CoreError::Config(err.to_string()))?;
        let sql = match location {
            DatabaseLocation::Memory => SqlTool::open_in_memory(tools.sql_row_limit),
            DatabaseLocation::File(path) => SqlTool::open(path, tools.sql_row_limit),
        }
        .map_err(|err| CoreError::Config(err.to_string()))?;
        registry.register(Arc::new(sql));
    }
    if let Some(memory) = memory {
        registry.register(Arc::new(RecallMemoryTool::new(memory.clone())));
        registry.register(Arc::new(SaveMemoryTool::new(memory)));
    }
    Ok(registry)
}

/// OpenAI planner for `model`, sharing reasoning settings with the top-level agent.
pub fn planner(
    model: &str,
    agent: &AgentConfig,
    config: &EvolutionConfig,
    env: &EnvSettings,
) -> Result<Arc<dyn Planner>, CoreError> {
    let mut planner_config = OpenAiPlannerConfig::new(model, env.openai_api_key.clone());
    planner_config.base_url = env
        .openai_base_url
        .clone()
        .unwrap_or_else(|| config.openai.base_url.clone());
    planner_config.reasoning_effort = agent.reasoning_effort.clone();
    planner_config.reasoning_summary = agent.reasoning_summary.clone();
    planner_config.max_tool_rounds = agent.max_tool_rounds;
    planner_config.request_timeout = Duration::from_secs(config.openai.request_timeout_secs);
    let planner =
        OpenAiPlanner::new(planner_config).map_err(|err| CoreError::Planner(err.to_string()))?;
    Ok(Arc::new(planner))
}

/// Top-level agent with every built-in tool and each sub-agent as a tool.
pub fn agent(
    config: &EvolutionConfig,
    env: &EnvSettings,
    tools: &ToolRegistry,
) -> Result<Agent, CoreError> {
    let top_tools = ToolRegistry::new();
    for tool in tools.all() {
        top_tools.register(tool);
    }
    for sub in &config.sub_agents {
        let model = sub.model.as_deref().unwrap_or(&config.agent.model);
        let mut capabilities = Capabilities::new(tools.subset(&sub.tools));
        if sub.web_search {
            capabilities = capabilities.with_hosted(HostedCapability::WebSearch);
        }
        let sub_agent = Agent::new(
            sub.name.clone(),
            sub.instructions.clone(),
            capabilities,
            planner(model, &config.agent, config, env)?,
        );
        info!(
            "registered sub-agent (name={}, model={}, tools={})",
            sub.name,
            model,
            sub.tools.len()
        );
        top_tools.register(Arc::new(AgentTool::new(sub_agent, sub.description.clone())));
    }

    let mut capabilities = Capabilities::new(top_tools);
    if config.agent.web_search {
        capabilities = capabilities.with_hosted(HostedCapability::WebSearch);
    }
    Ok(Agent::new(
        config.agent.name.clone(),
        config.agent.instructions.clone(),
        capabilities,
        planner(&config.agent.model, &config.agent, config, env)?,
    ))
}

/// Fact extractor used by the memory worker.
pub fn fact_extractor(config: &EvolutionConfig, env: &EnvSettings) -> Arc<dyn FactExtractor> {
    match config.background.extractor {
        ExtractorKind::Llm => Arc::new(LlmFactExtractor::new(
            env.openai_base_url.clone(),
            env.openai_api_key.clone(),
            config.background.extraction_model.clone(),
        )),
        ExtractorKind::Verbatim => Arc::new(VerbatimExtractor),
    }
}
