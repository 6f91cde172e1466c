//! Configuration schema for Evolution.

use serde::{Deserialize, Serialize};

/// Root config for the Evolution assistant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvolutionConfig {
    #[serde(default, rename = "$schema")]
    pub schema: Option<String>,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default = "default_sub_agents")]
    pub sub_agents: Vec<SubAgentConfig>,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub background: BackgroundConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub openai: OpenAiConfig,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            schema: None,
            agent: AgentConfig::default(),
            sub_agents: default_sub_agents(),
            sessions: SessionsConfig::default(),
            memory: MemoryConfig::default(),
            background: BackgroundConfig::default(),
            tools: ToolsConfig::default(),
            openai: OpenAiConfig::default(),
        }
    }
}

/// Configuration for the top-level conversational agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_agent_name")]
    pub name: String,
    #[serde(default = "default_agent_model")]
    pub model: String,
    #[serde(default = "default_agent_instructions")]
    pub instructions: String,
    #[serde(default)]
    pub reasoning_effort: Option<String>,
    #[serde(default = "default_reasoning_summary")]
    pub reasoning_summary: Option<String>,
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: usize,
    #[serde(default = "default_true")]
    pub web_search: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            model: default_agent_model(),
            instructions: default_agent_instructions(),
            reasoning_effort: None,
            reasoning_summary: default_reasoning_summary(),
            max_tool_rounds: default_max_tool_rounds(),
            web_search: true,
        }
    }
}

fn default_agent_name() -> String {
    "evolution".to_string()
}

fn default_agent_model() -> String {
    "gpt-5-mini".to_string()
}

fn default_agent_instructions() -> String {
    "You are a helpful system administration assistant. Answer questions, run database \
     queries and shell commands when needed, search the web for current information, and \
     delegate application coding work to the coding tool. Use recall_memory to look up facts \
     learned in earlier conversations before asking the user to repeat themselves."
        .to_string()
}

fn default_reasoning_summary() -> Option<String> {
    Some("auto".to_string())
}

fn default_max_tool_rounds() -> usize {
    8
}

fn default_true() -> bool {
    true
}

/// A specialized agent exposed to the top-level agent as a tool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubAgentConfig {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub instructions: String,
    /// Built-in tool names available to the sub-agent.
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub web_search: bool,
}

fn default_sub_agents() -> Vec<SubAgentConfig> {
    vec![SubAgentConfig {
        name: "coding".to_string(),
        description: "Write application code and test it".to_string(),
        model: Some("gpt-5-codex".to_string()),
        instructions: "You are a coding agent. Write the requested application code, run it \
                       with the shell tool to make sure it works, and reply with the final \
                       code and a short summary of how it was tested."
            .to_string(),
        tools: vec!["execute_shell_command".to_string()],
        web_search: false,
    }]
}

/// Session selection and persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SessionsConfig {
    /// Resume this session id instead of generating a new one.
    #[serde(default)]
    pub id: Option<String>,
}

/// Backing store used for vector memory.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MemoryProviderKind {
    /// Local SQLite file with exact cosine search.
    #[default]
    Sqlite,
    /// Remote Qdrant instance over its REST API.
    Qdrant,
}

/// Vector memory configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub provider: MemoryProviderKind,
    /// SQLite file path; defaults to `~/.evolution/memory.db`.
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub qdrant_url: Option<String>,
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_embedding_dimension")]
    pub embedding_dimension: usize,
    #[serde(default = "default_recall_limit")]
    pub recall_limit: usize,
    #[serde(default)]
    pub score_threshold: Option<f32>,
    #[serde(default)]
    pub capture: MemoryCaptureConfig,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            provider: MemoryProviderKind::default(),
            path: None,
            qdrant_url: None,
            collection: default_collection(),
            embedding_model: default_embedding_model(),
            embedding_dimension: default_embedding_dimension(),
            recall_limit: default_recall_limit(),
            score_threshold: None,
            capture: MemoryCaptureConfig::default(),
        }
    }
}

fn default_collection() -> String {
    "memories".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_embedding_dimension() -> usize {
    1536
}

fn default_recall_limit() -> usize {
    5
}

/// Capture rules applied to content before it is stored as memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryCaptureConfig {
    #[serde(default)]
    pub deny_patterns: Vec<String>,
    #[serde(default)]
    pub redact_patterns: Vec<String>,
    #[serde(default)]
    pub max_chars: Option<usize>,
    #[serde(default = "default_true")]
    pub detect_secrets: bool,
    #[serde(default = "default_secret_entropy_threshold")]
    pub secret_entropy_threshold: f32,
    #[serde(default = "default_redaction_replacement")]
    pub redaction_replacement: String,
}

impl Default for MemoryCaptureConfig {
    fn default() -> Self {
        Self {
            deny_patterns: Vec::new(),
            redact_patterns: Vec::new(),
            max_chars: None,
            detect_secrets: true,
            secret_entropy_threshold: default_secret_entropy_threshold(),
            redaction_replacement: default_redaction_replacement(),
        }
    }
}

fn default_secret_entropy_threshold() -> f32 {
    3.7
}

/// Default replacement marker for redacted content.
fn default_redaction_replacement() -> String {
    "[REDACTED]".to_string()
}

/// Fact extraction strategy used by the memory worker.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExtractorKind {
    /// Ask a chat model for standalone facts.
    #[default]
    Llm,
    /// Store the exchange as a single record.
    Verbatim,
}

/// Background memory processing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackgroundConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_job_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
    #[serde(default)]
    pub extractor: ExtractorKind,
    #[serde(default = "default_agent_model")]
    pub extraction_model: String,
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            queue_capacity: default_queue_capacity(),
            timeout_secs: default_job_timeout_secs(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
            extractor: ExtractorKind::default(),
            extraction_model: default_agent_model(),
        }
    }
}

fn default_queue_capacity() -> usize {
    16
}

fn default_job_timeout_secs() -> u64 {
    120
}

fn default_shutdown_grace_secs() -> u64 {
    10
}

/// Built-in tool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_true")]
    pub shell: bool,
    #[serde(default = "default_true")]
    pub sql: bool,
    #[serde(default = "default_shell_timeout_secs")]
    pub shell_timeout_secs: u64,
    #[serde(default = "default_sql_row_limit")]
    pub sql_row_limit: usize,
    /// Maximum characters of a tool result recorded in session history.
    #[serde(default = "default_max_tool_log_chars")]
    pub max_tool_log_chars: usize,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            shell: true,
            sql: true,
            shell_timeout_secs: default_shell_timeout_secs(),
            sql_row_limit: default_sql_row_limit(),
            max_tool_log_chars: default_max_tool_log_chars(),
        }
    }
}

fn default_shell_timeout_secs() -> u64 {
    30
}

fn default_sql_row_limit() -> usize {
    20
}

fn default_max_tool_log_chars() -> usize {
    2000
}

/// OpenAI endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: default_openai_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_request_timeout_secs() -> u64 {
    300
}
