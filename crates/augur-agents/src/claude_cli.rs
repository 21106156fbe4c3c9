use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::AgentError;
use crate::narrator::TextGenerator;

/// Configuration for a Claude CLI invocation.
#[derive(Debug, Clone)]
pub struct ClaudeCliConfig {
    pub model: String,
    pub timeout: Duration,
}

impl Default for ClaudeCliConfig {
    fn default() -> Self {
        Self {
            model: "claude-3-5-haiku-latest".to_string(),
            timeout: Duration::from_secs(45),
        }
    }
}

impl From<&augur_models::NarratorConfig> for ClaudeCliConfig {
    fn from(config: &augur_models::NarratorConfig) -> Self {
        Self {
            model: config.model.clone(),
            timeout: Duration::from_secs(config.timeout_seconds),
        }
    }
}

/// Invoke the `claude` CLI in print mode. Returns the raw stdout text.
pub async fn invoke_claude(
    system_prompt: &str,
    user_prompt: &str,
    config: &ClaudeCliConfig,
) -> Result<String, AgentError> {
    debug!(model = %config.model, "Invoking claude CLI");

    let output = tokio::time::timeout(
        config.timeout,
        Command::new("claude")
            .args([
                "-p",
                user_prompt,
                "--system-prompt",
                system_prompt,
                "--model",
                &config.model,
                "--output-format",
                "text",
            ])
            .kill_on_drop(true)
            .output(),
    )
    .await
    .map_err(|_| AgentError::Timeout(config.timeout.as_millis() as u64))?
    .map_err(|e| AgentError::Cli(format!("Failed to spawn claude: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        warn!(status = %output.status, stderr = %stderr, "Claude CLI failed");
        return Err(AgentError::Cli(format!(
            "claude exited {}: {}",
            output.status, stderr
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if stdout.is_empty() {
        return Err(AgentError::Cli("Claude returned empty response".to_string()));
    }
    Ok(stdout)
}

/// Check if the `claude` CLI is available on the system.
pub async fn check_cli_available() -> bool {
    match Command::new("claude").arg("--version").output().await {
        Ok(output) => output.status.success(),
        Err(_) => false,
    }
}

/// Narrative generation through the local `claude` CLI.
#[derive(Debug, Clone, Default)]
pub struct ClaudeCli {
    pub config: ClaudeCliConfig,
}

impl ClaudeCli {
    pub fn new(config: ClaudeCliConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl TextGenerator for ClaudeCli {
    async fn generate(&self, system_prompt: &str, user_prompt: &str) -> Result<String, AgentError> {
        invoke_claude(system_prompt, user_prompt, &self.config).await
    }
}
