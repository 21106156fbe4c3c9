use async_trait::async_trait;
use tracing::warn;

use crate::error::AgentError;

/// A free-text generator used to phrase analyst reasoning.
///
/// Output is narrative only. It never feeds back into scores, directions,
/// or confidences.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, system_prompt: &str, user_prompt: &str) -> Result<String, AgentError>;
}

/// Ask the generator for a narrative, keeping the rule-based text on failure.
pub async fn narrate_or(
    generator: Option<&dyn TextGenerator>,
    system_prompt: &str,
    user_prompt: &str,
    fallback: String,
) -> String {
    let Some(generator) = generator else {
        return fallback;
    };
    match generator.generate(system_prompt, user_prompt).await {
        Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
        Ok(_) => fallback,
        Err(e) => {
            warn!(error = %e, "Narrative generation failed, using rule-based reasoning");
            fallback
        }
    }
}
