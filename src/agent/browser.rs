//! Interactive Browser Agent (§4.9): cooperates with a vision-capable
//! model to drive a real browser, one screenshot-and-action turn at a
//! time, pausing for a user follow-up via the session store when the
//! model has a question instead of an action.

use async_trait::async_trait;
use base64::Engine;
use tokio::time::{Duration, Instant};
use tracing::warn;

use crate::agent::client::OrchestratorModelClient;
use crate::agent::loop_guard::LoopGuard;
use crate::agent::prompts::{self, BrowserTurn};
use crate::config::DeepSearchConfig;
use crate::core::provider::{GenerationOptions, ImageAttachment, ImageSource};
use crate::core::storage::{StorageBackend, StorageBackendExt};
use crate::core::types::Message;
use crate::database::followup_key;
use crate::domain::BrowserAction;
use crate::error::{Error, Result};

/// Drives one remote browser session: applies structured actions and
/// returns a screenshot of the result. Implemented elsewhere against
/// whatever remote-control transport (CDP, a vendor automation API, ...)
/// the deployment uses; this module only consumes the trait.
#[async_trait]
pub trait RemoteControl: Send + Sync {
    async fn apply_action(&self, action: &BrowserAction) -> Result<()>;
    /// Capture the current viewport as PNG bytes.
    async fn screenshot(&self) -> Result<Vec<u8>>;
}

/// Outcome of a browser agent run.
#[derive(Debug, Clone)]
pub enum BrowserOutcome {
    /// The model ended the session, or the user told it to stop.
    Completed,
    /// The model asked the user something and no reply arrived within
    /// the follow-up timeout; the caller should surface `message` and
    /// may resume later with [`BrowserAgent::continue_with_reply`].
    Suspended { message: String },
}

/// Ties the vision model, a [`RemoteControl`] session, and follow-up
/// polling together for one browser-driven task.
pub struct BrowserAgent<'a> {
    model_client: &'a OrchestratorModelClient,
    model: &'a str,
    remote: &'a dyn RemoteControl,
    session_store: &'a dyn StorageBackend,
    config: &'a DeepSearchConfig,
}

impl<'a> BrowserAgent<'a> {
    pub fn new(
        model_client: &'a OrchestratorModelClient,
        model: &'a str,
        remote: &'a dyn RemoteControl,
        session_store: &'a dyn StorageBackend,
        config: &'a DeepSearchConfig,
    ) -> Self {
        BrowserAgent { model_client, model, remote, session_store, config }
    }

    /// Drive the session toward `goal`, applying at most `max_turns`
    /// screenshot/action round trips before giving up and reporting
    /// completion as-is.
    pub async fn run(&self, session_id: &str, goal: &str, max_turns: u32) -> Result<BrowserOutcome> {
        let mut action_history: Vec<String> = Vec::new();
        let mut guard = LoopGuard::default();

        for _ in 0..max_turns {
            if let Some(outcome) = self.take_turn(session_id, goal, &mut action_history, &mut guard).await? {
                return Ok(outcome);
            }
        }

        warn!(session_id, max_turns, "browser agent exhausted its turn budget");
        Ok(BrowserOutcome::Completed)
    }

    /// Resume a session that suspended on a question, with the user's
    /// reply already in hand (skips the follow-up poll).
    pub async fn continue_with_reply(
        &self,
        session_id: &str,
        goal: &str,
        reply: &str,
        max_turns: u32,
    ) -> Result<BrowserOutcome> {
        if self.classify_followup(reply).await?.starts_with("stop") {
            return Ok(BrowserOutcome::Completed);
        }

        let mut action_history = vec![format!("user: {reply}")];
        let mut guard = LoopGuard::default();
        for _ in 0..max_turns {
            if let Some(outcome) = self.take_turn(session_id, goal, &mut action_history, &mut guard).await? {
                return Ok(outcome);
            }
        }
        Ok(BrowserOutcome::Completed)
    }

    /// One screenshot -> model turn -> apply-or-suspend round trip, under
    /// the configured command timeout. Returns `Ok(None)` to keep looping.
    async fn take_turn(
        &self,
        session_id: &str,
        goal: &str,
        action_history: &mut Vec<String>,
        guard: &mut LoopGuard,
    ) -> Result<Option<BrowserOutcome>> {
        let timeout = Duration::from_secs(self.config.browser_command_timeout_secs);
        let turn = tokio::time::timeout(timeout, self.next_turn(goal, action_history))
            .await
            .map_err(|_| Error::Timeout("browser command timed out".to_string()))??;

        match turn {
            BrowserTurn::Action { action } => {
                let description = format!("{action:?}");
                if let Some(hint) = guard.record("browser_action", &description, "applied") {
                    action_history.push(hint);
                }
                self.remote.apply_action(&action).await?;
                action_history.push(description);
                Ok(None)
            }
            BrowserTurn::Message { message } => match self.poll_followup(session_id).await? {
                None => Ok(Some(BrowserOutcome::Suspended { message })),
                Some(reply) if self.classify_followup(&reply).await?.starts_with("stop") => {
                    Ok(Some(BrowserOutcome::Completed))
                }
                Some(reply) => {
                    action_history.push(format!("user: {reply}"));
                    Ok(None)
                }
            },
        }
    }

    async fn next_turn(&self, goal: &str, action_history: &[String]) -> Result<BrowserTurn> {
        let screenshot = self.remote.screenshot().await?;
        let prompt = prompts::browser_turn_prompt(goal, action_history);
        let options = GenerationOptions {
            model: Some(self.model.to_string()),
            image: Some(ImageAttachment {
                source: ImageSource::Base64(base64::engine::general_purpose::STANDARD.encode(screenshot)),
                extension_hint: Some("png".to_string()),
            }),
            ..Default::default()
        };
        let history = vec![Message::user(prompt)];
        let response = self.model_client.chat(&history, self.model, &options).await?;
        prompts::parse_browser_turn(&response)
    }

    /// Poll `followup:<session_id>` for a reply, bounded by
    /// `config.followup_timeout_secs`. Returns `None` on timeout.
    async fn poll_followup(&self, session_id: &str) -> Result<Option<String>> {
        let key = followup_key(session_id);
        let deadline = Duration::from_secs(self.config.followup_timeout_secs);
        let poll_interval = Duration::from_millis(500);
        let start = Instant::now();

        loop {
            if let Some(reply) = self.session_store.get::<String>(&key).await? {
                self.session_store.delete(&key).await?;
                return Ok(Some(reply));
            }
            if start.elapsed() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    async fn classify_followup(&self, reply: &str) -> Result<String> {
        let prompt = prompts::browser_followup_classification_prompt(reply);
        let history = vec![Message::user(prompt)];
        let options = GenerationOptions { model: Some(self.model.to_string()), ..Default::default() };
        let response = self.model_client.chat(&history, self.model, &options).await?;
        Ok(response.trim().to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base64_round_trips_screenshot_bytes() {
        let bytes = vec![137u8, 80, 78, 71];
        let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
        let decoded = base64::engine::general_purpose::STANDARD.decode(&encoded).unwrap();
        assert_eq!(decoded, bytes);
    }
}
