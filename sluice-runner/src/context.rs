//! Execution context for a run
//!
//! Contains all state a run carries while its steps execute:
//! - Log buffer for operator-facing output
//! - The ephemeral workspace
//! - The child-process environment, including the run's declared secrets

use sluice_core::domain::log::{LogEntry, LogLevel};
use sluice_core::domain::secret::{CREDENTIAL_NAMES, SecretValue};
use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};
use uuid::Uuid;

use crate::workspace::Workspace;

const REDACTED: &str = "***";

/// Execution context shared across the steps of one run
pub struct RunContext {
    pub run_id: Uuid,

    /// Workspace the run checks out into
    pub workspace: Workspace,

    /// Inherited environment with every managed credential removed
    base_env: BTreeMap<String, String>,

    /// Secrets the run's workflow declared
    secrets: Vec<(String, SecretValue)>,

    log_buffer: Mutex<Vec<LogEntry>>,
}

impl RunContext {
    /// Creates a context whose children inherit this process's environment,
    /// minus credentials, plus exactly `secrets`.
    pub fn new(run_id: Uuid, workspace: Workspace, secrets: Vec<(String, SecretValue)>) -> Self {
        Self::with_base_env(run_id, workspace, std::env::vars().collect(), secrets)
    }

    /// Same as [`RunContext::new`] with an explicit base environment
    pub fn with_base_env(
        run_id: Uuid,
        workspace: Workspace,
        mut base_env: BTreeMap<String, String>,
        secrets: Vec<(String, SecretValue)>,
    ) -> Self {
        for name in CREDENTIAL_NAMES {
            base_env.remove(name);
        }

        Self {
            run_id,
            workspace,
            base_env,
            secrets,
            log_buffer: Mutex::new(Vec::new()),
        }
    }

    /// Environment handed to every child process of the run
    pub fn env(&self) -> impl Iterator<Item = (&str, &str)> {
        self.base_env
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .chain(self.secrets.iter().map(|(k, v)| (k.as_str(), v.expose())))
    }

    /// Looks up a variable of the child environment
    pub fn env_var(&self, name: &str) -> Option<&str> {
        self.env().find(|(k, _)| *k == name).map(|(_, v)| v)
    }

    /// Replaces any secret value appearing in `text`
    pub fn redact(&self, text: &str) -> String {
        let mut redacted = text.to_string();
        for (_, value) in &self.secrets {
            if !value.expose().is_empty() {
                redacted = redacted.replace(value.expose(), REDACTED);
            }
        }
        redacted
    }

    /// Adds a log entry to the buffer
    pub fn add_log(&self, entry: LogEntry) {
        let mut buffer = self.log_buffer.lock().unwrap_or_else(PoisonError::into_inner);
        buffer.push(entry);
    }

    pub fn log(&self, level: LogLevel, message: impl AsRef<str>) {
        self.add_log(LogEntry::new(level, self.redact(message.as_ref())));
    }

    pub fn log_debug(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Debug, message);
    }

    pub fn log_info(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Info, message);
    }

    pub fn log_warning(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Warning, message);
    }

    pub fn log_error(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Error, message);
    }

    /// Drains all log entries from the buffer
    pub fn drain_logs(&self) -> Vec<LogEntry> {
        let mut buffer = self.log_buffer.lock().unwrap_or_else(PoisonError::into_inner);
        buffer.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_core::domain::secret::{FAL_KEY_ID, FAL_KEY_SECRET};

    fn workspace() -> Workspace {
        let base = std::env::temp_dir().join(format!("sluice-ctx-test-{}", Uuid::new_v4()));
        Workspace::create(&base, Uuid::new_v4()).unwrap()
    }

    #[test]
    fn test_credentials_only_when_declared() {
        let mut inherited = BTreeMap::new();
        inherited.insert("PATH".to_string(), "/usr/bin".to_string());
        inherited.insert(FAL_KEY_ID.to_string(), "leaked-id".to_string());
        inherited.insert(FAL_KEY_SECRET.to_string(), "leaked-secret".to_string());

        let ctx = RunContext::with_base_env(Uuid::new_v4(), workspace(), inherited.clone(), vec![]);
        assert_eq!(ctx.env_var("PATH"), Some("/usr/bin"));
        assert_eq!(ctx.env_var(FAL_KEY_ID), None);
        assert_eq!(ctx.env_var(FAL_KEY_SECRET), None);

        let ctx = RunContext::with_base_env(
            Uuid::new_v4(),
            workspace(),
            inherited,
            vec![(FAL_KEY_ID.to_string(), SecretValue::new("declared-id"))],
        );
        assert_eq!(ctx.env_var(FAL_KEY_ID), Some("declared-id"));
        assert_eq!(ctx.env_var(FAL_KEY_SECRET), None);
    }

    #[test]
    fn test_logs_are_redacted() {
        let ctx = RunContext::with_base_env(
            Uuid::new_v4(),
            workspace(),
            BTreeMap::new(),
            vec![(FAL_KEY_SECRET.to_string(), SecretValue::new("s3cr3t"))],
        );

        ctx.log_info("auth header: Key s3cr3t");
        ctx.log_error("plain");

        let logs = ctx.drain_logs();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].message, "auth header: Key ***");
        assert_eq!(logs[1].level, LogLevel::Error);
        assert!(ctx.drain_logs().is_empty());
    }
}
