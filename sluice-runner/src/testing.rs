//! Test doubles shared by the runner's unit tests

use async_trait::async_trait;
use sluice_core::domain::secret::SecretValue;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use crate::cancel::RunToken;
use crate::context::RunContext;
use crate::process::{CommandOutput, CommandRunner, CommandSpec};
use crate::step::StepError;
use crate::workspace::Workspace;

pub fn test_context() -> RunContext {
    test_context_with_secrets(Vec::new())
}

pub fn test_context_with_secrets(secrets: Vec<(String, SecretValue)>) -> RunContext {
    let base = std::env::temp_dir().join(format!("sluice-test-{}", Uuid::new_v4()));
    let run_id = Uuid::new_v4();
    let workspace = Workspace::create(&base, run_id).expect("workspace");
    RunContext::new(run_id, workspace, secrets)
}

/// A command observed by [`ScriptedRunner`]
#[derive(Debug, Clone)]
pub struct Recorded {
    pub spec: CommandSpec,
    /// Names of the credential variables visible to the command
    pub credentials: Vec<String>,
}

#[derive(Debug, Clone)]
enum Script {
    Exit(i32),
    WaitForCancel,
}

/// Records every command and answers from a per-step script (default: exit 0)
#[derive(Default)]
pub struct ScriptedRunner {
    scripts: Mutex<HashMap<String, Vec<Script>>>,
    calls: Mutex<Vec<Recorded>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues exit codes for consecutive invocations of `step`
    pub fn exits(self, step: &str, codes: &[i32]) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .entry(step.to_string())
            .or_default()
            .extend(codes.iter().map(|c| Script::Exit(*c)));
        self
    }

    /// Makes `step` block until the run is cancelled
    pub fn blocks(self, step: &str) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .entry(step.to_string())
            .or_default()
            .push(Script::WaitForCancel);
        self
    }

    pub fn calls(&self) -> Vec<Recorded> {
        self.calls.lock().unwrap().clone()
    }

    pub fn steps(&self) -> Vec<String> {
        self.calls().into_iter().map(|r| r.spec.step).collect()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(
        &self,
        spec: &CommandSpec,
        ctx: &RunContext,
        token: &RunToken,
    ) -> Result<CommandOutput, StepError> {
        if token.is_cancelled() {
            return Err(StepError::Cancelled {
                step: spec.step.clone(),
            });
        }

        let credentials = sluice_core::domain::secret::CREDENTIAL_NAMES
            .iter()
            .filter(|name| ctx.env_var(name).is_some())
            .map(|name| name.to_string())
            .collect();
        self.calls.lock().unwrap().push(Recorded {
            spec: spec.clone(),
            credentials,
        });

        let script = {
            let mut scripts = self.scripts.lock().unwrap();
            match scripts.get_mut(&spec.step) {
                Some(queue) if !queue.is_empty() => queue.remove(0),
                _ => Script::Exit(0),
            }
        };

        match script {
            Script::Exit(exit_code) => Ok(CommandOutput {
                exit_code,
                stdout: String::new(),
                stderr: if exit_code == 0 {
                    String::new()
                } else {
                    format!("{} failed", spec.step)
                },
            }),
            Script::WaitForCancel => {
                token.cancelled().await;
                Err(StepError::Cancelled {
                    step: spec.step.clone(),
                })
            }
        }
    }
}
