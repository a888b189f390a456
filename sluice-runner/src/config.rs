//! Runner configuration
//!
//! Defines everything a run needs to know about its environment: where the
//! repository lives, how the Python toolchain is provisioned, what gets
//! deployed, and the (opt-in) retry and timeout policy.

use anyhow::Context;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::platform::{AuthMode, ServeTarget};
use crate::step::RetryPolicy;

/// Runner configuration
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Directory under which each run gets its own workspace
    pub workspace_base: PathBuf,

    /// Git URL or local path of the repository to check out
    pub repository: String,

    /// Pinned language runtime version
    pub python_version: String,

    /// Interpreter used to create the run's virtual environment
    pub python: String,

    /// Development dependency manifest, relative to the checkout
    pub dev_requirements: String,

    /// Test collection directory, relative to the checkout
    pub tests_dir: String,

    /// Serverless platform CLI, resolved inside the run's virtual environment
    pub platform_bin: String,

    /// What the deployment pipeline publishes
    pub deploy: DeploySettings,

    /// Retries for provisioning steps (0 = fail on first error)
    pub provision_retries: u32,

    /// Retries for platform calls during deployment (0 = fail on first error)
    pub deploy_retries: u32,

    /// Delay before the first retry; doubled for each further attempt
    pub retry_backoff: Duration,

    /// Upper bound for a single step, if any
    pub step_timeout: Option<Duration>,
}

/// Deployment target and alias settings
#[derive(Debug, Clone)]
pub struct DeploySettings {
    pub module_path: String,
    pub entry_point: String,
    pub alias: String,
    pub keep_alive_seconds: u64,
    pub auth: AuthMode,
}

impl DeploySettings {
    pub fn serve_target(&self) -> ServeTarget {
        ServeTarget {
            module_path: self.module_path.clone(),
            entry_point: self.entry_point.clone(),
            alias: self.alias.clone(),
            auth: self.auth,
        }
    }
}

impl Default for DeploySettings {
    fn default() -> Self {
        Self {
            module_path: "text_to_image/model.py".to_string(),
            entry_point: "generate_image".to_string(),
            alias: "lora".to_string(),
            keep_alive_seconds: 60,
            auth: AuthMode::Shared,
        }
    }
}

impl RunnerConfig {
    /// Creates a configuration with defaults for the given repository
    pub fn new(repository: impl Into<String>) -> Self {
        let python_version = "3.11".to_string();
        Self {
            workspace_base: std::env::temp_dir().join("sluice"),
            repository: repository.into(),
            python: format!("python{}", python_version),
            python_version,
            dev_requirements: "requirements-dev.txt".to_string(),
            tests_dir: "tests".to_string(),
            platform_bin: "fal".to_string(),
            deploy: DeploySettings::default(),
            provision_retries: 0,
            deploy_retries: 0,
            retry_backoff: Duration::from_millis(1000),
            step_timeout: None,
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables (all optional):
    /// - SLUICE_REPOSITORY (default: current directory)
    /// - SLUICE_WORKSPACE_BASE (default: <tmp>/sluice)
    /// - SLUICE_PYTHON_VERSION (default: 3.11)
    /// - SLUICE_PYTHON (default: python<version>)
    /// - SLUICE_DEV_REQUIREMENTS (default: requirements-dev.txt)
    /// - SLUICE_TESTS_DIR (default: tests)
    /// - SLUICE_PLATFORM_BIN (default: fal)
    /// - SLUICE_DEPLOY_MODULE, SLUICE_DEPLOY_ENTRY_POINT, SLUICE_DEPLOY_ALIAS,
    ///   SLUICE_DEPLOY_KEEP_ALIVE (seconds), SLUICE_DEPLOY_AUTH (shared|private)
    /// - SLUICE_PROVISION_RETRIES, SLUICE_DEPLOY_RETRIES (default: 0)
    /// - SLUICE_RETRY_BACKOFF_MS (default: 1000)
    /// - SLUICE_STEP_TIMEOUT (seconds, default: none)
    pub fn from_env() -> anyhow::Result<Self> {
        let repository = std::env::var("SLUICE_REPOSITORY").unwrap_or_else(|_| ".".to_string());
        let mut config = Self::new(repository);

        if let Ok(base) = std::env::var("SLUICE_WORKSPACE_BASE") {
            config.workspace_base = PathBuf::from(base);
        }

        if let Ok(version) = std::env::var("SLUICE_PYTHON_VERSION") {
            config.python = format!("python{}", version);
            config.python_version = version;
        }

        if let Ok(python) = std::env::var("SLUICE_PYTHON") {
            config.python = python;
        }

        if let Ok(requirements) = std::env::var("SLUICE_DEV_REQUIREMENTS") {
            config.dev_requirements = requirements;
        }

        if let Ok(tests_dir) = std::env::var("SLUICE_TESTS_DIR") {
            config.tests_dir = tests_dir;
        }

        if let Ok(bin) = std::env::var("SLUICE_PLATFORM_BIN") {
            config.platform_bin = bin;
        }

        if let Ok(module) = std::env::var("SLUICE_DEPLOY_MODULE") {
            config.deploy.module_path = module;
        }

        if let Ok(entry_point) = std::env::var("SLUICE_DEPLOY_ENTRY_POINT") {
            config.deploy.entry_point = entry_point;
        }

        if let Ok(alias) = std::env::var("SLUICE_DEPLOY_ALIAS") {
            config.deploy.alias = alias;
        }

        if let Some(keep_alive) = parse_var::<u64>("SLUICE_DEPLOY_KEEP_ALIVE")? {
            config.deploy.keep_alive_seconds = keep_alive;
        }

        if let Some(auth) = parse_var::<AuthMode>("SLUICE_DEPLOY_AUTH")? {
            config.deploy.auth = auth;
        }

        if let Some(retries) = parse_var::<u32>("SLUICE_PROVISION_RETRIES")? {
            config.provision_retries = retries;
        }

        if let Some(retries) = parse_var::<u32>("SLUICE_DEPLOY_RETRIES")? {
            config.deploy_retries = retries;
        }

        if let Some(backoff) = parse_var::<u64>("SLUICE_RETRY_BACKOFF_MS")? {
            config.retry_backoff = Duration::from_millis(backoff);
        }

        config.step_timeout = parse_var::<u64>("SLUICE_STEP_TIMEOUT")?.map(Duration::from_secs);

        Ok(config)
    }

    /// Retry policy applied to provisioning steps
    pub fn provision_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.provision_retries, self.retry_backoff)
    }

    /// Retry policy applied to platform calls
    pub fn deploy_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.deploy_retries, self.retry_backoff)
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.repository.is_empty() {
            anyhow::bail!("repository cannot be empty");
        }

        if self.python_version.is_empty() || self.python.is_empty() {
            anyhow::bail!("python runtime cannot be empty");
        }

        if self.dev_requirements.is_empty() {
            anyhow::bail!("dev_requirements cannot be empty");
        }

        if self.tests_dir.is_empty() {
            anyhow::bail!("tests_dir cannot be empty");
        }

        if self.platform_bin.is_empty() {
            anyhow::bail!("platform_bin cannot be empty");
        }

        if self.deploy.alias.is_empty() {
            anyhow::bail!("deploy alias cannot be empty");
        }

        if self.deploy.module_path.is_empty() || self.deploy.entry_point.is_empty() {
            anyhow::bail!("deploy module and entry point cannot be empty");
        }

        if (self.provision_retries > 0 || self.deploy_retries > 0) && self.retry_backoff.is_zero()
        {
            anyhow::bail!("retry_backoff must be greater than 0 when retries are enabled");
        }

        if let Some(timeout) = self.step_timeout {
            if timeout.is_zero() {
                anyhow::bail!("step_timeout must be greater than 0");
            }
        }

        Ok(())
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self::new(".")
    }
}

fn parse_var<T>(name: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("{}", e))
            .with_context(|| format!("Invalid value for {}: '{}'", name, raw)),
        Err(_) => Ok(None),
    }
}
