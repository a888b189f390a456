//! Orchestrator configuration

use sluice_core::domain::secret::CredentialSet;
use sluice_runner::RunnerConfig;
use std::net::SocketAddr;

use crate::repository::run::DEFAULT_RETENTION;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub main_branch: String,
    pub run_retention: usize,
    pub credentials: CredentialSet,
    pub runner: RunnerConfig,
}

impl Config {
    /// Creates configuration from environment variables
    ///
    /// - SLUICE_BIND_ADDR (default: 0.0.0.0:8080)
    /// - SLUICE_MAIN_BRANCH (default: main)
    /// - SLUICE_RUN_RETENTION (default: 1000)
    /// - FAL_KEY_ID, FAL_KEY_SECRET: platform credentials, read once here
    /// - everything [`RunnerConfig::from_env`] reads
    pub fn from_env() -> anyhow::Result<Self> {
        let bind_addr =
            std::env::var("SLUICE_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
        let main_branch =
            std::env::var("SLUICE_MAIN_BRANCH").unwrap_or_else(|_| "main".to_string());
        let run_retention = match std::env::var("SLUICE_RUN_RETENTION") {
            Ok(value) => value
                .parse()
                .map_err(|e| anyhow::anyhow!("invalid SLUICE_RUN_RETENTION '{}': {}", value, e))?,
            Err(_) => DEFAULT_RETENTION,
        };

        Ok(Self {
            bind_addr,
            main_branch,
            run_retention,
            credentials: CredentialSet::from_env(),
            runner: RunnerConfig::from_env()?,
        })
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.bind_addr
            .parse::<SocketAddr>()
            .map_err(|e| anyhow::anyhow!("invalid bind address '{}': {}", self.bind_addr, e))?;

        if self.main_branch.trim().is_empty() {
            anyhow::bail!("main_branch cannot be empty");
        }

        if self.run_retention == 0 {
            anyhow::bail!("run_retention must be greater than 0");
        }

        self.runner.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            bind_addr: "127.0.0.1:8080".to_string(),
            main_branch: "main".to_string(),
            run_retention: DEFAULT_RETENTION,
            credentials: CredentialSet::new(),
            runner: RunnerConfig::default(),
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(config().validate().is_ok());
    }

    #[test]
    fn test_invalid_bind_addr() {
        let mut config = config();
        config.bind_addr = "localhost".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_main_branch() {
        let mut config = config();
        config.main_branch = " ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_retention() {
        let mut config = config();
        config.run_retention = 0;
        assert!(config.validate().is_err());
    }
}
