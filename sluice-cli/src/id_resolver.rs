//! ID resolver module
//!
//! Resolves run ID prefixes to full UUIDs by listing runs from the API.

use anyhow::{Context, Result, anyhow};
use sluice_client::OrchestratorClient;
use uuid::Uuid;

use crate::types::IdOrPrefix;

/// Resolve a run ID or unambiguous prefix to a full UUID
pub async fn resolve_run_id(client: &OrchestratorClient, id: &str) -> Result<Uuid> {
    let id_or_prefix = IdOrPrefix::parse(id);

    if let Some(uuid) = id_or_prefix.as_uuid() {
        return Ok(uuid);
    }

    let runs = client
        .list_runs()
        .await
        .context("Failed to fetch runs for ID resolution")?;

    match_prefix(runs.iter().map(|r| r.id), &id_or_prefix.to_string())
}

fn match_prefix(ids: impl Iterator<Item = Uuid>, prefix: &str) -> Result<Uuid> {
    let matches: Vec<Uuid> = ids
        .filter(|id| id.to_string().starts_with(prefix))
        .collect();

    match matches.as_slice() {
        [] => Err(anyhow!("No run found with ID starting with '{}'", prefix)),
        [id] => Ok(*id),
        _ => {
            let ids: Vec<String> = matches.iter().map(Uuid::to_string).collect();
            Err(anyhow!(
                "Ambiguous prefix '{}' matches multiple runs: {}",
                prefix,
                ids.join(", ")
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(value: &str) -> Uuid {
        Uuid::parse_str(value).unwrap()
    }

    #[test]
    fn test_match_prefix() {
        let ids = [
            id("3f2a0000-0000-4000-8000-000000000001"),
            id("3f2b0000-0000-4000-8000-000000000002"),
        ];

        assert_eq!(match_prefix(ids.into_iter(), "3f2a").unwrap(), ids[0]);

        let err = match_prefix(ids.into_iter(), "3f2").unwrap_err();
        assert!(err.to_string().contains("Ambiguous"));

        let err = match_prefix(ids.into_iter(), "ffff").unwrap_err();
        assert!(err.to_string().contains("No run found"));
    }
}
