//! Trigger endpoints

use crate::OrchestratorClient;
use crate::error::Result;
use sluice_core::domain::run::Run;
use sluice_core::dto::run::{DispatchRequest, EventAccepted};
use sluice_core::dto::webhook::EVENT_HEADER;

impl OrchestratorClient {
    /// Start a manually dispatchable workflow, optionally at `revision`
    pub async fn dispatch(&self, workflow: &str, revision: Option<String>) -> Result<Run> {
        let url = format!("{}/workflow/{}/dispatch", self.base_url, workflow);
        let response = self
            .client
            .post(&url)
            .json(&DispatchRequest { revision })
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Forward a repository-host delivery as received
    ///
    /// # Arguments
    /// * `event_name` - value of the event-name header (`push`, `pull_request`, ...)
    /// * `payload` - the delivery body
    pub async fn send_event(
        &self,
        event_name: &str,
        payload: &serde_json::Value,
    ) -> Result<EventAccepted> {
        let url = format!("{}/webhook", self.base_url);
        let response = self
            .client
            .post(&url)
            .header(EVENT_HEADER, event_name)
            .json(payload)
            .send()
            .await?;

        self.handle_response(response).await
    }
}
