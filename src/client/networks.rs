use super::models::{Network, NetworkRequest};
use super::SkytapClient;
use crate::error::ApiError;

impl SkytapClient {
    /// Fetch one network of an environment.
    pub async fn get_network(&self, environment_id: &str, id: &str) -> Result<Network, ApiError> {
        self.http
            .get(
                &format!("/configurations/{}/networks/{}", environment_id, id),
                &[],
            )
            .await
    }

    /// Attach a new network to an environment.
    pub async fn create_network(
        &self,
        environment_id: &str,
        request: &NetworkRequest,
    ) -> Result<Network, ApiError> {
        self.http
            .post(
                &format!("/configurations/{}/networks", environment_id),
                Some(request),
            )
            .await
    }

    /// Update a network.
    pub async fn update_network(
        &self,
        environment_id: &str,
        id: &str,
        request: &NetworkRequest,
    ) -> Result<Network, ApiError> {
        self.http
            .put(
                &format!("/configurations/{}/networks/{}", environment_id, id),
                request,
            )
            .await
    }

    /// Remove a network from an environment.
    pub async fn delete_network(&self, environment_id: &str, id: &str) -> Result<(), ApiError> {
        self.http
            .delete(&format!("/configurations/{}/networks/{}", environment_id, id))
            .await
    }
}
