use super::models::{CreateEnvironmentRequest, Environment, UpdateEnvironmentRequest};
use super::SkytapClient;
use crate::error::ApiError;

impl SkytapClient {
    /// Fetch one environment.
    pub async fn get_environment(&self, id: &str) -> Result<Environment, ApiError> {
        self.http.get(&format!("/configurations/{}", id), &[]).await
    }

    /// Create an environment from a template.
    pub async fn create_environment(
        &self,
        request: &CreateEnvironmentRequest,
    ) -> Result<Environment, ApiError> {
        self.http.post("/configurations", Some(request)).await
    }

    /// Update an environment's settings.
    pub async fn update_environment(
        &self,
        id: &str,
        request: &UpdateEnvironmentRequest,
    ) -> Result<Environment, ApiError> {
        self.http
            .put(&format!("/configurations/{}", id), request)
            .await
    }

    /// Delete an environment and its VMs.
    pub async fn delete_environment(&self, id: &str) -> Result<(), ApiError> {
        self.http.delete(&format!("/configurations/{}", id)).await
    }
}
