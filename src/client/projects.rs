use tracing::debug;

use super::models::{Environment, Project, ProjectRequest};
use super::SkytapClient;
use crate::error::ApiError;

impl SkytapClient {
    /// List every project visible to the account.
    pub async fn list_projects(&self) -> Result<Vec<Project>, ApiError> {
        let projects: Vec<Project> = self.list_all("/v2/projects").await?;
        debug!(count = projects.len(), "projects listed");
        Ok(projects)
    }

    /// Fetch one project.
    pub async fn get_project(&self, id: &str) -> Result<Project, ApiError> {
        self.http.get(&format!("/projects/{}", id), &[]).await
    }

    /// Create a project.
    pub async fn create_project(&self, request: &ProjectRequest) -> Result<Project, ApiError> {
        self.http.post("/projects", Some(request)).await
    }

    /// Update a project's settings.
    pub async fn update_project(
        &self,
        id: &str,
        request: &ProjectRequest,
    ) -> Result<Project, ApiError> {
        self.http.put(&format!("/projects/{}", id), request).await
    }

    /// Delete a project. Environments in it are not deleted.
    pub async fn delete_project(&self, id: &str) -> Result<(), ApiError> {
        self.http.delete(&format!("/projects/{}", id)).await
    }

    /// Environments that belong to a project.
    pub async fn list_project_environments(&self, id: &str) -> Result<Vec<Environment>, ApiError> {
        let environments: Vec<Environment> = self
            .list_all(&format!("/projects/{}/configurations", id))
            .await?;
        debug!(project = id, count = environments.len(), "project environments listed");
        Ok(environments)
    }

    /// Add an environment to a project.
    pub async fn add_project_environment(
        &self,
        id: &str,
        environment_id: &str,
    ) -> Result<(), ApiError> {
        self.http
            .post_empty(&format!("/projects/{}/configurations/{}", id, environment_id))
            .await
    }

    /// Remove an environment from a project.
    pub async fn remove_project_environment(
        &self,
        id: &str,
        environment_id: &str,
    ) -> Result<(), ApiError> {
        self.http
            .delete(&format!("/projects/{}/configurations/{}", id, environment_id))
            .await
    }
}
