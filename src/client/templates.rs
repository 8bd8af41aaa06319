use tracing::debug;

use super::models::Template;
use super::SkytapClient;
use crate::error::ApiError;

impl SkytapClient {
    /// List every template visible to the account.
    pub async fn list_templates(&self) -> Result<Vec<Template>, ApiError> {
        let templates: Vec<Template> = self.list_all("/v2/templates").await?;
        debug!(count = templates.len(), "templates listed");
        Ok(templates)
    }
}
