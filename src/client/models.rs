//! Skytap API request and response bodies.

#![allow(missing_docs)]

use serde::{Deserialize, Deserializer, Serialize};

use crate::resolver::NamedEntity;

/// Skytap returns most identifiers as strings but a few endpoints use numbers.
fn id_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(i64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(s) => s,
        RawId::Number(n) => n.to_string(),
    })
}

/// A template from which environments are created.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Template {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub vm_count: Option<i64>,
}

impl NamedEntity for Template {
    const KIND: &'static str = "template";

    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn created_at(&self) -> Option<&str> {
        self.created_at.as_deref()
    }
}

/// Roles that can be granted automatically to new project members.
pub const PROJECT_ROLES: &[&str] = &["viewer", "participant", "editor", "manager"];

/// A project grouping environments and users.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Project {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub auto_add_role_name: Option<String>,
    #[serde(default)]
    pub show_project_members: Option<bool>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl NamedEntity for Project {
    const KIND: &'static str = "project";

    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn created_at(&self) -> Option<&str> {
        self.created_at.as_deref()
    }
}

/// Body for creating or updating a project.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProjectRequest {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// An empty string clears the role.
    pub auto_add_role_name: String,
    pub show_project_members: bool,
}

/// Network type assigned by Skytap; user-managed networks are always automatic.
pub const NETWORK_TYPE_AUTOMATIC: &str = "automatic";

/// A network attached to an environment.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Network {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub network_type: Option<String>,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub subnet: Option<String>,
    #[serde(default)]
    pub gateway: Option<String>,
    #[serde(default)]
    pub tunnelable: Option<bool>,
}

/// Body for creating or updating a network.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NetworkRequest {
    pub name: String,
    /// Only sent on create.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_type: Option<String>,
    pub domain: String,
    pub subnet: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,
    pub tunnelable: bool,
}

/// Power state of an environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Runstate {
    Running,
    Stopped,
    Suspended,
    Halted,
    Busy,
    #[serde(other)]
    Unknown,
}

impl Runstate {
    /// Skytap rejects most changes while an environment is busy.
    pub fn is_settled(self) -> bool {
        !matches!(self, Runstate::Busy)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Runstate::Running => "running",
            Runstate::Stopped => "stopped",
            Runstate::Suspended => "suspended",
            Runstate::Halted => "halted",
            Runstate::Busy => "busy",
            Runstate::Unknown => "unknown",
        }
    }
}

/// An environment (called a configuration in the Skytap API).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Environment {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub runstate: Runstate,
    #[serde(default)]
    pub outbound_traffic: Option<bool>,
    #[serde(default)]
    pub routable: Option<bool>,
    #[serde(default)]
    pub suspend_on_idle: Option<i64>,
}

/// Body for creating an environment from a template.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateEnvironmentRequest {
    pub template_id: String,
}

/// Body for updating an environment's settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UpdateEnvironmentRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outbound_traffic: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suspend_on_idle: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ids_accept_strings_and_numbers() {
        let template: Template = serde_json::from_value(json!({
            "id": "12345",
            "name": "Ubuntu",
            "created_at": "2023/06/01 00:00:00 +0000"
        }))
        .unwrap();
        assert_eq!(template.id, "12345");

        let project: Project = serde_json::from_value(json!({"id": 42, "name": "p"})).unwrap();
        assert_eq!(project.id, "42");
        assert_eq!(project.summary, None);
    }

    #[test]
    fn test_runstate_decoding() {
        let env: Environment = serde_json::from_value(json!({
            "id": "1",
            "name": "env",
            "runstate": "busy"
        }))
        .unwrap();
        assert_eq!(env.runstate, Runstate::Busy);
        assert!(!env.runstate.is_settled());

        let env: Environment = serde_json::from_value(json!({
            "id": "1",
            "name": "env",
            "runstate": "migrating"
        }))
        .unwrap();
        assert_eq!(env.runstate, Runstate::Unknown);
        assert!(env.runstate.is_settled());
    }

    #[test]
    fn test_network_request_omits_unset_fields() {
        let body = serde_json::to_value(NetworkRequest {
            name: "net".to_string(),
            network_type: None,
            domain: "example.com".to_string(),
            subnet: "10.0.0.0/24".to_string(),
            gateway: None,
            tunnelable: false,
        })
        .unwrap();

        assert!(body.get("network_type").is_none());
        assert!(body.get("gateway").is_none());
        assert_eq!(body["tunnelable"], false);
    }
}
