//! Error types for the Skytap provider.
//!
//! Three layers of errors exist:
//!
//! - [`ResolveError`]: name lookups that could not pick exactly one entity.
//! - [`ApiError`]: failures talking to the Skytap REST API.
//! - [`ProviderError`]: what provider operations return to the plugin host.

#![warn(missing_docs)]

use thiserror::Error;

/// Failure of a provider operation.
///
/// Never sent as a gRPC status: the server turns it into an error
/// diagnostic whose summary is the `Display` text.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The remote object does not exist.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Configuration or lookup input was rejected.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A Skytap API failure with no more specific variant.
    #[error("Skytap API error: {0}")]
    Api(String),

    /// The provider block is missing, incomplete, or not applied yet.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// No resource or data source is registered under this type name.
    #[error("Unknown resource type: {0}")]
    UnknownResource(String),

    /// State could not be converted to or from JSON.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Skytap reported a conflict with an existing object.
    #[error("Resource already exists: {0}")]
    AlreadyExists(String),

    /// Skytap rejected the credentials.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Rate limited, and retries ran out.
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Skytap answered with a server error.
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// An operation's `timeouts` value elapsed while polling.
    #[error("Deadline exceeded: {0}")]
    DeadlineExceeded(String),

    /// The object is busy or the lookup was ambiguous.
    #[error("Failed precondition: {0}")]
    FailedPrecondition(String),

    /// The operation is not supported by this resource type.
    #[error("Unimplemented: {0}")]
    Unimplemented(String),

    /// Malformed state, import id, or request body.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Create made the remote object, then a later step failed. `state`
    /// records what exists so the host can keep tracking it.
    #[error("{source}")]
    Incomplete {
        /// State of the object as far as it got.
        state: serde_json::Value,
        /// The step that failed.
        source: Box<ProviderError>,
    },
}

impl ProviderError {
    /// Wrap `err` with the state of an object that was already created.
    pub fn incomplete(state: serde_json::Value, err: ProviderError) -> Self {
        Self::Incomplete {
            state,
            source: Box::new(err),
        }
    }

    /// The failure behind an [`Incomplete`](Self::Incomplete) create, or
    /// `self` for every other variant.
    pub fn cause(&self) -> &ProviderError {
        match self {
            Self::Incomplete { source, .. } => source.cause(),
            other => other,
        }
    }
}

/// Errors produced when resolving a name pattern to a single entity.
///
/// None of these are retryable: they describe the caller's input or the
/// current contents of the account, not a transient failure.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The name pattern is not a valid regular expression.
    #[error("invalid name pattern '{pattern}': {source}")]
    InvalidPattern {
        /// The pattern as supplied.
        pattern: String,
        /// The regex compilation error.
        #[source]
        source: regex::Error,
    },

    /// No entity name matched the pattern.
    #[error("no {kind} found with name {pattern}")]
    NotFound {
        /// The kind of entity searched for (e.g. `template`).
        kind: &'static str,
        /// The pattern as supplied.
        pattern: String,
    },

    /// Several entities matched and most-recent selection was not requested.
    #[error(
        "your query returned more than one result ({count} {kind}s match '{pattern}'). \
         Please try a more specific search criteria, or set `most_recent` attribute to true"
    )]
    Ambiguous {
        /// The kind of entity searched for.
        kind: &'static str,
        /// The pattern as supplied.
        pattern: String,
        /// How many entities matched.
        count: usize,
    },
}

impl From<ResolveError> for ProviderError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::InvalidPattern { .. } => ProviderError::Validation(err.to_string()),
            ResolveError::NotFound { .. } => ProviderError::NotFound(err.to_string()),
            ResolveError::Ambiguous { .. } => ProviderError::FailedPrecondition(err.to_string()),
        }
    }
}

/// Errors returned by the Skytap API client.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The API answered with a non-success status.
    #[error("Skytap API returned {status}: {message}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Error message extracted from the response body.
        message: String,
    },

    /// The request never produced a response.
    #[error("request to Skytap failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The response body was not the JSON we expected.
    #[error("failed to decode Skytap response: {0}")]
    Decode(#[from] serde_json::Error),

    /// A request URL could not be built.
    #[error("invalid Skytap URL: {0}")]
    Url(#[from] url::ParseError),
}

impl ApiError {
    /// The HTTP status, if the API produced one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the API reported the object as missing.
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

impl From<ApiError> for ProviderError {
    fn from(err: ApiError) -> Self {
        let msg = err.to_string();
        match err.status() {
            Some(404) => ProviderError::NotFound(msg),
            Some(401) | Some(403) => ProviderError::PermissionDenied(msg),
            Some(409) => ProviderError::AlreadyExists(msg),
            Some(423) => ProviderError::FailedPrecondition(msg),
            Some(429) => ProviderError::ResourceExhausted(msg),
            Some(400) | Some(422) => ProviderError::InvalidRequest(msg),
            Some(s) if s >= 500 => ProviderError::Unavailable(msg),
            _ => ProviderError::Api(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProviderError::NotFound("network-123".to_string());
        assert_eq!(format!("{}", err), "Resource not found: network-123");

        let err = ProviderError::Validation("invalid input".to_string());
        assert_eq!(format!("{}", err), "Validation error: invalid input");

        let err = ProviderError::UnknownResource("skytap_vm".to_string());
        assert_eq!(format!("{}", err), "Unknown resource type: skytap_vm");
    }

    #[test]
    fn test_incomplete_keeps_state_and_cause() {
        let err = ProviderError::incomplete(
            serde_json::json!({"id": "9", "environment_id": "123"}),
            ProviderError::DeadlineExceeded("waiting for environment 123".to_string()),
        );
        assert_eq!(err.to_string(), "Deadline exceeded: waiting for environment 123");
        assert!(matches!(err.cause(), ProviderError::DeadlineExceeded(_)));
        match &err {
            ProviderError::Incomplete { state, .. } => assert_eq!(state["id"], "9"),
            other => panic!("unexpected {:?}", other),
        }

        let plain = ProviderError::NotFound("x".to_string());
        assert!(matches!(plain.cause(), ProviderError::NotFound(_)));
    }

    #[test]
    fn test_resolve_error_messages() {
        let err = ResolveError::NotFound {
            kind: "template",
            pattern: "Ubuntu".to_string(),
        };
        assert_eq!(err.to_string(), "no template found with name Ubuntu");

        let err = ResolveError::Ambiguous {
            kind: "template",
            pattern: "Ubuntu".to_string(),
            count: 2,
        };
        let msg = err.to_string();
        assert!(msg.contains("more than one result"));
        assert!(msg.contains("most_recent"));
    }

    #[test]
    fn test_resolve_error_to_provider_error() {
        let err: ProviderError = ResolveError::NotFound {
            kind: "project",
            pattern: "x".to_string(),
        }
        .into();
        assert!(matches!(err, ProviderError::NotFound(_)));

        let err: ProviderError = ResolveError::Ambiguous {
            kind: "project",
            pattern: "x".to_string(),
            count: 3,
        }
        .into();
        assert!(matches!(err, ProviderError::FailedPrecondition(_)));
    }

    #[test]
    fn test_api_error_mapping() {
        let not_found = ApiError::Http {
            status: 404,
            message: "gone".to_string(),
        };
        assert!(not_found.is_not_found());
        assert!(matches!(
            ProviderError::from(not_found),
            ProviderError::NotFound(_)
        ));

        let busy = ApiError::Http {
            status: 423,
            message: "environment is busy".to_string(),
        };
        assert!(!busy.is_not_found());
        assert!(matches!(
            ProviderError::from(busy),
            ProviderError::FailedPrecondition(_)
        ));

        let denied = ApiError::Http {
            status: 401,
            message: "bad token".to_string(),
        };
        assert!(matches!(
            ProviderError::from(denied),
            ProviderError::PermissionDenied(_)
        ));

        let outage = ApiError::Http {
            status: 503,
            message: "maintenance".to_string(),
        };
        assert!(matches!(
            ProviderError::from(outage),
            ProviderError::Unavailable(_)
        ));
    }
}
