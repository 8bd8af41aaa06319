//! Configuration validation.
//!
//! [`validate`] checks a JSON configuration against a [`Schema`]: required
//! attributes, attribute types, and required blocks. The value validators
//! at the bottom of the module ([`cidr_network`], [`domain_name`], ...) cover
//! the Skytap-specific rules that a type alone cannot express.
//!
//! # Example
//!
//! ```
//! use skytap_provider::schema::{Attribute, Schema};
//! use skytap_provider::validation::validate;
//! use serde_json::json;
//!
//! let schema = Schema::v0()
//!     .with_attribute("name", Attribute::required_string())
//!     .with_attribute("tunnelable", Attribute::optional_bool());
//!
//! assert!(validate(&schema, &json!({"name": "net"})).is_empty());
//!
//! let diagnostics = validate(&schema, &json!({"name": "net", "tunnelable": "yes"}));
//! assert_eq!(diagnostics.len(), 1);
//! assert_eq!(diagnostics[0].attribute, Some("tunnelable".to_string()));
//! ```

use std::net::IpAddr;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::schema::{AttributeType, Block, Diagnostic, Schema};

/// Check `config` against `schema`.
///
/// Read-only attributes are skipped since Skytap fills them in. Null and
/// absent are treated alike.
pub fn validate(schema: &Schema, config: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    check_block(&schema.block, config, None, &mut diagnostics);
    diagnostics
}

/// [`validate`], as a `Result`.
pub fn validate_result(schema: &Schema, config: &Value) -> Result<(), Vec<Diagnostic>> {
    let diagnostics = validate(schema, config);
    if diagnostics.is_empty() {
        Ok(())
    } else {
        Err(diagnostics)
    }
}

pub fn is_valid(schema: &Schema, config: &Value) -> bool {
    validate(schema, config).is_empty()
}

fn check_block(block: &Block, value: &Value, at: Option<&str>, out: &mut Vec<Diagnostic>) {
    let object = match value {
        Value::Object(object) => object,
        Value::Null => return,
        other => {
            let mut diag = Diagnostic::error("Expected object")
                .with_detail(format!("Got {}", kind_of(other)));
            if let Some(at) = at {
                diag = diag.with_attribute(at);
            }
            out.push(diag);
            return;
        },
    };

    for (name, attr) in &block.attributes {
        if attr.flags.is_read_only() {
            continue;
        }
        let path = child_path(at, name);
        match object.get(name).filter(|v| !v.is_null()) {
            Some(v) => check_type(&attr.attr_type, v, &path, out),
            None if attr.flags.required => out.push(
                Diagnostic::error(format!("Missing required attribute '{}'", path))
                    .with_attribute(path),
            ),
            None => {},
        }
    }

    for (name, nested) in &block.blocks {
        let path = child_path(at, name);
        match object.get(name).filter(|v| !v.is_null()) {
            Some(v) => check_block(&nested.block, v, Some(&path), out),
            None if nested.required => out.push(
                Diagnostic::error(format!("Missing required block '{}'", path))
                    .with_attribute(path),
            ),
            None => {},
        }
    }
}

fn check_type(expected: &AttributeType, value: &Value, path: &str, out: &mut Vec<Diagnostic>) {
    let ok = match expected {
        AttributeType::String => value.is_string(),
        AttributeType::Int64 => is_int64(value),
        AttributeType::Bool => value.is_boolean(),
        AttributeType::Set(element) => {
            let Some(items) = value.as_array() else {
                out.push(type_error(path, "set", value));
                return;
            };
            for (i, item) in items.iter().enumerate() {
                let item_path = format!("{}.{}", path, i);
                check_type(element, item, &item_path, out);
                if items[..i].contains(item) {
                    out.push(
                        Diagnostic::error(format!("Duplicate value in set '{}'", path))
                            .with_detail(format!("{} appears more than once", item))
                            .with_attribute(item_path),
                    );
                }
            }
            return;
        },
    };
    if !ok {
        let name = match expected {
            AttributeType::String => "string",
            AttributeType::Int64 => "int64",
            _ => "bool",
        };
        out.push(type_error(path, name, value));
    }
}

fn child_path(parent: Option<&str>, name: &str) -> String {
    match parent {
        Some(parent) => format!("{}.{}", parent, name),
        None => name.to_string(),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// Whole-valued floats such as `3600.0` are accepted.
fn is_int64(value: &Value) -> bool {
    let Value::Number(n) = value else {
        return false;
    };
    n.is_i64()
        || n.as_f64()
            .is_some_and(|f| f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64)
}

fn type_error(path: &str, expected: &str, got: &Value) -> Diagnostic {
    Diagnostic::error(format!("Invalid type for attribute '{}'", path))
        .with_detail(format!("Expected {}, got {}", expected, kind_of(got)))
        .with_attribute(path)
}

/// Read a string attribute out of a configuration object.
pub fn string_attr<'a>(config: &'a Value, name: &str) -> Option<&'a str> {
    config.get(name).and_then(Value::as_str)
}

/// The string must be between `min` and `max` characters long, inclusive.
pub fn string_len_between(path: &str, value: &str, min: usize, max: usize) -> Option<Diagnostic> {
    let len = value.chars().count();
    if (min..=max).contains(&len) {
        return None;
    }
    Some(
        Diagnostic::error(format!("Invalid length for attribute '{}'", path))
            .with_detail(format!(
                "expected length to be in the range ({} - {}), got {}",
                min, max, len
            ))
            .with_attribute(path),
    )
}

/// The string must not be empty.
pub fn not_empty(path: &str, value: &str) -> Option<Diagnostic> {
    if !value.is_empty() {
        return None;
    }
    Some(Diagnostic::error(format!("Attribute '{}' must not be empty", path)).with_attribute(path))
}

/// The string must be one of `allowed`.
pub fn one_of(path: &str, value: &str, allowed: &[&str]) -> Option<Diagnostic> {
    if allowed.contains(&value) {
        return None;
    }
    Some(
        Diagnostic::error(format!("Invalid value for attribute '{}'", path))
            .with_detail(format!("expected one of {:?}, got {:?}", allowed, value))
            .with_attribute(path),
    )
}

/// The string must parse as an IPv4 or IPv6 address.
pub fn ip_address(path: &str, value: &str) -> Option<Diagnostic> {
    match value.parse::<IpAddr>() {
        Ok(_) => None,
        Err(_) => Some(
            Diagnostic::error(format!("Invalid IP address for attribute '{}'", path))
                .with_detail(format!("{:?} is not a valid IP address", value))
                .with_attribute(path),
        ),
    }
}

/// The string must be a network address in CIDR notation with a prefix
/// length between `min_prefix` and `max_prefix`.
///
/// Host bits must be zero: `10.0.0.0/24` passes, `10.0.0.1/24` does not.
pub fn cidr_network(path: &str, value: &str, min_prefix: u8, max_prefix: u8) -> Option<Diagnostic> {
    let invalid = |detail: String| {
        Some(
            Diagnostic::error(format!("Invalid network for attribute '{}'", path))
                .with_detail(detail)
                .with_attribute(path),
        )
    };

    let Some((addr, prefix)) = value.split_once('/') else {
        return invalid(format!("{:?} is not in CIDR notation", value));
    };
    let (Ok(addr), Ok(prefix)) = (addr.parse::<IpAddr>(), prefix.parse::<u8>()) else {
        return invalid(format!("{:?} is not a valid CIDR", value));
    };

    let is_network = match addr {
        IpAddr::V4(v4) if prefix <= 32 => {
            let mask = u32::MAX.checked_shl(32 - u32::from(prefix)).unwrap_or(0);
            u32::from(v4) & !mask == 0
        },
        IpAddr::V6(v6) if prefix <= 128 => {
            let mask = u128::MAX.checked_shl(128 - u32::from(prefix)).unwrap_or(0);
            u128::from(v6) & !mask == 0
        },
        _ => return invalid(format!("{:?} has an out of range prefix", value)),
    };

    if !is_network {
        return invalid(format!("{:?} is not a network address", value));
    }
    if prefix < min_prefix || prefix > max_prefix {
        return invalid(format!(
            "expected prefix length between {} and {}, got {}",
            min_prefix, max_prefix, prefix
        ));
    }
    None
}

const DOMAIN_PATTERN: &str =
    r"^(?:[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?\.)+[a-z0-9][a-z0-9-]{0,61}[a-z0-9]$";

fn domain_regex() -> Result<&'static Regex, &'static regex::Error> {
    static DOMAIN: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    DOMAIN.get_or_init(|| Regex::new(DOMAIN_PATTERN)).as_ref()
}

/// The string must look like a DNS domain: 1 to 64 characters of lowercase
/// labels separated by periods.
pub fn domain_name(path: &str, value: &str) -> Option<Diagnostic> {
    if let Some(diag) = string_len_between(path, value, 1, 64) {
        return Some(diag);
    }
    let matches = match domain_regex() {
        Ok(re) => re.is_match(value),
        Err(e) => {
            return Some(
                Diagnostic::error("Domain pattern failed to compile").with_detail(e.to_string()),
            )
        },
    };
    if matches {
        return None;
    }
    Some(
        Diagnostic::error(format!("Invalid domain for attribute '{}'", path))
            .with_detail(
                "Valid characters are lowercase letters, numbers, and hyphens. Cannot be blank, \
                 must not begin or end with a period, and must start and end with a letter or number",
            )
            .with_attribute(path),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::models::PROJECT_ROLES;
    use crate::schema::{Attribute, AttributeFlags, NestedBlock};
    use serde_json::json;

    fn network_schema() -> Schema {
        Schema::v0()
            .with_attribute("environment_id", Attribute::required_string())
            .with_attribute("name", Attribute::required_string())
            .with_attribute("tunnelable", Attribute::optional_bool())
            .with_attribute("id", Attribute::computed_string())
    }

    #[test]
    fn test_validate_required_string() {
        let schema = network_schema();

        assert!(validate(&schema, &json!({"environment_id": "1", "name": "net"})).is_empty());

        let diagnostics = validate(&schema, &json!({"environment_id": "1"}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute, Some("name".to_string()));

        let diagnostics = validate(&schema, &json!({"environment_id": "1", "name": null}));
        assert_eq!(diagnostics.len(), 1);

        let diagnostics = validate(&schema, &json!({"environment_id": "1", "name": 123}));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("Invalid type"));
    }

    #[test]
    fn test_validate_optional_and_computed() {
        let schema = network_schema();
        let base = json!({"environment_id": "1", "name": "net"});
        assert!(validate(&schema, &base).is_empty());

        let diagnostics = validate(
            &schema,
            &json!({"environment_id": "1", "name": "net", "tunnelable": "yes"}),
        );
        assert_eq!(diagnostics.len(), 1);

        // computed-only attributes are never checked
        assert!(validate(&schema, &json!({"environment_id": "1", "name": "n", "id": 5})).is_empty());
    }

    #[test]
    fn test_validate_int64() {
        let schema = Schema::v0().with_attribute(
            "suspend_on_idle",
            Attribute::new(AttributeType::Int64, AttributeFlags::required()),
        );

        assert!(validate(&schema, &json!({"suspend_on_idle": 3600})).is_empty());
        assert!(validate(&schema, &json!({"suspend_on_idle": 3600.0})).is_empty());
        assert_eq!(validate(&schema, &json!({"suspend_on_idle": 1.5})).len(), 1);
        assert_eq!(validate(&schema, &json!({"suspend_on_idle": "3600"})).len(), 1);
    }

    #[test]
    fn test_validate_set() {
        let schema = Schema::v0().with_attribute(
            "environment_ids",
            Attribute::new(
                AttributeType::set(AttributeType::String),
                AttributeFlags::optional(),
            ),
        );

        assert!(validate(&schema, &json!({"environment_ids": ["1", "2"]})).is_empty());
        assert!(validate(&schema, &json!({"environment_ids": []})).is_empty());

        let diagnostics = validate(&schema, &json!({"environment_ids": ["1", 2]}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute, Some("environment_ids.1".to_string()));

        let diagnostics = validate(&schema, &json!({"environment_ids": ["1", "1"]}));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("Duplicate"));

        assert_eq!(validate(&schema, &json!({"environment_ids": "1"})).len(), 1);
    }

    #[test]
    fn test_validate_timeouts_block() {
        let schema = Schema::v0().with_block(
            "timeouts",
            NestedBlock::single(
                Block::new()
                    .with_attribute("create", Attribute::optional_string())
                    .with_attribute("delete", Attribute::optional_string()),
            ),
        );

        assert!(validate(&schema, &json!({"timeouts": {"create": "5m"}})).is_empty());
        assert!(validate(&schema, &json!({})).is_empty());

        let diagnostics = validate(&schema, &json!({"timeouts": {"create": 300}}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute, Some("timeouts.create".to_string()));

        let diagnostics = validate(&schema, &json!({"timeouts": "5m"}));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("Expected object"));
    }

    #[test]
    fn test_validate_required_block() {
        let schema = Schema::v0().with_block(
            "timeouts",
            NestedBlock::single(Block::new().with_attribute("create", Attribute::optional_string()))
                .required(),
        );

        assert!(validate(&schema, &json!({"timeouts": {}})).is_empty());
        let diagnostics = validate(&schema, &json!({}));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("Missing required block"));
    }

    #[test]
    fn test_result_helpers() {
        let schema = network_schema();
        let good = json!({"environment_id": "1", "name": "net"});

        assert!(is_valid(&schema, &good));
        assert!(!is_valid(&schema, &json!({})));
        assert!(validate_result(&schema, &good).is_ok());
        assert_eq!(validate_result(&schema, &json!({})).unwrap_err().len(), 2);
    }

    #[test]
    fn test_validate_root_not_object() {
        let diagnostics = validate(&network_schema(), &json!("not an object"));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("Expected object"));
        assert_eq!(diagnostics[0].attribute, None);
    }

    #[test]
    fn test_string_len_between() {
        assert!(string_len_between("name", "a", 1, 255).is_none());
        assert!(string_len_between("name", &"a".repeat(255), 1, 255).is_none());
        assert!(string_len_between("name", "", 1, 255).is_some());

        let diag = string_len_between("name", &"a".repeat(256), 1, 255).unwrap();
        assert_eq!(diag.attribute.as_deref(), Some("name"));
        assert!(diag.detail.unwrap().contains("got 256"));
    }

    #[test]
    fn test_not_empty_and_one_of() {
        assert!(not_empty("name", "x").is_none());
        assert!(not_empty("name", "").is_some());

        for role in PROJECT_ROLES {
            assert!(one_of("auto_add_role_name", role, PROJECT_ROLES).is_none());
        }
        assert!(one_of("auto_add_role_name", "owner", PROJECT_ROLES).is_some());
        assert!(one_of("auto_add_role_name", "Viewer", PROJECT_ROLES).is_some());
    }

    #[test]
    fn test_ip_address() {
        assert!(ip_address("gateway", "10.0.0.254").is_none());
        assert!(ip_address("gateway", "fe80::1").is_none());
        assert!(ip_address("gateway", "10.0.0.256").is_some());
        assert!(ip_address("gateway", "gateway").is_some());
    }

    #[test]
    fn test_cidr_network() {
        assert!(cidr_network("subnet", "10.0.0.0/24", 16, 29).is_none());
        assert!(cidr_network("subnet", "192.168.0.0/16", 16, 29).is_none());
        assert!(cidr_network("subnet", "10.0.0.8/29", 16, 29).is_none());

        // host bits set
        assert!(cidr_network("subnet", "10.0.0.1/24", 16, 29).is_some());
        // prefix out of range
        assert!(cidr_network("subnet", "10.0.0.0/8", 16, 29).is_some());
        assert!(cidr_network("subnet", "10.0.0.0/30", 16, 29).is_some());
        assert!(cidr_network("subnet", "10.0.0.0/33", 16, 29).is_some());
        // malformed
        assert!(cidr_network("subnet", "10.0.0.0", 16, 29).is_some());
        assert!(cidr_network("subnet", "10.0.0/24", 16, 29).is_some());
        assert!(cidr_network("subnet", "10.0.0.0/abc", 16, 29).is_some());
    }

    #[test]
    fn test_domain_name() {
        assert!(domain_name("domain", "skytap.example").is_none());
        assert!(domain_name("domain", "sub-1.corp.example.com").is_none());

        assert!(domain_name("domain", "").is_some());
        assert!(domain_name("domain", "localhost").is_some());
        assert!(domain_name("domain", "UPPER.CASE").is_some());
        assert!(domain_name("domain", "-bad.example").is_some());
        assert!(domain_name("domain", "corp.example.").is_some());
        assert!(domain_name("domain", &format!("{}.com", "a".repeat(61))).is_some());
    }

    #[test]
    fn test_string_attr() {
        let config = json!({"name": "net", "tunnelable": true});
        assert_eq!(string_attr(&config, "name"), Some("net"));
        assert_eq!(string_attr(&config, "tunnelable"), None);
        assert_eq!(string_attr(&config, "missing"), None);
    }
}
