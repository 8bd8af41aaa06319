//! The optional `timeouts` block shared by resources that wait on Skytap.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProviderError;
use crate::lifecycle::PollPolicy;
use crate::schema::{Attribute, Block, Diagnostic, NestedBlock};

/// Name of the block in resource schemas.
pub const BLOCK_NAME: &str = "timeouts";

/// Operation a timeout applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Creating the resource.
    Create,
    /// Updating the resource in place.
    Update,
    /// Deleting the resource.
    Delete,
}

/// Per-operation overrides, as written by the user (`"30s"`, `"10m"`, `"1h30m"`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeouts {
    /// Override for create.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create: Option<String>,
    /// Override for update.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update: Option<String>,
    /// Override for delete.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete: Option<String>,
}

impl Timeouts {
    /// Polling policy for `op`, falling back to the client-wide policy.
    pub fn policy(
        timeouts: Option<&Timeouts>,
        op: Operation,
        base: PollPolicy,
    ) -> Result<PollPolicy, ProviderError> {
        let raw = timeouts.and_then(|t| match op {
            Operation::Create => t.create.as_deref(),
            Operation::Update => t.update.as_deref(),
            Operation::Delete => t.delete.as_deref(),
        });
        match raw {
            Some(raw) => {
                let timeout = parse_duration(raw).ok_or_else(|| {
                    ProviderError::Validation(format!("invalid timeout '{}'", raw))
                })?;
                Ok(PollPolicy::new(base.interval, timeout))
            },
            None => Ok(base),
        }
    }
}

/// Schema of the `timeouts` block.
pub fn block() -> NestedBlock {
    let attr = |op: &str| {
        Attribute::optional_string().with_description(format!(
            "How long to wait for {} to finish, e.g. `30s`, `10m`, `1h`",
            op
        ))
    };
    NestedBlock::single(
        Block::new()
            .with_attribute("create", attr("creation"))
            .with_attribute("update", attr("an update"))
            .with_attribute("delete", attr("deletion")),
    )
}

/// Check that every duration in the block parses.
pub fn validate(config: &Value) -> Vec<Diagnostic> {
    let Some(block) = config.get(BLOCK_NAME).and_then(Value::as_object) else {
        return Vec::new();
    };
    block
        .iter()
        .filter_map(|(op, value)| {
            let raw = value.as_str()?;
            if parse_duration(raw).is_some() {
                return None;
            }
            Some(
                Diagnostic::error(format!("Invalid duration for '{}.{}'", BLOCK_NAME, op))
                    .with_detail(format!("{:?} is not a duration like 30s, 10m or 1h", raw))
                    .with_attribute(format!("{}.{}", BLOCK_NAME, op)),
            )
        })
        .collect()
}

/// Parse durations made of `<number><unit>` pairs with units `h`, `m`, `s`.
pub fn parse_duration(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let mut total = 0u64;
    let mut digits = String::new();
    for c in raw.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let unit = match c {
            'h' => 3600,
            'm' => 60,
            's' => 1,
            _ => return None,
        };
        let n: u64 = digits.parse().ok()?;
        total = total.checked_add(n.checked_mul(unit)?)?;
        digits.clear();
    }

    // a trailing bare number has no unit
    if !digits.is_empty() {
        return None;
    }
    Some(Duration::from_secs(total))
}
