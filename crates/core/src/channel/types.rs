//! Channel (service point) data types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Whether a channel is taking patients.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OperatingStatus {
    /// Open and callable.
    #[default]
    Active,
    /// Temporarily paused: enrollment allowed, calling is not.
    Break,
    /// Closed: neither enrollment nor calling.
    Closed,
}

impl OperatingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperatingStatus::Active => "active",
            OperatingStatus::Break => "break",
            OperatingStatus::Closed => "closed",
        }
    }

    pub fn accepts_enrollment(&self) -> bool {
        !matches!(self, OperatingStatus::Closed)
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, OperatingStatus::Active)
    }
}

impl fmt::Display for OperatingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperatingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(OperatingStatus::Active),
            "break" => Ok(OperatingStatus::Break),
            "closed" => Ok(OperatingStatus::Closed),
            other => Err(format!("unknown operating status: {}", other)),
        }
    }
}

/// An independent service point (e.g. a polyclinic) with its own queue.
///
/// Current ticket and counters are not stored here; see `engine::ChannelView`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Channel {
    pub id: String,
    /// Short prefix used in queue labels (`UMU-007`).
    pub code: String,
    pub name: String,
    pub operating_status: OperatingStatus,
    /// Whether the auto-caller serves this channel.
    pub auto_call: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request to register a channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewChannel {
    pub id: String,
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub auto_call: bool,
}

impl NewChannel {
    pub fn new(id: impl Into<String>, code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            code: code.into(),
            name: name.into(),
            auto_call: false,
        }
    }

    pub fn with_auto_call(mut self, enabled: bool) -> Self {
        self.auto_call = enabled;
        self
    }

    /// Check field shapes: slug id, short uppercase code, non-empty name.
    pub fn validate(&self) -> Result<(), String> {
        if self.id.is_empty()
            || !self
                .id
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
        {
            return Err(format!(
                "channel id must be a non-empty lowercase slug, got {:?}",
                self.id
            ));
        }
        if self.code.is_empty()
            || self.code.len() > 6
            || !self
                .code
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        {
            return Err(format!(
                "channel code must be 1-6 uppercase letters or digits, got {:?}",
                self.code
            ));
        }
        if self.name.trim().is_empty() {
            return Err("channel name cannot be empty".to_string());
        }
        Ok(())
    }
}
