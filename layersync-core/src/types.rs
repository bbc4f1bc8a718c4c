//! Domain types for layer synchronization.
//!
//! Everything here is immutable after the configuration is loaded and is
//! serializable via serde + serde_yaml.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A strongly-typed name for a configured feature layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LayerName(pub String);

impl fmt::Display for LayerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for LayerName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for LayerName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Which parts of a record participate in change detection, and how record
/// identity is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ComparisonMode {
    /// Compare coordinates only.
    #[default]
    GeometryOnly,
    /// Compare coordinates and every field value.
    GeometryAndAttributes,
    /// Compare field values only; coordinates are still read and sent on add.
    AttributesOnly,
    /// Compare field values only; no coordinates.
    NoGeometry,
    /// Like [`ComparisonMode::NoGeometry`], but identity comes from the first
    /// query column instead of row position.
    #[serde(rename = "NoGeometryAndID")]
    NoGeometryAndId,
}

impl ComparisonMode {
    pub fn all() -> &'static [ComparisonMode] {
        &[
            ComparisonMode::GeometryOnly,
            ComparisonMode::GeometryAndAttributes,
            ComparisonMode::AttributesOnly,
            ComparisonMode::NoGeometry,
            ComparisonMode::NoGeometryAndId,
        ]
    }

    /// Whether x/y are read from query columns 1 and 2.
    pub fn reads_coordinates(self) -> bool {
        matches!(
            self,
            ComparisonMode::GeometryOnly
                | ComparisonMode::GeometryAndAttributes
                | ComparisonMode::AttributesOnly
        )
    }

    /// Whether coordinates take part in equality.
    pub fn compares_coordinates(self) -> bool {
        matches!(
            self,
            ComparisonMode::GeometryOnly | ComparisonMode::GeometryAndAttributes
        )
    }

    /// Whether field values take part in equality.
    pub fn compares_attributes(self) -> bool {
        !matches!(self, ComparisonMode::GeometryOnly)
    }

    /// Whether the unique id is the first query column rather than the
    /// 1-based row position.
    pub fn keyed_by_source_id(self) -> bool {
        matches!(self, ComparisonMode::NoGeometryAndId)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ComparisonMode::GeometryOnly => "GeometryOnly",
            ComparisonMode::GeometryAndAttributes => "GeometryAndAttributes",
            ComparisonMode::AttributesOnly => "AttributesOnly",
            ComparisonMode::NoGeometry => "NoGeometry",
            ComparisonMode::NoGeometryAndId => "NoGeometryAndID",
        }
    }
}

impl fmt::Display for ComparisonMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComparisonMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ComparisonMode::all()
            .iter()
            .copied()
            .find(|mode| mode.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                let names: Vec<_> = ComparisonMode::all().iter().map(|m| m.as_str()).collect();
                format!(
                    "unknown comparison mode '{s}'; expected one of: {}",
                    names.join(", ")
                )
            })
    }
}

/// Editability of a remote layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    #[default]
    ReadOnly,
    Editable,
}

impl Capability {
    pub fn from_editable(editable: bool) -> Self {
        if editable {
            Capability::Editable
        } else {
            Capability::ReadOnly
        }
    }

    pub fn is_editable(self) -> bool {
        self == Capability::Editable
    }

    /// Value of the `capabilities` property sent to `updateDefinition`.
    pub fn remote_capabilities(self) -> &'static str {
        match self {
            Capability::Editable => "Create,Delete,Query,Update,Editing",
            Capability::ReadOnly => "Query",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::ReadOnly => write!(f, "read-only"),
            Capability::Editable => write!(f, "editable"),
        }
    }
}

// ---------------------------------------------------------------------------
// Layer configuration
// ---------------------------------------------------------------------------

pub const DEFAULT_WKID: u32 = 4326;
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 300;

fn default_wkid() -> u32 {
    DEFAULT_WKID
}

fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

fn default_true() -> bool {
    true
}

/// One hosted feature layer kept in sync with one source query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerConfig {
    pub name: LayerName,
    /// Admin endpoint that accepts `updateDefinition`.
    #[serde(default)]
    pub admin_url: String,
    /// Feature layer endpoint that accepts `applyEdits` / `deleteFeatures`.
    #[serde(default)]
    pub layer_url: String,
    /// Select statement; column order defines field order.
    #[serde(default)]
    pub query: String,
    #[serde(default = "default_wkid")]
    pub wkid: u32,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default)]
    pub comparison_mode: ComparisonMode,
    /// Delete every remote feature before the first full load.
    #[serde(default = "default_true")]
    pub clear_before_seed: bool,
}

impl LayerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// `<admin_url>/<operation>`.
    pub fn admin_endpoint(&self, operation: &str) -> String {
        join_endpoint(&self.admin_url, operation)
    }

    /// `<layer_url>/<operation>`.
    pub fn layer_endpoint(&self, operation: &str) -> String {
        join_endpoint(&self.layer_url, operation)
    }

    /// Case-insensitive admin URL comparison used for shared-endpoint
    /// detection.
    pub fn shares_admin_with(&self, other: &LayerConfig) -> bool {
        self.admin_url.eq_ignore_ascii_case(&other.admin_url)
    }
}

/// Append `operation` to `base` with exactly one separating `/`.
pub fn join_endpoint(base: &str, operation: &str) -> String {
    if base.ends_with('/') {
        format!("{base}{operation}")
    } else {
        format!("{base}/{operation}")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
