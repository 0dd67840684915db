use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Location in source code
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceLocation {
    pub file: PathBuf,
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file.display(), self.line)
    }
}

/// Architectural layer in hexagonal/clean architecture.
/// Ordered from innermost (Domain=0) to outermost (Presentation=3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchLayer {
    Domain,
    Application,
    Infrastructure,
    Presentation,
}

impl ArchLayer {
    pub const ALL: [ArchLayer; 4] = [
        ArchLayer::Domain,
        ArchLayer::Application,
        ArchLayer::Infrastructure,
        ArchLayer::Presentation,
    ];

    /// Numeric depth: 0 = innermost, 3 = outermost.
    pub fn depth(&self) -> u8 {
        match self {
            ArchLayer::Domain => 0,
            ArchLayer::Application => 1,
            ArchLayer::Infrastructure => 2,
            ArchLayer::Presentation => 3,
        }
    }

    /// Depth of the outermost layer.
    pub fn max_depth() -> u8 {
        3
    }
}

impl fmt::Display for ArchLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchLayer::Domain => write!(f, "domain"),
            ArchLayer::Application => write!(f, "application"),
            ArchLayer::Infrastructure => write!(f, "infrastructure"),
            ArchLayer::Presentation => write!(f, "presentation"),
        }
    }
}

impl std::str::FromStr for ArchLayer {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "domain" => Ok(ArchLayer::Domain),
            "application" => Ok(ArchLayer::Application),
            "infrastructure" => Ok(ArchLayer::Infrastructure),
            "presentation" => Ok(ArchLayer::Presentation),
            _ => Err(anyhow::anyhow!("unknown layer: {s}")),
        }
    }
}

/// How a zone entered the profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionOrigin {
    Auto,
    Manual,
    Hybrid,
}

impl fmt::Display for DetectionOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectionOrigin::Auto => write!(f, "auto"),
            DetectionOrigin::Manual => write!(f, "manual"),
            DetectionOrigin::Hybrid => write!(f, "hybrid"),
        }
    }
}

/// Provenance of a detection value. Human-curated values survive re-runs
/// unchanged; auto-detected values are replaced every run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DetectionSource {
    #[serde(rename = "auto-detected")]
    AutoDetected,
    #[serde(rename = "human-curated")]
    HumanCurated,
}

/// A coherent, language-homogeneous region of the repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zone {
    pub name: String,
    pub path: PathBuf,
    pub language: String,
    pub marker: String,
    pub detection: DetectionOrigin,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contracts: Vec<String>,
}

impl Zone {
    /// True if `path` (repo-relative) falls inside this zone's coverage.
    pub fn contains(&self, path: &std::path::Path) -> bool {
        path.starts_with(&self.path)
    }
}

/// Kind of evidence signal contributing to a pattern detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    ExplicitMarker,
    AstShape,
    Structural,
    Naming,
    StatisticalMajority,
}

impl SignalKind {
    /// Default evidence weight for this signal kind.
    pub fn default_weight(&self) -> f64 {
        match self {
            SignalKind::ExplicitMarker => 1.0,
            SignalKind::AstShape => 0.9,
            SignalKind::Structural => 0.8,
            SignalKind::Naming => 0.7,
            SignalKind::StatisticalMajority => 0.6,
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalKind::ExplicitMarker => write!(f, "explicit_marker"),
            SignalKind::AstShape => write!(f, "ast_shape"),
            SignalKind::Structural => write!(f, "structural"),
            SignalKind::Naming => write!(f, "naming"),
            SignalKind::StatisticalMajority => write!(f, "statistical_majority"),
        }
    }
}

/// Raw evidence counts for one signal evaluated against a zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalEvidence {
    pub kind: SignalKind,
    pub matched: usize,
    pub considered: usize,
    pub weight: f64,
}

/// A confidence-scored claim that a coding pattern is in use within a zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternDetection {
    pub pattern: String,
    pub detected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    pub confidence: f64,
    pub needs_review: bool,
    pub signals: Vec<SignalEvidence>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<SourceLocation>,
    pub source: DetectionSource,
}

/// An alternative naming shape observed alongside the dominant one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlternativePattern {
    pub shape: String,
    pub frequency: f64,
}

/// A learned naming/organization convention for one category of identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConventionDetection {
    pub category: String,
    pub dominant: String,
    pub consistency: f64,
    pub total_samples: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exceptions: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alternatives: Vec<AlternativePattern>,
    pub source: DetectionSource,
}

/// Severity of a layer violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViolationSeverity {
    Minor,
    Major,
}

impl fmt::Display for ViolationSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViolationSeverity::Minor => write!(f, "minor"),
            ViolationSeverity::Major => write!(f, "major"),
        }
    }
}

impl std::str::FromStr for ViolationSeverity {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "minor" => Ok(ViolationSeverity::Minor),
            "major" => Ok(ViolationSeverity::Major),
            _ => Err(anyhow::anyhow!("unknown severity: {s}")),
        }
    }
}

/// A dependency edge that breaks the allowed-reference table.
/// Carries every import location contributing to the edge, never just a count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerViolation {
    pub from_layer: ArchLayer,
    pub to_layer: ArchLayer,
    pub from_module: String,
    pub to_module: String,
    pub severity: ViolationSeverity,
    pub locations: Vec<SourceLocation>,
}

/// Kind of cross-zone relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    HttpApi,
    DockerCompose,
    SharedSchema,
    SharedLibrary,
    MessageQueue,
}

impl fmt::Display for InteractionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InteractionKind::HttpApi => write!(f, "http_api"),
            InteractionKind::DockerCompose => write!(f, "docker_compose"),
            InteractionKind::SharedSchema => write!(f, "shared_schema"),
            InteractionKind::SharedLibrary => write!(f, "shared_library"),
            InteractionKind::MessageQueue => write!(f, "message_queue"),
        }
    }
}

/// A detected communication or shared-resource relationship between zones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: InteractionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_zone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_zone: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub zones: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, String>,
}

/// Clamp a score into the unit interval.
pub fn clamp_unit(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}
