use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::DiscoveryError;
use crate::types::ArchLayer;

/// Top-level configuration from `.strata.toml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub project: ProjectConfig,
    /// Manual zone entries keyed by zone name.
    #[serde(default)]
    pub zones: BTreeMap<String, ManualZoneConfig>,
    #[serde(default)]
    pub layers: LayersConfig,
    #[serde(default)]
    pub architecture: ArchitectureConfig,
    #[serde(default)]
    pub patterns: PatternsConfig,
    #[serde(default)]
    pub conventions: ConventionsConfig,
    #[serde(default)]
    pub tests: TestsConfig,
    #[serde(default)]
    pub interactions: InteractionsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            exclude_patterns: vec![
                "vendor/**".to_string(),
                "**/node_modules/**".to_string(),
                "**/target/**".to_string(),
            ],
        }
    }
}

/// A manual zone entry: overrides a detected zone of the same name,
/// or adds a zone detection missed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualZoneConfig {
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub purpose: Option<String>,
    #[serde(default)]
    pub contracts: Vec<String>,
    #[serde(default)]
    pub exclude: bool,
}

/// Glob patterns mapping zone-relative paths to architectural layers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayersConfig {
    #[serde(default = "default_domain_patterns")]
    pub domain: Vec<String>,
    #[serde(default = "default_application_patterns")]
    pub application: Vec<String>,
    #[serde(default = "default_infrastructure_patterns")]
    pub infrastructure: Vec<String>,
    #[serde(default = "default_presentation_patterns")]
    pub presentation: Vec<String>,
}

fn default_domain_patterns() -> Vec<String> {
    vec![
        "**/domain/**".to_string(),
        "**/entities/**".to_string(),
        "**/model/**".to_string(),
        "**/models/**".to_string(),
        "**/core/**".to_string(),
    ]
}

fn default_application_patterns() -> Vec<String> {
    vec![
        "**/application/**".to_string(),
        "**/usecase/**".to_string(),
        "**/usecases/**".to_string(),
        "**/services/**".to_string(),
        "**/service/**".to_string(),
    ]
}

fn default_infrastructure_patterns() -> Vec<String> {
    vec![
        "**/infrastructure/**".to_string(),
        "**/adapters/**".to_string(),
        "**/repositories/**".to_string(),
        "**/persistence/**".to_string(),
        "**/db/**".to_string(),
    ]
}

fn default_presentation_patterns() -> Vec<String> {
    vec![
        "**/presentation/**".to_string(),
        "**/handlers/**".to_string(),
        "**/controllers/**".to_string(),
        "**/api/**".to_string(),
        "**/cmd/**".to_string(),
        "**/views/**".to_string(),
    ]
}

impl Default for LayersConfig {
    fn default() -> Self {
        Self {
            domain: default_domain_patterns(),
            application: default_application_patterns(),
            infrastructure: default_infrastructure_patterns(),
            presentation: default_presentation_patterns(),
        }
    }
}

/// Allowed-reference table between layers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchitectureConfig {
    /// layer name -> layers it may reference. Layers absent from the map
    /// may reference nothing.
    #[serde(default = "default_allowed_references")]
    pub allowed: HashMap<String, Vec<String>>,
}

fn default_allowed_references() -> HashMap<String, Vec<String>> {
    let mut m = HashMap::new();
    m.insert("domain".to_string(), vec![]);
    m.insert("application".to_string(), vec!["domain".to_string()]);
    m.insert(
        "infrastructure".to_string(),
        vec!["domain".to_string(), "application".to_string()],
    );
    m.insert(
        "presentation".to_string(),
        vec!["application".to_string(), "infrastructure".to_string()],
    );
    m
}

impl Default for ArchitectureConfig {
    fn default() -> Self {
        Self {
            allowed: default_allowed_references(),
        }
    }
}

impl ArchitectureConfig {
    /// Is `from -> to` permitted by the table? Same-layer references are
    /// always allowed.
    pub fn allows(&self, from: ArchLayer, to: ArchLayer) -> bool {
        if from == to {
            return true;
        }
        self.allowed
            .get(&from.to_string())
            .map(|targets| targets.iter().any(|t| t == &to.to_string()))
            .unwrap_or(false)
    }
}

/// Signal weights and confidence thresholds for pattern detection.
/// The thresholds are heuristics, so they live in configuration rather
/// than in code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternsConfig {
    #[serde(default = "default_detect_threshold")]
    pub detect_threshold: f64,
    #[serde(default = "default_apply_threshold")]
    pub apply_threshold: f64,
    #[serde(default = "default_statistical_majority")]
    pub statistical_majority: f64,
    #[serde(default = "default_max_examples")]
    pub max_examples: usize,
    #[serde(default = "default_explicit_marker_weight")]
    pub explicit_marker_weight: f64,
    #[serde(default = "default_ast_shape_weight")]
    pub ast_shape_weight: f64,
    #[serde(default = "default_structural_weight")]
    pub structural_weight: f64,
    #[serde(default = "default_naming_weight")]
    pub naming_weight: f64,
    #[serde(default = "default_statistical_weight")]
    pub statistical_weight: f64,
}

fn default_detect_threshold() -> f64 {
    0.3
}
fn default_apply_threshold() -> f64 {
    0.7
}
fn default_statistical_majority() -> f64 {
    0.7
}
fn default_max_examples() -> usize {
    5
}
fn default_explicit_marker_weight() -> f64 {
    1.0
}
fn default_ast_shape_weight() -> f64 {
    0.9
}
fn default_structural_weight() -> f64 {
    0.8
}
fn default_naming_weight() -> f64 {
    0.7
}
fn default_statistical_weight() -> f64 {
    0.6
}

impl Default for PatternsConfig {
    fn default() -> Self {
        Self {
            detect_threshold: default_detect_threshold(),
            apply_threshold: default_apply_threshold(),
            statistical_majority: default_statistical_majority(),
            max_examples: default_max_examples(),
            explicit_marker_weight: default_explicit_marker_weight(),
            ast_shape_weight: default_ast_shape_weight(),
            structural_weight: default_structural_weight(),
            naming_weight: default_naming_weight(),
            statistical_weight: default_statistical_weight(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConventionsConfig {
    /// Alternatives below this frequency are folded into exceptions.
    #[serde(default = "default_min_alternative_frequency")]
    pub min_alternative_frequency: f64,
    #[serde(default = "default_max_exceptions")]
    pub max_exceptions: usize,
}

fn default_min_alternative_frequency() -> f64 {
    0.1
}
fn default_max_exceptions() -> usize {
    10
}

impl Default for ConventionsConfig {
    fn default() -> Self {
        Self {
            min_alternative_frequency: default_min_alternative_frequency(),
            max_exceptions: default_max_exceptions(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestsConfig {
    #[serde(default = "default_max_untested_listed")]
    pub max_untested_listed: usize,
}

fn default_max_untested_listed() -> usize {
    25
}

impl Default for TestsConfig {
    fn default() -> Self {
        Self {
            max_untested_listed: default_max_untested_listed(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionsConfig {
    /// Repo-root directories treated as shared schema/contract locations.
    #[serde(default = "default_shared_schema_dirs")]
    pub shared_schema_dirs: Vec<String>,
}

fn default_shared_schema_dirs() -> Vec<String> {
    vec![
        "schemas".to_string(),
        "schema".to_string(),
        "contracts".to_string(),
        "proto".to_string(),
        "idl".to_string(),
    ]
}

impl Default for InteractionsConfig {
    fn default() -> Self {
        Self {
            shared_schema_dirs: default_shared_schema_dirs(),
        }
    }
}

impl Config {
    /// Load configuration from a `.strata.toml` file. A malformed file is
    /// fatal: zone boundaries would be ambiguous downstream.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file '{}'", path.display()))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| DiscoveryError::InvalidConfig(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `.strata.toml` in the given directory or any ancestor, or
    /// return defaults when no config file exists. An existing-but-malformed
    /// file is still an error.
    pub fn load_or_default(dir: &Path) -> Result<Self> {
        let start = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
        let mut current = start.as_path();
        loop {
            let config_path = current.join(".strata.toml");
            if config_path.exists() {
                return Self::load(&config_path);
            }
            match current.parent() {
                Some(parent) => current = parent,
                None => break,
            }
        }
        Ok(Self::default())
    }

    /// Reject configurations that would corrupt zone boundaries.
    pub fn validate(&self) -> Result<()> {
        for (name, zone) in &self.zones {
            if name.trim().is_empty() {
                return Err(DiscoveryError::InvalidConfig(
                    "zone with empty name".to_string(),
                )
                .into());
            }
            if !zone.exclude {
                if let Some(path) = &zone.path {
                    if path.trim().is_empty() || Path::new(path).is_absolute() {
                        return Err(DiscoveryError::InvalidConfig(format!(
                            "zone '{name}' path must be a non-empty repo-relative path"
                        ))
                        .into());
                    }
                }
            }
        }
        if self.patterns.detect_threshold > self.patterns.apply_threshold {
            return Err(DiscoveryError::InvalidConfig(format!(
                "detect_threshold {} exceeds apply_threshold {}",
                self.patterns.detect_threshold, self.patterns.apply_threshold
            ))
            .into());
        }
        for layer in self.architecture.allowed.keys() {
            layer
                .parse::<ArchLayer>()
                .map_err(|e| DiscoveryError::InvalidConfig(e.to_string()))?;
        }
        Ok(())
    }

    /// Generate default TOML content for `strata init`.
    pub fn default_toml() -> String {
        r#"# Strata - Brownfield Discovery Configuration
# See https://github.com/rebelopsio/strata for documentation

[project]
exclude_patterns = ["vendor/**", "**/node_modules/**", "**/target/**"]

# Manual zone entries. An entry matching a detected zone name overrides it
# (detection becomes "hybrid"); an unmatched entry is added as-is
# (detection "manual"); exclude = true removes the zone entirely.
# [zones.edge]
# path = "edge"
# language = "python"
# purpose = "ingestion edge service"
# contracts = ["edge-api-v1"]
#
# [zones.legacy]
# exclude = true

[layers]
# Glob patterns classifying zone-relative paths into architectural layers
domain = ["**/domain/**", "**/entities/**", "**/model/**", "**/models/**", "**/core/**"]
application = ["**/application/**", "**/usecase/**", "**/usecases/**", "**/services/**", "**/service/**"]
infrastructure = ["**/infrastructure/**", "**/adapters/**", "**/repositories/**", "**/persistence/**", "**/db/**"]
presentation = ["**/presentation/**", "**/handlers/**", "**/controllers/**", "**/api/**", "**/cmd/**", "**/views/**"]

[architecture.allowed]
# layer -> layers it may reference (same-layer references always allowed)
domain = []
application = ["domain"]
infrastructure = ["domain", "application"]
presentation = ["application", "infrastructure"]

[patterns]
# Confidence thresholds: detected above the first, eligible for automatic
# downstream application above the second, flagged for review in between.
detect_threshold = 0.3
apply_threshold = 0.7

[conventions]
min_alternative_frequency = 0.1

[interactions]
shared_schema_dirs = ["schemas", "schema", "contracts", "proto", "idl"]
"#
        .to_string()
    }
}
