use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::archmap::ArchitectureReport;
use crate::error::DiscoveryError;
use crate::provider::DependencyDecl;
use crate::structure::ZoneStructure;
use crate::testgap::TestInventory;
use crate::types::{
    ConventionDetection, DetectionOrigin, DetectionSource, Interaction, PatternDetection,
};

pub const SCHEMA_VERSION: &str = "1.0";
pub const PROFILE_FILE: &str = "profile.json";
pub const LOG_FILE: &str = "discovery-log.json";

/// Run metadata carried in the profile header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryMetadata {
    pub duration_ms: u64,
    pub phases_completed: Vec<String>,
    pub zones_discovered: usize,
    /// `auto` when no manual configuration contributed, `manual` when every
    /// zone came from configuration, `hybrid` otherwise.
    pub detection_mode: String,
}

/// Aggregated share of one language across the repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageSummary {
    pub name: String,
    pub percentage: f64,
    pub zones: Vec<String>,
}

/// Populated by the external conformance collaborator, never by discovery.
/// Carried through merges untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConformanceSummary {
    pub total_violations: usize,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub by_severity: BTreeMap<String, usize>,
}

/// Everything discovery learned about one zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneProfile {
    pub language: String,
    pub path: String,
    pub marker: String,
    pub detection: DetectionOrigin,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contracts: Vec<String>,
    pub structure: ZoneStructure,
    pub patterns: BTreeMap<String, PatternDetection>,
    pub conventions: BTreeMap<String, ConventionDetection>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub frameworks: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<DependencyDecl>,
    pub architecture: ArchitectureReport,
    pub tests: TestInventory,
}

/// The complete output artifact of a discovery run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodebaseProfile {
    pub schema_version: String,
    pub generated_at: DateTime<Utc>,
    pub discovery: DiscoveryMetadata,
    pub languages: Vec<LanguageSummary>,
    pub zones: BTreeMap<String, ZoneProfile>,
    pub interactions: Vec<Interaction>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub conformance_summary: BTreeMap<String, ConformanceSummary>,
}

impl CodebaseProfile {
    /// Validate against the profile schema invariants. A failed validation
    /// aborts the write and leaves any previous profile untouched.
    pub fn validate(&self) -> Result<()> {
        if self.schema_version != SCHEMA_VERSION {
            return Err(DiscoveryError::InvalidProfile(format!(
                "unsupported schema_version '{}'",
                self.schema_version
            ))
            .into());
        }

        let zones: Vec<(&String, &ZoneProfile)> = self.zones.iter().collect();
        for (i, (name_a, zone_a)) in zones.iter().enumerate() {
            for (name_b, zone_b) in zones.iter().skip(i + 1) {
                let path_a = Path::new(&zone_a.path);
                let path_b = Path::new(&zone_b.path);
                if path_a.starts_with(path_b) || path_b.starts_with(path_a) {
                    return Err(DiscoveryError::InvalidProfile(format!(
                        "zones '{name_a}' and '{name_b}' overlap in path coverage"
                    ))
                    .into());
                }
            }
        }

        for (zone_name, zone) in &self.zones {
            for (pattern_name, pattern) in &zone.patterns {
                if !(0.0..=1.0).contains(&pattern.confidence) {
                    return Err(DiscoveryError::InvalidProfile(format!(
                        "zone '{zone_name}' pattern '{pattern_name}' confidence {} out of range",
                        pattern.confidence
                    ))
                    .into());
                }
            }
            for (category, convention) in &zone.conventions {
                if !(0.0..=1.0).contains(&convention.consistency) {
                    return Err(DiscoveryError::InvalidProfile(format!(
                        "zone '{zone_name}' convention '{category}' consistency {} out of range",
                        convention.consistency
                    ))
                    .into());
                }
            }
            if !(0.0..=1.0).contains(&zone.tests.coverage_estimate) {
                return Err(DiscoveryError::InvalidProfile(format!(
                    "zone '{zone_name}' coverage estimate out of range"
                ))
                .into());
            }
            for violation in &zone.architecture.violations {
                if violation.locations.is_empty() {
                    return Err(DiscoveryError::InvalidProfile(format!(
                        "zone '{zone_name}' violation {} -> {} has no source locations",
                        violation.from_module, violation.to_module
                    ))
                    .into());
                }
            }
        }

        Ok(())
    }

    /// Field-level merge against the prior on-disk profile: every
    /// `PatternDetection`/`ConventionDetection` marked human-curated in the
    /// prior profile is carried forward unchanged regardless of what this
    /// run detected. The conformance summary always survives; it belongs to
    /// an external collaborator.
    pub fn merge_prior(&mut self, prior: &CodebaseProfile) {
        for (zone_name, prior_zone) in &prior.zones {
            let Some(zone) = self.zones.get_mut(zone_name) else {
                continue;
            };
            for (name, pattern) in &prior_zone.patterns {
                if pattern.source == DetectionSource::HumanCurated {
                    zone.patterns.insert(name.clone(), pattern.clone());
                }
            }
            for (category, convention) in &prior_zone.conventions {
                if convention.source == DetectionSource::HumanCurated {
                    zone.conventions.insert(category.clone(), convention.clone());
                }
            }
        }
        self.conformance_summary = prior.conformance_summary.clone();
    }

    /// Load a prior profile from the output directory.
    pub fn load(out_dir: &Path) -> Result<Option<Self>> {
        let path = out_dir.join(PROFILE_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read prior profile '{}'", path.display()))?;
        let profile: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse prior profile '{}'", path.display()))?;
        Ok(Some(profile))
    }

    /// Validate and write atomically: serialize to a temp file in the output
    /// directory, then rename over the previous profile. Validation failure
    /// or a write error leaves the previous profile in place.
    pub fn write(&self, out_dir: &Path) -> Result<()> {
        self.validate()?;
        std::fs::create_dir_all(out_dir)
            .with_context(|| format!("failed to create '{}'", out_dir.display()))?;
        let content =
            serde_json::to_string_pretty(self).context("failed to serialize profile")?;
        let tmp = out_dir.join(format!("{PROFILE_FILE}.tmp"));
        let target = out_dir.join(PROFILE_FILE);
        std::fs::write(&tmp, content)
            .with_context(|| format!("failed to write '{}'", tmp.display()))?;
        std::fs::rename(&tmp, &target)
            .with_context(|| format!("failed to replace '{}'", target.display()))?;
        Ok(())
    }

    /// Equality up to generation timestamp and duration metrics: the
    /// determinism contract for unchanged inputs.
    pub fn content_eq(&self, other: &CodebaseProfile) -> bool {
        let normalize = |profile: &CodebaseProfile| {
            let mut p = profile.clone();
            p.generated_at = DateTime::<Utc>::UNIX_EPOCH;
            p.discovery.duration_ms = 0;
            p
        };
        normalize(self) == normalize(other)
    }
}
