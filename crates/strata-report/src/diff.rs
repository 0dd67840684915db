use colored::Colorize;

use strata_core::profile::CodebaseProfile;

/// Render what changed between the prior profile and the current run.
/// Timestamp and duration differences are not changes.
pub fn format_diff(prior: &CodebaseProfile, current: &CodebaseProfile) -> String {
    let mut out = String::new();
    out.push_str(&format!("\n{}\n", "Profile changes".bold()));

    let mut changes = 0usize;

    for name in current.zones.keys() {
        if !prior.zones.contains_key(name) {
            out.push_str(&format!("  {} zone {name}\n", "added".green()));
            changes += 1;
        }
    }
    for name in prior.zones.keys() {
        if !current.zones.contains_key(name) {
            out.push_str(&format!("  {} zone {name}\n", "removed".red()));
            changes += 1;
        }
    }

    for (name, zone) in &current.zones {
        let Some(prior_zone) = prior.zones.get(name) else {
            continue;
        };

        for (pattern_name, pattern) in &zone.patterns {
            match prior_zone.patterns.get(pattern_name) {
                Some(prior_pattern) => {
                    if (prior_pattern.confidence - pattern.confidence).abs() > f64::EPSILON
                        || prior_pattern.detected != pattern.detected
                    {
                        out.push_str(&format!(
                            "  {name}: pattern {pattern_name} confidence {:.2} -> {:.2}\n",
                            prior_pattern.confidence, pattern.confidence
                        ));
                        changes += 1;
                    }
                }
                None => {
                    out.push_str(&format!("  {name}: new pattern {pattern_name}\n"));
                    changes += 1;
                }
            }
        }

        for (category, convention) in &zone.conventions {
            if let Some(prior_convention) = prior_zone.conventions.get(category) {
                if prior_convention.dominant != convention.dominant
                    || (prior_convention.consistency - convention.consistency).abs() > f64::EPSILON
                {
                    out.push_str(&format!(
                        "  {name}: convention {category} {} ({:.2}) -> {} ({:.2})\n",
                        prior_convention.dominant,
                        prior_convention.consistency,
                        convention.dominant,
                        convention.consistency,
                    ));
                    changes += 1;
                }
            }
        }

        let prior_violations = prior_zone.architecture.violations.len();
        let violations = zone.architecture.violations.len();
        if prior_violations != violations {
            out.push_str(&format!(
                "  {name}: layer violations {prior_violations} -> {violations}\n"
            ));
            changes += 1;
        }

        let prior_coverage = prior_zone.tests.coverage_estimate;
        let coverage = zone.tests.coverage_estimate;
        if (prior_coverage - coverage).abs() > f64::EPSILON {
            out.push_str(&format!(
                "  {name}: coverage estimate {prior_coverage:.2} -> {coverage:.2}\n"
            ));
            changes += 1;
        }
    }

    if prior.interactions != current.interactions {
        out.push_str(&format!(
            "  interactions {} -> {}\n",
            prior.interactions.len(),
            current.interactions.len()
        ));
        changes += 1;
    }

    if changes == 0 {
        out.push_str("  no changes\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use strata_core::profile::{DiscoveryMetadata, ZoneProfile};
    use strata_core::types::{DetectionOrigin, DetectionSource, PatternDetection};

    fn zone_profile() -> ZoneProfile {
        ZoneProfile {
            language: "go".to_string(),
            path: "svc".to_string(),
            marker: "go.mod".to_string(),
            detection: DetectionOrigin::Auto,
            purpose: None,
            contracts: vec![],
            structure: Default::default(),
            patterns: BTreeMap::new(),
            conventions: BTreeMap::new(),
            frameworks: vec![],
            dependencies: vec![],
            architecture: Default::default(),
            tests: Default::default(),
        }
    }

    fn profile() -> CodebaseProfile {
        let mut zones = BTreeMap::new();
        zones.insert("svc".to_string(), zone_profile());
        CodebaseProfile {
            schema_version: "1.0".to_string(),
            generated_at: chrono::Utc::now(),
            discovery: DiscoveryMetadata {
                duration_ms: 1,
                phases_completed: vec![],
                zones_discovered: 1,
                detection_mode: "auto".to_string(),
            },
            languages: vec![],
            zones,
            interactions: vec![],
            conformance_summary: BTreeMap::new(),
        }
    }

    fn pattern(confidence: f64) -> PatternDetection {
        PatternDetection {
            pattern: "repository".to_string(),
            detected: true,
            variant: None,
            confidence,
            needs_review: false,
            signals: vec![],
            examples: vec![],
            source: DetectionSource::AutoDetected,
        }
    }

    #[test]
    fn test_identical_profiles_report_no_changes() {
        let a = profile();
        let mut b = a.clone();
        b.discovery.duration_ms = 500;
        let out = format_diff(&a, &b);
        assert!(out.contains("no changes"));
    }

    #[test]
    fn test_confidence_change_reported() {
        let mut prior = profile();
        prior
            .zones
            .get_mut("svc")
            .unwrap()
            .patterns
            .insert("repository".to_string(), pattern(0.4));
        let mut current = profile();
        current
            .zones
            .get_mut("svc")
            .unwrap()
            .patterns
            .insert("repository".to_string(), pattern(0.8));

        let out = format_diff(&prior, &current);
        assert!(out.contains("0.40 -> 0.80"));
    }

    #[test]
    fn test_zone_added_and_removed() {
        let mut prior = profile();
        prior.zones.insert("legacy".to_string(), zone_profile());
        let mut current = profile();
        current.zones.insert("edge".to_string(), zone_profile());

        let out = format_diff(&prior, &current);
        assert!(out.contains("added"));
        assert!(out.contains("edge"));
        assert!(out.contains("removed"));
        assert!(out.contains("legacy"));
    }
}
