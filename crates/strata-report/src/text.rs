use colored::Colorize;

use strata_core::log::DiscoveryLog;
use strata_core::profile::CodebaseProfile;
use strata_core::types::{ViolationSeverity, Zone};

/// Format a full discovery report for terminal output.
pub fn format_report(profile: &CodebaseProfile, log: &DiscoveryLog) -> String {
    let mut out = String::new();

    out.push_str(&format!("\n{}\n", "Strata - Brownfield Discovery".bold()));
    out.push_str(&format!("{}\n\n", "=".repeat(40)));

    out.push_str(&format!(
        "{}: {} zones, detection mode {}\n",
        "Summary".bold(),
        profile.discovery.zones_discovered,
        profile.discovery.detection_mode,
    ));

    if !profile.languages.is_empty() {
        out.push_str(&format!("\n{}\n", "Languages".bold()));
        for language in &profile.languages {
            out.push_str(&format!(
                "  {:<12} {:>5.1}%  ({})\n",
                language.name,
                language.percentage,
                language.zones.join(", ")
            ));
        }
    }

    for (name, zone) in &profile.zones {
        out.push_str(&format!(
            "\n{} {} [{} | {} | {}]\n",
            "Zone".bold(),
            name.cyan(),
            zone.language,
            zone.detection,
            zone.path,
        ));

        let detected: Vec<&str> = zone
            .patterns
            .values()
            .filter(|p| p.detected)
            .map(|p| p.pattern.as_str())
            .collect();
        if detected.is_empty() {
            out.push_str("  Patterns: none detected\n");
        } else {
            out.push_str("  Patterns:\n");
            for pattern in zone.patterns.values().filter(|p| p.detected) {
                let marker = if pattern.needs_review {
                    "needs review".yellow().to_string()
                } else {
                    "auto-applicable".green().to_string()
                };
                out.push_str(&format!(
                    "    {:<22} {:.2} ({marker}){}\n",
                    pattern.pattern,
                    pattern.confidence,
                    pattern
                        .variant
                        .as_deref()
                        .map(|v| format!(" variant={v}"))
                        .unwrap_or_default(),
                ));
            }
        }

        for convention in zone.conventions.values() {
            out.push_str(&format!(
                "  Convention {:<20} {} ({:.0}% of {})\n",
                convention.category,
                convention.dominant,
                convention.consistency * 100.0,
                convention.total_samples,
            ));
        }

        if zone.architecture.violations.is_empty() {
            out.push_str(&format!("  {}\n", "No layer violations".green()));
        } else {
            out.push_str(&format!(
                "  {} ({} found)\n",
                "Layer violations".red().bold(),
                zone.architecture.violations.len()
            ));
            for violation in &zone.architecture.violations {
                let severity = match violation.severity {
                    ViolationSeverity::Major => "MAJOR".red().bold().to_string(),
                    ViolationSeverity::Minor => "MINOR".yellow().bold().to_string(),
                };
                out.push_str(&format!(
                    "    {severity} {} -> {} ({} -> {})\n",
                    violation.from_module,
                    violation.to_module,
                    violation.from_layer,
                    violation.to_layer,
                ));
                for location in &violation.locations {
                    out.push_str(&format!("      at {location}\n"));
                }
            }
        }

        out.push_str(&format!(
            "  Tests: {:.0}% estimated coverage ({}/{} files)\n",
            zone.tests.coverage_estimate * 100.0,
            zone.tests.tested_files,
            zone.tests.analyzable_files,
        ));
    }

    if !profile.interactions.is_empty() {
        out.push_str(&format!("\n{}\n", "Interactions".bold()));
        for interaction in &profile.interactions {
            let participants = match (&interaction.from_zone, &interaction.to_zone) {
                (Some(from), Some(to)) => format!("{from} -> {to}"),
                _ => interaction.zones.join(", "),
            };
            out.push_str(&format!("  {} {participants}\n", interaction.kind));
        }
    }

    // Skips are never silent: the summary always carries the counts.
    out.push_str(&format!("\n{}\n", "Run log".bold()));
    if log.is_empty() {
        out.push_str("  no files or zones skipped\n");
    } else {
        for (phase, count) in log.counts_by_phase() {
            out.push_str(&format!("  {phase}: {count} skipped/degraded\n"));
        }
    }

    out.push('\n');
    out
}

/// Format a zone listing for `discover --list-zones`.
pub fn format_zone_list(zones: &[Zone]) -> String {
    let mut out = String::new();
    out.push_str(&format!("\n{}\n", "Detected zones".bold()));
    if zones.is_empty() {
        out.push_str("  none\n");
        return out;
    }
    for zone in zones {
        out.push_str(&format!(
            "  {:<20} {:<12} {:<8} {} ({})\n",
            zone.name.cyan(),
            zone.language,
            zone.detection,
            zone.path.display(),
            zone.marker,
        ));
    }
    out
}
