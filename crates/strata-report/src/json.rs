use strata_core::profile::CodebaseProfile;
use strata_core::types::Zone;

/// Format a full profile as JSON.
pub fn format_profile(profile: &CodebaseProfile, compact: bool) -> String {
    if compact {
        serde_json::to_string(profile).expect("CodebaseProfile should be serializable")
    } else {
        serde_json::to_string_pretty(profile).expect("CodebaseProfile should be serializable")
    }
}

/// Format a zone listing as JSON.
pub fn format_zones(zones: &[Zone], compact: bool) -> String {
    if compact {
        serde_json::to_string(zones).expect("zones should be serializable")
    } else {
        serde_json::to_string_pretty(zones).expect("zones should be serializable")
    }
}
