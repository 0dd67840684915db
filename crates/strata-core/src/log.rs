use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Pipeline phase that produced a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Zones,
    Structure,
    Patterns,
    Architecture,
    Conventions,
    Tests,
    Interactions,
    Profile,
}

impl Phase {
    pub const ALL: [Phase; 8] = [
        Phase::Zones,
        Phase::Structure,
        Phase::Patterns,
        Phase::Architecture,
        Phase::Conventions,
        Phase::Tests,
        Phase::Interactions,
        Phase::Profile,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Phase::Zones => "zones",
            Phase::Structure => "structure",
            Phase::Patterns => "patterns",
            Phase::Architecture => "architecture",
            Phase::Conventions => "conventions",
            Phase::Tests => "tests",
            Phase::Interactions => "interactions",
            Phase::Profile => "profile",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Phase {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Phase::ALL
            .iter()
            .copied()
            .find(|p| p.name() == s.to_lowercase())
            .ok_or_else(|| anyhow::anyhow!("unknown phase: {s}"))
    }
}

/// One recorded skip, failure, or ambiguity. Nothing is dropped silently:
/// every degradation gets an entry here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub phase: Phase,
    pub path: PathBuf,
    pub reason: String,
}

/// The discovery log emitted alongside the profile document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscoveryLog {
    pub entries: Vec<LogEntry>,
}

impl DiscoveryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, phase: Phase, path: &Path, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::warn!(phase = %phase, path = %path.display(), "{reason}");
        self.entries.push(LogEntry {
            phase,
            path: path.to_path_buf(),
            reason,
        });
    }

    pub fn merge(&mut self, other: DiscoveryLog) {
        self.entries.extend(other.entries);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Entry counts per phase, for the run summary.
    pub fn counts_by_phase(&self) -> BTreeMap<Phase, usize> {
        let mut counts = BTreeMap::new();
        for entry in &self.entries {
            *counts.entry(entry.phase).or_insert(0) += 1;
        }
        counts
    }

    /// Sort entries for deterministic output. Called once before the log is
    /// written; insertion order within a parallel run is not stable.
    pub fn normalize(&mut self) {
        self.entries
            .sort_by(|a, b| (a.phase, &a.path, &a.reason).cmp(&(b.phase, &b.path, &b.reason)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_count() {
        let mut log = DiscoveryLog::new();
        log.record(Phase::Zones, Path::new("bad/Cargo.toml"), "marker parse error");
        log.record(Phase::Patterns, Path::new("a.py"), "parse error");
        log.record(Phase::Patterns, Path::new("b.py"), "parse error");

        assert_eq!(log.len(), 3);
        let counts = log.counts_by_phase();
        assert_eq!(counts[&Phase::Zones], 1);
        assert_eq!(counts[&Phase::Patterns], 2);
    }

    #[test]
    fn test_normalize_orders_entries() {
        let mut log = DiscoveryLog::new();
        log.record(Phase::Tests, Path::new("z.rs"), "later");
        log.record(Phase::Zones, Path::new("a.rs"), "earlier");
        log.normalize();
        assert_eq!(log.entries[0].phase, Phase::Zones);
        assert_eq!(log.entries[1].phase, Phase::Tests);
    }

    #[test]
    fn test_phase_parse() {
        assert_eq!("patterns".parse::<Phase>().unwrap(), Phase::Patterns);
        assert_eq!("Tests".parse::<Phase>().unwrap(), Phase::Tests);
        assert!("compile".parse::<Phase>().is_err());
    }
}
