/// End-to-end tests for the `strata discover` CLI, driving the compiled
/// binary against fixture trees built in temp directories.
use std::path::Path;
use std::process::Command;

fn strata_cmd() -> Command {
    Command::new(env!("CARGO_BIN_EXE_strata"))
}

fn touch(path: &Path, content: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

fn discover_json(root: &Path, extra: &[&str]) -> serde_json::Value {
    let mut args = vec!["discover", root.to_str().unwrap(), "--json"];
    args.extend_from_slice(extra);
    let output = strata_cmd().args(&args).output().expect("failed to run strata");
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(output.status.success(), "exit code: stdout={stdout} stderr={stderr}");
    serde_json::from_str(&stdout).expect("stdout should be a JSON profile")
}

// ----------------------------------------------------------------------------
// Scenario: solution manifest at the root swallows nested project manifests
// Given service.sln at the root and api/service.csproj beneath it
// When I run "strata discover --list-zones"
// Then exactly one zone is reported, rooted at the solution's directory
// ----------------------------------------------------------------------------
#[test]
fn solution_zone_swallows_nested_csproj() {
    let tmp = tempfile::tempdir().unwrap();
    touch(
        &tmp.path().join("service.sln"),
        "Microsoft Visual Studio Solution File, Format Version 12.00\n",
    );
    touch(
        &tmp.path().join("api/service.csproj"),
        "<Project Sdk=\"Microsoft.NET.Sdk\" />\n",
    );

    let output = strata_cmd()
        .args(["discover", tmp.path().to_str().unwrap(), "--list-zones", "--json"])
        .output()
        .expect("failed to run strata");
    assert!(output.status.success());

    let zones: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("should be valid JSON");
    let zones = zones.as_array().unwrap();
    assert_eq!(zones.len(), 1, "{zones:?}");
    assert_eq!(zones[0]["name"], "root");
    assert_eq!(zones[0]["language"], "csharp");
    assert_eq!(zones[0]["marker"], "service.sln");
}

// ----------------------------------------------------------------------------
// Scenario: docker-compose dependency between two zones
// Given edge/pyproject.toml and services/Core.sln, plus a compose file where
// the edge service depends on core-api whose build context is under services/
// When I run "strata discover --json"
// Then the profile contains exactly one docker_compose interaction
// from edge to services
// ----------------------------------------------------------------------------
#[test]
fn compose_dependency_becomes_interaction() {
    let tmp = tempfile::tempdir().unwrap();
    touch(&tmp.path().join("edge/pyproject.toml"), "[project]\nname = \"edge\"\n");
    touch(&tmp.path().join("edge/main.py"), "import os\n");
    touch(
        &tmp.path().join("services/Core.sln"),
        "Microsoft Visual Studio Solution File, Format Version 12.00\n",
    );
    touch(
        &tmp.path().join("services/api/Program.cs"),
        "public class Program { }\n",
    );
    touch(
        &tmp.path().join("docker-compose.yaml"),
        r#"services:
  edge:
    build: ./edge
    depends_on: [core-api]
  core-api:
    build:
      context: ./services/api
"#,
    );

    let profile = discover_json(tmp.path(), &[]);
    let interactions = profile["interactions"].as_array().unwrap();
    let compose: Vec<_> = interactions
        .iter()
        .filter(|i| i["type"] == "docker_compose")
        .collect();
    assert_eq!(compose.len(), 1, "{interactions:?}");
    assert_eq!(compose[0]["from_zone"], "edge");
    assert_eq!(compose[0]["to_zone"], "services");
}

// ----------------------------------------------------------------------------
// Scenario: presentation module importing domain violates the layer table
// Given a Go zone whose handlers/ imports domain/ while the table only
// allows presentation -> application, infrastructure
// Then exactly one major violation referencing the import's file and line
// ----------------------------------------------------------------------------
#[test]
fn presentation_to_domain_is_major_violation() {
    let tmp = tempfile::tempdir().unwrap();
    touch(&tmp.path().join("svc/go.mod"), "module example.com/svc\n\ngo 1.22\n");
    touch(
        &tmp.path().join("svc/domain/user.go"),
        "package domain\n\ntype User struct {\n\tID string\n}\n",
    );
    touch(
        &tmp.path().join("svc/handlers/user.go"),
        "package handlers\n\nimport (\n\t\"example.com/svc/domain\"\n)\n\nfunc Handle(u domain.User) {}\n",
    );

    let profile = discover_json(tmp.path(), &[]);
    let violations = profile["zones"]["svc"]["architecture"]["violations"]
        .as_array()
        .unwrap();
    assert_eq!(violations.len(), 1, "{violations:?}");
    let violation = &violations[0];
    assert_eq!(violation["severity"], "major");
    assert_eq!(violation["from_layer"], "presentation");
    assert_eq!(violation["to_layer"], "domain");

    let locations = violation["locations"].as_array().unwrap();
    assert!(!locations.is_empty());
    assert!(locations[0]["file"]
        .as_str()
        .unwrap()
        .contains("handlers/user.go"));
    assert_eq!(locations[0]["line"], 4);
}

// ----------------------------------------------------------------------------
// Scenario: re-running discovery on an unchanged tree yields an identical
// profile up to the generation timestamp and duration metrics
// ----------------------------------------------------------------------------
#[test]
fn rerun_on_unchanged_tree_is_deterministic() {
    let tmp = tempfile::tempdir().unwrap();
    touch(&tmp.path().join("edge/pyproject.toml"), "[project]\nname = \"edge\"\n");
    touch(
        &tmp.path().join("edge/app/repositories/users.py"),
        "class UserRepository:\n    def get(self, user_id):\n        return None\n",
    );
    touch(&tmp.path().join("svc/go.mod"), "module example.com/svc\n");
    touch(&tmp.path().join("svc/main.go"), "package main\n\nfunc main() {}\n");

    let normalize = |mut profile: serde_json::Value| {
        profile["generated_at"] = serde_json::Value::Null;
        profile["discovery"]["duration_ms"] = serde_json::Value::Null;
        profile
    };

    let first = normalize(discover_json(tmp.path(), &[]));
    let second = normalize(discover_json(tmp.path(), &[]));
    assert_eq!(first, second);
}

// ----------------------------------------------------------------------------
// Scenario: a human-curated pattern detection in the prior profile survives
// a re-run bit-for-bit, even though auto-detection would disagree
// ----------------------------------------------------------------------------
#[test]
fn human_curated_pattern_survives_rerun() {
    let tmp = tempfile::tempdir().unwrap();
    touch(&tmp.path().join("edge/pyproject.toml"), "[project]\nname = \"edge\"\n");
    touch(&tmp.path().join("edge/app.py"), "import os\n");

    let out_dir = tmp.path().join(".strata");
    discover_json(tmp.path(), &[]);

    // Curate: a reviewer pins the repository pattern to their own verdict.
    let profile_path = out_dir.join("profile.json");
    let mut profile: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&profile_path).unwrap()).unwrap();
    profile["zones"]["edge"]["patterns"]["repository"] = serde_json::json!({
        "pattern": "repository",
        "detected": true,
        "variant": "reviewed-by-hand",
        "confidence": 0.99,
        "needs_review": false,
        "signals": [],
        "source": "human-curated"
    });
    std::fs::write(&profile_path, serde_json::to_string_pretty(&profile).unwrap()).unwrap();

    let rerun = discover_json(tmp.path(), &[]);
    let pattern = &rerun["zones"]["edge"]["patterns"]["repository"];
    assert_eq!(pattern["source"], "human-curated");
    assert_eq!(pattern["confidence"], 0.99);
    assert_eq!(pattern["variant"], "reviewed-by-hand");

    // Auto-detected values in other patterns are refreshed, not preserved.
    let other = &rerun["zones"]["edge"]["patterns"]["cqrs"];
    assert_eq!(other["source"], "auto-detected");
}

// ----------------------------------------------------------------------------
// Scenario: single-phase and single-zone runs
// ----------------------------------------------------------------------------
#[test]
fn phase_filter_limits_completed_phases() {
    let tmp = tempfile::tempdir().unwrap();
    touch(&tmp.path().join("edge/pyproject.toml"), "[project]\nname = \"edge\"\n");

    let profile = discover_json(tmp.path(), &["--phase", "conventions", "--dry-run"]);
    let phases: Vec<&str> = profile["discovery"]["phases_completed"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p.as_str().unwrap())
        .collect();
    assert!(phases.contains(&"zones"));
    assert!(phases.contains(&"conventions"));
    assert!(!phases.contains(&"patterns"));
}

#[test]
fn zone_filter_selects_single_zone() {
    let tmp = tempfile::tempdir().unwrap();
    touch(&tmp.path().join("edge/pyproject.toml"), "[project]\nname = \"edge\"\n");
    touch(&tmp.path().join("svc/go.mod"), "module example.com/svc\n");

    let profile = discover_json(tmp.path(), &["--zone", "edge", "--dry-run"]);
    let zones = profile["zones"].as_object().unwrap();
    assert_eq!(zones.len(), 1);
    assert!(zones.contains_key("edge"));
}

// ----------------------------------------------------------------------------
// Scenario: --diff reports changes against the previous profile
// ----------------------------------------------------------------------------
#[test]
fn diff_reports_new_zone() {
    let tmp = tempfile::tempdir().unwrap();
    touch(&tmp.path().join("edge/pyproject.toml"), "[project]\nname = \"edge\"\n");

    discover_json(tmp.path(), &[]);
    touch(&tmp.path().join("svc/go.mod"), "module example.com/svc\n");

    let output = strata_cmd()
        .args(["discover", tmp.path().to_str().unwrap(), "--diff"])
        .output()
        .expect("failed to run strata");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "{stdout}");
    assert!(stdout.contains("added") && stdout.contains("svc"), "{stdout}");
}

// ----------------------------------------------------------------------------
// Scenario: fatal inputs exit non-zero
// ----------------------------------------------------------------------------
#[test]
fn nonexistent_root_exits_nonzero() {
    let path = {
        let tmp = tempfile::tempdir().unwrap();
        tmp.path().to_path_buf()
    };

    let output = strata_cmd()
        .args(["discover", path.to_str().unwrap()])
        .output()
        .expect("failed to run strata");
    assert!(!output.status.success());
}

#[test]
fn malformed_config_exits_nonzero() {
    let tmp = tempfile::tempdir().unwrap();
    touch(&tmp.path().join("edge/pyproject.toml"), "[project]\nname = \"edge\"\n");
    touch(&tmp.path().join(".strata.toml"), "[zones.broken\npath =");

    let output = strata_cmd()
        .args(["discover", tmp.path().to_str().unwrap()])
        .output()
        .expect("failed to run strata");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.to_lowercase().contains("malformed") || stderr.contains("parse"), "{stderr}");
}

// ----------------------------------------------------------------------------
// Scenario: parse failures degrade gracefully and are logged, not fatal
// ----------------------------------------------------------------------------
#[test]
fn unreadable_source_file_is_logged_not_fatal() {
    let tmp = tempfile::tempdir().unwrap();
    touch(&tmp.path().join("edge/pyproject.toml"), "[project]\nname = \"edge\"\n");
    touch(&tmp.path().join("edge/ok.py"), "import os\n");
    // Invalid UTF-8 cannot be read to a string and must be skipped.
    std::fs::write(tmp.path().join("edge/bad.py"), [0xff, 0xfe, 0x00, 0xd8]).unwrap();

    let profile = discover_json(tmp.path(), &[]);
    assert_eq!(profile["discovery"]["zones_discovered"], 1);

    let log: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(tmp.path().join(".strata/discovery-log.json")).unwrap(),
    )
    .unwrap();
    let entries = log["entries"].as_array().unwrap();
    assert!(
        entries.iter().any(|e| e["path"].as_str().unwrap().contains("bad.py")),
        "{entries:?}"
    );
}
