//! CLI integration tests

use std::io::Write;
use std::process::{Command, Output};

const MANIFEST: &str = r#"
apiVersion: flare.clastix.io/v1alpha1
kind: Intent
metadata:
  name: job42
  namespace: acme-job42
spec:
  workload:
    type: Service
    name: web
    image: nginx:1.25
    ports:
      - port: 80
        protocol: TCP
        expose: true
        domain: acme.example.com
    resources:
      cpu: "2"
      memory: 4Gi
      gpu:
        model: H100
        architecture: Any
"#;

fn flarectl(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_flarectl"))
        .args(args)
        .env("HOME", std::env::temp_dir())
        .output()
        .expect("Failed to execute flarectl")
}

fn manifest(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_cli_help() {
    let output = flarectl(&["--help"]);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "CLI help should succeed");
    assert!(stdout.contains("Flare Intents"), "Should show app name");
    for command in ["get", "describe", "render", "delete"] {
        assert!(stdout.contains(command), "Should show {} command", command);
    }
}

#[test]
fn test_cli_version() {
    let output = flarectl(&["--version"]);

    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("flarectl"));
}

#[test]
fn test_get_intents_help() {
    let output = flarectl(&["get", "intents", "--help"]);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success());
    assert!(stdout.contains("--namespace"));
    assert!(stdout.contains("--all-namespaces"));
}

#[test]
fn test_namespace_conflicts_with_all_namespaces() {
    let output = flarectl(&["get", "intents", "-n", "acme-job42", "-A"]);

    assert!(!output.status.success());
}

#[test]
fn test_render_json() {
    let file = manifest(MANIFEST);

    let output = flarectl(&["--format", "json", "render", "-f", file.path().to_str().unwrap()]);

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let rendered: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();

    let gpu_filters = rendered["solverFilter"]["gpuFilters"].as_array().unwrap();
    assert_eq!(gpu_filters.len(), 1);
    assert_eq!(gpu_filters[0]["field"], "model");
    assert_eq!(rendered["solverFilter"]["cpuFilter"]["data"]["min"], "2");

    let objects = &rendered["objects"];
    assert_eq!(objects["service"]["metadata"]["name"], "acme-job42");
    assert_eq!(objects["ingress"]["spec"]["rules"][0]["host"], "acme.example.com");
    assert_eq!(objects["deployment"]["spec"]["replicas"], 1);
    assert!(objects.get("job").is_none());
}

#[test]
fn test_render_table_prints_yaml_sections() {
    let file = manifest(MANIFEST);

    let output = flarectl(&["render", "-f", file.path().to_str().unwrap()]);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success());
    assert!(stdout.contains("# Solver filter"));
    assert!(stdout.contains("# Runtime objects (3)"));
    assert!(stdout.contains("image: nginx:1.25"));
}

#[test]
fn test_render_requires_namespace() {
    let file = manifest(&MANIFEST.replace("  namespace: acme-job42\n", ""));

    let failed = flarectl(&["render", "-f", file.path().to_str().unwrap()]);
    assert!(!failed.status.success());
    assert!(String::from_utf8_lossy(&failed.stderr).contains("no namespace"));

    let output = flarectl(&[
        "--format",
        "json",
        "render",
        "-f",
        file.path().to_str().unwrap(),
        "-n",
        "acme-web",
    ]);
    assert!(output.status.success());
    let rendered: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(rendered["objects"]["deployment"]["metadata"]["namespace"], "acme-web");
}

#[test]
fn test_render_rejects_invalid_manifest() {
    let file = manifest("kind: Intent\nspec: 12\n");

    let output = flarectl(&["render", "-f", file.path().to_str().unwrap()]);

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("not a valid Intent manifest"));
}
