//! Offline preview of what the operator derives from an Intent manifest

use anyhow::{bail, Context, Result};
use colored::Colorize;
use operator_lib::{selector, synth, Intent};
use serde::Serialize;
use std::path::Path;

use crate::output::{print_json, OutputFormat};

/// Everything rendered from one manifest
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Rendered {
    solver_filter: serde_json::Value,
    objects: synth::RuntimeObjects,
}

/// Parse an Intent manifest; YAML is a superset of JSON so both are accepted
///
/// Runtime objects are named after the Intent's namespace, so one must come
/// from either the manifest or `namespace`.
pub fn read_manifest(path: &Path, namespace: Option<String>) -> Result<Intent> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let mut intent: Intent = serde_yaml::from_str(&content)
        .with_context(|| format!("{} is not a valid Intent manifest", path.display()))?;

    if namespace.is_some() {
        intent.metadata.namespace = namespace;
    }
    if intent.metadata.namespace.is_none() {
        bail!("{} has no namespace; pass --namespace", path.display());
    }
    Ok(intent)
}

/// Print the compiled solver filter and the synthesized runtime objects
pub fn render(path: &Path, namespace: Option<String>, format: OutputFormat) -> Result<()> {
    let intent = read_manifest(path, namespace)?;
    let rendered = Rendered {
        solver_filter: selector::compile(&intent.spec.workload.resources).to_value(),
        objects: synth::render(&intent),
    };

    match format {
        OutputFormat::Json => print_json(&rendered),
        OutputFormat::Table => {
            println!("{}", "# Solver filter".bold());
            print!("{}", serde_yaml::to_string(&rendered.solver_filter)?);
            println!("{}", format!("# Runtime objects ({})", rendered.objects.len()).bold());
            print!("{}", serde_yaml::to_string(&rendered.objects)?);
            Ok(())
        }
    }
}
