//! Intent inspection and deletion commands

use anyhow::{Context, Result};
use colored::Colorize;
use operator_lib::crd::{ConditionType, WorkloadType};
use operator_lib::{reclaim_external_resources, Intent, KubeStore, ObjectStore};
use tabled::Tabled;

use crate::output::{
    color_condition, format_age, print_info, print_items, print_json, print_success,
    print_warning, OutputFormat,
};

/// Row for the Intent list
#[derive(Tabled)]
struct IntentRow {
    #[tabled(rename = "Namespace")]
    namespace: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Type")]
    workload_type: String,
    #[tabled(rename = "Solver")]
    solver: String,
    #[tabled(rename = "Offloading")]
    offloading: String,
    #[tabled(rename = "Deploy")]
    deploy: String,
    #[tabled(rename = "Age")]
    age: String,
}

/// Row for the condition table of `describe`
#[derive(Tabled)]
struct ConditionRow {
    #[tabled(rename = "Type")]
    condition_type: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Reason")]
    reason: String,
    #[tabled(rename = "Message")]
    message: String,
    #[tabled(rename = "Generation")]
    generation: String,
    #[tabled(rename = "Last Transition")]
    last_transition: String,
}

fn workload_type_name(workload_type: WorkloadType) -> &'static str {
    match workload_type {
        WorkloadType::Service => "Service",
        WorkloadType::Batch => "Batch",
    }
}

fn intent_row(intent: &Intent) -> IntentRow {
    let status = |phase| color_condition(intent.condition_status(phase).map(|s| s.as_str()));
    IntentRow {
        namespace: intent.metadata.namespace.clone().unwrap_or_default(),
        name: intent.metadata.name.clone().unwrap_or_default(),
        workload_type: workload_type_name(intent.spec.workload.workload_type).to_string(),
        solver: status(ConditionType::Solver),
        offloading: status(ConditionType::NamespaceOffloading),
        deploy: status(ConditionType::Deploy),
        age: intent
            .metadata
            .creation_timestamp
            .as_ref()
            .map(|t| format_age(t.0))
            .unwrap_or_else(|| "-".to_string()),
    }
}

/// List Intents in one namespace, or in all of them
pub async fn get_intents(
    store: &KubeStore,
    namespace: Option<&str>,
    format: OutputFormat,
) -> Result<()> {
    let intents: Vec<Intent> = store
        .list(namespace)
        .await
        .context("Failed to list Intents")?;
    print_items(&intents, format, intent_row)
}

async fn fetch(store: &KubeStore, namespace: &str, name: &str) -> Result<Intent> {
    store
        .get(namespace, name)
        .await
        .with_context(|| format!("Failed to get Intent {}/{}", namespace, name))
}

/// Show an Intent's workload and conditions
pub async fn describe_intent(
    store: &KubeStore,
    namespace: &str,
    name: &str,
    format: OutputFormat,
) -> Result<()> {
    let intent = fetch(store, namespace, name).await?;

    if let OutputFormat::Json = format {
        return print_json(&intent);
    }

    let workload = &intent.spec.workload;
    println!("{}", "Intent".bold());
    println!("{}", "=".repeat(60));
    println!("Name:       {}", name.cyan());
    println!("Namespace:  {}", namespace.cyan());
    println!(
        "Workload:   {} ({}, {})",
        workload.name,
        workload_type_name(workload.workload_type),
        workload.image
    );
    if let Some(generation) = intent.metadata.generation {
        println!("Generation: {}", generation);
    }
    println!();

    let rows: Vec<ConditionRow> = intent
        .status
        .iter()
        .flat_map(|status| status.conditions.iter())
        .map(|c| ConditionRow {
            condition_type: c.type_.clone(),
            status: color_condition(Some(c.status.as_str())),
            reason: c.reason.clone(),
            message: c.message.clone(),
            generation: c
                .observed_generation
                .map(|g| g.to_string())
                .unwrap_or_else(|| "-".to_string()),
            last_transition: format_age(c.last_transition_time),
        })
        .collect();

    if rows.is_empty() {
        print_warning("No conditions recorded yet");
        return Ok(());
    }

    let table = tabled::Table::new(rows)
        .with(tabled::settings::Style::rounded())
        .to_string();
    println!("{}", table);
    Ok(())
}

/// Delete an Intent and the objects its owner references do not cover
pub async fn delete_intent(
    store: &KubeStore,
    namespace: &str,
    name: &str,
    fluidos_namespace: &str,
) -> Result<()> {
    let intent = fetch(store, namespace, name).await?;

    store
        .delete::<Intent>(namespace, name)
        .await
        .with_context(|| format!("Failed to delete Intent {}/{}", namespace, name))?;
    print_success(&format!("Intent {}/{} deleted", namespace, name));

    let reclaimed = reclaim_external_resources(store, &intent, fluidos_namespace)
        .await
        .context("Failed to reclaim external resources")?;
    if reclaimed.solver {
        print_info(&format!("Solver {}/{} deleted", fluidos_namespace, namespace));
    }
    if reclaimed.namespace_offloading {
        print_info(&format!("NamespaceOffloading in {} deleted", namespace));
    }
    Ok(())
}
