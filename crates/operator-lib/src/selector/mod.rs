//! Selector compiler
//!
//! Turns the resource block of an Intent workload into the filter document
//! handed to the solver. A clause is only emitted for a field that actually
//! constrains the search; an absent clause means "don't care".

mod quantity;

pub use quantity::{canonical as canonical_quantity, is_zero as quantity_is_zero};

use crate::crd::{GpuRequirements, WorkloadResources};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Selector kinds understood by the solver
pub mod kind {
    pub const RANGE: &str = "ResourceRangeSelector";
    pub const MATCH: &str = "ResourceMatchSelector";
    pub const BOOLEAN: &str = "BooleanFilter";
    pub const NUMBER_MATCH: &str = "NumberMatchSelector";
    pub const STRING: &str = "StringFilter";
}

/// Quantity filter type used for cpu and memory
pub const RANGE_FILTER: &str = "Range";

/// Compiled filter document for a K8Slice flavor search
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SliceSelector {
    #[serde(default)]
    pub gpu_filters: Vec<GpuFieldSelector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_filter: Option<QuantityFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_filter: Option<QuantityFilter>,
}

/// One clause over a GPU attribute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpuFieldSelector {
    pub field: String,
    pub selector: String,
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantityFilter {
    pub name: String,
    pub data: Value,
}

impl SliceSelector {
    /// Look up the clause emitted for a GPU field
    pub fn gpu_filter(&self, field: &str) -> Option<&GpuFieldSelector> {
        self.gpu_filters.iter().find(|f| f.field == field)
    }

    /// Serialize into the opaque payload attached to the solver request
    pub fn to_value(&self) -> Value {
        // Only strings, numbers and JSON values are involved
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    fn push(&mut self, field: &str, selector: &str, data: Value) {
        self.gpu_filters.push(GpuFieldSelector {
            field: field.to_string(),
            selector: selector.to_string(),
            data,
        });
    }
}

/// Compile a workload's resource block into a filter document
pub fn compile(resources: &WorkloadResources) -> SliceSelector {
    let mut selector = SliceSelector::default();
    compile_gpu(&resources.gpu, &mut selector);

    if let Some(memory) = resources.memory.as_ref().filter(|q| !quantity_is_zero(q)) {
        selector.memory_filter = Some(QuantityFilter {
            name: RANGE_FILTER.to_string(),
            data: json!({ "min": canonical_quantity(memory) }),
        });
    }
    if let Some(cpu) = resources.cpu.as_ref().filter(|q| !quantity_is_zero(q)) {
        selector.cpu_filter = Some(QuantityFilter {
            name: RANGE_FILTER.to_string(),
            data: json!({ "min": canonical_quantity(cpu) }),
        });
    }

    selector
}

fn compile_gpu(gpu: &GpuRequirements, out: &mut SliceSelector) {
    if let Some(efficiency) = gpu.multi_gpu_efficiency.filter(|v| *v > 0.0) {
        out.push("multi_gpu_efficiency", kind::RANGE, json!({ "min": efficiency }));
    }
    if let Some(topology) = gpu.topology {
        out.push("topology", kind::MATCH, json!({ "value": topology.as_str() }));
    }
    if let Some(tflops) = gpu.fp32_tflops.filter(|v| *v > 0.0) {
        out.push("fp32_tflops", kind::RANGE, json!({ "min": tflops }));
    }

    let flags = [
        ("dedicated", gpu.dedicated),
        ("multi_instance", gpu.multi_instance),
        ("interruptible", gpu.interruptible),
    ];
    for (field, flag) in flags {
        if let Some(flag) = flag {
            out.push(field, kind::BOOLEAN, Value::Bool(flag));
        }
    }

    if let Some(interconnect) = &gpu.interconnect {
        out.push("interconnect", kind::MATCH, json!({ "value": interconnect }));
    }
    if let Some(shared) = gpu.shared {
        out.push("shared", kind::BOOLEAN, Value::Bool(shared));
    }

    let matches = [
        ("tier", &gpu.tier),
        ("architecture", &gpu.architecture),
        ("compute_capability", &gpu.compute_capability),
    ];
    for (field, value) in matches {
        if let Some(value) = value {
            out.push(field, kind::MATCH, json!({ "value": value }));
        }
    }

    if let Some(range) = quantity_range(&gpu.clock_speed_min, &gpu.clock_speed_max) {
        out.push("clock_speed", kind::RANGE, range);
    }

    let cores_min = gpu.cores_min.filter(|v| *v > 0);
    let cores_max = gpu.cores_max.filter(|v| *v > 0);
    if cores_min.is_some() || cores_max.is_some() {
        let mut range = serde_json::Map::new();
        if let Some(min) = cores_min {
            range.insert("min".into(), json!(min as f64));
        }
        if let Some(max) = cores_max {
            range.insert("max".into(), json!(max as f64));
        }
        out.push("cores", kind::RANGE, Value::Object(range));
    }

    if let Some(range) = quantity_range(&gpu.memory_min, &gpu.memory_max) {
        out.push("memory", kind::RANGE, range);
    }
    if let Some(count) = gpu.count.filter(|c| *c > 0) {
        out.push("count", kind::NUMBER_MATCH, json!({ "value": count as f64 }));
    }
    if let Some(model) = &gpu.model {
        out.push("model", kind::STRING, json!({ "value": model }));
    }
}

fn quantity_range(min: &Option<Quantity>, max: &Option<Quantity>) -> Option<Value> {
    let min = min.as_ref().filter(|q| !quantity_is_zero(q));
    let max = max.as_ref().filter(|q| !quantity_is_zero(q));
    if min.is_none() && max.is_none() {
        return None;
    }

    let mut range = serde_json::Map::new();
    if let Some(min) = min {
        range.insert("min".into(), json!(canonical_quantity(min)));
    }
    if let Some(max) = max {
        range.insert("max".into(), json!(canonical_quantity(max)));
    }
    Some(Value::Object(range))
}
