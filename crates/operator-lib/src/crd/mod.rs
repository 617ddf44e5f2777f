//! Custom resource definitions
//!
//! The Intent resource served by this operator plus the foreign resources
//! it creates or reads from the provider search and offloading systems.

mod conditions;
mod duration;
mod external;
mod intent;

pub use conditions::{Condition, ConditionStatus, ConditionType, Conditions};
pub use duration::{DurationParseError, WorkloadDuration};
pub use external::*;
pub use intent::*;
