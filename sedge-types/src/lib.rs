//! Wire level types shared by the sedge crates: the protobuf payload model,
//! typed metric values, topics and a few small utilities.

pub mod constants;

/// Sparkplug B protobuf payload types
pub mod payload;

pub mod topic;

pub mod utils;

mod value;

pub use value::*;

/// Represents a unique identifier of a metric
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum MetricId {
    Name(String),
    Alias(u64),
}
