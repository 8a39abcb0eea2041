use thiserror::Error;

use crate::payload::{metric, DataType};

/// The declared type of a metric.
///
/// Only the scalar types have a value representation at this layer. The
/// remaining structured types can be declared, but metrics using them are
/// inert: see [MetricType::is_supported].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MetricType {
    Int32,
    Int64,
    UInt32,
    UInt64,
    Float,
    Double,
    Boolean,
    String,
    DateTime,
    Text,
    Uuid,
    DataSet,
    Bytes,
    File,
    Template,
}

impl MetricType {
    /// Sparkplug datatype code used on the wire
    pub fn datatype(&self) -> DataType {
        match self {
            MetricType::Int32 => DataType::Int32,
            MetricType::Int64 => DataType::Int64,
            MetricType::UInt32 => DataType::UInt32,
            MetricType::UInt64 => DataType::UInt64,
            MetricType::Float => DataType::Float,
            MetricType::Double => DataType::Double,
            MetricType::Boolean => DataType::Boolean,
            MetricType::String => DataType::String,
            MetricType::DateTime => DataType::DateTime,
            MetricType::Text => DataType::Text,
            MetricType::Uuid => DataType::Uuid,
            MetricType::DataSet => DataType::DataSet,
            MetricType::Bytes => DataType::Bytes,
            MetricType::File => DataType::File,
            MetricType::Template => DataType::Template,
        }
    }

    /// The metric type a wire value naturally decodes to
    pub fn of_wire(value: &metric::Value) -> MetricType {
        match value {
            metric::Value::IntValue(_) => MetricType::UInt32,
            metric::Value::LongValue(_) => MetricType::UInt64,
            metric::Value::FloatValue(_) => MetricType::Float,
            metric::Value::DoubleValue(_) => MetricType::Double,
            metric::Value::BooleanValue(_) => MetricType::Boolean,
            metric::Value::StringValue(_) => MetricType::String,
            metric::Value::BytesValue(_) => MetricType::Bytes,
        }
    }

    pub fn is_supported(&self) -> bool {
        self.zero_value().is_some()
    }

    /// The zero value of the type, `None` for the unsupported types
    pub fn zero_value(&self) -> Option<MetricValue> {
        let zero = match self {
            MetricType::Int32 => MetricValue::Int32(0),
            MetricType::Int64 => MetricValue::Int64(0),
            MetricType::UInt32 => MetricValue::UInt32(0),
            MetricType::UInt64 => MetricValue::UInt64(0),
            MetricType::Float => MetricValue::Float(0.0),
            MetricType::Double => MetricValue::Double(0.0),
            MetricType::Boolean => MetricValue::Boolean(false),
            MetricType::String => MetricValue::String(String::new()),
            MetricType::DateTime
            | MetricType::Text
            | MetricType::Uuid
            | MetricType::DataSet
            | MetricType::Bytes
            | MetricType::File
            | MetricType::Template => return None,
        };
        Some(zero)
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ValueError {
    #[error("Metric type {0:?} has no value representation")]
    Unsupported(MetricType),
    #[error("Wire value variant does not match metric type {0:?}")]
    InvalidVariant(MetricType),
}

/// A typed metric value
#[derive(Clone, Debug, PartialEq)]
pub enum MetricValue {
    Int32(i32),
    Int64(i64),
    UInt32(u32),
    UInt64(u64),
    Float(f32),
    Double(f64),
    Boolean(bool),
    String(String),
}

impl MetricValue {
    pub fn metric_type(&self) -> MetricType {
        match self {
            MetricValue::Int32(_) => MetricType::Int32,
            MetricValue::Int64(_) => MetricType::Int64,
            MetricValue::UInt32(_) => MetricType::UInt32,
            MetricValue::UInt64(_) => MetricType::UInt64,
            MetricValue::Float(_) => MetricType::Float,
            MetricValue::Double(_) => MetricType::Double,
            MetricValue::Boolean(_) => MetricType::Boolean,
            MetricValue::String(_) => MetricType::String,
        }
    }

    /// Convert a wire value into a value of the given metric type.
    ///
    /// Float and double wire values are accepted for either floating point
    /// type, every other combination has to match the type's wire encoding.
    pub fn from_wire(metric_type: MetricType, value: metric::Value) -> Result<Self, ValueError> {
        use metric::Value as Wire;
        let value = match (metric_type, value) {
            (MetricType::Int32, Wire::IntValue(v)) => MetricValue::Int32(i32::from_le_bytes(v.to_le_bytes())),
            (MetricType::UInt32, Wire::IntValue(v)) => MetricValue::UInt32(v),
            (MetricType::Int64, Wire::LongValue(v)) => MetricValue::Int64(i64::from_le_bytes(v.to_le_bytes())),
            (MetricType::UInt64, Wire::LongValue(v)) => MetricValue::UInt64(v),
            (MetricType::Float, Wire::FloatValue(v)) => MetricValue::Float(v),
            (MetricType::Float, Wire::DoubleValue(v)) => MetricValue::Float(v as f32),
            (MetricType::Double, Wire::DoubleValue(v)) => MetricValue::Double(v),
            (MetricType::Double, Wire::FloatValue(v)) => MetricValue::Double(v as f64),
            (MetricType::Boolean, Wire::BooleanValue(v)) => MetricValue::Boolean(v),
            (MetricType::String, Wire::StringValue(v)) => MetricValue::String(v),
            (t, _) if !t.is_supported() => return Err(ValueError::Unsupported(t)),
            (t, _) => return Err(ValueError::InvalidVariant(t)),
        };
        Ok(value)
    }
}

impl From<MetricValue> for metric::Value {
    fn from(value: MetricValue) -> Self {
        match value {
            MetricValue::Int32(v) => metric::Value::IntValue(u32::from_le_bytes(v.to_le_bytes())),
            MetricValue::Int64(v) => metric::Value::LongValue(u64::from_le_bytes(v.to_le_bytes())),
            MetricValue::UInt32(v) => metric::Value::IntValue(v),
            MetricValue::UInt64(v) => metric::Value::LongValue(v),
            MetricValue::Float(v) => metric::Value::FloatValue(v),
            MetricValue::Double(v) => metric::Value::DoubleValue(v),
            MetricValue::Boolean(v) => metric::Value::BooleanValue(v),
            MetricValue::String(v) => metric::Value::StringValue(v),
        }
    }
}

macro_rules! impl_from_for_metric_value {
    ($type:ty, $variant:path) => {
        impl From<$type> for MetricValue {
            fn from(value: $type) -> Self {
                $variant(value)
            }
        }
    };
}

impl_from_for_metric_value!(i32, MetricValue::Int32);
impl_from_for_metric_value!(i64, MetricValue::Int64);
impl_from_for_metric_value!(u32, MetricValue::UInt32);
impl_from_for_metric_value!(u64, MetricValue::UInt64);
impl_from_for_metric_value!(f32, MetricValue::Float);
impl_from_for_metric_value!(f64, MetricValue::Double);
impl_from_for_metric_value!(bool, MetricValue::Boolean);
impl_from_for_metric_value!(String, MetricValue::String);

impl From<&str> for MetricValue {
    fn from(value: &str) -> Self {
        MetricValue::String(value.to_string())
    }
}
