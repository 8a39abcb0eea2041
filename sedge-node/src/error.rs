use prost::DecodeError;
use sedge_types::MetricType;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum MetricError {
  #[error("Either the zero flag or a value must be provided")]
  Argument,
  #[error("Metric type {0:?} is not supported")]
  UnsupportedType(MetricType),
  #[error("Datatype mismatch: expected {expected:?}, found {found:?}")]
  DatatypeMismatch {
    expected: MetricType,
    found: MetricType,
  },
  #[error("Unknown metric")]
  UnknownMetric,
  #[error("Duplicate metric")]
  Duplicate,
  #[error("Invalid metric name: {0}")]
  InvalidName(String),
  #[error("Unknown device")]
  UnknownDevice,
}

#[derive(Error, Debug)]
pub enum CommandError {
  #[error("Unable to decode command payload: {0}")]
  DecodeFailure(#[from] DecodeError),
  #[error("Command did not match any known metric")]
  UnrecognizedCommand,
}

#[derive(Error, Debug, PartialEq)]
pub enum DeviceError {
  #[error("Invalid device name: {0}")]
  InvalidName(String),
  #[error("Duplicate device")]
  Duplicate,
  #[error("Unknown device")]
  Unknown,
}
