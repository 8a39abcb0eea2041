use std::{collections::HashMap, fmt, sync::Arc};

use log::{debug, warn};
use sedge_types::{
    constants::FIRST_USER_ALIAS,
    payload::{self, DataType},
    MetricType, MetricValue,
};

use crate::error::MetricError;

/// Callback invoked after a metric value is written.
///
/// Receives `None` when the metric was (re)set to its zero value and
/// `Some(value)` for an explicit write. It runs while the node's session is
/// locked, so it must not call back into a [NodeHandle](crate::NodeHandle).
pub type ChangeNotifier = Arc<dyn Fn(Option<&MetricValue>) + Send + Sync>;

/// A reference to a metric registered in a [MetricStore].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MetricHandle {
    alias: u64,
}

impl MetricHandle {
    pub fn alias(&self) -> u64 {
        self.alias
    }
}

/// Everything needed to register a metric.
///
/// ```
/// use sedge_node::MetricDetails;
/// use sedge_types::MetricType;
///
/// let details = MetricDetails::new("setpoint", MetricType::Float)
///     .device("temp-controller")
///     .readback(true);
/// ```
pub struct MetricDetails {
    name: String,
    metric_type: MetricType,
    device: Option<String>,
    readback: bool,
    is_historical: bool,
    is_transient: bool,
    on_change: Option<ChangeNotifier>,
}

impl MetricDetails {
    pub fn new<S: Into<String>>(name: S, metric_type: MetricType) -> Self {
        Self {
            name: name.into(),
            metric_type,
            device: None,
            readback: false,
            is_historical: false,
            is_transient: false,
            on_change: None,
        }
    }

    /// Attach the metric to a device. Metrics without a device belong to the node.
    pub fn device<S: Into<String>>(mut self, device_id: S) -> Self {
        self.device = Some(device_id.into());
        self
    }

    /// Echo the value back in a data message whenever a command changes it
    pub fn readback(mut self, readback: bool) -> Self {
        self.readback = readback;
        self
    }

    pub fn historical(mut self, is_historical: bool) -> Self {
        self.is_historical = is_historical;
        self
    }

    pub fn transient(mut self, is_transient: bool) -> Self {
        self.is_transient = is_transient;
        self
    }

    pub fn on_change<F>(mut self, f: F) -> Self
    where
        F: Fn(Option<&MetricValue>) + Send + Sync + 'static,
    {
        self.on_change = Some(Arc::new(f));
        self
    }

    pub fn device_id(&self) -> Option<&str> {
        self.device.as_deref()
    }
}

/// A registered metric
pub struct Metric {
    name: String,
    device: Option<String>,
    alias: u64,
    metric_type: MetricType,
    /* None only for metrics of an unsupported type */
    value: Option<MetricValue>,
    readback: bool,
    is_historical: bool,
    is_transient: bool,
    on_change: Option<ChangeNotifier>,
}

impl fmt::Debug for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Metric")
            .field("name", &self.name)
            .field("device", &self.device)
            .field("alias", &self.alias)
            .field("metric_type", &self.metric_type)
            .field("value", &self.value)
            .field("readback", &self.readback)
            .finish_non_exhaustive()
    }
}

impl Metric {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Owning device, `None` for node metrics
    pub fn device(&self) -> Option<&str> {
        self.device.as_deref()
    }

    pub fn alias(&self) -> u64 {
        self.alias
    }

    pub fn handle(&self) -> MetricHandle {
        MetricHandle { alias: self.alias }
    }

    pub fn metric_type(&self) -> MetricType {
        self.metric_type
    }

    /// Current value, `None` if the metric's type is unsupported
    pub fn value(&self) -> Option<&MetricValue> {
        self.value.as_ref()
    }

    pub fn readback(&self) -> bool {
        self.readback
    }

    pub fn is_historical(&self) -> bool {
        self.is_historical
    }

    pub fn is_transient(&self) -> bool {
        self.is_transient
    }

    fn datatype(&self) -> DataType {
        self.metric_type.datatype()
    }

    fn apply_flags(&self, metric: &mut payload::Metric) {
        if self.is_historical {
            metric.is_historical = Some(true);
        }
        if self.is_transient {
            metric.is_transient = Some(true);
        }
    }

    fn apply_value(&self, metric: &mut payload::Metric) {
        match &self.value {
            Some(value) => metric.set_value(value.clone().into()),
            None => metric.set_null(),
        };
    }

    /// The metric as it appears in a birth message: name, alias, type and current value
    pub fn to_birth_metric(&self, timestamp: u64) -> payload::Metric {
        let mut metric = payload::Metric::new();
        metric
            .set_name(self.name.clone())
            .set_alias(self.alias)
            .set_datatype(self.datatype())
            .set_timestamp(timestamp);
        self.apply_flags(&mut metric);
        self.apply_value(&mut metric);
        metric
    }

    /// The metric as it appears in a data message: addressed by alias only
    pub fn to_data_metric(&self, timestamp: u64) -> payload::Metric {
        let mut metric = payload::Metric::new();
        metric
            .set_alias(self.alias)
            .set_datatype(self.datatype())
            .set_timestamp(timestamp);
        self.apply_flags(&mut metric);
        self.apply_value(&mut metric);
        metric
    }

    fn notify(&self, value: Option<&MetricValue>) {
        if let Some(cb) = &self.on_change {
            cb(value)
        }
    }
}

/// The registry of every metric owned by a node and its devices.
///
/// Aliases are handed out from a counter that starts at
/// [FIRST_USER_ALIAS](sedge_types::constants::FIRST_USER_ALIAS) and never goes back, so
/// the aliases reserved for node control commands are never assigned.
/// Metrics are never removed.
pub struct MetricStore {
    metrics: Vec<Metric>,
    by_alias: HashMap<u64, usize>,
    by_name: HashMap<(Option<String>, String), usize>,
    next_alias: u64,
}

impl Default for MetricStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricStore {
    pub fn new() -> Self {
        Self::with_first_alias(FIRST_USER_ALIAS)
    }

    /// Create a store whose alias counter starts at `first_alias`.
    ///
    /// Values below the first user alias are raised to it.
    pub fn with_first_alias(first_alias: u64) -> Self {
        Self {
            metrics: Vec::new(),
            by_alias: HashMap::new(),
            by_name: HashMap::new(),
            next_alias: first_alias.max(FIRST_USER_ALIAS),
        }
    }

    /// The alias the next created metric will get
    pub fn next_alias(&self) -> u64 {
        self.next_alias
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    /// Register a metric and initialise it to its type's zero value.
    pub fn create<S: Into<String>>(
        &mut self,
        name: S,
        device_id: Option<&str>,
        metric_type: MetricType,
        readback: bool,
        on_change: Option<ChangeNotifier>,
    ) -> Result<MetricHandle, MetricError> {
        let mut details = MetricDetails::new(name, metric_type).readback(readback);
        details.device = device_id.map(str::to_string);
        details.on_change = on_change;
        self.create_with(details)
    }

    pub fn create_with(&mut self, details: MetricDetails) -> Result<MetricHandle, MetricError> {
        if details.name.is_empty() {
            return Err(MetricError::InvalidName(
                "metric name must not be empty".into(),
            ));
        }
        let key = (details.device.clone(), details.name.clone());
        if self.by_name.contains_key(&key) {
            return Err(MetricError::Duplicate);
        }

        let alias = self.next_alias;
        self.next_alias += 1;

        let index = self.metrics.len();
        self.metrics.push(Metric {
            name: details.name,
            device: details.device,
            alias,
            metric_type: details.metric_type,
            value: None,
            readback: details.readback,
            is_historical: details.is_historical,
            is_transient: details.is_transient,
            on_change: details.on_change,
        });
        self.by_alias.insert(alias, index);
        self.by_name.insert(key, index);

        let handle = MetricHandle { alias };
        if let Err(MetricError::UnsupportedType(t)) = self.set(handle, true, None) {
            warn!(
                "Metric registered with unsupported type, it will stay null. metric={} type={t:?}",
                self.metrics[index].name
            );
        }
        Ok(handle)
    }

    fn index(&self, handle: MetricHandle) -> Result<usize, MetricError> {
        self.by_alias
            .get(&handle.alias)
            .copied()
            .ok_or(MetricError::UnknownMetric)
    }

    pub fn metric(&self, handle: MetricHandle) -> Option<&Metric> {
        self.index(handle).ok().map(|i| &self.metrics[i])
    }

    pub fn by_alias(&self, alias: u64) -> Option<&Metric> {
        self.by_alias.get(&alias).map(|i| &self.metrics[*i])
    }

    pub fn by_name(&self, device_id: Option<&str>, name: &str) -> Option<&Metric> {
        self.by_name
            .get(&(device_id.map(str::to_string), name.to_string()))
            .map(|i| &self.metrics[*i])
    }

    /// All metrics of one scope, in creation order. `None` selects the node's own metrics.
    pub fn scope_metrics<'a>(&'a self, device_id: Option<&'a str>) -> impl Iterator<Item = &'a Metric> + 'a {
        self.metrics.iter().filter(move |m| m.device() == device_id)
    }

    pub fn get(&self, handle: MetricHandle) -> Result<MetricValue, MetricError> {
        let metric = &self.metrics[self.index(handle)?];
        metric
            .value
            .clone()
            .ok_or(MetricError::UnsupportedType(metric.metric_type))
    }

    /// Write a metric.
    ///
    /// With `zero` set the metric is reset to its type's zero value and `value` is
    /// ignored, otherwise `value` has to be provided and match the metric's type.
    /// On failure the stored value is left untouched and nothing is notified.
    pub fn set(
        &mut self,
        handle: MetricHandle,
        zero: bool,
        value: Option<MetricValue>,
    ) -> Result<(), MetricError> {
        let index = self.index(handle)?;
        let metric = &mut self.metrics[index];
        let metric_type = metric.metric_type;

        if !metric_type.is_supported() {
            return Err(MetricError::UnsupportedType(metric_type));
        }

        if zero {
            metric.value = metric_type.zero_value();
            debug!("Metric zeroed. metric={}", metric.name);
            metric.notify(None);
            return Ok(());
        }

        let value = value.ok_or(MetricError::Argument)?;
        let found = value.metric_type();
        if found != metric_type {
            return Err(MetricError::DatatypeMismatch {
                expected: metric_type,
                found,
            });
        }
        metric.value = Some(value);
        metric.notify(metric.value.as_ref());
        Ok(())
    }

    pub fn set_value<V: Into<MetricValue>>(
        &mut self,
        handle: MetricHandle,
        value: V,
    ) -> Result<(), MetricError> {
        self.set(handle, false, Some(value.into()))
    }
}
