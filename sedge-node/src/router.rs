use log::{debug, warn};
use sedge_types::{
    constants::{
        ALIAS_NEXT_SERVER, ALIAS_REBIRTH, ALIAS_REBOOT, NODE_CONTROL_NEXT_SERVER,
        NODE_CONTROL_REBIRTH, NODE_CONTROL_REBOOT,
    },
    payload::{metric, Message, Payload},
    MetricId, MetricType, MetricValue, ValueError,
};

use crate::{
    error::{CommandError, MetricError},
    metric::{MetricHandle, MetricStore},
};

/// The built-in node commands bound to the reserved aliases
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeCommand {
    NextServer,
    Rebirth,
    Reboot,
}

impl NodeCommand {
    fn from_id(id: &MetricId) -> Option<Self> {
        match id {
            MetricId::Alias(ALIAS_NEXT_SERVER) => Some(NodeCommand::NextServer),
            MetricId::Alias(ALIAS_REBIRTH) => Some(NodeCommand::Rebirth),
            MetricId::Alias(ALIAS_REBOOT) => Some(NodeCommand::Reboot),
            MetricId::Name(name) => match name.as_str() {
                NODE_CONTROL_NEXT_SERVER => Some(NodeCommand::NextServer),
                NODE_CONTROL_REBIRTH => Some(NodeCommand::Rebirth),
                NODE_CONTROL_REBOOT => Some(NodeCommand::Reboot),
                _ => None,
            },
            MetricId::Alias(_) => None,
        }
    }
}

/// One decoded entry of a command payload
#[derive(Clone, Debug, PartialEq)]
pub struct CommandMetric {
    pub id: MetricId,
    /// `None` when the entry was sent as null
    pub value: Option<metric::Value>,
}

impl CommandMetric {
    pub fn new(id: MetricId, value: Option<metric::Value>) -> Self {
        Self { id, value }
    }
}

/// Something the caller has to do as a result of routing a command
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RouteAction {
    Node(NodeCommand),
    /// Publish the current value of a metric that was changed by the command
    Readback(MetricHandle),
}

/// Routes command metrics to the node's built-in commands or to metric writes.
///
/// A command succeeds if at least one of its entries was recognized; entries
/// that match nothing are dropped.
pub struct CommandRouter<'a> {
    store: &'a mut MetricStore,
}

impl<'a> CommandRouter<'a> {
    pub fn new(store: &'a mut MetricStore) -> Self {
        Self { store }
    }

    /// Decode a raw command payload into its ordered list of entries.
    ///
    /// Entries addressed by alias keep the alias even if a name is also present.
    /// Entries with neither are skipped.
    pub fn decode(raw: &[u8]) -> Result<Vec<CommandMetric>, CommandError> {
        let payload = Payload::decode(raw)?;
        let metrics = payload
            .metrics
            .into_iter()
            .filter_map(|m| {
                let id = match (m.alias, m.name) {
                    (Some(alias), _) => MetricId::Alias(alias),
                    (None, Some(name)) => MetricId::Name(name),
                    (None, None) => return None,
                };
                let value = if m.is_null == Some(true) { None } else { m.value };
                Some(CommandMetric::new(id, value))
            })
            .collect();
        Ok(metrics)
    }

    /// Route decoded entries against the metrics of one scope.
    ///
    /// `device_id` selects the device whose metrics may be written, `None`
    /// selects the node's own metrics. The returned actions are in command order.
    pub fn route(
        &mut self,
        device_id: Option<&str>,
        metrics: Vec<CommandMetric>,
    ) -> Result<Vec<RouteAction>, CommandError> {
        let mut recognized = 0;
        let mut actions = Vec::new();

        for CommandMetric { id, value } in metrics {
            if let Some(command) = NodeCommand::from_id(&id) {
                recognized += 1;
                actions.push(RouteAction::Node(command));
                continue;
            }

            let Some(target) = self.find(device_id, &id) else {
                debug!("Command metric did not match anything. metric={id:?}");
                continue;
            };

            match self.write(target, value) {
                Ok(readback) => {
                    recognized += 1;
                    if readback {
                        actions.push(RouteAction::Readback(target));
                    }
                }
                Err(e) => warn!("Rejected command write. metric={id:?} error={e}"),
            }
        }

        if recognized == 0 {
            return Err(CommandError::UnrecognizedCommand);
        }
        Ok(actions)
    }

    fn find(&self, device_id: Option<&str>, id: &MetricId) -> Option<MetricHandle> {
        let metric = match id {
            MetricId::Alias(alias) => self
                .store
                .by_alias(*alias)
                .filter(|m| m.device() == device_id)?,
            MetricId::Name(name) => self.store.by_name(device_id, name)?,
        };
        Some(metric.handle())
    }

    /// Returns whether the metric wants its value echoed back
    fn write(
        &mut self,
        handle: MetricHandle,
        value: Option<metric::Value>,
    ) -> Result<bool, MetricError> {
        let metric = self.store.metric(handle).ok_or(MetricError::UnknownMetric)?;
        let expected = metric.metric_type();
        let readback = metric.readback();

        let value = match value {
            Some(wire) => {
                let found = MetricType::of_wire(&wire);
                Some(MetricValue::from_wire(expected, wire).map_err(|e| match e {
                    ValueError::Unsupported(t) => MetricError::UnsupportedType(t),
                    ValueError::InvalidVariant(_) => {
                        MetricError::DatatypeMismatch { expected, found }
                    }
                })?)
            }
            None => None,
        };
        self.store.set(handle, false, value)?;
        Ok(readback)
    }
}
