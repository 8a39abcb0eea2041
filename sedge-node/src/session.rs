use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use log::{debug, info, warn};
use sedge_client::LastWill;
use sedge_types::{payload, utils::timestamp, MetricValue};

use crate::{
    error::{CommandError, DeviceError, MetricError},
    lifecycle::{BirthState, LifecycleController},
    lwt::LwtCoordinator,
    metric::{MetricDetails, MetricHandle, MetricStore},
    outbound::Outbound,
    router::{CommandRouter, NodeCommand, RouteAction},
};

/// Callback bound to one of the built-in node commands.
///
/// Invoked with the session locked, it must not call back into a
/// [NodeHandle](crate::NodeHandle).
pub type CommandHandler = Arc<dyn Fn() + Send + Sync>;

/// Optional hooks for the built-in node commands
#[derive(Clone, Default)]
pub struct CommandHandlers {
    pub next_server: Option<CommandHandler>,
    /// Runs after the built-in rebirth
    pub rebirth: Option<CommandHandler>,
    pub reboot: Option<CommandHandler>,
}

/// All mutable state of one edge node.
///
/// Operations return the transport requests they produced, in the order they
/// have to be executed.
pub struct Session {
    store: MetricStore,
    lifecycle: LifecycleController,
    lwt: LwtCoordinator,
    handlers: CommandHandlers,
    rebirth_cooldown: Duration,
    last_rebirth: Option<Instant>,
}

impl Session {
    pub fn new(group_id: &str, node_id: &str) -> Self {
        Self::with_store(group_id, node_id, MetricStore::new())
    }

    pub fn with_store(group_id: &str, node_id: &str, store: MetricStore) -> Self {
        Self {
            store,
            lifecycle: LifecycleController::new(group_id, node_id),
            lwt: LwtCoordinator::new(group_id, node_id),
            handlers: CommandHandlers::default(),
            rebirth_cooldown: Duration::ZERO,
            last_rebirth: None,
        }
    }

    pub fn set_handlers(&mut self, handlers: CommandHandlers) {
        self.handlers = handlers;
    }

    /// Command triggered rebirths arriving within `cooldown` of the previous one are ignored
    pub fn set_rebirth_cooldown(&mut self, cooldown: Duration) {
        self.rebirth_cooldown = cooldown;
    }

    pub fn store(&self) -> &MetricStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut MetricStore {
        &mut self.store
    }

    pub fn lifecycle(&self) -> &LifecycleController {
        &self.lifecycle
    }

    pub fn lwt(&self) -> &LwtCoordinator {
        &self.lwt
    }

    pub fn node_id(&self) -> &str {
        self.lifecycle.node_id()
    }

    pub fn register_device(&mut self, device_id: &str) -> Result<(), DeviceError> {
        self.lifecycle.register_device(device_id)?;
        info!(
            "Device registered. node={} device={device_id}",
            self.lifecycle.node_id()
        );
        Ok(())
    }

    pub fn create_metric(&mut self, details: MetricDetails) -> Result<MetricHandle, MetricError> {
        if let Some(device_id) = details.device_id() {
            if !self.lifecycle.has_device(device_id) {
                return Err(MetricError::UnknownDevice);
            }
        }
        self.store.create_with(details)
    }

    /// The will to install before the first connection attempt
    pub fn initial_will(&mut self) -> LastWill {
        self.lwt.compute(self.lifecycle.bdseq())
    }

    pub fn on_online(&mut self) -> Vec<Outbound> {
        let mut out = Vec::new();
        if self.lifecycle.is_online() {
            return out;
        }
        info!("Edge node online. node={}", self.node_id());
        self.lifecycle.set_online();
        self.lifecycle.birth_all(&self.store, &mut out);
        out
    }

    /// Everything is dead; the next connection has to promise the next bdSeq
    pub fn on_offline(&mut self) -> Vec<Outbound> {
        info!("Edge node offline. node={}", self.node_id());
        self.lifecycle.set_offline();
        vec![Outbound::Will(self.lwt.compute(self.lifecycle.bdseq()))]
    }

    /// Re-register the will then birth the node and all enabled devices again
    pub fn rebirth(&mut self) -> Vec<Outbound> {
        let mut out = Vec::new();
        if !self.lifecycle.is_online() || self.lifecycle.node_state() != BirthState::Born {
            info!(
                "Ignoring rebirth request, node is not born. node={}",
                self.node_id()
            );
            return out;
        }
        info!("Rebirthing node. node={}", self.node_id());
        self.lifecycle.mark_unborn();
        out.push(Outbound::Will(self.lwt.compute(self.lifecycle.bdseq())));
        self.lifecycle.birth_all(&self.store, &mut out);
        out
    }

    fn command_rebirth(&mut self, out: &mut Vec<Outbound>) {
        let now = Instant::now();
        if let Some(last) = self.last_rebirth {
            if now.duration_since(last) < self.rebirth_cooldown {
                info!(
                    "Got Rebirth CMD but cooldown time not expired. Ignoring. node={}",
                    self.node_id()
                );
                return;
            }
        }
        let rebirth = self.rebirth();
        if rebirth.is_empty() {
            return;
        }
        out.extend(rebirth);
        self.last_rebirth = Some(now);
        if let Some(hook) = &self.handlers.rebirth {
            hook();
        }
    }

    fn run_handler(&self, command: NodeCommand, handler: Option<&CommandHandler>) {
        match handler {
            Some(handler) => {
                info!("Running {command:?} handler. node={}", self.node_id());
                handler()
            }
            None => info!(
                "No handler registered for {command:?}, ignoring. node={}",
                self.node_id()
            ),
        }
    }

    fn readback(&mut self, handle: MetricHandle, out: &mut Vec<Outbound>) {
        let Some(metric) = self.store.metric(handle) else {
            return;
        };
        let data = vec![metric.to_data_metric(timestamp())];
        let published = match metric.device().map(str::to_string) {
            Some(device_id) => self.lifecycle.device_data(&device_id, data, out),
            None => self.lifecycle.node_data(data, out),
        };
        if !published {
            debug!("Readback skipped, owner not born. alias={}", handle.alias());
        }
    }

    /// Decode and route an inbound command.
    ///
    /// `device_id` is `None` for NCMD and the target device for DCMD. On error
    /// nothing was changed and nothing is published.
    pub fn handle_command(
        &mut self,
        device_id: Option<&str>,
        raw: &[u8],
    ) -> Result<Vec<Outbound>, CommandError> {
        let metrics = CommandRouter::decode(raw)?;
        if let Some(device_id) = device_id {
            if !self.lifecycle.has_device(device_id) {
                return Err(CommandError::UnrecognizedCommand);
            }
        }

        let actions = CommandRouter::new(&mut self.store).route(device_id, metrics)?;

        let mut out = Vec::new();
        for action in actions {
            match action {
                RouteAction::Node(NodeCommand::Rebirth) => self.command_rebirth(&mut out),
                RouteAction::Node(command @ NodeCommand::NextServer) => {
                    self.run_handler(command, self.handlers.next_server.as_ref())
                }
                RouteAction::Node(command @ NodeCommand::Reboot) => {
                    self.run_handler(command, self.handlers.reboot.as_ref())
                }
                RouteAction::Readback(handle) => self.readback(handle, &mut out),
            }
        }
        Ok(out)
    }

    pub fn birth_device(&mut self, device_id: &str) -> Result<Vec<Outbound>, DeviceError> {
        let mut out = Vec::new();
        if self.lifecycle.device_state(device_id) == Some(BirthState::Born) {
            debug!(
                "Device already born. node={} device={device_id}",
                self.node_id()
            );
            return Ok(out);
        }
        self.lifecycle.birth_device(device_id, &self.store, &mut out)?;
        Ok(out)
    }

    pub fn death_device(&mut self, device_id: &str) -> Result<Vec<Outbound>, DeviceError> {
        let mut out = Vec::new();
        self.lifecycle.death_device(device_id, &mut out)?;
        Ok(out)
    }

    /// Publish the current values of `handles`, one data message per owner.
    ///
    /// Node metrics go out first, then devices in registration order. Metrics
    /// whose owner is not born are skipped.
    pub fn publish(&mut self, handles: &[MetricHandle]) -> Vec<Outbound> {
        let mut out = Vec::new();
        if self.lifecycle.node_state() != BirthState::Born {
            return out;
        }

        let timestamp = timestamp();
        let scoped = |device_id: Option<&str>| -> Vec<payload::Metric> {
            handles
                .iter()
                .filter_map(|h| self.store.metric(*h))
                .filter(|m| m.device() == device_id)
                .map(|m| m.to_data_metric(timestamp))
                .collect()
        };

        let node_metrics = scoped(None);
        let device_metrics: Vec<(String, Vec<payload::Metric>)> = self
            .lifecycle
            .devices()
            .map(|d| (d.to_string(), scoped(Some(d))))
            .collect();

        self.lifecycle.node_data(node_metrics, &mut out);
        for (device_id, metrics) in device_metrics {
            self.lifecycle.device_data(&device_id, metrics, &mut out);
        }
        out
    }

    /// Store sampled values then publish them.
    ///
    /// Nothing is stored or published while the node is unborn.
    pub fn publish_values(&mut self, samples: Vec<(MetricHandle, MetricValue)>) -> Vec<Outbound> {
        if self.lifecycle.node_state() != BirthState::Born {
            debug!("Skipping telemetry, node not born. node={}", self.node_id());
            return Vec::new();
        }
        let mut handles = Vec::with_capacity(samples.len());
        for (handle, value) in samples {
            match self.store.set(handle, false, Some(value)) {
                Ok(()) => handles.push(handle),
                Err(e) => warn!("Dropping sample. alias={} error={e}", handle.alias()),
            }
        }
        self.publish(&handles)
    }

    /// Publish NDEATH with the bdSeq the live connection's will promised
    pub fn shutdown(&mut self) -> Vec<Outbound> {
        let mut out = Vec::new();
        let bdseq = self
            .lwt
            .advertised_bdseq()
            .unwrap_or_else(|| self.lifecycle.bdseq());
        self.lifecycle.death_node(bdseq, &mut out);
        out
    }
}
