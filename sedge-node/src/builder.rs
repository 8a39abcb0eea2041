use std::{sync::Arc, time::Duration};

use sedge_client::{Client, DynClient, DynEventLoop, EventLoop};

use crate::{session::CommandHandlers, NodeAgent, NodeHandle, TelemetrySource};

/// A builder for creating and configuring [NodeAgent] instances.
pub struct NodeAgentBuilder {
    pub(crate) group_id: Option<String>,
    pub(crate) node_id: Option<String>,
    pub(crate) eventloop_client: (Box<DynEventLoop>, Arc<DynClient>),
    pub(crate) telemetry: Option<Box<dyn TelemetrySource>>,
    pub(crate) telemetry_interval: Duration,
    pub(crate) rebirth_cooldown: Duration,
    pub(crate) request_capacity: usize,
    pub(crate) handlers: CommandHandlers,
}

impl NodeAgentBuilder {
    /// Creates a new builder with the specified event loop and client.
    ///
    /// Telemetry is published every 3 seconds once a source is set, the rebirth
    /// cooldown is disabled.
    pub fn new<E: EventLoop + Send + 'static, C: Client + Send + Sync + 'static>(
        eventloop: E,
        client: C,
    ) -> Self {
        Self {
            group_id: None,
            node_id: None,
            eventloop_client: (Box::new(eventloop), Arc::new(client)),
            telemetry: None,
            telemetry_interval: Duration::from_secs(3),
            rebirth_cooldown: Duration::ZERO,
            request_capacity: 32,
            handlers: CommandHandlers::default(),
        }
    }

    /// Sets the group ID the node belongs to.
    pub fn with_group_id<S: Into<String>>(mut self, group_id: S) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    /// Sets the node ID.
    ///
    /// The node ID uniquely identifies this node within its group.
    pub fn with_node_id<S: Into<String>>(mut self, node_id: S) -> Self {
        self.node_id = Some(node_id.into());
        self
    }

    pub fn with_telemetry_interval(mut self, interval: Duration) -> Self {
        self.telemetry_interval = interval;
        self
    }

    /// Minimum time between two command triggered rebirths
    pub fn with_rebirth_cooldown(mut self, cooldown: Duration) -> Self {
        self.rebirth_cooldown = cooldown;
        self
    }

    /// Capacity of the channel carrying [NodeHandle] requests to the agent
    pub fn with_request_capacity(mut self, capacity: usize) -> Self {
        self.request_capacity = capacity;
        self
    }

    pub fn with_telemetry_source<T: TelemetrySource + 'static>(mut self, source: T) -> Self {
        self.telemetry = Some(Box::new(source));
        self
    }

    /// Handler for the `Node Control/Next Server` command.
    pub fn with_next_server_handler<F: Fn() + Send + Sync + 'static>(mut self, f: F) -> Self {
        self.handlers.next_server = Some(Arc::new(f));
        self
    }

    /// Hook run after the built-in rebirth triggered by `Node Control/Rebirth`.
    pub fn with_rebirth_handler<F: Fn() + Send + Sync + 'static>(mut self, f: F) -> Self {
        self.handlers.rebirth = Some(Arc::new(f));
        self
    }

    /// Handler for the `Node Control/Reboot` command.
    ///
    /// Without one the command is acknowledged and ignored.
    pub fn with_reboot_handler<F: Fn() + Send + Sync + 'static>(mut self, f: F) -> Self {
        self.handlers.reboot = Some(Arc::new(f));
        self
    }

    /// Builds the agent with the configured settings.
    ///
    /// Returns an error if the group or node id is missing or invalid, or if the
    /// telemetry source fails to initialise.
    pub fn build(self) -> Result<(NodeAgent, NodeHandle), String> {
        NodeAgent::new_from_builder(self)
    }
}
