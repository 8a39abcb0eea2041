use std::{
    collections::VecDeque,
    future::Future,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use log::{debug, error, info, trace, warn};
use sedge_client::{DeviceMessage, DynClient, DynEventLoop, Event, MessageKind, NodeMessage};
use sedge_types::MetricValue;
use tokio::{
    select,
    sync::mpsc,
    time::{interval, timeout, MissedTickBehavior},
};

use crate::{
    error::{CommandError, DeviceError, MetricError},
    lifecycle::BirthState,
    metric::{ChangeNotifier, MetricDetails, MetricHandle},
    outbound::Outbound,
    session::Session,
    NodeAgentBuilder,
};

/// Provides the values published on every telemetry tick.
pub trait TelemetrySource: Send {
    /// Called once when the agent is built, before it runs.
    ///
    /// The place to register devices and metrics the source samples.
    fn init(&mut self, _handle: &NodeHandle) -> Result<(), String> {
        Ok(())
    }

    /// Read the current values. Only the returned metrics are published.
    fn sample(&mut self) -> Vec<(MetricHandle, MetricValue)>;
}

#[derive(Debug)]
enum Request {
    Rebirth,
    BirthDevice(String),
    DeathDevice(String),
    Publish(Vec<MetricHandle>),
    Stop,
}

fn lock(session: &Mutex<Session>) -> MutexGuard<'_, Session> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A handle for interacting with a running [NodeAgent].
///
/// Metric reads and writes go straight to the node's session. Anything that
/// publishes is forwarded to the agent task so messages keep their order.
#[derive(Clone)]
pub struct NodeHandle {
    session: Arc<Mutex<Session>>,
    tx: mpsc::Sender<Request>,
}

impl NodeHandle {
    /// Register a device. It is birthed with the next node birth, or right away
    /// if the node is already born.
    pub async fn register_device<S: Into<String>>(&self, device_id: S) -> Result<(), DeviceError> {
        let device_id = device_id.into();
        let born = {
            let mut session = lock(&self.session);
            session.register_device(&device_id)?;
            session.lifecycle().node_state() == BirthState::Born
        };
        if born {
            self.send(Request::BirthDevice(device_id)).await;
        }
        Ok(())
    }

    /// Non-async form of [NodeHandle::register_device] for use from
    /// [TelemetrySource::init]. If the node is born and the request channel is
    /// full the device is not birthed until the next node birth.
    pub fn try_register_device<S: Into<String>>(&self, device_id: S) -> Result<(), DeviceError> {
        let device_id = device_id.into();
        let born = {
            let mut session = lock(&self.session);
            session.register_device(&device_id)?;
            session.lifecycle().node_state() == BirthState::Born
        };
        if born && self.tx.try_send(Request::BirthDevice(device_id)).is_err() {
            debug!("Unable to queue device birth");
        }
        Ok(())
    }

    pub fn create_metric(&self, details: MetricDetails) -> Result<MetricHandle, MetricError> {
        lock(&self.session).create_metric(details)
    }

    /// Positional form of [NodeHandle::create_metric]
    pub fn create<S: Into<String>>(
        &self,
        name: S,
        device_id: Option<&str>,
        metric_type: sedge_types::MetricType,
        readback: bool,
        on_change: Option<ChangeNotifier>,
    ) -> Result<MetricHandle, MetricError> {
        let mut details = MetricDetails::new(name, metric_type).readback(readback);
        if let Some(device_id) = device_id {
            details = details.device(device_id);
        }
        if let Some(cb) = on_change {
            details = details.on_change(move |v| cb(v));
        }
        self.create_metric(details)
    }

    pub fn get(&self, handle: MetricHandle) -> Result<MetricValue, MetricError> {
        lock(&self.session).store().get(handle)
    }

    /// See [MetricStore::set](crate::MetricStore::set). Does not publish.
    pub fn set(
        &self,
        handle: MetricHandle,
        zero: bool,
        value: Option<MetricValue>,
    ) -> Result<(), MetricError> {
        lock(&self.session).store_mut().set(handle, zero, value)
    }

    pub fn set_value<V: Into<MetricValue>>(
        &self,
        handle: MetricHandle,
        value: V,
    ) -> Result<(), MetricError> {
        self.set(handle, false, Some(value.into()))
    }

    /// Publish the current values of the given metrics
    pub async fn publish(&self, handles: Vec<MetricHandle>) {
        self.send(Request::Publish(handles)).await
    }

    /// Manually trigger a rebirth for the node
    pub fn rebirth(&self) {
        //if the channel is full the request is dropped, the agent is busy anyway
        _ = self.tx.try_send(Request::Rebirth);
    }

    pub async fn birth_device<S: Into<String>>(&self, device_id: S) {
        self.send(Request::BirthDevice(device_id.into())).await
    }

    /// Publish a death for the device. It stays dead until [NodeHandle::birth_device] is called.
    pub async fn death_device<S: Into<String>>(&self, device_id: S) {
        self.send(Request::DeathDevice(device_id.into())).await
    }

    /// Stop the agent: publish NDEATH and disconnect from the broker.
    ///
    /// This will end [NodeAgent::run()]
    pub async fn cancel(&self) {
        self.send(Request::Stop).await
    }

    pub fn node_state(&self) -> BirthState {
        lock(&self.session).lifecycle().node_state()
    }

    pub fn device_state(&self, device_id: &str) -> Option<BirthState> {
        lock(&self.session).lifecycle().device_state(device_id)
    }

    /// The bdSeq the next node birth will use
    pub fn bdseq(&self) -> u8 {
        lock(&self.session).lifecycle().bdseq()
    }

    async fn send(&self, request: Request) {
        if self.tx.send(request).await.is_err() {
            debug!("Node agent has stopped, request dropped");
        }
    }
}

/// An edge node agent.
///
/// Owns the transport and drives the node's session from connection events,
/// inbound commands, handle requests and the telemetry timer.
/// See [NodeAgentBuilder] on how to create one.
pub struct NodeAgent {
    session: Arc<Mutex<Session>>,
    eventloop: Box<DynEventLoop>,
    client: Arc<DynClient>,
    rx: mpsc::Receiver<Request>,
    telemetry: Option<Box<dyn TelemetrySource>>,
    telemetry_interval: Duration,
    group_id: String,
    node_id: String,
    /// Events polled while waiting on a transport request
    deferred: VecDeque<Event>,
    eventloop_closed: bool,
}

impl NodeAgent {
    pub(crate) fn new_from_builder(builder: NodeAgentBuilder) -> Result<(Self, NodeHandle), String> {
        let group_id = builder
            .group_id
            .ok_or("group id must be provided".to_string())?;
        let node_id = builder
            .node_id
            .ok_or("node id must be provided".to_string())?;
        sedge_types::utils::validate_name(&group_id)?;
        sedge_types::utils::validate_name(&node_id)?;
        if builder.telemetry_interval.is_zero() {
            return Err("telemetry interval must be greater than zero".into());
        }

        let mut session = Session::new(&group_id, &node_id);
        session.set_handlers(builder.handlers);
        session.set_rebirth_cooldown(builder.rebirth_cooldown);
        let session = Arc::new(Mutex::new(session));

        let (tx, rx) = mpsc::channel(builder.request_capacity.max(1));
        let handle = NodeHandle {
            session: session.clone(),
            tx,
        };

        let mut telemetry = builder.telemetry;
        if let Some(source) = telemetry.as_mut() {
            source.init(&handle)?;
        }

        let (eventloop, client) = builder.eventloop_client;
        let agent = Self {
            session,
            eventloop,
            client,
            rx,
            telemetry,
            telemetry_interval: builder.telemetry_interval,
            group_id,
            node_id,
            deferred: VecDeque::new(),
            eventloop_closed: false,
        };
        Ok((agent, handle))
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        lock(&self.session)
    }

    /// Wait for a transport request while the event loop keeps being polled.
    ///
    /// A transport only takes requests off its queue from within `poll`, so
    /// awaiting a request without polling can stall forever once the queue is
    /// full. Events that arrive meanwhile are handled by the main loop later.
    async fn drive<F>(&mut self, request: F) -> Result<(), ()>
    where
        F: Future<Output = Result<(), ()>>,
    {
        if self.eventloop_closed {
            return Err(());
        }
        tokio::pin!(request);
        loop {
            select! {
                biased;
                result = &mut request => return result,
                event = self.eventloop.poll() => match event {
                    Some(event) => self.deferred.push_back(event),
                    None => {
                        self.eventloop_closed = true;
                        return Err(());
                    }
                },
            }
        }
    }

    async fn execute(&mut self, actions: Vec<Outbound>) {
        for action in actions {
            trace!("Executing {action:?}");
            let client = self.client.clone();
            let result = match action {
                Outbound::Subscribe(filter) => {
                    self.drive(async move { client.subscribe(filter).await }).await
                }
                Outbound::Unsubscribe(topic) => {
                    self.drive(async move { client.unsubscribe(topic).await }).await
                }
                Outbound::NodeMessage { topic, payload } => {
                    self.drive(async move { client.publish_node_message(topic, payload).await })
                        .await
                }
                Outbound::DeviceMessage { topic, payload } => {
                    self.drive(async move { client.publish_device_message(topic, payload).await })
                        .await
                }
                Outbound::Will(will) => {
                    self.eventloop.set_last_will(will);
                    Ok(())
                }
            };
            if result.is_err() {
                warn!("Transport request failed. node={}", self.node_id);
            }
        }
    }

    fn on_command(&self, device_id: Option<&str>, raw: &[u8]) -> Vec<Outbound> {
        match self.session().handle_command(device_id, raw) {
            Ok(actions) => actions,
            Err(CommandError::DecodeFailure(e)) => {
                warn!(
                    "Discarding command with invalid payload. node={} device={device_id:?} error={e}",
                    self.node_id
                );
                Vec::new()
            }
            Err(CommandError::UnrecognizedCommand) => {
                warn!(
                    "Command did not match any metric. node={} device={device_id:?}",
                    self.node_id
                );
                Vec::new()
            }
        }
    }

    fn is_ours(&self, group_id: &str, node_id: &str) -> bool {
        group_id == self.group_id && node_id == self.node_id
    }

    async fn handle_event(&mut self, event: Event) {
        let actions = match event {
            Event::Online => self.session().on_online(),
            Event::Offline => self.session().on_offline(),
            Event::Node(NodeMessage {
                group_id,
                node_id,
                message,
            }) if message.kind == MessageKind::Cmd && self.is_ours(&group_id, &node_id) => {
                self.on_command(None, &message.payload)
            }
            Event::Device(DeviceMessage {
                group_id,
                node_id,
                device_id,
                message,
            }) if message.kind == MessageKind::Cmd && self.is_ours(&group_id, &node_id) => {
                self.on_command(Some(&device_id), &message.payload)
            }
            Event::Node(_) | Event::Device(_) => Vec::new(),
            Event::State { host_id, .. } => {
                trace!("Ignoring STATE message. host={host_id}");
                Vec::new()
            }
            Event::InvalidPublish { reason, .. } => {
                debug!("Ignoring invalid publish. reason={reason}");
                Vec::new()
            }
        };
        self.execute(actions).await
    }

    async fn handle_request(&mut self, request: Request) {
        let actions = match request {
            Request::Rebirth => self.session().rebirth(),
            Request::BirthDevice(device_id) => {
                self.session().birth_device(&device_id).unwrap_or_else(|e| {
                    warn!("Unable to birth device. device={device_id} error={e}");
                    Vec::new()
                })
            }
            Request::DeathDevice(device_id) => {
                self.session().death_device(&device_id).unwrap_or_else(|e| {
                    warn!("Unable to kill device. device={device_id} error={e}");
                    Vec::new()
                })
            }
            Request::Publish(handles) => self.session().publish(&handles),
            Request::Stop => Vec::new(),
        };
        self.execute(actions).await
    }

    async fn on_tick(&mut self) {
        if self.session().lifecycle().node_state() != BirthState::Born {
            return;
        }
        let Some(source) = self.telemetry.as_mut() else {
            return;
        };
        let samples = source.sample();
        let actions = self.session().publish_values(samples);
        self.execute(actions).await
    }

    async fn poll_until_offline(&mut self) {
        if self
            .deferred
            .drain(..)
            .any(|event| matches!(event, Event::Offline))
            || self.eventloop_closed
        {
            return;
        }
        loop {
            match self.eventloop.poll().await {
                Some(Event::Offline) | None => break,
                Some(_) => (),
            }
        }
    }

    /// Run the edge node until [NodeHandle::cancel()] is called or every handle is dropped
    pub async fn run(mut self) {
        info!("Edge node running. node={}", self.node_id);

        let will = self.session().initial_will();
        self.eventloop.set_last_will(will);

        let mut ticker = interval(self.telemetry_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if let Some(event) = self.deferred.pop_front() {
                self.handle_event(event).await;
                continue;
            }
            if self.eventloop_closed {
                error!("Event loop closed. node={}", self.node_id);
                break;
            }
            select! {
                biased;
                request = self.rx.recv() => match request {
                    Some(Request::Stop) => break,
                    Some(request) => self.handle_request(request).await,
                    None => {
                        info!("All node handles dropped. node={}", self.node_id);
                        break
                    }
                },
                event = self.eventloop.poll() => match event {
                    Some(event) => self.handle_event(event).await,
                    None => {
                        error!("Event loop closed. node={}", self.node_id);
                        break
                    }
                },
                _ = ticker.tick() => self.on_tick().await,
            }
        }

        info!("Edge node stopping. node={}", self.node_id);
        let actions = self.session().shutdown();
        self.execute(actions).await;
        let client = self.client.clone();
        if self.drive(async move { client.disconnect().await }).await.is_err() {
            debug!("Disconnect request failed. node={}", self.node_id);
        }
        if timeout(Duration::from_secs(1), self.poll_until_offline())
            .await
            .is_err()
        {
            debug!("Timed out waiting for disconnect. node={}", self.node_id);
        }
        self.session().on_offline();
        info!("Edge node stopped. node={}", self.node_id);
    }
}
