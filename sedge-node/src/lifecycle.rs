use log::{debug, info, warn};
use sedge_types::{
    constants::{
        ALIAS_NEXT_SERVER, ALIAS_REBIRTH, ALIAS_REBOOT, NODE_CONTROL_NEXT_SERVER,
        NODE_CONTROL_REBIRTH, NODE_CONTROL_REBOOT,
    },
    payload::{self, metric, DataType, Payload},
    topic::{
        DeviceMessage as DeviceMessageType, DeviceTopic, NodeMessage as NodeMessageType,
        NodeTopic, Topic, TopicFilter,
    },
    utils::{timestamp, validate_name},
};

use crate::{error::DeviceError, lwt, metric::MetricStore, outbound::Outbound};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BirthState {
    Unborn,
    Born,
}

struct Device {
    id: String,
    enabled: bool,
    state: BirthState,
}

/// Drives node and device births and deaths.
///
/// Owns the birth/death sequence counter (bdSeq) and the payload sequence
/// number. Every operation appends the transport requests it needs to `out`.
pub struct LifecycleController {
    group_id: String,
    node_id: String,
    online: bool,
    state: BirthState,
    seq: u8,
    bdseq: u8,
    devices: Vec<Device>,
}

fn control_metric(name: &str, alias: u64, timestamp: u64) -> payload::Metric {
    let mut metric = payload::Metric::new();
    metric
        .set_name(name.to_string())
        .set_alias(alias)
        .set_datatype(DataType::Boolean)
        .set_timestamp(timestamp)
        .set_value(metric::Value::BooleanValue(false));
    metric
}

impl LifecycleController {
    pub fn new(group_id: &str, node_id: &str) -> Self {
        Self {
            group_id: group_id.to_string(),
            node_id: node_id.to_string(),
            online: false,
            state: BirthState::Unborn,
            seq: 0,
            bdseq: 0,
            devices: Vec::new(),
        }
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// The bdSeq the next node birth will use
    pub fn bdseq(&self) -> u8 {
        self.bdseq
    }

    pub fn is_online(&self) -> bool {
        self.online
    }

    pub fn node_state(&self) -> BirthState {
        self.state
    }

    pub fn device_state(&self, device_id: &str) -> Option<BirthState> {
        self.device(device_id).map(|d| d.state)
    }

    pub fn device_enabled(&self, device_id: &str) -> Option<bool> {
        self.device(device_id).map(|d| d.enabled)
    }

    pub fn has_device(&self, device_id: &str) -> bool {
        self.device(device_id).is_some()
    }

    /// Registered device ids in registration order
    pub fn devices(&self) -> impl Iterator<Item = &str> {
        self.devices.iter().map(|d| d.id.as_str())
    }

    fn device(&self, device_id: &str) -> Option<&Device> {
        self.devices.iter().find(|d| d.id == device_id)
    }

    fn device_index(&self, device_id: &str) -> Result<usize, DeviceError> {
        self.devices
            .iter()
            .position(|d| d.id == device_id)
            .ok_or(DeviceError::Unknown)
    }

    pub fn register_device(&mut self, device_id: &str) -> Result<(), DeviceError> {
        validate_name(device_id).map_err(DeviceError::InvalidName)?;
        if self.has_device(device_id) {
            return Err(DeviceError::Duplicate);
        }
        self.devices.push(Device {
            id: device_id.to_string(),
            enabled: true,
            state: BirthState::Unborn,
        });
        Ok(())
    }

    fn next_seq(&mut self) -> u64 {
        let seq = self.seq;
        self.seq = seq.wrapping_add(1);
        seq as u64
    }

    fn sequenced_payload(&mut self, metrics: Vec<payload::Metric>) -> Payload {
        Payload {
            timestamp: Some(timestamp()),
            metrics,
            seq: Some(self.next_seq()),
            uuid: None,
            body: None,
        }
    }

    fn node_topic(&self, message_type: NodeMessageType) -> NodeTopic {
        NodeTopic::new(&self.group_id, message_type, &self.node_id)
    }

    fn device_topic(&self, message_type: DeviceMessageType, device_id: &str) -> DeviceTopic {
        DeviceTopic::new(&self.group_id, message_type, &self.node_id, device_id)
    }

    pub fn set_online(&mut self) {
        self.online = true;
    }

    /// The transport dropped. Everything is dead until the next birth.
    pub fn set_offline(&mut self) {
        self.online = false;
        self.mark_unborn();
    }

    pub fn mark_unborn(&mut self) {
        self.state = BirthState::Unborn;
        for device in self.devices.iter_mut() {
            device.state = BirthState::Unborn;
        }
    }

    /// Publish NBIRTH. Returns false if the node could not be birthed.
    pub fn birth_node(&mut self, store: &MetricStore, out: &mut Vec<Outbound>) -> bool {
        if !self.online {
            warn!("Cannot birth node while offline. node={}", self.node_id);
            return false;
        }

        out.push(Outbound::Subscribe(TopicFilter::new(Topic::NodeTopic(
            self.node_topic(NodeMessageType::NCmd),
        ))));

        self.seq = 0;
        let timestamp = timestamp();
        let mut metrics = vec![
            lwt::bdseq_metric(self.bdseq),
            control_metric(NODE_CONTROL_NEXT_SERVER, ALIAS_NEXT_SERVER, timestamp),
            control_metric(NODE_CONTROL_REBIRTH, ALIAS_REBIRTH, timestamp),
            control_metric(NODE_CONTROL_REBOOT, ALIAS_REBOOT, timestamp),
        ];
        metrics.extend(store.scope_metrics(None).map(|m| m.to_birth_metric(timestamp)));

        let payload = self.sequenced_payload(metrics);
        out.push(Outbound::NodeMessage {
            topic: self.node_topic(NodeMessageType::NBirth),
            payload,
        });

        info!("Node birth. node={} bdseq={}", self.node_id, self.bdseq);
        self.bdseq = self.bdseq.wrapping_add(1);
        self.state = BirthState::Born;
        true
    }

    fn birth_device_at(&mut self, index: usize, store: &MetricStore, out: &mut Vec<Outbound>) {
        let device_id = self.devices[index].id.clone();
        out.push(Outbound::Subscribe(TopicFilter::new(Topic::DeviceTopic(
            self.device_topic(DeviceMessageType::DCmd, &device_id),
        ))));

        let timestamp = timestamp();
        let metrics = store
            .scope_metrics(Some(device_id.as_str()))
            .map(|m| m.to_birth_metric(timestamp))
            .collect();
        let payload = self.sequenced_payload(metrics);
        out.push(Outbound::DeviceMessage {
            topic: self.device_topic(DeviceMessageType::DBirth, &device_id),
            payload,
        });

        info!("Device birth. node={} device={device_id}", self.node_id);
        self.devices[index].state = BirthState::Born;
    }

    /// Enable a device and publish its DBIRTH if the node is born.
    ///
    /// While the node is unborn the birth is deferred to the next node birth.
    pub fn birth_device(
        &mut self,
        device_id: &str,
        store: &MetricStore,
        out: &mut Vec<Outbound>,
    ) -> Result<(), DeviceError> {
        let index = self.device_index(device_id)?;
        self.devices[index].enabled = true;
        if self.state != BirthState::Born {
            debug!(
                "Node not born, deferring device birth. node={} device={device_id}",
                self.node_id
            );
            return Ok(());
        }
        self.birth_device_at(index, store, out);
        Ok(())
    }

    /// Birth the node followed by every enabled device
    pub fn birth_all(&mut self, store: &MetricStore, out: &mut Vec<Outbound>) {
        if !self.birth_node(store, out) {
            return;
        }
        for index in 0..self.devices.len() {
            if self.devices[index].enabled {
                self.birth_device_at(index, store, out);
            }
        }
    }

    /// Publish DDEATH for a born device, then drop its command subscription.
    ///
    /// The device is disabled and stays dead across node rebirths until it is
    /// birthed again.
    pub fn death_device(&mut self, device_id: &str, out: &mut Vec<Outbound>) -> Result<(), DeviceError> {
        let index = self.device_index(device_id)?;
        self.devices[index].enabled = false;
        if self.devices[index].state != BirthState::Born {
            return Ok(());
        }

        let payload = self.sequenced_payload(Vec::new());
        out.push(Outbound::DeviceMessage {
            topic: self.device_topic(DeviceMessageType::DDeath, device_id),
            payload,
        });
        out.push(Outbound::Unsubscribe(Topic::DeviceTopic(
            self.device_topic(DeviceMessageType::DCmd, device_id),
        )));

        info!("Device death. node={} device={device_id}", self.node_id);
        self.devices[index].state = BirthState::Unborn;
        Ok(())
    }

    /// Publish an explicit NDEATH carrying `bdseq`
    pub fn death_node(&mut self, bdseq: u8, out: &mut Vec<Outbound>) {
        if self.state != BirthState::Born {
            return;
        }
        out.push(Outbound::NodeMessage {
            topic: self.node_topic(NodeMessageType::NDeath),
            payload: lwt::death_payload(bdseq),
        });
        info!("Node death. node={} bdseq={bdseq}", self.node_id);
        self.mark_unborn();
    }

    /// Publish NDATA. Nothing is published while the node is unborn or `metrics` is empty.
    pub fn node_data(&mut self, metrics: Vec<payload::Metric>, out: &mut Vec<Outbound>) -> bool {
        if self.state != BirthState::Born || metrics.is_empty() {
            return false;
        }
        let payload = self.sequenced_payload(metrics);
        out.push(Outbound::NodeMessage {
            topic: self.node_topic(NodeMessageType::NData),
            payload,
        });
        true
    }

    /// Publish DDATA. Nothing is published while the device is unborn or `metrics` is empty.
    pub fn device_data(
        &mut self,
        device_id: &str,
        metrics: Vec<payload::Metric>,
        out: &mut Vec<Outbound>,
    ) -> bool {
        if self.device_state(device_id) != Some(BirthState::Born) || metrics.is_empty() {
            return false;
        }
        let payload = self.sequenced_payload(metrics);
        out.push(Outbound::DeviceMessage {
            topic: self.device_topic(DeviceMessageType::DData, device_id),
            payload,
        });
        true
    }
}
