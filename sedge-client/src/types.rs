use std::string::FromUtf8Error;

use bytes::Bytes;
use sedge_types::{
    payload::Payload,
    topic::{NodeMessage as NodeMessageType, NodeTopic, QoS},
};
use thiserror::Error;

/// Errors produced while turning an inbound publish into an [Event].
#[derive(Error, Debug, PartialEq)]
pub enum MessageError {
    #[error("The topic was invalid")]
    InvalidSparkplugTopic,
    #[error("Topic parts utf8 decode error: {0}")]
    TopicUtf8Error(FromUtf8Error),
}

impl From<FromUtf8Error> for MessageError {
    fn from(e: FromUtf8Error) -> Self {
        MessageError::TopicUtf8Error(e)
    }
}

/// An enum representing the different type of message.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageKind {
    Birth,
    Death,
    Cmd,
    Data,
    Other(String),
}

/// A message received on a Sparkplug topic.
///
/// The payload is left encoded, decoding is the receiver's concern.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub kind: MessageKind,
    pub payload: Bytes,
}

/// Represents a message from a Node.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeMessage {
    /// The group the node belongs to.
    pub group_id: String,
    /// The nodes unique identifier.
    pub node_id: String,
    /// The message.
    pub message: Message,
}

/// Represents a message from a Device.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceMessage {
    /// The group the node belongs to.
    pub group_id: String,
    /// The nodes unique identifier.
    pub node_id: String,
    /// The devices unique identifier.
    pub device_id: String,
    /// The message.
    pub message: Message,
}

/// An enum that represents the different types of events an [EventLoop](crate::EventLoop) implementation can produce.
#[derive(Debug, PartialEq)]
pub enum Event {
    Offline,
    Online,
    Node(NodeMessage),
    Device(DeviceMessage),
    State {
        host_id: String,
        payload: Bytes,
    },
    InvalidPublish {
        reason: MessageError,
        topic: Vec<u8>,
        payload: Vec<u8>,
    },
}

/// Structure representing the last will of a Node
#[derive(Debug, Clone, PartialEq)]
pub struct LastWill {
    pub topic: String,
    pub retain: bool,
    pub qos: QoS,
    pub payload: Vec<u8>,
}

impl LastWill {
    /// Create the NDEATH will for a node.
    ///
    /// The will is delivered at least once and is not retained.
    pub fn new_node(group: &str, node_id: &str, payload: Payload) -> Self {
        let topic = NodeTopic::new(group, NodeMessageType::NDeath, node_id);
        Self {
            retain: false,
            qos: QoS::AtLeastOnce,
            payload: payload.into(),
            topic: topic.topic,
        }
    }
}
