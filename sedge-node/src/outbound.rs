use sedge_client::LastWill;
use sedge_types::{
  payload::Payload,
  topic::{DeviceTopic, NodeTopic, Topic, TopicFilter},
};

/// A transport request produced by the session.
///
/// Session operations never talk to the transport themselves. They return the
/// requests in the order they have to be carried out and the agent executes
/// them once the session lock has been released.
#[derive(Clone, Debug, PartialEq)]
pub enum Outbound {
  Subscribe(TopicFilter),
  Unsubscribe(Topic),
  NodeMessage { topic: NodeTopic, payload: Payload },
  DeviceMessage { topic: DeviceTopic, payload: Payload },
  /// Install the will used for the next connection attempt
  Will(LastWill),
}
