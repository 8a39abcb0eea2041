use super::constants::{DBIRTH, DCMD, DDATA, DDEATH, NBIRTH, NCMD, NDATA, NDEATH, SPBV01};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceMessage {
  DBirth,
  DDeath,
  DData,
  DCmd,
}

impl DeviceMessage {
  pub fn as_str(&self) -> &'static str {
    match self {
      DeviceMessage::DBirth => DBIRTH,
      DeviceMessage::DDeath => DDEATH,
      DeviceMessage::DData => DDATA,
      DeviceMessage::DCmd => DCMD,
    }
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeMessage {
  NBirth,
  NDeath,
  NData,
  NCmd,
}

impl NodeMessage {
  pub fn as_str(&self) -> &'static str {
    match self {
      NodeMessage::NBirth => NBIRTH,
      NodeMessage::NDeath => NDEATH,
      NodeMessage::NData => NDATA,
      NodeMessage::NCmd => NCMD,
    }
  }
}

/// A fully qualified node scope topic
#[derive(Clone, Debug, PartialEq)]
pub struct NodeTopic {
  pub topic: String,
  pub message_type: NodeMessage,
}

impl NodeTopic {
  pub fn new(group_id: &str, message_type: NodeMessage, node_id: &str) -> Self {
    Self {
      topic: node_topic(group_id, &message_type, node_id),
      message_type,
    }
  }

  /// Every node message is published fire-and-forget and never retained.
  /// The will is the exception, see `LastWill`.
  pub fn get_publish_quality_retain(&self) -> (QoS, bool) {
    match self.message_type {
      NodeMessage::NBirth | NodeMessage::NDeath | NodeMessage::NData | NodeMessage::NCmd => {
        (QoS::AtMostOnce, false)
      }
    }
  }
}

/// A fully qualified device scope topic
#[derive(Clone, Debug, PartialEq)]
pub struct DeviceTopic {
  pub topic: String,
  pub message_type: DeviceMessage,
}

impl DeviceTopic {
  pub fn new(group_id: &str, message_type: DeviceMessage, node_id: &str, device_id: &str) -> Self {
    Self {
      topic: device_topic(group_id, &message_type, node_id, device_id),
      message_type,
    }
  }

  pub fn get_publish_quality_retain(&self) -> (QoS, bool) {
    match self.message_type {
      DeviceMessage::DBirth | DeviceMessage::DDeath | DeviceMessage::DData | DeviceMessage::DCmd => {
        (QoS::AtMostOnce, false)
      }
    }
  }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Topic {
  NodeTopic(NodeTopic),
  DeviceTopic(DeviceTopic),
}

impl From<Topic> for String {
  fn from(topic: Topic) -> String {
    match topic {
      Topic::NodeTopic(node_topic) => node_topic.topic,
      Topic::DeviceTopic(device_topic) => device_topic.topic,
    }
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QoS {
  AtMostOnce,
  AtLeastOnce,
  ExactlyOnce,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TopicFilter {
  pub topic: Topic,
  pub qos: QoS,
}

impl TopicFilter {
  pub fn new(topic: Topic) -> Self {
    Self::new_with_qos(topic, QoS::AtMostOnce)
  }

  pub fn new_with_qos(topic: Topic, qos: QoS) -> Self {
    Self { topic, qos }
  }

  pub fn topic_string(&self) -> String {
    self.topic.clone().into()
  }
}

pub fn node_topic(group_id: &str, message_type: &NodeMessage, node_id: &str) -> String {
  format!("{}/{}/{}/{}", SPBV01, group_id, message_type.as_str(), node_id)
}

pub fn device_topic(group_id: &str, message_type: &DeviceMessage, node_id: &str, device_id: &str) -> String {
  format!("{}/{}/{}/{}/{}", SPBV01, group_id, message_type.as_str(), node_id, device_id)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn node_topics() {
    assert_eq!(node_topic("Plant1", &NodeMessage::NBirth, "AABBCC"), "spBv1.0/Plant1/NBIRTH/AABBCC");
    assert_eq!(node_topic("Plant1", &NodeMessage::NDeath, "AABBCC"), "spBv1.0/Plant1/NDEATH/AABBCC");
    let topic = NodeTopic::new("Plant1", NodeMessage::NCmd, "AABBCC");
    assert_eq!(topic.topic, "spBv1.0/Plant1/NCMD/AABBCC");
    assert_eq!(topic.get_publish_quality_retain(), (QoS::AtMostOnce, false));
  }

  #[test]
  fn device_topics() {
    let topic = DeviceTopic::new("Plant1", DeviceMessage::DData, "AABBCC", "dht");
    assert_eq!(topic.topic, "spBv1.0/Plant1/DDATA/AABBCC/dht");
    assert_eq!(topic.get_publish_quality_retain(), (QoS::AtMostOnce, false));
    let filter = TopicFilter::new(Topic::DeviceTopic(DeviceTopic::new(
      "Plant1",
      DeviceMessage::DCmd,
      "AABBCC",
      "dht",
    )));
    assert_eq!(filter.qos, QoS::AtMostOnce);
    assert_eq!(filter.topic_string(), "spBv1.0/Plant1/DCMD/AABBCC/dht");
  }
}
