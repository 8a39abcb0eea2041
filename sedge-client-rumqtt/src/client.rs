use async_trait::async_trait;
use log::{debug, error, trace};
use rumqttc::{
  v5::{
    mqttbytes::{
      v5::{ConnectProperties, Filter, Packet},
      QoS,
    },
    AsyncClient as RuClient, EventLoop as RuEventLoop, MqttOptions,
  },
  Outgoing,
};
use sedge_types::{
  payload::Payload,
  topic::{DeviceTopic, NodeTopic, Topic, TopicFilter},
};

use sedge_client::{topic_and_payload_to_event, Event, LastWill};

fn qos_to_mqtt_qos(qos: sedge_types::topic::QoS) -> QoS {
  match qos {
    sedge_types::topic::QoS::AtMostOnce => QoS::AtMostOnce,
    sedge_types::topic::QoS::AtLeastOnce => QoS::AtLeastOnce,
    sedge_types::topic::QoS::ExactlyOnce => QoS::ExactlyOnce,
  }
}

fn topic_filter_to_mqtt_filter(topic_filter: TopicFilter) -> Filter {
  let qos = qos_to_mqtt_qos(topic_filter.qos);
  Filter::new(String::from(topic_filter.topic), qos)
}

/// A [sedge_client::Client] implementation using [rumqttc]
#[derive(Clone)]
pub struct Client {
  client: RuClient,
}

impl Client {
  async fn publish(&self, topic: String, qos: QoS, retain: bool, payload: Vec<u8>) -> Result<(), ()> {
    self.client.publish(topic, qos, retain, payload).await.map_err(|e| {
      debug!("Publish failed: {e}");
    })
  }
}

#[async_trait]
impl sedge_client::Client for Client {
  async fn disconnect(&self) -> Result<(), ()> {
    self.client.disconnect().await.map_err(|_| ())
  }

  async fn publish_node_message(&self, topic: NodeTopic, payload: Payload) -> Result<(), ()> {
    let (qos, retain) = topic.get_publish_quality_retain();
    self.publish(topic.topic, qos_to_mqtt_qos(qos), retain, payload.into()).await
  }

  async fn publish_device_message(&self, topic: DeviceTopic, payload: Payload) -> Result<(), ()> {
    let (qos, retain) = topic.get_publish_quality_retain();
    self.publish(topic.topic, qos_to_mqtt_qos(qos), retain, payload.into()).await
  }

  async fn subscribe_many(&self, topics: Vec<TopicFilter>) -> Result<(), ()> {
    let filters: Vec<Filter> = topics.into_iter().map(topic_filter_to_mqtt_filter).collect();
    self.client.subscribe_many(filters).await.map_err(|_| ())
  }

  async fn unsubscribe(&self, topic: Topic) -> Result<(), ()> {
    self.client.unsubscribe(String::from(topic)).await.map_err(|_| ())
  }
}

enum ConnectionState {
  Disconnected,
  ManualDisconnected,
  Connected,
}

/// An [sedge_client::EventLoop] implementation using [rumqttc]
pub struct EventLoop {
  state: ConnectionState,
  el: RuEventLoop,
}

impl EventLoop {
  /// Create a new `EventLoop`.
  ///
  /// `options` are the mqtt options to create the rumqtt client with. Clean start is
  /// forced on and the session expiry interval forced to 0.
  ///
  /// `cap` specifies the capacity of the bounded async channel for the client handle.
  pub fn new(options: MqttOptions, cap: usize) -> (Self, Client) {
    let mut options = options;
    let mut connection_properties = options.connect_properties().unwrap_or_else(ConnectProperties::new);
    connection_properties.session_expiry_interval = Some(0);

    options.set_clean_start(true).set_connect_properties(connection_properties);

    let (client, eventloop) = RuClient::new(options, cap);
    (
      EventLoop {
        el: eventloop,
        state: ConnectionState::Disconnected,
      },
      Client { client },
    )
  }

  async fn poll_rumqtt(&mut self) -> Option<Event> {
    match self.el.poll().await {
      Ok(event) => {
        trace!("{event:?}");
        match event {
          rumqttc::v5::Event::Incoming(Packet::ConnAck(_)) => {
            self.state = ConnectionState::Connected;
            Some(Event::Online)
          }
          rumqttc::v5::Event::Incoming(Packet::Disconnect(_)) => {
            self.state = ConnectionState::Disconnected;
            Some(Event::Offline)
          }
          rumqttc::v5::Event::Incoming(Packet::Publish(publish)) => {
            Some(topic_and_payload_to_event(&publish.topic, publish.payload))
          }
          rumqttc::v5::Event::Outgoing(Outgoing::Disconnect) => {
            self.state = ConnectionState::ManualDisconnected;
            Some(Event::Offline)
          }
          _ => None,
        }
      }
      Err(e) => match self.state {
        ConnectionState::Connected => {
          error!("Client error: {e}");
          self.state = ConnectionState::Disconnected;
          Some(Event::Offline)
        }
        ConnectionState::Disconnected => {
          error!("Client error on reconnect attempt: {e}");
          tokio::time::sleep(tokio::time::Duration::from_secs(1)).await;
          None
        }
        ConnectionState::ManualDisconnected => {
          tokio::time::sleep(tokio::time::Duration::from_secs(1)).await;
          None
        }
      },
    }
  }
}

#[async_trait]
impl sedge_client::EventLoop for EventLoop {
  async fn poll(&mut self) -> Option<Event> {
    loop {
      if let Some(event) = self.poll_rumqtt().await {
        return Some(event);
      }
    }
  }

  fn set_last_will(&mut self, will: LastWill) {
    let qos = qos_to_mqtt_qos(will.qos);
    let mqtt_will = rumqttc::v5::mqttbytes::v5::LastWill::new(will.topic, will.payload, qos, will.retain, None);
    self.el.options.set_last_will(mqtt_will);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use sedge_types::topic::DeviceMessage;

  #[test]
  fn filters_keep_topic_and_qos() {
    let filter = TopicFilter::new(Topic::DeviceTopic(DeviceTopic::new("g", DeviceMessage::DCmd, "n", "d")));
    let mqtt = topic_filter_to_mqtt_filter(filter);
    assert_eq!(mqtt.path, "spBv1.0/g/DCMD/n/d");
    assert_eq!(mqtt.qos, QoS::AtMostOnce);
  }
}
