use async_trait::async_trait;
use sedge_types::{
  payload::Payload,
  topic::{DeviceTopic, NodeTopic, Topic, TopicFilter},
};

use crate::{Event, LastWill};

/// The publishing half of a transport.
///
/// All calls are fire-and-forget from the caller's point of view: an `Ok` means
/// the request was handed to the transport, not that the broker acknowledged it.
/// A call may wait until the transport has room for the request, which can
/// require the matching [EventLoop] to be polled concurrently.
#[async_trait]
pub trait Client {
  /// Disconnects the client.
  ///
  /// # Returns
  ///
  /// - `Ok(())` if the disconnection was successful
  /// - `Err(())` if the disconnection failed
  async fn disconnect(&self) -> Result<(), ()>;

  /// Publishes a message to a node-specific topic.
  ///
  /// This method will yield to the async runtime until the message is accepted by the client.
  /// Implementations backed by a bounded request queue only make progress while their
  /// [EventLoop] is being polled.
  async fn publish_node_message(&self, topic: NodeTopic, payload: Payload) -> Result<(), ()>;

  /// Publishes a message to a device-specific topic.
  ///
  /// See `publish_node_message`.
  async fn publish_device_message(&self, topic: DeviceTopic, payload: Payload) -> Result<(), ()>;

  /// Subscribes to a single topic.
  ///
  /// This is a convenience method that calls `subscribe_many` with a single topic.
  async fn subscribe(&self, topic: TopicFilter) -> Result<(), ()> {
    self.subscribe_many(vec![topic]).await
  }

  /// Subscribes to multiple topics in a single operation.
  ///
  /// # Returns
  ///
  /// - `Ok(())` if all subscriptions were successful
  /// - `Err(())` if any subscription failed
  async fn subscribe_many(&self, topics: Vec<TopicFilter>) -> Result<(), ()>;

  /// Removes a subscription previously made with `subscribe` or `subscribe_many`.
  async fn unsubscribe(&self, topic: Topic) -> Result<(), ()>;
}

pub type DynClient = dyn Client + Send + Sync;

/// The receiving half of a transport.
#[async_trait]
pub trait EventLoop {
  /// Wait for the next event.
  ///
  /// Polling also drives the connection: a disconnected implementation attempts
  /// to reconnect from within `poll`, using the most recently set will.
  /// `None` means the event loop has shut down and will produce no more events.
  async fn poll(&mut self) -> Option<Event>;

  /// Set the will to register with the broker on the next connection attempt
  fn set_last_will(&mut self, will: LastWill);
}

pub type DynEventLoop = dyn EventLoop + Send;
