use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::{Event, LastWill};
use async_trait::async_trait;
use sedge_types::{
    payload::Payload,
    topic::{DeviceTopic, NodeTopic, Topic, TopicFilter},
};
use tokio::{select, sync::mpsc};

#[derive(Clone)]
enum RequestSender {
    /// Requests go straight to the broker
    Direct(mpsc::UnboundedSender<OutboundMessage>),
    /// Requests wait in a bounded queue that only the event loop drains
    Queued(mpsc::Sender<OutboundMessage>),
}

/// A [Client](crate::Client) implementation that uses channels for message passing.
///
/// # Examples
///
/// See [ChannelEventLoop]
#[derive(Clone)]
pub struct ChannelClient {
    tx: RequestSender,
}

impl ChannelClient {
    async fn send(&self, message: OutboundMessage) -> Result<(), ()> {
        match &self.tx {
            RequestSender::Direct(tx) => tx.send(message).map_err(|_| ()),
            RequestSender::Queued(tx) => tx.send(message).await.map_err(|_| ()),
        }
    }
}

#[async_trait]
impl crate::Client for ChannelClient {
    async fn disconnect(&self) -> Result<(), ()> {
        self.send(OutboundMessage::Disconnect).await
    }

    async fn publish_node_message(&self, topic: NodeTopic, payload: Payload) -> Result<(), ()> {
        self.send(OutboundMessage::NodeMessage { topic, payload }).await
    }

    async fn publish_device_message(&self, topic: DeviceTopic, payload: Payload) -> Result<(), ()> {
        self.send(OutboundMessage::DeviceMessage { topic, payload }).await
    }

    async fn subscribe_many(&self, topics: Vec<TopicFilter>) -> Result<(), ()> {
        self.send(OutboundMessage::Subscribe(topics)).await
    }

    async fn unsubscribe(&self, topic: Topic) -> Result<(), ()> {
        self.send(OutboundMessage::Unsubscribe(topic)).await
    }
}

/// An Enum representing different messages and requests a [ChannelClient] can send to the [ChannelBroker]
#[derive(Clone, Debug, PartialEq)]
pub enum OutboundMessage {
    Disconnect,
    NodeMessage {
        topic: NodeTopic,
        payload: Payload,
    },
    DeviceMessage {
        topic: DeviceTopic,
        payload: Payload,
    },
    Subscribe(Vec<TopicFilter>),
    Unsubscribe(Topic),
}

/// A "broker" that manages the communication between a [ChannelClient] and an [ChannelEventLoop].
///
/// Used to send events to the eventloop and inspect messages/requests produced by the client
///
/// # Examples
///
/// ```no_run
/// use sedge_client::{Event, channel::ChannelEventLoop};
/// use tokio::runtime::Runtime;
///
/// let rt = Runtime::new().unwrap();
/// rt.block_on(async {
///     let (mut eventloop, client, mut broker) = ChannelEventLoop::new();
///
///     //create a node that uses the EventLoop and client
///
///     //Send an event to the EventLoop
///     broker.tx_event.send(Event::Online).unwrap();
///
///     //Receive a message or request from the Client
///     let message = broker.rx_outbound.recv().await.unwrap();
/// });
/// ```
pub struct ChannelBroker {
    pub rx_outbound: mpsc::UnboundedReceiver<OutboundMessage>,
    pub tx_event: mpsc::UnboundedSender<Event>,
    last_will: Arc<Mutex<Option<LastWill>>>,
}

fn lock(will: &Mutex<Option<LastWill>>) -> MutexGuard<'_, Option<LastWill>> {
    will.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ChannelBroker {
    /// Retrieves the current last will message set by the EventLoop, if set.
    pub fn last_will(&self) -> Option<LastWill> {
        lock(&self.last_will).clone()
    }
}

struct RequestQueue {
    rx: mpsc::Receiver<OutboundMessage>,
    tx_outbound: mpsc::UnboundedSender<OutboundMessage>,
}

/// An [EventLoop](crate::EventLoop) implementation that uses channels
///
/// # Examples
///
/// See [ChannelBroker]
pub struct ChannelEventLoop {
    rx: mpsc::UnboundedReceiver<Event>,
    last_will: Arc<Mutex<Option<LastWill>>>,
    queue: Option<RequestQueue>,
}

impl ChannelEventLoop {
    /// Creates a new event loop along with the corresponding client and broker.
    ///
    /// Client requests reach the broker immediately.
    pub fn new() -> (Self, ChannelClient, ChannelBroker) {
        let (tx_outbound, rx_outbound) = mpsc::unbounded_channel();
        Self::build(RequestSender::Direct(tx_outbound), None, rx_outbound)
    }

    /// Like [ChannelEventLoop::new], but client requests are held in a queue of
    /// `cap` entries that is only forwarded to the broker while the event loop
    /// is being polled, the way a network transport behaves.
    pub fn new_bounded(cap: usize) -> (Self, ChannelClient, ChannelBroker) {
        let (tx_request, rx_request) = mpsc::channel(cap.max(1));
        let (tx_outbound, rx_outbound) = mpsc::unbounded_channel();
        let queue = RequestQueue {
            rx: rx_request,
            tx_outbound,
        };
        Self::build(RequestSender::Queued(tx_request), Some(queue), rx_outbound)
    }

    fn build(
        tx: RequestSender,
        queue: Option<RequestQueue>,
        rx_outbound: mpsc::UnboundedReceiver<OutboundMessage>,
    ) -> (Self, ChannelClient, ChannelBroker) {
        let (tx_event, rx_event) = mpsc::unbounded_channel();
        let last_will = Arc::new(Mutex::new(None));
        let el = Self {
            rx: rx_event,
            last_will: last_will.clone(),
            queue,
        };
        (
            el,
            ChannelClient { tx },
            ChannelBroker {
                rx_outbound,
                tx_event,
                last_will,
            },
        )
    }
}

#[async_trait]
impl crate::EventLoop for ChannelEventLoop {
    async fn poll(&mut self) -> Option<Event> {
        let Some(queue) = self.queue.as_mut() else {
            return self.rx.recv().await;
        };
        loop {
            select! {
                biased;
                event = self.rx.recv() => return event,
                Some(request) = queue.rx.recv() => {
                    _ = queue.tx_outbound.send(request);
                }
            }
        }
    }

    fn set_last_will(&mut self, will: LastWill) {
        *lock(&self.last_will) = Some(will)
    }
}
