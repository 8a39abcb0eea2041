#![allow(dead_code)]

use std::time::Duration;

use bytes::Bytes;
use sedge_client::{
    channel::{ChannelBroker, OutboundMessage},
    DeviceMessage as DeviceEvent, Event, Message as ClientMessage, MessageKind,
    NodeMessage as NodeEvent,
};
use sedge_node::NodeHandle;
use sedge_types::{
    constants::{
        BDSEQ, NODE_CONTROL_NEXT_SERVER, NODE_CONTROL_REBIRTH, NODE_CONTROL_REBOOT,
    },
    payload::{metric, DataType, Message, Metric, Payload},
    topic::{DeviceMessage, DeviceTopic, NodeMessage, NodeTopic, QoS, Topic, TopicFilter},
};
use tokio::time::{sleep, timeout};

pub async fn recv(broker: &mut ChannelBroker) -> OutboundMessage {
    timeout(Duration::from_secs(1), broker.rx_outbound.recv())
        .await
        .expect("timed out waiting for an outbound message")
        .expect("client dropped")
}

pub async fn assert_no_message(broker: &mut ChannelBroker) {
    if let Ok(message) = timeout(Duration::from_millis(100), broker.rx_outbound.recv()).await {
        panic!("unexpected outbound message {message:?}")
    }
}

/// Poll `condition` until it holds or a second has passed
pub async fn wait_for<F: Fn() -> bool>(condition: F) {
    timeout(Duration::from_secs(1), async {
        while !condition() {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time")
}

pub fn bdseq_of(payload: &Payload) -> u64 {
    let metric = payload
        .metrics
        .iter()
        .find(|m| m.name.as_deref() == Some(BDSEQ))
        .expect("payload has no bdSeq metric");
    assert_eq!(metric.alias, None);
    assert_eq!(metric.datatype, Some(DataType::Int64 as u32));
    match metric.value {
        Some(metric::Value::LongValue(v)) => v,
        ref other => panic!("bdSeq has unexpected value {other:?}"),
    }
}

pub fn will_bdseq(broker: &ChannelBroker) -> u64 {
    let will = broker.last_will().expect("no will installed");
    assert_eq!(will.qos, QoS::AtLeastOnce);
    assert!(!will.retain);
    let payload = Payload::decode(will.payload.as_slice()).unwrap();
    assert_eq!(payload.seq, None);
    bdseq_of(&payload)
}

pub fn create_test_ndeath_payload(expected_bdseq: u64) -> Payload {
    let mut metric = Metric::new();
    metric
        .set_name(BDSEQ.to_string())
        .set_datatype(DataType::Int64)
        .set_value(metric::Value::LongValue(expected_bdseq));
    Payload {
        timestamp: None,
        metrics: vec![metric],
        seq: None,
        uuid: None,
        body: None,
    }
}

pub fn verify_nbirth_payload(payload: &Payload, expected_bdseq: u64) {
    assert_eq!(payload.seq, Some(0));
    assert_ne!(payload.timestamp, None);
    assert_eq!(bdseq_of(payload), expected_bdseq);

    let controls: Vec<(Option<&str>, Option<u64>)> = payload.metrics[1..4]
        .iter()
        .map(|m| (m.name.as_deref(), m.alias))
        .collect();
    assert_eq!(
        controls,
        vec![
            (Some(NODE_CONTROL_NEXT_SERVER), Some(0)),
            (Some(NODE_CONTROL_REBIRTH), Some(1)),
            (Some(NODE_CONTROL_REBOOT), Some(2)),
        ]
    );

    for metric in &payload.metrics {
        assert_ne!(metric.datatype, None);
        assert!(metric.name.is_some(), "Metric name is required in birth payload");
        if metric.value.is_some() {
            assert_eq!(metric.is_null, None)
        }
        if metric.is_null == Some(true) {
            assert_eq!(metric.value, None)
        }
    }
    for control in &payload.metrics[1..4] {
        assert_eq!(control.datatype, Some(DataType::Boolean as u32));
        assert_eq!(control.value, Some(metric::Value::BooleanValue(false)));
    }
}

pub fn verify_dbirth_payload(payload: &Payload, expected_seq: u64) {
    assert_eq!(payload.seq, Some(expected_seq));
    assert_ne!(payload.timestamp, None);
    for metric in &payload.metrics {
        assert!(metric.name.is_some());
        assert!(metric.alias.is_some());
        assert_ne!(metric.datatype, None);
    }
}

pub async fn expect_nbirth(
    broker: &mut ChannelBroker,
    group_id: &str,
    node_id: &str,
    expected_bdseq: u64,
) -> Payload {
    let filter = match recv(broker).await {
        OutboundMessage::Subscribe(filters) => filters,
        message => panic!("expected NCMD subscription, got {message:?}"),
    };
    assert_eq!(
        filter,
        vec![TopicFilter::new_with_qos(
            Topic::NodeTopic(NodeTopic::new(group_id, NodeMessage::NCmd, node_id)),
            QoS::AtMostOnce,
        )]
    );

    let (topic, payload) = match recv(broker).await {
        OutboundMessage::NodeMessage { topic, payload } => (topic, payload),
        message => panic!("expected NBIRTH, got {message:?}"),
    };
    assert_eq!(topic, NodeTopic::new(group_id, NodeMessage::NBirth, node_id));
    verify_nbirth_payload(&payload, expected_bdseq);
    payload
}

pub async fn test_node_online(
    broker: &mut ChannelBroker,
    group_id: &str,
    node_id: &str,
    expected_bdseq: u64,
) -> Payload {
    broker.tx_event.send(Event::Online).unwrap();
    expect_nbirth(broker, group_id, node_id, expected_bdseq).await
}

pub async fn verify_device_birth(
    broker: &mut ChannelBroker,
    group_id: &str,
    node_id: &str,
    device_id: &str,
    expected_seq: u64,
) -> Payload {
    match recv(broker).await {
        OutboundMessage::Subscribe(filters) => assert_eq!(
            filters,
            vec![TopicFilter::new(Topic::DeviceTopic(DeviceTopic::new(
                group_id,
                DeviceMessage::DCmd,
                node_id,
                device_id
            )))]
        ),
        message => panic!("expected DCMD subscription, got {message:?}"),
    }

    let (topic, payload) = match recv(broker).await {
        OutboundMessage::DeviceMessage { topic, payload } => (topic, payload),
        message => panic!("expected DBIRTH, got {message:?}"),
    };
    assert_eq!(
        topic,
        DeviceTopic::new(group_id, DeviceMessage::DBirth, node_id, device_id)
    );
    verify_dbirth_payload(&payload, expected_seq);
    payload
}

pub fn command_payload(metrics: Vec<(u64, metric::Value)>) -> Bytes {
    let metrics = metrics
        .into_iter()
        .map(|(alias, value)| {
            let mut metric = Metric::new();
            metric.set_alias(alias).set_value(value);
            metric
        })
        .collect();
    let payload = Payload {
        timestamp: Some(0),
        metrics,
        seq: None,
        uuid: None,
        body: None,
    };
    Bytes::from(Vec::<u8>::from(payload))
}

pub fn ncmd(group_id: &str, node_id: &str, payload: Bytes) -> Event {
    Event::Node(NodeEvent {
        group_id: group_id.to_string(),
        node_id: node_id.to_string(),
        message: ClientMessage {
            kind: MessageKind::Cmd,
            payload,
        },
    })
}

pub fn dcmd(group_id: &str, node_id: &str, device_id: &str, payload: Bytes) -> Event {
    Event::Device(DeviceEvent {
        group_id: group_id.to_string(),
        node_id: node_id.to_string(),
        device_id: device_id.to_string(),
        message: ClientMessage {
            kind: MessageKind::Cmd,
            payload,
        },
    })
}

// Test graceful shutdown using handle.cancel()
pub async fn test_graceful_shutdown(
    broker: &mut ChannelBroker,
    handle: &NodeHandle,
    group_id: &str,
    node_id: &str,
    expected_bdseq: u64,
) {
    handle.cancel().await;

    let (topic, payload) = match recv(broker).await {
        OutboundMessage::NodeMessage { topic, payload } => (topic, payload),
        message => panic!("expected NDEATH, got {message:?}"),
    };
    assert_eq!(topic, NodeTopic::new(group_id, NodeMessage::NDeath, node_id));
    assert_eq!(payload, create_test_ndeath_payload(expected_bdseq));

    assert_eq!(recv(broker).await, OutboundMessage::Disconnect);
}
