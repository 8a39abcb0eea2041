mod utils;

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use bytes::Bytes;
use sedge_client::{
    channel::{ChannelBroker, ChannelClient, ChannelEventLoop, OutboundMessage},
    Event,
};
use sedge_node::{BirthState, MetricDetails, MetricHandle, NodeAgentBuilder, NodeHandle, TelemetrySource};
use sedge_types::{
    payload::metric,
    topic::{DeviceMessage, DeviceTopic, Topic},
    MetricType, MetricValue,
};
use utils::tester::{
    assert_no_message, command_payload, dcmd, ncmd, recv, test_graceful_shutdown,
    test_node_online, verify_device_birth, wait_for, will_bdseq,
};

const GROUP_ID: &str = "Plant1";
const NODE_ID: &str = "AABBCC";

fn start(builder: impl FnOnce(NodeAgentBuilder) -> NodeAgentBuilder) -> (NodeHandle, ChannelBroker) {
    start_on(ChannelEventLoop::new(), builder)
}

fn start_on(
    (eventloop, client, broker): (ChannelEventLoop, ChannelClient, ChannelBroker),
    builder: impl FnOnce(NodeAgentBuilder) -> NodeAgentBuilder,
) -> (NodeHandle, ChannelBroker) {
    let builder = builder(
        NodeAgentBuilder::new(eventloop, client)
            .with_group_id(GROUP_ID)
            .with_node_id(NODE_ID),
    );
    let (agent, handle) = builder.build().unwrap();
    tokio::spawn(async move { agent.run().await });
    (handle, broker)
}

#[tokio::test]
async fn node_session_establishment() {
    let (handle, mut broker) = start(|b| b);

    test_node_online(&mut broker, GROUP_ID, NODE_ID, 0).await;
    assert_eq!(will_bdseq(&broker), 0);
    assert_eq!(handle.node_state(), BirthState::Born);
    assert_eq!(handle.bdseq(), 1);

    broker.tx_event.send(Event::Offline).unwrap();
    test_node_online(&mut broker, GROUP_ID, NODE_ID, 1).await;
    assert_eq!(will_bdseq(&broker), 1);

    broker.tx_event.send(Event::Offline).unwrap();
    wait_for(|| handle.node_state() == BirthState::Unborn).await;
    assert_eq!(will_bdseq(&broker), 2);
    assert_no_message(&mut broker).await;
}

#[tokio::test]
async fn device_session_establishment() {
    let (handle, mut broker) = start(|b| b);

    /* Add device before node is online */
    handle.register_device("dev1").await.unwrap();
    handle
        .create_metric(MetricDetails::new("temperature", MetricType::Float).device("dev1"))
        .unwrap();

    test_node_online(&mut broker, GROUP_ID, NODE_ID, 0).await;
    let birth = verify_device_birth(&mut broker, GROUP_ID, NODE_ID, "dev1", 1).await;
    assert_eq!(birth.metrics.len(), 1);
    assert_eq!(birth.metrics[0].name.as_deref(), Some("temperature"));
    assert_eq!(birth.metrics[0].alias, Some(3));
    assert_eq!(birth.metrics[0].value, Some(metric::Value::FloatValue(0.0)));

    broker.tx_event.send(Event::Offline).unwrap();
    test_node_online(&mut broker, GROUP_ID, NODE_ID, 1).await;
    verify_device_birth(&mut broker, GROUP_ID, NODE_ID, "dev1", 1).await;

    /* Add device while node is online */
    handle.register_device("dev2").await.unwrap();
    verify_device_birth(&mut broker, GROUP_ID, NODE_ID, "dev2", 2).await;
    assert_eq!(handle.device_state("dev2"), Some(BirthState::Born));
}

#[tokio::test]
async fn command_updates_device_metric() {
    let (handle, mut broker) = start(|b| b);
    handle.register_device("dht").await.unwrap();
    let temperature = handle
        .create("temperature", Some("dht"), MetricType::Float, false, None)
        .unwrap();
    assert_eq!(temperature.alias(), 3);

    test_node_online(&mut broker, GROUP_ID, NODE_ID, 0).await;
    verify_device_birth(&mut broker, GROUP_ID, NODE_ID, "dht", 1).await;

    broker
        .tx_event
        .send(dcmd(
            GROUP_ID,
            NODE_ID,
            "dht",
            command_payload(vec![(3, metric::Value::FloatValue(72.5))]),
        ))
        .unwrap();

    wait_for(|| handle.get(temperature) == Ok(MetricValue::Float(72.5))).await;
    /* readback is off */
    assert_no_message(&mut broker).await;
}

#[tokio::test]
async fn unrecognized_command_changes_nothing() {
    let (handle, mut broker) = start(|b| b);
    handle.register_device("dht").await.unwrap();
    let temperature = handle
        .create_metric(MetricDetails::new("temperature", MetricType::Float).device("dht"))
        .unwrap();
    handle.set_value(temperature, 20.0f32).unwrap();

    test_node_online(&mut broker, GROUP_ID, NODE_ID, 0).await;
    verify_device_birth(&mut broker, GROUP_ID, NODE_ID, "dht", 1).await;

    broker
        .tx_event
        .send(dcmd(
            GROUP_ID,
            NODE_ID,
            "dht",
            command_payload(vec![(999, metric::Value::IntValue(1))]),
        ))
        .unwrap();
    broker
        .tx_event
        .send(dcmd(GROUP_ID, NODE_ID, "dht", Bytes::from_static(&[0xff, 0xff, 0xff])))
        .unwrap();

    assert_no_message(&mut broker).await;
    assert_eq!(handle.get(temperature), Ok(MetricValue::Float(20.0)));
    assert_eq!(handle.node_state(), BirthState::Born);
}

#[tokio::test]
async fn rebirth_command() {
    let rebirths = Arc::new(AtomicUsize::new(0));
    let hook = rebirths.clone();
    let (handle, mut broker) = start(|b| {
        b.with_rebirth_handler(move || {
            hook.fetch_add(1, Ordering::SeqCst);
        })
    });

    test_node_online(&mut broker, GROUP_ID, NODE_ID, 0).await;

    /* Rebirth with no devices attached */
    broker
        .tx_event
        .send(ncmd(
            GROUP_ID,
            NODE_ID,
            command_payload(vec![(1, metric::Value::BooleanValue(true))]),
        ))
        .unwrap();
    utils::tester::expect_nbirth(&mut broker, GROUP_ID, NODE_ID, 1).await;
    assert_eq!(will_bdseq(&broker), 1);
    assert_eq!(rebirths.load(Ordering::SeqCst), 1);

    handle.register_device("dev1").await.unwrap();
    verify_device_birth(&mut broker, GROUP_ID, NODE_ID, "dev1", 1).await;
    handle.register_device("dev2").await.unwrap();
    verify_device_birth(&mut broker, GROUP_ID, NODE_ID, "dev2", 2).await;

    /* Rebirth rebirths every device, in registration order */
    broker
        .tx_event
        .send(ncmd(
            GROUP_ID,
            NODE_ID,
            command_payload(vec![(1, metric::Value::BooleanValue(true))]),
        ))
        .unwrap();
    utils::tester::expect_nbirth(&mut broker, GROUP_ID, NODE_ID, 2).await;
    verify_device_birth(&mut broker, GROUP_ID, NODE_ID, "dev1", 1).await;
    verify_device_birth(&mut broker, GROUP_ID, NODE_ID, "dev2", 2).await;
    assert_eq!(rebirths.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn manual_rebirth() {
    let (handle, mut broker) = start(|b| b);
    test_node_online(&mut broker, GROUP_ID, NODE_ID, 0).await;
    handle.rebirth();
    utils::tester::expect_nbirth(&mut broker, GROUP_ID, NODE_ID, 1).await;
}

#[tokio::test]
async fn readback_echoes_command_writes() {
    let setpoints = Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = setpoints.clone();
    let (handle, mut broker) = start(|b| b);
    handle.register_device("temp-controller").await.unwrap();
    let setpoint = handle
        .create_metric(
            MetricDetails::new("setpoint", MetricType::Float)
                .device("temp-controller")
                .readback(true)
                .on_change(move |v| sink.lock().unwrap().push(v.cloned())),
        )
        .unwrap();

    test_node_online(&mut broker, GROUP_ID, NODE_ID, 0).await;
    verify_device_birth(&mut broker, GROUP_ID, NODE_ID, "temp-controller", 1).await;

    broker
        .tx_event
        .send(dcmd(
            GROUP_ID,
            NODE_ID,
            "temp-controller",
            command_payload(vec![(setpoint.alias(), metric::Value::FloatValue(24.5))]),
        ))
        .unwrap();

    let (topic, payload) = match recv(&mut broker).await {
        OutboundMessage::DeviceMessage { topic, payload } => (topic, payload),
        message => panic!("expected DDATA, got {message:?}"),
    };
    assert_eq!(
        topic,
        DeviceTopic::new(GROUP_ID, DeviceMessage::DData, NODE_ID, "temp-controller")
    );
    assert_eq!(payload.seq, Some(2));
    assert_eq!(payload.metrics.len(), 1);
    assert_eq!(payload.metrics[0].alias, Some(setpoint.alias()));
    assert_eq!(payload.metrics[0].name, None);
    assert_eq!(payload.metrics[0].value, Some(metric::Value::FloatValue(24.5)));
    assert_no_message(&mut broker).await;

    assert_eq!(
        *setpoints.lock().unwrap(),
        vec![None, Some(MetricValue::Float(24.5))]
    );
}

#[tokio::test]
async fn device_death_then_unsubscribe() {
    let (handle, mut broker) = start(|b| b);
    handle.register_device("dht").await.unwrap();
    test_node_online(&mut broker, GROUP_ID, NODE_ID, 0).await;
    verify_device_birth(&mut broker, GROUP_ID, NODE_ID, "dht", 1).await;

    handle.death_device("dht").await;
    let (topic, payload) = match recv(&mut broker).await {
        OutboundMessage::DeviceMessage { topic, payload } => (topic, payload),
        message => panic!("expected DDEATH, got {message:?}"),
    };
    assert_eq!(
        topic,
        DeviceTopic::new(GROUP_ID, DeviceMessage::DDeath, NODE_ID, "dht")
    );
    assert_eq!(payload.seq, Some(2));
    assert!(payload.metrics.is_empty());
    assert_eq!(
        recv(&mut broker).await,
        OutboundMessage::Unsubscribe(Topic::DeviceTopic(DeviceTopic::new(
            GROUP_ID,
            DeviceMessage::DCmd,
            NODE_ID,
            "dht"
        )))
    );

    /* dead devices stay dead over a rebirth */
    handle.rebirth();
    utils::tester::expect_nbirth(&mut broker, GROUP_ID, NODE_ID, 1).await;
    assert_no_message(&mut broker).await;

    handle.birth_device("dht").await;
    verify_device_birth(&mut broker, GROUP_ID, NODE_ID, "dht", 1).await;
}

#[tokio::test]
async fn requests_complete_on_a_single_slot_queue() {
    let (handle, mut broker) = start_on(ChannelEventLoop::new_bounded(1), |b| b);
    test_node_online(&mut broker, GROUP_ID, NODE_ID, 0).await;

    handle.register_device("dht").await.unwrap();
    verify_device_birth(&mut broker, GROUP_ID, NODE_ID, "dht", 1).await;

    handle.death_device("dht").await;
    match recv(&mut broker).await {
        OutboundMessage::DeviceMessage { topic, .. } => assert_eq!(
            topic,
            DeviceTopic::new(GROUP_ID, DeviceMessage::DDeath, NODE_ID, "dht")
        ),
        message => panic!("expected DDEATH, got {message:?}"),
    }
    assert_eq!(
        recv(&mut broker).await,
        OutboundMessage::Unsubscribe(Topic::DeviceTopic(DeviceTopic::new(
            GROUP_ID,
            DeviceMessage::DCmd,
            NODE_ID,
            "dht"
        )))
    );

    test_graceful_shutdown(&mut broker, &handle, GROUP_ID, NODE_ID, 0).await;
}

#[tokio::test]
async fn node_control_handlers() {
    let next_server = Arc::new(AtomicUsize::new(0));
    let reboots = Arc::new(AtomicUsize::new(0));
    let (n, r) = (next_server.clone(), reboots.clone());
    let (_handle, mut broker) = start(|b| {
        b.with_next_server_handler(move || {
            n.fetch_add(1, Ordering::SeqCst);
        })
        .with_reboot_handler(move || {
            r.fetch_add(1, Ordering::SeqCst);
        })
    });
    test_node_online(&mut broker, GROUP_ID, NODE_ID, 0).await;

    broker
        .tx_event
        .send(ncmd(
            GROUP_ID,
            NODE_ID,
            command_payload(vec![
                (0, metric::Value::BooleanValue(true)),
                (2, metric::Value::BooleanValue(true)),
            ]),
        ))
        .unwrap();

    wait_for(|| reboots.load(Ordering::SeqCst) == 1).await;
    assert_eq!(next_server.load(Ordering::SeqCst), 1);
    assert_no_message(&mut broker).await;
}

#[tokio::test]
async fn commands_for_other_nodes_are_ignored() {
    let (handle, mut broker) = start(|b| b);
    let counter = handle
        .create_metric(MetricDetails::new("counter", MetricType::Int32))
        .unwrap();
    test_node_online(&mut broker, GROUP_ID, NODE_ID, 0).await;

    broker
        .tx_event
        .send(ncmd(
            GROUP_ID,
            "OTHER",
            command_payload(vec![(counter.alias(), metric::Value::IntValue(5))]),
        ))
        .unwrap();
    broker
        .tx_event
        .send(ncmd(
            GROUP_ID,
            NODE_ID,
            command_payload(vec![(counter.alias(), metric::Value::IntValue(7))]),
        ))
        .unwrap();

    wait_for(|| handle.get(counter) == Ok(MetricValue::Int32(7))).await;
    assert_no_message(&mut broker).await;
}

struct HumiditySource {
    register_device: bool,
    metric: Option<MetricHandle>,
    reading: f32,
}

impl HumiditySource {
    fn new(register_device: bool) -> Self {
        Self {
            register_device,
            metric: None,
            reading: 0.0,
        }
    }
}

impl TelemetrySource for HumiditySource {
    fn init(&mut self, handle: &NodeHandle) -> Result<(), String> {
        if self.register_device {
            handle.try_register_device("dht").map_err(|e| e.to_string())?;
        }
        let metric = handle
            .create_metric(MetricDetails::new("humidity", MetricType::Float).device("dht"))
            .map_err(|e| e.to_string())?;
        self.metric = Some(metric);
        Ok(())
    }

    fn sample(&mut self) -> Vec<(MetricHandle, MetricValue)> {
        self.reading += 1.0;
        self.metric
            .map(|h| vec![(h, MetricValue::Float(self.reading))])
            .unwrap_or_default()
    }
}

#[tokio::test]
async fn telemetry_source_init_failure_fails_build() {
    let (eventloop, client, _broker) = ChannelEventLoop::new();
    let result = NodeAgentBuilder::new(eventloop, client)
        .with_group_id(GROUP_ID)
        .with_node_id(NODE_ID)
        .with_telemetry_source(HumiditySource::new(false))
        .build();
    assert!(result.is_err());
}

#[tokio::test]
async fn telemetry_is_published_once_born() {
    let (handle, mut broker) = start(|b| {
        b.with_telemetry_interval(Duration::from_millis(50))
            .with_telemetry_source(HumiditySource::new(true))
    });

    /* nothing goes out while the node is unborn */
    assert_no_message(&mut broker).await;

    test_node_online(&mut broker, GROUP_ID, NODE_ID, 0).await;
    verify_device_birth(&mut broker, GROUP_ID, NODE_ID, "dht", 1).await;

    for expected_seq in 2..4 {
        let (topic, payload) = match recv(&mut broker).await {
            OutboundMessage::DeviceMessage { topic, payload } => (topic, payload),
            message => panic!("expected DDATA, got {message:?}"),
        };
        assert_eq!(topic, DeviceTopic::new(GROUP_ID, DeviceMessage::DData, NODE_ID, "dht"));
        assert_eq!(payload.seq, Some(expected_seq));
        assert_eq!(payload.metrics.len(), 1);
        assert_eq!(payload.metrics[0].alias, Some(3));
        assert!(matches!(
            payload.metrics[0].value,
            Some(metric::Value::FloatValue(_))
        ));
    }

    broker.tx_event.send(Event::Offline).unwrap();
    wait_for(|| handle.node_state() == BirthState::Unborn).await;
    /* drain anything published before the disconnect was processed */
    while let Ok(message) = broker.rx_outbound.try_recv() {
        assert!(matches!(message, OutboundMessage::DeviceMessage { .. }));
    }
    assert_no_message(&mut broker).await;
}

#[tokio::test]
async fn graceful_shutdown() {
    let (handle, mut broker) = start(|b| b);
    test_node_online(&mut broker, GROUP_ID, NODE_ID, 0).await;
    test_graceful_shutdown(&mut broker, &handle, GROUP_ID, NODE_ID, 0).await;
}

#[tokio::test]
async fn builder_validation() {
    let (eventloop, client, _broker) = ChannelEventLoop::new();
    assert!(NodeAgentBuilder::new(eventloop, client)
        .with_group_id("Plant1")
        .build()
        .is_err());

    let (eventloop, client, _broker) = ChannelEventLoop::new();
    assert!(NodeAgentBuilder::new(eventloop, client)
        .with_group_id("Plant/1")
        .with_node_id("AABBCC")
        .build()
        .is_err());

    let (eventloop, client, _broker) = ChannelEventLoop::new();
    assert!(NodeAgentBuilder::new(eventloop, client)
        .with_group_id("Plant1")
        .with_node_id("AABBCC")
        .with_telemetry_interval(Duration::ZERO)
        .build()
        .is_err());
}
