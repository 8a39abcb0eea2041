//! [sedge_client] transport implementation over [rumqttc] using MQTT v5.

mod client;

pub use client::{Client, EventLoop};
pub use rumqttc::v5::MqttOptions;
