//! sedge: a Sparkplug B edge node agent.
//!
//! Re-exports the workspace crates under one roof. The `node` feature pulls in
//! the edge node core, `rumqtt-client` the MQTT transport built on rumqttc.

#[cfg(feature = "node")]
pub use sedge_node as node;
pub use sedge_types as types;
pub mod client {
  pub use sedge_client::*;

  #[cfg(feature = "rumqtt-client")]
  pub mod mqtt_client {
    pub use sedge_client_rumqtt as rumqtt;
  }
}
