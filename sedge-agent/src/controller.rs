//! Hysteresis cooling controller driven by the `setpoint` metric.

use std::sync::{Arc, Mutex, PoisonError};

use log::{debug, info};
use sedge::{
    node::{MetricDetails, MetricHandle, NodeHandle},
    types::{MetricType, MetricValue},
};

/// Switches cooling on once the temperature reaches the setpoint and off again
/// when it drops below `setpoint - deadband`.
#[derive(Debug, Clone, PartialEq)]
pub struct TempController {
    setpoint: f32,
    deadband: f32,
    cooling: bool,
}

impl TempController {
    pub fn new(setpoint: f32, deadband: f32) -> Self {
        Self {
            setpoint,
            deadband,
            cooling: false,
        }
    }

    pub fn setpoint(&self) -> f32 {
        self.setpoint
    }

    pub fn set_setpoint(&mut self, setpoint: f32) {
        info!("Received new setpoint value: {setpoint}");
        self.setpoint = setpoint;
    }

    pub fn is_cooling(&self) -> bool {
        self.cooling
    }

    /// Feed a temperature reading. Returns the new cooling state if it changed.
    pub fn update(&mut self, temperature: f32) -> Option<bool> {
        debug!("Temperature: {temperature}, Setpoint: {}", self.setpoint);
        if !self.cooling && temperature >= self.setpoint {
            self.cooling = true;
            debug!("Enabling cooling");
            return Some(true);
        }
        if self.cooling && temperature < self.setpoint - self.deadband {
            self.cooling = false;
            debug!("Disabling cooling");
            return Some(false);
        }
        None
    }
}

pub type SharedController = Arc<Mutex<TempController>>;

/// Register the controller device and its writable `setpoint` metric.
///
/// The metric echoes command writes back (readback) and every write updates
/// the controller's setpoint.
pub async fn attach(
    handle: &NodeHandle,
    device_id: &str,
    controller: SharedController,
) -> Result<MetricHandle, String> {
    handle
        .register_device(device_id)
        .await
        .map_err(|e| e.to_string())?;

    let initial = controller
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .setpoint();
    let target = controller.clone();
    let setpoint = handle
        .create_metric(
            MetricDetails::new("setpoint", MetricType::Float)
                .device(device_id)
                .readback(true)
                .on_change(move |value| {
                    //a zeroed metric keeps the current setpoint
                    if let Some(MetricValue::Float(v)) = value {
                        target
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .set_setpoint(*v);
                    }
                }),
        )
        .map_err(|e| e.to_string())?;
    handle
        .set_value(setpoint, initial)
        .map_err(|e| e.to_string())?;
    Ok(setpoint)
}
