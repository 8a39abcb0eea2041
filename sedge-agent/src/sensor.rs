use log::{debug, warn};
use rand::Rng;
use sedge::{
    node::{MetricDetails, MetricHandle, NodeHandle, TelemetrySource},
    types::{MetricType, MetricValue},
};

use crate::controller::SharedController;

const TEMPERATURE_RANGE: (f32, f32) = (-10.0, 50.0);
const HUMIDITY_RANGE: (f32, f32) = (0.0, 100.0);
/// Temperature drop per reading while cooling is on
const COOLING_RATE: f32 = 0.4;

/// Simulated DHT temperature and humidity sensor.
///
/// Readings follow a bounded random walk. When a controller is attached it is
/// fed every temperature reading and its cooling state pulls the temperature
/// down.
pub struct DhtSensor {
    device_id: String,
    temperature: f32,
    humidity: f32,
    handles: Option<(MetricHandle, MetricHandle)>,
    controller: Option<SharedController>,
}

impl DhtSensor {
    pub fn new<S: Into<String>>(device_id: S) -> Self {
        Self {
            device_id: device_id.into(),
            temperature: 22.0,
            humidity: 45.0,
            handles: None,
            controller: None,
        }
    }

    pub fn with_controller(mut self, controller: SharedController) -> Self {
        self.controller = Some(controller);
        self
    }

    /// Advance the simulation by one reading
    pub fn step<R: Rng>(&mut self, rng: &mut R, cooling: bool) -> (f32, f32) {
        let mut drift = rng.gen_range(-0.3..=0.3);
        if cooling {
            drift -= COOLING_RATE;
        } else {
            drift += 0.1;
        }
        self.temperature = (self.temperature + drift).clamp(TEMPERATURE_RANGE.0, TEMPERATURE_RANGE.1);
        self.humidity =
            (self.humidity + rng.gen_range(-1.0..=1.0)).clamp(HUMIDITY_RANGE.0, HUMIDITY_RANGE.1);
        (self.temperature, self.humidity)
    }

    fn cooling(&self) -> bool {
        self.controller
            .as_ref()
            .map(|c| c.lock().map(|c| c.is_cooling()).unwrap_or(false))
            .unwrap_or(false)
    }
}

impl TelemetrySource for DhtSensor {
    fn init(&mut self, handle: &NodeHandle) -> Result<(), String> {
        handle
            .try_register_device(self.device_id.as_str())
            .map_err(|e| e.to_string())?;
        let temperature = handle
            .create_metric(MetricDetails::new("temperature", MetricType::Float).device(&self.device_id))
            .map_err(|e| e.to_string())?;
        let humidity = handle
            .create_metric(MetricDetails::new("humidity", MetricType::Float).device(&self.device_id))
            .map_err(|e| e.to_string())?;
        self.handles = Some((temperature, humidity));
        Ok(())
    }

    fn sample(&mut self) -> Vec<(MetricHandle, MetricValue)> {
        let Some((temperature_metric, humidity_metric)) = self.handles else {
            return Vec::new();
        };
        let cooling = self.cooling();
        let (temperature, humidity) = self.step(&mut rand::thread_rng(), cooling);
        debug!("DHT reading. temperature={temperature} humidity={humidity}");

        if let Some(controller) = &self.controller {
            match controller.lock() {
                Ok(mut controller) => {
                    controller.update(temperature);
                }
                Err(_) => warn!("Controller state poisoned, skipping update"),
            }
        }

        vec![
            (temperature_metric, MetricValue::Float(temperature)),
            (humidity_metric, MetricValue::Float(humidity)),
        ]
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use rand::{rngs::StdRng, SeedableRng};

    use super::*;
    use crate::controller::TempController;

    #[test]
    fn readings_stay_in_range() {
        let mut sensor = DhtSensor::new("dht");
        let mut rng = StdRng::seed_from_u64(7);
        for i in 0..2000 {
            let (t, h) = sensor.step(&mut rng, i % 500 < 250);
            assert!((TEMPERATURE_RANGE.0..=TEMPERATURE_RANGE.1).contains(&t));
            assert!((HUMIDITY_RANGE.0..=HUMIDITY_RANGE.1).contains(&h));
        }
    }

    #[test]
    fn cooling_lowers_temperature() {
        let mut sensor = DhtSensor::new("dht");
        let mut rng = StdRng::seed_from_u64(1);
        let start = sensor.temperature;
        for _ in 0..10 {
            sensor.step(&mut rng, true);
        }
        assert!(sensor.temperature < start);
    }

    #[test]
    fn sample_without_init_is_empty() {
        let controller = Arc::new(Mutex::new(TempController::new(25.0, 1.0)));
        let mut sensor = DhtSensor::new("dht").with_controller(controller);
        assert!(sensor.sample().is_empty());
    }
}
