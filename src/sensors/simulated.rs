use anyhow::{anyhow, Result};
use rand::Rng;

use super::{AirQuality, EnvironmentSensor, Mq135Calibration};

/// Stand-in for the enclosure sensors on hosts without the hardware.
///
/// Values wander around a fixed baseline. `failure_rate` injects bus errors.
pub struct SimulatedSensor {
    base_temperature_c: f32,
    base_humidity_pct: f32,
    base_voltage: f32,
    calibration: Mq135Calibration,
    failure_rate: f64,
}

impl SimulatedSensor {
    pub fn new(calibration: Mq135Calibration) -> Self {
        Self {
            base_temperature_c: 22.5,
            base_humidity_pct: 40.2,
            base_voltage: 0.45,
            calibration,
            failure_rate: 0.0,
        }
    }

    pub fn with_failure_rate(mut self, rate: f64) -> Self {
        self.failure_rate = rate.clamp(0.0, 1.0);
        self
    }

    fn maybe_fail(&self, what: &str) -> Result<()> {
        if self.failure_rate > 0.0 && rand::thread_rng().gen_bool(self.failure_rate) {
            return Err(anyhow!("simulated {} read failure", what));
        }
        Ok(())
    }
}

impl Default for SimulatedSensor {
    fn default() -> Self {
        Self::new(Mq135Calibration::default())
    }
}

impl EnvironmentSensor for SimulatedSensor {
    fn name(&self) -> &'static str {
        "simulated"
    }

    fn read_temperature_humidity(&mut self) -> Result<(f32, f32)> {
        self.maybe_fail("temperature/humidity")?;
        let mut rng = rand::thread_rng();
        let temperature = self.base_temperature_c + rng.gen_range(-0.3..=0.3);
        let humidity = (self.base_humidity_pct + rng.gen_range(-1.0..=1.0)).clamp(0.0, 100.0);
        Ok((temperature, humidity))
    }

    fn read_air_quality(&mut self) -> Result<(AirQuality, f32)> {
        self.maybe_fail("air quality")?;
        let voltage = self.base_voltage + rand::thread_rng().gen_range(-0.05..=0.05);
        Ok(self.calibration.grade(voltage))
    }
}
