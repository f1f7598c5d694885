//! Environmental sensing for the enclosure: temperature, humidity and an
//! MQ-135 air-quality estimate, polled on a fixed period.

mod air_quality;
mod poller;
mod simulated;

pub use air_quality::{AirQuality, Mq135Calibration};
pub use poller::{PollOutcome, PollState, SensorPoller, SensorSettings};
pub use simulated::SimulatedSensor;

use anyhow::Result;
use std::time::{Duration, SystemTime};

/// One complete environmental sample.
#[derive(Clone, Debug, PartialEq)]
pub struct SensorReading {
    pub temperature_c: f32,
    pub humidity_pct: f32,
    pub air_quality: AirQuality,
    pub air_quality_ppm: f32,
    pub timestamp: SystemTime,
}

impl SensorReading {
    /// A reading older than two poll periods is stale.
    pub fn is_stale(&self, now: SystemTime, period: Duration) -> bool {
        match now.duration_since(self.timestamp) {
            Ok(age) => age > period * 2,
            Err(_) => false,
        }
    }
}

/// Hardware (or simulated) access to the enclosure sensors.
///
/// Implementations report transient bus errors as `Err`; the poller retries.
pub trait EnvironmentSensor: Send {
    fn name(&self) -> &'static str;

    /// Temperature in degrees Celsius and relative humidity in percent.
    fn read_temperature_humidity(&mut self) -> Result<(f32, f32)>;

    /// Air-quality grade and ppm estimate.
    fn read_air_quality(&mut self) -> Result<(AirQuality, f32)>;
}

impl<S: EnvironmentSensor + ?Sized> EnvironmentSensor for Box<S> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn read_temperature_humidity(&mut self) -> Result<(f32, f32)> {
        (**self).read_temperature_humidity()
    }

    fn read_air_quality(&mut self) -> Result<(AirQuality, f32)> {
        (**self).read_air_quality()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reading_goes_stale_after_two_periods() {
        let taken = SystemTime::now();
        let reading = SensorReading {
            temperature_c: 22.5,
            humidity_pct: 40.2,
            air_quality: AirQuality::Good,
            air_quality_ppm: 55.0,
            timestamp: taken,
        };
        let period = Duration::from_secs(2);
        assert!(!reading.is_stale(taken + Duration::from_secs(4), period));
        assert!(reading.is_stale(taken + Duration::from_secs(5), period));
        assert!(!reading.is_stale(taken - Duration::from_secs(1), period));
    }
}
