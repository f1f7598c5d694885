use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant, SystemTime};

use crate::shutdown::ShutdownSignal;
use crate::slot::SlotWriter;

use super::{AirQuality, EnvironmentSensor, Mq135Calibration, SensorReading};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorSettings {
    /// Poll period.
    pub interval_ms: u64,
    /// Attempts per poll before the poll is abandoned.
    pub retry_attempts: u32,
    /// Pause between attempts within one poll.
    pub retry_backoff_ms: u64,
    pub mq135: Mq135Calibration,
}

impl Default for SensorSettings {
    fn default() -> Self {
        Self {
            interval_ms: 2000,
            retry_attempts: 3,
            retry_backoff_ms: 500,
            mq135: Mq135Calibration::default(),
        }
    }
}

impl SensorSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// Where the poller is in its cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollState {
    Idle,
    Reading { attempt: u32 },
    /// Last poll exhausted its attempts; the previous reading is still current.
    Failed,
    Stopped,
}

#[derive(Clone, Debug, PartialEq)]
pub enum PollOutcome {
    Fresh(SensorReading),
    Failed { attempts: u32 },
    Interrupted,
}

/// Periodic reader with bounded retries.
///
/// A failed poll leaves the last good reading in place, timestamp included,
/// so consumers can tell how old it is.
pub struct SensorPoller<S> {
    sensor: S,
    settings: SensorSettings,
    state: PollState,
    failed_polls: u64,
}

impl<S: EnvironmentSensor> SensorPoller<S> {
    pub fn new(sensor: S, settings: SensorSettings) -> Self {
        Self {
            sensor,
            settings,
            state: PollState::Idle,
            failed_polls: 0,
        }
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    pub fn failed_polls(&self) -> u64 {
        self.failed_polls
    }

    pub fn settings(&self) -> &SensorSettings {
        &self.settings
    }

    /// Take one reading, retrying up to `retry_attempts` times.
    ///
    /// Only a temperature/humidity failure fails an attempt. An air-quality
    /// failure is logged and reported as `Unknown` at 0 ppm.
    pub fn poll_once(&mut self, shutdown: &ShutdownSignal) -> PollOutcome {
        let attempts = self.settings.retry_attempts.max(1);
        for attempt in 1..=attempts {
            self.state = PollState::Reading { attempt };
            match self.sensor.read_temperature_humidity() {
                Ok((temperature_c, humidity_pct)) => {
                    let (air_quality, air_quality_ppm) = match self.sensor.read_air_quality() {
                        Ok(grade) => grade,
                        Err(err) => {
                            log::warn!("{}: air quality read failed: {}", self.sensor.name(), err);
                            (AirQuality::Unknown, 0.0)
                        }
                    };
                    self.state = PollState::Idle;
                    return PollOutcome::Fresh(SensorReading {
                        temperature_c,
                        humidity_pct,
                        air_quality,
                        air_quality_ppm,
                        timestamp: SystemTime::now(),
                    });
                }
                Err(err) => {
                    log::warn!(
                        "{}: read attempt {}/{} failed: {}",
                        self.sensor.name(),
                        attempt,
                        attempts,
                        err
                    );
                    if attempt < attempts && shutdown.wait_timeout(self.settings.retry_backoff()) {
                        self.state = PollState::Stopped;
                        return PollOutcome::Interrupted;
                    }
                }
            }
        }
        self.failed_polls += 1;
        self.state = PollState::Failed;
        log::error!(
            "{}: giving up after {} attempts; keeping previous reading",
            self.sensor.name(),
            attempts
        );
        PollOutcome::Failed { attempts }
    }

    /// Poll until `shutdown` fires, publishing each fresh reading.
    ///
    /// Polls start one interval apart however long the previous poll spent
    /// retrying.
    pub fn run(mut self, writer: SlotWriter<Option<SensorReading>>, shutdown: ShutdownSignal) {
        log::info!(
            "sensor poller started ({}, every {} ms)",
            self.sensor.name(),
            self.settings.interval_ms
        );
        while !shutdown.is_triggered() {
            let started = Instant::now();
            match self.poll_once(&shutdown) {
                PollOutcome::Fresh(reading) => {
                    log::debug!(
                        "sensor reading: {:.1}C {:.1}% {} ({:.1} ppm)",
                        reading.temperature_c,
                        reading.humidity_pct,
                        reading.air_quality,
                        reading.air_quality_ppm
                    );
                    writer.publish(Some(reading));
                }
                PollOutcome::Failed { .. } => {}
                PollOutcome::Interrupted => break,
            }
            let wait = until_next_poll(started, self.settings.interval(), Instant::now());
            if shutdown.wait_timeout(wait) {
                break;
            }
        }
        self.state = PollState::Stopped;
        log::info!("sensor poller stopped");
    }
}

/// Time left before the poll after the one that began at `started`.
fn until_next_poll(started: Instant, interval: Duration, now: Instant) -> Duration {
    (started + interval).saturating_duration_since(now)
}
