//! Point-in-time status document and overlay text.

use chrono::{DateTime, Local};
use serde::Serialize;
use std::time::SystemTime;

use crate::broker::BrokerStats;
use crate::detect::{ActivityLabel, ActivityResult, BreakerStatus, Route};
use crate::history::ActivityPattern;
use crate::pipeline::StatusBoard;
use crate::sensors::{AirQuality, SensorReading};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Everything a status endpoint or dashboard shows, copied out of the board.
#[derive(Clone, Debug, Serialize)]
pub struct StatusReport {
    pub timestamp: String,
    pub cage_temperature: Option<f32>,
    pub cage_humidity: Option<f32>,
    pub air_quality: AirQuality,
    pub air_quality_ppm: Option<f32>,
    /// Capture time of the sensor reading, if there is one.
    pub sensor_timestamp: Option<String>,
    pub sensor_stale: bool,
    pub activity: ActivityLabel,
    pub activity_probability: f32,
    pub activity_pattern: ActivityPattern,
    pub breaker: BreakerStatus,
    pub classifier_route: Option<Route>,
    pub broker: BrokerStats,
    pub frames_classified: u64,
}

impl StatusReport {
    pub fn from_board(board: &StatusBoard) -> Self {
        Self::assemble(
            SystemTime::now(),
            board.latest_sensor_reading(),
            board.sensor_interval(),
            board.latest_activity(),
            board.activity_pattern(),
        )
        .with_pipeline(
            board.breaker(),
            board.route(),
            board.broker_stats(),
            board.frames_classified(),
        )
    }

    /// Report from individual parts; pipeline counters start zeroed.
    pub fn assemble(
        now: SystemTime,
        reading: Option<SensorReading>,
        sensor_interval: std::time::Duration,
        activity: ActivityResult,
        pattern: ActivityPattern,
    ) -> Self {
        let sensor_stale = reading
            .as_ref()
            .map_or(true, |r| r.is_stale(now, sensor_interval));
        Self {
            timestamp: format_time(now),
            cage_temperature: reading.as_ref().map(|r| r.temperature_c),
            cage_humidity: reading.as_ref().map(|r| r.humidity_pct),
            air_quality: reading
                .as_ref()
                .map_or(AirQuality::Unknown, |r| r.air_quality),
            air_quality_ppm: reading.as_ref().map(|r| r.air_quality_ppm),
            sensor_timestamp: reading.as_ref().map(|r| format_time(r.timestamp)),
            sensor_stale,
            activity: activity.label,
            activity_probability: activity.confidence,
            activity_pattern: pattern,
            breaker: BreakerStatus::default(),
            classifier_route: None,
            broker: BrokerStats::default(),
            frames_classified: 0,
        }
    }

    fn with_pipeline(
        mut self,
        breaker: BreakerStatus,
        route: Option<Route>,
        broker: BrokerStats,
        frames_classified: u64,
    ) -> Self {
        self.breaker = breaker;
        self.classifier_route = route;
        self.broker = broker;
        self.frames_classified = frames_classified;
        self
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Text lines drawn over the live camera view.
    pub fn overlay_lines(&self) -> Vec<String> {
        let climate = match (self.cage_temperature, self.cage_humidity) {
            (Some(t), Some(h)) => format!("Temp: {:.1}C  Hum: {:.1}%", t, h),
            _ => "Temp: --  Hum: --".to_string(),
        };
        let air = match self.air_quality_ppm {
            Some(ppm) => format!("Air Quality: {} ({:.1} PPM)", self.air_quality, ppm),
            None => format!("Air Quality: {}", self.air_quality),
        };
        let activity = match self.activity {
            ActivityLabel::Unavailable => "Activity: API Unavailable".to_string(),
            ActivityLabel::Unknown => "Activity: Unknown".to_string(),
            label => format!(
                "Activity: {} ({:.1}%)",
                label,
                self.activity_probability * 100.0
            ),
        };
        vec![format!("Time: {}", self.timestamp), climate, air, activity]
    }
}

fn format_time(at: SystemTime) -> String {
    DateTime::<Local>::from(at).format(TIMESTAMP_FORMAT).to_string()
}
