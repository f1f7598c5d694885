use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse air-quality grade derived from an NH3-equivalent ppm estimate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AirQuality {
    Excellent,
    Good,
    Moderate,
    Poor,
    VeryPoor,
    Unknown,
}

impl AirQuality {
    pub fn from_ppm(ppm: f32) -> AirQuality {
        if !ppm.is_finite() || ppm < 0.0 {
            AirQuality::Unknown
        } else if ppm < 50.0 {
            AirQuality::Excellent
        } else if ppm < 100.0 {
            AirQuality::Good
        } else if ppm < 200.0 {
            AirQuality::Moderate
        } else if ppm < 300.0 {
            AirQuality::Poor
        } else {
            AirQuality::VeryPoor
        }
    }
}

impl fmt::Display for AirQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AirQuality::Excellent => "Excellent",
            AirQuality::Good => "Good",
            AirQuality::Moderate => "Moderate",
            AirQuality::Poor => "Poor",
            AirQuality::VeryPoor => "Very Poor",
            AirQuality::Unknown => "Unknown",
        })
    }
}

/// MQ-135 gas sensor calibration (NH3 curve).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Mq135Calibration {
    /// Sensor resistance in clean air, kOhm.
    pub ro_clean_air: f32,
    /// Load resistance, kOhm.
    pub load_resistance: f32,
    /// Supply voltage, volts.
    pub supply_voltage: f32,
    pub curve_a: f32,
    pub curve_b: f32,
}

impl Default for Mq135Calibration {
    fn default() -> Self {
        Self {
            ro_clean_air: 7.37,
            load_resistance: 1.0,
            supply_voltage: 5.0,
            curve_a: 102.2,
            curve_b: -2.243,
        }
    }
}

impl Mq135Calibration {
    /// Sensor resistance for an output voltage. `None` when the voltage is zero
    /// (infinite resistance).
    pub fn resistance(&self, voltage: f32) -> Option<f32> {
        if voltage <= 0.0 {
            return None;
        }
        Some((self.supply_voltage * self.load_resistance) / voltage - self.load_resistance)
    }

    /// Estimated ppm for an output voltage; 0 when resistance is infinite.
    pub fn ppm(&self, voltage: f32) -> f32 {
        match self.resistance(voltage) {
            Some(rs) if rs > 0.0 => self.curve_a * (rs / self.ro_clean_air).powf(self.curve_b),
            Some(_) => f32::INFINITY,
            None => 0.0,
        }
    }

    pub fn grade(&self, voltage: f32) -> (AirQuality, f32) {
        let ppm = self.ppm(voltage);
        (AirQuality::from_ppm(ppm), ppm)
    }
}
