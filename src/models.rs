//! Data models for the conservation alert engine.
//!
//! Every tracked environmental property is a variant of [`Property`]; the
//! per-property constants (dedup window, significance percentage, unit) live
//! on the enum so no code path ever looks a property up by name.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---

/// Environmental property measured near an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Property {
    Temperature,
    Humidity,
    Co2,
    AirPressure,
    Illuminance,
    MoldRiskLevel,
}

impl Property {
    // ---
    pub const ALL: [Property; 6] = [
        Property::Temperature,
        Property::Humidity,
        Property::Co2,
        Property::AirPressure,
        Property::Illuminance,
        Property::MoldRiskLevel,
    ];

    /// Stable name used in storage rows and JSON.
    pub fn as_str(self) -> &'static str {
        // ---
        match self {
            Property::Temperature => "temperature",
            Property::Humidity => "humidity",
            Property::Co2 => "co2",
            Property::AirPressure => "airPressure",
            Property::Illuminance => "illuminance",
            Property::MoldRiskLevel => "moldRiskLevel",
        }
    }

    /// Lookback window within which a new exceedance continues an open alert.
    pub fn dedup_window(self) -> Duration {
        // ---
        match self {
            Property::Co2 | Property::AirPressure => Duration::hours(12),
            Property::MoldRiskLevel => Duration::hours(48),
            Property::Temperature | Property::Humidity | Property::Illuminance => {
                Duration::hours(24)
            }
        }
    }

    /// Percentage change above which a new value supersedes an open alert.
    pub fn significance_percent(self) -> f64 {
        // ---
        match self {
            Property::Temperature => 5.0,
            Property::Humidity => 10.0,
            Property::Co2 => 15.0,
            Property::AirPressure => 3.0,
            // Levels are discrete, any change counts.
            Property::MoldRiskLevel => 0.0,
            Property::Illuminance => 20.0,
        }
    }

    pub fn unit(self) -> &'static str {
        // ---
        match self {
            Property::Temperature => "°C",
            Property::Humidity => "%",
            Property::Co2 => " ppm",
            Property::AirPressure => " hPa",
            Property::Illuminance => " lx",
            Property::MoldRiskLevel => "",
        }
    }
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Property {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // ---
        Property::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| format!("unknown property '{s}'"))
    }
}

/// Which side of the resolved threshold a value crossed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExceededBound {
    Upper,
    Lower,
}

impl ExceededBound {
    // ---
    pub fn as_str(self) -> &'static str {
        match self {
            ExceededBound::Upper => "upper",
            ExceededBound::Lower => "lower",
        }
    }
}

impl FromStr for ExceededBound {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // ---
        match s {
            "upper" => Ok(ExceededBound::Upper),
            "lower" => Ok(ExceededBound::Lower),
            other => Err(format!("unknown bound '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Active,
    Dismissed,
}

impl AlertStatus {
    // ---
    pub fn as_str(self) -> &'static str {
        match self {
            AlertStatus::Active => "active",
            AlertStatus::Dismissed => "dismissed",
        }
    }
}

impl FromStr for AlertStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // ---
        match s {
            "active" => Ok(AlertStatus::Active),
            "dismissed" => Ok(AlertStatus::Dismissed),
            other => Err(format!("unknown alert status '{other}'")),
        }
    }
}

/// One sensor reading taken near an artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Measurement {
    // ---
    pub id: Uuid,
    pub device_id: String,
    pub artifact_id: i64,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub humidity: Option<f64>,
    #[serde(default)]
    pub co2: Option<f64>,
    #[serde(default)]
    pub air_pressure: Option<f64>,
    #[serde(default)]
    pub illuminance: Option<f64>,
    /// 0 = none, 1 = moderate, 2 = high.
    #[serde(default)]
    pub mold_risk_level: Option<u8>,
}

impl Measurement {
    // ---
    pub fn value(&self, property: Property) -> Option<f64> {
        // ---
        match property {
            Property::Temperature => self.temperature,
            Property::Humidity => self.humidity,
            Property::Co2 => self.co2,
            Property::AirPressure => self.air_pressure,
            Property::Illuminance => self.illuminance,
            Property::MoldRiskLevel => self.mold_risk_level.map(f64::from),
        }
    }
}

/// Lower/upper pair; `None` means unbounded on that side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub lower: Option<f64>,
    pub upper: Option<f64>,
}

impl Bounds {
    // ---
    pub fn new(lower: Option<f64>, upper: Option<f64>) -> Self {
        Self { lower, upper }
    }

    pub fn is_unbounded(&self) -> bool {
        self.lower.is_none() && self.upper.is_none()
    }
}

/// A substance an artifact is made of, with its own environmental tolerances.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Material {
    // ---
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub bounds: BTreeMap<Property, Bounds>,
}

impl Material {
    // ---
    pub fn bounds_for(&self, property: Property) -> Bounds {
        self.bounds.get(&property).copied().unwrap_or_default()
    }
}

/// The protected object (a painting) and the materials it is composed of.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Artifact {
    // ---
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub materials: Vec<Material>,
}

/// Effective bounds per property after intersecting all materials.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Thresholds(pub BTreeMap<Property, Bounds>);

impl Thresholds {
    // ---
    pub fn get(&self, property: Property) -> Bounds {
        self.0.get(&property).copied().unwrap_or_default()
    }
}

/// A measured value outside its resolved bound, before deduplication.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Exceedance {
    // ---
    pub property: Property,
    pub direction: ExceededBound,
    pub value: f64,
    pub threshold_value: f64,
}

/// One open-or-closed violation episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    // ---
    pub id: Uuid,
    pub artifact_id: i64,
    pub device_id: Option<String>,
    pub measurement_id: Option<Uuid>,
    pub property: Property,
    pub exceeded_bound: ExceededBound,
    pub measured_value: f64,
    pub threshold_value: f64,
    pub status: AlertStatus,
    pub created_at: DateTime<Utc>,
    pub dismissed_at: Option<DateTime<Utc>>,
}

impl Alert {
    // ---
    /// Build a fresh active alert for an exceedance observed in `measurement`.
    pub fn from_exceedance(
        measurement: &Measurement,
        exceedance: &Exceedance,
        created_at: DateTime<Utc>,
    ) -> Self {
        // ---
        Alert {
            id: Uuid::new_v4(),
            artifact_id: measurement.artifact_id,
            device_id: Some(measurement.device_id.clone()),
            measurement_id: Some(measurement.id),
            property: exceedance.property,
            exceeded_bound: exceedance.direction,
            measured_value: exceedance.value,
            threshold_value: exceedance.threshold_value,
            status: AlertStatus::Active,
            created_at,
            dismissed_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == AlertStatus::Active
    }
}
