use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Represents a geographic fix reported by a location source.
///
/// A `Location` is an immutable value type. A source never mutates a
/// published instance; it publishes a complete new instance on every update
/// so that readers can never observe a half-updated fix.
///
/// # Fields
///
/// - `latitude` – The latitude in decimal degrees (positive for north, negative for south).
/// - `longitude` – The longitude in decimal degrees (positive for east, negative for west).
/// - `accuracy` – The accuracy radius in meters around the reported point.
/// - `description` – Optional human readable description of the fix.
/// - `timestamp` – Optional UTC time at which the fix was obtained.
///
/// # Example
///
/// ```rust
/// use common::location::Location;
///
/// let loc = Location::new(52.5200, 13.4050, 3000.0);
/// assert_eq!(loc.latitude(), 52.5200);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Location {
    latitude: f64,
    longitude: f64,
    accuracy: f64,
    description: Option<String>,
    timestamp: Option<DateTime<Utc>>,
}

impl Location {
    /// Creates a new [`Location`] with the given coordinates and accuracy radius.
    ///
    /// # Arguments
    ///
    /// * `latitude` - The latitude in decimal degrees.
    /// * `longitude` - The longitude in decimal degrees.
    /// * `accuracy` - The accuracy radius in meters.
    ///
    /// # Returns
    ///
    /// A new `Location` instance without description and timestamp.
    pub fn new(latitude: f64, longitude: f64, accuracy: f64) -> Location {
        Location {
            latitude,
            longitude,
            accuracy,
            description: None,
            timestamp: None,
        }
    }

    /// Sets the human readable description of the fix.
    pub fn with_description(mut self, description: &str) -> Location {
        self.description = Some(description.to_owned());
        self
    }

    /// Sets the UTC time at which the fix was obtained.
    pub fn with_timestamp(mut self, timestamp: &DateTime<Utc>) -> Location {
        self.timestamp = Some(*timestamp);
        self
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Returns the latitude in decimal degrees.
    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    /// Returns the longitude in decimal degrees.
    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    /// Returns the accuracy radius in meters.
    pub fn accuracy(&self) -> f64 {
        self.accuracy
    }

    /// Returns the description of the fix if one was set.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Returns the UTC time of the fix if one was set.
    pub fn timestamp(&self) -> Option<&DateTime<Utc>> {
        self.timestamp.as_ref()
    }
}
