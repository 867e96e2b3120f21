use serde::{Deserialize, Serialize};

/// Ordered tier describing how precisely a location is known.
///
/// The level is used in two roles: as the *available* ceiling a source
/// reports for itself and as the *granted* ceiling a policy assigns to an
/// application. The effective ceiling of any read is the minimum of the two,
/// see [`AccuracyLevel::effective`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AccuracyLevel {
    /// No location can be reported at all.
    None,
    /// Country level, roughly which country the user is in.
    Country,
    /// Region or state level.
    Region,
    /// City or locality level.
    Locality,
    /// Postal code level.
    Postalcode,
    /// Street level.
    Street,
    /// Exact position, e.g. from a GPS receiver.
    Exact,
}

impl AccuracyLevel {
    /// Returns the effective accuracy ceiling for a read.
    ///
    /// A client never receives data more precise than what the source can
    /// deliver (`available`) nor than what the policy grants (`granted`).
    pub fn effective(available: AccuracyLevel, granted: AccuracyLevel) -> AccuracyLevel {
        available.min(granted)
    }
}
