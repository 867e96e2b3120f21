use serde::{Deserialize, Serialize};

/// Identifies the serving cell tower at a point in time.
///
/// Two snapshots compare equal exactly when all four identifiers match.
/// Sources use this to detect that nothing actually changed between two
/// modem notifications before spending a network query.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellRegistration {
    /// Mobile country code.
    pub mcc: u16,
    /// Mobile network code.
    pub mnc: u16,
    /// Location area code.
    pub lac: u32,
    /// Cell id of the serving tower.
    pub cid: u32,
}

impl CellRegistration {
    pub fn new(mcc: u16, mnc: u16, lac: u32, cid: u32) -> CellRegistration {
        CellRegistration { mcc, mnc, lac, cid }
    }
}
