//! Boot-time configuration.
//!
//! Nothing is persisted: every boot starts from [`PeripheralConfig::default`]
//! unless the application supplies its own values.
use embassy_time::{Duration, Ticker};

use crate::ATT_VALUE_MAX;

/// Identity and timing of the peripheral.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeripheralConfig {
    /// Complete local name, advertised and exposed as Device Name.
    ///
    /// Default: "MyDevice".
    pub name: &'static str,
    /// Default: "1AB2".
    pub model_number: &'static str,
    /// Default: "1234".
    pub serial_number: &'static str,
    /// Initial battery level in percent.
    ///
    /// Default: 100.
    pub battery_level: u8,
    /// Capacity of the string characteristics and the application value.
    ///
    /// Default: 20, the largest value a single notification carries.
    pub value_capacity: usize,
    /// Advertising interval.
    ///
    /// Default: 1000 ms.
    pub adv_interval: Duration,
    /// Period of the heartbeat tick, see [`PeripheralConfig::heartbeat_ticker`].
    ///
    /// Default: 1 s.
    pub heartbeat_interval: Duration,
    /// Accept connections while advertising.
    ///
    /// Default: true.
    pub connectable: bool,
}

impl Default for PeripheralConfig {
    fn default() -> Self {
        Self {
            name: "MyDevice",
            model_number: "1AB2",
            serial_number: "1234",
            battery_level: 100,
            value_capacity: ATT_VALUE_MAX,
            adv_interval: Duration::from_millis(1000),
            heartbeat_interval: Duration::from_secs(1),
            connectable: true,
        }
    }
}

impl PeripheralConfig {
    /// Ticker firing every `heartbeat_interval`, usable as the tick source of
    /// [`run`](crate::runner::run).
    pub fn heartbeat_ticker(&self) -> Ticker {
        Ticker::every(self.heartbeat_interval)
    }
}
