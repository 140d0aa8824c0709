//! Live VM snapshot reported by the get-machine-info workflow.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::workflow::OutputParameters;

/// VM power state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerState {
    PoweredOn,
    PoweredOff,
    Suspended,
    Unknown,
}

impl PowerState {
    fn from_vro(value: &str) -> Self {
        match value.trim() {
            "poweredOn" => Self::PoweredOn,
            "poweredOff" => Self::PoweredOff,
            "suspended" => Self::Suspended,
            _ => Self::Unknown,
        }
    }
}

impl std::fmt::Display for PowerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PoweredOn => write!(f, "poweredOn"),
            Self::PoweredOff => write!(f, "poweredOff"),
            Self::Suspended => write!(f, "suspended"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Guest operating system state, as seen by VMware tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuestState {
    Running,
    NotRunning,
    ShuttingDown,
    Resetting,
    Standby,
    Unknown,
}

impl GuestState {
    fn from_vro(value: &str) -> Self {
        match value.trim() {
            "running" => Self::Running,
            "notRunning" => Self::NotRunning,
            "shuttingDown" => Self::ShuttingDown,
            "resetting" => Self::Resetting,
            "standby" => Self::Standby,
            _ => Self::Unknown,
        }
    }
}

impl std::fmt::Display for GuestState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::NotRunning => write!(f, "notRunning"),
            Self::ShuttingDown => write!(f, "shuttingDown"),
            Self::Resetting => write!(f, "resetting"),
            Self::Standby => write!(f, "standby"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Read-only snapshot of a VM as of one get-machine-info call.
///
/// Never cached: every lookup is a fresh remote round-trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub host_name: Option<String>,
    pub ip_address: Option<String>,
    pub vm_host: Option<String>,
    pub boot_time: Option<DateTime<Utc>>,
    pub power_state: PowerState,
    pub guest_state: GuestState,
    pub clean_power_off: Option<bool>,
    pub online_standby: Option<bool>,
}

impl Instance {
    /// Project get-machine-info output parameters into a snapshot.
    ///
    /// An unparseable `bootTime` is dropped rather than rejected.
    #[must_use]
    pub fn from_outputs(outputs: &OutputParameters) -> Self {
        let boot_time = outputs.string("bootTime").and_then(|value| {
            DateTime::parse_from_rfc3339(&value)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| tracing::debug!(boot_time = %value, error = %e, "Ignoring bootTime"))
                .ok()
        });

        Self {
            host_name: outputs.string("hostName"),
            ip_address: outputs.string("ipAddress"),
            vm_host: outputs.string("vmHost"),
            boot_time,
            power_state: outputs
                .string("powerState")
                .map_or(PowerState::Unknown, |s| PowerState::from_vro(&s)),
            guest_state: outputs
                .string("guestState")
                .map_or(GuestState::Unknown, |s| GuestState::from_vro(&s)),
            clean_power_off: outputs.boolean("cleanPowerOff"),
            online_standby: outputs.boolean("onlineStandBy"),
        }
    }

    /// True when the guest OS is up.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.guest_state == GuestState::Running
    }

    /// True when the VM is powered off.
    #[must_use]
    pub fn is_powered_off(&self) -> bool {
        self.power_state == PowerState::PoweredOff
    }

    /// Address to connect to: the IP when known, else the host name.
    #[must_use]
    pub fn address(&self) -> Option<&str> {
        self.ip_address.as_deref().or(self.host_name.as_deref())
    }
}
