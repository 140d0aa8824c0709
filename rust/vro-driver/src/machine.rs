//! Machine handle assembly.
//!
//! Once a VM is live, its reference and instance snapshot are turned into a
//! connectable handle: a transport description plus the convergence
//! strategy the host framework should run over it. Transport and
//! convergence implementations themselves live outside this crate.

use serde::{Deserialize, Serialize};

use crate::driver::Operation;
use crate::error::DriverError;
use crate::instance::Instance;
use crate::reference::MachineReference;

/// Default WinRM HTTP port.
pub const WINRM_PORT: u16 = 5985;

const DEFAULT_SSH_USER: &str = "root";
const DEFAULT_WINRM_USER: &str = "Administrator";

/// How to reach the machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Transport {
    Ssh {
        host: String,
        username: String,
        sudo: bool,
        gateway: Option<String>,
    },
    WinRm {
        host: String,
        port: u16,
        username: String,
    },
}

/// How the host framework should install its agent on the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConvergenceStrategy {
    InstallMsi,
    InstallCached,
    InstallScript,
    NoConverge,
}

impl ConvergenceStrategy {
    /// Fixed precedence: no reference, then Windows, then cached installer,
    /// then the default install script.
    #[must_use]
    pub fn select(reference: Option<&MachineReference>, cached_installer: bool) -> Self {
        match reference {
            None => Self::NoConverge,
            Some(reference) if reference.is_windows => Self::InstallMsi,
            Some(_) if cached_installer => Self::InstallCached,
            Some(_) => Self::InstallScript,
        }
    }
}

/// A connectable machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineHandle {
    pub name: String,
    pub transport: Transport,
    pub convergence: ConvergenceStrategy,
}

/// Assemble a handle for `machine`.
///
/// Fails with [`DriverError::InstanceNotReady`] when there is no instance or
/// the instance reports neither an IP address nor a host name.
pub fn assemble(
    machine: &str,
    reference: Option<&MachineReference>,
    instance: Option<&Instance>,
    cached_installer: bool,
) -> Result<MachineHandle, DriverError> {
    let not_ready = || DriverError::InstanceNotReady {
        machine: machine.to_string(),
        operation: Operation::Ready,
    };

    let host = instance
        .and_then(Instance::address)
        .ok_or_else(not_ready)?
        .to_string();

    let is_windows = reference.is_some_and(|r| r.is_windows);
    let username = reference.and_then(|r| r.ssh_username.clone());

    let transport = if is_windows {
        Transport::WinRm {
            host,
            port: WINRM_PORT,
            username: username.unwrap_or_else(|| DEFAULT_WINRM_USER.to_string()),
        }
    } else {
        Transport::Ssh {
            host,
            username: username.unwrap_or_else(|| DEFAULT_SSH_USER.to_string()),
            sudo: reference.is_some_and(|r| r.sudo),
            gateway: reference.and_then(|r| r.ssh_gateway.clone()),
        }
    };

    Ok(MachineHandle {
        name: machine.to_string(),
        transport,
        convergence: ConvergenceStrategy::select(reference, cached_installer),
    })
}
