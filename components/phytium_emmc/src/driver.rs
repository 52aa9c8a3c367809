//! Driver entry and unload.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use r_efi::efi;

use crate::{
    config::EmmcHostConfig,
    error::{EmmcError, Result},
    host::EmmcHost,
    protocol::MmcHost,
    service::{EfiBootServices, HostServices},
};

/// Loaded instance of the eMMC host driver.
///
/// The controller is left untouched at load. The block layer brings it up through
/// [`MmcState::HwInitialization`](crate::protocol::MmcState::HwInitialization).
#[derive(Default)]
pub struct EmmcHostDriver {
    host: Option<EmmcHost>,
}

impl EmmcHostDriver {
    /// Loads the driver on top of the firmware boot services table.
    ///
    /// # Safety
    ///
    /// `boot_services` must be null or point to a valid boot services table that outlives the driver.
    pub unsafe fn entry_point(config: EmmcHostConfig, boot_services: *mut efi::BootServices) -> Result<Self> {
        // SAFETY: forwarded from the caller.
        let Some(boot_services) = (unsafe { EfiBootServices::new(boot_services) }) else {
            log::error!(target: "emmc", "Boot services table is null.");
            return Err(EmmcError::InvalidArgument);
        };
        Self::with_services(config, HostServices::from_boot_services(boot_services))
    }

    /// Loads the driver with an explicit service set.
    pub fn with_services(config: EmmcHostConfig, services: HostServices) -> Result<Self> {
        let host = EmmcHost::new(config, services).inspect_err(|err| {
            log::error!(target: "emmc", "eMMC host load failed: {}", err);
        })?;
        log::info!(
            target: "emmc",
            "eMMC host at {:#X} loaded, {:?}",
            host.config().base_address,
            host.capabilities()
        );
        Ok(Self { host: Some(host) })
    }

    /// The host, until the driver is unloaded.
    pub fn host(&self) -> Option<&EmmcHost> {
        self.host.as_ref()
    }

    /// Releases the host and its descriptor ring. Unloading twice is harmless.
    pub fn unload(&mut self) {
        if let Some(host) = self.host.take() {
            log::info!(target: "emmc", "eMMC host at {:#X} unloaded.", host.config().base_address);
        }
    }
}
