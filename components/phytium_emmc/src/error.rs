//! eMMC host driver error kinds.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use core::fmt::Display;

use r_efi::efi;

/// A specialized [`Result`](core::result::Result) type for eMMC host operations.
pub type Result<T> = core::result::Result<T, EmmcError>;

/// Errors produced by the eMMC host controller driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmmcError {
    /// A caller passed a bad buffer, length or bus setting, or asked for a data phase with no command latched.
    InvalidArgument,
    /// DMA pages could not be allocated, or the transfer needs more descriptors than the ring holds.
    OutOfResources,
    /// A bounded command or data completion wait ran out of polls.
    Timeout,
    /// The controller flagged an error in the raw interrupt status register.
    DeviceError,
    /// A register handshake (reset bits, CIU ready, start bit, busy bits) never completed.
    HardwareTimeout,
    /// A boot service failed with a status that has no closer kind.
    Efi(efi::Status),
}

impl EmmcError {
    /// Converts an `r_efi::efi::Status` returned by a boot service to a `Result`.
    pub fn from_status(status: efi::Status) -> Result<()> {
        match status {
            efi::Status::SUCCESS => Ok(()),
            efi::Status::INVALID_PARAMETER => Err(EmmcError::InvalidArgument),
            efi::Status::OUT_OF_RESOURCES => Err(EmmcError::OutOfResources),
            efi::Status::TIMEOUT => Err(EmmcError::Timeout),
            efi::Status::DEVICE_ERROR => Err(EmmcError::DeviceError),
            _ => Err(EmmcError::Efi(status)),
        }
    }
}

impl From<EmmcError> for efi::Status {
    fn from(error: EmmcError) -> efi::Status {
        match error {
            EmmcError::InvalidArgument => efi::Status::INVALID_PARAMETER,
            EmmcError::OutOfResources => efi::Status::OUT_OF_RESOURCES,
            EmmcError::Timeout => efi::Status::TIMEOUT,
            EmmcError::DeviceError => efi::Status::DEVICE_ERROR,
            EmmcError::HardwareTimeout => efi::Status::TIMEOUT,
            EmmcError::Efi(status) => status,
        }
    }
}

impl Display for EmmcError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            EmmcError::InvalidArgument => write!(f, "Invalid argument to eMMC host operation"),
            EmmcError::OutOfResources => write!(f, "Out of DMA resources"),
            EmmcError::Timeout => write!(f, "Command or data completion timed out"),
            EmmcError::DeviceError => write!(f, "Controller reported a command or data error"),
            EmmcError::HardwareTimeout => write!(f, "Controller did not complete a register handshake"),
            EmmcError::Efi(status) => write!(f, "Boot service failure: {status:?}"),
        }
    }
}

impl core::error::Error for EmmcError {}
