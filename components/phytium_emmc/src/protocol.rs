//! MMC host surface presented to a block I/O layer.
//!
//! A block layer drives card identification, bus setup and data transfer through [`MmcHost`]. Data commands are
//! split in two calls: [`MmcHost::send_command`] latches a read or write command and the following
//! [`MmcHost::read_block_data`] or [`MmcHost::write_block_data`] performs the data phase and issues it.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
#[cfg(any(test, feature = "mockall"))]
use mockall::automock;

use crate::{
    command::ResponseType,
    config::EmmcHostConfig,
    error::{EmmcError, Result},
};

/// Card states a block layer reports through [`MmcHost::notify_state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MmcState {
    Invalid,
    HwInitialization,
    Idle,
    Ready,
    Identification,
    StandBy,
    Transfer,
    SendingData,
    ReceiveData,
    Programming,
    Disconnect,
}

/// Bus timing modes a block layer may request. The host always runs SDR timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusTiming {
    Backward,
    Hs26,
    Hs52,
    Hs52Ddr1V2,
    Hs52Ddr1V8,
    Hs200,
    Hs400,
}

/// Data bus width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusWidth {
    Bits1,
    Bits4,
    Bits8,
}

impl BusWidth {
    /// `CTYPE` register value selecting this width.
    pub const fn ctype(&self) -> u32 {
        match self {
            BusWidth::Bits1 => 0,
            BusWidth::Bits4 => 1,
            BusWidth::Bits8 => 1 << 16,
        }
    }
}

impl TryFrom<u32> for BusWidth {
    type Error = EmmcError;

    fn try_from(width: u32) -> Result<Self> {
        match width {
            1 => Ok(BusWidth::Bits1),
            4 => Ok(BusWidth::Bits4),
            8 => Ok(BusWidth::Bits8),
            _ => Err(EmmcError::InvalidArgument),
        }
    }
}

/// Transfer limits of the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostCapabilities {
    /// Descriptors available to one transfer.
    pub max_segments: usize,
    pub max_segment_size: usize,
    pub max_block_size: usize,
    pub max_request_size: usize,
    pub max_block_count: usize,
}

impl HostCapabilities {
    /// Derives the capability record from a configuration.
    pub fn from_config(config: &EmmcHostConfig) -> Self {
        HostCapabilities {
            max_segments: config.descriptor_count,
            max_segment_size: config.segment_size,
            max_block_size: config.block_size,
            max_request_size: config.max_request_size,
            max_block_count: config.max_request_size / config.block_size,
        }
    }
}

/// MMC host operations.
#[cfg_attr(any(test, feature = "mockall"), automock)]
pub trait MmcHost {
    /// The eMMC device is soldered down, so a card is always present.
    fn is_card_present(&self) -> bool;

    /// The device is never write protected at the host level.
    fn is_read_only(&self) -> bool;

    /// Transfers always go through the IDMAC.
    fn is_dma_supported(&self) -> bool;

    /// Multi block commands are supported.
    fn is_multi_block(&self) -> bool;

    /// Lifecycle hook. Only [`MmcState::HwInitialization`] acts: it initializes the controller and starts the
    /// 400 kHz identification clock.
    fn notify_state(&self, state: MmcState) -> Result<()>;

    /// Issues MMC command `index`, or latches it when it carries data.
    fn send_command(&self, index: u32, argument: u32) -> Result<()>;

    /// Copies the last response into `buffer`: four words for R2, one otherwise.
    fn receive_response(&self, response_type: ResponseType, buffer: &mut [u32]) -> Result<()>;

    /// Runs the data phase of a latched read. `lba` is not used; the address travels in the command argument.
    fn read_block_data(&self, lba: u64, length: usize, buffer: &mut [u8]) -> Result<()>;

    /// Runs the data phase of a latched write. `lba` is not used; the address travels in the command argument.
    fn write_block_data(&self, lba: u64, length: usize, buffer: &[u8]) -> Result<()>;

    /// Programs bus width and, for a non-zero `bus_clock_hz`, the bus clock. `timing` is accepted and ignored.
    fn set_ios(&self, bus_clock_hz: u32, bus_width: u32, timing: BusTiming) -> Result<()>;

    /// Transfer limits.
    fn capabilities(&self) -> HostCapabilities;
}
