//! eMMC Host Controller Configuration
//!
//! Defines the platform constants the eMMC host driver needs: where the controller lives, how it is clocked, how
//! large a transfer may be and how long the driver waits on the hardware.
//!
//! ## Configuration Usage
//!
//! A platform is expected to start from [`EmmcHostConfig::default`], which carries the values used on E2000 boards,
//! and override the register base address for its controller instance:
//!
//! ```rust
//! use phytium_emmc::config::EmmcHostConfig;
//!
//! let config = EmmcHostConfig { base_address: 0x2800_1000, ..Default::default() };
//! assert!(config.validate().is_ok());
//! ```
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use core::fmt;

use r_efi::efi;

use crate::descriptor::MAX_DESCRIPTOR_BUFFER_SIZE;
use crate::error::{EmmcError, Result};

/// Fixed CIU reference clock on Phytium SoCs.
pub const DEFAULT_BASE_CLOCK_HZ: u32 = 1_200_000_000;

/// Size of the buffer a single IDMAC descriptor addresses.
pub const DEFAULT_SEGMENT_SIZE: usize = 0x1000;

/// eMMC block size.
pub const DEFAULT_BLOCK_SIZE: usize = 512;

/// Largest request the host advertises.
pub const DEFAULT_MAX_REQUEST_SIZE: usize = 512 * 1024;

/// Spacing between completion polls, in microseconds.
pub const EMMC_TIMEOUT_INTERNAL: u32 = 500;

/// Command completion budget, in microseconds.
pub const EMMC_CMD_TIMEOUT: u32 = 5 * 2000 * EMMC_TIMEOUT_INTERNAL;

/// Data completion budget a platform may opt into through [`EmmcHostConfig::data_timeout_us`].
pub const EMMC_DATA_TIMEOUT: u32 = 10 * EMMC_CMD_TIMEOUT;

/// Default bound for register handshakes, in microseconds.
pub const DEFAULT_HANDSHAKE_TIMEOUT: u32 = 1_000_000;

/// Card read threshold enabled at a 0x80 byte threshold.
pub const DEFAULT_CARD_READ_THRESHOLD: u32 = 0x0080_0001;

/// FIFO watermark and DMA burst configuration written to the FIFOTH register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FifoThreshold {
    /// DMA multiple transaction size code (bits 28-30).
    pub burst_size: u32,
    /// Receive watermark (bits 16-27).
    pub rx_watermark: u32,
    /// Transmit watermark (bits 0-11).
    pub tx_watermark: u32,
}

impl FifoThreshold {
    /// Packs the three fields into the FIFOTH register layout.
    pub const fn encode(&self) -> u32 {
        ((self.burst_size & 0x7) << 28) | ((self.rx_watermark & 0xFFF) << 16) | (self.tx_watermark & 0xFFF)
    }
}

impl Default for FifoThreshold {
    fn default() -> Self {
        FifoThreshold { burst_size: 2, rx_watermark: 0x7, tx_watermark: 0x100 }
    }
}

/// UHS extension register profiles, one per clock tier.
///
/// Bits 8-15 of a profile hold the first CIU divisor minus one; bit 1 is the external clock enable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockProfiles {
    /// Used for bus clocks of 25 MHz and above.
    pub high_speed: u32,
    /// Used for the 400 kHz identification clock.
    pub identification: u32,
    /// Used for every other bus clock.
    pub default_speed: u32,
}

impl ClockProfiles {
    /// Identification clock frequency.
    pub const IDENTIFICATION_HZ: u32 = 400_000;
    /// Lowest frequency served by the high speed profile.
    pub const HIGH_SPEED_MIN_HZ: u32 = 25_000_000;

    /// Picks the profile for a requested bus clock.
    pub const fn select(&self, frequency_hz: u32) -> u32 {
        if frequency_hz >= Self::HIGH_SPEED_MIN_HZ {
            self.high_speed
        } else if frequency_hz == Self::IDENTIFICATION_HZ {
            self.identification
        } else {
            self.default_speed
        }
    }
}

impl Default for ClockProfiles {
    fn default() -> Self {
        ClockProfiles { high_speed: 0x202, identification: 0x502, default_speed: 0x302 }
    }
}

/// eMMC Host Controller Configuration
///
/// All tunables of one controller instance.
#[derive(Clone)]
pub struct EmmcHostConfig {
    /// Register window base address.
    pub base_address: u64,
    /// CIU reference clock.
    pub base_clock_hz: u32,
    /// FIFOTH register contents.
    pub fifo_threshold: FifoThreshold,
    /// CARD_THRCTL register contents.
    pub card_read_threshold: u32,
    /// UHS extension profiles used by clock changes.
    pub clock_profiles: ClockProfiles,
    /// Bytes addressed by one descriptor.
    pub segment_size: usize,
    /// Bytes per block; transfers are rounded up to a whole number of blocks.
    pub block_size: usize,
    /// Largest single request.
    pub max_request_size: usize,
    /// Number of descriptors in the ring.
    pub descriptor_count: usize,
    /// Microseconds between completion polls.
    pub poll_interval_us: u32,
    /// Command completion budget in microseconds.
    pub command_timeout_us: u32,
    /// Data completion budget in microseconds.
    pub data_timeout_us: u32,
    /// Bound on register handshakes in microseconds. `None` spins until the hardware responds.
    pub handshake_timeout_us: Option<u32>,
    /// TPL held for the duration of a transfer.
    pub tpl: efi::Tpl,
}

impl Default for EmmcHostConfig {
    fn default() -> Self {
        EmmcHostConfig {
            base_address: 0,
            base_clock_hz: DEFAULT_BASE_CLOCK_HZ,
            fifo_threshold: FifoThreshold::default(),
            card_read_threshold: DEFAULT_CARD_READ_THRESHOLD,
            clock_profiles: ClockProfiles::default(),
            segment_size: DEFAULT_SEGMENT_SIZE,
            block_size: DEFAULT_BLOCK_SIZE,
            max_request_size: DEFAULT_MAX_REQUEST_SIZE,
            descriptor_count: DEFAULT_MAX_REQUEST_SIZE / DEFAULT_SEGMENT_SIZE,
            poll_interval_us: EMMC_TIMEOUT_INTERNAL,
            command_timeout_us: EMMC_CMD_TIMEOUT,
            data_timeout_us: EMMC_CMD_TIMEOUT,
            handshake_timeout_us: Some(DEFAULT_HANDSHAKE_TIMEOUT),
            tpl: efi::TPL_NOTIFY,
        }
    }
}

impl EmmcHostConfig {
    /// Checks that the sizes and timing values describe a usable controller setup.
    pub fn validate(&self) -> Result<()> {
        if self.segment_size == 0 || self.block_size == 0 || self.max_request_size == 0 || self.descriptor_count == 0
        {
            log::error!(target: "emmc", "Invalid eMMC configuration: zero sized field in {:?}", self);
            return Err(EmmcError::InvalidArgument);
        }

        if self.segment_size % self.block_size != 0 || self.segment_size > MAX_DESCRIPTOR_BUFFER_SIZE as usize {
            log::error!(
                target: "emmc",
                "Invalid eMMC configuration: segment size {:#X} with block size {:#X}",
                self.segment_size,
                self.block_size
            );
            return Err(EmmcError::InvalidArgument);
        }

        if self.descriptor_count.saturating_mul(self.segment_size) < self.max_request_size {
            log::error!(
                target: "emmc",
                "Invalid eMMC configuration: {} descriptors of {:#X} bytes cannot carry a {:#X} byte request",
                self.descriptor_count,
                self.segment_size,
                self.max_request_size
            );
            return Err(EmmcError::InvalidArgument);
        }

        if self.poll_interval_us == 0 || self.base_clock_hz == 0 {
            log::error!(target: "emmc", "Invalid eMMC configuration: zero poll interval or base clock");
            return Err(EmmcError::InvalidArgument);
        }

        Ok(())
    }

    /// Number of polls a command completion wait performs.
    pub fn command_poll_budget(&self) -> u32 {
        self.command_timeout_us / self.poll_interval_us
    }

    /// Number of polls a data completion wait performs.
    pub fn data_poll_budget(&self) -> u32 {
        self.data_timeout_us / self.poll_interval_us
    }
}

impl fmt::Debug for EmmcHostConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmmcHostConfig")
            .field("base_address", &format_args!("{:#X}", self.base_address))
            .field("base_clock_hz", &self.base_clock_hz)
            .field("fifo_threshold", &format_args!("{:#010X}", self.fifo_threshold.encode()))
            .field("card_read_threshold", &format_args!("{:#010X}", self.card_read_threshold))
            .field("clock_profiles", &self.clock_profiles)
            .field("segment_size", &self.segment_size)
            .field("block_size", &self.block_size)
            .field("max_request_size", &self.max_request_size)
            .field("descriptor_count", &self.descriptor_count)
            .field("poll_interval_us", &self.poll_interval_us)
            .field("command_timeout_us", &self.command_timeout_us)
            .field("data_timeout_us", &self.data_timeout_us)
            .field("handshake_timeout_us", &self.handshake_timeout_us)
            .field("tpl", &self.tpl)
            .finish()
    }
}
