//! ## Phytium eMMC Host Controller Background
//!
//! Phytium E2000 and related server SoCs integrate an MMC/SD host controller derived from the DesignWare mobile
//! storage host. The controller exposes a 32-bit register window, a Card Interface Unit (CIU) clocked from a
//! fixed 1.2 GHz reference through an "UHS extension" divider profile, and an Internal DMA Controller (IDMAC)
//! that walks a chain of descriptors in system memory. Each descriptor addresses one 4 KiB buffer segment.
//!
//! On these boards the eMMC device is soldered down, so the driver models a permanently present, writable card
//! with no hot-plug handling. Data-carrying commands are split in two phases the same way the MMC host protocol
//! does it: `send_command` only latches a read or write command, and the matching `read_block_data` or
//! `write_block_data` call builds the descriptor chain, starts the IDMAC and then issues the latched command.
//!
//! ## Crate Layout
//!
//! - [`clock`]: controller reset and CIU clock programming.
//! - [`descriptor`]: the IDMAC descriptor ring.
//! - [`command`]: MMC command index to command-register flag mapping.
//! - [`host`]: the [`host::EmmcHost`] command/transfer engine.
//! - [`protocol`]: the [`protocol::MmcHost`] surface presented to a block I/O layer.
//! - [`service`]: platform services the driver consumes (MMIO, stall, DMA pages, TPL).
//! - [`driver`]: driver entry and unload.
//!
//! ## Examples and Usage
//!
//! ```rust,ignore
//! use phytium_emmc::{config::EmmcHostConfig, driver::EmmcHostDriver, protocol::MmcState};
//!
//! let config = EmmcHostConfig { base_address: 0x2800_1000, ..Default::default() };
//! let driver = unsafe { EmmcHostDriver::entry_point(config, boot_services) }?;
//! let host = driver.host().expect("host is present until unload");
//!
//! host.notify_state(MmcState::HwInitialization)?;
//! host.send_command(17, lba as u32)?;
//! host.read_block_data(lba, 512, &mut block)?;
//! ```
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
#![cfg_attr(all(not(feature = "std"), not(test), not(feature = "mockall")), no_std)]

extern crate alloc;

pub mod clock;
pub mod command;
pub mod config;
pub mod descriptor;
pub mod driver;
pub mod error;
pub mod host;
pub mod protocol;
pub mod registers;
pub mod service;
pub mod tpl_lock;
