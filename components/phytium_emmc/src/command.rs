//! MMC command encoding.
//!
//! Maps an MMC command index onto the flag set the `CMD` register needs. Each index has exactly one flag set,
//! taken from the response and data requirements JEDEC and the SD physical layer define for that command.
//! Command 7 is the only argument dependent entry.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use core::fmt;

use bitflags::bitflags;

/// GO_IDLE_STATE
pub const MMC_GO_IDLE_STATE: u32 = 0;
/// SEND_OP_COND
pub const MMC_SEND_OP_COND: u32 = 1;
/// ALL_SEND_CID
pub const MMC_ALL_SEND_CID: u32 = 2;
/// SET_RELATIVE_ADDR
pub const MMC_SET_RELATIVE_ADDR: u32 = 3;
/// SWITCH
pub const MMC_SWITCH: u32 = 6;
/// SELECT/DESELECT_CARD
pub const MMC_SELECT_CARD: u32 = 7;
/// SEND_EXT_CSD
pub const MMC_SEND_EXT_CSD: u32 = 8;
/// SEND_CSD
pub const MMC_SEND_CSD: u32 = 9;
/// STOP_TRANSMISSION
pub const MMC_STOP_TRANSMISSION: u32 = 12;
/// SEND_STATUS
pub const MMC_SEND_STATUS: u32 = 13;
/// SET_BLOCKLEN
pub const MMC_SET_BLOCKLEN: u32 = 16;
/// READ_SINGLE_BLOCK
pub const MMC_READ_SINGLE_BLOCK: u32 = 17;
/// READ_MULTIPLE_BLOCK
pub const MMC_READ_MULTIPLE_BLOCK: u32 = 18;
/// WRITE_BLOCK
pub const MMC_WRITE_BLOCK: u32 = 24;
/// WRITE_MULTIPLE_BLOCK
pub const MMC_WRITE_MULTIPLE_BLOCK: u32 = 25;
/// SEND_WRITE_PROT
pub const MMC_SEND_WRITE_PROT: u32 = 30;
/// SD_SEND_OP_COND (application command)
pub const SD_APP_SEND_OP_COND: u32 = 41;
/// SEND_SCR (application command)
pub const SD_APP_SEND_SCR: u32 = 51;

bitflags! {
    /// `CMD` register bits above the command index.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CommandFlags: u32 {
        const RESPONSE_EXPECT = 1 << 6;
        const LONG_RESPONSE = 1 << 7;
        const CHECK_RESPONSE_CRC = 1 << 8;
        const DATA_EXPECTED = 1 << 9;
        /// Data direction; clear means read.
        const WRITE = 1 << 10;
        const STREAM = 1 << 11;
        const SEND_AUTO_STOP = 1 << 12;
        const WAIT_PRVDATA_COMPLETE = 1 << 13;
        const STOP_ABORT = 1 << 14;
        const SEND_INIT = 1 << 15;
        const UPDATE_CLOCK_ONLY = 1 << 21;
        const READ_CEATA = 1 << 22;
        const CCS_EXPECTED = 1 << 23;
        const ENABLE_BOOT = 1 << 24;
        const EXPECT_BOOT_ACK = 1 << 25;
        const DISABLE_BOOT = 1 << 26;
        const BOOT_MODE = 1 << 27;
        const VOLT_SWITCH = 1 << 28;
        const USE_HOLD_REG = 1 << 29;
        const START = 1 << 31;
    }
}

const R1: CommandFlags = CommandFlags::RESPONSE_EXPECT.union(CommandFlags::CHECK_RESPONSE_CRC);
const R1_AFTER_DATA: CommandFlags = R1.union(CommandFlags::WAIT_PRVDATA_COMPLETE);
const DATA_READ: CommandFlags = R1_AFTER_DATA.union(CommandFlags::DATA_EXPECTED);
const DATA_WRITE: CommandFlags = DATA_READ.union(CommandFlags::WRITE);

/// Mask of the command index field.
pub const COMMAND_INDEX_MASK: u32 = 0x3F;

/// Returns the flag set for `index`, before the index, hold register and start bits are added.
pub fn command_flags(index: u32, argument: u32) -> CommandFlags {
    match index {
        MMC_GO_IDLE_STATE => CommandFlags::SEND_INIT,
        MMC_SEND_OP_COND => CommandFlags::RESPONSE_EXPECT,
        MMC_ALL_SEND_CID => CommandFlags::RESPONSE_EXPECT
            .union(CommandFlags::LONG_RESPONSE)
            .union(CommandFlags::CHECK_RESPONSE_CRC)
            .union(CommandFlags::SEND_INIT),
        MMC_SET_RELATIVE_ADDR => R1.union(CommandFlags::SEND_INIT),
        MMC_SWITCH => R1_AFTER_DATA,
        // CMD7 with RCA 0 deselects every card and no card answers.
        MMC_SELECT_CARD if argument != 0 => R1,
        MMC_SELECT_CARD => CommandFlags::empty(),
        MMC_SEND_EXT_CSD => DATA_READ,
        MMC_SEND_CSD => R1.union(CommandFlags::LONG_RESPONSE),
        MMC_STOP_TRANSMISSION => R1.union(CommandFlags::STOP_ABORT),
        MMC_SEND_STATUS => R1_AFTER_DATA,
        MMC_SET_BLOCKLEN => R1_AFTER_DATA,
        MMC_READ_SINGLE_BLOCK | MMC_READ_MULTIPLE_BLOCK => DATA_READ,
        MMC_WRITE_BLOCK | MMC_WRITE_MULTIPLE_BLOCK => DATA_WRITE,
        MMC_SEND_WRITE_PROT => R1.union(CommandFlags::DATA_EXPECTED),
        SD_APP_SEND_OP_COND => CommandFlags::RESPONSE_EXPECT,
        SD_APP_SEND_SCR => DATA_READ,
        _ => R1,
    }
}

/// A complete `CMD` register value.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandWord(u32);

impl CommandWord {
    /// Builds the word issued for MMC command `index` with `argument`.
    pub fn for_command(index: u32, argument: u32) -> Self {
        let flags = command_flags(index, argument) | CommandFlags::USE_HOLD_REG | CommandFlags::START;
        Self(flags.bits() | (index & COMMAND_INDEX_MASK))
    }

    /// The host-only command that latches new clock settings into the CIU.
    pub const fn update_clock() -> Self {
        Self(CommandFlags::UPDATE_CLOCK_ONLY.union(CommandFlags::WAIT_PRVDATA_COMPLETE).bits())
    }

    /// Raw register value.
    pub const fn bits(&self) -> u32 {
        self.0
    }

    /// Command index field.
    pub const fn index(&self) -> u32 {
        self.0 & COMMAND_INDEX_MASK
    }

    /// Flag bits of the word.
    pub const fn flags(&self) -> CommandFlags {
        CommandFlags::from_bits_truncate(self.0)
    }

    /// True when the command moves data and therefore needs a data phase.
    pub const fn is_data(&self) -> bool {
        self.flags().contains(CommandFlags::DATA_EXPECTED)
    }

    /// True for a data command that writes to the card.
    pub const fn is_write(&self) -> bool {
        self.is_data() && self.flags().contains(CommandFlags::WRITE)
    }

    /// Copy of the word with the start bit set.
    pub const fn with_start(&self) -> Self {
        Self(self.0 | CommandFlags::START.bits())
    }
}

impl fmt::Debug for CommandWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CommandWord(CMD{} {:#010X})", self.index(), self.0)
    }
}

/// Response formats the host can be asked to hand back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseType {
    R1,
    R1b,
    /// 128-bit CID or CSD.
    R2,
    R3,
    R6,
    R7,
}

impl ResponseType {
    /// Number of 32-bit response registers the format occupies.
    pub const fn word_count(&self) -> usize {
        match self {
            ResponseType::R2 => 4,
            _ => 1,
        }
    }
}
