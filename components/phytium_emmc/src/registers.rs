//! Phytium MCI register layout and access helpers.
//!
//! Offsets are relative to the controller base address. Bit definitions follow the DesignWare mobile storage host
//! register description with the Phytium extensions at 0x58, 0x108 and 0x10C.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use alloc::boxed::Box;
use core::fmt;

use bitflags::bitflags;

use crate::{
    error::{EmmcError, Result},
    service::{MmioAccess, Stall},
};

/// Control register.
pub const CNTRL: u64 = 0x00;
/// Power enable.
pub const PWREN: u64 = 0x04;
/// Clock divider, drive point and sample point.
pub const CLKDIV: u64 = 0x08;
/// Clock enable.
pub const CLKENA: u64 = 0x10;
/// Response and data timeouts.
pub const TMOUT: u64 = 0x14;
/// Card bus width.
pub const CTYPE: u64 = 0x18;
/// Block size.
pub const BLKSIZ: u64 = 0x1C;
/// Byte count.
pub const BYTCNT: u64 = 0x20;
/// Interrupt mask.
pub const INTMASK: u64 = 0x24;
/// Command argument.
pub const CMDARG: u64 = 0x28;
/// Command.
pub const CMD: u64 = 0x2C;
/// Response bits 31:0.
pub const RESP0: u64 = 0x30;
/// Response bits 63:32.
pub const RESP1: u64 = 0x34;
/// Response bits 95:64.
pub const RESP2: u64 = 0x38;
/// Response bits 127:96.
pub const RESP3: u64 = 0x3C;
/// Masked interrupt status.
pub const MINTSTS: u64 = 0x40;
/// Raw interrupt status, write one to clear.
pub const RINTSTS: u64 = 0x44;
/// Controller status.
pub const STATUS: u64 = 0x48;
/// FIFO thresholds.
pub const FIFOTH: u64 = 0x4C;
/// CIU clock status.
pub const CKSTS: u64 = 0x58;
/// UHS signalling.
pub const UHS_REG: u64 = 0x74;
/// Card reset.
pub const CARD_RESET: u64 = 0x78;
/// IDMAC bus mode.
pub const BUS_MODE: u64 = 0x80;
/// Descriptor list base, low half.
pub const DESC_LIST_ADDRL: u64 = 0x88;
/// Descriptor list base, high half.
pub const DESC_LIST_ADDRH: u64 = 0x8C;
/// IDMAC status.
pub const DMAC_STATUS: u64 = 0x90;
/// IDMAC interrupt enable.
pub const DMAC_INT_EN: u64 = 0x94;
/// Card read threshold.
pub const CARD_THRCTL: u64 = 0x100;
/// UHS extension: CIU clock profile.
pub const UHS_REG_EXT: u64 = 0x108;
/// eMMC DDR control.
pub const EMMC_DDR_REG: u64 = 0x10C;

/// `CLKENA`: card clock enable.
pub const CLKENA_CCLK_ENABLE: u32 = 1 << 0;
/// `CKSTS`: CIU clock ready.
pub const CKSTS_CIU_READY: u32 = 1 << 0;
/// `UHS_REG`: 1.8 V signalling.
pub const UHS_REG_VOLT_1V8: u32 = 1 << 0;
/// `CARD_RESET`: card out of reset.
pub const CARD_RESET_ENABLE: u32 = 1 << 0;
/// `PWREN`: card power on.
pub const PWREN_ENABLE: u32 = 1 << 0;
/// `TMOUT`: longest response and data timeouts.
pub const TMOUT_MAX: u32 = u32::MAX;
/// Write to `RINTSTS` clearing every pending status bit.
pub const RINTSTS_CLEAR_ALL: u32 = u32::MAX;

bitflags! {
    /// `CNTRL` bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Control: u32 {
        const CONTROLLER_RESET = 1 << 0;
        const FIFO_RESET = 1 << 1;
        const DMA_RESET = 1 << 2;
        const INT_ENABLE = 1 << 4;
        const DMA_ENABLE = 1 << 5;
        const USE_INTERNAL_DMAC = 1 << 25;
    }
}

bitflags! {
    /// `RINTSTS` and `INTMASK` bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RawInterrupt: u32 {
        /// Card detect.
        const CD = 1 << 0;
        /// Response error.
        const RE = 1 << 1;
        /// Command done.
        const CMD_DONE = 1 << 2;
        /// Data transfer over.
        const DTO = 1 << 3;
        const TXDR = 1 << 4;
        const RXDR = 1 << 5;
        /// Response CRC error.
        const RCRC = 1 << 6;
        /// Data CRC error.
        const DCRC = 1 << 7;
        /// Response timeout.
        const RTO = 1 << 8;
        /// Data read timeout.
        const DRTO = 1 << 9;
        /// Data starvation by host timeout.
        const HTO = 1 << 10;
        /// FIFO underrun or overrun.
        const FRUN = 1 << 11;
        /// Hardware locked write error.
        const HLE = 1 << 12;
        /// Start bit error.
        const SBE = 1 << 13;
        /// Auto command done.
        const ACD = 1 << 14;
        /// End bit error.
        const EBE = 1 << 15;

        /// Sources unmasked while a command is in flight.
        const ERROR_MASK = Self::EBE.bits()
            | Self::HLE.bits()
            | Self::RTO.bits()
            | Self::RCRC.bits()
            | Self::DCRC.bits()
            | Self::DRTO.bits()
            | Self::SBE.bits();

        /// Every status bit that fails a command or data phase.
        const ERRORS = Self::ERROR_MASK.bits() | Self::RE.bits() | Self::FRUN.bits();
    }
}

bitflags! {
    /// `STATUS` bits the driver looks at.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Status: u32 {
        /// Card data line held low.
        const CARD_BUSY = 1 << 9;
        /// Data state machine busy.
        const DATA_BUSY = 1 << 10;
    }
}

bitflags! {
    /// `BUS_MODE` bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BusMode: u32 {
        /// IDMAC software reset, self clearing.
        const SWR = 1 << 0;
        /// IDMAC enable.
        const DE = 1 << 7;
    }
}

bitflags! {
    /// `UHS_REG_EXT` bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct UhsExt: u32 {
        const EXT_CLK_ENABLE = 1 << 1;
    }
}

const REGISTER_NAMES: &[(&str, u64)] = &[
    ("CNTRL", CNTRL),
    ("PWREN", PWREN),
    ("CLKDIV", CLKDIV),
    ("CLKENA", CLKENA),
    ("TMOUT", TMOUT),
    ("CTYPE", CTYPE),
    ("BLKSIZ", BLKSIZ),
    ("BYTCNT", BYTCNT),
    ("INTMASK", INTMASK),
    ("CMDARG", CMDARG),
    ("CMD", CMD),
    ("MINTSTS", MINTSTS),
    ("RINTSTS", RINTSTS),
    ("STATUS", STATUS),
    ("FIFOTH", FIFOTH),
    ("CKSTS", CKSTS),
    ("UHS_REG", UHS_REG),
    ("CARD_RESET", CARD_RESET),
    ("BUS_MODE", BUS_MODE),
    ("DESC_LIST_ADDRL", DESC_LIST_ADDRL),
    ("DESC_LIST_ADDRH", DESC_LIST_ADDRH),
    ("DMAC_STATUS", DMAC_STATUS),
    ("DMAC_INT_EN", DMAC_INT_EN),
    ("CARD_THRCTL", CARD_THRCTL),
    ("UHS_REG_EXT", UHS_REG_EXT),
    ("EMMC_DDR_REG", EMMC_DDR_REG),
];

/// Register window of one controller instance.
pub struct EmmcRegisters {
    base: u64,
    mmio: Box<dyn MmioAccess>,
}

impl EmmcRegisters {
    /// Creates a register window at `base` accessed through `mmio`.
    pub fn new(base: u64, mmio: Box<dyn MmioAccess>) -> Self {
        Self { base, mmio }
    }

    /// Base address of the window.
    pub fn base(&self) -> u64 {
        self.base
    }

    /// Reads the register at `offset`.
    pub fn read(&self, offset: u64) -> u32 {
        self.mmio.read32(self.base + offset)
    }

    /// Writes the register at `offset`.
    pub fn write(&self, offset: u64, value: u32) {
        log::trace!(target: "emmc", "write {:#05X} <- {:#010X}", offset, value);
        self.mmio.write32(self.base + offset, value);
    }

    /// Read-modify-write setting `bits`.
    pub fn set_bits(&self, offset: u64, bits: u32) {
        self.write(offset, self.read(offset) | bits);
    }

    /// Read-modify-write clearing `bits`.
    pub fn clear_bits(&self, offset: u64, bits: u32) {
        self.write(offset, self.read(offset) & !bits);
    }

    /// Waits until every bit of `mask` reads back as zero.
    ///
    /// With `timeout_us` set the register is sampled once per microsecond and [`EmmcError::HardwareTimeout`] is
    /// returned once the budget runs out. With `None` the wait spins until the hardware responds.
    pub fn wait_bits_clear(&self, offset: u64, mask: u32, timer: &dyn Stall, timeout_us: Option<u32>) -> Result<()> {
        self.wait_for(offset, timer, timeout_us, |value| value & mask == 0).inspect_err(|_| {
            log::error!(target: "emmc", "Register {:#05X} bits {:#010X} never cleared.", offset, mask);
        })
    }

    /// Waits until every bit of `mask` reads back as one. See [`EmmcRegisters::wait_bits_clear`].
    pub fn wait_bits_set(&self, offset: u64, mask: u32, timer: &dyn Stall, timeout_us: Option<u32>) -> Result<()> {
        self.wait_for(offset, timer, timeout_us, |value| value & mask == mask).inspect_err(|_| {
            log::error!(target: "emmc", "Register {:#05X} bits {:#010X} never set.", offset, mask);
        })
    }

    fn wait_for(
        &self,
        offset: u64,
        timer: &dyn Stall,
        timeout_us: Option<u32>,
        done: impl Fn(u32) -> bool,
    ) -> Result<()> {
        match timeout_us {
            Some(budget) => {
                for _ in 0..budget {
                    if done(self.read(offset)) {
                        return Ok(());
                    }
                    timer.stall(1);
                }
                if done(self.read(offset)) { Ok(()) } else { Err(EmmcError::HardwareTimeout) }
            }
            None => loop {
                if done(self.read(offset)) {
                    return Ok(());
                }
                core::hint::spin_loop();
            },
        }
    }

    /// Logs every known register at debug level.
    pub fn dump(&self) {
        log::debug!(target: "emmc", "Controller registers at {:#X}:", self.base);
        for (name, offset) in REGISTER_NAMES {
            log::debug!(target: "emmc", "  {:<16} [{:#05X}] = {:#010X}", name, offset, self.read(*offset));
        }
    }
}

impl fmt::Debug for EmmcRegisters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmmcRegisters").field("base", &format_args!("{:#X}", self.base)).finish()
    }
}
