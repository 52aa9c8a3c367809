//! Controller bring-up and card clock programming.
//!
//! The card clock is derived from the CIU reference in two stages. A UHS extension profile selects the first
//! divisor (bits 8-15 hold the divisor minus one) and `CLKDIV` holds the second divisor together with the drive
//! and sample phase points. A new `CLKDIV` only takes effect once an update-clock command latches it.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use crate::{
    command::CommandWord,
    error::Result,
    host::EmmcHost,
    registers::{self, Control, UhsExt},
};

/// `CLKDIV` divider limits.
const MIN_DIVIDER: u32 = 1;
const MAX_DIVIDER: u32 = 0xFF;

/// First stage divisor encoded in a UHS extension profile.
pub const fn profile_divisor(profile: u32) -> u32 {
    1 + ((profile >> 8) & 0xFF)
}

/// Second stage divider with its drive and sample points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockDivider {
    pub divider: u32,
    pub drive: u32,
    pub sample: u32,
}

impl ClockDivider {
    /// Computes the divider reaching `frequency_hz` from `base_clock_hz` through `profile`.
    ///
    /// The drive point sits half a divided cycle in and the sample point one reference cycle after it. Dividers of
    /// two or less leave no room for that, so they drive at 0 and sample at 1.
    pub fn compute(base_clock_hz: u32, profile: u32, frequency_hz: u32) -> Self {
        let denominator = 2 * profile_divisor(profile) as u64 * frequency_hz.max(1) as u64;
        let raw = base_clock_hz as u64 / denominator;
        let divider = raw.clamp(MIN_DIVIDER as u64, MAX_DIVIDER as u64) as u32;
        if divider as u64 != raw {
            log::warn!(target: "emmc", "Clock divider {} for {} Hz clamped to {}.", raw, frequency_hz, divider);
        }

        let (drive, sample) = if divider <= 2 { (0, 1) } else { (divider / 2, divider / 2 + 1) };
        ClockDivider { divider, drive, sample }
    }

    /// `CLKDIV` register value.
    pub const fn register_value(&self) -> u32 {
        (self.sample << 16) | (self.drive << 8) | (self.divider & 0xFF)
    }
}

impl EmmcHost {
    /// Resets the controller and leaves it ready to issue commands. Runs under the host lock.
    pub fn initialize(&self) -> Result<()> {
        let _guard = self.lock()?;
        self.init_controller()
    }

    /// Programs the card clock; zero stops it. Runs under the host lock.
    pub fn set_clock(&self, frequency_hz: u32) -> Result<()> {
        let _guard = self.lock()?;
        self.program_clock(frequency_hz)
    }

    pub(crate) fn init_controller(&self) -> Result<()> {
        let regs = &self.regs;

        regs.write(registers::FIFOTH, self.config.fifo_threshold.encode());
        regs.write(registers::CARD_THRCTL, self.config.card_read_threshold);

        regs.clear_bits(registers::CLKENA, registers::CLKENA_CCLK_ENABLE);
        self.update_ext_clock(self.config.clock_profiles.identification)?;
        regs.write(registers::PWREN, registers::PWREN_ENABLE);
        regs.set_bits(registers::CLKENA, registers::CLKENA_CCLK_ENABLE);
        regs.set_bits(registers::UHS_REG_EXT, UhsExt::EXT_CLK_ENABLE.bits());
        regs.clear_bits(registers::UHS_REG, registers::UHS_REG_VOLT_1V8);

        let reset = (Control::FIFO_RESET | Control::DMA_RESET).bits();
        regs.set_bits(registers::CNTRL, reset);
        self.wait_clear(registers::CNTRL, reset)?;
        self.issue_command_no_wait(CommandWord::update_clock(), 0)?;

        regs.set_bits(registers::CARD_RESET, registers::CARD_RESET_ENABLE);

        regs.write(registers::INTMASK, 0);
        regs.write(registers::RINTSTS, registers::RINTSTS_CLEAR_ALL);
        regs.write(registers::DMAC_INT_EN, 0);
        regs.set_bits(registers::CNTRL, (Control::INT_ENABLE | Control::USE_INTERNAL_DMAC).bits());
        regs.write(registers::TMOUT, registers::TMOUT_MAX);

        log::info!(target: "emmc", "Controller at {:#X} initialized.", regs.base());
        Ok(())
    }

    /// Loads a UHS extension profile and waits for the CIU to report its clock stable.
    pub(crate) fn update_ext_clock(&self, profile: u32) -> Result<()> {
        self.regs.write(registers::UHS_REG_EXT, 0);
        self.regs.write(registers::UHS_REG_EXT, profile);
        self.wait_set(registers::CKSTS, registers::CKSTS_CIU_READY)
    }

    pub(crate) fn program_clock(&self, frequency_hz: u32) -> Result<()> {
        if frequency_hz == 0 {
            self.regs.clear_bits(registers::CLKENA, registers::CLKENA_CCLK_ENABLE);
            self.regs.clear_bits(registers::UHS_REG_EXT, UhsExt::EXT_CLK_ENABLE.bits());
            log::info!(target: "emmc", "Card clock stopped.");
            return Ok(());
        }

        let profile = self.config.clock_profiles.select(frequency_hz);
        self.update_ext_clock(profile)?;

        self.regs.clear_bits(registers::CLKENA, registers::CLKENA_CCLK_ENABLE);
        self.issue_command_no_wait(CommandWord::update_clock(), 0)?;

        let divider = ClockDivider::compute(self.config.base_clock_hz, profile, frequency_hz);
        self.regs.write(registers::CLKDIV, divider.register_value());

        self.regs.set_bits(registers::CLKENA, registers::CLKENA_CCLK_ENABLE);
        self.issue_command_no_wait(CommandWord::update_clock(), 0)?;

        log::info!(target: "emmc", "Card clock {} Hz, profile {:#X}, {:?}", frequency_hz, profile, divider);
        Ok(())
    }
}
