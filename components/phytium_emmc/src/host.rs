//! eMMC host command and transfer engine.
//!
//! [`EmmcHost`] owns one controller: its register window, its descriptor ring and the latch that carries a data
//! command from [`MmcHost::send_command`] to the data phase. Every operation runs under a [`TplMutex`], which keeps
//! a second caller from interleaving with a transfer that shares the ring and the latch.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use alloc::boxed::Box;
use core::mem;

use r_efi::efi;

use crate::{
    command::{CommandFlags, CommandWord, ResponseType},
    config::EmmcHostConfig,
    descriptor::{DescriptorRing, TransferGeometry},
    error::{EmmcError, Result},
    protocol::{BusTiming, BusWidth, HostCapabilities, MmcHost, MmcState},
    registers::{self, EmmcRegisters, RawInterrupt, Status},
    service::{DmaAllocator, DmaPages, HostServices, Stall, TplControl},
    tpl_lock::{TplGuard, TplMutex},
};

/// Where the engine is in the two step data command sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferPhase {
    /// No data command is waiting.
    Idle,
    /// A data command was latched and waits for its data phase.
    DataPending { command: CommandWord, argument: u32 },
}

/// State shared by every transfer, guarded by the host lock.
pub(crate) struct HostState {
    pub(crate) ring: DescriptorRing,
    pub(crate) phase: TransferPhase,
}

enum DataBuffer<'a> {
    Read(&'a mut [u8]),
    Write(&'a [u8]),
}

impl DataBuffer<'_> {
    fn len(&self) -> usize {
        match self {
            DataBuffer::Read(buffer) => buffer.len(),
            DataBuffer::Write(buffer) => buffer.len(),
        }
    }

    fn is_write(&self) -> bool {
        matches!(self, DataBuffer::Write(_))
    }
}

/// Driver instance for one Phytium MCI controller.
pub struct EmmcHost {
    pub(crate) config: EmmcHostConfig,
    pub(crate) regs: EmmcRegisters,
    pub(crate) timer: Box<dyn Stall>,
    dma: Box<dyn DmaAllocator>,
    tpl: Box<dyn TplControl>,
    state: TplMutex<HostState>,
    capabilities: HostCapabilities,
}

impl EmmcHost {
    /// Builds a host from a configuration and its platform services, allocating the descriptor ring.
    ///
    /// The controller itself is not touched; it is brought up by [`MmcState::HwInitialization`].
    pub fn new(config: EmmcHostConfig, services: HostServices) -> Result<Self> {
        config.validate()?;

        let HostServices { mmio, timer, dma, tpl } = services;
        let ring = DescriptorRing::allocate(&*dma, config.descriptor_count)?;
        let capabilities = HostCapabilities::from_config(&config);

        Ok(Self {
            regs: EmmcRegisters::new(config.base_address, mmio),
            timer,
            dma,
            tpl,
            state: TplMutex::new(config.tpl, HostState { ring, phase: TransferPhase::Idle }, "EmmcHostLock"),
            capabilities,
            config,
        })
    }

    /// Active configuration.
    pub fn config(&self) -> &EmmcHostConfig {
        &self.config
    }

    /// Logs the controller registers at debug level.
    pub fn dump_registers(&self) {
        self.regs.dump();
    }

    /// The latched data command, if any.
    pub fn pending_command(&self) -> Result<Option<(CommandWord, u32)>> {
        let state = self.lock()?;
        Ok(match state.phase {
            TransferPhase::Idle => None,
            TransferPhase::DataPending { command, argument } => Some((command, argument)),
        })
    }

    pub(crate) fn lock(&self) -> Result<TplGuard<'_, HostState>> {
        self.state.try_lock(&*self.tpl).ok_or(EmmcError::Efi(efi::Status::ACCESS_DENIED))
    }

    pub(crate) fn wait_clear(&self, offset: u64, mask: u32) -> Result<()> {
        self.regs.wait_bits_clear(offset, mask, &*self.timer, self.config.handshake_timeout_us)
    }

    pub(crate) fn wait_set(&self, offset: u64, mask: u32) -> Result<()> {
        self.regs.wait_bits_set(offset, mask, &*self.timer, self.config.handshake_timeout_us)
    }

    /// Issues `command` and polls for its completion.
    pub(crate) fn issue_command(&self, command: CommandWord, argument: u32) -> Result<()> {
        log::debug!(target: "emmc", "Issue {:?} arg {:#010X}", command, argument);

        self.wait_clear(registers::STATUS, Status::DATA_BUSY.bits())?;
        self.regs.write(registers::RINTSTS, registers::RINTSTS_CLEAR_ALL);
        self.regs.write(registers::CMDARG, argument);
        self.wait_clear(registers::STATUS, Status::CARD_BUSY.bits())?;
        self.regs.write(registers::CMD, command.with_start().bits());
        self.wait_clear(registers::CMD, CommandFlags::START.bits())?;
        self.regs.write(registers::INTMASK, RawInterrupt::ERROR_MASK.bits());

        for _ in 0..self.config.command_poll_budget() {
            let status = RawInterrupt::from_bits_retain(self.regs.read(registers::RINTSTS));
            if status.intersects(RawInterrupt::ERRORS) {
                log::error!(target: "emmc", "CMD{} failed, RINTSTS {:#010X}", command.index(), status.bits());
                return Err(EmmcError::DeviceError);
            }
            if status.intersects(RawInterrupt::DTO | RawInterrupt::CMD_DONE) {
                return Ok(());
            }
            self.timer.stall(self.config.poll_interval_us as usize);
        }

        log::error!(target: "emmc", "CMD{} timed out.", command.index());
        Err(EmmcError::Timeout)
    }

    /// Issues a host-only command that signals no completion, only waiting for the controller to accept it.
    pub(crate) fn issue_command_no_wait(&self, command: CommandWord, argument: u32) -> Result<()> {
        self.regs.write(registers::CMDARG, argument);
        self.wait_clear(registers::STATUS, Status::CARD_BUSY.bits())?;
        self.regs.write(registers::CMD, command.with_start().bits());
        self.wait_clear(registers::CMD, CommandFlags::START.bits())
    }

    fn wait_dma_complete(&self) -> Result<()> {
        for _ in 0..self.config.data_poll_budget() {
            let status = RawInterrupt::from_bits_retain(self.regs.read(registers::RINTSTS));
            if status.intersects(RawInterrupt::ERRORS) {
                log::error!(target: "emmc", "Data phase failed, RINTSTS {:#010X}", status.bits());
                return Err(EmmcError::DeviceError);
            }
            if status.contains(RawInterrupt::DTO) {
                return Ok(());
            }
            self.timer.stall(self.config.poll_interval_us as usize);
        }

        log::error!(target: "emmc", "Data transfer did not complete.");
        Err(EmmcError::Timeout)
    }

    fn transfer(&self, length: usize, mut data: DataBuffer<'_>) -> Result<()> {
        let mut state = self.lock()?;

        let (command, argument) = match mem::replace(&mut state.phase, TransferPhase::Idle) {
            TransferPhase::DataPending { command, argument } => (command, argument),
            TransferPhase::Idle => {
                log::warn!(target: "emmc", "Data phase requested with no data command latched.");
                return Err(EmmcError::InvalidArgument);
            }
        };

        if command.is_write() != data.is_write() {
            log::warn!(target: "emmc", "{:?} latched but data phase runs the other direction.", command);
            return Err(EmmcError::InvalidArgument);
        }
        if length == 0 || data.len() < length {
            log::warn!(target: "emmc", "Bad data phase length {:#X} for a {:#X} byte buffer.", length, data.len());
            return Err(EmmcError::InvalidArgument);
        }

        let geometry = TransferGeometry::new(length, self.config.segment_size, self.config.block_size);
        if geometry.segment_count > state.ring.len() {
            log::error!(target: "emmc", "Transfer of {:#X} bytes exceeds the descriptor ring.", length);
            return Err(EmmcError::OutOfResources);
        }

        let mut staging = DmaPages::allocate(&*self.dma, geometry.staging_pages()).inspect_err(|err| {
            log::error!(target: "emmc", "Failed to allocate staging buffer: {}", err);
        })?;
        if let DataBuffer::Write(source) = &data {
            let staged = staging.as_mut_slice();
            staged[..length].copy_from_slice(&source[..length]);
            staged[length..].fill(0);
        }

        state.ring.prepare_transfer(length, staging.address(), self.config.segment_size, self.config.block_size)?;
        state.ring.program_controller(&self.regs);
        state.ring.start_dma(&self.regs, length, self.config.block_size);

        self.issue_command(command, argument)?;
        self.wait_dma_complete()?;

        if let DataBuffer::Read(destination) = &mut data {
            destination[..length].copy_from_slice(&staging.as_slice()[..length]);
        }

        log::debug!(
            target: "emmc",
            "CMD{} moved {} blocks over {} descriptors.",
            command.index(),
            geometry.block_count,
            geometry.segment_count
        );
        Ok(())
    }
}

impl MmcHost for EmmcHost {
    fn is_card_present(&self) -> bool {
        true
    }

    fn is_read_only(&self) -> bool {
        false
    }

    fn is_dma_supported(&self) -> bool {
        true
    }

    fn is_multi_block(&self) -> bool {
        true
    }

    fn notify_state(&self, state: MmcState) -> Result<()> {
        match state {
            MmcState::HwInitialization => {
                let _guard = self.lock()?;
                self.init_controller()?;
                self.program_clock(400_000)
            }
            other => {
                log::debug!(target: "emmc", "State {:?} needs no host action.", other);
                Ok(())
            }
        }
    }

    fn send_command(&self, index: u32, argument: u32) -> Result<()> {
        let command = CommandWord::for_command(index, argument);
        let mut state = self.lock()?;

        if command.is_data() {
            if let TransferPhase::DataPending { command: stale, .. } = state.phase {
                log::warn!(target: "emmc", "{:?} replaces latched {:?} that never ran.", command, stale);
            }
            log::debug!(target: "emmc", "Latch {:?} arg {:#010X}", command, argument);
            state.phase = TransferPhase::DataPending { command, argument };
            return Ok(());
        }

        if let TransferPhase::DataPending { command: latched, .. } = state.phase {
            log::warn!(target: "emmc", "CMD{} issued while {:?} waits for its data phase.", index, latched);
        }
        self.issue_command(command, argument)
    }

    fn receive_response(&self, response_type: ResponseType, buffer: &mut [u32]) -> Result<()> {
        const RESPONSE_REGISTERS: [u64; 4] = [registers::RESP0, registers::RESP1, registers::RESP2, registers::RESP3];

        let words = response_type.word_count();
        if buffer.len() < words {
            log::warn!(
                target: "emmc",
                "{:?} needs {} response words, buffer holds {}.",
                response_type,
                words,
                buffer.len()
            );
            return Err(EmmcError::InvalidArgument);
        }

        let _guard = self.lock()?;
        for (word, offset) in buffer[..words].iter_mut().zip(RESPONSE_REGISTERS) {
            *word = self.regs.read(offset);
        }
        Ok(())
    }

    fn read_block_data(&self, _lba: u64, length: usize, buffer: &mut [u8]) -> Result<()> {
        self.transfer(length, DataBuffer::Read(buffer))
    }

    fn write_block_data(&self, _lba: u64, length: usize, buffer: &[u8]) -> Result<()> {
        self.transfer(length, DataBuffer::Write(buffer))
    }

    fn set_ios(&self, bus_clock_hz: u32, bus_width: u32, timing: BusTiming) -> Result<()> {
        let width = BusWidth::try_from(bus_width).inspect_err(|_| {
            log::warn!(target: "emmc", "Unsupported bus width {}.", bus_width);
        })?;

        let _guard = self.lock()?;
        log::debug!(target: "emmc", "Bus {:?} at {} Hz, timing {:?} runs as SDR.", width, bus_clock_hz, timing);
        self.regs.write(registers::CTYPE, width.ctype());
        if bus_clock_hz != 0 {
            self.program_clock(bus_clock_hz)?;
        }
        Ok(())
    }

    fn capabilities(&self) -> HostCapabilities {
        self.capabilities
    }
}

impl Drop for EmmcHost {
    fn drop(&mut self) {
        let dma = &*self.dma;
        if let Err(err) = self.state.get_mut().ring.free(dma) {
            log::error!(target: "emmc", "Failed to free descriptor ring: {}", err);
        }
    }
}
