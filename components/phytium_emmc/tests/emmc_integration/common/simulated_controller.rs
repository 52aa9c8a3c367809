//! Simulated Phytium MCI controller with an attached eMMC card.
//!
//! The simulator implements the register behavior the driver depends on and executes commands when the start
//! bit is written. Data commands walk the IDMAC descriptor chain at `DESC_LIST_ADDR` in test memory, copying
//! between the described buffers and the card image.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent

use std::{cell::RefCell, collections::HashMap, rc::Rc, slice};

use phytium_emmc::{
    command::CommandFlags,
    descriptor::{Descriptor, DescriptorFlags, IdmacDescriptor},
    registers::{self, BusMode, Control, RawInterrupt},
    service::MmioAccess,
};

/// Register window base of the simulated controller.
pub const CONTROLLER_BASE: u64 = 0x2800_1000;

/// Card block size.
pub const CARD_BLOCK_SIZE: usize = 512;

/// R1 status of a card in the transfer state with READY_FOR_DATA set.
pub const CARD_STATUS_TRAN: u32 = 0x0000_0900;

/// OCR with the power up done bit and sector addressing.
pub const CARD_OCR: u32 = 0xC0FF_8080;

/// CID reported for CMD2, RESP0 first.
pub const CARD_CID: [u32; 4] = [0x1234_5678, 0x9ABC_DEF0, 0x0F1E_2D3C, 0x4B5A_6978];

/// CSD reported for CMD9, RESP0 first.
pub const CARD_CSD: [u32; 4] = [0x0A40_0040, 0x5B59_0000, 0x3A83_7F80, 0xD04F_0132];

/// EXT_CSD register size.
pub const EXT_CSD_SIZE: usize = 512;

/// EXT_CSD byte offset of SEC_COUNT (little endian).
pub const EXT_CSD_SEC_COUNT: usize = 212;

/// EXT_CSD byte offset of DEVICE_TYPE.
pub const EXT_CSD_DEVICE_TYPE: usize = 196;

struct ControllerState {
    registers: HashMap<u64, u32>,
    card: Vec<u8>,
    commands: Vec<(u32, u32)>,
    segments: Vec<u32>,
    clock_updates: usize,
}

impl ControllerState {
    fn register(&self, offset: u64) -> u32 {
        self.registers.get(&offset).copied().unwrap_or(0)
    }

    fn set_responses(&mut self, responses: [u32; 4]) {
        let offsets = [registers::RESP0, registers::RESP1, registers::RESP2, registers::RESP3];
        for (offset, value) in offsets.into_iter().zip(responses) {
            self.registers.insert(offset, value);
        }
    }

    fn execute(&mut self, command: CommandFlags, index: u32) -> RawInterrupt {
        let argument = self.register(registers::CMDARG);
        self.commands.push((index, argument));

        match index {
            1 => {
                self.set_responses([CARD_OCR, 0, 0, 0]);
                RawInterrupt::CMD_DONE
            }
            2 => {
                self.set_responses(CARD_CID);
                RawInterrupt::CMD_DONE
            }
            9 => {
                self.set_responses(CARD_CSD);
                RawInterrupt::CMD_DONE
            }
            8 if command.contains(CommandFlags::DATA_EXPECTED) => {
                self.set_responses([CARD_STATUS_TRAN, 0, 0, 0]);
                self.send_ext_csd()
            }
            17 | 18 | 24 | 25 if command.contains(CommandFlags::DATA_EXPECTED) => {
                self.set_responses([CARD_STATUS_TRAN, 0, 0, 0]);
                self.run_data(argument, command.contains(CommandFlags::WRITE))
            }
            _ => {
                self.set_responses([CARD_STATUS_TRAN, 0, 0, 0]);
                RawInterrupt::CMD_DONE
            }
        }
    }

    fn run_data(&mut self, argument: u32, write: bool) -> RawInterrupt {
        let start = argument as usize * CARD_BLOCK_SIZE;
        let length = self.register(registers::BYTCNT) as usize;
        if start + length > self.card.len() {
            self.segments.clear();
            return RawInterrupt::CMD_DONE | RawInterrupt::DRTO;
        }

        let buffers = match self.walk_chain(length) {
            Ok(buffers) => buffers,
            Err(status) => return status,
        };
        let mut offset = start;
        for (pointer, chunk) in buffers {
            // SAFETY: descriptor buffers point into the staging pages of the current transfer.
            let buffer = unsafe { slice::from_raw_parts_mut(pointer, chunk) };
            let card = &mut self.card[offset..offset + chunk];
            if write {
                card.copy_from_slice(buffer);
            } else {
                buffer.copy_from_slice(card);
            }
            offset += chunk;
        }
        RawInterrupt::CMD_DONE | RawInterrupt::DTO
    }

    fn send_ext_csd(&mut self) -> RawInterrupt {
        let length = (self.register(registers::BYTCNT) as usize).min(EXT_CSD_SIZE);
        let buffers = match self.walk_chain(length) {
            Ok(buffers) => buffers,
            Err(status) => return status,
        };
        let ext_csd = self.ext_csd();
        let mut offset = 0;
        for (pointer, chunk) in buffers {
            // SAFETY: as in `run_data`.
            let buffer = unsafe { slice::from_raw_parts_mut(pointer, chunk) };
            buffer.copy_from_slice(&ext_csd[offset..offset + chunk]);
            offset += chunk;
        }
        RawInterrupt::CMD_DONE | RawInterrupt::DTO
    }

    fn ext_csd(&self) -> [u8; EXT_CSD_SIZE] {
        let mut ext_csd = [0_u8; EXT_CSD_SIZE];
        let sectors = (self.card.len() / CARD_BLOCK_SIZE) as u32;
        ext_csd[EXT_CSD_SEC_COUNT..EXT_CSD_SEC_COUNT + 4].copy_from_slice(&sectors.to_le_bytes());
        ext_csd[EXT_CSD_DEVICE_TYPE] = 0x57;
        ext_csd
    }

    /// Consumes the descriptor chain at `DESC_LIST_ADDR` covering `length` bytes, handing ownership of each
    /// descriptor back to the driver. Returns the buffer pieces in chain order.
    fn walk_chain(&mut self, length: usize) -> Result<Vec<(*mut u8, usize)>, RawInterrupt> {
        self.segments.clear();

        let dma_ready = Control::from_bits_retain(self.register(registers::CNTRL)).contains(Control::USE_INTERNAL_DMAC)
            && BusMode::from_bits_retain(self.register(registers::BUS_MODE)).contains(BusMode::DE);
        if !dma_ready {
            return Err(RawInterrupt::CMD_DONE | RawInterrupt::EBE);
        }

        let mut address = ((self.register(registers::DESC_LIST_ADDRH) as u64) << 32)
            | self.register(registers::DESC_LIST_ADDRL) as u64;
        let mut buffers = Vec::new();
        let mut moved = 0;
        while moved < length {
            if address == 0 {
                return Err(RawInterrupt::CMD_DONE | RawInterrupt::EBE);
            }
            let slot = address as usize as *mut IdmacDescriptor;
            // SAFETY: the driver points the controller at its descriptor ring, which lives in test heap pages.
            let raw = unsafe { slot.read() };
            let descriptor = Descriptor::from(raw);
            if !descriptor.flags.contains(DescriptorFlags::OWN) {
                return Err(RawInterrupt::CMD_DONE | RawInterrupt::EBE);
            }

            let chunk = (descriptor.size as usize).min(length - moved);
            buffers.push((descriptor.buffer as usize as *mut u8, chunk));
            moved += chunk;
            self.segments.push(descriptor.size);

            // SAFETY: same slot as read above.
            unsafe { slot.write(IdmacDescriptor { des0: raw.des0 & !DescriptorFlags::OWN.bits(), ..raw }) };

            if descriptor.flags.contains(DescriptorFlags::LD) {
                break;
            }
            address = descriptor.next;
        }

        if moved < length {
            return Err(RawInterrupt::CMD_DONE | RawInterrupt::DRTO);
        }
        Ok(buffers)
    }
}

/// Shared handle to the simulated controller.
#[derive(Clone)]
pub struct SimulatedController {
    state: Rc<RefCell<ControllerState>>,
}

impl SimulatedController {
    /// A controller with a zero filled card of `blocks` blocks.
    pub fn new(blocks: usize) -> Self {
        let mut values = HashMap::new();
        values.insert(registers::CKSTS, registers::CKSTS_CIU_READY);
        let state = ControllerState {
            registers: values,
            card: vec![0; blocks * CARD_BLOCK_SIZE],
            commands: Vec::new(),
            segments: Vec::new(),
            clock_updates: 0,
        };
        Self { state: Rc::new(RefCell::new(state)) }
    }

    /// Current value of a register.
    pub fn register(&self, offset: u64) -> u32 {
        self.state.borrow().register(offset)
    }

    /// Copy of `blocks` card blocks starting at `lba`.
    pub fn card_blocks(&self, lba: usize, blocks: usize) -> Vec<u8> {
        let start = lba * CARD_BLOCK_SIZE;
        self.state.borrow().card[start..start + blocks * CARD_BLOCK_SIZE].to_vec()
    }

    /// Overwrites card content starting at block `lba`.
    pub fn load_card(&self, lba: usize, data: &[u8]) {
        let start = lba * CARD_BLOCK_SIZE;
        self.state.borrow_mut().card[start..start + data.len()].copy_from_slice(data);
    }

    /// Card commands executed so far as `(index, argument)`.
    pub fn commands(&self) -> Vec<(u32, u32)> {
        self.state.borrow().commands.clone()
    }

    /// Buffer sizes of the descriptors consumed by the last data command.
    pub fn last_segments(&self) -> Vec<u32> {
        self.state.borrow().segments.clone()
    }

    /// Update-clock commands accepted so far.
    pub fn clock_updates(&self) -> usize {
        self.state.borrow().clock_updates
    }
}

impl MmioAccess for SimulatedController {
    fn read32(&self, address: u64) -> u32 {
        self.state.borrow().register(address - CONTROLLER_BASE)
    }

    fn write32(&self, address: u64, value: u32) {
        let offset = address - CONTROLLER_BASE;
        let mut state = self.state.borrow_mut();

        match offset {
            registers::RINTSTS => {
                let pending = state.register(offset);
                state.registers.insert(offset, pending & !value);
            }
            registers::CNTRL => {
                let reset = (Control::CONTROLLER_RESET | Control::FIFO_RESET | Control::DMA_RESET).bits();
                state.registers.insert(offset, value & !reset);
            }
            registers::BUS_MODE => {
                state.registers.insert(offset, value & !BusMode::SWR.bits());
            }
            registers::CMD => {
                let command = CommandFlags::from_bits_retain(value);
                state.registers.insert(offset, value & !CommandFlags::START.bits());
                if !command.contains(CommandFlags::START) {
                    return;
                }
                if command.contains(CommandFlags::UPDATE_CLOCK_ONLY) {
                    state.clock_updates += 1;
                    return;
                }
                let raised = state.execute(command, value & 0x3F);
                let pending = state.register(registers::RINTSTS);
                state.registers.insert(registers::RINTSTS, pending | raised.bits());
            }
            _ => {
                state.registers.insert(offset, value);
            }
        }
    }
}
