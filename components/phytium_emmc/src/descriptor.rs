//! IDMAC descriptor ring.
//!
//! The internal DMA controller walks a singly linked list of 32-byte descriptors in chained mode. Each descriptor
//! points at one buffer segment and at the next descriptor. The ring is allocated once, closed back onto slot 0 by
//! [`DescriptorRing::init`], and rewritten at the start of every transfer so that the active region ends at a
//! descriptor carrying the last and end-of-ring flags.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use core::{fmt, mem, slice};

use bitflags::bitflags;
use zerocopy::IntoBytes;
use zerocopy_derive::*;

use crate::{
    error::{EmmcError, Result},
    registers::{self, BusMode, Control, EmmcRegisters},
    service::dma::{size_to_pages, DmaAllocator, DmaPages},
};

/// Largest buffer a single descriptor can address (13-bit size field).
pub const MAX_DESCRIPTOR_BUFFER_SIZE: u32 = 0x1FFF;

/// Size of one descriptor in memory.
pub const DESCRIPTOR_SIZE: usize = mem::size_of::<IdmacDescriptor>();

bitflags! {
    /// DES0 control and status bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DescriptorFlags: u32 {
        /// Disable interrupt on completion.
        const DIC = 1 << 1;
        /// Last descriptor of the transfer.
        const LD = 1 << 2;
        /// First descriptor of the transfer.
        const FS = 1 << 3;
        /// Second address is the next descriptor.
        const CH = 1 << 4;
        /// End of ring.
        const ER = 1 << 5;
        /// Owned by the IDMAC.
        const OWN = 1 << 31;
    }
}

/// Descriptor layout as the IDMAC reads it from memory.
///
/// 64-bit addresses are stored as low/high 32-bit halves, the way the controller's 32-bit bus fetches them.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, IntoBytes, FromBytes, Immutable, KnownLayout)]
pub struct IdmacDescriptor {
    /// Flags.
    pub des0: u32,
    pub des1: u32,
    /// Buffer size, bits 12:0.
    pub des2: u32,
    pub des3: u32,
    /// Buffer address, low half.
    pub des4: u32,
    /// Buffer address, high half.
    pub des5: u32,
    /// Next descriptor, low half.
    pub des6: u32,
    /// Next descriptor, high half.
    pub des7: u32,
}

/// Working view of one descriptor with whole addresses.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Descriptor {
    pub flags: DescriptorFlags,
    pub size: u32,
    pub buffer: u64,
    pub next: u64,
}

impl Default for Descriptor {
    fn default() -> Self {
        Descriptor { flags: DescriptorFlags::empty(), size: 0, buffer: 0, next: 0 }
    }
}

impl From<Descriptor> for IdmacDescriptor {
    fn from(descriptor: Descriptor) -> Self {
        IdmacDescriptor {
            des0: descriptor.flags.bits(),
            des2: descriptor.size & MAX_DESCRIPTOR_BUFFER_SIZE,
            des4: descriptor.buffer as u32,
            des5: (descriptor.buffer >> 32) as u32,
            des6: descriptor.next as u32,
            des7: (descriptor.next >> 32) as u32,
            ..Default::default()
        }
    }
}

impl From<IdmacDescriptor> for Descriptor {
    fn from(raw: IdmacDescriptor) -> Self {
        Descriptor {
            flags: DescriptorFlags::from_bits_retain(raw.des0),
            size: raw.des2 & MAX_DESCRIPTOR_BUFFER_SIZE,
            buffer: ((raw.des5 as u64) << 32) | raw.des4 as u64,
            next: ((raw.des7 as u64) << 32) | raw.des6 as u64,
        }
    }
}

impl fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Descriptor")
            .field("flags", &self.flags)
            .field("size", &format_args!("{:#X}", self.size))
            .field("buffer", &format_args!("{:#X}", self.buffer))
            .field("next", &format_args!("{:#X}", self.next))
            .finish()
    }
}

/// How a transfer of a given length is split over segments and blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferGeometry {
    /// Descriptors used.
    pub segment_count: usize,
    /// Whole blocks moved.
    pub block_count: usize,
    /// `block_count` times the block size.
    pub effective_length: usize,
    /// Bytes addressed by the final descriptor.
    pub last_segment_size: usize,
}

impl TransferGeometry {
    /// Splits `length` bytes. The length is rounded up to whole blocks; segments are `segment_size` bytes except
    /// the last, which takes the remainder of the rounded length.
    pub fn new(length: usize, segment_size: usize, block_size: usize) -> Self {
        let segment_count = length.div_ceil(segment_size);
        let block_count = length.div_ceil(block_size);
        let effective_length = block_count * block_size;
        let last_segment_size = effective_length - segment_count.saturating_sub(1) * segment_size;
        TransferGeometry { segment_count, block_count, effective_length, last_segment_size }
    }

    /// Pages a staging buffer for this transfer needs.
    pub fn staging_pages(&self) -> usize {
        size_to_pages(self.effective_length)
    }
}

/// The descriptor ring shared by every transfer of one controller.
pub struct DescriptorRing {
    base: u64,
    count: usize,
    pages: usize,
}

impl DescriptorRing {
    /// Allocates and initializes a ring of `count` descriptors.
    pub fn allocate(dma: &dyn DmaAllocator, count: usize) -> Result<Self> {
        if count == 0 {
            return Err(EmmcError::InvalidArgument);
        }
        let pages = DmaPages::allocate(dma, size_to_pages(count * DESCRIPTOR_SIZE)).inspect_err(|err| {
            log::error!(target: "emmc", "Failed to allocate descriptor ring of {} entries: {}", count, err);
        })?;
        let (base, pages) = pages.into_raw();

        let mut ring = DescriptorRing { base, count, pages };
        ring.init();
        log::debug!(target: "emmc", "Descriptor ring of {} entries at {:#X}", count, base);
        Ok(ring)
    }

    /// Returns the ring memory to `dma`, leaving an empty ring behind. Freeing an empty ring does nothing.
    pub fn free(&mut self, dma: &dyn DmaAllocator) -> Result<()> {
        if self.is_empty() {
            return Ok(());
        }
        let (base, pages) = (self.base, self.pages);
        *self = DescriptorRing { base: 0, count: 0, pages: 0 };
        dma.free_pages(base, pages)
    }

    /// Physical address of descriptor 0.
    pub fn base(&self) -> u64 {
        self.base
    }

    /// Number of descriptors in the ring.
    pub fn len(&self) -> usize {
        self.count
    }

    /// True once the ring has been freed.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Physical address of descriptor `index`.
    pub fn descriptor_address(&self, index: usize) -> u64 {
        self.base + (index * DESCRIPTOR_SIZE) as u64
    }

    /// Reads back descriptor `index`.
    pub fn descriptor(&self, index: usize) -> Option<Descriptor> {
        self.slots().get(index).map(|raw| Descriptor::from(*raw))
    }

    fn slots(&self) -> &[IdmacDescriptor] {
        if self.is_empty() {
            return &[];
        }
        // SAFETY: `base` is a page aligned allocation of at least `count` descriptors owned by this ring.
        unsafe { slice::from_raw_parts(self.base as usize as *const IdmacDescriptor, self.count) }
    }

    fn slots_mut(&mut self) -> &mut [IdmacDescriptor] {
        if self.is_empty() {
            return &mut [];
        }
        // SAFETY: see `slots`; `&mut self` makes the view unique.
        unsafe { slice::from_raw_parts_mut(self.base as usize as *mut IdmacDescriptor, self.count) }
    }

    /// Zeroes every descriptor and links each to the following slot, closing the last one back onto slot 0.
    pub fn init(&mut self) {
        let count = self.count;
        let base = self.base;
        let slots = self.slots_mut();
        slots.as_mut_bytes().fill(0);
        for (index, slot) in slots.iter_mut().enumerate() {
            let next_index = (index + 1) % count;
            let next = base + (next_index * DESCRIPTOR_SIZE) as u64;
            *slot = Descriptor { next, ..Default::default() }.into();
        }
    }

    /// Describes a transfer of `length` bytes at `buffer` in the ring.
    ///
    /// Every segment descriptor is handed to the IDMAC chained with its completion interrupt disabled. The first
    /// carries FS. The last carries LD and ER, takes the remainder of the block rounded length and has its next
    /// pointer cleared so the IDMAC stops there.
    pub fn prepare_transfer(
        &mut self,
        length: usize,
        buffer: u64,
        segment_size: usize,
        block_size: usize,
    ) -> Result<TransferGeometry> {
        if length == 0 {
            return Err(EmmcError::InvalidArgument);
        }

        let geometry = TransferGeometry::new(length, segment_size, block_size);
        if geometry.segment_count > self.count {
            log::error!(
                target: "emmc",
                "Transfer of {:#X} bytes needs {} descriptors, ring holds {}.",
                length,
                geometry.segment_count,
                self.count
            );
            return Err(EmmcError::OutOfResources);
        }

        let last = geometry.segment_count - 1;
        for index in 0..geometry.segment_count {
            let mut descriptor = Descriptor {
                flags: DescriptorFlags::OWN | DescriptorFlags::CH | DescriptorFlags::DIC,
                size: segment_size as u32,
                buffer: buffer + (index * segment_size) as u64,
                next: self.descriptor_address(index + 1),
            };
            if index == 0 {
                descriptor.flags |= DescriptorFlags::FS;
            }
            if index == last {
                descriptor.flags |= DescriptorFlags::LD | DescriptorFlags::ER;
                descriptor.flags.remove(DescriptorFlags::DIC | DescriptorFlags::CH);
                descriptor.size = geometry.last_segment_size as u32;
                descriptor.next = 0;
            }
            log::trace!(target: "emmc", "desc[{}] = {:?}", index, descriptor);
            self.slots_mut()[index] = descriptor.into();
        }

        Ok(geometry)
    }

    /// Points the controller at descriptor 0 and soft resets the IDMAC.
    pub fn program_controller(&self, regs: &EmmcRegisters) {
        regs.write(registers::DESC_LIST_ADDRL, self.base as u32);
        regs.write(registers::DESC_LIST_ADDRH, (self.base >> 32) as u32);
        regs.set_bits(registers::BUS_MODE, BusMode::SWR.bits());
    }

    /// Enables the IDMAC and programs block size and byte count for a transfer of `length` bytes.
    pub fn start_dma(&self, regs: &EmmcRegisters, length: usize, block_size: usize) {
        regs.set_bits(registers::CNTRL, (Control::INT_ENABLE | Control::USE_INTERNAL_DMAC).bits());
        regs.set_bits(registers::BUS_MODE, BusMode::DE.bits());
        regs.write(registers::BLKSIZ, block_size as u32);
        regs.write(registers::BYTCNT, length as u32);
    }
}

impl fmt::Debug for DescriptorRing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DescriptorRing")
            .field("base", &format_args!("{:#X}", self.base))
            .field("count", &self.count)
            .field("pages", &self.pages)
            .finish()
    }
}
