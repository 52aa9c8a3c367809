//! DMA page allocation.
//!
//! The IDMAC reads descriptors and data buffers from system memory by physical address. Firmware runs identity
//! mapped, so an address returned by a [`DmaAllocator`] is usable both as a CPU pointer and as a bus address.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use core::{fmt, mem, slice};

#[cfg(any(test, feature = "mockall"))]
use mockall::automock;

use crate::error::Result;

/// UEFI page size.
pub const UEFI_PAGE_SIZE: usize = 0x1000;

/// Number of whole pages needed to hold `size` bytes.
pub const fn size_to_pages(size: usize) -> usize {
    size.div_ceil(UEFI_PAGE_SIZE)
}

/// Allocator of page granular, page aligned memory reachable by the IDMAC.
#[cfg_attr(any(test, feature = "mockall"), automock)]
pub trait DmaAllocator {
    /// Allocates `pages` contiguous pages and returns their physical base address.
    fn allocate_pages(&self, pages: usize) -> Result<u64>;

    /// Returns pages obtained from [`DmaAllocator::allocate_pages`].
    fn free_pages(&self, address: u64, pages: usize) -> Result<()>;
}

/// Pages borrowed from a [`DmaAllocator`] and returned to it on drop.
pub struct DmaPages<'a> {
    address: u64,
    pages: usize,
    allocator: &'a dyn DmaAllocator,
}

impl<'a> DmaPages<'a> {
    /// Allocates `pages` pages from `allocator`.
    pub fn allocate(allocator: &'a dyn DmaAllocator, pages: usize) -> Result<Self> {
        let address = allocator.allocate_pages(pages)?;
        Ok(Self { address, pages, allocator })
    }

    /// Physical base address of the allocation.
    pub fn address(&self) -> u64 {
        self.address
    }

    /// Size of the allocation in pages.
    pub fn pages(&self) -> usize {
        self.pages
    }

    /// Size of the allocation in bytes.
    pub fn len(&self) -> usize {
        self.pages * UEFI_PAGE_SIZE
    }

    /// Returns true for a zero page allocation.
    pub fn is_empty(&self) -> bool {
        self.pages == 0
    }

    /// CPU view of the allocation.
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: the allocator handed out `len()` bytes at `address` and they stay owned by `self` until drop.
        unsafe { slice::from_raw_parts(self.address as usize as *const u8, self.len()) }
    }

    /// Mutable CPU view of the allocation.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: see `as_slice`; `&mut self` makes the view unique.
        unsafe { slice::from_raw_parts_mut(self.address as usize as *mut u8, self.len()) }
    }

    /// Releases ownership of the pages without freeing them, returning `(address, pages)`.
    pub fn into_raw(self) -> (u64, usize) {
        let raw = (self.address, self.pages);
        mem::forget(self);
        raw
    }
}

impl fmt::Debug for DmaPages<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DmaPages")
            .field("address", &format_args!("{:#X}", self.address))
            .field("pages", &self.pages)
            .finish()
    }
}

impl Drop for DmaPages<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.allocator.free_pages(self.address, self.pages) {
            log::error!(target: "emmc", "Failed to free {} DMA pages at {:#X}: {}", self.pages, self.address, err);
        }
    }
}
