//! Memory mapped register access.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
#[cfg(any(test, feature = "mockall"))]
use mockall::automock;

/// 32-bit register access to a controller window.
///
/// Every access must reach the device in program order with respect to other accesses and to DMA memory writes
/// made before it.
#[cfg_attr(any(test, feature = "mockall"), automock)]
pub trait MmioAccess {
    /// Reads the 32-bit register at `address`.
    fn read32(&self, address: u64) -> u32;

    /// Writes `value` to the 32-bit register at `address`.
    fn write32(&self, address: u64, value: u32);
}

/// Volatile accesses to identity mapped physical addresses.
#[derive(Debug, Clone, Copy, Default)]
pub struct PhysicalMmio;

impl PhysicalMmio {
    #[inline(always)]
    fn barrier() {
        cfg_if::cfg_if! {
            if #[cfg(target_arch = "aarch64")] {
                aarch64_cpu::asm::barrier::dsb(aarch64_cpu::asm::barrier::SY);
            } else {
                core::sync::atomic::fence(core::sync::atomic::Ordering::SeqCst);
            }
        }
    }
}

impl MmioAccess for PhysicalMmio {
    fn read32(&self, address: u64) -> u32 {
        Self::barrier();
        // SAFETY: the register window is mapped device memory owned by this driver instance.
        unsafe { core::ptr::read_volatile(address as usize as *const u32) }
    }

    fn write32(&self, address: u64, value: u32) {
        Self::barrier();
        // SAFETY: the register window is mapped device memory owned by this driver instance.
        unsafe { core::ptr::write_volatile(address as usize as *mut u32, value) };
    }
}
