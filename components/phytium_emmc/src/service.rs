//! Platform services consumed by the eMMC host driver.
//!
//! The host engine never touches the firmware tables directly. Register accesses, delays, DMA page management and
//! TPL changes all go through the traits in this module so that the driver can be exercised against fakes and
//! mocks.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use alloc::boxed::Box;

pub mod boot_services;
pub mod dma;
pub mod mmio;
pub mod timer;
pub mod tpl;

pub use boot_services::EfiBootServices;
pub use dma::{DmaAllocator, DmaPages};
pub use mmio::{MmioAccess, PhysicalMmio};
pub use timer::Stall;
pub use tpl::TplControl;

/// The set of services an [`EmmcHost`](crate::host::EmmcHost) is built from.
pub struct HostServices {
    /// 32-bit register access.
    pub mmio: Box<dyn MmioAccess>,
    /// Microsecond delays.
    pub timer: Box<dyn Stall>,
    /// Page allocations visible to the IDMAC.
    pub dma: Box<dyn DmaAllocator>,
    /// Task priority control.
    pub tpl: Box<dyn TplControl>,
}

impl HostServices {
    /// Builds the production service set on top of the boot services table, with registers reached through
    /// [`PhysicalMmio`].
    pub fn from_boot_services(boot_services: EfiBootServices) -> Self {
        HostServices {
            mmio: Box::new(PhysicalMmio),
            timer: Box::new(boot_services),
            dma: Box::new(boot_services),
            tpl: Box::new(boot_services),
        }
    }
}
