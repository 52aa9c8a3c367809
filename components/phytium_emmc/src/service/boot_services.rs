//! Boot services backed implementations of the driver services.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use core::ptr::NonNull;

use r_efi::efi;

use super::{DmaAllocator, Stall, TplControl};
use crate::error::{EmmcError, Result};

/// Thin handle to the UEFI boot services table.
#[derive(Debug, Clone, Copy)]
pub struct EfiBootServices {
    table: NonNull<efi::BootServices>,
}

impl EfiBootServices {
    /// Wraps a boot services table pointer. Returns `None` for a null pointer.
    ///
    /// # Safety
    ///
    /// `boot_services` must point to a valid boot services table that outlives every copy of the returned handle,
    /// which in practice means the handle must not be used after ExitBootServices.
    pub unsafe fn new(boot_services: *mut efi::BootServices) -> Option<Self> {
        NonNull::new(boot_services).map(|table| Self { table })
    }

    fn table(&self) -> &efi::BootServices {
        // SAFETY: validity is a precondition of `new`.
        unsafe { self.table.as_ref() }
    }
}

impl Stall for EfiBootServices {
    fn stall(&self, microseconds: usize) {
        let status = (self.table().stall)(microseconds);
        if status.is_error() {
            log::warn!(target: "emmc", "Stall of {microseconds}us failed: {status:?}");
        }
    }
}

impl DmaAllocator for EfiBootServices {
    fn allocate_pages(&self, pages: usize) -> Result<u64> {
        let mut address: efi::PhysicalAddress = 0;
        let status =
            (self.table().allocate_pages)(efi::ALLOCATE_ANY_PAGES, efi::BOOT_SERVICES_DATA, pages, &mut address);
        EmmcError::from_status(status)?;
        Ok(address)
    }

    fn free_pages(&self, address: u64, pages: usize) -> Result<()> {
        EmmcError::from_status((self.table().free_pages)(address, pages))
    }
}

impl TplControl for EfiBootServices {
    fn raise_tpl(&self, new_tpl: efi::Tpl) -> efi::Tpl {
        (self.table().raise_tpl)(new_tpl)
    }

    fn restore_tpl(&self, old_tpl: efi::Tpl) {
        (self.table().restore_tpl)(old_tpl)
    }
}
