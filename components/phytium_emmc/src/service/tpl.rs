//! Task priority control.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
#[cfg(any(test, feature = "mockall"))]
use mockall::automock;

use r_efi::efi;

/// Raise and restore of the current task priority level.
#[cfg_attr(any(test, feature = "mockall"), automock)]
pub trait TplControl {
    /// Raises the TPL to `new_tpl` and returns the previous level.
    fn raise_tpl(&self, new_tpl: efi::Tpl) -> efi::Tpl;

    /// Restores a level previously returned by [`TplControl::raise_tpl`].
    fn restore_tpl(&self, old_tpl: efi::Tpl);
}
