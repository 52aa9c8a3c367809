//! Busy wait service.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
#[cfg(any(test, feature = "mockall"))]
use mockall::automock;

/// Microsecond granularity delay.
#[cfg_attr(any(test, feature = "mockall"), automock)]
pub trait Stall {
    /// Waits at least `microseconds` before returning.
    fn stall(&self, microseconds: usize);
}
