//! Phytium eMMC Integration Tests
//!
//! Drives the `phytium_emmc` host through its public surface against a simulated controller. The simulator walks
//! the IDMAC descriptor chains the driver builds and moves data between them and an in-memory card.
//!
//! ## Logging
//!
//! The `env_logger` crate is used to enable logging during tests. Set `RUST_LOG` before running them, for example:
//!
//! ```sh
//! RUST_LOG=emmc=debug cargo make test -p phytium_emmc --test emmc_integration
//! ```
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent

// Common utilities available to all test modules
mod common;

mod data_transfer;
