//! Common Test Infrastructure for eMMC Integration Tests
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent

pub mod simulated_controller;

pub use {services::*, simulated_controller::*};

use phytium_emmc::{config::EmmcHostConfig, host::EmmcHost, service::HostServices};

/// Enables `RUST_LOG` controlled logging once per test binary.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Configuration matching the simulated controller.
pub fn simulated_config() -> EmmcHostConfig {
    EmmcHostConfig { base_address: CONTROLLER_BASE, ..Default::default() }
}

/// Handles onto everything a simulated host runs on.
pub struct Simulation {
    pub controller: SimulatedController,
    pub dma: HeapDma,
    pub timer: VirtualTimer,
    pub tpl: TrackingTpl,
}

impl Simulation {
    pub fn new(card_blocks: usize) -> Self {
        init_logging();
        Simulation {
            controller: SimulatedController::new(card_blocks),
            dma: HeapDma::new(),
            timer: VirtualTimer::default(),
            tpl: TrackingTpl::new(),
        }
    }

    pub fn services(&self) -> HostServices {
        HostServices {
            mmio: Box::new(self.controller.clone()),
            timer: Box::new(self.timer.clone()),
            dma: Box::new(self.dma.clone()),
            tpl: Box::new(self.tpl.clone()),
        }
    }
}

/// A host over a fresh simulation with a card of `card_blocks` blocks.
pub fn simulated_host(config: EmmcHostConfig, card_blocks: usize) -> (EmmcHost, Simulation) {
    let simulation = Simulation::new(card_blocks);
    let host = EmmcHost::new(config, simulation.services()).expect("host construction failed");
    (host, simulation)
}
