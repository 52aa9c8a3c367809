//! Controller initialization and card identification against the simulated controller.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent

use phytium_emmc::{
    command::{
        ResponseType, MMC_ALL_SEND_CID, MMC_GO_IDLE_STATE, MMC_SELECT_CARD, MMC_SEND_CSD, MMC_SEND_OP_COND,
        MMC_SET_RELATIVE_ADDR,
    },
    driver::EmmcHostDriver,
    protocol::{BusTiming, MmcHost, MmcState},
    registers::{self, Control},
};
use r_efi::efi;

use crate::emmc_integration::common::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hw_initialization_brings_up_controller() {
        let (host, sim) = simulated_host(simulated_config(), 16);

        host.notify_state(MmcState::HwInitialization).unwrap();

        let controller = &sim.controller;
        assert_eq!(controller.register(registers::PWREN), 1);
        assert_eq!(controller.register(registers::CLKENA), 1);
        assert_eq!(controller.register(registers::CLKDIV), 0x007E_7DFA);
        assert_eq!(controller.register(registers::UHS_REG_EXT), 0x502);
        assert_eq!(controller.register(registers::CARD_RESET), 1);
        assert_eq!(controller.register(registers::TMOUT), u32::MAX);
        assert_eq!(controller.register(registers::FIFOTH), 0x2007_0100);
        assert_eq!(controller.register(registers::CARD_THRCTL), 0x0080_0001);
        assert_eq!(controller.register(registers::INTMASK), 0);
        assert_eq!(controller.register(registers::DMAC_INT_EN), 0);
        let control = Control::from_bits_retain(controller.register(registers::CNTRL));
        assert!(control.contains(Control::INT_ENABLE | Control::USE_INTERNAL_DMAC));
        assert!(!control.intersects(Control::FIFO_RESET | Control::DMA_RESET));

        assert_eq!(controller.clock_updates(), 3, "one update at reset, two per clock change");
        assert!(controller.commands().is_empty(), "bring-up sends nothing to the card");
        assert_eq!(sim.tpl.current(), efi::TPL_APPLICATION);
        assert_eq!(sim.tpl.highest(), efi::TPL_NOTIFY);
    }

    #[test]
    fn test_card_identification_sequence() {
        let (host, sim) = simulated_host(simulated_config(), 16);
        host.notify_state(MmcState::HwInitialization).unwrap();

        host.send_command(MMC_GO_IDLE_STATE, 0).unwrap();

        host.send_command(MMC_SEND_OP_COND, 0x40FF_8080).unwrap();
        let mut ocr = [0_u32; 1];
        host.receive_response(ResponseType::R3, &mut ocr).unwrap();
        assert_eq!(ocr[0], CARD_OCR);

        host.send_command(MMC_ALL_SEND_CID, 0).unwrap();
        let mut cid = [0_u32; 4];
        host.receive_response(ResponseType::R2, &mut cid).unwrap();
        assert_eq!(cid, CARD_CID);

        host.send_command(MMC_SET_RELATIVE_ADDR, 1 << 16).unwrap();
        host.notify_state(MmcState::StandBy).unwrap();

        host.send_command(MMC_SEND_CSD, 1 << 16).unwrap();
        let mut csd = [0_u32; 4];
        host.receive_response(ResponseType::R2, &mut csd).unwrap();
        assert_eq!(csd, CARD_CSD);

        host.send_command(MMC_SELECT_CARD, 1 << 16).unwrap();
        let mut status = [0_u32; 1];
        host.receive_response(ResponseType::R1b, &mut status).unwrap();
        assert_eq!(status[0], CARD_STATUS_TRAN);
        host.notify_state(MmcState::Transfer).unwrap();

        assert_eq!(
            sim.controller.commands(),
            vec![(0, 0), (1, 0x40FF_8080), (2, 0), (3, 1 << 16), (9, 1 << 16), (7, 1 << 16)]
        );
    }

    #[test]
    fn test_bus_setup_after_identification() {
        let (host, sim) = simulated_host(simulated_config(), 16);
        host.notify_state(MmcState::HwInitialization).unwrap();

        host.set_ios(52_000_000, 8, BusTiming::Hs52).unwrap();

        assert_eq!(sim.controller.register(registers::CTYPE), 0x10000);
        assert_eq!(sim.controller.register(registers::UHS_REG_EXT), 0x202);
        assert_eq!(sim.controller.register(registers::CLKDIV), 0x0002_0103);
        assert_eq!(sim.controller.register(registers::CLKENA), 1);
        assert_eq!(sim.controller.clock_updates(), 5);

        host.set_ios(0, 4, BusTiming::Backward).unwrap();
        assert_eq!(sim.controller.register(registers::CTYPE), 1);
        assert_eq!(sim.controller.register(registers::CLKDIV), 0x0002_0103, "zero clock keeps the divider");
    }

    #[test]
    fn test_stopping_the_clock() {
        let (host, sim) = simulated_host(simulated_config(), 16);
        host.notify_state(MmcState::HwInitialization).unwrap();

        host.set_clock(0).unwrap();

        assert_eq!(sim.controller.register(registers::CLKENA), 0);
        assert_eq!(sim.controller.register(registers::UHS_REG_EXT) & 0x2, 0);
    }

    #[test]
    fn test_driver_lifecycle() {
        let sim = Simulation::new(16);
        let mut driver = EmmcHostDriver::with_services(simulated_config(), sim.services()).unwrap();
        assert_eq!(sim.dma.outstanding(), 1);

        let host = driver.host().unwrap();
        assert!(host.is_card_present());
        assert!(!host.is_read_only());
        assert!(host.is_dma_supported());
        assert!(host.is_multi_block());
        let capabilities = host.capabilities();
        assert_eq!(capabilities.max_segments, 128);
        assert_eq!(capabilities.max_request_size, 512 * 1024);
        host.notify_state(MmcState::HwInitialization).unwrap();

        driver.unload();
        assert!(driver.host().is_none());
        assert_eq!(sim.dma.outstanding(), 0);
    }
}
