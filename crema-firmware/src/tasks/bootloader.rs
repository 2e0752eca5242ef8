//! Firmware update over the link
//!
//! Runs inside the comms task once ENTER_BOOTLOADER has been acked. The
//! transfer blocks core 0 for its whole duration; core 1 keeps cycling and
//! feeding the watchdog until the installer stops it.

use defmt::*;
use embassy_rp::uart::BufferedUart;
use embassy_time::{block_for, Duration};

use crema_core::bootloader::{run_update, BootError};
use crema_hal_rp2040::{PolledLink, RomInstaller, Rp2040Flash, LAYOUT};

use crate::channels::MACHINE;

/// Two control cycles plus margin for outputs to drop
const SETTLE: Duration = Duration::from_millis(250);

/// Receive and install an image
///
/// Returns only if the update failed, in which case the running image is
/// intact, the peer has been sent the error code and the machine has left
/// the install hold.
pub fn update(uart: &mut BufferedUart, flash: &mut Rp2040Flash<'static>) -> BootError {
    info!("Bootloader: waiting for image");
    let mut link = PolledLink::new(uart);
    run_update(
        &MACHINE,
        &mut link,
        flash,
        LAYOUT,
        &mut RomInstaller,
        |plan| {
            info!(
                "Bootloader: staged {} bytes, crc32 {=u32:#x}, {} units",
                plan.len,
                plan.crc32,
                plan.units()
            );
            info!("Bootloader: SAFE, installing");
            block_for(SETTLE);
        },
    )
}
