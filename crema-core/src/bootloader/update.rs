//! One firmware update, from ENTER_BOOTLOADER to reset
//!
//! The machine keeps running while the image streams into staging. It is
//! parked in SAFE only once a complete image is staged, and released again
//! if the install does not go ahead.

use crema_hal::{FlashLayout, ProgramFlash, TimedLink};

use super::{BootError, BootloaderSession, ImageInstaller, InstallPlan};
use crate::machine::SharedMachine;

/// Receive an image and hand it to `installer`
///
/// `before_install` runs with the machine already in SAFE and must give the
/// control loop time to drive the outputs to zero. Returns only on failure;
/// by then the peer has seen the error code and the machine is back to
/// what it was doing.
pub fn run_update<L, F, I>(
    machine: &SharedMachine,
    link: &mut L,
    flash: &mut F,
    layout: FlashLayout,
    installer: &mut I,
    before_install: impl FnOnce(&InstallPlan),
) -> BootError
where
    L: TimedLink,
    F: ProgramFlash,
    I: ImageInstaller,
{
    let mut session = BootloaderSession::new(link, flash, layout);
    let plan = match session.receive() {
        Ok(plan) => plan,
        Err(e) => return e,
    };

    let hold = machine.with(|m| m.hold_for_update(session.now_ms()));
    before_install(&plan);

    let error = match session.announce_install() {
        Err(e) => e,
        Ok(()) => match installer.install(&plan) {
            // Installers reset on success
            Ok(()) => BootError::Unknown,
            Err(e) => {
                // The peer already saw the success marker; follow it with the error
                session.report_failure(e);
                e
            }
        },
    };

    if let Some(hold) = hold {
        machine.with(|m| m.release_update(hold, session.now_ms()));
    }
    error
}
