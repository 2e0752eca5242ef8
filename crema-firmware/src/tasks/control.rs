//! Control cycle
//!
//! Runs the supervisor, state machine and control engine at a fixed 10 Hz
//! on core 1, applies the outputs and feeds the hardware watchdog. Never
//! waits on the link.

use defmt::*;
use embassy_rp::gpio::Output;
use embassy_rp::pwm::PwmOutput;
use embassy_time::{Duration, Instant, Ticker};

use crema_core::control::CONTROL_PERIOD_MS;
use crema_core::safety::SafetyLevel;
use crema_core::{run_cycle, CycleReport};
use crema_drivers::output::BoardOutputs;
use crema_hal_rp2040::BoardWatchdog;

use crate::channels::{latest_sample, MACHINE, PERSIST_REQUEST, SNAPSHOT};

pub type Outputs = BoardOutputs<PwmOutput<'static>, Output<'static>>;

#[embassy_executor::task]
pub async fn control_task(mut outputs: Outputs, mut watchdog: BoardWatchdog) {
    info!("Control task started");

    watchdog.start();
    let mut ticker = Ticker::every(Duration::from_millis(CONTROL_PERIOD_MS));
    let mut level = SafetyLevel::Ok;
    let mut write_errors = 0;

    loop {
        ticker.next().await;

        let now = Instant::now().as_millis();
        let report = run_cycle(
            &MACHINE,
            &SNAPSHOT,
            latest_sample(),
            now,
            &mut outputs,
            &mut watchdog,
        );
        let Some(report) = report else {
            continue;
        };

        log_report(&report, &mut level);
        if report.persist {
            PERSIST_REQUEST.signal(());
        }

        if outputs.write_errors() != write_errors {
            write_errors = outputs.write_errors();
            warn!("Output write failed ({} total)", write_errors);
        }
    }
}

fn log_report(report: &CycleReport, level: &mut SafetyLevel) {
    if let Some((from, to)) = report.transition {
        info!("State {:?} -> {:?}", from, to);
    }
    if !report.raised.is_empty() {
        warn!("Safety flags raised: {:?}", report.raised);
    }
    if report.level != *level {
        match report.level {
            SafetyLevel::Critical => error!("Safety level {:?}, outputs off", report.level),
            SafetyLevel::Fault => warn!("Safety level {:?}", report.level),
            _ => info!("Safety level {:?}", report.level),
        }
        *level = report.level;
    }
    if let Some(shot) = report.finished {
        if shot.backflush {
            info!("Cleaning cycle finished after {} ms", shot.duration_ms);
        } else {
            info!("Shot finished after {} ms", shot.duration_ms);
        }
    }
    if report.returned_to_brew {
        info!("Steam timeout, back to brew");
    }
    trace!("Outputs {:?}", report.outputs);
}
