//! Crema - Espresso Machine Control Board Firmware
//!
//! Main firmware binary for the RP2040 control board. Core 0 talks to the
//! connectivity board and owns the flash; core 1 runs the safety
//! supervisor, the state machine and boiler control at a fixed rate.

#![no_std]
#![no_main]

use defmt::*;
use embassy_executor::{Executor, Spawner};
use embassy_rp::adc::{self, Adc};
use embassy_rp::bind_interrupts;
use embassy_rp::gpio::{Input, Level, Output, Pull};
use embassy_rp::multicore::{spawn_core1, Stack};
use embassy_rp::peripherals::{
    ADC, CORE1, PIN_10, PIN_12, PIN_14, PIN_16, PIN_17, PIN_18, PIN_2, PIN_26, PIN_27, PIN_28,
    PIN_3, PIN_4, PWM_SLICE5, PWM_SLICE6, SPI0, UART0,
};
use embassy_rp::pwm::{self, Pwm};
use embassy_rp::spi::{self, Spi};
use embassy_rp::uart::{BufferedInterruptHandler, BufferedUart, Config as UartConfig};
use embassy_rp::Peri;
use embassy_time::Instant;
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

use crema_core::config::Topology;
use crema_core::Machine;
use crema_drivers::output::{BoardOutputs, SSR_PWM_DIVIDER, SSR_PWM_TOP};
use crema_drivers::sensor::{Max31855, NtcParams, NtcSensor, PressureTransducer, WaterSwitches};
use crema_hal_rp2040::adc::{AdcInput, SharedAdc};
use crema_hal_rp2040::{BoardWatchdog, Rp2040Flash};

use crate::config::{SettingsStore, PROFILE};
use crate::tasks::control::Outputs;
use crate::tasks::BoardSensors;

mod channels;
mod config;
mod tasks;

bind_interrupts!(struct Irqs {
    UART0_IRQ => BufferedInterruptHandler<UART0>;
});

/// Link to the connectivity board
const LINK_BAUD: u32 = 921_600;

/// Transducer range at 4.5 V output
const PRESSURE_FULL_SCALE_BAR: f32 = 16.0;

/// MAX31855 tops out at 5 MHz
const THERMOCOUPLE_SPI_HZ: u32 = 4_000_000;

/// BOOT reset reason codes
const RESET_POWER_ON: u8 = 0;
const RESET_WATCHDOG: u8 = 1;

static TX_BUF: StaticCell<[u8; 256]> = StaticCell::new();
static RX_BUF: StaticCell<[u8; 512]> = StaticCell::new();

static CORE1_STACK: StaticCell<Stack<8192>> = StaticCell::new();
static CORE1_EXECUTOR: StaticCell<Executor> = StaticCell::new();
static ADC_SHARED: StaticCell<SharedAdc<'static>> = StaticCell::new();

/// Peripherals handed to core 1
///
/// Drivers are built on core 1 itself so nothing `!Send` crosses cores.
struct ControlPeripherals {
    watchdog: BoardWatchdog,
    brew_ssr: (Peri<'static, PWM_SLICE5>, Peri<'static, PIN_10>),
    steam_ssr: (Peri<'static, PWM_SLICE6>, Peri<'static, PIN_12>),
    pump: Peri<'static, PIN_14>,
    adc: Peri<'static, ADC>,
    brew_ntc: Peri<'static, PIN_26>,
    steam_ntc: Peri<'static, PIN_27>,
    pressure: Peri<'static, PIN_28>,
    spi: Peri<'static, SPI0>,
    spi_clk: Peri<'static, PIN_18>,
    spi_miso: Peri<'static, PIN_16>,
    thermocouple_cs: Peri<'static, PIN_17>,
    reservoir: Peri<'static, PIN_2>,
    tank: Peri<'static, PIN_3>,
    steam_level: Peri<'static, PIN_4>,
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("Crema firmware starting: {}", PROFILE.name);

    let p = embassy_rp::init(Default::default());

    let watchdog = BoardWatchdog::new(p.WATCHDOG);
    let watchdog_reset = watchdog.caused_last_reset();
    if watchdog_reset {
        warn!("Last reset was caused by the watchdog");
    }

    let mut store = SettingsStore::new(Rp2040Flash::new(p.FLASH, p.DMA_CH0));
    let settings = store.load_or_default(&PROFILE).await;

    channels::MACHINE.install(Machine::new(
        PROFILE,
        settings,
        watchdog_reset,
        Instant::now().as_millis(),
    ));
    info!("Machine ready: {:?}", PROFILE.topology);

    let hw = ControlPeripherals {
        watchdog,
        brew_ssr: (p.PWM_SLICE5, p.PIN_10),
        steam_ssr: (p.PWM_SLICE6, p.PIN_12),
        pump: p.PIN_14,
        adc: p.ADC,
        brew_ntc: p.PIN_26,
        steam_ntc: p.PIN_27,
        pressure: p.PIN_28,
        spi: p.SPI0,
        spi_clk: p.PIN_18,
        spi_miso: p.PIN_16,
        thermocouple_cs: p.PIN_17,
        reservoir: p.PIN_2,
        tank: p.PIN_3,
        steam_level: p.PIN_4,
    };
    start_control_core(p.CORE1, hw);

    let mut uart_config = UartConfig::default();
    uart_config.baudrate = LINK_BAUD;
    let uart = BufferedUart::new(
        p.UART0,
        p.PIN_0,
        p.PIN_1,
        Irqs,
        TX_BUF.init([0u8; 256]),
        RX_BUF.init([0u8; 512]),
        uart_config,
    );

    let reset_reason = if watchdog_reset {
        RESET_WATCHDOG
    } else {
        RESET_POWER_ON
    };
    unwrap!(spawner.spawn(tasks::comms_task(uart, store, reset_reason)));
    info!("Core 0 running comms");
}

fn start_control_core(core1: Peri<'static, CORE1>, hw: ControlPeripherals) {
    spawn_core1(core1, CORE1_STACK.init(Stack::new()), move || {
        let (outputs, sensors, watchdog) = build_control(hw);
        let executor = CORE1_EXECUTOR.init(Executor::new());
        executor.run(|spawner| {
            unwrap!(spawner.spawn(tasks::sensor_task(sensors)));
            unwrap!(spawner.spawn(tasks::control_task(outputs, watchdog)));
            info!("Core 1 running control");
        })
    });
}

/// Drivers for the fitted hardware, per the board profile
fn build_control(hw: ControlPeripherals) -> (Outputs, BoardSensors, BoardWatchdog) {
    let fitted = PROFILE.sensors;

    // A heat exchanger has no brew heater; a single boiler no steam heater
    let brew_ssr = (PROFILE.topology != Topology::HeatExchanger).then(|| {
        let (slice, pin) = hw.brew_ssr;
        Pwm::new_output_a(slice, pin, ssr_config()).split().0
    });
    let steam_ssr = (PROFILE.topology != Topology::SingleBoiler).then(|| {
        let (slice, pin) = hw.steam_ssr;
        Pwm::new_output_a(slice, pin, ssr_config()).split().0
    });
    let outputs = BoardOutputs::new(
        brew_ssr.flatten(),
        steam_ssr.flatten(),
        Output::new(hw.pump, Level::Low),
    );

    let adc: &'static SharedAdc<'static> =
        ADC_SHARED.init(SharedAdc::new(Adc::new_blocking(hw.adc, adc::Config::default())));

    let group = fitted.group_thermocouple.then(|| {
        let mut config = spi::Config::default();
        config.frequency = THERMOCOUPLE_SPI_HZ;
        let bus = Spi::new_blocking_rxonly(hw.spi, hw.spi_clk, hw.spi_miso, config);
        Max31855::new(bus, Output::new(hw.thermocouple_cs, Level::High))
    });

    let sensors = BoardSensors {
        brew: fitted.brew_ntc.then(|| ntc(adc, hw.brew_ntc)),
        steam: fitted.steam_ntc.then(|| ntc(adc, hw.steam_ntc)),
        group,
        pressure: fitted.pressure.then(|| {
            let input = adc.input(adc::Channel::new_pin(hw.pressure, Pull::None));
            PressureTransducer::new(input, PRESSURE_FULL_SCALE_BAR)
        }),
        water: fitted.water_level.then(|| {
            WaterSwitches::new(
                Some(Input::new(hw.reservoir, Pull::Down)),
                Some(Input::new(hw.tank, Pull::Down)),
                (PROFILE.topology != Topology::SingleBoiler)
                    .then(|| Input::new(hw.steam_level, Pull::Down)),
            )
        }),
    };

    (outputs, sensors, hw.watchdog)
}

fn ntc(
    adc: &'static SharedAdc<'static>,
    pin: Peri<'static, impl adc::AdcPin + 'static>,
) -> NtcSensor<AdcInput<'static, 'static>> {
    let input = adc.input(adc::Channel::new_pin(pin, Pull::None));
    NtcSensor::new(input, NtcParams::BOILER_3K3)
}

/// Slow PWM for zero-cross SSRs
fn ssr_config() -> pwm::Config {
    let mut config = pwm::Config::default();
    config.divider = SSR_PWM_DIVIDER.into();
    config.top = SSR_PWM_TOP;
    config
}
