//! Sensor polling
//!
//! Reads every fitted sensor at 20 Hz on core 1 and publishes one
//! [`SensorSample`] for the control cycle to pick up. Temperatures are
//! smoothed over the last few reads; a failed read clears the history so a
//! recovered probe does not average against stale values.

use defmt::*;
use embassy_rp::gpio::{Input, Output};
use embassy_rp::peripherals::SPI0;
use embassy_rp::spi::{Blocking, Spi};
use embassy_time::{Duration, Ticker};

use crema_core::sensors::SensorSample;
use crema_core::traits::{SensorError, TemperatureSensor};
use crema_drivers::sensor::{Max31855, MovingAverage, NtcSensor, PressureTransducer, WaterSwitches};
use crema_hal_rp2040::adc::AdcInput;

use crate::channels::publish_sample;

/// 20 Hz
const SENSOR_PERIOD: Duration = Duration::from_millis(50);

/// Reads averaged per temperature
const SMOOTHING: usize = 4;

type AnalogIn = AdcInput<'static, 'static>;

pub type Thermocouple = Max31855<Spi<'static, SPI0, Blocking>, Output<'static>>;

/// Sensors wired on this board; `None` when the profile leaves one out
pub struct BoardSensors {
    pub brew: Option<NtcSensor<AnalogIn>>,
    pub steam: Option<NtcSensor<AnalogIn>>,
    pub group: Option<Thermocouple>,
    pub pressure: Option<PressureTransducer<AnalogIn>>,
    pub water: Option<WaterSwitches<Input<'static>>>,
}

/// Fault latch so a dead sensor is logged once, not 20 times a second
struct Health {
    label: &'static str,
    faulted: bool,
}

impl Health {
    const fn new(label: &'static str) -> Self {
        Self {
            label,
            faulted: false,
        }
    }

    fn check<T>(&mut self, result: Result<T, SensorError>) -> Option<T> {
        match result {
            Ok(value) => {
                if self.faulted {
                    info!("{} sensor recovered", self.label);
                    self.faulted = false;
                }
                Some(value)
            }
            Err(e) => {
                if !self.faulted {
                    warn!("{} sensor: {:?}", self.label, e);
                    self.faulted = true;
                }
                None
            }
        }
    }
}

struct Smoothed<S> {
    sensor: S,
    average: MovingAverage<SMOOTHING>,
    health: Health,
}

impl<S: TemperatureSensor> Smoothed<S> {
    fn new(sensor: S, label: &'static str) -> Self {
        Self {
            sensor,
            average: MovingAverage::new(),
            health: Health::new(label),
        }
    }

    fn read(&mut self) -> Option<i16> {
        match self.health.check(self.sensor.read_celsius_x10()) {
            Some(x10) => Some(self.average.push(x10 as i32) as i16),
            None => {
                self.average.reset();
                None
            }
        }
    }
}

fn read_temp<S: TemperatureSensor>(input: &mut Option<Smoothed<S>>) -> Option<i16> {
    input.as_mut().and_then(Smoothed::read)
}

#[embassy_executor::task]
pub async fn sensor_task(sensors: BoardSensors) {
    info!("Sensor task started");

    let mut brew = sensors.brew.map(|s| Smoothed::new(s, "Brew NTC"));
    let mut steam = sensors.steam.map(|s| Smoothed::new(s, "Steam NTC"));
    let mut group = sensors.group.map(|s| Smoothed::new(s, "Group thermocouple"));
    let mut pressure = sensors.pressure;
    let mut pressure_health = Health::new("Pressure");
    let mut water = sensors.water;
    let mut water_health = Health::new("Water level");

    let mut ticker = Ticker::every(SENSOR_PERIOD);
    loop {
        ticker.next().await;

        let sample = SensorSample {
            brew_temp_x10: read_temp(&mut brew),
            steam_temp_x10: read_temp(&mut steam),
            group_temp_x10: read_temp(&mut group),
            pressure_x100: pressure
                .as_mut()
                .and_then(|p| pressure_health.check(p.read_x100())),
            water_level: water
                .as_mut()
                .and_then(|w| water_health.check(w.read_percent())),
        };
        publish_sample(sample);
    }
}
