//! Build script for crema-firmware
//!
//! - Sets up linker search paths for memory.x
//! - Validates machine.toml and turns it into the board profile constant

use std::env;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Highest setpoints the control engine accepts, in °C
const BREW_SETPOINT_MAX_C: f64 = 125.0;
const STEAM_SETPOINT_MAX_C: f64 = 160.0;

const HEATER_WATTS_MAX: i64 = 3000;

const TOPOLOGIES: [&str; 3] = ["dual_boiler", "single_boiler", "heat_exchanger"];

fn main() {
    setup_linker();
    let profile = load_profile();
    write_profile(&profile);
}

/// Set up linker search paths for memory.x
fn setup_linker() {
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());

    let memory_x = include_bytes!("memory.x");
    let mut f = File::create(out_dir.join("memory.x")).unwrap();
    f.write_all(memory_x).unwrap();

    println!("cargo:rustc-link-search={}", out_dir.display());
    println!("cargo:rerun-if-changed=memory.x");
    println!("cargo:rerun-if-changed=build.rs");
}

/// Validated contents of machine.toml
struct Profile {
    name: String,
    topology: &'static str,
    brew_watts: u16,
    steam_watts: u16,
    brew_ntc: bool,
    steam_ntc: bool,
    group_thermocouple: bool,
    pressure: bool,
    water_level: bool,
    brew_x10: i16,
    steam_x10: i16,
}

fn load_profile() -> Profile {
    println!("cargo:rerun-if-changed=machine.toml");

    let path = Path::new("machine.toml");
    if !path.exists() {
        fail(
            "machine.toml not found",
            &[
                "The firmware is built for one machine described in".to_string(),
                "crema-firmware/machine.toml. Create it before building.".to_string(),
            ],
        );
    }

    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => fail("Failed to read machine.toml", &[e.to_string()]),
    };

    let config: toml::Value = match toml::from_str(&content) {
        Ok(value) => value,
        Err(e) => fail(
            "Invalid TOML syntax in machine.toml",
            &e.to_string().lines().map(str::to_string).collect::<Vec<_>>(),
        ),
    };

    let mut errors = Vec::new();
    let profile = parse_profile(&config, &mut errors);
    if !errors.is_empty() {
        fail("Invalid machine.toml", &errors);
    }

    println!(
        "cargo:warning=machine.toml validated: {} ({})",
        profile.name, profile.topology
    );
    profile
}

fn parse_profile(config: &toml::Value, errors: &mut Vec<String>) -> Profile {
    for section in ["machine", "heaters", "sensors", "setpoints"] {
        if config.get(section).and_then(|s| s.as_table()).is_none() {
            errors.push(format!("Missing [{}] section", section));
        }
    }

    let name = string(config, "machine", "name", errors).unwrap_or_default();
    if name.is_empty() || name.len() > 32 {
        errors.push("[machine] name must be 1-32 characters".to_string());
    }

    let topology = match string(config, "machine", "topology", errors) {
        Some(t) => match TOPOLOGIES.iter().find(|&&known| known == t) {
            Some(known) => *known,
            None => {
                errors.push(format!(
                    "[machine] topology '{}' must be one of {}",
                    t,
                    TOPOLOGIES.join(", ")
                ));
                TOPOLOGIES[0]
            }
        },
        None => TOPOLOGIES[0],
    };

    let brew_watts = watts(config, "brew_watts", errors);
    let steam_watts = watts(config, "steam_watts", errors);

    let brew_ntc = flag(config, "brew_ntc", errors);
    let steam_ntc = flag(config, "steam_ntc", errors);
    let group_thermocouple = flag(config, "group_thermocouple", errors);
    let pressure = flag(config, "pressure", errors);
    let water_level = flag(config, "water_level", errors);

    match topology {
        "dual_boiler" => {
            if brew_watts == 0 || steam_watts == 0 {
                errors.push("dual_boiler needs both brew_watts and steam_watts".to_string());
            }
            if !brew_ntc || !steam_ntc {
                errors.push("dual_boiler needs both brew_ntc and steam_ntc".to_string());
            }
        }
        "single_boiler" => {
            if brew_watts == 0 {
                errors.push("single_boiler needs brew_watts".to_string());
            }
            if steam_watts != 0 {
                errors.push("single_boiler has no steam heater; set steam_watts = 0".to_string());
            }
            if !brew_ntc {
                errors.push("single_boiler needs brew_ntc".to_string());
            }
        }
        _ => {
            if steam_watts == 0 {
                errors.push("heat_exchanger needs steam_watts".to_string());
            }
            if !steam_ntc && !group_thermocouple {
                errors.push("heat_exchanger needs steam_ntc or group_thermocouple".to_string());
            }
        }
    }

    let brew_x10 = setpoint(config, "brew_c", BREW_SETPOINT_MAX_C, errors);
    let steam_x10 = setpoint(config, "steam_c", STEAM_SETPOINT_MAX_C, errors);

    Profile {
        name,
        topology,
        brew_watts,
        steam_watts,
        brew_ntc,
        steam_ntc,
        group_thermocouple,
        pressure,
        water_level,
        brew_x10,
        steam_x10,
    }
}

fn string(
    config: &toml::Value,
    section: &str,
    key: &str,
    errors: &mut Vec<String>,
) -> Option<String> {
    match config.get(section).and_then(|s| s.get(key)) {
        Some(toml::Value::String(s)) => Some(s.clone()),
        Some(_) => {
            errors.push(format!("[{}] {} must be a string", section, key));
            None
        }
        None => {
            errors.push(format!("[{}] missing '{}'", section, key));
            None
        }
    }
}

fn watts(config: &toml::Value, key: &str, errors: &mut Vec<String>) -> u16 {
    match config.get("heaters").and_then(|s| s.get(key)) {
        Some(toml::Value::Integer(w)) if (0..=HEATER_WATTS_MAX).contains(w) => *w as u16,
        Some(toml::Value::Integer(_)) => {
            errors.push(format!("[heaters] {} must be 0-{}", key, HEATER_WATTS_MAX));
            0
        }
        Some(_) => {
            errors.push(format!("[heaters] {} must be an integer", key));
            0
        }
        None => {
            errors.push(format!("[heaters] missing '{}'", key));
            0
        }
    }
}

/// Absent sensors default to not fitted
fn flag(config: &toml::Value, key: &str, errors: &mut Vec<String>) -> bool {
    match config.get("sensors").and_then(|s| s.get(key)) {
        Some(toml::Value::Boolean(b)) => *b,
        Some(_) => {
            errors.push(format!("[sensors] {} must be true or false", key));
            false
        }
        None => false,
    }
}

fn setpoint(config: &toml::Value, key: &str, max: f64, errors: &mut Vec<String>) -> i16 {
    let value = match config.get("setpoints").and_then(|s| s.get(key)) {
        Some(toml::Value::Float(f)) => *f,
        Some(toml::Value::Integer(i)) => *i as f64,
        Some(_) => {
            errors.push(format!("[setpoints] {} must be a number", key));
            return 0;
        }
        None => {
            errors.push(format!("[setpoints] missing '{}'", key));
            return 0;
        }
    };
    if !(0.0..=max).contains(&value) {
        errors.push(format!("[setpoints] {} must be 0-{}", key, max));
        return 0;
    }
    (value * 10.0).round() as i16
}

/// Emit `profile.rs` for `include!` in the firmware
fn write_profile(p: &Profile) {
    let topology = match p.topology {
        "dual_boiler" => "DualBoiler",
        "single_boiler" => "SingleBoiler",
        _ => "HeatExchanger",
    };
    let version: Vec<u8> = ["CARGO_PKG_VERSION_MAJOR", "CARGO_PKG_VERSION_MINOR", "CARGO_PKG_VERSION_PATCH"]
        .iter()
        .map(|var| env::var(var).ok().and_then(|v| v.parse().ok()).unwrap_or(0))
        .collect();

    let source = format!(
        "/// Board profile generated from machine.toml\n\
         pub const PROFILE: MachineProfile = MachineProfile {{\n    \
             name: {name:?},\n    \
             topology: Topology::{topology},\n    \
             heaters: HeaterRatings {{ brew_watts: {brew_watts}, steam_watts: {steam_watts} }},\n    \
             sensors: SensorFit {{\n        \
                 brew_ntc: {brew_ntc},\n        \
                 steam_ntc: {steam_ntc},\n        \
                 group_thermocouple: {group},\n        \
                 pressure: {pressure},\n        \
                 water_level: {water},\n    \
             }},\n    \
             default_brew_x10: {brew_x10},\n    \
             default_steam_x10: {steam_x10},\n\
         }};\n\n\
         /// Reported in BOOT\n\
         pub const FIRMWARE_VERSION: [u8; 3] = [{major}, {minor}, {patch}];\n",
        name = p.name,
        topology = topology,
        brew_watts = p.brew_watts,
        steam_watts = p.steam_watts,
        brew_ntc = p.brew_ntc,
        steam_ntc = p.steam_ntc,
        group = p.group_thermocouple,
        pressure = p.pressure,
        water = p.water_level,
        brew_x10 = p.brew_x10,
        steam_x10 = p.steam_x10,
        major = version[0],
        minor = version[1],
        patch = version[2],
    );

    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    fs::write(out_dir.join("profile.rs"), source).unwrap();
}

/// Abort the build with a boxed message
fn fail(title: &str, lines: &[String]) -> ! {
    let body = lines
        .iter()
        .map(|line| {
            let line = if line.len() > 62 {
                format!("{}...", &line[..59])
            } else {
                line.clone()
            };
            format!("║  • {:<62} ║", line)
        })
        .collect::<Vec<_>>()
        .join("\n");
    panic!(
        "\n\
        ╔══════════════════════════════════════════════════════════════════╗\n\
        ║  ERROR: {:<56} ║\n\
        ╠══════════════════════════════════════════════════════════════════╣\n\
        {}\n\
        ╚══════════════════════════════════════════════════════════════════╝\n",
        title, body
    );
}
