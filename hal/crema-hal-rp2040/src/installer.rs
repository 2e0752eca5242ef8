//! Staging-to-main copy through the boot ROM
//!
//! The only code in the firmware allowed to erase the main region. Once
//! the first main unit is erased no flash-resident code may run, so:
//!
//! - the copy loop lives in `.data` and executes from RAM
//! - flash is driven through boot ROM routines resolved before the copy
//! - the watchdog is fed and the final reset triggered by direct register
//!   writes
//! - core 1 is forced off and interrupts are masked for the duration
//!
//! The loop uses only raw pointer reads and writes, no slices or library
//! calls, so nothing in it can branch back into flash.

use core::ptr::{read_volatile, write_volatile};
use core::sync::atomic::{compiler_fence, Ordering};

use crema_core::bootloader::{BootError, ImageInstaller, InstallPlan};

use crate::flash::LAYOUT;

const XIP_BASE: u32 = 0x1000_0000;

/// Halfword pointers in the boot ROM header
const ROM_FUNC_TABLE: *const u16 = 0x0000_0014 as *const u16;
const ROM_TABLE_LOOKUP: *const u16 = 0x0000_0018 as *const u16;

const WATCHDOG_CTRL: *mut u32 = 0x4005_8000 as *mut u32;
const WATCHDOG_LOAD: *mut u32 = 0x4005_8004 as *mut u32;
const WATCHDOG_TRIGGER: u32 = 1 << 31;
/// One second; the counter ticks twice per microsecond
const WATCHDOG_RELOAD: u32 = 2_000_000;

/// PSM FRCE_OFF through the atomic set alias
const PSM_FRCE_OFF_SET: *mut u32 = 0x4001_2004 as *mut u32;
const PSM_PROC1: u32 = 1 << 16;

const UNIT: usize = 4096;
const SECTOR_ERASE_CMD: u8 = 0x20;

type VoidFn = unsafe extern "C" fn();
type EraseFn = unsafe extern "C" fn(addr: u32, count: usize, block_size: u32, block_cmd: u8);
type ProgramFn = unsafe extern "C" fn(addr: u32, data: *const u8, count: usize);
type LookupFn = unsafe extern "C" fn(table: *const u16, code: u32) -> *const ();

/// Boot ROM flash routines
#[derive(Clone, Copy)]
#[repr(C)]
struct RomFlash {
    connect_internal_flash: VoidFn,
    flash_exit_xip: VoidFn,
    flash_range_erase: EraseFn,
    flash_range_program: ProgramFn,
    flash_flush_cache: VoidFn,
    flash_enter_cmd_xip: VoidFn,
}

fn rom_func(code: [u8; 2]) -> Option<*const ()> {
    // SAFETY: the ROM header is always mapped and holds halfword pointers
    // to the lookup routine and the function table.
    unsafe {
        let lookup = read_volatile(ROM_TABLE_LOOKUP) as usize as *const ();
        let table = read_volatile(ROM_FUNC_TABLE) as usize as *const u16;
        let lookup: LookupFn = core::mem::transmute(lookup);
        let f = lookup(table, u16::from_le_bytes(code) as u32);
        (!f.is_null()).then_some(f)
    }
}

impl RomFlash {
    fn resolve() -> Option<Self> {
        // SAFETY: each code names a ROM routine with the matching signature.
        unsafe {
            Some(Self {
                connect_internal_flash: core::mem::transmute::<*const (), VoidFn>(rom_func(*b"IF")?),
                flash_exit_xip: core::mem::transmute::<*const (), VoidFn>(rom_func(*b"EX")?),
                flash_range_erase: core::mem::transmute::<*const (), EraseFn>(rom_func(*b"RE")?),
                flash_range_program: core::mem::transmute::<*const (), ProgramFn>(rom_func(*b"RP")?),
                flash_flush_cache: core::mem::transmute::<*const (), VoidFn>(rom_func(*b"FC")?),
                flash_enter_cmd_xip: core::mem::transmute::<*const (), VoidFn>(rom_func(*b"CX")?),
            })
        }
    }
}

/// RAM buffer for one erase unit of the image
static mut UNIT_BUF: [u8; UNIT] = [0; UNIT];

/// Copy `units` erase units from staging to main, then reset
///
/// # Safety
///
/// Core 1 must be stopped and interrupts masked. Nothing may execute from
/// flash after this is entered.
#[link_section = ".data.ram_func"]
#[inline(never)]
unsafe extern "C" fn copy_and_reset(
    rom: *const RomFlash,
    source: u32,
    dest: u32,
    units: u32,
    buf: *mut u8,
) -> ! {
    let rom = read_volatile(rom);
    let mut unit = 0;
    while unit < units {
        let offset = unit * UNIT as u32;

        // XIP still up: pull the staged unit into RAM
        let src = (XIP_BASE + source + offset) as usize;
        let mut i = 0;
        while i < UNIT {
            let byte = read_volatile((src + i) as *const u8);
            write_volatile((buf as usize + i) as *mut u8, byte);
            i += 1;
        }
        compiler_fence(Ordering::SeqCst);

        (rom.connect_internal_flash)();
        (rom.flash_exit_xip)();
        (rom.flash_range_erase)(dest + offset, UNIT, UNIT as u32, SECTOR_ERASE_CMD);
        (rom.flash_range_program)(dest + offset, buf, UNIT);
        (rom.flash_flush_cache)();
        (rom.flash_enter_cmd_xip)();

        write_volatile(WATCHDOG_LOAD, WATCHDOG_RELOAD);
        unit += 1;
    }

    write_volatile(WATCHDOG_CTRL, WATCHDOG_TRIGGER);
    loop {
        compiler_fence(Ordering::SeqCst);
    }
}

/// Installs through the boot ROM and resets into the new image
pub struct RomInstaller;

impl ImageInstaller for RomInstaller {
    fn install(&mut self, plan: &InstallPlan) -> Result<(), BootError> {
        if plan.source != LAYOUT.staging.start
            || plan.dest != LAYOUT.main.start
            || plan.erase_size as usize != UNIT
            || plan.len == 0
            || plan.len > LAYOUT.staging_capacity()
        {
            return Err(BootError::InvalidSize);
        }
        let rom = RomFlash::resolve().ok_or(BootError::RomLookup)?;

        // SAFETY: from here on only RAM-resident code runs. Core 1 is held
        // off by the PSM and this core cannot be interrupted.
        unsafe {
            write_volatile(PSM_FRCE_OFF_SET, PSM_PROC1);
            cortex_m::interrupt::disable();
            let buf = core::ptr::addr_of_mut!(UNIT_BUF) as *mut u8;
            copy_and_reset(&rom, plan.source, plan.dest, plan.units(), buf)
        }
    }
}
