// MC146818 CMOS/RTC access. The RTC drives the periodic clock
// interrupt (IRQ_CLOCK); the NVRAM registers report the memory size at
// boot.
// ref. https://wiki.osdev.org/CMOS

use crate::x86;

const IO_RTC_CMND: u16 = 0x70;
const IO_RTC_DATA: u16 = 0x71;

// Setting bit 7 of the command port masks NMI while the register is
// selected.
const CMND_NMI_DISABLE: u8 = 0x80;

// RTC register B: enable periodic interrupts.
const RTC_PIE: u8 = 0x40;

// Start of NVRAM: offset 14
const MC_NVRAM_START: u8 = 0xe;

// base memory size
pub(crate) const NVRAM_BASELO: u8 = MC_NVRAM_START + 7;

// extended memory size (between 1MB and 16MB)
pub(crate) const NVRAM_EXTLO: u8 = MC_NVRAM_START + 9;

// extended memory size (between 16MB and 4GB)
pub(crate) const NVRAM_EXT16LO: u8 = MC_NVRAM_START + 38;

// Stupid I/O delay routine necessitated by historical PC design flaws
fn delay() {
    x86::inb(0x84);
    x86::inb(0x84);
    x86::inb(0x84);
    x86::inb(0x84);
}

fn read_cmos(reg: u8) -> u8 {
    x86::outb(IO_RTC_CMND, reg);
    delay();
    x86::inb(IO_RTC_DATA)
}

fn write_cmos(reg: u8, data: u8) {
    x86::outb(IO_RTC_CMND, reg);
    delay();
    x86::outb(IO_RTC_DATA, data);
}

fn nmi_disable() {
    x86::outb(IO_RTC_CMND, CMND_NMI_DISABLE);
}

fn nmi_enable() {
    x86::outb(IO_RTC_CMND, 0);
}

/// Program the RTC for periodic interrupts at rate divider 15 (2Hz).
pub(crate) fn rtc_init() {
    let divider: u8 = 15;

    nmi_disable();
    write_cmos(0x8b, read_cmos(0x8b) | RTC_PIE);
    write_cmos(0x8a, (read_cmos(0x8a) & 0xf0) | divider);
    nmi_enable();
}

/// Acknowledge an RTC interrupt by reading status register C; the RTC
/// raises no further interrupts until this is done.
pub(crate) fn rtc_check_status() -> u8 {
    read_cmos(0x8c)
}

/// Read an NVRAM register.
pub(crate) fn mc146818_read(reg: u8) -> u8 {
    x86::outb(IO_RTC_CMND, reg);
    x86::inb(IO_RTC_DATA)
}
