// Simple command-line kernel monitor, useful for controlling the
// kernel and exploring the system interactively. Entered from the
// breakpoint trap (returning resumes the interrupted environment) and
// from the scheduler when nothing is runnable.

use crate::constants::KERN_BASE;
use crate::trap::Trapframe;
use crate::{console, tsc, x86};

const CMDBUF_SIZE: usize = 80; // enough for one VGA text line
const MAXARGS: usize = 16;

struct Command {
    name: &'static str,
    desc: &'static str,
    // Returning -1 forces the monitor to exit.
    func: fn(&[&str], Option<&Trapframe>) -> i32,
}

static COMMANDS: &[Command] = &[
    Command {
        name: "help",
        desc: "Display this list of commands",
        func: mon_help,
    },
    Command {
        name: "kerninfo",
        desc: "Display information about the kernel",
        func: mon_kerninfo,
    },
    Command {
        name: "42",
        desc: "But what was the question?",
        func: mon_42,
    },
    Command {
        name: "backtrace",
        desc: "Stack backtrace",
        func: mon_backtrace,
    },
    Command {
        name: "timer_start",
        desc: "Start timer",
        func: mon_timer_start,
    },
    Command {
        name: "timer_stop",
        desc: "Stop timer",
        func: mon_timer_stop,
    },
];

fn mon_help(_argv: &[&str], _tf: Option<&Trapframe>) -> i32 {
    for cmd in COMMANDS {
        crate::println!("{} - {}", cmd.name, cmd.desc);
    }
    0
}

fn mon_kerninfo(_argv: &[&str], _tf: Option<&Trapframe>) -> i32 {
    extern "C" {
        static entry: u8;
        static etext: u8;
        static edata: u8;
        static end: u8;
    }

    unsafe {
        let entry = &entry as *const _ as u32;
        let etext = &etext as *const _ as u32;
        let edata = &edata as *const _ as u32;
        let end = &end as *const _ as u32;

        crate::println!("Special kernel symbols:");
        crate::println!("  entry  {:08x} (virt)  {:08x} (phys)", entry, entry - KERN_BASE);
        crate::println!("  etext  {:08x} (virt)  {:08x} (phys)", etext, etext - KERN_BASE);
        crate::println!("  edata  {:08x} (virt)  {:08x} (phys)", edata, edata - KERN_BASE);
        crate::println!("  end    {:08x} (virt)  {:08x} (phys)", end, end - KERN_BASE);
        crate::println!(
            "Kernel executable memory footprint: {}KB",
            (end - entry + 1023) / 1024
        );
    }
    0
}

fn mon_42(_argv: &[&str], _tf: Option<&Trapframe>) -> i32 {
    crate::println!("Life, Universe and everything");
    0
}

/// Walk the saved-ebp chain. Symbolization is deliberately absent; the
/// raw eip/argument words are what this kernel prints.
fn mon_backtrace(_argv: &[&str], _tf: Option<&Trapframe>) -> i32 {
    let mut ebp = x86::read_ebp();

    crate::print!("Stack backtrace:");
    while ebp != 0 {
        unsafe {
            let frame = ebp as *const u32;
            let eip = *frame.add(1);

            crate::print!("\n  ebp {:08x}  eip {:08x}  args", ebp, eip);
            for arg in 0..5 {
                crate::print!(" {:08x}", *frame.add(2 + arg));
            }

            // The first word of a frame is the previous frame's ebp;
            // entry.S zeroes the outermost one.
            ebp = *frame;
        }
    }
    crate::println!();
    0
}

fn mon_timer_start(_argv: &[&str], _tf: Option<&Trapframe>) -> i32 {
    tsc::timer_start();
    0
}

fn mon_timer_stop(_argv: &[&str], _tf: Option<&Trapframe>) -> i32 {
    tsc::timer_stop();
    0
}

fn runcmd(buf: &str, tf: Option<&Trapframe>) -> i32 {
    let mut argv = [""; MAXARGS];
    let mut argc = 0;

    for word in buf.split_ascii_whitespace() {
        if argc == MAXARGS - 1 {
            crate::println!("Too many arguments (max {})", MAXARGS);
            return 0;
        }
        argv[argc] = word;
        argc += 1;
    }

    if argc == 0 {
        return 0;
    }

    for cmd in COMMANDS {
        if cmd.name == argv[0] {
            return (cmd.func)(&argv[..argc], tf);
        }
    }
    crate::println!("Unknown command '{}'", argv[0]);
    0
}

pub(crate) fn monitor(tf: Option<&Trapframe>) {
    crate::println!("Welcome to the exos kernel monitor!");
    crate::println!("Type 'help' for a list of commands.");

    let mut buf = [0u8; CMDBUF_SIZE];
    loop {
        let line = console::readline("K> ", &mut buf);
        if runcmd(line, tf) < 0 {
            break;
        }
    }
}
