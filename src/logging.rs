// Backend for the `log` facade: everything goes to the console with a
// level tag. The level is chosen at build time through the LOG
// environment variable. Messages whose exact wording matters (trap
// frame dumps, env lifecycle lines) print directly instead.

use log::{Level, LevelFilter, Log, Metadata, Record};

struct KernLogger;

static LOGGER: KernLogger = KernLogger;

pub fn init() {
    log::set_logger(&LOGGER).expect("logger already installed");
    log::set_max_level(match option_env!("LOG") {
        Some("ERROR") => LevelFilter::Error,
        Some("WARN") => LevelFilter::Warn,
        Some("DEBUG") => LevelFilter::Debug,
        Some("TRACE") => LevelFilter::Trace,
        Some("OFF") => LevelFilter::Off,
        _ => LevelFilter::Info,
    });
}

impl Log for KernLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let tag = match record.level() {
            Level::Error => "ERROR",
            Level::Warn => " WARN",
            Level::Info => " INFO",
            Level::Debug => "DEBUG",
            Level::Trace => "TRACE",
        };
        crate::println!("[{}] {}", tag, record.args());
    }

    fn flush(&self) {}
}
