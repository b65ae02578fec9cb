//! # RTT Logger
//!
//! `log` backend for the firmware. Records go to an RTT up-channel that a
//! debug probe drains; nothing is written until `init` has run.

use core::cell::RefCell;
use core::fmt::Write;

use critical_section::Mutex;

static LOG_CHANNEL: Mutex<RefCell<Option<rtt_target::UpChannel>>> = Mutex::new(RefCell::new(None));

struct Logger;

impl log::Log for Logger {
    fn enabled(&self, _: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        critical_section::with(|cs| {
            let mut log_channel = LOG_CHANNEL.borrow_ref_mut(cs);
            if let Some(channel) = &mut *log_channel {
                // A full channel drops the record; there's nowhere to report it
                let _ = writeln!(
                    channel,
                    "[{:5} {}] {}",
                    record.level(),
                    record.target(),
                    record.args()
                );
            }
        });
    }

    fn flush(&self) {}
}

/// Route `log` records to `channel` at up to `level`.
pub fn init(channel: rtt_target::UpChannel, level: log::LevelFilter) {
    critical_section::with(|cs| {
        *LOG_CHANNEL.borrow_ref_mut(cs) = Some(channel);
    });
    // Don't call `unwrap` to reduce the code size
    let _ = log::set_logger(&Logger);
    log::set_max_level(level);
}
