use std::io::Write;

use env_logger::Env;
use log::Level;

/// Initialise the logger for one of the command-line tools.
///
/// Messages go to stderr as `[<program> Status] :: message`, with `Warning`,
/// `Error` and `Debug` in place of `Status` for the other levels. The default
/// filter is `info`; `RUST_LOG` overrides it.
pub fn init_logger(program: &'static str) {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format(move |buf, record| {
            writeln!(
                buf,
                "[{} {}] :: {}",
                program,
                level_label(record.level()),
                record.args()
            )
        })
        .target(env_logger::Target::Stderr)
        .init();
}

fn level_label(level: Level) -> &'static str {
    match level {
        Level::Error => "Error",
        Level::Warn => "Warning",
        Level::Info => "Status",
        Level::Debug | Level::Trace => "Debug",
    }
}
