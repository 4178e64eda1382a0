//! Logging setup: colored, level-coded output on stderr plus a daily
//! rotating file under the configured data directory.

use colored::Colorize;
use fern::colors::{Color, ColoredLevelConfig};
use std::path::Path;

pub fn init_logging(data_dir: &Path, verbose: bool) -> anyhow::Result<()> {
    let level = if verbose { log::LevelFilter::Debug } else { log::LevelFilter::Info };

    let colors = ColoredLevelConfig::new()
        .info(Color::Green)
        .warn(Color::Yellow)
        .error(Color::Red)
        .debug(Color::BrightBlack);

    let stderr = fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!("{} {} {}", record.target().dimmed(), colors.color(record.level()), message))
        })
        .level(level)
        .chain(std::io::stderr());

    std::fs::create_dir_all(data_dir)?;
    let file_appender = tracing_appender::rolling::daily(data_dir, "txdb.log");
    let file_log = fern::Dispatch::new()
        .format(|out, message, record| out.finish(format_args!("[{} {}] {}", record.level(), record.target(), message)))
        .level(level)
        .chain(Box::new(file_appender) as Box<dyn std::io::Write + Send>);

    fern::Dispatch::new().chain(stderr).chain(file_log).apply()?;
    Ok(())
}
