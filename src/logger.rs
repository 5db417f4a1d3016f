//! Ambient logging init. The core only needs a place for `log::warn!`/`log::error!`
//! call sites (buffer pool evictions, bundle rewrites, sort spills) to land; provisioning
//! rolling files, multiple appenders, or per-database log directories is a deployment
//! concern and stays out of this crate.

use log::LevelFilter;
use log4rs::append::console::ConsoleAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;

/// Installs a single stdout appender at the given level. Safe to call more than once;
/// subsequent calls are no-ops if a logger is already installed.
pub fn init(level: LevelFilter) -> Result<(), Box<dyn std::error::Error>> {
    let encoder = Box::new(PatternEncoder::new("{d(%Y-%m-%d %H:%M:%S%.3f)} [{l}] {t} - {m}{n}"));
    let console = ConsoleAppender::builder().encoder(encoder).build();
    let config = Config::builder()
        .appender(Appender::builder().build("console", Box::new(console)))
        .build(Root::builder().appender("console").build(level))?;
    match log4rs::init_config(config) {
        Ok(_) => Ok(()),
        Err(_already_initialized) => Ok(()),
    }
}
