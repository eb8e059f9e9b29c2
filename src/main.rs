mod cli;
mod conf;
mod logging;
mod runner;

use crate::cli::Cli;
use crate::conf::{Config, Source};
use crate::logging::LogHandler;
use crate::runner::{Watch, Watched};
use clap::Parser;
use evpoll::{AsPoller, Poller};
use log::{info, LevelFilter};
use std::error::Error;
use std::fs::File;
use std::os::fd::AsRawFd;
use std::sync::Arc;

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    let level = match cli.log_level {
        Some(level) => level,
        None => config.log_level.parse::<LevelFilter>()?,
    };
    let handler = match &config.log_file {
        Some(path) => LogHandler::file(path)?,
        None => LogHandler::StdErr,
    };
    logging::init(level, handler)?;

    let backend = cli.backend.unwrap_or(config.backend);
    let iterations = cli.iterations.unwrap_or(config.iterations);

    let watch = Arc::new(Watch::new(config.max_priority, config.timeout_ms, cli.json));
    let poller = Poller::new(backend, watch.clone())?;
    info!("using the {} backend", poller.kind());

    // keep opened files alive for as long as they are registered
    let mut files = Vec::new();
    for (index, conf) in config.watch.iter().enumerate() {
        let events = conf.conditions(index)?;
        let (fd, name) = match conf.source(index)? {
            Source::Path(path) => {
                let file = File::open(&path)?;
                let fd = file.as_raw_fd();
                files.push(file);
                (fd, path.display().to_string())
            }
            Source::Fd(fd) => (fd, format!("fd:{}", fd)),
        };

        watch.insert(
            fd,
            Watched {
                name,
                priority: conf.priority,
            },
        );
        poller.add_fd(fd, events, conf.priority)?;
    }

    let passes = runner::run(&poller, &watch, iterations)?;
    info!("finished after {} passes", passes);

    for fd in watch.fds() {
        poller.remove_fd(fd)?;
    }

    Ok(())
}
