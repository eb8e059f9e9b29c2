//! Log sinks for the binary.
//!
//! The library only talks to the `log` facade; this installs where those
//! records end up: stderr by default, or a file opened in append mode.
use log::{LevelFilter, Log, Metadata, Record};
use parking_lot::Mutex;
use std::{
    fs::{File, OpenOptions},
    io::{self, Write},
    path::Path,
    time::{SystemTime, UNIX_EPOCH},
};

pub enum LogHandler {
    StdErr,
    File(Mutex<File>),
}

impl LogHandler {
    pub fn file<T>(path: T) -> io::Result<Self>
    where
        T: AsRef<Path>,
    {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| {
                eprintln!("Failed to open log file: {}", e);
                e
            })?;

        Ok(Self::File(Mutex::new(file)))
    }

    fn write_line(&self, line: &str) -> io::Result<()> {
        match self {
            Self::StdErr => {
                let stderr = io::stderr();
                let mut handle = stderr.lock();
                handle.write_all(line.as_bytes())
            }
            Self::File(file) => file.lock().write_all(line.as_bytes()),
        }
    }
}

pub struct Logger {
    level: LevelFilter,
    handler: LogHandler,
}

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let line = format!(
            "[{}] [{}] {}: {}\n",
            millis,
            record.level(),
            record.target(),
            record.args()
        );
        if let Err(e) = self.handler.write_line(&line) {
            eprintln!("Failed to write log record: {}", e);
        }
    }

    fn flush(&self) {
        let _ = match &self.handler {
            LogHandler::StdErr => io::stderr().flush(),
            LogHandler::File(file) => file.lock().flush(),
        };
    }
}

pub fn init(level: LevelFilter, handler: LogHandler) -> Result<(), log::SetLoggerError> {
    log::set_boxed_logger(Box::new(Logger { level, handler }))?;
    log::set_max_level(level);
    Ok(())
}
