//! Blocking line sources

use std::io::{self, BufRead, BufReader};
use std::time::Duration;

use serialport::SerialPort;
use tracing::debug;

use crate::config::SerialConfig;

/// A byte stream split into newline-terminated lines
///
/// Reads block at most for the source's own timeout. On timeout the bytes
/// received so far are returned, possibly none.
pub trait LineSource: Send {
    fn read_line(&mut self) -> io::Result<Vec<u8>>;
}

/// Line source over any buffered reader
pub struct BufLineSource<R> {
    reader: R,
}

impl<R: BufRead + Send> BufLineSource<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }
}

impl<R: BufRead + Send> LineSource for BufLineSource<R> {
    fn read_line(&mut self) -> io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        match self.reader.read_until(b'\n', &mut buf) {
            Ok(_) => Ok(buf),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(buf),
            Err(e) => Err(e),
        }
    }
}

pub type SerialLineSource = BufLineSource<BufReader<Box<dyn SerialPort>>>;

/// Open the configured serial device as a line source.
pub fn open_serial(config: &SerialConfig) -> serialport::Result<SerialLineSource> {
    debug!(
        "opening serial port {} at {} baud",
        config.port, config.baudrate
    );

    let port = serialport::new(&config.port, config.baudrate)
        .timeout(Duration::from_secs(config.timeout_secs))
        .open()?;

    Ok(BufLineSource::new(BufReader::new(port)))
}
