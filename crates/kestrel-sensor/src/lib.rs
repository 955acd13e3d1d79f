//! Serial bridge for the ranging sensor.
//!
//! The sensor streams readings as text lines at 115200-8N1. Readings repeat
//! while the range is stable, so consecutive duplicates are suppressed before
//! anything is reported.

use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio_serial::{DataBits, Parity, SerialStream, StopBits};
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info};

pub const DEFAULT_BAUD: u32 = 115_200;
const READ_TIMEOUT: Duration = Duration::from_secs(1);

pub struct RangeSensor {
    reader: BufReader<SerialStream>,
    line: String,
}

impl RangeSensor {
    pub fn open(dev: &str, baud: u32) -> Result<Self> {
        let port = tokio_serial::new(dev, baud)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .open_native_async()
            .with_context(|| format!("open sensor serial {dev}"))?;
        Ok(Self { reader: BufReader::new(port), line: String::new() })
    }

    /// Next line from the sensor, `None` when nothing arrives within the
    /// read timeout or the port reports EOF.
    pub async fn read_line(&mut self) -> Result<Option<String>> {
        next_line(&mut self.reader, &mut self.line, READ_TIMEOUT).await
    }
}

async fn next_line<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    buf: &mut String,
    timeout: Duration,
) -> Result<Option<String>> {
    buf.clear();
    match tokio::time::timeout(timeout, reader.read_line(buf)).await {
        Ok(Ok(0)) => Ok(None),
        Ok(Ok(_)) => Ok(Some(buf.trim_end().to_string())),
        Ok(Err(err)) => Err(err).context("read ranging sensor"),
        Err(_) => Ok(None),
    }
}

/// Passes a value through only when it differs from the previous one.
#[derive(Debug, Default)]
pub struct Deduper {
    last: Option<String>,
}

impl Deduper {
    pub fn accept(&mut self, line: String) -> Option<&str> {
        if self.last.as_deref() == Some(line.as_str()) {
            return None;
        }
        self.last = Some(line);
        self.last.as_deref()
    }
}

/// Read the sensor forever, logging each fresh reading.
pub async fn run(dev: &str, baud: u32) -> Result<()> {
    let mut sensor = RangeSensor::open(dev, baud)?;
    info!(dev, baud, "reading ranging sensor");
    let mut dedupe = Deduper::default();
    loop {
        match sensor.read_line().await? {
            Some(line) if !line.is_empty() => {
                if let Some(reading) = dedupe.accept(line) {
                    info!(range = reading, "sensor reading");
                }
            }
            Some(_) => {}
            None => debug!("no sensor data within read timeout"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[test]
    fn duplicates_are_suppressed() {
        let mut dedupe = Deduper::default();
        assert_eq!(dedupe.accept("1.20 m".into()), Some("1.20 m"));
        assert_eq!(dedupe.accept("1.20 m".into()), None);
        assert_eq!(dedupe.accept("1.21 m".into()), Some("1.21 m"));
        assert_eq!(dedupe.accept("1.20 m".into()), Some("1.20 m"));
    }

    #[tokio::test]
    async fn lines_are_trimmed() {
        let (mut tx, rx) = tokio::io::duplex(64);
        tx.write_all(b"0.87 m\r\n").await.unwrap();
        let mut reader = BufReader::new(rx);
        let mut buf = String::new();
        let line = next_line(&mut reader, &mut buf, Duration::from_secs(1)).await.unwrap();
        assert_eq!(line.as_deref(), Some("0.87 m"));
    }

    #[tokio::test(start_paused = true)]
    async fn silence_times_out_to_none() {
        let (_tx, rx) = tokio::io::duplex(64);
        let mut reader = BufReader::new(rx);
        let mut buf = String::new();
        let line = next_line(&mut reader, &mut buf, Duration::from_secs(1)).await.unwrap();
        assert_eq!(line, None);
    }
}
