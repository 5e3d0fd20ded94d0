// src/link.rs
//! Serial link supervision
//!
//! [`LinkSupervisor`] keeps a line-oriented connection to the receiver open
//! for as long as the process runs. Open failures and read errors drop the
//! connection, wait a fixed backoff and reopen; silence within the per-read
//! timeout is reported to the caller and is not a failure.

use crate::{
    error::{GpsError, Result},
    gps::{LinkStatus, SharedFix},
};
use std::{future::Future, io, time::Duration};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{debug, info, warn};

/// One step of the line stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEvent {
    /// A complete line, without its terminator
    Line(String),
    /// Nothing arrived within the read timeout
    Silence,
}

/// An open connection that yields lines
pub trait LineReader: Send {
    fn read_line(&mut self) -> impl Future<Output = Result<LineEvent>> + Send;
}

/// Something that can be (re)opened into a [`LineReader`]
pub trait SerialLink: Send + Sync {
    type Reader: LineReader;

    fn open(&self) -> impl Future<Output = Result<Self::Reader>> + Send;

    /// Human readable name for log output
    fn describe(&self) -> String;
}

/// A serial port opened through tokio-serial
#[derive(Debug, Clone)]
pub struct SerialDevice {
    port: String,
    baudrate: u32,
    read_timeout: Duration,
}

impl SerialDevice {
    pub fn new(port: impl Into<String>, baudrate: u32, read_timeout: Duration) -> Self {
        Self {
            port: port.into(),
            baudrate,
            read_timeout,
        }
    }
}

impl SerialLink for SerialDevice {
    type Reader = SerialReader;

    async fn open(&self) -> Result<SerialReader> {
        let stream = tokio_serial::new(&self.port, self.baudrate)
            .timeout(self.read_timeout)
            .open_native_async()?;

        Ok(SerialReader {
            reader: BufReader::new(stream),
            pending: Vec::new(),
            read_timeout: self.read_timeout,
        })
    }

    fn describe(&self) -> String {
        format!("{} at {} baud", self.port, self.baudrate)
    }
}

pub struct SerialReader {
    reader: BufReader<SerialStream>,
    // Bytes of a line still being received when a read timed out
    pending: Vec<u8>,
    read_timeout: Duration,
}

impl LineReader for SerialReader {
    async fn read_line(&mut self) -> Result<LineEvent> {
        let read = self.reader.read_until(b'\n', &mut self.pending);

        let result = tokio::time::timeout(self.read_timeout, read).await;
        match result {
            Err(_) => Ok(LineEvent::Silence),
            Ok(Ok(0)) => Err(GpsError::Link("serial device closed the stream".to_string())),
            Ok(Ok(_)) => {
                let line = String::from_utf8_lossy(&self.pending).trim().to_string();
                self.pending.clear();
                Ok(LineEvent::Line(line))
            }
            Ok(Err(e)) if e.kind() == io::ErrorKind::TimedOut => Ok(LineEvent::Silence),
            Ok(Err(e)) => Err(GpsError::Io(e)),
        }
    }
}

/// List the names of the serial ports present on this machine
pub fn list_serial_ports() -> Result<Vec<String>> {
    let ports = tokio_serial::available_ports()?;
    Ok(ports.into_iter().map(|port| port.port_name).collect())
}

/// Owns the connection lifecycle and is the only writer of
/// [`Fix::status`](crate::gps::Fix::status).
///
/// State moves `NotConnected -> Connected -> {FailedConnect, Exception} ->
/// Connected -> ...` and never terminates.
pub struct LinkSupervisor<L: SerialLink> {
    link: L,
    fix: SharedFix,
    backoff: Duration,
    max_silent_reads: Option<u32>,
    reader: Option<L::Reader>,
    silent_reads: u32,
}

impl<L: SerialLink> LinkSupervisor<L> {
    pub fn new(link: L, fix: SharedFix, backoff: Duration) -> Self {
        Self {
            link,
            fix,
            backoff,
            max_silent_reads: None,
            reader: None,
            silent_reads: 0,
        }
    }

    /// Treat this many consecutive silent reads as a dead link.
    pub fn with_max_silent_reads(mut self, limit: Option<u32>) -> Self {
        self.max_silent_reads = limit;
        self
    }

    pub fn is_connected(&self) -> bool {
        self.reader.is_some()
    }

    /// Wait for the next line, reconnecting as often as it takes.
    ///
    /// Returns [`LineEvent::Silence`] when a read times out so the caller
    /// keeps control between lines.
    pub async fn next_line(&mut self) -> LineEvent {
        loop {
            if self.reader.is_none() {
                let reader = self.connect().await;
                self.reader = Some(reader);
            }
            let Some(reader) = self.reader.as_mut() else {
                continue;
            };

            let event = reader.read_line().await;
            match event {
                Ok(LineEvent::Line(line)) => {
                    self.silent_reads = 0;
                    return LineEvent::Line(line);
                }
                Ok(LineEvent::Silence) => {
                    self.silent_reads += 1;
                    match self.max_silent_reads {
                        Some(limit) if self.silent_reads >= limit => {
                            let err = GpsError::Link(format!(
                                "no data for {} consecutive reads",
                                self.silent_reads
                            ));
                            self.drop_connection(err).await;
                        }
                        _ => return LineEvent::Silence,
                    }
                }
                Err(e) => self.drop_connection(e).await,
            }
        }
    }

    /// Open the link, retrying with a fixed backoff until it succeeds.
    async fn connect(&mut self) -> L::Reader {
        loop {
            match self.link.open().await {
                Ok(reader) => {
                    self.fix.set_status(LinkStatus::Connected);
                    self.silent_reads = 0;
                    info!("GPS device {} is connected", self.link.describe());
                    return reader;
                }
                Err(e) => {
                    self.record_failure(&e, "can't connect gps");
                    tokio::time::sleep(self.backoff).await;
                }
            }
        }
    }

    async fn drop_connection(&mut self, error: GpsError) {
        // Dropping the reader closes the port
        self.reader = None;
        self.silent_reads = 0;
        self.record_failure(&error, "lost gps");
        tokio::time::sleep(self.backoff).await;
    }

    fn record_failure(&self, error: &GpsError, context: &str) {
        let status = if error.is_link_failure() {
            LinkStatus::FailedConnect
        } else {
            LinkStatus::Exception
        };
        self.fix.set_status(status);
        warn!(
            "{} ({}): {}; retrying in {:?}",
            context,
            self.link.describe(),
            error,
            self.backoff
        );
        debug!("link status is now {}", status);
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted in-memory link used by the supervisor and ingestion tests

    use super::*;
    use std::{
        collections::VecDeque,
        sync::{Arc, Mutex},
    };

    #[derive(Debug)]
    pub enum Step {
        Line(&'static str),
        Silence,
        IoError,
        Unexpected,
    }

    #[derive(Debug)]
    pub enum Open {
        Fail,
        FailUnexpected,
        Succeed(Vec<Step>),
    }

    #[derive(Debug, Default)]
    struct Script {
        opens: VecDeque<Open>,
        // Link status seen at the start of every open attempt
        statuses_at_open: Vec<LinkStatus>,
    }

    #[derive(Debug, Clone)]
    pub struct ScriptedLink {
        script: Arc<Mutex<Script>>,
        fix: SharedFix,
    }

    impl ScriptedLink {
        pub fn new(fix: SharedFix, opens: Vec<Open>) -> Self {
            Self {
                script: Arc::new(Mutex::new(Script {
                    opens: opens.into(),
                    statuses_at_open: Vec::new(),
                })),
                fix,
            }
        }

        pub fn statuses_at_open(&self) -> Vec<LinkStatus> {
            self.script.lock().unwrap().statuses_at_open.clone()
        }

        pub fn open_count(&self) -> usize {
            self.statuses_at_open().len()
        }
    }

    pub struct ScriptedReader {
        steps: VecDeque<Step>,
    }

    impl LineReader for ScriptedReader {
        async fn read_line(&mut self) -> Result<LineEvent> {
            match self.steps.pop_front() {
                Some(Step::Line(line)) => Ok(LineEvent::Line(line.to_string())),
                Some(Step::Silence) => Ok(LineEvent::Silence),
                Some(Step::IoError) => Err(GpsError::Io(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "device unplugged",
                ))),
                Some(Step::Unexpected) => Err(GpsError::Other("driver bug".to_string())),
                None => {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    Ok(LineEvent::Silence)
                }
            }
        }
    }

    impl SerialLink for ScriptedLink {
        type Reader = ScriptedReader;

        async fn open(&self) -> Result<ScriptedReader> {
            let next = {
                let mut script = self.script.lock().unwrap();
                script.statuses_at_open.push(self.fix.status());
                script.opens.pop_front()
            };

            match next {
                Some(Open::Succeed(steps)) => Ok(ScriptedReader { steps: steps.into() }),
                Some(Open::FailUnexpected) => Err(GpsError::Other("unexpected".to_string())),
                Some(Open::Fail) | None => Err(GpsError::Link("no such device".to_string())),
            }
        }

        fn describe(&self) -> String {
            "scripted link".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{Open, ScriptedLink, Step};
    use super::*;
    use tokio::time::Instant;

    const BACKOFF: Duration = Duration::from_millis(20);

    fn line(s: &str) -> LineEvent {
        LineEvent::Line(s.to_string())
    }

    #[tokio::test]
    async fn test_retries_open_until_device_appears() {
        let fix = SharedFix::new();
        let link = ScriptedLink::new(
            fix.clone(),
            vec![Open::Fail, Open::Fail, Open::Succeed(vec![Step::Line("$GPGGA")])],
        );
        let mut supervisor = LinkSupervisor::new(link.clone(), fix.clone(), BACKOFF);

        let started = Instant::now();
        assert_eq!(supervisor.next_line().await, line("$GPGGA"));

        assert!(started.elapsed() >= BACKOFF * 2);
        assert_eq!(fix.status(), LinkStatus::Connected);
        assert_eq!(
            link.statuses_at_open(),
            vec![
                LinkStatus::NotConnected,
                LinkStatus::FailedConnect,
                LinkStatus::FailedConnect
            ]
        );
    }

    #[tokio::test]
    async fn test_read_error_reconnects() {
        let fix = SharedFix::new();
        let link = ScriptedLink::new(
            fix.clone(),
            vec![
                Open::Succeed(vec![Step::Line("$A"), Step::IoError]),
                Open::Succeed(vec![Step::Line("$B")]),
            ],
        );
        let mut supervisor = LinkSupervisor::new(link.clone(), fix.clone(), BACKOFF);

        assert_eq!(supervisor.next_line().await, line("$A"));
        assert_eq!(fix.status(), LinkStatus::Connected);

        let started = Instant::now();
        assert_eq!(supervisor.next_line().await, line("$B"));
        assert!(started.elapsed() >= BACKOFF);

        assert_eq!(fix.status(), LinkStatus::Connected);
        assert_eq!(
            link.statuses_at_open(),
            vec![LinkStatus::NotConnected, LinkStatus::FailedConnect]
        );
    }

    #[tokio::test]
    async fn test_unexpected_errors_mark_exception() {
        let fix = SharedFix::new();
        let link = ScriptedLink::new(
            fix.clone(),
            vec![
                Open::FailUnexpected,
                Open::Succeed(vec![Step::Unexpected]),
                Open::Succeed(vec![Step::Line("$C")]),
            ],
        );
        let mut supervisor = LinkSupervisor::new(link.clone(), fix.clone(), BACKOFF);

        assert_eq!(supervisor.next_line().await, line("$C"));
        assert_eq!(
            link.statuses_at_open(),
            vec![
                LinkStatus::NotConnected,
                LinkStatus::Exception,
                LinkStatus::Exception
            ]
        );
    }

    #[tokio::test]
    async fn test_silence_is_not_a_failure() {
        let fix = SharedFix::new();
        let link = ScriptedLink::new(
            fix.clone(),
            vec![Open::Succeed(vec![
                Step::Silence,
                Step::Silence,
                Step::Silence,
                Step::Line("$D"),
            ])],
        );
        let mut supervisor = LinkSupervisor::new(link.clone(), fix.clone(), BACKOFF);

        for _ in 0..3 {
            assert_eq!(supervisor.next_line().await, LineEvent::Silence);
            assert_eq!(fix.status(), LinkStatus::Connected);
        }
        assert_eq!(supervisor.next_line().await, line("$D"));
        assert_eq!(link.open_count(), 1);
        assert!(supervisor.is_connected());
    }

    #[tokio::test]
    async fn test_consecutive_silence_limit_forces_reconnect() {
        let fix = SharedFix::new();
        let link = ScriptedLink::new(
            fix.clone(),
            vec![
                Open::Succeed(vec![Step::Silence, Step::Silence, Step::Silence]),
                Open::Succeed(vec![Step::Line("$E")]),
            ],
        );
        let mut supervisor =
            LinkSupervisor::new(link.clone(), fix.clone(), BACKOFF).with_max_silent_reads(Some(2));

        assert_eq!(supervisor.next_line().await, LineEvent::Silence);
        assert_eq!(supervisor.next_line().await, line("$E"));
        assert_eq!(
            link.statuses_at_open(),
            vec![LinkStatus::NotConnected, LinkStatus::FailedConnect]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_serial_reader_keeps_partial_line_across_timeout() {
        use tokio::io::AsyncWriteExt;

        let (mut master, slave) = SerialStream::pair().unwrap();
        let mut reader = SerialReader {
            reader: BufReader::new(slave),
            pending: Vec::new(),
            read_timeout: Duration::from_millis(100),
        };

        assert_eq!(reader.read_line().await.unwrap(), LineEvent::Silence);

        master.write_all(b"$GPG").await.unwrap();
        master.flush().await.unwrap();
        assert_eq!(reader.read_line().await.unwrap(), LineEvent::Silence);

        master.write_all(b"GA,1\r\n").await.unwrap();
        master.flush().await.unwrap();
        assert_eq!(reader.read_line().await.unwrap(), line("$GPGGA,1"));

        drop(master);
        let err = reader.read_line().await.unwrap_err();
        assert!(err.is_link_failure(), "unplug not treated as link failure: {}", err);
    }
}
