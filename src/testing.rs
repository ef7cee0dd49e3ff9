use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use reqwest::StatusCode;
use tokio::sync::{Notify, mpsc};
use tracing_subscriber::fmt::MakeWriter;

use crate::buffers::Entry;
use crate::config::Config;
use crate::delivery::{DeliveryClient, DeliveryError, DeliveryRequest};
use crate::endpoint::Credentials;

/// Let spawned timer and delivery tasks run without advancing the clock.
pub async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

pub fn entry(i: usize) -> Entry {
    Entry::from(format!("{i}\n"))
}

/// The expected request body for entries `range`.
pub fn lines(range: std::ops::Range<usize>) -> String {
    range.map(|i| format!("{i}\n")).collect()
}

pub fn test_config(batch_size: usize, time_threshold: Duration) -> Config {
    let mut config = Config::new(
        url::Url::parse("http://localhost:5080").unwrap(),
        "default",
        "app",
        Credentials::new("user", "pass"),
    );
    config.batch_size = batch_size;
    config.time_threshold = time_threshold;
    config
}

enum Mode {
    Accept,
    Reject(StatusCode),
    Hold,
    Panic,
}

/// Records every request it is handed; the reply depends on the mode.
pub struct MockClient {
    mode: Mode,
    sent: mpsc::UnboundedSender<DeliveryRequest>,
    release: Arc<Notify>,
}

/// The receiving side of a [`MockClient`].
pub struct Deliveries {
    rx: mpsc::UnboundedReceiver<DeliveryRequest>,
    release: Arc<Notify>,
}

impl MockClient {
    fn with_mode(mode: Mode) -> (Self, Deliveries) {
        let (tx, rx) = mpsc::unbounded_channel();
        let release = Arc::new(Notify::new());
        (
            Self {
                mode,
                sent: tx,
                release: Arc::clone(&release),
            },
            Deliveries { rx, release },
        )
    }

    pub fn accepting() -> (Self, Deliveries) {
        Self::with_mode(Mode::Accept)
    }

    pub fn rejecting(status: StatusCode) -> (Self, Deliveries) {
        Self::with_mode(Mode::Reject(status))
    }

    /// Records the request, then panics instead of answering.
    pub fn panicking() -> (Self, Deliveries) {
        Self::with_mode(Mode::Panic)
    }

    /// Each request stays in flight until [`Deliveries::release`] is called.
    pub fn held() -> (Self, Deliveries) {
        Self::with_mode(Mode::Hold)
    }
}

impl DeliveryClient for MockClient {
    async fn send(&self, request: DeliveryRequest) -> Result<StatusCode, DeliveryError> {
        let _ = self.sent.send(request);
        match self.mode {
            Mode::Accept => Ok(StatusCode::OK),
            Mode::Reject(status) => Err(DeliveryError::Rejected { status }),
            Mode::Hold => {
                self.release.notified().await;
                Ok(StatusCode::OK)
            }
            Mode::Panic => panic!("mock client failure"),
        }
    }
}

impl Deliveries {
    pub fn try_next(&mut self) -> Option<DeliveryRequest> {
        self.rx.try_recv().ok()
    }

    pub fn next_body(&mut self) -> Option<String> {
        self.try_next()
            .map(|req| String::from_utf8(req.body.to_vec()).unwrap())
    }

    pub fn all_bodies(&mut self) -> Vec<String> {
        std::iter::from_fn(|| self.next_body()).collect()
    }

    /// Complete one held request.
    pub fn release(&self) {
        self.release.notify_one();
    }
}

/// In-memory tracing output.
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Route tracing events on the current thread into a buffer until the guard drops.
pub fn capture_logs() -> (CapturedLogs, tracing::subscriber::DefaultGuard) {
    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(logs.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::INFO)
        .finish();
    let guard = tracing::subscriber::set_default(subscriber);
    (logs, guard)
}
