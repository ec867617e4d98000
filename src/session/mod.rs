// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Per-client session engine.
//!
//! A [`Session`] owns one connection from size detection to close. It keeps
//! its own track table, trail history and display mode, and drives a single
//! loop that multiplexes keystrokes, data refresh, resize checks, keepalives
//! and frame output. Keystrokes are pulled off the transport by a background
//! reader task into a queue so the loop never blocks on the client.

pub mod demo;
pub mod input;

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use adsb_client::{AircraftTracker, CachedFetchClient, FetchStatus, RetentionPolicy, TrackerConfig};
use chrono::Utc;
use crossterm::cursor::{Hide, MoveTo, Show};
use crossterm::terminal::{Clear, ClearType};
use log::{debug, info, warn};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{sleep, sleep_until, timeout, timeout_at, Instant};
use tokio_util::sync::CancellationToken;

use crate::config::SessionConfig;
use crate::render::{ansi, Bounds, DisplayMode, FrameContext, Renderer};
use crate::transport::{TerminalSize, Transport};
use demo::DemoSimulator;
use input::{Command, CURSOR_QUERY, CURSOR_RESTORE};

/// Frame pacing per mode.
const DEMO_TICK: Duration = Duration::from_millis(100);
const LIVE_TICK: Duration = Duration::from_millis(1000);

/// How long to wait for NAWS or a PTY request before querying the terminal.
const REPORTED_SIZE_GRACE: Duration = Duration::from_millis(300);
const REPORTED_SIZE_POLL: Duration = Duration::from_millis(50);
const CURSOR_REPORT_TIMEOUT: Duration = Duration::from_secs(1);
const CURSOR_REPORT_MAX_BYTES: usize = 64;

const INPUT_QUEUE_CAPACITY: usize = 64;

/// Upper bound on each of the final cursor restore and transport close.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Errors that end a session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid session configuration: {0}")]
    Config(String),
}

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    DetectingSize,
    Initializing,
    Running,
    Closing,
}

/// Where the aircraft come from.
enum DataSource {
    Live(Arc<CachedFetchClient>),
    Demo(DemoSimulator),
}

impl std::fmt::Debug for DataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Live(_) => f.write_str("Live"),
            Self::Demo(_) => f.write_str("Demo"),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

/// One connected client.
pub struct Session {
    transport: Arc<dyn Transport>,
    config: Arc<SessionConfig>,
    source: DataSource,
    cancel: CancellationToken,
    state: SessionState,
    size: TerminalSize,
    renderer: Renderer,
    tracker: AircraftTracker,
    bounds: Bounds,
    mode: DisplayMode,
    stale: bool,
    force_redraw: bool,
    /// Keys that arrived mixed in with a cursor position report.
    pending_keys: VecDeque<u8>,
    last_fetch: Option<Instant>,
    last_advance: Instant,
    last_keepalive: Instant,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("peer", &self.transport.peer())
            .field("state", &self.state)
            .field("size", &self.size)
            .field("mode", &self.mode)
            .field("source", &self.source)
            .field("tracker", &self.tracker)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Prepare a session. Live mode needs a fetch client; misconfiguration is
    /// reported here instead of surfacing as an empty radar.
    pub fn new(
        transport: Arc<dyn Transport>,
        config: Arc<SessionConfig>,
        fetcher: Option<Arc<CachedFetchClient>>,
        cancel: CancellationToken,
    ) -> Result<Self, SessionError> {
        let bounds = config.reference.bounds(config.radius_nm);
        if !bounds.is_valid() {
            return Err(SessionError::Config(format!(
                "reference point {} gives invalid map bounds",
                config.reference.code
            )));
        }
        if config.display_limit == 0 || config.trail_length == 0 {
            return Err(SessionError::Config(
                "display limit and trail length must be positive".to_string(),
            ));
        }

        let (source, tracker_config) = if config.demo_mode {
            let simulator =
                DemoSimulator::new(&config.reference, config.radius_nm, rand::random());
            let tracker_config = TrackerConfig {
                trail_length: config.trail_length,
                trail_min_distance_nm: config.demo_trail_min_distance_nm,
                aircraft_timeout_secs: config.eviction_timeout_secs,
                retention: RetentionPolicy::Fixed,
            };
            (DataSource::Demo(simulator), tracker_config)
        } else {
            let fetcher = fetcher.ok_or_else(|| {
                SessionError::Config("live mode requires a fetch client".to_string())
            })?;
            let tracker_config = TrackerConfig {
                trail_length: config.trail_length,
                trail_min_distance_nm: config.live_trail_min_distance_nm,
                aircraft_timeout_secs: config.eviction_timeout_secs,
                retention: RetentionPolicy::Live,
            };
            (DataSource::Live(fetcher), tracker_config)
        };

        let now = Instant::now();
        Ok(Self {
            transport,
            renderer: Renderer::new(TerminalSize::DEFAULT, config.render),
            config,
            source,
            cancel,
            state: SessionState::DetectingSize,
            size: TerminalSize::DEFAULT,
            tracker: AircraftTracker::new(tracker_config),
            bounds,
            mode: DisplayMode::default(),
            stale: false,
            force_redraw: false,
            pending_keys: VecDeque::new(),
            last_fetch: None,
            last_advance: now,
            last_keepalive: now,
        })
    }

    /// Run until the client quits, disconnects, fails, or the session is
    /// cancelled. The terminal is restored and the transport closed on every
    /// exit path.
    pub async fn run(mut self) -> Result<(), SessionError> {
        let (input_tx, mut input_rx) = mpsc::channel(INPUT_QUEUE_CAPACITY);
        let reader_cancel = self.cancel.child_token();
        let reader = tokio::spawn(read_input(
            Arc::clone(&self.transport),
            input_tx,
            reader_cancel.clone(),
        ));

        // A write stuck on a peer that stopped reading must not outlive
        // cancellation.
        let cancel = self.cancel.clone();
        let result = tokio::select! {
            () = cancel.cancelled() => {
                debug!("[{}] Session cancelled", self.peer());
                Ok(())
            }
            result = self.drive(&mut input_rx) => result,
        };

        self.set_state(SessionState::Closing);
        reader_cancel.cancel();
        drop(input_rx);
        if let Err(e) = reader.await {
            debug!("[{}] Input reader ended abnormally: {}", self.peer(), e);
        }
        if timeout(CLOSE_TIMEOUT, self.restore_terminal()).await.is_err() {
            debug!("[{}] Timed out restoring the terminal", self.peer());
        }
        if timeout(CLOSE_TIMEOUT, self.transport.close()).await.is_err() {
            debug!("[{}] Timed out closing the transport", self.peer());
        }

        match &result {
            Ok(()) => info!("[{}] Session closed", self.peer()),
            Err(e) => warn!("[{}] Session closed: {}", self.peer(), e),
        }
        result
    }

    fn peer(&self) -> &str {
        self.transport.peer()
    }

    fn set_state(&mut self, state: SessionState) {
        debug!("[{}] {:?} -> {:?}", self.transport.peer(), self.state, state);
        self.state = state;
    }

    async fn drive(&mut self, input: &mut mpsc::Receiver<u8>) -> Result<(), SessionError> {
        self.set_state(SessionState::DetectingSize);
        let size = self.detect_size(input).await?;
        info!("[{}] Terminal size {}", self.peer(), size);

        self.set_state(SessionState::Initializing);
        self.apply_size(size);
        self.transport
            .write(&format!("{}{}{}", ansi(Clear(ClearType::All)), ansi(MoveTo(0, 0)), ansi(Hide)))
            .await?;
        self.initial_refresh().await;

        self.set_state(SessionState::Running);
        loop {
            if self.cancel.is_cancelled() || self.transport.is_closing() {
                debug!("[{}] Session cancelled or transport closing", self.peer());
                return Ok(());
            }
            let tick_started = Instant::now();

            self.keepalive_if_due(tick_started).await?;
            self.check_resize().await?;
            self.refresh(tick_started).await;
            self.draw().await?;

            if std::mem::take(&mut self.force_redraw) {
                continue;
            }
            if self.wait_for_tick(input, tick_started + self.tick()).await? == Flow::Quit {
                return Ok(());
            }
        }
    }

    fn is_demo(&self) -> bool {
        matches!(self.source, DataSource::Demo(_))
    }

    fn tick(&self) -> Duration {
        if self.is_demo() {
            DEMO_TICK
        } else {
            LIVE_TICK
        }
    }

    /// Sleep until `deadline`, handling keystrokes as they arrive. Returns
    /// early when a command forces a redraw.
    async fn wait_for_tick(
        &mut self,
        input: &mut mpsc::Receiver<u8>,
        deadline: Instant,
    ) -> Result<Flow, SessionError> {
        loop {
            let byte = match self.pending_keys.pop_front() {
                Some(byte) => byte,
                None => {
                    let byte = tokio::select! {
                        () = self.cancel.cancelled() => return Ok(Flow::Quit),
                        () = sleep_until(deadline) => return Ok(Flow::Continue),
                        byte = input.recv() => byte,
                    };
                    let Some(byte) = byte else {
                        info!("[{}] Client disconnected", self.peer());
                        return Ok(Flow::Quit);
                    };
                    byte
                }
            };
            if self.handle_key(byte, input).await? == Flow::Quit {
                return Ok(Flow::Quit);
            }
            if self.force_redraw {
                return Ok(Flow::Continue);
            }
        }
    }

    async fn handle_key(
        &mut self,
        byte: u8,
        input: &mut mpsc::Receiver<u8>,
    ) -> Result<Flow, SessionError> {
        match Command::from_key(byte) {
            Some(Command::Quit) => {
                info!("[{}] Quit requested", self.peer());
                return Ok(Flow::Quit);
            }
            Some(Command::ToggleMode) => {
                self.mode = self.mode.next();
                info!("[{}] Display mode {}", self.peer(), self.mode);
                self.force_redraw = true;
            }
            Some(Command::Refresh) => {
                info!("[{}] Refresh requested", self.peer());
                if let Some(size) = self.probe_size(input).await? {
                    if size != self.size {
                        info!("[{}] Terminal size now {}", self.peer(), size);
                        self.apply_size(size);
                    }
                }
                self.transport.write(&ansi(Clear(ClearType::All))).await?;
                if self.is_demo() {
                    self.tracker.clear_trails();
                } else {
                    self.fetch_live(false).await;
                }
                self.force_redraw = true;
            }
            None => {}
        }
        Ok(Flow::Continue)
    }

    /// Static size, then the transport's report (given a short grace period
    /// for it to arrive), then a cursor position query, then the default.
    async fn detect_size(
        &mut self,
        input: &mut mpsc::Receiver<u8>,
    ) -> Result<TerminalSize, SessionError> {
        if let Some(size) = self.config.static_size {
            debug!("[{}] Using configured terminal size", self.peer());
            return Ok(size);
        }

        let grace_deadline = Instant::now() + REPORTED_SIZE_GRACE;
        loop {
            if let Some(size) = self.transport.reported_size() {
                debug!("[{}] Client reported terminal size", self.peer());
                return Ok(size);
            }
            if Instant::now() >= grace_deadline {
                break;
            }
            sleep(REPORTED_SIZE_POLL).await;
        }

        if let Some(size) = self.query_cursor_position(input).await? {
            debug!("[{}] Terminal size from cursor report", self.peer());
            return Ok(size);
        }

        warn!(
            "[{}] Could not detect terminal size, using {}",
            self.peer(),
            TerminalSize::DEFAULT
        );
        Ok(TerminalSize::DEFAULT)
    }

    /// Size detection without the grace period, for refreshes.
    async fn probe_size(
        &mut self,
        input: &mut mpsc::Receiver<u8>,
    ) -> Result<Option<TerminalSize>, SessionError> {
        if let Some(size) = self.config.static_size.or_else(|| self.transport.reported_size()) {
            return Ok(Some(size));
        }
        self.query_cursor_position(input).await
    }

    /// Push the cursor to the far corner and ask the terminal where it ended up.
    async fn query_cursor_position(
        &mut self,
        input: &mut mpsc::Receiver<u8>,
    ) -> Result<Option<TerminalSize>, SessionError> {
        self.transport.write(CURSOR_QUERY).await?;
        self.transport.drain().await?;

        let deadline = Instant::now() + CURSOR_REPORT_TIMEOUT;
        let mut buf = Vec::new();
        let size = loop {
            match timeout_at(deadline, input.recv()).await {
                Ok(Some(byte)) => {
                    buf.push(byte);
                    if let Some(size) = input::parse_cursor_report(&buf) {
                        break Some(size);
                    }
                    if buf.len() > CURSOR_REPORT_MAX_BYTES {
                        break None;
                    }
                }
                Ok(None) => break None,
                Err(_elapsed) => {
                    debug!("[{}] No cursor position report", self.peer());
                    break None;
                }
            }
        };

        let (_, keys) = input::split_cursor_reports(&buf);
        self.pending_keys.extend(keys);

        self.transport.write(CURSOR_RESTORE).await?;
        Ok(size)
    }

    fn apply_size(&mut self, size: TerminalSize) {
        self.size = size;
        self.renderer = Renderer::new(size, self.config.render);
        self.force_redraw = true;
    }

    async fn check_resize(&mut self) -> Result<(), SessionError> {
        if self.config.static_size.is_some() {
            return Ok(());
        }
        if let Some(reported) = self.transport.reported_size() {
            if reported != self.size {
                info!("[{}] Terminal resized to {}", self.peer(), reported);
                self.apply_size(reported);
                self.transport.write(&ansi(Clear(ClearType::All))).await?;
            }
        }
        Ok(())
    }

    async fn keepalive_if_due(&mut self, now: Instant) -> Result<(), SessionError> {
        let Some(interval) = self.config.keepalive_interval else {
            return Ok(());
        };
        if now.duration_since(self.last_keepalive) >= interval {
            debug!("[{}] Sending keepalive", self.peer());
            self.transport.keepalive().await?;
            self.last_keepalive = now;
        }
        Ok(())
    }

    /// First data load, with trails cleared so nothing stale is drawn.
    async fn initial_refresh(&mut self) {
        if let DataSource::Demo(simulator) = &self.source {
            let records = simulator.records();
            self.tracker.apply(&records, false);
            self.last_advance = Instant::now();
            return;
        }
        self.fetch_live(false).await;
    }

    /// Advance the simulation every tick, or fetch once the update interval
    /// has passed.
    async fn refresh(&mut self, now: Instant) {
        if let DataSource::Demo(simulator) = &mut self.source {
            let elapsed = now.duration_since(self.last_advance);
            self.last_advance = now;
            let records = simulator.advance(elapsed, self.config.speed_multiplier);
            self.tracker.apply(&records, true);
            return;
        }

        let due = match self.last_fetch {
            Some(last) => now.duration_since(last) >= self.config.update_interval,
            None => true,
        };
        if due {
            self.fetch_live(true).await;
        }
    }

    async fn fetch_live(&mut self, preserve_trails: bool) {
        let DataSource::Live(fetcher) = &self.source else {
            return;
        };
        let fetcher = Arc::clone(fetcher);
        let reference = &self.config.reference;
        let outcome = fetcher
            .get(reference.lat, reference.lon, self.config.radius_nm)
            .await;
        self.last_fetch = Some(Instant::now());

        if outcome.status == FetchStatus::Unavailable {
            // Keep what we had, but still age out anything silent too long.
            self.tracker.evict_stale(Utc::now());
        } else {
            self.tracker.apply(&outcome.records, preserve_trails);
        }
        if outcome.status.is_degraded() && !self.stale {
            warn!("[{}] Showing stale data ({:?})", self.peer(), outcome.status);
        }
        self.stale = outcome.status.is_degraded();
    }

    async fn draw(&mut self) -> Result<(), SessionError> {
        let ctx = FrameContext {
            mode: self.mode,
            bounds: self.bounds,
            reference: Some(&self.config.reference),
            display_limit: self.config.display_limit,
            stale: self.stale,
            demo: self.is_demo(),
            now: Utc::now(),
        };
        let frame = self.renderer.render(&self.tracker.snapshot(), &ctx);
        let text = frame.to_ansi(usize::from(self.size.cols), self.config.use_colors);
        self.transport.write(&text).await?;
        self.transport.drain().await?;
        Ok(())
    }

    async fn restore_terminal(&self) {
        let restore = ansi(Show) + "\r\n";
        if let Err(e) = self.transport.write(&restore).await {
            debug!("[{}] Could not restore cursor: {}", self.peer(), e);
            return;
        }
        if let Err(e) = self.transport.drain().await {
            debug!("[{}] Could not flush on close: {}", self.peer(), e);
        }
    }
}

/// Pump transport bytes into the session queue until EOF or cancellation.
/// Dropping the sender tells the session the client is gone.
async fn read_input(
    transport: Arc<dyn Transport>,
    queue: mpsc::Sender<u8>,
    cancel: CancellationToken,
) {
    loop {
        let result = tokio::select! {
            () = cancel.cancelled() => break,
            result = transport.read_byte() => result,
        };
        match result {
            Ok(Some(byte)) => {
                if queue.send(byte).await.is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                debug!("[{}] Read error: {}", transport.peer(), e);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockTransport;
    use adsb_client::{AircraftRecord, AircraftSource, FetchError};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    fn demo_config() -> SessionConfig {
        SessionConfig {
            static_size: Some(TerminalSize { cols: 100, rows: 40 }),
            keepalive_interval: None,
            ..SessionConfig::default()
        }
    }

    fn start(
        config: SessionConfig,
        fetcher: Option<Arc<CachedFetchClient>>,
    ) -> (Arc<MockTransport>, tokio::task::JoinHandle<Result<(), SessionError>>) {
        let transport = Arc::new(MockTransport::new());
        let session = Session::new(
            Arc::clone(&transport) as Arc<dyn Transport>,
            Arc::new(config),
            fetcher,
            CancellationToken::new(),
        )
        .unwrap();
        (transport, tokio::spawn(session.run()))
    }

    #[derive(Default)]
    struct FakeSource {
        calls: AtomicUsize,
        failing: AtomicBool,
    }

    #[async_trait]
    impl AircraftSource for FakeSource {
        async fn fetch(
            &self,
            lat: f64,
            lon: f64,
            _radius_nm: u32,
        ) -> Result<Vec<AircraftRecord>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                return Err(FetchError::Status(503));
            }
            Ok(vec![AircraftRecord {
                callsign: Some("TEST01".to_string()),
                position: Some((lat + 0.1, lon)),
                altitude: Some(12_000),
                ..AircraftRecord::new("abc123")
            }])
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_quit_key_closes_and_restores_cursor() {
        let (transport, handle) = start(demo_config(), None);
        sleep(Duration::from_millis(350)).await;
        transport.send_keys("q");

        handle.await.unwrap().unwrap();
        let output = transport.output();
        assert!(output.contains("\x1b[?25l"));
        assert!(output.ends_with("\x1b[?25h\r\n"));
        assert!(transport.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_uppercase_quit() {
        let (transport, handle) = start(demo_config(), None);
        transport.send_keys("Q");
        handle.await.unwrap().unwrap();
        assert!(transport.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_mode_toggle_cycles_back_to_all() {
        let (transport, handle) = start(demo_config(), None);
        sleep(Duration::from_millis(250)).await;

        transport.send_keys("t");
        sleep(Duration::from_millis(250)).await;
        assert!(transport.output().contains("Mode: CLOSEST"));

        transport.send_keys("tttt");
        sleep(Duration::from_millis(250)).await;
        let output = transport.output();
        for label in ["Mode: HIGH", "Mode: MEDIUM", "Mode: LOW"] {
            assert!(output.contains(label), "missing {label}");
        }
        let last_frame = output.rsplit("\x1b[1;1H").next().unwrap();
        assert!(last_frame.contains("Mode: ALL"));

        transport.send_keys("q");
        handle.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_hang_up_ends_session() {
        let (transport, handle) = start(demo_config(), None);
        sleep(Duration::from_millis(300)).await;
        transport.hang_up();

        handle.await.unwrap().unwrap();
        assert!(transport.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_failure_ends_session_with_error() {
        let (transport, handle) = start(demo_config(), None);
        sleep(Duration::from_millis(300)).await;
        transport.fail_writes();

        let result = handle.await.unwrap();
        assert!(matches!(result, Err(SessionError::Io(_))));
        assert!(transport.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_ends_session() {
        let transport = Arc::new(MockTransport::new());
        let cancel = CancellationToken::new();
        let session = Session::new(
            Arc::clone(&transport) as Arc<dyn Transport>,
            Arc::new(demo_config()),
            None,
            cancel.clone(),
        )
        .unwrap();
        let handle = tokio::spawn(session.run());
        sleep(Duration::from_millis(300)).await;
        cancel.cancel();

        handle.await.unwrap().unwrap();
        assert!(transport.output().ends_with("\x1b[?25h\r\n"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_interrupts_stalled_write() {
        let transport = Arc::new(MockTransport::new());
        let cancel = CancellationToken::new();
        let session = Session::new(
            Arc::clone(&transport) as Arc<dyn Transport>,
            Arc::new(demo_config()),
            None,
            cancel.clone(),
        )
        .unwrap();
        let handle = tokio::spawn(session.run());
        sleep(Duration::from_millis(300)).await;
        transport.stall_writes();
        sleep(Duration::from_millis(500)).await;
        assert!(!handle.is_finished());

        cancel.cancel();
        handle.await.unwrap().unwrap();
        assert!(transport.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_quit_typed_during_size_query_is_honoured() {
        let config = SessionConfig {
            static_size: None,
            ..demo_config()
        };
        let (transport, handle) = start(config, None);
        transport.send_keys("q");

        tokio::time::timeout(Duration::from_secs(10), handle)
            .await
            .expect("session should quit")
            .unwrap()
            .unwrap();
        assert!(transport.output().contains("\x1b[6n"));
        assert!(transport.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_key_mixed_with_cursor_report_is_replayed() {
        let config = SessionConfig {
            static_size: None,
            ..demo_config()
        };
        let (transport, handle) = start(config, None);
        transport.reply_to_cursor_query(90, 30);
        transport.send_keys("t");
        sleep(Duration::from_millis(600)).await;

        assert!(transport.output().contains("Mode: CLOSEST"));
        transport.send_keys("q");
        handle.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_static_size_sets_frame_width() {
        let config = SessionConfig {
            static_size: Some(TerminalSize { cols: 64, rows: 30 }),
            use_colors: false,
            ..demo_config()
        };
        let (transport, handle) = start(config, None);
        sleep(Duration::from_millis(150)).await;
        transport.send_keys("q");
        handle.await.unwrap().unwrap();

        let output = transport.output();
        assert!(!output.contains("\x1b[6n"));
        let frame = output.rsplit("\x1b[1;1H").next().unwrap();
        let first_line = frame.split("\r\n").next().unwrap();
        assert_eq!(first_line.chars().count(), 64);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reported_size_used_without_query() {
        let config = SessionConfig {
            static_size: None,
            use_colors: false,
            ..demo_config()
        };
        let transport = Arc::new(MockTransport::new());
        transport.set_reported_size(Some(TerminalSize { cols: 90, rows: 30 }));
        let session = Session::new(
            Arc::clone(&transport) as Arc<dyn Transport>,
            Arc::new(config),
            None,
            CancellationToken::new(),
        )
        .unwrap();
        let handle = tokio::spawn(session.run());
        sleep(Duration::from_millis(150)).await;
        transport.send_keys("q");
        handle.await.unwrap().unwrap();

        let output = transport.output();
        assert!(!output.contains("\x1b[6n"));
        let line = output.rsplit("\x1b[1;1H").next().unwrap().split("\r\n").next().unwrap();
        assert_eq!(line.chars().count(), 90);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cursor_report_detects_size() {
        let config = SessionConfig {
            static_size: None,
            use_colors: false,
            ..demo_config()
        };
        let transport = Arc::new(MockTransport::new());
        transport.reply_to_cursor_query(72, 28);
        let session = Session::new(
            Arc::clone(&transport) as Arc<dyn Transport>,
            Arc::new(config),
            None,
            CancellationToken::new(),
        )
        .unwrap();
        let handle = tokio::spawn(session.run());
        sleep(Duration::from_millis(600)).await;
        transport.send_keys("q");
        handle.await.unwrap().unwrap();

        let output = transport.output();
        assert!(output.contains(CURSOR_QUERY));
        assert!(output.contains(CURSOR_RESTORE));
        let line = output.rsplit("\x1b[1;1H").next().unwrap().split("\r\n").next().unwrap();
        assert_eq!(line.chars().count(), 72);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_size_information_falls_back_to_default() {
        let config = SessionConfig {
            static_size: None,
            use_colors: false,
            ..demo_config()
        };
        let (transport, handle) = start(config, None);
        sleep(Duration::from_millis(1500)).await;
        transport.send_keys("q");
        handle.await.unwrap().unwrap();

        let line = transport
            .output()
            .rsplit("\x1b[1;1H")
            .next()
            .unwrap()
            .split("\r\n")
            .next()
            .unwrap()
            .to_string();
        assert_eq!(line.chars().count(), usize::from(TerminalSize::DEFAULT.cols));
    }

    #[tokio::test(start_paused = true)]
    async fn test_resize_rebuilds_frame() {
        let config = SessionConfig {
            static_size: None,
            use_colors: false,
            ..demo_config()
        };
        let transport = Arc::new(MockTransport::new());
        transport.set_reported_size(Some(TerminalSize { cols: 80, rows: 30 }));
        let session = Session::new(
            Arc::clone(&transport) as Arc<dyn Transport>,
            Arc::new(config),
            None,
            CancellationToken::new(),
        )
        .unwrap();
        let handle = tokio::spawn(session.run());
        sleep(Duration::from_millis(250)).await;
        transport.set_reported_size(Some(TerminalSize { cols: 110, rows: 35 }));
        sleep(Duration::from_millis(250)).await;
        transport.send_keys("q");
        handle.await.unwrap().unwrap();

        let line = transport
            .output()
            .rsplit("\x1b[1;1H")
            .next()
            .unwrap()
            .split("\r\n")
            .next()
            .unwrap()
            .to_string();
        assert_eq!(line.chars().count(), 110);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keepalive_sent_on_interval() {
        let config = SessionConfig {
            keepalive_interval: Some(Duration::from_secs(1)),
            ..demo_config()
        };
        let (transport, handle) = start(config, None);
        sleep(Duration::from_millis(3050)).await;
        transport.send_keys("q");
        handle.await.unwrap().unwrap();
        assert!((2..=4).contains(&transport.keepalives()), "{}", transport.keepalives());
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_mode_fetches_on_update_interval() {
        let source = Arc::new(FakeSource::default());
        let fetcher = Arc::new(CachedFetchClient::new(
            Arc::clone(&source) as Arc<dyn AircraftSource>,
            Duration::from_secs(1),
        ));
        let config = SessionConfig {
            demo_mode: false,
            update_interval: Duration::from_secs(4),
            ..demo_config()
        };
        let (transport, handle) = start(config, Some(fetcher));
        sleep(Duration::from_millis(5500)).await;
        transport.send_keys("q");
        handle.await.unwrap().unwrap();

        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
        let output = transport.output();
        assert!(output.contains("ABC123"));
        assert!(output.contains("LIVE"));
        assert!(!output.contains("STALE DATA"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_mode_marks_stale_on_upstream_failure() {
        let source = Arc::new(FakeSource::default());
        let fetcher = Arc::new(CachedFetchClient::new(
            Arc::clone(&source) as Arc<dyn AircraftSource>,
            Duration::from_secs(1),
        ));
        let config = SessionConfig {
            demo_mode: false,
            update_interval: Duration::from_secs(2),
            ..demo_config()
        };
        let (transport, handle) = start(config, Some(fetcher));
        sleep(Duration::from_millis(500)).await;
        source.failing.store(true, Ordering::SeqCst);
        sleep(Duration::from_millis(2500)).await;
        transport.send_keys("q");
        handle.await.unwrap().unwrap();

        let output = transport.output();
        let last_frame = output.rsplit("\x1b[1;1H").next().unwrap();
        assert!(last_frame.contains("STALE DATA"));
        assert!(last_frame.contains("ABC123"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_key_refetches_live_data() {
        let source = Arc::new(FakeSource::default());
        let fetcher = Arc::new(CachedFetchClient::new(
            Arc::clone(&source) as Arc<dyn AircraftSource>,
            Duration::ZERO,
        ));
        let config = SessionConfig {
            demo_mode: false,
            update_interval: Duration::from_secs(60),
            ..demo_config()
        };
        let (transport, handle) = start(config, Some(fetcher));
        sleep(Duration::from_millis(200)).await;
        transport.send_keys("r");
        sleep(Duration::from_millis(200)).await;
        transport.send_keys("q");
        handle.await.unwrap().unwrap();

        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_live_mode_without_fetcher_is_config_error() {
        let config = SessionConfig {
            demo_mode: false,
            ..SessionConfig::default()
        };
        let result = Session::new(
            Arc::new(MockTransport::new()),
            Arc::new(config),
            None,
            CancellationToken::new(),
        );
        assert!(matches!(result, Err(SessionError::Config(_))));
    }
}
