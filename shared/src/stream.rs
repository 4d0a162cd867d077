//! Simulated live feed.
//!
//! While running, a background task ticks once per period and replaces the
//! frame metrics with fresh samples. Stopping aborts the task; the frame
//! count survives and resumes from where it was.
//!
//! Aborting cannot interrupt a tick already sampling on another worker, so
//! every run carries a generation number. `stop` bumps it under the session
//! lock and a tick from an older run never publishes.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, info_span, trace, Instrument};

use crate::model::{FrameCapture, StreamSession, StreamSettings};
use crate::view::StreamView;
use crate::{
    AppError, AppResult, ErrorKind, STREAM_FPS_RANGE, STREAM_PROCESSING_TIME_RANGE_MS,
    STREAM_TICK_PERIOD,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamConfig {
    pub tick_period: Duration,
    pub fps_range: RangeInclusive<u32>,
    pub processing_time_range_ms: RangeInclusive<u32>,
    pub settings: StreamSettings,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            tick_period: STREAM_TICK_PERIOD,
            fps_range: STREAM_FPS_RANGE,
            processing_time_range_ms: STREAM_PROCESSING_TIME_RANGE_MS,
            settings: StreamSettings::default(),
        }
    }
}

impl StreamConfig {
    pub fn validate(&self) -> AppResult<()> {
        if self.tick_period.is_zero() {
            return Err(AppError::new(
                ErrorKind::Configuration,
                "stream tick period must be non-zero",
            ));
        }
        for (name, range) in [
            ("fps_range", &self.fps_range),
            ("processing_time_range_ms", &self.processing_time_range_ms),
        ] {
            if range.is_empty() {
                return Err(AppError::new(
                    ErrorKind::Configuration,
                    format!("{name} must not be empty"),
                )
                .with_context("range", format!("{range:?}")));
            }
        }
        Ok(())
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameMetrics {
    pub fps: u32,
    pub processing_time_ms: u32,
}

/// Draws per-tick metrics from an injected RNG.
#[derive(Debug)]
pub struct MetricsSampler<R> {
    rng: R,
    fps_range: RangeInclusive<u32>,
    processing_time_range_ms: RangeInclusive<u32>,
}

impl<R: Rng> MetricsSampler<R> {
    pub fn new(rng: R, config: &StreamConfig) -> Self {
        Self {
            rng,
            fps_range: config.fps_range.clone(),
            processing_time_range_ms: config.processing_time_range_ms.clone(),
        }
    }

    /// Ranges must be non-empty; see [`StreamConfig::validate`].
    pub fn sample(&mut self) -> FrameMetrics {
        FrameMetrics {
            fps: self.rng.gen_range(self.fps_range.clone()),
            processing_time_ms: self.rng.gen_range(self.processing_time_range_ms.clone()),
        }
    }
}

pub struct StreamSimulationLoop<R = StdRng> {
    config: StreamConfig,
    sampler: Arc<Mutex<MetricsSampler<R>>>,
    session: Arc<watch::Sender<StreamSession>>,
    generation: Arc<AtomicU64>,
    task: Option<JoinHandle<()>>,
}

impl StreamSimulationLoop<StdRng> {
    #[must_use]
    pub fn new(config: StreamConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    #[must_use]
    pub fn seeded(config: StreamConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng + Send + 'static> StreamSimulationLoop<R> {
    pub fn with_rng(config: StreamConfig, rng: R) -> Self {
        let sampler = MetricsSampler::new(rng, &config);
        let (session, _) = watch::channel(StreamSession::default());
        Self {
            config,
            sampler: Arc::new(Mutex::new(sampler)),
            session: Arc::new(session),
            generation: Arc::new(AtomicU64::new(0)),
            task: None,
        }
    }

    /// No-op while already running. The first tick lands one period after
    /// this call.
    pub fn start(&mut self) -> AppResult<()> {
        if self.is_running() {
            debug!("live feed already running");
            return Ok(());
        }
        self.config.validate()?;
        let runtime = Handle::try_current().map_err(|e| {
            AppError::new(
                ErrorKind::InvalidState,
                "The live feed needs an active runtime.",
            )
            .with_internal(e.to_string())
        })?;

        let period = self.config.tick_period;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);

        self.session.send_modify(|session| session.active = true);

        let run = self.generation.load(Ordering::SeqCst);
        let generation = Arc::clone(&self.generation);
        let session = Arc::clone(&self.session);
        let sampler = Arc::clone(&self.sampler);
        let span = info_span!("live_feed", period_ms = u64::try_from(period.as_millis()).unwrap_or(u64::MAX));
        self.task = Some(runtime.spawn(
            async move {
                loop {
                    ticker.tick().await;
                    let metrics = sampler
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .sample();
                    session.send_if_modified(|session| {
                        if !session.active || generation.load(Ordering::SeqCst) != run {
                            return false;
                        }
                        session.frame_count += 1;
                        session.fps = metrics.fps;
                        session.processing_time_ms = metrics.processing_time_ms;
                        trace!(frame = session.frame_count, fps = metrics.fps, "frame");
                        true
                    });
                }
            }
            .instrument(span),
        ));

        info!(
            frame_count = self.session.borrow().frame_count,
            "live feed started"
        );
        Ok(())
    }

    pub fn stop(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };
        task.abort();
        self.session.send_modify(|session| {
            self.generation.fetch_add(1, Ordering::SeqCst);
            session.active = false;
        });
        info!(
            frame_count = self.session.borrow().frame_count,
            "live feed paused"
        );
    }

    /// Start/Pause button.
    pub fn toggle(&mut self) -> AppResult<()> {
        if self.is_running() {
            self.stop();
            Ok(())
        } else {
            self.start()
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task.is_some() && self.session.borrow().active
    }

    #[must_use]
    pub fn session(&self) -> StreamSession {
        *self.session.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<StreamSession> {
        self.session.subscribe()
    }

    /// "Save Current Frame". Only available while streaming.
    pub fn capture_frame(&self) -> AppResult<FrameCapture> {
        let session = self.session();
        if !session.active {
            return Err(AppError::new(
                ErrorKind::InvalidState,
                "Start the stream before saving a frame.",
            ));
        }
        Ok(FrameCapture {
            frame_index: session.frame_count,
            fps: session.fps,
            processing_time_ms: session.processing_time_ms,
            settings: self.config.settings,
        })
    }

    #[must_use]
    pub const fn settings(&self) -> StreamSettings {
        self.config.settings
    }

    pub fn set_settings(&mut self, settings: StreamSettings) {
        debug!(
            resolution = settings.resolution.label(),
            quality = settings.quality.label(),
            "stream settings changed"
        );
        self.config.settings = settings;
    }

    #[must_use]
    pub fn view(&self) -> StreamView {
        StreamView::project(&self.session(), &self.config.settings)
    }

    /// Screen unmount.
    pub fn teardown(&mut self) {
        self.stop();
    }
}

impl<R> Drop for StreamSimulationLoop<R> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            self.generation.fetch_add(1, Ordering::SeqCst);
        }
    }
}
