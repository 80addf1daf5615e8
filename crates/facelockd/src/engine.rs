use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use facelock_core::enroll::EnrollError;
use facelock_core::types::{Frame, FrameError};
use facelock_core::{
    EnrollmentConfig, EnrollmentSession, FaceEncoder, MatchError, MatchOutcome, MatchingEngine,
    SampleOutcome,
};
use facelock_store::{StoreError, TemplateInfo, TemplateStore};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::config::Config;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("frame source error: {0}")]
    Source(#[from] FrameSourceError),
    #[error(transparent)]
    Enroll(#[from] EnrollError),
    #[error("no frame received within timeout")]
    FrameTimeout,
    #[error("no face detected in any captured frame")]
    NoFaceDetected,
    #[error("enrollment gave up after {frames} frames ({collected}/{required} samples)")]
    EnrollmentFailed {
        frames: usize,
        collected: usize,
        required: usize,
    },
    #[error("no enrolled templates")]
    NotEnrolled,
    #[error("engine thread exited")]
    ChannelClosed,
}

#[derive(Error, Debug)]
pub enum FrameSourceError {
    #[error("spool I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("frame decode error: {0}")]
    Decode(#[from] image::ImageError),
    #[error("invalid frame: {0}")]
    BadFrame(#[from] FrameError),
}

/// Where captured frames come from. The engine only ever pulls; a source
/// returns `Ok(None)` when no frame is available right now.
pub trait FrameSource: Send {
    fn next_frame(&mut self) -> Result<Option<Frame>, FrameSourceError>;
}

/// Frame source backed by a spool directory.
///
/// An external capture process drops image files into the directory; the
/// spool consumes them in file-name order and deletes each one after
/// reading. Files that fail to decode are deleted and skipped so one bad
/// drop cannot wedge the queue.
pub struct SpoolFrameSource {
    dir: PathBuf,
}

impl SpoolFrameSource {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }
}

impl FrameSource for SpoolFrameSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, FrameSourceError> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|p| p.is_file())
            .collect();
        files.sort();

        for path in files {
            let decoded = image::open(&path);
            std::fs::remove_file(&path)?;
            match decoded {
                Ok(img) => {
                    let gray = img.to_luma8();
                    let (w, h) = gray.dimensions();
                    return Ok(Some(Frame::new(gray.into_raw(), w, h)?));
                }
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "discarding undecodable spool file");
                }
            }
        }
        Ok(None)
    }
}

/// In-memory frame source; used by tests and by anything that already
/// holds its frames.
pub struct QueuedFrameSource {
    frames: VecDeque<Frame>,
}

impl QueuedFrameSource {
    pub fn new(frames: impl IntoIterator<Item = Frame>) -> Self {
        Self { frames: frames.into_iter().collect() }
    }
}

impl FrameSource for QueuedFrameSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, FrameSourceError> {
        Ok(self.frames.pop_front())
    }
}

/// Messages sent from D-Bus handlers to the engine thread.
enum EngineRequest {
    Enroll {
        identity: String,
        label: String,
        reply: oneshot::Sender<Result<TemplateInfo, EngineError>>,
    },
    Verify {
        identity_hint: String,
        reply: oneshot::Sender<Result<MatchOutcome, EngineError>>,
    },
    List {
        reply: oneshot::Sender<Result<Vec<TemplateInfo>, EngineError>>,
    },
    Remove {
        id: String,
        reply: oneshot::Sender<Result<bool, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T, EngineError>>) -> EngineRequest,
    ) -> Result<T, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Run a full enrollment for an identity and persist the template.
    pub async fn enroll(&self, identity: String, label: String) -> Result<TemplateInfo, EngineError> {
        self.request(|reply| EngineRequest::Enroll { identity, label, reply }).await
    }

    /// Encode one probe and match it against all stored templates.
    pub async fn verify(&self, identity_hint: String) -> Result<MatchOutcome, EngineError> {
        self.request(|reply| EngineRequest::Verify { identity_hint, reply }).await
    }

    pub async fn list(&self) -> Result<Vec<TemplateInfo>, EngineError> {
        self.request(|reply| EngineRequest::List { reply }).await
    }

    pub async fn remove(&self, id: String) -> Result<bool, EngineError> {
        self.request(|reply| EngineRequest::Remove { id, reply }).await
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// The thread owns the store connection, the encoder and the frame
/// source; everything else talks to it through the handle.
pub fn spawn_engine(
    config: Config,
    store: TemplateStore,
    mut source: Box<dyn FrameSource>,
) -> EngineHandle {
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("facelock-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            let encoder = FaceEncoder::default();
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Enroll { identity, label, reply } => {
                        let result =
                            run_enroll(&config, &store, source.as_mut(), &identity, &label);
                        let _ = reply.send(result);
                    }
                    EngineRequest::Verify { identity_hint, reply } => {
                        let result = run_verify(
                            &config,
                            &store,
                            source.as_mut(),
                            &encoder,
                            &identity_hint,
                        );
                        let _ = reply.send(result);
                    }
                    EngineRequest::List { reply } => {
                        let _ = reply.send(store.list().map_err(EngineError::from));
                    }
                    EngineRequest::Remove { id, reply } => {
                        let _ = reply.send(store.remove(&id).map_err(EngineError::from));
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .expect("failed to spawn engine thread");

    EngineHandle { tx }
}

/// Block until the source yields a frame, up to the configured timeout.
fn wait_for_frame(
    config: &Config,
    source: &mut dyn FrameSource,
) -> Result<Frame, EngineError> {
    let deadline = Instant::now() + Duration::from_millis(config.frame_timeout_ms);
    loop {
        if let Some(frame) = source.next_frame()? {
            return Ok(frame);
        }
        if Instant::now() >= deadline {
            return Err(EngineError::FrameTimeout);
        }
        std::thread::sleep(Duration::from_millis(config.frame_poll_ms));
    }
}

/// Drive an enrollment session over spooled frames until it completes or
/// the frame budget runs out.
fn run_enroll(
    config: &Config,
    store: &TemplateStore,
    source: &mut dyn FrameSource,
    identity: &str,
    label: &str,
) -> Result<TemplateInfo, EngineError> {
    let mut session = EnrollmentSession::new(EnrollmentConfig {
        samples_required: config.samples_per_enroll,
        ..EnrollmentConfig::default()
    });

    let mut frames = 0usize;
    while frames < config.max_enroll_frames {
        let frame = wait_for_frame(config, source)?;
        frames += 1;

        match session.offer_frame(&frame)? {
            SampleOutcome::Accepted { collected, required } => {
                tracing::debug!(collected, required, "enroll: sample accepted");
            }
            SampleOutcome::Rejected(reason) => {
                tracing::debug!(%reason, "enroll: frame rejected");
            }
            SampleOutcome::Complete(encoding) => {
                let template = store.save_template(identity, label, &encoding)?;
                store.record_auth(identity, "face", "enrolled", label)?;
                tracing::info!(identity, id = %template.id, frames, "enrollment complete");
                return Ok(TemplateInfo {
                    id: template.id,
                    identity: template.identity,
                    label: template.label,
                    created_at: template.created_at,
                });
            }
        }
    }

    store.record_auth(identity, "face", "enroll_failed", "frame budget exhausted")?;
    Err(EngineError::EnrollmentFailed {
        frames,
        collected: session.collected(),
        required: session.required(),
    })
}

/// Encode probes from the spool until one carries a face, then match it.
fn run_verify(
    config: &Config,
    store: &TemplateStore,
    source: &mut dyn FrameSource,
    encoder: &FaceEncoder,
    identity_hint: &str,
) -> Result<MatchOutcome, EngineError> {
    let templates = store.load_all_templates()?;
    if templates.is_empty() {
        store.record_auth(identity_hint, "face", "error", "no enrolled templates")?;
        return Err(EngineError::NotEnrolled);
    }

    for attempt in 0..config.max_verify_frames {
        let frame = wait_for_frame(config, source)?;
        let probe = match encoder.encode(&frame) {
            Ok(probe) => probe,
            Err(err) => {
                tracing::debug!(attempt, error = %err, "verify: frame did not encode");
                continue;
            }
        };

        let outcome = MatchingEngine::new()
            .authenticate(&probe, &templates, config.match_threshold)
            .map_err(|e| match e {
                MatchError::NoEnrolledTemplates => EngineError::NotEnrolled,
            })?;

        store.record_auth(
            outcome.identity.as_deref().unwrap_or(identity_hint),
            "face",
            if outcome.accepted { "accept" } else { "reject" },
            &format!("distance {:.4}", outcome.distance),
        )?;
        return Ok(outcome);
    }

    store.record_auth(identity_hint, "face", "error", "no face detected")?;
    Err(EngineError::NoFaceDetected)
}
