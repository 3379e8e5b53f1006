//! Ambient audio routed through the shared audio graph.
//!
//! A streamed video player is preferred; when it cannot be bound the tour
//! decodes a local file instead. Both sit behind [`AudioBackend`] so the tour
//! only ever talks to [`AudioSync`].

use std::{fmt, fs, path::Path, time::Duration};

use thiserror::Error;

pub const VIDEO_ID_LEN: usize = 11;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("invalid video id {0:?}")]
    InvalidVideoId(String),
    #[error("media capability unavailable: {0}")]
    Unavailable(String),
    #[error("decoding {path}: {reason}")]
    Decode { path: String, reason: String },
    #[error("reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Handle of a node in the audio graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceHandle(pub u32);

/// Handle of a decoded buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub u32);

/// Messages understood by the embedded video player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerCommand {
    Play,
    Pause,
}

/// The audio graph and player surface the synchronizer drives.
pub trait MediaGraph {
    /// Route the hidden player's media element for `video_id` into the graph.
    fn bind_video_element(&mut self, video_id: &str) -> Result<SourceHandle, MediaError>;

    fn post_player_command(&mut self, source: SourceHandle, command: PlayerCommand) -> Result<(), MediaError>;

    fn decode_file(&mut self, path: &Path) -> Result<BufferHandle, MediaError>;

    /// Start a one-shot source for `buffer` at `offset`.
    fn start_buffer(&mut self, buffer: BufferHandle, offset: Duration) -> Result<SourceHandle, MediaError>;

    /// Stop a running source and report how long it played.
    fn stop_source(&mut self, source: SourceHandle) -> Duration;

    fn set_gain(&mut self, source: SourceHandle, gain: f32);
}

pub fn validate_video_id(id: &str) -> Result<(), MediaError> {
    let valid = id.len() == VIDEO_ID_LEN
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
    if valid {
        Ok(())
    } else {
        Err(MediaError::InvalidVideoId(id.to_string()))
    }
}

pub trait AudioBackend: fmt::Debug {
    fn kind(&self) -> &'static str;

    fn play(&mut self, graph: &mut dyn MediaGraph) -> Result<(), MediaError>;

    fn pause(&mut self, graph: &mut dyn MediaGraph) -> Result<(), MediaError>;

    fn set_volume(&mut self, graph: &mut dyn MediaGraph, volume: f32);

    fn is_playing(&self) -> bool;
}

#[derive(Debug)]
pub struct StreamedPlayer {
    source: SourceHandle,
    playing: bool,
}

impl StreamedPlayer {
    pub fn connect(graph: &mut dyn MediaGraph, video_id: &str) -> Result<Self, MediaError> {
        validate_video_id(video_id)?;
        let source = graph.bind_video_element(video_id)?;
        Ok(Self {
            source,
            playing: false,
        })
    }
}

impl AudioBackend for StreamedPlayer {
    fn kind(&self) -> &'static str {
        "stream"
    }

    fn play(&mut self, graph: &mut dyn MediaGraph) -> Result<(), MediaError> {
        graph.post_player_command(self.source, PlayerCommand::Play)?;
        self.playing = true;
        Ok(())
    }

    fn pause(&mut self, graph: &mut dyn MediaGraph) -> Result<(), MediaError> {
        graph.post_player_command(self.source, PlayerCommand::Pause)?;
        self.playing = false;
        Ok(())
    }

    fn set_volume(&mut self, graph: &mut dyn MediaGraph, volume: f32) {
        graph.set_gain(self.source, volume);
    }

    fn is_playing(&self) -> bool {
        self.playing
    }
}

/// Decoded-file player. Buffer sources are one-shot, so every resume starts a
/// fresh source at the accumulated offset.
#[derive(Debug)]
pub struct BufferedPlayer {
    buffer: BufferHandle,
    source: Option<SourceHandle>,
    offset: Duration,
    volume: f32,
}

impl BufferedPlayer {
    pub fn load(graph: &mut dyn MediaGraph, path: &Path) -> Result<Self, MediaError> {
        let buffer = graph.decode_file(path)?;
        Ok(Self {
            buffer,
            source: None,
            offset: Duration::ZERO,
            volume: 1.0,
        })
    }

    pub fn offset(&self) -> Duration {
        self.offset
    }
}

impl AudioBackend for BufferedPlayer {
    fn kind(&self) -> &'static str {
        "buffer"
    }

    fn play(&mut self, graph: &mut dyn MediaGraph) -> Result<(), MediaError> {
        if self.source.is_some() {
            return Ok(());
        }
        let source = graph.start_buffer(self.buffer, self.offset)?;
        graph.set_gain(source, self.volume);
        self.source = Some(source);
        Ok(())
    }

    fn pause(&mut self, graph: &mut dyn MediaGraph) -> Result<(), MediaError> {
        if let Some(source) = self.source.take() {
            self.offset += graph.stop_source(source);
        }
        Ok(())
    }

    fn set_volume(&mut self, graph: &mut dyn MediaGraph, volume: f32) {
        self.volume = volume;
        if let Some(source) = self.source {
            graph.set_gain(source, volume);
        }
    }

    fn is_playing(&self) -> bool {
        self.source.is_some()
    }
}

/// Ambient audio tied to user gestures and XR session edges.
pub struct AudioSync {
    graph: Box<dyn MediaGraph>,
    backend: Option<Box<dyn AudioBackend>>,
    unlocked: bool,
    resume_after_session: bool,
    volume: f32,
}

impl fmt::Debug for AudioSync {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioSync")
            .field("backend", &self.backend)
            .field("unlocked", &self.unlocked)
            .field("resume_after_session", &self.resume_after_session)
            .field("volume", &self.volume)
            .finish()
    }
}

impl AudioSync {
    /// Bind the streamed source for `video_id`, falling back to decoding
    /// `fallback`. With neither available the tour stays silent.
    pub fn connect(mut graph: Box<dyn MediaGraph>, video_id: Option<&str>, fallback: Option<&Path>) -> Self {
        let mut backend: Option<Box<dyn AudioBackend>> = None;

        if let Some(id) = video_id {
            match StreamedPlayer::connect(graph.as_mut(), id) {
                Ok(player) => backend = Some(Box::new(player)),
                Err(err) => log::info!("streamed audio unavailable ({err}); trying local fallback"),
            }
        }
        if backend.is_none() {
            if let Some(path) = fallback {
                match BufferedPlayer::load(graph.as_mut(), path) {
                    Ok(player) => backend = Some(Box::new(player)),
                    Err(err) => log::warn!("audio fallback failed: {err}"),
                }
            }
        }
        if let Some(backend) = &backend {
            log::info!("ambient audio ready ({} backend)", backend.kind());
        }

        Self {
            graph,
            backend,
            unlocked: false,
            resume_after_session: false,
            volume: 1.0,
        }
    }

    /// A tour with no audio source.
    pub fn silent() -> Self {
        Self::connect(Box::new(HeadlessMediaGraph::default()), None, None)
    }

    pub fn backend_kind(&self) -> Option<&'static str> {
        self.backend.as_ref().map(|backend| backend.kind())
    }

    pub fn is_playing(&self) -> bool {
        self.backend.as_ref().is_some_and(|backend| backend.is_playing())
    }

    pub fn is_unlocked(&self) -> bool {
        self.unlocked
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// The first gesture lifts the autoplay block and starts playback.
    pub fn on_user_gesture(&mut self) {
        if self.unlocked {
            return;
        }
        self.unlocked = true;
        self.play();
    }

    pub fn on_session_start(&mut self) {
        self.resume_after_session = self.is_playing();
        if self.resume_after_session {
            self.pause();
        }
    }

    pub fn on_session_end(&mut self) {
        if std::mem::take(&mut self.resume_after_session) {
            self.play();
        }
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
        if let Some(backend) = self.backend.as_mut() {
            backend.set_volume(self.graph.as_mut(), self.volume);
        }
    }

    fn play(&mut self) {
        if !self.unlocked {
            return;
        }
        if let Some(backend) = self.backend.as_mut() {
            if let Err(err) = backend.play(self.graph.as_mut()) {
                log::warn!("audio play failed: {err}");
            }
        }
    }

    fn pause(&mut self) {
        if let Some(backend) = self.backend.as_mut() {
            if let Err(err) = backend.pause(self.graph.as_mut()) {
                log::warn!("audio pause failed: {err}");
            }
        }
    }
}

/// Graph used by the command-line driver: there is no video player, and
/// decoding only checks that the file can be read.
#[derive(Debug, Default)]
pub struct HeadlessMediaGraph {
    next_handle: u32,
}

impl HeadlessMediaGraph {
    fn handle(&mut self) -> u32 {
        self.next_handle += 1;
        self.next_handle
    }
}

impl MediaGraph for HeadlessMediaGraph {
    fn bind_video_element(&mut self, _video_id: &str) -> Result<SourceHandle, MediaError> {
        Err(MediaError::Unavailable("no video player in headless mode".into()))
    }

    fn post_player_command(&mut self, _source: SourceHandle, command: PlayerCommand) -> Result<(), MediaError> {
        Err(MediaError::Unavailable(format!("cannot send {command:?} without a player")))
    }

    fn decode_file(&mut self, path: &Path) -> Result<BufferHandle, MediaError> {
        let bytes = fs::read(path).map_err(|source| MediaError::Io {
            path: path.display().to_string(),
            source,
        })?;
        if bytes.is_empty() {
            return Err(MediaError::Decode {
                path: path.display().to_string(),
                reason: "empty file".into(),
            });
        }
        log::debug!("audio fallback {} ({} bytes)", path.display(), bytes.len());
        Ok(BufferHandle(self.handle()))
    }

    fn start_buffer(&mut self, _buffer: BufferHandle, offset: Duration) -> Result<SourceHandle, MediaError> {
        log::debug!("audio buffer started at {:.2}s", offset.as_secs_f32());
        Ok(SourceHandle(self.handle()))
    }

    fn stop_source(&mut self, _source: SourceHandle) -> Duration {
        Duration::ZERO
    }

    fn set_gain(&mut self, source: SourceHandle, gain: f32) {
        log::debug!("gain {gain:.2} on source {}", source.0);
    }
}
