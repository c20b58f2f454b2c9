//! Voice memo and video capture sessions.
//!
//! A session is owned by the capture control that started it and is torn
//! down when recording stops or fails. Chunks arrive while `Recording`; a stop
//! request moves to `Stopping` until the recorder flushes its last chunk, and
//! `finish` turns the buffered chunks into an attachment.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use thiserror::Error;

use crate::apps::Attachment;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    Idle,
    Recording,
    Stopping,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CaptureError {
    #[error("cannot {action} while {state:?}")]
    InvalidTransition {
        state: RecorderState,
        action: &'static str,
    },
    #[error("recording produced no data")]
    Empty,
}

#[derive(Debug)]
pub struct CaptureSession {
    filename_prefix: String,
    mime_type: String,
    state: RecorderState,
    chunks: Vec<Vec<u8>>,
}

impl CaptureSession {
    pub fn new(filename_prefix: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            filename_prefix: filename_prefix.into(),
            mime_type: mime_type.into(),
            state: RecorderState::Idle,
            chunks: Vec::new(),
        }
    }

    /// Field report voice memos.
    pub fn voice_memo() -> Self {
        Self::new("voice-memo", "audio/webm")
    }

    /// Estimating walkthrough video.
    pub fn estimate_video() -> Self {
        Self::new("estimate-video", "video/webm")
    }

    pub fn state(&self) -> RecorderState {
        self.state
    }

    pub fn start(&mut self) -> Result<(), CaptureError> {
        self.require(RecorderState::Idle, "start")?;
        self.chunks.clear();
        self.state = RecorderState::Recording;
        Ok(())
    }

    /// Buffer recorder output. Empty chunks are dropped. Late chunks that
    /// arrive after a stop request are still kept.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Result<(), CaptureError> {
        if self.state == RecorderState::Idle {
            return Err(CaptureError::InvalidTransition {
                state: self.state,
                action: "record",
            });
        }
        if !chunk.is_empty() {
            self.chunks.push(chunk.to_vec());
        }
        Ok(())
    }

    pub fn stop(&mut self) -> Result<(), CaptureError> {
        self.require(RecorderState::Recording, "stop")?;
        self.state = RecorderState::Stopping;
        Ok(())
    }

    /// Complete a stopped recording. The session returns to `Idle` either way.
    pub fn finish(&mut self, now_ms: i64) -> Result<Attachment, CaptureError> {
        self.require(RecorderState::Stopping, "finish")?;
        self.state = RecorderState::Idle;

        let data = std::mem::take(&mut self.chunks).concat();
        if data.is_empty() {
            return Err(CaptureError::Empty);
        }

        Ok(Attachment {
            blob: format!("data:{};base64,{}", self.mime_type, STANDARD.encode(&data)),
            filename: format!("{}-{now_ms}.webm", self.filename_prefix),
            mime_type: self.mime_type.clone(),
        })
    }

    /// Discard everything, e.g. after a device error.
    pub fn abort(&mut self) {
        self.chunks.clear();
        self.state = RecorderState::Idle;
    }

    fn require(&self, state: RecorderState, action: &'static str) -> Result<(), CaptureError> {
        if self.state == state {
            Ok(())
        } else {
            Err(CaptureError::InvalidTransition {
                state: self.state,
                action,
            })
        }
    }
}
