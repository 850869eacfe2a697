//! Firmware update gate
//!
//! Chunked pass-through from the administrative upload to the image writer:
//! 1. `start` opens a transaction with unknown size
//! 2. `chunk` forwards bytes verbatim, a short or failed write ends the
//!    transaction
//! 3. `end` finalizes and, on success, restarts the device exactly once
//!
//! Nothing is validated. The byte count and SHA-256 of what was written are
//! reported for the operator only.

use std::fmt;
use std::io;

use bytes::Bytes;
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{info, warn};

use crate::hal::{ImageWriter, Restart};

/// One step of an upload, as delivered by the administrative surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateRequest {
    Start,
    Chunk(Bytes),
    End,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "phase")]
pub enum UpdatePhase {
    #[default]
    Idle,
    Receiving { written: u64 },
    Failed,
}

/// Successful step outcome, rendered as status text for the uploader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateReport {
    Started,
    Accepted { written: u64 },
    Complete { bytes: u64, sha256: String },
}

impl fmt::Display for UpdateReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateReport::Started => write!(f, "Update started"),
            UpdateReport::Accepted { written } => write!(f, "Received {written} bytes"),
            UpdateReport::Complete { bytes, sha256 } => {
                write!(f, "Update Success: {bytes} bytes (sha256 {sha256}). Rebooting...")
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("firmware update is disabled")]
    Disabled,
    #[error("no update in progress")]
    NotStarted,
    #[error("update aborted by an earlier failure, start again")]
    Aborted,
    #[error("failed to open update: {0}")]
    Begin(#[source] io::Error),
    #[error("short write: {written} of {expected} bytes")]
    ShortWrite { expected: usize, written: usize },
    #[error("write failed: {0}")]
    Write(#[source] io::Error),
    #[error("finalize failed: {0}")]
    Finalize(#[source] io::Error),
}

pub struct UpdateGate {
    writer: Box<dyn ImageWriter + Send>,
    restart: Box<dyn Restart + Send>,
    phase: UpdatePhase,
    hasher: Sha256,
}

impl UpdateGate {
    pub fn new(writer: Box<dyn ImageWriter + Send>, restart: Box<dyn Restart + Send>) -> Self {
        Self {
            writer,
            restart,
            phase: UpdatePhase::Idle,
            hasher: Sha256::new(),
        }
    }

    pub fn phase(&self) -> UpdatePhase {
        self.phase
    }

    pub fn handle(&mut self, request: UpdateRequest) -> Result<UpdateReport, UpdateError> {
        match request {
            UpdateRequest::Start => self.start(),
            UpdateRequest::Chunk(bytes) => self.chunk(&bytes),
            UpdateRequest::End => self.end(),
        }
    }

    pub fn start(&mut self) -> Result<UpdateReport, UpdateError> {
        if let UpdatePhase::Receiving { written } = self.phase {
            warn!("Abandoning update after {} bytes", written);
            if let Err(e) = self.writer.finalize(false) {
                warn!("Failed to close abandoned update: {}", e);
            }
        }

        self.hasher = Sha256::new();
        if let Err(e) = self.writer.begin(None) {
            self.phase = UpdatePhase::Failed;
            return Err(UpdateError::Begin(e));
        }

        info!("Firmware update started");
        self.phase = UpdatePhase::Receiving { written: 0 };
        Ok(UpdateReport::Started)
    }

    pub fn chunk(&mut self, chunk: &[u8]) -> Result<UpdateReport, UpdateError> {
        let written = match self.phase {
            UpdatePhase::Receiving { written } => written,
            UpdatePhase::Idle => return Err(UpdateError::NotStarted),
            UpdatePhase::Failed => return Err(UpdateError::Aborted),
        };

        let accepted = match self.writer.write_chunk(chunk) {
            Ok(n) => n,
            Err(e) => {
                warn!("Update write failed after {} bytes: {}", written, e);
                self.phase = UpdatePhase::Failed;
                return Err(UpdateError::Write(e));
            }
        };

        if accepted != chunk.len() {
            warn!(
                "Update short write: {} of {} bytes after {} bytes",
                accepted,
                chunk.len(),
                written
            );
            self.phase = UpdatePhase::Failed;
            return Err(UpdateError::ShortWrite {
                expected: chunk.len(),
                written: accepted,
            });
        }

        self.hasher.update(chunk);
        let written = written + accepted as u64;
        self.phase = UpdatePhase::Receiving { written };
        Ok(UpdateReport::Accepted { written })
    }

    pub fn end(&mut self) -> Result<UpdateReport, UpdateError> {
        let bytes = match self.phase {
            UpdatePhase::Receiving { written } => written,
            UpdatePhase::Idle => return Err(UpdateError::NotStarted),
            UpdatePhase::Failed => {
                self.phase = UpdatePhase::Idle;
                return Err(UpdateError::Aborted);
            }
        };

        self.phase = UpdatePhase::Idle;
        self.writer.finalize(true).map_err(UpdateError::Finalize)?;

        let hasher = std::mem::replace(&mut self.hasher, Sha256::new());
        let sha256 = hex::encode(hasher.finalize());
        info!("Update complete: {} bytes, sha256 {}", bytes, sha256);

        self.restart.restart();
        Ok(UpdateReport::Complete { bytes, sha256 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{FakeImage, FakeRestart};

    fn gate() -> (UpdateGate, FakeImage, FakeRestart) {
        let image = FakeImage::default();
        let restart = FakeRestart::default();
        let gate = UpdateGate::new(Box::new(image.clone()), Box::new(restart.clone()));
        (gate, image, restart)
    }

    #[test]
    fn successful_upload_restarts_once() {
        let (mut gate, image, restart) = gate();

        assert_eq!(gate.handle(UpdateRequest::Start).unwrap(), UpdateReport::Started);
        gate.handle(UpdateRequest::Chunk(Bytes::from_static(b"abc")))
            .unwrap();
        let report = gate
            .handle(UpdateRequest::Chunk(Bytes::from_static(b"def")))
            .unwrap();
        assert_eq!(report, UpdateReport::Accepted { written: 6 });

        let report = gate.handle(UpdateRequest::End).unwrap();
        let expected = hex::encode(Sha256::digest(b"abcdef"));
        assert_eq!(
            report,
            UpdateReport::Complete {
                bytes: 6,
                sha256: expected
            }
        );
        assert!(report.to_string().starts_with("Update Success"));

        assert_eq!(restart.count(), 1);
        let log = image.log.lock().unwrap();
        assert_eq!(log.data, b"abcdef");
        assert_eq!(log.finalized, vec![true]);
        assert_eq!(gate.phase(), UpdatePhase::Idle);
    }

    #[test]
    fn short_write_fails_without_finalize_or_restart() {
        let (mut gate, image, restart) = gate();
        gate.start().unwrap();
        image.log.lock().unwrap().short_by = 1;

        let err = gate.chunk(b"firmware").unwrap_err();
        assert!(matches!(
            err,
            UpdateError::ShortWrite {
                expected: 8,
                written: 7
            }
        ));
        assert_eq!(gate.phase(), UpdatePhase::Failed);

        // Later chunks are refused
        image.log.lock().unwrap().short_by = 0;
        assert!(matches!(gate.chunk(b"more"), Err(UpdateError::Aborted)));

        assert!(matches!(gate.end(), Err(UpdateError::Aborted)));
        assert!(image.log.lock().unwrap().finalized.is_empty());
        assert_eq!(restart.count(), 0);
    }

    #[test]
    fn finalize_failure_reports_and_does_not_restart() {
        let (mut gate, image, restart) = gate();
        image.log.lock().unwrap().fail_finalize = true;
        gate.start().unwrap();
        gate.chunk(b"x").unwrap();

        let err = gate.end().unwrap_err();
        assert!(matches!(err, UpdateError::Finalize(_)));
        assert!(err.to_string().starts_with("finalize failed"));
        assert_eq!(restart.count(), 0);
    }

    #[test]
    fn chunk_and_end_without_start() {
        let (mut gate, image, restart) = gate();
        assert!(matches!(gate.chunk(b"x"), Err(UpdateError::NotStarted)));
        assert!(matches!(gate.end(), Err(UpdateError::NotStarted)));
        assert_eq!(image.log.lock().unwrap().begins, 0);
        assert_eq!(restart.count(), 0);
    }

    #[test]
    fn begin_failure_marks_transaction_failed() {
        let (mut gate, image, _) = gate();
        image.log.lock().unwrap().fail_begin = true;

        assert!(matches!(gate.start(), Err(UpdateError::Begin(_))));
        assert_eq!(gate.phase(), UpdatePhase::Failed);
    }

    #[test]
    fn restart_abandons_open_transaction() {
        let (mut gate, image, restart) = gate();
        gate.start().unwrap();
        gate.chunk(b"old").unwrap();

        gate.start().unwrap();
        gate.chunk(b"new").unwrap();
        let report = gate.end().unwrap();

        assert!(matches!(report, UpdateReport::Complete { bytes: 3, .. }));
        let log = image.log.lock().unwrap();
        assert_eq!(log.begins, 2);
        assert_eq!(log.finalized, vec![false, true]);
        assert_eq!(log.data, b"new");
        assert_eq!(restart.count(), 1);
    }

    #[test]
    fn failed_transaction_recovers_on_start() {
        let (mut gate, image, restart) = gate();
        gate.start().unwrap();
        image.log.lock().unwrap().short_by = 2;
        assert!(gate.chunk(b"abcd").is_err());

        image.log.lock().unwrap().short_by = 0;
        gate.start().unwrap();
        gate.chunk(b"abcd").unwrap();
        gate.end().unwrap();
        assert_eq!(restart.count(), 1);
    }
}
