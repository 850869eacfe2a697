//! Firmware image replacement and restart
//!
//! The upload is staged next to the running binary:
//! 1. `begin` creates `<binary>.new`
//! 2. chunks are appended as they arrive
//! 3. `finalize(true)` fsyncs, chmods 755, moves the current binary to
//!    `<binary>.prev` and the staged one into place
//! 4. the restart hook exits with code 42, systemd `Restart=always` brings
//!    up the new binary

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use onair::hal::{ImageWriter, Restart};
use tokio::sync::oneshot;
use tracing::{info, warn};

/// Maximum image size (100 MB)
pub const MAX_IMAGE_SIZE: u64 = 100 * 1024 * 1024;

/// Exit code used to signal "restart with new binary"
pub const UPDATE_EXIT_CODE: i32 = 42;

pub struct StagedImage {
    binary_path: PathBuf,
    staging_path: PathBuf,
    backup_path: PathBuf,
    file: Option<File>,
    written: u64,
}

impl StagedImage {
    /// Stage updates for the running executable.
    pub fn for_current_exe() -> Result<Self> {
        let binary_path =
            std::env::current_exe().context("Failed to determine current executable path")?;
        Self::new(binary_path)
    }

    pub fn new(binary_path: PathBuf) -> Result<Self> {
        let name = binary_path
            .file_name()
            .context("Binary path has no file name")?
            .to_string_lossy()
            .into_owned();
        let dir = binary_path
            .parent()
            .context("Binary has no parent directory")?;
        let staging_path = dir.join(format!("{name}.new"));
        let backup_path = dir.join(format!("{name}.prev"));

        Ok(Self {
            binary_path,
            staging_path,
            backup_path,
            file: None,
            written: 0,
        })
    }

    pub fn staging_path(&self) -> &Path {
        &self.staging_path
    }

    fn discard(&mut self) {
        self.file = None;
        let _ = fs::remove_file(&self.staging_path);
    }

    fn install(&mut self) -> io::Result<()> {
        let file = self
            .file
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no staged image"))?;
        file.sync_all()?;
        drop(file);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.staging_path, fs::Permissions::from_mode(0o755))?;
        }

        if self.binary_path.exists() {
            fs::rename(&self.binary_path, &self.backup_path)?;
            info!("Backed up current binary to {:?}", self.backup_path);
        }

        if let Err(e) = fs::rename(&self.staging_path, &self.binary_path) {
            warn!("Failed to install new binary: {}. Rolling back.", e);
            if self.backup_path.exists() {
                let _ = fs::rename(&self.backup_path, &self.binary_path);
            }
            return Err(e);
        }
        Ok(())
    }
}

impl ImageWriter for StagedImage {
    fn begin(&mut self, expected_size: Option<u64>) -> io::Result<()> {
        if let Some(size) = expected_size.filter(|s| *s > MAX_IMAGE_SIZE) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("image too large: {size} bytes (max {MAX_IMAGE_SIZE} bytes)"),
            ));
        }

        // Clean up any leftover staging file
        self.discard();
        self.file = Some(File::create(&self.staging_path)?);
        self.written = 0;
        info!("Staging firmware image at {:?}", self.staging_path());
        Ok(())
    }

    fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<usize> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no staged image"))?;

        let room = MAX_IMAGE_SIZE.saturating_sub(self.written);
        let accepted = chunk.len().min(room as usize);
        file.write_all(&chunk[..accepted])?;
        self.written += accepted as u64;
        Ok(accepted)
    }

    fn finalize(&mut self, mark_complete: bool) -> io::Result<()> {
        if !mark_complete {
            self.discard();
            return Ok(());
        }
        let result = self.install();
        if result.is_err() {
            self.discard();
        } else {
            info!("Installed {} byte image at {:?}", self.written, self.binary_path);
        }
        result
    }
}

/// Restart hook: hands the request to `main`, which exits with
/// [`UPDATE_EXIT_CODE`] once the upload response is on its way.
pub struct ExitRestart {
    tx: Option<oneshot::Sender<()>>,
}

impl ExitRestart {
    pub fn new() -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx: Some(tx) }, rx)
    }
}

/// Wait for the restart hook to fire.
///
/// `None` means the update surface is off: the hook was never handed to an
/// update gate, so this never resolves.
pub async fn restart_requested(rx: Option<oneshot::Receiver<()>>) -> Result<()> {
    match rx {
        Some(rx) => rx.await.context("Control loop stopped unexpectedly"),
        None => std::future::pending().await,
    }
}

impl Restart for ExitRestart {
    fn restart(&mut self) {
        match self.tx.take() {
            Some(tx) => {
                info!("Restart requested");
                let _ = tx.send(());
            }
            None => warn!("Restart already requested"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn staged(dir: &Path) -> StagedImage {
        let binary = dir.join("onair-firmware");
        fs::write(&binary, b"old").unwrap();
        StagedImage::new(binary).unwrap()
    }

    #[test]
    fn test_install_replaces_binary_and_keeps_backup() {
        let dir = tempfile::tempdir().unwrap();
        let mut image = staged(dir.path());

        image.begin(None).unwrap();
        assert_eq!(image.write_chunk(b"new ").unwrap(), 4);
        assert_eq!(image.write_chunk(b"image").unwrap(), 5);
        image.finalize(true).unwrap();

        let binary = dir.path().join("onair-firmware");
        assert_eq!(fs::read(&binary).unwrap(), b"new image");
        assert_eq!(fs::read(dir.path().join("onair-firmware.prev")).unwrap(), b"old");
        assert!(!image.staging_path().exists());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&binary).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o755);
        }
    }

    #[test]
    fn test_abandon_removes_staging() {
        let dir = tempfile::tempdir().unwrap();
        let mut image = staged(dir.path());

        image.begin(None).unwrap();
        image.write_chunk(b"partial").unwrap();
        assert!(image.staging_path().exists());

        image.finalize(false).unwrap();
        assert!(!image.staging_path().exists());
        assert_eq!(fs::read(dir.path().join("onair-firmware")).unwrap(), b"old");
    }

    #[test]
    fn test_write_without_begin() {
        let dir = tempfile::tempdir().unwrap();
        let mut image = staged(dir.path());
        assert!(image.write_chunk(b"x").is_err());
        assert!(image.finalize(true).is_err());
    }

    #[test]
    fn test_oversized_image_refused() {
        let dir = tempfile::tempdir().unwrap();
        let mut image = staged(dir.path());
        assert!(image.begin(Some(MAX_IMAGE_SIZE + 1)).is_err());
    }

    #[tokio::test]
    async fn test_restart_wait_without_update_surface_stays_pending() {
        let (restart, _rx) = ExitRestart::new();
        // Dropped the way the controller drops an unused hook
        drop(restart);
        let waited =
            tokio::time::timeout(Duration::from_millis(100), restart_requested(None)).await;
        assert!(waited.is_err());
    }

    #[tokio::test]
    async fn test_restart_wait_resolves_on_request() {
        let (mut restart, rx) = ExitRestart::new();
        restart.restart();
        restart_requested(Some(rx)).await.unwrap();

        let (restart, rx) = ExitRestart::new();
        drop(restart);
        assert!(restart_requested(Some(rx)).await.is_err());
    }

    #[test]
    fn test_restart_fires_once() {
        let (mut restart, mut rx) = ExitRestart::new();
        restart.restart();
        restart.restart();
        assert!(rx.try_recv().is_ok());
    }
}
