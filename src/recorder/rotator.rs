use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Local, TimeDelta};

use super::retention_fs::RetentionRing;
use super::sink_avi::MjpegAviWriter;
use crate::core::{Clock, ConfigError, FilesystemError, PipelineError};

/// The file a rotator is currently appending to.
pub struct ActiveFile {
    writer: MjpegAviWriter,
    created_at: DateTime<Local>,
}

impl ActiveFile {
    pub fn path(&self) -> &Path {
        self.writer.path()
    }

    pub fn created_at(&self) -> DateTime<Local> {
        self.created_at
    }

    pub fn frame_count(&self) -> u32 {
        self.writer.frame_count()
    }

    pub fn elapsed(&self, now: DateTime<Local>) -> TimeDelta {
        now - self.created_at
    }
}

/// One connection's output: an active file, rotated on age, created through
/// the shared [`RetentionRing`].
pub struct VideoFileRotator {
    retention: Arc<RetentionRing>,
    clock: Arc<dyn Clock>,
    rotation_interval: TimeDelta,
    fps: u32,
    dimensions: Option<(u32, u32)>,
    active: Option<ActiveFile>,
}

impl VideoFileRotator {
    pub fn new(
        retention: Arc<RetentionRing>,
        clock: Arc<dyn Clock>,
        rotation_interval: TimeDelta,
        fps: u32,
    ) -> Self {
        Self {
            retention,
            clock,
            rotation_interval,
            fps,
            dimensions: None,
            active: None,
        }
    }

    pub fn active(&self) -> Option<&ActiveFile> {
        self.active.as_ref()
    }

    /// Opens a file if none is open. The first call pins the frame size for
    /// the lifetime of this rotator; a different size afterwards is a
    /// configuration error, frames are never rescaled.
    pub fn ensure_active_file(&mut self, width: u32, height: u32) -> Result<&mut ActiveFile, PipelineError> {
        match self.dimensions {
            Some((w, h)) if (w, h) != (width, height) => {
                return Err(ConfigError::DimensionMismatch {
                    expected_width: w,
                    expected_height: h,
                    width,
                    height,
                }
                .into());
            }
            Some(_) => {}
            None => self.dimensions = Some((width, height)),
        }

        let active = match self.active.take() {
            Some(active) => active,
            None => self.open(width, height)?,
        };
        Ok(self.active.insert(active))
    }

    pub fn write_frame(&mut self, jpeg: &[u8], width: u32, height: u32) -> Result<(), PipelineError> {
        let active = self.ensure_active_file(width, height)?;
        active
            .writer
            .write_frame(jpeg)
            .map_err(|e| FilesystemError::new("write frame", active.writer.path(), e))?;
        Ok(())
    }

    /// Closes the active file and opens the next one once it has reached the
    /// rotation interval (or the container size limit). Returns whether it
    /// rotated.
    pub fn maybe_rotate(&mut self) -> Result<bool, PipelineError> {
        let due = match &self.active {
            Some(active) => {
                active.elapsed(self.clock.now()) >= self.rotation_interval || active.writer.is_full()
            }
            None => false,
        };
        if !due {
            return Ok(false);
        }

        self.close()?;
        if let Some((w, h)) = self.dimensions {
            self.active = Some(self.open(w, h)?);
        }
        Ok(true)
    }

    /// Finalizes the active file, if any, without opening a new one.
    pub fn close(&mut self) -> Result<Option<PathBuf>, FilesystemError> {
        let Some(active) = self.active.take() else {
            return Ok(None);
        };
        let path = active.path().to_path_buf();
        let frames = active.frame_count();
        self.retention.release(&path);
        active
            .writer
            .finalize()
            .map_err(|e| FilesystemError::new("finalize", &path, e))?;
        log::info!("[rotator] closed {:?} ({} frames)", path, frames);
        Ok(Some(path))
    }

    fn open(&self, width: u32, height: u32) -> Result<ActiveFile, FilesystemError> {
        let created_at = self.clock.now();
        let (path, file) = self.retention.create_next(&created_at)?;
        let writer = match MjpegAviWriter::create(file, path.clone(), width, height, self.fps) {
            Ok(writer) => writer,
            Err(e) => {
                self.retention.release(&path);
                return Err(FilesystemError::new("write header", &path, e));
            }
        };
        Ok(ActiveFile { writer, created_at })
    }
}

impl Drop for VideoFileRotator {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::warn!("[rotator] close on drop failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ManualClock;
    use crate::recorder::sink_avi::read_avi_info;
    use chrono::TimeZone;

    const JPEG: &[u8] = b"\xff\xd8fake\xff\xd9";

    fn setup(capacity: usize) -> (tempfile::TempDir, Arc<RetentionRing>, Arc<ManualClock>) {
        let dir = tempfile::tempdir().unwrap();
        let ring = Arc::new(RetentionRing::new(dir.path().to_path_buf(), capacity).unwrap());
        let clock = Arc::new(ManualClock::new(
            Local.with_ymd_and_hms(2024, 6, 1, 20, 0, 0).unwrap(),
        ));
        (dir, ring, clock)
    }

    #[test]
    fn rotation_scenario_keeps_newest_three() {
        let (_dir, ring, clock) = setup(3);
        let mut rot = VideoFileRotator::new(ring.clone(), clock.clone(), TimeDelta::minutes(60), 10);

        rot.write_frame(JPEG, 640, 480).unwrap();
        let f1 = rot.active().unwrap().path().to_path_buf();
        assert!(!rot.maybe_rotate().unwrap());

        let mut created = vec![f1.clone()];
        for cycle in 0..3 {
            clock.advance(TimeDelta::minutes(61));
            rot.write_frame(JPEG, 640, 480).unwrap();
            assert!(rot.maybe_rotate().unwrap(), "cycle {cycle}");
            created.push(rot.active().unwrap().path().to_path_buf());
            assert!(ring.entries().unwrap().len() <= 3);
        }

        // F1 musste vor F4 weichen
        assert_eq!(ring.entries().unwrap(), created[1..].to_vec());
        assert!(!f1.exists());
        assert_eq!(ring.evicted_while_open(), 0);
    }

    #[test]
    fn second_writer_on_a_full_ring_evicts_the_open_file() {
        let (_dir, ring, clock) = setup(1);
        let mut a = VideoFileRotator::new(ring.clone(), clock.clone(), TimeDelta::minutes(60), 10);
        let mut b = VideoFileRotator::new(ring.clone(), clock.clone(), TimeDelta::minutes(60), 10);

        a.write_frame(JPEG, 64, 48).unwrap();
        clock.advance(TimeDelta::seconds(5));
        b.write_frame(JPEG, 64, 48).unwrap();

        assert_eq!(ring.entries().unwrap().len(), 1);
        assert_eq!(ring.evicted_while_open(), 1);

        a.close().unwrap();
        b.close().unwrap();
        assert_eq!(ring.open_files(), 0);
    }

    #[test]
    fn dimension_change_is_a_configuration_error() {
        let (_dir, ring, clock) = setup(5);
        let mut rot = VideoFileRotator::new(ring, clock, TimeDelta::minutes(60), 10);

        rot.write_frame(JPEG, 640, 480).unwrap();
        let err = rot.write_frame(JPEG, 320, 240).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Configuration(ConfigError::DimensionMismatch { width: 320, .. })
        ));
    }

    #[test]
    fn close_finalizes_without_rotating() {
        let (dir, ring, clock) = setup(5);
        let mut rot = VideoFileRotator::new(ring.clone(), clock, TimeDelta::minutes(60), 10);

        for _ in 0..4 {
            rot.write_frame(JPEG, 64, 48).unwrap();
        }
        assert_eq!(ring.open_files(), 1);
        let path = rot.close().unwrap().unwrap();
        assert!(rot.active().is_none());
        assert_eq!(ring.open_files(), 0);
        assert_eq!(ring.entries().unwrap().len(), 1);
        assert_eq!(read_avi_info(&path).unwrap().frames, 4);
        assert!(path.starts_with(dir.path()));
    }

    #[test]
    fn no_file_until_first_frame() {
        let (_dir, ring, clock) = setup(5);
        let mut rot = VideoFileRotator::new(ring.clone(), clock, TimeDelta::minutes(1), 10);
        assert!(!rot.maybe_rotate().unwrap());
        assert!(ring.entries().unwrap().is_empty());
    }
}
