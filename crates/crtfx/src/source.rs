use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};

use crate::texture::SourceTexture;

/// File extensions accepted when scanning an image-sequence directory.
const SEQUENCE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "gif"];

/// Supplies the source picture for each frame.
///
/// The driver asks once per frame; the returned texture is an immutable
/// snapshot for the whole evaluation of that frame.
pub trait SourceFeed: Send {
    fn frame_at(&mut self, seconds: f32) -> Arc<SourceTexture>;

    /// Short human-readable description used in logs.
    fn describe(&self) -> String;
}

/// The same texture for every frame.
#[derive(Debug, Clone)]
pub struct StaticSource {
    texture: Arc<SourceTexture>,
    label: String,
}

impl StaticSource {
    pub fn new(texture: SourceTexture, label: impl Into<String>) -> Self {
        Self {
            texture: Arc::new(texture),
            label: label.into(),
        }
    }
}

impl SourceFeed for StaticSource {
    fn frame_at(&mut self, _seconds: f32) -> Arc<SourceTexture> {
        Arc::clone(&self.texture)
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}

/// Pre-decoded frames played back at a fixed rate, looping forever.
#[derive(Debug, Clone)]
pub struct ImageSequence {
    frames: Vec<Arc<SourceTexture>>,
    fps: f32,
    root: PathBuf,
}

impl ImageSequence {
    pub fn new(frames: Vec<SourceTexture>, fps: f32, root: PathBuf) -> Result<Self> {
        if frames.is_empty() {
            bail!("image sequence at {} contains no frames", root.display());
        }
        if !(fps.is_finite() && fps > 0.0) {
            bail!("image sequence playback rate must be positive (got {fps})");
        }
        Ok(Self {
            frames: frames.into_iter().map(Arc::new).collect(),
            fps,
            root,
        })
    }

    /// Loads every supported image in `dir`, ordered by file name.
    pub fn open_dir(dir: &Path, fps: f32) -> Result<Self> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(dir)
            .with_context(|| format!("failed to read image sequence {}", dir.display()))?
        {
            let path = entry?.path();
            if path.is_file() && has_sequence_extension(&path) {
                paths.push(path);
            }
        }
        paths.sort();

        let frames = paths
            .iter()
            .map(|path| SourceTexture::open(path))
            .collect::<Result<Vec<_>>>()?;
        tracing::info!(
            dir = %dir.display(),
            frames = frames.len(),
            fps,
            "loaded image sequence"
        );
        Self::new(frames, fps, dir.to_path_buf())
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Index of the frame shown at `seconds`; negative or non-finite times show the first frame.
    pub fn index_at(&self, seconds: f32) -> usize {
        let position = (seconds * self.fps).floor();
        if !position.is_finite() || position < 0.0 {
            return 0;
        }
        (position as u64 % self.frames.len() as u64) as usize
    }
}

impl SourceFeed for ImageSequence {
    fn frame_at(&mut self, seconds: f32) -> Arc<SourceTexture> {
        Arc::clone(&self.frames[self.index_at(seconds)])
    }

    fn describe(&self) -> String {
        format!(
            "{} ({} frames @ {} fps)",
            self.root.display(),
            self.frames.len(),
            self.fps
        )
    }
}

/// Opens `path` as a sequence when it is a directory and as a still otherwise.
pub fn open_source(path: &Path, sequence_fps: f32) -> Result<Box<dyn SourceFeed>> {
    if path.is_dir() {
        Ok(Box::new(ImageSequence::open_dir(path, sequence_fps)?))
    } else {
        let texture = SourceTexture::open(path)?;
        Ok(Box::new(StaticSource::new(
            texture,
            path.display().to_string(),
        )))
    }
}

fn has_sequence_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            SEQUENCE_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}
