//! Celebration animation assets.
//!
//! A frames file is plain text; frames are separated by a line holding only
//! `%%`. Missing or empty files surface as `AppError::Asset` so the caller can
//! fall back to a text-only announcement.

use std::path::{Path, PathBuf};

use crate::error::{AppError, Result};
use crate::types::Frames;

pub const OVERLAY_ANIMATION: &str = "milestone_overlay.frames";
pub const CELEBRATION_ANIMATION: &str = "milestone_celebration.frames";

const FRAME_SEPARATOR: &str = "%%";

#[derive(Debug, Clone)]
pub struct AssetDir {
    root: PathBuf,
}

impl AssetDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub async fn load_frames(&self, name: &str) -> Result<Frames> {
        let path = self.root.join(name);
        let raw = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| AppError::Asset(format!("{}: {e}", display(&path))))?;
        let frames = parse_frames(&raw);
        if frames.is_empty() {
            return Err(AppError::Asset(format!("{}: no frames", display(&path))));
        }
        Ok(frames)
    }
}

pub fn parse_frames(raw: &str) -> Frames {
    let mut frames = Vec::new();
    let mut current = String::new();
    for line in raw.lines() {
        if line.trim_end() == FRAME_SEPARATOR {
            if !current.trim().is_empty() {
                frames.push(std::mem::take(&mut current));
            }
            current.clear();
            continue;
        }
        current.push_str(line);
        current.push('\n');
    }
    if !current.trim().is_empty() {
        frames.push(current);
    }
    frames
}

fn display(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
