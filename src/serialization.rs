// Serialization utilities for score and configuration files

use crate::error::{PerformerError, PerformerResult};
use crate::sequencer::clock::SharedClock;
use crate::sequencer::sequence::Sequence;
use crate::sequencer::track::Track;
use ron::ser::PrettyConfig;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// On-disk format, chosen by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Ron,
    Json,
}

impl Format {
    pub fn from_path(path: &Path) -> PerformerResult<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("ron") => Ok(Format::Ron),
            Some(ext) if ext.eq_ignore_ascii_case("json") => Ok(Format::Json),
            _ => Err(PerformerError::Config(format!(
                "unsupported file extension: {}",
                path.display()
            ))),
        }
    }
}

pub fn to_string<T: Serialize>(value: &T, format: Format) -> PerformerResult<String> {
    match format {
        Format::Ron => Ok(ron::ser::to_string_pretty(value, PrettyConfig::default())?),
        Format::Json => Ok(serde_json::to_string_pretty(value)?),
    }
}

pub fn from_str<T: DeserializeOwned>(data: &str, format: Format) -> PerformerResult<T> {
    match format {
        Format::Ron => Ok(ron::from_str(data)?),
        Format::Json => Ok(serde_json::from_str(data)?),
    }
}

pub fn read_file<T: DeserializeOwned>(path: &Path) -> PerformerResult<T> {
    let format = Format::from_path(path)?;
    let data = fs::read_to_string(path)?;
    from_str(&data, format)
}

pub fn write_file<T: Serialize>(value: &T, path: &Path) -> PerformerResult<()> {
    let format = Format::from_path(path)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, to_string(value, format)?)?;
    Ok(())
}

/// A score as produced by an external notation front end: one list of
/// moments per output channel
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoreFile {
    pub tracks: Vec<Track>,
}

impl ScoreFile {
    pub fn from_sequence(sequence: &Sequence) -> Self {
        Self {
            tracks: sequence.tracks().to_vec(),
        }
    }

    pub fn into_sequence(self, clock: SharedClock) -> Sequence {
        Sequence::from_tracks(self.tracks, clock)
    }
}

/// Load a score file (`.ron` or `.json`) into a stopped sequence
pub fn load_score(path: &Path, clock: SharedClock) -> PerformerResult<Sequence> {
    let score: ScoreFile = read_file(path)?;
    if score.tracks.len() > 16 {
        return Err(PerformerError::Config(format!(
            "a score has at most 16 tracks, {} has {}",
            path.display(),
            score.tracks.len()
        )));
    }
    log::info!(
        "Loaded score {} ({} tracks)",
        path.display(),
        score.tracks.len()
    );
    Ok(score.into_sequence(clock))
}

pub fn save_score(sequence: &Sequence, path: &Path) -> PerformerResult<()> {
    write_file(&ScoreFile::from_sequence(sequence), path)
}
