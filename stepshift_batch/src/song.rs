// Song files: `*.chart.json` documents holding a title and a list of charts.
//
// Only the fields the converter reads are typed. Everything else in a song
// or chart object is kept in `extras` and written back unchanged, so a
// round trip through the converter never loses data it does not understand.

use crate::error::SongError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use stepshift_core::types::NoteEvent;

pub const SONG_FILE_SUFFIX: &str = ".chart.json";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Chart {
    pub chart_type: String,
    pub difficulty_type: String,
    #[serde(default)]
    pub difficulty_rating: u32,
    #[serde(default = "one")]
    pub num_players: u32,
    pub num_inputs: usize,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub events: Vec<NoteEvent>,
    #[serde(flatten)]
    pub extras: BTreeMap<String, serde_json::Value>,
}

fn one() -> u32 {
    1
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Song {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub charts: Vec<Chart>,
    #[serde(flatten)]
    pub extras: BTreeMap<String, serde_json::Value>,
}

impl Song {
    pub fn load(path: &Path) -> Result<Self, SongError> {
        let text = std::fs::read_to_string(path).map_err(|source| SongError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| SongError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), SongError> {
        let text = serde_json::to_string_pretty(self).map_err(|source| SongError::Serialize {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, text).map_err(|source| SongError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Index of the chart with the given type and difficulty.
    pub fn find_chart(&self, chart_type: &str, difficulty_type: &str) -> Option<usize> {
        self.charts
            .iter()
            .position(|c| c.chart_type == chart_type && c.difficulty_type == difficulty_type)
    }
}

pub fn is_song_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.ends_with(SONG_FILE_SUFFIX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const SONG: &str = r#"{
        "title": "Test Song",
        "artist": "Someone",
        "charts": [
            {
                "chart_type": "dance-single",
                "difficulty_type": "Hard",
                "difficulty_rating": 9,
                "num_inputs": 4,
                "events": [
                    { "position": 0, "lane": 0, "kind": "tap" },
                    { "position": 48, "lane": 2, "kind": "hold_start" },
                    { "position": 96, "lane": 2, "kind": "hold_end" }
                ],
                "radar": [0.1, 0.2]
            }
        ]
    }"#;

    #[test]
    fn unknown_fields_survive_a_round_trip() {
        let song: Song = serde_json::from_str(SONG).unwrap();
        assert_eq!(song.title, "Test Song");
        assert_eq!(song.charts[0].num_players, 1);
        assert_eq!(song.charts[0].events.len(), 3);
        assert!(song.extras.contains_key("artist"));
        assert!(song.charts[0].extras.contains_key("radar"));

        let json = serde_json::to_string(&song).unwrap();
        let back: Song = serde_json::from_str(&json).unwrap();
        assert_eq!(back, song);
    }

    #[test]
    fn save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.chart.json");
        let song: Song = serde_json::from_str(SONG).unwrap();
        song.save(&path).unwrap();
        assert_eq!(Song::load(&path).unwrap(), song);
        assert_eq!(song.find_chart("dance-single", "Hard"), Some(0));
        assert_eq!(song.find_chart("dance-double", "Hard"), None);
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = Song::load(&PathBuf::from("/nonexistent/x.chart.json")).unwrap_err();
        assert!(matches!(err, SongError::Read { .. }));
    }

    #[test]
    fn song_file_suffix() {
        assert!(is_song_file(Path::new("songs/a/b.chart.json")));
        assert!(!is_song_file(Path::new("songs/a/b.json")));
        assert!(!is_song_file(Path::new("songs/a/b.ogg")));
    }
}
