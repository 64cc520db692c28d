//! Chapter video references and the watched rule
//!
//! The provider is decided when the chapter is authored and stored with
//! it; nothing here inspects URLs to guess where a video lives.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::LearningError;

/// Where a chapter video is hosted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(tag = "provider", rename_all = "snake_case")]
#[ts(export)]
pub enum VideoSource {
    Youtube { reference: String },
    Embed { reference: String },
    File { reference: String },
}

impl VideoSource {
    pub fn provider(&self) -> &'static str {
        match self {
            VideoSource::Youtube { .. } => providers::YOUTUBE,
            VideoSource::Embed { .. } => providers::EMBED,
            VideoSource::File { .. } => providers::FILE,
        }
    }

    pub fn reference(&self) -> &str {
        match self {
            VideoSource::Youtube { reference }
            | VideoSource::Embed { reference }
            | VideoSource::File { reference } => reference,
        }
    }

    /// Rebuild from the stored (provider, reference) column pair
    pub fn from_parts(provider: &str, reference: &str) -> Result<Self, LearningError> {
        let reference = reference.to_string();
        match provider {
            providers::YOUTUBE => Ok(VideoSource::Youtube { reference }),
            providers::EMBED => Ok(VideoSource::Embed { reference }),
            providers::FILE => Ok(VideoSource::File { reference }),
            other => Err(LearningError::InvalidInput(format!(
                "Unknown video provider: {}. Valid providers: {:?}",
                other,
                providers::ALL
            ))),
        }
    }
}

pub mod providers {
    pub const YOUTUBE: &str = "youtube";
    pub const EMBED: &str = "embed";
    pub const FILE: &str = "file";

    pub const ALL: [&str; 3] = [YOUTUBE, EMBED, FILE];
}

/// A validated playback report
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackReport {
    pub position_seconds: f64,
    pub duration_seconds: f64,
    pub ended: bool,
}

impl PlaybackReport {
    /// Validate raw client numbers; negative or non-finite values are rejected
    pub fn new(position_seconds: f64, duration_seconds: f64, ended: bool) -> Result<Self, LearningError> {
        if !position_seconds.is_finite() || position_seconds < 0.0 {
            return Err(LearningError::InvalidProgress(format!(
                "position_seconds must be a finite non-negative number, got {}",
                position_seconds
            )));
        }
        if !duration_seconds.is_finite() || duration_seconds < 0.0 {
            return Err(LearningError::InvalidProgress(format!(
                "duration_seconds must be a finite non-negative number, got {}",
                duration_seconds
            )));
        }
        Ok(Self {
            position_seconds,
            duration_seconds,
            ended,
        })
    }

    /// Whether this report alone counts the video as watched
    ///
    /// `catalog_duration` wins over the reported duration when known.
    /// Without any positive duration only `ended` counts.
    pub fn is_watched(&self, catalog_duration: Option<f64>, threshold: f64) -> bool {
        if self.ended {
            return true;
        }
        let duration = catalog_duration
            .filter(|d| d.is_finite() && *d > 0.0)
            .or(Some(self.duration_seconds).filter(|d| *d > 0.0));

        match duration {
            Some(d) => self.position_seconds >= threshold * d,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_bad_numbers() {
        assert!(matches!(
            PlaybackReport::new(-1.0, 100.0, false),
            Err(LearningError::InvalidProgress(_))
        ));
        assert!(PlaybackReport::new(f64::NAN, 100.0, false).is_err());
        assert!(PlaybackReport::new(f64::INFINITY, 100.0, false).is_err());
        assert!(PlaybackReport::new(10.0, f64::NAN, false).is_err());
        assert!(PlaybackReport::new(0.0, 0.0, false).is_ok());
    }

    #[test]
    fn test_threshold() {
        let at = |pos: f64| PlaybackReport::new(pos, 100.0, false).unwrap();
        assert!(!at(79.9).is_watched(Some(100.0), 0.8));
        assert!(at(80.0).is_watched(Some(100.0), 0.8));
        assert!(at(85.0).is_watched(Some(100.0), 0.8));
    }

    #[test]
    fn test_ended_always_counts() {
        let report = PlaybackReport::new(3.0, 100.0, true).unwrap();
        assert!(report.is_watched(Some(100.0), 0.8));
        assert!(report.is_watched(None, 0.8));
    }

    #[test]
    fn test_catalog_duration_wins() {
        // Client claims a 10s video at 9s; catalog knows it is 100s
        let report = PlaybackReport::new(9.0, 10.0, false).unwrap();
        assert!(!report.is_watched(Some(100.0), 0.8));
        assert!(report.is_watched(None, 0.8));
    }

    #[test]
    fn test_no_duration_needs_end() {
        let report = PlaybackReport::new(500.0, 0.0, false).unwrap();
        assert!(!report.is_watched(None, 0.8));
    }

    #[test]
    fn test_source_round_trip() {
        let source = VideoSource::Youtube { reference: "dQw4w9WgXcQ".into() };
        let rebuilt = VideoSource::from_parts(source.provider(), source.reference()).unwrap();
        assert_eq!(rebuilt, source);
        assert!(VideoSource::from_parts("vimeo", "x").is_err());

        let json = serde_json::to_value(&source).unwrap();
        assert_eq!(json["provider"], "youtube");
        assert_eq!(json["reference"], "dQw4w9WgXcQ");
    }
}
