//! Chapter gating rules
//!
//! Derives the status a partner sees for every chapter of a course from
//! the stored progress facts and the chapter order. Pure: no I/O, no
//! clock, no writes.
//!
//! ## Rule
//!
//! ```text
//! floor(0)   = available
//! floor(i)   = available  if stored(i-1) == completed
//!            = locked     otherwise
//! visible(i) = max(stored(i), floor(i))
//! ```
//!
//! Taking the max means a chapter the partner already progressed into
//! never shows as locked again, while untouched chapters stay gated.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Chapter status, totally ordered: locked < available < in_progress < completed
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum ChapterStatus {
    Locked,
    Available,
    InProgress,
    Completed,
}

impl ChapterStatus {
    pub const ALL: [ChapterStatus; 4] = [
        ChapterStatus::Locked,
        ChapterStatus::Available,
        ChapterStatus::InProgress,
        ChapterStatus::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChapterStatus::Locked => "locked",
            ChapterStatus::Available => "available",
            ChapterStatus::InProgress => "in_progress",
            ChapterStatus::Completed => "completed",
        }
    }

    /// Position in the total order, persisted next to the status text so
    /// monotonic updates can be guarded in SQL
    pub fn rank(&self) -> i32 {
        match self {
            ChapterStatus::Locked => 0,
            ChapterStatus::Available => 1,
            ChapterStatus::InProgress => 2,
            ChapterStatus::Completed => 3,
        }
    }

    pub fn from_rank(rank: i32) -> Option<Self> {
        Self::ALL.iter().copied().find(|s| s.rank() == rank)
    }

    pub fn is_accessible(&self) -> bool {
        *self != ChapterStatus::Locked
    }
}

impl fmt::Display for ChapterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChapterStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown chapter status: {}", s))
    }
}

/// A chapter position in its course, as far as gating cares
#[derive(Debug, Clone, Copy)]
pub struct GateInput<'a> {
    pub chapter_id: &'a str,
    pub order_index: i32,
}

/// Visible status of one chapter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterVisibility {
    pub chapter_id: String,
    pub order_index: i32,
    pub stored: Option<ChapterStatus>,
    pub visible: ChapterStatus,
}

/// Compute visible statuses for a course's chapters, in `order_index` order
///
/// `stored` holds the partner's persisted status per chapter id; chapters
/// without a record have never been touched.
pub fn visible_statuses(
    chapters: &[GateInput<'_>],
    stored: &HashMap<String, ChapterStatus>,
) -> Vec<ChapterVisibility> {
    let mut ordered: Vec<GateInput<'_>> = chapters.to_vec();
    ordered.sort_by_key(|c| c.order_index);

    let mut result = Vec::with_capacity(ordered.len());
    let mut previous_completed = true;

    for chapter in ordered {
        let stored_status = stored.get(chapter.chapter_id).copied();
        let floor = if previous_completed {
            ChapterStatus::Available
        } else {
            ChapterStatus::Locked
        };
        let visible = stored_status.map_or(floor, |s| s.max(floor));

        previous_completed = stored_status == Some(ChapterStatus::Completed);

        result.push(ChapterVisibility {
            chapter_id: chapter.chapter_id.to_string(),
            order_index: chapter.order_index,
            stored: stored_status,
            visible,
        });
    }

    result
}

/// Same as [`visible_statuses`], keyed by chapter id
pub fn visible_status_map(
    chapters: &[GateInput<'_>],
    stored: &HashMap<String, ChapterStatus>,
) -> HashMap<String, ChapterStatus> {
    visible_statuses(chapters, stored)
        .into_iter()
        .map(|v| (v.chapter_id, v.visible))
        .collect()
}

/// The chapter directly after `chapter_id` in course order, if any
pub fn next_chapter<'a>(chapters: &[GateInput<'a>], chapter_id: &str) -> Option<GateInput<'a>> {
    let mut ordered: Vec<GateInput<'a>> = chapters.to_vec();
    ordered.sort_by_key(|c| c.order_index);
    let pos = ordered.iter().position(|c| c.chapter_id == chapter_id)?;
    ordered.get(pos + 1).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn course() -> Vec<GateInput<'static>> {
        vec![
            GateInput { chapter_id: "ch-3", order_index: 3 },
            GateInput { chapter_id: "ch-1", order_index: 1 },
            GateInput { chapter_id: "ch-2", order_index: 2 },
        ]
    }

    fn stored(entries: &[(&str, ChapterStatus)]) -> HashMap<String, ChapterStatus> {
        entries.iter().map(|(id, s)| (id.to_string(), *s)).collect()
    }

    #[test]
    fn test_status_order() {
        assert!(ChapterStatus::Locked < ChapterStatus::Available);
        assert!(ChapterStatus::Available < ChapterStatus::InProgress);
        assert!(ChapterStatus::InProgress < ChapterStatus::Completed);
        for status in ChapterStatus::ALL {
            assert_eq!(ChapterStatus::from_rank(status.rank()), Some(status));
            assert_eq!(status.as_str().parse::<ChapterStatus>(), Ok(status));
        }
        assert!("done".parse::<ChapterStatus>().is_err());
    }

    #[test]
    fn test_untouched_course() {
        let visible = visible_statuses(&course(), &HashMap::new());
        let ids: Vec<_> = visible.iter().map(|v| v.chapter_id.as_str()).collect();
        assert_eq!(ids, vec!["ch-1", "ch-2", "ch-3"]);
        assert_eq!(visible[0].visible, ChapterStatus::Available);
        assert_eq!(visible[1].visible, ChapterStatus::Locked);
        assert_eq!(visible[2].visible, ChapterStatus::Locked);
    }

    #[test]
    fn test_completion_unlocks_next_only() {
        let map = visible_status_map(&course(), &stored(&[("ch-1", ChapterStatus::Completed)]));
        assert_eq!(map["ch-1"], ChapterStatus::Completed);
        assert_eq!(map["ch-2"], ChapterStatus::Available);
        assert_eq!(map["ch-3"], ChapterStatus::Locked);
    }

    #[test]
    fn test_in_progress_does_not_unlock() {
        let map = visible_status_map(&course(), &stored(&[("ch-1", ChapterStatus::InProgress)]));
        assert_eq!(map["ch-1"], ChapterStatus::InProgress);
        assert_eq!(map["ch-2"], ChapterStatus::Locked);
    }

    #[test]
    fn test_progressed_chapter_never_regresses() {
        // ch-2 was reached earlier; ch-1 no longer reads as completed
        let map = visible_status_map(
            &course(),
            &stored(&[
                ("ch-1", ChapterStatus::InProgress),
                ("ch-2", ChapterStatus::InProgress),
            ]),
        );
        assert_eq!(map["ch-2"], ChapterStatus::InProgress);
        assert_eq!(map["ch-3"], ChapterStatus::Locked);
    }

    #[test]
    fn test_next_chapter() {
        let chapters = course();
        assert_eq!(next_chapter(&chapters, "ch-1").map(|c| c.chapter_id), Some("ch-2"));
        assert_eq!(next_chapter(&chapters, "ch-2").map(|c| c.chapter_id), Some("ch-3"));
        assert!(next_chapter(&chapters, "ch-3").is_none());
        assert!(next_chapter(&chapters, "missing").is_none());
    }
}
