//! Media period identity

use mpq_common::PeriodUid;
use serde::Serialize;
use std::fmt;

/// What part of a timeline period a media period plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodKind {
    /// One ad of an ad group
    Ad {
        ad_group_index: usize,
        ad_index_in_ad_group: usize,
    },
    /// Content up to the next ad group (or to the end when `None`)
    Content { next_ad_group_index: Option<usize> },
}

/// Identity of a media period in the queue
///
/// Ad and content media periods of the same timeline period share the
/// `period_uid`; `window_sequence_number` is shared by every media period of
/// one visit to a window.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct MediaPeriodId {
    pub period_uid: PeriodUid,
    pub window_sequence_number: u64,
    pub kind: PeriodKind,
}

impl MediaPeriodId {
    pub fn content(
        period_uid: PeriodUid,
        window_sequence_number: u64,
        next_ad_group_index: Option<usize>,
    ) -> Self {
        Self {
            period_uid,
            window_sequence_number,
            kind: PeriodKind::Content { next_ad_group_index },
        }
    }

    pub fn ad(
        period_uid: PeriodUid,
        ad_group_index: usize,
        ad_index_in_ad_group: usize,
        window_sequence_number: u64,
    ) -> Self {
        Self {
            period_uid,
            window_sequence_number,
            kind: PeriodKind::Ad {
                ad_group_index,
                ad_index_in_ad_group,
            },
        }
    }

    pub fn is_ad(&self) -> bool {
        matches!(self.kind, PeriodKind::Ad { .. })
    }

    /// Ad group of an ad media period
    pub fn ad_group_index(&self) -> Option<usize> {
        match self.kind {
            PeriodKind::Ad { ad_group_index, .. } => Some(ad_group_index),
            PeriodKind::Content { .. } => None,
        }
    }

    /// Next ad group of a content media period
    pub fn next_ad_group_index(&self) -> Option<usize> {
        match self.kind {
            PeriodKind::Content { next_ad_group_index } => next_ad_group_index,
            PeriodKind::Ad { .. } => None,
        }
    }
}

impl fmt::Display for MediaPeriodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            PeriodKind::Ad {
                ad_group_index,
                ad_index_in_ad_group,
            } => write!(
                f,
                "{}#{} ad {}/{}",
                self.period_uid, self.window_sequence_number, ad_group_index, ad_index_in_ad_group
            ),
            PeriodKind::Content {
                next_ad_group_index: Some(next),
            } => write!(
                f,
                "{}#{} content (next ad group {})",
                self.period_uid, self.window_sequence_number, next
            ),
            PeriodKind::Content {
                next_ad_group_index: None,
            } => write!(f, "{}#{} content", self.period_uid, self.window_sequence_number),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ad_and_content_are_distinct() {
        let uid = PeriodUid::from("p");
        let ad = MediaPeriodId::ad(uid.clone(), 0, 0, 3);
        let content = MediaPeriodId::content(uid, 3, Some(0));
        assert!(ad.is_ad());
        assert!(!content.is_ad());
        assert_ne!(ad, content);
        assert_eq!(ad.ad_group_index(), Some(0));
        assert_eq!(ad.next_ad_group_index(), None);
        assert_eq!(content.next_ad_group_index(), Some(0));
        assert_eq!(content.ad_group_index(), None);
    }

    #[test]
    fn test_window_sequence_number_is_part_of_identity() {
        let uid = PeriodUid::from("p");
        assert_ne!(
            MediaPeriodId::content(uid.clone(), 0, None),
            MediaPeriodId::content(uid, 1, None)
        );
    }

    #[test]
    fn test_display() {
        let uid = PeriodUid::from("p");
        assert_eq!(MediaPeriodId::ad(uid.clone(), 1, 2, 7).to_string(), "p#7 ad 1/2");
        assert_eq!(MediaPeriodId::content(uid, 7, None).to_string(), "p#7 content");
    }
}
