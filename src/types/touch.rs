//! Multi-touch contact tracking.
//!
//! The touchscreen reports each contact with a one-byte id. The device can
//! deliver a move report before the corresponding down report is seen, so
//! classification is by table membership, not by opcode alone: an unknown
//! id is always a [`TouchKind::Start`].

use std::collections::HashMap;

use crate::types::display::{KEY_COLUMNS, KEY_ROWS, KEY_SIZE, Screen};

/// Lifecycle phase of a touch report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchKind {
    /// First report for this contact id.
    Start,
    /// A known contact moved.
    Move,
    /// The contact lifted.
    End,
}

/// On-glass location a touch resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TouchTarget {
    /// Surface under the contact.
    pub screen: Screen,
    /// Key index within the center grid (row-major), if on the grid.
    pub key: Option<u8>,
}

impl TouchTarget {
    /// Resolves device coordinates to a surface and key index.
    ///
    /// The glass spans all three surfaces: x 0..60 is the left strip,
    /// 60..420 the center grid, 420.. the right strip.
    #[must_use]
    pub fn locate(x: u16, y: u16) -> Self {
        let center = Screen::Center.descriptor();
        let left = Screen::Left.descriptor();
        if x < left.width {
            return Self {
                screen: Screen::Left,
                key: None,
            };
        }
        if x >= left.width + center.width {
            return Self {
                screen: Screen::Right,
                key: None,
            };
        }
        let column = ((x - left.width) / KEY_SIZE).min(KEY_COLUMNS - 1);
        let row = (y / KEY_SIZE).min(KEY_ROWS - 1);
        Self {
            screen: Screen::Center,
            key: Some((row * KEY_COLUMNS + column) as u8),
        }
    }
}

/// One active touch contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TouchContact {
    /// Contact id assigned by the device.
    pub id: u8,
    /// Last known x coordinate.
    pub x: u16,
    /// Last known y coordinate.
    pub y: u16,
    /// Resolved hit target.
    pub target: TouchTarget,
}

impl TouchContact {
    /// Builds a contact from raw report coordinates.
    #[must_use]
    pub fn new(id: u8, x: u16, y: u16) -> Self {
        Self {
            id,
            x,
            y,
            target: TouchTarget::locate(x, y),
        }
    }
}

/// Table of contacts currently on the glass.
///
/// Ended contacts are removed immediately; the table never holds a contact
/// whose end report has been processed.
#[derive(Debug, Default)]
pub struct TouchTracker {
    active: HashMap<u8, TouchContact>,
}

impl TouchTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self {
            active: HashMap::new(),
        }
    }

    /// Records a report and classifies it.
    ///
    /// `ended` reports remove the contact; others insert or refresh it.
    pub fn track(&mut self, ended: bool, contact: TouchContact) -> TouchKind {
        if ended {
            self.active.remove(&contact.id);
            TouchKind::End
        } else if self.active.insert(contact.id, contact).is_some() {
            TouchKind::Move
        } else {
            TouchKind::Start
        }
    }

    /// Snapshot of all active contacts, ordered by id.
    #[must_use]
    pub fn active(&self) -> Vec<TouchContact> {
        let mut contacts: Vec<TouchContact> = self.active.values().copied().collect();
        contacts.sort_by_key(|c| c.id);
        contacts
    }

    /// Number of active contacts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.active.len()
    }

    /// Returns true if nothing is touching the glass.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Drops all contacts, e.g. across a reconnect.
    pub fn clear(&mut self) {
        self.active.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locate_side_strips() {
        assert_eq!(TouchTarget::locate(10, 100).screen, Screen::Left);
        assert_eq!(TouchTarget::locate(10, 100).key, None);
        assert_eq!(TouchTarget::locate(450, 0).screen, Screen::Right);
        assert_eq!(TouchTarget::locate(59, 269).screen, Screen::Left);
        assert_eq!(TouchTarget::locate(420, 0).screen, Screen::Right);
    }

    #[test]
    fn test_locate_center_grid() {
        // First tile.
        assert_eq!(TouchTarget::locate(60, 0).key, Some(0));
        // Last column, first row.
        assert_eq!(TouchTarget::locate(419, 89).key, Some(3));
        // Second row, second column.
        assert_eq!(TouchTarget::locate(150, 90).key, Some(5));
        // Bottom-right tile.
        assert_eq!(TouchTarget::locate(419, 269).key, Some(11));
    }

    #[test]
    fn test_first_seen_is_start_even_from_move() {
        let mut tracker = TouchTracker::new();
        // Move-class report (not ended) for an unknown id.
        let kind = tracker.track(false, TouchContact::new(3, 100, 100));
        assert_eq!(kind, TouchKind::Start);
        let kind = tracker.track(false, TouchContact::new(3, 110, 100));
        assert_eq!(kind, TouchKind::Move);
    }

    #[test]
    fn test_end_removes_contact() {
        let mut tracker = TouchTracker::new();
        tracker.track(false, TouchContact::new(1, 60, 0));
        tracker.track(false, TouchContact::new(2, 0, 0));
        assert_eq!(tracker.len(), 2);

        let kind = tracker.track(true, TouchContact::new(1, 60, 0));
        assert_eq!(kind, TouchKind::End);
        assert_eq!(tracker.len(), 1);
        assert!(tracker.active().iter().all(|c| c.id != 1));

        // Seen again: a fresh start.
        let kind = tracker.track(false, TouchContact::new(1, 60, 0));
        assert_eq!(kind, TouchKind::Start);
    }

    #[test]
    fn test_active_sorted_by_id() {
        let mut tracker = TouchTracker::new();
        tracker.track(false, TouchContact::new(9, 0, 0));
        tracker.track(false, TouchContact::new(1, 0, 0));
        let ids: Vec<u8> = tracker.active().iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![1, 9]);
    }
}
