//! Ordered playback queue with a current-entry cursor.
//!
//! The cursor is `None` exactly when the queue is empty. Every mutation below
//! restores that invariant before returning, and keeps the cursor on the same
//! logical entry whenever that entry survives the mutation.

use crate::error::{PlaybackError, Result};
use crate::track::{QueueEntry, Track};

/// Outcome of [`Queue::remove_by_ids`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Removal {
    /// Indices the removed entries had before the removal, ascending.
    pub removed: Vec<usize>,
    /// The current entry was among the removed ones. The caller has to load
    /// whatever is current now (or stop when the queue became empty).
    pub current_removed: bool,
}

impl Removal {
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Queue {
    entries: Vec<QueueEntry>,
    current: Option<usize>,
}

impl Queue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[QueueEntry] {
        &self.entries
    }

    pub fn tracks(&self) -> Vec<Track> {
        self.entries.iter().map(|e| e.track().clone()).collect()
    }

    pub fn get(&self, index: usize) -> Option<&QueueEntry> {
        self.entries.get(index)
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    pub fn current(&self) -> Option<&QueueEntry> {
        self.current.and_then(|index| self.entries.get(index))
    }

    /// Index of the first entry whose track id is `id`.
    pub fn find(&self, id: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.track().id() == id)
    }

    pub fn next_index(&self) -> Option<usize> {
        self.current
            .map(|index| index + 1)
            .filter(|&index| index < self.entries.len())
    }

    pub fn previous_index(&self) -> Option<usize> {
        self.current.and_then(|index| index.checked_sub(1))
    }

    /// Insert `tracks` before the first entry with id `before`, or append when
    /// `before` is `None`. Returns the index of the first inserted entry.
    ///
    /// When the queue was empty the first inserted entry becomes current.
    ///
    /// # Errors
    ///
    /// [`PlaybackError::TrackNotFound`] when `before` names no entry. The queue
    /// is left untouched.
    pub fn insert(&mut self, tracks: Vec<Track>, before: Option<&str>) -> Result<usize> {
        let at = match before {
            Some(id) => self
                .find(id)
                .ok_or_else(|| PlaybackError::TrackNotFound(id.to_string()))?,
            None => self.entries.len(),
        };
        let count = tracks.len();
        self.entries
            .splice(at..at, tracks.into_iter().map(QueueEntry::new));

        self.current = match self.current {
            Some(current) if at <= current => Some(current + count),
            Some(current) => Some(current),
            None if !self.entries.is_empty() => Some(0),
            None => None,
        };
        Ok(at)
    }

    /// Remove every entry whose track id is in `ids`, in one pass.
    ///
    /// Unknown ids are ignored. When the current entry goes away the cursor
    /// lands on the next surviving entry, falls back to the new last entry if
    /// nothing followed it, and is unset only when the queue is empty.
    pub fn remove_by_ids<S: AsRef<str>>(&mut self, ids: &[S]) -> Removal {
        let doomed = |entry: &QueueEntry| ids.iter().any(|id| id.as_ref() == entry.track().id());

        let removed: Vec<usize> = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| doomed(entry))
            .map(|(index, _)| index)
            .collect();
        if removed.is_empty() {
            return Removal::default();
        }

        self.entries.retain(|entry| !doomed(entry));

        let mut current_removed = false;
        self.current = match self.current {
            None => None,
            Some(current) => {
                let before = removed.iter().filter(|&&index| index < current).count();
                let shifted = current - before;
                current_removed = removed.binary_search(&current).is_ok();
                if self.entries.is_empty() {
                    None
                } else if current_removed && shifted >= self.entries.len() {
                    Some(self.entries.len() - 1)
                } else {
                    Some(shifted)
                }
            }
        };

        Removal {
            removed,
            current_removed,
        }
    }

    /// Make the entry at `index` current.
    pub fn move_current_to(&mut self, index: usize) -> Result<()> {
        self.check_index(index)?;
        self.current = Some(index);
        Ok(())
    }

    /// Drop every entry after the current one. Returns how many were dropped.
    pub fn remove_upcoming(&mut self) -> usize {
        let keep = self.current.map_or(0, |current| current + 1);
        let dropped = self.entries.len().saturating_sub(keep);
        self.entries.truncate(keep);
        if self.entries.is_empty() {
            self.current = None;
        }
        dropped
    }

    /// Drop every entry before the current one. Returns how many were dropped.
    pub fn remove_previous(&mut self) -> usize {
        let Some(current) = self.current else {
            return 0;
        };
        self.entries.drain(..current);
        self.current = Some(0);
        current
    }

    /// Move the entry at `from` to `to`. The cursor follows its entry.
    pub fn move_entry(&mut self, from: usize, to: usize) -> Result<()> {
        self.check_index(from)?;
        self.check_index(to)?;
        if from == to {
            return Ok(());
        }

        let entry = self.entries.remove(from);
        self.entries.insert(to, entry);

        self.current = self.current.map(|current| {
            if current == from {
                to
            } else if from < current && to >= current {
                current - 1
            } else if from > current && to <= current {
                current + 1
            } else {
                current
            }
        });
        Ok(())
    }

    /// Replace the track of the first entry with id `id`. Returns its index.
    pub fn replace_track(&mut self, id: &str, track: Track) -> Result<usize> {
        let index = self
            .find(id)
            .ok_or_else(|| PlaybackError::TrackNotFound(id.to_string()))?;
        self.entries[index].set_track(track);
        Ok(index)
    }

    /// Replace the current entry's track, or append it when the queue is
    /// empty. Returns the index of the entry now holding `track`.
    pub fn replace_current(&mut self, track: Track) -> usize {
        match self.current {
            Some(index) => {
                self.entries[index] = QueueEntry::new(track);
                index
            }
            None => {
                self.entries.push(QueueEntry::new(track));
                let index = self.entries.len() - 1;
                self.current = Some(index);
                index
            }
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.current = None;
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index < self.entries.len() {
            Ok(())
        } else {
            Err(PlaybackError::InvalidIndex {
                index,
                len: self.entries.len(),
            })
        }
    }

    #[cfg(test)]
    pub(crate) fn assert_invariant(&self) {
        match self.current {
            None => assert!(self.entries.is_empty(), "cursor unset on non-empty queue"),
            Some(index) => assert!(index < self.entries.len(), "cursor {index} out of range"),
        }
    }
}
