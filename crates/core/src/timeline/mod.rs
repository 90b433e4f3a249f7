use crate::{
    suit::sanitize_time, LedSuitError, PlaybackClock, Result, SuitState, ViewportMapper, Waypoint,
};

/// Half width, in pixels, of the clickable area around a waypoint marker.
pub const MARKER_HIT_RADIUS: f32 = 10.0;

/// Stable identity of a waypoint. Indices shift whenever the timeline is
/// re-sorted; ids do not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WaypointId(u64);

#[derive(Debug, Clone)]
struct Entry {
    id: WaypointId,
    waypoint: Waypoint,
}

/// On-screen marker of one waypoint, derived from the sorted timeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Marker {
    pub index: usize,
    pub id: WaypointId,
    pub x: f32,
    pub visible: bool,
    pub selected: bool,
}

/// What sits under a point of the spectrogram view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisualElement {
    Marker { index: usize, id: WaypointId },
    Spectrogram { column: usize },
}

/// How imported waypoints combine with the existing ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportMode {
    Overwrite,
    Append,
}

/// Time-ordered waypoints of a show.
///
/// The timeline is the single owner of the waypoint collection and keeps it
/// sorted ascending by time after every structural change. Edits are refused
/// while the shared [`PlaybackClock`] reports playback.
#[derive(Debug)]
pub struct WaypointTimeline {
    entries: Vec<Entry>,
    suit_count: usize,
    clock: PlaybackClock,
    next_id: u64,
    last_emitted: Option<WaypointId>,
    selected: Option<WaypointId>,
}

impl WaypointTimeline {
    pub fn new(suit_count: usize, clock: PlaybackClock) -> Self {
        Self {
            entries: Vec::new(),
            suit_count,
            clock,
            next_id: 0,
            last_emitted: None,
            selected: None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn suit_count(&self) -> usize {
        self.suit_count
    }

    pub fn get(&self, index: usize) -> Option<&Waypoint> {
        self.entries.get(index).map(|entry| &entry.waypoint)
    }

    pub fn id_at(&self, index: usize) -> Option<WaypointId> {
        self.entries.get(index).map(|entry| entry.id)
    }

    pub fn index_of(&self, id: WaypointId) -> Option<usize> {
        self.entries.iter().position(|entry| entry.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Waypoint> + '_ {
        self.entries.iter().map(|entry| &entry.waypoint)
    }

    /// Copy of the waypoints in time order, for export and encoding.
    pub fn to_vec(&self) -> Vec<Waypoint> {
        self.iter().cloned().collect()
    }

    fn ensure_editable(&self, action: &str) -> Result<()> {
        if self.clock.is_playing() {
            tracing::warn!(action, "playback is active, skipping timeline edit");
            return Err(LedSuitError::PlaybackActive);
        }
        Ok(())
    }

    fn check_states(&self, waypoint: &Waypoint) -> Result<()> {
        if waypoint.suit_count() != self.suit_count {
            return Err(LedSuitError::StateCountMismatch {
                expected: self.suit_count,
                actual: waypoint.suit_count(),
            });
        }
        Ok(())
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.entries.len() {
            return Err(LedSuitError::IndexOutOfRange {
                index,
                len: self.entries.len(),
            });
        }
        Ok(())
    }

    fn sort(&mut self) {
        self.entries
            .sort_by(|a, b| a.waypoint.time_seconds.total_cmp(&b.waypoint.time_seconds));
    }

    fn insert_unchecked(&mut self, mut waypoint: Waypoint) -> WaypointId {
        waypoint.time_seconds = sanitize_time(waypoint.time_seconds);
        let id = WaypointId(self.next_id);
        self.next_id += 1;
        self.entries.push(Entry { id, waypoint });
        id
    }

    fn position(&self, id: WaypointId) -> Result<usize> {
        self.index_of(id)
            .ok_or_else(|| LedSuitError::msg("waypoint vanished during re-sort"))
    }

    /// Inserts a waypoint and returns its index after re-sorting.
    pub fn add(&mut self, waypoint: Waypoint) -> Result<usize> {
        self.ensure_editable("add")?;
        self.check_states(&waypoint)?;

        let time = waypoint.time_seconds;
        let id = self.insert_unchecked(waypoint);
        self.sort();
        tracing::debug!(time, count = self.entries.len(), "added waypoint");
        self.position(id)
    }

    pub fn remove(&mut self, index: usize) -> Result<Waypoint> {
        self.ensure_editable("remove")?;
        self.check_index(index)?;

        let entry = self.entries.remove(index);
        if self.selected == Some(entry.id) {
            self.selected = None;
        }
        tracing::debug!(index, time = entry.waypoint.time_seconds, "removed waypoint");
        Ok(entry.waypoint)
    }

    /// Moves a waypoint to `new_time` (clamped to zero) and returns its new
    /// index.
    pub fn move_time(&mut self, index: usize, new_time: f64) -> Result<usize> {
        self.ensure_editable("move")?;
        self.check_index(index)?;

        let entry = &mut self.entries[index];
        entry.waypoint.time_seconds = sanitize_time(new_time);
        let id = entry.id;
        self.sort();
        self.position(id)
    }

    /// Drops every waypoint and forgets the last emitted state.
    pub fn clear(&mut self) -> Result<()> {
        self.ensure_editable("clear")?;
        self.entries.clear();
        self.last_emitted = None;
        self.selected = None;
        Ok(())
    }

    /// Adds a batch of waypoints. Nothing changes unless every waypoint has
    /// the right number of suit states.
    pub fn import(&mut self, waypoints: Vec<Waypoint>, mode: ImportMode) -> Result<usize> {
        self.ensure_editable("import")?;
        for waypoint in &waypoints {
            self.check_states(waypoint)?;
        }

        if mode == ImportMode::Overwrite {
            self.clear()?;
        }

        let count = waypoints.len();
        for waypoint in waypoints {
            self.insert_unchecked(waypoint);
        }
        self.sort();
        tracing::info!(count, ?mode, total = self.entries.len(), "imported waypoints");
        Ok(count)
    }

    /// Adapts every waypoint to a new suit count: added suits start dark,
    /// removed suits are dropped. Refused while playing.
    pub fn set_suit_count(&mut self, suit_count: usize) -> Result<()> {
        if suit_count == self.suit_count {
            return Ok(());
        }
        self.ensure_editable("resize")?;
        for entry in &mut self.entries {
            entry
                .waypoint
                .suit_states
                .resize(suit_count, SuitState::default());
        }
        tracing::info!(from = self.suit_count, to = suit_count, "resized waypoint suit states");
        self.suit_count = suit_count;
        Ok(())
    }

    /// Finds the waypoint active at `current_time` and returns its suit states
    /// only when it differs from the one returned last time.
    ///
    /// The scan walks the sorted entries and stops at the first one in the
    /// future. Before the first waypoint nothing is active, which also resets
    /// the edge detection.
    pub fn cursor_advance(&mut self, current_time: f64) -> Option<&[SuitState]> {
        let mut current = None;
        for (index, entry) in self.entries.iter().enumerate() {
            if entry.waypoint.time_seconds <= current_time {
                current = Some(index);
            } else {
                break;
            }
        }

        let Some(index) = current else {
            self.last_emitted = None;
            return None;
        };

        let entry = &self.entries[index];
        if self.last_emitted == Some(entry.id) {
            return None;
        }

        self.last_emitted = Some(entry.id);
        tracing::debug!(time = entry.waypoint.time_seconds, index, "active waypoint changed");
        Some(&entry.waypoint.suit_states)
    }

    pub fn select(&mut self, index: usize) -> Result<()> {
        self.check_index(index)?;
        self.selected = Some(self.entries[index].id);
        Ok(())
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    pub fn selected(&self) -> Option<usize> {
        self.selected.and_then(|id| self.index_of(id))
    }

    /// Delete-key path: removes the selected waypoint, if any.
    pub fn remove_selected(&mut self) -> Result<Option<Waypoint>> {
        match self.selected() {
            Some(index) => self.remove(index).map(Some),
            None => Ok(None),
        }
    }

    /// Markers for every waypoint, in the same order as the waypoints.
    pub fn markers(&self, viewport: &ViewportMapper) -> Vec<Marker> {
        let width = viewport.width();
        self.entries
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                let x = viewport.time_to_pixel(entry.waypoint.time_seconds);
                Marker {
                    index,
                    id: entry.id,
                    x,
                    visible: x >= 0.0 && x < width,
                    selected: self.selected == Some(entry.id),
                }
            })
            .collect()
    }

    /// Resolves a click at screen `x` to the nearest visible marker within
    /// [`MARKER_HIT_RADIUS`], falling back to the spectrogram column.
    pub fn hit_test(&self, x: f32, viewport: &ViewportMapper) -> VisualElement {
        let nearest = self
            .markers(viewport)
            .into_iter()
            .filter(|marker| marker.visible && (marker.x - x).abs() <= MARKER_HIT_RADIUS)
            .min_by(|a, b| (a.x - x).abs().total_cmp(&(b.x - x).abs()));

        match nearest {
            Some(marker) => VisualElement::Marker {
                index: marker.index,
                id: marker.id,
            },
            None => VisualElement::Spectrogram {
                column: viewport.pixel_to_column(x),
            },
        }
    }

    /// Moves the marker at `index` to screen position `x`.
    pub fn drag_marker(&mut self, index: usize, x: f32, viewport: &ViewportMapper) -> Result<usize> {
        let time = viewport.pixel_to_time(x.max(0.0));
        self.move_time(index, time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PartColor;

    fn state(level: u8) -> SuitState {
        SuitState {
            head: PartColor::rgb(level, 0, 0),
            ..Default::default()
        }
    }

    fn waypoint(time: f64, level: u8) -> Waypoint {
        Waypoint::new(time, vec![state(level), state(0)])
    }

    fn timeline() -> (WaypointTimeline, PlaybackClock) {
        let clock = PlaybackClock::new(60.0);
        (WaypointTimeline::new(2, clock.clone()), clock)
    }

    fn is_sorted(timeline: &WaypointTimeline) -> bool {
        let times: Vec<f64> = timeline.iter().map(|w| w.time_seconds).collect();
        times.windows(2).all(|pair| pair[0] <= pair[1])
    }

    #[test]
    fn stays_sorted_under_edits() {
        let (mut timeline, _clock) = timeline();
        let mut seed = 17_u64;
        let mut next = move || {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (seed >> 33) as usize
        };

        for step in 0..200 {
            match next() % 3 {
                0 | 1 => {
                    let time = (next() % 6000) as f64 / 100.0;
                    timeline.add(waypoint(time, step as u8)).unwrap();
                }
                _ if !timeline.is_empty() => {
                    let index = next() % timeline.len();
                    if next() % 2 == 0 {
                        timeline.remove(index).unwrap();
                    } else {
                        let time = (next() % 6000) as f64 / 100.0 - 5.0;
                        timeline.move_time(index, time).unwrap();
                    }
                }
                _ => {}
            }
            assert!(is_sorted(&timeline));
            assert!(timeline.iter().all(|w| w.time_seconds >= 0.0));
        }
    }

    #[test]
    fn add_returns_sorted_index() {
        let (mut timeline, _clock) = timeline();
        assert_eq!(timeline.add(waypoint(5.0, 1)).unwrap(), 0);
        assert_eq!(timeline.add(waypoint(1.0, 2)).unwrap(), 0);
        assert_eq!(timeline.add(waypoint(3.0, 3)).unwrap(), 1);
        assert_eq!(timeline.get(2).unwrap().time_seconds, 5.0);
    }

    #[test]
    fn edits_are_refused_while_playing() {
        let (mut timeline, clock) = timeline();
        timeline.add(waypoint(1.0, 1)).unwrap();
        clock.play();

        assert!(matches!(
            timeline.add(waypoint(2.0, 2)),
            Err(LedSuitError::PlaybackActive)
        ));
        assert!(matches!(timeline.remove(0), Err(LedSuitError::PlaybackActive)));
        assert!(matches!(
            timeline.move_time(0, 9.0),
            Err(LedSuitError::PlaybackActive)
        ));
        assert!(timeline.clear().is_err());
        assert_eq!(timeline.len(), 1);
        assert_eq!(timeline.get(0).unwrap().time_seconds, 1.0);

        clock.pause();
        timeline.add(waypoint(2.0, 2)).unwrap();
        assert_eq!(timeline.len(), 2);
    }

    #[test]
    fn rejects_wrong_suit_counts() {
        let (mut timeline, _clock) = timeline();
        let err = timeline
            .add(Waypoint::new(1.0, vec![state(1)]))
            .unwrap_err();
        assert!(matches!(
            err,
            LedSuitError::StateCountMismatch {
                expected: 2,
                actual: 1
            }
        ));

        let batch = vec![waypoint(1.0, 1), Waypoint::new(2.0, Vec::new())];
        assert!(timeline.import(batch, ImportMode::Append).is_err());
        assert!(timeline.is_empty());
    }

    #[test]
    fn remove_and_move_check_bounds() {
        let (mut timeline, _clock) = timeline();
        assert!(matches!(
            timeline.remove(0),
            Err(LedSuitError::IndexOutOfRange { index: 0, len: 0 })
        ));
        timeline.add(waypoint(1.0, 1)).unwrap();
        assert!(timeline.move_time(3, 1.0).is_err());
        assert_eq!(timeline.move_time(0, -4.0).unwrap(), 0);
        assert_eq!(timeline.get(0).unwrap().time_seconds, 0.0);
    }

    #[test]
    fn cursor_advance_is_edge_triggered() {
        let (mut timeline, _clock) = timeline();
        timeline.add(waypoint(1.0, 10)).unwrap();
        timeline.add(waypoint(2.0, 20)).unwrap();

        assert!(timeline.cursor_advance(0.5).is_none());
        let states = timeline.cursor_advance(1.0).unwrap();
        assert_eq!(states[0].head.r, 10);
        assert!(timeline.cursor_advance(1.0).is_none());
        assert!(timeline.cursor_advance(1.5).is_none());

        assert_eq!(timeline.cursor_advance(2.5).unwrap()[0].head.r, 20);
        assert!(timeline.cursor_advance(3.0).is_none());
        assert!(timeline.cursor_advance(3.0).is_none());
    }

    #[test]
    fn cursor_advance_reemits_after_rewind() {
        let (mut timeline, _clock) = timeline();
        timeline.add(waypoint(1.0, 10)).unwrap();
        timeline.add(waypoint(2.0, 20)).unwrap();

        assert!(timeline.cursor_advance(2.0).is_some());
        assert_eq!(timeline.cursor_advance(1.2).unwrap()[0].head.r, 10);

        assert!(timeline.cursor_advance(0.0).is_none());
        assert_eq!(timeline.cursor_advance(1.0).unwrap()[0].head.r, 10);
    }

    #[test]
    fn equal_timestamps_emit_one_of_them() {
        let (mut timeline, _clock) = timeline();
        timeline.add(waypoint(1.0, 10)).unwrap();
        timeline.add(waypoint(1.0, 20)).unwrap();

        let level = timeline.cursor_advance(1.0).unwrap()[0].head.r;
        assert!(level == 10 || level == 20);
        assert!(timeline.cursor_advance(1.0).is_none());
    }

    #[test]
    fn markers_follow_the_sorted_order() {
        let (mut timeline, _clock) = timeline();
        let mut viewport = ViewportMapper::new(100.0);
        viewport.load(1000, 10.0);

        timeline.add(waypoint(0.5, 1)).unwrap();
        timeline.add(waypoint(0.2, 2)).unwrap();
        timeline.add(waypoint(3.0, 3)).unwrap();
        let moved = timeline.id_at(0).unwrap();
        let new_index = timeline.move_time(0, 0.8).unwrap();
        assert_eq!(timeline.id_at(new_index), Some(moved));

        let markers = timeline.markers(&viewport);
        assert_eq!(markers.len(), 3);
        for (index, marker) in markers.iter().enumerate() {
            assert_eq!(marker.index, index);
            assert_eq!(Some(marker.id), timeline.id_at(index));
        }
        assert!((markers[0].x - 50.0).abs() < 1e-3);
        assert!(markers[1].visible);
        assert!(!markers[2].visible);
    }

    #[test]
    fn hit_test_prefers_markers() {
        let (mut timeline, _clock) = timeline();
        let mut viewport = ViewportMapper::new(100.0);
        viewport.load(1000, 10.0);
        timeline.add(waypoint(0.4, 1)).unwrap();

        assert!(matches!(
            timeline.hit_test(45.0, &viewport),
            VisualElement::Marker { index: 0, .. }
        ));
        assert_eq!(
            timeline.hit_test(80.0, &viewport),
            VisualElement::Spectrogram { column: 80 }
        );
    }

    #[test]
    fn selection_survives_resorting() {
        let (mut timeline, _clock) = timeline();
        timeline.add(waypoint(1.0, 1)).unwrap();
        timeline.add(waypoint(2.0, 2)).unwrap();
        timeline.select(0).unwrap();
        timeline.move_time(0, 5.0).unwrap();
        assert_eq!(timeline.selected(), Some(1));

        let removed = timeline.remove_selected().unwrap().unwrap();
        assert_eq!(removed.time_seconds, 5.0);
        assert_eq!(timeline.selected(), None);
        assert!(timeline.remove_selected().unwrap().is_none());
    }

    #[test]
    fn dragging_a_marker_moves_its_waypoint() {
        let (mut timeline, _clock) = timeline();
        let mut viewport = ViewportMapper::new(100.0);
        viewport.load(1000, 10.0);
        timeline.add(waypoint(0.1, 1)).unwrap();
        timeline.add(waypoint(0.5, 2)).unwrap();

        let index = timeline.drag_marker(0, 70.0, &viewport).unwrap();
        assert_eq!(index, 1);
        assert!((timeline.get(1).unwrap().time_seconds - 0.7).abs() < 1e-6);
    }

    #[test]
    fn import_overwrites_or_appends() {
        let (mut timeline, _clock) = timeline();
        timeline.add(waypoint(9.0, 9)).unwrap();

        timeline
            .import(vec![waypoint(2.0, 2), waypoint(1.0, 1)], ImportMode::Append)
            .unwrap();
        assert_eq!(timeline.len(), 3);
        assert!(is_sorted(&timeline));

        timeline
            .import(vec![waypoint(4.0, 4)], ImportMode::Overwrite)
            .unwrap();
        assert_eq!(timeline.len(), 1);
        assert_eq!(timeline.get(0).unwrap().time_seconds, 4.0);
    }

    #[test]
    fn resizing_suits_keeps_state_counts_aligned() {
        let (mut timeline, _clock) = timeline();
        timeline.add(waypoint(1.0, 5)).unwrap();

        timeline.set_suit_count(4).unwrap();
        assert_eq!(timeline.get(0).unwrap().suit_count(), 4);
        assert!(timeline.get(0).unwrap().suit_states[3].is_dark());

        timeline.set_suit_count(1).unwrap();
        assert_eq!(timeline.get(0).unwrap().suit_states, vec![state(5)]);
        assert!(timeline.add(waypoint(2.0, 1)).is_err());
    }

    #[test]
    fn resizing_suits_is_refused_while_playing() {
        let (mut timeline, clock) = timeline();
        timeline.add(waypoint(1.0, 5)).unwrap();
        clock.play();

        assert!(matches!(
            timeline.set_suit_count(3),
            Err(LedSuitError::PlaybackActive)
        ));
        assert_eq!(timeline.suit_count(), 2);
        assert_eq!(timeline.get(0).unwrap().suit_count(), 2);
        timeline.set_suit_count(2).unwrap();
    }
}
