//! Playback state for one viewing session.
//!
//! The session owns the loaded records, the current index and the play
//! flag. Playback is a plain step function: a caller with a timer sleeps
//! for [`SessionState::delay`] and then calls [`SessionState::advance`].

use std::time::Duration;

use crate::config::{AnimationSpeed, ClassifierConfig};
use crate::diagram::Diagram;
use crate::record::Record;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    records: Vec<Record>,
    current_index: usize,
    playing: bool,
    animation_speed: AnimationSpeed,
}

impl SessionState {
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            records,
            ..Default::default()
        }
    }

    pub fn with_animation_speed(mut self, speed: AnimationSpeed) -> Self {
        self.animation_speed = speed;
        self
    }

    /// Swaps in freshly loaded records and rewinds.
    ///
    /// A failed reload should simply not call this, leaving the previous
    /// records in place.
    pub fn replace_records(&mut self, records: Vec<Record>) {
        self.records = records;
        self.reset();
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn delay(&self) -> Duration {
        self.animation_speed.delay()
    }

    /// The Play/Pause control.
    pub fn toggle_play(&mut self) {
        self.playing = !self.playing;
    }

    /// The Reset control: back to the first record, stopped.
    pub fn reset(&mut self) {
        self.current_index = 0;
        self.playing = false;
    }

    pub fn at_last(&self) -> bool {
        self.current_index + 1 >= self.records.len()
    }

    /// One animation step.
    ///
    /// While playing and before the last record, moves to the next record;
    /// otherwise playback stops and the index stays put.
    pub fn advance(mut self) -> Self {
        if self.playing && !self.at_last() {
            self.current_index += 1;
        } else {
            self.playing = false;
        }
        self
    }

    /// Records up to and including the current one.
    pub fn visible(&self) -> &[Record] {
        if self.records.is_empty() {
            return &[];
        }
        let end = (self.current_index + 1).min(self.records.len());
        &self.records[..end]
    }

    /// Diagram of the visible records with the current one highlighted.
    pub fn frame(&self, config: &ClassifierConfig) -> Diagram {
        let visible = self.visible();
        let current = (!visible.is_empty()).then_some(self.current_index);
        Diagram::build(visible, config, current)
    }

    /// `Showing point X of Y`, or `0 of 0` when nothing is loaded.
    pub fn position_label(&self) -> String {
        if self.records.is_empty() {
            return "Showing point 0 of 0".to_string();
        }
        format!(
            "Showing point {} of {}",
            self.current_index + 1,
            self.records.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::PointState;
    use chrono::NaiveDate;

    fn session(n: usize) -> SessionState {
        let at = NaiveDate::from_ymd_opt(2024, 11, 22)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        SessionState::new(
            (0..n)
                .map(|_| Record::new(at, 40.0, 30.0))
                .collect(),
        )
    }

    #[test]
    fn test_empty_session() {
        let s = session(0);
        assert_eq!(s.position_label(), "Showing point 0 of 0");
        assert!(s.visible().is_empty());
        assert!(s.frame(&ClassifierConfig::default()).points.is_empty());

        let mut s = s;
        s.toggle_play();
        let s = s.advance();
        assert!(!s.is_playing());
        assert_eq!(s.current_index(), 0);
    }

    #[test]
    fn test_advance_only_while_playing() {
        let s = session(3).advance();
        assert_eq!(s.current_index(), 0);
        assert!(!s.is_playing());

        let mut s = session(3);
        s.toggle_play();
        let s = s.advance();
        assert_eq!(s.current_index(), 1);
        assert!(s.is_playing());
    }

    #[test]
    fn test_advance_stops_at_last_record() {
        let mut s = session(3);
        s.toggle_play();
        let s = s.advance().advance();
        assert_eq!(s.current_index(), 2);
        assert!(s.is_playing());

        let s = s.advance();
        assert_eq!(s.current_index(), 2);
        assert!(!s.is_playing());
        assert_eq!(s.position_label(), "Showing point 3 of 3");
    }

    #[test]
    fn test_reset() {
        let mut s = session(4);
        s.toggle_play();
        let mut s = s.advance().advance();
        s.reset();
        assert_eq!(s.current_index(), 0);
        assert!(!s.is_playing());
    }

    #[test]
    fn test_frame_covers_visible_prefix() {
        let mut s = session(5);
        s.toggle_play();
        let s = s.advance().advance().advance();
        let frame = s.frame(&ClassifierConfig::default());
        assert_eq!(frame.points.len(), 4);
        assert_eq!(frame.points[3].state, PointState::FullActivation);
        assert_eq!(frame.points[3].label.as_deref(), Some("Point 4"));
    }

    #[test]
    fn test_replace_records_rewinds() {
        let mut s = session(3);
        s.toggle_play();
        let mut s = s.advance();
        s.replace_records(session(1).records().to_vec());
        assert_eq!(s.current_index(), 0);
        assert!(!s.is_playing());
        assert_eq!(s.position_label(), "Showing point 1 of 1");
    }

    #[test]
    fn test_animation_speed() {
        let s = session(1).with_animation_speed(AnimationSpeed::new(2.0).unwrap());
        assert_eq!(s.delay(), Duration::from_secs(2));
        assert_eq!(session(1).delay(), Duration::from_millis(500));
    }
}
