use std::collections::{HashMap, VecDeque};

use tracing::trace;

use crate::midi::{EventKind, RawEvent};

/// A closed note interval.
///
/// Times are ticks until the quantizer rewrites them into grid steps.
#[derive(Clone, Debug, PartialEq)]
pub struct Note {
    pub pitch: u8,
    pub start: f64,
    pub end: f64,
    pub length: f64,
    /// Absent when the previous note of the same stream had the same velocity
    pub velocity: Option<u8>,
}

impl Note {
    pub fn new(pitch: u8, start: f64, end: f64, velocity: u8) -> Self {
        Self { pitch, start, end, length: end - start, velocity: Some(velocity) }
    }
}

/// A note-on still waiting for its release.
#[derive(Clone, Copy, Debug)]
struct Pending {
    start: u64,
    velocity: u8,
}

/// Pair note-ons with note-offs for one track.
///
/// Notes come out in the order they were released. Every pitch keeps a stack of
/// pending onsets, so a pitch struck twice before any release pairs its releases
/// last-in first-out instead of crossing. A release with nothing pending is dropped.
pub fn extract_notes(events: &[RawEvent]) -> Vec<Note> {
    let mut active: HashMap<u8, VecDeque<Pending>> = HashMap::new();
    let mut notes = Vec::new();
    let mut time: u64 = 0;
    let mut unmatched = 0usize;

    for ev in events {
        time += u64::from(ev.delta);
        match ev.kind {
            EventKind::NoteOn if ev.velocity > 0 => {
                active
                    .entry(ev.pitch)
                    .or_default()
                    .push_back(Pending { start: time, velocity: ev.velocity });
            }
            EventKind::NoteOn | EventKind::NoteOff => {
                let Some(p) = active.get_mut(&ev.pitch).and_then(|s| s.pop_back()) else {
                    unmatched += 1;
                    continue;
                };
                // on and off on the same tick
                if time == p.start {
                    continue;
                }
                notes.push(Note::new(ev.pitch, p.start as f64, time as f64, p.velocity));
            }
            EventKind::Other => {}
        }
    }

    if unmatched > 0 {
        trace!(unmatched, "dropped note-offs without a pending note-on");
    }
    notes
}

const NOTE_NAMES: [&str; 12] = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];

/// Scientific pitch name with sharps, e.g. 60 -> "C4", 61 -> "C#4", 0 -> "C-1".
pub fn pitch_to_name(pitch: u8) -> String {
    let octave = i32::from(pitch / 12) - 1;
    format!("{}{}", NOTE_NAMES[usize::from(pitch % 12)], octave)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn on(delta: u32, pitch: u8, vel: u8) -> RawEvent {
        RawEvent::note_on(delta, pitch, vel)
    }

    fn off(delta: u32, pitch: u8) -> RawEvent {
        RawEvent::note_off(delta, pitch)
    }

    #[test]
    fn pairs_on_and_off() {
        let notes = extract_notes(&[on(10, 60, 100), off(20, 60)]);
        assert_eq!(notes, vec![Note::new(60, 10.0, 30.0, 100)]);
        assert_eq!(notes[0].length, 20.0);
    }

    #[test]
    fn zero_velocity_note_on_releases() {
        let notes = extract_notes(&[on(0, 64, 90), on(12, 64, 0)]);
        assert_eq!(notes, vec![Note::new(64, 0.0, 12.0, 90)]);
    }

    #[test]
    fn repeated_onsets_pair_lifo() {
        // pitch 71 struck twice before either release
        let notes = extract_notes(&[
            on(0, 71, 100),
            on(10, 71, 50),
            off(10, 71),
            off(10, 71),
        ]);
        assert_eq!(
            notes,
            vec![Note::new(71, 10.0, 20.0, 50), Note::new(71, 0.0, 30.0, 100)]
        );
    }

    #[test]
    fn unmatched_release_is_ignored() {
        let notes = extract_notes(&[off(5, 60), on(5, 62, 70), off(5, 62), off(5, 62)]);
        assert_eq!(notes, vec![Note::new(62, 10.0, 15.0, 70)]);
    }

    #[test]
    fn other_events_advance_time() {
        let notes = extract_notes(&[RawEvent::other(7), on(3, 60, 1), RawEvent::other(5), off(5, 60)]);
        assert_eq!(notes, vec![Note::new(60, 10.0, 20.0, 1)]);
    }

    #[test]
    fn zero_length_notes_are_dropped() {
        let notes = extract_notes(&[on(0, 60, 100), off(0, 60), on(4, 60, 100), off(4, 60)]);
        assert_eq!(notes, vec![Note::new(60, 4.0, 8.0, 100)]);
    }

    #[test]
    fn notes_are_ordered_by_release() {
        let notes = extract_notes(&[on(0, 48, 80), on(0, 60, 80), off(10, 60), off(10, 48)]);
        let pitches: Vec<u8> = notes.iter().map(|n| n.pitch).collect();
        assert_eq!(pitches, vec![60, 48]);
    }

    #[test]
    fn names_known_pitches() {
        assert_eq!(pitch_to_name(60), "C4");
        assert_eq!(pitch_to_name(69), "A4");
        assert_eq!(pitch_to_name(61), "C#4");
        assert_eq!(pitch_to_name(0), "C-1");
        assert_eq!(pitch_to_name(11), "B-1");
        assert_eq!(pitch_to_name(127), "G9");
    }

    #[test]
    fn names_follow_chromatic_table() {
        let letters = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];
        for pitch in 0u8..=127 {
            let octave = pitch as i32 / 12 - 1;
            let expected = format!("{}{}", letters[pitch as usize % 12], octave);
            assert_eq!(pitch_to_name(pitch), expected, "pitch {pitch}");
        }
    }

    fn raw_event() -> impl Strategy<Value = RawEvent> {
        (0u8..4, 60u8..63, 1u8..128, 1u32..20).prop_map(|(kind, pitch, vel, delta)| match kind {
            0 => on(delta, pitch, vel),
            1 => off(delta, pitch),
            2 => on(delta, pitch, 0),
            _ => RawEvent::other(delta),
        })
    }

    proptest! {
        #[test]
        fn extracted_notes_are_well_formed(events in prop::collection::vec(raw_event(), 0..200)) {
            // every delta is at least one tick, so no pair is zero-length
            let mut pending = [0usize; 128];
            let mut matched = 0usize;
            for ev in &events {
                let slot = &mut pending[usize::from(ev.pitch)];
                match ev.kind {
                    EventKind::NoteOn if ev.velocity > 0 => *slot += 1,
                    EventKind::NoteOn | EventKind::NoteOff if *slot > 0 => {
                        *slot -= 1;
                        matched += 1;
                    }
                    _ => {}
                }
            }

            let notes = extract_notes(&events);
            prop_assert_eq!(notes.len(), matched);
            for note in &notes {
                prop_assert!(note.end > note.start);
                prop_assert!(note.pitch <= 127);
                prop_assert!(note.velocity.is_some_and(|v| v > 0));
                prop_assert_eq!(note.length, note.end - note.start);
            }
        }
    }
}
