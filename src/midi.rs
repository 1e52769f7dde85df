//! midi.rs
//!
//! This module parses a Standard MIDI File (SMF) into per-track lists of raw note events.
//! Unlike a player, we keep events in their original tracks and in delta ticks: the
//! note extractor does its own time accumulation, and the quantizer wants ticks.
//!
//! ### Quick primer on MIDI timing
//! - Each event carries a delta: ticks elapsed since the previous event in the same track.
//! - The header's ticks-per-beat (PPQ) says how many ticks make a quarter note.
//! - A Tempo meta event says how many microseconds one quarter note lasts.
//!
//! This module takes care of:
//!  - Reading PPQ from the header and the first tempo of the first track
//!  - Normalizing every event into `RawEvent` so non-note events still advance time
//!  - Leaving NoteOn with velocity=0 as a NoteOn; the extractor treats it as a release

use anyhow::{Context, Result};
use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use std::path::Path;

use crate::error::ConvertError;

/// What a raw event means to the note extractor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    NoteOn,
    NoteOff,
    /// Anything else: controllers, meta events, sysex. Only its delta matters.
    Other,
}

/// One track event reduced to the fields the converter reads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RawEvent {
    /// Ticks since the previous event of the same track
    pub delta: u32,
    pub kind: EventKind,
    pub pitch: u8,
    pub velocity: u8,
}

impl RawEvent {
    pub fn note_on(delta: u32, pitch: u8, velocity: u8) -> Self {
        Self { delta, kind: EventKind::NoteOn, pitch, velocity }
    }

    pub fn note_off(delta: u32, pitch: u8) -> Self {
        Self { delta, kind: EventKind::NoteOff, pitch, velocity: 0 }
    }

    pub fn other(delta: u32) -> Self {
        Self { delta, kind: EventKind::Other, pitch: 0, velocity: 0 }
    }
}

/// The parsed result of a MIDI file.
#[derive(Debug, Clone)]
pub struct MidiFile {
    /// One event list per track, in file order
    pub tracks: Vec<Vec<RawEvent>>,
    /// Microseconds per quarter note, from the first track
    pub tempo: u32,
    /// Pulses per quarter note (from header)
    pub ticks_per_beat: u16,
}

impl MidiFile {
    /// Read and parse a MIDI file from disk.
    pub fn open(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)
            .with_context(|| format!("reading MIDI file {}", path.display()))?;
        let smf = Smf::parse(&data)
            .with_context(|| format!("parsing MIDI file {}", path.display()))?;
        Ok(Self::from_smf(&smf)?)
    }

    /// Convert an already parsed SMF.
    pub fn from_smf(smf: &Smf<'_>) -> Result<Self, ConvertError> {
        let ticks_per_beat = match smf.header.timing {
            Timing::Metrical(t) => t.as_int(),
            Timing::Timecode(..) => return Err(ConvertError::UnsupportedTiming),
        };

        // Only the first track is searched, later tempo changes are ignored
        let tempo = smf
            .tracks
            .first()
            .and_then(|tr| {
                tr.iter().find_map(|ev| match ev.kind {
                    TrackEventKind::Meta(MetaMessage::Tempo(tp)) => Some(tp.as_int()),
                    _ => None,
                })
            })
            .ok_or(ConvertError::MissingTempo)?;

        let tracks = smf
            .tracks
            .iter()
            .map(|tr| {
                tr.iter()
                    .map(|ev| {
                        let delta = ev.delta.as_int();
                        match ev.kind {
                            TrackEventKind::Midi { message, .. } => match message {
                                MidiMessage::NoteOn { key, vel } => {
                                    RawEvent::note_on(delta, key.as_int(), vel.as_int())
                                }
                                MidiMessage::NoteOff { key, .. } => {
                                    RawEvent::note_off(delta, key.as_int())
                                }
                                _ => RawEvent::other(delta),
                            },
                            _ => RawEvent::other(delta),
                        }
                    })
                    .collect()
            })
            .collect();

        Ok(Self { tracks, tempo, ticks_per_beat })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use midly::num::{u4, u15, u24};
    use midly::{Format, Header, TrackEvent};

    pub(crate) fn note(delta: u32, key: u8, vel: u8) -> TrackEvent<'static> {
        TrackEvent {
            delta: delta.into(),
            kind: TrackEventKind::Midi {
                channel: u4::from(0u8),
                message: MidiMessage::NoteOn { key: key.into(), vel: vel.into() },
            },
        }
    }

    pub(crate) fn tempo(us_per_qn: u32) -> TrackEvent<'static> {
        TrackEvent {
            delta: 0u32.into(),
            kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::from(us_per_qn))),
        }
    }

    pub(crate) fn end_of_track() -> TrackEvent<'static> {
        TrackEvent { delta: 0u32.into(), kind: TrackEventKind::Meta(MetaMessage::EndOfTrack) }
    }

    /// A small two-track file: a tempo/melody track and a bass track.
    pub(crate) fn sample_smf() -> Smf<'static> {
        let header = Header::new(Format::Parallel, Timing::Metrical(u15::from(96u16)));
        let melody = vec![
            tempo(500_000),
            note(0, 60, 100),
            note(48, 60, 0),
            note(0, 62, 100),
            note(48, 62, 0),
            note(0, 64, 80),
            note(96, 64, 0),
            end_of_track(),
        ];
        let bass = vec![note(0, 48, 90), note(192, 48, 0), end_of_track()];
        Smf { header, tracks: vec![melody, bass] }
    }

    #[test]
    fn reads_tempo_and_ppq() {
        let mf = MidiFile::from_smf(&sample_smf()).unwrap();
        assert_eq!(mf.tempo, 500_000);
        assert_eq!(mf.ticks_per_beat, 96);
        assert_eq!(mf.tracks.len(), 2);
    }

    #[test]
    fn keeps_non_note_events_as_other() {
        let mf = MidiFile::from_smf(&sample_smf()).unwrap();
        assert_eq!(mf.tracks[0][0], RawEvent::other(0));
        assert_eq!(mf.tracks[0][1], RawEvent::note_on(0, 60, 100));
        assert_eq!(mf.tracks[0][2], RawEvent::note_on(48, 60, 0));
    }

    #[test]
    fn missing_tempo_is_rejected() {
        let mut smf = sample_smf();
        smf.tracks[0].remove(0);
        let err = MidiFile::from_smf(&smf).unwrap_err();
        assert_eq!(err, ConvertError::MissingTempo);
    }

    #[test]
    fn tempo_in_later_track_does_not_count() {
        let mut smf = sample_smf();
        let t = smf.tracks[0].remove(0);
        smf.tracks[1].insert(0, t);
        assert_eq!(MidiFile::from_smf(&smf).unwrap_err(), ConvertError::MissingTempo);
    }

    #[test]
    fn opens_file_from_disk() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        sample_smf().save(tmp.path()).unwrap();
        let mf = MidiFile::open(tmp.path()).unwrap();
        assert_eq!(mf.tracks[1].len(), 3);
    }

    #[test]
    fn garbage_file_fails_to_parse() {
        use std::io::Write;
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"not a midi file").unwrap();
        f.flush().unwrap();
        let err = MidiFile::open(f.path()).unwrap_err();
        assert!(format!("{err}").contains("parsing MIDI file"));
    }
}
