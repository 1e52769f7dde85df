use crate::notes::Note;

/// One monophonic voice: notes in time order, none overlapping the next.
pub type Stream = Vec<Note>;

/// Split one track's notes into monophonic streams.
///
/// Notes are ordered by start (stable, so equal starts keep release order). Each
/// pass greedily takes every note that starts at or after the end of the last one
/// taken; the taken notes form a stream and the rest go round again. Within a
/// stream a note repeating the running velocity loses its velocity.
pub fn partition(mut notes: Vec<Note>) -> Vec<Stream> {
    notes.sort_by(|a, b| a.start.total_cmp(&b.start));

    let mut streams = Vec::new();
    while !notes.is_empty() {
        let mut stream = Vec::new();
        let mut rest = Vec::new();
        let mut current_end = 0.0;
        let mut velocity: Option<u8> = None;

        for mut note in notes {
            if note.start < current_end {
                rest.push(note);
                continue;
            }
            if note.velocity == velocity {
                note.velocity = None;
            } else {
                velocity = note.velocity;
            }
            current_end = note.end;
            stream.push(note);
        }

        streams.push(stream);
        notes = rest;
    }
    streams
}

/// Partition every track and flatten, keeping track order.
pub fn partition_tracks(tracks: Vec<Vec<Note>>) -> Vec<Stream> {
    tracks.into_iter().flat_map(partition).collect()
}
