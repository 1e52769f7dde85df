use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::ConvertError;
use crate::grid::{max_end, Grid};
use crate::midi::MidiFile;
use crate::notes::extract_notes;
use crate::quantize::{quantize, CompressionPolicy, Quantized};
use crate::streams::partition_tracks;

/// What one conversion produced, as recorded in the batch log.
#[derive(Clone, Debug, PartialEq)]
pub struct Conversion {
    pub csv_path: PathBuf,
    pub stream_count: usize,
    pub max_end: u64,
    pub stats: Quantized,
}

/// Run the whole pipeline in memory: notes, streams, quantization, grid.
pub fn convert_midi(midi: &MidiFile, policy: CompressionPolicy) -> Result<(Grid, Conversion)> {
    let tracks = midi.tracks.iter().map(|t| extract_notes(t)).collect();
    let mut streams = partition_tracks(tracks);
    debug!(streams = streams.len(), "partitioned tracks");
    if streams.is_empty() {
        return Err(ConvertError::NoNotes.into());
    }

    let stats = quantize(&mut streams, policy, midi.tempo, midi.ticks_per_beat)?;
    let grid = Grid::render(&streams, stats.speed)?;
    let max_end = max_end(&streams).unwrap_or_default() as u64;

    let summary = Conversion {
        csv_path: PathBuf::new(),
        stream_count: streams.len(),
        max_end,
        stats,
    };
    Ok((grid, summary))
}

/// Convert one MIDI file to a CSV grid on disk.
pub fn convert_file(input: &Path, output: &Path, policy: CompressionPolicy) -> Result<Conversion> {
    let midi = MidiFile::open(input)?;
    let (grid, mut summary) = convert_midi(&midi, policy)?;
    grid.save(output)?;
    summary.csv_path = output.to_path_buf();

    info!(
        input = %input.display(),
        output = %output.display(),
        streams = summary.stream_count,
        speed = summary.stats.speed,
        "converted"
    );
    Ok(summary)
}
