use anyhow::{Context, Result};
use std::{fs::File, io::Write, path::Path};

use crate::error::ConvertError;
use crate::notes::{pitch_to_name, Note};
use crate::streams::Stream;

/// Cell grid for the turtle player.
///
/// Row 0 holds a single `!turtle(...)` control cell, every other row is one stream
/// with one column per grid step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Grid {
    rows: Vec<Vec<String>>,
}

impl Grid {
    /// Lay quantized streams out on the grid.
    ///
    /// Starts must already be whole steps and streams non-overlapping.
    pub fn render(streams: &[Stream], speed: u64) -> Result<Self, ConvertError> {
        let max_end = max_end(streams).ok_or(ConvertError::NoNotes)?;
        let width = max_end.floor() as usize + 1;

        let header = format!(
            "!turtle(A2:A{}, r m{}, {}, 1)",
            1 + streams.len(),
            width - 1,
            speed
        );
        let mut rows = Vec::with_capacity(streams.len() + 1);
        rows.push(vec![header]);

        for stream in streams {
            let mut cells = vec![String::new(); width];
            for note in stream {
                let start = note.start as usize;
                cells[start] = cell_text(note);
                for rest in 1..note.length as usize {
                    cells[start + rest] = "-".to_string();
                }
            }
            rows.push(cells);
        }

        Ok(Self { rows })
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// Number of grid steps (columns of a stream row).
    pub fn width(&self) -> usize {
        self.rows.get(1).map_or(0, Vec::len)
    }

    pub fn write_csv<W: Write>(&self, w: W) -> Result<()> {
        // the header row has one cell, the rest are full width
        let mut writer = csv::WriterBuilder::new().flexible(true).from_writer(w);
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Write the grid as CSV, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating {}", dir.display()))?;
        }
        let f = File::create(path).with_context(|| format!("creating {}", path.display()))?;
        self.write_csv(f)
            .with_context(|| format!("writing {}", path.display()))
    }
}

/// Latest end time over all notes, `None` if there are no notes.
pub fn max_end(streams: &[Stream]) -> Option<f64> {
    streams.iter().flatten().map(|n| n.end).reduce(f64::max)
}

fn cell_text(note: &Note) -> String {
    let name = pitch_to_name(note.pitch);
    match note.velocity {
        Some(v) => format!("{} {}", name, format_level(v)),
        None => name,
    }
}

/// Velocity as a fraction of 127 with two decimals, always keeping one: `0.79`, `1.0`.
fn format_level(velocity: u8) -> String {
    let level = (f64::from(velocity) / 127.0 * 100.0).round() / 100.0;
    format!("{level:?}")
}
