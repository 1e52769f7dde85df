//! corpus.rs
//!
//! Batch conversion of whole corpora.
//!
//! A corpus is a directory with a `midi/` subtree. Converting it with a policy writes
//! `csv/<code>/<flattened name>.csv` next to `midi/` for every MIDI file, plus a
//! `csv/log<code>.txt` summary. Which corpora exist and which files they skip is
//! read from a TOML file:
//!
//! ```toml
//! [corpus.bach]
//! root = "bach"
//! excluded_files = ["suites/airgstr4.mid"]
//! excluded_path_substrings = ["wtcbki/"]
//! ```

use anyhow::{anyhow, Context, Result};
use rayon::prelude::*;
use serde::Deserialize;
use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    fs,
    io::Write,
    path::{Path, PathBuf},
};
use tracing::{info, warn};

use crate::convert::{convert_file, Conversion};
use crate::quantize::CompressionPolicy;

/// One corpus entry of the configuration file.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Corpus {
    /// Directory holding `midi/`; relative paths resolve against the config file
    pub root: PathBuf,
    /// Paths relative to `<root>/midi` that are never converted
    #[serde(default)]
    pub excluded_files: BTreeSet<PathBuf>,
    /// Any file whose path contains one of these is skipped
    #[serde(default)]
    pub excluded_path_substrings: BTreeSet<String>,
    /// Policies run when none are given on the command line (empty: all of them)
    #[serde(default)]
    pub methods: Vec<CompressionPolicy>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct CorpusConfig {
    #[serde(rename = "corpus", default)]
    pub corpora: BTreeMap<String, Corpus>,
}

impl CorpusConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading corpus config {}", path.display()))?;
        let mut cfg: Self = toml::from_str(&text)
            .with_context(|| format!("parsing corpus config {}", path.display()))?;

        let base = path.parent().unwrap_or(Path::new(""));
        for corpus in cfg.corpora.values_mut() {
            if corpus.root.is_relative() {
                corpus.root = base.join(&corpus.root);
            }
        }
        Ok(cfg)
    }
}

/// A file that could not be converted.
#[derive(Debug)]
pub struct Failure {
    pub input: PathBuf,
    pub error: anyhow::Error,
}

/// Outcome of converting one corpus with one policy.
#[derive(Debug)]
pub struct BatchReport {
    /// Successful conversions, ordered by `max_end`
    pub entries: Vec<Conversion>,
    pub failures: Vec<Failure>,
    pub log_path: PathBuf,
}

impl Corpus {
    pub fn midi_dir(&self) -> PathBuf {
        self.root.join("midi")
    }

    pub fn csv_dir(&self) -> PathBuf {
        self.root.join("csv")
    }

    fn is_excluded(&self, path: &Path) -> bool {
        let midi_dir = self.midi_dir();
        if let Ok(rel) = path.strip_prefix(&midi_dir) {
            if self.excluded_files.contains(rel) {
                return true;
            }
        }
        let shown = path.to_string_lossy();
        self.excluded_path_substrings.iter().any(|s| shown.contains(s.as_str()))
    }

    /// Every MIDI file under `midi/`, minus exclusions, sorted.
    pub fn midi_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        collect_midi_files(&self.midi_dir(), &mut files)?;
        files.retain(|f| !self.is_excluded(f));
        files.sort();
        Ok(files)
    }

    /// Output path for a file: `<root>/csv/<code>/<dir>_<dir>_<name>.csv`.
    pub fn csv_path(&self, midi_file: &Path, policy: CompressionPolicy) -> PathBuf {
        csv_path_under(&self.midi_dir(), midi_file, policy)
    }

    pub fn log_path(&self, policy: CompressionPolicy) -> PathBuf {
        self.csv_dir().join(format!("log{}.txt", policy.code()))
    }

    /// Convert every file of the corpus. Files are independent and run in parallel;
    /// a failing file is reported and the rest carry on.
    pub fn convert(&self, policy: CompressionPolicy) -> Result<BatchReport> {
        let files = self.midi_files()?;
        info!(root = %self.root.display(), files = files.len(), ?policy, "converting corpus");

        // flattening can map two inputs onto one CSV; only the first one is written
        let mut claimed: HashMap<PathBuf, PathBuf> = HashMap::new();
        let mut failures = Vec::new();
        let mut jobs = Vec::with_capacity(files.len());
        for input in files {
            let output = self.csv_path(&input, policy);
            if let Some(first) = claimed.get(&output) {
                warn!(
                    input = %input.display(),
                    first = %first.display(),
                    output = %output.display(),
                    "output path already taken, skipping"
                );
                let error =
                    anyhow!("output {} already written for {}", output.display(), first.display());
                failures.push(Failure { input, error });
                continue;
            }
            claimed.insert(output.clone(), input.clone());
            jobs.push((input, output));
        }

        let results: Vec<(PathBuf, Result<Conversion>)> = jobs
            .into_par_iter()
            .map(|(input, output)| {
                let res = convert_file(&input, &output, policy);
                (input, res)
            })
            .collect();

        let mut entries = Vec::new();
        for (input, res) in results {
            match res {
                Ok(c) => entries.push(c),
                Err(error) => {
                    warn!(input = %input.display(), "conversion failed: {error:#}");
                    failures.push(Failure { input, error });
                }
            }
        }
        entries.sort_by_key(|c| c.max_end);

        let log_path = self.log_path(policy);
        write_log(&log_path, &entries)?;
        info!(
            log = %log_path.display(),
            converted = entries.len(),
            failed = failures.len(),
            "corpus done"
        );
        Ok(BatchReport { entries, failures, log_path })
    }
}

/// `<midi_dir>/a/b/c.mid` -> `<midi_dir>/../csv/<code>/a_b_c.csv`.
pub fn csv_path_under(midi_dir: &Path, midi_file: &Path, policy: CompressionPolicy) -> PathBuf {
    let rel = midi_file.strip_prefix(midi_dir).unwrap_or(midi_file);
    let flat = rel
        .with_extension("csv")
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("_");
    midi_dir.with_file_name("csv").join(policy.code().to_string()).join(flat)
}

/// Where a single converted file goes when no output is given.
///
/// Inside a corpus (some ancestor directory is named `midi`) this is the same path
/// a corpus run would use, otherwise the input with a `.csv` extension.
pub fn default_csv_path(midi_file: &Path, policy: CompressionPolicy) -> PathBuf {
    midi_file
        .ancestors()
        .skip(1)
        .find(|dir| dir.file_name().is_some_and(|n| n == "midi"))
        .map(|midi_dir| csv_path_under(midi_dir, midi_file, policy))
        .unwrap_or_else(|| midi_file.with_extension("csv"))
}

fn is_midi_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("mid") || e.eq_ignore_ascii_case("midi"))
}

fn collect_midi_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    let entries = fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))?;
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        // symlinks are not followed
        if entry.file_type()?.is_dir() {
            collect_midi_files(&path, out)?;
        } else if is_midi_file(&path) {
            out.push(path);
        }
    }
    Ok(())
}

/// Count line, then one `['path', streams, max_end]` line per conversion.
fn write_log(path: &Path, entries: &[Conversion]) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    let mut f = fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
    writeln!(f, "{}", entries.len())?;
    for c in entries {
        writeln!(f, "['{}', {}, {}]", c.csv_path.display(), c.stream_count, c.max_end)?;
    }
    Ok(())
}
