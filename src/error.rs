/// Per-file conversion failures.
///
/// These abort one file's conversion. The batch driver reports them and moves on.
/// Note-offs without a pending note-on are not an error: the extractor drops them.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ConvertError {
    #[error("no tempo meta-event in the first track")]
    MissingTempo,
    #[error("SMPTE timecode timing is not supported")]
    UnsupportedTiming,
    #[error("no note {0} greater than one tick to quantize against")]
    InsufficientVariation(&'static str),
    #[error("file contains no complete notes")]
    NoNotes,
}
