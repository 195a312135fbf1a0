/// Errors that can occur while building or decoding a PLC frame.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// An append would run past the end of the 224-byte data area.
    #[error("frame data area exhausted ({requested} bytes requested, {available} available)")]
    CapacityExceeded { requested: usize, available: usize },

    /// The input is not a valid one or two digit packed-BCD value.
    #[error("invalid BCD input: {0}")]
    InvalidBcdInput(String),

    /// A word, dword or byte accessor was called with an index outside its range.
    #[error("index {index} out of range ({min}..={max})")]
    IndexOutOfRange { index: usize, min: usize, max: usize },

    /// The header date/time fields do not describe a valid local instant.
    #[error("frame header does not hold a valid timestamp")]
    InvalidTimestamp,

    /// The data area holds no end-of-text terminator.
    #[error("no end-of-text terminator in data area")]
    MissingTerminator,

    /// Every sequence number is currently awaiting acknowledgement.
    #[error("no free sequence number (all 256 in flight)")]
    SequenceExhausted,
}

pub type Result<T> = std::result::Result<T, FrameError>;
