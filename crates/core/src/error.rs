/// Result alias that carries the custom [`LedSuitError`] type.
pub type Result<T> = std::result::Result<T, LedSuitError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum LedSuitError {
    /// Free-form message for failures that do not fit another variant.
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Malformed JSON document.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// The WAV decoder rejected the input file.
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),
    /// The FFT backend rejected a buffer.
    #[error("FFT error: {0}")]
    Fft(#[from] realfft::FftError),
    /// Caller supplied an argument outside its valid domain.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Only single channel audio can be analysed.
    #[error("unsupported channel count {0}, expected mono audio")]
    UnsupportedChannels(u16),
    /// Fewer samples than a single FFT frame.
    #[error("{samples} samples is shorter than one FFT frame of {fft_size}")]
    InsufficientSamples { samples: usize, fft_size: usize },
    /// Number of encoded suits disagrees with the configured connections.
    #[error("mismatch between number of suits ({suits}) and configured connections ({connections})")]
    SuitCountMismatch { suits: usize, connections: usize },
    /// A waypoint does not hold one state per configured suit.
    #[error("waypoint holds {actual} suit states, expected {expected}")]
    StateCountMismatch { expected: usize, actual: usize },
    /// Index does not address an existing element.
    #[error("index {index} out of range for {len} elements")]
    IndexOutOfRange { index: usize, len: usize },
    /// No usable audio output device, or the device refused the stream.
    #[error("audio output unavailable: {0}")]
    AudioDevice(String),
    /// Timeline edits are refused while audio is playing.
    #[error("playback is active, timeline edits are disabled")]
    PlaybackActive,
    /// An endpoint name could not be resolved to a socket address.
    #[error("could not resolve address `{0}`")]
    AddressResolution(String),
    /// Connecting to a suit failed or timed out.
    #[error("failed to connect to suit {suit} at {address}: {source}")]
    Connect {
        suit: usize,
        address: String,
        #[source]
        source: std::io::Error,
    },
    /// Writing the encoded stream to a suit failed or timed out.
    #[error("failed to send data to suit {suit} at {address}: {source}")]
    Send {
        suit: usize,
        address: String,
        #[source]
        source: std::io::Error,
    },
    /// The synchronisation datagram could not be broadcast.
    #[error("failed to broadcast start signal: {0}")]
    Broadcast(#[source] std::io::Error),
}

impl LedSuitError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    pub fn invalid<T: Into<String>>(msg: T) -> Self {
        Self::InvalidInput(msg.into())
    }
}

impl From<&str> for LedSuitError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for LedSuitError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
