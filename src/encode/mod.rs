//! Encoder collaborators.
//!
//! The writer converts every image into a [`YuvFrame`] and hands it to an [`Encoder`], which owns
//! the bitstream and container format. Encoders are created fresh for each flush.

/// `ffmpeg`-based AVIF sequence encoder.
pub mod ffmpeg;
/// Minimal ISO-BMFF box handling used to embed XMP into AVIF files.
pub mod isobmff;
/// In-memory encoder for tests and debugging.
pub mod recording;
/// Codec-native frames and RGB to YUV conversion.
pub mod yuv;

pub use self::yuv::{
    Bt601Converter, ChromaFormat, ConversionError, PixelConverter, RgbView, YuvFrame, YuvRange,
};

/// Settings every encoder is constructed with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EncoderConfig {
    /// Worker thread hint forwarded to the codec.
    pub max_threads: usize,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self { max_threads: 1 }
    }
}

/// Per-frame hand-off flags.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AddImageFlags(u32);

impl AddImageFlags {
    /// No special handling.
    pub const NONE: AddImageFlags = AddImageFlags(0);

    /// Raw bits.
    pub fn bits(self) -> u32 {
        self.0
    }
}

/// Failure category reported by an encoder.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EncoderFailureKind {
    /// A frame or parameter was rejected.
    InvalidArgument,
    /// `finish` was called without any accepted frame.
    NoContent,
    /// The codec itself failed.
    EncodeFailed,
    /// The encoder could not talk to its backend (process, pipe, temp file).
    Io,
    /// The produced container could not be post-processed.
    UnsupportedLayout,
}

impl EncoderFailureKind {
    /// Short, stable description of the failure category.
    pub fn as_str(self) -> &'static str {
        match self {
            EncoderFailureKind::InvalidArgument => "Invalid argument",
            EncoderFailureKind::NoContent => "No content",
            EncoderFailureKind::EncodeFailed => "Encoding failed",
            EncoderFailureKind::Io => "I/O error",
            EncoderFailureKind::UnsupportedLayout => "Unsupported container layout",
        }
    }
}

/// Structured encoder failure: a category plus the encoder's own diagnostic text.
#[derive(thiserror::Error, Clone, Debug, PartialEq, Eq)]
#[error("{message}")]
pub struct EncoderFailure {
    /// Failure category.
    pub kind: EncoderFailureKind,
    /// Diagnostic text.
    pub message: String,
}

impl EncoderFailure {
    /// Build a failure of `kind`.
    pub fn new(kind: EncoderFailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Failure for `finish` without frames.
    pub fn no_content() -> Self {
        Self::new(
            EncoderFailureKind::NoContent,
            EncoderFailureKind::NoContent.as_str(),
        )
    }
}

/// Encoder contract.
///
/// Ordering contract: `add_image` is called once per surviving frame in output order, then
/// `finish` is called exactly once. Dropping an encoder releases every resource it holds.
pub trait Encoder {
    /// Append one frame. Failures reject only this frame.
    fn add_image(&mut self, frame: &YuvFrame, flags: AddImageFlags) -> Result<(), EncoderFailure>;

    /// Produce the complete container bytes.
    fn finish(&mut self) -> Result<Vec<u8>, EncoderFailure>;
}

/// Builds one encoder per flush.
pub type EncoderFactory = Box<dyn Fn(&EncoderConfig) -> Box<dyn Encoder>>;
