//! Dynwall packs a sequence of still images into a single dynamic wallpaper container.
//!
//! Each image is paired with a [`MetaData`] record (time of day, solar position, cross-fade
//! mode). The writer serializes all records into one XMP block, converts every image into a
//! full-chroma YUV frame and hands the frames to an [`encode::Encoder`]:
//!
//! - Build the records and images
//! - Configure a [`WallpaperWriter`]
//! - [`WallpaperWriter::flush`] into an [`OutputDevice`] or a path
#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod foundation;

/// Output devices.
pub mod device;
/// Encoder collaborators, frame types and pixel conversion.
pub mod encode;
/// Per-frame metadata records.
pub mod metadata;
/// Dynamic wallpaper writer.
pub mod writer;
/// XMP metadata block.
pub mod xmp;

pub use crate::device::{BufferDevice, FileDevice, OpenMode, OutputDevice};
pub use crate::encode::ffmpeg::{FfmpegAvifEncoder, FfmpegAvifOpts};
pub use crate::encode::recording::RecordingEncoder;
pub use crate::encode::{Encoder, EncoderConfig, EncoderFailure, EncoderFailureKind};
pub use crate::foundation::error::{DynwallError, DynwallResult};
pub use crate::metadata::{CrossFadeMode, MetaData, MetaDataField, MetaDataFields};
pub use crate::writer::{DroppedFrame, FlushReport, WallpaperWriter, WriterErrorKind, WriterOpts};
