//! Dynamic wallpaper writer.
//!
//! [`WallpaperWriter`] collects images and their [`MetaData`], then [`WallpaperWriter::flush`]es
//! them into one container: every image becomes a full-chroma 8-bit frame carrying the same XMP
//! block (the base64 JSON array of all records).
//!
//! `flush` returns `Err` only when the destination cannot be opened for writing. Encoder
//! failures after a successful open are reported through [`WallpaperWriter::error`]; frames
//! that fail conversion or hand-off are skipped and listed in [`FlushReport::dropped`].

use std::io::Write;
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::Arc;

use image::{DynamicImage, RgbImage};

use crate::device::{FileDevice, OpenMode, OutputDevice, path_is_writable};
use crate::encode::ffmpeg::{FfmpegAvifEncoder, FfmpegAvifOpts};
use crate::encode::{
    AddImageFlags, Bt601Converter, ChromaFormat, EncoderConfig, EncoderFactory, PixelConverter,
    RgbView, YuvFrame,
};
use crate::foundation::error::{DynwallError, DynwallResult};
use crate::metadata::MetaData;
use crate::xmp;

/// Bit depth of every encoded frame.
pub const FRAME_DEPTH: u8 = 8;

/// Kind of the last error recorded by a [`WallpaperWriter`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WriterErrorKind {
    /// Nothing failed.
    #[default]
    NoError,
    /// The destination could not be opened or written.
    Device,
    /// The encoder failed to produce the container.
    Encoder,
}

/// Writer options.
#[derive(Clone, Debug, Default)]
pub struct WriterOpts {
    /// Encoder thread hint. `None` uses the available hardware parallelism.
    pub max_threads: Option<usize>,
}

/// A frame left out of the container.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DroppedFrame {
    /// Position of the image in [`WallpaperWriter::images`].
    pub index: usize,
    /// Why it was left out.
    pub reason: String,
}

/// Outcome of a flush that got past opening the destination.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Images handed to the pipeline.
    pub frames_submitted: usize,
    /// Frames accepted by the encoder.
    pub frames_encoded: usize,
    /// Frames skipped because conversion or hand-off failed.
    pub dropped: Vec<DroppedFrame>,
    /// Container bytes written to the destination (0 when nothing was written).
    pub bytes_written: usize,
}

impl FlushReport {
    /// Return `true` when a container was written.
    pub fn is_written(&self) -> bool {
        self.bytes_written > 0
    }

    /// Return `true` when a container was written and no frame was dropped.
    pub fn is_complete(&self) -> bool {
        self.is_written() && self.dropped.is_empty()
    }
}

/// Packs images and their metadata into a dynamic wallpaper container.
pub struct WallpaperWriter {
    images: Vec<RgbImage>,
    meta_data: Vec<MetaData>,
    error: WriterErrorKind,
    error_string: String,
    opts: WriterOpts,
    encoder_factory: EncoderFactory,
    converter: Box<dyn PixelConverter>,
}

impl Default for WallpaperWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for WallpaperWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WallpaperWriter")
            .field("images", &self.images.len())
            .field("meta_data", &self.meta_data)
            .field("error", &self.error)
            .field("error_string", &self.error_string)
            .field("opts", &self.opts)
            .finish_non_exhaustive()
    }
}

impl WallpaperWriter {
    /// Create an empty writer that encodes AVIF through the system `ffmpeg`.
    pub fn new() -> Self {
        Self::with_encoder(FfmpegAvifEncoder::factory(FfmpegAvifOpts::default()))
    }

    /// Create an empty writer using `factory` to build one encoder per flush.
    pub fn with_encoder(factory: EncoderFactory) -> Self {
        Self {
            images: Vec::new(),
            meta_data: Vec::new(),
            error: WriterErrorKind::NoError,
            error_string: String::new(),
            opts: WriterOpts::default(),
            encoder_factory: factory,
            converter: Box::new(Bt601Converter),
        }
    }

    /// Replace the RGB to YUV converter.
    pub fn with_converter(mut self, converter: impl PixelConverter + 'static) -> Self {
        self.converter = Box::new(converter);
        self
    }

    /// Replace the writer options.
    pub fn with_opts(mut self, opts: WriterOpts) -> Self {
        self.opts = opts;
        self
    }

    /// Replace the metadata records. Not checked against the image count.
    pub fn set_meta_data(&mut self, meta_data: impl Into<Vec<MetaData>>) {
        self.meta_data = meta_data.into();
    }

    /// Metadata records, one per image.
    pub fn meta_data(&self) -> &[MetaData] {
        &self.meta_data
    }

    /// Replace the images, converting each to 8-bit RGB without alpha.
    pub fn set_images<'a>(&mut self, images: impl IntoIterator<Item = &'a DynamicImage>) {
        self.images = images.into_iter().map(DynamicImage::to_rgb8).collect();
    }

    /// Stored images, always 8-bit interleaved RGB.
    pub fn images(&self) -> &[RgbImage] {
        &self.images
    }

    /// Kind of the last recorded error.
    pub fn error(&self) -> WriterErrorKind {
        self.error
    }

    /// Human-readable description of the last recorded error.
    pub fn error_string(&self) -> &str {
        match self.error {
            WriterErrorKind::NoError => "No error",
            _ => &self.error_string,
        }
    }

    /// Last recorded error as a [`DynwallError`], `None` while [`WriterErrorKind::NoError`].
    pub fn last_error(&self) -> Option<DynwallError> {
        match self.error {
            WriterErrorKind::NoError => None,
            WriterErrorKind::Device => Some(DynwallError::device(self.error_string.clone())),
            WriterErrorKind::Encoder => Some(DynwallError::encoder(self.error_string.clone())),
        }
    }

    /// Return `true` when `device` is open for writing.
    pub fn can_write(device: &dyn OutputDevice) -> bool {
        device.is_writable()
    }

    /// Return `true` when a wallpaper could be written at `path`. Creates nothing.
    pub fn can_write_path(path: impl AsRef<Path>) -> bool {
        path_is_writable(path.as_ref())
    }

    /// Encode and write the wallpaper to `device`, opening it for writing when closed.
    ///
    /// Returns `Err` only when the device is open read-only or cannot be opened; nothing is
    /// written in that case. Check [`WallpaperWriter::error`] for encoder failures.
    #[tracing::instrument(skip(self, device), fields(images = self.images.len()))]
    pub fn flush(&mut self, device: &mut dyn OutputDevice) -> DynwallResult<FlushReport> {
        if device.is_open() {
            if !device.is_writable() {
                return Err(self.device_error("the device is not open for writing".to_owned()));
            }
        } else if let Err(e) = device.open(OpenMode::WriteOnly) {
            return Err(self.device_error(e.to_string()));
        }

        Ok(self.write_container(device))
    }

    /// Encode and write the wallpaper to a file at `path`, creating or truncating it.
    pub fn flush_to_path(&mut self, path: impl AsRef<Path>) -> DynwallResult<FlushReport> {
        let mut file = FileDevice::new(path.as_ref());
        if let Err(e) = file.open(OpenMode::WriteOnly) {
            return Err(self.device_error(format!("{}: {e}", file.path().display())));
        }
        Ok(self.write_container(&mut file))
    }

    fn device_error(&mut self, message: String) -> DynwallError {
        self.set_error(WriterErrorKind::Device, message.clone());
        DynwallError::device(message)
    }

    fn set_error(&mut self, kind: WriterErrorKind, message: String) {
        self.error = kind;
        self.error_string = message;
    }

    fn thread_hint(&self) -> usize {
        self.opts.max_threads.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1)
        })
    }

    fn write_container<W: Write + ?Sized>(&mut self, device: &mut W) -> FlushReport {
        if self.images.len() != self.meta_data.len() {
            tracing::warn!(
                images = self.images.len(),
                meta_data = self.meta_data.len(),
                "image and metadata counts differ"
            );
        }

        let block: Arc<[u8]> = Arc::from(xmp::serialize_meta_data(&self.meta_data));
        let config = EncoderConfig {
            max_threads: self.thread_hint(),
        };
        let mut encoder = (self.encoder_factory)(&config);
        let mut report = FlushReport {
            frames_submitted: self.images.len(),
            ..FlushReport::default()
        };

        for (index, image) in self.images.iter().enumerate() {
            let mut frame = YuvFrame::new(
                image.width(),
                image.height(),
                FRAME_DEPTH,
                ChromaFormat::Yuv444,
            );
            frame.set_xmp(block.clone());

            if let Err(e) = self.converter.rgb_to_yuv(&RgbView::from(image), &mut frame) {
                tracing::warn!(index, error = %e, "dropping frame: pixel conversion failed");
                report.dropped.push(DroppedFrame {
                    index,
                    reason: e.to_string(),
                });
                continue;
            }
            if let Err(e) = encoder.add_image(&frame, AddImageFlags::NONE) {
                tracing::warn!(index, error = %e, "dropping frame: encoder rejected it");
                report.dropped.push(DroppedFrame {
                    index,
                    reason: e.to_string(),
                });
                continue;
            }
            report.frames_encoded += 1;
        }

        let finished = encoder.finish();
        drop(encoder);

        match finished {
            Ok(bytes) => match device.write_all(&bytes).and_then(|()| device.flush()) {
                Ok(()) => {
                    report.bytes_written = bytes.len();
                    self.set_error(WriterErrorKind::NoError, String::new());
                }
                Err(e) => self.set_error(WriterErrorKind::Device, e.to_string()),
            },
            Err(failure) => {
                tracing::warn!(kind = ?failure.kind, error = %failure, "encoder failed");
                self.set_error(WriterErrorKind::Encoder, failure.message);
            }
        }
        report
    }
}

#[cfg(test)]
#[path = "../tests/unit/writer.rs"]
mod tests;
