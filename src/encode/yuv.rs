use std::sync::Arc;

/// Chroma layout of a [`YuvFrame`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChromaFormat {
    /// Full-resolution chroma planes (no subsampling).
    Yuv444,
}

impl ChromaFormat {
    /// Numeric tag used by box-based containers.
    pub fn tag(self) -> u8 {
        match self {
            ChromaFormat::Yuv444 => 1,
        }
    }

    /// `ffmpeg` pixel format name for 8-bit samples.
    pub fn ffmpeg_pix_fmt(self) -> &'static str {
        match self {
            ChromaFormat::Yuv444 => "yuv444p",
        }
    }

    /// Dimensions of plane `plane` (0 = Y, 1 = U, 2 = V) for a `width`x`height` image.
    pub fn plane_size(self, width: u32, height: u32, _plane: usize) -> (u32, u32) {
        match self {
            ChromaFormat::Yuv444 => (width, height),
        }
    }
}

/// Sample range of a [`YuvFrame`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum YuvRange {
    /// Samples span the whole 0..=255 scale.
    Full,
    /// Studio swing: luma 16..=235, chroma 16..=240.
    #[default]
    Limited,
}

impl YuvRange {
    /// Numeric tag used by box-based containers (AV1 `color_range` semantics).
    pub fn tag(self) -> u8 {
        match self {
            YuvRange::Limited => 0,
            YuvRange::Full => 1,
        }
    }

    /// Parse a [`YuvRange::tag`].
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(YuvRange::Limited),
            1 => Some(YuvRange::Full),
            _ => None,
        }
    }

    /// `ffmpeg` `-color_range` value.
    pub fn ffmpeg_color_range(self) -> &'static str {
        match self {
            YuvRange::Full => "pc",
            YuvRange::Limited => "tv",
        }
    }
}

/// Codec-native planar frame, plus the metadata block attached to it.
///
/// New frames are tagged [`YuvRange::Limited`]; the converter that fills the planes sets the
/// range it produced. Planes are tightly packed (row stride == plane width)
/// and stay empty until a [`PixelConverter`] fills them.
#[derive(Clone, Debug)]
pub struct YuvFrame {
    width: u32,
    height: u32,
    depth: u8,
    format: ChromaFormat,
    range: YuvRange,
    planes: [Vec<u8>; 3],
    xmp: Option<Arc<[u8]>>,
}

impl YuvFrame {
    /// Create a frame without pixel data.
    pub fn new(width: u32, height: u32, depth: u8, format: ChromaFormat) -> Self {
        Self {
            width,
            height,
            depth,
            format,
            range: YuvRange::default(),
            planes: [Vec::new(), Vec::new(), Vec::new()],
            xmp: None,
        }
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Bits per sample.
    pub fn depth(&self) -> u8 {
        self.depth
    }

    /// Chroma layout.
    pub fn format(&self) -> ChromaFormat {
        self.format
    }

    /// Sample range.
    pub fn range(&self) -> YuvRange {
        self.range
    }

    /// Tag the sample range of the planes.
    pub fn set_range(&mut self, range: YuvRange) {
        self.range = range;
    }

    /// Attach the XMP metadata block.
    pub fn set_xmp(&mut self, xmp: Arc<[u8]>) {
        self.xmp = Some(xmp);
    }

    /// Attached XMP metadata block, if any.
    pub fn xmp(&self) -> Option<&[u8]> {
        self.xmp.as_deref()
    }

    /// Samples of plane `index` (0 = Y, 1 = U, 2 = V).
    pub fn plane(&self, index: usize) -> &[u8] {
        &self.planes[index]
    }

    /// Row stride of plane `index` in bytes.
    pub fn row_bytes(&self, index: usize) -> usize {
        self.format.plane_size(self.width, self.height, index).0 as usize
    }

    /// Return `true` once all three planes hold samples.
    pub fn has_pixels(&self) -> bool {
        if self.width == 0 || self.height == 0 {
            return false;
        }
        (0..3).all(|i| {
            let (w, h) = self.format.plane_size(self.width, self.height, i);
            self.planes[i].len() == w as usize * h as usize
        })
    }

    /// Replace the three planes, checking their sizes.
    pub fn set_planes(&mut self, planes: [Vec<u8>; 3]) -> Result<(), ConversionError> {
        for (i, plane) in planes.iter().enumerate() {
            let (w, h) = self.format.plane_size(self.width, self.height, i);
            let expected = w as usize * h as usize;
            if plane.len() != expected {
                return Err(ConversionError::BufferTooShort {
                    len: plane.len(),
                    expected,
                });
            }
        }
        self.planes = planes;
        Ok(())
    }
}

/// Borrowed interleaved 8-bit RGB pixels.
#[derive(Clone, Copy, Debug)]
pub struct RgbView<'a> {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Distance between the starts of two rows, in bytes.
    pub row_bytes: usize,
    /// Pixel bytes, `R, G, B` per pixel.
    pub pixels: &'a [u8],
}

impl<'a> From<&'a image::RgbImage> for RgbView<'a> {
    fn from(img: &'a image::RgbImage) -> Self {
        Self {
            width: img.width(),
            height: img.height(),
            row_bytes: img.width() as usize * 3,
            pixels: img.as_raw(),
        }
    }
}

/// Reasons an RGB buffer could not be converted.
#[derive(thiserror::Error, Clone, Debug, PartialEq, Eq)]
pub enum ConversionError {
    /// Zero width or height.
    #[error("image has zero width or height")]
    EmptyImage,
    /// Frame and image dimensions differ.
    #[error("frame is {frame_width}x{frame_height} but image is {image_width}x{image_height}")]
    SizeMismatch {
        /// Frame width.
        frame_width: u32,
        /// Frame height.
        frame_height: u32,
        /// Image width.
        image_width: u32,
        /// Image height.
        image_height: u32,
    },
    /// Row stride cannot hold a full row.
    #[error("row stride {row_bytes} is smaller than {min} bytes")]
    StrideTooSmall {
        /// Provided stride.
        row_bytes: usize,
        /// Minimum stride.
        min: usize,
    },
    /// Buffer ends before the last row.
    #[error("pixel buffer holds {len} bytes, expected at least {expected}")]
    BufferTooShort {
        /// Provided length.
        len: usize,
        /// Required length.
        expected: usize,
    },
    /// Only 8-bit frames are supported.
    #[error("unsupported bit depth {0}")]
    UnsupportedDepth(u8),
}

/// Converts interleaved RGB into a frame's planar representation.
pub trait PixelConverter {
    /// Fill `frame`'s planes from `rgb`.
    fn rgb_to_yuv(&self, rgb: &RgbView<'_>, frame: &mut YuvFrame) -> Result<(), ConversionError>;
}

/// Full-range BT.601 RGB to YCbCr conversion.
#[derive(Clone, Copy, Debug, Default)]
pub struct Bt601Converter;

const KR: f32 = 0.299;
const KB: f32 = 0.114;
const KG: f32 = 1.0 - KR - KB;

impl PixelConverter for Bt601Converter {
    fn rgb_to_yuv(&self, rgb: &RgbView<'_>, frame: &mut YuvFrame) -> Result<(), ConversionError> {
        check_rgb_input(rgb, frame)?;

        let width = rgb.width as usize;
        let height = rgb.height as usize;
        let mut y_plane = Vec::with_capacity(width * height);
        let mut u_plane = Vec::with_capacity(width * height);
        let mut v_plane = Vec::with_capacity(width * height);

        for row in 0..height {
            let start = row * rgb.row_bytes;
            let line = &rgb.pixels[start..start + width * 3];
            for px in line.chunks_exact(3) {
                let (y, u, v) = rgb_to_ycbcr(px[0], px[1], px[2]);
                y_plane.push(y);
                u_plane.push(u);
                v_plane.push(v);
            }
        }

        frame.set_planes([y_plane, u_plane, v_plane])?;
        frame.set_range(YuvRange::Full);
        Ok(())
    }
}

fn check_rgb_input(rgb: &RgbView<'_>, frame: &YuvFrame) -> Result<(), ConversionError> {
    if frame.depth() != 8 {
        return Err(ConversionError::UnsupportedDepth(frame.depth()));
    }
    if rgb.width == 0 || rgb.height == 0 {
        return Err(ConversionError::EmptyImage);
    }
    if rgb.width != frame.width() || rgb.height != frame.height() {
        return Err(ConversionError::SizeMismatch {
            frame_width: frame.width(),
            frame_height: frame.height(),
            image_width: rgb.width,
            image_height: rgb.height,
        });
    }
    let min = rgb.width as usize * 3;
    if rgb.row_bytes < min {
        return Err(ConversionError::StrideTooSmall {
            row_bytes: rgb.row_bytes,
            min,
        });
    }
    let expected = rgb.row_bytes * (rgb.height as usize - 1) + min;
    if rgb.pixels.len() < expected {
        return Err(ConversionError::BufferTooShort {
            len: rgb.pixels.len(),
            expected,
        });
    }
    Ok(())
}

pub(crate) fn rgb_to_ycbcr(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let (r, g, b) = (f32::from(r), f32::from(g), f32::from(b));
    let y = KR * r + KG * g + KB * b;
    let cb = (b - y) / (2.0 * (1.0 - KB)) + 128.0;
    let cr = (r - y) / (2.0 * (1.0 - KR)) + 128.0;
    (to_sample(y), to_sample(cb), to_sample(cr))
}

fn to_sample(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
#[path = "../../tests/unit/encode/yuv.rs"]
mod tests;
