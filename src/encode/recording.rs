use super::isobmff::{Reader, begin_box, end_box, read_boxes, write_u32};
use super::{
    AddImageFlags, ChromaFormat, Encoder, EncoderConfig, EncoderFactory, EncoderFailure,
    EncoderFailureKind, YuvFrame, YuvRange,
};

/// Major brand of the container produced by [`RecordingEncoder`].
pub const RECORDING_BRAND: [u8; 4] = *b"dwrw";

/// A frame as captured by [`RecordingEncoder`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedFrame {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Bits per sample.
    pub depth: u8,
    /// Chroma layout tag ([`ChromaFormat::tag`]).
    pub chroma: u8,
    /// Sample range tag ([`YuvRange::tag`]).
    pub range: u8,
    /// Y, U and V planes.
    pub planes: [Vec<u8>; 3],
    /// Attached metadata block (empty when none was attached).
    pub xmp: Vec<u8>,
}

/// In-memory encoder that stores raw planes instead of compressing them.
///
/// The container is a box stream: `ftyp` (brand [`RECORDING_BRAND`]), then per frame a `fram`
/// box (width, height, depth, chroma tag, range tag, 1 reserved byte, Y/U/V planes) followed
/// by an `xmp ` box with that frame's metadata block. Failures can be scripted for tests.
#[derive(Debug, Default)]
pub struct RecordingEncoder {
    config: EncoderConfig,
    frames: Vec<RecordedFrame>,
    flags: Vec<AddImageFlags>,
    fail_add_at: Vec<usize>,
    fail_finish: Option<String>,
    add_calls: usize,
}

impl RecordingEncoder {
    /// Create a recording encoder.
    pub fn new(config: EncoderConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Reject the `add_image` calls at these 0-based call positions.
    pub fn failing_add_at(mut self, calls: impl IntoIterator<Item = usize>) -> Self {
        self.fail_add_at.extend(calls);
        self
    }

    /// Make `finish` fail with `message`.
    pub fn failing_finish(mut self, message: impl Into<String>) -> Self {
        self.fail_finish = Some(message.into());
        self
    }

    /// Factory building plain recording encoders.
    pub fn factory() -> EncoderFactory {
        Box::new(|cfg: &EncoderConfig| Box::new(RecordingEncoder::new(*cfg)) as Box<dyn Encoder>)
    }

    /// Configuration the encoder was built with.
    pub fn config(&self) -> EncoderConfig {
        self.config
    }

    /// Frames accepted so far.
    pub fn frames(&self) -> &[RecordedFrame] {
        &self.frames
    }

    /// Flags passed with each accepted frame.
    pub fn flags(&self) -> &[AddImageFlags] {
        &self.flags
    }
}

impl Encoder for RecordingEncoder {
    fn add_image(&mut self, frame: &YuvFrame, flags: AddImageFlags) -> Result<(), EncoderFailure> {
        let call = self.add_calls;
        self.add_calls += 1;
        if self.fail_add_at.contains(&call) {
            return Err(EncoderFailure::new(
                EncoderFailureKind::EncodeFailed,
                format!("scripted failure for frame call {call}"),
            ));
        }
        if !frame.has_pixels() {
            return Err(EncoderFailure::new(
                EncoderFailureKind::InvalidArgument,
                "frame has no pixel data",
            ));
        }
        self.frames.push(RecordedFrame {
            width: frame.width(),
            height: frame.height(),
            depth: frame.depth(),
            chroma: frame.format().tag(),
            range: frame.range().tag(),
            planes: [
                frame.plane(0).to_vec(),
                frame.plane(1).to_vec(),
                frame.plane(2).to_vec(),
            ],
            xmp: frame.xmp().map(<[u8]>::to_vec).unwrap_or_default(),
        });
        self.flags.push(flags);
        Ok(())
    }

    fn finish(&mut self) -> Result<Vec<u8>, EncoderFailure> {
        if let Some(message) = &self.fail_finish {
            return Err(EncoderFailure::new(
                EncoderFailureKind::EncodeFailed,
                message.clone(),
            ));
        }
        if self.frames.is_empty() {
            return Err(EncoderFailure::no_content());
        }

        let mut out = Vec::new();
        let ftyp = begin_box(&mut out, b"ftyp");
        out.extend_from_slice(&RECORDING_BRAND);
        write_u32(&mut out, 0);
        out.extend_from_slice(&RECORDING_BRAND);
        end_box(&mut out, ftyp)?;

        for frame in &self.frames {
            let fram = begin_box(&mut out, b"fram");
            write_u32(&mut out, frame.width);
            write_u32(&mut out, frame.height);
            out.extend_from_slice(&[frame.depth, frame.chroma, frame.range, 0]);
            for plane in &frame.planes {
                out.extend_from_slice(plane);
            }
            end_box(&mut out, fram)?;

            let xmp = begin_box(&mut out, b"xmp ");
            out.extend_from_slice(&frame.xmp);
            end_box(&mut out, xmp)?;
        }
        Ok(out)
    }
}

/// Parse a container produced by [`RecordingEncoder`].
pub fn read_recording(bytes: &[u8]) -> Result<Vec<RecordedFrame>, EncoderFailure> {
    let invalid = |msg: &str| EncoderFailure::new(EncoderFailureKind::InvalidArgument, msg);
    let boxes = read_boxes(bytes, 0..bytes.len())?;
    let (ftyp, rest) = boxes
        .split_first()
        .ok_or_else(|| invalid("empty container"))?;
    if &ftyp.kind != b"ftyp" || bytes[ftyp.body()].get(..4) != Some(&RECORDING_BRAND[..]) {
        return Err(invalid("not a recording container"));
    }
    if rest.len() % 2 != 0 {
        return Err(invalid("unpaired frame box"));
    }

    let mut frames = Vec::with_capacity(rest.len() / 2);
    for pair in rest.chunks_exact(2) {
        let (fram, xmp) = (&pair[0], &pair[1]);
        if &fram.kind != b"fram" || &xmp.kind != b"xmp " {
            return Err(invalid("unexpected box in recording container"));
        }
        let mut r = Reader::new(bytes, fram.body());
        let width = r.u32()?;
        let height = r.u32()?;
        let depth = r.u8()?;
        let chroma = r.u8()?;
        let range = r.u8()?;
        r.bytes(1)?;
        let format = match chroma {
            t if t == ChromaFormat::Yuv444.tag() => ChromaFormat::Yuv444,
            _ => return Err(invalid("unknown chroma tag")),
        };
        if YuvRange::from_tag(range).is_none() {
            return Err(invalid("unknown range tag"));
        }
        let mut planes: [Vec<u8>; 3] = Default::default();
        for (i, plane) in planes.iter_mut().enumerate() {
            let (w, h) = format.plane_size(width, height, i);
            *plane = r.bytes(w as usize * h as usize)?.to_vec();
        }
        frames.push(RecordedFrame {
            width,
            height,
            depth,
            chroma,
            range,
            planes,
            xmp: bytes[xmp.body()].to_vec(),
        });
    }
    Ok(frames)
}

#[cfg(test)]
#[path = "../../tests/unit/encode/recording.rs"]
mod tests;
