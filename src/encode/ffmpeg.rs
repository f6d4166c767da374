use std::ffi::OsString;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::thread::JoinHandle;

use super::isobmff::embed_xmp;
use super::{
    AddImageFlags, ChromaFormat, Encoder, EncoderConfig, EncoderFactory, EncoderFailure,
    EncoderFailureKind, YuvFrame, YuvRange,
};

/// Options for [`FfmpegAvifEncoder`].
#[derive(Clone, Debug)]
pub struct FfmpegAvifOpts {
    /// `ffmpeg` executable.
    pub program: PathBuf,
    /// AV1 encoder name passed to `-c:v`.
    pub codec: String,
}

impl Default for FfmpegAvifOpts {
    fn default() -> Self {
        Self {
            program: PathBuf::from("ffmpeg"),
            codec: "libaom-av1".to_owned(),
        }
    }
}

impl FfmpegAvifOpts {
    /// Return `true` when `program` runs and lists `codec` among its encoders.
    pub fn is_available(&self) -> bool {
        Command::new(&self.program)
            .args(["-hide_banner", "-encoders"])
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .map(|out| {
                out.status.success()
                    && String::from_utf8_lossy(&out.stdout)
                        .split_whitespace()
                        .any(|word| word == self.codec)
            })
            .unwrap_or(false)
    }
}

fn io_failure(msg: impl Into<String>) -> EncoderFailure {
    EncoderFailure::new(EncoderFailureKind::Io, msg)
}

/// One running `ffmpeg` process. Killed and reaped on drop.
struct Session {
    child: Child,
    stdin: Option<ChildStdin>,
    stderr_drain: Option<JoinHandle<std::io::Result<Vec<u8>>>>,
    output: tempfile::TempPath,
    width: u32,
    height: u32,
    range: YuvRange,
}

impl Drop for Session {
    fn drop(&mut self) {
        drop(self.stdin.take());
        if let Ok(None) = self.child.try_wait() {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

/// AVIF image-sequence encoder backed by the system `ffmpeg`.
///
/// Frames are streamed to `ffmpeg` as raw `yuv444p`; the sequence is written to a temporary
/// file, read back, and the XMP block of the first frame is embedded into its `meta` box.
pub struct FfmpegAvifEncoder {
    opts: FfmpegAvifOpts,
    config: EncoderConfig,
    session: Option<Session>,
    xmp: Option<Vec<u8>>,
    frames: usize,
}

impl FfmpegAvifEncoder {
    /// Create an encoder; `ffmpeg` is spawned on the first frame.
    pub fn new(opts: FfmpegAvifOpts, config: EncoderConfig) -> Self {
        Self {
            opts,
            config,
            session: None,
            xmp: None,
            frames: 0,
        }
    }

    /// Factory building one encoder per flush from `opts`.
    pub fn factory(opts: FfmpegAvifOpts) -> EncoderFactory {
        Box::new(move |cfg: &EncoderConfig| {
            Box::new(FfmpegAvifEncoder::new(opts.clone(), *cfg)) as Box<dyn Encoder>
        })
    }

    fn spawn(&self, frame: &YuvFrame) -> Result<Session, EncoderFailure> {
        let output = tempfile::Builder::new()
            .prefix("dynwall-")
            .suffix(".avif")
            .tempfile()
            .map_err(|e| io_failure(format!("failed to create temporary output: {e}")))?
            .into_temp_path();

        let args = ffmpeg_args(
            &self.opts,
            &self.config,
            frame.width(),
            frame.height(),
            frame.format(),
            frame.range(),
            &output,
        );
        tracing::debug!(
            program = %self.opts.program.display(),
            codec = %self.opts.codec,
            threads = self.config.max_threads,
            "spawning ffmpeg"
        );

        let mut child = Command::new(&self.opts.program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                io_failure(format!(
                    "failed to spawn {} (is it installed and on PATH?): {e}",
                    self.opts.program.display()
                ))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| io_failure("failed to open ffmpeg stdin (unexpected)"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| io_failure("failed to open ffmpeg stderr (unexpected)"))?;
        let stderr_drain = std::thread::spawn(move || {
            let mut stderr_bytes = Vec::new();
            stderr.read_to_end(&mut stderr_bytes)?;
            Ok(stderr_bytes)
        });

        Ok(Session {
            child,
            stdin: Some(stdin),
            stderr_drain: Some(stderr_drain),
            output,
            width: frame.width(),
            height: frame.height(),
            range: frame.range(),
        })
    }
}

impl Encoder for FfmpegAvifEncoder {
    fn add_image(&mut self, frame: &YuvFrame, _flags: AddImageFlags) -> Result<(), EncoderFailure> {
        if frame.depth() != 8 {
            return Err(EncoderFailure::new(
                EncoderFailureKind::InvalidArgument,
                format!("unsupported bit depth {}", frame.depth()),
            ));
        }
        if !frame.has_pixels() {
            return Err(EncoderFailure::new(
                EncoderFailureKind::InvalidArgument,
                "frame has no pixel data",
            ));
        }

        if self.session.is_none() {
            self.session = Some(self.spawn(frame)?);
        }
        let Some(session) = self.session.as_mut() else {
            return Err(io_failure("ffmpeg session is not running"));
        };
        if frame.width() != session.width || frame.height() != session.height {
            return Err(EncoderFailure::new(
                EncoderFailureKind::InvalidArgument,
                format!(
                    "frame size mismatch: got {}x{}, expected {}x{}",
                    frame.width(),
                    frame.height(),
                    session.width,
                    session.height
                ),
            ));
        }
        if frame.range() != session.range {
            return Err(EncoderFailure::new(
                EncoderFailureKind::InvalidArgument,
                format!(
                    "frame range mismatch: got {:?}, expected {:?}",
                    frame.range(),
                    session.range
                ),
            ));
        }
        let Some(stdin) = session.stdin.as_mut() else {
            return Err(io_failure("ffmpeg encoder is already finalized"));
        };
        for plane in 0..3 {
            stdin.write_all(frame.plane(plane)).map_err(|e| {
                io_failure(format!("failed to write frame to ffmpeg stdin: {e}"))
            })?;
        }

        if self.xmp.is_none() {
            self.xmp = frame.xmp().map(<[u8]>::to_vec);
        }
        self.frames += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<Vec<u8>, EncoderFailure> {
        let Some(mut session) = self.session.take() else {
            return Err(EncoderFailure::no_content());
        };
        if self.frames == 0 {
            return Err(EncoderFailure::no_content());
        }

        drop(session.stdin.take());
        let status = session
            .child
            .wait()
            .map_err(|e| io_failure(format!("failed to wait for ffmpeg to finish: {e}")))?;
        let stderr_bytes = match session.stderr_drain.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| io_failure("ffmpeg stderr drain thread panicked"))?
                .map_err(|e| io_failure(format!("ffmpeg stderr read failed: {e}")))?,
            None => Vec::new(),
        };

        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr_bytes);
            return Err(EncoderFailure::new(
                EncoderFailureKind::EncodeFailed,
                format!("ffmpeg exited with status {}: {}", status, stderr.trim()),
            ));
        }

        let bytes = std::fs::read(&session.output)
            .map_err(|e| io_failure(format!("failed to read ffmpeg output: {e}")))?;
        tracing::debug!(bytes = bytes.len(), frames = self.frames, "ffmpeg finished");
        match self.xmp.as_deref() {
            Some(xmp) => embed_xmp(&bytes, xmp),
            None => Ok(bytes),
        }
    }
}

/// Command line for encoding `width`x`height` raw frames into `out`.
pub(crate) fn ffmpeg_args(
    opts: &FfmpegAvifOpts,
    config: &EncoderConfig,
    width: u32,
    height: u32,
    format: ChromaFormat,
    range: YuvRange,
    out: &Path,
) -> Vec<OsString> {
    let pix_fmt = format.ffmpeg_pix_fmt();
    let mut args: Vec<OsString> = [
        "-y",
        "-loglevel",
        "error",
        "-f",
        "rawvideo",
        "-pix_fmt",
        pix_fmt,
        "-s",
        &format!("{width}x{height}"),
        "-framerate",
        "1",
        "-i",
        "pipe:0",
        "-an",
        "-c:v",
        &opts.codec,
        "-threads",
        &config.max_threads.max(1).to_string(),
        "-pix_fmt",
        pix_fmt,
        "-color_range",
        range.ffmpeg_color_range(),
        "-colorspace",
        "smpte170m",
        "-f",
        "avif",
    ]
    .iter()
    .map(OsString::from)
    .collect();
    args.push(out.as_os_str().to_owned());
    args
}

#[cfg(test)]
#[path = "../../tests/unit/encode/ffmpeg.rs"]
mod tests;
