//! Video plumbing over the `ffmpeg`/`ffprobe` executables.
//!
//! Frames travel as raw 8-bit grayscale over pipes: [`FrameReader`] decodes a
//! video to frames on ffmpeg's stdout, [`FrameWriter`] encodes frames written to
//! ffmpeg's stdin. Both own their child process and kill and reap it when dropped,
//! so every exit path releases the process.

use image::GrayImage;
use log::debug;
use serde::{Deserialize, Serialize};
use std::ffi::OsStr;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command as ProcCommand, Stdio};

use crate::error::{GlyphTileError, Result};

/// Locations of the ffmpeg tools; `None` means "look up on `PATH`".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FfmpegConfig {
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
}

impl FfmpegConfig {
    pub fn ffmpeg_cmd(&self) -> &OsStr {
        self.ffmpeg_path.as_deref().map(Path::as_os_str).unwrap_or(OsStr::new("ffmpeg"))
    }

    pub fn ffprobe_cmd(&self) -> &OsStr {
        self.ffprobe_path.as_deref().map(Path::as_os_str).unwrap_or(OsStr::new("ffprobe"))
    }
}

/// Parse `HH:MM:SS.mmm`, `MM:SS` or plain seconds into seconds.
pub fn parse_timestamp(s: &str) -> Result<f64> {
    let s = s.trim();
    let parts: Vec<&str> = s.split(':').collect();
    if s.is_empty() || parts.len() > 3 {
        return Err(GlyphTileError::invalid("timestamp", format!("cannot parse {:?}", s)));
    }
    parts.iter().rev().enumerate().try_fold(0.0, |acc, (i, v)| {
        let value: f64 = v
            .parse()
            .map_err(|_| GlyphTileError::invalid("timestamp", format!("cannot parse {:?}", s)))?;
        if !value.is_finite() || value < 0.0 {
            return Err(GlyphTileError::invalid("timestamp", format!("{:?} is negative or not finite", s)));
        }
        Ok(acc + value * 60f64.powi(i as i32))
    })
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    #[serde(default)]
    format: Option<ProbeFormat>,
}

/// Container-level entries; Matroska only reports its duration here.
#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    nb_frames: Option<String>,
    duration: Option<String>,
}

/// Dimensions and timing of a video's first video stream.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    /// Frame rate as ffprobe reported it (e.g. `30000/1001`), handed back to the encoder.
    pub frame_rate: String,
    pub total_frames: u64,
}

fn parse_rate(rate: &str) -> Option<f64> {
    let value = match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => rate.trim().parse().ok()?,
    };
    (value.is_finite() && value > 0.0).then_some(value)
}

impl VideoInfo {
    pub fn probe(path: &Path, ffmpeg: &FfmpegConfig) -> Result<Self> {
        let output = ProcCommand::new(ffmpeg.ffprobe_cmd())
            .args(["-v", "error", "-select_streams", "v:0", "-show_entries"])
            .arg("stream=width,height,avg_frame_rate,r_frame_rate,nb_frames,duration:format=duration")
            .args(["-of", "json"])
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| GlyphTileError::ffmpeg("ffprobe", format!("could not run: {}", e)))?;

        if !output.status.success() {
            return Err(GlyphTileError::SourceUnreadable {
                path: path.to_path_buf(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Self::from_probe_json(path, &String::from_utf8_lossy(&output.stdout))
    }

    /// Interpret `ffprobe -of json` output.
    pub fn from_probe_json(path: &Path, json: &str) -> Result<Self> {
        let unreadable = |reason: &str| GlyphTileError::SourceUnreadable {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        };

        let probe: ProbeOutput =
            serde_json::from_str(json).map_err(|e| unreadable(&format!("bad ffprobe output: {}", e)))?;
        let stream = probe.streams.into_iter().next().ok_or_else(|| unreadable("no video stream"))?;

        let (width, height) = match (stream.width, stream.height) {
            (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
            _ => return Err(unreadable("video stream has no frame size")),
        };

        let (frame_rate, fps) = [stream.avg_frame_rate, stream.r_frame_rate]
            .into_iter()
            .flatten()
            .find_map(|r| parse_rate(&r).map(|fps| (r, fps)))
            .ok_or_else(|| unreadable("video stream has no frame rate"))?;

        let total_frames = match stream.nb_frames.as_deref().and_then(|n| n.parse::<u64>().ok()) {
            Some(n) if n > 0 => n,
            _ => {
                let container_duration = probe.format.and_then(|f| f.duration);
                [stream.duration, container_duration]
                    .into_iter()
                    .flatten()
                    .filter_map(|d| d.parse::<f64>().ok())
                    .find(|d| d.is_finite() && *d > 0.0)
                    .map(|d| (d * fps).round() as u64)
                    .filter(|&n| n > 0)
                    .ok_or_else(|| unreadable("video has neither a frame count nor a duration"))?
            }
        };

        Ok(Self {
            width,
            height,
            fps,
            frame_rate,
            total_frames,
        })
    }

    pub fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Which source frames a conversion processes.
///
/// `start_frame = floor(start * fps)` and
/// `end_frame = min(floor(end * fps), total_frames - 1)`, both inclusive; the end
/// defaults to the end of the video. Inside the window every `step`-th frame is
/// kept, counting from `start_frame`, with `step = floor(speed_multiplier)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameWindow {
    pub start_frame: u64,
    pub end_frame: u64,
    pub step: u64,
}

impl FrameWindow {
    pub fn new(fps: f64, total_frames: u64, start: f64, end: Option<f64>, speed_multiplier: f64) -> Result<Self> {
        if !fps.is_finite() || fps <= 0.0 {
            return Err(GlyphTileError::invalid("fps", format!("must be positive, got {}", fps)));
        }
        if total_frames == 0 {
            return Err(GlyphTileError::invalid("total_frames", "video has no frames"));
        }
        check_time_window(start, end)?;
        check_speed_multiplier(speed_multiplier)?;

        let end = end.unwrap_or(total_frames as f64 / fps);
        let start_frame = (start * fps).floor() as u64;
        let end_frame = ((end * fps).floor() as u64).min(total_frames - 1);
        if start_frame > end_frame {
            return Err(GlyphTileError::invalid(
                "start",
                format!("frame {} is past the last frame {}", start_frame, end_frame),
            ));
        }

        Ok(Self {
            start_frame,
            end_frame,
            step: speed_multiplier.floor() as u64,
        })
    }

    pub fn selects(&self, frame: u64) -> bool {
        frame >= self.start_frame && frame <= self.end_frame && (frame - self.start_frame) % self.step == 0
    }

    pub fn indices(&self) -> impl Iterator<Item = u64> {
        (self.start_frame..=self.end_frame).step_by(self.step as usize)
    }

    /// Number of frames the window selects.
    pub fn len(&self) -> u64 {
        (self.end_frame - self.start_frame) / self.step + 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub(crate) fn check_time_window(start: f64, end: Option<f64>) -> Result<()> {
    if !start.is_finite() || start < 0.0 {
        return Err(GlyphTileError::invalid("start", format!("must be a non-negative number of seconds, got {}", start)));
    }
    if let Some(end) = end {
        if !end.is_finite() || end <= start {
            return Err(GlyphTileError::invalid("end", format!("must be after start ({}), got {}", start, end)));
        }
    }
    Ok(())
}

pub(crate) fn check_speed_multiplier(speed: f64) -> Result<()> {
    if !speed.is_finite() || speed < 1.0 {
        return Err(GlyphTileError::invalid(
            "speed_multiplier",
            format!("must be at least 1.0, slow motion is not supported (got {})", speed),
        ));
    }
    Ok(())
}

fn reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

/// Fill `buf` from `reader`; returns the number of bytes read, short only at EOF.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Decoded grayscale frames of a video, in presentation order.
pub struct FrameReader {
    child: Child,
    stdout: ChildStdout,
    width: u32,
    height: u32,
    buf: Vec<u8>,
}

impl FrameReader {
    /// Start decoding `input`. `max_frames` stops the decoder after that many frames.
    pub fn spawn(input: &Path, info: &VideoInfo, max_frames: Option<u64>, ffmpeg: &FfmpegConfig) -> Result<Self> {
        let mut cmd = ProcCommand::new(ffmpeg.ffmpeg_cmd());
        cmd.args(["-loglevel", "error", "-nostdin", "-i"]).arg(input);
        if let Some(n) = max_frames {
            cmd.arg("-frames:v").arg(n.to_string());
        }
        cmd.args(["-f", "rawvideo", "-pix_fmt", "gray", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped());
        debug!("spawning decoder {:?}", cmd);

        let mut child = cmd
            .spawn()
            .map_err(|e| GlyphTileError::ffmpeg("ffmpeg", format!("could not start decoder: {}", e)))?;
        let Some(stdout) = child.stdout.take() else {
            reap(&mut child);
            return Err(GlyphTileError::ffmpeg("ffmpeg", "decoder has no stdout"));
        };

        Ok(Self {
            child,
            stdout,
            width: info.width,
            height: info.height,
            buf: vec![0; info.frame_len()],
        })
    }

    /// Next frame, or `None` once the decoder has no more frames.
    pub fn next_frame(&mut self) -> Result<Option<GrayImage>> {
        let n = read_full(&mut self.stdout, &mut self.buf)?;
        if n == 0 {
            return Ok(None);
        }
        if n < self.buf.len() {
            return Err(GlyphTileError::ffmpeg(
                "ffmpeg",
                format!("truncated frame: {} of {} bytes", n, self.buf.len()),
            ));
        }
        Ok(GrayImage::from_raw(self.width, self.height, self.buf.clone()))
    }

    /// Wait for the decoder once [`FrameReader::next_frame`] has returned `None`.
    ///
    /// A decoder that died mid-stream also ends on a frame boundary; only its
    /// exit status tells the two apart.
    pub fn finish(mut self) -> Result<()> {
        let status = self.child.wait()?;
        if !status.success() {
            return Err(GlyphTileError::ffmpeg("ffmpeg", format!("decoder exited with {}", status)));
        }
        Ok(())
    }
}

impl Drop for FrameReader {
    fn drop(&mut self) {
        reap(&mut self.child);
    }
}

/// Encoder for grayscale frames of one fixed size.
pub struct FrameWriter {
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    width: u32,
    height: u32,
}

impl FrameWriter {
    /// Start encoding to `output` with MPEG-4 at quantizer `qscale` (2 = best, 31 = worst).
    pub fn spawn(output: &Path, info: &VideoInfo, qscale: u32, ffmpeg: &FfmpegConfig) -> Result<Self> {
        let mut cmd = ProcCommand::new(ffmpeg.ffmpeg_cmd());
        cmd.args(["-loglevel", "error", "-y", "-f", "rawvideo", "-pix_fmt", "gray", "-s"])
            .arg(format!("{}x{}", info.width, info.height))
            .arg("-r")
            .arg(&info.frame_rate)
            .args(["-i", "-", "-c:v", "mpeg4", "-q:v"])
            .arg(qscale.to_string())
            .args(["-pix_fmt", "yuv420p"])
            .arg(output)
            .stdin(Stdio::piped())
            .stdout(Stdio::null());
        debug!("spawning encoder {:?}", cmd);

        let mut child = cmd
            .spawn()
            .map_err(|e| GlyphTileError::ffmpeg("ffmpeg", format!("could not start encoder: {}", e)))?;
        let Some(stdin) = child.stdin.take() else {
            reap(&mut child);
            return Err(GlyphTileError::ffmpeg("ffmpeg", "encoder has no stdin"));
        };

        Ok(Self {
            child: Some(child),
            stdin: Some(stdin),
            width: info.width,
            height: info.height,
        })
    }

    pub fn write_frame(&mut self, frame: &GrayImage) -> Result<()> {
        if frame.dimensions() != (self.width, self.height) {
            return Err(GlyphTileError::invalid(
                "frame",
                format!("{:?} does not match the encoder size {}x{}", frame.dimensions(), self.width, self.height),
            ));
        }
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| GlyphTileError::ffmpeg("ffmpeg", "encoder already finished"))?;
        stdin
            .write_all(frame.as_raw())
            .map_err(|e| GlyphTileError::ffmpeg("ffmpeg", format!("encoder stopped accepting frames: {}", e)))
    }

    /// Close the input and wait for the encoder to write the file.
    pub fn finish(mut self) -> Result<()> {
        drop(self.stdin.take());
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        let status = child.wait()?;
        if !status.success() {
            return Err(GlyphTileError::ffmpeg("ffmpeg", format!("encoder exited with {}", status)));
        }
        Ok(())
    }
}

impl Drop for FrameWriter {
    fn drop(&mut self) {
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            reap(&mut child);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_from_two_to_five_seconds() {
        let w = FrameWindow::new(30.0, 300, 2.0, Some(5.0), 1.0).unwrap();
        assert_eq!(w.start_frame, 60);
        assert_eq!(w.end_frame, 150);
        assert_eq!(w.len(), 91);
        let idx: Vec<u64> = w.indices().collect();
        assert_eq!(idx.first(), Some(&60));
        assert_eq!(idx.last(), Some(&150));
        assert_eq!(idx.len() as u64, w.len());
        assert!(!w.selects(59));
        assert!(w.selects(60));
        assert!(w.selects(150));
        assert!(!w.selects(151));
    }

    #[test]
    fn window_defaults_to_end_of_video() {
        let w = FrameWindow::new(30.0, 300, 0.0, None, 1.0).unwrap();
        assert_eq!((w.start_frame, w.end_frame), (0, 299));
        let w = FrameWindow::new(30.0, 300, 0.0, Some(60.0), 1.0).unwrap();
        assert_eq!(w.end_frame, 299);
    }

    #[test]
    fn speed_multiplier_skips_frames_and_truncates() {
        let w = FrameWindow::new(30.0, 300, 1.0, Some(2.0), 3.0).unwrap();
        let idx: Vec<u64> = w.indices().take(4).collect();
        assert_eq!(idx, vec![30, 33, 36, 39]);
        assert!(w.selects(33));
        assert!(!w.selects(34));
        assert_eq!(w.len(), 11);

        let w = FrameWindow::new(30.0, 300, 0.0, None, 1.5).unwrap();
        assert_eq!(w.step, 1);
    }

    #[test]
    fn rejects_bad_parameters() {
        assert!(FrameWindow::new(30.0, 300, 0.0, None, 0.5).is_err());
        assert!(FrameWindow::new(30.0, 300, 5.0, Some(5.0), 1.0).is_err());
        assert!(FrameWindow::new(30.0, 300, 5.0, Some(2.0), 1.0).is_err());
        assert!(FrameWindow::new(30.0, 300, -1.0, None, 1.0).is_err());
        assert!(FrameWindow::new(0.0, 300, 0.0, None, 1.0).is_err());
        assert!(FrameWindow::new(30.0, 0, 0.0, None, 1.0).is_err());
        // starts after the last frame
        assert!(FrameWindow::new(30.0, 300, 20.0, None, 1.0).is_err());
    }

    #[test]
    fn timestamps() {
        assert_eq!(parse_timestamp("83.5").unwrap(), 83.5);
        assert_eq!(parse_timestamp("01:23.5").unwrap(), 83.5);
        assert_eq!(parse_timestamp("00:01:23.5").unwrap(), 83.5);
        assert_eq!(parse_timestamp("1:00:00").unwrap(), 3600.0);
        assert!(parse_timestamp("").is_err());
        assert!(parse_timestamp("abc").is_err());
        assert!(parse_timestamp("-3").is_err());
        assert!(parse_timestamp("1:2:3:4").is_err());
    }

    #[test]
    fn stream_json_with_frame_count() {
        let json = r#"{"streams":[{"width":1920,"height":1080,"avg_frame_rate":"30000/1001","r_frame_rate":"30000/1001","nb_frames":"300","duration":"10.01"}]}"#;
        let info = VideoInfo::from_probe_json(Path::new("in.mp4"), json).unwrap();
        assert_eq!((info.width, info.height), (1920, 1080));
        assert!((info.fps - 29.97).abs() < 0.01);
        assert_eq!(info.frame_rate, "30000/1001");
        assert_eq!(info.total_frames, 300);
    }

    #[test]
    fn falls_back_to_stream_duration_and_r_frame_rate() {
        let json = r#"{"streams":[{"width":640,"height":360,"avg_frame_rate":"0/0","r_frame_rate":"25/1","duration":"4.0"}]}"#;
        let info = VideoInfo::from_probe_json(Path::new("in.avi"), json).unwrap();
        assert_eq!(info.fps, 25.0);
        assert_eq!(info.frame_rate, "25/1");
        assert_eq!(info.total_frames, 100);
    }

    #[test]
    fn matroska_uses_container_duration() {
        // ffprobe reports no per-stream frame count or duration for mkv
        let json = r#"{
            "programs": [],
            "streams": [{"width":1280,"height":720,"r_frame_rate":"30/1","avg_frame_rate":"30/1"}],
            "format": {"duration":"10.010000"}
        }"#;
        let info = VideoInfo::from_probe_json(Path::new("clip.mkv"), json).unwrap();
        assert_eq!((info.width, info.height), (1280, 720));
        assert_eq!(info.total_frames, 300);
    }

    #[test]
    fn stream_info_without_any_length_is_unreadable() {
        let json = r#"{"streams":[{"width":1280,"height":720,"r_frame_rate":"30/1"}],"format":{}}"#;
        assert!(matches!(
            VideoInfo::from_probe_json(Path::new("clip.mkv"), json),
            Err(GlyphTileError::SourceUnreadable { .. })
        ));
    }

    #[test]
    fn stream_json_without_video_stream_is_unreadable() {
        let err = VideoInfo::from_probe_json(Path::new("a.mp4"), r#"{"streams":[]}"#).unwrap_err();
        assert!(matches!(err, GlyphTileError::SourceUnreadable { .. }));
    }

    #[test]
    fn reader_fills_across_short_reads() {
        struct Dribble(Vec<u8>);
        impl Read for Dribble {
            fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
                if self.0.is_empty() || buf.is_empty() {
                    return Ok(0);
                }
                buf[0] = self.0.remove(0);
                Ok(1)
            }
        }
        let mut src = Dribble(vec![1, 2, 3, 4, 5]);
        let mut buf = [0u8; 4];
        assert_eq!(read_full(&mut src, &mut buf).unwrap(), 4);
        assert_eq!(buf, [1, 2, 3, 4]);
        assert_eq!(read_full(&mut src, &mut buf).unwrap(), 1);
    }
}
