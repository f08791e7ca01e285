//! WAV output for synthesized audio.
//!
//! Every destination goes through the same encoder ([`encode_wav`]); only the
//! underlying byte sink differs. Files are written to a `.partial` sibling and
//! renamed into place once the header has been finalized, so a path returned
//! from [`AudioSink::write`] always names a complete container.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Cursor, Seek, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{PiperError, Result};
use crate::AudioFormat;

/// Where a synthesized sequence should be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    /// Create or overwrite this file.
    File(PathBuf),
    /// Create a new, uniquely named file inside this directory.
    Directory(PathBuf),
    /// Stream the container to standard output.
    Stdout,
}

impl OutputTarget {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File(path.into())
    }

    pub fn directory(path: impl Into<PathBuf>) -> Self {
        Self::Directory(path.into())
    }

    /// Pick a target from command-line style options.
    ///
    /// An output directory takes precedence. Otherwise a missing file or `-`
    /// selects stdout.
    pub fn from_options(output_file: Option<&str>, output_dir: Option<&Path>) -> Self {
        match (output_dir, output_file) {
            (Some(dir), _) => Self::Directory(dir.to_path_buf()),
            (None, None) | (None, Some("-")) => Self::Stdout,
            (None, Some(file)) => Self::File(PathBuf::from(file)),
        }
    }
}

/// Commits audio block sequences to an [`OutputTarget`] as WAV.
#[derive(Debug, Default, Clone, Copy)]
pub struct AudioSink;

impl AudioSink {
    pub fn new() -> Self {
        Self
    }

    /// Write `blocks` to `target`.
    ///
    /// Returns the path of the written file, or `None` when the audio was
    /// streamed to stdout.
    pub fn write<I>(&self, format: AudioFormat, blocks: I, target: &OutputTarget) -> Result<Option<PathBuf>>
    where
        I: IntoIterator<Item = Result<Vec<i16>>>,
    {
        let written = match target {
            OutputTarget::File(path) => {
                self.write_file(format, blocks, path)?;
                Some(path.clone())
            }
            OutputTarget::Directory(dir) => Some(self.write_in_directory(format, blocks, dir)?),
            OutputTarget::Stdout => {
                let stdout = io::stdout();
                self.write_to_stream(format, blocks, stdout.lock())?;
                None
            }
        };

        if let Some(path) = &written {
            log::info!("Wrote {}", path.display());
        }
        Ok(written)
    }

    /// Write a WAV file at `path`, replacing any existing file.
    ///
    /// Returns the number of frames written.
    pub fn write_file<I>(&self, format: AudioFormat, blocks: I, path: &Path) -> Result<u32>
    where
        I: IntoIterator<Item = Result<Vec<i16>>>,
    {
        commit_file(format, blocks, path, None)
    }

    /// Write a WAV file with a freshly generated name inside `dir`.
    ///
    /// The directory and its parents are created if needed.
    pub fn write_in_directory<I>(&self, format: AudioFormat, blocks: I, dir: &Path) -> Result<PathBuf>
    where
        I: IntoIterator<Item = Result<Vec<i16>>>,
    {
        fs::create_dir_all(dir).map_err(|e| sink_error(dir, e))?;

        let path = reserve_unique_file(dir)?;
        commit_file(format, blocks, &path, Some(path.clone()))?;
        Ok(path)
    }

    /// Stream a WAV container into `stream`.
    ///
    /// The container is assembled in memory first because a pipe cannot be
    /// seeked back to patch the header. Returns the number of frames written.
    pub fn write_to_stream<I, W>(&self, format: AudioFormat, blocks: I, mut stream: W) -> Result<u32>
    where
        I: IntoIterator<Item = Result<Vec<i16>>>,
        W: Write,
    {
        let label = Path::new("-");
        let mut buffer = Cursor::new(Vec::new());
        let frames = encode_wav(&mut buffer, format, blocks, label)?;

        stream
            .write_all(buffer.get_ref())
            .and_then(|_| stream.flush())
            .map_err(|e| sink_error(label, e))?;
        Ok(frames)
    }
}

/// Encode `blocks` as a 16-bit PCM WAV container.
///
/// Errors yielded by `blocks` are returned unchanged; failures of the
/// underlying writer are reported as [`PiperError::SinkWrite`] for `label`.
fn encode_wav<W, I>(writer: W, format: AudioFormat, blocks: I, label: &Path) -> Result<u32>
where
    W: Write + Seek,
    I: IntoIterator<Item = Result<Vec<i16>>>,
{
    let wav_error = |e: hound::Error| PiperError::SinkWrite {
        path: label.to_path_buf(),
        source: Box::new(PiperError::Wav(e)),
    };

    let mut wav = hound::WavWriter::new(writer, format.wav_spec()).map_err(wav_error)?;
    let mut samples: u64 = 0;
    for block in blocks {
        let block = block?;
        for sample in &block {
            wav.write_sample(*sample).map_err(wav_error)?;
        }
        samples += block.len() as u64;
    }
    wav.finalize().map_err(wav_error)?;

    let frames = samples / u64::from(format.channels.max(1));
    log::debug!("Encoded {frames} frames at {} Hz", format.sample_rate);
    frame_count(frames, label)
}

/// Narrow a frame count to the 32-bit range a WAV header can describe.
fn frame_count(frames: u64, label: &Path) -> Result<u32> {
    u32::try_from(frames).map_err(|_| PiperError::SinkWrite {
        path: label.to_path_buf(),
        source: Box::new(PiperError::Wav(hound::Error::TooWide)),
    })
}

/// Removes the files it tracks unless the write was committed.
struct PendingFile {
    paths: Vec<PathBuf>,
    committed: bool,
}

impl PendingFile {
    fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for PendingFile {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        for path in &self.paths {
            if let Err(e) = fs::remove_file(path) {
                if e.kind() != io::ErrorKind::NotFound {
                    log::warn!("Could not remove incomplete output {}: {e}", path.display());
                }
            }
        }
    }
}

fn commit_file<I>(format: AudioFormat, blocks: I, path: &Path, reserved: Option<PathBuf>) -> Result<u32>
where
    I: IntoIterator<Item = Result<Vec<i16>>>,
{
    let partial = partial_path(path);
    let mut pending = PendingFile {
        paths: vec![partial.clone()],
        committed: false,
    };
    pending.paths.extend(reserved);

    let file = File::create(&partial).map_err(|e| sink_error(path, e))?;
    let mut writer = BufWriter::new(file);
    let frames = encode_wav(&mut writer, format, blocks, path)?;

    let file = writer
        .into_inner()
        .map_err(|e| sink_error(path, e.into_error()))?;
    file.sync_all().map_err(|e| sink_error(path, e))?;
    drop(file);

    fs::rename(&partial, path).map_err(|e| sink_error(path, e))?;
    pending.commit();
    Ok(frames)
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".partial");
    path.with_file_name(name)
}

/// Create an empty, previously non-existent `<token>.wav` inside `dir`.
fn reserve_unique_file(dir: &Path) -> Result<PathBuf> {
    loop {
        let path = dir.join(format!("{}.wav", next_timestamp_token()));
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => return Ok(path),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(sink_error(&path, e)),
        }
    }
}

static LAST_TOKEN: AtomicU64 = AtomicU64::new(0);

/// Nanosecond timestamp that strictly increases across calls in this process.
fn next_timestamp_token() -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default();

    let mut last = LAST_TOKEN.load(Ordering::Relaxed);
    loop {
        let next = now.max(last + 1);
        match LAST_TOKEN.compare_exchange_weak(last, next, Ordering::AcqRel, Ordering::Relaxed) {
            Ok(_) => return next,
            Err(actual) => last = actual,
        }
    }
}

fn sink_error(path: &Path, e: io::Error) -> PiperError {
    PiperError::SinkWrite {
        path: path.to_path_buf(),
        source: Box::new(PiperError::Io(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::sine_blocks;

    fn format() -> AudioFormat {
        AudioFormat::mono(22050)
    }

    #[test]
    fn frame_count_beyond_wav_range_is_an_error() {
        let label = Path::new("big.wav");
        assert_eq!(frame_count(u64::from(u32::MAX), label).unwrap(), u32::MAX);
        assert!(matches!(
            frame_count(u64::from(u32::MAX) + 1, label),
            Err(PiperError::SinkWrite { path, .. }) if path == label
        ));
    }

    #[test]
    fn file_header_matches_frames_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.wav");

        let frames = AudioSink::new()
            .write_file(format(), sine_blocks(3, 1000), &path)
            .unwrap();
        assert_eq!(frames, 3000);

        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().sample_rate, 22050);
        assert_eq!(reader.spec().bits_per_sample, 16);
        assert_eq!(reader.duration(), 3000);
        assert!(!partial_path(&path).exists());
    }

    #[test]
    fn stereo_frames_count_sample_pairs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        let stereo = AudioFormat {
            sample_rate: 16000,
            channels: 2,
        };

        let frames = AudioSink::new()
            .write_file(stereo, sine_blocks(2, 400), &path)
            .unwrap();
        assert_eq!(frames, 400);
        assert_eq!(hound::WavReader::open(&path).unwrap().duration(), 400);
    }

    #[test]
    fn directory_writes_never_collide() {
        let dir = tempfile::tempdir().unwrap();
        let target = OutputTarget::directory(dir.path().join("nested/out"));
        let sink = AudioSink::new();

        let first = sink.write(format(), sine_blocks(1, 500), &target).unwrap().unwrap();
        let second = sink.write(format(), sine_blocks(1, 500), &target).unwrap().unwrap();

        assert_ne!(first, second);
        for path in [&first, &second] {
            let reader = hound::WavReader::open(path).unwrap();
            assert_eq!(reader.duration(), 500);
        }
    }

    #[test]
    fn file_and_stream_bytes_are_identical() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("same.wav");
        let sink = AudioSink::new();

        sink.write_file(format(), sine_blocks(4, 321), &path).unwrap();
        let mut streamed = Vec::new();
        let frames = sink
            .write_to_stream(format(), sine_blocks(4, 321), &mut streamed)
            .unwrap();

        assert_eq!(frames, 4 * 321);
        assert_eq!(fs::read(&path).unwrap(), streamed);
    }

    #[test]
    fn failed_directory_write_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let blocks = sine_blocks(2, 100).into_iter().chain(std::iter::once(Err(
            PiperError::Synthesis("engine crashed".into()),
        )));

        let err = AudioSink::new()
            .write(format(), blocks, &OutputTarget::directory(dir.path()))
            .unwrap_err();

        assert!(matches!(err, PiperError::Synthesis(_)));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn failed_file_write_keeps_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keep.wav");
        fs::write(&path, b"previous").unwrap();

        let blocks = vec![Ok(vec![1i16, 2, 3]), Err(PiperError::Synthesis("boom".into()))];
        assert!(AudioSink::new().write_file(format(), blocks, &path).is_err());

        assert_eq!(fs::read(&path).unwrap(), b"previous");
        assert!(!partial_path(&path).exists());
    }

    #[test]
    fn unwritable_destination_is_a_sink_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not_a_dir");
        fs::write(&blocker, b"").unwrap();

        let err = AudioSink::new()
            .write(format(), sine_blocks(1, 10), &OutputTarget::directory(blocker.join("sub")))
            .unwrap_err();
        assert!(matches!(err, PiperError::SinkWrite { .. }));
    }

    #[test]
    fn empty_sequence_produces_valid_empty_wav() {
        let mut streamed = Vec::new();
        let frames = AudioSink::new()
            .write_to_stream(format(), Vec::new(), &mut streamed)
            .unwrap();
        assert_eq!(frames, 0);

        let reader = hound::WavReader::new(Cursor::new(streamed)).unwrap();
        assert_eq!(reader.duration(), 0);
    }

    #[test]
    fn timestamp_tokens_strictly_increase() {
        let tokens: Vec<u64> = (0..1000).map(|_| next_timestamp_token()).collect();
        assert!(tokens.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn output_options_select_target() {
        assert_eq!(OutputTarget::from_options(None, None), OutputTarget::Stdout);
        assert_eq!(OutputTarget::from_options(Some("-"), None), OutputTarget::Stdout);
        assert_eq!(
            OutputTarget::from_options(Some("a.wav"), None),
            OutputTarget::file("a.wav")
        );
        assert_eq!(
            OutputTarget::from_options(Some("a.wav"), Some(Path::new("out"))),
            OutputTarget::directory("out")
        );
    }
}
