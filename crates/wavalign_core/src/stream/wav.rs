//! WAV file stream and sink backed by `hound`.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, Write};
use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use tracing::debug;

use super::{PcmSink, PcmStream, StreamError, StreamResult};

fn check_format(spec: &WavSpec) -> StreamResult<()> {
    match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Float, 32) | (SampleFormat::Int, 8..=32) if spec.channels > 0 => Ok(()),
        (format, bits) => Err(StreamError::UnsupportedFormat(format!(
            "{:?} with {} bits per sample and {} channels",
            format, bits, spec.channels
        ))),
    }
}

/// Full-scale value of an integer sample width.
fn int_scale(bits_per_sample: u16) -> f64 {
    (1u64 << (bits_per_sample - 1)) as f64
}

/// WAV reader that yields normalized `f64` frames.
///
/// Integer PCM is scaled to `[-1, 1)`; float PCM is passed through.
pub struct WavStream<R = BufReader<File>> {
    reader: WavReader<R>,
    spec: WavSpec,
    position: u64,
    len_frames: u64,
}

impl WavStream<BufReader<File>> {
    /// Open a WAV file.
    pub fn open(path: impl AsRef<Path>) -> StreamResult<Self> {
        let path = path.as_ref();
        let reader = WavReader::open(path)?;
        debug!(path = %path.display(), "Opened WAV stream");
        Self::from_reader(reader)
    }
}

impl<R: Read + Seek> WavStream<R> {
    /// Wrap an already constructed reader.
    pub fn from_reader(reader: WavReader<R>) -> StreamResult<Self> {
        let spec = reader.spec();
        check_format(&spec)?;
        let len_frames = u64::from(reader.duration());
        Ok(Self {
            reader,
            spec,
            position: 0,
            len_frames,
        })
    }

    /// Format of the underlying file.
    pub fn spec(&self) -> WavSpec {
        self.spec
    }

    pub fn sample_rate(&self) -> u32 {
        self.spec.sample_rate
    }

    /// Total length in frames.
    pub fn len_frames(&self) -> u64 {
        self.len_frames
    }

    pub fn is_empty(&self) -> bool {
        self.len_frames == 0
    }

    fn read_samples(&mut self, dest: &mut [f64]) -> StreamResult<usize> {
        let mut count = 0;
        match self.spec.sample_format {
            SampleFormat::Float => {
                for (slot, sample) in dest.iter_mut().zip(self.reader.samples::<f32>()) {
                    *slot = f64::from(sample?);
                    count += 1;
                }
            }
            SampleFormat::Int => {
                let scale = 1.0 / int_scale(self.spec.bits_per_sample);
                for (slot, sample) in dest.iter_mut().zip(self.reader.samples::<i32>()) {
                    *slot = f64::from(sample?) * scale;
                    count += 1;
                }
            }
        }
        Ok(count)
    }
}

impl<R: Read + Seek> PcmStream for WavStream<R> {
    fn channels(&self) -> usize {
        usize::from(self.spec.channels)
    }

    fn bytes_per_frame(&self) -> usize {
        usize::from(self.spec.bits_per_sample).div_ceil(8) * self.channels()
    }

    fn read_frames(&mut self, dest: &mut [f64], frames: usize) -> StreamResult<usize> {
        let ch = self.channels();
        let remaining = self.len_frames.saturating_sub(self.position) as usize;
        let wanted = frames.min(remaining).min(dest.len() / ch);

        let samples = self.read_samples(&mut dest[..wanted * ch])?;
        let read = samples / ch;
        self.position += read as u64;
        Ok(read)
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn seek(&mut self, frame: u64) -> StreamResult<()> {
        if frame > self.len_frames {
            return Err(StreamError::SeekOutOfRange {
                frame,
                len: self.len_frames,
            });
        }
        // len_frames came from a u32 duration, so the cast is lossless.
        self.reader.seek(frame as u32)?;
        self.position = frame;
        Ok(())
    }
}

/// WAV writer taking normalized `f64` frames.
///
/// Integer output is rounded and clipped to the sample width.
pub struct WavSink<W: Write + Seek = BufWriter<File>> {
    writer: WavWriter<W>,
    spec: WavSpec,
}

impl WavSink<BufWriter<File>> {
    /// Create (or truncate) a WAV file.
    pub fn create(path: impl AsRef<Path>, spec: WavSpec) -> StreamResult<Self> {
        let path = path.as_ref();
        check_format(&spec)?;
        let writer = WavWriter::create(path, spec)?;
        debug!(path = %path.display(), "Created WAV sink");
        Ok(Self { writer, spec })
    }
}

impl<W: Write + Seek> WavSink<W> {
    /// Wrap an already constructed writer.
    pub fn from_writer(writer: WavWriter<W>) -> StreamResult<Self> {
        let spec = writer.spec();
        check_format(&spec)?;
        Ok(Self { writer, spec })
    }

    pub fn spec(&self) -> WavSpec {
        self.spec
    }

    /// Patch the header and flush.
    pub fn finalize(self) -> StreamResult<()> {
        self.writer.finalize()?;
        Ok(())
    }
}

impl<W: Write + Seek> PcmSink for WavSink<W> {
    fn channels(&self) -> usize {
        usize::from(self.spec.channels)
    }

    fn write_frames(&mut self, samples: &[f64]) -> StreamResult<()> {
        match self.spec.sample_format {
            SampleFormat::Float => {
                for &sample in samples {
                    self.writer.write_sample(sample as f32)?;
                }
            }
            SampleFormat::Int => {
                let scale = int_scale(self.spec.bits_per_sample);
                for &sample in samples {
                    let value = (sample * scale).round().clamp(-scale, scale - 1.0);
                    self.writer.write_sample(value as i32)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::WavWriter;
    use tempfile::tempdir;

    fn write_i16(path: &Path, channels: u16, samples: &[i16]) {
        let spec = WavSpec {
            channels,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(path, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn reads_normalized_int_frames() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        write_i16(&path, 2, &[0, 16384, -16384, 32767, 1, 2]);

        let mut stream = WavStream::open(&path).unwrap();
        assert_eq!(stream.channels(), 2);
        assert_eq!(stream.bytes_per_frame(), 4);
        assert_eq!(stream.len_frames(), 3);

        let mut buf = vec![0.0; 8];
        assert_eq!(stream.read_frames(&mut buf, 4).unwrap(), 3);
        assert_eq!(buf[0], 0.0);
        assert_eq!(buf[1], 0.5);
        assert_eq!(buf[2], -0.5);
        assert_eq!(stream.position(), 3);
    }

    #[test]
    fn seek_rewinds_and_skips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mono.wav");
        let samples: Vec<i16> = (0..100).map(|i| i * 100).collect();
        write_i16(&path, 1, &samples);

        let mut stream = WavStream::open(&path).unwrap();
        let mut buf = vec![0.0; 10];
        stream.read_frames(&mut buf, 10).unwrap();

        stream.seek(0).unwrap();
        stream.skip_frames(42).unwrap();
        assert_eq!(stream.position(), 42);
        stream.read_frames(&mut buf, 1).unwrap();
        assert_eq!(buf[0], 4200.0 / 32768.0);
    }

    #[test]
    fn rejects_seek_past_end() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("short.wav");
        write_i16(&path, 1, &[1, 2, 3]);

        let mut stream = WavStream::open(&path).unwrap();
        assert!(matches!(
            stream.seek(4),
            Err(StreamError::SeekOutOfRange { frame: 4, len: 3 })
        ));
    }

    #[test]
    fn sink_round_trips_int_samples() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.wav");
        let spec = WavSpec {
            channels: 2,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };

        let mut sink = WavSink::create(&path, spec).unwrap();
        sink.write_frames(&[0.5, -0.25, 2.0, -3.0]).unwrap();
        sink.write_silence(1).unwrap();
        sink.finalize().unwrap();

        let mut stream = WavStream::open(&path).unwrap();
        assert_eq!(stream.len_frames(), 3);
        let mut buf = vec![1.0; 6];
        stream.read_frames(&mut buf, 3).unwrap();
        // Out-of-range values are clipped to full scale.
        assert_eq!(buf, vec![0.5, -0.25, 32767.0 / 32768.0, -1.0, 0.0, 0.0]);
    }

    #[test]
    fn sink_rejects_unsupported_format() {
        let dir = tempdir().unwrap();
        let spec = WavSpec {
            channels: 1,
            sample_rate: 8000,
            bits_per_sample: 64,
            sample_format: SampleFormat::Float,
        };
        assert!(matches!(
            WavSink::create(dir.path().join("bad.wav"), spec),
            Err(StreamError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn reads_float_samples() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("float.wav");
        let spec = WavSpec {
            channels: 1,
            sample_rate: 8000,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let mut writer = WavWriter::create(&path, spec).unwrap();
        writer.write_sample(0.25f32).unwrap();
        writer.write_sample(-1.0f32).unwrap();
        writer.finalize().unwrap();

        let mut stream = WavStream::open(&path).unwrap();
        let mut buf = vec![0.0; 2];
        assert_eq!(stream.read_frames(&mut buf, 2).unwrap(), 2);
        assert_eq!(buf, vec![0.25, -1.0]);
    }
}
