//! File-pair comparison and directory batches.
//!
//! A batch pairs every WAV file under a reference directory with the file
//! at the same relative path under the test directory. All pairs share one
//! alignment workspace; it is grown when a pair needs more room and kept
//! otherwise.

use std::fs;
use std::path::{Path, PathBuf};

use hound::{SampleFormat, WavSpec};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::{compare_streams, CompareError, CompareResult, Metrics, OutputMode, PairStats};
use crate::align::{AlignOutcome, Workspace};
use crate::stream::{PcmSink, PcmStream, WavSink, WavStream};

/// One reference/test pair and where to write its output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilePair {
    pub reference: PathBuf,
    pub test: PathBuf,
    pub output: Option<PathBuf>,
}

/// How a pair is compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompareOptions {
    /// Offset search bound in frames; `None` compares from the start without aligning.
    pub max_offset_frames: Option<usize>,
    pub output_mode: OutputMode,
}

impl Default for CompareOptions {
    fn default() -> Self {
        Self {
            max_offset_frames: Some(16 * 1024),
            output_mode: OutputMode::Difference,
        }
    }
}

/// Result of comparing one file pair.
#[derive(Debug, Clone, Serialize)]
pub struct PairReport {
    pub reference: PathBuf,
    pub test: PathBuf,
    pub sample_rate: u32,
    pub channels: usize,
    /// Alignment applied before comparing, if alignment was enabled.
    pub alignment: Option<AlignOutcome>,
    /// Frames compared.
    pub frames: u64,
    /// Frames left over in each file after the shorter one ended.
    pub unmatched_frames: [u64; 2],
    pub metrics: Metrics,
    pub channel_metrics: Vec<Metrics>,
    #[serde(skip)]
    pub stats: PairStats,
}

fn is_wav(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("wav"))
}

fn collect_wavs(root: &Path, dir: &Path, out: &mut Vec<PathBuf>) -> CompareResult<()> {
    let entries = fs::read_dir(dir).map_err(|source| CompareError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_wavs(root, &path, out)?;
        } else if is_wav(&path) {
            if let Ok(relative) = path.strip_prefix(root) {
                out.push(relative.to_path_buf());
            }
        }
    }
    Ok(())
}

/// Build the list of pairs to compare.
///
/// - two files: one pair
/// - a file and a directory: the file is paired with its namesake in the directory
/// - two directories: every WAV under `reference` (recursively) with the same
///   relative path under `test`, sorted by path
///
/// `output` follows the shape of `test`: a file for a single pair, a
/// directory mirrored per pair otherwise.
pub fn pair_inputs(
    reference: &Path,
    test: &Path,
    output: Option<&Path>,
) -> CompareResult<Vec<FilePair>> {
    if !reference.exists() {
        return Err(CompareError::NotFound(reference.to_path_buf()));
    }

    if reference.is_dir() {
        if !test.is_dir() {
            return Err(CompareError::NotFound(test.to_path_buf()));
        }
        let mut relative = Vec::new();
        collect_wavs(reference, reference, &mut relative)?;
        relative.sort();

        let pairs: Vec<FilePair> = relative
            .into_iter()
            .map(|rel| FilePair {
                reference: reference.join(&rel),
                test: test.join(&rel),
                output: output.map(|dir| dir.join(&rel)),
            })
            .collect();
        info!(
            count = pairs.len(),
            reference = %reference.display(),
            test = %test.display(),
            "Discovered file pairs"
        );
        return Ok(pairs);
    }

    let test = if test.is_dir() {
        match reference.file_name() {
            Some(name) => test.join(name),
            None => return Err(CompareError::NotFound(test.to_path_buf())),
        }
    } else {
        test.to_path_buf()
    };
    if test == reference {
        return Err(CompareError::SameFile(test));
    }

    let output = match output {
        Some(path) if path.is_dir() => reference.file_name().map(|name| path.join(name)),
        other => other.map(Path::to_path_buf),
    };
    Ok(vec![FilePair {
        reference: reference.to_path_buf(),
        test,
        output,
    }])
}

/// Format of the output file for a pair.
///
/// Matching sample types keep the wider sample; otherwise float wins.
fn output_spec(reference: WavSpec, test: WavSpec) -> WavSpec {
    let (sample_format, bits_per_sample) = if reference.sample_format == test.sample_format {
        (
            reference.sample_format,
            reference.bits_per_sample.max(test.bits_per_sample),
        )
    } else if reference.sample_format == SampleFormat::Float {
        (reference.sample_format, reference.bits_per_sample)
    } else {
        (test.sample_format, test.bits_per_sample)
    };
    WavSpec {
        channels: reference.channels,
        sample_rate: reference.sample_rate,
        bits_per_sample,
        sample_format,
    }
}

fn open_stream(path: &Path) -> CompareResult<WavStream> {
    WavStream::open(path).map_err(|source| CompareError::Open {
        path: path.to_path_buf(),
        source,
    })
}

fn create_sink(path: &Path, spec: WavSpec) -> CompareResult<WavSink> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| CompareError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    Ok(WavSink::create(path, spec)?)
}

/// Align (optionally) and compare one file pair.
///
/// The workspace is opened or grown for this pair's channel count and kept
/// open for the next pair.
pub fn compare_files(
    workspace: &mut Workspace,
    pair: &FilePair,
    options: &CompareOptions,
) -> CompareResult<PairReport> {
    if pair.output.as_ref().is_some_and(|out| *out == pair.reference || *out == pair.test) {
        return Err(CompareError::SameFile(pair.test.clone()));
    }

    let mut reference = open_stream(&pair.reference)?;
    let mut test = open_stream(&pair.test)?;

    if reference.is_empty() || test.is_empty() {
        return Err(CompareError::EmptyInput {
            reference: reference.len_frames(),
            test: test.len_frames(),
        });
    }
    let channels = reference.channels();
    if channels != test.channels() {
        return Err(CompareError::ChannelMismatch {
            reference: channels,
            test: test.channels(),
        });
    }
    if reference.sample_rate() != test.sample_rate() {
        warn!(
            reference = reference.sample_rate(),
            test = test.sample_rate(),
            "Sample rates differ; offset is measured in frames"
        );
    }

    let alignment = match options.max_offset_frames {
        Some(max_offset) => {
            workspace.open(max_offset, channels.max(workspace.max_channels()))?;
            Some(workspace.align_pair(&mut reference, &mut test)?)
        }
        None => None,
    };

    let mut sink = match &pair.output {
        Some(path) => Some(create_sink(path, output_spec(reference.spec(), test.spec()))?),
        None => None,
    };
    let stats = compare_streams(
        &mut reference,
        &mut test,
        sink.as_mut().map(|s| s as &mut dyn PcmSink),
        options.output_mode,
    )?;
    if let Some(sink) = sink {
        sink.finalize()?;
    }

    if stats.frames == 0 {
        return Err(CompareError::NothingCompared);
    }

    let unmatched_frames = [
        reference.len_frames() - reference.position(),
        test.len_frames() - test.position(),
    ];
    debug!(
        reference = %pair.reference.display(),
        frames = stats.frames,
        unmatched = ?unmatched_frames,
        "Compared file pair"
    );

    Ok(PairReport {
        reference: pair.reference.clone(),
        test: pair.test.clone(),
        sample_rate: reference.sample_rate(),
        channels,
        alignment,
        frames: stats.frames,
        unmatched_frames,
        metrics: stats.metrics(),
        channel_metrics: stats.channel_metrics(),
        stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::StreamSide;
    use crate::compare::SessionSummary;
    use hound::WavWriter;
    use tempfile::tempdir;

    const SPEC: WavSpec = WavSpec {
        channels: 2,
        sample_rate: 44100,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    fn noise(len: usize, seed: u64) -> Vec<i16> {
        let mut state = seed.wrapping_mul(0x9e37_79b9_7f4a_7c15) | 1;
        (0..len)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                (state >> 48) as i16
            })
            .collect()
    }

    fn write_wav(path: &Path, spec: WavSpec, lead_frames: usize, samples: &[i16]) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        let mut writer = WavWriter::create(path, spec).unwrap();
        for _ in 0..lead_frames * usize::from(spec.channels) {
            writer.write_sample(0i16).unwrap();
        }
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn pairs_single_files() {
        let dir = tempdir().unwrap();
        let reference = dir.path().join("a.wav");
        let test = dir.path().join("b.wav");
        write_wav(&reference, SPEC, 0, &[1, 2]);
        write_wav(&test, SPEC, 0, &[1, 2]);

        let pairs = pair_inputs(&reference, &test, Some(&dir.path().join("d.wav"))).unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].test, test);
        assert_eq!(pairs[0].output, Some(dir.path().join("d.wav")));
    }

    #[test]
    fn pairs_file_with_directory_namesake() {
        let dir = tempdir().unwrap();
        let reference = dir.path().join("ref").join("take.wav");
        let test_dir = dir.path().join("test");
        write_wav(&reference, SPEC, 0, &[1, 2]);
        write_wav(&test_dir.join("take.wav"), SPEC, 0, &[1, 2]);

        let pairs = pair_inputs(&reference, &test_dir, None).unwrap();
        assert_eq!(pairs[0].test, test_dir.join("take.wav"));
    }

    #[test]
    fn pairs_directory_trees() {
        let dir = tempdir().unwrap();
        let reference = dir.path().join("ref");
        let test = dir.path().join("test");
        for name in ["b.wav", "a.WAV", "nested/c.wav"] {
            write_wav(&reference.join(name), SPEC, 0, &[1, 2]);
        }
        fs::write(reference.join("notes.txt"), "skip").unwrap();

        let out = dir.path().join("diff");
        let pairs = pair_inputs(&reference, &test, Some(&out)).unwrap_err();
        assert!(matches!(pairs, CompareError::NotFound(_)));

        fs::create_dir_all(&test).unwrap();
        let pairs = pair_inputs(&reference, &test, Some(&out)).unwrap();
        let names: Vec<_> = pairs
            .iter()
            .map(|p| p.reference.strip_prefix(&reference).unwrap().to_path_buf())
            .collect();
        assert_eq!(
            names,
            vec![
                PathBuf::from("a.WAV"),
                PathBuf::from("b.wav"),
                PathBuf::from("nested/c.wav")
            ]
        );
        assert_eq!(pairs[2].test, test.join("nested/c.wav"));
        assert_eq!(pairs[2].output, Some(out.join("nested/c.wav")));
    }

    #[test]
    fn rejects_missing_and_same_inputs() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("a.wav");
        assert!(matches!(
            pair_inputs(&file, &file, None),
            Err(CompareError::NotFound(_))
        ));

        write_wav(&file, SPEC, 0, &[1, 2]);
        assert!(matches!(
            pair_inputs(&file, &file, None),
            Err(CompareError::SameFile(_))
        ));
    }

    #[test]
    fn output_spec_prefers_wider_and_float() {
        let float = WavSpec {
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
            ..SPEC
        };
        let wide = WavSpec {
            bits_per_sample: 24,
            ..SPEC
        };
        assert_eq!(output_spec(SPEC, wide).bits_per_sample, 24);
        assert_eq!(output_spec(SPEC, float).sample_format, SampleFormat::Float);
        assert_eq!(output_spec(float, SPEC).sample_format, SampleFormat::Float);
    }

    #[test]
    fn aligned_copy_compares_bit_exact() {
        let dir = tempdir().unwrap();
        let signal = noise(2 * 6000, 21);
        let pair = FilePair {
            reference: dir.path().join("ref.wav"),
            test: dir.path().join("test.wav"),
            output: Some(dir.path().join("out").join("diff.wav")),
        };
        write_wav(&pair.reference, SPEC, 0, &signal);
        write_wav(&pair.test, SPEC, 150, &signal);

        let mut workspace = Workspace::new();
        let report = compare_files(&mut workspace, &pair, &CompareOptions::default()).unwrap();

        let alignment = report.alignment.as_ref().unwrap();
        assert_eq!(alignment.advanced, Some(StreamSide::Test));
        assert_eq!(alignment.offset_frames, 150);
        assert_eq!(report.frames, 6000);
        assert_eq!(report.unmatched_frames, [0, 0]);
        assert!(report.metrics.bit_exact);

        let diff = WavStream::open(pair.output.as_ref().unwrap()).unwrap();
        assert_eq!(diff.len_frames(), 6000);
    }

    #[test]
    fn without_alignment_offset_shows_as_difference() {
        let dir = tempdir().unwrap();
        let signal = noise(2 * 4000, 22);
        let pair = FilePair {
            reference: dir.path().join("ref.wav"),
            test: dir.path().join("test.wav"),
            output: None,
        };
        write_wav(&pair.reference, SPEC, 0, &signal);
        write_wav(&pair.test, SPEC, 10, &signal);

        let options = CompareOptions {
            max_offset_frames: None,
            ..CompareOptions::default()
        };
        let mut workspace = Workspace::new();
        let report = compare_files(&mut workspace, &pair, &options).unwrap();

        assert!(report.alignment.is_none());
        assert!(!workspace.is_open());
        assert!(!report.metrics.bit_exact);
        assert_eq!(report.unmatched_frames, [0, 10]);
    }

    #[test]
    fn saves_aligned_test_file() {
        let dir = tempdir().unwrap();
        let signal = noise(2 * 5000, 23);
        let pair = FilePair {
            reference: dir.path().join("ref.wav"),
            test: dir.path().join("test.wav"),
            output: Some(dir.path().join("aligned.wav")),
        };
        write_wav(&pair.reference, SPEC, 80, &signal);
        write_wav(&pair.test, SPEC, 0, &signal);

        let options = CompareOptions {
            output_mode: OutputMode::AlignedTest,
            ..CompareOptions::default()
        };
        let mut workspace = Workspace::new();
        let report = compare_files(&mut workspace, &pair, &options).unwrap();
        assert_eq!(
            report.alignment.as_ref().and_then(|a| a.advanced),
            Some(StreamSide::Reference)
        );

        // The saved copy lines up with the reference sample for sample.
        let mut reference = WavStream::open(&pair.reference).unwrap();
        let mut aligned = WavStream::open(pair.output.as_ref().unwrap()).unwrap();
        assert_eq!(aligned.len_frames(), reference.len_frames());
        let mut a = vec![0.0; 2 * 5080];
        let mut b = vec![0.0; 2 * 5080];
        reference.read_frames(&mut a, 5080).unwrap();
        aligned.read_frames(&mut b, 5080).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn batch_reuses_one_workspace() {
        let dir = tempdir().unwrap();
        let reference_dir = dir.path().join("ref");
        let test_dir = dir.path().join("test");
        let mono = WavSpec {
            channels: 1,
            ..SPEC
        };

        let stereo = noise(2 * 5000, 24);
        write_wav(&reference_dir.join("a.wav"), SPEC, 0, &stereo);
        write_wav(&test_dir.join("a.wav"), SPEC, 33, &stereo);

        let single = noise(8000, 25);
        let quieter: Vec<i16> = single.iter().map(|s| s / 2).collect();
        write_wav(&reference_dir.join("b.wav"), mono, 0, &single);
        write_wav(&test_dir.join("b.wav"), mono, 12, &quieter);

        write_wav(&reference_dir.join("c.wav"), mono, 0, &single);

        let pairs = pair_inputs(&reference_dir, &test_dir, None).unwrap();
        assert_eq!(pairs.len(), 3);

        let mut workspace = Workspace::new();
        let options = CompareOptions {
            max_offset_frames: Some(256),
            ..CompareOptions::default()
        };
        let mut summary = SessionSummary::default();
        let mut sizes = Vec::new();
        for pair in &pairs {
            match compare_files(&mut workspace, pair, &options) {
                Ok(report) => {
                    summary.record(&pair.test.display().to_string(), &report.stats);
                    sizes.push(workspace.fft_size());
                }
                Err(err) => {
                    assert!(matches!(err, CompareError::Open { .. }));
                    summary.record_failure();
                }
            }
        }

        // 8 * 256 * 2 samples for the stereo pair, reused for the mono pair.
        assert_eq!(sizes, vec![4096, 4096]);
        assert_eq!(summary.pairs, 3);
        assert_eq!(summary.compared, 2);
        assert_eq!(summary.differing, 1);
        assert!(summary
            .worst_abs_name
            .as_deref()
            .is_some_and(|name| name.ends_with("b.wav")));
        assert!(!summary.all_bit_exact());
    }

    #[test]
    fn rejects_empty_and_mismatched_files() {
        let dir = tempdir().unwrap();
        let mono = WavSpec {
            channels: 1,
            ..SPEC
        };
        let reference = dir.path().join("ref.wav");
        let empty = dir.path().join("empty.wav");
        let narrow = dir.path().join("mono.wav");
        write_wav(&reference, SPEC, 0, &noise(200, 26));
        write_wav(&empty, SPEC, 0, &[]);
        write_wav(&narrow, mono, 0, &noise(100, 27));

        let mut workspace = Workspace::new();
        let options = CompareOptions::default();
        let pair = |test: &Path| FilePair {
            reference: reference.clone(),
            test: test.to_path_buf(),
            output: None,
        };

        assert!(matches!(
            compare_files(&mut workspace, &pair(&empty), &options),
            Err(CompareError::EmptyInput {
                reference: 100,
                test: 0
            })
        ));
        assert!(matches!(
            compare_files(&mut workspace, &pair(&narrow), &options),
            Err(CompareError::ChannelMismatch {
                reference: 2,
                test: 1
            })
        ));
    }
}
