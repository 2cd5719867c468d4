//! Stream synchronizer: buffers two streams and seeks one onto the other.
//!
//! Buffering strips leading silence shared by both streams at the same rate,
//! so the relative offset between them is preserved. After the search both
//! streams are back at their starting positions and only the stream found
//! to be ahead is moved forward.

use tracing::{debug, info};

use super::kernel::TransformKernel;
use super::types::{AlignError, AlignOutcome, AlignResult, StreamSide};
use super::workspace::Workspace;
use crate::stream::PcmStream;

/// Frame counts gathered while filling the sample buffers.
#[derive(Debug, Clone, Copy, Default)]
struct Buffered {
    /// Frames held per side.
    loaded: [usize; 2],
    /// Whether each side holds a non-zero sample.
    audible: [bool; 2],
    /// Leading silence dropped from both sides.
    common_silence: u64,
}

impl<K: TransformKernel> Workspace<K> {
    /// Find the offset between `reference` and `test` and move the stream
    /// that is ahead so both start on the same material.
    ///
    /// Streams with no audible samples are left untouched. Read positions are
    /// restored before the winning stream is skipped forward.
    pub fn align_pair(
        &mut self,
        reference: &mut dyn PcmStream,
        test: &mut dyn PcmStream,
    ) -> AlignResult<AlignOutcome> {
        self.ensure_open()?;

        let ch = reference.channels();
        if ch != test.channels() {
            return Err(AlignError::ChannelMismatch {
                reference: ch,
                test: test.channels(),
            });
        }
        self.check_channels(ch)?;

        let mut streams: [&mut dyn PcmStream; 2] = [reference, test];
        let initial = [streams[0].position(), streams[1].position()];

        let buffered = self.fill_buffers(&mut streams, ch);
        // Every stream is rewound even if an earlier seek fails.
        let restored = streams
            .iter_mut()
            .zip(&initial)
            .map(|(stream, &pos)| stream.seek(pos))
            .fold(Ok(()), |first, seek| first.and(seek));
        let buffered = buffered?;
        restored?;

        if !buffered.audible[0] || !buffered.audible[1] {
            debug!(
                loaded = ?buffered.loaded,
                "No audible samples on one side; skipping alignment"
            );
            return Ok(AlignOutcome::unchanged(buffered.common_silence));
        }

        let max_offset = self.max_offset_frames.saturating_mul(ch);
        let Self {
            search, buffers, ..
        } = self;
        let [first, second] = &*buffers;
        let loaded = buffered.loaded;

        // Search each stream inside the other; the lower residual wins.
        let ahead_reference = search.best_match(&first[..loaded[0] * ch], second, max_offset, ch);
        let ahead_test = search.best_match(&second[..loaded[1] * ch], first, max_offset, ch);
        debug!(
            reference_offset = ahead_reference.offset_samples,
            reference_ssd = ahead_reference.min_ssd,
            test_offset = ahead_test.offset_samples,
            test_ssd = ahead_test.min_ssd,
            "Searched both directions"
        );

        let (side, best) = if ahead_test.min_ssd < ahead_reference.min_ssd {
            (StreamSide::Test, ahead_test)
        } else {
            (StreamSide::Reference, ahead_reference)
        };

        let offset_frames = best.offset_frames(ch);
        let mut outcome = AlignOutcome::unchanged(buffered.common_silence);
        outcome.min_ssd = best.min_ssd;
        outcome.reduced_window = best.reduced_window;

        if offset_frames == 0 || offset_frames >= loaded[side.index()] {
            debug!(offset_frames, "No usable offset found");
            return Ok(outcome);
        }

        let stream = &mut streams[side.index()];
        stream.skip_frames(offset_frames as u64)?;

        outcome.advanced = Some(side);
        outcome.offset_frames = offset_frames as u64;
        outcome.byte_offset = (offset_frames * stream.bytes_per_frame()) as u64;

        info!(
            stream = side.name(),
            offset_frames,
            byte_offset = outcome.byte_offset,
            ssd = best.min_ssd,
            "Aligned stream pair"
        );
        Ok(outcome)
    }

    /// Fill both sample buffers, dropping leading silence common to both.
    fn fill_buffers(
        &mut self,
        streams: &mut [&mut dyn PcmStream; 2],
        ch: usize,
    ) -> AlignResult<Buffered> {
        let frames_needed = self.fft_size / ch;
        let mut buffered = Buffered::default();
        let mut skip = 0usize;

        loop {
            let mut silent = [0usize; 2];
            for (side, stream) in streams.iter_mut().enumerate() {
                let buf = &mut self.buffers[side];
                let loaded = &mut buffered.loaded[side];

                *loaded -= skip;
                buf.copy_within(skip * ch..(skip + *loaded) * ch, 0);

                let start = *loaded * ch;
                let end = frames_needed * ch;
                *loaded += stream.read_frames(&mut buf[start..end], frames_needed - *loaded)?;

                // Clear everything past the last whole frame.
                buf[*loaded * ch..].fill(0.0);

                let samples = *loaded * ch;
                let first_sound = buf[..samples]
                    .iter()
                    .position(|&s| s != 0.0)
                    .unwrap_or(samples);
                silent[side] = first_sound / ch;
                buffered.audible[side] = first_sound < samples;
            }

            skip = silent[0].min(silent[1]);
            if skip == 0 {
                break;
            }
            buffered.common_silence += skip as u64;
        }

        if buffered.common_silence > 0 {
            debug!(
                frames = buffered.common_silence,
                "Skipped common leading silence"
            );
        }
        Ok(buffered)
    }
}
