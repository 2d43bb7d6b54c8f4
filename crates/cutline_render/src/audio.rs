use crate::decode::DecodedAudio;
use crate::error::Result;
use cutline_core::resolve::AudioVoice;
use cutline_core::types::TimeUs;
use hound::{SampleFormat, WavSpec, WavWriter};
use std::collections::HashMap;
use std::path::Path;
use uuid::Uuid;

/// Interleaved f32 PCM for the whole export range.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<f32>,
}

impl AudioBuffer {
    pub fn silent(sample_rate: u32, channels: u16, duration: TimeUs) -> Self {
        let frames = frames_for(duration, sample_rate);
        Self {
            sample_rate,
            channels,
            samples: vec![0.0; frames * channels as usize],
        }
    }

    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }

    pub fn duration(&self) -> TimeUs {
        if self.sample_rate == 0 {
            return TimeUs::ZERO;
        }
        TimeUs::from_seconds(self.frames() as f64 / self.sample_rate as f64)
    }

    pub fn write_wav(&self, path: &Path) -> Result<()> {
        let spec = WavSpec {
            channels: self.channels,
            sample_rate: self.sample_rate,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let mut writer = WavWriter::create(path, spec)?;
        for sample in &self.samples {
            writer.write_sample(*sample)?;
        }
        writer.finalize()?;
        Ok(())
    }
}

fn frames_for(duration: TimeUs, sample_rate: u32) -> usize {
    (duration.as_seconds().max(0.0) * sample_rate as f64).round() as usize
}

/// Mix voices into one buffer covering `[start, end)`.
///
/// `decoded` maps media ids to PCM already in the buffer's layout; voices
/// whose media is missing stay silent. Each voice is sampled at its own
/// source time so speed changes are honoured. The result is clamped to
/// `[-1, 1]`.
pub fn mix_voices(
    voices: &[AudioVoice],
    decoded: &HashMap<Uuid, DecodedAudio>,
    start: TimeUs,
    end: TimeUs,
    sample_rate: u32,
    channels: u16,
) -> AudioBuffer {
    let mut buffer = AudioBuffer::silent(sample_rate, channels, end - start);
    let total = buffer.frames();
    let rate = sample_rate as f64;

    for voice in voices {
        if voice.gain <= 0.0 {
            continue;
        }
        let Some(pcm) = decoded.get(&voice.media_id) else {
            continue;
        };
        let first = frames_for(voice.start - start, sample_rate).min(total);
        let last = frames_for(voice.end() - start, sample_rate).min(total);
        let gain = voice.gain as f32;

        for frame in first..last {
            let t = start + TimeUs::from_seconds(frame as f64 / rate);
            let source = voice.source_time_at(t).as_seconds();
            if source < 0.0 {
                continue;
            }
            let src_frame = (source * pcm.sample_rate as f64).floor() as usize;
            for ch in 0..channels {
                buffer.samples[frame * channels as usize + ch as usize] += gain * pcm.sample(src_frame, ch);
            }
        }
    }

    for sample in &mut buffer.samples {
        *sample = sample.clamp(-1.0, 1.0);
    }
    buffer
}
