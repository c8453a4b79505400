//! Audio decoding and WAV export
//!
//! Speech arrives from the API as MP3. Output files are always 16-bit PCM,
//! 44.1 kHz, stereo.

use crate::error::{Result, VoicegenError};
use hound::{SampleFormat, WavSpec, WavWriter};
use std::io::Cursor;
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::debug;

pub const OUTPUT_SAMPLE_RATE: u32 = 44_100;
pub const OUTPUT_CHANNELS: usize = 2;

const RESAMPLE_CHUNK: usize = 1024;

/// Interleaved f32 samples in [-1, 1]
#[derive(Debug, Clone, PartialEq)]
pub struct AudioData {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: usize,
}

impl AudioData {
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: usize) -> Self {
        Self {
            samples,
            sample_rate,
            channels,
        }
    }

    /// Samples per channel
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels
    }

    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f32 / self.sample_rate as f32
    }

    /// Average all channels into one
    pub fn to_mono(&self) -> Self {
        if self.channels <= 1 {
            return self.clone();
        }
        let samples = self
            .samples
            .chunks(self.channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect();
        Self::new(samples, self.sample_rate, 1)
    }

    /// Convert to `channels` channels.
    ///
    /// Mono is copied to every output channel; anything else that does not
    /// already match is downmixed to mono first.
    pub fn to_channels(&self, channels: usize) -> Self {
        if self.channels == channels {
            return self.clone();
        }
        let mono = self.to_mono();
        let samples = mono
            .samples
            .iter()
            .flat_map(|&s| std::iter::repeat(s).take(channels))
            .collect();
        Self::new(samples, self.sample_rate, channels)
    }

    /// Split interleaved samples into one buffer per channel
    fn deinterleave(&self) -> Vec<Vec<f32>> {
        let mut planes = vec![Vec::with_capacity(self.frames()); self.channels];
        for frame in self.samples.chunks(self.channels) {
            for (plane, &sample) in planes.iter_mut().zip(frame) {
                plane.push(sample);
            }
        }
        planes
    }

    fn interleave(planes: Vec<Vec<f32>>, sample_rate: u32) -> Self {
        let channels = planes.len();
        let frames = planes.iter().map(Vec::len).min().unwrap_or(0);
        let mut samples = Vec::with_capacity(frames * channels);
        for i in 0..frames {
            for plane in &planes {
                samples.push(plane[i]);
            }
        }
        Self::new(samples, sample_rate, channels)
    }
}

/// Decode an in-memory MP3 (or WAV) file
pub fn decode(bytes: &[u8]) -> Result<AudioData> {
    let cursor = Cursor::new(bytes.to_vec());
    let mss = MediaSourceStream::new(Box::new(cursor), Default::default());

    let probed = symphonia::default::get_probe()
        .format(
            &Hint::new(),
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| VoicegenError::Audio(format!("Failed to probe audio format: {}", e)))?;

    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or_else(|| VoicegenError::Audio("No audio tracks found".into()))?;

    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| VoicegenError::Audio("Unknown sample rate".into()))?;
    let mut channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(0);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| VoicegenError::Audio(format!("Failed to create decoder: {}", e)))?;

    let track_id = track.id;
    let mut samples = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => return Err(VoicegenError::Audio(format!("Decode error: {}", e))),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::DecodeError(_)) => continue,
            Err(e) => return Err(VoicegenError::Audio(format!("Decode error: {}", e))),
        };

        let spec = *decoded.spec();
        // MP3 streams only report their layout once the first frame is decoded
        if channels == 0 {
            channels = spec.channels.count();
        }
        let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buffer.copy_interleaved_ref(decoded);
        samples.extend_from_slice(buffer.samples());
    }

    if samples.is_empty() || channels == 0 {
        return Err(VoicegenError::Audio("No audio samples decoded".into()));
    }

    debug!(
        "Decoded {} samples, {} Hz, {} channel(s)",
        samples.len(),
        sample_rate,
        channels
    );
    Ok(AudioData::new(samples, sample_rate, channels))
}

/// Resample every channel to `target_sample_rate`
pub fn resample(audio: &AudioData, target_sample_rate: u32) -> Result<AudioData> {
    use rubato::{
        Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
    };

    if audio.sample_rate == target_sample_rate || audio.frames() == 0 {
        return Ok(AudioData::new(
            audio.samples.clone(),
            target_sample_rate,
            audio.channels,
        ));
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let ratio = target_sample_rate as f64 / audio.sample_rate as f64;
    let frames = audio.frames();
    let expected = (frames as f64 * ratio).round() as usize;
    let planes = audio.deinterleave();

    let mut resampler =
        SincFixedIn::<f32>::new(ratio, 1.0, params, RESAMPLE_CHUNK, audio.channels)
            .map_err(|e| VoicegenError::Audio(format!("Resampler creation failed: {}", e)))?;
    let delay = resampler.output_delay();

    // Keep feeding (zeros once the input runs out) until the delayed tail is out
    let mut output = vec![Vec::with_capacity(delay + expected); audio.channels];
    let mut pos = 0;
    while output[0].len() < delay + expected {
        let chunk = if pos + RESAMPLE_CHUNK <= frames {
            let slices: Vec<&[f32]> = planes
                .iter()
                .map(|plane| &plane[pos..pos + RESAMPLE_CHUNK])
                .collect();
            resampler.process(&slices[..], None)
        } else if pos < frames {
            let slices: Vec<&[f32]> = planes.iter().map(|plane| &plane[pos..]).collect();
            resampler.process_partial(Some(&slices[..]), None)
        } else {
            resampler.process_partial(None::<&[&[f32]]>, None)
        };
        let chunk =
            chunk.map_err(|e| VoicegenError::Audio(format!("Resampling failed: {}", e)))?;
        pos += RESAMPLE_CHUNK;

        for (out, resampled) in output.iter_mut().zip(chunk) {
            out.extend(resampled);
        }
    }

    for plane in output.iter_mut() {
        plane.drain(..delay);
        plane.truncate(expected);
    }

    Ok(AudioData::interleave(output, target_sample_rate))
}

/// Write 16-bit PCM WAV
pub fn write_wav<P: AsRef<Path>>(path: P, audio: &AudioData) -> Result<()> {
    let channels = u16::try_from(audio.channels)
        .map_err(|_| VoicegenError::Audio(format!("Too many channels: {}", audio.channels)))?;

    let spec = WavSpec {
        channels,
        sample_rate: audio.sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path.as_ref(), spec)?;
    for &sample in &audio.samples {
        let sample = sample.clamp(-1.0, 1.0);
        writer.write_sample((sample * i16::MAX as f32) as i16)?;
    }
    writer.finalize()?;
    Ok(())
}

/// Convert API speech to the output format and write it to `output_path`
pub fn mp3_to_wav<P: AsRef<Path>>(bytes: &[u8], output_path: P) -> Result<AudioData> {
    let decoded = decode(bytes)?;
    let resampled = resample(&decoded, OUTPUT_SAMPLE_RATE)?;
    let stereo = resampled.to_channels(OUTPUT_CHANNELS);
    write_wav(output_path, &stereo)?;
    Ok(stereo)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(sample_rate: u32, secs: f32) -> Vec<f32> {
        let frames = (sample_rate as f32 * secs) as usize;
        (0..frames)
            .map(|i| (i as f32 * 440.0 * std::f32::consts::TAU / sample_rate as f32).sin() * 0.5)
            .collect()
    }

    fn wav_bytes(audio: &AudioData) -> Vec<u8> {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("in.wav");
        write_wav(&path, audio).unwrap();
        std::fs::read(path).unwrap()
    }

    #[test]
    fn mono_is_duplicated_to_stereo() {
        let mono = AudioData::new(vec![0.1, -0.2, 0.3], 44_100, 1);
        let stereo = mono.to_channels(2);
        assert_eq!(stereo.channels, 2);
        assert_eq!(stereo.samples, vec![0.1, 0.1, -0.2, -0.2, 0.3, 0.3]);
    }

    #[test]
    fn surround_is_downmixed_before_widening() {
        let quad = AudioData::new(vec![0.4, 0.0, 0.4, 0.0], 44_100, 4);
        let stereo = quad.to_channels(2);
        assert_eq!(stereo.samples, vec![0.2, 0.2]);
    }

    #[test]
    fn resample_scales_frame_count() {
        let audio = AudioData::new(sine(22_050, 0.5), 22_050, 1);
        let resampled = resample(&audio, 44_100).unwrap();
        assert_eq!(resampled.sample_rate, 44_100);
        assert_eq!(resampled.channels, 1);
        assert_eq!(resampled.frames(), audio.frames() * 2);

        let odd = AudioData::new(sine(24_000, 0.3), 24_000, 1);
        let resampled = resample(&odd, 44_100).unwrap();
        let expected = (odd.frames() as f64 * 44_100.0 / 24_000.0).round() as usize;
        assert_eq!(resampled.frames(), expected);
    }

    #[test]
    fn resample_keeps_the_tail() {
        let audio = AudioData::new(vec![0.5; 22_050], 22_050, 1);
        let resampled = resample(&audio, 44_100).unwrap();
        assert_eq!(resampled.frames(), 44_100);

        // Away from the zero-padded edges the level must be unchanged
        for &i in &[400, 22_050, 43_700] {
            let sample = resampled.samples[i];
            assert!((sample - 0.5).abs() < 0.01, "sample {} is {}", i, sample);
        }
    }

    #[test]
    fn short_clips_survive_resampling() {
        let audio = AudioData::new(vec![0.1; 10], 22_050, 1);
        let resampled = resample(&audio, 44_100).unwrap();
        assert_eq!(resampled.frames(), 20);
    }

    #[test]
    fn resample_keeps_channels_separate() {
        let left = sine(24_000, 0.25);
        let samples: Vec<f32> = left.iter().flat_map(|&s| [s, 0.0]).collect();
        let audio = AudioData::new(samples, 24_000, 2);

        let resampled = resample(&audio, 44_100).unwrap();
        assert_eq!(resampled.channels, 2);
        let right_peak = resampled
            .samples
            .iter()
            .skip(1)
            .step_by(2)
            .fold(0.0f32, |acc, s| acc.max(s.abs()));
        assert!(right_peak < 1e-3);
    }

    #[test]
    fn decode_reads_wav_from_memory() {
        let audio = AudioData::new(sine(16_000, 0.2), 16_000, 1);
        let decoded = decode(&wav_bytes(&audio)).unwrap();
        assert_eq!(decoded.sample_rate, 16_000);
        assert_eq!(decoded.channels, 1);
        assert_eq!(decoded.frames(), audio.frames());
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(decode(b"definitely not audio").is_err());
    }

    #[test]
    fn converted_file_is_16bit_44k_stereo() {
        let input = AudioData::new(sine(22_050, 0.3), 22_050, 1);
        let tmp = tempfile::tempdir().unwrap();
        let out = tmp.path().join("line.wav");

        mp3_to_wav(&wav_bytes(&input), &out).unwrap();

        let reader = hound::WavReader::open(&out).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 2);
        assert_eq!(spec.sample_rate, 44_100);
        assert_eq!(spec.bits_per_sample, 16);
        assert_eq!(spec.sample_format, SampleFormat::Int);
        assert!(reader.duration() > 0);
    }
}
