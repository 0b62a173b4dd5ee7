//! WAV file I/O and waveform preparation.

use crate::Result;
use std::path::Path;

/// Read a WAV file, return (samples, sample_rate, num_channels).
///
/// Samples are interleaved f32 in [-1, 1].
pub fn read_wav(path: impl AsRef<Path>) -> Result<(Vec<f32>, u32, u16)> {
    let reader = hound::WavReader::open(path)?;
    let spec = reader.spec();
    let sample_rate = spec.sample_rate;
    let channels = spec.channels;

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<Vec<_>, _>>()?,
        hound::SampleFormat::Int => {
            let max_val = (1u32 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_val))
                .collect::<std::result::Result<Vec<_>, _>>()?
        }
    };

    Ok((samples, sample_rate, channels))
}

/// Write interleaved f32 samples as a WAV file.
pub fn write_wav(
    path: impl AsRef<Path>,
    samples: &[f32],
    sample_rate: u32,
    num_channels: u16,
) -> Result<()> {
    let spec = hound::WavSpec {
        channels: num_channels,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for &s in samples {
        writer.write_sample(s)?;
    }
    writer.finalize()?;
    Ok(())
}

/// Average interleaved channels down to mono.
pub fn downmix_mono(samples: &[f32], num_channels: u16) -> Vec<f32> {
    if num_channels <= 1 {
        return samples.to_vec();
    }
    let ch = num_channels as usize;
    samples
        .chunks(ch)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Truncate or zero-pad a mono waveform to exactly `target_len` samples.
pub fn chunk_or_pad(mut samples: Vec<f32>, target_len: usize) -> Vec<f32> {
    samples.truncate(target_len);
    samples.resize(target_len, 0.0);
    samples
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downmix_mono() {
        let stereo = vec![1.0, 0.0, 0.5, -0.5, -1.0, 1.0];
        let mono = downmix_mono(&stereo, 2);
        assert_eq!(mono, vec![0.5, 0.0, 0.0]);

        // Mono input is returned unchanged.
        let already = downmix_mono(&[0.1, 0.2], 1);
        assert_eq!(already, vec![0.1, 0.2]);
    }

    #[test]
    fn test_chunk_or_pad() {
        let long = chunk_or_pad(vec![1.0; 10], 4);
        assert_eq!(long, vec![1.0; 4]);

        let short = chunk_or_pad(vec![1.0; 2], 5);
        assert_eq!(short, vec![1.0, 1.0, 0.0, 0.0, 0.0]);

        let exact = chunk_or_pad(vec![0.5; 3], 3);
        assert_eq!(exact.len(), 3);
    }

    #[test]
    fn test_roundtrip_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.wav");
        let original = vec![0.0f32, 0.5, -0.5, 1.0, -1.0, 0.25];
        write_wav(&path, &original, 16_000, 1).unwrap();
        let (loaded, sr, ch) = read_wav(&path).unwrap();
        assert_eq!(sr, 16_000);
        assert_eq!(ch, 1);
        assert_eq!(loaded.len(), original.len());
        for (a, b) in loaded.iter().zip(original.iter()) {
            assert!((a - b).abs() < 1e-5);
        }
    }
}
