use crate::{AgentError, Result};
use hound::{SampleFormat, WavSpec, WavWriter};
use std::io::Cursor;
use tracing::debug;

/// Encode mono f32 samples as a 16-bit PCM WAV file held in memory.
///
/// Used to upload recorded utterances to the transcription endpoint.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::with_capacity(44 + samples.len() * 2));
    {
        let mut writer = WavWriter::new(&mut cursor, spec)
            .map_err(|e| AgentError::AudioProcessingError(format!("Failed to create WAV writer: {}", e)))?;

        for &sample in samples {
            let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16;
            writer
                .write_sample(value)
                .map_err(|e| AgentError::AudioProcessingError(format!("Failed to write sample: {}", e)))?;
        }

        writer
            .finalize()
            .map_err(|e| AgentError::AudioProcessingError(format!("Failed to finalize WAV: {}", e)))?;
    }

    let bytes = cursor.into_inner();
    debug!("Encoded {} samples at {} Hz into {} WAV bytes", samples.len(), sample_rate, bytes.len());
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::WavReader;
    use std::f32::consts::PI;

    #[test]
    fn test_encoded_wav_is_readable() {
        let sample_rate = 16000;
        let samples: Vec<f32> = (0..1600)
            .map(|i| (2.0 * PI * 440.0 * i as f32 / sample_rate as f32).sin() * 0.5)
            .collect();

        let bytes = encode_wav(&samples, sample_rate).unwrap();
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(bytes.len(), 44 + samples.len() * 2);

        let reader = WavReader::new(Cursor::new(bytes)).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.sample_rate, sample_rate);
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.bits_per_sample, 16);
        assert_eq!(reader.len() as usize, samples.len());
    }

    #[test]
    fn test_empty_input() {
        let bytes = encode_wav(&[], 16000).unwrap();
        assert_eq!(bytes.len(), 44);
    }
}
