use crate::{AgentError, Result};
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use tracing::debug;

/// Input frames consumed per resampler call
const CHUNK_SIZE: usize = 1024;

/// Streaming mono resampler.
///
/// Devices rarely run at the session rate, so capture and playback convert
/// on the fly. Input of any length can be pushed; output is produced one
/// fixed-size chunk at a time and the remainder is kept for the next push.
pub struct AudioResampler {
    resampler: SincFixedIn<f32>,
    input_rate: u32,
    output_rate: u32,
    pending: Vec<f32>,
}

impl AudioResampler {
    /// Create a new mono resampler from `input_rate` to `output_rate`
    pub fn new(input_rate: u32, output_rate: u32) -> Result<Self> {
        if input_rate == 0 || output_rate == 0 {
            return Err(AgentError::ConfigError(
                "Sample rates must be greater than 0".into(),
            ));
        }

        let resample_ratio = output_rate as f64 / input_rate as f64;

        let params = SincInterpolationParameters {
            sinc_len: 256,
            f_cutoff: 0.95,
            interpolation: SincInterpolationType::Linear,
            oversampling_factor: 256,
            window: WindowFunction::BlackmanHarris2,
        };

        let resampler = SincFixedIn::<f32>::new(resample_ratio, 2.0, params, CHUNK_SIZE, 1)
            .map_err(|e| {
                AgentError::AudioProcessingError(format!("Failed to create resampler: {}", e))
            })?;

        debug!("Created resampler: {} Hz -> {} Hz", input_rate, output_rate);

        Ok(Self {
            resampler,
            input_rate,
            output_rate,
            pending: Vec::with_capacity(CHUNK_SIZE * 2),
        })
    }

    /// Feed samples and return all output that is ready
    pub fn push(&mut self, input: &[f32]) -> Result<Vec<f32>> {
        self.pending.extend_from_slice(input);

        let mut output = Vec::new();
        while self.pending.len() >= CHUNK_SIZE {
            let chunk: Vec<f32> = self.pending.drain(..CHUNK_SIZE).collect();
            output.extend(self.process(chunk)?);
        }
        Ok(output)
    }

    /// Resample whatever is left, zero-padding the last chunk.
    ///
    /// Only the share of output that corresponds to real input is returned.
    pub fn flush(&mut self) -> Result<Vec<f32>> {
        if self.pending.is_empty() {
            return Ok(Vec::new());
        }

        let remaining = self.pending.len();
        let mut chunk = std::mem::take(&mut self.pending);
        chunk.resize(CHUNK_SIZE, 0.0);

        let mut output = self.process(chunk)?;
        let ratio = self.output_rate as f64 / self.input_rate as f64;
        let keep = ((remaining as f64) * ratio).ceil() as usize;
        output.truncate(keep);
        Ok(output)
    }

    fn process(&mut self, chunk: Vec<f32>) -> Result<Vec<f32>> {
        let input = [chunk];
        let mut output = self
            .resampler
            .process(&input, None)
            .map_err(|e| AgentError::AudioProcessingError(format!("Resampling failed: {}", e)))?;
        Ok(output.pop().unwrap_or_default())
    }

    /// Get the input sample rate
    pub fn input_rate(&self) -> u32 {
        self.input_rate
    }

    /// Get the output sample rate
    pub fn output_rate(&self) -> u32 {
        self.output_rate
    }

    /// Drop buffered input and reset the filter state
    pub fn reset(&mut self) {
        self.pending.clear();
        self.resampler.reset();
    }
}

/// Resample a complete buffer in one step
pub fn resample_audio(input: &[f32], input_rate: u32, output_rate: u32) -> Result<Vec<f32>> {
    if input_rate == output_rate {
        return Ok(input.to_vec());
    }

    let mut resampler = AudioResampler::new(input_rate, output_rate)?;
    let mut output = resampler.push(input)?;
    output.extend(resampler.flush()?);
    Ok(output)
}

/// Average interleaved channels down to mono
pub fn downmix_to_mono(data: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return data.to_vec();
    }
    data.chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}
