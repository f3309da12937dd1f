use super::backend::{FrameSink, InputBackend};
use super::frame::FrameAssembler;
use super::resampler::{downmix_to_mono, AudioResampler};
use crate::{AgentError, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig};
use crossbeam_channel::{bounded, Sender};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

/// Name and native sample rate of the default input device
pub fn default_input_device() -> Result<(String, u32)> {
    let host = cpal::default_host();

    let device = host
        .default_input_device()
        .ok_or_else(|| AgentError::AudioDeviceError("No input device available".into()))?;

    let config = device
        .default_input_config()
        .map_err(|e| AgentError::AudioDeviceError(format!("Failed to get input config: {}", e)))?;

    let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
    Ok((name, config.sample_rate().0))
}

/// A running capture stream from the default input device.
///
/// cpal streams cannot move between threads on every platform, so the stream
/// is built and kept on its own thread. Samples are delivered as mono f32 at
/// the device rate.
pub struct CaptureStream {
    device_rate: u32,
    stop_tx: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl CaptureStream {
    /// Open the default input device and feed every captured block to `on_samples`
    pub fn open<F>(on_samples: F) -> Result<Self>
    where
        F: FnMut(&[f32]) + Send + 'static,
    {
        let (ready_tx, ready_rx) = bounded::<Result<u32>>(1);
        let (stop_tx, stop_rx) = bounded::<()>(1);

        let thread = thread::Builder::new()
            .name("audio-capture".into())
            .spawn(move || {
                let stream = match build_capture_stream(on_samples) {
                    Ok((stream, rate)) => {
                        let _ = ready_tx.send(Ok(rate));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                // Returns on an explicit stop or when the owner is dropped
                let _ = stop_rx.recv();
                drop(stream);
                debug!("Capture thread exiting");
            })?;

        match ready_rx.recv() {
            Ok(Ok(device_rate)) => Ok(Self {
                device_rate,
                stop_tx: Some(stop_tx),
                thread: Some(thread),
            }),
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => Err(AgentError::AudioDeviceError(
                "Capture thread exited during setup".into(),
            )),
        }
    }

    /// Sample rate the device delivers
    pub fn device_rate(&self) -> u32 {
        self.device_rate
    }

    /// Stop the stream and wait for the capture thread
    pub fn close(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Capture thread panicked");
            }
        }
    }
}

impl Drop for CaptureStream {
    fn drop(&mut self) {
        self.close();
    }
}

fn build_capture_stream<F>(on_samples: F) -> Result<(Stream, u32)>
where
    F: FnMut(&[f32]) + Send + 'static,
{
    let host = cpal::default_host();

    let device = host
        .default_input_device()
        .ok_or_else(|| AgentError::AudioDeviceError("No input device available".into()))?;

    info!("Using input device: {}", device.name().unwrap_or_else(|_| "Unknown".to_string()));

    let supported = device
        .default_input_config()
        .map_err(|e| AgentError::AudioDeviceError(format!("Failed to get input config: {}", e)))?;

    let sample_format = supported.sample_format();
    let config: StreamConfig = supported.into();
    let rate = config.sample_rate.0;

    let stream = match sample_format {
        SampleFormat::F32 => build_input::<f32, F>(&device, &config, on_samples)?,
        SampleFormat::I16 => build_input::<i16, F>(&device, &config, on_samples)?,
        SampleFormat::U16 => build_input::<u16, F>(&device, &config, on_samples)?,
        other => {
            return Err(AgentError::AudioDeviceError(format!(
                "Unsupported input sample format: {:?}",
                other
            )))
        }
    };

    stream
        .play()
        .map_err(|e| AgentError::AudioDeviceError(format!("Failed to start input stream: {}", e)))?;

    Ok((stream, rate))
}

fn build_input<T, F>(device: &Device, config: &StreamConfig, mut on_samples: F) -> Result<Stream>
where
    T: SizedSample,
    f32: FromSample<T>,
    F: FnMut(&[f32]) + Send + 'static,
{
    let channels = config.channels as usize;

    let err_fn = |err: cpal::StreamError| {
        error!("Audio input stream error: {}", err);
    };

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let samples: Vec<f32> = data.iter().map(|&s| s.to_sample::<f32>()).collect();
                on_samples(&downmix_to_mono(&samples, channels));
            },
            err_fn,
            None,
        )
        .map_err(|e| AgentError::AudioDeviceError(format!("Failed to build input stream: {}", e)))
}

/// Microphone backend for the live session.
///
/// Resamples device audio to the session rate and cuts it into frames of
/// `frame_size` samples.
pub struct MicrophoneInput {
    sample_rate: u32,
    frame_size: usize,
    device_rate: u32,
    stream: Option<CaptureStream>,
}

impl MicrophoneInput {
    /// Probe the default input device; fails when none is present
    pub fn new(sample_rate: u32, frame_size: usize) -> Result<Self> {
        let (name, device_rate) = default_input_device()?;
        debug!("Microphone candidate: {} at {} Hz", name, device_rate);

        Ok(Self {
            sample_rate,
            frame_size,
            device_rate,
            stream: None,
        })
    }
}

impl InputBackend for MicrophoneInput {
    fn name(&self) -> &'static str {
        "cpal-microphone"
    }

    fn start(&mut self, sink: FrameSink) -> Result<()> {
        if self.stream.is_some() {
            warn!("Microphone already capturing");
            return Ok(());
        }

        let mut resampler = if self.device_rate != self.sample_rate {
            Some(AudioResampler::new(self.device_rate, self.sample_rate)?)
        } else {
            None
        };
        let mut assembler = FrameAssembler::new(self.frame_size);

        let stream = CaptureStream::open(move |samples| {
            if !sink.is_running() {
                return;
            }

            let samples = match resampler.as_mut() {
                Some(resampler) => match resampler.push(samples) {
                    Ok(resampled) => resampled,
                    Err(e) => {
                        warn!("Dropping captured block: {}", e);
                        return;
                    }
                },
                None => samples.to_vec(),
            };

            for frame in assembler.push(&samples) {
                sink.push(frame);
            }
        })?;

        if stream.device_rate() != self.device_rate {
            warn!(
                "Input device rate changed from {} Hz to {} Hz after probing",
                self.device_rate,
                stream.device_rate()
            );
        }

        self.stream = Some(stream);
        info!("Microphone input started");
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.close();
            info!("Microphone input stopped");
        }
    }
}

impl Drop for MicrophoneInput {
    fn drop(&mut self) {
        self.stop();
    }
}
