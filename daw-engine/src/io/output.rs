use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use crate::audio::Renderer;
use crate::error::{EngineError, Result};

/// Largest callback we render without allocating, in samples
const CONVERSION_BUFFER_SAMPLES: usize = 16384;

/// Something that pulls rendered audio from a `Renderer`
///
/// The engine asks for the sample rate first, builds its context at that
/// rate and then hands the renderer over with `start`.
pub trait OutputDriver {
    /// Sample rate the renderer has to run at
    fn sample_rate(&mut self) -> Result<u32>;

    /// Take ownership of the renderer and start pulling audio
    fn start(&mut self, renderer: Renderer) -> Result<()>;

    /// Resume output after the host suspended it
    fn resume(&mut self) -> Result<()>;

    /// Stop pulling audio and drop the renderer
    fn stop(&mut self);
}

/// Output through the default cpal device
pub struct CpalOutput {
    device: Option<cpal::Device>,
    config: Option<cpal::SupportedStreamConfig>,
    stream: Option<cpal::Stream>,
}

impl Default for CpalOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl CpalOutput {
    pub fn new() -> Self {
        Self {
            device: None,
            config: None,
            stream: None,
        }
    }

    fn open(&mut self) -> Result<(&cpal::Device, &cpal::SupportedStreamConfig)> {
        if self.device.is_none() {
            let host = cpal::default_host();
            let device = host.default_output_device().ok_or(EngineError::NoOutputDevice)?;
            let config = device
                .default_output_config()
                .map_err(|e| EngineError::Output(e.to_string()))?;
            log::info!(
                "Using audio device {} ({:?}, {} channels, {} Hz)",
                device.name().unwrap_or_else(|_| "<unnamed>".to_string()),
                config.sample_format(),
                config.channels(),
                config.sample_rate().0
            );
            self.config = Some(config);
            self.device = Some(device);
        }
        match (&self.device, &self.config) {
            (Some(device), Some(config)) => Ok((device, config)),
            _ => Err(EngineError::NoOutputDevice),
        }
    }
}

impl OutputDriver for CpalOutput {
    fn sample_rate(&mut self) -> Result<u32> {
        let (_, config) = self.open()?;
        Ok(config.sample_rate().0)
    }

    fn start(&mut self, renderer: Renderer) -> Result<()> {
        let (device, supported) = self.open()?;
        let config: cpal::StreamConfig = supported.config();

        let stream = match supported.sample_format() {
            cpal::SampleFormat::F32 => build_stream::<f32>(device, &config, renderer)?,
            cpal::SampleFormat::I16 => build_stream::<i16>(device, &config, renderer)?,
            cpal::SampleFormat::U16 => build_stream::<u16>(device, &config, renderer)?,
            other => {
                return Err(EngineError::Output(format!("Unsupported sample format {:?}", other)));
            }
        };
        stream.play().map_err(|e| EngineError::Output(e.to_string()))?;
        self.stream = Some(stream);
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        match &self.stream {
            Some(stream) => stream.play().map_err(|e| EngineError::Output(e.to_string())),
            None => Err(EngineError::NotWarm),
        }
    }

    fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                log::debug!("Pausing stream before close failed: {}", e);
            }
        }
    }
}

/// Copy a stereo frame into a device frame of `channels` channels
#[inline]
fn map_frame(stereo: &[f32], device: &mut [f32]) {
    match device.len() {
        0 => {}
        1 => device[0] = (stereo[0] + stereo[1]) * 0.5,
        _ => {
            device[0] = stereo[0];
            device[1] = stereo[1];
            device[2..].fill(0.0);
        }
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut renderer: Renderer,
) -> Result<cpal::Stream>
where
    T: cpal::Sample + cpal::SizedSample + cpal::FromSample<f32>,
{
    let err_fn = |err| log::error!("Audio stream error: {}", err);
    let channels = config.channels.max(1) as usize;

    // Preallocated so the callback never allocates
    let mut stereo_buffer = vec![0.0f32; CONVERSION_BUFFER_SAMPLES];
    let mut device_buffer = vec![0.0f32; CONVERSION_BUFFER_SAMPLES * 4];

    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let frames = data.len() / channels;
                if frames * 2 > stereo_buffer.len() || data.len() > device_buffer.len() {
                    data.iter_mut().for_each(|s| *s = cpal::Sample::from_sample(0.0f32));
                    return;
                }

                let stereo = &mut stereo_buffer[..frames * 2];
                renderer.render(stereo);

                let out = &mut device_buffer[..data.len()];
                for (frame, device_frame) in stereo.chunks_exact(2).zip(out.chunks_exact_mut(channels)) {
                    map_frame(frame, device_frame);
                }

                // Convert f32 samples to output format
                for (sample, value) in data.iter_mut().zip(out.iter()) {
                    *sample = cpal::Sample::from_sample(*value);
                }
            },
            err_fn,
            None,
        )
        .map_err(|e| EngineError::Output(e.to_string()))?;

    Ok(stream)
}

/// Output with no device: audio is rendered only when a `HeadlessHandle`
/// asks for it
pub struct HeadlessOutput {
    sample_rate: u32,
    renderer: Arc<Mutex<Option<Renderer>>>,
}

/// Pulls audio out of a `HeadlessOutput` on demand
#[derive(Clone)]
pub struct HeadlessHandle {
    renderer: Arc<Mutex<Option<Renderer>>>,
}

impl HeadlessOutput {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
            renderer: Arc::new(Mutex::new(None)),
        }
    }

    pub fn handle(&self) -> HeadlessHandle {
        HeadlessHandle {
            renderer: self.renderer.clone(),
        }
    }
}

impl OutputDriver for HeadlessOutput {
    fn sample_rate(&mut self) -> Result<u32> {
        Ok(self.sample_rate)
    }

    fn start(&mut self, renderer: Renderer) -> Result<()> {
        let mut slot = self
            .renderer
            .lock()
            .map_err(|_| EngineError::Output("renderer lock poisoned".to_string()))?;
        *slot = Some(renderer);
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        Ok(())
    }

    fn stop(&mut self) {
        if let Ok(mut slot) = self.renderer.lock() {
            slot.take();
        }
    }
}

impl HeadlessHandle {
    /// Render `frames` frames of interleaved stereo; silence if nothing is running
    pub fn render(&self, frames: usize) -> Vec<f32> {
        let mut out = vec![0.0; frames * 2];
        if let Ok(mut slot) = self.renderer.lock() {
            if let Some(renderer) = slot.as_mut() {
                renderer.render(&mut out);
            }
        }
        out
    }

    /// Whether a renderer is attached
    pub fn is_running(&self) -> bool {
        self.renderer.lock().map(|slot| slot.is_some()).unwrap_or(false)
    }
}
