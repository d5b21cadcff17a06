//! cpal loopback backend
//!
//! Opens an input stream on the default *output* device, which WASAPI serves
//! as a loopback of the system mix. Hosts that cannot do that fall back to
//! the default input device (e.g. a PulseAudio/PipeWire monitor source).

use super::{CaptureBackend, ErrorNotifier, FrameSink};
use crate::audio::capture::{CaptureError, Started};
use crate::audio::AudioFrameBatch;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, Stream, StreamConfig};
use tracing::{debug, info, warn};

/// Scratch capacity for integer-format conversion (samples)
const CONVERT_CAPACITY: usize = 8192;

/// Loopback capture through cpal
pub struct CpalLoopbackBackend {
    /// Device requested by name, `None` for the system default
    device_name: Option<String>,
    /// Open stream; dropping it stops the callback
    stream: Option<Stream>,
}

impl CpalLoopbackBackend {
    /// Backend for a named device, or the default device when `None`
    pub fn new(device_name: Option<String>) -> Self {
        Self {
            device_name,
            stream: None,
        }
    }

    /// Names of devices that can be opened for capture
    pub fn list_devices() -> Result<Vec<String>, CaptureError> {
        let host = cpal::default_host();
        let mut names: Vec<String> = host
            .output_devices()
            .map_err(|e| CaptureError::Backend(e.to_string()))?
            .chain(
                host.input_devices()
                    .map_err(|e| CaptureError::Backend(e.to_string()))?,
            )
            .filter_map(|d| d.name().ok())
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }
}

impl CaptureBackend for CpalLoopbackBackend {
    fn name(&self) -> &str {
        "cpal"
    }

    fn open(&mut self, sink: FrameSink, on_error: ErrorNotifier) -> Result<Started, CaptureError> {
        if self.stream.is_some() {
            self.close();
        }

        let host = cpal::default_host();
        let device = pick_loopback_device(&host, self.device_name.as_deref())
            .ok_or(CaptureError::NoDevice)?;
        let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());

        let supported = device
            .default_output_config()
            .or_else(|_| device.default_input_config())
            .map_err(|e| match e {
                cpal::DefaultStreamConfigError::DeviceNotAvailable => CaptureError::NoDevice,
                cpal::DefaultStreamConfigError::StreamTypeNotSupported => {
                    CaptureError::UnsupportedFormat("device has no capture format".into())
                }
                cpal::DefaultStreamConfigError::BackendSpecific { err } => {
                    classify_backend_message(err.description)
                }
            })?;

        let sample_format = supported.sample_format();
        let config: StreamConfig = supported.config();
        let channels = config.channels;
        let sample_rate = config.sample_rate.0;

        let err_fn = move |err: cpal::StreamError| {
            warn!("Audio stream error: {}", err);
            let mapped = match err {
                cpal::StreamError::DeviceNotAvailable => CaptureError::DeviceLost,
                cpal::StreamError::BackendSpecific { err } => {
                    classify_backend_message(err.description)
                }
            };
            on_error(mapped);
        };

        let stream = build_input_stream(&device, &config, sample_format, sink, err_fn)?;
        stream.play().map_err(|e| match e {
            cpal::PlayStreamError::DeviceNotAvailable => CaptureError::NoDevice,
            cpal::PlayStreamError::BackendSpecific { err } => {
                classify_backend_message(err.description)
            }
        })?;

        info!(
            "Audio capture started on '{}' ({} ch @ {} Hz, {:?})",
            device_name, channels, sample_rate, sample_format
        );

        self.stream = Some(stream);
        Ok(Started {
            device: device_name,
            sample_rate,
            channels,
        })
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                debug!("Pausing audio stream failed: {}", e);
            }
            // Dropping the stream unregisters the callback
            drop(stream);
            info!("Audio capture stopped");
        }
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }
}

impl Drop for CpalLoopbackBackend {
    fn drop(&mut self) {
        self.close();
    }
}

fn pick_loopback_device(host: &cpal::Host, name: Option<&str>) -> Option<cpal::Device> {
    if let Some(wanted) = name {
        let by_name = host
            .output_devices()
            .ok()
            .into_iter()
            .flatten()
            .chain(host.input_devices().ok().into_iter().flatten())
            .find(|d| d.name().map(|n| n == wanted).unwrap_or(false));
        if by_name.is_some() {
            return by_name;
        }
        warn!("Audio device '{}' not found, using default", wanted);
    }

    host.default_output_device()
        .or_else(|| host.default_input_device())
}

fn build_input_stream<E>(
    device: &cpal::Device,
    config: &StreamConfig,
    sample_format: SampleFormat,
    mut sink: FrameSink,
    err_fn: E,
) -> Result<Stream, CaptureError>
where
    E: FnMut(cpal::StreamError) + Send + 'static,
{
    let channels = config.channels;
    let sample_rate = config.sample_rate.0;

    let stream = match sample_format {
        SampleFormat::F32 => device.build_input_stream(
            config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                sink(&AudioFrameBatch::new(data, channels, sample_rate));
            },
            err_fn,
            None,
        ),
        SampleFormat::I16 => {
            let mut scratch: Vec<f32> = Vec::with_capacity(CONVERT_CAPACITY);
            device.build_input_stream(
                config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    let scale = i16::MAX as f32;
                    scratch.clear();
                    scratch.extend(data.iter().map(|&s| s as f32 / scale));
                    sink(&AudioFrameBatch::new(&scratch, channels, sample_rate));
                },
                err_fn,
                None,
            )
        }
        SampleFormat::U16 => {
            let mut scratch: Vec<f32> = Vec::with_capacity(CONVERT_CAPACITY);
            device.build_input_stream(
                config,
                move |data: &[u16], _: &cpal::InputCallbackInfo| {
                    let scale = u16::MAX as f32;
                    scratch.clear();
                    scratch.extend(data.iter().map(|&s| (s as f32 / scale) * 2.0 - 1.0));
                    sink(&AudioFrameBatch::new(&scratch, channels, sample_rate));
                },
                err_fn,
                None,
            )
        }
        other => {
            return Err(CaptureError::UnsupportedFormat(format!("{other:?}")));
        }
    };

    stream.map_err(|e| match e {
        cpal::BuildStreamError::DeviceNotAvailable => CaptureError::NoDevice,
        cpal::BuildStreamError::StreamConfigNotSupported => {
            CaptureError::UnsupportedFormat(format!("{sample_format:?} @ {sample_rate} Hz"))
        }
        cpal::BuildStreamError::BackendSpecific { err } => classify_backend_message(err.description),
        other => CaptureError::Backend(other.to_string()),
    })
}

/// Map an opaque OS error message onto the capture error taxonomy
pub fn classify_backend_message(message: String) -> CaptureError {
    let lower = message.to_ascii_lowercase();
    if lower.contains("denied") || lower.contains("permission") || lower.contains("not permitted")
    {
        CaptureError::PermissionDenied
    } else if lower.contains("not found") || lower.contains("no such device") {
        CaptureError::NoDevice
    } else {
        CaptureError::Backend(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_permission_messages() {
        assert_eq!(
            classify_backend_message("Access is denied. (0x80070005)".into()),
            CaptureError::PermissionDenied
        );
        assert_eq!(
            classify_backend_message("Operation not permitted".into()),
            CaptureError::PermissionDenied
        );
    }

    #[test]
    fn test_classify_missing_device() {
        assert_eq!(
            classify_backend_message("ALSA: No such device".into()),
            CaptureError::NoDevice
        );
    }

    #[test]
    fn test_classify_other_messages_pass_through() {
        assert_eq!(
            classify_backend_message("buffer underrun".into()),
            CaptureError::Backend("buffer underrun".into())
        );
    }
}
