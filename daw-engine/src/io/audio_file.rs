use std::io::Cursor;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::audio::AudioBuffer;
use crate::error::{EngineError, Result};

/// Decode an encoded file held in memory (WAV, FLAC, MP3, OGG...) into a
/// stereo buffer at the file's own sample rate
///
/// Doesn't need a running engine. Failures leave nothing behind.
pub fn decode_audio_data(bytes: &[u8]) -> Result<AudioBuffer> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes.to_vec())), Default::default());
    decode(mss, Hint::new())
}

/// Load an audio file from disk and decode it
pub fn decode_file<P: AsRef<Path>>(path: P) -> Result<AudioBuffer> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    // Create a probe hint using the file extension
    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    decode(mss, hint)
}

fn decode_error(context: &str, err: impl std::fmt::Display) -> EngineError {
    let err = EngineError::Decode(format!("{}: {}", context, err));
    log::warn!("{}", err);
    err
}

fn decode(mss: MediaSourceStream, hint: Hint) -> Result<AudioBuffer> {
    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| decode_error("Failed to probe data", e))?;

    let mut format = probed.format;

    // Find the default audio track
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != symphonia::core::codecs::CODEC_TYPE_NULL)
        .ok_or_else(|| decode_error("No audio tracks found", "unsupported container"))?;

    let track_id = track.id;
    let codec_params = track.codec_params.clone();
    let sample_rate = codec_params
        .sample_rate
        .ok_or_else(|| decode_error("Sample rate not specified", "missing codec parameter"))?;
    let mut channels = codec_params.channels.map(|c| c.count()).unwrap_or(0);

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| decode_error("Failed to create decoder", e))?;

    let mut audio_data = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(Error::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(Error::ResetRequired) => break,
            Err(e) => return Err(decode_error("Failed to read packet", e)),
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                // Initialize sample buffer on first packet
                if sample_buf.is_none() {
                    let spec = *decoded.spec();
                    channels = spec.channels.count();
                    sample_buf = Some(SampleBuffer::<f32>::new(decoded.capacity() as u64, spec));
                }

                if let Some(buf) = sample_buf.as_mut() {
                    buf.copy_interleaved_ref(decoded);
                    audio_data.extend_from_slice(buf.samples());
                }
            }
            Err(Error::DecodeError(e)) => {
                // A corrupt packet only costs us that packet
                log::debug!("Skipping undecodable packet: {}", e);
                continue;
            }
            Err(e) => return Err(decode_error("Decode failed", e)),
        }
    }

    if channels == 0 || audio_data.is_empty() {
        return Err(decode_error("No audio decoded", "stream is empty"));
    }

    let buffer = AudioBuffer::from_interleaved(&audio_data, channels, sample_rate);
    log::debug!(
        "Decoded {} frames, {} channels at {} Hz",
        buffer.frames(),
        channels,
        sample_rate
    );
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_garbage_is_a_decode_error() {
        let err = decode_audio_data(b"definitely not audio").unwrap_err();
        assert!(matches!(err, EngineError::Decode(_)));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = decode_file("/nonexistent/clip.wav").unwrap_err();
        assert!(matches!(err, EngineError::Io(_)));
    }
}
