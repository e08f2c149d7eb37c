//! Client utilities.
//!
//! `transcribe` streams a WAV file to a running server in 100ms chunks and
//! prints transcripts as they arrive; `probe` performs the Describe→Info
//! health check. Both double as end-to-end exercises of the wire protocol.

use crate::audio::AudioFormat;
use crate::defaults::SAMPLE_RATE;
use crate::error::{Result, SottoError};
use crate::protocol::codec::{Decoded, EventDecoder, encode};
use crate::protocol::event::TranscribeData;
use crate::protocol::Event;
use crate::server::{BindUri, Connection};
use std::io::Write as _;
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UnixStream};
use tracing::debug;

/// 100ms of wire-format audio per chunk.
const CHUNK_BYTES: usize = 3200;

/// Connect to a server URI of either kind.
async fn connect(uri: &str) -> Result<Box<dyn Connection>> {
    match uri.parse::<BindUri>()? {
        BindUri::Tcp(addr) => Ok(Box::new(TcpStream::connect(&addr).await?)),
        BindUri::Unix(path) => Ok(Box::new(UnixStream::connect(&path).await?)),
    }
}

/// Pop the next event, reading more bytes as needed. `None` on clean EOF.
async fn next_event<R>(reader: &mut R, decoder: &mut EventDecoder) -> Result<Option<Event>>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; 8192];
    loop {
        match decoder.next()? {
            Some(Decoded::Event(event)) => return Ok(Some(event)),
            Some(Decoded::Invalid { kind, .. }) => {
                debug!(%kind, "ignoring unknown event from server");
                continue;
            }
            None => {}
        }

        let n = reader.read(&mut buf).await?;
        if n == 0 {
            decoder.finish()?;
            return Ok(None);
        }
        decoder.extend(&buf[..n]);
    }
}

/// Stream a WAV file to the server and print the transcript.
pub async fn run_transcribe(
    uri: &str,
    wav: &Path,
    language: Option<String>,
    quiet: bool,
) -> Result<()> {
    let samples = load_wav_samples(wav)?;
    let pcm: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();

    let stream = connect(uri).await?;
    let (mut reader, mut writer) = tokio::io::split(stream);

    // Send the whole request from a separate task so slow decodes cannot
    // deadlock us against a full socket buffer.
    let send_task = tokio::spawn(async move {
        writer
            .write_all(&encode(&Event::Transcribe(TranscribeData {
                name: None,
                language,
            })))
            .await?;
        writer
            .write_all(&encode(&Event::AudioStart(AudioFormat::wire_default())))
            .await?;
        for chunk in pcm.chunks(CHUNK_BYTES) {
            writer
                .write_all(&encode(&Event::AudioChunk(chunk.to_vec())))
                .await?;
        }
        writer.write_all(&encode(&Event::AudioStop)).await?;
        writer.flush().await?;
        Ok::<_, std::io::Error>(writer)
    });

    let mut decoder = EventDecoder::new();
    let mut final_text = None;
    while let Some(event) = next_event(&mut reader, &mut decoder).await? {
        match event {
            Event::Transcript(t) if t.is_final => {
                final_text = Some(t.text);
                break;
            }
            Event::Transcript(t) => {
                if !quiet {
                    print!("\r{}", t.text);
                    std::io::stdout().flush().ok();
                }
            }
            Event::Error(e) => {
                return Err(SottoError::Other(format!("server error [{}]: {}", e.code, e.message)));
            }
            other => {
                debug!(kind = other.kind(), "unexpected event");
            }
        }
    }

    send_task.await.map_err(|e| SottoError::Other(e.to_string()))??;

    match final_text {
        Some(text) => {
            if !quiet {
                // Clear the partial line before the final print.
                print!("\r");
            }
            println!("{text}");
            Ok(())
        }
        None => Err(SottoError::Other(
            "connection closed before a final transcript".to_string(),
        )),
    }
}

/// Send a Describe and wait for the Info reply within `deadline`.
pub async fn run_probe(uri: &str, deadline: Duration) -> Result<()> {
    let probe = async {
        let mut stream = connect(uri).await?;
        stream.write_all(&encode(&Event::Describe)).await?;
        stream.flush().await?;

        let mut decoder = EventDecoder::new();
        while let Some(event) = next_event(&mut stream, &mut decoder).await? {
            if let Event::Info(info) = event {
                return Ok(info);
            }
        }
        Err(SottoError::Other(
            "connection closed without an info reply".to_string(),
        ))
    };

    let info = tokio::time::timeout(deadline, probe)
        .await
        .map_err(|_| SottoError::Other(format!("no info reply within {deadline:?}")))??;

    for program in &info.asr {
        for model in &program.models {
            println!(
                "{} {} (model {}, {} languages)",
                program.name,
                program.version,
                model.name,
                model.languages.len()
            );
        }
    }
    Ok(())
}

/// Read a WAV file into 16kHz mono i16 samples.
///
/// Stereo is mixed down; other rates are resampled with linear
/// interpolation, which is plenty for speech.
pub fn load_wav_samples(path: &Path) -> Result<Vec<i16>> {
    let mut reader = hound::WavReader::open(path).map_err(|e| SottoError::Other(format!(
        "failed to parse WAV file {}: {e}",
        path.display()
    )))?;

    let spec = reader.spec();
    let raw: Vec<i16> = reader
        .samples::<i16>()
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| SottoError::Other(format!("failed to read WAV samples: {e}")))?;

    let mono = mix_to_mono(&raw, spec.channels);
    Ok(resample(&mono, spec.sample_rate, SAMPLE_RATE))
}

/// Average interleaved channels down to one.
fn mix_to_mono(samples: &[i16], channels: u16) -> Vec<i16> {
    if channels <= 1 {
        return samples.to_vec();
    }
    samples
        .chunks_exact(channels as usize)
        .map(|frame| {
            let sum: i32 = frame.iter().map(|&s| s as i32).sum();
            (sum / channels as i32) as i16
        })
        .collect()
}

/// Linear-interpolation resampler.
fn resample(samples: &[i16], from_rate: u32, to_rate: u32) -> Vec<i16> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let out_len = (samples.len() as u64 * to_rate as u64 / from_rate as u64) as usize;
    let mut out = Vec::with_capacity(out_len);
    for i in 0..out_len {
        let pos = i as f64 * from_rate as f64 / to_rate as f64;
        let idx = pos as usize;
        let frac = pos - idx as f64;
        let a = samples[idx.min(samples.len() - 1)] as f64;
        let b = samples[(idx + 1).min(samples.len() - 1)] as f64;
        out.push((a + (b - a) * frac) as i16);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_wav(path: &Path, spec: hound::WavSpec, samples: &[i16]) {
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_load_wav_mono_16k_passthrough() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mono.wav");
        let samples: Vec<i16> = (0..1600).map(|i| (i % 100) as i16).collect();
        write_wav(
            &path,
            hound::WavSpec {
                channels: 1,
                sample_rate: 16000,
                bits_per_sample: 16,
                sample_format: hound::SampleFormat::Int,
            },
            &samples,
        );

        let loaded = load_wav_samples(&path).unwrap();
        assert_eq!(loaded, samples);
    }

    #[test]
    fn test_load_wav_mixes_stereo() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        // L=100, R=300 → mono 200
        let samples: Vec<i16> = [100i16, 300].repeat(160);
        write_wav(
            &path,
            hound::WavSpec {
                channels: 2,
                sample_rate: 16000,
                bits_per_sample: 16,
                sample_format: hound::SampleFormat::Int,
            },
            &samples,
        );

        let loaded = load_wav_samples(&path).unwrap();
        assert_eq!(loaded.len(), 160);
        assert!(loaded.iter().all(|&s| s == 200));
    }

    #[test]
    fn test_resample_halves_rate() {
        let samples: Vec<i16> = (0..3200).map(|i| i as i16).collect();
        let out = resample(&samples, 32000, 16000);
        assert_eq!(out.len(), 1600);
        // Every second sample survives (within interpolation error).
        assert_eq!(out[0], 0);
        assert_eq!(out[1], 2);
    }

    #[test]
    fn test_resample_same_rate_is_identity() {
        let samples = vec![1i16, 2, 3];
        assert_eq!(resample(&samples, 16000, 16000), samples);
    }

    #[test]
    fn test_resample_empty() {
        assert!(resample(&[], 44100, 16000).is_empty());
    }

    #[test]
    fn test_mix_to_mono_mono_is_identity() {
        let samples = vec![5i16, -5, 10];
        assert_eq!(mix_to_mono(&samples, 1), samples);
    }

    #[test]
    fn test_missing_wav_errors() {
        assert!(load_wav_samples(Path::new("/nonexistent.wav")).is_err());
    }
}
