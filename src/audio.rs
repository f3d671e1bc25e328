use std::{io::Read, path::Path};

use itertools::Itertools;
use minimp3::Decoder;
use wav::WAV_FORMAT_PCM;

use crate::error::{Error, Result};

/// Decoded mono audio with samples in [-1.0, 1.0].
#[derive(Debug, Clone, PartialEq)]
pub struct Audio {
    pub samples: Vec<f32>,
    pub sample_rate: usize,
}

impl Audio {
    /// Length in seconds.
    pub fn duration(&self) -> f32 {
        self.samples.len() as f32 / self.sample_rate as f32
    }
}

/// Read an MP3 or WAV file, picking the decoder by extension, and mix it down to mono.
pub fn read_audio_file(path: impl AsRef<Path>) -> Result<Audio> {
    let path = path.as_ref();
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());
    let audio = match extension.as_deref() {
        Some("mp3") => read_mp3_file(path)?,
        Some("wav") => read_wav_file(path)?,
        _ => return Err(Error::UnsupportedFormat(path.display().to_string())),
    };
    if audio.samples.is_empty() {
        return Err(Error::EmptyAudio);
    }
    log::info!(
        "Read {} ({} samples @ {} Hz, {:.1}s)",
        path.display(),
        audio.samples.len(),
        audio.sample_rate,
        audio.duration()
    );
    Ok(audio)
}

pub fn read_mp3_file(path: impl AsRef<Path>) -> Result<Audio> {
    let file = std::fs::File::open(path)?;
    get_mp3_data(Decoder::new(file))
}

pub fn get_mp3_data<R: Read>(mut decoder: Decoder<R>) -> Result<Audio> {
    let mut frames = vec![];
    loop {
        match decoder.next_frame() {
            Ok(frame) => frames.push(frame),
            Err(err) => match err {
                minimp3::Error::Io(err) => return Err(err.into()),
                minimp3::Error::InsufficientData => continue,
                minimp3::Error::SkippedData => continue,
                minimp3::Error::Eof => break,
            },
        }
    }
    let sample_rate = match frames.first() {
        Some(frame) => frame.sample_rate as usize,
        None => return Err(Error::EmptyAudio),
    };
    let samples = frames
        .iter()
        .flat_map(|frame| mixdown(&frame.data, frame.channels, i16_to_f32))
        .collect();
    Ok(Audio {
        samples,
        sample_rate,
    })
}

pub fn read_wav_file(path: impl AsRef<Path>) -> Result<Audio> {
    let mut file = std::fs::File::open(path)?;
    let (header, data) = wav::read(&mut file).map_err(|err| Error::Decode(err.to_string()))?;
    let channels = header.channel_count as usize;
    let samples = match data {
        wav::BitDepth::Eight(data) => mixdown(&data, channels, |x| (x as f32 - 128.0) / 128.0),
        wav::BitDepth::Sixteen(data) => mixdown(&data, channels, i16_to_f32),
        wav::BitDepth::TwentyFour(data) => {
            mixdown(&data, channels, |x| x as f32 / 8_388_608.0)
        }
        wav::BitDepth::ThirtyTwoFloat(data) => mixdown(&data, channels, |x| x),
        wav::BitDepth::Empty => return Err(Error::EmptyAudio),
    };
    Ok(Audio {
        samples,
        sample_rate: header.sampling_rate as usize,
    })
}

/// Average interleaved channels into a single channel, converting every sample with `to_f32`.
pub fn mixdown<T: Copy>(samples: &[T], channels: usize, to_f32: impl Fn(T) -> f32) -> Vec<f32> {
    let channels = channels.max(1);
    if samples.len() % channels != 0 {
        log::warn!(
            "Dropping {} trailing samples that do not fill a frame of {} channels",
            samples.len() % channels,
            channels
        );
    }
    samples
        .chunks_exact(channels)
        .map(|chunk| chunk.iter().map(|&x| to_f32(x)).sum::<f32>() / channels as f32)
        .collect_vec()
}

/// Write mono 16 bit PCM audio. Samples are clamped to [-1.0, 1.0].
pub fn write_wav(path: impl AsRef<Path>, audio: &Audio) -> Result<()> {
    let wav_header = wav::header::Header::new(WAV_FORMAT_PCM, 1, audio.sample_rate as u32, 16);
    let samples = audio.samples.iter().copied().map(f32_to_i16).collect();
    let track = wav::BitDepth::Sixteen(samples);
    let mut out_file = std::fs::File::create(path)?;
    wav::write(wav_header, &track, &mut out_file)?;
    Ok(())
}

fn i16_to_f32(x: i16) -> f32 {
    x as f32 / i16::MAX as f32
}

fn f32_to_i16(x: f32) -> i16 {
    (x.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}
