use std::path::Path;

use itertools::{Itertools, MinMaxResult};
use midly::{
    num::{u15, u24, u28, u4, u7},
    Format, Header, MetaMessage, MidiMessage, Smf, Timing, Track, TrackEvent, TrackEventKind,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::features::FeatureVector;
use crate::notes::{Note, NoteDuration, Ticks};
use crate::quantize::Quantizable;

/// How a generated feature vector is turned into a MIDI key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum NotePolicy {
    /// Every step plays the same key.
    Fixed { key: u8 },
    /// The value of one feature, scaled from its range over the whole sequence onto
    /// `low_key..=high_key`.
    Contour {
        feature: usize,
        low_key: u8,
        high_key: u8,
    },
    /// The loudest of the values from `first_band` onwards picks the key, `interval` semitones per
    /// band above `low_key`.
    Dominant {
        first_band: usize,
        low_key: u8,
        interval: u8,
    },
}

impl Default for NotePolicy {
    fn default() -> Self {
        NotePolicy::Fixed { key: 60 }
    }
}

impl NotePolicy {
    /// One key per vector of `sequence`.
    pub fn keys(&self, sequence: &[FeatureVector]) -> Result<Vec<u7>> {
        match *self {
            NotePolicy::Fixed { key } => {
                let key = check_key("key", key)?;
                Ok(vec![key; sequence.len()])
            }
            NotePolicy::Contour {
                feature,
                low_key,
                high_key,
            } => {
                check_key("low_key", low_key)?;
                check_key("high_key", high_key)?;
                if low_key > high_key {
                    return Err(Error::InvalidParameter {
                        name: "low_key",
                        reason: format!("{} is above high_key {}", low_key, high_key),
                    });
                }
                check_feature(sequence, feature)?;
                let values = sequence.iter().map(|vector| vector[feature]);
                let (min, max) = match values.clone().minmax() {
                    MinMaxResult::NoElements => return Ok(vec![]),
                    MinMaxResult::OneElement(x) => (x, x),
                    MinMaxResult::MinMax(min, max) => (min, max),
                };
                let levels = (high_key - low_key) as usize;
                Ok(values
                    .map(|x| {
                        let level = Quantizable::quantize(x, min, max, levels);
                        u7::new(low_key + level as u8)
                    })
                    .collect())
            }
            NotePolicy::Dominant {
                first_band,
                low_key,
                interval,
            } => {
                check_key("low_key", low_key)?;
                sequence
                    .iter()
                    .map(|vector| {
                        if first_band >= vector.len() {
                            return Err(Error::shape(
                                format!("more than {} features", first_band),
                                vector.len(),
                            ));
                        }
                        let band = loudest(&vector[first_band..]);
                        let key = low_key as usize + band * interval as usize;
                        Ok(u7::new(key.min(127) as u8))
                    })
                    .collect()
            }
        }
    }
}

fn check_key(name: &'static str, key: u8) -> Result<u7> {
    if key > 127 {
        return Err(Error::InvalidParameter {
            name,
            reason: format!("MIDI keys go up to 127, got {}", key),
        });
    }
    Ok(u7::new(key))
}

fn check_feature(sequence: &[FeatureVector], feature: usize) -> Result<()> {
    match sequence.iter().find(|vector| feature >= vector.len()) {
        Some(vector) => Err(Error::shape(
            format!("more than {} features", feature),
            vector.len(),
        )),
        None => Ok(()),
    }
}

/// Index of the largest value. Ties go to the lowest index.
fn loudest(values: &[f32]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |(best_i, best), (i, &x)| {
            if x > best {
                (i, x)
            } else {
                (best_i, best)
            }
        })
        .0
}

/// Settings for rendering a generated sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub policy: NotePolicy,
    /// Time between consecutive steps. Every note lasts one step.
    pub step: NoteDuration,
    pub tempo_bpm: u32,
    pub velocity: u8,
    pub ticks_per_beat: u16,
}

impl Default for RenderConfig {
    fn default() -> Self {
        RenderConfig {
            policy: NotePolicy::default(),
            step: NoteDuration::Eighth,
            tempo_bpm: 120,
            velocity: 64,
            ticks_per_beat: 480,
        }
    }
}

/// Render one note per generated step: note `i` starts at `i * step` and lasts one step. The file
/// holds a tempo track and a note track.
pub fn render(sequence: &[FeatureVector], config: &RenderConfig) -> Result<Smf<'static>> {
    // Slower tempos do not fit in the 24 bit microseconds-per-beat field.
    if config.tempo_bpm < 4 {
        return Err(Error::InvalidParameter {
            name: "tempo_bpm",
            reason: format!("must be at least 4, got {}", config.tempo_bpm),
        });
    }
    if config.ticks_per_beat == 0 || config.ticks_per_beat > 0x7fff {
        return Err(Error::InvalidParameter {
            name: "ticks_per_beat",
            reason: format!("must be in 1..=32767, got {}", config.ticks_per_beat),
        });
    }
    let velocity = check_key("velocity", config.velocity)?;
    let keys = config.policy.keys(sequence)?;

    let mut smf = Smf::new(Header::new(
        Format::Parallel,
        Timing::Metrical(u15::new(config.ticks_per_beat)),
    ));

    let tempo: Track<'static> = vec![
        TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(
                60_000_000 / config.tempo_bpm,
            ))),
        },
        end_of_track(),
    ];
    smf.tracks.push(tempo);

    let step = config.step.to_ticks(config.ticks_per_beat);
    if step.0 == 0 {
        return Err(Error::InvalidParameter {
            name: "step",
            reason: format!(
                "{:?} is shorter than one tick at {} ticks per beat",
                config.step, config.ticks_per_beat
            ),
        });
    }
    let channel = u4::new(0);
    let notes = keys.iter().enumerate().map(|(i, &key)| Note {
        key,
        vel: velocity,
        start: Ticks(step.0 * i as u32),
        length: step,
        channel,
    });

    let mut track: Track<'static> = vec![TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::TrackName(b"Generated")),
    }];
    track.append(&mut Note::to_events(notes));
    track.push(end_of_track());
    smf.tracks.push(track);

    log::debug!("Rendered {} notes, {} ticks per step", keys.len(), step.0);
    Ok(smf)
}

fn end_of_track() -> TrackEvent<'static> {
    TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    }
}

/// Write a Standard MIDI File.
pub fn write_midi(path: impl AsRef<Path>, smf: &Smf) -> Result<()> {
    let outfile = std::fs::File::create(path)?;
    midly::write_std(&smf.header, &smf.tracks, outfile)?;
    Ok(())
}

/// Log every non-note event of a MIDI file, plus a count of the notes per track.
pub fn debug_print_midi(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let raw = std::fs::read(path)?;
    let smf = Smf::parse(&raw)?;
    log::info!("-- FILE {} --", path.display());
    log::info!("{:?}", smf.header);
    for (i, track) in smf.tracks.iter().enumerate() {
        log::info!("-- TRACK {} --", i);
        let mut notes = 0;
        for event in track {
            if let TrackEventKind::Midi {
                message: MidiMessage::NoteOn { .. } | MidiMessage::NoteOff { .. },
                ..
            } = event.kind
            {
                notes += 1;
                continue;
            }
            log::info!("delta = {:?}\t{:?}", event.delta, event.kind);
        }
        log::info!("-- END TRACK {} ({} note events) --", i, notes);
    }
    Ok(())
}
