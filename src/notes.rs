use clap::ValueEnum;
use derive_more::{Add, AddAssign, From, Sub, SubAssign};
use midly::{
    num::{u28, u4, u7},
    MidiMessage, TrackEvent, TrackEventKind,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// A midi note, represented with a start time and length. Note that midi does not really have a notion
/// of "notes"--instead there are just NoteOn and NoteOff events.
pub struct Note {
    pub key: u7,
    pub vel: u7,
    pub start: Ticks,
    pub length: Ticks,
    pub channel: u4,
}

impl Note {
    /// Turn notes into delta-timed track events. Every note becomes a NoteOn at its start and a
    /// NoteOff at its end. At equal times NoteOffs come first, so back-to-back notes on the same key
    /// do not cut each other off.
    pub fn to_events(notes: impl IntoIterator<Item = Note>) -> Vec<TrackEvent<'static>> {
        let mut events = vec![];
        for note in notes {
            let note_on = TrackEventKind::Midi {
                channel: note.channel,
                message: MidiMessage::NoteOn {
                    key: note.key,
                    vel: note.vel,
                },
            };
            let note_off = TrackEventKind::Midi {
                channel: note.channel,
                message: MidiMessage::NoteOff {
                    key: note.key,
                    vel: u7::new(0),
                },
            };
            events.push((note.start, 1, note_on));
            events.push((note.start + note.length, 0, note_off));
        }
        // Stable, so simultaneous events keep their insertion order.
        events.sort_by_key(|(time, order, _)| (*time, *order));

        let mut track_events = vec![];
        let mut prev_time = Ticks(0);
        for (time, _, event) in events {
            track_events.push(TrackEvent {
                delta: (time - prev_time).into(),
                kind: event,
            });
            prev_time = time;
        }
        track_events
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
/// A unit of time in some note duration.
pub enum NoteDuration {
    Whole,
    Half,
    Quarter,
    Eighth,
    Sixteenth,
    ThirtySecond,
    SixtyFourth,
}

impl NoteDuration {
    /// Length of one unit of this duration, given the resolution of the file.
    pub fn to_ticks(&self, ticks_per_beat: u16) -> Ticks {
        Ticks::from(ticks_per_beat as f32 / self.beat_factor())
    }

    // Return the multiplier for converting from a beat to the given NoteDuration
    fn beat_factor(&self) -> f32 {
        match self {
            NoteDuration::Whole => 0.25,
            NoteDuration::Half => 0.5,
            NoteDuration::Quarter => 1.0,
            NoteDuration::Eighth => 2.0,
            NoteDuration::Sixteenth => 4.0,
            NoteDuration::ThirtySecond => 8.0,
            NoteDuration::SixtyFourth => 16.0,
        }
    }
}

#[derive(
    From, Add, AddAssign, Sub, SubAssign, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Debug,
)]
/// Wrapper struct for the Midi Tick unit.
pub struct Ticks(pub u32);

impl From<f32> for Ticks {
    fn from(x: f32) -> Self {
        Self(x as u32)
    }
}
impl From<u28> for Ticks {
    fn from(x: u28) -> Self {
        Ticks(x.as_int())
    }
}
impl From<Ticks> for u28 {
    fn from(x: Ticks) -> Self {
        u28::new(x.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(key: u8, start: u32, length: u32) -> Note {
        Note {
            key: u7::new(key),
            vel: u7::new(100),
            start: Ticks(start),
            length: Ticks(length),
            channel: u4::new(0),
        }
    }

    #[test]
    fn durations_in_ticks() {
        assert_eq!(NoteDuration::Quarter.to_ticks(480), Ticks(480));
        assert_eq!(NoteDuration::Eighth.to_ticks(480), Ticks(240));
        assert_eq!(NoteDuration::Whole.to_ticks(480), Ticks(1920));
        assert_eq!(NoteDuration::SixtyFourth.to_ticks(480), Ticks(30));
    }

    #[test]
    fn back_to_back_notes() {
        let events = Note::to_events([note(60, 0, 240), note(60, 240, 240)]);
        let deltas = events.iter().map(|e| e.delta.as_int()).collect::<Vec<_>>();
        assert_eq!(deltas, vec![0, 240, 0, 240]);
        assert!(matches!(
            events[1].kind,
            TrackEventKind::Midi {
                message: MidiMessage::NoteOff { .. },
                ..
            }
        ));
        assert!(matches!(
            events[2].kind,
            TrackEventKind::Midi {
                message: MidiMessage::NoteOn { .. },
                ..
            }
        ));
    }
}
