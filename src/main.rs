use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use feature_music::{
    audio,
    config::{Model, PipelineConfig},
    midi::{self, NotePolicy},
    notes::NoteDuration,
    pipeline, FeatureVector,
};
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
/// Learns to continue a song's audio features and writes what it comes up with as MIDI.
struct Args {
    /// Path to input MP3 or WAV file.
    #[arg(short, long = "in")]
    in_path: PathBuf,
    /// Path to output MIDI file.
    #[arg(short, long = "out", default_value = "out.mid")]
    out_path: PathBuf,
    /// JSON config file. Flags given on the command line take precedence over it.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Frames per training window.
    #[arg(short = 'L', long)]
    sequence_length: Option<usize>,
    /// Number of frames to generate.
    #[arg(short = 'n', long)]
    steps: Option<usize>,
    #[arg(long)]
    epochs: Option<usize>,
    #[arg(long)]
    learning_rate: Option<f32>,
    /// Hidden layer sizes of the feed-forward model.
    #[arg(long, num_args = 1..)]
    hidden: Option<Vec<usize>>,
    #[arg(long, value_enum)]
    model: Option<Model>,
    /// Random seed. Runs with the same seed and input produce the same file.
    #[arg(long)]
    seed: Option<u64>,
    /// Analysis frame length, in samples.
    #[arg(long)]
    frame_length: Option<usize>,
    /// Samples between analysis frames.
    #[arg(long)]
    hop_length: Option<usize>,
    /// Number of frequency bands per frame.
    #[arg(long)]
    bands: Option<usize>,
    /// How generated frames become notes.
    #[arg(short, long, value_enum)]
    policy: Option<PolicyKind>,
    /// Key for the fixed policy, lowest key for the others.
    #[arg(long, default_value_t = 60)]
    key: u8,
    /// Highest key for the contour policy.
    #[arg(long, default_value_t = 84)]
    high_key: u8,
    /// Feature the contour policy follows (0 = RMS, 1 = zero-crossing rate, 2.. = bands).
    #[arg(long, default_value_t = 0)]
    feature: usize,
    /// Semitones between bands for the dominant policy.
    #[arg(long, default_value_t = 2)]
    interval: u8,
    /// Time between generated notes.
    #[arg(long, value_enum)]
    step: Option<NoteDuration>,
    /// Tempo, in beats per minute.
    #[arg(long)]
    tempo: Option<u32>,
    #[arg(long)]
    velocity: Option<u8>,
    /// Also write the decoded mono input as a 16 bit WAV file, to hear what gets analyzed.
    #[arg(long)]
    audition: Option<PathBuf>,
    /// Also write the seed window and the generated features, in feature units, as JSON.
    #[arg(long)]
    dump_features: Option<PathBuf>,
    /// Log the events of the written MIDI file.
    #[arg(long)]
    print: bool,
}

#[derive(Debug, Copy, Clone, ValueEnum)]
enum PolicyKind {
    Fixed,
    Contour,
    Dominant,
}

impl Args {
    /// Defaults, then the config file, then command line flags.
    fn pipeline_config(&self) -> anyhow::Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::load(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => PipelineConfig::default(),
        };

        if let Some(sequence_length) = self.sequence_length {
            config.sequence_length = sequence_length;
        }
        if let Some(steps) = self.steps {
            config.steps = steps;
        }
        if let Some(epochs) = self.epochs {
            config.train.epochs = epochs;
            #[cfg(feature = "torch")]
            {
                config.lstm.epochs = epochs;
            }
        }
        if let Some(learning_rate) = self.learning_rate {
            config.train.learning_rate = learning_rate;
            #[cfg(feature = "torch")]
            {
                config.lstm.learning_rate = learning_rate as f64;
            }
        }
        if let Some(hidden) = &self.hidden {
            config.train.hidden_layers = hidden.clone();
        }
        if let Some(model) = self.model {
            config.model = model;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(frame_length) = self.frame_length {
            config.features.frame_length = frame_length;
        }
        if let Some(hop_length) = self.hop_length {
            config.features.hop_length = hop_length;
        }
        if let Some(bands) = self.bands {
            config.features.bands = bands;
        }
        if let Some(policy) = self.policy {
            config.render.policy = match policy {
                PolicyKind::Fixed => NotePolicy::Fixed { key: self.key },
                PolicyKind::Contour => NotePolicy::Contour {
                    feature: self.feature,
                    low_key: self.key,
                    high_key: self.high_key,
                },
                PolicyKind::Dominant => NotePolicy::Dominant {
                    first_band: 2,
                    low_key: self.key,
                    interval: self.interval,
                },
            };
        }
        if let Some(step) = self.step {
            config.render.step = step;
        }
        if let Some(tempo) = self.tempo {
            config.render.tempo_bpm = tempo;
        }
        if let Some(velocity) = self.velocity {
            config.render.velocity = velocity;
        }
        Ok(config)
    }
}

#[derive(Serialize)]
struct FeatureDump {
    input_scale: f32,
    target_scale: f32,
    seed: Vec<FeatureVector>,
    generated: Vec<FeatureVector>,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = args.pipeline_config()?;
    log::debug!("{:#?}", config);

    let audio = audio::read_audio_file(&args.in_path)
        .with_context(|| format!("failed to read {}", args.in_path.display()))?;
    if let Some(path) = &args.audition {
        audio::write_wav(path, &audio)
            .with_context(|| format!("failed to write {}", path.display()))?;
        log::info!("Wrote decoded input to {}", path.display());
    }
    let output = pipeline::run(&audio, &config)?;

    if let Some(path) = &args.dump_features {
        let dump = FeatureDump {
            input_scale: output.training_set.input_scale(),
            target_scale: output.training_set.target_scale(),
            seed: output.seed_features(),
            generated: output.generated_features(),
        };
        let file = std::fs::File::create(path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        serde_json::to_writer_pretty(file, &dump)?;
        log::info!("Wrote generated features to {}", path.display());
    }

    let smf = midi::render(&output.generated, &config.render)?;
    midi::write_midi(&args.out_path, &smf)
        .with_context(|| format!("failed to write {}", args.out_path.display()))?;
    log::info!(
        "Wrote {} notes to {}",
        output.generated.len(),
        args.out_path.display()
    );

    if args.print {
        midi::debug_print_midi(&args.out_path)?;
    }
    Ok(())
}
