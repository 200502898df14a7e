//! ksynth CLI: offline score rendering and WAV export.
//!
//! Usage:
//!   ks-cli tones.kstb song.mid
//!   ks-cli tones.kstb song.kscb --wav output.wav --rate 44100 -vv

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use ks_master::{Controller, EngineConfig};
use log::{info, LevelFilter, Log, Metadata, Record};

/// Render a score through an FM tone list
#[derive(Parser)]
#[command(name = "ks-cli")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Tone list (.kstb) or single tone (.ksyb)
    tones: PathBuf,

    /// Score (.kscb) or Standard MIDI File (.mid)
    score: PathBuf,

    /// Write the rendered audio to this WAV file
    #[arg(long)]
    wav: Option<PathBuf>,

    /// Output sampling rate in Hz
    #[arg(long, default_value_t = 48000)]
    rate: u32,

    /// log2 of the number of voices
    #[arg(long, default_value_t = 6)]
    polyphony_bits: u8,

    /// Pitch-bend range in semitones
    #[arg(long, default_value_t = 2)]
    bend_range: u8,

    /// Longest render in seconds
    #[arg(long, default_value_t = 300)]
    seconds: u32,

    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

struct StderrLogger;

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            eprintln!("[{:<5} {}] {}", record.level(), record.target(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: StderrLogger = StderrLogger;

fn init_logging(verbose: u8) -> Result<()> {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    log::set_logger(&LOGGER).map_err(|e| anyhow::anyhow!("installing logger: {}", e))?;
    log::set_max_level(level);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    let config = EngineConfig {
        sampling_rate: cli.rate,
        polyphony_bits: cli.polyphony_bits,
        pitch_bend_range: cli.bend_range,
        ..EngineConfig::default()
    };
    let mut ctrl = Controller::new(config);
    ctrl.load_file(&cli.tones)
        .with_context(|| format!("loading tones from {}", cli.tones.display()))?;
    ctrl.load_file(&cli.score)
        .with_context(|| format!("loading score from {}", cli.score.display()))?;

    let tones = ctrl.tones();
    let score = ctrl.score();
    println!("Banks:      {}", tones.bank_count());
    println!("Tones:      {}", tones.tone_count());
    println!("Waves:      {}", tones.custom_wave_count());
    println!("Events:     {}", score.events.len());
    println!("Resolution: {} ticks/quarter", score.resolution);
    println!("Length:     {} ticks", score.length_ticks());
    println!();

    let Some(path) = cli.wav else {
        let frames = ctrl.render_frames(cli.rate as usize * cli.seconds as usize);
        info!("dry run rendered {} frames", frames.len());
        let seconds = frames.len() as f64 / cli.rate as f64;
        println!("Duration:   {:.2} s (no --wav given, nothing written)", seconds);
        return Ok(());
    };

    println!("Rendering to {} at {} Hz...", path.display(), cli.rate);
    let wav = ctrl.render_to_wav(cli.seconds).context("encoding WAV")?;
    fs::write(&path, &wav).with_context(|| format!("writing {}", path.display()))?;
    let frames = (wav.len().saturating_sub(44)) / 4;
    println!("Wrote {} frames ({:.2} s).", frames, frames as f64 / cli.rate as f64);
    Ok(())
}
