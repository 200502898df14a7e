//! Headless controller for ksynth.
//!
//! Owns the shared wave tables, a compiled tone list and a score, and
//! renders them offline to frames or WAV. Shared by the CLI and the
//! integration tests.

mod wav;

use std::path::Path;
use std::sync::Arc;

use ks_engine::{SequencerState, ToneList, WaveTables};
use log::{debug, info};

// Re-export common types so callers don't need ks-ir/ks-engine directly.
pub use ks_engine::{EngineConfig, Frame};
pub use ks_formats::FormatError;
pub use ks_ir::{Score, ToneListData, ToneListEntry, ToneParameters};

pub use wav::{frames_to_wav, write_wav};

/// Frames rendered per call into the sequencer.
const RENDER_CHUNK: usize = 1024;

/// Headless synthesizer controller: owns tones and a score.
pub struct Controller {
    tables: Arc<WaveTables>,
    config: EngineConfig,
    tones: ToneList,
    score: Score,
}

impl Controller {
    pub fn new(config: EngineConfig) -> Self {
        let tables = WaveTables::shared();
        Self {
            tones: ToneList::new(tables.clone(), config.sampling_rate),
            tables,
            config,
            score: Score::default(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Change the engine settings, recompiling tones for a new sampling rate.
    pub fn set_config(&mut self, config: EngineConfig) {
        if config.sampling_rate != self.config.sampling_rate {
            self.tones.set_sampling_rate(config.sampling_rate);
        }
        self.config = config;
    }

    pub fn tones(&self) -> &ToneList {
        &self.tones
    }

    pub fn score(&self) -> &Score {
        &self.score
    }

    // --- Loading ---
    // A failed load leaves the previous tones or score in place.

    pub fn set_tone_list(&mut self, data: &ToneListData) {
        self.tones = ToneList::from_data(self.tables.clone(), self.config.sampling_rate, data);
    }

    pub fn set_score(&mut self, score: Score) {
        self.score = score;
    }

    /// Load a `.kstb` tone list.
    pub fn load_tone_list(&mut self, data: &[u8]) -> Result<(), FormatError> {
        let list = ks_formats::load_tone_list(data)?;
        self.set_tone_list(&list);
        Ok(())
    }

    /// Load a single `.ksyb` tone as program 0 of bank 0.
    pub fn load_tone(&mut self, data: &[u8]) -> Result<(), FormatError> {
        let tone = ks_formats::load_tone(data)?;
        let mut list = ToneListData::new();
        list.push(ToneListEntry::new("", 0, 0, 0, tone));
        self.set_tone_list(&list);
        Ok(())
    }

    /// Load a `.kscb` score.
    pub fn load_score(&mut self, data: &[u8]) -> Result<(), FormatError> {
        self.score = ks_formats::load_score(data)?;
        Ok(())
    }

    /// Import a Standard MIDI File as the score.
    pub fn load_midi(&mut self, data: &[u8]) -> Result<(), FormatError> {
        self.score = ks_formats::load_smf(data)?;
        Ok(())
    }

    /// Load a tone, tone list, score or MIDI file, chosen by extension.
    pub fn load_file(&mut self, path: &Path) -> Result<(), FormatError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        let data = std::fs::read(path)
            .map_err(|e| FormatError::Io(format!("{}: {}", path.display(), e)))?;
        debug!("loading {} ({} bytes)", path.display(), data.len());
        match ext.as_str() {
            "ksyb" => self.load_tone(&data),
            "kstb" => self.load_tone_list(&data),
            "kscb" => self.load_score(&data),
            "mid" | "midi" => self.load_midi(&data),
            _ => Err(FormatError::Malformed(format!(
                "unrecognised file extension {:?}",
                ext
            ))),
        }
    }

    // --- Offline rendering ---

    /// Render the score until it has finished and every voice is silent,
    /// or `max_frames` frames have been produced.
    pub fn render_frames(&self, max_frames: usize) -> Vec<Frame> {
        let mut sequencer = SequencerState::new(self.config);
        sequencer.set_default(&self.tones);

        let minute = self.config.sampling_rate as usize * 60;
        let mut frames = Vec::with_capacity(max_frames.min(minute));
        while frames.len() < max_frames && !(sequencer.is_finished() && sequencer.is_silent()) {
            let start = frames.len();
            let len = RENDER_CHUNK.min(max_frames - start);
            frames.resize(start + len, Frame::silence());
            sequencer.render(&self.score, &self.tones, &mut frames[start..]);
        }
        info!(
            "rendered {} frames ({} ticks, finished: {})",
            frames.len(),
            sequencer.tick(),
            sequencer.is_finished()
        );
        frames
    }

    pub fn render_to_wav(&self, max_seconds: u32) -> Result<Vec<u8>, FormatError> {
        let max_frames = self.config.sampling_rate as usize * max_seconds as usize;
        let frames = self.render_frames(max_frames);
        frames_to_wav(&frames, self.config.sampling_rate)
    }
}

impl Default for Controller {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ks_ir::ScoreEvent;

    fn short_score() -> Score {
        let mut score = Score::new(96);
        score.push(ScoreEvent::note_on(0, 0, 69, 100));
        score.push(ScoreEvent::note_off(48, 0, 69));
        score.push(ScoreEvent::end());
        score
    }

    #[test]
    fn empty_score_renders_one_silent_chunk() {
        let ctrl = Controller::default();
        let frames = ctrl.render_frames(48_000);
        assert_eq!(frames.len(), RENDER_CHUNK);
        assert!(frames.iter().all(Frame::is_silent));
    }

    #[test]
    fn render_stops_after_release() {
        let mut ctrl = Controller::default();
        let tone = ks_formats::save_tone(&ToneParameters::default()).expect("save");
        ctrl.load_tone(&tone).expect("load");
        ctrl.set_score(short_score());
        let frames = ctrl.render_frames(10 * 48_000);
        assert!(!frames.is_empty());
        assert!(frames.len() < 10 * 48_000);
        assert!(frames.iter().any(|f| !f.is_silent()));
    }

    #[test]
    fn render_respects_frame_cap() {
        let mut ctrl = Controller::default();
        ctrl.set_tone_list(&{
            let mut list = ToneListData::new();
            list.push(ToneListEntry::new("Sine", 0, 0, 0, ToneParameters::default()));
            list
        });
        let mut score = Score::new(96);
        score.push(ScoreEvent::note_on(0, 0, 60, 100));
        ctrl.set_score(score);
        assert_eq!(ctrl.render_frames(5000).len(), 5000);
    }

    #[test]
    fn failed_load_keeps_state() {
        let mut ctrl = Controller::default();
        ctrl.set_score(short_score());
        assert_eq!(ctrl.load_score(b"KSCB"), Err(FormatError::UnexpectedEof));
        assert_eq!(ctrl.load_midi(b"junk"), Err(FormatError::InvalidHeader));
        assert_eq!(ctrl.score(), &short_score());
    }

    #[test]
    fn sampling_rate_change_recompiles() {
        let mut ctrl = Controller::default();
        ctrl.set_config(EngineConfig {
            sampling_rate: 22050,
            ..EngineConfig::default()
        });
        assert_eq!(ctrl.tones().sampling_rate(), 22050);
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let mut ctrl = Controller::default();
        let err = ctrl.load_file(Path::new("Cargo.toml"));
        assert!(matches!(err, Err(FormatError::Malformed(_))));
    }
}
