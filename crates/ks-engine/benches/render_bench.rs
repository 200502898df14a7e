use criterion::{black_box, criterion_group, criterion_main, Criterion};

use ks_engine::{
    render, BankNumber, EngineConfig, Frame, SequencerState, StereoGain, Synth, SynthNote,
    ToneList, WaveSet, WaveTables,
};
use ks_ir::{Score, ScoreEvent, ToneParameters};

const BLOCK: usize = 512;

fn fm_tone() -> ToneParameters {
    let mut tone = ToneParameters::default();
    tone.feedback = 96;
    for op in &mut tone.operators[..3] {
        op.level = 160;
    }
    tone
}

fn bench_voice(c: &mut Criterion) {
    let tables = WaveTables::new();
    let waves = WaveSet::new(&tables);

    let mut group = c.benchmark_group("voice");
    for (name, lfo) in [("serial", false), ("serial_lfo", true)] {
        let mut tone = fm_tone();
        if lfo {
            tone.operators[3].lfo_ams_depth = 80;
            tone.lfo_fms_depth = 80;
            tone.lfo_freq = 0xA0;
        }
        let synth = Synth::new(&tables, &tone, 48000);
        let mut buf = vec![0i32; BLOCK * 2];
        group.bench_function(name, |b| {
            let mut note = SynthNote::note_on(&tables, &synth, 60, 100);
            b.iter(|| {
                render(&waves, &synth, &mut note, StereoGain::UNITY, 1 << 16, &mut buf);
                black_box(&buf);
            })
        });
    }
    group.finish();
}

fn bench_sequencer(c: &mut Criterion) {
    let mut tones = ToneList::new(WaveTables::shared(), 48000);
    tones.insert_tone(BankNumber::new(0, 0, false), 0, None, &fm_tone());

    let mut score = Score::new(96);
    for note in 48..80 {
        score.push(ScoreEvent::note_on(0, note % 8, note, 100));
    }

    c.bench_function("sequencer_32_voices", |b| {
        let mut seq = SequencerState::new(EngineConfig::default());
        seq.set_default(&tones);
        let mut out = vec![Frame::default(); BLOCK];
        b.iter(|| {
            seq.render(&score, &tones, &mut out);
            black_box(&out);
        })
    });
}

criterion_group!(benches, bench_voice, bench_sequencer);
criterion_main!(benches);
