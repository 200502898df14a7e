//! Cross-codec tests on in-memory fixtures.

use ks_formats::{
    load_score, load_smf, load_tone, load_tone_list, save_score, save_tone, save_tone_list,
    FormatError, TONE_BYTES,
};
use ks_ir::{
    EnvelopePoint, Score, ScoreEvent, ToneListData, ToneListEntry, ToneParameters,
    CUSTOM_WAVE_PROGRAM,
};

fn bell() -> ToneParameters {
    let mut tone = ToneParameters::default();
    tone.algorithm = 5;
    tone.feedback = 40;
    for (i, op) in tone.operators.iter_mut().enumerate() {
        op.level = 60 * i as u8 + 30;
        op.envelope[1] = EnvelopePoint::new(180, 90 + i as u8);
        op.phase_fine = 17 * i as u8;
    }
    tone
}

fn smf_fixture() -> Vec<u8> {
    let mut file = b"MThd".to_vec();
    file.extend_from_slice(&6u32.to_be_bytes());
    file.extend_from_slice(&[0, 1, 0, 2, 0, 96]);
    for body in [
        &[0x00, 0xFF, 0x51, 0x03, 0x07, 0xA1, 0x20, 0x00, 0xFF, 0x2F, 0x00][..],
        &[0x00, 0xB0, 7, 127, 0x00, 0x90, 69, 100, 0x60, 0x80, 69, 0, 0x00, 0xFF, 0x2F, 0x00][..],
    ] {
        file.extend_from_slice(b"MTrk");
        file.extend_from_slice(&(body.len() as u32).to_be_bytes());
        file.extend_from_slice(body);
    }
    file
}

#[test]
fn tone_list_embeds_tone_bytes() {
    let mut list = ToneListData::new();
    list.push(ToneListEntry::new("Bell", 0, 0, 12, bell()));
    let list_bytes = save_tone_list(&list).expect("save list");
    let tone_bytes = save_tone(&bell()).expect("save tone");

    let embedded = &list_bytes[8 + 4 + 32..];
    assert_eq!(embedded, &tone_bytes[4..]);
    assert_eq!(embedded.len(), TONE_BYTES);
    assert_eq!(load_tone(&tone_bytes).expect("load tone"), bell());
}

#[test]
fn tone_list_with_custom_wave_and_percussion() {
    let mut list = ToneListData::new();
    list.push(ToneListEntry::new("Wave", 0, 0, CUSTOM_WAVE_PROGRAM + 2, bell()));
    list.push(ToneListEntry::percussion("Kick", 0, 0, 0, 36, ToneParameters::default()));
    list.push(ToneListEntry::new("Lead", 3, 1, 80, ToneParameters::default()));
    let loaded = load_tone_list(&save_tone_list(&list).expect("save")).expect("load");
    assert_eq!(loaded, list);
    assert!(loaded.entries[0].is_custom_wave());
    assert!(loaded.entries[1].is_percussion());
}

#[test]
fn imported_midi_file_saves_as_score() {
    let imported = load_smf(&smf_fixture()).expect("import");
    assert_eq!(
        imported.events,
        vec![
            ScoreEvent::tempo(0, 500_000),
            ScoreEvent::control_change(0, 0, 7, 127),
            ScoreEvent::note_on(0, 0, 69, 100),
            ScoreEvent::note_off(96, 0, 69),
            ScoreEvent::end(),
        ]
    );
    let reloaded = load_score(&save_score(&imported).expect("save")).expect("load");
    assert_eq!(reloaded, imported);
}

#[test]
fn loaders_reject_each_other() {
    let tone = save_tone(&ToneParameters::default()).expect("save");
    let score = save_score(&Score::new(96)).expect("save");
    assert_eq!(load_tone_list(&tone), Err(FormatError::InvalidHeader));
    assert_eq!(load_score(&tone), Err(FormatError::InvalidHeader));
    assert_eq!(load_smf(&score), Err(FormatError::InvalidHeader));
    assert_eq!(load_tone(&score), Err(FormatError::InvalidHeader));
}

#[test]
fn errors_display() {
    assert_eq!(FormatError::UnexpectedEof.to_string(), "unexpected end of file");
    assert_eq!(FormatError::Malformed("x".into()).to_string(), "malformed data: x");
}
