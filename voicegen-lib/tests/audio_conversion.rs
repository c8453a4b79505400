use voicegen_lib::audio::{self, OUTPUT_CHANNELS, OUTPUT_SAMPLE_RATE};

/// 40 frames of MPEG-2 Layer III, 22.05 kHz mono
const LINE_MP3: &[u8] = include_bytes!("data/line.mp3");
const MP3_FRAME_SAMPLES: usize = 576;

#[test]
fn decodes_mpeg_audio_and_learns_its_layout() {
    let decoded = audio::decode(LINE_MP3).unwrap();

    assert_eq!(decoded.sample_rate, 22_050);
    assert_eq!(decoded.channels, 1);
    assert!(decoded.frames() > 0);
    assert!(decoded.frames() <= 40 * MP3_FRAME_SAMPLES);
    assert_eq!(decoded.frames() % MP3_FRAME_SAMPLES, 0);
}

#[test]
fn mp3_becomes_16bit_44k_stereo_wav_of_the_same_length() {
    let decoded = audio::decode(LINE_MP3).unwrap();
    let tmp = tempfile::tempdir().unwrap();
    let out = tmp.path().join("line.wav");

    let written = audio::mp3_to_wav(LINE_MP3, &out).unwrap();
    assert_eq!(written.sample_rate, OUTPUT_SAMPLE_RATE);
    assert_eq!(written.channels, OUTPUT_CHANNELS);
    assert!((written.duration_secs() - decoded.duration_secs()).abs() < 1e-3);

    let reader = hound::WavReader::open(&out).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.sample_rate, 44_100);
    assert_eq!(spec.channels, 2);
    assert_eq!(spec.bits_per_sample, 16);
    assert_eq!(spec.sample_format, hound::SampleFormat::Int);
    // Exactly twice the 22.05 kHz frame count, nothing lost at the end
    assert_eq!(reader.duration() as usize, decoded.frames() * 2);
}
