//! Property tests for the notification decoder

use proptest::prelude::*;
use pulseox_bridge::protocol::frames::{VITAL_FRAME_LEN, VITAL_TAG, WAVEFORM_TAG};
use pulseox_bridge::protocol::{decode, Frame};

proptest! {
    #[test]
    fn vital_frames_expose_spo2_bpm_and_pi(body in proptest::collection::vec(any::<u8>(), 6)) {
        let mut raw = vec![VITAL_TAG];
        raw.extend(&body);

        match decode(&raw) {
            Frame::Vital(reading) => {
                prop_assert_eq!(reading.spo2, raw[1]);
                prop_assert_eq!(reading.bpm, raw[2]);
                prop_assert_eq!(reading.perfusion_index(), f64::from(raw[4]) / 10.0);
            }
            other => prop_assert!(false, "expected vital frame, got {:?}", other),
        }
    }

    #[test]
    fn waveform_frames_drop_tag_and_check_byte(body in proptest::collection::vec(any::<u8>(), 1..64)) {
        let mut raw = vec![WAVEFORM_TAG];
        raw.extend(&body);

        match decode(&raw) {
            Frame::Waveform(sample) => {
                prop_assert_eq!(sample.samples.as_slice(), &raw[1..raw.len() - 1]);
            }
            other => prop_assert!(false, "expected waveform frame, got {:?}", other),
        }
    }

    #[test]
    fn other_frames_are_ignored(raw in proptest::collection::vec(any::<u8>(), 0..64)) {
        let is_vital = raw.len() == VITAL_FRAME_LEN && raw[0] == VITAL_TAG;
        let is_waveform = raw.len() >= 2 && raw[0] == WAVEFORM_TAG;
        prop_assume!(!is_vital && !is_waveform);

        prop_assert_eq!(decode(&raw), Frame::Ignored);
    }

    #[test]
    fn decoding_is_deterministic(raw in proptest::collection::vec(any::<u8>(), 0..32)) {
        prop_assert_eq!(decode(&raw), decode(&raw));
    }
}

#[test]
fn test_vital_tag_with_wrong_length_is_ignored() {
    assert_eq!(decode(&[0xF1, 95, 80, 0, 12, 0]), Frame::Ignored);
    assert_eq!(decode(&[0xF1, 95, 80, 0, 12, 0, 0, 0]), Frame::Ignored);
}

#[test]
fn test_single_waveform_tag_is_ignored() {
    assert_eq!(decode(&[0xF0]), Frame::Ignored);
    assert_eq!(decode(&[]), Frame::Ignored);
}

#[test]
fn test_waveform_scenario() {
    let Frame::Waveform(sample) = decode(&[240, 1, 2, 3, 9]) else {
        panic!("expected waveform frame");
    };
    assert_eq!(sample.samples, vec![1, 2, 3]);
}
