//! Notification frame decoding
//!
//! The oximeter pushes two kinds of notification frames on its vendor
//! service. Decoding is total: anything that is not one of the two known
//! shapes decodes to [`Frame::Ignored`].

/// First byte of a vital-signs frame
pub const VITAL_TAG: u8 = 0xF1;

/// First byte of a waveform frame
pub const WAVEFORM_TAG: u8 = 0xF0;

/// Exact length of a vital-signs frame
pub const VITAL_FRAME_LEN: usize = 7;

/// One decoded vital-signs frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VitalReading {
    /// Oxygen saturation in percent
    pub spo2: u8,
    /// Heart rate in beats per minute
    pub bpm: u8,
    /// Perfusion index in tenths of a percent
    pub perfusion_index_raw: u8,
}

impl VitalReading {
    /// Perfusion index in percent
    pub fn perfusion_index(&self) -> f64 {
        f64::from(self.perfusion_index_raw) / 10.0
    }
}

/// Plethysmogram samples carried by one waveform frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaveformSample {
    pub samples: Vec<u8>,
}

/// Result of decoding one notification payload
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Vital(VitalReading),
    Waveform(WaveformSample),
    Ignored,
}

/// Decode a raw notification payload.
///
/// A vital frame is exactly [`VITAL_FRAME_LEN`] bytes starting with
/// [`VITAL_TAG`]; byte 1 is SpO2, byte 2 heart rate and byte 4 the perfusion
/// index. A waveform frame starts with [`WAVEFORM_TAG`], has at least two
/// bytes, and its samples are everything between the tag and the trailing
/// check byte.
pub fn decode(raw: &[u8]) -> Frame {
    match raw {
        [VITAL_TAG, spo2, bpm, _, pi, _, _] => Frame::Vital(VitalReading {
            spo2: *spo2,
            bpm: *bpm,
            perfusion_index_raw: *pi,
        }),
        [WAVEFORM_TAG, body @ .., _check] => Frame::Waveform(WaveformSample {
            samples: body.to_vec(),
        }),
        _ => Frame::Ignored,
    }
}
