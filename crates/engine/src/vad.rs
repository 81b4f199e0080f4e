// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Voice activity detection over fixed-length 16kHz mono PCM frames.
//!
//! Three tiers are supported, in descending order of quality: [`Hi`], a
//! caller-supplied high quality detector (typically FFI-backed, e.g. an
//! ONNX VAD model); [`Ml`], a lighter model-based detector; and [`Energy`],
//! a dependency-free RMS threshold. [`Vad::new`] tries each tier in turn and
//! falls back on construction failure, logging at `warn` rather than
//! returning a hard error.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum VadError {
    #[error("frame length {got} does not match expected {expected} samples for {frame_ms}ms @ {sample_rate}Hz")]
    FrameLength { got: usize, expected: usize, frame_ms: u32, sample_rate: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadDecision {
    Speech,
    Silence,
}

/// Which tier produced the active detector, surfaced for logging/metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadTier {
    Hi,
    Ml,
    Energy,
}

/// A frame classifier. Implementors decide speech/silence for one frame of
/// `frame_ms` milliseconds of 16kHz mono PCM, alongside the probability (in
/// `[0, 1]`) the decision was based on.
pub trait VadDetector: Send + Sync {
    /// # Errors
    /// Returns [`VadError::FrameLength`] if `frame.len() != frame_ms * 16`.
    fn classify(&mut self, frame: &[i16], frame_ms: u32) -> Result<(VadDecision, f32), VadError>;
}

fn expected_len(frame_ms: u32, sample_rate: u32) -> usize {
    (sample_rate as usize / 1000) * frame_ms as usize
}

fn check_len(frame: &[i16], frame_ms: u32, sample_rate: u32) -> Result<(), VadError> {
    let expected = expected_len(frame_ms, sample_rate);
    if frame.len() != expected {
        return Err(VadError::FrameLength { got: frame.len(), expected, frame_ms, sample_rate });
    }
    Ok(())
}

/// Simple RMS-energy detector. Always constructible; the tier of last resort.
pub struct EnergyVad {
    threshold: f32,
}

impl EnergyVad {
    #[must_use]
    pub const fn new(threshold: f32) -> Self {
        Self { threshold }
    }
}

impl Default for EnergyVad {
    fn default() -> Self {
        Self::new(0.02)
    }
}

impl VadDetector for EnergyVad {
    fn classify(&mut self, frame: &[i16], frame_ms: u32) -> Result<(VadDecision, f32), VadError> {
        check_len(frame, frame_ms, 16_000)?;
        let sum_sq: f64 = frame.iter().map(|&s| f64::from(s) * f64::from(s)).sum();
        let rms = (sum_sq / frame.len() as f64).sqrt() / f64::from(i16::MAX);
        let prob = (rms as f32).min(1.0);
        let decision = if prob >= self.threshold { VadDecision::Speech } else { VadDecision::Silence };
        Ok((decision, prob))
    }
}

/// Constructs an `Hi`-tier detector. Implemented by the deployment (e.g. an
/// ONNX-backed detector, FFI-bound the way the native VAD plugin loads
/// `ten-vad`); returns `None` when unavailable so `Vad::new` can fall back.
pub trait HiVadFactory: Send + Sync {
    fn build(&self) -> Option<Box<dyn VadDetector>>;
}

/// Constructs an `Ml`-tier detector (a lighter model than `Hi`, still not
/// dependency-free).
pub trait MlVadFactory: Send + Sync {
    fn build(&self) -> Option<Box<dyn VadDetector>>;
}

/// Per-session VAD instance. Not shared across sessions: each `Session` owns
/// its own `Vad` so the underlying detector's internal state (e.g. a
/// streaming speech/silence state machine) isn't corrupted by interleaved
/// frames from other connections.
pub struct Vad {
    detector: Box<dyn VadDetector>,
    tier: VadTier,
}

impl Vad {
    /// Attempts `Hi`, then `Ml`, then falls back to `Energy`. Construction
    /// never fails.
    pub fn new(
        hi: Option<&dyn HiVadFactory>,
        ml: Option<&dyn MlVadFactory>,
        energy_threshold: f32,
    ) -> Self {
        if let Some(hi) = hi {
            if let Some(detector) = hi.build() {
                return Self { detector, tier: VadTier::Hi };
            }
            tracing::warn!("Hi-tier VAD unavailable, falling back to Ml tier");
        }
        if let Some(ml) = ml {
            if let Some(detector) = ml.build() {
                return Self { detector, tier: VadTier::Ml };
            }
            tracing::warn!("Ml-tier VAD unavailable, falling back to Energy tier");
        }
        Self { detector: Box::new(EnergyVad::new(energy_threshold)), tier: VadTier::Energy }
    }

    #[must_use]
    pub const fn tier(&self) -> VadTier {
        self.tier
    }

    /// Returns the speech/silence decision alongside the probability (in
    /// `[0, 1]`) it was based on.
    ///
    /// # Errors
    /// Returns [`VadError::FrameLength`] if `frame.len() != frame_ms * 16`.
    pub fn is_speech(&mut self, frame: &[i16], frame_ms: u32) -> Result<(VadDecision, f32), VadError> {
        self.detector.classify(frame, frame_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn silence_frame(frame_ms: u32) -> Vec<i16> {
        vec![0; expected_len(frame_ms, 16_000)]
    }

    fn loud_frame(frame_ms: u32) -> Vec<i16> {
        vec![20_000; expected_len(frame_ms, 16_000)]
    }

    #[test]
    fn energy_vad_rejects_wrong_frame_length() {
        let mut vad = EnergyVad::default();
        let err = vad.classify(&[0; 100], 20).unwrap_err();
        assert!(matches!(err, VadError::FrameLength { got: 100, expected: 320, .. }));
    }

    #[test]
    fn energy_vad_classifies_silence_and_speech() {
        let mut vad = EnergyVad::default();
        let (decision, prob) = vad.classify(&silence_frame(20), 20).unwrap();
        assert_eq!(decision, VadDecision::Silence);
        assert!((prob - 0.0).abs() < f32::EPSILON);
        let (decision, prob) = vad.classify(&loud_frame(20), 20).unwrap();
        assert_eq!(decision, VadDecision::Speech);
        assert!(prob > 0.5);
    }

    #[test]
    fn vad_falls_back_to_energy_tier_with_no_factories() {
        let vad = Vad::new(None, None, 0.02);
        assert_eq!(vad.tier(), VadTier::Energy);
    }

    struct AlwaysNone;
    impl HiVadFactory for AlwaysNone {
        fn build(&self) -> Option<Box<dyn VadDetector>> {
            None
        }
    }

    #[test]
    fn vad_falls_back_past_a_failing_hi_factory() {
        let vad = Vad::new(Some(&AlwaysNone), None, 0.02);
        assert_eq!(vad.tier(), VadTier::Energy);
    }
}
