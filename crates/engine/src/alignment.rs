// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Fuses `AccurateAsr` text segments with `DiarizingAsr` speaker segments into
//! speaker-labeled transcript segments.
//!
//! Three tiers are tried per text segment, in order: time overlap with a
//! speaker segment, word-level density of speaker attribution, and finally
//! an `Unknown` speaker when neither tier is confident enough. No fuzzy
//! string matching is used to decide speaker attribution; the engine reasons
//! purely from the two inputs' time ranges.

use mte_core::{AlignmentMetrics, AlignmentMethod, AlignmentState, SpeakerSegment, TextSegment, TranscriptSegment};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AlignmentError {
    #[error("alignment requires at least one text segment")]
    EmptyInputs,
}

const TIER1_ACCEPT: f64 = 0.6;
const TIER2_ACCEPT: f64 = 0.7;
const OVERLAP_SPEAKER_FRACTION: f64 = 0.3;

const UNKNOWN_SPEAKER: &str = "Unknown";

struct Tier1Result {
    speaker: Option<String>,
    confidence: f64,
    is_overlap: bool,
}

fn tier1_time_overlap(text: &TextSegment, speakers: &[SpeakerSegment]) -> Tier1Result {
    let text_duration = text.end_sec - text.start_sec;
    if text_duration <= 0.0 || speakers.is_empty() {
        return Tier1Result { speaker: None, confidence: 0.0, is_overlap: false };
    }

    let mut best: Option<(&SpeakerSegment, f64)> = None;
    let mut wide_overlap_speakers = 0usize;
    for s in speakers {
        let overlap = (text.end_sec.min(s.end_sec) - text.start_sec.max(s.start_sec)).max(0.0);
        if overlap >= OVERLAP_SPEAKER_FRACTION * text_duration {
            wide_overlap_speakers += 1;
        }
        if best.is_none_or(|(_, best_overlap)| overlap > best_overlap) {
            best = Some((s, overlap));
        }
    }

    let Some((speaker, best_overlap)) = best else {
        return Tier1Result { speaker: None, confidence: 0.0, is_overlap: false };
    };
    let confidence = (best_overlap / text_duration / 0.5).min(1.0);
    Tier1Result {
        speaker: Some(speaker.speaker_label.clone()),
        confidence,
        is_overlap: wide_overlap_speakers >= 2,
    }
}

struct Tier2Result {
    speaker: Option<String>,
    confidence: f64,
}

fn tier2_word_density(text: &TextSegment, speakers: &[SpeakerSegment]) -> Tier2Result {
    let words: Vec<&str> = text.text.split_whitespace().collect();
    let n_words = words.len();
    let text_duration = text.end_sec - text.start_sec;
    if n_words == 0 || text_duration <= 0.0 {
        return Tier2Result { speaker: None, confidence: 0.0 };
    }

    let mut tally: BTreeMap<&str, usize> = BTreeMap::new();
    for i in 0..n_words {
        let t = text.start_sec + (i as f64 + 0.5) * text_duration / n_words as f64;
        let matches: Vec<&SpeakerSegment> =
            speakers.iter().filter(|s| t >= s.start_sec && t < s.end_sec).collect();
        if let [only] = matches.as_slice() {
            *tally.entry(only.speaker_label.as_str()).or_insert(0) += 1;
        }
    }

    let Some((best_speaker, best_count)) = tally.iter().max_by_key(|(_, count)| **count) else {
        return Tier2Result { speaker: None, confidence: 0.0 };
    };
    Tier2Result {
        speaker: Some((*best_speaker).to_string()),
        confidence: *best_count as f64 / n_words as f64,
    }
}

fn align_one(text: &TextSegment, speakers: &[SpeakerSegment]) -> TranscriptSegment {
    let duration = text.end_sec - text.start_sec;
    if duration <= 0.0 {
        return unknown_segment(text, 0.0, AlignmentState::UnknownSpeaker);
    }
    if speakers.is_empty() {
        return unknown_segment(text, 0.0, AlignmentState::UnknownSpeaker);
    }

    let tier1 = tier1_time_overlap(text, speakers);
    if tier1.confidence >= TIER1_ACCEPT {
        if let Some(speaker) = tier1.speaker {
            let state = if tier1.is_overlap { AlignmentState::Overlap } else { AlignmentState::Confident };
            return TranscriptSegment {
                text: text.text.clone(),
                audio_start_sec: text.start_sec,
                audio_end_sec: text.end_sec,
                speaker_label: speaker,
                speaker_confidence: tier1.confidence as f32,
                alignment_state: state,
                alignment_method: AlignmentMethod::TimeOverlap,
            };
        }
    }

    let tier2 = tier2_word_density(text, speakers);
    if tier2.confidence >= TIER2_ACCEPT {
        if let Some(speaker) = tier2.speaker {
            return TranscriptSegment {
                text: text.text.clone(),
                audio_start_sec: text.start_sec,
                audio_end_sec: text.end_sec,
                speaker_label: speaker,
                speaker_confidence: tier2.confidence as f32,
                alignment_state: AlignmentState::Confident,
                alignment_method: AlignmentMethod::WordDensity,
            };
        }
    }

    let confidence = tier1.confidence.max(tier2.confidence);
    unknown_segment(text, confidence, AlignmentState::Uncertain)
}

fn unknown_segment(text: &TextSegment, confidence: f64, state: AlignmentState) -> TranscriptSegment {
    TranscriptSegment {
        text: text.text.clone(),
        audio_start_sec: text.start_sec,
        audio_end_sec: text.end_sec,
        speaker_label: UNKNOWN_SPEAKER.to_string(),
        speaker_confidence: confidence as f32,
        alignment_state: state,
        alignment_method: AlignmentMethod::Uncertain,
    }
}

/// Fuses ASR text segments and diarization speaker segments into labeled
/// transcript segments, plus aggregate confidence metrics for the run.
///
/// # Errors
/// Returns [`AlignmentError::EmptyInputs`] if `text_segments` is empty.
pub fn align(
    text_segments: &[TextSegment],
    speaker_segments: &[SpeakerSegment],
) -> Result<(Vec<TranscriptSegment>, AlignmentMetrics), AlignmentError> {
    if text_segments.is_empty() {
        return Err(AlignmentError::EmptyInputs);
    }

    let segments: Vec<TranscriptSegment> =
        text_segments.iter().map(|t| align_one(t, speaker_segments)).collect();

    let mut metrics = AlignmentMetrics { total_segments: segments.len(), ..Default::default() };
    let mut confidence_sum = 0.0;
    for seg in &segments {
        confidence_sum += f64::from(seg.speaker_confidence);
        match seg.alignment_state {
            AlignmentState::Confident => metrics.confident_count += 1,
            AlignmentState::Uncertain | AlignmentState::UnknownSpeaker => metrics.uncertain_count += 1,
            AlignmentState::Overlap => metrics.overlap_count += 1,
        }
        let method_key = match seg.alignment_method {
            AlignmentMethod::TimeOverlap => "time_overlap",
            AlignmentMethod::WordDensity => "word_density",
            AlignmentMethod::Uncertain => "uncertain",
            AlignmentMethod::Live => "live",
        };
        *metrics.method_breakdown.entry(method_key.to_string()).or_insert(0) += 1;
    }
    metrics.avg_confidence = confidence_sum / segments.len() as f64;

    Ok((segments, metrics))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(text: &str, start: f64, end: f64) -> TextSegment {
        TextSegment { text: text.to_string(), start_sec: start, end_sec: end, confidence: 0.9 }
    }

    fn speaker(label: &str, start: f64, end: f64) -> SpeakerSegment {
        SpeakerSegment { speaker_label: label.to_string(), start_sec: start, end_sec: end }
    }

    #[test]
    fn empty_text_segments_is_an_error() {
        assert!(matches!(align(&[], &[]), Err(AlignmentError::EmptyInputs)));
    }

    #[test]
    fn clean_single_speaker_segment_is_confident_time_overlap() {
        let (segs, metrics) =
            align(&[text("hello there", 0.0, 2.0)], &[speaker("Speaker 1", 0.0, 2.0)]).unwrap();
        assert_eq!(segs[0].speaker_label, "Speaker 1");
        assert_eq!(segs[0].alignment_state, AlignmentState::Confident);
        assert_eq!(segs[0].alignment_method, AlignmentMethod::TimeOverlap);
        assert_eq!(metrics.confident_count, 1);
        assert_eq!(metrics.total_segments, 1);
    }

    #[test]
    fn no_speaker_segments_yields_unknown_speaker() {
        let (segs, metrics) = align(&[text("hello there", 0.0, 2.0)], &[]).unwrap();
        assert_eq!(segs[0].speaker_label, "Unknown");
        assert_eq!(segs[0].alignment_state, AlignmentState::UnknownSpeaker);
        assert_eq!(metrics.uncertain_count, 1);
    }

    #[test]
    fn zero_duration_text_segment_is_unknown_with_zero_confidence() {
        let (segs, _) = align(&[text("hi", 1.0, 1.0)], &[speaker("Speaker 1", 0.0, 2.0)]).unwrap();
        assert_eq!(segs[0].speaker_label, "Unknown");
        assert_eq!(segs[0].alignment_state, AlignmentState::UnknownSpeaker);
        assert!((segs[0].speaker_confidence - 0.0).abs() < f32::EPSILON);
    }

    #[test]
    fn two_speakers_each_covering_a_third_of_the_segment_is_marked_overlap() {
        let (segs, metrics) = align(
            &[text("talking over each other here", 0.0, 3.0)],
            &[speaker("Speaker 1", 0.0, 3.0), speaker("Speaker 2", 0.0, 1.5)],
        )
        .unwrap();
        assert_eq!(segs[0].alignment_state, AlignmentState::Overlap);
        assert_eq!(metrics.overlap_count, 1);
    }

    #[test]
    fn word_density_resolves_a_segment_spanning_a_speaker_change() {
        // Overlap-based tier 1 is ambiguous (each speaker covers half), but
        // word density correctly attributes each half's words.
        let seg = text("one two three four five six seven eight", 0.0, 4.0);
        let speakers =
            vec![speaker("Speaker 1", 0.0, 2.0), speaker("Speaker 2", 2.0, 4.0)];
        let (segs, _) = align(&[seg], &speakers).unwrap();
        // Tier 1 overlap is 50/50 between speakers, so no single speaker
        // reaches the 0.6 accept threshold; tier 2 should resolve it only if
        // one speaker's word count reaches 70%. With an even split neither
        // tier accepts, so this should fall through to Uncertain.
        assert_eq!(segs[0].alignment_state, AlignmentState::Uncertain);
    }

    #[test]
    fn method_breakdown_tallies_by_method() {
        let (_, metrics) = align(
            &[text("hello there", 0.0, 2.0), text("goodbye now", 10.0, 12.0)],
            &[speaker("Speaker 1", 0.0, 2.0)],
        )
        .unwrap();
        assert_eq!(metrics.method_breakdown.get("time_overlap"), Some(&1));
        assert_eq!(metrics.method_breakdown.get("uncertain"), Some(&1));
    }
}
