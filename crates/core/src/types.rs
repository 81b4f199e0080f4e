// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Core domain types shared across the transcription engine's crates.
//!
//! - [`Meeting`] / [`AudioChunk`] / [`SpeakerMapping`]: persisted entities.
//! - [`TranscriptVersion`] / [`TranscriptSegment`]: the versioned transcript model.
//! - [`TextSegment`] / [`SpeakerSegment`]: the shapes exchanged with the external
//!   ASR and diarization recognizers (see `mte-asr`).

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A meeting recording. Owned and mutated by the out-of-scope external API;
/// the engine only reads `id` and `diarization_status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Meeting {
    pub id: String,
    pub owner_id: String,
    pub audio_recorded: bool,
    pub diarization_status: DiarizationStatus,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Lifecycle of the post-meeting diarization/alignment job for a meeting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DiarizationStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

/// One fixed-duration slice of raw PCM audio written by `ChunkRecorder`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioChunk {
    pub meeting_id: String,
    pub seq: u32,
    pub started_at_sec: f64,
    pub path: String,
    pub byte_count: u64,
}

/// Where a `TranscriptVersion`'s content came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum VersionSource {
    /// Produced live, incrementally, by `StreamingAsr` during the meeting.
    Live,
    /// Produced post-meeting by `AlignmentEngine` fusing `AccurateAsr` + `DiarizingAsr`.
    Diarized,
    /// Hand-edited by a user (content supplied verbatim by the external API).
    ManualEdit,
}

/// Confidence metrics summarizing an `AlignmentEngine::align` run, persisted
/// alongside a diarized `TranscriptVersion`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlignmentMetrics {
    pub total_segments: usize,
    pub confident_count: usize,
    pub uncertain_count: usize,
    pub overlap_count: usize,
    pub avg_confidence: f64,
    /// method name -> count
    pub method_breakdown: std::collections::BTreeMap<String, usize>,
}

/// An append-only version of a meeting's transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptVersion {
    pub id: String,
    pub meeting_id: String,
    pub version_num: u32,
    pub source: VersionSource,
    pub is_authoritative: bool,
    pub content: Vec<TranscriptSegment>,
    pub confidence_metrics: Option<AlignmentMetrics>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Qualitative confidence label on a segment's speaker attribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AlignmentState {
    Confident,
    Uncertain,
    Overlap,
    UnknownSpeaker,
}

/// Which tier of `AlignmentEngine` produced a segment's speaker label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AlignmentMethod {
    TimeOverlap,
    WordDensity,
    Uncertain,
    /// Assigned live, before diarization ran (no speaker attribution attempted).
    Live,
}

/// A single line of a transcript, speaker-labeled once diarization has run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub text: String,
    pub audio_start_sec: f64,
    pub audio_end_sec: f64,
    pub speaker_label: String,
    pub speaker_confidence: f32,
    pub alignment_state: AlignmentState,
    pub alignment_method: AlignmentMethod,
}

impl TranscriptSegment {
    /// `MM:SS` rendering of `audio_start_sec`, as stored in the denormalized
    /// `transcript_segments` table (see `mte-store`).
    pub fn formatted_time(&self) -> String {
        let total = self.audio_start_sec.max(0.0) as u64;
        format!("{:02}:{:02}", total / 60, total % 60)
    }
}

/// A user-facing display name mapped to a diarization speaker label.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeakerMapping {
    pub meeting_id: String,
    pub diarization_label: String,
    pub display_name: String,
}

/// A text segment as returned by `AccurateAsr::transcribe_file`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextSegment {
    pub text: String,
    pub start_sec: f64,
    pub end_sec: f64,
    pub confidence: f32,
}

/// A speaker-homogeneous time interval as returned by `DiarizingAsr::diarize`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeakerSegment {
    pub speaker_label: String,
    pub start_sec: f64,
    pub end_sec: f64,
}

/// Result of a single `StreamingAsr::transcribe` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamingAsrOutput {
    pub text: String,
    pub confidence: f32,
    /// Per-word confidence, in order; may be empty if the backend doesn't report it.
    pub word_confidences: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formatted_time_rounds_down_to_whole_seconds() {
        let seg = TranscriptSegment {
            text: "hi".into(),
            audio_start_sec: 125.9,
            audio_end_sec: 126.5,
            speaker_label: "Speaker 1".into(),
            speaker_confidence: 0.9,
            alignment_state: AlignmentState::Confident,
            alignment_method: AlignmentMethod::TimeOverlap,
        };
        assert_eq!(seg.formatted_time(), "02:05");
    }
}
