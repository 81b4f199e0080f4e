// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! The post-meeting job: merge a meeting's recorded chunks to a single WAV,
//! run the accurate recognizer and diarizer over it in parallel, fuse their
//! output with `mte_engine::align`, and append the result as a new diarized
//! transcript version.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use mte_asr::{AccurateAsr, AsrError, DiarizingAsr};
use mte_core::{DiarizationStatus, SpeakerSegment, TextSegment, VersionSource};
use mte_engine::{align, ChunkRecorder};
use mte_store::VersionStore;

use crate::config::PostProcessConfig;
use crate::error::PostProcessError;

/// Retries `op` up to `config.max_attempts` times with doubling backoff,
/// starting at `config.initial_backoff_sec`. A `Permanent` error is not
/// retried.
async fn retry_asr<T, F, Fut>(
    config: &PostProcessConfig,
    label: &str,
    mut op: F,
) -> Result<T, String>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, AsrError>>,
{
    let mut backoff = Duration::from_secs_f64(config.initial_backoff_sec);
    let mut last_err = String::new();
    for attempt in 1..=config.max_attempts {
        match op().await {
            Ok(v) => return Ok(v),
            Err(AsrError::Permanent(msg)) => {
                tracing::error!(label, attempt, error = %msg, "permanent recognizer failure");
                return Err(msg);
            },
            Err(e) => {
                last_err = e.to_string();
                tracing::warn!(label, attempt, error = %last_err, "recognizer call failed, retrying");
                if attempt < config.max_attempts {
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
            },
        }
    }
    Err(last_err)
}

/// Runs the post-meeting pipeline for `meeting_id`. `chunk_duration_sec` must
/// match the value the meeting's chunks were recorded with.
///
/// # Errors
/// Returns [`PostProcessError`] if merging, alignment, or the version-store
/// write fails. A recognizer failing after retries does not error this
/// function: it marks the meeting's `diarization_status` as `failed` and
/// returns `Ok(())`, leaving the live version authoritative.
pub async fn run(
    config: &PostProcessConfig,
    meeting_id: &str,
    accurate_asr: Arc<dyn AccurateAsr>,
    diarizing_asr: Arc<dyn DiarizingAsr>,
    store: &VersionStore,
) -> Result<(), PostProcessError> {
    store.set_diarization_status(meeting_id, DiarizationStatus::Running).await?;

    let wav_path = match ChunkRecorder::merge_to_wav(&config.data_root, meeting_id).await {
        Ok(path) => path,
        Err(e) => {
            store.set_diarization_status(meeting_id, DiarizationStatus::Failed).await?;
            return Err(e.into());
        },
    };

    let (text_result, speaker_result) =
        tokio::join!(run_accurate(config, &wav_path, accurate_asr), run_diarizing(config, &wav_path, diarizing_asr));

    let text_segments = match text_result {
        Ok(segments) => segments,
        Err(msg) => {
            store.set_diarization_status(meeting_id, DiarizationStatus::Failed).await?;
            return Err(PostProcessError::AccurateAsr(msg));
        },
    };
    let speaker_segments = match speaker_result {
        Ok(segments) => segments,
        Err(msg) => {
            store.set_diarization_status(meeting_id, DiarizationStatus::Failed).await?;
            return Err(PostProcessError::Diarization(msg));
        },
    };

    let (aligned, metrics) = match align(&text_segments, &speaker_segments) {
        Ok(v) => v,
        Err(e) => {
            store.set_diarization_status(meeting_id, DiarizationStatus::Failed).await?;
            return Err(e.into());
        },
    };

    let speaker_labels: Vec<String> = speaker_segments
        .iter()
        .map(|s| s.speaker_label.clone())
        .collect::<std::collections::BTreeSet<_>>()
        .into_iter()
        .collect();
    store.upsert_speaker_mappings(meeting_id, &speaker_labels).await?;

    let version_num = store
        .append_version(meeting_id, VersionSource::Diarized, &aligned, Some(&metrics), None)
        .await?;

    match store.maybe_auto_promote(meeting_id, version_num, &metrics).await {
        Ok(()) => tracing::info!(meeting_id, version_num, "diarized version promoted"),
        Err(mte_store::VersionStoreError::PromotionBlocked { avg_confidence, word_count_drift, .. }) => {
            tracing::info!(
                meeting_id,
                version_num,
                avg_confidence,
                word_count_drift,
                "diarized version written but not promoted; live remains authoritative"
            );
        },
        Err(e) => return Err(e.into()),
    }

    store.set_diarization_status(meeting_id, DiarizationStatus::Succeeded).await?;
    Ok(())
}

async fn run_accurate(
    config: &PostProcessConfig,
    wav_path: &Path,
    asr: Arc<dyn AccurateAsr>,
) -> Result<Vec<TextSegment>, String> {
    retry_asr(config, "accurate_asr", || {
        let asr = Arc::clone(&asr);
        let wav_path = wav_path.to_path_buf();
        async move { asr.transcribe_file(&wav_path).await }
    })
    .await
}

async fn run_diarizing(
    config: &PostProcessConfig,
    wav_path: &Path,
    asr: Arc<dyn DiarizingAsr>,
) -> Result<Vec<SpeakerSegment>, String> {
    retry_asr(config, "diarizing_asr", || {
        let asr = Arc::clone(&asr);
        let wav_path = wav_path.to_path_buf();
        async move { asr.diarize(&wav_path).await }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use mte_asr::mock::{MockAccurateAsr, MockDiarizingAsr};
    use tempfile::tempdir;

    async fn merged_meeting(data_root: &Path, meeting_id: &str) {
        let registry = mte_engine::LeaseRegistry::default();
        let mut recorder =
            ChunkRecorder::start(data_root, meeting_id, 30.0, registry).await.unwrap();
        recorder.write(&vec![0i16; 16_000], 0.0).await.unwrap();
        recorder.close().await.unwrap();
    }

    #[tokio::test]
    async fn successful_run_writes_diarized_version_and_marks_succeeded() {
        let dir = tempdir().unwrap();
        merged_meeting(dir.path(), "m1").await;
        let store = VersionStore::connect("sqlite::memory:").await.unwrap();

        let accurate = Arc::new(MockAccurateAsr::new(vec![TextSegment {
            text: "hello there".to_string(),
            start_sec: 0.0,
            end_sec: 1.0,
            confidence: 0.9,
        }]));
        let diarizing = Arc::new(MockDiarizingAsr::new(vec![SpeakerSegment {
            speaker_label: "Speaker 1".to_string(),
            start_sec: 0.0,
            end_sec: 1.0,
        }]));

        let config = PostProcessConfig { data_root: dir.path().to_path_buf(), ..Default::default() };
        run(&config, "m1", accurate, diarizing, &store).await.unwrap();

        let versions = store.list("m1").await.unwrap();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].source, VersionSource::Diarized);
    }

    #[tokio::test]
    async fn permanent_accurate_asr_failure_marks_meeting_failed_without_writing_a_version() {
        let dir = tempdir().unwrap();
        merged_meeting(dir.path(), "m1").await;
        let store = VersionStore::connect("sqlite::memory:").await.unwrap();

        struct AlwaysFails;
        #[async_trait::async_trait]
        impl AccurateAsr for AlwaysFails {
            async fn transcribe_file(&self, _wav_path: &Path) -> Result<Vec<TextSegment>, AsrError> {
                Err(AsrError::Permanent("model unavailable".to_string()))
            }
        }

        let accurate = Arc::new(AlwaysFails);
        let diarizing = Arc::new(MockDiarizingAsr::new(vec![]));

        let config = PostProcessConfig { data_root: dir.path().to_path_buf(), ..Default::default() };
        let result = run(&config, "m1", accurate, diarizing, &store).await;
        assert!(matches!(result, Err(PostProcessError::AccurateAsr(_))));
        assert_eq!(store.list("m1").await.unwrap().len(), 0);
    }
}
