// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Append-only versioned transcript storage, backed by SQLite via `sqlx`.
//!
//! Every alignment run or manual edit appends a new [`mte_core::TranscriptVersion`]
//! rather than overwriting the previous one; [`VersionStore::promote`] is the only
//! operation that changes which version is authoritative.

mod error;
mod schema;

pub use error::{Result, VersionStoreError};

use chrono::Utc;
use mte_core::{AlignmentMetrics, AudioChunk, TranscriptSegment, TranscriptVersion, VersionSource};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};

pub const AUTO_PROMOTE_MIN_AVG_CONFIDENCE: f64 = 0.75;
pub const AUTO_PROMOTE_MAX_WORD_COUNT_DRIFT: f64 = 0.05;

#[derive(Clone)]
pub struct VersionStore {
    pool: SqlitePool,
}

fn source_str(source: VersionSource) -> &'static str {
    match source {
        VersionSource::Live => "live",
        VersionSource::Diarized => "diarized",
        VersionSource::ManualEdit => "manual_edit",
    }
}

fn source_from_str(s: &str) -> VersionSource {
    match s {
        "diarized" => VersionSource::Diarized,
        "manual_edit" => VersionSource::ManualEdit,
        _ => VersionSource::Live,
    }
}

fn diarization_status_str(status: mte_core::DiarizationStatus) -> &'static str {
    match status {
        mte_core::DiarizationStatus::Pending => "pending",
        mte_core::DiarizationStatus::Running => "running",
        mte_core::DiarizationStatus::Succeeded => "succeeded",
        mte_core::DiarizationStatus::Failed => "failed",
    }
}

impl VersionStore {
    /// Opens (creating if absent) the SQLite database at `database_url`
    /// (e.g. `sqlite://data/engine.db`) and ensures the schema exists.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new().max_connections(5).connect(database_url).await?;
        schema::ensure_schema(&pool).await?;
        Ok(Self { pool })
    }

    /// Wraps an already-open pool; used by tests and by deployments that
    /// share a pool across `mte-store` and other crates.
    #[must_use]
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Appends a new version for `meeting_id`. `idempotency_key`, when
    /// supplied, makes repeat calls with the same key no-ops that return the
    /// already-stored version number.
    ///
    /// # Errors
    /// Returns [`VersionStoreError::Database`] on any SQL failure.
    pub async fn append_version(
        &self,
        meeting_id: &str,
        source: VersionSource,
        content: &[TranscriptSegment],
        confidence_metrics: Option<&AlignmentMetrics>,
        idempotency_key: Option<&str>,
    ) -> Result<u32> {
        let mut tx = self.pool.begin().await?;

        if let Some(key) = idempotency_key {
            let existing = sqlx::query(
                "SELECT version_num FROM transcript_versions WHERE meeting_id = ? AND idempotency_key = ?",
            )
            .bind(meeting_id)
            .bind(key)
            .fetch_optional(&mut *tx)
            .await?;
            if let Some(row) = existing {
                let version_num: i64 = row.get("version_num");
                tx.commit().await?;
                return Ok(u32::try_from(version_num).unwrap_or(u32::MAX));
            }
        }

        let current_max: Option<i64> =
            sqlx::query_scalar("SELECT MAX(version_num) FROM transcript_versions WHERE meeting_id = ?")
                .bind(meeting_id)
                .fetch_one(&mut *tx)
                .await?;
        let version_num = current_max.unwrap_or(0) + 1;

        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        let content_json = serde_json::to_string(content)?;
        let metrics_json =
            confidence_metrics.map(serde_json::to_string).transpose()?;

        sqlx::query(
            "INSERT INTO transcript_versions
               (id, meeting_id, version_num, source, content_json, is_authoritative, created_at, confidence_metrics_json, idempotency_key)
             VALUES (?, ?, ?, ?, ?, 0, ?, ?, ?)",
        )
        .bind(&id)
        .bind(meeting_id)
        .bind(version_num)
        .bind(source_str(source))
        .bind(&content_json)
        .bind(now)
        .bind(&metrics_json)
        .bind(idempotency_key)
        .execute(&mut *tx)
        .await?;

        for (seq, segment) in content.iter().enumerate() {
            sqlx::query(
                "INSERT INTO transcript_segments
                   (version_id, seq, text, audio_start_time_raw, audio_end_time_raw, formatted_time,
                    speaker_label, speaker_confidence, alignment_state, alignment_method)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&id)
            .bind(i64::try_from(seq).unwrap_or(i64::MAX))
            .bind(&segment.text)
            .bind(segment.audio_start_sec)
            .bind(segment.audio_end_sec)
            .bind(segment.formatted_time())
            .bind(&segment.speaker_label)
            .bind(f64::from(segment.speaker_confidence))
            .bind(format!("{:?}", segment.alignment_state))
            .bind(format!("{:?}", segment.alignment_method))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(u32::try_from(version_num).unwrap_or(u32::MAX))
    }

    /// Sets `version_num` as the sole authoritative version for `meeting_id`.
    ///
    /// # Errors
    /// Returns [`VersionStoreError::Database`] on any SQL failure.
    pub async fn promote(&self, meeting_id: &str, version_num: u32) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE transcript_versions SET is_authoritative = 0 WHERE meeting_id = ?")
            .bind(meeting_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "UPDATE transcript_versions SET is_authoritative = 1 WHERE meeting_id = ? AND version_num = ?",
        )
        .bind(meeting_id)
        .bind(version_num)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Applies the auto-promotion policy to a freshly-appended diarized
    /// version: promotes it if `avg_confidence >= 0.75` and its word count is
    /// within 5% of the latest live version's word count. The live version
    /// remains authoritative otherwise.
    ///
    /// # Errors
    /// Returns [`VersionStoreError::PromotionBlocked`] when the policy
    /// declines to promote, after persisting the version regardless.
    /// Returns [`VersionStoreError::Database`] on any SQL failure.
    pub async fn maybe_auto_promote(
        &self,
        meeting_id: &str,
        version_num: u32,
        metrics: &AlignmentMetrics,
    ) -> Result<()> {
        let versions = self.list(meeting_id).await?;
        let latest_live_word_count = versions
            .iter()
            .filter(|v| v.source == VersionSource::Live)
            .max_by_key(|v| v.version_num)
            .map(|v| word_count(&v.content))
            .unwrap_or(0);
        let candidate = versions.iter().find(|v| v.version_num == version_num);
        let candidate_word_count = candidate.map(|v| word_count(&v.content)).unwrap_or(0);

        let drift = if latest_live_word_count == 0 {
            0.0
        } else {
            (candidate_word_count as f64 - latest_live_word_count as f64).abs()
                / latest_live_word_count as f64
        };

        if metrics.avg_confidence >= AUTO_PROMOTE_MIN_AVG_CONFIDENCE
            && drift <= AUTO_PROMOTE_MAX_WORD_COUNT_DRIFT
        {
            self.promote(meeting_id, version_num).await?;
            Ok(())
        } else {
            Err(VersionStoreError::PromotionBlocked {
                version_num,
                avg_confidence: metrics.avg_confidence,
                word_count_drift: drift,
            })
        }
    }

    /// Appends one committed-final segment to `meeting_id`'s live version,
    /// creating that version (as version 1, or the next free version number)
    /// on its first call for a meeting. Unlike [`Self::append_version`], this
    /// mutates the live version's content in place rather than creating a
    /// new version per call, so the live version accumulates exactly one
    /// copy of each final over the life of the meeting.
    ///
    /// # Errors
    /// Returns [`VersionStoreError::Database`] or [`VersionStoreError::Serialization`]
    /// on malformed stored JSON.
    pub async fn append_live_segment(
        &self,
        meeting_id: &str,
        segment: &TranscriptSegment,
    ) -> Result<u32> {
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query(
            "SELECT id, version_num, content_json FROM transcript_versions
             WHERE meeting_id = ? AND source = 'live'",
        )
        .bind(meeting_id)
        .fetch_optional(&mut *tx)
        .await?;

        let (version_id, version_num, mut content) = match existing {
            Some(row) => {
                let content_json: String = row.get("content_json");
                let content: Vec<TranscriptSegment> = serde_json::from_str(&content_json)?;
                (row.get::<String, _>("id"), row.get::<i64, _>("version_num"), content)
            },
            None => {
                let current_max: Option<i64> = sqlx::query_scalar(
                    "SELECT MAX(version_num) FROM transcript_versions WHERE meeting_id = ?",
                )
                .bind(meeting_id)
                .fetch_one(&mut *tx)
                .await?;
                let version_num = current_max.unwrap_or(0) + 1;
                let id = uuid::Uuid::new_v4().to_string();
                let now = Utc::now();
                sqlx::query(
                    "INSERT INTO transcript_versions
                       (id, meeting_id, version_num, source, content_json, is_authoritative, created_at)
                     VALUES (?, ?, ?, 'live', '[]', 0, ?)",
                )
                .bind(&id)
                .bind(meeting_id)
                .bind(version_num)
                .bind(now)
                .execute(&mut *tx)
                .await?;
                (id, version_num, Vec::new())
            },
        };

        let next_seq = content.len();
        content.push(segment.clone());
        let content_json = serde_json::to_string(&content)?;
        sqlx::query("UPDATE transcript_versions SET content_json = ? WHERE id = ?")
            .bind(&content_json)
            .bind(&version_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO transcript_segments
               (version_id, seq, text, audio_start_time_raw, audio_end_time_raw, formatted_time,
                speaker_label, speaker_confidence, alignment_state, alignment_method)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&version_id)
        .bind(i64::try_from(next_seq).unwrap_or(i64::MAX))
        .bind(&segment.text)
        .bind(segment.audio_start_sec)
        .bind(segment.audio_end_sec)
        .bind(segment.formatted_time())
        .bind(&segment.speaker_label)
        .bind(f64::from(segment.speaker_confidence))
        .bind(format!("{:?}", segment.alignment_state))
        .bind(format!("{:?}", segment.alignment_method))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(u32::try_from(version_num).unwrap_or(u32::MAX))
    }

    /// Lists all versions for `meeting_id`, ordered by `version_num`.
    ///
    /// # Errors
    /// Returns [`VersionStoreError::Database`] or [`VersionStoreError::Serialization`]
    /// on malformed stored JSON.
    pub async fn list(&self, meeting_id: &str) -> Result<Vec<TranscriptVersion>> {
        let rows = sqlx::query(
            "SELECT id, meeting_id, version_num, source, content_json, is_authoritative, created_at, confidence_metrics_json
             FROM transcript_versions WHERE meeting_id = ? ORDER BY version_num",
        )
        .bind(meeting_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_version).collect()
    }

    /// Updates `meetings.diarization_status`, the one field of a meeting's
    /// record this crate writes (the rest is owned by the external API).
    /// Used by `PostProcessor` to report job progress and failure.
    ///
    /// # Errors
    /// Returns [`VersionStoreError::Database`] on any SQL failure.
    pub async fn set_diarization_status(
        &self,
        meeting_id: &str,
        status: mte_core::DiarizationStatus,
    ) -> Result<()> {
        sqlx::query("UPDATE meetings SET diarization_status = ? WHERE id = ?")
            .bind(diarization_status_str(status))
            .bind(meeting_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Persists one fixed-duration `ChunkRecorder` chunk's metadata, keyed on
    /// `(meeting_id, seq)`; re-recording the same sequence number overwrites
    /// it.
    ///
    /// # Errors
    /// Returns [`VersionStoreError::Database`] on any SQL failure.
    pub async fn append_audio_chunk(&self, chunk: &AudioChunk) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO audio_chunks (meeting_id, seq, started_at_sec, path, byte_count)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&chunk.meeting_id)
        .bind(i64::from(chunk.seq))
        .bind(chunk.started_at_sec)
        .bind(&chunk.path)
        .bind(i64::try_from(chunk.byte_count).unwrap_or(i64::MAX))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Creates a [`mte_core::SpeakerMapping`] row for each label in
    /// `speaker_labels` not already mapped, defaulting `display_name` to the
    /// raw diarization label until a user renames it. Called once per
    /// meeting, on its first successful diarization; re-running diarization
    /// never overwrites a mapping a user has since renamed.
    ///
    /// # Errors
    /// Returns [`VersionStoreError::Database`] on any SQL failure.
    pub async fn upsert_speaker_mappings(&self, meeting_id: &str, speaker_labels: &[String]) -> Result<()> {
        for label in speaker_labels {
            sqlx::query(
                "INSERT OR IGNORE INTO speaker_mappings (meeting_id, diarization_label, display_name)
                 VALUES (?, ?, ?)",
            )
            .bind(meeting_id)
            .bind(label)
            .bind(label)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    /// Checks that the pool can still serve a trivial query, for use by a
    /// `/readyz` probe.
    ///
    /// # Errors
    /// Returns [`VersionStoreError::Database`] if the connection is unusable.
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Returns the current authoritative version for `meeting_id`, if any.
    ///
    /// # Errors
    /// Returns [`VersionStoreError::Database`] or [`VersionStoreError::Serialization`]
    /// on malformed stored JSON.
    pub async fn get_authoritative(&self, meeting_id: &str) -> Result<Option<TranscriptVersion>> {
        let row = sqlx::query(
            "SELECT id, meeting_id, version_num, source, content_json, is_authoritative, created_at, confidence_metrics_json
             FROM transcript_versions WHERE meeting_id = ? AND is_authoritative = 1",
        )
        .bind(meeting_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_version).transpose()
    }
}

fn word_count(segments: &[TranscriptSegment]) -> usize {
    segments.iter().map(|s| s.text.split_whitespace().count()).sum()
}

fn row_to_version(row: sqlx::sqlite::SqliteRow) -> Result<TranscriptVersion> {
    let content_json: String = row.get("content_json");
    let metrics_json: Option<String> = row.get("confidence_metrics_json");
    let version_num: i64 = row.get("version_num");
    Ok(TranscriptVersion {
        id: row.get("id"),
        meeting_id: row.get("meeting_id"),
        version_num: u32::try_from(version_num).unwrap_or(u32::MAX),
        source: source_from_str(&row.get::<String, _>("source")),
        is_authoritative: row.get::<i64, _>("is_authoritative") != 0,
        content: serde_json::from_str(&content_json)?,
        confidence_metrics: metrics_json.map(|s| serde_json::from_str(&s)).transpose()?,
        created_at: row.get("created_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mte_core::{AlignmentMethod, AlignmentState};

    async fn store() -> VersionStore {
        VersionStore::connect("sqlite::memory:").await.unwrap()
    }

    fn segment(text: &str, speaker: &str) -> TranscriptSegment {
        TranscriptSegment {
            text: text.to_string(),
            audio_start_sec: 0.0,
            audio_end_sec: 1.0,
            speaker_label: speaker.to_string(),
            speaker_confidence: 0.9,
            alignment_state: AlignmentState::Confident,
            alignment_method: AlignmentMethod::TimeOverlap,
        }
    }

    #[tokio::test]
    async fn append_assigns_sequential_version_numbers() {
        let store = store().await;
        let v1 = store
            .append_version("m1", VersionSource::Live, &[segment("hi", "Speaker 1")], None, None)
            .await
            .unwrap();
        let v2 = store
            .append_version("m1", VersionSource::Live, &[segment("hi again", "Speaker 1")], None, None)
            .await
            .unwrap();
        assert_eq!(v1, 1);
        assert_eq!(v2, 2);
    }

    #[tokio::test]
    async fn idempotency_key_prevents_duplicate_append() {
        let store = store().await;
        let v1 = store
            .append_version(
                "m1",
                VersionSource::Live,
                &[segment("hi", "Speaker 1")],
                None,
                Some("job-1"),
            )
            .await
            .unwrap();
        let v2 = store
            .append_version(
                "m1",
                VersionSource::Live,
                &[segment("hi", "Speaker 1")],
                None,
                Some("job-1"),
            )
            .await
            .unwrap();
        assert_eq!(v1, v2);
        assert_eq!(store.list("m1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn promote_makes_exactly_one_version_authoritative() {
        let store = store().await;
        store
            .append_version("m1", VersionSource::Live, &[segment("hi", "Speaker 1")], None, None)
            .await
            .unwrap();
        store
            .append_version("m1", VersionSource::Diarized, &[segment("hi", "Speaker 1")], None, None)
            .await
            .unwrap();
        store.promote("m1", 2).await.unwrap();
        let authoritative = store.get_authoritative("m1").await.unwrap().unwrap();
        assert_eq!(authoritative.version_num, 2);
    }

    #[tokio::test]
    async fn auto_promote_blocked_when_confidence_too_low() {
        let store = store().await;
        store
            .append_version("m1", VersionSource::Live, &[segment("hi there friend", "Speaker 1")], None, None)
            .await
            .unwrap();
        let v2 = store
            .append_version("m1", VersionSource::Diarized, &[segment("hi there friend", "Speaker 1")], None, None)
            .await
            .unwrap();
        let metrics = AlignmentMetrics { avg_confidence: 0.5, ..Default::default() };
        let result = store.maybe_auto_promote("m1", v2, &metrics).await;
        assert!(matches!(result, Err(VersionStoreError::PromotionBlocked { .. })));
        assert!(store.get_authoritative("m1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn auto_promote_succeeds_when_confident_and_word_count_matches() {
        let store = store().await;
        store
            .append_version("m1", VersionSource::Live, &[segment("hi there friend", "Speaker 1")], None, None)
            .await
            .unwrap();
        let v2 = store
            .append_version("m1", VersionSource::Diarized, &[segment("hi there friend", "Speaker 1")], None, None)
            .await
            .unwrap();
        let metrics = AlignmentMetrics { avg_confidence: 0.9, ..Default::default() };
        store.maybe_auto_promote("m1", v2, &metrics).await.unwrap();
        let authoritative = store.get_authoritative("m1").await.unwrap().unwrap();
        assert_eq!(authoritative.version_num, v2);
    }

    #[tokio::test]
    async fn append_live_segment_accumulates_into_a_single_live_version() {
        let store = store().await;
        store.append_live_segment("m1", &segment("hello", "Unknown")).await.unwrap();
        store.append_live_segment("m1", &segment("there", "Unknown")).await.unwrap();

        let versions = store.list("m1").await.unwrap();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].source, VersionSource::Live);
        assert_eq!(versions[0].content.len(), 2);
        assert_eq!(versions[0].content[0].text, "hello");
        assert_eq!(versions[0].content[1].text, "there");
    }

    #[tokio::test]
    async fn append_audio_chunk_is_idempotent_per_sequence_number() {
        let store = store().await;
        let chunk = AudioChunk {
            meeting_id: "m1".to_string(),
            seq: 0,
            started_at_sec: 0.0,
            path: "m1/chunk_00000.pcm".to_string(),
            byte_count: 32_000,
        };
        store.append_audio_chunk(&chunk).await.unwrap();
        store.append_audio_chunk(&chunk).await.unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM audio_chunks WHERE meeting_id = 'm1'")
            .fetch_one(&store.pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn upsert_speaker_mappings_does_not_clobber_a_renamed_mapping() {
        let store = store().await;
        store
            .upsert_speaker_mappings("m1", &["Speaker 1".to_string(), "Speaker 2".to_string()])
            .await
            .unwrap();
        sqlx::query(
            "UPDATE speaker_mappings SET display_name = 'Alice' WHERE meeting_id = 'm1' AND diarization_label = 'Speaker 1'",
        )
        .execute(&store.pool)
        .await
        .unwrap();

        // Re-running diarization calls this again with the same labels.
        store
            .upsert_speaker_mappings("m1", &["Speaker 1".to_string(), "Speaker 2".to_string()])
            .await
            .unwrap();

        let display_name: String = sqlx::query_scalar(
            "SELECT display_name FROM speaker_mappings WHERE meeting_id = 'm1' AND diarization_label = 'Speaker 1'",
        )
        .fetch_one(&store.pool)
        .await
        .unwrap();
        assert_eq!(display_name, "Alice");
    }

    #[tokio::test]
    async fn set_diarization_status_updates_existing_meeting_row() {
        let store = store().await;
        sqlx::query(
            "INSERT INTO meetings (id, owner_id, audio_recorded, diarization_status, created_at)
             VALUES ('m1', 'owner', 1, 'pending', datetime('now'))",
        )
        .execute(&store.pool)
        .await
        .unwrap();

        store.set_diarization_status("m1", mte_core::DiarizationStatus::Failed).await.unwrap();

        let row = sqlx::query("SELECT diarization_status FROM meetings WHERE id = 'm1'")
            .fetch_one(&store.pool)
            .await
            .unwrap();
        let status: String = row.get("diarization_status");
        assert_eq!(status, "failed");
    }
}
