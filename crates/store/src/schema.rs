// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Schema bootstrap. Tables are created with plain `CREATE TABLE IF NOT
//! EXISTS` statements at pool creation time rather than a separate
//! migrations directory, matching the retrieval pack's SQLite-backed
//! meeting apps.

use sqlx::SqlitePool;

use crate::error::Result;

pub(crate) async fn ensure_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS meetings (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            audio_recorded INTEGER NOT NULL DEFAULT 0,
            diarization_status TEXT NOT NULL DEFAULT 'pending',
            created_at TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS audio_chunks (
            meeting_id TEXT NOT NULL,
            seq INTEGER NOT NULL,
            started_at_sec REAL NOT NULL,
            path TEXT NOT NULL,
            byte_count INTEGER NOT NULL,
            UNIQUE(meeting_id, seq)
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS transcript_versions (
            id TEXT PRIMARY KEY,
            meeting_id TEXT NOT NULL,
            version_num INTEGER NOT NULL,
            source TEXT NOT NULL,
            content_json TEXT NOT NULL,
            is_authoritative INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            confidence_metrics_json TEXT,
            idempotency_key TEXT,
            UNIQUE(meeting_id, version_num)
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_transcript_versions_idempotency
         ON transcript_versions(meeting_id, idempotency_key)
         WHERE idempotency_key IS NOT NULL",
    )
    .execute(pool)
    .await?;

    // SQLite partial unique index enforces at most one authoritative version
    // per meeting at the schema level, in addition to `promote`'s transaction.
    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_transcript_versions_authoritative
         ON transcript_versions(meeting_id)
         WHERE is_authoritative = 1",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS transcript_segments (
            version_id TEXT NOT NULL,
            seq INTEGER NOT NULL,
            text TEXT NOT NULL,
            audio_start_time_raw REAL NOT NULL,
            audio_end_time_raw REAL NOT NULL,
            formatted_time TEXT NOT NULL,
            speaker_label TEXT NOT NULL,
            speaker_confidence REAL NOT NULL,
            alignment_state TEXT NOT NULL,
            alignment_method TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS speaker_mappings (
            meeting_id TEXT NOT NULL,
            diarization_label TEXT NOT NULL,
            display_name TEXT NOT NULL,
            UNIQUE(meeting_id, diarization_label)
        )",
    )
    .execute(pool)
    .await?;

    Ok(())
}
