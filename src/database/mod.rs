pub mod models;


use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use uuid::Uuid;

use crate::error::StoreError;

pub use models::*;

type Result<T> = std::result::Result<T, StoreError>;

pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn new(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)?;

        // WAL for concurrent readers; foreign_keys is off by default
        // in SQLite and the cascade rules depend on it
        conn.execute_batch(
            "
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            PRAGMA foreign_keys=ON;
            PRAGMA cache_size=10000;
            PRAGMA temp_store=MEMORY;
        ",
        )?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.init_schema()?;

        Ok(db)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS podcasts (
                id TEXT PRIMARY KEY,
                filename TEXT NOT NULL,
                original_filename TEXT,
                file_size INTEGER NOT NULL,
                duration REAL,
                language TEXT NOT NULL DEFAULT 'en',
                upload_date TEXT NOT NULL DEFAULT (datetime('now')),
                file_path TEXT NOT NULL,
                transcript_path TEXT,
                status TEXT NOT NULL DEFAULT 'uploaded',
                error_message TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_podcasts_status ON podcasts(status);
            CREATE INDEX IF NOT EXISTS idx_podcasts_upload_date
                ON podcasts(upload_date DESC);

            CREATE TABLE IF NOT EXISTS analyses (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                podcast_id TEXT NOT NULL,
                sentiment_positive_pct REAL NOT NULL,
                sentiment_neutral_pct REAL NOT NULL,
                sentiment_negative_pct REAL NOT NULL,
                sentiment_score REAL NOT NULL,
                dominant_tone TEXT NOT NULL,
                tone_calm_pct REAL NOT NULL,
                tone_aggressive_pct REAL NOT NULL,
                tone_persuasive_pct REAL NOT NULL,
                tone_anxious_pct REAL NOT NULL,
                tone_confident_pct REAL NOT NULL,
                tone_excited_pct REAL NOT NULL,
                bias_score INTEGER NOT NULL,
                bias_level TEXT NOT NULL,
                bias_flags_count INTEGER NOT NULL DEFAULT 0,
                processing_time REAL,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                result_json_path TEXT,
                FOREIGN KEY (podcast_id) REFERENCES podcasts(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_analyses_podcast ON analyses(podcast_id);

            CREATE TABLE IF NOT EXISTS bias_flags (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                analysis_id INTEGER NOT NULL,
                phrase TEXT NOT NULL,
                category TEXT NOT NULL,
                severity TEXT NOT NULL,
                sentence TEXT,
                context TEXT,
                timestamp TEXT NOT NULL,
                timestamp_seconds REAL NOT NULL,
                FOREIGN KEY (analysis_id) REFERENCES analyses(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_bias_flags_analysis ON bias_flags(analysis_id);
        "#,
        )?;

        Ok(())
    }

    // =========================================================================
    // Podcasts
    // =========================================================================

    /// Register an uploaded podcast. Returns the podcast id (the
    /// caller-supplied UUID, or a fresh v4 when none was given).
    pub fn create_podcast(&self, new: &NewPodcast) -> Result<String> {
        validate_new_podcast(new)?;

        let id = match &new.id {
            Some(id) => {
                Uuid::parse_str(id).map_err(|_| {
                    StoreError::Validation(format!("podcast id '{}' is not a valid UUID", id))
                })?;
                id.clone()
            }
            None => Uuid::new_v4().to_string(),
        };
        let language = new.language.as_deref().unwrap_or("en");
        let upload_date = new
            .upload_date
            .unwrap_or_else(chrono::Utc::now)
            .to_rfc3339();

        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO podcasts (id, filename, original_filename, file_size, duration,
                                   language, upload_date, file_path, transcript_path, status)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 'uploaded')",
            params![
                id,
                new.filename,
                new.original_filename,
                new.file_size,
                new.duration,
                language,
                upload_date,
                new.file_path,
                new.transcript_path,
            ],
        )
        .map_err(|e| map_constraint(e, || format!("podcast id '{}' already exists", id)))?;

        log::info!("Registered podcast {} ({})", id, new.filename);
        Ok(id)
    }

    pub fn get_podcast(&self, id: &str) -> Result<Podcast> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            &format!("SELECT {} FROM podcasts WHERE id = ?", PODCAST_COLUMNS),
            params![id],
            podcast_from_row,
        )
        .optional()?
        .ok_or_else(|| StoreError::NotFound(format!("podcast '{}'", id)))
    }

    /// All podcasts, newest upload first, optionally filtered by status.
    pub fn list_podcasts(&self, status: Option<PodcastStatus>) -> Result<Vec<Podcast>> {
        let conn = self.conn.lock().unwrap();
        let podcasts = match status {
            Some(status) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM podcasts WHERE status = ?
                     ORDER BY upload_date DESC, id DESC",
                    PODCAST_COLUMNS
                ))?;
                let rows = stmt.query_map(params![status.as_str()], podcast_from_row)?;
                rows.collect::<std::result::Result<Vec<_>, _>>()?
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM podcasts ORDER BY upload_date DESC, id DESC",
                    PODCAST_COLUMNS
                ))?;
                let rows = stmt.query_map([], podcast_from_row)?;
                rows.collect::<std::result::Result<Vec<_>, _>>()?
            }
        };
        Ok(podcasts)
    }

    /// The `limit` most recently uploaded podcasts.
    pub fn get_recent_podcasts(&self, limit: i64) -> Result<Vec<Podcast>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM podcasts ORDER BY upload_date DESC, id DESC LIMIT ?",
            PODCAST_COLUMNS
        ))?;
        let rows = stmt.query_map(params![limit], podcast_from_row)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    /// Advance a podcast along its processing lifecycle.
    ///
    /// `error_message` must be supplied when (and only when) the new
    /// status is `failed`; it is cleared on every other transition.
    pub fn update_podcast_status(
        &self,
        id: &str,
        new_status: PodcastStatus,
        error_message: Option<&str>,
    ) -> Result<()> {
        match (new_status, error_message) {
            (PodcastStatus::Failed, None) => {
                return Err(StoreError::Validation(
                    "error_message is required when marking a podcast failed".into(),
                ))
            }
            (PodcastStatus::Failed, Some(_)) => {}
            (_, Some(_)) => {
                return Err(StoreError::Validation(format!(
                    "error_message is only allowed with status 'failed', not '{}'",
                    new_status
                )))
            }
            (_, None) => {}
        }

        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let current: String = tx
            .query_row(
                "SELECT status FROM podcasts WHERE id = ?",
                params![id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound(format!("podcast '{}'", id)))?;
        let current = PodcastStatus::from_str(&current)
            .map_err(|_| StoreError::Integrity(format!("stored status '{}' is invalid", current)))?;

        if !current.can_transition_to(new_status) {
            return Err(StoreError::InvalidTransition(format!(
                "podcast '{}': {} -> {}",
                id, current, new_status
            )));
        }

        tx.execute(
            "UPDATE podcasts SET status = ?, error_message = ? WHERE id = ?",
            params![new_status.as_str(), error_message, id],
        )?;
        tx.commit()?;

        log::info!("Podcast {} moved {} -> {}", id, current, new_status);
        Ok(())
    }

    /// Delete a podcast and, through the cascade rules, every analysis
    /// and bias flag that belongs to it.
    pub fn delete_podcast(&self, id: &str) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let deleted = tx.execute("DELETE FROM podcasts WHERE id = ?", params![id])?;
        if deleted == 0 {
            return Err(StoreError::NotFound(format!("podcast '{}'", id)));
        }
        tx.commit()?;

        log::info!("Deleted podcast {} and its analysis subtree", id);
        Ok(())
    }

    // =========================================================================
    // Analyses
    // =========================================================================

    /// Persist one scoring run: the aggregate metrics plus all bias
    /// flags, in a single transaction. Returns the new analysis id.
    pub fn record_analysis(
        &self,
        podcast_id: &str,
        metrics: &NewAnalysis,
        flags: &[NewBiasFlag],
    ) -> Result<i64> {
        validate_metrics(metrics)?;
        for flag in flags {
            validate_flag(flag)?;
        }

        let created_at = chrono::Utc::now().to_rfc3339();

        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let exists: Option<i64> = tx
            .query_row(
                "SELECT 1 FROM podcasts WHERE id = ?",
                params![podcast_id],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_none() {
            return Err(StoreError::NotFound(format!("podcast '{}'", podcast_id)));
        }

        tx.execute(
            "INSERT INTO analyses (
                podcast_id,
                sentiment_positive_pct, sentiment_neutral_pct, sentiment_negative_pct,
                sentiment_score,
                dominant_tone,
                tone_calm_pct, tone_aggressive_pct, tone_persuasive_pct,
                tone_anxious_pct, tone_confident_pct, tone_excited_pct,
                bias_score, bias_level, bias_flags_count,
                processing_time, created_at, result_json_path
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                podcast_id,
                metrics.sentiment_positive_pct,
                metrics.sentiment_neutral_pct,
                metrics.sentiment_negative_pct,
                metrics.sentiment_score,
                metrics.dominant_tone,
                metrics.tone_calm_pct,
                metrics.tone_aggressive_pct,
                metrics.tone_persuasive_pct,
                metrics.tone_anxious_pct,
                metrics.tone_confident_pct,
                metrics.tone_excited_pct,
                metrics.bias_score,
                metrics.bias_level.as_str(),
                flags.len() as i64,
                metrics.processing_time,
                created_at,
                metrics.result_json_path,
            ],
        )?;
        let analysis_id = tx.last_insert_rowid();

        insert_flags(&tx, analysis_id, flags)?;

        tx.commit()?;

        log::info!(
            "Recorded analysis {} for podcast {} ({} bias flags)",
            analysis_id,
            podcast_id,
            flags.len()
        );
        Ok(analysis_id)
    }

    /// Every analysis recorded for a podcast, oldest first, so the
    /// latest run is the last element. Empty for an unknown id.
    pub fn get_analyses_for_podcast(&self, podcast_id: &str) -> Result<Vec<Analysis>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, podcast_id,
                    sentiment_positive_pct, sentiment_neutral_pct, sentiment_negative_pct,
                    sentiment_score, dominant_tone,
                    tone_calm_pct, tone_aggressive_pct, tone_persuasive_pct,
                    tone_anxious_pct, tone_confident_pct, tone_excited_pct,
                    bias_score, bias_level, bias_flags_count,
                    processing_time, created_at, result_json_path
             FROM analyses
             WHERE podcast_id = ?
             ORDER BY created_at ASC, id ASC",
        )?;
        let rows = stmt.query_map(params![podcast_id], analysis_from_row)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    /// Bias flags for one analysis, ordered by position in the audio.
    pub fn get_flags_for_analysis(&self, analysis_id: i64) -> Result<Vec<BiasFlag>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, analysis_id, phrase, category, severity,
                    sentence, context, timestamp, timestamp_seconds
             FROM bias_flags
             WHERE analysis_id = ?
             ORDER BY timestamp_seconds ASC, id ASC",
        )?;
        let rows = stmt.query_map(params![analysis_id], flag_from_row)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    // =========================================================================
    // Stats
    // =========================================================================

    pub fn get_statistics(&self) -> Result<StoreStats> {
        let conn = self.conn.lock().unwrap();

        let total_podcasts: i64 =
            conn.query_row("SELECT COUNT(*) FROM podcasts", [], |row| row.get(0))?;
        let total_analyses: i64 =
            conn.query_row("SELECT COUNT(*) FROM analyses", [], |row| row.get(0))?;
        let avg_bias_score: f64 = conn.query_row(
            "SELECT COALESCE(AVG(bias_score), 0) FROM analyses",
            [],
            |row| row.get(0),
        )?;
        let avg_sentiment_score: f64 = conn.query_row(
            "SELECT COALESCE(AVG(sentiment_score), 0) FROM analyses",
            [],
            |row| row.get(0),
        )?;

        Ok(StoreStats {
            total_podcasts,
            total_analyses,
            avg_bias_score,
            avg_sentiment_score,
        })
    }
}

// =============================================================================
// Row mapping
// =============================================================================

const PODCAST_COLUMNS: &str = "id, filename, original_filename, file_size, duration, \
     language, upload_date, file_path, transcript_path, status, error_message";

fn podcast_from_row(row: &Row) -> rusqlite::Result<Podcast> {
    let status: String = row.get(9)?;
    Ok(Podcast {
        id: row.get(0)?,
        filename: row.get(1)?,
        original_filename: row.get(2)?,
        file_size: row.get(3)?,
        duration: row.get(4)?,
        language: row.get(5)?,
        upload_date: row.get(6)?,
        file_path: row.get(7)?,
        transcript_path: row.get(8)?,
        status: parse_column(9, &status)?,
        error_message: row.get(10)?,
    })
}

fn analysis_from_row(row: &Row) -> rusqlite::Result<Analysis> {
    let level: String = row.get(14)?;
    Ok(Analysis {
        id: row.get(0)?,
        podcast_id: row.get(1)?,
        sentiment_positive_pct: row.get(2)?,
        sentiment_neutral_pct: row.get(3)?,
        sentiment_negative_pct: row.get(4)?,
        sentiment_score: row.get(5)?,
        dominant_tone: row.get(6)?,
        tone_calm_pct: row.get(7)?,
        tone_aggressive_pct: row.get(8)?,
        tone_persuasive_pct: row.get(9)?,
        tone_anxious_pct: row.get(10)?,
        tone_confident_pct: row.get(11)?,
        tone_excited_pct: row.get(12)?,
        bias_score: row.get(13)?,
        bias_level: parse_column(14, &level)?,
        bias_flags_count: row.get(15)?,
        processing_time: row.get(16)?,
        created_at: row.get(17)?,
        result_json_path: row.get(18)?,
    })
}

fn flag_from_row(row: &Row) -> rusqlite::Result<BiasFlag> {
    let category: String = row.get(3)?;
    let severity: String = row.get(4)?;
    Ok(BiasFlag {
        id: row.get(0)?,
        analysis_id: row.get(1)?,
        phrase: row.get(2)?,
        category: parse_column(3, &category)?,
        severity: parse_column(4, &severity)?,
        sentence: row.get(5)?,
        context: row.get(6)?,
        timestamp: row.get(7)?,
        timestamp_seconds: row.get(8)?,
    })
}

/// Parse a closed-enum column, surfacing a bad stored value as a
/// conversion failure instead of silently defaulting.
fn parse_column<T: FromStr<Err = StoreError>>(idx: usize, raw: &str) -> rusqlite::Result<T> {
    raw.parse().map_err(|e: StoreError| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn insert_flags(tx: &Transaction, analysis_id: i64, flags: &[NewBiasFlag]) -> Result<()> {
    let mut stmt = tx.prepare(
        "INSERT INTO bias_flags (analysis_id, phrase, category, severity,
                                 sentence, context, timestamp, timestamp_seconds)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )?;
    for flag in flags {
        stmt.execute(params![
            analysis_id,
            flag.phrase,
            flag.category.as_str(),
            flag.severity.as_str(),
            flag.sentence,
            flag.context,
            flag.timestamp,
            flag.timestamp_seconds,
        ])?;
    }
    Ok(())
}

// =============================================================================
// Write-boundary validation
// =============================================================================

fn validate_new_podcast(new: &NewPodcast) -> Result<()> {
    if new.filename.is_empty() {
        return Err(StoreError::Validation("filename must not be empty".into()));
    }
    if new.file_path.is_empty() {
        return Err(StoreError::Validation("file_path must not be empty".into()));
    }
    if new.file_size < 0 {
        return Err(StoreError::Validation(format!(
            "file_size must be >= 0, got {}",
            new.file_size
        )));
    }
    if let Some(duration) = new.duration {
        if !duration.is_finite() || duration < 0.0 {
            return Err(StoreError::Validation(format!(
                "duration must be >= 0, got {}",
                duration
            )));
        }
    }
    if let Some(lang) = &new.language {
        if !is_valid_language(lang) {
            return Err(StoreError::Validation(format!(
                "language '{}' is not a valid tag",
                lang
            )));
        }
    }
    Ok(())
}

fn check_pct(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() || !(0.0..=100.0).contains(&value) {
        return Err(StoreError::Validation(format!(
            "{} must be in [0, 100], got {}",
            name, value
        )));
    }
    Ok(())
}

fn validate_metrics(metrics: &NewAnalysis) -> Result<()> {
    check_pct("sentiment_positive_pct", metrics.sentiment_positive_pct)?;
    check_pct("sentiment_neutral_pct", metrics.sentiment_neutral_pct)?;
    check_pct("sentiment_negative_pct", metrics.sentiment_negative_pct)?;
    check_pct("tone_calm_pct", metrics.tone_calm_pct)?;
    check_pct("tone_aggressive_pct", metrics.tone_aggressive_pct)?;
    check_pct("tone_persuasive_pct", metrics.tone_persuasive_pct)?;
    check_pct("tone_anxious_pct", metrics.tone_anxious_pct)?;
    check_pct("tone_confident_pct", metrics.tone_confident_pct)?;
    check_pct("tone_excited_pct", metrics.tone_excited_pct)?;

    if !metrics.sentiment_score.is_finite()
        || !(-1.0..=1.0).contains(&metrics.sentiment_score)
    {
        return Err(StoreError::Validation(format!(
            "sentiment_score must be in [-1, 1], got {}",
            metrics.sentiment_score
        )));
    }
    if !(0..=100).contains(&metrics.bias_score) {
        return Err(StoreError::Validation(format!(
            "bias_score must be in [0, 100], got {}",
            metrics.bias_score
        )));
    }
    let expected = BiasLevel::for_score(metrics.bias_score);
    if metrics.bias_level != expected {
        return Err(StoreError::Validation(format!(
            "bias_level {} does not match bias_score {} (expected {})",
            metrics.bias_level, metrics.bias_score, expected
        )));
    }

    // Sentiment percentages sum to 100 by analyzer convention; a drift
    // is worth noticing but is not the store's contract to enforce
    let sentiment_sum = metrics.sentiment_positive_pct
        + metrics.sentiment_neutral_pct
        + metrics.sentiment_negative_pct;
    if (sentiment_sum - 100.0).abs() > 0.5 {
        log::warn!("Sentiment percentages sum to {:.1}, expected 100", sentiment_sum);
    }

    Ok(())
}

fn validate_flag(flag: &NewBiasFlag) -> Result<()> {
    if flag.phrase.is_empty() {
        return Err(StoreError::Validation("flag phrase must not be empty".into()));
    }
    if !flag.timestamp_seconds.is_finite() || flag.timestamp_seconds < 0.0 {
        return Err(StoreError::Validation(format!(
            "timestamp_seconds must be >= 0, got {}",
            flag.timestamp_seconds
        )));
    }
    let parsed = parse_timestamp(&flag.timestamp)?;
    // Display timestamps carry whole seconds, so allow sub-second drift
    if (flag.timestamp_seconds - parsed).abs() >= 1.0 {
        return Err(StoreError::Validation(format!(
            "timestamp '{}' ({}s) disagrees with timestamp_seconds {}",
            flag.timestamp, parsed, flag.timestamp_seconds
        )));
    }
    Ok(())
}

fn map_constraint(e: rusqlite::Error, msg: impl FnOnce() -> String) -> StoreError {
    match &e {
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            StoreError::Integrity(msg())
        }
        _ => StoreError::Database(e),
    }
}
