//! SQLite schema definition.

/// Complete database schema for infection cluster detection.
pub const SCHEMA: &str = r#"
-- ============================================================================
-- Stays (one row per ingested transfer; append-only history)
-- ============================================================================

CREATE TABLE IF NOT EXISTS stays (
    stay_id TEXT PRIMARY KEY,
    patient_id TEXT NOT NULL,
    location TEXT NOT NULL,
    start_time TEXT NOT NULL,                    -- ward-in, "YYYY-MM-DD HH:MM:SS[.f]"
    end_time TEXT NOT NULL,                      -- ward-out
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    CHECK (end_time >= start_time),
    CHECK (patient_id GLOB 'P[0-9]*' AND patient_id NOT GLOB 'P*[^0-9]*')
);

CREATE INDEX IF NOT EXISTS idx_stays_patient ON stays(patient_id);
CREATE INDEX IF NOT EXISTS idx_stays_location_time ON stays(location, start_time, end_time);
CREATE INDEX IF NOT EXISTS idx_stays_time_range ON stays(start_time, end_time);
CREATE INDEX IF NOT EXISTS idx_stays_patient_location
    ON stays(patient_id, location, start_time, end_time);

-- ============================================================================
-- Microbiology tests
-- ============================================================================

CREATE TABLE IF NOT EXISTS microbiology (
    test_id TEXT PRIMARY KEY,
    patient_id TEXT NOT NULL,
    collection_date TEXT NOT NULL,
    infection TEXT NOT NULL,
    result TEXT NOT NULL CHECK (result IN ('positive', 'negative')),
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    CHECK (patient_id GLOB 'P[0-9]*' AND patient_id NOT GLOB 'P*[^0-9]*')
);

CREATE INDEX IF NOT EXISTS idx_microbiology_patient ON microbiology(patient_id);
CREATE INDEX IF NOT EXISTS idx_microbiology_infection_result ON microbiology(infection, result);
CREATE INDEX IF NOT EXISTS idx_microbiology_patient_date
    ON microbiology(patient_id, collection_date, infection);

-- ============================================================================
-- Positive tests joined to the same patient's stays
-- ============================================================================

CREATE VIEW IF NOT EXISTS patient_infection_timeline AS
SELECT
    m.patient_id AS patient_id,
    m.infection AS infection,
    date(m.collection_date) AS infection_date,
    s.location AS location,
    s.start_time AS ward_in_time,
    s.end_time AS ward_out_time,
    (date(m.collection_date) BETWEEN date(s.start_time) AND date(s.end_time))
        AS infection_during_stay
FROM microbiology m
JOIN stays s ON s.patient_id = m.patient_id
WHERE m.result = 'positive';
"#;
