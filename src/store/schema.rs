//! Index schema
//!
//! Four tables: groups, articles, the per-group number index, and matched
//! release segments. Created idempotently at startup.

/// Schema DDL, safe to run on every startup.
pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS groups (
    name  TEXT PRIMARY KEY NOT NULL,
    watch INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS articles (
    message_id TEXT PRIMARY KEY NOT NULL,
    subject    TEXT NOT NULL,
    poster     TEXT NOT NULL,
    posted     INTEGER NOT NULL,
    size       INTEGER NOT NULL CHECK (size >= 0)
);

CREATE TABLE IF NOT EXISTS group_index (
    group_name     TEXT NOT NULL,
    article_number INTEGER NOT NULL CHECK (article_number > 0),
    message_id     TEXT NOT NULL,
    PRIMARY KEY (group_name, article_number),
    UNIQUE (group_name, message_id)
);

CREATE TABLE IF NOT EXISTS segments (
    message_id   TEXT PRIMARY KEY NOT NULL,
    release_name TEXT NOT NULL,
    file_name    TEXT NOT NULL,
    file_total   INTEGER NOT NULL DEFAULT 0,
    file_number  INTEGER NOT NULL DEFAULT 0,
    part_total   INTEGER NOT NULL DEFAULT 0,
    part_number  INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_segments_release ON segments (release_name);
";
