//! SQL schema for the Stacks SQLite store.
//!
//! Executed once at connection startup via `PRAGMA user_version`. Future
//! migrations will be gated on that version number.

/// Full schema DDL; idempotent thanks to `CREATE ... IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS borrowers (
    borrower_id   TEXT PRIMARY KEY,
    role          TEXT NOT NULL,      -- 'student' | 'staff'
    registered_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS copies (
    copy_id        TEXT PRIMARY KEY,
    title_id       TEXT NOT NULL,
    accession_code TEXT NOT NULL UNIQUE,
    state          TEXT NOT NULL,     -- 'available' | 'on_loan' | 'held_for_pickup'
    held_for       TEXT,              -- reservation_id while held_for_pickup
    registered_at  TEXT NOT NULL,
    CHECK ((state = 'held_for_pickup') = (held_for IS NOT NULL))
);

-- Overdue is derived at read time; only the lifecycle is stored.
CREATE TABLE IF NOT EXISTS loans (
    loan_id       TEXT PRIMARY KEY,
    copy_id       TEXT NOT NULL REFERENCES copies(copy_id),
    title_id      TEXT NOT NULL,
    borrower_id   TEXT NOT NULL REFERENCES borrowers(borrower_id),
    issue_date    TEXT NOT NULL,      -- YYYY-MM-DD
    due_date      TEXT NOT NULL,
    return_date   TEXT,
    renewal_count INTEGER NOT NULL DEFAULT 0,
    lifecycle     TEXT NOT NULL       -- 'issued' | 'renewed' | 'returned'
);

-- At most one open loan per copy.
CREATE UNIQUE INDEX IF NOT EXISTS loans_open_copy_idx
    ON loans(copy_id) WHERE return_date IS NULL;

CREATE TABLE IF NOT EXISTS reservations (
    seq             INTEGER PRIMARY KEY AUTOINCREMENT,
    reservation_id  TEXT NOT NULL UNIQUE,
    title_id        TEXT NOT NULL,
    borrower_id     TEXT NOT NULL REFERENCES borrowers(borrower_id),
    reserved_at     TEXT NOT NULL,    -- RFC 3339 UTC, fixed width
    status          TEXT NOT NULL,    -- 'active' | 'fulfilled' | 'cancelled' | 'expired'
    pickup_deadline TEXT,
    offered_copy_id TEXT REFERENCES copies(copy_id),
    cancel_reason   TEXT,
    loan_id         TEXT REFERENCES loans(loan_id),
    closed_at       TEXT
);

-- One active reservation per (title, borrower).
CREATE UNIQUE INDEX IF NOT EXISTS reservations_active_idx
    ON reservations(title_id, borrower_id) WHERE status = 'active';

-- Fines reference borrowers by id only; the registry may be pruned
-- without touching the ledger.
CREATE TABLE IF NOT EXISTS fines (
    fine_id     TEXT PRIMARY KEY,
    borrower_id TEXT NOT NULL,
    loan_id     TEXT REFERENCES loans(loan_id),
    amount      TEXT NOT NULL,        -- decimal, two fractional digits
    reason      TEXT NOT NULL,
    status      TEXT NOT NULL,        -- 'pending' | 'paid'
    created_on  TEXT NOT NULL,
    paid_on     TEXT,
    receipt     TEXT,
    assessment  TEXT                  -- JSON snapshot for automatic fines
);

CREATE TABLE IF NOT EXISTS holidays (
    holiday_id  TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    date        TEXT NOT NULL,
    recurring   INTEGER NOT NULL DEFAULT 0,
    description TEXT
);

-- Append-only; the highest version is in force.
CREATE TABLE IF NOT EXISTS settings (
    version       INTEGER PRIMARY KEY AUTOINCREMENT,
    recorded_at   TEXT NOT NULL,
    settings_json TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS copies_title_idx        ON copies(title_id, state);
CREATE INDEX IF NOT EXISTS loans_borrower_idx      ON loans(borrower_id);
CREATE INDEX IF NOT EXISTS loans_title_idx         ON loans(title_id);
CREATE INDEX IF NOT EXISTS reservations_title_idx  ON reservations(title_id, status);
CREATE INDEX IF NOT EXISTS reservations_pickup_idx ON reservations(pickup_deadline)
    WHERE status = 'active';
CREATE INDEX IF NOT EXISTS fines_borrower_idx      ON fines(borrower_id);

PRAGMA user_version = 1;
";
