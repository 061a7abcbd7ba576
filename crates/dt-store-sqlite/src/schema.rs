//! SQL schema for the community tracker SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS persons (
    person_id     TEXT PRIMARY KEY,
    name          TEXT NOT NULL,
    username      TEXT UNIQUE,
    password_hash TEXT,
    created_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS emails (
    address    TEXT PRIMARY KEY,
    person_id  TEXT NOT NULL REFERENCES persons(person_id),
    is_primary INTEGER NOT NULL DEFAULT 0,
    active     INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS aliases (
    person_id TEXT NOT NULL REFERENCES persons(person_id),
    name      TEXT NOT NULL,
    UNIQUE (person_id, name)
);

CREATE TABLE IF NOT EXISTS ietf_groups (
    group_id   TEXT PRIMARY KEY,
    acronym    TEXT NOT NULL UNIQUE,
    name       TEXT NOT NULL,
    group_type TEXT NOT NULL,
    parent_id  TEXT REFERENCES ietf_groups(group_id)
);

CREATE TABLE IF NOT EXISTS roles (
    group_id  TEXT NOT NULL REFERENCES ietf_groups(group_id),
    person_id TEXT NOT NULL REFERENCES persons(person_id),
    role      TEXT NOT NULL,
    UNIQUE (group_id, person_id, role)
);

CREATE TABLE IF NOT EXISTS documents (
    doc_id         TEXT PRIMARY KEY,
    name           TEXT NOT NULL UNIQUE,
    title          TEXT NOT NULL,
    doc_type       TEXT NOT NULL,
    rev            TEXT NOT NULL,
    group_id       TEXT REFERENCES ietf_groups(group_id),
    ad_id          TEXT REFERENCES persons(person_id),
    shepherd_email TEXT,
    time           TEXT NOT NULL    -- ISO 8601 UTC
);

-- At most one current state per namespace.
CREATE TABLE IF NOT EXISTS document_states (
    doc_id     TEXT NOT NULL REFERENCES documents(doc_id),
    state_type TEXT NOT NULL,      -- 'draft' | 'draft-iesg' | 'rfc' | ...
    slug       TEXT NOT NULL,
    PRIMARY KEY (doc_id, state_type)
);

CREATE TABLE IF NOT EXISTS document_authors (
    doc_id    TEXT NOT NULL REFERENCES documents(doc_id),
    person_id TEXT NOT NULL REFERENCES persons(person_id),
    ord       INTEGER NOT NULL,
    PRIMARY KEY (doc_id, person_id)
);

CREATE TABLE IF NOT EXISTS doc_events (
    event_id   TEXT PRIMARY KEY,
    doc_id     TEXT NOT NULL REFERENCES documents(doc_id),
    time       TEXT NOT NULL,
    by_id      TEXT NOT NULL REFERENCES persons(person_id),
    event_type TEXT NOT NULL,      -- discriminant of DocEventKind
    value_json TEXT NOT NULL,      -- JSON payload (inner data only)
    descr      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS community_lists (
    list_id    TEXT PRIMARY KEY,
    person_id  TEXT UNIQUE REFERENCES persons(person_id),
    group_id   TEXT UNIQUE REFERENCES ietf_groups(group_id),
    created_at TEXT NOT NULL,
    CHECK ((person_id IS NULL) != (group_id IS NULL))
);

CREATE TABLE IF NOT EXISTS community_list_docs (
    list_id TEXT NOT NULL REFERENCES community_lists(list_id),
    doc_id  TEXT NOT NULL REFERENCES documents(doc_id),
    PRIMARY KEY (list_id, doc_id)
);

-- Flattened RuleKind; which columns are set depends on rule_type.
CREATE TABLE IF NOT EXISTS search_rules (
    rule_id    TEXT PRIMARY KEY,
    list_id    TEXT NOT NULL REFERENCES community_lists(list_id),
    rule_type  TEXT NOT NULL,
    group_id   TEXT REFERENCES ietf_groups(group_id),
    person_id  TEXT REFERENCES persons(person_id),
    state_type TEXT NOT NULL,
    state_slug TEXT NOT NULL,
    text       TEXT
);

-- Owned by the store; rebuilt in the transaction that invalidates it.
CREATE TABLE IF NOT EXISTS name_contains_index (
    rule_id TEXT NOT NULL REFERENCES search_rules(rule_id) ON DELETE CASCADE,
    doc_id  TEXT NOT NULL REFERENCES documents(doc_id),
    PRIMARY KEY (rule_id, doc_id)
);

CREATE TABLE IF NOT EXISTS email_subscriptions (
    subscription_id TEXT PRIMARY KEY,
    list_id         TEXT NOT NULL REFERENCES community_lists(list_id),
    email           TEXT NOT NULL,
    notify_on       TEXT NOT NULL,  -- 'all' | 'significant'
    UNIQUE (list_id, email, notify_on)
);

CREATE INDEX IF NOT EXISTS emails_person_idx      ON emails(person_id);
CREATE INDEX IF NOT EXISTS aliases_name_idx       ON aliases(name);
CREATE INDEX IF NOT EXISTS documents_group_idx    ON documents(group_id);
CREATE INDEX IF NOT EXISTS states_lookup_idx      ON document_states(state_type, slug);
CREATE INDEX IF NOT EXISTS authors_person_idx     ON document_authors(person_id);
CREATE INDEX IF NOT EXISTS events_doc_time_idx    ON doc_events(doc_id, time);
CREATE INDEX IF NOT EXISTS rules_state_idx        ON search_rules(state_type, state_slug);
CREATE INDEX IF NOT EXISTS name_index_doc_idx     ON name_contains_index(doc_id);

PRAGMA user_version = 1;
";
