//! SQL schema for the Custos SQLite store.
//!
//! Executed once at connection startup. Parties and Licenses live in their
//! own tables because every other entity points at them; all remaining kinds
//! share `entities`, discriminated by `kind`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- party_id is derived from auth_id; only an admin re-key changes it.
CREATE TABLE IF NOT EXISTS parties (
    party_id    TEXT PRIMARY KEY,
    auth_id     TEXT NOT NULL,
    body_json   TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS licenses (
    license_id  TEXT PRIMARY KEY,
    body_json   TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS entities (
    entity_id   TEXT PRIMARY KEY,
    kind        TEXT NOT NULL,   -- EntityKind, e.g. 'Datastream'
    owner_id    TEXT REFERENCES parties(party_id)
                     ON DELETE SET NULL ON UPDATE CASCADE,
    license_id  TEXT REFERENCES licenses(license_id) ON DELETE SET NULL,
    -- Observation -> stream, Relation -> subject Observation.
    parent_id   TEXT REFERENCES entities(entity_id)  ON DELETE CASCADE,
    body_json   TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

-- Memberships: ObservationGroup -> Observation, Campaign -> (Multi)Datastream.
CREATE TABLE IF NOT EXISTS links (
    container_id TEXT NOT NULL REFERENCES entities(entity_id) ON DELETE CASCADE,
    member_id    TEXT NOT NULL REFERENCES entities(entity_id) ON DELETE CASCADE,
    PRIMARY KEY (container_id, member_id)
);

CREATE INDEX IF NOT EXISTS entities_kind_idx   ON entities(kind);
CREATE INDEX IF NOT EXISTS entities_parent_idx ON entities(parent_id);
CREATE INDEX IF NOT EXISTS entities_owner_idx  ON entities(owner_id);
CREATE INDEX IF NOT EXISTS links_member_idx    ON links(member_id);

PRAGMA user_version = 1;
";
