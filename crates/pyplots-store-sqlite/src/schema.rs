//! SQL schema for the pyplots SQLite catalog, as an ordered migration chain.
//!
//! Each [`Migration`] names its predecessor; the engine in
//! [`crate::migrate`] linearizes the list and applies one revision per
//! transaction. Forward and backward scripts are structural inverses.

use pyplots_core::migration::Revision;

/// One schema revision with its forward and backward DDL.
#[derive(Debug)]
pub struct Migration {
  pub revision:      &'static str,
  pub down_revision: Option<&'static str>,
  pub description:   &'static str,
  pub upgrade:       &'static str,
  pub downgrade:     &'static str,
}

impl Revision for Migration {
  fn revision(&self) -> &str { self.revision }

  fn down_revision(&self) -> Option<&str> { self.down_revision }
}

/// Ledger table holding the single revision the database is at.
pub const LEDGER_DDL: &str = "
CREATE TABLE IF NOT EXISTS schema_revision (
    revision TEXT NOT NULL
);
";

/// Every revision the catalog knows about.
pub static MIGRATIONS: &[Migration] = &[
  Migration {
    revision:      "001",
    down_revision: None,
    description:   "libraries, specs and implementations",
    upgrade:       "
CREATE TABLE libraries (
    id          TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    version     TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);
CREATE UNIQUE INDEX uq_libraries_name ON libraries(name);

CREATE TABLE specs (
    id          TEXT PRIMARY KEY,
    slug        TEXT NOT NULL,
    content     TEXT NOT NULL,
    tags        TEXT NOT NULL DEFAULT '{}' CHECK (json_valid(tags)),
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);
CREATE UNIQUE INDEX uq_specs_slug ON specs(slug);

-- No ON DELETE CASCADE: removing a spec or library requires proving that
-- nothing references it.
CREATE TABLE implementations (
    id             TEXT PRIMARY KEY,
    spec_id        TEXT NOT NULL REFERENCES specs(id),
    library_id     TEXT NOT NULL REFERENCES libraries(id),
    code           TEXT NOT NULL,
    quality_score  INTEGER CHECK (quality_score BETWEEN 0 AND 100),
    created_at     TEXT NOT NULL,
    updated_at     TEXT NOT NULL
);
CREATE UNIQUE INDEX uq_implementations_spec_library
    ON implementations(spec_id, library_id);
CREATE INDEX ix_implementations_spec_id       ON implementations(spec_id);
CREATE INDEX ix_implementations_library_id    ON implementations(library_id);
CREATE INDEX ix_implementations_quality_score ON implementations(quality_score);
",
    downgrade:     "
DROP TABLE implementations;
DROP TABLE specs;
DROP TABLE libraries;
",
  },
  Migration {
    revision:      "002",
    down_revision: Some("001"),
    description:   "spec issue tracking, review fields and impl tags",
    upgrade:       "
ALTER TABLE specs ADD COLUMN issue INTEGER;
CREATE INDEX ix_specs_issue ON specs(issue);

ALTER TABLE implementations ADD COLUMN review_image_description TEXT;
ALTER TABLE implementations ADD COLUMN review_criteria_checklist TEXT
    CHECK (review_criteria_checklist IS NULL OR json_valid(review_criteria_checklist));
ALTER TABLE implementations ADD COLUMN review_verdict TEXT
    CHECK (review_verdict IN ('APPROVED', 'REJECTED'));
ALTER TABLE implementations ADD COLUMN impl_tags TEXT NOT NULL DEFAULT '{}'
    CHECK (json_valid(impl_tags));
",
    downgrade:     "
ALTER TABLE implementations DROP COLUMN impl_tags;
ALTER TABLE implementations DROP COLUMN review_verdict;
ALTER TABLE implementations DROP COLUMN review_criteria_checklist;
ALTER TABLE implementations DROP COLUMN review_image_description;

DROP INDEX ix_specs_issue;
ALTER TABLE specs DROP COLUMN issue;
",
  },
  Migration {
    revision:      "003",
    down_revision: Some("002"),
    description:   "rename implementations to impls",
    // SQLite cannot rename an index, so each one is dropped and recreated
    // under the new name inside the same transaction. The pair-uniqueness
    // index is never absent from a committed state.
    upgrade:       "
ALTER TABLE implementations RENAME TO impls;

DROP INDEX uq_implementations_spec_library;
CREATE UNIQUE INDEX uq_impls_spec_library ON impls(spec_id, library_id);
DROP INDEX ix_implementations_spec_id;
CREATE INDEX ix_impls_spec_id ON impls(spec_id);
DROP INDEX ix_implementations_library_id;
CREATE INDEX ix_impls_library_id ON impls(library_id);
DROP INDEX ix_implementations_quality_score;
CREATE INDEX ix_impls_quality_score ON impls(quality_score);
",
    downgrade:     "
ALTER TABLE impls RENAME TO implementations;

DROP INDEX uq_impls_spec_library;
CREATE UNIQUE INDEX uq_implementations_spec_library
    ON implementations(spec_id, library_id);
DROP INDEX ix_impls_spec_id;
CREATE INDEX ix_implementations_spec_id ON implementations(spec_id);
DROP INDEX ix_impls_library_id;
CREATE INDEX ix_implementations_library_id ON implementations(library_id);
DROP INDEX ix_impls_quality_score;
CREATE INDEX ix_implementations_quality_score ON implementations(quality_score);
",
  },
  Migration {
    revision:      "004",
    down_revision: Some("003"),
    description:   "append-only updates and history arrays",
    upgrade:       "
ALTER TABLE specs ADD COLUMN updates TEXT NOT NULL DEFAULT '[]'
    CHECK (json_valid(updates));
ALTER TABLE impls ADD COLUMN history TEXT NOT NULL DEFAULT '[]'
    CHECK (json_valid(history));

CREATE TRIGGER trg_specs_updates_append_only
BEFORE UPDATE OF updates ON specs
WHEN json_array_length(NEW.updates) < json_array_length(OLD.updates)
  OR EXISTS (
    SELECT 1 FROM json_each(OLD.updates) AS past
    WHERE json_extract(OLD.updates, '$[' || past.key || ']')
      IS NOT json_extract(NEW.updates, '$[' || past.key || ']')
  )
BEGIN
    SELECT RAISE(ABORT, 'specs.updates is append-only');
END;

CREATE TRIGGER trg_impls_history_append_only
BEFORE UPDATE OF history ON impls
WHEN json_array_length(NEW.history) < json_array_length(OLD.history)
  OR EXISTS (
    SELECT 1 FROM json_each(OLD.history) AS past
    WHERE json_extract(OLD.history, '$[' || past.key || ']')
      IS NOT json_extract(NEW.history, '$[' || past.key || ']')
  )
BEGIN
    SELECT RAISE(ABORT, 'impls.history is append-only');
END;
",
    downgrade:     "
DROP TRIGGER trg_impls_history_append_only;
DROP TRIGGER trg_specs_updates_append_only;

ALTER TABLE impls DROP COLUMN history;
ALTER TABLE specs DROP COLUMN updates;
",
  },
  Migration {
    revision:      "005",
    down_revision: Some("004"),
    description:   "containment indexes over recognized tag dimensions",
    upgrade:       "
CREATE TABLE spec_tag_index (
    dimension  TEXT NOT NULL,
    value      TEXT NOT NULL,
    spec_id    TEXT NOT NULL,
    PRIMARY KEY (dimension, value, spec_id)
) WITHOUT ROWID;
CREATE INDEX ix_spec_tag_index_spec_id ON spec_tag_index(spec_id);

CREATE TABLE impl_tag_index (
    dimension  TEXT NOT NULL,
    value      TEXT NOT NULL,
    impl_id    TEXT NOT NULL,
    PRIMARY KEY (dimension, value, impl_id)
) WITHOUT ROWID;
CREATE INDEX ix_impl_tag_index_impl_id ON impl_tag_index(impl_id);

CREATE TRIGGER trg_specs_tags_insert AFTER INSERT ON specs
BEGIN
    INSERT OR IGNORE INTO spec_tag_index (dimension, value, spec_id)
    SELECT d.key, v.value, NEW.id
    FROM json_each(NEW.tags) d, json_each(d.value) v
    WHERE d.key IN ('plot_type', 'data_type', 'domain', 'features');
END;

CREATE TRIGGER trg_specs_tags_update AFTER UPDATE OF tags ON specs
BEGIN
    DELETE FROM spec_tag_index WHERE spec_id = OLD.id;
    INSERT OR IGNORE INTO spec_tag_index (dimension, value, spec_id)
    SELECT d.key, v.value, NEW.id
    FROM json_each(NEW.tags) d, json_each(d.value) v
    WHERE d.key IN ('plot_type', 'data_type', 'domain', 'features');
END;

CREATE TRIGGER trg_specs_tags_delete AFTER DELETE ON specs
BEGIN
    DELETE FROM spec_tag_index WHERE spec_id = OLD.id;
END;

CREATE TRIGGER trg_impls_tags_insert AFTER INSERT ON impls
BEGIN
    INSERT OR IGNORE INTO impl_tag_index (dimension, value, impl_id)
    SELECT d.key, v.value, NEW.id
    FROM json_each(NEW.impl_tags) d, json_each(d.value) v
    WHERE d.key IN ('dependencies', 'techniques', 'patterns', 'dataprep', 'styling');
END;

CREATE TRIGGER trg_impls_tags_update AFTER UPDATE OF impl_tags ON impls
BEGIN
    DELETE FROM impl_tag_index WHERE impl_id = OLD.id;
    INSERT OR IGNORE INTO impl_tag_index (dimension, value, impl_id)
    SELECT d.key, v.value, NEW.id
    FROM json_each(NEW.impl_tags) d, json_each(d.value) v
    WHERE d.key IN ('dependencies', 'techniques', 'patterns', 'dataprep', 'styling');
END;

CREATE TRIGGER trg_impls_tags_delete AFTER DELETE ON impls
BEGIN
    DELETE FROM impl_tag_index WHERE impl_id = OLD.id;
END;

INSERT OR IGNORE INTO spec_tag_index (dimension, value, spec_id)
SELECT d.key, v.value, s.id
FROM specs s, json_each(s.tags) d, json_each(d.value) v
WHERE d.key IN ('plot_type', 'data_type', 'domain', 'features');

INSERT OR IGNORE INTO impl_tag_index (dimension, value, impl_id)
SELECT d.key, v.value, i.id
FROM impls i, json_each(i.impl_tags) d, json_each(d.value) v
WHERE d.key IN ('dependencies', 'techniques', 'patterns', 'dataprep', 'styling');
",
    downgrade:     "
DROP TRIGGER trg_impls_tags_delete;
DROP TRIGGER trg_impls_tags_update;
DROP TRIGGER trg_impls_tags_insert;
DROP TRIGGER trg_specs_tags_delete;
DROP TRIGGER trg_specs_tags_update;
DROP TRIGGER trg_specs_tags_insert;

DROP TABLE impl_tag_index;
DROP TABLE spec_tag_index;
",
  },
];
