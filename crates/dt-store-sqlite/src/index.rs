//! Maintenance of the `name_contains_index` table.
//!
//! These functions run on the database thread, inside the transaction of the
//! write that fired the trigger, so no reader can observe a stale index.

use dt_core::name_index::{IndexTrigger, NamePattern};
use rusqlite::{Connection, OptionalExtension as _};

use crate::encode::encode_uuid;

fn pattern_error(e: dt_core::Error) -> tokio_rusqlite::Error {
  tokio_rusqlite::Error::Other(Box::new(e))
}

/// Recompute every entry of one rule from the whole corpus. Returns the
/// number of matching documents.
pub fn rebuild_rule(
  conn: &Connection,
  rule_id: &str,
  pattern: &NamePattern,
) -> rusqlite::Result<usize> {
  conn.execute(
    "DELETE FROM name_contains_index WHERE rule_id = ?1",
    rusqlite::params![rule_id],
  )?;

  let mut stmt = conn.prepare("SELECT doc_id, name FROM documents")?;
  let docs = stmt
    .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  let mut insert =
    conn.prepare("INSERT INTO name_contains_index (rule_id, doc_id) VALUES (?1, ?2)")?;
  let mut hits = 0;
  for (doc_id, name) in docs.iter().filter(|(_, name)| pattern.is_match(name)) {
    insert.execute(rusqlite::params![rule_id, doc_id])?;
    tracing::trace!(rule_id, name, "name pattern hit");
    hits += 1;
  }
  Ok(hits)
}

/// Recompute one document's entries against every `name_contains` rule.
pub fn rebuild_document(
  conn: &Connection,
  doc_id: &str,
  name: &str,
) -> tokio_rusqlite::Result<usize> {
  conn.execute(
    "DELETE FROM name_contains_index WHERE doc_id = ?1",
    rusqlite::params![doc_id],
  )?;

  let mut stmt = conn.prepare(
    "SELECT rule_id, text FROM search_rules
     WHERE rule_type = 'name_contains' AND text IS NOT NULL",
  )?;
  let rules = stmt
    .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  let mut insert =
    conn.prepare("INSERT INTO name_contains_index (rule_id, doc_id) VALUES (?1, ?2)")?;
  let mut hits = 0;
  for (rule_id, text) in rules {
    let pattern = NamePattern::new(&text).map_err(pattern_error)?;
    if pattern.is_match(name) {
      insert.execute(rusqlite::params![rule_id, doc_id])?;
      hits += 1;
    }
  }
  Ok(hits)
}

/// Bring the index up to date after `trigger`. Returns the number of index
/// entries written.
pub fn apply(conn: &Connection, trigger: IndexTrigger) -> tokio_rusqlite::Result<usize> {
  if let Some(rule_id) = trigger.rule_scope() {
    let rule_id = encode_uuid(rule_id);
    let text: Option<String> = conn
      .query_row(
        "SELECT text FROM search_rules
         WHERE rule_id = ?1 AND rule_type = 'name_contains'",
        rusqlite::params![rule_id],
        |row| row.get(0),
      )
      .optional()?
      .flatten();
    let Some(text) = text else { return Ok(0) };
    let pattern = NamePattern::new(&text).map_err(pattern_error)?;
    let hits = rebuild_rule(conn, &rule_id, &pattern)?;
    tracing::debug!(?trigger, hits, "rebuilt name index for rule");
    return Ok(hits);
  }

  if let Some(doc_id) = trigger.document_scope() {
    let doc_id = encode_uuid(doc_id);
    let name: Option<String> = conn
      .query_row(
        "SELECT name FROM documents WHERE doc_id = ?1",
        rusqlite::params![doc_id],
        |row| row.get(0),
      )
      .optional()?;
    let Some(name) = name else { return Ok(0) };
    let hits = rebuild_document(conn, &doc_id, &name)?;
    tracing::debug!(?trigger, hits, "rebuilt name index for document");
    return Ok(hits);
  }

  Ok(0)
}
