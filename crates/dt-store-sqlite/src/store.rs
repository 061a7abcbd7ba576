//! [`SqliteStore`], the SQLite implementation of [`CommunityStore`].

use std::{
  collections::{BTreeMap, BTreeSet},
  path::Path,
};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension as _};
use uuid::Uuid;

use dt_core::{
  document::{
    DocEvent, DocEventKind, Document, DocumentFacts, NewDocEvent, NewDocument, State,
  },
  group::{Group, NewGroup},
  list::{CommunityList, EmailSubscription, ListOwner, NotifyOn},
  name_index::{IndexTrigger, NamePattern},
  person::{Credentials, Email, NewPerson, Person},
  rule::{RuleKind, SearchRule},
  store::CommunityStore,
};

use crate::{
  Error, Result,
  encode::{
    DOC_COLUMNS, EVENT_COLUMNS, GROUP_COLUMNS, LIST_SELECT, PERSON_COLUMNS, RULE_COLUMNS,
    RawDocument, RawEmail, RawEvent, RawFacts, RawGroup, RawList, RawPerson, RawRule,
    RawSubscription, SUBSCRIPTION_COLUMNS, decode_uuid, encode_dt, encode_owner, encode_rule,
    encode_uuid, now,
  },
  index,
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A community tracker store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── Row loading ─────────────────────────────────────────────────────────────
//
// Synchronous helpers that run on the database thread.

fn string_column(conn: &Connection, sql: &str, param: &str) -> rusqlite::Result<Vec<String>> {
  let mut stmt = conn.prepare(sql)?;
  stmt
    .query_map(rusqlite::params![param], |row| row.get(0))?
    .collect()
}

fn state_pairs(conn: &Connection, doc_id: &str) -> rusqlite::Result<Vec<(String, String)>> {
  let mut stmt = conn.prepare(
    "SELECT state_type, slug FROM document_states WHERE doc_id = ?1 ORDER BY state_type",
  )?;
  stmt
    .query_map(rusqlite::params![doc_id], |row| Ok((row.get(0)?, row.get(1)?)))?
    .collect()
}

/// Run a document query selecting [`DOC_COLUMNS`] and attach each row's
/// states and authors.
fn query_documents<P: rusqlite::Params>(
  conn: &Connection,
  sql: &str,
  params: P,
) -> rusqlite::Result<Vec<RawDocument>> {
  let mut stmt = conn.prepare(sql)?;
  let mut docs = stmt
    .query_map(params, RawDocument::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  for doc in &mut docs {
    doc.states = state_pairs(conn, &doc.doc_id)?;
    doc.authors = string_column(
      conn,
      "SELECT person_id FROM document_authors WHERE doc_id = ?1 ORDER BY ord",
      &doc.doc_id,
    )?;
  }
  Ok(docs)
}

fn document_by_id(conn: &Connection, doc_id: &str) -> rusqlite::Result<Option<RawDocument>> {
  let sql = format!("SELECT {DOC_COLUMNS} FROM documents d WHERE d.doc_id = ?1");
  Ok(query_documents(conn, &sql, rusqlite::params![doc_id])?.pop())
}

fn load_facts(conn: &Connection, doc_id: &str) -> rusqlite::Result<Option<RawFacts>> {
  let head = conn
    .query_row(
      "SELECT d.name, d.group_id, g.parent_id, d.ad_id,
              (SELECT e.person_id FROM emails e WHERE e.address = d.shepherd_email)
       FROM documents d
       LEFT JOIN ietf_groups g ON g.group_id = d.group_id
       WHERE d.doc_id = ?1",
      rusqlite::params![doc_id],
      |row| {
        Ok(RawFacts {
          doc_id:          doc_id.to_owned(),
          name:            row.get(0)?,
          group_id:        row.get(1)?,
          group_parent_id: row.get(2)?,
          ad_id:           row.get(3)?,
          shepherd_id:     row.get(4)?,
          states:          Vec::new(),
          authors:         Vec::new(),
          name_rule_hits:  Vec::new(),
        })
      },
    )
    .optional()?;
  let Some(mut facts) = head else { return Ok(None) };

  facts.states = state_pairs(conn, doc_id)?;
  facts.authors =
    string_column(conn, "SELECT person_id FROM document_authors WHERE doc_id = ?1", doc_id)?;
  facts.name_rule_hits =
    string_column(conn, "SELECT rule_id FROM name_contains_index WHERE doc_id = ?1", doc_id)?;
  Ok(Some(facts))
}

fn rule_by_id(conn: &Connection, rule_id: &str) -> rusqlite::Result<Option<RawRule>> {
  conn
    .query_row(
      &format!("SELECT {RULE_COLUMNS} FROM search_rules r WHERE r.rule_id = ?1"),
      rusqlite::params![rule_id],
      RawRule::from_row,
    )
    .optional()
}

fn list_by_id(conn: &Connection, list_id: &str) -> rusqlite::Result<Option<RawList>> {
  conn
    .query_row(
      &format!("{LIST_SELECT} WHERE l.list_id = ?1"),
      rusqlite::params![list_id],
      RawList::from_row,
    )
    .optional()
}

fn person_by_id(conn: &Connection, person_id: &str) -> rusqlite::Result<Option<RawPerson>> {
  conn
    .query_row(
      &format!("SELECT {PERSON_COLUMNS} FROM persons p WHERE p.person_id = ?1"),
      rusqlite::params![person_id],
      RawPerson::from_row,
    )
    .optional()
}

fn insert_event(conn: &Connection, event: &EncodedEvent) -> rusqlite::Result<()> {
  conn.execute(
    "INSERT INTO doc_events (event_id, doc_id, time, by_id, event_type, value_json, descr)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    rusqlite::params![
      event.event_id,
      event.doc_id,
      event.time,
      event.by_id,
      event.event_type,
      event.value_json,
      event.descr,
    ],
  )?;
  conn.execute(
    "UPDATE documents SET time = ?2 WHERE doc_id = ?1",
    rusqlite::params![event.doc_id, event.time],
  )?;
  Ok(())
}

/// A [`DocEvent`] flattened to its column values.
struct EncodedEvent {
  event_id:   String,
  doc_id:     String,
  time:       String,
  by_id:      String,
  event_type: &'static str,
  value_json: String,
  descr:      String,
}

impl EncodedEvent {
  fn new(event: &DocEvent) -> Result<Self> {
    Ok(Self {
      event_id:   encode_uuid(event.event_id),
      doc_id:     encode_uuid(event.doc_id),
      time:       encode_dt(event.time),
      by_id:      encode_uuid(event.by),
      event_type: event.kind.discriminant(),
      value_json: event.kind.to_json()?.to_string(),
      descr:      event.desc.clone(),
    })
  }
}

/// A `changed_state` event moving `doc_id` to `state`.
fn state_change_event(doc_id: Uuid, by: Uuid, state: State, prev: Option<State>) -> DocEvent {
  let desc = match &prev {
    Some(p) => format!("{} state changed to {} from {}", state.state_type, state.slug, p.slug),
    None => format!("{} state changed to {}", state.state_type, state.slug),
  };
  DocEvent {
    event_id: Uuid::new_v4(),
    doc_id,
    time: now(),
    by,
    kind: DocEventKind::ChangedState { state, prev },
    desc,
  }
}

// ─── Rule evaluation in SQL ──────────────────────────────────────────────────

/// The document query equivalent to one rule. Parameters `?1` and `?2` are
/// the required state; `?3`, when present, is the rule's target.
struct RuleQuery {
  condition: Option<&'static str>,
  params:    Vec<String>,
}

fn rule_query(rule: &SearchRule) -> RuleQuery {
  let state = rule.kind.required_state();
  let mut params = vec![state.state_type.as_str().to_owned(), state.slug];

  let condition = match &rule.kind {
    RuleKind::Group { group_id, .. }
    | RuleKind::GroupRfc { group_id, .. }
    | RuleKind::GroupExp { group_id } => {
      params.push(encode_uuid(*group_id));
      Some("d.group_id = ?3")
    }
    RuleKind::Area { group_id, .. } => {
      params.push(encode_uuid(*group_id));
      Some("d.group_id IN (SELECT group_id FROM ietf_groups WHERE parent_id = ?3)")
    }
    RuleKind::StateIesg { .. } => None,
    RuleKind::Author { person_id, .. } | RuleKind::AuthorRfc { person_id, .. } => {
      params.push(encode_uuid(*person_id));
      Some(
        "EXISTS (SELECT 1 FROM document_authors a
                 WHERE a.doc_id = d.doc_id AND a.person_id = ?3)",
      )
    }
    RuleKind::Ad { person_id, .. } => {
      params.push(encode_uuid(*person_id));
      Some("d.ad_id = ?3")
    }
    RuleKind::Shepherd { person_id, .. } => {
      params.push(encode_uuid(*person_id));
      Some("d.shepherd_email IN (SELECT address FROM emails WHERE person_id = ?3)")
    }
    RuleKind::NameContains { .. } => {
      params.push(encode_uuid(rule.rule_id));
      Some("d.doc_id IN (SELECT doc_id FROM name_contains_index WHERE rule_id = ?3)")
    }
  };

  RuleQuery { condition, params }
}

fn matching_docs(conn: &Connection, query: &RuleQuery) -> rusqlite::Result<Vec<RawDocument>> {
  let mut sql = format!(
    "SELECT {DOC_COLUMNS} FROM documents d
     JOIN document_states s ON s.doc_id = d.doc_id
     WHERE s.state_type = ?1 AND s.slug = ?2"
  );
  if let Some(condition) = query.condition {
    sql.push_str(" AND ");
    sql.push_str(condition);
  }
  sql.push_str(" ORDER BY d.name");
  query_documents(conn, &sql, rusqlite::params_from_iter(query.params.iter()))
}

fn decode_documents(raws: impl IntoIterator<Item = RawDocument>) -> Result<Vec<Document>> {
  raws.into_iter().map(RawDocument::into_document).collect()
}

fn decode_rules(raws: Vec<RawRule>) -> Result<Vec<SearchRule>> {
  raws.into_iter().map(RawRule::into_rule).collect()
}

// ─── CommunityStore impl ─────────────────────────────────────────────────────

impl CommunityStore for SqliteStore {
  type Error = Error;

  // ── People ────────────────────────────────────────────────────────────────

  async fn add_person(&self, input: NewPerson) -> Result<Person> {
    let person = Person {
      person_id:  Uuid::new_v4(),
      name:       input.name,
      username:   input.username,
      created_at: now(),
    };

    let id_str = encode_uuid(person.person_id);
    let name = person.name.clone();
    let username = person.username.clone();
    let at_str = encode_dt(person.created_at);
    let emails = input.emails;
    let mut aliases = input.aliases;
    aliases.insert(0, person.name.clone());

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "INSERT INTO persons (person_id, name, username, created_at) VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![id_str, name, username, at_str],
        )?;
        for (i, address) in emails.iter().enumerate() {
          tx.execute(
            "INSERT INTO emails (address, person_id, is_primary) VALUES (?1, ?2, ?3)",
            rusqlite::params![address, id_str, i == 0],
          )?;
        }
        for alias in &aliases {
          tx.execute(
            "INSERT OR IGNORE INTO aliases (person_id, name) VALUES (?1, ?2)",
            rusqlite::params![id_str, alias],
          )?;
        }
        tx.commit()?;
        Ok(())
      })
      .await?;

    tracing::debug!(person_id = %person.person_id, name = %person.name, "added person");
    Ok(person)
  }

  async fn get_person(&self, id: Uuid) -> Result<Option<Person>> {
    let id_str = encode_uuid(id);
    let raw = self
      .conn
      .call(move |conn| Ok(person_by_id(conn, &id_str)?))
      .await?;
    raw.map(RawPerson::into_person).transpose()
  }

  async fn add_email(&self, person_id: Uuid, address: String) -> Result<Email> {
    let id_str = encode_uuid(person_id);

    let raw: Option<RawEmail> = self
      .conn
      .call(move |conn| {
        if person_by_id(conn, &id_str)?.is_none() {
          return Ok(None);
        }
        let has_primary: bool = conn.query_row(
          "SELECT EXISTS (SELECT 1 FROM emails WHERE person_id = ?1 AND is_primary)",
          rusqlite::params![id_str],
          |row| row.get(0),
        )?;
        conn.execute(
          "INSERT INTO emails (address, person_id, is_primary) VALUES (?1, ?2, ?3)",
          rusqlite::params![address, id_str, !has_primary],
        )?;
        Ok(Some(RawEmail {
          address,
          person_id: id_str,
          is_primary: !has_primary,
          active: true,
        }))
      })
      .await?;

    raw.ok_or(Error::PersonNotFound(person_id))?.into_email()
  }

  async fn add_alias(&self, person_id: Uuid, name: String) -> Result<()> {
    let id_str = encode_uuid(person_id);
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT OR IGNORE INTO aliases (person_id, name) VALUES (?1, ?2)",
          rusqlite::params![id_str, name],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn person_emails(&self, person_id: Uuid) -> Result<Vec<Email>> {
    let id_str = encode_uuid(person_id);
    let raws: Vec<RawEmail> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT address, person_id, is_primary, active FROM emails
           WHERE person_id = ?1 ORDER BY is_primary DESC, address",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![id_str], RawEmail::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawEmail::into_email).collect()
  }

  async fn lookup_persons<'a>(&'a self, email_or_name: &'a str) -> Result<Vec<Person>> {
    let needle = email_or_name.trim().to_owned();
    let raws: Vec<RawPerson> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT DISTINCT {PERSON_COLUMNS} FROM persons p
           WHERE p.person_id IN (SELECT person_id FROM emails  WHERE address = ?1)
              OR p.person_id IN (SELECT person_id FROM aliases WHERE name    = ?1)
           ORDER BY p.name, p.person_id"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![needle], RawPerson::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawPerson::into_person).collect()
  }

  async fn set_credentials(
    &self,
    person_id: Uuid,
    username: String,
    password_hash: String,
  ) -> Result<()> {
    let id_str = encode_uuid(person_id);
    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE persons SET username = ?2, password_hash = ?3 WHERE person_id = ?1",
          rusqlite::params![id_str, username, password_hash],
        )?)
      })
      .await?;
    if changed == 0 {
      return Err(Error::PersonNotFound(person_id));
    }
    Ok(())
  }

  async fn credentials<'a>(&'a self, username: &'a str) -> Result<Option<Credentials>> {
    let username = username.to_owned();
    let row: Option<(String, String)> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT person_id, password_hash FROM persons
             WHERE username = ?1 AND password_hash IS NOT NULL",
            rusqlite::params![username],
            |row| Ok((row.get(0)?, row.get(1)?)),
          )
          .optional()?)
      })
      .await?;

    row
      .map(|(id, password_hash)| {
        Ok::<_, Error>(Credentials { person_id: decode_uuid(&id)?, password_hash })
      })
      .transpose()
  }

  // ── Groups ────────────────────────────────────────────────────────────────

  async fn add_group(&self, input: NewGroup) -> Result<Group> {
    let group = Group {
      group_id:   Uuid::new_v4(),
      acronym:    input.acronym,
      name:       input.name,
      group_type: input.group_type,
      parent_id:  input.parent_id,
    };

    let id_str = encode_uuid(group.group_id);
    let acronym = group.acronym.clone();
    let name = group.name.clone();
    let group_type = group.group_type.clone();
    let parent_str = group.parent_id.map(encode_uuid);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO ietf_groups (group_id, acronym, name, group_type, parent_id)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![id_str, acronym, name, group_type, parent_str],
        )?;
        Ok(())
      })
      .await?;

    tracing::debug!(acronym = %group.acronym, "added group");
    Ok(group)
  }

  async fn get_group(&self, id: Uuid) -> Result<Option<Group>> {
    let id_str = encode_uuid(id);
    let raw = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {GROUP_COLUMNS} FROM ietf_groups g WHERE g.group_id = ?1"),
            rusqlite::params![id_str],
            RawGroup::from_row,
          )
          .optional()?)
      })
      .await?;
    raw.map(RawGroup::into_group).transpose()
  }

  async fn get_group_by_acronym<'a>(&'a self, acronym: &'a str) -> Result<Option<Group>> {
    let acronym = acronym.to_owned();
    let raw = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {GROUP_COLUMNS} FROM ietf_groups g WHERE g.acronym = ?1"),
            rusqlite::params![acronym],
            RawGroup::from_row,
          )
          .optional()?)
      })
      .await?;
    raw.map(RawGroup::into_group).transpose()
  }

  async fn add_role(&self, group_id: Uuid, person_id: Uuid, role: String) -> Result<()> {
    let group_str = encode_uuid(group_id);
    let person_str = encode_uuid(person_id);
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT OR IGNORE INTO roles (group_id, person_id, role) VALUES (?1, ?2, ?3)",
          rusqlite::params![group_str, person_str, role],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn roles_in_group(&self, group_id: Uuid, person_id: Uuid) -> Result<Vec<String>> {
    let group_str = encode_uuid(group_id);
    let person_str = encode_uuid(person_id);
    Ok(
      self
        .conn
        .call(move |conn| {
          let mut stmt = conn.prepare(
            "SELECT role FROM roles WHERE group_id = ?1 AND person_id = ?2 ORDER BY role",
          )?;
          let roles = stmt
            .query_map(rusqlite::params![group_str, person_str], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
          Ok(roles)
        })
        .await?,
    )
  }

  // ── Documents ─────────────────────────────────────────────────────────────

  async fn add_document(&self, input: NewDocument) -> Result<Document> {
    let doc = Document {
      doc_id:   Uuid::new_v4(),
      name:     input.name,
      title:    input.title,
      doc_type: input.doc_type,
      rev:      input.rev,
      group_id: input.group_id,
      ad_id:    input.ad_id,
      shepherd: input.shepherd,
      authors:  input.authors,
      states:   input.states,
      time:     now(),
    };

    let id_str = encode_uuid(doc.doc_id);
    let name = doc.name.clone();
    let title = doc.title.clone();
    let doc_type = doc.doc_type.clone();
    let rev = doc.rev.clone();
    let group_str = doc.group_id.map(encode_uuid);
    let ad_str = doc.ad_id.map(encode_uuid);
    let shepherd = doc.shepherd.clone();
    let time_str = encode_dt(doc.time);
    let authors: Vec<String> = doc.authors.iter().copied().map(encode_uuid).collect();
    let states: Vec<(String, String)> = doc
      .states
      .iter()
      .map(|s| (s.state_type.as_str().to_owned(), s.slug.clone()))
      .collect();
    let doc_id = doc.doc_id;

    let hits = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "INSERT INTO documents (
             doc_id, name, title, doc_type, rev, group_id, ad_id, shepherd_email, time
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
          rusqlite::params![
            id_str, name, title, doc_type, rev, group_str, ad_str, shepherd, time_str,
          ],
        )?;
        for (state_type, slug) in &states {
          tx.execute(
            "INSERT OR REPLACE INTO document_states (doc_id, state_type, slug)
             VALUES (?1, ?2, ?3)",
            rusqlite::params![id_str, state_type, slug],
          )?;
        }
        for (ord, author) in authors.iter().enumerate() {
          tx.execute(
            "INSERT OR IGNORE INTO document_authors (doc_id, person_id, ord)
             VALUES (?1, ?2, ?3)",
            rusqlite::params![id_str, author, ord as i64],
          )?;
        }
        let hits = index::apply(&tx, IndexTrigger::DocumentAdded(doc_id))?;
        tx.commit()?;
        Ok(hits)
      })
      .await?;

    tracing::debug!(name = %doc.name, name_rule_hits = hits, "added document");
    Ok(doc)
  }

  async fn get_document(&self, id: Uuid) -> Result<Option<Document>> {
    let id_str = encode_uuid(id);
    let raw = self
      .conn
      .call(move |conn| Ok(document_by_id(conn, &id_str)?))
      .await?;
    raw.map(RawDocument::into_document).transpose()
  }

  async fn get_document_by_name<'a>(&'a self, name: &'a str) -> Result<Option<Document>> {
    let name = name.to_owned();
    let raw = self
      .conn
      .call(move |conn| {
        let sql = format!("SELECT {DOC_COLUMNS} FROM documents d WHERE d.name = ?1");
        Ok(query_documents(conn, &sql, rusqlite::params![name])?.pop())
      })
      .await?;
    raw.map(RawDocument::into_document).transpose()
  }

  async fn rename_document(&self, id: Uuid, new_name: String) -> Result<Document> {
    let id_str = encode_uuid(id);
    let time_str = encode_dt(now());

    let raw = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let changed = tx.execute(
          "UPDATE documents SET name = ?2, time = ?3 WHERE doc_id = ?1",
          rusqlite::params![id_str, new_name, time_str],
        )?;
        if changed == 0 {
          return Ok(None);
        }
        index::apply(&tx, IndexTrigger::DocumentRenamed(id))?;
        let doc = document_by_id(&tx, &id_str)?;
        tx.commit()?;
        Ok(doc)
      })
      .await?;

    let doc = raw.ok_or(Error::DocumentNotFound(id))?.into_document()?;
    tracing::debug!(doc_id = %id, name = %doc.name, "renamed document");
    Ok(doc)
  }

  async fn document_facts(&self, id: Uuid) -> Result<Option<DocumentFacts>> {
    let id_str = encode_uuid(id);
    let raw = self
      .conn
      .call(move |conn| Ok(load_facts(conn, &id_str)?))
      .await?;
    raw.map(RawFacts::into_facts).transpose()
  }

  async fn add_state_change_event(
    &self,
    doc_id: Uuid,
    by: Uuid,
    state: State,
  ) -> Result<DocEvent> {
    let id_str = encode_uuid(doc_id);

    // Read and replace the previous state in one transaction.
    let event = self
      .conn
      .call({
        let state = state.clone();
        move |conn| {
          let tx = conn.transaction()?;
          if document_by_id(&tx, &id_str)?.is_none() {
            return Ok(None);
          }
          let prev = tx
            .query_row(
              "SELECT slug FROM document_states WHERE doc_id = ?1 AND state_type = ?2",
              rusqlite::params![id_str, state.state_type.as_str()],
              |row| row.get::<_, String>(0),
            )
            .optional()?
            .map(|slug| State::new(state.state_type.clone(), slug));

          tx.execute(
            "INSERT OR REPLACE INTO document_states (doc_id, state_type, slug)
             VALUES (?1, ?2, ?3)",
            rusqlite::params![id_str, state.state_type.as_str(), state.slug],
          )?;
          let event = state_change_event(doc_id, by, state, prev);
          let encoded = EncodedEvent::new(&event)
            .map_err(|e| tokio_rusqlite::Error::Other(Box::new(e)))?;
          insert_event(&tx, &encoded)?;
          tx.commit()?;
          Ok(Some(event))
        }
      })
      .await?
      .ok_or(Error::DocumentNotFound(doc_id))?;

    tracing::debug!(%doc_id, %state, "recorded state change");
    Ok(event)
  }

  async fn add_doc_event(&self, input: NewDocEvent) -> Result<DocEvent> {
    let event = DocEvent {
      event_id: Uuid::new_v4(),
      doc_id:   input.doc_id,
      time:     now(),
      by:       input.by,
      kind:     input.kind,
      desc:     input.desc,
    };
    let encoded = EncodedEvent::new(&event)?;

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        insert_event(&tx, &encoded)?;
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(event)
  }

  async fn events_for_docs(
    &self,
    doc_ids: Vec<Uuid>,
    since: DateTime<Utc>,
  ) -> Result<Vec<DocEvent>> {
    if doc_ids.is_empty() {
      return Ok(Vec::new());
    }
    let since = encode_dt(since);
    let ids = serde_json::to_string(&doc_ids.into_iter().map(encode_uuid).collect::<Vec<_>>())?;

    // One JSON parameter, so the list size is not bounded by SQLite's
    // host parameter limit.
    let raws: Vec<RawEvent> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {EVENT_COLUMNS} FROM doc_events e
           WHERE e.time >= ?1 AND e.doc_id IN (SELECT value FROM json_each(?2))
           ORDER BY e.time DESC, e.rowid DESC"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![since, ids], RawEvent::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawEvent::into_event).collect()
  }

  // ── Community lists ───────────────────────────────────────────────────────

  async fn get_list(&self, owner: ListOwner) -> Result<Option<CommunityList>> {
    let (column, id_str) = match owner {
      ListOwner::Person(id) => ("person_id", encode_uuid(id)),
      ListOwner::Group(id) => ("group_id", encode_uuid(id)),
    };
    let raw = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("{LIST_SELECT} WHERE l.{column} = ?1"),
            rusqlite::params![id_str],
            RawList::from_row,
          )
          .optional()?)
      })
      .await?;
    raw.map(RawList::into_list).transpose()
  }

  async fn create_list(&self, owner: ListOwner) -> Result<CommunityList> {
    if self.get_list(owner).await?.is_some() {
      return Err(Error::ListExists);
    }

    let list_id = encode_uuid(Uuid::new_v4());
    let (person_str, group_str) = encode_owner(owner);
    let at_str = encode_dt(now());

    let raw = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO community_lists (list_id, person_id, group_id, created_at)
           VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![list_id, person_str, group_str, at_str],
        )?;
        Ok(list_by_id(conn, &list_id)?)
      })
      .await?;

    let list = raw
      .ok_or(Error::ListExists)?
      .into_list()?;
    tracing::info!(list = %list.long_name, "created community list");
    Ok(list)
  }

  async fn add_document_to_list(&self, list_id: Uuid, doc_id: Uuid) -> Result<()> {
    let list_str = encode_uuid(list_id);
    let doc_str = encode_uuid(doc_id);
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT OR IGNORE INTO community_list_docs (list_id, doc_id) VALUES (?1, ?2)",
          rusqlite::params![list_str, doc_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn remove_document_from_list(&self, list_id: Uuid, doc_id: Uuid) -> Result<bool> {
    let list_str = encode_uuid(list_id);
    let doc_str = encode_uuid(doc_id);
    let removed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM community_list_docs WHERE list_id = ?1 AND doc_id = ?2",
          rusqlite::params![list_str, doc_str],
        )?)
      })
      .await?;
    Ok(removed > 0)
  }

  async fn added_documents(&self, list_id: Uuid) -> Result<Vec<Document>> {
    let list_str = encode_uuid(list_id);
    let raws = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {DOC_COLUMNS} FROM documents d
           JOIN community_list_docs c ON c.doc_id = d.doc_id
           WHERE c.list_id = ?1
           ORDER BY d.name"
        );
        Ok(query_documents(conn, &sql, rusqlite::params![list_str])?)
      })
      .await?;
    decode_documents(raws)
  }

  async fn add_rule(&self, list_id: Uuid, kind: RuleKind) -> Result<SearchRule> {
    let rule = SearchRule { rule_id: Uuid::new_v4(), list_id, kind };
    let rule_id = rule.rule_id;
    let rule_str = encode_uuid(rule.rule_id);
    let list_str = encode_uuid(list_id);
    let cols = encode_rule(&rule.kind);

    let hits = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "INSERT INTO search_rules (
             rule_id, list_id, rule_type, group_id, person_id, state_type, state_slug, text
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
          rusqlite::params![
            rule_str,
            list_str,
            cols.rule_type,
            cols.group_id,
            cols.person_id,
            cols.state_type,
            cols.state_slug,
            cols.text,
          ],
        )?;
        let hits = index::apply(&tx, IndexTrigger::RuleAdded(rule_id))?;
        tx.commit()?;
        Ok(hits)
      })
      .await?;

    tracing::debug!(
      %list_id,
      rule_type = rule.kind.rule_type(),
      name_rule_hits = hits,
      "added search rule"
    );
    Ok(rule)
  }

  async fn remove_rule(&self, list_id: Uuid, rule_id: Uuid) -> Result<bool> {
    let list_str = encode_uuid(list_id);
    let rule_str = encode_uuid(rule_id);
    let removed = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "DELETE FROM name_contains_index WHERE rule_id = ?1
             AND EXISTS (SELECT 1 FROM search_rules WHERE rule_id = ?1 AND list_id = ?2)",
          rusqlite::params![rule_str, list_str],
        )?;
        let removed = tx.execute(
          "DELETE FROM search_rules WHERE rule_id = ?1 AND list_id = ?2",
          rusqlite::params![rule_str, list_str],
        )?;
        tx.commit()?;
        Ok(removed)
      })
      .await?;
    Ok(removed > 0)
  }

  async fn update_rule_text(&self, rule_id: Uuid, text: NamePattern) -> Result<SearchRule> {
    let rule_str = encode_uuid(rule_id);
    let text_str = text.as_str().to_owned();

    // Outer None: no such rule. Inner None: the rule is of another kind.
    let raw: Option<Option<RawRule>> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let Some(existing) = rule_by_id(&tx, &rule_str)? else {
          return Ok(None);
        };
        if existing.rule_type != "name_contains" {
          return Ok(Some(None));
        }
        tx.execute(
          "UPDATE search_rules SET text = ?2 WHERE rule_id = ?1",
          rusqlite::params![rule_str, text_str],
        )?;
        index::apply(&tx, IndexTrigger::RuleTextChanged(rule_id))?;
        let updated = rule_by_id(&tx, &rule_str)?;
        tx.commit()?;
        Ok(Some(updated))
      })
      .await?;

    let rule = raw
      .ok_or(Error::RuleNotFound(rule_id))?
      .ok_or(Error::NotANameRule(rule_id))?
      .into_rule()?;
    tracing::debug!(%rule_id, text = %text, "updated name pattern");
    Ok(rule)
  }

  async fn get_rule(&self, rule_id: Uuid) -> Result<Option<SearchRule>> {
    let rule_str = encode_uuid(rule_id);
    let raw = self
      .conn
      .call(move |conn| Ok(rule_by_id(conn, &rule_str)?))
      .await?;
    raw.map(RawRule::into_rule).transpose()
  }

  async fn list_rules(&self, list_id: Uuid) -> Result<Vec<SearchRule>> {
    let list_str = encode_uuid(list_id);
    let raws = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {RULE_COLUMNS} FROM search_rules r WHERE r.list_id = ?1 ORDER BY r.rowid"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![list_str], RawRule::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    decode_rules(raws)
  }

  // ── Matching ──────────────────────────────────────────────────────────────

  async fn docs_matching_rule(&self, rule_id: Uuid) -> Result<Vec<Document>> {
    let rule = self
      .get_rule(rule_id)
      .await?
      .ok_or(Error::RuleNotFound(rule_id))?;
    let query = rule_query(&rule);
    let raws = self
      .conn
      .call(move |conn| Ok(matching_docs(conn, &query)?))
      .await?;
    decode_documents(raws)
  }

  async fn rules_matching_doc(&self, doc_id: Uuid) -> Result<Vec<SearchRule>> {
    let id_str = encode_uuid(doc_id);

    let loaded: Option<(RawFacts, Vec<RawRule>)> = self
      .conn
      .call(move |conn| {
        let Some(facts) = load_facts(conn, &id_str)? else {
          return Ok(None);
        };
        // Only rules requiring one of the document's current states can
        // match; the rest of the predicate is checked in memory.
        let mut stmt = conn.prepare(&format!(
          "SELECT {RULE_COLUMNS} FROM search_rules r
           WHERE r.state_type = ?1 AND r.state_slug = ?2
           ORDER BY r.rowid"
        ))?;
        let mut candidates = Vec::new();
        for (state_type, slug) in &facts.states {
          let rows = stmt
            .query_map(rusqlite::params![state_type, slug], RawRule::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
          candidates.extend(rows);
        }
        drop(stmt);
        Ok(Some((facts, candidates)))
      })
      .await?;

    let (facts, candidates) = loaded.ok_or(Error::DocumentNotFound(doc_id))?;
    let facts = facts.into_facts()?;
    let rules = decode_rules(candidates)?
      .into_iter()
      .filter(|rule| rule.matches(&facts))
      .collect();
    Ok(rules)
  }

  async fn reset_name_contains_index_for_rule(&self, rule_id: Uuid) -> Result<usize> {
    let rule = self
      .get_rule(rule_id)
      .await?
      .ok_or(Error::RuleNotFound(rule_id))?;
    let RuleKind::NameContains { text, .. } = rule.kind else {
      return Err(Error::NotANameRule(rule_id));
    };

    let rule_str = encode_uuid(rule_id);
    let hits = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let hits = index::rebuild_rule(&tx, &rule_str, &text)?;
        tx.commit()?;
        Ok(hits)
      })
      .await?;

    tracing::info!(%rule_id, hits, "reset name index for rule");
    Ok(hits)
  }

  async fn docs_tracked_by_list(&self, list_id: Uuid) -> Result<Vec<Document>> {
    let queries: Vec<RuleQuery> = self.list_rules(list_id).await?.iter().map(rule_query).collect();
    let list_str = encode_uuid(list_id);

    let raws = self
      .conn
      .call(move |conn| {
        // Keyed by name: unique, and gives the result order.
        let mut by_name: BTreeMap<String, RawDocument> = BTreeMap::new();
        let sql = format!(
          "SELECT {DOC_COLUMNS} FROM documents d
           JOIN community_list_docs c ON c.doc_id = d.doc_id
           WHERE c.list_id = ?1"
        );
        for doc in query_documents(conn, &sql, rusqlite::params![list_str])? {
          by_name.insert(doc.name.clone(), doc);
        }
        for query in &queries {
          for doc in matching_docs(conn, query)? {
            by_name.entry(doc.name.clone()).or_insert(doc);
          }
        }
        Ok(by_name)
      })
      .await?;

    decode_documents(raws.into_values())
  }

  async fn lists_tracking_doc(&self, doc_id: Uuid) -> Result<Vec<CommunityList>> {
    let mut list_ids: BTreeSet<String> = self
      .rules_matching_doc(doc_id)
      .await?
      .iter()
      .map(|rule| encode_uuid(rule.list_id))
      .collect();
    let doc_str = encode_uuid(doc_id);

    let raws: Vec<RawList> = self
      .conn
      .call(move |conn| {
        list_ids.extend(string_column(
          conn,
          "SELECT list_id FROM community_list_docs WHERE doc_id = ?1",
          &doc_str,
        )?);
        let mut lists = Vec::new();
        for id in &list_ids {
          lists.extend(list_by_id(conn, id)?);
        }
        Ok(lists)
      })
      .await?;

    let mut lists = raws
      .into_iter()
      .map(RawList::into_list)
      .collect::<Result<Vec<_>>>()?;
    lists.sort_by(|a, b| a.long_name.cmp(&b.long_name));
    Ok(lists)
  }

  // ── Subscriptions ─────────────────────────────────────────────────────────

  async fn add_subscription(
    &self,
    list_id: Uuid,
    email: String,
    notify_on: NotifyOn,
  ) -> Result<EmailSubscription> {
    let sub_str = encode_uuid(Uuid::new_v4());
    let list_str = encode_uuid(list_id);
    let notify_str = notify_on.as_str();

    let raw: Option<RawSubscription> = self
      .conn
      .call(move |conn| {
        if list_by_id(conn, &list_str)?.is_none() {
          return Ok(None);
        }
        conn.execute(
          "INSERT OR IGNORE INTO email_subscriptions (subscription_id, list_id, email, notify_on)
           VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![sub_str, list_str, email, notify_str],
        )?;
        Ok(Some(conn.query_row(
          &format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM email_subscriptions
             WHERE list_id = ?1 AND email = ?2 AND notify_on = ?3"
          ),
          rusqlite::params![list_str, email, notify_str],
          RawSubscription::from_row,
        )?))
      })
      .await?;

    raw.ok_or(Error::ListNotFound(list_id))?.into_subscription()
  }

  async fn remove_subscription(&self, list_id: Uuid, subscription_id: Uuid) -> Result<bool> {
    let list_str = encode_uuid(list_id);
    let sub_str = encode_uuid(subscription_id);
    let removed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM email_subscriptions WHERE subscription_id = ?1 AND list_id = ?2",
          rusqlite::params![sub_str, list_str],
        )?)
      })
      .await?;
    Ok(removed > 0)
  }

  async fn list_subscriptions(&self, list_id: Uuid) -> Result<Vec<EmailSubscription>> {
    let list_str = encode_uuid(list_id);
    let raws = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {SUBSCRIPTION_COLUMNS} FROM email_subscriptions
           WHERE list_id = ?1 ORDER BY email, notify_on"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![list_str], RawSubscription::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawSubscription::into_subscription).collect()
  }
}
