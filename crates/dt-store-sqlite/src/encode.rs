//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 strings (microseconds, `Z`
//! suffix) so that lexical order equals chronological order. UUIDs are
//! stored as hyphenated lowercase strings. Event payloads are compact JSON.

use chrono::{DateTime, SecondsFormat, SubsecRound as _, Utc};
use dt_core::{
  document::{DocEvent, DocEventKind, Document, State, StateType},
  group::Group,
  list::{
    CommunityList, EmailSubscription, ListOwner, NotifyOn, group_list_name, personal_list_name,
  },
  person::{Email, Person},
  rule::{RuleKind, SearchRule},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

fn decode_opt_uuid(s: Option<&str>) -> Result<Option<Uuid>> {
  s.map(decode_uuid).transpose()
}

// ─── DateTime<Utc> ────────────────────────────────────────────────────────────

/// The current time at the precision timestamps are stored with, so values
/// handed back to callers compare equal to what a later read returns.
pub fn now() -> DateTime<Utc> { Utc::now().trunc_subsecs(6) }

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Columns selected for every person query, in [`RawPerson`] order.
pub const PERSON_COLUMNS: &str = "p.person_id, p.name, p.username, p.created_at";

/// Raw strings read directly from a `persons` row.
pub struct RawPerson {
  pub person_id:  String,
  pub name:       String,
  pub username:   Option<String>,
  pub created_at: String,
}

impl RawPerson {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      person_id:  row.get(0)?,
      name:       row.get(1)?,
      username:   row.get(2)?,
      created_at: row.get(3)?,
    })
  }

  pub fn into_person(self) -> Result<Person> {
    Ok(Person {
      person_id:  decode_uuid(&self.person_id)?,
      name:       self.name,
      username:   self.username,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

pub struct RawEmail {
  pub address:    String,
  pub person_id:  String,
  pub is_primary: bool,
  pub active:     bool,
}

impl RawEmail {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      address:    row.get(0)?,
      person_id:  row.get(1)?,
      is_primary: row.get(2)?,
      active:     row.get(3)?,
    })
  }

  pub fn into_email(self) -> Result<Email> {
    Ok(Email {
      address:   self.address,
      person_id: decode_uuid(&self.person_id)?,
      primary:   self.is_primary,
      active:    self.active,
    })
  }
}

pub const GROUP_COLUMNS: &str = "g.group_id, g.acronym, g.name, g.group_type, g.parent_id";

pub struct RawGroup {
  pub group_id:   String,
  pub acronym:    String,
  pub name:       String,
  pub group_type: String,
  pub parent_id:  Option<String>,
}

impl RawGroup {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      group_id:   row.get(0)?,
      acronym:    row.get(1)?,
      name:       row.get(2)?,
      group_type: row.get(3)?,
      parent_id:  row.get(4)?,
    })
  }

  pub fn into_group(self) -> Result<Group> {
    Ok(Group {
      group_id:   decode_uuid(&self.group_id)?,
      acronym:    self.acronym,
      name:       self.name,
      group_type: self.group_type,
      parent_id:  decode_opt_uuid(self.parent_id.as_deref())?,
    })
  }
}

/// Columns selected for every document query, in [`RawDocument`] order.
pub const DOC_COLUMNS: &str =
  "d.doc_id, d.name, d.title, d.doc_type, d.rev, d.group_id, d.ad_id, d.shepherd_email, d.time";

/// A `documents` row plus its states and authors.
pub struct RawDocument {
  pub doc_id:         String,
  pub name:           String,
  pub title:          String,
  pub doc_type:       String,
  pub rev:            String,
  pub group_id:       Option<String>,
  pub ad_id:          Option<String>,
  pub shepherd_email: Option<String>,
  pub time:           String,
  // document_states rows: (state_type, slug)
  pub states:         Vec<(String, String)>,
  // document_authors rows, in author order
  pub authors:        Vec<String>,
}

impl RawDocument {
  /// Read the `documents` columns; states and authors are filled separately.
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      doc_id:         row.get(0)?,
      name:           row.get(1)?,
      title:          row.get(2)?,
      doc_type:       row.get(3)?,
      rev:            row.get(4)?,
      group_id:       row.get(5)?,
      ad_id:          row.get(6)?,
      shepherd_email: row.get(7)?,
      time:           row.get(8)?,
      states:         Vec::new(),
      authors:        Vec::new(),
    })
  }

  pub fn into_document(self) -> Result<Document> {
    Ok(Document {
      doc_id:   decode_uuid(&self.doc_id)?,
      name:     self.name,
      title:    self.title,
      doc_type: self.doc_type,
      rev:      self.rev,
      group_id: decode_opt_uuid(self.group_id.as_deref())?,
      ad_id:    decode_opt_uuid(self.ad_id.as_deref())?,
      shepherd: self.shepherd_email,
      authors:  self
        .authors
        .iter()
        .map(|a| decode_uuid(a))
        .collect::<Result<_>>()?,
      states:   self
        .states
        .into_iter()
        .map(|(t, slug)| State::new(StateType::from(t), slug))
        .collect(),
      time:     decode_dt(&self.time)?,
    })
  }
}

pub const EVENT_COLUMNS: &str =
  "e.event_id, e.doc_id, e.time, e.by_id, e.event_type, e.value_json, e.descr";

pub struct RawEvent {
  pub event_id:   String,
  pub doc_id:     String,
  pub time:       String,
  pub by_id:      String,
  pub event_type: String,
  pub value_json: String,
  pub descr:      String,
}

impl RawEvent {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      event_id:   row.get(0)?,
      doc_id:     row.get(1)?,
      time:       row.get(2)?,
      by_id:      row.get(3)?,
      event_type: row.get(4)?,
      value_json: row.get(5)?,
      descr:      row.get(6)?,
    })
  }

  pub fn into_event(self) -> Result<DocEvent> {
    let data: serde_json::Value = serde_json::from_str(&self.value_json)?;
    Ok(DocEvent {
      event_id: decode_uuid(&self.event_id)?,
      doc_id:   decode_uuid(&self.doc_id)?,
      time:     decode_dt(&self.time)?,
      by:       decode_uuid(&self.by_id)?,
      kind:     DocEventKind::from_parts(&self.event_type, data)?,
      desc:     self.descr,
    })
  }
}

/// Columns selected for every list query; joins the owner for the title.
pub const LIST_SELECT: &str = "
  SELECT l.list_id, l.person_id, l.group_id, l.created_at, p.name, g.name
  FROM community_lists l
  LEFT JOIN persons     p ON p.person_id = l.person_id
  LEFT JOIN ietf_groups g ON g.group_id  = l.group_id";

pub struct RawList {
  pub list_id:     String,
  pub person_id:   Option<String>,
  pub group_id:    Option<String>,
  pub created_at:  String,
  pub person_name: Option<String>,
  pub group_name:  Option<String>,
}

impl RawList {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      list_id:     row.get(0)?,
      person_id:   row.get(1)?,
      group_id:    row.get(2)?,
      created_at:  row.get(3)?,
      person_name: row.get(4)?,
      group_name:  row.get(5)?,
    })
  }

  pub fn into_list(self) -> Result<CommunityList> {
    // The CHECK constraint guarantees exactly one owner column is set.
    let (owner, long_name) = match (self.person_id, self.group_id) {
      (Some(p), _) => (
        ListOwner::Person(decode_uuid(&p)?),
        personal_list_name(self.person_name.as_deref().unwrap_or_default()),
      ),
      (None, Some(g)) => (
        ListOwner::Group(decode_uuid(&g)?),
        group_list_name(self.group_name.as_deref().unwrap_or_default()),
      ),
      (None, None) => return Err(Error::ListNotFound(decode_uuid(&self.list_id)?)),
    };
    Ok(CommunityList {
      list_id: decode_uuid(&self.list_id)?,
      owner,
      long_name,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

/// Owner columns for an insert: `(person_id, group_id)`.
pub fn encode_owner(owner: ListOwner) -> (Option<String>, Option<String>) {
  match owner {
    ListOwner::Person(id) => (Some(encode_uuid(id)), None),
    ListOwner::Group(id) => (None, Some(encode_uuid(id))),
  }
}

pub const RULE_COLUMNS: &str =
  "r.rule_id, r.list_id, r.rule_type, r.group_id, r.person_id, r.state_slug, r.text";

pub struct RawRule {
  pub rule_id:    String,
  pub list_id:    String,
  pub rule_type:  String,
  pub group_id:   Option<String>,
  pub person_id:  Option<String>,
  pub state_slug: String,
  pub text:       Option<String>,
}

impl RawRule {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      rule_id:    row.get(0)?,
      list_id:    row.get(1)?,
      rule_type:  row.get(2)?,
      group_id:   row.get(3)?,
      person_id:  row.get(4)?,
      state_slug: row.get(5)?,
      text:       row.get(6)?,
    })
  }

  pub fn into_rule(self) -> Result<SearchRule> {
    let kind = RuleKind::from_parts(
      &self.rule_type,
      decode_opt_uuid(self.group_id.as_deref())?,
      decode_opt_uuid(self.person_id.as_deref())?,
      Some(self.state_slug),
      self.text.as_deref(),
    )?;
    Ok(SearchRule {
      rule_id: decode_uuid(&self.rule_id)?,
      list_id: decode_uuid(&self.list_id)?,
      kind,
    })
  }
}

/// The flattened columns of a [`RuleKind`].
pub struct RuleColumns {
  pub rule_type:  &'static str,
  pub group_id:   Option<String>,
  pub person_id:  Option<String>,
  pub state_type: String,
  pub state_slug: String,
  pub text:       Option<String>,
}

pub fn encode_rule(kind: &RuleKind) -> RuleColumns {
  let state = kind.required_state();
  RuleColumns {
    rule_type:  kind.rule_type(),
    group_id:   kind.group_id().map(encode_uuid),
    person_id:  kind.person_id().map(encode_uuid),
    state_type: String::from(state.state_type),
    state_slug: state.slug,
    text:       kind.name_pattern().map(|p| p.as_str().to_owned()),
  }
}

pub const SUBSCRIPTION_COLUMNS: &str = "subscription_id, list_id, email, notify_on";

pub struct RawSubscription {
  pub subscription_id: String,
  pub list_id:         String,
  pub email:           String,
  pub notify_on:       String,
}

impl RawSubscription {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      subscription_id: row.get(0)?,
      list_id:         row.get(1)?,
      email:           row.get(2)?,
      notify_on:       row.get(3)?,
    })
  }

  pub fn into_subscription(self) -> Result<EmailSubscription> {
    Ok(EmailSubscription {
      subscription_id: decode_uuid(&self.subscription_id)?,
      list_id:         decode_uuid(&self.list_id)?,
      email:           self.email,
      notify_on:       NotifyOn::parse(&self.notify_on)?,
    })
  }
}

/// Everything rule evaluation reads about one document, as stored.
pub struct RawFacts {
  pub doc_id:          String,
  pub name:            String,
  pub group_id:        Option<String>,
  pub group_parent_id: Option<String>,
  pub ad_id:           Option<String>,
  pub shepherd_id:     Option<String>,
  pub states:          Vec<(String, String)>,
  pub authors:         Vec<String>,
  pub name_rule_hits:  Vec<String>,
}

impl RawFacts {
  pub fn into_facts(self) -> Result<dt_core::document::DocumentFacts> {
    Ok(dt_core::document::DocumentFacts {
      doc_id:          decode_uuid(&self.doc_id)?,
      name:            self.name,
      group_id:        decode_opt_uuid(self.group_id.as_deref())?,
      group_parent_id: decode_opt_uuid(self.group_parent_id.as_deref())?,
      states:          self
        .states
        .into_iter()
        .map(|(t, slug)| (StateType::from(t), slug))
        .collect(),
      author_ids:      self
        .authors
        .iter()
        .map(|a| decode_uuid(a))
        .collect::<Result<_>>()?,
      ad_id:           decode_opt_uuid(self.ad_id.as_deref())?,
      shepherd_id:     decode_opt_uuid(self.shepherd_id.as_deref())?,
      name_rule_hits:  self
        .name_rule_hits
        .iter()
        .map(|r| decode_uuid(r))
        .collect::<Result<_>>()?,
    })
  }
}
