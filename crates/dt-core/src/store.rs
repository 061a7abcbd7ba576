//! The `CommunityStore` trait.
//!
//! The trait is implemented by storage backends (e.g. `dt-store-sqlite`).
//! Higher layers (`dt-api`, `dt-server`) depend on this abstraction, not on
//! any concrete backend.

use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  document::{DocEvent, Document, DocumentFacts, NewDocEvent, NewDocument, State},
  group::{Group, NewGroup},
  list::{CommunityList, EmailSubscription, ListOwner, NotifyOn},
  name_index::NamePattern,
  person::{Credentials, Email, NewPerson, Person},
  rule::{RuleKind, SearchRule},
};

/// Abstraction over a community tracker store backend.
///
/// Implementations own the `name_contains` index: any method that adds a
/// document, renames one, adds a `name_contains` rule, or changes a rule's
/// pattern must leave the index exact before returning (see
/// [`crate::name_index::IndexTrigger`]).
///
/// All methods return `Send` futures so the trait can be used in multi-threaded
/// async runtimes (e.g. tokio with `axum`).
pub trait CommunityStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── People ────────────────────────────────────────────────────────────

  fn add_person(
    &self,
    input: NewPerson,
  ) -> impl Future<Output = Result<Person, Self::Error>> + Send + '_;

  fn get_person(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Person>, Self::Error>> + Send + '_;

  /// Attach another address to a person. The address must be unused.
  fn add_email(
    &self,
    person_id: Uuid,
    address: String,
  ) -> impl Future<Output = Result<Email, Self::Error>> + Send + '_;

  fn add_alias(
    &self,
    person_id: Uuid,
    name: String,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn person_emails(
    &self,
    person_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Email>, Self::Error>> + Send + '_;

  /// Everyone with an email address equal to `email_or_name` or an alias
  /// equal to it, without duplicates.
  fn lookup_persons<'a>(
    &'a self,
    email_or_name: &'a str,
  ) -> impl Future<Output = Result<Vec<Person>, Self::Error>> + Send + 'a;

  /// Give a person a login. Replaces any previous credentials.
  fn set_credentials(
    &self,
    person_id: Uuid,
    username: String,
    password_hash: String,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn credentials<'a>(
    &'a self,
    username: &'a str,
  ) -> impl Future<Output = Result<Option<Credentials>, Self::Error>> + Send + 'a;

  // ── Groups ────────────────────────────────────────────────────────────

  fn add_group(
    &self,
    input: NewGroup,
  ) -> impl Future<Output = Result<Group, Self::Error>> + Send + '_;

  fn get_group(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Group>, Self::Error>> + Send + '_;

  fn get_group_by_acronym<'a>(
    &'a self,
    acronym: &'a str,
  ) -> impl Future<Output = Result<Option<Group>, Self::Error>> + Send + 'a;

  fn add_role(
    &self,
    group_id: Uuid,
    person_id: Uuid,
    role: String,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Role names `person_id` holds in `group_id`.
  fn roles_in_group(
    &self,
    group_id: Uuid,
    person_id: Uuid,
  ) -> impl Future<Output = Result<Vec<String>, Self::Error>> + Send + '_;

  // ── Documents ─────────────────────────────────────────────────────────

  /// Persist a new document. Fires `IndexTrigger::DocumentAdded`.
  fn add_document(
    &self,
    input: NewDocument,
  ) -> impl Future<Output = Result<Document, Self::Error>> + Send + '_;

  fn get_document(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Document>, Self::Error>> + Send + '_;

  fn get_document_by_name<'a>(
    &'a self,
    name: &'a str,
  ) -> impl Future<Output = Result<Option<Document>, Self::Error>> + Send + 'a;

  /// Change a document's name. Fires `IndexTrigger::DocumentRenamed`.
  fn rename_document(
    &self,
    id: Uuid,
    new_name: String,
  ) -> impl Future<Output = Result<Document, Self::Error>> + Send + '_;

  /// Everything rule evaluation needs to know about one document. `None` if
  /// the document does not exist.
  fn document_facts(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<DocumentFacts>, Self::Error>> + Send + '_;

  /// Move the document into `state` (replacing its previous state in that
  /// namespace) and record a `changed_state` event.
  fn add_state_change_event(
    &self,
    doc_id: Uuid,
    by: Uuid,
    state: State,
  ) -> impl Future<Output = Result<DocEvent, Self::Error>> + Send + '_;

  fn add_doc_event(
    &self,
    input: NewDocEvent,
  ) -> impl Future<Output = Result<DocEvent, Self::Error>> + Send + '_;

  /// Events of the given documents recorded at or after `since`, newest
  /// first.
  fn events_for_docs(
    &self,
    doc_ids: Vec<Uuid>,
    since: DateTime<Utc>,
  ) -> impl Future<Output = Result<Vec<DocEvent>, Self::Error>> + Send + '_;

  // ── Community lists ───────────────────────────────────────────────────

  fn get_list(
    &self,
    owner: ListOwner,
  ) -> impl Future<Output = Result<Option<CommunityList>, Self::Error>> + Send + '_;

  /// Create the owner's list. Fails if one already exists.
  fn create_list(
    &self,
    owner: ListOwner,
  ) -> impl Future<Output = Result<CommunityList, Self::Error>> + Send + '_;

  /// Explicitly track a document. Adding an already-tracked document is a
  /// no-op.
  fn add_document_to_list(
    &self,
    list_id: Uuid,
    doc_id: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Stop explicitly tracking a document. Returns whether it was tracked.
  fn remove_document_from_list(
    &self,
    list_id: Uuid,
    doc_id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Explicitly tracked documents, ordered by name.
  fn added_documents(
    &self,
    list_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Document>, Self::Error>> + Send + '_;

  /// Attach a rule to a list. Fires `IndexTrigger::RuleAdded` for
  /// `name_contains` rules.
  fn add_rule(
    &self,
    list_id: Uuid,
    kind: RuleKind,
  ) -> impl Future<Output = Result<SearchRule, Self::Error>> + Send + '_;

  /// Remove a rule from a list. Returns whether it existed.
  fn remove_rule(
    &self,
    list_id: Uuid,
    rule_id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Replace a `name_contains` rule's pattern. Fires
  /// `IndexTrigger::RuleTextChanged`.
  fn update_rule_text(
    &self,
    rule_id: Uuid,
    text: NamePattern,
  ) -> impl Future<Output = Result<SearchRule, Self::Error>> + Send + '_;

  fn get_rule(
    &self,
    rule_id: Uuid,
  ) -> impl Future<Output = Result<Option<SearchRule>, Self::Error>> + Send + '_;

  fn list_rules(
    &self,
    list_id: Uuid,
  ) -> impl Future<Output = Result<Vec<SearchRule>, Self::Error>> + Send + '_;

  // ── Matching ──────────────────────────────────────────────────────────

  /// Documents currently satisfying the rule, ordered by name.
  fn docs_matching_rule(
    &self,
    rule_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Document>, Self::Error>> + Send + '_;

  /// Rules, across all lists, currently matching the document.
  ///
  /// Consistent with [`CommunityStore::docs_matching_rule`]: a document is
  /// among a rule's matches iff the rule is among the document's.
  fn rules_matching_doc(
    &self,
    doc_id: Uuid,
  ) -> impl Future<Output = Result<Vec<SearchRule>, Self::Error>> + Send + '_;

  /// Recompute a `name_contains` rule's index entries from the whole
  /// corpus. Returns the number of matching documents. Idempotent.
  fn reset_name_contains_index_for_rule(
    &self,
    rule_id: Uuid,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  /// Added documents plus every document matched by any of the list's
  /// rules, ordered by name, without duplicates.
  fn docs_tracked_by_list(
    &self,
    list_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Document>, Self::Error>> + Send + '_;

  /// Lists that track the document explicitly or through a rule.
  fn lists_tracking_doc(
    &self,
    doc_id: Uuid,
  ) -> impl Future<Output = Result<Vec<CommunityList>, Self::Error>> + Send + '_;

  // ── Subscriptions ─────────────────────────────────────────────────────

  /// Subscribe an address. Subscribing twice with the same policy returns
  /// the existing subscription.
  fn add_subscription(
    &self,
    list_id: Uuid,
    email: String,
    notify_on: NotifyOn,
  ) -> impl Future<Output = Result<EmailSubscription, Self::Error>> + Send + '_;

  /// Returns whether the subscription existed on that list.
  fn remove_subscription(
    &self,
    list_id: Uuid,
    subscription_id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  fn list_subscriptions(
    &self,
    list_id: Uuid,
  ) -> impl Future<Output = Result<Vec<EmailSubscription>, Self::Error>> + Send + '_;
}
