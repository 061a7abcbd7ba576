//! Integration tests for `SqliteStore` against an in-memory database.

use chrono::{Duration, Utc};
use dt_core::{
  document::{DocEventKind, Document, NewDocEvent, NewDocument, State, StateType},
  group::{Group, NewGroup},
  list::{ListOwner, NotifyOn, setup_default_community_list_for_group},
  name_index::NamePattern,
  notify::{Outbox, notify_event_to_subscribers},
  person::{NewPerson, Person, Resolution, resolve_person},
  rule::{RuleKind, SearchRule},
  store::CommunityStore,
};
use uuid::Uuid;

use crate::{Error, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

// ─── Fixtures ────────────────────────────────────────────────────────────────

struct World {
  ad:    Person,
  plain: Person,
  area:  Group,
  wg:    Group,
  draft: Document,
}

/// An active working group draft in IESG last call, authored and sponsored by
/// the AD and shepherded by a plain user.
async fn world(s: &SqliteStore) -> World {
  let ad = s
    .add_person(NewPerson::new("Area Director").with_email("ad@example.org").with_username("ad"))
    .await
    .unwrap();
  let plain = s
    .add_person(NewPerson::new("Plain Man").with_email("plain@example.com"))
    .await
    .unwrap();
  let area = s
    .add_group(NewGroup { name: "Far Future".into(), ..NewGroup::new("farfut", "area") })
    .await
    .unwrap();
  let wg = s
    .add_group(NewGroup {
      name: "Martian Special Interest Group".into(),
      ..NewGroup::new("mars", "wg").with_parent(area.group_id)
    })
    .await
    .unwrap();

  let draft = s
    .add_document(NewDocument {
      group_id: Some(wg.group_id),
      ad_id: Some(ad.person_id),
      shepherd: Some("plain@example.com".into()),
      authors: vec![ad.person_id],
      states: vec![State::iesg("lc"), State::draft("active")],
      title: "Martian Routing".into(),
      ..NewDocument::draft("draft-ietf-mars-routing-thing")
    })
    .await
    .unwrap();

  World { ad, plain, area, wg, draft }
}

fn ids(docs: &[Document]) -> Vec<Uuid> { docs.iter().map(|d| d.doc_id).collect() }

fn rule_ids(rules: &[SearchRule]) -> Vec<Uuid> { rules.iter().map(|r| r.rule_id).collect() }

async fn rule(s: &SqliteStore, list_id: Uuid, kind: RuleKind) -> crate::Result<SearchRule> {
  s.add_rule(list_id, kind).await
}

// ─── People ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn add_and_get_person() {
  let s = store().await;
  let p = s
    .add_person(NewPerson::new("Plain Man").with_email("plain@example.com"))
    .await
    .unwrap();

  let fetched = s.get_person(p.person_id).await.unwrap().unwrap();
  assert_eq!(fetched, p);

  let emails = s.person_emails(p.person_id).await.unwrap();
  assert_eq!(emails.len(), 1);
  assert!(emails[0].primary);
}

#[tokio::test]
async fn get_person_missing_returns_none() {
  let s = store().await;
  assert!(s.get_person(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn second_email_is_not_primary() {
  let s = store().await;
  let p = s
    .add_person(NewPerson::new("Plain Man").with_email("plain@example.com"))
    .await
    .unwrap();
  let extra = s.add_email(p.person_id, "other@example.com".into()).await.unwrap();
  assert!(!extra.primary);
  assert_eq!(s.person_emails(p.person_id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn add_email_to_unknown_person_errors() {
  let s = store().await;
  let err = s
    .add_email(Uuid::new_v4(), "ghost@example.com".into())
    .await
    .unwrap_err();
  assert!(matches!(err, Error::PersonNotFound(_)));
}

#[tokio::test]
async fn lookup_by_email_and_by_name() {
  let s = store().await;
  let p = s
    .add_person(NewPerson::new("Plain Man").with_email("plain@example.com"))
    .await
    .unwrap();

  let by_email = s.lookup_persons("plain@example.com").await.unwrap();
  assert_eq!(by_email, vec![p.clone()]);

  let by_name = s.lookup_persons("Plain Man").await.unwrap();
  assert_eq!(by_name, vec![p.clone()]);

  s.add_alias(p.person_id, "P. Man".into()).await.unwrap();
  assert_eq!(s.lookup_persons("P. Man").await.unwrap(), vec![p]);

  assert!(s.lookup_persons("nobody").await.unwrap().is_empty());
}

#[tokio::test]
async fn duplicate_names_are_ambiguous() {
  let s = store().await;
  let a = s
    .add_person(NewPerson::new("John Q. Public").with_email("bazquux@example.com"))
    .await
    .unwrap();
  let b = s
    .add_person(NewPerson::new("John Q. Public").with_email("foobar@example.com"))
    .await
    .unwrap();

  let candidates = s.lookup_persons("John Q. Public").await.unwrap();
  assert_eq!(candidates.len(), 2);

  match resolve_person(candidates.clone(), None) {
    Resolution::Ambiguous(people) => assert_eq!(people.len(), 2),
    other => panic!("expected ambiguity, got {other:?}"),
  }
  assert_eq!(resolve_person(candidates, Some(b.person_id)), Resolution::Unique(b));

  // The email address is still unambiguous.
  let by_email = s.lookup_persons("bazquux@example.com").await.unwrap();
  assert_eq!(resolve_person(by_email, None), Resolution::Unique(a));
}

#[tokio::test]
async fn credentials_roundtrip() {
  let s = store().await;
  let p = s.add_person(NewPerson::new("Plain Man")).await.unwrap();
  assert!(s.credentials("plain").await.unwrap().is_none());

  s.set_credentials(p.person_id, "plain".into(), "$argon2id$fake".into())
    .await
    .unwrap();
  let creds = s.credentials("plain").await.unwrap().unwrap();
  assert_eq!(creds.person_id, p.person_id);
  assert_eq!(creds.password_hash, "$argon2id$fake");

  let err = s
    .set_credentials(Uuid::new_v4(), "ghost".into(), "x".into())
    .await
    .unwrap_err();
  assert!(matches!(err, Error::PersonNotFound(_)));
}

// ─── Groups ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn groups_and_roles() {
  let s = store().await;
  let w = world(&s).await;

  let found = s.get_group_by_acronym("mars").await.unwrap().unwrap();
  assert_eq!(found, w.wg);
  assert_eq!(found.parent_id, Some(w.area.group_id));
  assert!(s.get_group_by_acronym("nope").await.unwrap().is_none());

  s.add_role(w.wg.group_id, w.plain.person_id, "chair".into()).await.unwrap();
  s.add_role(w.wg.group_id, w.plain.person_id, "chair".into()).await.unwrap();
  assert_eq!(
    s.roles_in_group(w.wg.group_id, w.plain.person_id).await.unwrap(),
    vec!["chair".to_string()]
  );
  assert!(s.roles_in_group(w.wg.group_id, w.ad.person_id).await.unwrap().is_empty());
}

// ─── Documents ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn document_roundtrip_keeps_states_and_authors() {
  let s = store().await;
  let w = world(&s).await;

  let fetched = s.get_document(w.draft.doc_id).await.unwrap().unwrap();
  assert_eq!(fetched.name, w.draft.name);
  assert_eq!(fetched.authors, vec![w.ad.person_id]);
  assert_eq!(fetched.state(&StateType::Draft), Some(&State::draft("active")));
  assert_eq!(fetched.states.len(), 2);

  let by_name = s.get_document_by_name(&w.draft.name).await.unwrap().unwrap();
  assert_eq!(by_name.doc_id, w.draft.doc_id);
}

#[tokio::test]
async fn document_facts_resolve_relations() {
  let s = store().await;
  let w = world(&s).await;

  let facts = s.document_facts(w.draft.doc_id).await.unwrap().unwrap();
  assert_eq!(facts.group_id, Some(w.wg.group_id));
  assert_eq!(facts.group_parent_id, Some(w.area.group_id));
  assert_eq!(facts.ad_id, Some(w.ad.person_id));
  assert_eq!(facts.shepherd_id, Some(w.plain.person_id));
  assert!(facts.author_ids.contains(&w.ad.person_id));
  assert!(facts.in_state(&State::iesg("lc")));

  assert!(s.document_facts(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn state_change_replaces_state_and_records_event() {
  let s = store().await;
  let w = world(&s).await;

  let event = s
    .add_state_change_event(w.draft.doc_id, w.ad.person_id, State::draft("rfc"))
    .await
    .unwrap();
  match &event.kind {
    DocEventKind::ChangedState { state, prev } => {
      assert_eq!(state, &State::draft("rfc"));
      assert_eq!(prev.as_ref(), Some(&State::draft("active")));
    }
    other => panic!("unexpected event kind {other:?}"),
  }

  let doc = s.get_document(w.draft.doc_id).await.unwrap().unwrap();
  assert!(doc.states.contains(&State::draft("rfc")));
  assert!(!doc.states.contains(&State::draft("active")));
  assert!(doc.states.contains(&State::iesg("lc")));

  let err = s
    .add_state_change_event(Uuid::new_v4(), w.ad.person_id, State::draft("rfc"))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::DocumentNotFound(_)));
}

#[tokio::test]
async fn events_for_docs_newest_first_since_cutoff() {
  let s = store().await;
  let w = world(&s).await;
  let before = Utc::now() - Duration::seconds(1);

  s.add_doc_event(NewDocEvent {
    doc_id: w.draft.doc_id,
    by:     w.ad.person_id,
    kind:   DocEventKind::NewRevision { rev: "01".into() },
    desc:   "New revision available".into(),
  })
  .await
  .unwrap();
  let changed = s
    .add_state_change_event(w.draft.doc_id, w.ad.person_id, State::iesg("iesg-eva"))
    .await
    .unwrap();

  let events = s.events_for_docs(vec![w.draft.doc_id], before).await.unwrap();
  assert_eq!(events.len(), 2);
  assert_eq!(events[0].event_id, changed.event_id);
  assert_eq!(events[1].kind, DocEventKind::NewRevision { rev: "01".into() });

  let later = Utc::now() + Duration::seconds(60);
  assert!(s.events_for_docs(vec![w.draft.doc_id], later).await.unwrap().is_empty());
  assert!(s.events_for_docs(vec![], before).await.unwrap().is_empty());
}

#[tokio::test]
async fn concurrent_state_changes_chain_their_previous_states() {
  let s = store().await;
  let w = world(&s).await;

  let (a, b) = tokio::join!(
    s.add_state_change_event(w.draft.doc_id, w.ad.person_id, State::draft("rfc")),
    s.add_state_change_event(w.draft.doc_id, w.ad.person_id, State::draft("expired")),
  );
  let prev_of = |e: &dt_core::document::DocEvent| match &e.kind {
    DocEventKind::ChangedState { state, prev } => (state.clone(), prev.clone()),
    other => panic!("unexpected event kind {other:?}"),
  };
  let (a_state, a_prev) = prev_of(&a.unwrap());
  let (b_state, b_prev) = prev_of(&b.unwrap());

  // The later change records the earlier one as its previous state.
  if a_prev == Some(State::draft("active")) {
    assert_eq!(b_prev, Some(a_state));
  } else {
    assert_eq!(b_prev, Some(State::draft("active")));
    assert_eq!(a_prev, Some(b_state));
  }
}

#[tokio::test]
async fn events_for_docs_accepts_more_ids_than_host_parameters() {
  let s = store().await;
  let w = world(&s).await;
  let before = Utc::now() - Duration::seconds(1);
  s.add_state_change_event(w.draft.doc_id, w.ad.person_id, State::draft("rfc"))
    .await
    .unwrap();

  let mut ids: Vec<Uuid> = (0..40_000).map(|_| Uuid::new_v4()).collect();
  ids.push(w.draft.doc_id);
  let events = s.events_for_docs(ids, before).await.unwrap();
  assert_eq!(events.len(), 1);
  assert_eq!(events[0].doc_id, w.draft.doc_id);
}

// ─── Lists ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_list_once_per_owner() {
  let s = store().await;
  let w = world(&s).await;
  let owner = ListOwner::Person(w.plain.person_id);

  assert!(s.get_list(owner).await.unwrap().is_none());
  let list = s.create_list(owner).await.unwrap();
  assert_eq!(list.long_name, "Personal I-D list of Plain Man");
  assert_eq!(s.get_list(owner).await.unwrap().unwrap().list_id, list.list_id);

  assert!(matches!(s.create_list(owner).await.unwrap_err(), Error::ListExists));
}

#[tokio::test]
async fn track_and_untrack_is_idempotent() {
  let s = store().await;
  let w = world(&s).await;
  let list = s.create_list(ListOwner::Person(w.plain.person_id)).await.unwrap();

  s.add_document_to_list(list.list_id, w.draft.doc_id).await.unwrap();
  s.add_document_to_list(list.list_id, w.draft.doc_id).await.unwrap();
  assert_eq!(ids(&s.added_documents(list.list_id).await.unwrap()), vec![w.draft.doc_id]);
  assert_eq!(
    ids(&s.docs_tracked_by_list(list.list_id).await.unwrap()),
    vec![w.draft.doc_id]
  );

  assert!(s.remove_document_from_list(list.list_id, w.draft.doc_id).await.unwrap());
  assert!(!s.remove_document_from_list(list.list_id, w.draft.doc_id).await.unwrap());
  assert!(s.added_documents(list.list_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn rules_are_listed_and_removed() {
  let s = store().await;
  let w = world(&s).await;
  let list = s.create_list(ListOwner::Person(w.plain.person_id)).await.unwrap();

  let rule = s
    .add_rule(list.list_id, RuleKind::StateIesg { state: "lc".into() })
    .await
    .unwrap();
  assert_eq!(s.list_rules(list.list_id).await.unwrap(), vec![rule.clone()]);
  assert_eq!(s.get_rule(rule.rule_id).await.unwrap(), Some(rule.clone()));

  // Removing through another list's id does nothing.
  assert!(!s.remove_rule(Uuid::new_v4(), rule.rule_id).await.unwrap());
  assert!(s.remove_rule(list.list_id, rule.rule_id).await.unwrap());
  assert!(s.list_rules(list.list_id).await.unwrap().is_empty());
}

// ─── Matching ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn rule_matching_is_consistent_in_both_directions() {
  let s = store().await;
  let w = world(&s).await;
  let list = s.create_list(ListOwner::Person(w.plain.person_id)).await.unwrap();
  let add = |kind| rule(&s, list.list_id, kind);
  let active = || "active".to_string();

  let group = add(RuleKind::Group { group_id: w.wg.group_id, state: active() }).await.unwrap();
  let group_rfc = add(RuleKind::GroupRfc { group_id: w.wg.group_id, state: "published".into() })
    .await
    .unwrap();
  let area = add(RuleKind::Area { group_id: w.area.group_id, state: active() }).await.unwrap();
  let iesg = add(RuleKind::StateIesg { state: "lc".into() }).await.unwrap();
  let author = add(RuleKind::Author { person_id: w.ad.person_id, state: active() })
    .await
    .unwrap();
  let ad = add(RuleKind::Ad { person_id: w.ad.person_id, state: active() }).await.unwrap();
  let shepherd = add(RuleKind::Shepherd { person_id: w.plain.person_id, state: active() })
    .await
    .unwrap();
  let group_exp = add(RuleKind::GroupExp { group_id: w.wg.group_id }).await.unwrap();
  let name = add(RuleKind::NameContains {
    text:  NamePattern::new("draft-.*mars-routing-thing").unwrap(),
    state: active(),
  })
  .await
  .unwrap();
  assert_eq!(s.reset_name_contains_index_for_rule(name.rule_id).await.unwrap(), 1);

  let matching = rule_ids(&s.rules_matching_doc(w.draft.doc_id).await.unwrap());
  for hit in [&group, &area, &iesg, &author, &ad, &shepherd, &name] {
    assert!(matching.contains(&hit.rule_id), "{:?} should match", hit.kind);
    assert!(ids(&s.docs_matching_rule(hit.rule_id).await.unwrap()).contains(&w.draft.doc_id));
  }
  for miss in [&group_rfc, &group_exp] {
    assert!(!matching.contains(&miss.rule_id), "{:?} should not match", miss.kind);
    assert!(!ids(&s.docs_matching_rule(miss.rule_id).await.unwrap()).contains(&w.draft.doc_id));
  }

  s.add_state_change_event(w.draft.doc_id, w.ad.person_id, State::draft("expired"))
    .await
    .unwrap();

  let matching = rule_ids(&s.rules_matching_doc(w.draft.doc_id).await.unwrap());
  assert!(matching.contains(&group_exp.rule_id));
  assert!(!matching.contains(&group.rule_id));
  assert!(ids(&s.docs_matching_rule(group_exp.rule_id).await.unwrap()).contains(&w.draft.doc_id));
  assert!(!ids(&s.docs_matching_rule(group.rule_id).await.unwrap()).contains(&w.draft.doc_id));
}

#[tokio::test]
async fn rfc_rules_match_in_the_rfc_namespace() {
  let s = store().await;
  let w = world(&s).await;
  let list = s.create_list(ListOwner::Person(w.ad.person_id)).await.unwrap();
  let rule = s
    .add_rule(list.list_id, RuleKind::AuthorRfc {
      person_id: w.ad.person_id,
      state:     "published".into(),
    })
    .await
    .unwrap();

  assert!(s.docs_matching_rule(rule.rule_id).await.unwrap().is_empty());
  s.add_state_change_event(w.draft.doc_id, w.ad.person_id, State::rfc("published"))
    .await
    .unwrap();
  assert_eq!(ids(&s.docs_matching_rule(rule.rule_id).await.unwrap()), vec![w.draft.doc_id]);
  assert_eq!(rule_ids(&s.rules_matching_doc(w.draft.doc_id).await.unwrap()), vec![
    rule.rule_id
  ]);
}

#[tokio::test]
async fn docs_matching_unknown_rule_errors() {
  let s = store().await;
  let err = s.docs_matching_rule(Uuid::new_v4()).await.unwrap_err();
  assert!(matches!(err, Error::RuleNotFound(_)));
  let err = s.rules_matching_doc(Uuid::new_v4()).await.unwrap_err();
  assert!(matches!(err, Error::DocumentNotFound(_)));
}

// ─── Name index ──────────────────────────────────────────────────────────────

async fn name_rule(s: &SqliteStore, owner: Uuid, pattern: &str) -> SearchRule {
  let list = s.create_list(ListOwner::Person(owner)).await.unwrap();
  s.add_rule(list.list_id, RuleKind::NameContains {
    text:  NamePattern::new(pattern).unwrap(),
    state: "active".into(),
  })
  .await
  .unwrap()
}

#[tokio::test]
async fn name_rule_is_indexed_when_added() {
  let s = store().await;
  let w = world(&s).await;
  let rule = name_rule(&s, w.plain.person_id, "mars").await;

  assert_eq!(ids(&s.docs_matching_rule(rule.rule_id).await.unwrap()), vec![w.draft.doc_id]);
  // Resetting recomputes the same entries.
  assert_eq!(s.reset_name_contains_index_for_rule(rule.rule_id).await.unwrap(), 1);
  assert_eq!(s.reset_name_contains_index_for_rule(rule.rule_id).await.unwrap(), 1);
  assert_eq!(ids(&s.docs_matching_rule(rule.rule_id).await.unwrap()), vec![w.draft.doc_id]);
}

#[tokio::test]
async fn new_documents_are_indexed_against_existing_rules() {
  let s = store().await;
  let w = world(&s).await;
  let rule = name_rule(&s, w.plain.person_id, "^draft-.*-venus").await;
  assert!(s.docs_matching_rule(rule.rule_id).await.unwrap().is_empty());

  let venus = s
    .add_document(NewDocument {
      states: vec![State::draft("active")],
      ..NewDocument::draft("draft-ietf-venus-clouds")
    })
    .await
    .unwrap();
  assert_eq!(ids(&s.docs_matching_rule(rule.rule_id).await.unwrap()), vec![venus.doc_id]);
  assert_eq!(rule_ids(&s.rules_matching_doc(venus.doc_id).await.unwrap()), vec![rule.rule_id]);
}

#[tokio::test]
async fn renaming_a_document_reindexes_it() {
  let s = store().await;
  let w = world(&s).await;
  let rule = name_rule(&s, w.plain.person_id, "jupiter").await;
  assert!(s.docs_matching_rule(rule.rule_id).await.unwrap().is_empty());

  let renamed = s
    .rename_document(w.draft.doc_id, "draft-ietf-jupiter-moons".into())
    .await
    .unwrap();
  assert_eq!(renamed.name, "draft-ietf-jupiter-moons");
  assert_eq!(ids(&s.docs_matching_rule(rule.rule_id).await.unwrap()), vec![w.draft.doc_id]);

  s.rename_document(w.draft.doc_id, "draft-ietf-saturn-rings".into())
    .await
    .unwrap();
  assert!(s.docs_matching_rule(rule.rule_id).await.unwrap().is_empty());

  let err = s.rename_document(Uuid::new_v4(), "x".into()).await.unwrap_err();
  assert!(matches!(err, Error::DocumentNotFound(_)));
}

#[tokio::test]
async fn changing_the_pattern_reindexes_the_rule() {
  let s = store().await;
  let w = world(&s).await;
  let rule = name_rule(&s, w.plain.person_id, "venus").await;
  assert!(s.docs_matching_rule(rule.rule_id).await.unwrap().is_empty());

  let updated = s
    .update_rule_text(rule.rule_id, NamePattern::new("mars-routing").unwrap())
    .await
    .unwrap();
  assert_eq!(updated.kind.name_pattern().map(NamePattern::as_str), Some("mars-routing"));
  assert_eq!(ids(&s.docs_matching_rule(rule.rule_id).await.unwrap()), vec![w.draft.doc_id]);
}

#[tokio::test]
async fn pattern_updates_only_apply_to_name_rules() {
  let s = store().await;
  let w = world(&s).await;
  let list = s.create_list(ListOwner::Person(w.plain.person_id)).await.unwrap();
  let rule = s
    .add_rule(list.list_id, RuleKind::StateIesg { state: "lc".into() })
    .await
    .unwrap();

  let pattern = NamePattern::new("x").unwrap();
  let err = s.update_rule_text(rule.rule_id, pattern.clone()).await.unwrap_err();
  assert!(matches!(err, Error::NotANameRule(_)));
  let err = s.update_rule_text(Uuid::new_v4(), pattern).await.unwrap_err();
  assert!(matches!(err, Error::RuleNotFound(_)));
  let err = s.reset_name_contains_index_for_rule(rule.rule_id).await.unwrap_err();
  assert!(matches!(err, Error::NotANameRule(_)));
}

// ─── Tracking ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn tracked_documents_union_added_and_matched() {
  let s = store().await;
  let w = world(&s).await;
  let other = s
    .add_document(NewDocument {
      states: vec![State::draft("active")],
      ..NewDocument::draft("draft-smith-other")
    })
    .await
    .unwrap();
  let list = s.create_list(ListOwner::Person(w.plain.person_id)).await.unwrap();

  s.add_document_to_list(list.list_id, other.doc_id).await.unwrap();
  s.add_document_to_list(list.list_id, w.draft.doc_id).await.unwrap();
  s.add_rule(list.list_id, RuleKind::Group { group_id: w.wg.group_id, state: "active".into() })
    .await
    .unwrap();

  let tracked = s.docs_tracked_by_list(list.list_id).await.unwrap();
  let names: Vec<_> = tracked.iter().map(|d| d.name.as_str()).collect();
  assert_eq!(names, ["draft-ietf-mars-routing-thing", "draft-smith-other"]);

  let lists = s.lists_tracking_doc(w.draft.doc_id).await.unwrap();
  assert_eq!(lists.len(), 1);
  assert_eq!(lists[0].list_id, list.list_id);
}

#[tokio::test]
async fn default_group_list_is_created_once() {
  let s = store().await;
  let w = world(&s).await;

  let (list, rules) = setup_default_community_list_for_group(&s, &w.wg).await.unwrap();
  assert_eq!(list.long_name, "I-D list for Martian Special Interest Group");
  assert_eq!(list.owner, ListOwner::Group(w.wg.group_id));
  let types: Vec<_> = rules.iter().map(|r| r.kind.rule_type()).collect();
  assert_eq!(types, ["group", "group_rfc", "group_exp"]);

  let (again, rules_again) = setup_default_community_list_for_group(&s, &w.wg).await.unwrap();
  assert_eq!(again.list_id, list.list_id);
  assert_eq!(rules_again.len(), 3);

  assert_eq!(
    ids(&s.docs_tracked_by_list(list.list_id).await.unwrap()),
    vec![w.draft.doc_id]
  );
}

// ─── Subscriptions ───────────────────────────────────────────────────────────

#[tokio::test]
async fn subscriptions_are_idempotent_per_policy() {
  let s = store().await;
  let w = world(&s).await;
  let list = s.create_list(ListOwner::Person(w.plain.person_id)).await.unwrap();

  let first = s
    .add_subscription(list.list_id, "plain@example.com".into(), NotifyOn::All)
    .await
    .unwrap();
  let again = s
    .add_subscription(list.list_id, "plain@example.com".into(), NotifyOn::All)
    .await
    .unwrap();
  assert_eq!(first, again);
  s.add_subscription(list.list_id, "plain@example.com".into(), NotifyOn::Significant)
    .await
    .unwrap();
  assert_eq!(s.list_subscriptions(list.list_id).await.unwrap().len(), 2);

  assert!(s.remove_subscription(list.list_id, first.subscription_id).await.unwrap());
  assert!(!s.remove_subscription(list.list_id, first.subscription_id).await.unwrap());
  assert_eq!(s.list_subscriptions(list.list_id).await.unwrap().len(), 1);

  let err = s
    .add_subscription(Uuid::new_v4(), "plain@example.com".into(), NotifyOn::All)
    .await
    .unwrap_err();
  assert!(matches!(err, Error::ListNotFound(_)));
}

// ─── Notification ────────────────────────────────────────────────────────────

#[tokio::test]
async fn significant_subscribers_only_hear_about_significant_changes() {
  let s = store().await;
  let w = world(&s).await;
  let list = s.create_list(ListOwner::Person(w.plain.person_id)).await.unwrap();
  s.add_document_to_list(list.list_id, w.draft.doc_id).await.unwrap();
  s.add_subscription(list.list_id, "plain@example.com".into(), NotifyOn::Significant)
    .await
    .unwrap();
  let outbox = Outbox::new();
  let from = "noreply@example.org";

  let event = s
    .add_state_change_event(w.draft.doc_id, w.ad.person_id, State::draft("active"))
    .await
    .unwrap();
  assert_eq!(notify_event_to_subscribers(&s, &outbox, from, &event).await.unwrap(), 0);
  assert!(outbox.is_empty());

  let event = s
    .add_state_change_event(w.draft.doc_id, w.ad.person_id, State::draft("rfc"))
    .await
    .unwrap();
  assert_eq!(notify_event_to_subscribers(&s, &outbox, from, &event).await.unwrap(), 1);
  let messages = outbox.messages();
  assert_eq!(messages[0].to, "plain@example.com");
  assert!(messages[0].subject.contains(&w.draft.name));
}

#[tokio::test]
async fn all_subscribers_hear_about_every_change() {
  let s = store().await;
  let w = world(&s).await;
  let (list, _) = setup_default_community_list_for_group(&s, &w.wg).await.unwrap();
  s.add_subscription(list.list_id, "mars@ietf.org".into(), NotifyOn::All)
    .await
    .unwrap();
  let outbox = Outbox::new();

  // Tracked through the group rule, not explicitly.
  let event = s
    .add_doc_event(NewDocEvent {
      doc_id: w.draft.doc_id,
      by:     w.ad.person_id,
      kind:   DocEventKind::AddedComment,
      desc:   "A comment".into(),
    })
    .await
    .unwrap();
  assert_eq!(
    notify_event_to_subscribers(&s, &outbox, "noreply@example.org", &event).await.unwrap(),
    1
  );
  assert!(outbox.messages()[0].subject.starts_with("I-D list for Martian"));
}
