//! Email notification of document changes to community-list subscribers.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  document::{DocEvent, Document, State, StateType},
  list::CommunityList,
  store::CommunityStore,
};

// ─── Significance ────────────────────────────────────────────────────────────

const SIGNIFICANT_DRAFT_STATES: &[&str] = &["rfc"];

const SIGNIFICANT_IESG_STATES: &[&str] = &[
  "pub-req", "lc", "iesg-eva", "approved", "ann", "rfcqueue", "pub", "dead",
];

/// Whether entering `state` is a significant change.
pub fn is_significant(state: &State) -> bool {
  let slugs = match state.state_type {
    StateType::Draft => SIGNIFICANT_DRAFT_STATES,
    StateType::DraftIesg => SIGNIFICANT_IESG_STATES,
    _ => return false,
  };
  slugs.contains(&state.slug.as_str())
}

/// An event is significant iff it is a state change into a significant state.
pub fn is_significant_event(event: &DocEvent) -> bool {
  event.new_state().is_some_and(is_significant)
}

// ─── Mail transport ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
  pub from:    String,
  pub to:      String,
  pub subject: String,
  pub body:    String,
}

/// Outbound mail transport.
pub trait Mailer: Send + Sync {
  fn send(&self, message: Message) -> Result<()>;
}

/// Keeps every sent message in memory. Used by tests and dry runs.
#[derive(Debug, Default)]
pub struct Outbox {
  messages: Mutex<Vec<Message>>,
}

impl Outbox {
  pub fn new() -> Self { Self::default() }

  pub fn messages(&self) -> Vec<Message> {
    self.messages.lock().map(|m| m.clone()).unwrap_or_default()
  }

  pub fn len(&self) -> usize { self.messages.lock().map(|m| m.len()).unwrap_or(0) }

  pub fn is_empty(&self) -> bool { self.len() == 0 }
}

impl Mailer for Outbox {
  fn send(&self, message: Message) -> Result<()> {
    self
      .messages
      .lock()
      .map_err(|e| Error::Mail(e.to_string()))?
      .push(message);
    Ok(())
  }
}

/// Writes each message to the log instead of delivering it.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailer;

impl Mailer for LogMailer {
  fn send(&self, message: Message) -> Result<()> {
    tracing::info!(
      to = %message.to,
      subject = %message.subject,
      "outgoing mail\n{}",
      message.body
    );
    Ok(())
  }
}

// ─── Dispatch ────────────────────────────────────────────────────────────────

/// Compose the notification for one subscriber of `list`.
pub fn compose(
  from: &str,
  to: &str,
  list: &CommunityList,
  doc: &Document,
  event: &DocEvent,
) -> Message {
  Message {
    from:    from.to_owned(),
    to:      to.to_owned(),
    subject: format!("{} notification: Changes to {}", list.long_name, doc.name),
    body:    format!(
      "Hello,\n\nThis is a notification from the {}.\n\n\
       Document: {}, {}\n\nChange at {}:\n\n{}\n",
      list.long_name,
      doc.name,
      doc.title,
      event.time.format("%Y-%m-%d %H:%M UTC"),
      event.desc,
    ),
  }
}

/// Send one message per subscription, across every list tracking the
/// event's document, whose policy accepts the event. Returns the number of
/// messages sent.
pub async fn notify_event_to_subscribers<S: CommunityStore>(
  store: &S,
  mailer: &dyn Mailer,
  from: &str,
  event: &DocEvent,
) -> Result<usize> {
  let doc = store
    .get_document(event.doc_id)
    .await
    .map_err(Error::store)?
    .ok_or(Error::DocumentNotFound(event.doc_id))?;

  let significant = is_significant_event(event);
  let lists = store.lists_tracking_doc(doc.doc_id).await.map_err(Error::store)?;

  let mut sent = 0;
  for list in &lists {
    let subscriptions = store
      .list_subscriptions(list.list_id)
      .await
      .map_err(Error::store)?;
    for sub in subscriptions.iter().filter(|s| s.notify_on.accepts(significant)) {
      mailer.send(compose(from, &sub.email, list, &doc, event))?;
      sent += 1;
    }
  }

  tracing::info!(
    doc = %doc.name,
    significant,
    lists = lists.len(),
    sent,
    "dispatched document change notifications"
  );
  Ok(sent)
}
