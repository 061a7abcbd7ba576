//! Naming of interim meetings and slide decks.
//!
//! Numbers are derived from what already exists rather than from a count, so
//! a deleted meeting or deck never causes a reused name.

use crate::{Error, Result};

/// The numeric suffix of `name` after `prefix`, if `name` has that form.
fn suffix_number(name: &str, prefix: &str) -> Option<u32> {
  name.strip_prefix(prefix)?.parse().ok()
}

/// One past the highest suffix among `existing`, or `first` when there is
/// none.
fn next_suffix<S: AsRef<str>>(prefix: &str, existing: &[S], first: u32) -> Result<u32> {
  match existing.iter().filter_map(|n| suffix_number(n.as_ref(), prefix)).max() {
    Some(max) => max
      .checked_add(1)
      .ok_or_else(|| Error::NumberingExhausted(prefix.to_owned())),
    None => Ok(first),
  }
}

/// Next interim meeting number for a group in a year:
/// `interim-<year>-<acronym>-<n>`, with `n` one past the highest existing
/// suffix, starting at 1.
pub fn next_interim_number<S: AsRef<str>>(
  acronym: &str,
  year: i32,
  existing: &[S],
) -> Result<String> {
  let prefix = format!("interim-{year}-{acronym}-");
  let next = next_suffix(&prefix, existing, 1)?;
  Ok(format!("{prefix}{next}"))
}

/// Next slide deck number for a group at a meeting, one past the highest
/// `slides-<meeting>-<acronym>-<n>`, starting at 0.
pub fn next_slide_number<S: AsRef<str>>(
  meeting: &str,
  acronym: &str,
  existing: &[S],
) -> Result<u32> {
  next_suffix(&format!("slides-{meeting}-{acronym}-"), existing, 0)
}

/// Next presentation order slot: one past the highest, or 1.
pub fn next_order_number(orders: &[u32]) -> Result<u32> {
  match orders.iter().max() {
    Some(&max) => max
      .checked_add(1)
      .ok_or_else(|| Error::NumberingExhausted("order".to_owned())),
    None => Ok(1),
  }
}
