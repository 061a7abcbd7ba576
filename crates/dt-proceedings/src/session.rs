//! One group's materials at one meeting.
//!
//! Agenda and minutes are single files named `<material>-<meeting>-<acronym>`
//! and replaced on every upload. Slides are numbered decks with a
//! presentation order, recorded in a manifest next to the material
//! directories. A deleted deck stays in the manifest so its number is never
//! handed out again.

use std::{
  fs, io,
  path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{
  Error, MaterialType, MeetingDir, Result, Upload,
  meeting::check_filename,
  numbering::{next_order_number, next_slide_number},
};

/// One slide deck in a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlideDeck {
  /// `slides-<meeting>-<acronym>-<n>`.
  pub name:    String,
  pub title:   String,
  pub order:   u32,
  /// The stored file under `slides/`.
  pub file:    String,
  #[serde(default, skip_serializing_if = "std::ops::Not::not")]
  pub deleted: bool,
}

/// Which neighbour a deck trades places with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
  Up,
  Down,
}

/// The materials of group `acronym` at one meeting.
#[derive(Debug, Clone)]
pub struct SessionMaterials {
  meeting: MeetingDir,
  acronym: String,
}

impl SessionMaterials {
  pub fn new(meeting: MeetingDir, acronym: impl Into<String>) -> Result<Self> {
    let acronym = acronym.into();
    check_filename(&acronym)?;
    Ok(Self { meeting, acronym })
  }

  pub fn meeting(&self) -> &MeetingDir { &self.meeting }

  pub fn acronym(&self) -> &str { &self.acronym }

  // ─── Slides ────────────────────────────────────────────────────────────────

  fn manifest_path(&self) -> PathBuf {
    self.meeting.path().join(format!(".slides-{}.json", self.acronym))
  }

  fn load(&self) -> Result<Vec<SlideDeck>> {
    let path = self.manifest_path();
    match fs::read(&path) {
      Ok(bytes) => {
        serde_json::from_slice(&bytes).map_err(|source| Error::Manifest { path, source })
      }
      Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
      Err(e) => Err(Error::io(&path)(e)),
    }
  }

  fn save(&self, decks: &[SlideDeck]) -> Result<()> {
    let path = self.manifest_path();
    let json = serde_json::to_vec_pretty(decks)
      .map_err(|source| Error::Manifest { path: path.clone(), source })?;
    fs::write(&path, json).map_err(Error::io(&path))
  }

  /// Decks that are not deleted, in presentation order.
  pub fn slides(&self) -> Result<Vec<SlideDeck>> { Ok(active(self.load()?)) }

  /// Store a new deck under the next free number, last in the running order.
  pub fn add_slides(
    &self,
    title: &str,
    ext: Option<&str>,
    bytes: &[u8],
  ) -> Result<(SlideDeck, Upload)> {
    let mut decks = self.load()?;

    // Files put in place by hand count as taken too.
    let mut taken: Vec<String> = decks.iter().map(|d| d.name.clone()).collect();
    taken.extend(stems(&self.meeting.material_dir(MaterialType::Slides))?);
    let number = next_slide_number(self.meeting.number(), &self.acronym, &taken)?;
    let orders: Vec<u32> = decks.iter().map(|d| d.order).collect();
    let order = next_order_number(&orders)?;

    let name = format!("slides-{}-{}-{number}", self.meeting.number(), self.acronym);
    let file = file_name(&name, ext)?;
    let upload = self.meeting.handle_upload(MaterialType::Slides, &file, bytes)?;

    let deck = SlideDeck { name, title: title.to_owned(), order, file, deleted: false };
    decks.push(deck.clone());
    self.save(&decks)?;
    tracing::info!(
      meeting = %self.meeting.number(),
      acronym = %self.acronym,
      deck = %deck.name,
      order = deck.order,
      "added slides"
    );
    Ok((deck, upload))
  }

  /// Swap `name` with the deck before or after it. Moving the first deck up
  /// or the last one down changes nothing. Returns the new running order.
  pub fn move_slide(&self, name: &str, direction: Direction) -> Result<Vec<SlideDeck>> {
    let mut decks = self.load()?;
    let mut running: Vec<usize> = (0..decks.len()).filter(|&i| !decks[i].deleted).collect();
    running.sort_by_key(|&i| decks[i].order);

    let pos = running
      .iter()
      .position(|&i| decks[i].name == name)
      .ok_or_else(|| Error::NoSuchMaterial(name.to_owned()))?;
    let neighbour = match direction {
      Direction::Up => pos.checked_sub(1),
      Direction::Down => Some(pos + 1).filter(|&p| p < running.len()),
    };

    if let Some(other) = neighbour {
      let (a, b) = (running[pos], running[other]);
      let order = decks[a].order;
      decks[a].order = decks[b].order;
      decks[b].order = order;
      self.save(&decks)?;
      tracing::debug!(deck = %name, ?direction, "moved slides");
    }
    Ok(active(decks))
  }

  // ─── Agenda and minutes ────────────────────────────────────────────────────

  fn single_name(&self, material: MaterialType) -> Result<String> {
    match material {
      MaterialType::Agenda | MaterialType::Minutes => {
        Ok(format!("{material}-{}-{}", self.meeting.number(), self.acronym))
      }
      other => Err(Error::NotSessionMaterial(other)),
    }
  }

  /// Store the session's agenda or minutes, replacing any earlier upload
  /// whatever its extension.
  pub fn replace(&self, material: MaterialType, ext: Option<&str>, bytes: &[u8]) -> Result<Upload> {
    let name = self.single_name(material)?;
    let file = file_name(&name, ext)?;
    remove_named(&self.meeting.material_dir(material), &name)?;
    self.meeting.handle_upload(material, &file, bytes)
  }

  /// File name of the current agenda or minutes, if one was uploaded.
  pub fn current(&self, material: MaterialType) -> Result<Option<String>> {
    let name = self.single_name(material)?;
    let found = named_entries(&self.meeting.material_dir(material), &name)?
      .into_iter()
      .find(|p| p.is_file())
      .and_then(|p| p.file_name().map(|f| f.to_string_lossy().into_owned()));
    Ok(found)
  }

  // ─── Deletion ──────────────────────────────────────────────────────────────

  /// Remove a material's files. A slide deck is also marked deleted in the
  /// manifest. Returns the removed paths.
  pub fn delete(&self, material: MaterialType, name: &str) -> Result<Vec<PathBuf>> {
    check_filename(name)?;
    let dir = self.meeting.material_dir(material);

    if material == MaterialType::Slides {
      let mut decks = self.load()?;
      let deck = decks
        .iter_mut()
        .find(|d| d.name == name && !d.deleted)
        .ok_or_else(|| Error::NoSuchMaterial(name.to_owned()))?;
      deck.deleted = true;
      self.save(&decks)?;
      return remove_named(&dir, name);
    }

    if self.single_name(material)? != name {
      return Err(Error::NoSuchMaterial(name.to_owned()));
    }
    let removed = remove_named(&dir, name)?;
    if removed.is_empty() {
      return Err(Error::NoSuchMaterial(name.to_owned()));
    }
    tracing::info!(meeting = %self.meeting.number(), %material, %name, "deleted material");
    Ok(removed)
  }
}

fn active(decks: Vec<SlideDeck>) -> Vec<SlideDeck> {
  let mut decks: Vec<_> = decks.into_iter().filter(|d| !d.deleted).collect();
  decks.sort_by_key(|d| d.order);
  decks
}

fn file_name(name: &str, ext: Option<&str>) -> Result<String> {
  match ext {
    None => Ok(name.to_owned()),
    Some(ext) if !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()) => {
      Ok(format!("{name}.{ext}"))
    }
    Some(ext) => Err(Error::InvalidFilename(format!("{name}.{ext}"))),
  }
}

/// Entries of `dir` called `name` or `name.<ext>`, sorted.
fn named_entries(dir: &Path, name: &str) -> Result<Vec<PathBuf>> {
  let entries = match fs::read_dir(dir) {
    Ok(entries) => entries,
    Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
    Err(e) => return Err(Error::io(dir)(e)),
  };
  let dotted = format!("{name}.");
  let mut found = Vec::new();
  for entry in entries {
    let entry = entry.map_err(Error::io(dir))?;
    let file_name = entry.file_name();
    let file_name = file_name.to_string_lossy();
    if file_name == name || file_name.starts_with(&dotted) {
      found.push(entry.path());
    }
  }
  found.sort();
  Ok(found)
}

fn remove_named(dir: &Path, name: &str) -> Result<Vec<PathBuf>> {
  let found = named_entries(dir, name)?;
  for path in &found {
    let removed = if path.is_dir() { fs::remove_dir_all(path) } else { fs::remove_file(path) };
    removed.map_err(Error::io(path))?;
  }
  Ok(found)
}

/// File stems present in `dir`.
fn stems(dir: &Path) -> Result<Vec<String>> {
  let entries = match fs::read_dir(dir) {
    Ok(entries) => entries,
    Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
    Err(e) => return Err(Error::io(dir)(e)),
  };
  let mut stems = Vec::new();
  for entry in entries {
    let entry = entry.map_err(Error::io(dir))?;
    if let Some(stem) = entry.path().file_stem() {
      stems.push(stem.to_string_lossy().into_owned());
    }
  }
  Ok(stems)
}
