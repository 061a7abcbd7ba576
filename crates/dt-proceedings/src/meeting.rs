//! The per-meeting materials directory and upload handling.

use std::{
  fmt,
  fs,
  io::{Cursor, Read as _},
  path::{Path, PathBuf},
  str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::{Error, Result, numbering::next_interim_number};

// ─── MaterialType ────────────────────────────────────────────────────────────

/// The kinds of material a meeting directory holds, one subdirectory each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaterialType {
  Slides,
  Agenda,
  Minutes,
  Id,
  Rfc,
}

impl MaterialType {
  pub const ALL: [MaterialType; 5] =
    [Self::Slides, Self::Agenda, Self::Minutes, Self::Id, Self::Rfc];

  /// The subdirectory name, which is also the wire name.
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Slides => "slides",
      Self::Agenda => "agenda",
      Self::Minutes => "minutes",
      Self::Id => "id",
      Self::Rfc => "rfc",
    }
  }
}

impl fmt::Display for MaterialType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for MaterialType {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    Self::ALL
      .into_iter()
      .find(|m| m.as_str() == s)
      .ok_or_else(|| Error::UnknownMaterial(s.to_owned()))
  }
}

// ─── MeetingDir ──────────────────────────────────────────────────────────────

/// Where an upload ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
  /// The uploaded file itself.
  pub stored:    PathBuf,
  /// Files unpacked from a zip upload; empty for anything else.
  pub extracted: Vec<PathBuf>,
}

/// One meeting's directory under the proceedings root.
#[derive(Debug, Clone)]
pub struct MeetingDir {
  number: String,
  path:   PathBuf,
}

impl MeetingDir {
  pub fn new(root: impl AsRef<Path>, meeting_number: impl Into<String>) -> Self {
    let number = meeting_number.into();
    let path = root.as_ref().join(&number);
    Self { number, path }
  }

  /// Create the directory tree of a group's next interim meeting in `year`.
  pub fn create_interim(root: impl AsRef<Path>, acronym: &str, year: i32) -> Result<Self> {
    check_filename(acronym)?;
    let root = root.as_ref();
    fs::create_dir_all(root).map_err(Error::io(root))?;

    let mut existing = Vec::new();
    for entry in fs::read_dir(root).map_err(Error::io(root))? {
      let entry = entry.map_err(Error::io(root))?;
      existing.push(entry.file_name().to_string_lossy().into_owned());
    }
    let meeting = Self::new(root, next_interim_number(acronym, year, &existing)?);
    meeting.make_directories()?;
    tracing::info!(meeting = %meeting.number, "created interim meeting");
    Ok(meeting)
  }

  pub fn number(&self) -> &str { &self.number }

  pub fn path(&self) -> &Path { &self.path }

  pub fn material_dir(&self, material: MaterialType) -> PathBuf {
    self.path.join(material.as_str())
  }

  /// Create the meeting directory and every material subdirectory. Existing
  /// directories are left alone.
  pub fn make_directories(&self) -> Result<()> {
    for material in MaterialType::ALL {
      let dir = self.material_dir(material);
      fs::create_dir_all(&dir).map_err(Error::io(&dir))?;
    }
    tracing::debug!(
      meeting = %self.number,
      path = %self.path.display(),
      "created materials directories"
    );
    Ok(())
  }

  /// Store `bytes` as `filename` under the material's subdirectory.
  ///
  /// A `.zip` upload goes to `<material>/<base>/<filename>` and is unpacked
  /// into `<material>/<base>/`.
  pub fn handle_upload(
    &self,
    material: MaterialType,
    filename: &str,
    bytes: &[u8],
  ) -> Result<Upload> {
    check_filename(filename)?;

    let (base, is_zip) = match filename.rsplit_once('.') {
      Some((base, ext)) if ext == "zip" && !base.is_empty() => (base, true),
      _ => (filename, false),
    };

    let dir = if is_zip {
      self.material_dir(material).join(base)
    } else {
      self.material_dir(material)
    };
    fs::create_dir_all(&dir).map_err(Error::io(&dir))?;

    let stored = dir.join(filename);
    fs::write(&stored, bytes).map_err(Error::io(&stored))?;
    tracing::info!(
      meeting = %self.number,
      %material,
      path = %stored.display(),
      size = bytes.len(),
      "stored upload"
    );

    let extracted = if is_zip {
      unpack(bytes, &dir).inspect_err(|e| {
        tracing::warn!(path = %stored.display(), error = %e, "zip upload not fully unpacked");
      })?
    } else {
      Vec::new()
    };

    Ok(Upload { stored, extracted })
  }

  /// Path of a group's generated proceedings page for this meeting.
  pub fn proceedings_path(&self, acronym: &str) -> PathBuf {
    self.path.join(format!("{acronym}.html"))
  }

  /// Public URL of a group's proceedings page for this meeting.
  pub fn proceedings_url(&self, media_url: &str, acronym: &str) -> String {
    format!(
      "{}/proceedings/{}/{acronym}.html",
      media_url.trim_end_matches('/'),
      self.number
    )
  }
}

pub(crate) fn check_filename(filename: &str) -> Result<()> {
  let bad = filename.is_empty()
    || filename == "."
    || filename == ".."
    || filename.contains(['/', '\\', '\0']);
  if bad {
    return Err(Error::InvalidFilename(filename.to_owned()));
  }
  Ok(())
}

/// Unpack every file entry of the archive into `dest`.
fn unpack(bytes: &[u8], dest: &Path) -> Result<Vec<PathBuf>> {
  let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
  let mut extracted = Vec::new();

  for i in 0..archive.len() {
    let mut entry = archive.by_index(i)?;
    let relative = entry
      .enclosed_name()
      .ok_or_else(|| Error::UnsafeEntry(entry.name().to_owned()))?;
    let target = dest.join(relative);

    if entry.is_dir() {
      fs::create_dir_all(&target).map_err(Error::io(&target))?;
      continue;
    }
    if let Some(parent) = target.parent() {
      fs::create_dir_all(parent).map_err(Error::io(parent))?;
    }

    let mut contents = Vec::new();
    entry.read_to_end(&mut contents).map_err(Error::io(&target))?;
    fs::write(&target, contents).map_err(Error::io(&target))?;
    extracted.push(target);
  }

  tracing::debug!(dest = %dest.display(), files = extracted.len(), "unpacked zip upload");
  Ok(extracted)
}
