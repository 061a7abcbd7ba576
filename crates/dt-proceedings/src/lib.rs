//! Meeting proceedings on disk.
//!
//! Each meeting owns a directory under the proceedings root with one fixed
//! subdirectory per material type. Uploads land in the subdirectory of their
//! material; zip archives get a directory of their own and are unpacked into
//! it. Filesystem work is best effort: a failure part way through leaves
//! whatever was already written in place.

pub mod error;
pub mod meeting;
pub mod numbering;
pub mod session;

pub use error::{Error, Result};
pub use meeting::{MaterialType, MeetingDir, Upload};
pub use numbering::{next_interim_number, next_order_number, next_slide_number};
pub use session::{Direction, SessionMaterials, SlideDeck};
