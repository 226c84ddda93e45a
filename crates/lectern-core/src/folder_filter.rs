//! Folder filter parsing for library element search.
//!
//! Callers pass folder restrictions as a comma-separated list of folder ids
//! (`"0,12,40"`). Id `0` selects the virtual General folder; every other id
//! selects a dashboard-backed folder. A blank or missing filter selects all
//! folders.
//!
//! Parsing is strict: a segment that is not a non-negative integer fails the
//! whole filter with [`Error::InvalidFilter`] rather than being skipped.

use std::collections::BTreeSet;

use crate::defaults::is_general_folder;
use crate::error::{Error, Result};

/// Parsed folder restriction.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FolderFilter {
    /// No restriction
    #[default]
    All,
    /// Only the listed folders
    Only {
        /// Whether the General folder (id 0) was listed
        include_general: bool,
        /// Dashboard-backed folder ids, deduplicated and sorted
        folder_ids: Vec<i64>,
    },
}

impl FolderFilter {
    /// Parse a comma-separated folder id list.
    pub fn parse(raw: Option<&str>) -> Result<Self> {
        let raw = match raw.map(str::trim) {
            None | Some("") => return Ok(Self::All),
            Some(raw) => raw,
        };

        let mut include_general = false;
        let mut folder_ids = BTreeSet::new();

        for segment in raw.split(',') {
            let segment = segment.trim();
            let id: i64 = segment.parse().map_err(|_| {
                Error::InvalidFilter(format!("folder filter contains invalid id '{}'", segment))
            })?;
            if id < 0 {
                return Err(Error::InvalidFilter(format!(
                    "folder filter contains negative id {}",
                    id
                )));
            }
            if is_general_folder(id) {
                include_general = true;
            } else {
                folder_ids.insert(id);
            }
        }

        Ok(Self::Only {
            include_general,
            folder_ids: folder_ids.into_iter().collect(),
        })
    }

    /// Whether elements in the General folder can match.
    pub fn includes_general_folder(&self) -> bool {
        match self {
            Self::All => true,
            Self::Only {
                include_general, ..
            } => *include_general,
        }
    }

    /// Whether elements in dashboard-backed folders can match.
    pub fn includes_dashboard_folders(&self) -> bool {
        match self {
            Self::All => true,
            Self::Only { folder_ids, .. } => !folder_ids.is_empty(),
        }
    }

    /// Explicit dashboard-backed folder ids, or `None` when unrestricted.
    pub fn dashboard_folder_ids(&self) -> Option<&[i64]> {
        match self {
            Self::All => None,
            Self::Only { folder_ids, .. } => Some(folder_ids),
        }
    }
}
