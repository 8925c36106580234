/// CP/M 8.3 file names

use crate::error::{CpmError, Result};
use crate::format::constants::{EXTENSION_LEN, FILENAME_LEN};
use std::fmt;
use std::str::FromStr;

/// Characters CP/M reserves for command parsing and wildcards
const RESERVED: &[char] = &['<', '>', '.', ',', ';', ':', '=', '?', '*', '[', ']', '|', '/', '\\'];

/// A validated, upper-cased 8.3 file name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileName {
    name: String,
    extension: String,
}

impl FileName {
    /// Parse `NAME` or `NAME.EXT`
    pub fn parse(full: &str) -> Result<Self> {
        let (name, extension) = match full.split_once('.') {
            Some((name, extension)) => (name, extension),
            None => (full, ""),
        };

        if name.is_empty() || name.len() > FILENAME_LEN {
            return Err(CpmError::InvalidFilename(format!(
                "{}: name must be 1-{} characters",
                full, FILENAME_LEN
            )));
        }
        if extension.len() > EXTENSION_LEN {
            return Err(CpmError::InvalidFilename(format!(
                "{}: extension must be at most {} characters",
                full, EXTENSION_LEN
            )));
        }

        let valid = |c: char| c.is_ascii_graphic() && !RESERVED.contains(&c);
        if !name.chars().chain(extension.chars()).all(valid) {
            return Err(CpmError::InvalidFilename(format!(
                "{}: contains a reserved or non-ASCII character",
                full
            )));
        }

        Ok(Self {
            name: name.to_ascii_uppercase(),
            extension: extension.to_ascii_uppercase(),
        })
    }

    /// The name part
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The extension part, possibly empty
    pub fn extension(&self) -> &str {
        &self.extension
    }
}

impl FromStr for FileName {
    type Err = CpmError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for FileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&join_name(&self.name, &self.extension))
    }
}

/// Join a name and extension as `NAME.EXT`, or `NAME` without an extension
pub(crate) fn join_name(name: &str, extension: &str) -> String {
    if extension.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", name, extension)
    }
}

/// How a lookup name is compared against names on disk.
///
/// Both rules ignore case and require the user number to match exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NameMatch {
    /// Compare name and extension: `TEST.TXT` only finds `TEST.TXT`
    #[default]
    FullName,
    /// Compare only the part before the dot: `TEST.TXT` also finds `TEST.BAS`
    BaseName,
}

impl NameMatch {
    /// Check whether a file stored as `name`/`extension` answers to `query`
    pub fn matches(&self, name: &str, extension: &str, query: &str) -> bool {
        match self {
            NameMatch::FullName => join_name(name, extension).eq_ignore_ascii_case(query),
            NameMatch::BaseName => {
                let base = query.split_once('.').map_or(query, |(base, _)| base);
                name.eq_ignore_ascii_case(base)
            }
        }
    }
}
