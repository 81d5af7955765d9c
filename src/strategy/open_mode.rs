use std::fmt;
use std::fs::OpenOptions;
use std::str::FromStr;

use crate::strategy::Direction;
use crate::Error;

/// How a file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpenMode {
    /// Open an existing file for reading.
    Read,
    /// Create the file if it does not exist; keep existing contents otherwise.
    CreateIfNotExists,
    /// Create the file, truncating any existing one.
    CreateOrReplace,
    /// Truncate an existing file; fail if it does not exist.
    ReplaceIfExists,
    /// Open an existing file for reading and writing.
    Modify,
}

impl OpenMode {
    pub fn direction(self) -> Direction {
        match self {
            OpenMode::Read => Direction::Input,
            OpenMode::CreateIfNotExists | OpenMode::CreateOrReplace | OpenMode::ReplaceIfExists => {
                Direction::Output
            }
            OpenMode::Modify => Direction::Both,
        }
    }

    pub fn has_read_access(self) -> bool {
        self.direction().has_input()
    }

    pub fn has_write_access(self) -> bool {
        self.direction().has_output()
    }

    /// Base open options for this mode. Writable modes also request read
    /// access so that shared read-write mappings can be established.
    pub(crate) fn options(self) -> OpenOptions {
        let mut options = OpenOptions::new();
        match self {
            OpenMode::Read => {
                options.read(true);
            }
            OpenMode::CreateIfNotExists => {
                options.read(true).write(true).create(true);
            }
            OpenMode::CreateOrReplace => {
                options.read(true).write(true).create(true).truncate(true);
            }
            OpenMode::ReplaceIfExists => {
                options.read(true).write(true).truncate(true);
            }
            OpenMode::Modify => {
                options.read(true).write(true);
            }
        }
        options
    }
}

impl fmt::Display for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OpenMode::Read => "read",
            OpenMode::CreateIfNotExists => "create",
            OpenMode::CreateOrReplace => "create-or-replace",
            OpenMode::ReplaceIfExists => "replace",
            OpenMode::Modify => "modify",
        };
        f.write_str(name)
    }
}

impl FromStr for OpenMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read" => Ok(OpenMode::Read),
            "create" => Ok(OpenMode::CreateIfNotExists),
            "create-or-replace" => Ok(OpenMode::CreateOrReplace),
            "replace" => Ok(OpenMode::ReplaceIfExists),
            "modify" => Ok(OpenMode::Modify),
            _ => Err(Error::InvalidArgument("unknown open mode")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directions_follow_access() {
        assert_eq!(OpenMode::Read.direction(), Direction::Input);
        assert!(!OpenMode::Read.has_write_access());
        assert_eq!(OpenMode::CreateOrReplace.direction(), Direction::Output);
        assert!(!OpenMode::ReplaceIfExists.has_read_access());
        assert_eq!(OpenMode::Modify.direction(), Direction::Both);
    }

    #[test]
    fn display_round_trips_through_parse() {
        for mode in [
            OpenMode::Read,
            OpenMode::CreateIfNotExists,
            OpenMode::CreateOrReplace,
            OpenMode::ReplaceIfExists,
            OpenMode::Modify,
        ] {
            assert_eq!(mode.to_string().parse::<OpenMode>().ok(), Some(mode));
        }
    }

    #[test]
    fn replace_requires_existing_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("missing.bin");
        assert!(OpenMode::ReplaceIfExists.options().open(&path).is_err());
        std::fs::write(&path, b"abc").expect("seed");
        let file = OpenMode::ReplaceIfExists.options().open(&path).expect("open");
        assert_eq!(file.metadata().expect("meta").len(), 0);
    }
}
