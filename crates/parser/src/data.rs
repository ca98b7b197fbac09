// Data context - the input file source handed to Map::open.
//
// The game client's packaged-archive reader sits behind the same surface in
// production; for building and for tests this reads loose files under a root
// directory.  Lookups are case-insensitive and accept either path separator,
// since model name tables mix conventions freely.

use std::path::{Path, PathBuf};

use tilenav_utility::stream::ByteStream;
use tilenav_utility::{Error, Result};

#[derive(Clone, Debug)]
pub struct Data {
    root: PathBuf,
}

impl Data {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(Error::NotFound(root.display().to_string()));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Open a file by its archive-style name, returning the whole content.
    pub fn open(&self, name: &str) -> Result<ByteStream> {
        let path = self.resolve(name)?;
        let bytes = std::fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::NotFound(name.to_string())
            } else {
                Error::Io(e)
            }
        })?;
        Ok(ByteStream::wrap(bytes, name.to_string()))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.resolve(name).is_ok()
    }

    fn resolve(&self, name: &str) -> Result<PathBuf> {
        let normalized = name.replace('\\', "/");

        // fast path: exact casing
        let direct = self.root.join(&normalized);
        if direct.is_file() {
            return Ok(direct);
        }

        // walk the components case-insensitively
        let mut current = self.root.clone();
        for component in normalized.split('/') {
            if component.is_empty() {
                continue;
            }
            let mut found = None;
            let entries = std::fs::read_dir(&current)
                .map_err(|_| Error::NotFound(name.to_string()))?;
            for entry in entries.flatten() {
                if entry.file_name().eq_ignore_ascii_case(component) {
                    found = Some(entry.path());
                    break;
                }
            }
            match found {
                Some(path) => current = path,
                None => return Err(Error::NotFound(name.to_string())),
            }
        }

        if current.is_file() {
            Ok(current)
        } else {
            Err(Error::NotFound(name.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_insensitive_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("World").join("Model");
        std::fs::create_dir_all(&sub).unwrap();
        std::fs::write(sub.join("Tree.m2"), b"x").unwrap();

        let data = Data::new(dir.path()).unwrap();
        assert!(data.open("world\\model\\TREE.M2").is_ok());
        assert!(data.open("World/Model/Tree.m2").is_ok());
        assert!(matches!(
            data.open("World/Model/Rock.m2"),
            Err(Error::NotFound(_))
        ));
    }
}
