use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use dor_types::SlotId;

use crate::error::{PathError, PathResult};

/// A location inside an owner's file collection: `<owner>:<relative-path>`.
///
/// The relative part uses `/` separators; an empty relative part (or a
/// lone `/`) addresses the collection root. `.` and `..` are rejected.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionPath {
    owner: SlotId,
    relative: PathBuf,
}

impl CollectionPath {
    pub fn new(owner: SlotId, relative: impl AsRef<Path>) -> PathResult<Self> {
        let relative = relative.as_ref();
        let mut clean = PathBuf::new();
        for component in relative.components() {
            match component {
                Component::Normal(part) => clean.push(part),
                Component::RootDir => {}
                _ => {
                    return Err(PathError::InvalidPath {
                        path: relative.display().to_string(),
                        reason: "only plain path components are allowed".into(),
                    })
                }
            }
        }
        Ok(Self {
            owner,
            relative: clean,
        })
    }

    /// The root of `owner`'s collection.
    pub fn root(owner: SlotId) -> Self {
        Self {
            owner,
            relative: PathBuf::new(),
        }
    }

    pub fn owner(&self) -> SlotId {
        self.owner
    }

    /// Path relative to the collection root (empty for the root).
    pub fn relative(&self) -> &Path {
        &self.relative
    }

    pub fn is_root(&self) -> bool {
        self.relative.as_os_str().is_empty()
    }

    pub fn file_name(&self) -> Option<&str> {
        self.relative.file_name().and_then(|n| n.to_str())
    }

    /// The containing directory, or `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        Some(Self {
            owner: self.owner,
            relative: self.relative.parent().map(Path::to_path_buf).unwrap_or_default(),
        })
    }

    pub fn join(&self, name: &str) -> PathResult<Self> {
        Self::new(self.owner, self.relative.join(name))
    }

    /// The same relative location under another owner.
    pub fn with_owner(&self, owner: SlotId) -> Self {
        Self {
            owner,
            relative: self.relative.clone(),
        }
    }

    /// Map a path below `base` to the same position below `target`.
    pub fn rebase(&self, base: &CollectionPath, target: &CollectionPath) -> Option<Self> {
        if self.owner != base.owner {
            return None;
        }
        let rest = self.relative.strip_prefix(&base.relative).ok()?;
        Some(Self {
            owner: target.owner,
            relative: target.relative.join(rest),
        })
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.owner)?;
        let mut first = true;
        for component in self.relative.components() {
            if !first {
                write!(f, "/")?;
            }
            write!(f, "{}", component.as_os_str().to_string_lossy())?;
            first = false;
        }
        Ok(())
    }
}

impl FromStr for CollectionPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| PathError::InvalidPath {
            path: s.to_string(),
            reason: reason.to_string(),
        };
        let (owner, relative) = s.split_once(':').ok_or_else(|| invalid("missing ':'"))?;
        let owner: SlotId = owner
            .parse()
            .map_err(|_| invalid("owner must be a non-negative integer"))?;
        if relative.contains('\\') {
            return Err(invalid("use '/' as the separator"));
        }
        if relative.split('/').any(|part| part == "." || part == "..") {
            return Err(invalid("'.' and '..' are not allowed"));
        }
        Self::new(owner, relative)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display() {
        let path: CollectionPath = "137:docs/scans/p1".parse().unwrap();
        assert_eq!(path.owner(), SlotId::new(137));
        assert_eq!(path.relative(), Path::new("docs/scans/p1"));
        assert_eq!(path.to_string(), "137:docs/scans/p1");
        assert_eq!(path.file_name(), Some("p1"));

        let leading: CollectionPath = "137:/docs".parse().unwrap();
        assert_eq!(leading.to_string(), "137:docs");
    }

    #[test]
    fn root_forms() {
        for s in ["5:", "5:/"] {
            let path: CollectionPath = s.parse().unwrap();
            assert!(path.is_root());
            assert_eq!(path, CollectionPath::root(SlotId::new(5)));
            assert!(path.parent().is_none());
        }
    }

    #[test]
    fn rejects_malformed() {
        assert!("docs/a".parse::<CollectionPath>().is_err());
        assert!("x:docs".parse::<CollectionPath>().is_err());
        assert!("1:docs/../etc".parse::<CollectionPath>().is_err());
        assert!("1:./a".parse::<CollectionPath>().is_err());
    }

    #[test]
    fn parent_join_and_rebase() {
        let path: CollectionPath = "1:a/b/c".parse().unwrap();
        assert_eq!(path.parent().unwrap().to_string(), "1:a/b");
        assert_eq!(path.parent().unwrap().join("d").unwrap().to_string(), "1:a/b/d");

        let base: CollectionPath = "1:a".parse().unwrap();
        let target: CollectionPath = "2:x".parse().unwrap();
        assert_eq!(path.rebase(&base, &target).unwrap().to_string(), "2:x/b/c");
    }
}
