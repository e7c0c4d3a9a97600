use std::collections::BTreeMap;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use dor_slot::{DiskSlot, SlotError};
use dor_tree::{FileCollections, FileNode, FileTree, Node, TreeError};
use dor_types::SlotId;
use tracing::{debug, warn};

use crate::attributes::{
    basic_map, hash_map, select, AttributeSelector, AttributeValue, BasicAttributes,
    HashAttributes, BASIC_VIEW, HASH_VIEW,
};
use crate::error::{PathError, PathResult};
use crate::options::{CopyOptions, WriteOptions};
use crate::path::CollectionPath;

/// Report tree errors in terms of the collection path that was asked for.
fn lift(err: TreeError, path: &CollectionPath) -> PathError {
    match err {
        TreeError::NotFound(_) | TreeError::Slot(SlotError::NotFound(_)) => {
            PathError::NotFound(path.to_string())
        }
        TreeError::AlreadyExists(_) | TreeError::Slot(SlotError::AlreadyExists(_)) => {
            PathError::AlreadyExists(path.to_string())
        }
        TreeError::DirectoryNotEmpty(_) => PathError::DirectoryNotEmpty(path.to_string()),
        other => PathError::Tree(other),
    }
}

/// Generic hierarchical path access to owner file collections.
///
/// Paths have the form `<owner>:<relative-path>`. Streams are handed to
/// caller closures and released on every exit path.
#[derive(Clone, Debug)]
pub struct CollectionPathProvider {
    collections: FileCollections,
}

impl CollectionPathProvider {
    pub fn new(collections: FileCollections) -> Self {
        Self { collections }
    }

    pub fn collections(&self) -> &FileCollections {
        &self.collections
    }

    fn tree(&self, owner: SlotId) -> PathResult<Option<FileTree<DiskSlot>>> {
        Ok(self.collections.collection(owner, false)?)
    }

    fn require_tree(&self, path: &CollectionPath) -> PathResult<FileTree<DiskSlot>> {
        self.tree(path.owner())?
            .ok_or_else(|| PathError::NotFound(path.to_string()))
    }

    fn require_node(&self, tree: &FileTree<DiskSlot>, path: &CollectionPath) -> PathResult<Node> {
        tree.node(path.relative())
            .map_err(|e| lift(e, path))?
            .ok_or_else(|| PathError::NotFound(path.to_string()))
    }

    pub fn exists(&self, path: &CollectionPath) -> PathResult<bool> {
        match self.tree(path.owner())? {
            Some(tree) => Ok(tree.exists(path.relative())?),
            None => Ok(false),
        }
    }

    pub fn node(&self, path: &CollectionPath) -> PathResult<Node> {
        let tree = self.require_tree(path)?;
        self.require_node(&tree, path)
    }

    // -----------------------------------------------------------------------
    // Content
    // -----------------------------------------------------------------------

    /// Run `f` over a read stream of the file at `path`.
    pub fn open_read<T>(
        &self,
        path: &CollectionPath,
        f: impl FnOnce(&mut dyn Read) -> io::Result<T>,
    ) -> PathResult<T> {
        let tree = self.require_tree(path)?;
        let mut reader = tree.open_read(path.relative()).map_err(|e| lift(e, path))?;
        Ok(f(&mut reader)?)
    }

    pub fn read(&self, path: &CollectionPath) -> PathResult<Vec<u8>> {
        self.open_read(path, |reader| {
            let mut buf = Vec::new();
            reader.read_to_end(&mut buf)?;
            Ok(buf)
        })
    }

    /// Run `f` over a write stream for the file at `path`.
    ///
    /// Bytes become visible only if `f` succeeds. With `create` or
    /// `create_new`, a missing collection and missing parent directories are
    /// created first; if the file itself then cannot be written, everything
    /// created along the way is removed again.
    pub fn open_write(
        &self,
        path: &CollectionPath,
        options: WriteOptions,
        f: impl FnOnce(&mut dyn Write) -> io::Result<()>,
    ) -> PathResult<FileNode> {
        if path.is_root() {
            return Err(PathError::InvalidPath {
                path: path.to_string(),
                reason: "a collection root is not a file".into(),
            });
        }
        if options.truncate && options.append {
            return Err(PathError::InvalidOptions(
                "truncate and append are mutually exclusive".into(),
            ));
        }

        let existing_tree = self.tree(path.owner())?;
        let existing = match &existing_tree {
            Some(tree) => tree.node(path.relative())?,
            None => None,
        };
        match &existing {
            Some(Node::Directory(_)) => {
                return Err(PathError::Tree(TreeError::NotAFile(path.relative().to_path_buf())))
            }
            Some(Node::File(_)) if options.create_new => {
                return Err(PathError::AlreadyExists(path.to_string()))
            }
            Some(Node::File(_)) if !options.truncate && !options.append => {
                return Err(PathError::InvalidOptions(format!(
                    "{path} exists; open it with truncate or append"
                )))
            }
            None if !options.may_create() => return Err(PathError::NotFound(path.to_string())),
            _ => {}
        }

        let created_collection = existing_tree.is_none();
        let tree = match existing_tree {
            Some(tree) => tree,
            None => self
                .collections
                .collection(path.owner(), true)?
                .ok_or_else(|| PathError::NotFound(path.to_string()))?,
        };

        let mut created_dirs: Vec<PathBuf> = Vec::new();
        let append = options.append && existing.is_some();
        let result = (|| -> PathResult<FileNode> {
            if let Some(parent) = path.relative().parent() {
                let mut current = PathBuf::new();
                for component in parent.components() {
                    current.push(component);
                    match tree.node(&current)? {
                        Some(node) if node.is_dir() => {}
                        Some(_) => return Err(PathError::Tree(TreeError::NotADirectory(current))),
                        None => {
                            tree.create_directory(&current)?;
                            created_dirs.push(current.clone());
                        }
                    }
                }
            }
            let mut writer = tree.open_write(path.relative())?;
            if append {
                let mut reader = tree.open_read(path.relative())?;
                io::copy(&mut reader, &mut writer)?;
            }
            f(&mut writer)?;
            Ok(writer.commit()?)
        })();

        match result {
            Ok(node) => Ok(node),
            Err(err) => {
                self.roll_back(path, &tree, &created_dirs, created_collection);
                Err(match err {
                    PathError::Tree(tree_err) => lift(tree_err, path),
                    other => other,
                })
            }
        }
    }

    fn roll_back(
        &self,
        path: &CollectionPath,
        tree: &FileTree<DiskSlot>,
        created_dirs: &[PathBuf],
        created_collection: bool,
    ) {
        for dir in created_dirs.iter().rev() {
            if let Err(e) = tree.delete(dir) {
                warn!(path = %path, dir = %dir.display(), error = %e, "failed to roll back directory");
            }
        }
        if created_collection {
            if let Err(e) = self.collections.delete_collection(path.owner()) {
                warn!(path = %path, error = %e, "failed to roll back collection root");
            }
        }
        debug!(path = %path, dirs = created_dirs.len(), "rolled back failed write");
    }

    pub fn write_bytes(
        &self,
        path: &CollectionPath,
        options: WriteOptions,
        data: &[u8],
    ) -> PathResult<FileNode> {
        self.open_write(path, options, |writer| writer.write_all(data))
    }

    // -----------------------------------------------------------------------
    // Directories
    // -----------------------------------------------------------------------

    /// Entries of the directory at `dir`, sorted by name.
    pub fn list(&self, dir: &CollectionPath) -> PathResult<Vec<CollectionPath>> {
        let tree = self.require_tree(dir)?;
        tree.list(dir.relative())
            .map_err(|e| lift(e, dir))?
            .iter()
            .map(|node| CollectionPath::new(dir.owner(), node.path()))
            .collect()
    }

    /// Create one directory; its parent must exist. Creating a root creates
    /// the owner's collection.
    pub fn create_directory(&self, path: &CollectionPath) -> PathResult<()> {
        if path.is_root() {
            if self.tree(path.owner())?.is_some() {
                return Err(PathError::AlreadyExists(path.to_string()));
            }
            self.collections.collection(path.owner(), true)?;
            return Ok(());
        }
        let tree = self.require_tree(path)?;
        tree.create_directory(path.relative())
            .map_err(|e| lift(e, path))?;
        Ok(())
    }

    /// Delete a file or an empty directory. Deleting an empty root removes
    /// the owner's collection.
    pub fn delete(&self, path: &CollectionPath) -> PathResult<()> {
        let tree = self.require_tree(path)?;
        if path.is_root() {
            if !tree.list(Path::new(""))?.is_empty() {
                return Err(PathError::DirectoryNotEmpty(path.to_string()));
            }
            self.collections.delete_collection(path.owner())?;
            return Ok(());
        }
        tree.delete(path.relative()).map_err(|e| lift(e, path))
    }

    fn delete_all(&self, path: &CollectionPath) -> PathResult<()> {
        if path.is_root() {
            self.collections.delete_collection(path.owner())?;
            return Ok(());
        }
        let tree = self.require_tree(path)?;
        tree.delete_all(path.relative()).map_err(|e| lift(e, path))
    }

    // -----------------------------------------------------------------------
    // Copy and move
    // -----------------------------------------------------------------------

    /// Copy a file or a whole directory.
    ///
    /// Copying a path onto itself does nothing. Directories are copied with
    /// everything beneath them; an existing target directory (or owner root)
    /// is merged into, and a missing target root is created.
    pub fn copy(
        &self,
        from: &CollectionPath,
        to: &CollectionPath,
        options: CopyOptions,
    ) -> PathResult<()> {
        if from == to {
            debug!(path = %from, "copy onto itself skipped");
            return Ok(());
        }
        let source = self.require_tree(from)?;
        match self.require_node(&source, from)? {
            Node::File(file) => {
                let target = self.target_tree_for_file(to)?;
                self.copy_file(&source, &file, &target, to, options)
            }
            Node::Directory(dir) => {
                if from.owner() == to.owner() && to.relative().starts_with(from.relative()) {
                    return Err(PathError::InvalidPath {
                        path: to.to_string(),
                        reason: format!("cannot copy {from} into itself"),
                    });
                }
                let target = self.ensure_directory(to)?;
                if options.copy_attributes && !to.is_root() {
                    if let Some(label) = &dir.label {
                        target.set_label(to.relative(), Some(label))?;
                    }
                }
                self.copy_tree(&source, from, &target, to, options)
            }
        }
    }

    fn target_tree_for_file(&self, to: &CollectionPath) -> PathResult<FileTree<DiskSlot>> {
        if to.is_root() {
            return Err(PathError::AlreadyExists(to.to_string()));
        }
        self.require_tree(to)
    }

    /// The tree holding directory `to`, creating the directory (or the
    /// whole collection for a root) when absent.
    fn ensure_directory(&self, to: &CollectionPath) -> PathResult<FileTree<DiskSlot>> {
        if to.is_root() {
            return self
                .collections
                .collection(to.owner(), true)?
                .ok_or_else(|| PathError::NotFound(to.to_string()));
        }
        let tree = self.require_tree(to)?;
        match tree.node(to.relative())? {
            Some(node) if node.is_dir() => {}
            Some(_) => return Err(PathError::AlreadyExists(to.to_string())),
            None => {
                tree.create_directory(to.relative())
                    .map_err(|e| lift(e, to))?;
            }
        }
        Ok(tree)
    }

    fn copy_file(
        &self,
        source: &FileTree<DiskSlot>,
        file: &FileNode,
        target: &FileTree<DiskSlot>,
        to: &CollectionPath,
        options: CopyOptions,
    ) -> PathResult<()> {
        match target.node(to.relative())? {
            Some(Node::Directory(_)) => return Err(PathError::AlreadyExists(to.to_string())),
            Some(Node::File(_)) if !options.replace_existing => {
                return Err(PathError::AlreadyExists(to.to_string()))
            }
            _ => {}
        }
        let mut reader = source.open_read(&file.path)?;
        let mut writer = target.open_write(to.relative()).map_err(|e| lift(e, to))?;
        io::copy(&mut reader, &mut writer)?;
        writer.commit()?;

        if options.copy_attributes {
            if let Some(modified) = file.modified {
                target.set_modified(to.relative(), modified)?;
            }
            if file.label.is_some() {
                target.set_label(to.relative(), file.label.as_deref())?;
            }
        }
        debug!(to = %to, size = file.size, "copied file");
        Ok(())
    }

    fn copy_tree(
        &self,
        source: &FileTree<DiskSlot>,
        from: &CollectionPath,
        target: &FileTree<DiskSlot>,
        to: &CollectionPath,
        options: CopyOptions,
    ) -> PathResult<()> {
        for node in source.walk(from.relative())? {
            let Ok(rest) = node.path().strip_prefix(from.relative()) else {
                continue;
            };
            let dest = CollectionPath::new(to.owner(), to.relative().join(rest))?;
            match &node {
                Node::Directory(dir) => {
                    match target.node(dest.relative())? {
                        Some(existing) if existing.is_dir() => {}
                        Some(_) => return Err(PathError::AlreadyExists(dest.to_string())),
                        None => {
                            target.create_directory(dest.relative())?;
                        }
                    }
                    if options.copy_attributes && dir.label.is_some() {
                        target.set_label(dest.relative(), dir.label.as_deref())?;
                    }
                }
                Node::File(file) => self.copy_file(source, file, target, &dest, options)?,
            }
        }
        Ok(())
    }

    /// Move by copying with attributes and then deleting the source.
    pub fn move_path(
        &self,
        from: &CollectionPath,
        to: &CollectionPath,
        options: CopyOptions,
    ) -> PathResult<()> {
        if from == to {
            return Ok(());
        }
        self.copy(
            from,
            to,
            CopyOptions {
                copy_attributes: true,
                ..options
            },
        )?;
        self.delete_all(from)?;
        debug!(from = %from, to = %to, "moved");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Attributes
    // -----------------------------------------------------------------------

    pub fn basic_attributes(&self, path: &CollectionPath) -> PathResult<BasicAttributes> {
        let tree = self.require_tree(path)?;
        let meta = tree.metadata(path.relative()).map_err(|e| lift(e, path))?;
        Ok(BasicAttributes {
            size: meta.len,
            last_modified_time: meta.modified,
            creation_time: meta.created,
            is_directory: meta.is_dir(),
        })
    }

    /// Content hash of a file; `None` for directories.
    pub fn hash_attributes(&self, path: &CollectionPath) -> PathResult<Option<HashAttributes>> {
        let tree = self.require_tree(path)?;
        match self.require_node(&tree, path)? {
            Node::Directory(_) => Ok(None),
            Node::File(_) => Ok(Some(HashAttributes {
                hash: tree.content_hash(path.relative())?,
            })),
        }
    }

    /// Read attributes selected by `selection`, e.g. `basic:*`,
    /// `basic:size,lastModifiedTime` or `hash:content`.
    pub fn read_attributes(
        &self,
        path: &CollectionPath,
        selection: &str,
    ) -> PathResult<BTreeMap<String, AttributeValue>> {
        let selector = AttributeSelector::parse(selection)?;
        let all = match selector.view.as_str() {
            BASIC_VIEW => basic_map(&self.basic_attributes(path)?),
            HASH_VIEW => hash_map(self.hash_attributes(path)?.as_ref()),
            _ => return Err(PathError::UnknownAttribute(selection.to_string())),
        };
        select(&selector, all)
    }

    /// Set one attribute. Only `basic:lastModifiedTime` is writable.
    pub fn set_attribute(
        &self,
        path: &CollectionPath,
        name: &str,
        value: AttributeValue,
    ) -> PathResult<()> {
        let (view, attribute) = name.split_once(':').unwrap_or((BASIC_VIEW, name));
        match (view, attribute) {
            (BASIC_VIEW, "lastModifiedTime") => {
                let AttributeValue::Time(Some(time)) = value else {
                    return Err(PathError::InvalidAttributeValue {
                        name: name.to_string(),
                        reason: "expected a timestamp".into(),
                    });
                };
                let tree = self.require_tree(path)?;
                tree.set_modified(path.relative(), time)
                    .map_err(|e| lift(e, path))
            }
            (BASIC_VIEW, "size" | "creationTime" | "isDirectory" | "isRegularFile")
            | (HASH_VIEW, "algorithm" | "content") => {
                Err(PathError::ReadOnlyAttribute(name.to_string()))
            }
            _ => Err(PathError::UnknownAttribute(name.to_string())),
        }
    }
}
