//! Path-style access to the file collection trees.
//!
//! Every owner's [`FileTree`](dor_tree::FileTree) is exposed under paths of
//! the form `<owner>:<relative-path>`:
//!
//! ```text
//! 137:                 the root of owner 137's collection
//! 137:docs/scan.tiff   a file inside it
//! ```
//!
//! [`CollectionPathProvider`] offers open-for-read/write, listing, directory
//! creation, deletion, copy, move, and two attribute views: `basic` (size,
//! timestamps, kind) and `hash` (content digest).

pub mod attributes;
pub mod error;
pub mod options;
pub mod path;
pub mod provider;

pub use attributes::{AttributeValue, BasicAttributes, HashAttributes};
pub use error::{PathError, PathResult};
pub use options::{CopyOptions, WriteOptions};
pub use path::CollectionPath;
pub use provider::CollectionPathProvider;
