use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use dor_types::ContentHash;
use serde::{Deserialize, Serialize};

use crate::error::{PathError, PathResult};

pub const BASIC_VIEW: &str = "basic";
pub const HASH_VIEW: &str = "hash";
pub const HASH_ALGORITHM: &str = "blake3";

/// A single attribute value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    Size(u64),
    Time(Option<DateTime<Utc>>),
    Text(String),
}

/// The `basic` view: size, timestamps and kind.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BasicAttributes {
    pub size: u64,
    pub last_modified_time: Option<DateTime<Utc>>,
    pub creation_time: Option<DateTime<Utc>>,
    pub is_directory: bool,
}

impl BasicAttributes {
    pub fn is_regular_file(&self) -> bool {
        !self.is_directory
    }

    fn to_map(&self) -> BTreeMap<&'static str, AttributeValue> {
        BTreeMap::from([
            ("size", AttributeValue::Size(self.size)),
            ("lastModifiedTime", AttributeValue::Time(self.last_modified_time)),
            ("creationTime", AttributeValue::Time(self.creation_time)),
            ("isDirectory", AttributeValue::Bool(self.is_directory)),
            ("isRegularFile", AttributeValue::Bool(self.is_regular_file())),
        ])
    }
}

/// The `hash` view of a file's content.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HashAttributes {
    pub hash: ContentHash,
}

impl HashAttributes {
    fn to_map(&self) -> BTreeMap<&'static str, AttributeValue> {
        BTreeMap::from([
            ("algorithm", AttributeValue::Text(HASH_ALGORITHM.to_string())),
            ("content", AttributeValue::Text(self.hash.to_hex())),
        ])
    }
}

/// A parsed attribute selector such as `basic:*` or `hash:content`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct AttributeSelector {
    pub view: String,
    /// `None` selects every attribute of the view.
    pub names: Option<Vec<String>>,
}

impl AttributeSelector {
    /// Parse `[view:]name[,name...]`; the view defaults to `basic`.
    pub fn parse(text: &str) -> PathResult<Self> {
        let (view, names) = text.split_once(':').unwrap_or((BASIC_VIEW, text));
        if view != BASIC_VIEW && view != HASH_VIEW {
            return Err(PathError::UnknownAttribute(text.to_string()));
        }
        let names = if names == "*" {
            None
        } else {
            let list: Vec<String> = names.split(',').map(|n| n.trim().to_string()).collect();
            if list.iter().any(String::is_empty) {
                return Err(PathError::UnknownAttribute(text.to_string()));
            }
            Some(list)
        };
        Ok(Self {
            view: view.to_string(),
            names,
        })
    }
}

/// Pick the selected attributes out of a view's full map.
pub(crate) fn select(
    selector: &AttributeSelector,
    all: BTreeMap<&'static str, AttributeValue>,
) -> PathResult<BTreeMap<String, AttributeValue>> {
    match &selector.names {
        None => Ok(all.into_iter().map(|(k, v)| (k.to_string(), v)).collect()),
        Some(names) => names
            .iter()
            .map(|name| {
                all.get(name.as_str())
                    .cloned()
                    .map(|v| (name.clone(), v))
                    .ok_or_else(|| PathError::UnknownAttribute(format!("{}:{name}", selector.view)))
            })
            .collect(),
    }
}

pub(crate) fn basic_map(attrs: &BasicAttributes) -> BTreeMap<&'static str, AttributeValue> {
    attrs.to_map()
}

pub(crate) fn hash_map(attrs: Option<&HashAttributes>) -> BTreeMap<&'static str, AttributeValue> {
    attrs.map(HashAttributes::to_map).unwrap_or_default()
}
