//! Metadata tag lists and delta computation.
//!
//! Engines announce metadata repeatedly, and most announcements repeat
//! values that were already reported. [`TagList::delta_against`] computes
//! what is actually new relative to an aggregated reference so callers only
//! see changes.

use std::collections::BTreeMap;
use std::fmt;

/// Well-known tag name: track title.
pub const TAG_TITLE: &str = "title";
/// Well-known tag name: performing artist.
pub const TAG_ARTIST: &str = "artist";
/// Well-known tag name: album.
pub const TAG_ALBUM: &str = "album";
/// Well-known tag name: genre.
pub const TAG_GENRE: &str = "genre";
/// Well-known tag name: nominal bitrate in bits per second.
pub const TAG_BITRATE: &str = "bitrate";
/// Well-known tag name: observed minimum bitrate.
pub const TAG_MINIMUM_BITRATE: &str = "minimum-bitrate";
/// Well-known tag name: observed maximum bitrate.
pub const TAG_MAXIMUM_BITRATE: &str = "maximum-bitrate";

/// A single tag value.
#[derive(Debug, Clone, PartialEq)]
pub enum TagValue {
    Str(String),
    Int(i64),
    UInt(u64),
    Float(f64),
}

impl TagValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            TagValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_uint(&self) -> Option<u64> {
        match self {
            TagValue::UInt(v) => Some(*v),
            TagValue::Int(v) if *v >= 0 => Some(*v as u64),
            _ => None,
        }
    }
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagValue::Str(s) => write!(f, "{s}"),
            TagValue::Int(v) => write!(f, "{v}"),
            TagValue::UInt(v) => write!(f, "{v}"),
            TagValue::Float(v) => write!(f, "{v}"),
        }
    }
}

impl From<&str> for TagValue {
    fn from(s: &str) -> Self {
        TagValue::Str(s.to_owned())
    }
}

impl From<String> for TagValue {
    fn from(s: String) -> Self {
        TagValue::Str(s)
    }
}

impl From<u64> for TagValue {
    fn from(v: u64) -> Self {
        TagValue::UInt(v)
    }
}

impl From<i64> for TagValue {
    fn from(v: i64) -> Self {
        TagValue::Int(v)
    }
}

/// An ordered mapping from tag names to their value lists.
///
/// A tag may carry several values; their order is preserved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagList {
    entries: BTreeMap<String, Vec<TagValue>>,
}

impl TagList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of distinct tag names.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn values(&self, name: &str) -> &[TagValue] {
        self.entries.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// First value for a tag, if any.
    pub fn first(&self, name: &str) -> Option<&TagValue> {
        self.values(name).first()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Appends one value to the tag's value list.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<TagValue>) {
        self.entries
            .entry(name.into())
            .or_default()
            .push(value.into());
    }

    /// Replaces the tag's value list wholesale.
    pub fn replace(&mut self, name: impl Into<String>, values: Vec<TagValue>) {
        self.entries.insert(name.into(), values);
    }

    /// Removes a tag and returns its values.
    pub fn remove(&mut self, name: &str) -> Option<Vec<TagValue>> {
        self.entries.remove(name)
    }

    /// Merges `other` into `self`, replacing value lists for names present
    /// in both.
    pub fn merge_replacing(&mut self, other: &TagList) {
        for (name, values) in &other.entries {
            self.entries.insert(name.clone(), values.clone());
        }
    }

    /// Computes the tags in `self` that are new or changed relative to
    /// `reference`.
    ///
    /// A tag is unchanged only if the reference carries the same name with
    /// the same values in the same order; any difference (including a
    /// different value count) copies the tag's full value list from `self`
    /// into the result, preserving value order.
    pub fn delta_against(&self, reference: &TagList) -> TagList {
        let mut delta = TagList::new();
        for (name, values) in &self.entries {
            match reference.entries.get(name) {
                Some(existing) if existing == values => {}
                _ => delta.replace(name.clone(), values.clone()),
            }
        }
        delta
    }
}

impl fmt::Display for TagList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (name, values) in &self.entries {
            if !first {
                write!(f, ", ")?;
            }
            first = false;
            write!(f, "{name}=")?;
            for (idx, value) in values.iter().enumerate() {
                if idx > 0 {
                    write!(f, "/")?;
                }
                write!(f, "{value}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(pairs: &[(&str, &str)]) -> TagList {
        let mut tags = TagList::new();
        for (name, value) in pairs {
            tags.append(*name, *value);
        }
        tags
    }

    #[test]
    fn delta_reports_only_new_and_changed() {
        let reference = list(&[(TAG_TITLE, "A")]);
        let update = list(&[(TAG_TITLE, "A"), (TAG_ARTIST, "B")]);

        let delta = update.delta_against(&reference);
        assert_eq!(delta.len(), 1);
        assert_eq!(delta.first(TAG_ARTIST).unwrap().as_str(), Some("B"));
    }

    #[test]
    fn delta_detects_changed_values() {
        let reference = list(&[(TAG_TITLE, "A")]);
        let update = list(&[(TAG_TITLE, "B")]);

        let delta = update.delta_against(&reference);
        assert_eq!(delta.first(TAG_TITLE).unwrap().as_str(), Some("B"));
    }

    #[test]
    fn delta_detects_value_count_change() {
        let mut reference = TagList::new();
        reference.append(TAG_GENRE, "rock");
        let mut update = TagList::new();
        update.append(TAG_GENRE, "rock");
        update.append(TAG_GENRE, "pop");

        let delta = update.delta_against(&reference);
        assert_eq!(delta.values(TAG_GENRE).len(), 2);
    }

    #[test]
    fn identical_lists_produce_empty_delta() {
        let reference = list(&[(TAG_TITLE, "A"), (TAG_ARTIST, "B")]);
        assert!(reference.delta_against(&reference.clone()).is_empty());
    }

    #[test]
    fn merge_replacing_overwrites_value_lists() {
        let mut aggregate = list(&[(TAG_TITLE, "A")]);
        aggregate.merge_replacing(&list(&[(TAG_TITLE, "B"), (TAG_ALBUM, "X")]));
        assert_eq!(aggregate.first(TAG_TITLE).unwrap().as_str(), Some("B"));
        assert_eq!(aggregate.first(TAG_ALBUM).unwrap().as_str(), Some("X"));
    }

    #[test]
    fn display_is_stable() {
        let tags = list(&[(TAG_ARTIST, "B"), (TAG_TITLE, "A")]);
        assert_eq!(tags.to_string(), "artist=B, title=A");
    }
}
