use std::{fmt, str::FromStr};

use indexmap::IndexSet;
use snafu::Snafu;

/// Length of a tag on the wire, in bytes.
pub const TAG_LEN: usize = 8;

/// A tag error.
#[derive(Debug, Snafu, Eq, PartialEq)]
#[snafu(context(suffix(false)))]
pub enum TagError {
    /// The tag was empty.
    #[snafu(display("tag cannot be empty"))]
    Empty,

    /// The tag does not fit in the fixed-size wire representation.
    #[snafu(display("tag '{}' is {} bytes long, but tags are limited to {} bytes", tag, len, TAG_LEN))]
    TooLong {
        /// Offending tag.
        tag: String,

        /// Length of the tag, in bytes.
        len: usize,
    },

    /// The tag contains a byte that is not printable, non-whitespace ASCII.
    #[snafu(display("tag '{}' contains invalid characters (only printable, non-whitespace ASCII is allowed)", tag))]
    InvalidCharacter {
        /// Offending tag.
        tag: String,
    },
}

/// A message tag.
///
/// Tags name a class of messages, and are what subscriptions are expressed in terms of. On the wire, a tag always
/// occupies exactly [`TAG_LEN`] bytes, with shorter tags padded with NUL bytes.
///
/// Tags created from text are validated to be 1 to 8 bytes of printable, non-whitespace ASCII, since subscription
/// requests are whitespace-separated. Tags decoded from the wire are kept as-is, byte for byte, so that they can be
/// forwarded without any reinterpretation.
#[derive(Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Tag {
    raw: [u8; TAG_LEN],
}

impl Tag {
    /// Creates a new `Tag` from the given text.
    ///
    /// # Errors
    ///
    /// If the text is empty, longer than [`TAG_LEN`] bytes, or contains anything other than printable, non-whitespace
    /// ASCII, an error is returned.
    pub fn new(tag: &str) -> Result<Self, TagError> {
        let bytes = tag.as_bytes();
        if bytes.is_empty() {
            return Err(TagError::Empty);
        }

        if bytes.len() > TAG_LEN {
            return Err(TagError::TooLong {
                tag: tag.to_string(),
                len: bytes.len(),
            });
        }

        if !bytes.iter().all(u8::is_ascii_graphic) {
            return Err(TagError::InvalidCharacter { tag: tag.to_string() });
        }

        let mut raw = [0; TAG_LEN];
        raw[..bytes.len()].copy_from_slice(bytes);
        Ok(Self { raw })
    }

    /// Creates a `Tag` directly from its wire representation.
    ///
    /// No validation is performed.
    pub const fn from_wire(raw: [u8; TAG_LEN]) -> Self {
        Self { raw }
    }

    /// Returns the wire representation of this tag.
    pub const fn as_wire(&self) -> &[u8; TAG_LEN] {
        &self.raw
    }

    /// Returns the tag bytes with any trailing NUL padding removed.
    pub fn as_bytes(&self) -> &[u8] {
        let len = self.raw.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
        &self.raw[..len]
    }
}

impl FromStr for Tag {
    type Err = TagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // `pad` so that width/alignment flags work when tags are printed in columns.
        f.pad(&String::from_utf8_lossy(self.as_bytes()))
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tag({:?})", String::from_utf8_lossy(self.as_bytes()))
    }
}

/// A set of unique tags.
///
/// Duplicate tags collapse on insertion. Iteration order is insertion order.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TagSet {
    tags: IndexSet<Tag>,
}

impl TagSet {
    /// Creates an empty `TagSet`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses each of the given strings as a tag and collects them into a `TagSet`.
    ///
    /// # Errors
    ///
    /// If any string is not a valid tag, an error is returned.
    pub fn from_strs<I, S>(tags: I) -> Result<Self, TagError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::new();
        for tag in tags {
            set.insert_str(tag.as_ref())?;
        }
        Ok(set)
    }

    /// Inserts a tag.
    ///
    /// Returns `true` if the tag was not already present.
    pub fn insert(&mut self, tag: Tag) -> bool {
        self.tags.insert(tag)
    }

    /// Parses the given text as a tag and inserts it.
    ///
    /// Returns `true` if the tag was not already present.
    ///
    /// # Errors
    ///
    /// If the text is not a valid tag, an error is returned and the set is left unchanged.
    pub fn insert_str(&mut self, tag: &str) -> Result<bool, TagError> {
        Tag::new(tag).map(|tag| self.insert(tag))
    }

    /// Returns `true` if the set contains the given tag.
    pub fn contains(&self, tag: &Tag) -> bool {
        self.tags.contains(tag)
    }

    /// Returns the number of tags in the set.
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    /// Returns `true` if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Returns an iterator over the tags, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Tag> + '_ {
        self.tags.iter()
    }
}

impl FromIterator<Tag> for TagSet {
    fn from_iter<T: IntoIterator<Item = Tag>>(iter: T) -> Self {
        Self {
            tags: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a TagSet {
    type Item = &'a Tag;
    type IntoIter = indexmap::set::Iter<'a, Tag>;

    fn into_iter(self) -> Self::IntoIter {
        self.tags.iter()
    }
}
