use std::fmt;

use bytes::{BufMut as _, Bytes, BytesMut};
use snafu::Snafu;

use crate::tag::{Tag, TagSet};

/// A subscription error.
#[derive(Debug, Snafu, Eq, PartialEq)]
#[snafu(context(suffix(false)))]
pub enum SubscriptionError {
    /// Neither "any" nor "all" tags were given.
    #[snafu(display("no tags specified: at least one 'any' or 'all' tag is required"))]
    NoTags,
}

/// Subscription mode.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum SubscriptionMode {
    /// Matches messages carrying the tag.
    Any,

    /// Matches messages only when all tags of the group are present, as negotiated by the server.
    All,
}

impl SubscriptionMode {
    /// Returns the single-character flag used for this mode in a subscription request.
    pub const fn as_flag(&self) -> char {
        match self {
            Self::Any => 'a',
            Self::All => 'w',
        }
    }

    /// Returns the human-readable name of this mode.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Any => "any",
            Self::All => "all",
        }
    }
}

impl fmt::Display for SubscriptionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single subscription entry.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SubscriptionEntry {
    tag: Tag,
    mode: SubscriptionMode,
}

impl SubscriptionEntry {
    /// Creates a new `SubscriptionEntry`.
    pub const fn new(tag: Tag, mode: SubscriptionMode) -> Self {
        Self { tag, mode }
    }

    /// Returns the tag.
    pub const fn tag(&self) -> &Tag {
        &self.tag
    }

    /// Returns the mode.
    pub const fn mode(&self) -> SubscriptionMode {
        self.mode
    }
}

impl fmt::Display for SubscriptionEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.tag, self.mode)
    }
}

/// An ordered subscription request.
///
/// Entry order is significant: "any" entries always precede "all" entries, and within each group, entries follow the
/// iteration order of the tag set they were built from.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SubscriptionRequest {
    entries: Vec<SubscriptionEntry>,
}

impl SubscriptionRequest {
    /// Builds a subscription request from the given "any" and "all" tag sets.
    ///
    /// No deduplication is performed across the two sets.
    pub fn build(any: &TagSet, all: &TagSet) -> Self {
        let entries = any
            .iter()
            .map(|tag| SubscriptionEntry::new(*tag, SubscriptionMode::Any))
            .chain(all.iter().map(|tag| SubscriptionEntry::new(*tag, SubscriptionMode::All)))
            .collect();

        Self { entries }
    }

    /// Returns the entries of the request, in order.
    pub fn entries(&self) -> &[SubscriptionEntry] {
        &self.entries
    }

    /// Returns the number of entries in the request.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the request has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Encodes the request into its wire payload.
    ///
    /// Each entry is written as `" <flag> <tag>"`, so a request for `A` (any) and `B` (all) encodes as `" a A w B"`.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.entries.len() * (crate::tag::TAG_LEN + 4));
        for entry in &self.entries {
            buf.put_u8(b' ');
            buf.put_u8(entry.mode.as_flag() as u8);
            buf.put_u8(b' ');
            buf.put_slice(entry.tag.as_bytes());
        }
        buf.freeze()
    }
}

impl fmt::Display for SubscriptionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{}", entry)?;
        }
        Ok(())
    }
}

/// The tags a relay subscribes to, split by subscription mode.
///
/// At least one of the two groups must be non-empty.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Subscriptions {
    any: TagSet,
    all: TagSet,
}

impl Subscriptions {
    /// Creates a new `Subscriptions` from the given "any" and "all" tag sets.
    ///
    /// # Errors
    ///
    /// If both sets are empty, an error is returned.
    pub fn new(any: TagSet, all: TagSet) -> Result<Self, SubscriptionError> {
        if any.is_empty() && all.is_empty() {
            return Err(SubscriptionError::NoTags);
        }

        Ok(Self { any, all })
    }

    /// Returns the "any" tags.
    pub fn any(&self) -> &TagSet {
        &self.any
    }

    /// Returns the "all" tags.
    pub fn all(&self) -> &TagSet {
        &self.all
    }

    /// Builds the subscription request for these tags.
    pub fn to_request(&self) -> SubscriptionRequest {
        SubscriptionRequest::build(&self.any, &self.all)
    }
}
