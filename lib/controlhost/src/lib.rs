//! ControlHost publish/subscribe primitives.
//!
//! This crate provides the building blocks for talking to a ControlHost dispatcher (such as JLigier): tags and tag
//! sets, subscription composition, the frame header ("prefix") codec, and a blocking, frame-oriented session that can
//! run over any byte stream.
//!
//! The [`MessageChannel`] trait is the seam between the protocol and its consumers: [`Session`] implements it over a
//! real connection, while the `test` feature provides an in-memory implementation for exercising consumers without a
//! network.
#![deny(missing_docs)]

mod addr;
pub use self::addr::{AddressError, HostAddress, DEFAULT_PORT};

mod channel;
pub use self::channel::{ChannelError, MessageChannel};

mod frame;
pub use self::frame::{FrameHeader, FramingError, PREFIX_LEN};

mod session;
pub use self::session::Session;

mod subscription;
pub use self::subscription::{
    SubscriptionEntry, SubscriptionError, SubscriptionMode, SubscriptionRequest, Subscriptions,
};

mod tag;
pub use self::tag::{Tag, TagError, TagSet, TAG_LEN};
