use std::io;

use snafu::Snafu;

use crate::{
    addr::HostAddress,
    frame::{FrameHeader, FramingError},
    subscription::SubscriptionRequest,
    tag::Tag,
};

/// A channel error.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)), visibility(pub(crate)))]
pub enum ChannelError {
    /// Failed to connect to the server.
    #[snafu(display("failed to connect to {}: {}", address, source))]
    Connect {
        /// Server address.
        address: HostAddress,

        /// Source of the error.
        source: io::Error,
    },

    /// The peer closed the connection.
    #[snafu(display("connection closed by peer while {}", operation))]
    ConnectionClosed {
        /// Operation that was in progress.
        operation: &'static str,
    },

    /// A frame was malformed.
    #[snafu(display("malformed frame while {}: {}", operation, source))]
    MalformedFrame {
        /// Operation that was in progress.
        operation: &'static str,

        /// Source of the error.
        source: FramingError,
    },

    /// The peer, or the local caller, violated the protocol.
    #[snafu(display("protocol error: {}", reason))]
    Protocol {
        /// Cause of the protocol error.
        reason: String,
    },

    /// The subscription request could not be delivered to the server.
    #[snafu(display("failed to negotiate subscription: {}", source))]
    SubscriptionFailed {
        /// Source of the error.
        source: io::Error,
    },

    /// An I/O error occurred that does not indicate the connection was closed.
    #[snafu(display("I/O error while {}: {}", operation, source))]
    Io {
        /// Operation that was in progress.
        operation: &'static str,

        /// Source of the error.
        source: io::Error,
    },
}

impl ChannelError {
    /// Classifies an I/O error that occurred during `operation`.
    ///
    /// End-of-file, reset, aborted and broken pipe conditions all mean the peer went away, and are reported as
    /// [`ChannelError::ConnectionClosed`]. Anything else is reported as [`ChannelError::Io`].
    pub(crate) fn from_io(operation: &'static str, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe => Self::ConnectionClosed { operation },
            _ => Self::Io { operation, source },
        }
    }

    /// Returns `true` if this error indicates the peer closed the connection.
    pub fn is_connection_closed(&self) -> bool {
        matches!(self, Self::ConnectionClosed { .. })
    }

    /// Returns `true` if this error is a protocol violation, including malformed frames and failed subscriptions.
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            Self::Protocol { .. } | Self::MalformedFrame { .. } | Self::SubscriptionFailed { .. }
        )
    }
}

/// A framed message channel.
///
/// `MessageChannel` is the frame-oriented view of a connected publish/subscribe session. All operations block until
/// they complete or fail, and a partial frame is never exposed: a header is only returned once it has been read in
/// full, and a body is only considered received once exactly the requested number of bytes has been read.
pub trait MessageChannel {
    /// Sends the given subscription request.
    ///
    /// This is meant to be called once, before any frames are received.
    ///
    /// # Errors
    ///
    /// If the request is rejected, or the connection drops while sending it, a protocol error is returned.
    fn subscribe(&mut self, request: &SubscriptionRequest) -> Result<(), ChannelError>;

    /// Asks the server to push matching messages to this connection indefinitely.
    ///
    /// # Errors
    ///
    /// If the connection drops while sending the request, an error is returned.
    fn declare_liveness(&mut self) -> Result<(), ChannelError>;

    /// Waits for the next frame header.
    ///
    /// # Errors
    ///
    /// If the connection is closed, or the header is malformed, an error is returned.
    fn receive_header(&mut self) -> Result<FrameHeader, ChannelError>;

    /// Reads exactly `size` bytes of frame body into the front of `buffer`.
    ///
    /// # Errors
    ///
    /// If `buffer` is shorter than `size`, a protocol error is returned. If the connection is closed before `size`
    /// bytes have been read, an error is returned.
    fn receive_body(&mut self, buffer: &mut [u8], size: usize) -> Result<(), ChannelError>;

    /// Sends a complete frame, with the given tag and the first `size` bytes of `buffer` as its payload.
    ///
    /// # Errors
    ///
    /// If `size` does not match the length of `buffer`, or can't be described by a frame header, a framing error is
    /// returned and nothing is written. If the peer has gone away, an error is returned.
    fn send(&mut self, tag: &Tag, buffer: &[u8], size: usize) -> Result<(), ChannelError>;
}

impl<T> MessageChannel for &mut T
where
    T: MessageChannel + ?Sized,
{
    fn subscribe(&mut self, request: &SubscriptionRequest) -> Result<(), ChannelError> {
        (**self).subscribe(request)
    }

    fn declare_liveness(&mut self) -> Result<(), ChannelError> {
        (**self).declare_liveness()
    }

    fn receive_header(&mut self) -> Result<FrameHeader, ChannelError> {
        (**self).receive_header()
    }

    fn receive_body(&mut self, buffer: &mut [u8], size: usize) -> Result<(), ChannelError> {
        (**self).receive_body(buffer, size)
    }

    fn send(&mut self, tag: &Tag, buffer: &[u8], size: usize) -> Result<(), ChannelError> {
        (**self).send(tag, buffer, size)
    }
}

/// Validates the arguments of [`MessageChannel::send`] and builds the header for the frame.
pub(crate) fn outbound_header(tag: &Tag, buffer: &[u8], size: usize) -> Result<FrameHeader, ChannelError> {
    if buffer.len() != size {
        return Err(ChannelError::MalformedFrame {
            operation: "sending frame",
            source: FramingError::SizeMismatch {
                declared: size,
                actual: buffer.len(),
            },
        });
    }

    FrameHeader::new(*tag, size).map_err(|source| ChannelError::MalformedFrame {
        operation: "sending frame",
        source,
    })
}

/// Validates the arguments of [`MessageChannel::receive_body`].
pub(crate) fn check_body_buffer(buffer: &[u8], size: usize) -> Result<(), ChannelError> {
    if buffer.len() < size {
        return Err(ChannelError::Protocol {
            reason: format!("body buffer of {} bytes cannot hold {} byte payload", buffer.len(), size),
        });
    }

    Ok(())
}
