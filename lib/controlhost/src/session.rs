use std::{
    io::{self, Read, Write},
    net::TcpStream,
};

use bytes::{BufMut as _, BytesMut};
use snafu::ResultExt as _;
use tracing::{debug, trace};

use crate::{
    addr::HostAddress,
    channel::{check_body_buffer, outbound_header, ChannelError, Connect, MessageChannel, SubscriptionFailed},
    frame::{FrameHeader, PREFIX_LEN},
    subscription::SubscriptionRequest,
    tag::Tag,
};

const SUBSCRIBE_TAG: Tag = Tag::from_wire(*b"_Subscri");
const ALWAYS_TAG: Tag = Tag::from_wire(*b"_Always\0");

/// A ControlHost session.
///
/// `Session` speaks the ControlHost protocol over any bidirectional byte stream, and is normally created with
/// [`Session::connect`], which opens a TCP connection to a server. Each outbound frame is assembled in full before being
/// written, so a frame is never interleaved or partially buffered across calls.
pub struct Session<S> {
    stream: S,
    peer: String,
    write_buf: BytesMut,
}

impl Session<TcpStream> {
    /// Connects to the ControlHost server at the given address.
    ///
    /// # Errors
    ///
    /// If the connection cannot be established, an error is returned.
    pub fn connect(address: &HostAddress) -> Result<Self, ChannelError> {
        let stream = TcpStream::connect((address.host(), address.port())).context(Connect {
            address: address.clone(),
        })?;

        // Frames are written in a single call, so there is nothing to gain from Nagle.
        stream.set_nodelay(true).context(Connect {
            address: address.clone(),
        })?;

        debug!(peer = %address, "Connected to ControlHost server.");

        Ok(Self::from_stream(stream, address.to_string()))
    }
}

impl<S> Session<S>
where
    S: Read + Write,
{
    /// Creates a session over an already-connected stream.
    ///
    /// `peer` is only used for diagnostics.
    pub fn from_stream<P: Into<String>>(stream: S, peer: P) -> Self {
        Self {
            stream,
            peer: peer.into(),
            write_buf: BytesMut::new(),
        }
    }

    /// Returns a description of the remote peer.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Consumes the session, returning the underlying stream.
    pub fn into_inner(self) -> S {
        self.stream
    }

    fn write_frame(&mut self, header: FrameHeader, payload: &[u8]) -> io::Result<()> {
        self.write_buf.clear();
        self.write_buf.reserve(PREFIX_LEN + payload.len());
        header.encode(&mut self.write_buf);
        self.write_buf.put_slice(payload);

        self.stream.write_all(&self.write_buf)?;
        self.stream.flush()?;

        trace!(peer = %self.peer, tag = %header.tag(), size = header.size(), "Wrote frame.");
        Ok(())
    }
}

impl<S> MessageChannel for Session<S>
where
    S: Read + Write,
{
    fn subscribe(&mut self, request: &SubscriptionRequest) -> Result<(), ChannelError> {
        if request.is_empty() {
            return Err(ChannelError::Protocol {
                reason: "refusing to send an empty subscription request".to_string(),
            });
        }

        let payload = request.encode();
        let header = outbound_header(&SUBSCRIBE_TAG, &payload, payload.len())?;
        self.write_frame(header, &payload).context(SubscriptionFailed)?;

        debug!(peer = %self.peer, subscription = %request, "Sent subscription request.");
        Ok(())
    }

    fn declare_liveness(&mut self) -> Result<(), ChannelError> {
        let header = outbound_header(&ALWAYS_TAG, &[], 0)?;
        self.write_frame(header, &[]).map_err(|e| ChannelError::from_io("declaring liveness", e))
    }

    fn receive_header(&mut self) -> Result<FrameHeader, ChannelError> {
        let mut raw = [0; PREFIX_LEN];
        self.stream
            .read_exact(&mut raw)
            .map_err(|e| ChannelError::from_io("receiving frame header", e))?;

        FrameHeader::decode(&raw).map_err(|source| ChannelError::MalformedFrame {
            operation: "receiving frame header",
            source,
        })
    }

    fn receive_body(&mut self, buffer: &mut [u8], size: usize) -> Result<(), ChannelError> {
        check_body_buffer(buffer, size)?;

        self.stream
            .read_exact(&mut buffer[..size])
            .map_err(|e| ChannelError::from_io("receiving frame body", e))
    }

    fn send(&mut self, tag: &Tag, buffer: &[u8], size: usize) -> Result<(), ChannelError> {
        let header = outbound_header(tag, buffer, size)?;
        self.write_frame(header, buffer).map_err(|e| ChannelError::from_io("sending frame", e))
    }
}
