use std::time::Duration;

use controlhost::{ChannelError, MessageChannel, Subscriptions};
use quanta::Clock;
use snafu::{ResultExt as _, Snafu};
use tracing::{debug, info};

use crate::rate::RateReporter;

/// Payload that, once forwarded, stops the relay.
pub const STOP_SENTINEL: &[u8] = b"stop";

/// A relay error.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)))]
pub enum RelayError {
    /// Failed to set up the subscription on the source server.
    #[snafu(display("failed to subscribe on source server: {}", source))]
    Subscribe {
        /// Source of the error.
        source: ChannelError,
    },

    /// Failed to receive a frame from the source server.
    #[snafu(display("failed to receive message from source server: {}", source))]
    Receive {
        /// Source of the error.
        source: ChannelError,
    },

    /// Failed to forward a frame to the target server.
    #[snafu(display("failed to forward message to target server: {}", source))]
    Forward {
        /// Source of the error.
        source: ChannelError,
    },
}

/// Relay state.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RelayState {
    /// Frames are being forwarded.
    Running,

    /// The relay has stopped, either because the stop sentinel was forwarded or because a channel failed.
    Stopped,
}

/// What a forwarded frame means for the relay.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Disposition {
    Continue,
    Sentinel,
}

impl Disposition {
    fn of(payload: &[u8]) -> Self {
        if payload == STOP_SENTINEL {
            Self::Sentinel
        } else {
            Self::Continue
        }
    }
}

/// Summary of a completed relay run.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RelaySummary {
    /// Total number of frames forwarded, including the stop sentinel.
    pub frames_forwarded: u64,
}

/// Forwards frames from an input channel to an output channel.
///
/// The relay forwards each frame exactly as received, tag and payload untouched, and keeps going until it forwards a
/// frame whose payload is exactly [`STOP_SENTINEL`], or until either channel fails. There is no retrying: the first
/// failure stops the relay for good.
pub struct Relay<I, O> {
    input: I,
    output: O,
    clock: Clock,
    reporter: RateReporter,
    buffer: Vec<u8>,
    frames_forwarded: u64,
    state: RelayState,
}

impl<I, O> Relay<I, O>
where
    I: MessageChannel,
    O: MessageChannel,
{
    /// Creates a new `Relay` that reports the message rate every `report_interval`.
    pub fn new(input: I, output: O, report_interval: Duration) -> Self {
        Self::with_clock(input, output, report_interval, Clock::new())
    }

    /// Creates a new `Relay` that reads time from the given clock.
    pub fn with_clock(input: I, output: O, report_interval: Duration, clock: Clock) -> Self {
        let reporter = RateReporter::new(report_interval, clock.now());

        Self {
            input,
            output,
            clock,
            reporter,
            buffer: Vec::new(),
            frames_forwarded: 0,
            state: RelayState::Running,
        }
    }

    /// Returns the current state.
    #[cfg(test)]
    pub fn state(&self) -> RelayState {
        self.state
    }

    /// Returns the rate reporter.
    #[cfg(test)]
    pub fn reporter(&self) -> &RateReporter {
        &self.reporter
    }

    /// Returns the total number of frames forwarded so far.
    #[cfg(test)]
    pub fn frames_forwarded(&self) -> u64 {
        self.frames_forwarded
    }

    /// Subscribes to the given tags on the input channel and asks for messages to be pushed indefinitely.
    ///
    /// # Errors
    ///
    /// If the subscription cannot be sent, the relay is stopped and an error is returned.
    pub fn subscribe(&mut self, subscriptions: &Subscriptions) -> Result<(), RelayError> {
        let request = subscriptions.to_request();

        let result = self
            .input
            .subscribe(&request)
            .and_then(|()| self.input.declare_liveness())
            .context(Subscribe);
        if result.is_err() {
            self.state = RelayState::Stopped;
        }

        result
    }

    /// Forwards a single frame.
    ///
    /// Returns the state of the relay after the frame was forwarded. Once stopped, calling `step` again does nothing.
    ///
    /// # Errors
    ///
    /// If receiving from the input channel or sending to the output channel fails, the relay is stopped and an error
    /// is returned.
    pub fn step(&mut self) -> Result<RelayState, RelayError> {
        if self.state == RelayState::Stopped {
            return Ok(RelayState::Stopped);
        }

        match self.forward_one() {
            Ok(Disposition::Continue) => {}
            Ok(Disposition::Sentinel) => {
                info!("Stop message received.");
                self.state = RelayState::Stopped;
            }
            Err(e) => {
                self.state = RelayState::Stopped;
                return Err(e);
            }
        }

        Ok(self.state)
    }

    /// Forwards frames until the relay stops.
    ///
    /// # Errors
    ///
    /// If receiving from the input channel or sending to the output channel fails, an error is returned.
    pub fn run(&mut self) -> Result<RelaySummary, RelayError> {
        while self.step()? == RelayState::Running {}

        Ok(RelaySummary {
            frames_forwarded: self.frames_forwarded,
        })
    }

    fn forward_one(&mut self) -> Result<Disposition, RelayError> {
        let header = self.input.receive_header().context(Receive)?;
        let size = header.size();

        self.buffer.resize(size, 0);
        self.input.receive_body(&mut self.buffer, size).context(Receive)?;

        debug!("{:<8} {:>8}", header.tag(), size);

        self.output.send(header.tag(), &self.buffer, size).context(Forward)?;

        self.frames_forwarded += 1;
        self.reporter.on_message();
        if let Some(report) = self.reporter.maybe_report(self.clock.now()) {
            info!(
                messages = report.messages,
                window_secs = report.elapsed.as_secs_f64(),
                "Message rate: {:.2} Hz",
                report.rate
            );
        }

        Ok(Disposition::of(&self.buffer))
    }
}

#[cfg(test)]
mod tests {
    use std::{net::TcpListener, thread};

    use controlhost::{
        test::{MemoryChannel, SentFrame},
        HostAddress, Session, Tag, TagSet,
    };

    use super::*;

    const LONG_INTERVAL: Duration = Duration::from_secs(3600);

    fn sent(tag: &str, payload: &'static str) -> SentFrame {
        SentFrame {
            tag: Tag::new(tag).unwrap(),
            payload: payload.into(),
        }
    }

    #[test]
    fn forwards_until_sentinel() {
        let mut input = MemoryChannel::new()
            .with_frame("A", "xyz")
            .with_frame("B", "stop")
            .with_frame("C", "never");
        let mut output = MemoryChannel::new();

        let mut relay = Relay::new(&mut input, &mut output, LONG_INTERVAL);
        let summary = relay.run().expect("relay should stop cleanly");

        assert_eq!(summary.frames_forwarded, 2);
        assert_eq!(relay.reporter().message_count(), 2);
        assert_eq!(relay.state(), RelayState::Stopped);
        drop(relay);

        assert_eq!(output.sent_frames(), &[sent("A", "xyz"), sent("B", "stop")]);
        assert_eq!(input.remaining_inbound(), 1);
    }

    #[test]
    fn sentinel_must_match_exactly() {
        let mut input = MemoryChannel::new()
            .with_frame("A", "stopx")
            .with_frame("A", "sto")
            .with_frame("A", "STOP")
            .with_frame("A", " stop");
        let mut output = MemoryChannel::new();

        let mut relay = Relay::new(&mut input, &mut output, LONG_INTERVAL);
        for _ in 0..4 {
            assert_eq!(relay.step().expect("should forward"), RelayState::Running);
        }

        // With the script exhausted, the input reports the connection as closed.
        let err = relay.step().unwrap_err();
        assert!(matches!(err, RelayError::Receive { ref source } if source.is_connection_closed()));
        assert_eq!(relay.state(), RelayState::Stopped);
        drop(relay);

        assert_eq!(output.sent_frames().len(), 4);
    }

    #[test]
    fn sentinel_applies_to_any_tag() {
        let mut input = MemoryChannel::new().with_frame("IO_EVT", "stop");
        let mut output = MemoryChannel::new();

        let mut relay = Relay::new(&mut input, &mut output, LONG_INTERVAL);
        assert_eq!(relay.step().expect("should forward"), RelayState::Stopped);
        drop(relay);

        assert_eq!(output.sent_frames(), &[sent("IO_EVT", "stop")]);
    }

    #[test]
    fn forwards_binary_payloads_unchanged() {
        let payload: &'static [u8] = b"\x00\xffstop\x00";
        let mut input = MemoryChannel::new().with_frame("IO_EVT", payload).with_frame("IO_EVT", "");
        let mut output = MemoryChannel::new();

        let mut relay = Relay::new(&mut input, &mut output, LONG_INTERVAL);
        assert_eq!(relay.step().unwrap(), RelayState::Running);
        assert_eq!(relay.step().unwrap(), RelayState::Running);
        drop(relay);

        let frames = output.sent_frames();
        assert_eq!(&frames[0].payload[..], payload);
        assert!(frames[1].payload.is_empty());
    }

    #[test]
    fn send_failure_stops_relay() {
        let mut input = MemoryChannel::new().with_frame("A", "one").with_frame("A", "two");
        let mut output = MemoryChannel::new().failing_after(1);

        let mut relay = Relay::new(&mut input, &mut output, LONG_INTERVAL);
        let err = relay.run().unwrap_err();
        assert!(matches!(err, RelayError::Forward { ref source } if source.is_connection_closed()));
        assert_eq!(relay.state(), RelayState::Stopped);
        assert_eq!(relay.frames_forwarded(), 1);

        // Stopped is terminal.
        assert_eq!(relay.step().unwrap(), RelayState::Stopped);
        drop(relay);

        assert_eq!(output.sent_frames(), &[sent("A", "one")]);
        assert_eq!(input.remaining_inbound(), 0);
    }

    #[test]
    fn short_body_stops_relay() {
        let mut input = MemoryChannel::new().with_truncated_frame("A", 10, "short");
        let mut output = MemoryChannel::new();

        let mut relay = Relay::new(&mut input, &mut output, LONG_INTERVAL);
        let err = relay.run().unwrap_err();
        assert!(matches!(err, RelayError::Receive { ref source } if source.is_connection_closed()));
        drop(relay);

        assert!(output.sent_frames().is_empty());
    }

    #[test]
    fn malformed_header_stops_relay() {
        let mut input = MemoryChannel::new().with_malformed_header("A").with_frame("A", "never");
        let mut output = MemoryChannel::new();

        let mut relay = Relay::new(&mut input, &mut output, LONG_INTERVAL);
        let err = relay.run().unwrap_err();
        assert!(matches!(err, RelayError::Receive { ref source } if source.is_protocol_error()));
        drop(relay);

        assert!(output.sent_frames().is_empty());
    }

    #[test]
    fn subscribes_with_liveness() {
        let any = TagSet::from_strs(["IO_EVT"]).unwrap();
        let all = TagSet::from_strs(["MSG"]).unwrap();
        let subscriptions = Subscriptions::new(any, all).unwrap();

        let mut input = MemoryChannel::new();
        let mut relay = Relay::new(&mut input, MemoryChannel::new(), LONG_INTERVAL);
        relay.subscribe(&subscriptions).expect("should subscribe");
        assert_eq!(relay.state(), RelayState::Running);
        drop(relay);

        assert_eq!(input.subscriptions(), &[subscriptions.to_request()]);
        assert_eq!(input.liveness_declarations(), 1);
    }

    #[test]
    fn subscribe_failure_stops_relay() {
        let subscriptions = Subscriptions::new(TagSet::from_strs(["MSG"]).unwrap(), TagSet::new()).unwrap();

        for mut input in [
            MemoryChannel::new().failing_subscribe().with_frame("MSG", "never"),
            MemoryChannel::new().failing_liveness().with_frame("MSG", "never"),
        ] {
            let mut output = MemoryChannel::new();
            let mut relay = Relay::new(&mut input, &mut output, LONG_INTERVAL);

            let err = relay.subscribe(&subscriptions).unwrap_err();
            assert!(matches!(err, RelayError::Subscribe { .. }), "unexpected error: {}", err);
            assert_eq!(relay.state(), RelayState::Stopped);

            // A stopped relay never touches its channels again.
            assert_eq!(relay.run().expect("stopped relay should return"), RelaySummary { frames_forwarded: 0 });
            drop(relay);

            assert_eq!(input.remaining_inbound(), 1);
            assert!(output.sent_frames().is_empty());
        }
    }

    #[test]
    fn rate_window_resets_after_interval() {
        let (clock, mock) = Clock::mock();
        let mut input = (0..101).fold(MemoryChannel::new(), |channel, _| channel.with_frame("A", "x"));
        let mut output = MemoryChannel::new();

        let mut relay = Relay::with_clock(&mut input, &mut output, Duration::from_secs(1), clock);

        // 100 messages spread over half a second: still within the window.
        for _ in 0..100 {
            mock.increment(Duration::from_millis(5));
            relay.step().unwrap();
        }
        assert_eq!(relay.reporter().message_count(), 100);

        // The next message lands after the interval, closing the window.
        mock.increment(Duration::from_millis(500));
        relay.step().unwrap();
        assert_eq!(relay.reporter().message_count(), 0);
        assert_eq!(relay.frames_forwarded(), 101);
    }

    #[test]
    fn relays_between_tcp_sessions() {
        let source = TcpListener::bind("127.0.0.1:0").unwrap();
        let target = TcpListener::bind("127.0.0.1:0").unwrap();
        let source_address = HostAddress::new("127.0.0.1", source.local_addr().unwrap().port());
        let target_address = HostAddress::new("127.0.0.1", target.local_addr().unwrap().port());

        // The source swallows the subscription and liveness frames, then publishes two messages.
        let source_server = thread::spawn(move || {
            let (stream, _) = source.accept().unwrap();
            let mut session = Session::from_stream(stream, "relay");
            for _ in 0..2 {
                let header = session.receive_header().unwrap();
                let mut body = vec![0; header.size()];
                session.receive_body(&mut body, header.size()).unwrap();
            }

            session.send(&Tag::new("A").unwrap(), b"xyz", 3).unwrap();
            session.send(&Tag::new("B").unwrap(), b"stop", 4).unwrap();
        });

        // The target collects everything it receives until the relay hangs up.
        let target_server = thread::spawn(move || {
            let (stream, _) = target.accept().unwrap();
            let mut session = Session::from_stream(stream, "relay");
            let mut frames = Vec::new();
            loop {
                match session.receive_header() {
                    Ok(header) => {
                        let mut body = vec![0; header.size()];
                        session.receive_body(&mut body, header.size()).unwrap();
                        frames.push((header.tag().to_string(), body));
                    }
                    Err(e) => {
                        assert!(e.is_connection_closed(), "unexpected error: {}", e);
                        break frames;
                    }
                }
            }
        });

        let subscriptions = Subscriptions::new(TagSet::from_strs(["A", "B"]).unwrap(), TagSet::new()).unwrap();
        let input = Session::connect(&source_address).expect("should connect to source");
        let output = Session::connect(&target_address).expect("should connect to target");

        let mut relay = Relay::new(input, output, LONG_INTERVAL);
        relay.subscribe(&subscriptions).expect("should subscribe");
        let summary = relay.run().expect("relay should stop cleanly");
        assert_eq!(summary.frames_forwarded, 2);
        drop(relay);

        source_server.join().unwrap();
        let frames = target_server.join().unwrap();
        assert_eq!(
            frames,
            vec![("A".to_string(), b"xyz".to_vec()), ("B".to_string(), b"stop".to_vec())]
        );
    }
}
