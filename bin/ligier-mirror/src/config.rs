use std::time::Duration;

use clap::{ArgAction, Parser};
use controlhost::{HostAddress, SubscriptionError, SubscriptionMode, Subscriptions, TagError, TagSet};
use snafu::{ResultExt as _, Snafu};
use tracing::level_filters::LevelFilter;

/// A configuration error.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)))]
pub enum ConfigError {
    /// A tag given on the command line was invalid.
    #[snafu(display("invalid '{}' tag: {}", mode, source))]
    InvalidTag {
        /// Subscription mode the tag was given for.
        mode: SubscriptionMode,

        /// Source of the error.
        source: TagError,
    },

    /// No tags were given at all.
    #[snafu(display("{}", source))]
    NoTags {
        /// Source of the error.
        source: SubscriptionError,
    },

    /// The report interval was not a positive, finite number of seconds.
    #[snafu(display("report interval must be a positive number of seconds (got {})", value))]
    InvalidInterval {
        /// Interval that was given, in seconds.
        value: f64,
    },
}

/// Forwards messages with the given tags from one ControlHost server (e.g. JLigier) to another.
#[derive(Parser)]
#[command(about, version)]
pub struct Cli {
    /// Source server, as `host[:port]`.
    #[arg(short = 'H', long, value_name = "HOST[:PORT]", default_value = "localhost")]
    pub source: HostAddress,

    /// Target server, as `host[:port]`.
    #[arg(short = 'X', long, value_name = "HOST[:PORT]", default_value = "localhost")]
    pub target: HostAddress,

    /// Tag(s) to subscribe to in "any" mode.
    #[arg(short = 't', long = "any", value_name = "TAG", num_args = 1.., action = ArgAction::Append)]
    pub any_tags: Vec<String>,

    /// Tag(s) to subscribe to in "all" mode.
    #[arg(short = 'T', long = "all", value_name = "TAG", num_args = 1.., action = ArgAction::Append)]
    pub all_tags: Vec<String>,

    /// Interval between message rate reports, in seconds.
    #[arg(
        short = 'i',
        long = "interval",
        value_name = "SECONDS",
        default_value_t = 30.0,
        allow_negative_numbers = true
    )]
    pub report_interval_secs: f64,

    /// Enable debug output, including a line per forwarded message. (Specify twice for more verbosity.)
    #[arg(short = 'd', long = "debug", action = ArgAction::Count, default_value_t = 0)]
    debug: u8,
}

impl Cli {
    /// Gets the configured log level based on the user-supplied verbosity level.
    pub fn log_level(&self) -> LevelFilter {
        match self.debug {
            0 => LevelFilter::INFO,
            1 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    }

    /// Validates the command line and converts it into a relay configuration.
    ///
    /// # Errors
    ///
    /// If any tag is invalid, no tags were given, or the report interval is not positive, an error is returned.
    pub fn into_relay_config(self) -> Result<RelayConfig, ConfigError> {
        let any = TagSet::from_strs(&self.any_tags).context(InvalidTag {
            mode: SubscriptionMode::Any,
        })?;
        let all = TagSet::from_strs(&self.all_tags).context(InvalidTag {
            mode: SubscriptionMode::All,
        })?;
        let subscriptions = Subscriptions::new(any, all).context(NoTags)?;

        let report_interval = parse_report_interval(self.report_interval_secs)?;

        Ok(RelayConfig {
            source: self.source,
            target: self.target,
            subscriptions,
            report_interval,
        })
    }
}

fn parse_report_interval(secs: f64) -> Result<Duration, ConfigError> {
    if !secs.is_finite() || secs <= 0.0 {
        return Err(ConfigError::InvalidInterval { value: secs });
    }

    match Duration::try_from_secs_f64(secs) {
        Ok(interval) if !interval.is_zero() => Ok(interval),
        _ => Err(ConfigError::InvalidInterval { value: secs }),
    }
}

/// Validated relay configuration.
pub struct RelayConfig {
    /// Server to consume messages from.
    pub source: HostAddress,

    /// Server to forward messages to.
    pub target: HostAddress,

    /// Tags to subscribe to on the source server.
    pub subscriptions: Subscriptions,

    /// Interval between message rate reports.
    pub report_interval: Duration,
}
