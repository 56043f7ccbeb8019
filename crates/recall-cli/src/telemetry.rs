//! Tracing setup for the `recall` binary.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber.
///
/// `RUST_LOG` wins when set; otherwise `level` applies. Logs go to stderr so
/// stdout stays clean for turn output. Only the first call takes effect.
pub fn init_tracing(json: bool, level: Level) {
	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

	let result = if json {
		tracing_subscriber::registry()
			.with(env_filter)
			.with(fmt::layer().with_writer(std::io::stderr).with_target(false).json())
			.try_init()
	} else {
		tracing_subscriber::registry()
			.with(env_filter)
			.with(fmt::layer().with_writer(std::io::stderr).with_target(false))
			.try_init()
	};
	let _ = result;
}
