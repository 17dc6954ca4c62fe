//! Environment helpers shared by the `from_env` constructors

use std::str::FromStr;
use std::sync::Once;
use std::time::Duration;
use tracing::{debug, error};

static DOTENV: Once = Once::new();

/// Load `.env` from the working directory once per process. A missing file
/// is not an error.
pub fn load_dotenv() {
    DOTENV.call_once(|| match dotenv::dotenv() {
        Ok(path) => debug!(path = %path.display(), "Loaded environment file"),
        Err(e) if e.not_found() => {}
        Err(e) => error!(error = %e, "Failed to load environment file"),
    });
}

/// Parse `name` from the environment. Unset yields `None`; a value that
/// fails to parse is logged and also yields `None`.
pub fn env_parse<T>(name: &str) -> Option<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(e) => {
            error!(variable = name, value = %raw, error = %e, "Ignoring invalid environment value");
            None
        }
    }
}

/// Whole seconds from the environment as a [`Duration`].
pub fn env_duration_secs(name: &str) -> Option<Duration> {
    env_parse::<u64>(name).map(Duration::from_secs)
}
