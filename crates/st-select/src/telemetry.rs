// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Subscriber bootstrap for hosts that drive the selectors.
//!
//! The library only emits events under the `st_select::*` targets (plans at
//! `debug`, per-pass details at `trace`). [`init_tracing`] installs a
//! subscriber scoped to those targets; hosts with their own subscriber can
//! ignore this module.

use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Filter used when `SPIRAL_SELECT_LOG` is unset. Plan decisions need
/// `st_select=debug`.
pub const DEFAULT_DIRECTIVES: &str = "warn,st_select=info";

static OUTCOME: OnceLock<Result<(), InitError>> = OnceLock::new();
static CHROME_FLUSH: Mutex<Option<tracing_chrome::FlushGuard>> = Mutex::new(None);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InitError {
    #[error("a global tracing subscriber is already installed")]
    AlreadyInstalled,
    #[error("invalid filter directives `{directives}`: {reason}")]
    Filter { directives: String, reason: String },
}

/// Where selector events go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceOptions {
    pub directives: String,
    /// Chrome trace file receiving every event that passes the filter.
    pub chrome_path: Option<PathBuf>,
}

impl Default for TraceOptions {
    fn default() -> Self {
        Self {
            directives: DEFAULT_DIRECTIVES.to_owned(),
            chrome_path: None,
        }
    }
}

impl TraceOptions {
    /// Reads `SPIRAL_SELECT_LOG` and `SPIRAL_SELECT_TRACE_CHROME`; blank
    /// values keep the defaults.
    pub fn from_env() -> Self {
        let non_blank = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());
        Self {
            directives: non_blank("SPIRAL_SELECT_LOG")
                .unwrap_or_else(|| DEFAULT_DIRECTIVES.to_owned()),
            chrome_path: non_blank("SPIRAL_SELECT_TRACE_CHROME").map(PathBuf::from),
        }
    }

    fn filter(&self) -> Result<EnvFilter, InitError> {
        EnvFilter::try_new(&self.directives).map_err(|e| InitError::Filter {
            directives: self.directives.clone(),
            reason: e.to_string(),
        })
    }
}

/// Installs a subscriber configured from the environment once per process.
/// Later calls return the first outcome.
pub fn init_tracing() -> Result<(), InitError> {
    OUTCOME
        .get_or_init(|| install(&TraceOptions::from_env()))
        .clone()
}

fn install(options: &TraceOptions) -> Result<(), InitError> {
    let filter = options.filter()?;
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .compact();
    let chrome_layer = options.chrome_path.as_ref().map(|path| {
        let (layer, guard) = tracing_chrome::ChromeLayerBuilder::new()
            .file(path)
            .include_args(true)
            .build();
        if let Ok(mut slot) = CHROME_FLUSH.lock() {
            *slot = Some(guard);
        }
        layer
    });
    Registry::default()
        .with(filter)
        .with(fmt_layer)
        .with(chrome_layer)
        .try_init()
        .map_err(|_| InitError::AlreadyInstalled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_directives_target_this_crate() {
        let options = TraceOptions::default();
        assert!(options.filter().is_ok());
        assert!(options.directives.contains("st_select=info"));
        assert_eq!(options.chrome_path, None);
    }

    #[test]
    fn malformed_directives_are_reported() {
        let options = TraceOptions {
            directives: "st_select=loud".to_owned(),
            chrome_path: None,
        };
        assert!(matches!(options.filter(), Err(InitError::Filter { .. })));
    }

    #[test]
    fn repeated_initialisation_returns_the_first_outcome() {
        let first = init_tracing();
        assert_eq!(init_tracing(), first);
        tracing::debug!(target: "st_select::telemetry", "subscriber ready");
    }
}
