// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Kiln compilation driver.
//!
//! A [`Session`] runs the whole pipeline for one module:
//! dispatch -> borrow check -> lift -> inline -> borrow check -> lower.
//! [`compile_build`] compiles several modules, in parallel where their
//! imports allow.

mod build;
mod error;
mod options;
mod session;

pub use build::compile_build;
pub use error::{BuildError, CompileError};
pub use options::CompileOptions;
pub use session::{CompiledModule, Session};

use std::sync::Once;

static TRACING: Once = Once::new();

/// Installs a subscriber printing pipeline spans and events to stderr.
///
/// Does nothing unless `RUST_LOG` is set, e.g. `RUST_LOG=kiln_inline=trace`
/// to follow template expansion. Later calls are no-ops, and so is a call
/// after some other subscriber was installed.
pub fn init_tracing() {
    TRACING.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        let Ok(filter) = EnvFilter::try_from_default_env() else { return };
        let _ = tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
            .with(filter)
            .try_init();
    });
}
