// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Logging initialization.
//!
//! The library itself only emits through the `log` facade. Applications that
//! have no logger of their own call [`init_logger`] once at startup.

use env_logger::Env;

/// Install `env_logger`, honouring `RUST_LOG` (defaults to `warn`).
///
/// Returns `false` if a logger was already installed.
pub fn init_logger() -> bool {
    env_logger::Builder::from_env(Env::default().default_filter_or("warn"))
        .format_timestamp_millis()
        .try_init()
        .is_ok()
}

/// Install `env_logger` with an explicit filter (`"znet=debug"`, `"info"`, ...).
///
/// `RUST_LOG` is ignored.
pub fn init_logger_with_filter(filter: &str) -> bool {
    env_logger::Builder::new()
        .parse_filters(filter)
        .format_timestamp_millis()
        .try_init()
        .is_ok()
}

/// Install `env_logger` at a fixed level.
pub fn init_logger_with_level(level: log::LevelFilter) -> bool {
    env_logger::Builder::new()
        .filter_level(level)
        .format_timestamp_millis()
        .try_init()
        .is_ok()
}
