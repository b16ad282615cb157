// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Logging utilities
//!
//! Thin layer over the `log` facade with an `env_logger` backend. Every
//! record is logged under the `msbjoin` target, so `RUST_LOG=msbjoin=debug`
//! shows per-task phase timings without the noise of other crates.

/// Initialize logging from `RUST_LOG`
pub fn init_logging() {
    let _ = env_logger::try_init();
}

/// Initialize logging with a specific level
///
/// Safe to call more than once; later calls are ignored.
pub fn init_logging_with_level(level: log::LevelFilter) {
    let _ = env_logger::Builder::from_default_env()
        .filter_level(level)
        .try_init();
}

/// Job level events: bucket pairs planned, rows written, wall time
#[macro_export]
macro_rules! merge_info {
    ($($arg:tt)*) => {
        log::info!(target: "msbjoin", $($arg)*)
    };
}

/// Task level events: phase timings, short-circuited bucket pairs
#[macro_export]
macro_rules! merge_debug {
    ($($arg:tt)*) => {
        log::debug!(target: "msbjoin", $($arg)*)
    };
}

/// Recoverable trouble, such as chunks removed after a failed job
#[macro_export]
macro_rules! merge_warn {
    ($($arg:tt)*) => {
        log::warn!(target: "msbjoin", $($arg)*)
    };
}

/// Failed fetches and tasks, logged before the error is returned
#[macro_export]
macro_rules! merge_error {
    ($($arg:tt)*) => {
        log::error!(target: "msbjoin", $($arg)*)
    };
}

/// Per-window detail of the match engine
#[macro_export]
macro_rules! merge_trace {
    ($($arg:tt)*) => {
        log::trace!(target: "msbjoin", $($arg)*)
    };
}
