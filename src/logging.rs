// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use tracing_subscriber::EnvFilter;

/// Target used by every event this crate emits.
pub const TARGET: &str = "ledgerkeep";

const DEFAULT_FILTER: &str = "ledgerkeep=info";

/// Install a stdout `tracing` subscriber filtered by `RUST_LOG`.
///
/// Safe to call more than once; later calls are no-ops if a global
/// subscriber is already set (for instance by the host UI process).
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
