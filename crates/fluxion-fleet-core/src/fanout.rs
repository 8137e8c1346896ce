// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of FluxION.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

//! Deadline-bounded fan-out shared by resolution, liveness checks, dispatch
//! and acknowledgement handling.

use futures_util::future::join_all;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

use crate::error::{FleetError, Result};

/// Await `fut` until `expires_at`, failing with `Timeout` past it
pub(crate) async fn within<T>(
    expires_at: Instant,
    deadline: Duration,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout_at(expires_at, fut)
        .await
        .unwrap_or_else(|_| {
            Err(FleetError::Timeout {
                secs: deadline.as_secs(),
            })
        })
}

/// Run `op` for every item concurrently and collect each item's own result.
///
/// All items share one deadline measured from the call. An item still running
/// when it expires reports `Timeout`; items that finished keep their outcome.
pub(crate) async fn run_bounded<K, T, F, Fut>(
    items: impl IntoIterator<Item = K>,
    deadline: Duration,
    op: F,
) -> Vec<(K, Result<T>)>
where
    K: Clone,
    F: Fn(K) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let expires_at = Instant::now() + deadline;
    let tasks = items.into_iter().map(|item| {
        let fut = op(item.clone());
        async move { (item, within(expires_at, deadline, fut).await) }
    });
    join_all(tasks).await
}
