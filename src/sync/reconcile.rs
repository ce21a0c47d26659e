//! Optimistic apply, remote commit, revert on failure.
//!
//! [`apply_then_reconcile`] is the one place that sequences an optimistic
//! mutation. The local step runs before the function returns, so observers
//! see the change without waiting for the network; the remote commit and
//! any revert run when the returned future is awaited.

use std::future::Future;

use futures::FutureExt;
use futures::future::BoxFuture;

/// Result of the local step of an optimistic mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalChange<U, S> {
    /// The local state changed; `U` describes the change for the commit and
    /// revert steps.
    Applied(U),
    /// Nothing was changed locally and nothing should be written.
    Skipped(S),
}

/// What [`apply_then_reconcile`] decided to do.
pub enum Reconciliation<S, E> {
    /// The local step skipped the mutation; no remote write happens.
    Skipped(S),
    /// The local change is visible; awaiting the future commits it.
    InFlight(BoxFuture<'static, Result<(), E>>),
}

impl<S: std::fmt::Debug, E> std::fmt::Debug for Reconciliation<S, E> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Skipped(reason) => formatter.debug_tuple("Skipped").field(reason).finish(),
            Self::InFlight(_) => formatter.write_str("InFlight"),
        }
    }
}

/// Applies a mutation locally, then commits it remotely and reverts the
/// local change if the commit fails.
///
/// `mutate_local` runs immediately. If it skips, `commit_remote` is never
/// called. Otherwise `commit_remote` builds the write from the applied
/// change, and the returned future awaits it; on error the change and the
/// error are handed to `revert_local` before the error is returned.
pub fn apply_then_reconcile<U, S, E, M, C, Fut, R>(
    mutate_local: M,
    commit_remote: C,
    revert_local: R,
) -> Reconciliation<S, E>
where
    M: FnOnce() -> LocalChange<U, S>,
    C: FnOnce(&U) -> Fut,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    R: FnOnce(U, &E) + Send + 'static,
    U: Send + 'static,
    E: Send + 'static,
{
    match mutate_local() {
        LocalChange::Skipped(reason) => Reconciliation::Skipped(reason),
        LocalChange::Applied(change) => {
            let commit = commit_remote(&change);
            Reconciliation::InFlight(
                async move {
                    match commit.await {
                        Ok(()) => Ok(()),
                        Err(error) => {
                            revert_local(change, &error);
                            Err(error)
                        }
                    }
                }
                .boxed(),
            )
        }
    }
}
