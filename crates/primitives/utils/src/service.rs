//! Uplink service scoping
//!
//! Every long running task in Uplink (the upstream registry, the reconnection
//! scheduler, every upstream link and the pool reporter) runs as its own
//! non-blocking asynchronous task. Tasks are tied together by a
//! [ServiceContext], which carries the cancellation scope they live in.
//!
//! ---
//!
//! # Cancellation scopes
//!
//! A [ServiceContext] has a _global_ scope, shared by every task of the node,
//! and an optional _local_ scope created with [ServiceContext::child]. Local
//! scopes nest: cancelling a context cancels all of its children, but never
//! its parent.
//!
//! - [ServiceContext::cancel_global]: cancels every task of the node.
//! - [ServiceContext::cancel_local]: cancels this context and all its children.
//!
//! ## Cancellation checks
//!
//! - [ServiceContext::is_cancelled]: synchronous, useful in non-blocking
//!   scenarios.
//! - [ServiceContext::cancelled]: a future which resolves upon cancellation.
//!   Useful alongside [tokio::select].
//! - [ServiceContext::run_until_cancelled]: races a future against
//!   cancellation.
//!
//! > **Warning**
//! > It is your responsibility to check for cancellation inside of your task.
//! > A task which never checks will keep running after shutdown.
//!
//! ```rust
//! # use up_utils::service::ServiceContext;
//! # tokio_test_block_on(async {
//! let ctx = ServiceContext::new();
//! let child = ctx.child();
//!
//! child.cancel_local();
//! assert!(child.is_cancelled());
//! assert!(!ctx.is_cancelled());
//!
//! ctx.cancel_global();
//! assert!(ctx.is_cancelled());
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

use std::future::Future;
use tokio_util::sync::CancellationToken;

/// Cancellation scope handed to every task.
#[derive(Clone, Debug, Default)]
pub struct ServiceContext {
    token_global: CancellationToken,
    token_local: Option<CancellationToken>,
}

impl ServiceContext {
    /// Creates a new [Default] [ServiceContext]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stops all tasks under the same global context scope.
    pub fn cancel_global(&self) {
        tracing::info!("🔌 Gracefully shutting down upstream pool");

        self.token_global.cancel();
    }

    /// Stops all tasks under the same local context scope.
    ///
    /// A local context is created by calling [ServiceContext::child] and allows
    /// you to reduce the scope of cancellation only to those tasks which
    /// will use the new context.
    pub fn cancel_local(&self) {
        self.token().cancel();
    }

    /// A future which completes when this context is cancelled, either locally
    /// or globally.
    pub async fn cancelled(&self) {
        self.token().cancelled().await
    }

    /// Checks if this context has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.token().is_cancelled()
    }

    /// Runs a [Future] until it completes or the context is cancelled,
    /// whichever comes first.
    ///
    /// Returns `None` on cancellation.
    pub async fn run_until_cancelled<T, F>(&self, f: F) -> Option<T>
    where
        F: Future<Output = T>,
    {
        tokio::select! {
            res = f => Some(res),
            _ = self.cancelled() => None,
        }
    }

    /// Creates a new [ServiceContext] as a child of the current context. Any
    /// cancellation of the parent will also cancel the child, but the child
    /// can be cancelled on its own.
    pub fn child(&self) -> Self {
        Self { token_global: self.token_global.clone(), token_local: Some(self.token().child_token()) }
    }

    /// The innermost cancellation token of this context.
    pub fn token(&self) -> &CancellationToken {
        self.token_local.as_ref().unwrap_or(&self.token_global)
    }
}

/// Waits for `SIGINT` or `SIGTERM`, then cancels every task under `ctx`.
///
/// Returns early without cancelling anything if `ctx` is cancelled first.
pub async fn cancel_on_shutdown_signal(ctx: ServiceContext) -> anyhow::Result<()> {
    let sigint = tokio::signal::ctrl_c();
    let sigterm = async {
        #[cfg(unix)]
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => signal.recv().await,
            Err(_) => core::future::pending().await, // SIGTERM not supported
        }
        #[cfg(not(unix))]
        core::future::pending::<Option<()>>().await
    };

    tokio::select! {
        res = sigint => res?,
        _ = sigterm => {},
        _ = ctx.cancelled() => return Ok(()),
    };

    ctx.cancel_global();

    anyhow::Ok(())
}
