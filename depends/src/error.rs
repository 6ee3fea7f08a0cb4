use thiserror::Error;

/// The error type user factories, initializers and release steps report failures with.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The main error type for the `fibre_depends` library.
#[derive(Debug, Error)]
pub enum Error {
  /// An asynchronous factory or initializer was reached from `resolve_sync`.
  #[error("`{provider}` requires asynchronous initialization and cannot be resolved synchronously")]
  SynchronousResolution { provider: &'static str },

  /// An asynchronous resource was used inside a context entered synchronously,
  /// or a synchronous exit was asked to release an asynchronously acquired resource.
  #[error("asynchronous resource `{provider}` cannot be used in a synchronous container context")]
  AsyncInSyncContext { provider: &'static str },

  #[error("container context is not set, enter a `ContainerContext` first")]
  ScopeNotSet,

  #[error("container context is not active")]
  ScopeNotActive,

  #[error("container context has already been entered")]
  ScopeAlreadyEntered,

  /// `async_enter` was called outside a `ContextFuture`, where the context
  /// would leak to every task sharing the thread.
  #[error("asynchronous container context must be entered inside a `ContextFuture`, use `run_async` or `in_current_context`")]
  UnboundAsyncContext,

  #[error("no provider matches key `{0}`")]
  NoMatch(String),

  #[error("invalid initializer for `{provider}`: {reason}")]
  InvalidInitializer {
    provider: &'static str,
    reason: &'static str,
  },

  #[error("failed to construct `{provider}`: {source}")]
  Construction {
    provider: &'static str,
    #[source]
    source: BoxError,
  },

  #[error("failed to release `{provider}`: {source}")]
  Release {
    provider: &'static str,
    #[source]
    source: BoxError,
  },

  #[error("Internal library error: {0}")]
  Internal(String),
}

impl Error {
  /// Returns `true` for failures raised by user code rather than by a broken contract.
  pub fn is_user_failure(&self) -> bool {
    matches!(self, Error::Construction { .. } | Error::Release { .. })
  }
}

/// A specialized `Result` type for `fibre_depends` operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Keeps the first failure of an exhaustive teardown and logs the rest.
#[derive(Default)]
pub(crate) struct FirstFailure {
  first: Option<Error>,
}

impl FirstFailure {
  pub(crate) fn record(&mut self, error: Error) {
    if self.first.is_none() {
      self.first = Some(error);
    } else {
      tracing::warn!(%error, "teardown failure suppressed, an earlier failure is reported");
    }
  }

  pub(crate) fn absorb(&mut self, result: Result<()>) {
    if let Err(error) = result {
      self.record(error);
    }
  }

  pub(crate) fn into_result(self) -> Result<()> {
    match self.first {
      Some(error) => Err(error),
      None => Ok(()),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn first_failure_keeps_the_earliest_error() {
    let mut failures = FirstFailure::default();
    failures.absorb(Ok(()));
    failures.record(Error::ScopeNotSet);
    failures.record(Error::NoMatch("late".into()));

    assert!(matches!(failures.into_result(), Err(Error::ScopeNotSet)));
  }

  #[test]
  fn user_failures_are_classified() {
    let err = Error::Construction {
      provider: "u32",
      source: "boom".into(),
    };
    assert!(err.is_user_failure());
    assert!(!Error::ScopeNotActive.is_user_failure());
    assert_eq!(err.to_string(), "failed to construct `u32`: boom");
  }
}
