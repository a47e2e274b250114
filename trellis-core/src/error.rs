//! Error types for fallible reactive reads.

use std::error::Error as StdError;

use thiserror::Error;

/// Boxed error produced by a user getter.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Errors surfaced when reading a computed value.
///
/// Stack-discipline violations are not represented here: they indicate a bug in
/// the engine itself and panic instead.
#[derive(Debug, Error)]
pub enum ReactiveError {
    /// A computed was read while it was already evaluating.
    #[error("cycle detected: computed {} was read while evaluating", display_name(.name))]
    Cycle {
        /// Name of the computed that was re-entered, if it has one.
        name: Option<String>,
    },

    /// A getter reported a failure.
    #[error("getter of computed {} failed: {source}", display_name(.name))]
    Getter {
        /// Name of the computed whose getter failed, if it has one.
        name: Option<String>,
        /// The underlying failure.
        #[source]
        source: BoxError,
    },

    /// A getter wrote to a value it had already read during the same run.
    #[error("computed {} wrote to one of its own inputs while evaluating", display_name(.name))]
    InputWritten {
        /// Name of the computed whose input changed under it, if it has one.
        name: Option<String>,
    },
}

impl ReactiveError {
    /// Wrap an arbitrary error or message as a getter failure.
    ///
    /// The runtime fills in the computed's name when the error leaves `evaluate`.
    ///
    /// ```
    /// use trellis_core::ReactiveError;
    ///
    /// let err = ReactiveError::getter("division by zero");
    /// assert!(err.to_string().contains("division by zero"));
    /// ```
    pub fn getter(source: impl Into<BoxError>) -> Self {
        Self::Getter {
            name: None,
            source: source.into(),
        }
    }

    /// Name of the computed this error is attributed to.
    pub fn computed_name(&self) -> Option<&str> {
        match self {
            Self::Cycle { name } | Self::Getter { name, .. } | Self::InputWritten { name } => {
                name.as_deref()
            }
        }
    }

    /// Whether this error reports a dependency cycle.
    pub fn is_cycle(&self) -> bool {
        matches!(self, Self::Cycle { .. })
    }

    /// Attribute an anonymous getter failure to the computed that raised it.
    ///
    /// Errors that already carry a name came from a nested computed and pass
    /// through untouched.
    pub(crate) fn attributed_to(self, computed: Option<&str>) -> Self {
        match self {
            Self::Getter { name: None, source } => Self::Getter {
                name: computed.map(str::to_owned),
                source,
            },
            other => other,
        }
    }
}

fn display_name(name: &Option<String>) -> String {
    match name {
        Some(name) => format!("`{name}`"),
        None => "<anonymous>".to_owned(),
    }
}

/// Result alias for fallible reactive reads.
pub type Result<T, E = ReactiveError> = std::result::Result<T, E>;
