//! Causal chain traversal
//!
//! A chain is `[self, cause, cause.cause, ...]`. Traversal follows taxonomy
//! links and stops at the first foreign error, so it always terminates.

use super::types::{ErrorCause, ErrorKind, ResilienceError};
use std::fmt;

/// One link of a causal chain
#[derive(Clone, Copy)]
pub enum ChainLink<'a> {
    Error(&'a ResilienceError),
    Native(&'a (dyn std::error::Error + Send + Sync + 'static)),
}

impl<'a> ChainLink<'a> {
    /// The taxonomy error at this link, if it is one
    pub fn as_resilience_error(&self) -> Option<&'a ResilienceError> {
        match self {
            ChainLink::Error(error) => Some(error),
            ChainLink::Native(_) => None,
        }
    }

    /// The foreign error at this link, if it is one
    pub fn as_native(&self) -> Option<&'a (dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            ChainLink::Error(_) => None,
            ChainLink::Native(native) => Some(*native),
        }
    }

    pub fn kind(&self) -> Option<ErrorKind> {
        self.as_resilience_error().map(ResilienceError::kind)
    }

    pub fn message(&self) -> String {
        match self {
            ChainLink::Error(error) => error.message().to_string(),
            ChainLink::Native(native) => native.to_string(),
        }
    }
}

impl fmt::Debug for ChainLink<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainLink::Error(error) => f
                .debug_tuple("Error")
                .field(&error.kind())
                .field(&error.code())
                .finish(),
            ChainLink::Native(native) => f.debug_tuple("Native").field(&native.to_string()).finish(),
        }
    }
}

impl fmt::Display for ChainLink<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainLink::Error(error) => write!(f, "{}", error),
            ChainLink::Native(native) => write!(f, "{}", native),
        }
    }
}

impl ResilienceError {
    /// Ordered causal chain starting with `self`
    pub fn error_chain(&self) -> Vec<ChainLink<'_>> {
        let mut chain = vec![ChainLink::Error(self)];
        let mut current = self.cause.as_ref();

        while let Some(cause) = current {
            match cause {
                ErrorCause::Error(inner) => {
                    chain.push(ChainLink::Error(inner));
                    current = inner.cause.as_ref();
                }
                ErrorCause::Native(native) => {
                    chain.push(ChainLink::Native(&**native));
                    current = None;
                }
            }
        }

        chain
    }

    /// Last link of the causal chain, or `self` when there is no cause
    pub fn root_cause(&self) -> ChainLink<'_> {
        let mut link = ChainLink::Error(self);

        while let ChainLink::Error(error) = link {
            match error.cause.as_ref() {
                Some(ErrorCause::Error(inner)) => link = ChainLink::Error(inner),
                Some(ErrorCause::Native(native)) => link = ChainLink::Native(&**native),
                None => break,
            }
        }

        link
    }

    /// Whether any taxonomy link of the chain has the given kind
    pub fn has_error_type(&self, kind: ErrorKind) -> bool {
        self.error_chain().iter().any(|link| link.kind() == Some(kind))
    }

    /// Nearest taxonomy error of the given kind along the chain
    pub fn find_in_chain(&self, kind: ErrorKind) -> Option<&ResilienceError> {
        self.error_chain()
            .into_iter()
            .filter_map(|link| link.as_resilience_error())
            .find(|error| error.kind() == kind)
    }
}
