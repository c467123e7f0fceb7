//! Transient-error classification shared by the recovery engine and the
//! circuit breaker.
//!
//! The default classification is deliberately heuristic: an error is
//! transient if its rendered text (anywhere in the source chain) contains a
//! known transient pattern, or if it is a typed transient
//! [`InfrastructureError`](crate::port::InfrastructureError). Substring
//! matching over error text is fragile and broker-specific; deployments that
//! have structured error codes should replace the default predicates via
//! [`ErrorClassifier::with_predicate`] rather than rely on text. The
//! documented text behavior is preserved here because changing it changes
//! retry and circuit behavior.

use crate::port::InfrastructureError;
use std::sync::Arc;

/// Text fragments that mark an error as transient under the default
/// heuristics. Matching is case-insensitive.
pub const TRANSIENT_PATTERNS: &[&str] = &[
    "timeout",
    "retry",
    "service unavailable",
    "internal server error",
    "wait until",
];

type Predicate = Arc<dyn Fn(&(dyn std::error::Error + 'static)) -> bool + Send + Sync>;

/// Pluggable predicate set deciding whether an error is transient.
///
/// An error is transient if *any* predicate matches it or any error in its
/// source chain.
#[derive(Clone)]
pub struct ErrorClassifier {
    predicates: Vec<Predicate>,
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::transient_defaults()
    }
}

impl ErrorClassifier {
    /// Classifier with no predicates; nothing is transient until predicates
    /// are added.
    pub fn empty() -> Self {
        Self {
            predicates: Vec::new(),
        }
    }

    /// Classifier with the documented default heuristics: the transient text
    /// patterns plus typed transient infrastructure errors.
    pub fn transient_defaults() -> Self {
        Self::empty()
            .with_predicate(|error| {
                let text = error.to_string().to_lowercase();
                TRANSIENT_PATTERNS.iter().any(|p| text.contains(p))
            })
            .with_predicate(|error| {
                error
                    .downcast_ref::<InfrastructureError>()
                    .is_some_and(InfrastructureError::is_transient)
            })
    }

    /// Add a predicate to the set.
    pub fn with_predicate(
        mut self,
        predicate: impl Fn(&(dyn std::error::Error + 'static)) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.predicates.push(Arc::new(predicate));
        self
    }

    /// Whether the error, or anything in its source chain, is transient.
    pub fn is_transient(&self, error: &(dyn std::error::Error + 'static)) -> bool {
        let mut current: Option<&(dyn std::error::Error + 'static)> = Some(error);
        while let Some(e) = current {
            if self.predicates.iter().any(|p| p(e)) {
                return true;
            }
            current = e.source();
        }
        false
    }
}

impl std::fmt::Debug for ErrorClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorClassifier")
            .field("predicates", &self.predicates.len())
            .finish()
    }
}
