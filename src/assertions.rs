// src/assertions.rs

//! Verdicts for scenarios: compare replies and errors against expectations.
//!
//! The `check_*` functions return an [`AssertionFailure`] describing the
//! mismatch; the `assert_*` wrappers panic with that description, which ends
//! the current scenario without touching the rest of the suite.

use crate::core::{ErrorClass, HarnessError};
use indexmap::IndexMap;
use std::fmt::{self, Debug};
use std::future::Future;
use thiserror::Error;

/// A set of acceptable error-message substrings. A message matches when it
/// contains any of them.
///
/// The proxy and a directly connected store word the same condition
/// differently ("NOAUTH ..." versus "operation not permitted"), so a single
/// expectation usually lists both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedErrors {
    patterns: Vec<String>,
}

impl ExpectedErrors {
    /// Parses `"A|B|C"` into three alternatives. Empty alternatives are dropped.
    pub fn parse(spec: &str) -> Self {
        Self {
            patterns: spec
                .split('|')
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    pub fn any_of<S: AsRef<str>>(patterns: &[S]) -> Self {
        Self {
            patterns: patterns.iter().map(|p| p.as_ref().to_string()).collect(),
        }
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn matches(&self, message: &str) -> bool {
        self.patterns.iter().any(|p| message.contains(p.as_str()))
    }
}

impl From<&str> for ExpectedErrors {
    fn from(spec: &str) -> Self {
        Self::parse(spec)
    }
}

impl From<&[&str]> for ExpectedErrors {
    fn from(patterns: &[&str]) -> Self {
        Self::any_of(patterns)
    }
}

impl fmt::Display for ExpectedErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let quoted: Vec<String> = self.patterns.iter().map(|p| format!("{p:?}")).collect();
        write!(f, "[{}]", quoted.join(" | "))
    }
}

/// The harness's own verdict that a scenario did not behave as expected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssertionFailure {
    #[error("expected {expected}, got {actual}")]
    Mismatch { expected: String, actual: String },

    #[error("expected success with {expected}, got error: {error}")]
    UnexpectedError { expected: String, error: String },

    #[error("expected an error matching {expected}, but the operation succeeded with {value}")]
    UnexpectedSuccess {
        expected: ExpectedErrors,
        value: String,
    },

    #[error("error {actual:?} matches none of {expected}")]
    WrongError {
        actual: String,
        expected: ExpectedErrors,
    },

    #[error("expected a {expected} error, got a {actual} error: {message}")]
    WrongClass {
        expected: ErrorClass,
        actual: ErrorClass,
        message: String,
    },

    #[error(
        "mappings differ: missing keys {missing:?}, unexpected keys {extra:?}, \
         different values for {differing:?}"
    )]
    MappingMismatch {
        missing: Vec<String>,
        extra: Vec<String>,
        differing: Vec<String>,
    },
}

/// Plain equality.
pub fn check_equal<T: PartialEq + Debug>(actual: &T, expected: &T) -> Result<(), AssertionFailure> {
    if actual == expected {
        Ok(())
    } else {
        Err(AssertionFailure::Mismatch {
            expected: format!("{expected:?}"),
            actual: format!("{actual:?}"),
        })
    }
}

/// The command must have succeeded with a value structurally equal to `expected`.
pub fn check_succeeds_with<T: PartialEq + Debug>(
    actual: &Result<T, HarnessError>,
    expected: &T,
) -> Result<(), AssertionFailure> {
    match actual {
        Ok(value) => check_equal(value, expected),
        Err(e) => Err(AssertionFailure::UnexpectedError {
            expected: format!("{expected:?}"),
            error: e.to_string(),
        }),
    }
}

/// Key sets must match exactly and every value must be equal.
pub fn check_mapping_eq<V: PartialEq + Debug>(
    actual: &IndexMap<String, V>,
    expected: &IndexMap<String, V>,
) -> Result<(), AssertionFailure> {
    let missing: Vec<String> = expected
        .keys()
        .filter(|k| !actual.contains_key(k.as_str()))
        .cloned()
        .collect();
    let extra: Vec<String> = actual
        .keys()
        .filter(|k| !expected.contains_key(k.as_str()))
        .cloned()
        .collect();
    let differing: Vec<String> = expected
        .iter()
        .filter(|(k, v)| actual.get(k.as_str()).is_some_and(|a| a != *v))
        .map(|(k, _)| k.clone())
        .collect();

    if missing.is_empty() && extra.is_empty() && differing.is_empty() {
        Ok(())
    } else {
        Err(AssertionFailure::MappingMismatch {
            missing,
            extra,
            differing,
        })
    }
}

/// The command must have failed with a message matching one of `expected`.
pub fn check_fails_with<T: Debug>(
    result: &Result<T, HarnessError>,
    expected: &ExpectedErrors,
) -> Result<(), AssertionFailure> {
    match result {
        Ok(value) => Err(AssertionFailure::UnexpectedSuccess {
            expected: expected.clone(),
            value: format!("{value:?}"),
        }),
        Err(e) => {
            let message = e.to_string();
            if expected.matches(&message) {
                Ok(())
            } else {
                Err(AssertionFailure::WrongError {
                    actual: message,
                    expected: expected.clone(),
                })
            }
        }
    }
}

/// The command must have failed, and the failure must classify as `expected`.
pub fn check_error_class<T: Debug>(
    result: &Result<T, HarnessError>,
    expected: ErrorClass,
) -> Result<(), AssertionFailure> {
    match result {
        Ok(value) => Err(AssertionFailure::UnexpectedSuccess {
            expected: ExpectedErrors::any_of(&[expected.as_ref()]),
            value: format!("{value:?}"),
        }),
        Err(e) if e.class() == expected => Ok(()),
        Err(e) => Err(AssertionFailure::WrongClass {
            expected,
            actual: e.class(),
            message: e.to_string(),
        }),
    }
}

#[track_caller]
fn verdict(result: Result<(), AssertionFailure>) {
    if let Err(failure) = result {
        panic!("assertion failed: {failure}");
    }
}

#[track_caller]
pub fn assert_equal<T: PartialEq + Debug>(actual: T, expected: T) {
    verdict(check_equal(&actual, &expected));
}

/// Panics unless `actual` succeeded with `expected`; returns the value.
#[track_caller]
pub fn assert_succeeds_with<T: PartialEq + Debug>(
    actual: Result<T, HarnessError>,
    expected: T,
) -> T {
    verdict(check_succeeds_with(&actual, &expected));
    expected
}

#[track_caller]
pub fn assert_mapping_eq<V: PartialEq + Debug>(
    actual: &IndexMap<String, V>,
    expected: &IndexMap<String, V>,
) {
    verdict(check_mapping_eq(actual, expected));
}

/// Runs `operation` and panics unless it fails with a message matching one
/// of `expected`. Returns the error so the caller can inspect it further.
pub async fn assert_fails_with<T, F>(
    expected: impl Into<ExpectedErrors>,
    operation: F,
) -> HarnessError
where
    T: Debug,
    F: Future<Output = Result<T, HarnessError>>,
{
    let expected = expected.into();
    let result = operation.await;
    verdict(check_fails_with(&result, &expected));
    match result {
        Err(e) => e,
        Ok(_) => unreachable!("check_fails_with rejects successful results"),
    }
}

/// Runs `operation` and panics unless it fails with an error of class `expected`.
pub async fn assert_fails_with_class<T, F>(expected: ErrorClass, operation: F) -> HarnessError
where
    T: Debug,
    F: Future<Output = Result<T, HarnessError>>,
{
    let result = operation.await;
    verdict(check_error_class(&result, expected));
    match result {
        Err(e) => e,
        Ok(_) => unreachable!("check_error_class rejects successful results"),
    }
}
