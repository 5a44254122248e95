//! Built-in item processors
//!
//! The line processors back the `source.processor` setting of the CLI.

use crate::adapters::traits::ItemProcessor;
use crate::domain::{BatchError, Result};
use async_trait::async_trait;
use std::marker::PhantomData;
use std::sync::Arc;

/// Passes every item through unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

#[async_trait]
impl<T: Clone + Send + Sync> ItemProcessor<T, T> for Identity {
    async fn process(&self, item: &T) -> Result<Option<T>> {
        Ok(Some(item.clone()))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Uppercase;

#[async_trait]
impl ItemProcessor<String, String> for Uppercase {
    async fn process(&self, item: &String) -> Result<Option<String>> {
        Ok(Some(item.to_uppercase()))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Trim;

#[async_trait]
impl ItemProcessor<String, String> for Trim {
    async fn process(&self, item: &String) -> Result<Option<String>> {
        Ok(Some(item.trim().to_string()))
    }
}

/// Filters out blank lines
#[derive(Debug, Clone, Copy, Default)]
pub struct SkipBlank;

#[async_trait]
impl ItemProcessor<String, String> for SkipBlank {
    async fn process(&self, item: &String) -> Result<Option<String>> {
        if item.trim().is_empty() {
            Ok(None)
        } else {
            Ok(Some(item.clone()))
        }
    }
}

/// Processor backed by a closure
pub struct FnProcessor<I, O, F> {
    f: F,
    _types: PhantomData<fn(&I) -> O>,
}

impl<I, O, F> FnProcessor<I, O, F>
where
    F: Fn(&I) -> Result<Option<O>> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self {
            f,
            _types: PhantomData,
        }
    }
}

#[async_trait]
impl<I, O, F> ItemProcessor<I, O> for FnProcessor<I, O, F>
where
    I: Send + Sync,
    O: Send,
    F: Fn(&I) -> Result<Option<O>> + Send + Sync,
{
    async fn process(&self, item: &I) -> Result<Option<O>> {
        (self.f)(item)
    }
}

/// Resolve a line processor by its configuration name
///
/// # Errors
///
/// Returns `BatchError::Configuration` for an unknown name.
pub fn line_processor(name: &str) -> Result<Arc<dyn ItemProcessor<String, String>>> {
    match name {
        "identity" => Ok(Arc::new(Identity)),
        "uppercase" => Ok(Arc::new(Uppercase)),
        "trim" => Ok(Arc::new(Trim)),
        "skip-blank" => Ok(Arc::new(SkipBlank)),
        other => Err(BatchError::Configuration(format!(
            "Unknown processor '{other}'. Must be one of: identity, uppercase, trim, skip-blank"
        ))),
    }
}
