//! Immutable hedging policy (`HedgingConfig`) and its per-request resolution
//! seam (`HedgingConfigMapping`).

use std::hash::Hash;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::context::RequestContext;
use crate::errors::{ConfigError, HedgingError};
use crate::rule::RuleKind;
use crate::transport::HedgeRequest;

/// Immutable policy bundle resolved once per request via a
/// [`HedgingConfigMapping`]. Build with [`HedgingConfig::builder`].
#[derive(Clone)]
pub struct HedgingConfig {
    rule: RuleKind,
    max_total_attempts: usize,
    per_attempt_response_timeout_ms: i64,
    initial_hedging_delay_ms: i64,
    max_content_length: usize,
}

impl HedgingConfig {
    pub fn builder(rule: RuleKind) -> HedgingConfigBuilder {
        HedgingConfigBuilder::new(rule)
    }

    pub fn rule(&self) -> &RuleKind {
        &self.rule
    }

    pub fn max_total_attempts(&self) -> usize {
        self.max_total_attempts
    }

    pub fn per_attempt_response_timeout_ms(&self) -> i64 {
        self.per_attempt_response_timeout_ms
    }

    pub fn initial_hedging_delay_ms(&self) -> i64 {
        self.initial_hedging_delay_ms
    }

    pub fn max_content_length(&self) -> usize {
        self.max_content_length
    }

    /// Reopens this config for modification; `to_builder().build()` with no
    /// further calls reproduces an equal config.
    pub fn to_builder(&self) -> HedgingConfigBuilder {
        HedgingConfigBuilder {
            rule: self.rule.clone(),
            max_total_attempts: self.max_total_attempts,
            per_attempt_response_timeout_ms: self.per_attempt_response_timeout_ms,
            initial_hedging_delay_ms: self.initial_hedging_delay_ms,
            max_content_length: self.max_content_length,
        }
    }
}

/// Builder for [`HedgingConfig`], validated at [`Self::build`] time.
#[derive(Clone)]
pub struct HedgingConfigBuilder {
    rule: RuleKind,
    max_total_attempts: usize,
    per_attempt_response_timeout_ms: i64,
    initial_hedging_delay_ms: i64,
    max_content_length: usize,
}

impl HedgingConfigBuilder {
    pub fn new(rule: RuleKind) -> Self {
        Self {
            rule,
            max_total_attempts: 3,
            per_attempt_response_timeout_ms: 0,
            initial_hedging_delay_ms: 0,
            max_content_length: 0,
        }
    }

    pub fn max_total_attempts(mut self, n: usize) -> Self {
        self.max_total_attempts = n;
        self
    }

    pub fn per_attempt_response_timeout_ms(mut self, ms: i64) -> Self {
        self.per_attempt_response_timeout_ms = ms;
        self
    }

    pub fn initial_hedging_delay_ms(mut self, ms: i64) -> Self {
        self.initial_hedging_delay_ms = ms;
        self
    }

    pub fn max_content_length(mut self, n: usize) -> Self {
        self.max_content_length = n;
        self
    }

    pub fn build(self) -> Result<HedgingConfig, ConfigError> {
        if self.max_total_attempts == 0 {
            return Err(ConfigError::InvalidMaxTotalAttempts(self.max_total_attempts));
        }
        if self.per_attempt_response_timeout_ms < 0 {
            return Err(ConfigError::InvalidPerAttemptTimeout(
                self.per_attempt_response_timeout_ms,
            ));
        }
        if self.initial_hedging_delay_ms < 0 {
            return Err(ConfigError::InvalidInitialDelay(self.initial_hedging_delay_ms));
        }

        let is_content_aware = self.rule.is_content_aware();
        if is_content_aware && self.max_content_length == 0 {
            return Err(ConfigError::InvalidMaxContentLength(self.max_content_length));
        }
        if !is_content_aware && self.max_content_length != 0 {
            return Err(ConfigError::MaxContentLengthWithoutContentRule);
        }

        Ok(HedgingConfig {
            rule: self.rule,
            max_total_attempts: self.max_total_attempts,
            per_attempt_response_timeout_ms: self.per_attempt_response_timeout_ms,
            initial_hedging_delay_ms: self.initial_hedging_delay_ms,
            max_content_length: self.max_content_length,
        })
    }
}

/// Resolves the [`HedgingConfig`] to use for a given request. Never returns a
/// null/missing config on success.
#[async_trait]
pub trait HedgingConfigMapping: Send + Sync {
    async fn get(
        &self,
        ctx: &RequestContext,
        req: &HedgeRequest,
    ) -> Result<Arc<HedgingConfig>, HedgingError>;
}

/// A mapping that always resolves to one fixed config.
pub struct SingletonHedgingConfigMapping {
    config: Arc<HedgingConfig>,
}

impl SingletonHedgingConfigMapping {
    pub fn new(config: HedgingConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

#[async_trait]
impl HedgingConfigMapping for SingletonHedgingConfigMapping {
    async fn get(
        &self,
        _ctx: &RequestContext,
        _req: &HedgeRequest,
    ) -> Result<Arc<HedgingConfig>, HedgingError> {
        Ok(self.config.clone())
    }
}

/// Resolves a config per request via a caller-supplied key function,
/// memoizing results keyed by the derived key in a [`DashMap`]. The factory
/// is invoked at most once per key under the map's get-or-insert guarantees;
/// concurrent misses for the same key may race the factory, but only one
/// entry is ever published.
pub struct KeyedHedgingConfigMapping<K, F, B>
where
    K: Eq + Hash + Send + Sync + 'static,
    F: Fn(&RequestContext, &HedgeRequest) -> K + Send + Sync,
    B: Fn(&K) -> Result<HedgingConfig, ConfigError> + Send + Sync,
{
    key_fn: F,
    factory: B,
    configs: DashMap<K, Arc<HedgingConfig>>,
}

impl<K, F, B> KeyedHedgingConfigMapping<K, F, B>
where
    K: Eq + Hash + Send + Sync + 'static,
    F: Fn(&RequestContext, &HedgeRequest) -> K + Send + Sync,
    B: Fn(&K) -> Result<HedgingConfig, ConfigError> + Send + Sync,
{
    pub fn new(key_fn: F, factory: B) -> Self {
        Self {
            key_fn,
            factory,
            configs: DashMap::new(),
        }
    }
}

#[async_trait]
impl<K, F, B> HedgingConfigMapping for KeyedHedgingConfigMapping<K, F, B>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    F: Fn(&RequestContext, &HedgeRequest) -> K + Send + Sync,
    B: Fn(&K) -> Result<HedgingConfig, ConfigError> + Send + Sync,
{
    async fn get(
        &self,
        ctx: &RequestContext,
        req: &HedgeRequest,
    ) -> Result<Arc<HedgingConfig>, HedgingError> {
        let key = (self.key_fn)(ctx, req);
        if let Some(existing) = self.configs.get(&key) {
            return Ok(existing.clone());
        }

        let config = Arc::new((self.factory)(&key)?);
        let entry = self.configs.entry(key).or_insert_with(|| config.clone());
        Ok(entry.clone())
    }
}
