//! Ready-made plugin chains for the usual cases.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{compose, Plugin};
use super::builtin::{cache, debounce, log, persist, throttle, validate_with};
use crate::error::ReactiveError;
use crate::net::KeyValueStore;
use crate::reactive::Value;

/// Log every value under `label`.
pub fn debug<A: Value + Debug>(label: impl Into<String>) -> Plugin<A> {
    log(label)
}

/// Settle bursts, then cap the delivery rate.
pub fn performance<A: Value>(wait: Duration) -> Plugin<A> {
    compose([debounce(wait), throttle(wait)])
}

/// Survive restarts through `store`, logging changes under the key.
pub fn persistent_state<A>(store: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Plugin<A>
where
    A: Value + Debug + Serialize + DeserializeOwned,
{
    let key: String = key.into();
    compose([persist(store, key.clone()), log(key)])
}

/// Wait for typing to settle, then validate.
pub fn form_field<A, V, C>(wait: Duration, validator: V, on_invalid: C) -> Plugin<A>
where
    A: Value,
    V: Fn(&A) -> bool + Send + Sync + 'static,
    C: Fn(&A, &ReactiveError) + Send + Sync + 'static,
{
    compose([debounce(wait), validate_with(validator, on_invalid)])
}

/// Cache API payloads with a ttl and log what arrives.
pub fn api_data<A>(store: Arc<dyn KeyValueStore>, key: impl Into<String>, ttl: Duration) -> Plugin<A>
where
    A: Value + Debug + Serialize + DeserializeOwned,
{
    let key: String = key.into();
    compose([cache(store, key.clone(), Some(ttl)), log(key)])
}

/// Rate-limit a live feed to one value per `window`.
pub fn real_time<A: Value>(window: Duration) -> Plugin<A> {
    throttle(window)
}
