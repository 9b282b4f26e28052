//! Plugin Engine
//!
//! A [`Plugin`] is a typed arrow `Container<A> -> Container<A>`. Plugins
//! either derive a container through `map` (transform, filter) or build one
//! they drive themselves from timers, storage or async work (debounce,
//! persist, async_map, ...). Because input and output share the type `A`,
//! any chain of plugins type-checks at the point it is built.
//!
//! # Composition
//!
//! Order matters. `compose([a, b])` applies `a` to the base container and
//! `b` to `a`'s output, so `[debounce, log]` only logs settled values while
//! `[log, debounce]` logs every raw one.
//!
//! `when` and `switch_plugin` decide which plugin to apply when the chain
//! is applied, not on later changes.

mod builtin;
pub mod common;

use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::reactive::{Container, Value};

pub use builtin::{
    async_map, cache, debounce, fetch_with, filter, log, persist, reducer, throttle, transform,
    validate, validate_with,
};

type Arrow<A> = Arc<dyn Fn(&Container<A>) -> Container<A> + Send + Sync>;

/// A named, reusable container transformation.
pub struct Plugin<A: Value> {
    name: Arc<str>,
    arrow: Arrow<A>,
}

impl<A: Value> Plugin<A> {
    pub fn new<F>(name: impl Into<Arc<str>>, arrow: F) -> Self
    where
        F: Fn(&Container<A>) -> Container<A> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            arrow: Arc::new(arrow),
        }
    }

    /// The plugin that hands its input back unchanged.
    pub fn identity() -> Self {
        Self::new("identity", |input: &Container<A>| input.clone())
    }

    /// Name used in trace output.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the plugin over `input`, producing the derived container.
    pub fn apply(&self, input: &Container<A>) -> Container<A> {
        tracing::trace!(plugin = %self.name, container = input.id(), "applying plugin");
        (self.arrow)(input)
    }

    /// Apply `self`, then `next` to the result.
    pub fn then(self, next: Plugin<A>) -> Plugin<A> {
        let name = format!("{} -> {}", self.name, next.name);
        Plugin::new(name, move |input: &Container<A>| next.apply(&self.apply(input)))
    }
}

impl<A: Value> Clone for Plugin<A> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            arrow: Arc::clone(&self.arrow),
        }
    }
}

impl<A: Value> Debug for Plugin<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Plugin").field(&self.name).finish()
    }
}

/// Left-to-right composition: the first plugin sees the base container.
pub fn compose<A: Value>(plugins: impl IntoIterator<Item = Plugin<A>>) -> Plugin<A> {
    plugins
        .into_iter()
        .reduce(Plugin::then)
        .unwrap_or_else(Plugin::identity)
}

/// Apply `plugin` only if `condition` holds when the chain is built.
pub fn when<A: Value>(condition: bool, plugin: Plugin<A>) -> Plugin<A> {
    if condition {
        plugin
    } else {
        Plugin::identity()
    }
}

/// Pick a plugin by the input's value at the moment it is applied.
///
/// Falls back to `default`, then to passing the input through.
pub fn switch_plugin<A, K, S>(
    selector: S,
    table: IndexMap<K, Plugin<A>>,
    default: Option<Plugin<A>>,
) -> Plugin<A>
where
    A: Value,
    K: Hash + Eq + Send + Sync + 'static,
    S: Fn(&A) -> K + Send + Sync + 'static,
{
    Plugin::new("switch", move |input: &Container<A>| {
        let key = selector(&input.value());
        match table.get(&key).or(default.as_ref()) {
            Some(plugin) => plugin.apply(input),
            None => input.clone(),
        }
    })
}

/// Builder for a checked chain of plugins over one value type.
pub struct Pipeline<A: Value> {
    plugins: Vec<Plugin<A>>,
}

impl<A: Value> Pipeline<A> {
    pub fn new() -> Self {
        Self {
            plugins: Vec::new(),
        }
    }

    /// Append a stage.
    pub fn with(mut self, plugin: Plugin<A>) -> Self {
        self.plugins.push(plugin);
        self
    }

    /// Append a stage only when `condition` holds.
    pub fn with_if(self, condition: bool, plugin: Plugin<A>) -> Self {
        if condition {
            self.with(plugin)
        } else {
            self
        }
    }

    /// Number of stages.
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Compose the stages, first added runs first.
    pub fn build(self) -> Plugin<A> {
        compose(self.plugins)
    }

    /// Build and apply in one step.
    pub fn apply(self, input: &Container<A>) -> Container<A> {
        self.build().apply(input)
    }
}

impl<A: Value> Default for Pipeline<A> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Counts every value reaching it, like `log` but observable.
    fn tap(count: Arc<AtomicUsize>) -> Plugin<i32> {
        Plugin::new("tap", move |input: &Container<i32>| {
            let count = count.clone();
            let output = input.map(|v| *v);
            let _ = output.subscribe(move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            });
            output
        })
    }

    #[test]
    fn compose_applies_left_to_right() {
        let plus_one = transform(|v: &i32| v + 1);
        let times_ten = transform(|v: &i32| v * 10);
        let base = Container::new(1);

        let out = compose([plus_one, times_ten]).apply(&base);
        assert_eq!(out.value(), 20);

        base.set(2);
        assert_eq!(out.value(), 30);
    }

    #[test]
    fn empty_compose_is_identity() {
        let base = Container::new(3);
        let out = compose(Vec::<Plugin<i32>>::new()).apply(&base);
        assert!(out == base);
    }

    #[test]
    fn then_names_the_chain() {
        let chain = transform(|v: &i32| *v).then(filter(|_: &i32| true));
        assert_eq!(chain.name(), "transform -> filter");
    }

    #[tokio::test(start_paused = true)]
    async fn order_decides_what_downstream_sees() {
        let settled_count = Arc::new(AtomicUsize::new(0));
        let raw_count = Arc::new(AtomicUsize::new(0));
        let base = Container::new(0);

        let _settled = compose([debounce(Duration::from_millis(50)), tap(settled_count.clone())])
            .apply(&base);
        let _raw = compose([tap(raw_count.clone()), debounce(Duration::from_millis(50))])
            .apply(&base);

        for v in 1..=3 {
            base.set(v);
        }
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(settled_count.load(Ordering::SeqCst), 1);
        assert_eq!(raw_count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn when_is_decided_at_composition() {
        let base = Container::new(2);
        let skipped = when(false, transform(|v: &i32| v * 100)).apply(&base);
        let applied = when(true, transform(|v: &i32| v * 100)).apply(&base);

        assert_eq!(skipped.value(), 2);
        assert_eq!(applied.value(), 200);
    }

    #[test]
    fn switch_uses_value_at_application() {
        let mut table = IndexMap::new();
        table.insert(true, transform(|v: &i32| v * 2));
        let plugin = switch_plugin(|v: &i32| *v > 10, table, Some(transform(|v: &i32| -v)));

        let big = Container::new(20);
        let small = Container::new(1);
        let big_out = plugin.apply(&big);
        let small_out = plugin.apply(&small);
        assert_eq!(big_out.value(), 40);
        assert_eq!(small_out.value(), -1);

        // The choice does not change with later values.
        big.set(5);
        assert_eq!(big_out.value(), 10);
    }

    #[test]
    fn pipeline_builds_in_order() {
        let pipeline = Pipeline::new()
            .with(transform(|v: &i32| v + 1))
            .with_if(false, transform(|_: &i32| 0))
            .with(transform(|v: &i32| v * 3));
        assert_eq!(pipeline.len(), 2);

        let base = Container::new(1);
        assert_eq!(pipeline.apply(&base).value(), 6);
    }
}
