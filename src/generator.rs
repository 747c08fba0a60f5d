//! Lazy, composable operation generators.
//!
//! A generator is a possibly-infinite sequence of operation descriptors (or
//! operation-producing callables), pulled one value at a time by the logical
//! processes of a run. Generators compose without materializing: `take`,
//! `filter`, `map`, `chain`, `mix`, `cycle` and `time_limit` all wrap their
//! sources lazily.
//!
//! Every generator is cloneable through [`Generator::boxed_clone`], which is
//! what lets `cycle` replay a pristine copy of its source and `mix` hold a
//! live set of heterogeneous sub-generators. Sources must be free of
//! incidental shared state: a cloned generator that mutates state shared with
//! its origin will silently diverge for downstream consumers. That is a
//! caller-enforced invariant; the engine cannot verify it.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::error::{SquallError, SquallResult};
use crate::op::Op;

/// An operation-producing callable, for randomized per-pull payloads.
pub type OpThunk = Arc<dyn Fn() -> Op + Send + Sync>;

/// What a workload generator yields: either a concrete operation template or
/// a callable that materializes one at pull time.
#[derive(Clone)]
pub enum GenItem {
    Op(Op),
    Call(OpThunk),
}

impl GenItem {
    /// Resolve this item into a concrete operation.
    pub fn materialize(self) -> Op {
        match self {
            GenItem::Op(op) => op,
            GenItem::Call(thunk) => thunk(),
        }
    }
}

impl From<Op> for GenItem {
    fn from(op: Op) -> Self {
        GenItem::Op(op)
    }
}

impl fmt::Debug for GenItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenItem::Op(op) => f.debug_tuple("Op").field(op).finish(),
            GenItem::Call(_) => f.write_str("Call(<fn>)"),
        }
    }
}

/// Wrap an operation-producing closure as a generator item.
pub fn op_fn(f: impl Fn() -> Op + Send + Sync + 'static) -> GenItem {
    GenItem::Call(Arc::new(f))
}

/// A lazy, possibly-infinite sequence of values.
///
/// `next_item` returns `None` when the generator is exhausted; once
/// exhausted, a generator stays exhausted. `boxed_clone` produces an
/// independent copy with the same remaining sequence, which is what `cycle`
/// and `mix` rely on.
pub trait Generator: Send {
    type Item;

    fn next_item(&mut self) -> Option<Self::Item>;

    fn boxed_clone(&self) -> BoxGenerator<Self::Item>;
}

/// A type-erased generator, shareable across logical processes.
pub type BoxGenerator<T> = Box<dyn Generator<Item = T>>;

/// The erased generator type used by the engine itself.
pub type BoxOpGenerator = BoxGenerator<GenItem>;

impl<T: 'static> Clone for BoxGenerator<T> {
    fn clone(&self) -> Self {
        self.boxed_clone()
    }
}

impl<T: 'static> Generator for BoxGenerator<T> {
    type Item = T;

    fn next_item(&mut self) -> Option<T> {
        (**self).next_item()
    }

    fn boxed_clone(&self) -> BoxGenerator<T> {
        (**self).boxed_clone()
    }
}

/// Adapter methods for every generator, mirroring `std::iter` composition.
pub trait GeneratorExt: Generator + Sized {
    /// Bound this generator to at most `n` values.
    fn take(self, n: usize) -> Take<Self> {
        Take {
            inner: self,
            remaining: n,
        }
    }

    /// Keep only values matching `predicate`.
    fn filter<P>(self, predicate: P) -> Filter<Self, P>
    where
        P: Fn(&Self::Item) -> bool,
    {
        Filter {
            inner: self,
            predicate,
        }
    }

    /// Transform every value with `f`.
    fn map<B, F>(self, f: F) -> Map<Self, F>
    where
        F: Fn(Self::Item) -> B,
    {
        Map { inner: self, f }
    }

    /// Concatenate `other` after this generator.
    fn chain<G>(self, other: G) -> Chain<Self::Item>
    where
        Self: Clone + 'static,
        G: Generator<Item = Self::Item> + Clone + 'static,
        Self::Item: 'static,
    {
        Chain {
            sources: VecDeque::from(vec![
                Box::new(self) as BoxGenerator<Self::Item>,
                Box::new(other) as BoxGenerator<Self::Item>,
            ]),
        }
    }

    /// Replay a pristine clone of this generator forever. The passed-in
    /// instance is consumed; the source must be pure and repeatable.
    fn cycle(self) -> Cycle<Self>
    where
        Self: Clone,
    {
        Cycle {
            source: self.clone(),
            current: self,
        }
    }

    /// Bound this generator by wall time, measured from the first pull after
    /// wrapping on a monotonic clock. Once tripped it stays exhausted. A
    /// zero duration is a configuration error, raised here rather than
    /// lazily.
    fn time_limit(self, limit: Duration) -> SquallResult<TimeLimit<Self>> {
        if limit.is_zero() {
            return Err(SquallError::config(
                "time_limit duration must be greater than zero",
            ));
        }
        Ok(TimeLimit {
            inner: self,
            limit,
            deadline: None,
            expired: false,
        })
    }

    /// Erase this generator's concrete type.
    fn boxed(self) -> BoxGenerator<Self::Item>
    where
        Self: 'static,
    {
        Box::new(self)
    }

    /// Drain this generator, counting its values. Diverges on an infinite
    /// generator.
    fn count_items(mut self) -> usize {
        let mut n = 0;
        while self.next_item().is_some() {
            n += 1;
        }
        n
    }

    /// Drain this generator into a vector. Diverges on an infinite
    /// generator.
    fn collect_items(mut self) -> Vec<Self::Item> {
        let mut items = Vec::new();
        while let Some(item) = self.next_item() {
            items.push(item);
        }
        items
    }
}

impl<G: Generator> GeneratorExt for G {}

/// The `(step-function, parameter, state)` decomposition of a generator.
///
/// `step(&parameter, state)` returns the next state and value, or `None`
/// when exhausted. This is the primitive every other generator in this
/// module could be written in terms of.
pub struct Unfold<P, S, T> {
    step: Arc<dyn Fn(&P, S) -> Option<(S, T)> + Send + Sync>,
    parameter: P,
    state: Option<S>,
}

/// Build a generator from a `(step, parameter, state)` triple.
pub fn unfold<P, S, T, F>(parameter: P, state: S, step: F) -> Unfold<P, S, T>
where
    F: Fn(&P, S) -> Option<(S, T)> + Send + Sync + 'static,
{
    Unfold {
        step: Arc::new(step),
        parameter,
        state: Some(state),
    }
}

impl<P: Clone, S: Clone, T> Clone for Unfold<P, S, T> {
    fn clone(&self) -> Self {
        Self {
            step: Arc::clone(&self.step),
            parameter: self.parameter.clone(),
            state: self.state.clone(),
        }
    }
}

impl<P, S, T> Generator for Unfold<P, S, T>
where
    P: Clone + Send + Sync + 'static,
    S: Clone + Send + 'static,
    T: 'static,
{
    type Item = T;

    fn next_item(&mut self) -> Option<T> {
        let state = self.state.take()?;
        let (next, value) = (self.step)(&self.parameter, state)?;
        self.state = Some(next);
        Some(value)
    }

    fn boxed_clone(&self) -> BoxGenerator<T> {
        Box::new(self.clone())
    }
}

/// A finite sequence of integers in `[start, end)`.
#[derive(Debug, Clone)]
pub struct Range {
    next: i64,
    end: i64,
}

/// Yield every integer in `[start, end)`.
pub fn range(start: i64, end: i64) -> Range {
    Range { next: start, end }
}

impl Generator for Range {
    type Item = i64;

    fn next_item(&mut self) -> Option<i64> {
        if self.next >= self.end {
            return None;
        }
        let value = self.next;
        self.next += 1;
        Some(value)
    }

    fn boxed_clone(&self) -> BoxGenerator<i64> {
        Box::new(self.clone())
    }
}

/// A generator over a fixed sequence of values.
#[derive(Clone)]
pub struct Seq<T: Clone> {
    items: VecDeque<T>,
}

/// Yield the given values in order.
pub fn seq<T: Clone + Send + 'static>(items: impl IntoIterator<Item = T>) -> Seq<T> {
    Seq {
        items: items.into_iter().collect(),
    }
}

/// Yield the given operations in order, as generator items.
pub fn ops(items: impl IntoIterator<Item = Op>) -> Seq<GenItem> {
    seq(items.into_iter().map(GenItem::Op).collect::<Vec<_>>())
}

impl<T: Clone + Send + 'static> Generator for Seq<T> {
    type Item = T;

    fn next_item(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    fn boxed_clone(&self) -> BoxGenerator<T> {
        Box::new(self.clone())
    }
}

/// See [`GeneratorExt::take`].
#[derive(Clone)]
pub struct Take<G> {
    inner: G,
    remaining: usize,
}

impl<G> Generator for Take<G>
where
    G: Generator + Clone + 'static,
{
    type Item = G::Item;

    fn next_item(&mut self) -> Option<G::Item> {
        if self.remaining == 0 {
            return None;
        }
        match self.inner.next_item() {
            Some(value) => {
                self.remaining -= 1;
                Some(value)
            }
            None => {
                self.remaining = 0;
                None
            }
        }
    }

    fn boxed_clone(&self) -> BoxGenerator<G::Item> {
        Box::new(self.clone())
    }
}

/// See [`GeneratorExt::filter`].
#[derive(Clone)]
pub struct Filter<G, P> {
    inner: G,
    predicate: P,
}

impl<G, P> Generator for Filter<G, P>
where
    G: Generator + Clone + 'static,
    P: Fn(&G::Item) -> bool + Clone + Send + 'static,
{
    type Item = G::Item;

    fn next_item(&mut self) -> Option<G::Item> {
        loop {
            let value = self.inner.next_item()?;
            if (self.predicate)(&value) {
                return Some(value);
            }
        }
    }

    fn boxed_clone(&self) -> BoxGenerator<G::Item> {
        Box::new(self.clone())
    }
}

/// See [`GeneratorExt::map`].
#[derive(Clone)]
pub struct Map<G, F> {
    inner: G,
    f: F,
}

impl<B, G, F> Generator for Map<G, F>
where
    G: Generator + Clone + 'static,
    F: Fn(G::Item) -> B + Clone + Send + 'static,
    B: 'static,
{
    type Item = B;

    fn next_item(&mut self) -> Option<B> {
        self.inner.next_item().map(&self.f)
    }

    fn boxed_clone(&self) -> BoxGenerator<B> {
        Box::new(self.clone())
    }
}

/// Sequential concatenation of generators. See [`chain`].
pub struct Chain<T> {
    sources: VecDeque<BoxGenerator<T>>,
}

/// Concatenate the given generators, draining each in turn.
pub fn chain<T: 'static>(sources: Vec<BoxGenerator<T>>) -> Chain<T> {
    Chain {
        sources: sources.into(),
    }
}

impl<T: 'static> Clone for Chain<T> {
    fn clone(&self) -> Self {
        Self {
            sources: self.sources.clone(),
        }
    }
}

impl<T: 'static> Generator for Chain<T> {
    type Item = T;

    fn next_item(&mut self) -> Option<T> {
        while let Some(front) = self.sources.front_mut() {
            if let Some(value) = front.next_item() {
                return Some(value);
            }
            self.sources.pop_front();
        }
        None
    }

    fn boxed_clone(&self) -> BoxGenerator<T> {
        Box::new(self.clone())
    }
}

/// Replays a pristine clone of its source forever. See
/// [`GeneratorExt::cycle`].
#[derive(Clone)]
pub struct Cycle<G> {
    source: G,
    current: G,
}

impl<G> Generator for Cycle<G>
where
    G: Generator + Clone + 'static,
{
    type Item = G::Item;

    fn next_item(&mut self) -> Option<G::Item> {
        if let Some(value) = self.current.next_item() {
            return Some(value);
        }
        // Restart from the pristine copy. An empty source yields nothing,
        // which keeps this from looping forever.
        self.current = self.source.clone();
        self.current.next_item()
    }

    fn boxed_clone(&self) -> BoxGenerator<G::Item> {
        Box::new(self.clone())
    }
}

/// Uniform-random interleave over a live set of sub-generators. See
/// [`mix`].
pub struct Mix<T> {
    sources: Vec<BoxGenerator<T>>,
    rng: ChaCha8Rng,
}

/// Interleave the given generators uniformly at random. An exhausted
/// sub-generator is removed from the live set, preserving fairness over the
/// rest; the mix is exhausted when the set is empty.
pub fn mix<T: 'static>(sources: Vec<BoxGenerator<T>>) -> Mix<T> {
    Mix {
        sources,
        rng: ChaCha8Rng::from_entropy(),
    }
}

/// [`mix`] with a fixed seed, for reproducible interleavings.
pub fn mix_seeded<T: 'static>(sources: Vec<BoxGenerator<T>>, seed: u64) -> Mix<T> {
    Mix {
        sources,
        rng: ChaCha8Rng::seed_from_u64(seed),
    }
}

impl<T: 'static> Clone for Mix<T> {
    fn clone(&self) -> Self {
        Self {
            sources: self.sources.clone(),
            rng: self.rng.clone(),
        }
    }
}

impl<T: 'static> Generator for Mix<T> {
    type Item = T;

    fn next_item(&mut self) -> Option<T> {
        while !self.sources.is_empty() {
            let idx = self.rng.gen_range(0..self.sources.len());
            if let Some(value) = self.sources[idx].next_item() {
                return Some(value);
            }
            self.sources.swap_remove(idx);
        }
        None
    }

    fn boxed_clone(&self) -> BoxGenerator<T> {
        Box::new(self.clone())
    }
}

/// Wall-time bound over a generator. See [`GeneratorExt::time_limit`].
#[derive(Clone)]
pub struct TimeLimit<G> {
    inner: G,
    limit: Duration,
    deadline: Option<Instant>,
    expired: bool,
}

impl<G> Generator for TimeLimit<G>
where
    G: Generator + Clone + 'static,
{
    type Item = G::Item;

    fn next_item(&mut self) -> Option<G::Item> {
        if self.expired {
            return None;
        }
        let deadline = *self
            .deadline
            .get_or_insert_with(|| Instant::now() + self.limit);
        if Instant::now() >= deadline {
            self.expired = true;
            return None;
        }
        match self.inner.next_item() {
            Some(value) => Some(value),
            None => {
                self.expired = true;
                None
            }
        }
    }

    fn boxed_clone(&self) -> BoxGenerator<G::Item> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn range_yields_half_open_interval() {
        assert_eq!(range(0, 5).collect_items(), vec![0, 1, 2, 3, 4]);
        assert_eq!(range(3, 3).count_items(), 0);
    }

    #[test]
    fn take_bounds_length() {
        assert_eq!(range(0, 100).take(7).count_items(), 7);
        assert_eq!(range(0, 3).take(10).count_items(), 3);
        assert_eq!(range(0, 3).take(0).count_items(), 0);
    }

    #[test]
    fn map_and_filter_compose() {
        let evens_doubled = range(0, 10)
            .filter(|v| v % 2 == 0)
            .map(|v| v * 2)
            .collect_items();
        assert_eq!(evens_doubled, vec![0, 4, 8, 12, 16]);
    }

    #[test]
    fn chain_concatenates_in_order() {
        let combined = range(0, 2).chain(range(10, 12)).collect_items();
        assert_eq!(combined, vec![0, 1, 10, 11]);
    }

    #[test]
    fn cycle_replays_a_pristine_clone() {
        let mut repeated = range(0, 2).cycle();
        let first_six: Vec<_> = (0..6).filter_map(|_| repeated.next_item()).collect();
        assert_eq!(first_six, vec![0, 1, 0, 1, 0, 1]);
    }

    #[test]
    fn cycle_of_empty_source_is_exhausted() {
        assert_eq!(range(0, 0).cycle().take(5).count_items(), 0);
    }

    #[test]
    fn mix_drains_all_sources_and_drops_exhausted_ones() {
        let sources: Vec<BoxGenerator<i64>> =
            vec![range(0, 3).boxed(), range(100, 101).boxed(), range(10, 13).boxed()];
        let mut drained = mix_seeded(sources, 42).collect_items();
        drained.sort_unstable();
        assert_eq!(drained, vec![0, 1, 2, 10, 11, 12, 100]);
    }

    #[test]
    fn mix_is_reproducible_under_a_seed() {
        let build = || {
            let sources: Vec<BoxGenerator<i64>> =
                vec![range(0, 50).boxed(), range(100, 150).boxed()];
            mix_seeded(sources, 7).collect_items()
        };
        assert_eq!(build(), build());
    }

    #[test]
    fn unfold_decomposes_into_step_parameter_state() {
        // Counts down from the state by the parameter's stride.
        let countdown = unfold(2i64, 10i64, |stride, state| {
            if state <= 0 {
                None
            } else {
                Some((state - stride, state))
            }
        });
        assert_eq!(countdown.collect_items(), vec![10, 8, 6, 4, 2]);
    }

    #[test]
    fn clones_advance_independently() {
        let mut original = range(0, 10);
        let mut copy = original.boxed_clone();
        assert_eq!(original.next_item(), Some(0));
        assert_eq!(original.next_item(), Some(1));
        assert_eq!(copy.next_item(), Some(0));
    }

    #[test]
    fn time_limit_rejects_zero_duration() {
        let err = range(0, 10).time_limit(Duration::ZERO).err().unwrap();
        assert!(matches!(err, SquallError::Configuration { .. }));
    }

    #[test]
    fn time_limit_trips_permanently() {
        let mut limited = range(0, i64::MAX)
            .time_limit(Duration::from_millis(30))
            .unwrap();
        assert!(limited.next_item().is_some());
        std::thread::sleep(Duration::from_millis(40));
        assert!(limited.next_item().is_none());
        // Still exhausted on later pulls, and on clones of the tripped state.
        assert!(limited.next_item().is_none());
        assert!(limited.boxed_clone().next_item().is_none());
    }

    #[test]
    fn gen_items_materialize() {
        let concrete = GenItem::Op(Op::invoke("read", Value::Null));
        assert_eq!(concrete.materialize().f, "read");

        let lazy = op_fn(|| Op::invoke("write", json!(5)));
        let op = lazy.materialize();
        assert_eq!(op.f, "write");
        assert_eq!(op.value, json!(5));
    }

    #[test]
    fn ops_generator_yields_in_order() {
        let mut source = ops(vec![
            Op::invoke("read", Value::Null),
            Op::invoke("write", json!(1)),
        ]);
        assert_eq!(source.next_item().unwrap().materialize().f, "read");
        assert_eq!(source.next_item().unwrap().materialize().f, "write");
        assert!(source.next_item().is_none());
    }
}
