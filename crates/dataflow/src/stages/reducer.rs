//! Reducer stage: folds inputs into one accumulator and emits on flush.
//!
//! Per input the reducer creates the accumulator if it is absent, asks the
//! flush predicate about the accumulator *before* folding, emits
//! `finish(accumulator)` and starts a fresh one when it says yes, and only
//! then folds the input in. The input that triggers a flush therefore opens
//! the next accumulator.

use super::StageLogic;
use crate::elite::EliteSet;

type Init<A> = Box<dyn Fn() -> A + Send>;
type Fold<A, T> = Box<dyn Fn(&mut A, T) + Send>;
type Flush<A> = Box<dyn Fn(&A) -> bool + Send>;
type Finish<A, O> = Box<dyn Fn(A) -> O + Send>;

/// Folds inputs of type `T` into an accumulator `A`, emitting `O` on flush.
pub struct Reducer<T, A, O> {
    name: String,
    init: Init<A>,
    fold: Fold<A, T>,
    flush: Flush<A>,
    finish: Finish<A, O>,
    accumulator: Option<A>,
}

impl<T, A, O> Reducer<T, A, O> {
    pub fn new(
        name: impl Into<String>,
        init: impl Fn() -> A + Send + 'static,
        fold: impl Fn(&mut A, T) + Send + 'static,
        flush: impl Fn(&A) -> bool + Send + 'static,
        finish: impl Fn(A) -> O + Send + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            init: Box::new(init),
            fold: Box::new(fold),
            flush: Box::new(flush),
            finish: Box::new(finish),
            accumulator: None,
        }
    }

    /// The current accumulator, if any input has arrived yet.
    pub const fn accumulator(&self) -> Option<&A> {
        self.accumulator.as_ref()
    }

    fn reduce(&mut self, input: T) -> Option<O> {
        let accumulator = self.accumulator.get_or_insert_with(|| (self.init)());
        let emitted = if (self.flush)(accumulator) {
            let full = std::mem::replace(accumulator, (self.init)());
            Some((self.finish)(full))
        } else {
            None
        };
        (self.fold)(accumulator, input);
        emitted
    }
}

impl<T: Send + 'static> Reducer<T, Vec<T>, Vec<T>> {
    /// Batches of at most `limit` inputs.
    ///
    /// A `limit` of zero behaves as one: each input is emitted alone once
    /// the next arrives, and an empty batch is never emitted.
    pub fn batching(limit: usize) -> Self {
        let limit = limit.max(1);
        Self::new(
            format!("batch-{limit}"),
            Vec::new,
            Vec::push,
            move |batch: &Vec<T>| batch.len() >= limit,
            |batch| batch,
        )
    }
}

impl<T: Ord + Send + 'static> Reducer<T, (usize, EliteSet<T>), Vec<T>> {
    /// The `k` smallest inputs of every window of `window` inputs, best first.
    /// A zero `window` is treated as one.
    pub fn top_k(k: usize, window: usize) -> Self {
        let window = window.max(1);
        Self::new(
            format!("top-{k}-of-{window}"),
            move || (0, EliteSet::new(k)),
            |(seen, elite): &mut (usize, EliteSet<T>), item| {
                *seen = seen.saturating_add(1);
                elite.insert(item);
            },
            move |(seen, _)| *seen >= window,
            |(_, elite)| elite.into_sorted_vec(),
        )
    }
}

impl<T, A, O> StageLogic<T, O> for Reducer<T, A, O>
where
    T: Send + 'static,
    A: Send + 'static,
    O: Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn process(&mut self, input: T) -> Vec<O> {
        self.reduce(input).into_iter().collect()
    }
}
