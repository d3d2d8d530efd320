//! # Flotilla Futures
//! Helpers for running an async function over a collection of values.
//!
//! Every helper takes its input by value (anything implementing [IntoIterator]),
//! so an owned collection is kept alive for the whole computation. Failures are
//! modelled as `Result`s: the first failure observed is surfaced to the caller
//! and never swallowed.
//!
//! - [sequential_transform] invokes the function one item at a time, in order.
//! - [sequential_flat_transform] does the same but concatenates the produced collections.
//! - [parallel_transform] starts every invocation up front and waits for all of them.
//! - [async_all_of] is a logical AND over a sequential transform.

use std::future::Future;

use futures::future::join_all;

/// Runs `func` on each item strictly in iteration order and collects the results.
///
/// The next invocation is only started once the previous one has resolved.
/// If an invocation fails the remaining items are not visited and the error is
/// returned, any results produced so far are discarded.
pub async fn sequential_transform<I, F, Fut, R, E>(
    items: I,
    mut func: F,
) -> Result<Vec<R>, E>
where
    I: IntoIterator,
    F: FnMut(I::Item) -> Fut,
    Fut: Future<Output = Result<R, E>>,
{
    let items = items.into_iter();
    let mut results = Vec::with_capacity(items.size_hint().0);

    for item in items {
        let result = func(item).await?;
        results.push(result);
    }

    Ok(results)
}

/// Runs `func` on each item strictly in iteration order, flattening the
/// produced collections into a single vector.
///
/// Ordering and failure behaviour match [sequential_transform].
pub async fn sequential_flat_transform<I, F, Fut, C, E>(
    items: I,
    mut func: F,
) -> Result<Vec<C::Item>, E>
where
    I: IntoIterator,
    F: FnMut(I::Item) -> Fut,
    Fut: Future<Output = Result<C, E>>,
    C: IntoIterator,
{
    let mut results = Vec::new();

    for item in items {
        let produced = func(item).await?;
        results.extend(produced);
    }

    Ok(results)
}

/// Runs `func` on every item concurrently and waits for all invocations to resolve.
///
/// All futures are created before any of them is awaited and they are driven
/// together, so a slow invocation does not delay the start of the others.
/// The result only resolves once every invocation has completed, even if one
/// of them fails early; in that case the error of the first failing item
/// (in input order) is returned.
pub async fn parallel_transform<I, F, Fut, R, E>(items: I, func: F) -> Result<Vec<R>, E>
where
    I: IntoIterator,
    F: FnMut(I::Item) -> Fut,
    Fut: Future<Output = Result<R, E>>,
{
    let pending = items.into_iter().map(func).collect::<Vec<_>>();

    join_all(pending).await.into_iter().collect()
}

/// Returns `true` if the predicate resolves to `true` for every item.
///
/// The predicate is evaluated sequentially over every item, there is no
/// short-circuiting on the first `false`.
pub async fn async_all_of<I, F, Fut, E>(items: I, predicate: F) -> Result<bool, E>
where
    I: IntoIterator,
    F: FnMut(I::Item) -> Fut,
    Fut: Future<Output = Result<bool, E>>,
{
    let outcomes = sequential_transform(items, predicate).await?;
    Ok(outcomes.into_iter().all(|outcome| outcome))
}
