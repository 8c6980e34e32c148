//! Sources of work.
//!
//! A source pumps a finite sequence of items into a [`Sink`] and returns when
//! it is exhausted. Returning is the only end-of-work signal the engine needs.

use crate::error::Result;
use async_trait::async_trait;
use std::future::Future;
use tokio::sync::mpsc;

/// Anything that can pump work into a sink.
///
/// Implemented by [`Generator`], [`IterSource`], and by
/// [`WorkGroup`](crate::engine::WorkGroup) itself, which is what lets groups
/// be chained into pipelines.
#[async_trait]
pub trait Source<W>: Send + 'static {
    /// Called once when the source is wired to a consumer via `drain`.
    fn attach(&mut self) {}

    /// Push items into `sink` until exhausted.
    async fn pump(self: Box<Self>, sink: Sink<W>) -> Result<()>;
}

/// The write end handed to a [`Source`].
#[derive(Debug)]
pub struct Sink<W> {
    tx: mpsc::Sender<W>,
}

impl<W> Clone for Sink<W> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<W: Send + 'static> Sink<W> {
    pub(crate) fn new(tx: mpsc::Sender<W>) -> Self {
        Self { tx }
    }

    /// Hand one item to the consumer, waiting until it has room.
    ///
    /// Returns `false` once the consumer has gone away; producers should stop.
    pub async fn send(&self, item: W) -> bool {
        self.tx.send(item).await.is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// A source backed by a user function that pushes items by hand.
///
/// ```no_run
/// use workgroup::source::{Generator, Sink};
///
/// let numbers = Generator::new(|sink: Sink<u32>| async move {
///     for i in 0..100 {
///         if !sink.send(i).await {
///             break;
///         }
///     }
/// });
/// # let _ = numbers;
/// ```
pub struct Generator<F> {
    produce: F,
}

impl<F> Generator<F> {
    pub fn new(produce: F) -> Self {
        Self { produce }
    }
}

#[async_trait]
impl<W, F, Fut> Source<W> for Generator<F>
where
    W: Send + 'static,
    F: FnOnce(Sink<W>) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn pump(self: Box<Self>, sink: Sink<W>) -> Result<()> {
        (self.produce)(sink).await;
        Ok(())
    }
}

/// A source that pumps the items of a finite iterator, in order.
pub struct IterSource<I> {
    items: I,
}

impl<I> IterSource<I> {
    pub fn new<T>(items: T) -> Self
    where
        T: IntoIterator<IntoIter = I>,
    {
        Self {
            items: items.into_iter(),
        }
    }
}

#[async_trait]
impl<W, I> Source<W> for IterSource<I>
where
    W: Send + 'static,
    I: Iterator<Item = W> + Send + 'static,
{
    async fn pump(self: Box<Self>, sink: Sink<W>) -> Result<()> {
        for item in self.items {
            if !sink.send(item).await {
                break;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn collect<S: Source<u32>>(source: S) -> Vec<u32> {
        let (tx, mut rx) = mpsc::channel(4);
        let pump = tokio::spawn(Box::new(source).pump(Sink::new(tx)));
        let mut seen = Vec::new();
        while let Some(item) = rx.recv().await {
            seen.push(item);
        }
        pump.await.unwrap().unwrap();
        seen
    }

    #[tokio::test]
    async fn generator_pumps_in_production_order() {
        let numbers = Generator::new(|sink: Sink<u32>| async move {
            for i in 0..5 {
                sink.send(i).await;
            }
        });
        assert_eq!(collect(numbers).await, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn iter_source_pumps_every_item() {
        assert_eq!(collect(IterSource::new(vec![7, 8, 9])).await, vec![7, 8, 9]);
    }

    #[tokio::test]
    async fn sink_reports_departed_consumer() {
        let (tx, rx) = mpsc::channel::<u32>(1);
        let sink = Sink::new(tx);
        drop(rx);
        assert!(sink.is_closed());
        assert!(!sink.send(1).await);
    }
}
