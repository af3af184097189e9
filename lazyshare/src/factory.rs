//! The contract between a shared resource and the thing it wraps.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

/// Opens and closes the underlying resource.
///
/// A [`SharedResource`](crate::SharedResource) calls [`open`](Self::open) at
/// most once per generation and [`close`](Self::close) at most once per
/// generation, only after every handle of that generation has been released.
///
/// # Example
/// ```rust
/// use std::sync::Arc;
/// use async_trait::async_trait;
/// use lazyshare::ResourceFactory;
///
/// struct Scratch;
///
/// #[async_trait]
/// impl ResourceFactory for Scratch {
///     type Resource = Vec<u8>;
///     type Error = std::io::Error;
///
///     async fn open(&self) -> Result<Vec<u8>, std::io::Error> {
///         Ok(vec![0; 4096])
///     }
///
///     async fn close(&self, _buffer: Arc<Vec<u8>>) -> Result<(), std::io::Error> {
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait ResourceFactory: Send + Sync + 'static {
    /// The value shared between handles.
    type Resource: Send + Sync + 'static;

    /// Error reported by `open` and `close`.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Creates the resource for a new generation.
    async fn open(&self) -> Result<Self::Resource, Self::Error>;

    /// Tears down the resource of a finished generation.
    ///
    /// Every handle has been released when this runs, so
    /// `Arc::try_unwrap(resource)` normally succeeds. A snapshot of the
    /// wrapper's state may still be held briefly by a thread that lost a
    /// race, so implementations must not rely on it.
    async fn close(&self, resource: Arc<Self::Resource>) -> Result<(), Self::Error>;
}

/// Adapts a pair of async closures into a [`ResourceFactory`].
///
/// ```rust
/// use lazyshare::FnFactory;
///
/// let factory = FnFactory::new(
///     || async { Ok::<_, std::io::Error>(String::from("session")) },
///     |_session: std::sync::Arc<String>| async { Ok::<(), std::io::Error>(()) },
/// );
/// # let _ = factory;
/// ```
pub struct FnFactory<O, C> {
    open: O,
    close: C,
}

impl<O, C> FnFactory<O, C> {
    /// Builds a factory from an `open` and a `close` closure.
    pub const fn new(open: O, close: C) -> Self {
        Self { open, close }
    }
}

#[async_trait]
impl<T, E, O, OFut, C, CFut> ResourceFactory for FnFactory<O, C>
where
    T: Send + Sync + 'static,
    E: std::error::Error + Send + Sync + 'static,
    O: Fn() -> OFut + Send + Sync + 'static,
    OFut: Future<Output = Result<T, E>> + Send + 'static,
    C: Fn(Arc<T>) -> CFut + Send + Sync + 'static,
    CFut: Future<Output = Result<(), E>> + Send + 'static,
{
    type Resource = T;
    type Error = E;

    async fn open(&self) -> Result<T, E> {
        (self.open)().await
    }

    async fn close(&self, resource: Arc<T>) -> Result<(), E> {
        (self.close)(resource).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn fn_factory_forwards_to_closures() {
        let closed = Arc::new(AtomicUsize::new(0));
        let closed_in_factory = Arc::clone(&closed);

        let factory = FnFactory::new(
            || async { Ok::<_, std::io::Error>(7_u16) },
            move |value: Arc<u16>| {
                let closed = Arc::clone(&closed_in_factory);
                async move {
                    closed.fetch_add(usize::from(*value), Ordering::SeqCst);
                    Ok::<(), std::io::Error>(())
                }
            },
        );

        let value = factory.open().await.unwrap();
        assert_eq!(value, 7);

        factory.close(Arc::new(value)).await.unwrap();
        assert_eq!(closed.load(Ordering::SeqCst), 7);
    }
}
