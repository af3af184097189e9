//! The shared resource wrapper and its completion dispatcher.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::{BoxFuture, FusedFuture};
use futures::FutureExt;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, instrument, warn, Instrument};

use crate::config::SharedResourceConfig;
use crate::errors::{SharedError, SharedResult};
use crate::factory::ResourceFactory;
use crate::handle::SharedHandle;
use crate::monitor::{LifecycleCounters, SharedStats, SharedStatus};
use crate::state::{Admission, Completion, Release, StateCell};
use crate::waiter::{Delivery, Grant, Waiter};

/// A lazily opened, reference-counted resource shared by many callers.
///
/// The first [`open`](Self::open) starts the factory's open on the tokio
/// runtime. Callers arriving while it is in flight are queued and resumed in
/// arrival order once it resolves. Callers arriving while the resource is
/// open get a new handle immediately. When the last handle is closed the
/// factory's close runs, and the next `open` starts a new generation.
///
/// Cloning a `SharedResource` is cheap; clones share the same state.
///
/// # Example
/// ```rust
/// use lazyshare::{FnFactory, SharedResource};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), lazyshare::SharedError> {
/// let shared = SharedResource::new(FnFactory::new(
///     || async { Ok::<_, std::io::Error>(String::from("connection")) },
///     |_conn: std::sync::Arc<String>| async { Ok::<(), std::io::Error>(()) },
/// ));
///
/// let mut first = shared.open().await?;
/// let mut second = shared.open().await?;
/// assert_eq!(first.value()?, "connection");
///
/// first.close().await?;
/// second.close().await?; // the factory's close runs here
/// assert!(shared.status().is_closed());
/// # Ok(())
/// # }
/// ```
pub struct SharedResource<F: ResourceFactory> {
    inner: Arc<Inner<F>>,
}

pub(crate) struct Inner<F: ResourceFactory> {
    pub(crate) factory: F,
    pub(crate) config: SharedResourceConfig,
    cell: StateCell<F::Resource>,
    counters: LifecycleCounters,
    runtime: Option<Handle>,
}

impl<F: ResourceFactory> SharedResource<F> {
    /// Wraps `factory` with the default configuration.
    pub fn new(factory: F) -> Self {
        Self::with_config(factory, SharedResourceConfig::default())
    }

    /// Wraps `factory` with a custom configuration.
    pub fn with_config(factory: F, config: SharedResourceConfig) -> Self {
        Self::build(factory, config, None)
    }

    /// Wraps `factory` and runs its opens and background closes on `runtime`
    /// instead of the caller's current runtime.
    pub fn with_runtime(factory: F, config: SharedResourceConfig, runtime: Handle) -> Self {
        Self::build(factory, config, Some(runtime))
    }

    fn build(factory: F, config: SharedResourceConfig, runtime: Option<Handle>) -> Self {
        Self {
            inner: Arc::new(Inner {
                factory,
                config,
                cell: StateCell::new(),
                counters: LifecycleCounters::default(),
                runtime,
            }),
        }
    }

    /// Requests a handle to the resource.
    ///
    /// The request is registered when this method is called, not when the
    /// returned future is first polled, so arrival order is call order.
    /// The future never blocks a thread.
    pub fn open(&self) -> OpenFuture<F> {
        let inner = &self.inner;
        let runtime = inner.runtime();
        let pending = match inner.cell.admit(runtime.is_some()) {
            Admission::Initiated { generation, waiter } => {
                inner.counters.generation_started();
                if let Some(runtime) = &runtime {
                    inner.spawn_open(generation, runtime);
                }
                Pending::Queued(waiter)
            }
            Admission::Queued {
                generation,
                position,
                waiter,
            } => {
                debug!(
                    resource = %inner.config.name,
                    generation,
                    position,
                    "resource is opening, request queued"
                );
                Pending::Queued(waiter)
            }
            Admission::Ready(grant) => {
                inner.counters.handles_issued(1);
                debug!(
                    resource = %inner.config.name,
                    generation = grant.generation,
                    "resource already open, handle issued"
                );
                Pending::Immediate(Some(Ok(grant)))
            }
            Admission::Refused => {
                warn!(
                    resource = %inner.config.name,
                    "cannot open resource outside of a tokio runtime"
                );
                Pending::Immediate(Some(Err(SharedError::NoRuntime)))
            }
        };

        OpenFuture {
            inner: Arc::clone(inner),
            pending,
        }
    }

    /// Opens a handle, runs `f` with it, and closes it afterwards.
    ///
    /// The handle is closed whether `f` succeeds or not. If `f` panics, the
    /// handle's drop releases it instead.
    ///
    /// ```rust
    /// # use lazyshare::{FnFactory, SharedResource};
    /// use futures::FutureExt;
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() -> Result<(), lazyshare::SharedError> {
    /// # let shared = SharedResource::new(FnFactory::new(
    /// #     || async { Ok::<_, std::io::Error>(vec![1_u8, 2, 3]) },
    /// #     |_buf: std::sync::Arc<Vec<u8>>| async { Ok::<(), std::io::Error>(()) },
    /// # ));
    /// let len = shared
    ///     .with(|handle| async move { handle.value().map(Vec::len) }.boxed())
    ///     .await??;
    /// assert_eq!(len, 3);
    /// assert!(shared.status().is_closed());
    /// # Ok(())
    /// # }
    /// ```
    #[instrument(skip_all, fields(resource = %self.inner.config.name))]
    pub async fn with<R, W>(&self, f: W) -> SharedResult<R>
    where
        R: Send,
        W: for<'h> FnOnce(&'h SharedHandle<F>) -> BoxFuture<'h, R> + Send,
    {
        let mut handle = self.open().await?;
        let output = f(&handle).await;
        handle.close().await?;
        Ok(output)
    }

    /// Current lifecycle state.
    pub fn status(&self) -> SharedStatus {
        self.inner.cell.status()
    }

    /// Cumulative lifecycle counters.
    pub fn stats(&self) -> SharedStats {
        self.inner.counters.snapshot(self.inner.cell.retries())
    }

    /// The wrapped factory.
    pub fn factory(&self) -> &F {
        &self.inner.factory
    }

    /// The configuration this resource was created with.
    pub fn config(&self) -> &SharedResourceConfig {
        &self.inner.config
    }
}

impl<F: ResourceFactory> Clone for SharedResource<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F: ResourceFactory> std::fmt::Debug for SharedResource<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedResource")
            .field("name", &self.inner.config.name)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl<F: ResourceFactory> Inner<F> {
    fn runtime(&self) -> Option<Handle> {
        self.runtime
            .clone()
            .or_else(|| Handle::try_current().ok())
    }

    fn spawn_open(self: &Arc<Self>, generation: u64, runtime: &Handle) {
        info!(resource = %self.config.name, generation, "opening resource");
        let span = info_span!("shared_resource.open", resource = %self.config.name, generation);
        let open = InFlightOpen {
            inner: Arc::clone(self),
            generation,
            dispatched: false,
        };
        runtime.spawn(open.run().instrument(span));
    }

    /// Completion dispatcher: installs the open's outcome and resumes every
    /// waiter of the generation in arrival order.
    fn dispatch(self: &Arc<Self>, outcome: SharedResult<F::Resource>) {
        match self.cell.complete(outcome) {
            Ok(Completion::Opened { grant, waiters }) => {
                self.counters
                    .handles_issued(u64::try_from(waiters.len()).unwrap_or(u64::MAX));
                info!(
                    resource = %self.config.name,
                    generation = grant.generation,
                    handles = waiters.len(),
                    "resource opened"
                );
                for waiter in waiters {
                    if waiter.resolve(Ok(grant.clone())) == Delivery::Abandoned {
                        debug!(
                            resource = %self.config.name,
                            generation = grant.generation,
                            "waiter gone before delivery, releasing its reference"
                        );
                        self.release_detached(grant.generation);
                    }
                }
            }
            Ok(Completion::Failed { error, waiters }) => {
                self.counters.generation_failed();
                warn!(
                    resource = %self.config.name,
                    %error,
                    waiters = waiters.len(),
                    "resource failed to open"
                );
                for waiter in waiters {
                    waiter.resolve(Err(error.clone()));
                }
            }
            Err(error) => {
                error!(resource = %self.config.name, %error, "completion dispatcher invariant violated");
            }
        }
    }

    /// Gives back one reference of `generation`.
    ///
    /// Returns the resource when it was the last reference; the caller is
    /// then responsible for [`teardown`](Self::teardown).
    pub(crate) fn release(&self, generation: u64) -> SharedResult<Option<Grant<F::Resource>>> {
        match self.cell.release(generation) {
            Ok(Release::Retained { remaining }) => {
                self.counters.handle_released();
                debug!(
                    resource = %self.config.name,
                    generation,
                    handles = remaining,
                    "handle released"
                );
                Ok(None)
            }
            Ok(Release::Last(grant)) => {
                self.counters.handle_released();
                debug!(
                    resource = %self.config.name,
                    generation,
                    "last handle released, closing resource"
                );
                Ok(Some(grant))
            }
            Err(error) => {
                error!(resource = %self.config.name, %error, "release rejected");
                Err(error)
            }
        }
    }

    /// Runs the factory's close for a finished generation.
    pub(crate) async fn teardown(&self, grant: Grant<F::Resource>) -> SharedResult<()> {
        let Grant {
            generation,
            resource,
        } = grant;
        let result = match AssertUnwindSafe(self.factory.close(resource))
            .catch_unwind()
            .await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(error)) => Err(SharedError::close_failed(generation, error)),
            Err(_) => Err(SharedError::CloseAborted { generation }),
        };
        self.counters.teardown(result.is_ok());

        match &result {
            Ok(()) => info!(resource = %self.config.name, generation, "resource closed"),
            Err(error) => {
                warn!(resource = %self.config.name, generation, %error, "resource failed to close");
            }
        }
        result
    }

    /// Runs the teardown as its own task, so it completes even when nobody
    /// waits for it.
    fn spawn_teardown(
        self: &Arc<Self>,
        grant: Grant<F::Resource>,
        runtime: &Handle,
    ) -> JoinHandle<SharedResult<()>> {
        let inner = Arc::clone(self);
        let span = info_span!(
            "shared_resource.close",
            resource = %self.config.name,
            generation = grant.generation
        );
        runtime.spawn(async move { inner.teardown(grant).await }.instrument(span))
    }

    /// Closes a finished generation on behalf of its last closer.
    ///
    /// The factory's close keeps running if the caller stops waiting.
    pub(crate) async fn close_last(self: &Arc<Self>, grant: Grant<F::Resource>) -> SharedResult<()> {
        let Some(runtime) = self.runtime() else {
            return self.teardown(grant).await;
        };

        let generation = grant.generation;
        self.spawn_teardown(grant, &runtime)
            .await
            .unwrap_or_else(|join_error| {
                self.counters.teardown(false);
                error!(
                    resource = %self.config.name,
                    generation,
                    error = %join_error,
                    "resource close task did not complete"
                );
                Err(SharedError::CloseAborted { generation })
            })
    }

    /// Releases a reference from a synchronous context, spawning the
    /// teardown if it was the last one.
    ///
    /// Outside of any runtime the teardown runs inline on this thread.
    pub(crate) fn release_detached(self: &Arc<Self>, generation: u64) {
        let Ok(Some(grant)) = self.release(generation) else {
            return;
        };

        if let Some(runtime) = self.runtime() {
            drop(self.spawn_teardown(grant, &runtime));
            return;
        }

        warn!(
            resource = %self.config.name,
            generation,
            "no tokio runtime to close the resource on, closing inline"
        );
        let inline = std::panic::catch_unwind(AssertUnwindSafe(|| {
            futures::executor::block_on(self.teardown(grant))
        }));
        if inline.is_err() {
            self.counters.teardown(false);
            error!(
                resource = %self.config.name,
                generation,
                "inline resource close could not run"
            );
        }
    }
}

/// The factory open of one generation, owned by the task that runs it.
///
/// Dropping it before the open resolves, as a runtime shutdown does, fails
/// the generation with [`SharedError::OpenCancelled`] so no waiter is left
/// queued.
struct InFlightOpen<F: ResourceFactory> {
    inner: Arc<Inner<F>>,
    generation: u64,
    dispatched: bool,
}

impl<F: ResourceFactory> InFlightOpen<F> {
    async fn run(mut self) {
        let generation = self.generation;
        let outcome = match AssertUnwindSafe(self.inner.factory.open())
            .catch_unwind()
            .await
        {
            Ok(Ok(resource)) => Ok(resource),
            Ok(Err(error)) => Err(SharedError::open_failed(generation, error)),
            Err(_) => Err(SharedError::FactoryPanicked { generation }),
        };
        self.dispatched = true;
        self.inner.dispatch(outcome);
    }
}

impl<F: ResourceFactory> Drop for InFlightOpen<F> {
    fn drop(&mut self) {
        if self.dispatched {
            return;
        }
        warn!(
            resource = %self.inner.config.name,
            generation = self.generation,
            "open task dropped before the resource opened"
        );
        self.inner.dispatch(Err(SharedError::OpenCancelled {
            generation: self.generation,
        }));
    }
}

enum Pending<T> {
    Immediate(Option<SharedResult<Grant<T>>>),
    Queued(Arc<Waiter<T>>),
    Done,
}

/// Future returned by [`SharedResource::open`].
///
/// Like a fused future, it stays pending once it has produced its output.
///
/// Dropping it before it resolves is safe: any reference it was granted is
/// released, and the resource is closed if nobody else holds it.
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct OpenFuture<F: ResourceFactory> {
    inner: Arc<Inner<F>>,
    pending: Pending<F::Resource>,
}

impl<F: ResourceFactory> Future for OpenFuture<F> {
    type Output = SharedResult<SharedHandle<F>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let outcome = match &mut this.pending {
            Pending::Immediate(outcome) => outcome.take(),
            Pending::Queued(waiter) => waiter.take().or_else(|| {
                waiter.register(cx.waker());
                waiter.take()
            }),
            Pending::Done => None,
        };

        match outcome {
            Some(outcome) => {
                this.pending = Pending::Done;
                Poll::Ready(outcome.map(|grant| SharedHandle::new(Arc::clone(&this.inner), grant)))
            }
            None => Poll::Pending,
        }
    }
}

impl<F: ResourceFactory> FusedFuture for OpenFuture<F> {
    fn is_terminated(&self) -> bool {
        matches!(self.pending, Pending::Done)
    }
}

impl<F: ResourceFactory> Drop for OpenFuture<F> {
    fn drop(&mut self) {
        let unclaimed = match std::mem::replace(&mut self.pending, Pending::Done) {
            Pending::Immediate(Some(Ok(grant))) => Some(grant),
            Pending::Queued(waiter) => waiter.abandon().and_then(Result::ok),
            Pending::Immediate(_) | Pending::Done => None,
        };

        if let Some(grant) = unclaimed {
            warn!(
                resource = %self.inner.config.name,
                generation = grant.generation,
                "open future dropped before handing out its handle"
            );
            self.inner.release_detached(grant.generation);
        }
    }
}

impl<F: ResourceFactory> std::fmt::Debug for OpenFuture<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &self.pending {
            Pending::Immediate(_) => "immediate",
            Pending::Queued(_) => "queued",
            Pending::Done => "done",
        };
        f.debug_struct("OpenFuture")
            .field("resource", &self.inner.config.name)
            .field("state", &state)
            .finish()
    }
}
