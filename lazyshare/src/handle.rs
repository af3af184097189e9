//! Handles to an open shared resource.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::errors::{SharedError, SharedResult};
use crate::factory::ResourceFactory;
use crate::shared::Inner;
use crate::waiter::Grant;

/// Identifies one handle in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HandleId(Uuid);

impl HandleId {
    fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// The underlying UUID.
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One counted reference to an open shared resource.
///
/// Obtained from [`SharedResource::open`](crate::SharedResource::open).
/// Every handle should be closed with [`close`](Self::close). A handle that
/// is dropped without being closed still gives its reference back, but the
/// factory's close then runs in the background (inline when no runtime is
/// available) and its outcome is only logged.
pub struct SharedHandle<F: ResourceFactory> {
    inner: Arc<Inner<F>>,
    grant: Option<Grant<F::Resource>>,
    generation: u64,
    id: HandleId,
}

impl<F: ResourceFactory> SharedHandle<F> {
    pub(crate) fn new(inner: Arc<Inner<F>>, grant: Grant<F::Resource>) -> Self {
        Self {
            inner,
            generation: grant.generation,
            grant: Some(grant),
            id: HandleId::new(),
        }
    }

    /// The shared value.
    ///
    /// Fails with [`SharedError::HandleClosed`] after [`close`](Self::close).
    pub fn value(&self) -> SharedResult<&F::Resource> {
        self.grant
            .as_ref()
            .map(|grant| &*grant.resource)
            .ok_or(SharedError::HandleClosed)
    }

    /// Gives this handle's reference back.
    ///
    /// When it was the last reference of its generation, the factory's close
    /// runs before this returns and its error, if any, is returned. The close
    /// runs as its own task, so dropping this future does not cut it short.
    ///
    /// Closing an already closed handle fails with
    /// [`SharedError::DoubleClose`] and changes nothing.
    #[instrument(skip(self), fields(resource = %self.inner.config.name, handle = %self.id, generation = self.generation))]
    pub async fn close(&mut self) -> SharedResult<()> {
        if self.grant.take().is_none() {
            warn!("handle closed more than once");
            return Err(SharedError::DoubleClose {
                generation: self.generation,
            });
        }

        match self.inner.release(self.generation)? {
            Some(last) => self.inner.close_last(last).await,
            None => Ok(()),
        }
    }

    /// Returns true once [`close`](Self::close) has been called.
    pub const fn is_closed(&self) -> bool {
        self.grant.is_none()
    }

    /// Generation of the resource this handle refers to.
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// This handle's identifier.
    pub const fn id(&self) -> HandleId {
        self.id
    }
}

impl<F: ResourceFactory> Drop for SharedHandle<F> {
    fn drop(&mut self) {
        if self.grant.take().is_none() {
            return;
        }

        if self.inner.config.warn_on_unclosed_drop {
            warn!(
                resource = %self.inner.config.name,
                handle = %self.id,
                generation = self.generation,
                "shared handle dropped without close(), releasing in background"
            );
        }
        self.inner.release_detached(self.generation);
    }
}

impl<F: ResourceFactory> fmt::Debug for SharedHandle<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedHandle")
            .field("resource", &self.inner.config.name)
            .field("id", &self.id)
            .field("generation", &self.generation)
            .field("closed", &self.is_closed())
            .finish()
    }
}
