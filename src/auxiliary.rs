//! Single-flight manager for the auxiliary rendering context
//!
//! The auxiliary context is only needed for document output, so it is created
//! lazily on first use and then reused. Concurrent callers that arrive while a
//! creation is running all await that same creation; the factory is never
//! invoked twice for one context.

use crate::context::{AuxiliaryContext, AuxiliaryContextFactory};
use crate::error::{Error, Result};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;

type Creation = Shared<BoxFuture<'static, std::result::Result<Arc<dyn AuxiliaryContext>, String>>>;

#[derive(Default)]
struct AuxState {
    context: Option<Arc<dyn AuxiliaryContext>>,
    creating: Option<Creation>,
}

struct Inner {
    factory: Arc<dyn AuxiliaryContextFactory>,
    state: Mutex<AuxState>,
    creations: AtomicU64,
}

/// Lazily creates and shares the auxiliary context
///
/// Cloning is cheap; clones share the same context.
#[derive(Clone)]
pub struct AuxiliaryContextManager {
    inner: Arc<Inner>,
}

impl AuxiliaryContextManager {
    /// Manager creating contexts through `factory`
    pub fn new(factory: Arc<dyn AuxiliaryContextFactory>) -> Self {
        Self {
            inner: Arc::new(Inner {
                factory,
                state: Mutex::new(AuxState::default()),
                creations: AtomicU64::new(0),
            }),
        }
    }

    /// Return the auxiliary context, creating it if needed
    ///
    /// If a creation is already in flight this awaits it instead of starting
    /// another. A failed creation is reported to every caller that awaited it
    /// and the next call starts over.
    pub async fn ensure_context(&self) -> Result<Arc<dyn AuxiliaryContext>> {
        let creation = {
            let mut state = self.inner.state.lock().await;
            if let Some(context) = &state.context {
                return Ok(context.clone());
            }
            match &state.creating {
                Some(creation) => creation.clone(),
                None => {
                    let attempt = self.inner.creations.fetch_add(1, Ordering::SeqCst) + 1;
                    tracing::debug!(attempt, "creating auxiliary context");
                    let factory = self.inner.factory.clone();
                    let creation = async move { factory.create().await.map_err(|e| e.to_string()) }
                        .boxed()
                        .shared();
                    state.creating = Some(creation.clone());
                    creation
                }
            }
        };

        let result = creation.clone().await;

        let mut state = self.inner.state.lock().await;
        if state
            .creating
            .as_ref()
            .is_some_and(|current| current.ptr_eq(&creation))
        {
            state.creating = None;
            match &result {
                Ok(context) => state.context = Some(context.clone()),
                Err(e) => tracing::warn!(error = %e, "auxiliary context creation failed"),
            }
        }
        drop(state);

        result.map_err(Error::AuxiliaryContext)
    }

    /// Drop the current context; the next request creates a new one
    pub async fn invalidate(&self) {
        let mut state = self.inner.state.lock().await;
        if state.context.take().is_some() {
            tracing::debug!("auxiliary context invalidated");
        }
    }

    /// Whether a context is currently held
    pub async fn has_context(&self) -> bool {
        self.inner.state.lock().await.context.is_some()
    }

    /// Number of times the factory has been invoked
    pub fn creation_count(&self) -> u64 {
        self.inner.creations.load(Ordering::SeqCst)
    }
}
