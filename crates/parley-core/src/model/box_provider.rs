//! BoxModelProvider -- object-safe dynamic dispatch wrapper for ModelProvider.
//!
//! 1. Define an object-safe `ModelProviderDyn` trait with boxed futures
//! 2. Blanket-impl `ModelProviderDyn` for all `T: ModelProvider`
//! 3. `BoxModelProvider` wraps `Box<dyn ModelProviderDyn>` and delegates

use std::future::Future;
use std::pin::Pin;

use parley_types::error::ModelError;
use parley_types::model::{ModelRequest, ModelResponse};

use super::provider::{FragmentStream, ModelProvider};

/// Object-safe version of [`ModelProvider`] with boxed futures.
///
/// This trait exists solely to enable dynamic dispatch (`dyn ModelProviderDyn`).
/// A blanket implementation is provided for all types implementing `ModelProvider`.
pub trait ModelProviderDyn: Send + Sync {
    fn name(&self) -> &str;

    fn complete_boxed<'a>(
        &'a self,
        request: &'a ModelRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ModelResponse, ModelError>> + Send + 'a>>;

    fn stream_boxed(&self, request: ModelRequest) -> FragmentStream;
}

/// Blanket implementation: any `ModelProvider` automatically implements
/// `ModelProviderDyn`.
impl<T: ModelProvider> ModelProviderDyn for T {
    fn name(&self) -> &str {
        ModelProvider::name(self)
    }

    fn complete_boxed<'a>(
        &'a self,
        request: &'a ModelRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ModelResponse, ModelError>> + Send + 'a>> {
        Box::pin(self.complete(request))
    }

    fn stream_boxed(&self, request: ModelRequest) -> FragmentStream {
        self.stream(request)
    }
}

/// Type-erased model provider, selected once at configuration-load time.
pub struct BoxModelProvider {
    inner: Box<dyn ModelProviderDyn>,
}

impl std::fmt::Debug for BoxModelProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxModelProvider")
            .field("name", &self.inner.name())
            .finish()
    }
}

impl BoxModelProvider {
    pub fn new(provider: impl ModelProvider + 'static) -> Self {
        Self {
            inner: Box::new(provider),
        }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub async fn complete(&self, request: &ModelRequest) -> Result<ModelResponse, ModelError> {
        self.inner.complete_boxed(request).await
    }

    pub fn stream(&self, request: ModelRequest) -> FragmentStream {
        self.inner.stream_boxed(request)
    }
}
