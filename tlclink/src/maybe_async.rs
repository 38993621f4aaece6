enum Value<T> {
    Ready(T),
    Async(core::pin::Pin<Box<dyn core::future::Future<Output = T> + Send + 'static>>),
}

/// A result that a sink or listener may produce synchronously or asynchronously
///
/// Trait objects cannot expose `async fn`, so callbacks return this instead.
/// Implementations that complete immediately avoid boxing a future.
#[must_use]
pub struct MaybeAsync<T> {
    inner: Value<T>,
}

impl<T> MaybeAsync<T> {
    /// Retrieve the value, awaiting the future if there is one
    pub async fn get(self) -> T {
        match self.inner {
            Value::Ready(x) => x,
            Value::Async(x) => x.await,
        }
    }

    /// Wrap a value that is already available
    pub fn ready(result: T) -> Self {
        MaybeAsync {
            inner: Value::Ready(result),
        }
    }

    /// Wrap a future that yields the value later
    pub fn asynchronous<F>(result: F) -> Self
    where
        F: core::future::Future<Output = T> + Send + 'static,
    {
        MaybeAsync {
            inner: Value::Async(Box::pin(result)),
        }
    }
}
