//! A single named transformation stage.

use futures::future::BoxFuture;
use hybridci_shared::Result;

use crate::context::Context;

/// One unit of work in a [`Chain`](crate::Chain).
///
/// A link consumes a context and returns a new one with its output keys
/// added. Returning `Err` aborts the whole run; conditions the caller should
/// see as data (e.g. validation failures) belong in the returned context.
#[async_trait::async_trait]
pub trait Link: Send + Sync {
    async fn call(&self, ctx: Context) -> Result<Context>;
}

/// Adapter turning a closure into a [`Link`].
pub struct FnLink<F> {
    f: F,
}

impl<F> FnLink<F>
where
    F: Fn(Context) -> BoxFuture<'static, Result<Context>> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait::async_trait]
impl<F> Link for FnLink<F>
where
    F: Fn(Context) -> BoxFuture<'static, Result<Context>> + Send + Sync,
{
    async fn call(&self, ctx: Context) -> Result<Context> {
        (self.f)(ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use hybridci_shared::HybridCiError;

    #[tokio::test]
    async fn fn_link_runs_closure() {
        let link = FnLink::new(|ctx: Context| {
            async move { Ok::<_, HybridCiError>(ctx.insert("seen", true)) }.boxed()
        });
        let out = link.call(Context::new()).await.unwrap();
        assert_eq!(out.get::<bool>("seen"), Some(&true));
    }
}
