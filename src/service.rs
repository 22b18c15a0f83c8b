//! Common abstraction for long-running background processes (§10
//! "Background services"): the worker pool, the repair sweep, and the HTTP
//! server are each a `Service`, spawned from `main()` and coordinated through
//! one `CancellationToken` fanned out on shutdown.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

#[async_trait]
pub trait Service: Send {
    fn name(&self) -> &str;

    async fn run(self: Box<Self>, shutdown: CancellationToken) -> anyhow::Result<()>;
}
