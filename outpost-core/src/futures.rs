use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use crate::Hub;

/// A future that binds a [`Hub`] to its execution.
///
/// This makes sure that the future is polled within the given hub, so that
/// captures from inside the task see the scope of that hub.
#[pin_project::pin_project]
#[derive(Debug)]
pub struct OutpostFuture<F> {
    hub: Arc<Hub>,
    #[pin]
    future: F,
}

impl<F> OutpostFuture<F> {
    /// Creates a new bound future with a [`Hub`].
    pub fn new(hub: Arc<Hub>, future: F) -> Self {
        Self { hub, future }
    }
}

impl<F> Future for OutpostFuture<F>
where
    F: Future,
{
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let hub = this.hub.clone();
        let future = this.future;
        Hub::run(hub, || future.poll(cx))
    }
}

/// Future extensions for Outpost.
pub trait OutpostFutureExt: Sized {
    /// Binds a hub to the execution of this future.
    ///
    /// This ensures that the future is polled within the given hub.
    ///
    /// # Examples
    ///
    /// ```
    /// # let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
    /// # rt.block_on(async {
    /// use std::sync::Arc;
    /// use outpost_core::{Hub, OutpostFutureExt};
    ///
    /// let hub = Arc::new(Hub::new_from_top(Hub::current()));
    /// let result = async { 1_u32 }.bind_hub(hub).await;
    /// assert_eq!(result, 1);
    /// # });
    /// ```
    fn bind_hub<H>(self, hub: H) -> OutpostFuture<Self>
    where
        H: Into<Arc<Hub>>,
    {
        OutpostFuture {
            future: self,
            hub: hub.into(),
        }
    }
}

impl<F> OutpostFutureExt for F where F: Future {}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::test::with_captured_events;
    use crate::{capture_message, configure_scope, Level};

    #[test]
    fn test_bind_hub_isolates_scope() {
        let rt = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();

        let events = with_captured_events(|| {
            let outer = Hub::current();
            let tasks: Vec<_> = (0..2)
                .map(|i| {
                    let hub = Arc::new(Hub::new_from_top(&outer));
                    async move {
                        configure_scope(|scope| scope.set_tag("task", i));
                        tokio::task::yield_now().await;
                        capture_message("from task", Level::Info);
                    }
                    .bind_hub(hub)
                })
                .collect();
            rt.block_on(async {
                for task in tasks {
                    task.await;
                }
            });
            capture_message("outside", Level::Info);
        });

        assert_eq!(events.len(), 3);
        assert_eq!(events[0].tags["task"], "0");
        assert_eq!(events[1].tags["task"], "1");
        assert!(!events[2].tags.contains_key("task"));
    }
}
