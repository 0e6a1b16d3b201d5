use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use tokio::sync::oneshot;

struct Shared {
    expected: usize,
    arrived: AtomicUsize,
    release: Mutex<Option<oneshot::Sender<()>>>,
}

/// Counting side of the join. Clone it into every task that reports in.
#[derive(Clone)]
pub struct Barrier {
    shared: Arc<Shared>,
}

/// Resolves once `expected` arrivals have been counted, or straight away
/// when nothing was expected.
pub struct BarrierWait {
    receiver: Option<oneshot::Receiver<()>>,
}

impl Barrier {
    pub fn new(expected: usize) -> (Barrier, BarrierWait) {
        let (sender, receiver) = oneshot::channel();
        let shared = Arc::new(Shared {
            expected,
            arrived: AtomicUsize::new(0),
            release: Mutex::new(Some(sender)),
        });
        let barrier = Barrier { shared };
        if expected == 0 {
            barrier.release();
        }
        (
            barrier,
            BarrierWait {
                receiver: Some(receiver),
            },
        )
    }

    /// Records one completion. Arrivals past `expected` are ignored.
    pub fn arrive(&self) {
        let previous = self.shared.arrived.fetch_add(1, Ordering::AcqRel);
        if previous + 1 == self.shared.expected {
            self.release();
        }
    }

    pub fn arrived(&self) -> usize {
        self.shared
            .arrived
            .load(Ordering::Acquire)
            .min(self.shared.expected)
    }

    pub fn expected(&self) -> usize {
        self.shared.expected
    }

    fn release(&self) {
        let sender = self
            .shared
            .release
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(sender) = sender {
            let _ = sender.send(());
        }
    }
}

impl Future for BarrierWait {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let Some(receiver) = self.receiver.as_mut() else {
            return Poll::Ready(());
        };
        match Pin::new(receiver).poll(cx) {
            Poll::Ready(_) => {
                self.receiver = None;
                Poll::Ready(())
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
