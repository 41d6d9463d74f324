use core::{
    future::{poll_fn, Future},
    task::Poll,
};

use portable_atomic::{AtomicU64, Ordering};

use atomic_waker::AtomicWaker;

/// Hands the TSF from the receive path to whoever is waiting for it.
///
/// A driver implementing [TimeSource](crate::TimeSource) sends the query to the firmware and
/// then waits on this, while the response is delivered from interrupt context through
/// [Self::signal].
pub struct TsfResponseSignal {
    tsf: AtomicU64,
    waker: AtomicWaker,
}
impl TsfResponseSignal {
    const PENDING: u64 = 0;
    pub const fn new() -> Self {
        Self {
            tsf: AtomicU64::new(Self::PENDING),
            waker: AtomicWaker::new(),
        }
    }
    /// Drop a response, that nobody waited for.
    pub fn reset(&self) {
        self.tsf.store(Self::PENDING, Ordering::Relaxed);
    }
    /// Deliver a TSF response.
    ///
    /// A TSF of zero is indistinguishable from no response at all.
    pub fn signal(&self, tsf: u64) {
        self.tsf.store(tsf, Ordering::Release);
        self.waker.wake();
    }
    /// Wait for the next response.
    pub fn wait(&self) -> impl Future<Output = u64> + use<'_> {
        poll_fn(|cx| {
            self.waker.register(cx.waker());
            match self.tsf.swap(Self::PENDING, Ordering::AcqRel) {
                Self::PENDING => Poll::Pending,
                tsf => Poll::Ready(tsf),
            }
        })
    }
}
impl Default for TsfResponseSignal {
    fn default() -> Self {
        Self::new()
    }
}
