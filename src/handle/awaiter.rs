//! Awaiting handles
//!
//! [`Awaiter`] is the bare poll-once protocol: check `is_completed`, read
//! `get_result`, or park a continuation with `on_completed`.
//! [`HandleFuture`] adapts it to `std::future::Future`. Resumption is
//! synchronous: the continuation runs on the call path that completed the
//! handle, so the future captures the result right there, before the handle
//! may release itself.

use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use super::{Handler, HandlerState};

/// Poll-once awaiter over a handle.
#[derive(Debug, Clone)]
pub struct Awaiter<H: Handler> {
    handler: H,
}

impl<H: Handler> Awaiter<H> {
    /// Wrap a handle
    #[must_use]
    pub const fn new(handler: H) -> Self {
        Self { handler }
    }

    /// Whether the handle reached `Success` or `Failed`
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.handler.is_done()
    }

    /// The handle's result
    #[must_use]
    pub fn get_result(&self) -> H::Output {
        self.handler.result()
    }

    /// Park `continuation` in the handle's single continuation slot
    pub fn on_completed(&self, continuation: impl FnOnce() + 'static) {
        self.handler.on_completed(Box::new(continuation));
    }
}

struct Completion<O> {
    result: Option<O>,
    waker: Option<Waker>,
}

/// `Future` over a handle, resolving to its result.
///
/// Occupies the handle's continuation slot once first polled while pending;
/// registering another continuation afterwards means this future never wakes.
/// A handle already released when polled resolves to the default output.
pub struct HandleFuture<H: Handler> {
    handler: H,
    completion: Rc<RefCell<Completion<H::Output>>>,
    registered: bool,
}

impl<H: Handler> HandleFuture<H> {
    /// Wrap a handle
    #[must_use]
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            completion: Rc::new(RefCell::new(Completion {
                result: None,
                waker: None,
            })),
            registered: false,
        }
    }
}

impl<H> Future for HandleFuture<H>
where
    H: Handler + Unpin + 'static,
    H::Output: 'static,
{
    type Output = H::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        if let Some(result) = this.completion.borrow_mut().result.take() {
            return Poll::Ready(result);
        }
        match this.handler.state() {
            HandlerState::Success | HandlerState::Failed => {
                return Poll::Ready(this.handler.result());
            }
            HandlerState::InValid => return Poll::Ready(H::Output::default()),
            HandlerState::Doing => {}
        }

        this.completion.borrow_mut().waker = Some(cx.waker().clone());
        if !this.registered {
            let handler = this.handler.clone();
            let completion = Rc::clone(&this.completion);
            this.handler.on_completed(Box::new(move || {
                let result = handler.result();
                let waker = {
                    let mut completion = completion.borrow_mut();
                    completion.result = Some(result);
                    completion.waker.take()
                };
                if let Some(waker) = waker {
                    waker.wake();
                }
            }));
            this.registered = true;
        }
        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::asset::{AssetCategory, Bytes, RawAsset};
    use crate::config::HandleConfig;
    use crate::context::AssetContext;
    use crate::handle::{AssetHandle, BatchAssetHandle};

    fn poll_once<F: Future + Unpin>(future: &mut F) -> Poll<F::Output> {
        let mut cx = Context::from_waker(Waker::noop());
        Pin::new(future).poll(&mut cx)
    }

    #[test]
    fn test_awaiter_protocol() {
        let ctx = AssetContext::new(HandleConfig::default());
        let handle = AssetHandle::<Bytes>::create(&ctx, "a", AssetCategory::InternalRawAsset);
        let awaiter = handle.get_awaiter();
        assert!(!awaiter.is_completed());

        let resumed = Rc::new(Cell::new(0));
        let counter = Rc::clone(&resumed);
        awaiter.on_completed(move || counter.set(counter.get() + 1));

        handle.set_asset(Some(RawAsset::bytes(vec![7_u8])));

        assert!(awaiter.is_completed());
        assert_eq!(resumed.get(), 1);
        assert_eq!(awaiter.get_result().as_deref(), Some(&[7_u8][..]));
    }

    #[test]
    fn test_future_resolves_after_completion() {
        let ctx = AssetContext::new(HandleConfig::default());
        let handle = AssetHandle::<Bytes>::create(&ctx, "a", AssetCategory::InternalRawAsset);
        let mut future = handle.clone().into_future();

        assert!(poll_once(&mut future).is_pending());
        assert!(poll_once(&mut future).is_pending());

        handle.set_asset(Some(RawAsset::bytes(vec![1_u8])));
        match poll_once(&mut future) {
            Poll::Ready(Some(bytes)) => assert_eq!(&*bytes, &[1_u8]),
            other => panic!("unexpected poll result: {other:?}"),
        }
    }

    #[test]
    fn test_future_sees_failure_after_self_release() {
        let ctx = AssetContext::new(HandleConfig::default());
        let handle = AssetHandle::<Bytes>::create(&ctx, "a", AssetCategory::InternalRawAsset);
        let mut future = handle.clone().into_future();
        assert!(poll_once(&mut future).is_pending());

        handle.set_asset(None);
        assert_eq!(handle.state(), HandlerState::InValid);
        assert!(matches!(poll_once(&mut future), Poll::Ready(None)));
    }

    #[test]
    fn test_batch_future_captures_members_before_release() {
        let ctx = AssetContext::new(HandleConfig::default());
        let batch = BatchAssetHandle::create(&ctx, 2);
        let a = batch.create_member("a", AssetCategory::InternalRawAsset);
        let b = batch.create_member("b", AssetCategory::InternalRawAsset);

        let mut future = batch.clone().into_future();
        assert!(poll_once(&mut future).is_pending());

        a.set_asset(Some(RawAsset::bytes(vec![0_u8])));
        b.set_asset(Some(RawAsset::bytes(vec![1_u8])));
        assert_eq!(batch.state(), HandlerState::InValid);

        match poll_once(&mut future) {
            Poll::Ready(members) => {
                assert_eq!(members.len(), 2);
                assert!(members[0].same_handle(&a));
            }
            Poll::Pending => panic!("batch future still pending"),
        }
    }

    #[test]
    fn test_empty_batch_future_resolves_empty() {
        let ctx = AssetContext::new(HandleConfig::default());
        let batch = BatchAssetHandle::create(&ctx, 0);
        assert_eq!(batch.state(), HandlerState::InValid);

        let mut future = batch.into_future();
        match poll_once(&mut future) {
            Poll::Ready(members) => assert!(members.is_empty()),
            Poll::Pending => panic!("empty batch future still pending"),
        }
    }

    #[test]
    fn test_overwritten_future_continuation_never_fires() {
        let ctx = AssetContext::new(HandleConfig::default());
        let handle = AssetHandle::<Bytes>::create(&ctx, "a", AssetCategory::InternalRawAsset);
        let mut future = handle.clone().into_future();
        assert!(poll_once(&mut future).is_pending());

        let replaced = Rc::new(Cell::new(false));
        let flag = Rc::clone(&replaced);
        handle.on_completed(Box::new(move || flag.set(true)));
        handle.set_asset(Some(RawAsset::bytes(vec![0_u8])));

        assert!(replaced.get());
        // The handle is still live, so the future falls back to reading it
        assert!(matches!(poll_once(&mut future), Poll::Ready(Some(_))));
    }
}
