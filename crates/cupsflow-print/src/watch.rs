// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Binds one request to the tokio reactor.
//
// The watch is a future: it waits for the socket readiness the request asks
// for, drives the request one step per readiness event, and fires the
// completion callback exactly once.  While a connection attempt is in flight
// the watch waits on that instead of a socket; failed attempts are retried
// on a timer.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::time::Sleep;
use tracing::debug;

use crate::request::CupsRequest;
use crate::result::CupsResult;
use crate::transport::{PollState, Transport};

/// Driver steps taken in one `poll` before yielding back to the runtime.
const STEP_BUDGET: usize = 32;

pub type CompletionCallback = Box<dyn FnOnce(CupsResult) + Send>;

/// Event-loop adapter for a [`CupsRequest`].
///
/// Resolves to the connection lent with
/// [`CupsRequest::with_connection`], if any.  Dropping an unfinished watch
/// drops the request with it, closing its socket; the callback is not called.
pub struct DispatchWatch {
    request: CupsRequest,
    callback: Option<CompletionCallback>,
    connect_retry: Duration,
    retry_timer: Option<Pin<Box<Sleep>>>,
}

impl DispatchWatch {
    pub fn new(
        request: CupsRequest,
        connect_retry: Duration,
        callback: impl FnOnce(CupsResult) + Send + 'static,
    ) -> Self {
        Self {
            request,
            callback: Some(Box::new(callback)),
            connect_retry,
            retry_timer: None,
        }
    }

    pub fn request(&self) -> &CupsRequest {
        &self.request
    }

    /// Drive the request when it is not waiting on the socket.  Returns true
    /// if the request is done and ready to dispatch.
    pub fn prepare(&mut self) -> bool {
        if self.request.poll_state() == PollState::Idle && !self.request.is_done() {
            return self.request.advance();
        }
        self.request.is_done()
    }

    /// Whether the socket has the readiness the request is waiting for, or
    /// the pending connection attempt has settled.  Registers the task for a
    /// wakeup otherwise.
    pub fn check(&mut self, cx: &mut Context<'_>) -> bool {
        if self.request.is_connecting() {
            return self.request.poll_connect(cx).is_ready();
        }
        let interest = self.request.poll_state();
        match self.request.transport_mut() {
            Some(transport) => transport.poll_ready(cx, interest).is_ready(),
            None => false,
        }
    }

    /// Run one driver step after `check` succeeded.  Fires the callback and
    /// returns true once the request is done.
    pub fn dispatch(&mut self) -> bool {
        if !self.request.advance() {
            return false;
        }
        self.complete();
        true
    }

    fn complete(&mut self) {
        if let Some(callback) = self.callback.take() {
            debug!(
                resource = %self.request.resource(),
                error = self.request.result().is_error(),
                "request complete"
            );
            callback(self.request.take_result());
        }
    }

    fn waiting_for_connection(&self) -> bool {
        !self.request.has_connection() && self.request.attempts() > 0
    }
}

impl Future for DispatchWatch {
    type Output = Option<Box<dyn Transport>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        for _ in 0..STEP_BUDGET {
            if this.request.is_done() {
                this.complete();
                return Poll::Ready(this.request.take_connection());
            }

            if this.request.poll_state() != PollState::Idle {
                if !this.check(cx) {
                    return Poll::Pending;
                }
                this.dispatch();
                continue;
            }

            if this.waiting_for_connection() {
                let retry = this.connect_retry;
                let timer = this
                    .retry_timer
                    .get_or_insert_with(|| Box::pin(tokio::time::sleep(retry)));
                if timer.as_mut().poll(cx).is_pending() {
                    return Poll::Pending;
                }
                this.retry_timer = None;
            }

            if this.prepare() {
                this.complete();
            }
        }

        cx.waker().wake_by_ref();
        Poll::Pending
    }
}

impl Drop for DispatchWatch {
    fn drop(&mut self) {
        if self.callback.is_some() {
            debug!(
                resource = %self.request.resource(),
                phase = ?self.request.phase(),
                "request cancelled"
            );
        }
    }
}
