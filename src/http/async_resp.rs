//! Async response gatherer.
//!
//! # Responsibilities
//! - Share one `Response` between every sub-operation of a handler
//! - Finalize it exactly once, when the last share is released
//! - Run the success-only completion callback right before finalizing
//!
//! # Design Decisions
//! - Shares are counted explicitly: `Clone` increments, `Drop` decrements,
//!   reaching zero finalizes. There is no manual release call.
//! - `Rc`-based, so `!Send`: a gatherer cannot leave the event loop that
//!   created it and the response needs no lock
//! - Completion order of the shares is irrelevant

use std::cell::{Cell, RefCell, RefMut};
use std::future::Future;
use std::rc::Rc;

use axum::http::StatusCode;

use super::response::Response;

type Completion = Box<dyn FnOnce(&mut Response)>;

struct Shared {
    res: RefCell<Response>,
    shares: Cell<usize>,
    on_success: Cell<Option<Completion>>,
}

/// Reference-counted completion token around one `Response`.
pub struct AsyncResp {
    shared: Rc<Shared>,
}

impl AsyncResp {
    pub fn new(res: Response) -> Self {
        Self {
            shared: Rc::new(Shared {
                res: RefCell::new(res),
                shares: Cell::new(1),
                on_success: Cell::new(None),
            }),
        }
    }

    /// Gatherer whose `on_success` runs before finalizing if the final
    /// status is exactly 200 OK.
    pub fn with_completion(res: Response, on_success: impl FnOnce(&mut Response) + 'static) -> Self {
        let this = Self::new(res);
        this.on_success(on_success);
        this
    }

    /// Install or replace the success-only completion callback.
    pub fn on_success(&self, on_success: impl FnOnce(&mut Response) + 'static) {
        self.shared.on_success.set(Some(Box::new(on_success)));
    }

    /// Mutable access to the shared response.
    ///
    /// The guard must not be held across an `.await`.
    pub fn res(&self) -> RefMut<'_, Response> {
        self.shared.res.borrow_mut()
    }

    /// Outstanding shares, this one included.
    pub fn shares(&self) -> usize {
        self.shared.shares.get()
    }

    /// False once the connection that will receive the response is gone.
    /// Continuations should stop mutating and just drop their share.
    ///
    /// Reports `true` while a guard from [`AsyncResp::res`] is alive, since
    /// the writer cannot be reached through it; ask the guard instead.
    pub fn is_alive(&self) -> bool {
        match self.shared.res.try_borrow() {
            Ok(res) => res.is_alive(),
            Err(_) => true,
        }
    }

    /// Run `work` on the current `LocalSet` holding its own share.
    pub fn spawn<F, Fut>(&self, work: F)
    where
        F: FnOnce(AsyncResp) -> Fut,
        Fut: Future<Output = ()> + 'static,
    {
        tokio::task::spawn_local(work(self.clone()));
    }

    fn finalize(&self) {
        let Ok(mut res) = self.shared.res.try_borrow_mut() else {
            tracing::error!("Response still borrowed when the last share was released");
            return;
        };
        if std::thread::panicking() {
            res.set_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error");
        }
        if let Some(on_success) = self.shared.on_success.take() {
            if res.status() == StatusCode::OK {
                on_success(&mut res);
            } else {
                tracing::debug!(status = %res.status(), "Skipping completion callback");
            }
        }
        res.end();
    }
}

impl Clone for AsyncResp {
    fn clone(&self) -> Self {
        self.shared.shares.set(self.shared.shares.get() + 1);
        Self {
            shared: Rc::clone(&self.shared),
        }
    }
}

impl Drop for AsyncResp {
    fn drop(&mut self) {
        let remaining = self.shared.shares.get().saturating_sub(1);
        self.shared.shares.set(remaining);
        if remaining == 0 {
            self.finalize();
        }
    }
}

impl std::fmt::Debug for AsyncResp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncResp")
            .field("shares", &self.shares())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::response::testing::{body_string, Recorder};
    use rand::seq::SliceRandom;
    use serde_json::json;

    #[test]
    fn sends_once_after_last_share_in_any_order() {
        let mut rng = rand::thread_rng();
        for n in 0..=12 {
            for _ in 0..20 {
                let recorder = Recorder::default();
                let initial = AsyncResp::new(recorder.response());
                let mut shares: Vec<AsyncResp> = (0..n).map(|_| initial.clone()).collect();
                assert_eq!(initial.shares(), n + 1);

                drop(initial);
                if n == 0 {
                    assert_eq!(recorder.count(), 1);
                    continue;
                }

                shares.shuffle(&mut rng);
                while let Some(share) = shares.pop() {
                    assert_eq!(recorder.count(), 0);
                    drop(share);
                }
                assert_eq!(recorder.count(), 1);
            }
        }
    }

    #[test]
    fn synchronous_handler_sends_on_return() {
        let recorder = Recorder::default();
        let handler = |res: AsyncResp| {
            res.res().json_mut()["Name"] = json!("BIOS");
        };
        handler(AsyncResp::new(recorder.response()));
        assert_eq!(recorder.count(), 1);
    }

    #[tokio::test]
    async fn error_status_survives_and_skips_callback() {
        let recorder = Recorder::default();
        let called = Rc::new(Cell::new(false));
        let flag = called.clone();
        let initial = AsyncResp::with_completion(recorder.response(), move |_| flag.set(true));

        let a = initial.clone();
        let b = initial.clone();
        drop(initial);
        a.res().set_error(StatusCode::BAD_GATEWAY, "fan-out call failed");
        drop(a);
        b.res().set_status(StatusCode::OK);
        b.res().set_status(StatusCode::BAD_GATEWAY);
        drop(b);

        assert!(!called.get());
        let wire = recorder.take();
        assert_eq!(wire.status(), StatusCode::BAD_GATEWAY);
        assert!(body_string(wire).await.contains("fan-out call failed"));
    }

    #[tokio::test]
    async fn callback_fills_final_payload() {
        let recorder = Recorder::default();
        let members = Rc::new(RefCell::new(Vec::new()));
        let collected = members.clone();
        let initial = AsyncResp::with_completion(recorder.response(), move |res| {
            let members = collected.borrow();
            res.json_mut()["Members@odata.count"] = json!(members.len());
        });

        for i in 0..3 {
            let share = initial.clone();
            members.borrow_mut().push(i);
            drop(share);
        }
        drop(initial);

        assert_eq!(
            body_string(recorder.take()).await,
            r#"{"Members@odata.count":3}"#
        );
    }

    #[test]
    fn callback_only_runs_on_ok() {
        for status in [StatusCode::CREATED, StatusCode::ACCEPTED, StatusCode::NO_CONTENT] {
            let recorder = Recorder::default();
            let called = Rc::new(Cell::new(false));
            let flag = called.clone();
            let res = AsyncResp::with_completion(recorder.response(), move |_| flag.set(true));
            res.res().set_status(status);
            drop(res);

            assert!(!called.get(), "{status}");
            assert_eq!(recorder.take().status(), status);
        }

        let recorder = Recorder::default();
        let called = Rc::new(Cell::new(false));
        let flag = called.clone();
        drop(AsyncResp::with_completion(recorder.response(), move |_| flag.set(true)));
        assert!(called.get());
    }

    #[test]
    fn liveness_while_borrowed() {
        let recorder = Recorder::default();
        let res = AsyncResp::new(recorder.response());
        recorder.closed.set(true);
        assert!(!res.is_alive());
        {
            let guard = res.res();
            assert!(res.is_alive());
            assert!(!guard.is_alive());
        }
        drop(res);
        assert_eq!(recorder.count(), 0);
    }

    #[test]
    fn dead_connection_is_observable_and_nothing_is_written() {
        let recorder = Recorder::default();
        let initial = AsyncResp::new(recorder.response());
        let share = initial.clone();
        drop(initial);

        recorder.closed.set(true);
        assert!(!share.is_alive());
        drop(share);
        assert_eq!(recorder.count(), 0);
    }

    #[tokio::test]
    async fn spawned_work_holds_a_share() {
        let local = tokio::task::LocalSet::new();
        let recorder = Recorder::default();
        let sink = recorder.clone();

        local
            .run_until(async move {
                let res = AsyncResp::new(sink.response());
                for delay in [30u64, 10, 20] {
                    res.spawn(move |res| async move {
                        tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
                        let mut r = res.res();
                        let done = r.json()["Done"].as_u64().unwrap_or(0);
                        r.json_mut()["Done"] = json!(done + 1);
                    });
                }
                assert_eq!(res.shares(), 4);
                drop(res);
                assert_eq!(sink.count(), 0);
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            })
            .await;

        assert_eq!(recorder.count(), 1);
        assert_eq!(body_string(recorder.take()).await, r#"{"Done":3}"#);
    }
}
