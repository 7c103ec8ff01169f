// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
The dedicated presentation thread.

A [PresentThread] owns the native graphics context from the moment it is spawned.  Every
iteration of its loop does at most one of these, in priority order:

1. lend the context to a thread that asked for it with
   [PresentThread::with_main_thread_context], and wait for it to come back;
2. shut down, if asked;
3. apply one pending display-target change (uncustomize the old target, customize the
   new one), so swaps never happen mid-present.  A change waits in the queue until the
   context can be made current;
4. present the newest signaled frame of the active target, or wait a short while if
   there is none.

Failures inside a device hook are logged and cost at most the current frame; the loop
keeps running.

# Handoff

Lending the context is a two-party rendezvous.  The requester blocks until the thread has
released the context, runs its closure with the context current on its own thread, hands
it back, and waits until the thread holds it again.  The thread blocks until the context is
back before it does anything else.
Only one requester is served at a time; others queue on the same condition variable.

After the thread has terminated, the context is parked inside the `PresentThread`, and
[PresentThread::with_main_thread_context] runs its closure directly on the calling
thread.
*/

use crate::config::PresentConfig;
use crate::present::context::{ContextError, Current, GraphicsContext};
use crate::present::device::PresentError;
use crate::present::display::DisplayCore;
use std::collections::VecDeque;
use std::fmt::Debug;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{JoinHandle, ThreadId};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PresentPhase {
    /// No display target is bound.
    Idle,
    /// A target is bound and frames are being presented.
    Active,
    /// The context is lent to another thread.
    MainThreadHandoff,
    ShuttingDown,
    Terminated,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ShutdownError {
    #[error("present thread did not terminate within {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Handoff {
    None,
    Requested,
    Lent,
    Returned,
}

enum TargetChange {
    Activate(Arc<DisplayCore>),
    /// Deactivates the target with this id, if it is the active one.
    Deactivate(u64),
}

struct PendingChange {
    change: TargetChange,
    done: r#continue::Sender<Result<(), PresentError>>,
}

struct State {
    phase: PresentPhase,
    shutdown_requested: bool,
    handoff: Handoff,
    //the context whenever the thread does not hold it
    parked: Option<Box<dyn GraphicsContext>>,
    changes: VecDeque<PendingChange>,
    active_target: Option<String>,
    //a caller is using the parked context after termination
    fallback_busy: bool,
}

struct Shared {
    state: Mutex<State>,
    condvar: Condvar,
    thread_id: Mutex<Option<ThreadId>>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait_while<'a>(
        &self,
        guard: MutexGuard<'a, State>,
        condition: impl FnMut(&mut State) -> bool,
    ) -> MutexGuard<'a, State> {
        self.condvar
            .wait_while(guard, condition)
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn has_work(state: &State) -> bool {
        state.handoff == Handoff::Requested || state.shutdown_requested || !state.changes.is_empty()
    }
}

pub struct PresentThread {
    shared: Arc<Shared>,
    handle: Mutex<Option<JoinHandle<()>>>,
    shutdown_timeout: Duration,
}

impl Debug for PresentThread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PresentThread")
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}

impl PresentThread {
    /**
    Starts the thread, moving `context` onto it.

    Fails only if the OS refuses to create the thread.
    */
    pub fn spawn<C: GraphicsContext + 'static>(
        context: C,
        config: PresentConfig,
    ) -> std::io::Result<Arc<Self>> {
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                phase: PresentPhase::Idle,
                shutdown_requested: false,
                handoff: Handoff::None,
                parked: None,
                changes: VecDeque::new(),
                active_target: None,
                fallback_busy: false,
            }),
            condvar: Condvar::new(),
            thread_id: Mutex::new(None),
        });
        let shutdown_timeout = config.shutdown_timeout;
        let presenter = Presenter {
            shared: shared.clone(),
            context: Some(Box::new(context)),
            target: None,
            config: config.clone(),
        };
        let handle = std::thread::Builder::new()
            .name(config.thread_name.clone())
            .spawn(move || presenter.run())?;
        *shared
            .thread_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handle.thread().id());
        logwise::info_sync!(
            "present thread {name} started",
            name = logwise::privacy::LogIt(&config.thread_name)
        );
        Ok(Arc::new(PresentThread {
            shared,
            handle: Mutex::new(Some(handle)),
            shutdown_timeout,
        }))
    }

    pub fn phase(&self) -> PresentPhase {
        self.shared.lock().phase
    }

    pub fn is_running(&self) -> bool {
        !matches!(
            self.phase(),
            PresentPhase::ShuttingDown | PresentPhase::Terminated
        )
    }

    /// Name of the device currently bound, if any.
    pub fn active_target(&self) -> Option<String> {
        self.shared.lock().active_target.clone()
    }

    fn is_present_thread(&self) -> bool {
        let id = *self
            .shared
            .thread_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        id == Some(std::thread::current().id())
    }

    async fn submit_change(&self, change: TargetChange) -> Result<(), PresentError> {
        let receiver = {
            let mut state = self.shared.lock();
            if state.shutdown_requested || state.phase == PresentPhase::Terminated {
                return Err(PresentError::NotRunning);
            }
            let (done, receiver) = r#continue::continuation();
            state.changes.push_back(PendingChange { change, done });
            self.shared.condvar.notify_all();
            receiver
        };
        receiver.await
    }

    /// Binds `target`, replacing whatever is active.  Resolves once it is customized.
    pub(crate) async fn activate(&self, target: Arc<DisplayCore>) -> Result<(), PresentError> {
        self.submit_change(TargetChange::Activate(target)).await
    }

    /// Unbinds the target with `id` if it is the active one.  Resolves once it is uncustomized.
    pub(crate) async fn deactivate(&self, id: u64) -> Result<(), PresentError> {
        self.submit_change(TargetChange::Deactivate(id)).await
    }

    /**
    Runs `f` with the graphics context current on the calling thread.

    While the thread runs this is a rendezvous: the call blocks until the context has
    been lent, and the thread blocks until `f` returns.  Once the thread has terminated,
    `f` runs on the parked context directly.  Either way `f` always runs unless the
    context cannot be made current here.

    Must not be called from the present thread itself.
    */
    pub fn with_main_thread_context<R>(
        &self,
        f: impl FnOnce(&mut dyn GraphicsContext) -> R,
    ) -> Result<R, ContextError> {
        if self.is_present_thread() {
            logwise::error_sync!("with_main_thread_context called on the present thread");
            debug_assert!(false, "with_main_thread_context called on the present thread");
            return Err(ContextError::CurrentElsewhere);
        }
        let shared = &*self.shared;
        let mut state = shared.lock();
        loop {
            state = shared.wait_while(state, |s| {
                if s.phase == PresentPhase::Terminated {
                    s.fallback_busy
                } else {
                    s.handoff != Handoff::None
                }
            });
            if state.phase == PresentPhase::Terminated {
                let Some(context) = state.parked.take() else {
                    return Err(ContextError::Unavailable);
                };
                state.fallback_busy = true;
                drop(state);
                let mut lease = Lease {
                    shared,
                    context: Some(context),
                    rendezvous: false,
                };
                return lease.run(f);
            }
            state.handoff = Handoff::Requested;
            shared.condvar.notify_all();
            state = shared.wait_while(state, |s| {
                s.handoff == Handoff::Requested && s.phase != PresentPhase::Terminated
            });
            if state.handoff == Handoff::Lent {
                let Some(context) = state.parked.take() else {
                    state.handoff = Handoff::Returned;
                    shared.condvar.notify_all();
                    let _state = shared.wait_while(state, |s| s.handoff == Handoff::Returned);
                    return Err(ContextError::Unavailable);
                };
                drop(state);
                let mut lease = Lease {
                    shared,
                    context: Some(context),
                    rendezvous: true,
                };
                return lease.run(f);
            }
            //terminated before our request was served
            state.handoff = Handoff::None;
        }
    }

    /**
    Asks the thread to stop and waits for it.

    The thread serves a pending handoff, rejects pending target changes, uncustomizes the
    active target and parks the context.  If that takes longer than the configured
    timeout a warning is logged and [ShutdownError::Timeout] returned; the thread still
    finishes its teardown in the background.
    */
    pub fn shutdown(&self) -> Result<(), ShutdownError> {
        let mut state = self.shared.lock();
        state.shutdown_requested = true;
        self.shared.condvar.notify_all();
        let (state, timeout) = self
            .shared
            .condvar
            .wait_timeout_while(state, self.shutdown_timeout, |s| {
                s.phase != PresentPhase::Terminated
            })
            .unwrap_or_else(PoisonError::into_inner);
        drop(state);
        if timeout.timed_out() {
            logwise::warn_sync!(
                "present thread did not stop within {timeout}",
                timeout = logwise::privacy::LogIt(self.shutdown_timeout)
            );
            return Err(ShutdownError::Timeout(self.shutdown_timeout));
        }
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle
            && handle.join().is_err()
        {
            logwise::warn_sync!("present thread panicked");
        }
        Ok(())
    }

    /// Takes the parked context back once the thread has terminated.
    pub fn take_context(&self) -> Option<Box<dyn GraphicsContext>> {
        let mut state = self.shared.lock();
        if state.phase != PresentPhase::Terminated {
            return None;
        }
        state.parked.take()
    }
}

impl Drop for PresentThread {
    fn drop(&mut self) {
        if self.phase() != PresentPhase::Terminated {
            let _ = self.shutdown();
        }
    }
}

/// The requester's side of a handoff.  Returns the context even if `f` panics.
struct Lease<'a> {
    shared: &'a Shared,
    context: Option<Box<dyn GraphicsContext>>,
    rendezvous: bool,
}

impl Lease<'_> {
    fn run<R>(&mut self, f: impl FnOnce(&mut dyn GraphicsContext) -> R) -> Result<R, ContextError> {
        let Some(context) = self.context.as_mut() else {
            return Err(ContextError::Unavailable);
        };
        let mut current = Current::new(&mut **context)?;
        Ok(f(&mut *current))
    }
}

impl Drop for Lease<'_> {
    fn drop(&mut self) {
        let mut state = self.shared.lock();
        state.parked = self.context.take();
        if self.rendezvous {
            state.handoff = Handoff::Returned;
            self.shared.condvar.notify_all();
            //the present thread clears the handoff once it holds the context again
            let _state = self
                .shared
                .wait_while(state, |s| s.handoff == Handoff::Returned);
        } else {
            state.fallback_busy = false;
            self.shared.condvar.notify_all();
        }
    }
}

/// The thread's side.  Parks the context and reports termination when dropped.
struct Presenter {
    shared: Arc<Shared>,
    context: Option<Box<dyn GraphicsContext>>,
    target: Option<Arc<DisplayCore>>,
    config: PresentConfig,
}

impl Presenter {
    fn run(mut self) {
        let shared = self.shared.clone();
        loop {
            let mut state = shared.lock();
            if state.handoff == Handoff::Requested {
                self.lend(state);
                continue;
            }
            if state.shutdown_requested {
                state.phase = PresentPhase::ShuttingDown;
                let pending: Vec<_> = state.changes.drain(..).collect();
                drop(state);
                for change in pending {
                    change.done.send(Err(PresentError::NotRunning));
                }
                break;
            }
            let has_change = !state.changes.is_empty();
            drop(state);
            if has_change {
                self.apply_next();
                continue;
            }
            if self.target.is_some() {
                if !self.present_once() {
                    self.wait_for_work(self.config.frame_poll_interval);
                }
            } else {
                self.wait_for_work(self.config.idle_sleep);
            }
        }
        self.teardown();
    }

    fn wait_for_work(&self, timeout: Duration) {
        let state = self.shared.lock();
        let _ = self
            .shared
            .condvar
            .wait_timeout_while(state, timeout, |s| !Shared::has_work(s));
    }

    /// Waits until a handoff or shutdown is requested, or `timeout` passes.
    fn wait_for_retry(&self, timeout: Duration) {
        let state = self.shared.lock();
        let _ = self.shared.condvar.wait_timeout_while(state, timeout, |s| {
            s.handoff != Handoff::Requested && !s.shutdown_requested
        });
    }

    fn lend(&mut self, mut state: MutexGuard<'_, State>) {
        if let Some(context) = self.context.as_mut() {
            context.done_current();
        }
        let resume = state.phase;
        state.parked = self.context.take();
        state.handoff = Handoff::Lent;
        state.phase = PresentPhase::MainThreadHandoff;
        self.shared.condvar.notify_all();
        let mut state = self.shared.wait_while(state, |s| s.handoff == Handoff::Lent);
        self.context = state.parked.take();
        state.handoff = Handoff::None;
        state.phase = resume;
        self.shared.condvar.notify_all();
    }

    fn make_current(&mut self) -> Option<&mut dyn GraphicsContext> {
        let context = self.context.as_mut()?;
        if let Err(e) = context.make_current() {
            logwise::warn_sync!(
                "present thread could not make the context current: {err}",
                err = logwise::privacy::LogIt(&e)
            );
            return None;
        }
        Some(&mut **context)
    }

    /**
    Applies the oldest pending target change.

    A change is only dequeued once the context is current.  Otherwise it stays queued and
    is retried on the next iteration, so the old target is never dropped without being
    uncustomized.
    */
    fn apply_next(&mut self) {
        if self.make_current().is_none() {
            self.wait_for_retry(self.config.frame_poll_interval);
            return;
        }
        let Some(pending) = self.shared.lock().changes.pop_front() else {
            return;
        };
        let result = match pending.change {
            TargetChange::Activate(next) => self.swap_target(Some(next)),
            TargetChange::Deactivate(id) => {
                if self.target.as_ref().is_some_and(|t| t.id() == id) {
                    self.swap_target(None)
                } else {
                    Ok(())
                }
            }
        };
        let name = self.target.as_ref().map(|t| t.name().to_string());
        {
            let mut state = self.shared.lock();
            state.phase = if name.is_some() {
                PresentPhase::Active
            } else {
                PresentPhase::Idle
            };
            state.active_target = name;
        }
        pending.done.send(result);
    }

    /**
    Uncustomizes the old target and customizes `next`.  `next` stays unbound on failure.

    The context must already be current.
    */
    fn swap_target(&mut self, next: Option<Arc<DisplayCore>>) -> Result<(), PresentError> {
        let previous = self.target.take();
        let Some(context) = self.context.as_deref_mut() else {
            if let Some(previous) = previous {
                previous.abandon();
            }
            return Err(PresentError::Context(ContextError::Unavailable));
        };
        if let Some(previous) = previous {
            if let Err(e) = previous.uncustomize(context) {
                logwise::warn_sync!(
                    "uncustomize {name} failed: {err}",
                    name = logwise::privacy::LogIt(previous.name()),
                    err = logwise::privacy::LogIt(&e)
                );
            }
            logwise::info_sync!(
                "deactivated {name}",
                name = logwise::privacy::LogIt(previous.name())
            );
        }
        let Some(next) = next else {
            return Ok(());
        };
        match next.customize(context) {
            Ok(()) => {
                logwise::info_sync!(
                    "activated {name}",
                    name = logwise::privacy::LogIt(next.name())
                );
                self.target = Some(next);
                Ok(())
            }
            Err(e) => {
                logwise::warn_sync!(
                    "customize {name} failed: {err}",
                    name = logwise::privacy::LogIt(next.name()),
                    err = logwise::privacy::LogIt(&e)
                );
                Err(e)
            }
        }
    }

    /// Returns whether a frame was fetched.
    fn present_once(&mut self) -> bool {
        let Some(target) = self.target.clone() else {
            return false;
        };
        let Some(context) = self.make_current() else {
            return false;
        };
        target.present_next(context)
    }

    fn teardown(&mut self) {
        if let Some(target) = self.target.take() {
            match self.make_current() {
                Some(context) => {
                    if let Err(e) = target.uncustomize(context) {
                        logwise::warn_sync!(
                            "uncustomize {name} during shutdown failed: {err}",
                            name = logwise::privacy::LogIt(target.name()),
                            err = logwise::privacy::LogIt(&e)
                        );
                    }
                }
                None => {
                    logwise::warn_sync!(
                        "{name} is left customized; the context could not be made current",
                        name = logwise::privacy::LogIt(target.name())
                    );
                    target.abandon();
                }
            }
        }
        if let Some(context) = self.context.as_mut() {
            context.done_current();
        }
    }
}

impl Drop for Presenter {
    fn drop(&mut self) {
        if let Some(target) = self.target.take() {
            target.abandon();
        }
        let mut state = self.shared.lock();
        if let Some(context) = self.context.take() {
            state.parked = Some(context);
        }
        state.phase = PresentPhase::Terminated;
        state.active_target = None;
        //a handoff still waiting will fall back to the parked context
        if matches!(state.handoff, Handoff::Requested | Handoff::Returned) {
            state.handoff = Handoff::None;
        }
        self.shared.condvar.notify_all();
        drop(state);
        logwise::info_sync!("present thread stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::{PresentPhase, PresentThread};
    use crate::config::PresentConfig;
    use crate::headless::HeadlessContext;
    use std::time::Duration;

    fn config() -> PresentConfig {
        PresentConfig {
            shutdown_timeout: Duration::from_secs(2),
            ..Default::default()
        }
    }

    #[test]
    fn handoff_runs_on_the_calling_thread() {
        let context = HeadlessContext::new();
        let probe = context.clone();
        let thread = PresentThread::spawn(context, config()).unwrap();
        let here = std::thread::current().id();
        let result = thread
            .with_main_thread_context(|_| {
                assert_eq!(probe.current_thread(), Some(here));
                42
            })
            .unwrap();
        assert_eq!(result, 42);
        assert_ne!(thread.phase(), PresentPhase::MainThreadHandoff);
        thread.shutdown().unwrap();
        assert_eq!(thread.phase(), PresentPhase::Terminated);
    }

    #[test]
    fn handoff_after_shutdown_uses_the_parked_context() {
        let context = HeadlessContext::new();
        let probe = context.clone();
        let thread = PresentThread::spawn(context, config()).unwrap();
        thread.shutdown().unwrap();
        let calls = thread.with_main_thread_context(|_| probe.make_current_count());
        assert!(calls.unwrap() >= 1);
        assert!(!probe.is_current_anywhere());
        assert!(thread.take_context().is_some());
        assert!(thread.take_context().is_none());
    }

    #[test]
    fn panicking_closure_returns_the_context() {
        let thread = PresentThread::spawn(HeadlessContext::new(), config()).unwrap();
        let attempt = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            thread.with_main_thread_context(|_| -> i32 { panic!("boom") })
        }));
        assert!(attempt.is_err());
        assert_eq!(thread.with_main_thread_context(|_| 1).unwrap(), 1);
        thread.shutdown().unwrap();
    }

    #[test]
    fn shutdown_twice_is_fine() {
        let thread = PresentThread::spawn(HeadlessContext::new(), config()).unwrap();
        thread.shutdown().unwrap();
        thread.shutdown().unwrap();
        assert!(!thread.is_running());
    }
}
