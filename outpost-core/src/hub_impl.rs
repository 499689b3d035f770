use std::cell::{OnceCell, RefCell};
use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::{Arc, LazyLock, PoisonError, RwLock, TryLockError};
use std::thread::{self, ThreadId};

use crate::scope::Stack;
use crate::{Client, Hub, Scope};

/// The process-wide hub, owned by the thread that first touched it.
struct ProcessHub {
    hub: Arc<Hub>,
    owner: ThreadId,
}

static PROCESS_HUB: LazyLock<ProcessHub> = LazyLock::new(|| ProcessHub {
    hub: Arc::new(Hub::new(None, Default::default())),
    owner: thread::current().id(),
});

thread_local! {
    /// A hub bound with [`Hub::run`] or a [`SwitchGuard`].
    static BOUND_HUB: RefCell<Option<Arc<Hub>>> = const { RefCell::new(None) };
    /// The hub this thread falls back to, derived from the process hub.
    static DERIVED_HUB: OnceCell<Arc<Hub>> = const { OnceCell::new() };
}

fn fallback_hub() -> Arc<Hub> {
    let process = &*PROCESS_HUB;
    if process.owner == thread::current().id() {
        return process.hub.clone();
    }
    DERIVED_HUB.with(|derived| {
        derived
            .get_or_init(|| Arc::new(Hub::new_from_top(&process.hub)))
            .clone()
    })
}

/// Installs a hub as the current one for as long as the guard lives.
///
/// The previously bound hub comes back when the guard is dropped.  Guards
/// touch thread-local state, so they cannot leave their thread.
pub struct SwitchGuard {
    previous: Option<Option<Arc<Hub>>>,
    _thread_bound: PhantomData<Rc<()>>,
}

impl SwitchGuard {
    /// Binds `hub` to the current thread.
    pub fn new(hub: Arc<Hub>) -> Self {
        let previous = BOUND_HUB.with(|bound| {
            let mut bound = bound.borrow_mut();
            if bound.as_ref().is_some_and(|current| Arc::ptr_eq(current, &hub)) {
                return None;
            }
            Some(bound.replace(hub))
        });
        SwitchGuard {
            previous,
            _thread_bound: PhantomData,
        }
    }
}

impl Drop for SwitchGuard {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            // dropping the hub may run arbitrary code, so release the borrow first
            let replaced =
                BOUND_HUB.with(|bound| std::mem::replace(&mut *bound.borrow_mut(), previous));
            drop(replaced);
        }
    }
}

/// The lock-protected layer stack of a [`Hub`].
#[derive(Debug)]
pub(crate) struct HubImpl {
    pub(crate) stack: Arc<RwLock<Stack>>,
}

impl HubImpl {
    pub(crate) fn from_stack(stack: Stack) -> Self {
        HubImpl {
            stack: Arc::new(RwLock::new(stack)),
        }
    }

    pub(crate) fn with<F: FnOnce(&Stack) -> R, R>(&self, f: F) -> R {
        f(&self.stack.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub(crate) fn with_mut<F: FnOnce(&mut Stack) -> R, R>(&self, f: F) -> R {
        f(&mut self.stack.write().unwrap_or_else(PoisonError::into_inner))
    }

    /// A stack that is already locked means a re-entrant call, for
    /// instance from a panic inside a scope callback.
    pub(crate) fn has_enabled_client(&self) -> bool {
        match self.stack.try_read() {
            Ok(stack) => stack.top().client.as_ref().is_some_and(|c| c.is_enabled()),
            Err(TryLockError::Poisoned(err)) => {
                let stack = err.into_inner();
                stack.top().client.as_ref().is_some_and(|c| c.is_enabled())
            }
            Err(TryLockError::WouldBlock) => false,
        }
    }
}

impl Hub {
    /// Creates a hub with a single layer holding `client` and `scope`.
    pub fn new(client: Option<Arc<Client>>, scope: Arc<Scope>) -> Hub {
        Hub {
            inner: HubImpl::from_stack(Stack::from_client_and_scope(client, scope)),
            last_event_id: RwLock::new(None),
        }
    }

    /// Creates a hub whose only layer is the top layer of `other`.
    ///
    /// The client is shared and the scope starts out as a copy.
    pub fn new_from_top<H: AsRef<Hub>>(other: H) -> Hub {
        let (client, scope) = other.as_ref().top();
        Hub::new(client, scope)
    }

    /// Returns the hub of the current thread.
    ///
    /// A hub bound with [`Hub::run`] wins.  Otherwise the thread that first
    /// touched the SDK uses the process hub ([`Hub::main`]), and every other
    /// thread lazily derives its own hub from the top layer of the process
    /// hub.
    pub fn current() -> Arc<Hub> {
        Hub::with(Arc::clone)
    }

    /// Returns the process hub.
    pub fn main() -> Arc<Hub> {
        PROCESS_HUB.hub.clone()
    }

    /// Calls `f` with the current hub.
    ///
    /// Cheaper than [`Hub::current`] when the hub is bound.
    pub fn with<F, R>(f: F) -> R
    where
        F: FnOnce(&Arc<Hub>) -> R,
    {
        match BOUND_HUB.with(|bound| bound.borrow().clone()) {
            Some(hub) => f(&hub),
            None => f(&fallback_hub()),
        }
    }

    /// Runs `f` with `hub` installed as the current hub.
    ///
    /// The previous hub is restored afterwards, also when `f` unwinds.
    pub fn run<F: FnOnce() -> R, R>(hub: Arc<Hub>, f: F) -> R {
        let _guard = SwitchGuard::new(hub);
        f()
    }

    /// Returns the client of the top layer.
    pub fn client(&self) -> Option<Arc<Client>> {
        self.top().0
    }

    /// Replaces the client of the top layer.
    pub fn bind_client(&self, client: Option<Arc<Client>>) {
        self.inner.with_mut(|stack| stack.top_mut().client = client)
    }

    pub(crate) fn is_active_and_usage_safe(&self) -> bool {
        self.inner.has_enabled_client()
    }

    /// Returns the client and scope of the top layer without holding the lock.
    pub(crate) fn top(&self) -> (Option<Arc<Client>>, Arc<Scope>) {
        self.inner.with(|stack| {
            let top = stack.top();
            (top.client.clone(), top.scope.clone())
        })
    }

    pub(crate) fn current_scope(&self) -> Arc<Scope> {
        self.top().1
    }

    pub(crate) fn with_current_scope_mut<F: FnOnce(&mut Scope) -> R, R>(&self, f: F) -> R {
        self.inner
            .with_mut(|stack| f(Arc::make_mut(&mut stack.top_mut().scope)))
    }
}
