//! Ticket store wrapper that injects transient failures.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::ticket::{
    CreateTicketRequest, Ticket, TicketError, TicketFilter, TicketStatus, TicketStore,
    TicketUpdate,
};

/// Delegates to an inner store, failing the next N calls with `Unavailable`.
pub struct FlakyTicketStore {
    inner: Arc<dyn TicketStore>,
    failures_left: AtomicUsize,
    injected: AtomicUsize,
}

impl FlakyTicketStore {
    pub fn new(inner: Arc<dyn TicketStore>) -> Self {
        Self {
            inner,
            failures_left: AtomicUsize::new(0),
            injected: AtomicUsize::new(0),
        }
    }

    /// Fail the next `n` store calls, whatever they are.
    pub fn fail_next(&self, n: usize) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    /// Failures injected so far.
    pub fn injected_failures(&self) -> usize {
        self.injected.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), TicketError> {
        let took = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if took {
            self.injected.fetch_add(1, Ordering::SeqCst);
            return Err(TicketError::Unavailable("injected failure".to_string()));
        }
        Ok(())
    }
}

impl TicketStore for FlakyTicketStore {
    fn create(&self, request: CreateTicketRequest) -> Result<Ticket, TicketError> {
        self.check()?;
        self.inner.create(request)
    }

    fn get(&self, id: &str) -> Result<Option<Ticket>, TicketError> {
        self.check()?;
        self.inner.get(id)
    }

    fn list(&self, filter: &TicketFilter) -> Result<Vec<Ticket>, TicketError> {
        self.check()?;
        self.inner.list(filter)
    }

    fn count(&self, filter: &TicketFilter) -> Result<i64, TicketError> {
        self.check()?;
        self.inner.count(filter)
    }

    fn update_if_status(
        &self,
        id: &str,
        expected: TicketStatus,
        update: TicketUpdate,
    ) -> Result<Ticket, TicketError> {
        self.check()?;
        self.inner.update_if_status(id, expected, update)
    }
}
