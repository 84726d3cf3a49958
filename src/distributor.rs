//! Holder of the live scan request
//!
//! [`ScanStore`] is the single owner of a user's [`ScanRequest`]. Views read
//! it through [`ScanView`] and change it only through [`ScanStore::dispatch`].
//! Every effective change is persisted and pushed to subscribers.
use super::guard;
use super::persistence::SessionStore;
use super::reducer::{self, Action};
use super::request::{Phase, ScanRequest};

/// Read-only snapshot handed to views.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanView<'a> {
    pub state: &'a ScanRequest,
    pub is_blocking: bool,
    pub can_navigate: bool,
    pub is_processing: bool,
    pub has_error: bool,
}

impl<'a> ScanView<'a> {
    pub fn of(state: &'a ScanRequest) -> Self {
        Self {
            state,
            is_blocking: guard::is_blocking(state),
            can_navigate: guard::can_navigate_away(state),
            is_processing: state.effective_phase() == Phase::Processing,
            has_error: state.error.is_some(),
        }
    }
}

pub type Listener = Box<dyn FnMut(&ScanView<'_>)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

pub struct ScanStore {
    user_id: String,
    state: ScanRequest,
    persistence: Option<SessionStore>,
    listeners: Vec<(SubscriptionId, Listener)>,
    next_subscription: u64,
    skip_next_write: bool,
}

impl ScanStore {
    pub fn new(user_id: &str, persistence: Option<SessionStore>) -> Self {
        Self {
            user_id: user_id.to_string(),
            state: ScanRequest::idle(),
            persistence,
            listeners: vec![],
            next_subscription: 0,
            skip_next_write: false,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn state(&self) -> &ScanRequest {
        &self.state
    }

    pub fn view(&self) -> ScanView<'_> {
        ScanView::of(&self.state)
    }

    pub fn subscribe(&mut self, listener: Listener) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.listeners.push((id, listener));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) {
        self.listeners.retain(|(existing, _)| *existing != id);
    }

    /// Applies `action` and returns whether the request changed.
    pub fn dispatch(&mut self, action: Action) -> bool {
        let name = action.name();
        let next = reducer::reduce(&self.state, action);
        if next == self.state {
            tracing::trace!(action = name, phase = ?self.state.phase, "action had no effect");
            return false;
        }
        tracing::debug!(
            user_id = %self.user_id,
            action = name,
            from = ?self.state.phase,
            to = ?next.phase,
            "scan request transition"
        );
        self.state = next;
        self.persist();
        self.notify();
        true
    }

    /// Installs a request restored from storage. The write that would
    /// normally follow is skipped when `already_persisted` is set, since the
    /// stored copy is identical.
    pub fn hydrate(&mut self, state: ScanRequest, already_persisted: bool) -> bool {
        self.skip_next_write = already_persisted;
        let restored = self.dispatch(Action::RestoreState(Box::new(state)));
        self.skip_next_write = false;
        restored
    }

    fn persist(&mut self) {
        if self.skip_next_write {
            self.skip_next_write = false;
            return;
        }
        if let Some(persistence) = &self.persistence {
            persistence.save(&self.user_id, &self.state);
        }
    }

    fn notify(&mut self) {
        let view = ScanView::of(&self.state);
        for (_, listener) in self.listeners.iter_mut() {
            listener(&view);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::ImagePayload;
    use crate::transaction::TimeStamp;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn listeners_only_hear_effective_changes() {
        let mut store = ScanStore::new("u1", None);
        let seen = Rc::new(RefCell::new(vec![]));

        let sink = seen.clone();
        let id = store.subscribe(Box::new(move |view: &ScanView<'_>| {
            sink.borrow_mut().push(view.state.phase);
        }));

        assert!(store.dispatch(Action::StartSingle { at: TimeStamp::new() }));
        assert!(!store.dispatch(Action::StartBatch { at: TimeStamp::new() }));
        assert!(store.dispatch(Action::AddImage(ImagePayload::new("image/png", vec![1]))));
        store.unsubscribe(id);
        assert!(store.dispatch(Action::Cancel));

        assert_eq!(*seen.borrow(), vec![Phase::Capturing, Phase::Capturing]);
    }

    #[test]
    fn view_derives_flags() {
        let mut store = ScanStore::new("u1", None);
        store.dispatch(Action::StartSingle { at: TimeStamp::new() });
        store.dispatch(Action::AddImage(ImagePayload::new("image/png", vec![1])));
        store.dispatch(Action::ProcessStart);

        let view = store.view();
        assert!(view.is_processing);
        assert!(view.can_navigate);
        assert!(!view.is_blocking);
        assert!(!view.has_error);
    }
}
