//! Session events fired by the applier, in chain order.

use std::cell::{Cell, RefCell};

use cv_chain::{DeviceId, GroupId, ResourceId, UserId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The creation block of *this* device was applied.
    ThisDeviceRegistered(DeviceId),
    /// A (non-ghost) device of our user was created.
    DeviceCreated(DeviceId),
    /// A device of our user was revoked; carries the target.
    DeviceRevoked(DeviceId),
    KeyPublishReceived(ResourceId),
    GroupActionReceived(GroupId),
    ProvisionalIdentityClaimed(UserId),
}

/// Collects events in application order. The revoked flag latches when our
/// own device gets revoked; the session checks it before every operation.
#[derive(Default)]
pub struct EventSink {
    queue: RefCell<Vec<SessionEvent>>,
    revoked: Cell<bool>,
}

impl EventSink {
    pub fn push(&self, event: SessionEvent) {
        self.queue.borrow_mut().push(event);
    }

    pub fn drain(&self) -> Vec<SessionEvent> {
        std::mem::take(&mut *self.queue.borrow_mut())
    }

    pub fn mark_device_revoked(&self) {
        self.revoked.set(true);
    }

    pub fn device_is_revoked(&self) -> bool {
        self.revoked.get()
    }
}
