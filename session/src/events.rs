use crate::snapshot::SessionSnapshot;

/// Events broadcast from the session actor to all subscribers.
///
/// Each subscriber sees its events in mutation order. Teardown is signalled
/// by the channel closing, not by an event.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Full state snapshot after any mutation, never a diff.
    StateChanged(SessionSnapshot),
}
