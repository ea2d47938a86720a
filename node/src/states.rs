/// Node lifecycle state machine.
///
/// Transitions are linear, a node is never restarted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeState {
    /// Constructed, nothing started.
    #[default]
    Idle,

    /// Chain index and network started, not yet downloading.
    Starting,

    /// Backfilled and subscribed, sessions downloading.
    Running,

    /// Stop requested, no new work is handed out.
    Stopping,

    /// Resources released.
    Closed,
}

impl NodeState {
    /// Check if a transition to the target state is valid.
    ///
    /// Stopping is reachable from every state short of Closed, so that a
    /// node failing to start can still be torn down.
    pub fn can_transition_to(&self, target: NodeState) -> bool {
        match self {
            NodeState::Idle => matches!(target, NodeState::Starting | NodeState::Stopping),
            NodeState::Starting => matches!(target, NodeState::Running | NodeState::Stopping),
            NodeState::Running => matches!(target, NodeState::Stopping),
            NodeState::Stopping => matches!(target, NodeState::Closed),
            NodeState::Closed => false,
        }
    }
}
