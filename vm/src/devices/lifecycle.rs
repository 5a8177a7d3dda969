/// Lifecycle of a host device driven by a guest format register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState<C> {
    Absent,
    Active(C),
    /// Initialization failed once; the subsystem stays off for the session.
    Disabled,
}

impl<C> Default for DeviceState<C> {
    fn default() -> Self {
        Self::Absent
    }
}

impl<C: Copy + PartialEq> DeviceState<C> {
    pub fn config(&self) -> Option<C> {
        match self {
            DeviceState::Active(config) => Some(*config),
            _ => None,
        }
    }
}

/// Decides the next state for a newly written configuration. The flag is
/// `true` when the host device has to be torn down and/or recreated.
pub fn next_state<C: Copy + PartialEq>(
    current: DeviceState<C>,
    new_config: Option<C>,
) -> (DeviceState<C>, bool) {
    match (current, new_config) {
        (DeviceState::Disabled, _) => (DeviceState::Disabled, false),
        (DeviceState::Active(old), Some(new)) if old == new => (DeviceState::Active(old), false),
        (_, Some(new)) => (DeviceState::Active(new), true),
        (DeviceState::Active(_), None) => (DeviceState::Absent, true),
        (DeviceState::Absent, None) => (DeviceState::Absent, false),
    }
}
