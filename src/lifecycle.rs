//! Explicit view lifecycle for the zone-drawing view.
//!
//! Business logic reacts to lifecycle events instead of inspecting widget
//! visibility: activation resets the baseline retry budget and enables
//! pointer input; deactivation disables it.

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ViewState {
    #[default]
    Unmounted,
    Mounted,
    Active,
    Inactive,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleEvent {
    Mounted,
    Activated,
    Deactivated,
    Unmounted,
}

#[derive(Clone, Debug, Default)]
pub struct ViewLifecycle {
    state: ViewState,
}

impl ViewLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ViewState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == ViewState::Active
    }

    pub fn mount(&mut self) -> Option<LifecycleEvent> {
        self.transition(ViewState::Mounted)
    }

    pub fn activate(&mut self) -> Option<LifecycleEvent> {
        self.transition(ViewState::Active)
    }

    pub fn deactivate(&mut self) -> Option<LifecycleEvent> {
        self.transition(ViewState::Inactive)
    }

    pub fn unmount(&mut self) -> Option<LifecycleEvent> {
        self.transition(ViewState::Unmounted)
    }

    /// Applies a transition; returns the emitted event, or `None` when the
    /// transition is not allowed from the current state.
    fn transition(&mut self, to: ViewState) -> Option<LifecycleEvent> {
        use ViewState::*;
        let event = match (self.state, to) {
            (Unmounted, Mounted) => LifecycleEvent::Mounted,
            (Mounted | Inactive, Active) => LifecycleEvent::Activated,
            (Active, Inactive) => LifecycleEvent::Deactivated,
            (Mounted | Active | Inactive, Unmounted) => LifecycleEvent::Unmounted,
            _ => return None,
        };
        log::debug!("zone view {:?} -> {:?}", self.state, to);
        self.state = to;
        Some(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_tab_cycle() {
        let mut view = ViewLifecycle::new();
        assert_eq!(view.mount(), Some(LifecycleEvent::Mounted));
        assert_eq!(view.activate(), Some(LifecycleEvent::Activated));
        assert!(view.is_active());
        assert_eq!(view.deactivate(), Some(LifecycleEvent::Deactivated));
        assert_eq!(view.activate(), Some(LifecycleEvent::Activated));
        assert_eq!(view.unmount(), Some(LifecycleEvent::Unmounted));
        assert_eq!(view.state(), ViewState::Unmounted);
    }

    #[test]
    fn rejects_out_of_order_transitions() {
        let mut view = ViewLifecycle::new();
        assert_eq!(view.activate(), None);
        assert_eq!(view.deactivate(), None);
        view.mount();
        assert_eq!(view.mount(), None);
        assert_eq!(view.deactivate(), None);
        view.activate();
        assert_eq!(view.activate(), None);
        assert_eq!(view.state(), ViewState::Active);
    }
}
