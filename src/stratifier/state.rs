use super::*;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Subscription {
    pub(crate) extranonce1: String,
    pub(crate) user_agent: Option<String>,
}

/// Session progress. Subscribing and authorizing happen in either order, and
/// a session is active once both have.
#[derive(Debug, Clone, Default)]
pub(crate) struct State {
    subscription: Option<Subscription>,
    worker: Option<String>,
}

impl State {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn subscribe(&mut self, subscription: Subscription) -> bool {
        if self.subscription.is_some() {
            return false;
        }

        self.subscription = Some(subscription);
        true
    }

    /// Records the outcome of an authorize request. A failed attempt revokes
    /// an earlier authorization.
    pub(crate) fn authorize(&mut self, worker: Option<String>) {
        self.worker = worker;
    }

    pub(crate) fn subscription(&self) -> Option<&Subscription> {
        self.subscription.as_ref()
    }

    pub(crate) fn worker(&self) -> Option<&str> {
        self.worker.as_deref()
    }

    #[cfg(test)]
    fn is_active(&self) -> bool {
        self.subscription.is_some() && self.worker.is_some()
    }
}

impl Display for State {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match (&self.subscription, &self.worker) {
            (None, None) => write!(f, "Connected"),
            (Some(_), None) => write!(f, "Subscribed"),
            (None, Some(_)) => write!(f, "Authorized"),
            (Some(_), Some(_)) => write!(f, "Active"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subscription() -> Subscription {
        Subscription {
            extranonce1: "08000000".into(),
            user_agent: Some("cpuminer/2.5".into()),
        }
    }

    #[test]
    fn new_state_is_connected() {
        let state = State::new();

        assert!(state.subscription().is_none());
        assert!(state.worker().is_none());
        assert!(!state.is_active());
        assert_eq!(state.to_string(), "Connected");
    }

    #[test]
    fn subscribe_then_authorize() {
        let mut state = State::new();

        assert!(state.subscribe(subscription()));
        assert_eq!(state.to_string(), "Subscribed");
        assert!(!state.is_active());

        state.authorize(Some("addr.rig".into()));
        assert!(state.is_active());
        assert_eq!(state.worker(), Some("addr.rig"));
        assert_eq!(state.to_string(), "Active");
    }

    #[test]
    fn authorize_then_subscribe() {
        let mut state = State::new();

        state.authorize(Some("addr.rig".into()));
        assert_eq!(state.to_string(), "Authorized");
        assert!(!state.is_active());

        assert!(state.subscribe(subscription()));
        assert!(state.is_active());
    }

    #[test]
    fn resubscribe_is_rejected() {
        let mut state = State::new();

        assert!(state.subscribe(subscription()));
        assert!(!state.subscribe(Subscription {
            extranonce1: "cafebabe".into(),
            user_agent: None,
        }));

        assert_eq!(state.subscription(), Some(&subscription()));
    }

    #[test]
    fn failed_authorize_revokes() {
        let mut state = State::new();

        assert!(state.subscribe(subscription()));
        state.authorize(Some("addr.rig".into()));
        assert!(state.is_active());

        state.authorize(None);
        assert!(!state.is_active());
        assert_eq!(state.to_string(), "Subscribed");
    }
}
