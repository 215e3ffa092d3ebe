use cloudpilot_core::domain::credentials::CredentialSet;
use cloudpilot_core::errors::CredentialError;

/// Holds at most one credential set for a session.
///
/// The broker is a pass-through: it never checks whether a set is valid. The
/// resource provider reports bad credentials on first use.
#[derive(Clone, Debug, Default)]
pub struct CredentialBroker {
    current: Option<CredentialSet>,
}

impl CredentialBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credentials(credentials: CredentialSet) -> Self {
        Self { current: Some(credentials) }
    }

    pub fn has_credentials(&self) -> bool {
        self.current.is_some()
    }

    pub fn get(&self) -> Result<&CredentialSet, CredentialError> {
        self.current.as_ref().ok_or(CredentialError::CredentialsRequired)
    }

    pub fn current(&self) -> Option<&CredentialSet> {
        self.current.as_ref()
    }

    /// Last write wins.
    pub fn supply(&mut self, credentials: CredentialSet) {
        self.current = Some(credentials);
    }

    pub fn clear(&mut self) {
        self.current = None;
    }
}

#[cfg(test)]
mod tests {
    use cloudpilot_core::domain::credentials::CredentialSet;
    use cloudpilot_core::errors::CredentialError;

    use super::CredentialBroker;

    fn credentials(key: &str) -> CredentialSet {
        CredentialSet::new(key, "wJalrXUtnFEMI/K7MDENG/bPxRfiCYEXAMPLEKEY", "us-east-1")
    }

    #[test]
    fn empty_broker_requires_credentials() {
        let broker = CredentialBroker::new();

        assert!(!broker.has_credentials());
        assert_eq!(broker.get().err(), Some(CredentialError::CredentialsRequired));
    }

    #[test]
    fn supplying_twice_keeps_the_last_set() {
        let mut broker = CredentialBroker::new();
        broker.supply(credentials("AKIAFIRST00000000001"));
        broker.supply(credentials("AKIASECOND0000000002"));

        assert!(broker.has_credentials());
        assert_eq!(broker.get().map(CredentialSet::access_key_id), Ok("AKIASECOND0000000002"));
    }

    #[test]
    fn clear_returns_to_absent() {
        let mut broker = CredentialBroker::with_credentials(credentials("AKIAFIRST00000000001"));
        broker.clear();

        assert!(!broker.has_credentials());
        assert!(broker.current().is_none());
    }
}
