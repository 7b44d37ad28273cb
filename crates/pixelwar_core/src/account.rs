//! # Accounts
//!
//! The identity a mutation is attributed to. The wallet layer that actually
//! holds keys lives outside this workspace; the engine only asks an
//! [`AccountProvider`] which address is connected right now.

use alloy_primitives::Address;
use parking_lot::RwLock;

/// Answers which account is currently connected.
pub trait AccountProvider: Send + Sync {
    /// The connected account, `None` when disconnected.
    fn current_account(&self) -> Option<Address>;
}

/// A switchable session account, set by whatever connects the wallet.
#[derive(Debug, Default)]
pub struct SessionAccount {
    address: RwLock<Option<Address>>,
}

impl SessionAccount {
    /// A session with no account connected.
    #[must_use]
    pub fn disconnected() -> Self {
        Self::default()
    }

    /// A session already connected to `address`.
    #[must_use]
    pub fn connected(address: Address) -> Self {
        Self {
            address: RwLock::new(Some(address)),
        }
    }

    /// Connects (or switches to) `address`.
    pub fn connect(&self, address: Address) {
        *self.address.write() = Some(address);
    }

    /// Drops the connected account.
    pub fn disconnect(&self) {
        *self.address.write() = None;
    }
}

impl AccountProvider for SessionAccount {
    fn current_account(&self) -> Option<Address> {
        *self.address.read()
    }
}

impl AccountProvider for Option<Address> {
    fn current_account(&self) -> Option<Address> {
        *self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_switching() {
        let session = SessionAccount::disconnected();
        assert_eq!(session.current_account(), None);

        session.connect(Address::repeat_byte(1));
        assert_eq!(session.current_account(), Some(Address::repeat_byte(1)));

        session.connect(Address::repeat_byte(2));
        assert_eq!(session.current_account(), Some(Address::repeat_byte(2)));

        session.disconnect();
        assert_eq!(session.current_account(), None);
    }
}
