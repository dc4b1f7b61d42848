//! Storage traits.

use nudge_core::Account;

/// Account registration storage.
///
/// The dispatch core reads accounts through this interface and writes them
/// back whole (read-modify-write); it never creates or deletes devices.
pub trait AccountStore: Send + Sync {
    /// Look up an account by its identifier.
    fn account_by_identifier(
        &self,
        identifier: &str,
    ) -> color_eyre::eyre::Result<Option<Account>>;

    /// Persist an account and all of its devices.
    fn update(&self, account: &Account) -> color_eyre::eyre::Result<()>;
}
