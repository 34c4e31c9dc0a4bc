//! Directory account-control bitmask (`userAccountControl`).
//!
//! The raw attribute is an integer composed of independent bits. Decoding
//! tests each known bit explicitly; unknown bits are ignored.

use serde::{Deserialize, Serialize};

/// Account is disabled.
pub const ACCOUNT_DISABLED: u32 = 0x2;
/// Account is locked out after too many bad passwords.
pub const LOCKED_OUT: u32 = 0x10;
/// User must change the password at next logon.
pub const MUST_CHANGE_PASSWORD: u32 = 0x20;
/// User cannot change the password.
pub const CANNOT_CHANGE_PASSWORD: u32 = 0x40;
/// Default flag for a regular user account.
pub const NORMAL_ACCOUNT: u32 = 0x200;
/// Password never expires.
pub const PASSWORD_NEVER_EXPIRES: u32 = 0x10000;
/// Password has expired.
pub const PASSWORD_EXPIRED: u32 = 0x80_0000;

/// Labels produced by [`AccountControl::flags`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountFlag {
    Enabled,
    Disabled,
    PasswordExpired,
    PasswordNeverExpires,
    CannotChangePassword,
    MustChangePassword,
    LockedOut,
}

/// Optional bits in descending order, paired with their label.
const OPTIONAL_BITS: [(u32, AccountFlag); 5] = [
    (PASSWORD_EXPIRED, AccountFlag::PasswordExpired),
    (PASSWORD_NEVER_EXPIRES, AccountFlag::PasswordNeverExpires),
    (CANNOT_CHANGE_PASSWORD, AccountFlag::CannotChangePassword),
    (MUST_CHANGE_PASSWORD, AccountFlag::MustChangePassword),
    (LOCKED_OUT, AccountFlag::LockedOut),
];

/// A raw `userAccountControl` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountControl(pub u32);

impl AccountControl {
    /// A normal, enabled account (`512`).
    pub const fn enabled() -> Self {
        Self(NORMAL_ACCOUNT)
    }

    /// A normal, disabled account (`514`).
    pub const fn disabled() -> Self {
        Self(NORMAL_ACCOUNT | ACCOUNT_DISABLED)
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn is_disabled(self) -> bool {
        self.0 & ACCOUNT_DISABLED != 0
    }

    /// Decode into the active label set.
    ///
    /// The first label is always [`AccountFlag::Enabled`] or
    /// [`AccountFlag::Disabled`]; the remaining set bits follow in
    /// descending bit order.
    pub fn flags(self) -> Vec<AccountFlag> {
        let mut flags = Vec::with_capacity(OPTIONAL_BITS.len() + 1);
        flags.push(if self.is_disabled() {
            AccountFlag::Disabled
        } else {
            AccountFlag::Enabled
        });
        flags.extend(
            OPTIONAL_BITS
                .iter()
                .filter(|(bit, _)| self.0 & bit != 0)
                .map(|(_, flag)| *flag),
        );
        flags
    }
}

impl From<i32> for AccountControl {
    fn from(raw: i32) -> Self {
        Self(raw as u32)
    }
}

impl From<AccountControl> for i32 {
    fn from(value: AccountControl) -> Self {
        value.0 as i32
    }
}
