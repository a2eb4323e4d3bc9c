//! Gateway session configuration.

use std::{fmt, ops::BitOr, time::Duration};

/// Event-type subscription bitmask sent on identify.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Intents(pub u32);

impl Intents {
    pub const GUILDS: Self = Self(1 << 0);
    pub const GUILD_MEMBERS: Self = Self(1 << 1);
    pub const DIRECT_MESSAGE: Self = Self(1 << 12);
    pub const GROUP_AND_C2C_EVENT: Self = Self(1 << 25);
    pub const PUBLIC_GUILD_MESSAGES: Self = Self(1 << 30);

    /// Raw bits.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Whether every bit of `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for Intents {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl Default for Intents {
    fn default() -> Self {
        Self::PUBLIC_GUILD_MESSAGES
            | Self::GROUP_AND_C2C_EVENT
            | Self::DIRECT_MESSAGE
            | Self::GUILD_MEMBERS
            | Self::GUILDS
    }
}

/// Shard descriptor `(index, count)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shard {
    pub index: u32,
    pub count: u32,
}

impl Default for Shard {
    fn default() -> Self {
        Self { index: 0, count: 1 }
    }
}

impl fmt::Display for Shard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.index, self.count)
    }
}

/// Gateway session configuration.
#[derive(Debug, Clone, Default)]
pub struct GatewayConfig {
    /// Subscribed event types.
    pub intents: Intents,
    /// Shard descriptor.
    pub shard: Shard,
    /// Pause between a close and the next connection attempt. Zero by default.
    pub reconnect_delay: Duration,
}
