//! Session identity carried across reconnects.

use serde::{Deserialize, Serialize};

/// Token allowing a new connection to resume a previous session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeToken {
    /// Session assigned by the gateway on `READY`.
    pub session_id: String,
    /// Last committed sequence number.
    pub sequence: u64,
}

/// Identity of one logical gateway session.
///
/// `sequence` never decreases; it starts absent for a brand-new session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdentity {
    session_id: String,
    sequence: Option<u64>,
}

impl SessionIdentity {
    /// Identity of a freshly identified session.
    #[must_use]
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            sequence: None,
        }
    }

    /// Session id.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Last committed sequence.
    #[must_use]
    pub const fn sequence(&self) -> Option<u64> {
        self.sequence
    }

    /// Record an observed sequence. Older values are ignored.
    ///
    /// Returns true if the stored sequence advanced.
    pub fn observe(&mut self, sequence: u64) -> bool {
        match self.sequence {
            Some(current) if current >= sequence => false,
            _ => {
                self.sequence = Some(sequence);
                true
            }
        }
    }

    /// Token for resuming this session, if any sequence was seen.
    #[must_use]
    pub fn resume_token(&self) -> Option<ResumeToken> {
        self.sequence.map(|sequence| ResumeToken {
            session_id: self.session_id.clone(),
            sequence,
        })
    }
}

impl From<ResumeToken> for SessionIdentity {
    fn from(token: ResumeToken) -> Self {
        Self {
            session_id: token.session_id,
            sequence: Some(token.sequence),
        }
    }
}
