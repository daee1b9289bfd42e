//! Reading position authority
//!
//! Only one reading position exists per book, so positions are never merged.
//! One side wins and the caller applies it. Two strategies decide which:
//!
//! - Device authority (text): the device that wrote a position is still in
//!   session, so its own copy on the server is stale by definition. Any
//!   other differing remote position is offered to the reader.
//! - Timestamp authority (audio): the newer position wins, local on a tie.

use crate::bookmarks::ReadingPosition;
use crate::location::LocationAnchor;

/// How the winning position is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionStrategy {
    DeviceAuthority,
    TimestampAuthority,
}

impl PositionStrategy {
    /// Strategy used for content of the anchor's variant
    pub fn for_anchor(anchor: &LocationAnchor) -> Self {
        match anchor {
            LocationAnchor::Text(_) => PositionStrategy::DeviceAuthority,
            LocationAnchor::Audio(_) => PositionStrategy::TimestampAuthority,
        }
    }
}

/// Which copy a comparison picked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionSource {
    Local,
    Remote,
}

/// What the caller should do with the remote position
#[derive(Debug, Clone, PartialEq)]
pub enum PositionDecision {
    /// Local position stays as is
    Keep,
    /// Ask the reader whether to jump to the remote position
    Prompt(ReadingPosition),
    /// Overwrite the local position with the remote one
    Restore(ReadingPosition),
}

/// Position comparison for one device
#[derive(Debug, Clone, Default)]
pub struct PositionReconciler {
    local_device_id: Option<String>,
}

impl PositionReconciler {
    pub fn new(local_device_id: Option<&str>) -> Self {
        Self {
            local_device_id: local_device_id
                .filter(|id| !id.is_empty())
                .map(str::to_string),
        }
    }

    /// Device authority: whether the server position should replace the local one.
    ///
    /// Locations are compared by their serialized locator strings, not
    /// semantically.
    pub fn should_adopt_remote(
        &self,
        server: Option<&ReadingPosition>,
        local: Option<&ReadingPosition>,
    ) -> bool {
        let Some(server) = server else {
            return false;
        };

        if let Some(local) = local {
            if server.is_from_device(self.local_device_id.as_deref()) {
                return false;
            }
            if local.location.serialize() == server.location.serialize() {
                return false;
            }
        }

        true
    }

    /// Timestamp authority: the newer of the two positions, local on a tie
    pub fn latest<'a>(
        local: Option<&'a ReadingPosition>,
        remote: Option<&'a ReadingPosition>,
    ) -> Option<(PositionSource, &'a ReadingPosition)> {
        match (local, remote) {
            (None, None) => None,
            (Some(local), None) => Some((PositionSource::Local, local)),
            (None, Some(remote)) => Some((PositionSource::Remote, remote)),
            (Some(local), Some(remote)) => {
                if remote.created_at > local.created_at {
                    Some((PositionSource::Remote, remote))
                } else {
                    Some((PositionSource::Local, local))
                }
            }
        }
    }

    /// Apply the strategy matching the content type of the positions
    pub fn resolve(
        &self,
        local: Option<&ReadingPosition>,
        remote: Option<&ReadingPosition>,
    ) -> PositionDecision {
        let Some(remote) = remote else {
            return PositionDecision::Keep;
        };
        if let Some(local) = local {
            if !local.location.same_variant(&remote.location) {
                tracing::warn!("Ignoring remote position of a different content type");
                return PositionDecision::Keep;
            }
        }
        if !remote.location.is_resolvable() {
            return PositionDecision::Keep;
        }

        match PositionStrategy::for_anchor(&remote.location) {
            PositionStrategy::DeviceAuthority => {
                if self.should_adopt_remote(Some(remote), local) {
                    PositionDecision::Prompt(remote.clone())
                } else {
                    PositionDecision::Keep
                }
            }
            PositionStrategy::TimestampAuthority => match Self::latest(local, Some(remote)) {
                Some((PositionSource::Remote, winner)) => PositionDecision::Restore(winner.clone()),
                _ => PositionDecision::Keep,
            },
        }
    }
}
