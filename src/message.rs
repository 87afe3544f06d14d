//! Control messages the host page can send to the synchronizer.

/// A recognised control message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMessage {
    /// Promote a waiting installed instance to active immediately. The
    /// sender is responsible for reloading dependent pages.
    SkipWaiting,
    /// Fetch and store every resource not yet in the content cache.
    PrefetchAll,
}

impl ControlMessage {
    /// Parses a wire tag. Unrecognised tags yield `None` and are ignored.
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "skipWaiting" => Some(Self::SkipWaiting),
            "downloadOffline" => Some(Self::PrefetchAll),
            _ => None,
        }
    }

    /// Returns the wire tag for this message.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::SkipWaiting => "skipWaiting",
            Self::PrefetchAll => "downloadOffline",
        }
    }
}
