//! Backend capability flags.

/// Capabilities a [`super::Protocol`] backend may advertise.
///
/// The original carried these as a bitset; a fixed-size array indexed by
/// variant keeps the same O(1) check without pulling in a bitflags crate for
/// seven values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolFeature {
    AutoGetChatsOnLogin,
    TypingTimeout,
    EditWithinTwoDays,
    EditWithinFifteenMins,
    LimitedReactions,
    MarkReadEveryView,
    AutoGetContactsOnLogin,
}

impl ProtocolFeature {
    const ALL: [ProtocolFeature; 7] = [
        ProtocolFeature::AutoGetChatsOnLogin,
        ProtocolFeature::TypingTimeout,
        ProtocolFeature::EditWithinTwoDays,
        ProtocolFeature::EditWithinFifteenMins,
        ProtocolFeature::LimitedReactions,
        ProtocolFeature::MarkReadEveryView,
        ProtocolFeature::AutoGetContactsOnLogin,
    ];

    fn bit(self) -> u8 {
        ProtocolFeature::ALL
            .iter()
            .position(|f| *f == self)
            .expect("ALL enumerates every variant") as u8
    }
}

/// A set of [`ProtocolFeature`]s, stored as a small bitmask.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeatureSet(u8);

impl FeatureSet {
    pub fn empty() -> Self {
        Self(0)
    }

    pub fn with(mut self, feature: ProtocolFeature) -> Self {
        self.0 |= 1 << feature.bit();
        self
    }

    pub fn has(self, feature: ProtocolFeature) -> bool {
        (self.0 & (1 << feature.bit())) != 0
    }
}

impl FromIterator<ProtocolFeature> for FeatureSet {
    fn from_iter<I: IntoIterator<Item = ProtocolFeature>>(iter: I) -> Self {
        iter.into_iter().fold(FeatureSet::empty(), FeatureSet::with)
    }
}
