//! Identifier newtypes shared across the protocol.

use std::fmt;

/// A stable public identifier for a user.
///
/// Identities are derived from auth token claims on the server and survive
/// reconnection; they are opaque to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Identity([u8; 32]);

impl Identity {
    /// Creates an identity from raw bytes.
    #[must_use]
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Returns the raw bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// A per-connection identifier distinguishing concurrent connections from
/// the same [`Identity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ConnectionId([u8; 16]);

impl ConnectionId {
    /// Creates a connection id from raw bytes.
    #[must_use]
    pub const fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Returns the raw bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// Microseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Creates a timestamp from microseconds since the Unix epoch.
    #[must_use]
    pub const fn from_micros(micros: u64) -> Self {
        Self(micros)
    }

    /// Returns microseconds since the Unix epoch.
    #[must_use]
    pub const fn micros(self) -> u64 {
        self.0
    }
}

/// Energy consumed by a reducer run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct EnergyQuanta(u128);

impl EnergyQuanta {
    /// Creates an energy amount.
    #[must_use]
    pub const fn new(quanta: u128) -> Self {
        Self(quanta)
    }

    /// Returns the raw amount.
    #[must_use]
    pub const fn raw(self) -> u128 {
        self.0
    }
}

/// A client-generated correlation id for one reducer call request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct RequestId(u32);

impl RequestId {
    /// Creates a request id.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw id.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// A client-generated identifier for one subscribed query set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct QueryId(u32);

impl QueryId {
    /// Creates a query id.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw id.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_displays_as_hex() {
        let mut bytes = [0u8; 32];
        bytes[0] = 0xAB;
        bytes[31] = 0x01;
        let identity = Identity::new(bytes);
        let hex = identity.to_string();
        assert_eq!(hex.len(), 64);
        assert!(hex.starts_with("ab"));
        assert!(hex.ends_with("01"));
    }

    #[test]
    fn connection_id_displays_as_hex() {
        let id = ConnectionId::new([0xFF; 16]);
        assert_eq!(id.to_string(), "ff".repeat(16));
    }

    #[test]
    fn identity_equality_and_hash() {
        use std::collections::HashSet;
        let a = Identity::new([1; 32]);
        let b = Identity::new([1; 32]);
        let c = Identity::new([2; 32]);
        assert_eq!(a, b);
        assert_ne!(a, c);

        let mut set = HashSet::new();
        set.insert(a);
        set.insert(b);
        set.insert(c);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn timestamp_ordering() {
        assert!(Timestamp::from_micros(1) < Timestamp::from_micros(2));
        assert_eq!(Timestamp::from_micros(7).micros(), 7);
    }

    #[test]
    fn request_and_query_ids_round_trip_raw() {
        assert_eq!(RequestId::new(42).raw(), 42);
        assert_eq!(QueryId::new(7).raw(), 7);
    }

    #[test]
    fn ids_are_const_constructible() {
        const IDENTITY: Identity = Identity::new([0; 32]);
        const REQUEST: RequestId = RequestId::new(1);
        assert_eq!(IDENTITY.as_bytes(), &[0; 32]);
        assert_eq!(REQUEST.raw(), 1);
    }
}
