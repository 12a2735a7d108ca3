//! Stable identities for classes and their members.
//!
//! Every id is an FNV-1a 64-bit hash of a kind-prefixed name:
//!
//! ```text
//! ClassId     fnv1a64("class:Part")
//! PropertyId  fnv1a64("property:Part.Size")
//! EventId     fnv1a64("event:Instance.ChildAdded")
//! MethodId    fnv1a64("method:Instance.FindFirstChild")
//! ```
//!
//! Ids depend on names only, so they are identical across builds and can be
//! persisted by layers built on top of the runtime.

use std::fmt;

use serde::{Deserialize, Serialize};

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// FNV-1a, 64-bit.
pub const fn fnv1a64(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET_BASIS;
    let mut i = 0;
    while i < bytes.len() {
        hash ^= bytes[i] as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
        i += 1;
    }
    hash
}

fn hash_parts(parts: &[&str]) -> u64 {
    let mut hash = FNV_OFFSET_BASIS;
    for part in parts {
        for &byte in part.as_bytes() {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(FNV_PRIME);
        }
    }
    hash
}

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            pub const fn raw(self) -> u64 {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({:#018x})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:#018x}", self.0)
            }
        }
    };
}

id_type!(
    /// Identity of a registered class.
    ClassId
);
id_type!(
    /// Identity of a reflected property, unique within a class lineage.
    PropertyId
);
id_type!(EventId);
id_type!(MethodId);

impl ClassId {
    pub fn of(class: &str) -> Self {
        ClassId(hash_parts(&["class:", class]))
    }
}

impl PropertyId {
    pub fn of(class: &str, property: &str) -> Self {
        PropertyId(hash_parts(&["property:", class, ".", property]))
    }
}

impl EventId {
    pub fn of(class: &str, event: &str) -> Self {
        EventId(hash_parts(&["event:", class, ".", event]))
    }
}

impl MethodId {
    pub fn of(class: &str, method: &str) -> Self {
        MethodId(hash_parts(&["method:", class, ".", method]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fnv_reference_vectors() {
        assert_eq!(fnv1a64(b""), 0xcbf2_9ce4_8422_2325);
        assert_eq!(fnv1a64(b"a"), 0xaf63_dc4c_8601_ec8c);
        assert_eq!(fnv1a64(b"foobar"), 0x8594_4171_f739_67e8);
    }

    #[test]
    fn split_hash_matches_whole_string() {
        assert_eq!(ClassId::of("Part").raw(), fnv1a64(b"class:Part"));
        assert_eq!(
            PropertyId::of("Instance", "Name").raw(),
            fnv1a64(b"property:Instance.Name")
        );
    }

    #[test]
    fn kinds_do_not_collide() {
        assert_ne!(
            PropertyId::of("Instance", "Parent").raw(),
            EventId::of("Instance", "Parent").raw()
        );
        assert_ne!(
            PropertyId::of("Instance", "Name"),
            PropertyId::of("World", "Name")
        );
    }
}
