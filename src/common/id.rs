//! Kademlia node Id or a lookup target
use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::{
    fmt::{self, Debug, Display, Formatter},
    str::FromStr,
};

use crate::{common::Contact, Error, Result};

/// The size of node IDs in bytes.
pub const ID_SIZE: usize = 20;
/// The widest keyspace an [Id] can represent, in bits.
pub const MAX_BIT_LENGTH: usize = ID_SIZE * 8;

#[derive(Clone, Copy, PartialEq, Ord, PartialOrd, Eq, Hash, Default)]
/// Kademlia node Id or a lookup target.
///
/// Stored as a big-endian unsigned integer, so the derived ordering is the
/// integer ordering. Keyspaces narrower than [MAX_BIT_LENGTH] use only the
/// low `bit_length` bits.
pub struct Id(pub [u8; ID_SIZE]);

impl Id {
    /// The all-zero id.
    pub const ZERO: Id = Id([0; ID_SIZE]);

    /// Random id within a keyspace of `bit_length` bits.
    pub fn random(bit_length: usize) -> Id {
        let mut rng = rand::thread_rng();
        let random_bytes: [u8; ID_SIZE] = rng.gen();

        Id(random_bytes).truncate(bit_length)
    }

    /// Create a new Id from some bytes. Returns Err if `bytes` is not of length
    /// [ID_SIZE].
    pub fn from_bytes<T: AsRef<[u8]>>(bytes: T) -> Result<Id> {
        let bytes = bytes.as_ref();
        if bytes.len() != ID_SIZE {
            return Err(Error::InvalidId(format!(
                "expected {ID_SIZE} bytes, got {}",
                bytes.len()
            )));
        }

        let mut tmp: [u8; ID_SIZE] = [0; ID_SIZE];
        tmp.copy_from_slice(bytes);

        Ok(Id(tmp))
    }

    /// SHA-1 digest of `data`, covering the full 160 bit keyspace.
    ///
    /// Use [crate::Config::key_for] to derive a key for a narrower keyspace.
    pub fn hash<T: AsRef<[u8]>>(data: T) -> Id {
        Id(sha1_smol::Sha1::from(data).digest().bytes())
    }

    pub fn as_bytes(&self) -> &[u8; ID_SIZE] {
        &self.0
    }

    /// XOR of two ids, which is their distance in the Kademlia metric.
    pub fn xor(&self, other: &Id) -> Id {
        let mut result = [0_u8; ID_SIZE];

        for (i, byte) in result.iter_mut().enumerate() {
            *byte = self.0[i] ^ other.0[i];
        }

        Id(result)
    }

    /// Number of significant bits, `0` for [Id::ZERO].
    pub fn bitsize(&self) -> usize {
        for (i, byte) in self.0.iter().enumerate() {
            if *byte != 0 {
                return MAX_BIT_LENGTH - (i * 8 + byte.leading_zeros() as usize);
            }
        }

        0
    }

    /// Keep only the low `bit_length` bits.
    pub fn truncate(mut self, bit_length: usize) -> Id {
        let cleared = MAX_BIT_LENGTH.saturating_sub(bit_length);

        for (i, byte) in self.0.iter_mut().enumerate() {
            let start = i * 8;

            if start + 8 <= cleared {
                *byte = 0;
            } else if start < cleared {
                *byte &= 0xff >> (cleared - start);
            }
        }

        self
    }

    /// Returns `true` if this id fits in a keyspace of `bit_length` bits.
    pub fn fits(&self, bit_length: usize) -> bool {
        self.bitsize() <= bit_length
    }

    /// Low 64 bits of this id.
    pub fn low_u64(&self) -> u64 {
        let mut tail = [0_u8; 8];
        tail.copy_from_slice(&self.0[ID_SIZE - 8..]);

        u64::from_be_bytes(tail)
    }
}

impl From<u64> for Id {
    fn from(value: u64) -> Self {
        let mut bytes = [0_u8; ID_SIZE];
        bytes[ID_SIZE - 8..].copy_from_slice(&value.to_be_bytes());

        Id(bytes)
    }
}

/// XOR distance between two ids, interpreted as an unsigned integer.
pub fn xor_distance(a: &Id, b: &Id) -> Id {
    a.xor(b)
}

/// Number of leading bits `a` and `b` have in common within a keyspace of
/// `bit_length` bits.
///
/// Identical ids share all `bit_length` bits. Ids outside the keyspace
/// saturate at `0`.
pub fn shared_prefix_bit_length(a: &Id, b: &Id, bit_length: usize) -> usize {
    bit_length.saturating_sub(a.xor(b).bitsize())
}

/// The contact closest to `id`. Ties go to the first one in `contacts`.
pub fn select_closest<'a, I>(id: &Id, contacts: I) -> Option<&'a Contact>
where
    I: IntoIterator<Item = &'a Contact>,
{
    let mut closest: Option<(&Contact, Id)> = None;

    for contact in contacts {
        let distance = contact.id().xor(id);

        match closest {
            Some((_, best)) if best <= distance => {}
            _ => closest = Some((contact, distance)),
        }
    }

    closest.map(|(contact, _)| contact)
}

/// Stable ascending sort of `contacts` by their distance to `id`.
pub fn sort_by_distance(id: &Id, contacts: &mut [Contact]) {
    contacts.sort_by_cached_key(|contact| contact.id().xor(id));
}

impl Display for Id {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl Debug for Id {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Id({})", self)
    }
}

impl FromStr for Id {
    type Err = Error;

    fn from_str(s: &str) -> Result<Id> {
        if s.len() % 2 != 0 {
            return Err(Error::InvalidId(format!("odd length hex string: {s:?}")));
        }

        let bytes = hex::decode(s).map_err(|error| Error::InvalidId(error.to_string()))?;

        if bytes.len() > ID_SIZE {
            return Err(Error::InvalidId(format!(
                "expected at most {ID_SIZE} bytes, got {}",
                bytes.len()
            )));
        }

        // Short strings are left-padded, so "3f" is the id 63.
        let mut tmp = [0_u8; ID_SIZE];
        tmp[ID_SIZE - bytes.len()..].copy_from_slice(&bytes);

        Ok(Id(tmp))
    }
}

impl Serialize for Id {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Id {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Id, D::Error> {
        let s = String::deserialize(deserializer)?;

        Id::from_str(&s).map_err(serde::de::Error::custom)
    }
}
