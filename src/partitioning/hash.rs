//! Hash function selection for shard routing.
//!
//! A [`HashFunc`] is a cheap, copyable handle to a constructor of 64-bit hash
//! accumulators. Every routing decision builds a fresh accumulator, so the
//! digest of a key never depends on earlier calls.

use crate::error::Error;
use crc::{Crc, CRC_64_GO_ISO, CRC_64_XZ};
use std::fmt;
use std::hash::{BuildHasher, Hasher};
use std::str::FromStr;
use std::sync::OnceLock;
use twox_hash::XxHash64;

/// Constructor for a fresh 64-bit hash accumulator.
pub type NewHasher = fn() -> Box<dyn Hasher>;

/// CRC-64 with the ISO 3309 polynomial.
static CRC64_ISO_TABLE: Crc<u64> = Crc::<u64>::new(&CRC_64_GO_ISO);

/// CRC-64 with the ECMA-182 polynomial.
static CRC64_ECMA_TABLE: Crc<u64> = Crc::<u64>::new(&CRC_64_XZ);

/// Seed for [`HashFunc::RANDOM`], chosen once per process.
static PROCESS_SEED: OnceLock<u64> = OnceLock::new();

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// A named 64-bit hash strategy used to route keys to shards.
///
/// Implementations behind a `HashFunc` must be deterministic: the same bytes
/// fed to a fresh accumulator must always produce the same digest. A
/// non-deterministic constructor is not detected; it silently breaks
/// coalescing because identical keys stop landing on the same shard.
#[derive(Clone, Copy)]
pub struct HashFunc {
    name: &'static str,
    new_hasher: NewHasher,
}

impl HashFunc {
    /// FNV-1a, 64-bit. The default.
    pub const FNV64A: HashFunc = HashFunc::custom("fnv64a", new_fnv64a);

    /// FNV-1, 64-bit.
    pub const FNV64: HashFunc = HashFunc::custom("fnv64", new_fnv64);

    /// CRC-64 over the ISO polynomial.
    pub const CRC64_ISO: HashFunc = HashFunc::custom("crc64-iso", new_crc64_iso);

    /// CRC-64 over the ECMA-182 polynomial.
    pub const CRC64_ECMA: HashFunc = HashFunc::custom("crc64-ecma", new_crc64_ecma);

    /// xxHash64 with a zero seed.
    pub const XXHASH64: HashFunc = HashFunc::custom("xxhash64", new_xxhash64);

    /// xxHash64 keyed with a random per-process seed.
    ///
    /// Stable within a process but different across runs, which makes it
    /// hard for an attacker to craft keys that all collide onto one shard.
    pub const RANDOM: HashFunc = HashFunc::custom("random", new_random);

    /// Hash strategy used when none is configured.
    pub const DEFAULT: HashFunc = HashFunc::FNV64A;

    /// All built-in strategies.
    pub const BUILTIN: [HashFunc; 6] = [
        HashFunc::FNV64A,
        HashFunc::FNV64,
        HashFunc::CRC64_ISO,
        HashFunc::CRC64_ECMA,
        HashFunc::XXHASH64,
        HashFunc::RANDOM,
    ];

    /// Wrap a custom accumulator constructor.
    pub const fn custom(name: &'static str, new_hasher: NewHasher) -> Self {
        Self { name, new_hasher }
    }

    /// Get the strategy name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Build a fresh accumulator.
    pub fn new_hasher(&self) -> Box<dyn Hasher> {
        (self.new_hasher)()
    }

    /// Digest a byte sequence with a fresh accumulator.
    pub fn digest(&self, bytes: &[u8]) -> u64 {
        let mut hasher = self.new_hasher();
        hasher.write(bytes);
        hasher.finish()
    }
}

impl Default for HashFunc {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Debug for HashFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("HashFunc").field(&self.name).finish()
    }
}

impl fmt::Display for HashFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl FromStr for HashFunc {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HashFunc::BUILTIN
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| Error::UnknownHashFunc(s.to_string()))
    }
}

impl BuildHasher for HashFunc {
    type Hasher = Box<dyn Hasher>;

    fn build_hasher(&self) -> Self::Hasher {
        self.new_hasher()
    }
}

fn new_fnv64a() -> Box<dyn Hasher> {
    Box::new(fnv::FnvHasher::default())
}

fn new_fnv64() -> Box<dyn Hasher> {
    Box::new(Fnv1Hasher(FNV_OFFSET_BASIS))
}

fn new_crc64_iso() -> Box<dyn Hasher> {
    Box::new(Crc64Hasher::new(&CRC64_ISO_TABLE))
}

fn new_crc64_ecma() -> Box<dyn Hasher> {
    Box::new(Crc64Hasher::new(&CRC64_ECMA_TABLE))
}

fn new_xxhash64() -> Box<dyn Hasher> {
    Box::new(XxHash64::with_seed(0))
}

fn new_random() -> Box<dyn Hasher> {
    let seed = *PROCESS_SEED.get_or_init(rand::random::<u64>);
    Box::new(XxHash64::with_seed(seed))
}

/// FNV-1: multiply, then xor. The `fnv` crate only ships FNV-1a.
struct Fnv1Hasher(u64);

impl Hasher for Fnv1Hasher {
    fn write(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.0 = self.0.wrapping_mul(FNV_PRIME);
            self.0 ^= byte as u64;
        }
    }

    fn finish(&self) -> u64 {
        self.0
    }
}

/// Streams written bytes into a CRC-64 digest; `finish` finalizes a copy so
/// the accumulator can keep going.
struct Crc64Hasher {
    digest: crc::Digest<'static, u64>,
}

impl Crc64Hasher {
    fn new(crc: &'static Crc<u64>) -> Self {
        Self {
            digest: crc.digest(),
        }
    }
}

impl Hasher for Crc64Hasher {
    fn write(&mut self, bytes: &[u8]) {
        self.digest.update(bytes);
    }

    fn finish(&self) -> u64 {
        self.digest.clone().finalize()
    }
}
