// Copyright 2025 The Skiff Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Skiff ID types.
//!
//! ID hierarchy:
//! - `JobID` (4 bytes)
//! - `ActorID` (16 bytes = 12 unique + 4 JobID)
//! - `TaskID` (24 bytes = 8 unique + 16 ActorID)
//! - `ObjectID` (30 bytes = 4 index + 2 flags + 24 TaskID)
//! - `UniqueID` / `WorkerID` / `NodeID` (28 bytes)
//!
//! An ObjectID's flags word encodes the object kind (task return vs. put)
//! and the transport type of the task that produces it. The transport tag
//! is the sole dispatcher between the in-process memory store and the
//! shared plasma store.

use std::fmt;
use std::hash::{Hash, Hasher};

use crate::constants::UNIQUE_ID_SIZE;

// ─── MurmurHash64A ──────────────────────────────────────────────────────────
// Deterministic across languages and processes; IDs derived from hashes must
// agree between the driver and every worker.

fn murmur_hash_64a(key: &[u8], seed: u64) -> u64 {
    const M: u64 = 0xc6a4a7935bd1e995;
    const R: i32 = 47;

    let len = key.len();
    let mut h: u64 = seed ^ ((len as u64).wrapping_mul(M));

    let n_blocks = len / 8;
    for i in 0..n_blocks {
        let offset = i * 8;
        let mut k = u64::from_le_bytes(key[offset..offset + 8].try_into().unwrap());

        k = k.wrapping_mul(M);
        k ^= k >> R;
        k = k.wrapping_mul(M);

        h ^= k;
        h = h.wrapping_mul(M);
    }

    let tail = &key[n_blocks * 8..];
    let remaining = len & 7;
    if remaining >= 7 {
        h ^= (tail[6] as u64) << 48;
    }
    if remaining >= 6 {
        h ^= (tail[5] as u64) << 40;
    }
    if remaining >= 5 {
        h ^= (tail[4] as u64) << 32;
    }
    if remaining >= 4 {
        h ^= (tail[3] as u64) << 24;
    }
    if remaining >= 3 {
        h ^= (tail[2] as u64) << 16;
    }
    if remaining >= 2 {
        h ^= (tail[1] as u64) << 8;
    }
    if remaining >= 1 {
        h ^= tail[0] as u64;
        h = h.wrapping_mul(M);
    }

    h ^= h >> R;
    h = h.wrapping_mul(M);
    h ^= h >> R;

    h
}

// ─── Transport type ─────────────────────────────────────────────────────────

/// How a task (and therefore its return objects) travels: through the local
/// raylet, or directly between workers. The tag is embedded in each ObjectID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TransportType {
    Raylet = 0,
    Direct = 1,
}

impl TransportType {
    fn from_flag_bits(bits: u16) -> Self {
        if bits == 1 {
            TransportType::Direct
        } else {
            TransportType::Raylet
        }
    }
}

// ─── ID macro ───────────────────────────────────────────────────────────────

/// Generates a fixed-size Skiff ID type.
///
/// Each ID is a `[u8; N]` newtype with:
/// - `from_binary` / `from_hex` / `from_random` constructors
/// - `binary()` / `hex()` / `data()` accessors
/// - `Hash`, `Eq`, `PartialEq`, `Clone`, `Copy`, `Debug`, `Display`
/// - `nil()` default (all 0xFF bytes)
macro_rules! define_skiff_id {
    ($name:ident, $size:expr) => {
        #[derive(Clone, Copy)]
        #[repr(C)]
        pub struct $name {
            data: [u8; $size],
        }

        impl $name {
            /// The fixed byte size of this ID type.
            pub const SIZE: usize = $size;

            /// Create a nil ID (all 0xFF bytes).
            pub const fn nil() -> Self {
                Self {
                    data: [0xFF; $size],
                }
            }

            /// Create an ID from raw bytes. Panics if `bytes.len() != SIZE`.
            pub fn from_binary(bytes: &[u8]) -> Self {
                assert_eq!(
                    bytes.len(),
                    $size,
                    "expected {} bytes for {}, got {}",
                    $size,
                    stringify!($name),
                    bytes.len()
                );
                let mut data = [0u8; $size];
                data.copy_from_slice(bytes);
                Self { data }
            }

            /// Create an ID from a hex string. Returns `nil` on invalid input.
            pub fn from_hex(hex_str: &str) -> Self {
                if hex_str.len() != $size * 2 {
                    tracing::error!(
                        "incorrect hex string length for {}: expected {}, got {}",
                        stringify!($name),
                        $size * 2,
                        hex_str.len()
                    );
                    return Self::nil();
                }
                match hex::decode(hex_str) {
                    Ok(bytes) => Self::from_binary(&bytes),
                    Err(_) => {
                        tracing::error!("invalid hex string for {}", stringify!($name));
                        Self::nil()
                    }
                }
            }

            /// Create a random ID.
            pub fn from_random() -> Self {
                let mut data = [0u8; $size];
                skiff_util::random::fill_random(&mut data);
                Self { data }
            }

            /// Returns true if this is the nil ID (all 0xFF).
            pub fn is_nil(&self) -> bool {
                self.data == [0xFF; $size]
            }

            /// Raw byte array reference.
            pub fn data(&self) -> &[u8; $size] {
                &self.data
            }

            /// Raw bytes as `&[u8]`.
            pub fn as_bytes(&self) -> &[u8] {
                &self.data
            }

            /// Binary string (owned copy of the bytes).
            pub fn binary(&self) -> Vec<u8> {
                self.data.to_vec()
            }

            /// Hex-encoded string (lowercase).
            pub fn hex(&self) -> String {
                hex::encode(self.data)
            }

            /// Compute MurmurHash64A of the ID bytes.
            pub fn murmur_hash(&self) -> u64 {
                murmur_hash_64a(&self.data, 0)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::nil()
            }
        }

        impl PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                self.data == other.data
            }
        }

        impl Eq for $name {}

        impl Hash for $name {
            fn hash<H: Hasher>(&self, state: &mut H) {
                self.murmur_hash().hash(state);
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.hex())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.hex())
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.data
            }
        }
    };
}

// ─── ID type definitions ────────────────────────────────────────────────────

define_skiff_id!(UniqueID, UNIQUE_ID_SIZE);

// JobID: 4 bytes
define_skiff_id!(JobID, 4);

// ActorID: 16 bytes (12 unique + 4 JobID)
define_skiff_id!(ActorID, 16);

// TaskID: 24 bytes (8 unique + 16 ActorID)
define_skiff_id!(TaskID, 24);

// ObjectID: 30 bytes (4 index + 2 flags + 24 TaskID)
define_skiff_id!(ObjectID, 30);

define_skiff_id!(WorkerID, UNIQUE_ID_SIZE);
define_skiff_id!(NodeID, UNIQUE_ID_SIZE);

// ─── JobID extras ───────────────────────────────────────────────────────────

impl JobID {
    /// Create a JobID from a u32 integer.
    pub fn from_int(value: u32) -> Self {
        Self {
            data: value.to_be_bytes(),
        }
    }

    /// Convert to a u32 integer.
    pub fn to_int(&self) -> u32 {
        u32::from_be_bytes(self.data)
    }
}

// ─── ActorID extras ─────────────────────────────────────────────────────────

impl ActorID {
    const UNIQUE_BYTES_LENGTH: usize = 12;

    /// Create an ActorID from a job ID and the creating task's lineage.
    /// Deterministic: every process that knows (job, parent task, counter)
    /// computes the same actor ID.
    pub fn of(job_id: &JobID, parent_task_id: &TaskID, parent_task_counter: u64) -> Self {
        let mut data = [0u8; 16];

        let mut hash_input = Vec::with_capacity(TaskID::SIZE + 8);
        hash_input.extend_from_slice(parent_task_id.as_bytes());
        hash_input.extend_from_slice(&parent_task_counter.to_le_bytes());

        let hash = murmur_hash_64a(&hash_input, 0);
        let hash_bytes = hash.to_le_bytes();

        data[..8].copy_from_slice(&hash_bytes);
        let hash2 = murmur_hash_64a(&hash_bytes, 1);
        let hash2_bytes = hash2.to_le_bytes();
        data[8..Self::UNIQUE_BYTES_LENGTH].copy_from_slice(&hash2_bytes[..4]);

        data[Self::UNIQUE_BYTES_LENGTH..].copy_from_slice(job_id.data());

        Self { data }
    }

    /// Extract the embedded JobID (last 4 bytes).
    pub fn job_id(&self) -> JobID {
        JobID::from_binary(&self.data[Self::UNIQUE_BYTES_LENGTH..])
    }
}

// ─── TaskID extras ──────────────────────────────────────────────────────────

impl TaskID {
    const UNIQUE_BYTES_LENGTH: usize = 8;

    /// Create a TaskID for an actor creation task. The unique bytes are all
    /// zero, so the creation task ID is a pure function of the actor ID.
    pub fn for_actor_creation_task(actor_id: &ActorID) -> Self {
        let mut data = [0u8; 24];
        data[Self::UNIQUE_BYTES_LENGTH..].copy_from_slice(actor_id.data());
        Self { data }
    }

    /// Create a TaskID for a normal (non-actor) task.
    pub fn for_normal_task(
        job_id: &JobID,
        parent_task_id: &TaskID,
        parent_task_counter: u64,
    ) -> Self {
        Self::for_actor_task(job_id, parent_task_id, parent_task_counter, &ActorID::nil())
    }

    /// Create a TaskID for an actor task.
    pub fn for_actor_task(
        _job_id: &JobID,
        parent_task_id: &TaskID,
        parent_task_counter: u64,
        actor_id: &ActorID,
    ) -> Self {
        let mut data = [0u8; 24];

        let mut hash_input = Vec::with_capacity(TaskID::SIZE + 8);
        hash_input.extend_from_slice(parent_task_id.as_bytes());
        hash_input.extend_from_slice(&parent_task_counter.to_le_bytes());
        let hash = murmur_hash_64a(&hash_input, 0);

        data[..Self::UNIQUE_BYTES_LENGTH].copy_from_slice(&hash.to_le_bytes());
        data[Self::UNIQUE_BYTES_LENGTH..].copy_from_slice(actor_id.data());

        Self { data }
    }

    /// Create the TaskID for the driver task of a given job.
    pub fn for_driver_task(job_id: &JobID) -> Self {
        let actor_id = ActorID::of(job_id, &TaskID::nil(), 0);
        Self::for_actor_creation_task(&actor_id)
    }

    /// Extract the embedded ActorID (last 16 bytes).
    pub fn actor_id(&self) -> ActorID {
        ActorID::from_binary(&self.data[Self::UNIQUE_BYTES_LENGTH..])
    }

    /// Extract the embedded JobID (from the ActorID).
    pub fn job_id(&self) -> JobID {
        self.actor_id().job_id()
    }

    /// Check if this is an actor creation task (unique bytes are all zeros).
    pub fn is_for_actor_creation_task(&self) -> bool {
        self.data[..Self::UNIQUE_BYTES_LENGTH]
            .iter()
            .all(|&b| b == 0)
    }
}

// ─── ObjectID extras ────────────────────────────────────────────────────────

// Flags layout (u16, bytes 4..6 little-endian):
//   bit 0      object kind: 0 = task return, 1 = put
//   bits 1..3  transport type
const FLAG_KIND_PUT: u16 = 0x1;
const FLAG_TRANSPORT_SHIFT: u16 = 1;
const FLAG_TRANSPORT_MASK: u16 = 0x3;

impl ObjectID {
    const INDEX_BYTES_LENGTH: usize = 4;
    const FLAGS_BYTES_LENGTH: usize = 2;
    const TASK_ID_OFFSET: usize = Self::INDEX_BYTES_LENGTH + Self::FLAGS_BYTES_LENGTH;

    /// Maximum number of objects returnable by a single task.
    pub const MAX_OBJECT_INDEX: u64 = (1u64 << 32) - 1;

    fn with_parts(task_id: &TaskID, index: u32, flags: u16) -> Self {
        let mut data = [0u8; 30];
        data[..Self::INDEX_BYTES_LENGTH].copy_from_slice(&index.to_be_bytes());
        data[Self::INDEX_BYTES_LENGTH..Self::TASK_ID_OFFSET]
            .copy_from_slice(&flags.to_le_bytes());
        data[Self::TASK_ID_OFFSET..].copy_from_slice(task_id.data());
        Self { data }
    }

    /// ObjectID for the `index`-th return value (1-based) of a task.
    pub fn for_task_return(task_id: &TaskID, index: u32, transport: TransportType) -> Self {
        let flags = (transport as u16) << FLAG_TRANSPORT_SHIFT;
        Self::with_parts(task_id, index, flags)
    }

    /// ObjectID for the `put_index`-th Put performed by a task.
    pub fn for_put(task_id: &TaskID, put_index: u32, transport: TransportType) -> Self {
        let flags = FLAG_KIND_PUT | ((transport as u16) << FLAG_TRANSPORT_SHIFT);
        Self::with_parts(task_id, put_index, flags)
    }

    /// The object index (first 4 bytes, big-endian).
    pub fn object_index(&self) -> u32 {
        u32::from_be_bytes(self.data[..Self::INDEX_BYTES_LENGTH].try_into().unwrap())
    }

    fn flags(&self) -> u16 {
        u16::from_le_bytes(
            self.data[Self::INDEX_BYTES_LENGTH..Self::TASK_ID_OFFSET]
                .try_into()
                .unwrap(),
        )
    }

    /// Whether this ObjectID was created by a Put (vs. a task return).
    pub fn is_put(&self) -> bool {
        self.flags() & FLAG_KIND_PUT != 0
    }

    /// The transport tag embedded in the ID. Dispatches gets/waits/deletes
    /// between the memory store and the plasma store.
    pub fn transport_type(&self) -> TransportType {
        TransportType::from_flag_bits((self.flags() >> FLAG_TRANSPORT_SHIFT) & FLAG_TRANSPORT_MASK)
    }

    /// Shorthand for `transport_type() == TransportType::Direct`.
    pub fn is_direct_call_type(&self) -> bool {
        self.transport_type() == TransportType::Direct
    }

    /// Extract the embedded TaskID (last 24 bytes).
    pub fn task_id(&self) -> TaskID {
        TaskID::from_binary(&self.data[Self::TASK_ID_OFFSET..])
    }
}

// ─── WorkerID extras ────────────────────────────────────────────────────────

impl WorkerID {
    /// Compute a deterministic driver worker ID from a JobID.
    pub fn compute_driver_id_from_job(job_id: &JobID) -> Self {
        let mut data = [0u8; UNIQUE_ID_SIZE];
        data[..JobID::SIZE].copy_from_slice(job_id.data());
        Self { data }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nil_id() {
        let id = JobID::nil();
        assert!(id.is_nil());
        assert_eq!(id.data(), &[0xFF; 4]);
    }

    #[test]
    fn test_job_id_roundtrip() {
        for val in [0u32, 1, 100, u32::MAX] {
            let id = JobID::from_int(val);
            assert_eq!(id.to_int(), val);

            let hex_str = id.hex();
            let id2 = JobID::from_hex(&hex_str);
            assert_eq!(id, id2);

            let bin = id.binary();
            let id3 = JobID::from_binary(&bin);
            assert_eq!(id, id3);
        }
    }

    #[test]
    fn test_actor_id_embeds_job_id() {
        let job_id = JobID::from_int(7);
        let task_id = TaskID::nil();
        let actor_id = ActorID::of(&job_id, &task_id, 0);
        assert_eq!(actor_id.job_id(), job_id);
    }

    #[test]
    fn test_actor_id_deterministic() {
        let job_id = JobID::from_int(3);
        let parent = TaskID::from_random();
        let a1 = ActorID::of(&job_id, &parent, 5);
        let a2 = ActorID::of(&job_id, &parent, 5);
        assert_eq!(a1, a2);
        let a3 = ActorID::of(&job_id, &parent, 6);
        assert_ne!(a1, a3);
    }

    #[test]
    fn test_task_id_embeds_actor_id() {
        let job_id = JobID::from_int(3);
        let parent = TaskID::nil();
        let actor_id = ActorID::of(&job_id, &parent, 1);
        let task_id = TaskID::for_actor_creation_task(&actor_id);
        assert_eq!(task_id.actor_id(), actor_id);
        assert!(task_id.is_for_actor_creation_task());
    }

    #[test]
    fn test_object_id_task_return() {
        let task_id = TaskID::from_random();
        let oid = ObjectID::for_task_return(&task_id, 3, TransportType::Direct);
        assert_eq!(oid.object_index(), 3);
        assert_eq!(oid.task_id(), task_id);
        assert_eq!(oid.transport_type(), TransportType::Direct);
        assert!(oid.is_direct_call_type());
        assert!(!oid.is_put());
    }

    #[test]
    fn test_object_id_put() {
        let task_id = TaskID::from_random();
        let oid = ObjectID::for_put(&task_id, 1, TransportType::Raylet);
        assert_eq!(oid.object_index(), 1);
        assert!(oid.is_put());
        assert_eq!(oid.transport_type(), TransportType::Raylet);
        assert!(!oid.is_direct_call_type());
    }

    #[test]
    fn test_object_id_transport_distinguishes() {
        let task_id = TaskID::from_random();
        let direct = ObjectID::for_task_return(&task_id, 1, TransportType::Direct);
        let raylet = ObjectID::for_task_return(&task_id, 1, TransportType::Raylet);
        assert_ne!(direct, raylet);
    }

    #[test]
    fn test_return_ids_deterministic() {
        let task_id = TaskID::from_random();
        let a = ObjectID::for_task_return(&task_id, 2, TransportType::Direct);
        let b = ObjectID::for_task_return(&task_id, 2, TransportType::Direct);
        assert_eq!(a, b);
    }

    #[test]
    fn test_driver_task_id_deterministic() {
        let job_id = JobID::from_int(11);
        assert_eq!(TaskID::for_driver_task(&job_id), TaskID::for_driver_task(&job_id));
    }

    #[test]
    fn test_hex_roundtrip() {
        let id = ObjectID::from_random();
        let hex_str = id.hex();
        assert_eq!(hex_str.len(), 60);
        let id2 = ObjectID::from_hex(&hex_str);
        assert_eq!(id, id2);
    }

    #[test]
    fn test_hash_deterministic() {
        let id = UniqueID::from_random();
        assert_eq!(id.murmur_hash(), id.murmur_hash());
    }

    #[test]
    fn test_unique_id_sizes() {
        assert_eq!(UniqueID::SIZE, 28);
        assert_eq!(WorkerID::SIZE, 28);
        assert_eq!(NodeID::SIZE, 28);
        assert_eq!(ObjectID::SIZE, 30);
        assert_eq!(TaskID::SIZE, 24);
        assert_eq!(ActorID::SIZE, 16);
    }
}
