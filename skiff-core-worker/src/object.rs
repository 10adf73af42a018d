// Copyright 2025 The Skiff Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! In-core object representation.
//!
//! Inside the core an object is a sum type: a real value, the "promoted to
//! plasma" sentinel, or a failure sentinel. The sentinel-in-metadata encoding
//! exists only on the wire and in the shared store; conversion happens at
//! serialization boundaries.

use bytes::Bytes;

use skiff_common::id::ObjectID;
use skiff_proto::{self as proto, ErrorType};
use skiff_store_client::StoreEntry;

/// Marker prefix for sentinel metadata on the wire.
const MARKER_PREFIX: &[u8] = b"SKIFF_MARKER:";

/// A real object value: data, metadata, and the object IDs the value
/// transitively references.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ObjectPayload {
    pub data: Bytes,
    pub metadata: Bytes,
    pub nested_refs: Vec<ObjectID>,
}

/// An object as the core worker sees it.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreObject {
    /// A materialized value.
    Value(ObjectPayload),
    /// The value lives in the shared plasma store; fetch it from there.
    InPlasma,
    /// The producing task failed; gets surface this as an exception.
    Error(ErrorType),
}

impl StoreObject {
    pub fn from_data(data: Bytes) -> Self {
        StoreObject::Value(ObjectPayload {
            data,
            ..Default::default()
        })
    }

    pub fn value(data: Bytes, metadata: Bytes, nested_refs: Vec<ObjectID>) -> Self {
        StoreObject::Value(ObjectPayload {
            data,
            metadata,
            nested_refs,
        })
    }

    pub fn is_in_plasma(&self) -> bool {
        matches!(self, StoreObject::InPlasma)
    }

    pub fn is_exception(&self) -> bool {
        matches!(self, StoreObject::Error(_))
    }

    pub fn error_type(&self) -> Option<ErrorType> {
        match self {
            StoreObject::Error(e) => Some(*e),
            _ => None,
        }
    }

    pub fn payload(&self) -> Option<&ObjectPayload> {
        match self {
            StoreObject::Value(p) => Some(p),
            _ => None,
        }
    }

    /// Size of the data buffer; sentinels are zero-sized.
    pub fn data_size(&self) -> usize {
        match self {
            StoreObject::Value(p) => p.data.len(),
            _ => 0,
        }
    }

    /// Encode for the wire or the shared store. Sentinels become metadata
    /// markers so stores that only understand (data, metadata) can hold them.
    pub fn to_wire(&self) -> proto::Object {
        match self {
            StoreObject::Value(p) => proto::Object {
                data: p.data.to_vec(),
                metadata: p.metadata.to_vec(),
                nested_refs: p
                    .nested_refs
                    .iter()
                    .map(|id| proto::ObjectReference {
                        object_id: id.binary(),
                        ..Default::default()
                    })
                    .collect(),
            },
            StoreObject::InPlasma => proto::Object {
                metadata: encode_marker(ErrorType::ObjectInPlasma),
                ..Default::default()
            },
            StoreObject::Error(e) => proto::Object {
                metadata: encode_marker(*e),
                ..Default::default()
            },
        }
    }

    /// Decode from the wire, recognizing sentinel markers.
    pub fn from_wire(obj: proto::Object) -> Self {
        if let Some(error_type) = decode_marker(&obj.metadata) {
            if error_type == ErrorType::ObjectInPlasma {
                return StoreObject::InPlasma;
            }
            return StoreObject::Error(error_type);
        }
        StoreObject::Value(ObjectPayload {
            data: Bytes::from(obj.data),
            metadata: Bytes::from(obj.metadata),
            nested_refs: obj
                .nested_refs
                .iter()
                .map(|r| ObjectID::from_binary(&r.object_id))
                .collect(),
        })
    }

    /// Decode an entry read back from the shared store. Error markers ride
    /// through plasma in the metadata; nested refs do not survive it.
    pub fn from_store_entry(entry: StoreEntry) -> Self {
        if let Some(error_type) = decode_marker(&entry.metadata) {
            if error_type != ErrorType::ObjectInPlasma {
                return StoreObject::Error(error_type);
            }
        }
        StoreObject::Value(ObjectPayload {
            data: entry.data,
            metadata: entry.metadata,
            nested_refs: Vec::new(),
        })
    }

    /// The (data, metadata) pair to hand the shared store.
    pub fn to_store_parts(&self) -> (Bytes, Bytes) {
        match self {
            StoreObject::Value(p) => (p.data.clone(), p.metadata.clone()),
            other => (Bytes::new(), Bytes::from(other.to_wire().metadata)),
        }
    }
}

fn encode_marker(error_type: ErrorType) -> Vec<u8> {
    let mut out = MARKER_PREFIX.to_vec();
    out.extend_from_slice((error_type as i32).to_string().as_bytes());
    out
}

fn decode_marker(metadata: &[u8]) -> Option<ErrorType> {
    let rest = metadata.strip_prefix(MARKER_PREFIX)?;
    let code: i32 = std::str::from_utf8(rest).ok()?.parse().ok()?;
    ErrorType::try_from(code).ok()
}
