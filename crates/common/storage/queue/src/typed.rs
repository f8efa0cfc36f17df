// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Typed elements on top of a byte queue.
//!
//! [`TypedQueue`] encodes values with a [`Codec`] before handing them to a
//! [`QueueFile`]. It adds no locking or durability of its own.

use std::{marker::PhantomData, path::Path};

use serde::{Serialize, de::DeserializeOwned};
use snafu::{ResultExt, Snafu};

use crate::{QueueError, QueueFile};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum TypedQueueError {
    /// The underlying queue failed.
    #[snafu(display("Queue storage error: {source}"))]
    Storage { source: QueueError },

    /// A value could not be encoded, or stored bytes could not be decoded.
    #[snafu(display("Serialization error: {message}"))]
    Serialization { message: String },
}

pub type TypedResult<T> = std::result::Result<T, TypedQueueError>;

/// Converts values to and from element bytes.
pub trait Codec {
    fn encode<T: Serialize>(value: &T) -> TypedResult<Vec<u8>>;

    fn decode<T: DeserializeOwned>(bytes: &[u8]) -> TypedResult<T>;
}

/// JSON via `serde_json`. Human readable, the default.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(value: &T) -> TypedResult<Vec<u8>> {
        serde_json::to_vec(value).map_err(|e| serialization(&e))
    }

    fn decode<T: DeserializeOwned>(bytes: &[u8]) -> TypedResult<T> {
        serde_json::from_slice(bytes).map_err(|e| serialization(&e))
    }
}

/// Compact binary encoding via `bincode` with its standard configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeCodec;

impl Codec for BincodeCodec {
    fn encode<T: Serialize>(value: &T) -> TypedResult<Vec<u8>> {
        bincode::serde::encode_to_vec(value, bincode::config::standard())
            .map_err(|e| serialization(&e))
    }

    fn decode<T: DeserializeOwned>(bytes: &[u8]) -> TypedResult<T> {
        bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map(|(value, _)| value)
            .map_err(|e| serialization(&e))
    }
}

fn serialization(e: &impl std::fmt::Display) -> TypedQueueError {
    SerializationSnafu {
        message: e.to_string(),
    }
    .build()
}

/// FIFO queue of `T` values stored through codec `C`.
pub struct TypedQueue<T, C = JsonCodec> {
    queue:  QueueFile,
    _types: PhantomData<fn() -> (T, C)>,
}

impl<T, C> TypedQueue<T, C>
where
    T: Serialize + DeserializeOwned,
    C: Codec,
{
    pub fn open<P: AsRef<Path>>(path: P) -> TypedResult<Self> {
        Ok(Self::new(QueueFile::open(path).context(StorageSnafu)?))
    }

    /// Wraps an already opened queue.
    pub const fn new(queue: QueueFile) -> Self {
        Self {
            queue,
            _types: PhantomData,
        }
    }

    pub fn add(&mut self, value: &T) -> TypedResult<()> {
        let bytes = C::encode(value)?;
        self.queue.add(&bytes).context(StorageSnafu)
    }

    /// Adds every value in one transaction. Nothing is written if any value
    /// fails to encode.
    pub fn add_n<'a, I>(&mut self, values: I) -> TypedResult<()>
    where
        I: IntoIterator<Item = &'a T>,
        T: 'a,
    {
        let encoded = values
            .into_iter()
            .map(C::encode)
            .collect::<TypedResult<Vec<_>>>()?;
        self.queue.add_n(encoded).context(StorageSnafu)
    }

    pub fn peek(&self) -> TypedResult<Option<T>> {
        self.queue
            .peek()
            .context(StorageSnafu)?
            .map(|bytes| C::decode(&bytes))
            .transpose()
    }

    pub fn remove(&mut self) -> TypedResult<()> { self.queue.remove().context(StorageSnafu) }

    pub fn remove_n(&mut self, n: usize) -> TypedResult<()> {
        self.queue.remove_n(n).context(StorageSnafu)
    }

    pub fn clear(&mut self) -> TypedResult<()> { self.queue.clear().context(StorageSnafu) }

    /// Decodes elements head first; stops after the first error.
    pub fn iter(&mut self) -> impl Iterator<Item = TypedResult<T>> + '_ {
        self.queue
            .iter()
            .map(|item| C::decode(&item.context(StorageSnafu)?))
    }

    pub fn get_all(&mut self) -> TypedResult<Vec<T>> { self.iter().collect() }

    pub const fn size(&self) -> usize { self.queue.size() }

    pub const fn is_empty(&self) -> bool { self.queue.is_empty() }

    pub const fn inner(&self) -> &QueueFile { &self.queue }

    pub const fn inner_mut(&mut self) -> &mut QueueFile { &mut self.queue }

    pub fn into_inner(self) -> QueueFile { self.queue }
}
