//! The World handle and its JSON wire form.

use std::io::{Read, Write};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::SpawnError;

/// Backend-specific payload carried by a [`World`].
///
/// Only the spawner that produced it may decode it. Callers persist it and
/// hand it back verbatim on kill.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Details(Value);

impl Details {
    /// Serialize a spawner's coordinates into an opaque blob.
    pub fn encode<T: Serialize>(value: &T) -> Result<Self, SpawnError> {
        serde_json::to_value(value)
            .map(Self)
            .map_err(|e| SpawnError::Encode(format!("world details: {e}")))
    }

    /// Decode the blob back into the producing spawner's coordinates.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, SpawnError> {
        T::deserialize(&self.0).map_err(|e| SpawnError::decode("world details", e))
    }
}

/// A remotely running unit, as seen by callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct World {
    /// Backend run identifier, unique within a spawner.
    pub id: String,

    /// Domain the world runs in.
    #[serde(default)]
    pub galaxy: String,

    /// `host:port` the world accepts connections on. Empty if unreachable.
    #[serde(default)]
    pub addr: String,

    /// Name of the spawner that created the world.
    #[serde(default)]
    pub spawner: String,

    /// Spawner-specific coordinates.
    #[serde(default)]
    pub details: Details,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    Many(Vec<World>),
    One(World),
}

/// Decode either a single world or an array of worlds.
pub fn decode_worlds<R: Read>(reader: R) -> Result<Vec<World>, SpawnError> {
    let decoded: OneOrMany =
        serde_json::from_reader(reader).map_err(|e| SpawnError::decode("worlds", e))?;
    Ok(match decoded {
        OneOrMany::Many(worlds) => worlds,
        OneOrMany::One(world) => vec![world],
    })
}

/// Write worlds as a JSON array followed by a newline.
pub fn encode_worlds<W: Write>(mut writer: W, worlds: &[World]) -> Result<(), SpawnError> {
    serde_json::to_writer(&mut writer, worlds)
        .map_err(|e| SpawnError::Encode(format!("worlds: {e}")))?;
    writer.write_all(b"\n")?;
    Ok(())
}
