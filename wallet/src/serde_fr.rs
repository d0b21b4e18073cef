//! Serde adapters for BN254 field elements, stored as canonical
//! 32-byte big-endian encodings.

use ark_bn254::Fr;
use serde::{Deserialize, Deserializer, Serializer};
use zktoken_crypto::field::{fr_from_bytes_strict, fr_to_bytes};

pub fn serialize<S>(value: &Fr, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_bytes(&fr_to_bytes(value))
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<Fr, D::Error>
where
    D: Deserializer<'de>,
{
    let bytes: Vec<u8> = Vec::<u8>::deserialize(deserializer)?;
    let bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|_| serde::de::Error::custom("expected 32 bytes"))?;
    fr_from_bytes_strict(&bytes).map_err(|_| serde::de::Error::custom("field element out of range"))
}

pub mod vec {
    use super::*;
    use serde::Serialize;

    #[derive(serde::Serialize, serde::Deserialize)]
    struct Wrapped(#[serde(with = "super")] Fr);

    pub fn serialize<S>(values: &[Fr], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        values
            .iter()
            .map(|value| Wrapped(*value))
            .collect::<Vec<_>>()
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<Fr>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Vec::<Wrapped>::deserialize(deserializer)?
            .into_iter()
            .map(|wrapped| wrapped.0)
            .collect())
    }
}

pub mod opt {
    use super::*;
    use serde::Serialize;

    #[derive(serde::Serialize, serde::Deserialize)]
    struct Wrapped(#[serde(with = "super")] Fr);

    pub fn serialize<S>(value: &Option<Fr>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.map(Wrapped).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Fr>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<Wrapped>::deserialize(deserializer)?.map(|wrapped| wrapped.0))
    }
}
