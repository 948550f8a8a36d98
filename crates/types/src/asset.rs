use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::TypesError;

/// Token class encoded in the top byte of a pool asset id
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssetIdPrefix {
    Lp = 0,
    Long = 1,
    Short = 2,
    WithdrawalShare = 3,
}

impl AssetIdPrefix {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(AssetIdPrefix::Lp),
            1 => Some(AssetIdPrefix::Long),
            2 => Some(AssetIdPrefix::Short),
            3 => Some(AssetIdPrefix::WithdrawalShare),
            _ => None,
        }
    }
}

/// 256-bit multi-token id: prefix in the top 8 bits, maturity time in the rest
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssetId([u8; 32]);

impl AssetId {
    pub fn encode(prefix: AssetIdPrefix, maturity_time: u64) -> Self {
        let mut bytes = [0u8; 32];
        bytes[0] = prefix as u8;
        bytes[24..].copy_from_slice(&maturity_time.to_be_bytes());
        AssetId(bytes)
    }

    pub fn lp() -> Self {
        Self::encode(AssetIdPrefix::Lp, 0)
    }

    pub fn withdrawal_share() -> Self {
        Self::encode(AssetIdPrefix::WithdrawalShare, 0)
    }

    pub fn long(maturity_time: u64) -> Self {
        Self::encode(AssetIdPrefix::Long, maturity_time)
    }

    pub fn short(maturity_time: u64) -> Self {
        Self::encode(AssetIdPrefix::Short, maturity_time)
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self, TypesError> {
        if AssetIdPrefix::from_byte(bytes[0]).is_none() {
            return Err(TypesError::InvalidAssetId(hex::encode(bytes)));
        }
        // Maturity must fit in the low 64 bits
        if bytes[1..24].iter().any(|b| *b != 0) {
            return Err(TypesError::InvalidAssetId(hex::encode(bytes)));
        }
        Ok(AssetId(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Split into prefix and maturity time
    pub fn decode(&self) -> (AssetIdPrefix, u64) {
        let prefix = AssetIdPrefix::from_byte(self.0[0]).unwrap_or(AssetIdPrefix::Lp);
        let mut maturity = [0u8; 8];
        maturity.copy_from_slice(&self.0[24..]);
        (prefix, u64::from_be_bytes(maturity))
    }

    pub fn prefix(&self) -> AssetIdPrefix {
        self.decode().0
    }

    pub fn maturity_time(&self) -> u64 {
        self.decode().1
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for AssetId {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let stripped = s.strip_prefix("0x").unwrap_or(s);
        let raw = hex::decode(stripped).map_err(|_| TypesError::InvalidAssetId(s.to_string()))?;
        if raw.len() > 32 {
            return Err(TypesError::InvalidAssetId(s.to_string()));
        }
        let mut bytes = [0u8; 32];
        bytes[32 - raw.len()..].copy_from_slice(&raw);
        AssetId::from_bytes(bytes)
    }
}

impl Serialize for AssetId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for AssetId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode() {
        let id = AssetId::long(1_700_000_000);
        assert_eq!(id.decode(), (AssetIdPrefix::Long, 1_700_000_000));
        assert_eq!(AssetId::lp().decode(), (AssetIdPrefix::Lp, 0));
        assert_eq!(AssetId::withdrawal_share().prefix(), AssetIdPrefix::WithdrawalShare);
    }

    #[test]
    fn test_prefix_is_top_byte() {
        let id = AssetId::short(3600);
        let s = id.to_string();
        assert!(s.starts_with("0x02"));
        assert!(s.ends_with("0e10"));
        assert_eq!(s.parse::<AssetId>().unwrap(), id);
    }

    #[test]
    fn test_rejects_unknown_prefix() {
        let mut bytes = [0u8; 32];
        bytes[0] = 7;
        assert!(AssetId::from_bytes(bytes).is_err());
    }
}
