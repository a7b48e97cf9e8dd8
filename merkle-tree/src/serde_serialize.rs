pub mod pubkey_string_conversion {
    use {
        serde::{self, Deserialize, Deserializer, Serializer},
        solana_program::pubkey::Pubkey,
        std::str::FromStr,
    };

    pub fn serialize<S>(pubkey: &Pubkey, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&pubkey.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Pubkey, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Pubkey::from_str(&s).map_err(serde::de::Error::custom)
    }
}

pub mod option_pubkey_string_conversion {
    use super::pubkey_string_conversion;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use solana_program::pubkey::Pubkey;

    pub fn serialize<S>(value: &Option<Pubkey>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        #[derive(Serialize)]
        struct Helper<'a>(#[serde(with = "pubkey_string_conversion")] &'a Pubkey);

        value.as_ref().map(Helper).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Pubkey>, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Helper(#[serde(with = "pubkey_string_conversion")] Pubkey);

        let helper = Option::deserialize(deserializer)?;
        Ok(helper.map(|Helper(external)| external))
    }
}

/// Merkle roots and other 32 bytes hashes as a hex string.
pub mod bytes32_hex_conversion {
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 32], D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let mut bytes = [0_u8; 32];
        hex::decode_to_slice(s.trim_start_matches("0x"), &mut bytes)
            .map_err(serde::de::Error::custom)?;
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use solana_program::pubkey::Pubkey;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Record {
        #[serde(with = "pubkey_string_conversion")]
        address: Pubkey,
        #[serde(default, with = "option_pubkey_string_conversion")]
        collector: Option<Pubkey>,
        #[serde(with = "bytes32_hex_conversion")]
        root: [u8; 32],
    }

    #[test]
    fn record_conversions() {
        let record = Record {
            address: Pubkey::new_unique(),
            collector: None,
            root: [0xab; 32],
        };
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains(&record.address.to_string()));
        assert!(json.contains(&"ab".repeat(32)));
        assert_eq!(serde_json::from_str::<Record>(&json).unwrap(), record);

        let with_collector = Record {
            collector: Some(Pubkey::new_unique()),
            ..record
        };
        let json = serde_json::to_string(&with_collector).unwrap();
        assert_eq!(serde_json::from_str::<Record>(&json).unwrap(), with_collector);
    }

    #[test]
    fn invalid_root_is_rejected() {
        let json = format!(
            r#"{{"address":"{}","root":"abcd"}}"#,
            Pubkey::new_unique()
        );
        assert!(serde_json::from_str::<Record>(&json).is_err());
    }
}
