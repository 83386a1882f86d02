//! Helpers for the string-heavy encodings of the beacon and execution APIs.

/// Decimal (or `0x`-prefixed, where the target type accepts it) quantities
/// encoded as JSON strings.
pub mod as_str {
    use serde::{de, Deserialize, Deserializer};
    use std::{borrow::Cow, fmt::Display, str::FromStr};

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: FromStr,
        T::Err: Display,
    {
        let value = <Cow<'de, str>>::deserialize(deserializer)?;
        value.parse().map_err(de::Error::custom)
    }
}

/// Sequences of stringly-encoded quantities, e.g. beacon state balances.
pub mod seq_of_str {
    use serde::{de, Deserialize, Deserializer};
    use std::{borrow::Cow, fmt::Display, str::FromStr};

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: FromStr,
        T::Err: Display,
    {
        let values = <Vec<Cow<'de, str>>>::deserialize(deserializer)?;
        values.iter().map(|value| value.parse().map_err(de::Error::custom)).collect()
    }
}

/// `0x`-prefixed hexadecimal quantities of the execution JSON-RPC encoding.
pub mod quantity {
    use serde::{de, Deserialize, Deserializer};
    use std::borrow::Cow;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<u64, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = <Cow<'de, str>>::deserialize(deserializer)?;
        let digits = value
            .strip_prefix("0x")
            .ok_or_else(|| de::Error::custom("quantity is missing the 0x prefix"))?;
        u64::from_str_radix(digits, 16).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Example {
        #[serde(with = "super::as_str")]
        slot: u64,
        #[serde(with = "super::seq_of_str")]
        balances: Vec<u64>,
        #[serde(with = "super::quantity")]
        gas_used: u64,
    }

    #[test]
    fn parses_stringly_encodings() {
        let example: Example = serde_json::from_str(
            r#"{"slot": "12345", "balances": ["1", "2"], "gas_used": "0x5208"}"#,
        )
        .unwrap();
        assert_eq!(example, Example { slot: 12345, balances: vec![1, 2], gas_used: 21000 });
    }

    #[test]
    fn rejects_non_hex_quantity() {
        let result = serde_json::from_str::<Example>(
            r#"{"slot": "1", "balances": [], "gas_used": "21000"}"#,
        );
        assert!(result.is_err());
    }
}
