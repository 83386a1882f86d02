use crate::error::Error;
use std::{
    collections::HashMap,
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};
use tracing::info;

pub type BlsPublicKey = alloy_primitives::FixedBytes<48>;

// Header lines seen in exported key files; skipped when reading.
const TXT_HEADERS: [&str; 3] = ["f_validator_pubkey", "f0_", "f_public_key"];
const ETHSTA_HEADER: &str = "address,version,entity";

/// Named sets of validator keys with both lookup directions. Each pubkey
/// belongs to at most one pool.
#[derive(Debug, Default, Clone)]
pub struct Pools {
    pub keys_per_pool: HashMap<String, Vec<BlsPublicKey>>,
    /// Lowercase `0x`-prefixed hex pubkey to pool label.
    pub key_to_pool: HashMap<String, String>,
}

impl Pools {
    /// Loads pools either from one `pool,0xpubkey` CSV or from per-pool key
    /// files (`.txt` one key per line, `.csv` in the ethsta.com format).
    pub fn load(pool_files: &[String], validators_file: Option<&str>) -> Result<Self, Error> {
        if let Some(path) = validators_file {
            return read_validators_file(Path::new(path));
        }

        let mut pools = Self::default();
        for entry in pool_files {
            let path = Path::new(entry);
            let keys = match path.extension().and_then(|ext| ext.to_str()) {
                Some("txt") => read_custom_validators_file(path)?,
                Some("csv") => read_ethsta_validators_file(path)?,
                _ => {
                    return Err(Error::Config(format!(
                        "unsupported pool file `{entry}`, expected .txt or .csv"
                    )))
                }
            };
            pools.insert_pool(pool_label(path), keys);
        }
        Ok(pools)
    }

    pub fn from_keys(keys_per_pool: HashMap<String, Vec<BlsPublicKey>>) -> Self {
        let mut pools = Self::default();
        for (label, keys) in keys_per_pool {
            pools.insert_pool(label, keys);
        }
        pools
    }

    fn insert_pool(&mut self, label: String, keys: Vec<BlsPublicKey>) {
        for key in &keys {
            self.key_to_pool.insert(key.to_string(), label.clone());
        }
        self.keys_per_pool.insert(label, keys);
    }
}

/// One `0x`-prefixed hex pubkey per line, tolerating exported artifacts:
/// known header lines, surrounding quotes, `\x` escapes, and a missing `0x`.
pub fn read_custom_validators_file(path: &Path) -> Result<Vec<BlsPublicKey>, Error> {
    info!(path = %path.display(), "reading validator keys from .txt file");
    let file = File::open(path)?;
    let mut keys = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        if TXT_HEADERS.contains(&line.as_str()) {
            continue;
        }
        keys.push(parse_validator_key(&line)?);
    }
    info!(count = keys.len(), path = %path.display(), "done reading validator keys");
    Ok(keys)
}

/// The ethsta.com export: an `address,version,entity` header followed by
/// three-column rows whose first column is the hex pubkey.
pub fn read_ethsta_validators_file(path: &Path) -> Result<Vec<BlsPublicKey>, Error> {
    info!(path = %path.display(), "reading validator keys from ethsta.com csv file");
    let file = File::open(path)?;
    let mut keys = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        if line == ETHSTA_HEADER {
            continue;
        }
        let fields: Vec<&str> = line.split(',').collect();
        if fields.len() != 3 {
            return Err(Error::Config(format!(
                "unexpected row in `{}`, see ethsta.com for the format",
                path.display()
            )));
        }
        keys.push(parse_validator_key(fields[0])?);
    }
    info!(count = keys.len(), path = %path.display(), "done reading validator keys");
    Ok(keys)
}

/// `pool,key` rows assigning every key to its pool.
fn read_validators_file(path: &Path) -> Result<Pools, Error> {
    info!(path = %path.display(), "reading validators csv file");
    let file = File::open(path)?;
    let mut keys_per_pool: HashMap<String, Vec<BlsPublicKey>> = HashMap::new();
    let mut count = 0usize;
    for line in BufReader::new(file).lines() {
        let line = line?;
        let Some((pool, key)) = line.split_once(',') else {
            return Err(Error::Config(format!(
                "unexpected row in `{}`, expected `pool,key`",
                path.display()
            )));
        };
        keys_per_pool.entry(pool.to_string()).or_default().push(parse_validator_key(key)?);
        count += 1;
    }
    info!(count, path = %path.display(), "done reading validator keys");
    Ok(Pools::from_keys(keys_per_pool))
}

fn parse_validator_key(raw: &str) -> Result<BlsPublicKey, Error> {
    let mut key = raw.trim().trim_matches('"').replace("\\x", "");
    if !key.starts_with("0x") {
        key = format!("0x{key}");
    }
    if key.len() != 98 {
        return Err(Error::InvalidValidatorKey {
            key: raw.to_string(),
            reason: format!("length {} is incorrect", key.len()),
        });
    }
    let bytes = alloy_primitives::hex::decode(&key).map_err(|err| Error::InvalidValidatorKey {
        key: raw.to_string(),
        reason: err.to_string(),
    })?;
    BlsPublicKey::try_from(bytes.as_slice()).map_err(|err| Error::InvalidValidatorKey {
        key: raw.to_string(),
        reason: err.to_string(),
    })
}

fn pool_label(path: &Path) -> String {
    match path.file_stem() {
        Some(stem) => stem.to_string_lossy().into_owned(),
        None => path.display().to_string(),
    }
}
