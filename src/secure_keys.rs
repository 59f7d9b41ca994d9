//! API key storage in the OS credential vault.
//!
//! The key lives in the platform keyring (Secret Service, Keychain, or
//! Credential Manager). Headless setups without a vault fall back to the
//! sync store file, which is better than refusing to run.

use anyhow::{anyhow, Result};
use log::{debug, warn};

use crate::store::Store;

const SERVICE_NAME: &str = "dev.retext.app";
const CREDENTIAL_NAME: &str = "api_key";

/// Store key under which the fallback copy lives when no vault is present.
const STORE_KEY: &str = "api_key";

pub fn set_api_key(store: &Store, key: &str) -> Result<()> {
    if key.trim().is_empty() {
        // An empty key means "remove", not "store an empty string".
        return delete_api_key(store);
    }

    let entry = keyring::Entry::new(SERVICE_NAME, CREDENTIAL_NAME)?;
    match entry.set_password(key) {
        Ok(()) => {
            debug!("Stored API key in credential vault");
            // Drop any stale fallback copy so the vault is authoritative.
            let _ = store.remove(STORE_KEY);
            Ok(())
        }
        Err(e) => {
            warn!("Credential vault unavailable ({}), storing key in settings file", e);
            store
                .set(STORE_KEY, &key)
                .map_err(|e| anyhow!("Failed to store API key: {}", e))
        }
    }
}

/// Reads the API key, `None` when nothing is stored anywhere.
pub fn get_api_key(store: &Store) -> Result<Option<String>> {
    let entry = keyring::Entry::new(SERVICE_NAME, CREDENTIAL_NAME)?;
    match entry.get_password() {
        Ok(key) if !key.is_empty() => Ok(Some(key)),
        Ok(_) | Err(keyring::Error::NoEntry) => Ok(store.get::<String>(STORE_KEY)),
        Err(e) => {
            warn!("Credential vault unavailable ({}), reading key from settings file", e);
            Ok(store.get::<String>(STORE_KEY))
        }
    }
}

pub fn delete_api_key(store: &Store) -> Result<()> {
    let _ = store.remove(STORE_KEY);
    let entry = keyring::Entry::new(SERVICE_NAME, CREDENTIAL_NAME)?;
    match entry.delete_password() {
        Ok(()) => {
            debug!("Deleted API key from credential vault");
            Ok(())
        }
        // Already doesn't exist
        Err(keyring::Error::NoEntry) => Ok(()),
        Err(e) => Err(anyhow!("Failed to delete API key: {}", e)),
    }
}
