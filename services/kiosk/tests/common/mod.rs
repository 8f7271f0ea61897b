#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use kiosk_lib::config::Config;
use loyalty_core::ports::{PortResult, SessionStorage};
use loyalty_core::SessionStore;

pub const OWNER_SESSION: &str = r#"{"role":"OWNER","token":"tok-123","businessId":"biz1"}"#;
pub const BARBER_SESSION: &str = r#"{"role":"BARBER","token":"tok-123","businessId":"biz1"}"#;
pub const SUPER_ADMIN_SESSION: &str = r#"{"role":"SUPERADMIN","token":"tok-root"}"#;

#[derive(Default)]
pub struct MemoryStorage {
    raw: Mutex<Option<String>>,
}

impl MemoryStorage {
    pub fn with(raw: &str) -> Self {
        Self {
            raw: Mutex::new(Some(raw.to_string())),
        }
    }

    pub fn stored(&self) -> Option<String> {
        self.raw.lock().unwrap().clone()
    }
}

impl SessionStorage for MemoryStorage {
    fn read(&self) -> PortResult<Option<String>> {
        Ok(self.raw.lock().unwrap().clone())
    }

    fn write(&self, raw: &str) -> PortResult<()> {
        *self.raw.lock().unwrap() = Some(raw.to_string());
        Ok(())
    }

    fn remove(&self) -> PortResult<()> {
        *self.raw.lock().unwrap() = None;
        Ok(())
    }
}

/// A hydrated store over in-memory storage, optionally seeded with a session record.
pub fn session_store(stored: Option<&str>) -> (Arc<SessionStore>, Arc<MemoryStorage>) {
    let storage = Arc::new(stored.map(MemoryStorage::with).unwrap_or_default());
    let store = Arc::new(SessionStore::new(storage.clone()));
    store.hydrate();
    (store, storage)
}

pub fn config(base_url: &str) -> Config {
    Config::from_lookup(|key| match key {
        "API_BASE_URL" => Some(base_url.to_string()),
        "REQUEST_TIMEOUT_SECS" => Some("2".to_string()),
        _ => None,
    })
    .unwrap()
}
