use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// 最高分在存储中的键名。
pub const HIGH_SCORE_KEY: &str = "highScore";

/// 字符串键值存储（浏览器中对应 localStorage）。
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: &str);
}

/// 内存存储，克隆体共享同一份数据。
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Rc<RefCell<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(self, key: &str, value: &str) -> Self {
        self.entries
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        self
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.borrow().get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) {
        self.entries
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
    }
}

/// 基于 `window.localStorage` 的存储；不可用时读写均为空操作。
pub struct LocalStorageStore {
    storage: Option<web_sys::Storage>,
}

impl LocalStorageStore {
    pub fn new() -> Self {
        let storage = web_sys::window().and_then(|window| window.local_storage().ok().flatten());
        if storage.is_none() {
            log::warn!("localStorage unavailable, high scores will not persist");
        }
        Self { storage }
    }

    pub fn is_available(&self) -> bool {
        self.storage.is_some()
    }
}

impl Default for LocalStorageStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyValueStore for LocalStorageStore {
    fn get(&self, key: &str) -> Option<String> {
        self.storage.as_ref()?.get_item(key).ok().flatten()
    }

    fn set(&mut self, key: &str, value: &str) {
        if let Some(storage) = &self.storage {
            if let Err(error) = storage.set_item(key, value) {
                log::warn!("failed to persist `{key}`: {error:?}");
            }
        }
    }
}

/// 解析持久化的最高分；缺失或格式错误都视为没有记录。
pub fn parse_high_score(raw: &str) -> Option<i64> {
    raw.trim()
        .parse::<u64>()
        .ok()
        .and_then(|value| i64::try_from(value).ok())
}
