//! Game import interface: the services the engine provides to the game module.
//!
//! Save and load only need a small slice of the engine: the print and error
//! channels, entity linking, config strings, resource indices, cvars and the
//! tagged allocator. Everything is reached through `&dyn GameImport` so a host
//! (or a test) can supply its own implementation.

use std::collections::HashMap;

use parking_lot::Mutex;

pub const CS_SHADOWLIGHTS: i32 = 0x800;

/// Services provided by the engine to the game module.
pub trait GameImport: Sync {
    // Printing
    fn dprintf(&self, msg: &str);
    fn centerprintf(&self, ent_idx: i32, msg: &str);
    fn error(&self, msg: &str);

    // Config
    fn configstring(&self, num: i32, string: &str);
    fn get_configstring(&self, num: i32) -> String;

    // Indexing
    fn modelindex(&self, name: &str) -> i32;
    fn soundindex(&self, name: &str) -> i32;
    fn imageindex(&self, name: &str) -> i32;

    // Entity linking
    fn linkentity(&self, ent_idx: i32);

    // Memory
    fn free_tags(&self, tag: i32);

    // Cvars
    fn cvar(&self, var_name: &str, value: &str, flags: i32) -> f32;
}

// ============================================================
// Stub implementation
// ============================================================

/// In-process `GameImport` that keeps everything it is told. Used by
/// headless tools and the test suite.
#[derive(Debug, Default)]
pub struct StubGameImport {
    state: Mutex<StubState>,
}

#[derive(Debug, Default)]
struct StubState {
    prints: Vec<String>,
    centerprints: Vec<(i32, String)>,
    errors: Vec<String>,
    configstrings: HashMap<i32, String>,
    resources: Vec<String>,
    linked: Vec<i32>,
    freed_tags: Vec<i32>,
    cvars: HashMap<String, String>,
}

impl StubGameImport {
    pub fn new() -> Self {
        StubGameImport::default()
    }

    pub fn set_cvar(&self, name: &str, value: &str) {
        self.state.lock().cvars.insert(name.to_string(), value.to_string());
    }

    pub fn prints(&self) -> Vec<String> {
        self.state.lock().prints.clone()
    }

    pub fn centerprints(&self) -> Vec<(i32, String)> {
        self.state.lock().centerprints.clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.state.lock().errors.clone()
    }

    pub fn linked(&self) -> Vec<i32> {
        self.state.lock().linked.clone()
    }

    pub fn freed_tags(&self) -> Vec<i32> {
        self.state.lock().freed_tags.clone()
    }

    /// Resource names in the order they were first indexed.
    pub fn resources(&self) -> Vec<String> {
        self.state.lock().resources.clone()
    }

    /// Forgets everything recorded so far; cvars and config strings are kept.
    pub fn clear_log(&self) {
        let mut state = self.state.lock();
        state.prints.clear();
        state.centerprints.clear();
        state.errors.clear();
        state.resources.clear();
        state.linked.clear();
        state.freed_tags.clear();
    }

    fn index_of(&self, name: &str) -> i32 {
        let mut state = self.state.lock();
        match state.resources.iter().position(|r| r == name) {
            Some(i) => i as i32 + 1,
            None => {
                state.resources.push(name.to_string());
                state.resources.len() as i32
            }
        }
    }
}

impl GameImport for StubGameImport {
    fn dprintf(&self, msg: &str) {
        log::info!("{}", msg.trim_end());
        self.state.lock().prints.push(msg.to_string());
    }

    fn centerprintf(&self, ent_idx: i32, msg: &str) {
        self.state.lock().centerprints.push((ent_idx, msg.to_string()));
    }

    fn error(&self, msg: &str) {
        log::error!("{msg}");
        self.state.lock().errors.push(msg.to_string());
    }

    fn configstring(&self, num: i32, string: &str) {
        self.state.lock().configstrings.insert(num, string.to_string());
    }

    fn get_configstring(&self, num: i32) -> String {
        self.state.lock().configstrings.get(&num).cloned().unwrap_or_default()
    }

    fn modelindex(&self, name: &str) -> i32 {
        self.index_of(name)
    }

    fn soundindex(&self, name: &str) -> i32 {
        self.index_of(name)
    }

    fn imageindex(&self, name: &str) -> i32 {
        self.index_of(name)
    }

    fn linkentity(&self, ent_idx: i32) {
        self.state.lock().linked.push(ent_idx);
    }

    fn free_tags(&self, tag: i32) {
        self.state.lock().freed_tags.push(tag);
    }

    fn cvar(&self, var_name: &str, value: &str, _flags: i32) -> f32 {
        let mut state = self.state.lock();
        let current = state.cvars.entry(var_name.to_string()).or_insert_with(|| value.to_string());
        current.parse().unwrap_or(0.0)
    }
}
