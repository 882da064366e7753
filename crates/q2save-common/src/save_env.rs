// save_env.rs — what the read/write engines consult besides the value itself

use crate::q_shared::{EntityId, ItemId};
use crate::save_data::SaveDataRegistry;

/// Item lookups. Valid ids are `1..item_count()`.
pub trait ItemCatalog: Sync {
    fn item_count(&self) -> usize;
    fn find_by_classname(&self, classname: &str) -> Option<ItemId>;
    fn classname(&self, item: ItemId) -> Option<&str>;
}

/// Entity slot lookups.
pub trait EntityResolver: Sync {
    /// Number of slots; serialized indices must be below this.
    fn max_entities(&self) -> usize;
    /// Current handle of the slot at `index`.
    fn entity_id(&self, index: usize) -> Option<EntityId>;

    /// True when `id` still names the slot's current occupant.
    fn is_current(&self, id: EntityId) -> bool {
        self.entity_id(id.index()) == Some(id)
    }
}

#[derive(Clone, Copy)]
pub struct SaveEnv<'a> {
    pub items: &'a dyn ItemCatalog,
    pub entities: &'a dyn EntityResolver,
    pub pointers: &'a SaveDataRegistry,
    /// Upgrades every recoverable problem to an error.
    pub strict: bool,
}

impl<'a> SaveEnv<'a> {
    pub fn new(
        items: &'a dyn ItemCatalog,
        entities: &'a dyn EntityResolver,
        pointers: &'a SaveDataRegistry,
        strict: bool,
    ) -> Self {
        SaveEnv { items, entities, pointers, strict }
    }
}

/// Resolver for documents that carry no entity references, or tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedEntities {
    pub max_entities: usize,
}

impl EntityResolver for FixedEntities {
    fn max_entities(&self) -> usize {
        self.max_entities
    }

    fn entity_id(&self, index: usize) -> Option<EntityId> {
        (index < self.max_entities).then(|| EntityId::new(index as u32, 0))
    }
}

/// Catalog backed by a list of class names; index 0 is reserved.
#[derive(Debug, Clone, Default)]
pub struct NamedItems {
    pub classnames: Vec<&'static str>,
}

impl ItemCatalog for NamedItems {
    fn item_count(&self) -> usize {
        self.classnames.len() + 1
    }

    fn find_by_classname(&self, classname: &str) -> Option<ItemId> {
        self.classnames
            .iter()
            .position(|&c| c.eq_ignore_ascii_case(classname))
            .map(|i| ItemId(i as u16 + 1))
    }

    fn classname(&self, item: ItemId) -> Option<&str> {
        if item.is_null() {
            return None;
        }
        self.classnames.get(item.index() - 1).copied()
    }
}
