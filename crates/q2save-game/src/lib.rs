#![allow(clippy::too_many_arguments, clippy::field_reassign_with_default,
         clippy::float_cmp, clippy::needless_range_loop, clippy::type_complexity,
         clippy::new_without_default, clippy::len_without_is_empty)]
// Game module: entity, client and level state plus the save/load entry points

pub mod game_import;
pub mod g_local;
pub mod g_items;
pub mod dispatch;
pub mod g_save;

pub use g_save::{
    build_save_registries, can_save, init_save, read_game, read_game_document, read_level,
    read_level_document, write_game, write_game_document, write_level, write_level_document,
    LoadReport, SaveConfig, SaveContext, SaveRegistries,
};
