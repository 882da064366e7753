#![allow(clippy::too_many_arguments, clippy::type_complexity, clippy::new_without_default,
         clippy::len_without_is_empty, clippy::float_cmp, clippy::needless_range_loop,
         clippy::manual_range_contains)]
// Save system shared by the game module: type descriptors, schemas, the named
// pointer registry and the document read/write engines.

pub mod q_shared;
pub mod save_error;
pub mod tag_arena;
pub mod save_data;
pub mod save_type;
pub mod save_struct;
pub mod save_env;
pub mod save_read;
pub mod save_write;
pub mod save_document;

pub use save_document::{SaveDocument, ENGINE_VERSION, SAVE_FORMAT_VERSION};
pub use save_error::{SaveError, SaveWarning, WarningKind};
