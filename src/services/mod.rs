pub mod index_store;
pub mod path_util;
pub mod settings_store;
pub mod sync_engine;
