pub mod lru;
pub mod tile_cache;
