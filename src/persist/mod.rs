//! Chunked binary scene persistence
//!
//! The on-disk shape is a sequential stream of per-node chunks, each a
//! fixed header plus a block of tagged entity records, 4-byte aligned,
//! with no table of contents. Loading reads until the supplied byte
//! range is exhausted and re-registers each surviving entity into the
//! caller's scene index.

pub mod codec;
pub mod io;
pub mod records;

pub use codec::{
    load_index, save_index, ChunkReader, ChunkWriter, LayerVisibility, LoadParams, CHUNK_VERSION,
};
pub use io::{load_scene_file, save_scene_file, scene_path};
