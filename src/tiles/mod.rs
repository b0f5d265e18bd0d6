//! Tile identity, storage and the commit pipeline.
//!
//! [`MapTileRenderer`] renders one tile at a time through a
//! [`RenderBackend`](crate::render::RenderBackend) and hands the image to the
//! [`TileWriteCoordinator`], which writes it only when its hash changed.
//! Failed renders are requeued on the host's [`RenderQueue`] a bounded
//! number of times.

mod coordinator;
mod key;
mod notify;
mod pipeline;
mod queue;
mod stats;
mod storage;

pub use coordinator::*;
pub use key::*;
pub use notify::*;
pub use pipeline::*;
pub use queue::*;
pub use stats::*;
pub use storage::*;
