//! Boundary between the pyramid and whatever supplies imagery

use crate::TileKey;

/// Maps tile keys to opaque source identifiers.
///
/// A locator answers "where would this tile's imagery come from" as a string
/// the retrieval layer understands (a URL, a file path, an archive member).
/// The engine never interprets the string; it only forwards it with tile
/// requests. `None` means the source has nothing for that tile, so no
/// request should be made.
pub trait TileLocator: Send + Sync {
    fn locate(&self, key: &TileKey) -> Option<String>;
}
