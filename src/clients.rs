pub mod archive;

pub use archive::{ArchiveClient, ArchiveClientConfig, ArchiveDoc, ArchiveSource};
