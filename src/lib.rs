pub mod error;
pub mod types;
pub mod header;
pub mod block;
pub mod node;
pub mod reader;
pub mod structure;
pub mod transform;
pub mod composite;
pub mod writer;
pub mod filename;
pub mod dictionary;

pub use error::{EvioError, Result};
pub use types::{ByteOrder, DataType, StructureType};
pub use header::StructureHeader;
pub use block::{BlockHeader, BlockHeaderV2, BlockHeaderV4, VersionedBlockHeader};
pub use node::{DataView, EvioNode, NodeArena, NodeId, OwnedData};
pub use reader::{CompactReader, ReaderOptions};
pub use structure::{EvioEvent, EvioStructure};
pub use writer::{EventWriter, WriterOptions};
pub use dictionary::{NameProvider, NumericNameProvider};
