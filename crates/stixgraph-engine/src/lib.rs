//! # stixgraph engine
//!
//! STIXバンドルのグラフロードパイプライン
//! SDO/SROのupsert、埋め込み関係の合成、ノード埋め込みと類似検索を提供

pub mod embedding;
pub mod error;
pub mod loader;
pub mod options;
pub mod report;
pub mod retrieval;
pub mod synthesis;
mod upsert;

pub use embedding::*;
pub use error::*;
pub use loader::BundleLoader;
pub use options::*;
pub use report::*;
pub use retrieval::*;
pub use synthesis::{TacticIndex, CONTAINS_TECHNIQUE, REFERENCES_TACTIC};
