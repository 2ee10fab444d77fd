//! # stixgraph store
//!
//! Provenance付きプロパティグラフストア
//! ノード・エッジの冪等なupsertと、メモリ/SQLiteバックエンドを提供

pub mod config;
pub mod error;
pub mod memory;
pub mod model;
pub mod provenance;
pub mod session;
pub mod sqlite;

pub use config::*;
pub use error::StoreError;
pub use memory::*;
pub use model::*;
pub use provenance::*;
pub use session::*;
pub use sqlite::*;
