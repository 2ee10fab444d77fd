//! # stixgraph core
//!
//! STIX 2.x バンドルのデータモデルとグラフ射影
//! MITRE ATT&CK エクスポートを読み込み、ラベル分類とプロパティ射影を提供

pub mod classify;
pub mod document;
pub mod error;
pub mod model;
pub mod projection;

pub use classify::*;
pub use document::*;
pub use error::*;
pub use model::*;
pub use projection::*;
