//! # stixgraph CLI Library
//!
//! STIXグラフローダーのコマンドラインインターフェース
//! バンドルのロード、ノード埋め込み、類似検索をコマンドラインから実行

pub mod commands;

pub use commands::*;
