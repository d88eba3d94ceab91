//! TUI (Terminal User Interface) モジュール
//!
//! ratatuiを使用したインタラクティブなターミナルUI

pub mod dashboard;
pub mod terminal;

pub use dashboard::run_dashboard;
