pub mod banned_symbols;

pub use banned_symbols::{to_banned_symbols_analyzer, BannedSymbol, BannedSymbolsAnalyzer};
