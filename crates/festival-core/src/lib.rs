// Library root: match table, aggregation, and workbook persistence for the
// festival standings tool.

pub mod config;
pub mod export;
pub mod keepers;
pub mod matches;
pub mod report;
pub mod section;
pub mod standings;
pub mod workbook;
