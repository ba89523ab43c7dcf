pub mod accumulator;
pub mod checkpoint;
pub mod config;
pub mod diff;
pub mod mediawiki;
pub mod narrative;
pub mod pool;
pub mod report;
pub mod runtime;
pub mod scanner;
pub mod watch;
