pub mod chat;
pub mod diagnostics;
pub mod meta;
pub mod metrics;
pub mod spec;
