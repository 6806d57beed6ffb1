pub mod common;
pub mod device;
pub mod flush;
pub mod migrate;
pub mod outbox;
pub mod storage;
