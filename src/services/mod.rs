//! Supporting services: text normalization, metadata lookup, events, logging

pub mod logging;
pub mod metadata;
pub mod notifications;
pub mod text_utils;

pub use logging::{LiveLog, LogLine, init_tracing};
pub use metadata::{MetadataProvider, MetadataRegistry, NoopProvider, TitleMetadata};
pub use notifications::{EventBus, IndexerEvent, LibraryEvent, ScanCounters};
