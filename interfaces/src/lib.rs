pub mod defs;

pub use defs::{AudioArtifact, EpisodeMode, NewsletterItem};
