pub mod rss_feed;
pub mod static_feed;

pub use rss_feed::RssFeedSource;
pub use static_feed::StaticSource;
