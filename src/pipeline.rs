pub mod gateway;
pub mod keywords;
pub mod report;

pub use gateway::{ArticleCacheGateway, GatewaySettings};
pub use keywords::{ArticleKeywords, KeywordCount, count_keywords, extract_keywords, rank_keywords};
pub use report::{KeywordReport, Section, build_report};
