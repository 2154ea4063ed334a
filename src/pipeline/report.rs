use std::str::FromStr;

use serde::Serialize;
use reqwest::Url;
use thiserror::Error;

use super::keywords::{KeywordCount, count_keywords, extract_keywords, rank_keywords};
use crate::error::ArchiveError;
use crate::pipeline::gateway::ArticleCacheGateway;
use crate::store::models::{ArticleRecord, MonthKey};

/// 紙面セクション。`All` はフィルタなし。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Section {
    #[default]
    All,
    World,
    Us,
    NyRegion,
    Business,
    Technology,
    Science,
    Health,
    Sports,
    Opinion,
    Arts,
    Style,
    Travel,
    Jobs,
    RealEstate,
    Autos,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown section `{0}`")]
pub struct UnknownSection(pub String);

impl Section {
    pub const ALL: [Section; 16] = [
        Section::All,
        Section::World,
        Section::Us,
        Section::NyRegion,
        Section::Business,
        Section::Technology,
        Section::Science,
        Section::Health,
        Section::Sports,
        Section::Opinion,
        Section::Arts,
        Section::Style,
        Section::Travel,
        Section::Jobs,
        Section::RealEstate,
        Section::Autos,
    ];

    #[must_use]
    pub fn slug(self) -> &'static str {
        match self {
            Section::All => "all",
            Section::World => "world",
            Section::Us => "us",
            Section::NyRegion => "nyregion",
            Section::Business => "business",
            Section::Technology => "technology",
            Section::Science => "science",
            Section::Health => "health",
            Section::Sports => "sports",
            Section::Opinion => "opinion",
            Section::Arts => "arts",
            Section::Style => "style",
            Section::Travel => "travel",
            Section::Jobs => "jobs",
            Section::RealEstate => "realestate",
            Section::Autos => "autos",
        }
    }

    /// ダッシュボードのドロップダウンに出す表示名。
    #[must_use]
    pub fn display_name(self) -> &'static str {
        match self {
            Section::All => "All Sections",
            Section::World => "World",
            Section::Us => "U.S.",
            Section::NyRegion => "N.Y. / Region",
            Section::Business => "Business",
            Section::Technology => "Technology",
            Section::Science => "Science",
            Section::Health => "Health",
            Section::Sports => "Sports",
            Section::Opinion => "Opinion",
            Section::Arts => "Arts",
            Section::Style => "Style",
            Section::Travel => "Travel",
            Section::Jobs => "Jobs",
            Section::RealEstate => "Real Estate",
            Section::Autos => "Autos",
        }
    }

    /// `web_url` の日付直後のパス要素として現れる値。
    fn url_segments(self) -> &'static [&'static str] {
        match self {
            Section::All => &[],
            Section::World => &["world"],
            Section::Us => &["us", "national"],
            Section::NyRegion => &["nyregion"],
            Section::Business => &["business"],
            Section::Technology => &["technology"],
            Section::Science => &["science"],
            Section::Health => &["health"],
            Section::Sports => &["sports"],
            Section::Opinion => &["opinion"],
            Section::Arts => &["arts", "movies", "books", "theater"],
            Section::Style => &["style", "fashion"],
            Section::Travel => &["travel"],
            Section::Jobs => &["jobs"],
            Section::RealEstate => &["realestate"],
            Section::Autos => &["automobiles", "autos"],
        }
    }

    /// アーカイブの `section_name` に現れる値。URL を持たない古い記事で使う。
    fn section_names(self) -> &'static [&'static str] {
        match self {
            Section::All => &[],
            Section::World => &["World"],
            Section::Us => &["U.S.", "National"],
            Section::NyRegion => &["New York", "N.Y. / Region"],
            Section::Business => &["Business Day", "Business"],
            Section::Technology => &["Technology"],
            Section::Science => &["Science"],
            Section::Health => &["Health"],
            Section::Sports => &["Sports"],
            Section::Opinion => &["Opinion"],
            Section::Arts => &["Arts", "Movies", "Books", "Theater"],
            Section::Style => &["Style", "Fashion & Style"],
            Section::Travel => &["Travel"],
            Section::Jobs => &["Jobs"],
            Section::RealEstate => &["Real Estate"],
            Section::Autos => &["Automobiles", "Autos"],
        }
    }

    /// URL のセクション要素を優先し、取れなければ `section_name` で判定する。
    #[must_use]
    pub fn matches(self, record: &ArticleRecord) -> bool {
        if self == Section::All {
            return true;
        }
        if let Some(segment) = url_section(&record.web_url) {
            return self
                .url_segments()
                .iter()
                .any(|candidate| segment.eq_ignore_ascii_case(candidate));
        }
        record.section_name.as_deref().is_some_and(|name| {
            self.section_names()
                .iter()
                .any(|candidate| name.trim().eq_ignore_ascii_case(candidate))
        })
    }
}

/// `/2009/03/02/business/...` のような URL から、日付要素の次のパス要素を取り出す。
fn url_section(web_url: &str) -> Option<String> {
    let url = Url::parse(web_url).ok()?;
    let segments = url.path_segments()?;
    let mut saw_date = false;
    for segment in segments {
        if !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit()) {
            saw_date = true;
            continue;
        }
        // The trailing element is the article slug, not a section.
        if saw_date && !segment.is_empty() && !segment.contains('.') {
            return Some(segment.to_ascii_lowercase());
        }
        return None;
    }
    None
}

impl FromStr for Section {
    type Err = UnknownSection;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let wanted = raw.trim().to_ascii_lowercase();
        Section::ALL
            .into_iter()
            .find(|section| section.slug() == wanted)
            .ok_or_else(|| UnknownSection(raw.to_string()))
    }
}

/// チャート描画側に渡す月次キーワードレポート。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeywordReport {
    pub year: i32,
    pub month: u32,
    pub label: String,
    pub section: &'static str,
    pub article_count: usize,
    pub keywords: Vec<KeywordCount>,
}

/// 記事集合からセクションで絞り込み、上位 `top_n` 件のキーワードレポートを作る。
#[must_use]
pub fn build_report(
    key: MonthKey,
    records: &[ArticleRecord],
    section: Section,
    top_n: usize,
) -> KeywordReport {
    let selected: Vec<ArticleRecord> = records
        .iter()
        .filter(|record| section.matches(record))
        .cloned()
        .collect();
    let counts = count_keywords(&extract_keywords(&selected));

    KeywordReport {
        year: key.year(),
        month: key.month(),
        label: key.label(),
        section: section.slug(),
        article_count: selected.len(),
        keywords: rank_keywords(&counts, top_n),
    }
}

/// ゲートウェイ経由で記事を揃えてからレポートを作る。
///
/// # Errors
/// 取得・保存の失敗は [`ArchiveError`] として返す。
pub async fn month_report(
    gateway: &ArticleCacheGateway,
    key: MonthKey,
    section: Section,
    top_n: usize,
) -> Result<KeywordReport, ArchiveError> {
    let timer = gateway.metrics().report_duration.start_timer();
    let records = gateway.articles_for(key).await?;
    let report = build_report(key, &records, section, top_n);
    timer.observe_duration();
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::models::KeywordTag;
    use chrono::{TimeZone, Utc};
    use rstest::rstest;

    fn record(id: &str, section: Option<&str>, keywords: &[&str]) -> ArticleRecord {
        ArticleRecord {
            article_id: id.to_string(),
            web_url: format!("nyt://article/{id}"),
            pub_date: "2010-08-15T04:00:00+0000".to_string(),
            year: "2010".to_string(),
            month: "8".to_string(),
            headline: None,
            section_name: section.map(str::to_string),
            keywords: keywords
                .iter()
                .map(|value| KeywordTag::new("subject", *value))
                .collect(),
        }
    }

    fn august_2010() -> MonthKey {
        MonthKey::new_as_of(2010, 8, Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap())
            .unwrap()
    }

    #[test]
    fn section_slugs_round_trip() {
        for section in Section::ALL {
            assert_eq!(section.slug().parse::<Section>(), Ok(section));
        }
        assert_eq!("NYRegion".parse::<Section>(), Ok(Section::NyRegion));
        assert_eq!(
            "fashion".parse::<Section>(),
            Err(UnknownSection("fashion".to_string()))
        );
    }

    #[test]
    fn report_filters_by_section_and_truncates() {
        let records = vec![
            record("1", Some("National"), &["Floods", "Pakistan"]),
            record("2", Some("World"), &["Pakistan", "Floods"]),
            record("3", Some("World"), &["Pakistan"]),
            record("4", None, &["Mosques"]),
        ];

        let report = build_report(august_2010(), &records, Section::World, 1);

        assert_eq!(report.label, "August 2010");
        assert_eq!(report.section, "world");
        assert_eq!(report.article_count, 2);
        assert_eq!(
            report.keywords,
            vec![KeywordCount {
                keyword: "Pakistan".to_string(),
                count: 2
            }]
        );
    }

    #[test]
    fn all_section_keeps_every_record() {
        let records = vec![
            record("1", Some("U.S."), &["Floods"]),
            record("2", None, &["Floods"]),
        ];

        let report = build_report(august_2010(), &records, Section::All, 10);

        assert_eq!(report.article_count, 2);
        assert_eq!(report.keywords[0].count, 2);
    }

    fn archived(section_name: &str, web_url: &str) -> ArticleRecord {
        ArticleRecord {
            web_url: web_url.to_string(),
            ..record("x", Some(section_name), &[])
        }
    }

    #[rstest]
    #[case(Section::Business, "Business Day", "https://www.nytimes.com/2009/03/02/business/02bank.html")]
    #[case(Section::NyRegion, "New York", "https://www.nytimes.com/2009/03/02/nyregion/02subway.html")]
    #[case(Section::Autos, "Automobiles", "https://www.nytimes.com/2009/03/01/automobiles/01auto.html")]
    #[case(Section::RealEstate, "Real Estate", "https://www.nytimes.com/2009/03/01/realestate/01deal.html")]
    #[case(Section::Us, "U.S.", "https://www.nytimes.com/2009/03/03/us/politics/03obama.html")]
    fn archive_sections_match_their_dropdown_slug(
        #[case] section: Section,
        #[case] section_name: &str,
        #[case] web_url: &str,
    ) {
        let article = archived(section_name, web_url);

        assert!(section.matches(&article));
        for other in Section::ALL {
            if other != section && other != Section::All {
                assert!(!other.matches(&article), "{other:?} matched {web_url}");
            }
        }
    }

    #[test]
    fn url_section_wins_over_section_name() {
        let article = archived(
            "Business Day",
            "https://www.nytimes.com/2009/03/02/technology/02chip.html",
        );
        assert!(Section::Technology.matches(&article));
        assert!(!Section::Business.matches(&article));
    }

    #[test]
    fn section_name_is_used_when_url_has_no_section() {
        let article = record("1", Some("new york"), &[]);
        assert!(Section::NyRegion.matches(&article));
        assert!(!Section::Us.matches(&article));

        let slug_only = archived("Automobiles", "https://www.nytimes.com/2009/03/01/01auto.html");
        assert!(Section::Autos.matches(&slug_only));
    }
}
