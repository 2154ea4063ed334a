use std::fmt;

use chrono::{DateTime, Datelike, Month, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ArchiveError;

/// アーカイブAPIが提供する最初の年。
pub const FIRST_ARCHIVE_YEAR: i32 = 1851;

/// キャッシュのパーティションキー（年・月）。
///
/// ストア上では `"2009"` / `"3"` のように先頭ゼロなしの文字列で保持する。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct MonthKey {
    year: i32,
    month: u32,
}

impl MonthKey {
    /// 現在時刻を基準に検証済みの `MonthKey` を作成する。
    ///
    /// # Errors
    /// 年がアーカイブ範囲外、月が 1〜12 以外、または未来の月の場合は
    /// [`ArchiveError::InvalidMonthKey`] を返す。
    pub fn new(year: i32, month: u32) -> Result<Self, ArchiveError> {
        Self::new_as_of(year, month, Utc::now())
    }

    /// `now` を基準に検証する。
    ///
    /// # Errors
    /// [`MonthKey::new`] と同じ。
    pub fn new_as_of(year: i32, month: u32, now: DateTime<Utc>) -> Result<Self, ArchiveError> {
        let invalid = |reason| ArchiveError::InvalidMonthKey {
            year,
            month,
            reason,
        };

        if !(1..=12).contains(&month) {
            return Err(invalid("month must be between 1 and 12"));
        }
        if year < FIRST_ARCHIVE_YEAR {
            return Err(invalid("year predates the archive"));
        }
        if (year, month) > (now.year(), now.month()) {
            return Err(invalid("month lies in the future"));
        }

        Ok(Self { year, month })
    }

    #[must_use]
    pub fn year(self) -> i32 {
        self.year
    }

    #[must_use]
    pub fn month(self) -> u32 {
        self.month
    }

    /// ストアのパーティション列と同じ文字列表現を返す。
    #[must_use]
    pub fn partition(self) -> (String, String) {
        (self.year.to_string(), self.month.to_string())
    }

    /// "March 2009" 形式の表示用ラベル。
    #[must_use]
    pub fn label(self) -> String {
        let name = u8::try_from(self.month)
            .ok()
            .and_then(|m| Month::try_from(m).ok())
            .map_or("Unknown", |m| m.name());
        format!("{name} {}", self.year)
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// 記事に付与されたキーワードタグ（カテゴリと値）。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordTag {
    pub name: String,
    pub value: String,
}

impl KeywordTag {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// キャッシュされる記事ドキュメント。取得後は変更しない。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleRecord {
    pub article_id: String,
    /// 重複排除に使うソース識別子。
    pub web_url: String,
    pub pub_date: String,
    pub year: String,
    pub month: String,
    pub headline: Option<String>,
    pub section_name: Option<String>,
    pub keywords: Vec<KeywordTag>,
}

impl ArticleRecord {
    #[must_use]
    pub fn belongs_to(&self, key: MonthKey) -> bool {
        let (year, month) = key.partition();
        self.year == year && self.month == month
    }
}

/// `pub_date` の先頭から年（4桁）と月（先頭ゼロなし）を導出する。
///
/// `"2009-03-01T05:00:00+0000"` → `("2009", "3")`。
#[must_use]
pub fn derive_partition(pub_date: &str) -> Option<(String, String)> {
    let year = pub_date.get(0..4)?;
    if !year.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if pub_date.get(4..5)? != "-" {
        return None;
    }
    let month: u32 = pub_date
        .get(5..7)
        .filter(|m| m.bytes().all(|b| b.is_ascii_digit()))?
        .parse()
        .ok()?;
    if !(1..=12).contains(&month) {
        return None;
    }
    Some((year.to_string(), month.to_string()))
}
