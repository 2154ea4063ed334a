//! 記事のキーワードタグから出現頻度を集計する。
use std::collections::HashMap;

use serde::Serialize;

use crate::store::models::ArticleRecord;

/// 分類用の管理タグ。トピックではないので集計から除く。
pub const ADMINISTRATIVE_CATEGORY: &str = "type_of_material";

/// 1 記事分のキーワード値。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleKeywords {
    pub article_id: String,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeywordCount {
    pub keyword: String,
    pub count: usize,
}

/// 各記事から管理タグ以外のキーワード値を取り出す。
///
/// 記事内の順序も記事間の順序も入力のまま保つ。
#[must_use]
pub fn extract_keywords(records: &[ArticleRecord]) -> Vec<ArticleKeywords> {
    records
        .iter()
        .map(|record| ArticleKeywords {
            article_id: record.article_id.clone(),
            keywords: record
                .keywords
                .iter()
                .filter(|tag| tag.name != ADMINISTRATIVE_CATEGORY)
                .map(|tag| tag.value.clone())
                .collect(),
        })
        .collect()
}

/// すべての記事にわたってキーワード値ごとの出現回数を数える。
#[must_use]
pub fn count_keywords(pairs: &[ArticleKeywords]) -> HashMap<String, usize> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for keyword in pairs.iter().flat_map(|pair| &pair.keywords) {
        *counts.entry(keyword.clone()).or_insert(0) += 1;
    }
    counts
}

/// 出現回数の降順に並べ、同数はキーワードの辞書順で決めて `top_n` 件に切り詰める。
#[must_use]
pub fn rank_keywords(counts: &HashMap<String, usize>, top_n: usize) -> Vec<KeywordCount> {
    let mut ranked: Vec<KeywordCount> = counts
        .iter()
        .map(|(keyword, &count)| KeywordCount {
            keyword: keyword.clone(),
            count,
        })
        .collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.keyword.cmp(&b.keyword)));
    ranked.truncate(top_n);
    ranked
}
