use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// 词典中的一条释义
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordDataEntry {
    /// 词条正文
    pub context: String,
    /// 词性等附加说明
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// 音译
    pub translit: String,
    /// 释义
    pub translation: String,
}

/// 一个词的全部释义，查不到时为空
pub type SingleWordData = Vec<WordDataEntry>;

/// 词 -> 释义列表
pub type WordsData = BTreeMap<String, SingleWordData>;
