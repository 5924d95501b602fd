//! 查词结果解析
//!
//! 词典把结果块交替放在两种样式里，按文档顺序交错合并后逐块解析。

use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::browser::RawBlock;
use crate::models::{SingleWordData, WordDataEntry};

/// 查词输入框
pub const INPUT_SELECTOR: &str = r#"input[type="text"]"#;
/// 提交按钮
pub const SUBMIT_SELECTOR: &str = r#"input[type="image"]"#;
/// 奇数位置的结果块
pub const ODD_BLOCK_SELECTOR: &str = ".cycle1";
/// 偶数位置的结果块
pub const EVEN_BLOCK_SELECTOR: &str = ".cycle-1";

/// 交错合并两个列表：odd[0], even[0], odd[1], even[1] ...，较长列表的剩余部分追加在末尾
pub fn merge_interleaved<T>(odd: Vec<T>, even: Vec<T>) -> Vec<T> {
    let mut merged = Vec::with_capacity(odd.len() + even.len());
    let mut odd = odd.into_iter();
    let mut even = even.into_iter();

    loop {
        let a = odd.next();
        let b = even.next();
        if a.is_none() && b.is_none() {
            break;
        }
        merged.extend(a);
        merged.extend(b);
    }

    merged
}

/// 解码 `&#1234;` 形式的数字实体并去掉首尾空白
pub fn decode_html(text: &str) -> String {
    static ENTITY: OnceLock<Regex> = OnceLock::new();
    let entity = ENTITY.get_or_init(|| Regex::new(r"&#(\d+);").expect("实体正则必须合法"));

    entity
        .replace_all(text, |caps: &Captures| {
            caps[1]
                .parse::<u32>()
                .ok()
                .and_then(char::from_u32)
                .map(String::from)
                .unwrap_or_else(|| caps[0].to_string())
        })
        .trim()
        .to_string()
}

/// 把原始结果块转换为释义列表
///
/// 带附加说明的块会更新当前说明，缺少正文、音译或释义的块被跳过。
/// 说明一直沿用到下一个自身不带说明的完整块，该块使用后清除。
pub fn collect_entries(blocks: Vec<RawBlock>) -> SingleWordData {
    let mut entries = Vec::new();
    let mut comment: Option<String> = None;

    for block in blocks {
        let has_comment = block.word_type.is_some();
        if let Some(word_type) = &block.word_type {
            comment = Some(decode_html(word_type));
        }

        let (Some(context), Some(translit), Some(translation)) =
            (block.word, block.translit, block.translation)
        else {
            continue;
        };

        entries.push(WordDataEntry {
            context: decode_html(&context),
            comment: comment.clone(),
            translit: decode_html(&translit),
            translation: decode_html(&translation),
        });

        if !has_comment {
            comment = None;
        }
    }

    entries
}
