pub mod word;

pub use word::{SingleWordData, WordDataEntry, WordsData};
