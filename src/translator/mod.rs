pub mod policy;
pub mod scrape;
mod service;

pub use policy::{TranslatorOptions, TranslatorPolicy};
pub use service::Translator;
