pub mod chapterizer;
pub mod converter;
pub mod importer;
pub mod recovery;
pub mod sanitizer;
