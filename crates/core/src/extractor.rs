use crate::error::IngestError;
use lopdf::Document;
use regex::Regex;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Turns a document file into plain text.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, path: &Path) -> Result<String, IngestError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PdfTextExtractor;

impl TextExtractor for PdfTextExtractor {
    fn extract(&self, path: &Path) -> Result<String, IngestError> {
        let document =
            Document::load(path).map_err(|error| IngestError::PdfParse(error.to_string()))?;

        let mut pages = Vec::new();
        for page_no in document.get_pages().keys() {
            let text = document
                .extract_text(&[*page_no])
                .map_err(|error| IngestError::PdfParse(error.to_string()))?;
            if !text.trim().is_empty() {
                pages.push(text);
            }
        }

        if pages.is_empty() {
            return Err(IngestError::EmptyDocument(path.display().to_string()));
        }
        Ok(pages.join("\n"))
    }
}

/// Reads the body of a Word document (`word/document.xml`), one line per
/// non-empty paragraph.
#[derive(Debug, Default, Clone, Copy)]
pub struct DocxTextExtractor;

impl TextExtractor for DocxTextExtractor {
    fn extract(&self, path: &Path) -> Result<String, IngestError> {
        let file = File::open(path)?;
        let mut archive =
            zip::ZipArchive::new(file).map_err(|error| IngestError::Docx(error.to_string()))?;
        let mut xml = String::new();
        archive
            .by_name("word/document.xml")
            .map_err(|error| IngestError::Docx(error.to_string()))?
            .read_to_string(&mut xml)?;

        docx_xml_to_text(&xml)
    }
}

pub fn docx_xml_to_text(xml: &str) -> Result<String, IngestError> {
    let paragraph_re = Regex::new(r"(?s)<w:p[ >].*?</w:p>")?;
    let run_re = Regex::new(r"(?s)<w:t(?: [^>]*)?>(.*?)</w:t>")?;

    let paragraphs = paragraph_re
        .find_iter(xml)
        .map(|paragraph| {
            run_re
                .captures_iter(paragraph.as_str())
                .filter_map(|capture| capture.get(1))
                .map(|run| unescape_xml(run.as_str()))
                .collect::<String>()
        })
        .filter(|text| !text.trim().is_empty())
        .collect::<Vec<_>>();

    Ok(paragraphs.join("\n"))
}

fn unescape_xml(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn extract(&self, path: &Path) -> Result<String, IngestError> {
        Ok(std::fs::read_to_string(path)?)
    }
}

/// Extractors keyed by lowercase file extension.
pub struct ExtractorSet {
    by_extension: BTreeMap<String, Box<dyn TextExtractor>>,
}

impl Default for ExtractorSet {
    fn default() -> Self {
        Self::empty()
            .with("pdf", PdfTextExtractor)
            .with("docx", DocxTextExtractor)
            .with("txt", PlainTextExtractor)
            .with("md", PlainTextExtractor)
    }
}

impl ExtractorSet {
    pub fn empty() -> Self {
        Self {
            by_extension: BTreeMap::new(),
        }
    }

    pub fn with(mut self, extension: &str, extractor: impl TextExtractor + 'static) -> Self {
        self.by_extension
            .insert(extension.to_ascii_lowercase(), Box::new(extractor));
        self
    }

    pub fn supports(&self, path: &Path) -> bool {
        self.for_path(path).is_some()
    }

    pub fn extensions(&self) -> impl Iterator<Item = &str> {
        self.by_extension.keys().map(String::as_str)
    }

    fn for_path(&self, path: &Path) -> Option<&dyn TextExtractor> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        self.by_extension.get(&extension).map(Box::as_ref)
    }

    /// Missing files and unknown extensions are errors here; the indexer
    /// turns them into skipped entries.
    pub fn extract(&self, path: &Path) -> Result<String, IngestError> {
        if !path.is_file() {
            return Err(IngestError::MissingFile(path.display().to_string()));
        }
        let extractor = self
            .for_path(path)
            .ok_or_else(|| IngestError::UnsupportedFormat(path.display().to_string()))?;
        extractor.extract(path)
    }
}

/// Office writes `~$name.docx` lock files next to open documents.
pub fn is_lock_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with("~$"))
}

pub fn discover_documents(folder: &Path, extractors: &ExtractorSet) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() || is_lock_file(entry.path()) {
            continue;
        }
        if extractors.supports(entry.path()) {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}
