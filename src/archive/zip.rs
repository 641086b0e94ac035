use crate::error::Result;
use std::io::{Cursor, Write};
use tracing::debug;
use zip::CompressionMethod;
use zip::write::FileOptions;

/// One page ready to be written into an archive
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageFile {
    /// Entry file name (`NNN.ext`)
    pub name: String,
    /// Image bytes
    pub bytes: Vec<u8>,
}

/// Metadata written to `ComicInfo.xml` in comic archives
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ComicMetadata {
    /// Series name
    pub series: String,
    /// Chapter name
    pub title: String,
    /// Number of pages in the archive
    pub page_count: usize,
}

impl ComicMetadata {
    /// Render as a ComicRack-style `ComicInfo.xml` document
    pub fn to_xml(&self) -> String {
        format!(
            concat!(
                "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n",
                "<ComicInfo xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\" ",
                "xmlns:xsd=\"http://www.w3.org/2001/XMLSchema\">\n",
                "  <Title>{}</Title>\n",
                "  <Series>{}</Series>\n",
                "  <PageCount>{}</PageCount>\n",
                "</ComicInfo>\n"
            ),
            escape_xml(&self.title),
            escape_xml(&self.series),
            self.page_count
        )
    }
}

/// Entry name of the comic metadata file
pub const COMIC_INFO_ENTRY: &str = "ComicInfo.xml";

/// Archive encoder for zip and cbz output
pub struct ZipCodec;

impl ZipCodec {
    /// Encode pages under a `<folder>/` directory entry
    pub fn folder_archive(folder: &str, pages: &[PageFile]) -> Result<Vec<u8>> {
        debug!(folder, pages = pages.len(), "encoding zip archive");
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let stored = FileOptions::default().compression_method(CompressionMethod::Stored);

        writer.add_directory(format!("{folder}/"), stored)?;
        for page in pages {
            writer.start_file(format!("{folder}/{}", page.name), stored)?;
            writer.write_all(&page.bytes)?;
        }

        Ok(writer.finish()?.into_inner())
    }

    /// Encode pages flat at the archive root, followed by `ComicInfo.xml`
    pub fn comic_archive(pages: &[PageFile], metadata: &ComicMetadata) -> Result<Vec<u8>> {
        debug!(
            series = %metadata.series,
            title = %metadata.title,
            pages = pages.len(),
            "encoding comic archive"
        );
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let stored = FileOptions::default().compression_method(CompressionMethod::Stored);

        for page in pages {
            writer.start_file(page.name.as_str(), stored)?;
            writer.write_all(&page.bytes)?;
        }

        let deflated = FileOptions::default().compression_method(CompressionMethod::Deflated);
        writer.start_file(COMIC_INFO_ENTRY, deflated)?;
        writer.write_all(metadata.to_xml().as_bytes())?;

        Ok(writer.finish()?.into_inner())
    }
}

fn escape_xml(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}
