//! File text extraction for file indexing.
//!
//! Plain-text file types are indexed directly. Anything else is POSTed as a
//! multipart upload to an Apache Tika server, which returns the extracted
//! plain text in the response body. Files above the configured send
//! threshold are never sent; extraction failures degrade to empty text so a
//! single bad file cannot stall an indexing run.

use crate::config::FilesConfig;
use crate::document::AttachedFile;
use crate::transport::Transport;

/// MIME types whose content can be fed to the index without extraction.
pub const ACCEPTED_TEXT_MIMETYPES: &[&str] = &[
    "text/html",
    "text/plain",
    "text/csv",
    "text/css",
    "text/javascript",
    "text/ecmascript",
];

pub fn is_text(mimetype: &str) -> bool {
    ACCEPTED_TEXT_MIMETYPES.contains(&mimetype)
}

/// Produce the searchable text for an attached file.
pub async fn extract_file_text(
    files: &FilesConfig,
    transport: &dyn Transport,
    file: &AttachedFile,
) -> String {
    if is_text(&file.mimetype) {
        return String::from_utf8_lossy(&file.content).to_string();
    }
    if file.size() > files.tika_send_bytes {
        return String::new();
    }

    let url = format!("{}/tika/form", files.tika_base_url());
    match transport
        .post_file(&url, &file.filename, file.content.clone())
        .await
    {
        Ok(response) if response.status == 200 => response.body,
        Ok(response) => {
            eprintln!(
                "Warning: text extraction failed for {}: error code {}",
                file.filename, response.status
            );
            String::new()
        }
        Err(e) => {
            eprintln!("Warning: text extraction failed for {}: {}", file.filename, e);
            String::new()
        }
    }
}
