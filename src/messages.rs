//! User-facing texts and button menus.
//!
//! Every string the bot sends on its own initiative lives here, so tests can
//! assert on them without a transport. Failure texts live with the error
//! variants in [`crate::error`].

use crate::config::CompressionLevel;
use crate::dispatch::Action;
use crate::session::{FileKind, FileRecord};

/// Reply to `/start`.
pub const WELCOME: &str = "🤖 Welcome to PDF Utility Bot!

I can help you with various PDF operations:

📄 Available Features:
• Compress PDF (reduce file size)
• Encrypt PDF (password protection)
• Decrypt PDF (remove password)
• Split PDF (extract pages)
• Merge PDFs (combine multiple files)
• PDF to Word conversion
• Word to PDF conversion
• PDF to Images
• Extract text from PDF
• Images to PDF

How to use:
Simply send me a PDF file and select the operation you want to perform!

Use /help for more details.";

const HELP_BODY: &str = "📖 How to Use PDF Utility Bot

1. Compress PDF
   • Send a PDF file
   • Choose \"Compress\"
   • Select compression level (Low/Medium/High)

2. Encrypt PDF
   • Send a PDF file
   • Choose \"Encrypt\"
   • Enter password when prompted

3. Decrypt PDF
   • Send an encrypted PDF
   • Choose \"Decrypt\"
   • Enter the correct password

4. Split PDF
   • Send a PDF file
   • Choose \"Split\"
   • Specify page ranges (e.g., 1-5, 7, 9-12)

5. Merge PDFs
   • Send multiple PDF files
   • Choose \"Merge\" after uploading all
   • Files will be combined in order

6. Convert to Word
   • Send a PDF file
   • Choose \"To Word\"

7. Convert to PDF
   • Send a Word document
   • Choose \"Convert to PDF\"

8. PDF to Images
   • Send a PDF file
   • Choose \"To Images\"
   • Receive each page as an image

9. Extract Text
   • Send a PDF file
   • Choose \"Extract Text\"

10. Images to PDF
   • Send one or more images
   • Choose \"Create PDF\"

Use /cancel to abandon a pending step.";

/// Reply to `/help`, including the configured upload limit.
pub fn help(max_upload_mb: u64) -> String {
    format!(
        "{HELP_BODY}\n\n⚠️ Limits:\n• Maximum file size: {max_upload_mb} MB\n\
         • Files are automatically deleted after processing"
    )
}

pub const ENCRYPT_PROMPT: &str =
    "🔒 Please enter a password to encrypt the PDF:\n\nThe password should be strong and memorable.";

pub const DECRYPT_PROMPT: &str = "🔓 Please enter the password to decrypt the PDF:";

pub const RENAME_PROMPT: &str = "📝 Please enter the new name for your PDF file:\n\n\
Example: my_document\n(Don't include .pdf extension, it will be added automatically)";

pub const MENU_PROMPT: &str = "Please select an operation:";

pub const DOWNLOADED: &str = "✅ File downloaded successfully!";

pub const CANCELLED: &str = "Operation cancelled.";

pub const NOTHING_TO_CANCEL: &str = "Nothing to cancel.";

/// Status shown while an upload is fetched.
pub fn downloading(name: &str, size_bytes: u64) -> String {
    format!(
        "⏳ Downloading {name}...\nSize: {:.2} MB\n\nThis may take a moment...",
        megabytes(size_bytes)
    )
}

/// Prompt for the split page selection.
pub fn split_prompt(total_pages: usize) -> String {
    format!(
        "📄 This PDF has {total_pages} pages.\n\n\
         Please specify which pages to extract:\n\n\
         Examples:\n\
         • Single page: 5\n\
         • Range: 1-10\n\
         • Multiple: 1-5, 8, 10-15\n\
         • All pages: 1-{total_pages}"
    )
}

/// Merge confirmation text listing the PDFs in merge order.
pub fn merge_listing(batch: &[FileRecord]) -> String {
    let list = batch
        .iter()
        .enumerate()
        .map(|(i, f)| format!("{}. {}", i + 1, f.original_name))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "📑 Ready to merge {} PDFs:\n\n{list}\n\nFiles will be merged in this order.",
        batch.len()
    )
}

/// Compression report: sizes in MB and the reduction, if any.
pub fn compression_report(original_bytes: u64, compressed_bytes: u64) -> String {
    let original = megabytes(original_bytes);
    let compressed = megabytes(compressed_bytes);
    let reduction = if compressed_bytes < original_bytes && original_bytes > 0 {
        let pct = (original_bytes - compressed_bytes) as f64 / original_bytes as f64 * 100.0;
        format!("Reduced by: {pct:.1}%")
    } else {
        "File size similar (PDF was already optimized)".to_string()
    };
    format!(
        "✅ Compression complete!\n\nOriginal: {original:.2} MB\nCompressed: {compressed:.2} MB\n{reduction}"
    )
}

pub(crate) fn megabytes(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}

// ── Buttons ──────────────────────────────────────────────────────────────

/// Label shown on the button for `action`.
pub fn button_label(action: Action) -> &'static str {
    match action {
        Action::Compress => "🗜 Compress",
        Action::CompressLevel(CompressionLevel::Low) => "Low (Best Quality)",
        Action::CompressLevel(CompressionLevel::Medium) => "Medium",
        Action::CompressLevel(CompressionLevel::High) => "High (Smallest Size)",
        Action::Encrypt => "🔒 Encrypt",
        Action::Decrypt => "🔓 Decrypt",
        Action::Split => "✂️ Split",
        Action::Merge => "🔗 Merge PDFs",
        Action::ConfirmMerge => "✅ Merge Now",
        Action::CancelMerge => "❌ Cancel",
        Action::Rename => "📝 Rename",
        Action::PdfToWord => "📄 To Word",
        Action::WordToPdf => "📄 Convert to PDF",
        Action::PdfToImages => "🖼 To Images",
        Action::ExtractText => "📋 Extract Text",
        Action::ImagesToPdf => "📄 Create PDF",
    }
}

/// Operation menu shown after an upload of `kind`.
pub fn menu_for(kind: FileKind) -> Vec<Vec<Action>> {
    match kind {
        FileKind::Pdf => vec![
            vec![Action::Compress, Action::Encrypt],
            vec![Action::Decrypt, Action::Split],
            vec![Action::Merge, Action::Rename],
            vec![Action::PdfToWord, Action::PdfToImages],
            vec![Action::ExtractText],
        ],
        FileKind::Docx => vec![vec![Action::WordToPdf]],
        FileKind::Jpg | FileKind::Jpeg | FileKind::Png => vec![vec![Action::ImagesToPdf]],
    }
}

pub fn compression_menu() -> Vec<Vec<Action>> {
    vec![
        vec![
            Action::CompressLevel(CompressionLevel::Low),
            Action::CompressLevel(CompressionLevel::Medium),
        ],
        vec![Action::CompressLevel(CompressionLevel::High)],
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn help_mentions_configured_limit() {
        assert!(help(20).contains("Maximum file size: 20 MB"));
    }

    #[test]
    fn pdf_menu_offers_every_pdf_operation() {
        let tags: Vec<_> = menu_for(FileKind::Pdf).concat().into_iter().map(Action::tag).collect();
        assert_eq!(
            tags,
            [
                "compress",
                "encrypt",
                "decrypt",
                "split",
                "merge",
                "rename",
                "pdf_to_word",
                "pdf_to_images",
                "extract_text"
            ]
        );
        assert_eq!(menu_for(FileKind::Png), vec![vec![Action::ImagesToPdf]]);
        assert_eq!(menu_for(FileKind::Docx), vec![vec![Action::WordToPdf]]);
    }

    #[test]
    fn compression_report_shows_reduction() {
        let text = compression_report(4 * 1024 * 1024, 1024 * 1024);
        assert!(text.contains("Original: 4.00 MB"), "{text}");
        assert!(text.contains("Compressed: 1.00 MB"), "{text}");
        assert!(text.contains("Reduced by: 75.0%"), "{text}");

        let text = compression_report(1000, 1200);
        assert!(text.contains("already optimized"), "{text}");
    }

    #[test]
    fn merge_listing_numbers_files() {
        let batch: Vec<_> = ["x.pdf", "y.pdf"]
            .iter()
            .map(|n| FileRecord {
                path: PathBuf::from(n),
                original_name: n.to_string(),
                kind: FileKind::Pdf,
            })
            .collect();
        let text = merge_listing(&batch);
        assert!(text.starts_with("📑 Ready to merge 2 PDFs"));
        assert!(text.contains("1. x.pdf\n2. y.pdf"));
    }
}
