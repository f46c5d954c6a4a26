//! Downloadable renderings of the bug list

pub mod csv;
pub mod pdf;

/// A rendered export ready to be served or written to disk
#[derive(Debug, Clone)]
pub struct Export {
    pub content_type: &'static str,
    pub filename: &'static str,
    pub bytes: Vec<u8>,
}

impl Export {
    /// `Content-Disposition` value that makes browsers download the file
    pub fn disposition(&self) -> String {
        format!("attachment; filename=\"{}\"", self.filename)
    }
}

/// Render bugs as CSV
pub fn csv(bugs: &[crate::Bug]) -> Export {
    Export {
        content_type: csv::CONTENT_TYPE,
        filename: csv::FILENAME,
        bytes: csv::render(bugs).into_bytes(),
    }
}

/// Render bugs as a PDF report
pub fn pdf(bugs: &[crate::Bug], options: &pdf::PdfOptions) -> Export {
    Export {
        content_type: pdf::CONTENT_TYPE,
        filename: pdf::FILENAME,
        bytes: pdf::render(bugs, options),
    }
}
